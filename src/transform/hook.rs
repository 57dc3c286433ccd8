//! `@Hook`: calls to a copied callback at the entry or the returns of a routine.
//!
//! The callback was injected in the copy phase. The call forwards the receiver (for
//! instance callbacks) and every argument of the hooked routine, so the callback's
//! parameters must equal the routine's.

use crate::{
    mapping::MemberTarget,
    patch::{At, PatchMember, PatchUnit},
    transform::{code, TransformContext},
    unit::{descriptor::MethodDescriptor, CodeUnit, SymbolMap},
    Result,
};

/// Inserts calls to the callback of `member` into `target`.
pub(super) fn apply(
    unit: &mut CodeUnit,
    patch: &PatchUnit,
    member: &PatchMember,
    target: &MemberTarget,
    at: At,
    ctx: &TransformContext,
) -> Result<bool> {
    let Some(source) = patch.routine(member) else {
        return Err(transform_error!(patch.name(), "{} is not a routine", member));
    };
    let callback_descriptor = ctx.remapper.descriptor(&source.descriptor);
    let index = code::locate(unit, target)?;

    let hooked = &unit.routines[index];
    let hooked_static = hooked.is_static();
    let hooked_descriptor = hooked.descriptor.to_string();
    let params = MethodDescriptor::parse(&hooked_descriptor)?.params;
    if MethodDescriptor::parse(&callback_descriptor)?.params != params {
        return Err(transform_error!(
            unit.name(),
            "callback {}{} does not take the parameters of {}",
            source.name,
            callback_descriptor,
            target
        ));
    }
    if hooked_static && !source.is_static() {
        return Err(transform_error!(
            unit.name(),
            "instance callback {} cannot hook static {}",
            member,
            target
        ));
    }

    let positions = match at {
        At::Head => vec![code::entry_point(unit, index)?],
        At::Return => code::returns(code::body_mut(unit, index)?),
        other => {
            return Err(transform_error!(unit.name(), "hooks cannot be placed at {}", other));
        }
    };
    if positions.is_empty() {
        return Err(transform_error!(unit.name(), "{} never returns", target));
    }

    let owner = unit.name().to_string();
    let is_interface = unit.is_interface();
    let call = code::invoke(
        &mut unit.pool,
        &owner,
        is_interface,
        &source.name,
        &callback_descriptor,
        source.access,
    )?;
    let mut snippet = code::load_arguments(&params, hooked_static, !source.is_static());
    snippet.push(call);

    let body = code::body_mut(unit, index)?;
    code::insert_before(body, &positions, |_| Ok(snippet.clone()))?;
    log::debug!("hooked {} at {} into {}", source.name, at, target);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test::factories::{alpha_patch, alpha_unit},
        transform::{inject, Remapper, TransformStats},
        unit::{opcodes::*, ClassHierarchy, Insn},
    };

    #[test]
    fn calls_callback_at_head() {
        let patch = PatchUnit::from_unit(alpha_patch()).unwrap();
        let mut unit = alpha_unit();
        let mut remapper = Remapper::new();
        remapper.bind_class(patch.name(), "a7");
        let hierarchy = ClassHierarchy::default();
        let mut stats = TransformStats::default();
        let ctx = TransformContext {
            remapper: &remapper,
            hierarchy: &hierarchy,
            stats: &mut stats,
        };

        let callback = patch
            .members
            .iter()
            .find(|member| member.name == "beforeTick")
            .unwrap();
        inject::routine(&mut unit, &patch, callback, false, &ctx).unwrap();

        let target = MemberTarget {
            owner: "a7".into(),
            name: "c".into(),
            descriptor: "()V".into(),
        };
        assert!(apply(&mut unit, &patch, callback, &target, At::Head, &ctx).unwrap());

        let body = unit.routine("c", "()V").unwrap().code().unwrap();
        assert_eq!(body.insns[0], Insn::Var { op: ALOAD, index: 0 });
        let Insn::Method { op, index } = &body.insns[1] else {
            panic!("expected a call, found {:?}", body.insns[1]);
        };
        assert_eq!(*op, INVOKEVIRTUAL);
        let called = unit.pool.member_ref(*index).unwrap();
        assert_eq!((called.owner, called.name, called.descriptor), ("a7", "beforeTick", "()V"));
    }

    #[test]
    fn hooks_every_return() {
        let patch = PatchUnit::from_unit(alpha_patch()).unwrap();
        let mut unit = alpha_unit();
        let remapper = Remapper::new();
        let hierarchy = ClassHierarchy::default();
        let mut stats = TransformStats::default();
        let ctx = TransformContext {
            remapper: &remapper,
            hierarchy: &hierarchy,
            stats: &mut stats,
        };
        let callback = patch
            .members
            .iter()
            .find(|member| member.name == "beforeTick")
            .unwrap();
        let target = MemberTarget {
            owner: "a7".into(),
            name: "<init>".into(),
            descriptor: "()V".into(),
        };
        assert!(apply(&mut unit, &patch, callback, &target, At::Return, &ctx).unwrap());
        let body = unit.routine("<init>", "()V").unwrap().code().unwrap();
        let len = body.insns.len();
        assert!(body.insns[len - 1].is_return());
        assert!(matches!(body.insns[len - 2], Insn::Method { op: INVOKEVIRTUAL, .. }));
    }
}
