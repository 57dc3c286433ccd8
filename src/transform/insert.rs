//! `@Insert`: inlines a patch fragment into a target routine.
//!
//! The fragment is a `void` routine whose parameters are a prefix of the target's, with the
//! same staticness, so its argument slots line up with the target's. Locals above the
//! arguments move past every slot the target uses, returns become jumps to the end of the
//! inlined copy, and the fragment's handlers are put ahead of the target's so they take
//! priority inside the fragment. Line and local variable tables of the fragment are dropped.

use crate::{
    mapping::MemberTarget,
    patch::{At, PatchMember, PatchUnit, SiteRef},
    transform::{code, TransformContext},
    unit::{descriptor::MethodDescriptor, Code, CodeUnit, ConstantPool, Insn, SymbolMap},
    Result,
};

/// Where a fragment goes.
pub(super) struct InsertPoint<'a> {
    /// The routine to insert into
    pub routine: &'a MemberTarget,
    /// Kind of insertion point
    pub at: At,
    /// Call or field site, in target names
    pub site: Option<&'a SiteRef>,
    /// Occurrence to use, `-1` for all
    pub ordinal: i32,
}

fn site_matches(site: &SiteRef, pool: &ConstantPool, index: u16) -> Result<bool> {
    let reference = pool.member_ref(index)?;
    Ok(reference.owner == site.owner
        && reference.name == site.name
        && site
            .descriptor
            .as_deref()
            .map_or(true, |descriptor| descriptor == reference.descriptor))
}

fn site_positions(code: &Code, pool: &ConstantPool, at: At, site: &SiteRef) -> Result<Vec<usize>> {
    let mut positions = Vec::new();
    for (position, insn) in code.insns.iter().enumerate() {
        let index = match (at, insn) {
            (At::Invoke, Insn::Method { index, .. } | Insn::InvokeInterface { index, .. })
            | (At::Field, Insn::Field { index, .. }) => *index,
            _ => continue,
        };
        if site_matches(site, pool, index)? {
            positions.push(position);
        }
    }
    Ok(positions)
}

/// Inlines the fragment of `member` at `point`.
pub(super) fn apply(
    unit: &mut CodeUnit,
    patch: &PatchUnit,
    member: &PatchMember,
    point: &InsertPoint,
    ctx: &TransformContext,
) -> Result<bool> {
    let Some(source) = patch.routine(member) else {
        return Err(transform_error!(patch.name(), "{} is not a routine", member));
    };
    let Some(fragment_body) = source.code() else {
        return Err(transform_error!(patch.name(), "{} has no decoded body", member));
    };

    let index = code::locate(unit, point.routine)?;
    let routine = &unit.routines[index];
    let is_static = routine.is_static();
    let target_descriptor = routine.descriptor.to_string();
    let fragment_descriptor = ctx.remapper.descriptor(&source.descriptor);
    let target_params = MethodDescriptor::parse(&target_descriptor)?.params;
    let fragment = MethodDescriptor::parse(&fragment_descriptor)?;
    if is_static != source.is_static() || !target_params.starts_with(&fragment.params) {
        return Err(transform_error!(
            unit.name(),
            "fragment {}{} does not fit {}",
            source.name,
            fragment_descriptor,
            point.routine
        ));
    }
    let args = fragment.arg_slots() + u16::from(!is_static);

    let mut positions = match (point.at, point.site) {
        (At::Head, _) => vec![code::entry_point(unit, index)?],
        (At::Return, _) => code::returns(code::body_mut(unit, index)?),
        (At::Tail, _) => code::returns(code::body_mut(unit, index)?)
            .last()
            .map(|last| vec![*last])
            .unwrap_or_default(),
        (At::Invoke | At::Field, Some(site)) => {
            let Some(body) = unit.routines[index].code() else {
                return Err(transform_error!(unit.name(), "{} has no decoded body", point.routine));
            };
            site_positions(body, &unit.pool, point.at, site)?
        }
        (at, None) => {
            return Err(transform_error!(unit.name(), "{} insertion without a site", at));
        }
    };
    if point.ordinal >= 0 {
        let ordinal = point.ordinal as usize;
        let Some(position) = positions.get(ordinal).copied() else {
            return Err(transform_error!(
                unit.name(),
                "ordinal {} of {} in {} is out of range, found {}",
                point.ordinal,
                point.at,
                point.routine,
                positions.len()
            ));
        };
        positions = vec![position];
    }
    if positions.is_empty() {
        return Err(transform_error!(
            unit.name(),
            "no {} insertion point in {}",
            point.at,
            point.routine
        ));
    }

    let mut imported = code::import_code(unit, patch, fragment_body, ctx.remapper)?;
    imported.strip_debug();

    let body = code::body_mut(unit, index)?;
    let base = code::locals_used(body, is_static, &target_descriptor)?;
    let mut handlers = Vec::new();
    code::insert_before(body, &positions, |host| {
        let (insns, fragment_handlers) = code::inline(host, &imported, args, base);
        handlers.extend(fragment_handlers);
        Ok(insns)
    })?;
    handlers.append(&mut body.handlers);
    body.handlers = handlers;

    log::debug!(
        "inserted {} at {} x{} into {}",
        source.name,
        point.at,
        positions.len(),
        point.routine
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test::factories::directive,
        transform::{Remapper, TransformStats},
        unit::{annotation::ElementValue, opcodes::*, AccessFlags, ClassHierarchy, UnitBuilder},
    };

    fn target_unit() -> CodeUnit {
        UnitBuilder::new("a7")
            .routine(AccessFlags::PUBLIC, "c", "(I)V", |code| {
                code.var(ILOAD, 1)
                    .var(ISTORE, 2)
                    .invoke(INVOKESTATIC, "k", "q", "()V")
                    .invoke(INVOKESTATIC, "k", "q", "()V")
                    .op(RETURN);
            })
            .build()
            .unwrap()
    }

    fn fragment_patch() -> PatchUnit {
        let insert = directive("Insert")
            .with("value", ElementValue::String("c".into()))
            .with(
                "at",
                ElementValue::Enum {
                    type_name: "Lclassweave/api/At;".into(),
                    name: "INVOKE".into(),
                },
            )
            .with("target", ElementValue::String("k.q()V".into()));
        let unit = UnitBuilder::new("p/AlphaPatch")
            .annotation(directive("Patch").with("value", ElementValue::String("Alpha".into())))
            .annotated_routine(AccessFlags::PUBLIC, "before", "(I)V", &[insert], |code| {
                code.var(ILOAD, 1).var(ISTORE, 2).op(RETURN);
            })
            .build()
            .unwrap();
        PatchUnit::from_unit(unit).unwrap()
    }

    fn run(at: At, ordinal: i32) -> Result<CodeUnit> {
        let patch = fragment_patch();
        let mut unit = target_unit();
        let remapper = Remapper::new();
        let hierarchy = ClassHierarchy::default();
        let mut stats = TransformStats::default();
        let ctx = TransformContext {
            remapper: &remapper,
            hierarchy: &hierarchy,
            stats: &mut stats,
        };
        let routine = MemberTarget {
            owner: "a7".into(),
            name: "c".into(),
            descriptor: "(I)V".into(),
        };
        let site: SiteRef = "k.q()V".parse().unwrap();
        let point = InsertPoint {
            routine: &routine,
            at,
            site: Some(&site),
            ordinal,
        };
        apply(&mut unit, &patch, &patch.members[0], &point, &ctx)?;
        Ok(unit)
    }

    #[test]
    fn inlines_before_selected_call() {
        let unit = run(At::Invoke, 1).unwrap();
        let body = unit.routine("c", "(I)V").unwrap().code().unwrap();
        // the fragment's local 2 moves past the target's locals 0..=2
        assert_eq!(
            body.insns[..6],
            [
                Insn::Var { op: ILOAD, index: 1 },
                Insn::Var { op: ISTORE, index: 2 },
                body.insns[2].clone(),
                Insn::Var { op: ILOAD, index: 1 },
                Insn::Var { op: ISTORE, index: 3 },
                body.insns[5].clone(),
            ]
        );
        assert!(matches!(body.insns[5], Insn::Label(_)));
        assert!(matches!(body.insns[6], Insn::Method { op: INVOKESTATIC, .. }));
    }

    #[test]
    fn inlines_at_every_site() {
        let unit = run(At::Invoke, -1).unwrap();
        let body = unit.routine("c", "(I)V").unwrap().code().unwrap();
        let stores = body
            .insns
            .iter()
            .filter(|insn| **insn == Insn::Var { op: ISTORE, index: 3 })
            .count();
        assert_eq!(stores, 2);
    }

    #[test]
    fn head_and_ordinal_errors() {
        let unit = run(At::Head, -1).unwrap();
        let body = unit.routine("c", "(I)V").unwrap().code().unwrap();
        assert_eq!(body.insns[1], Insn::Var { op: ISTORE, index: 3 });

        assert!(run(At::Invoke, 2).is_err());
    }
}
