//! `@Disable`: turns a routine into a stub returning the default value of its type.

use crate::{
    mapping::MemberTarget,
    transform::code,
    unit::{descriptor::MethodDescriptor, Body, Code, CodeUnit},
    Result,
};

/// Replaces the body of `target` with `return` of `0`, `0L`, `0.0f`, `0.0` or `null`.
pub(super) fn apply(unit: &mut CodeUnit, target: &MemberTarget) -> Result<bool> {
    if target.name.starts_with('<') {
        return Err(transform_error!(unit.name(), "{} cannot be disabled", target));
    }
    let index = code::locate(unit, target)?;
    let descriptor = unit.routines[index].descriptor.clone();
    let ret = MethodDescriptor::parse(&descriptor)?.ret;

    let attribute_name = code::body_mut(unit, index)?.attribute_name;
    let mut stub = Code::new();
    stub.attribute_name = attribute_name;
    stub.insns = code::default_return(ret);
    unit.routines[index].body = Some(Body::Code(stub));
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{opcodes::*, AccessFlags, Insn, UnitBuilder};

    #[test]
    fn stubs_with_default_value() {
        let mut unit = UnitBuilder::new("a7")
            .routine(AccessFlags::PUBLIC, "d", "(I)J", |code| {
                code.var(ILOAD, 1).op(I2L).op(LRETURN);
            })
            .abstract_routine(AccessFlags::PUBLIC | AccessFlags::ABSTRACT, "e", "()V")
            .build()
            .unwrap();
        let d = MemberTarget {
            owner: "a7".into(),
            name: "d".into(),
            descriptor: "(I)J".into(),
        };
        assert!(apply(&mut unit, &d).unwrap());
        assert_eq!(
            unit.routine("d", "(I)J").unwrap().code().unwrap().insns,
            vec![Insn::Simple(LCONST_0), Insn::Simple(LRETURN)]
        );

        let e = MemberTarget {
            name: "e".into(),
            descriptor: "()V".into(),
            ..d
        };
        assert!(apply(&mut unit, &e).is_err());
    }
}
