//! `@Shadow`: patch aliases of existing members.
//!
//! The binding itself lives in the [`crate::transform::Remapper`], set up during classify. All
//! that is left at transform time is checking that the bound member is really there.

use crate::{mapping::MemberTarget, unit::CodeUnit, Result};

/// Checks that the shadowed member exists in `unit`. The unit itself is not changed.
pub(super) fn verify(unit: &CodeUnit, target: &MemberTarget, field: bool) -> Result<()> {
    let exists = if field {
        unit.field(&target.name, &target.descriptor).is_some()
    } else {
        unit.routine(&target.name, &target.descriptor).is_some()
    };
    if !exists {
        return Err(transform_error!(
            unit.name(),
            "shadowed {} does not exist",
            target
        ));
    }
    log::trace!("shadow bound to {}", target);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{AccessFlags, UnitBuilder};

    #[test]
    fn requires_existing_member() {
        let unit = UnitBuilder::new("a7")
            .field(AccessFlags::PRIVATE, "b", "I")
            .build()
            .unwrap();
        let field = MemberTarget {
            owner: "a7".into(),
            name: "b".into(),
            descriptor: "I".into(),
        };
        assert!(verify(&unit, &field, true).is_ok());
        assert!(verify(&unit, &field, false).is_err());
        let wrong = MemberTarget {
            descriptor: "J".into(),
            ..field
        };
        assert!(matches!(
            verify(&unit, &wrong, true),
            Err(crate::Error::Transform { .. })
        ));
    }
}
