//! `@ClassMod`: unit-level access and interface changes.

use crate::{patch::ClassMod, unit::CodeUnit, Result};

/// Applies flag changes and adds interfaces. Returns `false` if nothing changed.
pub(super) fn apply(unit: &mut CodeUnit, class_mod: &ClassMod) -> Result<bool> {
    let before = unit.access;
    unit.access = (unit.access | class_mod.add) & !class_mod.remove;
    let mut changed = before != unit.access;

    for interface in &class_mod.interfaces {
        changed |= unit.add_interface(interface)?;
    }
    if changed {
        log::debug!(
            "{} access {:#06x} -> {:#06x}",
            unit.name(),
            before.bits(),
            unit.access.bits()
        );
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{AccessFlags, UnitBuilder};

    #[test]
    fn flags_and_interfaces() {
        let mut unit = UnitBuilder::new("a7")
            .access(AccessFlags::FINAL | AccessFlags::SUPER)
            .build()
            .unwrap();
        let class_mod = ClassMod {
            add: AccessFlags::PUBLIC,
            remove: AccessFlags::FINAL,
            interfaces: vec!["api/Client".into()],
        };
        assert!(apply(&mut unit, &class_mod).unwrap());
        assert_eq!(unit.access, AccessFlags::PUBLIC | AccessFlags::SUPER);
        assert_eq!(unit.interface_names().unwrap(), vec!["api/Client"]);
        assert!(!apply(&mut unit, &class_mod).unwrap());
    }
}
