//! Header-only pre-decoding and the class hierarchy built from it.
//!
//! Deciding how to decode a unit, building the interface index and merging reference types
//! all need the same handful of header facts: name, superclass, interfaces, access flags.
//! [`UnitProbe::parse`] reads just the constant pool and the header to get them, which is a
//! small fraction of the cost of a full decode.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    file::Parser,
    unit::{
        constant::Constant, frames::Hierarchy, AccessFlags, ConstantPool, SymbolPool, MAGIC,
    },
    Error, Result,
};

/// A field referenced from a unit's constant pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    /// Internal name of the owning class
    pub owner: String,
    /// Field name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
}

impl FieldKey {
    /// A new key.
    #[must_use]
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Self {
        FieldKey {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }
}

/// Header facts of a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitProbe {
    /// Internal name
    pub name: String,
    /// Internal name of the superclass
    pub super_name: Option<String>,
    /// Class access flags
    pub access: AccessFlags,
    /// Internal names of the implemented interfaces
    pub interfaces: Vec<String>,
    /// Major class-file version
    pub major_version: u16,
    /// Every `CONSTANT_Fieldref` in the pool
    pub field_refs: Vec<FieldKey>,
}

impl UnitProbe {
    /// Reads the header of a class file.
    ///
    /// # Errors
    /// Returns [`Error::Empty`], [`Error::OutOfBounds`] or [`Error::Malformed`] if the
    /// header or constant pool is damaged. Everything after the interface table is not
    /// looked at.
    pub fn parse(bytes: &[u8], symbols: &SymbolPool) -> Result<UnitProbe> {
        if bytes.is_empty() {
            return Err(Error::Empty);
        }
        let mut parser = Parser::new(bytes);
        if parser.read_be::<u32>()? != MAGIC {
            return Err(malformed_error!("Invalid magic"));
        }
        parser.advance_by(2)?;
        let major_version = parser.read_be::<u16>()?;

        let pool = ConstantPool::parse(&mut parser, symbols)?;
        let access = AccessFlags::from_bits_retain(parser.read_be::<u16>()?);
        let name = pool.class_name(parser.read_be::<u16>()?)?.to_string();
        let super_name = match parser.read_be::<u16>()? {
            0 => None,
            index => Some(pool.class_name(index)?.to_string()),
        };
        let count = parser.read_be::<u16>()?;
        let mut interfaces = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            interfaces.push(pool.class_name(parser.read_be::<u16>()?)?.to_string());
        }

        let mut field_refs = Vec::new();
        for (index, constant) in pool.iter() {
            if matches!(constant, Constant::Fieldref { .. }) {
                let field = pool.member_ref(index)?;
                field_refs.push(FieldKey::new(field.owner, field.name, field.descriptor));
            }
        }

        Ok(UnitProbe {
            name,
            super_name,
            access,
            interfaces,
            major_version,
            field_refs,
        })
    }

    /// `ACC_INTERFACE` is set.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.access.contains(AccessFlags::INTERFACE)
    }

    /// Returns `true` if the pool references `field`.
    #[must_use]
    pub fn references(&self, field: &FieldKey) -> bool {
        self.field_refs.contains(field)
    }
}

/// Superclass links and interface flags of every unit of an artifact.
#[derive(Debug, Clone, Default)]
pub struct ClassHierarchy {
    supers: FxHashMap<String, String>,
    interfaces: FxHashSet<String>,
}

impl ClassHierarchy {
    /// Builds the hierarchy from unit probes.
    pub fn from_probes<'a>(probes: impl IntoIterator<Item = &'a UnitProbe>) -> Self {
        let mut hierarchy = ClassHierarchy::default();
        for probe in probes {
            hierarchy.insert(&probe.name, probe.super_name.as_deref(), probe.is_interface());
        }
        hierarchy
    }

    /// Records one class.
    pub fn insert(&mut self, name: &str, super_name: Option<&str>, is_interface: bool) {
        if let Some(super_name) = super_name {
            self.supers.insert(name.to_string(), super_name.to_string());
        }
        if is_interface {
            self.interfaces.insert(name.to_string());
        }
    }

    /// Number of classes with a known superclass.
    #[must_use]
    pub fn len(&self) -> usize {
        self.supers.len()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.supers.is_empty() && self.interfaces.is_empty()
    }
}

impl Hierarchy for ClassHierarchy {
    fn super_class(&self, name: &str) -> Option<&str> {
        self.supers.get(name).map(String::as_str)
    }

    fn is_interface(&self, name: &str) -> bool {
        self.interfaces.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{frames::common_super, UnitBuilder};

    #[test]
    fn probe_reads_header_and_field_refs() {
        let bytes = UnitBuilder::new("a7")
            .super_class("b2")
            .interface("java/lang/Runnable")
            .routine(AccessFlags::PUBLIC, "run", "()V", |code| {
                code.var(crate::unit::opcodes::ALOAD, 0)
                    .field(crate::unit::opcodes::GETFIELD, "a7", "c", "I")
                    .op(crate::unit::opcodes::POP)
                    .op(crate::unit::opcodes::RETURN);
            })
            .bytes()
            .unwrap();

        let symbols = SymbolPool::new();
        let probe = UnitProbe::parse(&bytes, &symbols).unwrap();
        assert_eq!(probe.name, "a7");
        assert_eq!(probe.super_name.as_deref(), Some("b2"));
        assert_eq!(probe.interfaces, vec!["java/lang/Runnable"]);
        assert!(!probe.is_interface());
        assert!(probe.references(&FieldKey::new("a7", "c", "I")));
        assert!(!probe.references(&FieldKey::new("a7", "d", "I")));
    }

    #[test]
    fn hierarchy_merges_through_known_classes() {
        let mut hierarchy = ClassHierarchy::default();
        hierarchy.insert("b2", Some("java/lang/Object"), false);
        hierarchy.insert("a7", Some("b2"), false);
        hierarchy.insert("c4", Some("b2"), false);
        hierarchy.insert("i1", Some("java/lang/Object"), true);

        assert_eq!(common_super(&hierarchy, "a7", "c4"), "b2");
        assert_eq!(common_super(&hierarchy, "a7", "i1"), "java/lang/Object");
        assert_eq!(hierarchy.len(), 4);
    }
}
