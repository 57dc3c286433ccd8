//! Symbolic to obfuscated name mapping.
//!
//! The target client ships with obfuscated names (`a7`, `b`, `c(I)V`). Patches are written
//! against readable, *symbolic* names (`Alpha`, `counter`, `tick`). A [`MappingTable`] records
//! which obfuscated name every symbolic name stands for in one particular client revision,
//! and a [`SymbolResolver`] answers lookups against it during the classify phase.
//!
//! # Table format
//!
//! Tables are JSON documents:
//!
//! ```json
//! {
//!   "revision": 214,
//!   "classes": {
//!     "Alpha": {
//!       "name": "a7",
//!       "fields":  { "counter": { "name": "b", "descriptor": "I" } },
//!       "methods": { "tick":    { "name": "c", "descriptor": "()V" } }
//!     }
//!   }
//! }
//! ```
//!
//! Tables are append-only across revisions: a newer table may add classes and members but
//! never rename an entry that already exists. [`MappingTable::extend`] enforces this.
//!
//! The host runtime is not obfuscated. It is patched with [`MappingTable::identity`], which
//! resolves every name to itself.
//!
//! # Examples
//!
//! ```rust
//! use classweave::mapping::MappingTable;
//!
//! let table = MappingTable::from_json(
//!     r#"{ "revision": 1, "classes": { "Alpha": { "name": "a7" } } }"#,
//! )?;
//! assert_eq!(table.class("Alpha").map(|class| class.name.as_str()), Some("a7"));
//! # Ok::<(), classweave::Error>(())
//! ```

mod resolver;

pub use resolver::{InterfaceIndex, MemberTarget, ResolvedClass, SymbolResolver};

use std::{collections::BTreeMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The obfuscated identity of one field or method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberMapping {
    /// Obfuscated member name
    pub name: String,
    /// Obfuscated descriptor
    pub descriptor: String,
}

impl MemberMapping {
    /// A new member mapping.
    #[must_use]
    pub fn new(name: &str, descriptor: &str) -> Self {
        MemberMapping {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }
}

/// The obfuscated identity of one class and its mapped members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMapping {
    /// Obfuscated internal name
    pub name: String,
    /// Symbolic field name to obfuscated field
    #[serde(default)]
    pub fields: BTreeMap<String, MemberMapping>,
    /// Symbolic method name to obfuscated method
    #[serde(default)]
    pub methods: BTreeMap<String, MemberMapping>,
}

impl ClassMapping {
    /// A class mapping without members.
    #[must_use]
    pub fn new(name: &str) -> Self {
        ClassMapping {
            name: name.to_string(),
            fields: BTreeMap::new(),
            methods: BTreeMap::new(),
        }
    }
}

/// A versioned symbolic to obfuscated name table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingTable {
    /// Client revision this table belongs to
    pub revision: u32,
    /// Symbolic class name to class mapping
    #[serde(default)]
    pub classes: BTreeMap<String, ClassMapping>,
    #[serde(skip)]
    identity: bool,
}

impl MappingTable {
    /// An empty table for `revision`.
    #[must_use]
    pub fn new(revision: u32) -> Self {
        MappingTable {
            revision,
            classes: BTreeMap::new(),
            identity: false,
        }
    }

    /// The table that maps every name to itself.
    #[must_use]
    pub fn identity() -> Self {
        MappingTable {
            revision: 0,
            classes: BTreeMap::new(),
            identity: true,
        }
    }

    /// Returns `true` for [`MappingTable::identity`].
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Parses a JSON table.
    ///
    /// # Errors
    /// Returns [`Error::Json`] if the document does not match the table format.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a JSON table from disk.
    ///
    /// # Errors
    /// Returns [`Error::FileError`] if the file cannot be read and [`Error::Json`] if it is
    /// not a valid table.
    pub fn from_file(path: &Path) -> Result<Self> {
        let table = MappingTable::from_json(&fs::read_to_string(path)?)?;
        log::debug!(
            "loaded mapping table revision {} with {} classes from {}",
            table.revision,
            table.classes.len(),
            path.display()
        );
        Ok(table)
    }

    /// Serializes the table as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Number of mapped classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns `true` if no class is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// The mapping of a symbolic class.
    #[must_use]
    pub fn class(&self, symbolic: &str) -> Option<&ClassMapping> {
        self.classes.get(symbolic)
    }

    /// Adds a class mapping. Re-adding an identical name is a no-op.
    ///
    /// # Errors
    /// Returns [`Error::Mapping`] if `symbolic` is already mapped to a different name.
    pub fn insert_class(&mut self, symbolic: &str, obfuscated: &str) -> Result<()> {
        match self.classes.get(symbolic) {
            Some(existing) if existing.name != obfuscated => Err(Error::Mapping(format!(
                "class {} is mapped to {}, refusing to remap it to {}",
                symbolic, existing.name, obfuscated
            ))),
            Some(_) => Ok(()),
            None => {
                self.classes
                    .insert(symbolic.to_string(), ClassMapping::new(obfuscated));
                Ok(())
            }
        }
    }

    /// Adds a field mapping to an already mapped class.
    ///
    /// # Errors
    /// Returns [`Error::Mapping`] if the class is unknown or the field is mapped differently.
    pub fn insert_field(&mut self, class: &str, symbolic: &str, member: MemberMapping) -> Result<()> {
        let mapping = self.class_mut(class)?;
        insert_member(&mut mapping.fields, class, symbolic, member)
    }

    /// Adds a method mapping to an already mapped class.
    ///
    /// # Errors
    /// Returns [`Error::Mapping`] if the class is unknown or the method is mapped differently.
    pub fn insert_method(&mut self, class: &str, symbolic: &str, member: MemberMapping) -> Result<()> {
        let mapping = self.class_mut(class)?;
        insert_member(&mut mapping.methods, class, symbolic, member)
    }

    fn class_mut(&mut self, class: &str) -> Result<&mut ClassMapping> {
        self.classes
            .get_mut(class)
            .ok_or_else(|| Error::Mapping(format!("class {class} is not mapped")))
    }

    /// Merges a newer table into this one.
    ///
    /// # Errors
    /// Returns [`Error::Mapping`] if `newer` has an older revision or renames an existing
    /// entry. The table is left unchanged on error.
    pub fn extend(&mut self, newer: &MappingTable) -> Result<()> {
        if newer.revision < self.revision {
            return Err(Error::Mapping(format!(
                "revision {} is older than {}",
                newer.revision, self.revision
            )));
        }

        let mut merged = self.clone();
        for (symbolic, class) in &newer.classes {
            merged.insert_class(symbolic, &class.name)?;
            for (field, member) in &class.fields {
                merged.insert_field(symbolic, field, member.clone())?;
            }
            for (method, member) in &class.methods {
                merged.insert_method(symbolic, method, member.clone())?;
            }
        }
        merged.revision = newer.revision;
        *self = merged;
        Ok(())
    }
}

fn insert_member(
    members: &mut BTreeMap<String, MemberMapping>,
    class: &str,
    symbolic: &str,
    member: MemberMapping,
) -> Result<()> {
    match members.get(symbolic) {
        Some(existing) if *existing != member => Err(Error::Mapping(format!(
            "member {}.{} is mapped to {}{}, refusing to remap it to {}{}",
            class, symbolic, existing.name, existing.descriptor, member.name, member.descriptor
        ))),
        Some(_) => Ok(()),
        None => {
            members.insert(symbolic.to_string(), member);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"{
        "revision": 214,
        "classes": {
            "Alpha": {
                "name": "a7",
                "fields": { "counter": { "name": "b", "descriptor": "I" } },
                "methods": { "tick": { "name": "c", "descriptor": "()V" } }
            },
            "Beta": { "name": "k" }
        }
    }"#;

    #[test]
    fn parses_json() {
        let table = MappingTable::from_json(TABLE).unwrap();
        assert_eq!(table.revision, 214);
        assert_eq!(table.len(), 2);
        let alpha = table.class("Alpha").unwrap();
        assert_eq!(alpha.name, "a7");
        assert_eq!(alpha.fields["counter"], MemberMapping::new("b", "I"));
        assert_eq!(alpha.methods["tick"], MemberMapping::new("c", "()V"));
        assert!(table.class("Beta").unwrap().fields.is_empty());
        assert!(!table.is_identity());
    }

    #[test]
    fn json_roundtrip() {
        let table = MappingTable::from_json(TABLE).unwrap();
        let again = MappingTable::from_json(&table.to_json().unwrap()).unwrap();
        assert_eq!(again, table);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            MappingTable::from_json("{ \"classes\": 3 }"),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn append_only() {
        let mut table = MappingTable::from_json(TABLE).unwrap();

        let mut newer = MappingTable::new(215);
        newer.insert_class("Alpha", "a7").unwrap();
        newer
            .insert_method("Alpha", "reset", MemberMapping::new("d", "(Z)V"))
            .unwrap();
        newer.insert_class("Gamma", "q").unwrap();
        table.extend(&newer).unwrap();
        assert_eq!(table.revision, 215);
        assert_eq!(table.class("Alpha").unwrap().methods.len(), 2);
        assert_eq!(table.class("Gamma").unwrap().name, "q");

        let mut renamed = MappingTable::new(216);
        renamed.insert_class("Alpha", "zz").unwrap();
        let before = table.clone();
        assert!(matches!(table.extend(&renamed), Err(Error::Mapping(_))));
        assert_eq!(table, before);

        assert!(table.extend(&MappingTable::new(3)).is_err());
        assert!(table
            .insert_field("Alpha", "counter", MemberMapping::new("x", "I"))
            .is_err());
        assert!(table
            .insert_field("Nope", "counter", MemberMapping::new("x", "I"))
            .is_err());
    }

    #[test]
    fn from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        std::fs::write(&path, TABLE).unwrap();
        assert_eq!(MappingTable::from_file(&path).unwrap().len(), 2);
        assert!(MappingTable::from_file(&dir.path().join("missing.json")).is_err());
    }
}
