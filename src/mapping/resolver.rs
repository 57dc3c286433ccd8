//! Resolution of symbolic names against a mapping table.

use rustc_hash::FxHashMap;

use crate::{
    mapping::MappingTable,
    unit::UnitProbe,
    Error, Result,
};

/// Interface name to the units implementing it.
///
/// Built once per run from the unit probes, so that interface fallback lookups do not scan
/// the artifact.
#[derive(Debug, Clone, Default)]
pub struct InterfaceIndex {
    implementors: FxHashMap<String, Vec<String>>,
}

impl InterfaceIndex {
    /// Indexes the directly implemented interfaces of every probe.
    pub fn from_probes<'a>(probes: impl IntoIterator<Item = &'a UnitProbe>) -> Self {
        let mut implementors: FxHashMap<String, Vec<String>> = FxHashMap::default();
        for probe in probes {
            for interface in &probe.interfaces {
                implementors
                    .entry(interface.clone())
                    .or_default()
                    .push(probe.name.clone());
            }
        }
        for units in implementors.values_mut() {
            units.sort();
        }
        InterfaceIndex { implementors }
    }

    /// Units implementing `interface`, in name order.
    #[must_use]
    pub fn implementors(&self, interface: &str) -> &[String] {
        self.implementors
            .get(interface)
            .map_or(&[], Vec::as_slice)
    }

    /// The single unit implementing `interface`.
    ///
    /// # Errors
    /// Returns [`Error::Resolution`] if no unit or more than one unit implements it.
    pub fn unique(&self, interface: &str) -> Result<&str> {
        match self.implementors(interface) {
            [unit] => Ok(unit),
            [] => Err(Error::Resolution {
                symbol: interface.to_string(),
                context: "no unit implements this interface".to_string(),
            }),
            units => Err(Error::Resolution {
                symbol: interface.to_string(),
                context: format!("implemented by {} units: {}", units.len(), units.join(", ")),
            }),
        }
    }
}

/// A patch target class after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedClass {
    /// The symbolic name the patch used, or the interface name for fallbacks
    pub symbolic: String,
    /// Name of the unit in the artifact
    pub name: String,
    /// Resolved through the interface index instead of the table
    pub via_interface: bool,
}

/// A resolved field or method of a target unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberTarget {
    /// Name of the owning unit
    pub owner: String,
    /// Member name in the artifact
    pub name: String,
    /// Member descriptor in the artifact
    pub descriptor: String,
}

impl std::fmt::Display for MemberTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.descriptor.starts_with('(') {
            write!(f, "{}.{}{}", self.owner, self.name, self.descriptor)
        } else {
            write!(f, "{}.{}:{}", self.owner, self.name, self.descriptor)
        }
    }
}

/// Answers symbolic name lookups for one pipeline run.
///
/// Two strategies are tried in order: a direct table lookup, then the interface index for
/// patch units that name an interface fallback. Members of units found through the interface
/// index keep their names, since interface methods cannot be obfuscated.
pub struct SymbolResolver<'a> {
    table: &'a MappingTable,
    interfaces: InterfaceIndex,
}

impl<'a> SymbolResolver<'a> {
    /// A resolver over `table` and a prebuilt interface index.
    #[must_use]
    pub fn new(table: &'a MappingTable, interfaces: InterfaceIndex) -> Self {
        SymbolResolver { table, interfaces }
    }

    /// The table lookups go to.
    #[must_use]
    pub fn table(&self) -> &MappingTable {
        self.table
    }

    /// The interface index.
    #[must_use]
    pub fn interfaces(&self) -> &InterfaceIndex {
        &self.interfaces
    }

    /// Returns `true` if `symbolic` is a class the table renames.
    #[must_use]
    pub fn is_mapped(&self, symbolic: &str) -> bool {
        !self.table.is_identity() && self.table.class(symbolic).is_some()
    }

    /// Resolves a symbolic class name.
    ///
    /// # Errors
    /// Returns [`Error::Resolution`] if the table has no entry for it.
    pub fn resolve_class(&self, symbolic: &str) -> Result<String> {
        if self.table.is_identity() {
            return Ok(symbolic.to_string());
        }
        self.table
            .class(symbolic)
            .map(|class| class.name.clone())
            .ok_or_else(|| Error::Resolution {
                symbol: symbolic.to_string(),
                context: format!("class missing from mapping revision {}", self.table.revision),
            })
    }

    /// Resolves the target of a patch unit.
    ///
    /// `symbolic` is tried against the table first. If it is absent (or not given) and an
    /// `implementing` interface is named, the unique implementor of that interface is used.
    ///
    /// # Errors
    /// Returns [`Error::Resolution`] if neither strategy yields exactly one unit.
    pub fn resolve_target(
        &self,
        symbolic: Option<&str>,
        implementing: Option<&str>,
    ) -> Result<ResolvedClass> {
        if let Some(symbolic) = symbolic {
            if self.table.is_identity() || self.table.class(symbolic).is_some() {
                return Ok(ResolvedClass {
                    symbolic: symbolic.to_string(),
                    name: self.resolve_class(symbolic)?,
                    via_interface: false,
                });
            }
        }

        if let Some(interface) = implementing {
            let name = self.interfaces.unique(interface)?;
            log::debug!("resolved {} through interface {}", name, interface);
            return Ok(ResolvedClass {
                symbolic: symbolic.unwrap_or(interface).to_string(),
                name: name.to_string(),
                via_interface: true,
            });
        }

        match symbolic {
            Some(symbolic) => self.resolve_class(symbolic).map(|name| ResolvedClass {
                symbolic: symbolic.to_string(),
                name,
                via_interface: false,
            }),
            None => Err(Error::Resolution {
                symbol: String::new(),
                context: "patch names neither a class nor an interface".to_string(),
            }),
        }
    }

    /// Resolves a field of a resolved class.
    ///
    /// `descriptor` is the field type as seen from the patch, already remapped. It is used
    /// as-is when names pass through unchanged.
    ///
    /// # Errors
    /// Returns [`Error::Resolution`] if the class table has no entry for the field.
    pub fn resolve_field(
        &self,
        class: &ResolvedClass,
        field: &str,
        descriptor: &str,
    ) -> Result<MemberTarget> {
        self.resolve_member(class, field, descriptor, true)
    }

    /// Resolves a method of a resolved class.
    ///
    /// # Errors
    /// Returns [`Error::Resolution`] if the class table has no entry for the method.
    pub fn resolve_method(
        &self,
        class: &ResolvedClass,
        method: &str,
        descriptor: &str,
    ) -> Result<MemberTarget> {
        self.resolve_member(class, method, descriptor, false)
    }

    fn resolve_member(
        &self,
        class: &ResolvedClass,
        member: &str,
        descriptor: &str,
        is_field: bool,
    ) -> Result<MemberTarget> {
        let passthrough = MemberTarget {
            owner: class.name.clone(),
            name: member.to_string(),
            descriptor: descriptor.to_string(),
        };
        if self.table.is_identity() || class.via_interface {
            return Ok(passthrough);
        }

        let Some(mapping) = self.table.class(&class.symbolic) else {
            return Err(Error::Resolution {
                symbol: class.symbolic.clone(),
                context: "class missing from mapping".to_string(),
            });
        };
        let members = if is_field {
            &mapping.fields
        } else {
            &mapping.methods
        };
        match members.get(member) {
            Some(mapped) => Ok(MemberTarget {
                owner: class.name.clone(),
                name: mapped.name.clone(),
                descriptor: mapped.descriptor.clone(),
            }),
            // constructors and initializers are never renamed
            None if member.starts_with('<') => Ok(passthrough),
            None => Err(Error::Resolution {
                symbol: format!("{}.{}", class.symbolic, member),
                context: format!(
                    "{} missing from mapping of {}",
                    if is_field { "field" } else { "method" },
                    class.name
                ),
            }),
        }
    }
}
