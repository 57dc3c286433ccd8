//! The constant pool and cross-unit constant import.
//!
//! The pool is the backbone of byte-faithful re-encoding: entries are decoded into
//! [`Constant`] values at their original indices and written back in the same order. Edits
//! only ever append new entries (deduplicated against existing ones), so every index stored
//! in an untouched attribute or raw routine body keeps pointing at the same constant.
//!
//! # Import
//!
//! Transformers copy code from patch units into target units. Every pool index in the copied
//! code must be translated into an index of the target pool. [`ConstantPool::import`] does
//! this recursively, rewriting class and member references through a [`SymbolMap`] on the
//! way, and appending bootstrap methods to the destination's `BootstrapMethods` table for
//! `invokedynamic` and dynamic constants.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::{
    file::{Parser, Writer},
    unit::{
        attribute::{Attribute, BootstrapMethod, BOOTSTRAP_METHODS},
        descriptor, SymbolPool,
    },
    Result,
};

/// `CONSTANT_Utf8`
pub const TAG_UTF8: u8 = 1;
/// `CONSTANT_Integer`
pub const TAG_INTEGER: u8 = 3;
/// `CONSTANT_Float`
pub const TAG_FLOAT: u8 = 4;
/// `CONSTANT_Long`
pub const TAG_LONG: u8 = 5;
/// `CONSTANT_Double`
pub const TAG_DOUBLE: u8 = 6;
/// `CONSTANT_Class`
pub const TAG_CLASS: u8 = 7;
/// `CONSTANT_String`
pub const TAG_STRING: u8 = 8;
/// `CONSTANT_Fieldref`
pub const TAG_FIELDREF: u8 = 9;
/// `CONSTANT_Methodref`
pub const TAG_METHODREF: u8 = 10;
/// `CONSTANT_InterfaceMethodref`
pub const TAG_INTERFACE_METHODREF: u8 = 11;
/// `CONSTANT_NameAndType`
pub const TAG_NAME_AND_TYPE: u8 = 12;
/// `CONSTANT_MethodHandle`
pub const TAG_METHOD_HANDLE: u8 = 15;
/// `CONSTANT_MethodType`
pub const TAG_METHOD_TYPE: u8 = 16;
/// `CONSTANT_Dynamic`
pub const TAG_DYNAMIC: u8 = 17;
/// `CONSTANT_InvokeDynamic`
pub const TAG_INVOKE_DYNAMIC: u8 = 18;
/// `CONSTANT_Module`
pub const TAG_MODULE: u8 = 19;
/// `CONSTANT_Package`
pub const TAG_PACKAGE: u8 = 20;

/// A single constant pool entry.
///
/// Floating point values are stored as raw bits so that NaN payloads survive a round trip
/// and entries can be hashed for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Constant {
    /// Index 0 and the slot following a `Long` or `Double`
    Unusable,
    Utf8(Arc<str>),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    Fieldref { class: u16, name_and_type: u16 },
    Methodref { class: u16, name_and_type: u16 },
    InterfaceMethodref { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
}

impl Constant {
    /// `Long` and `Double` take two pool slots.
    #[must_use]
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }

    /// The tag byte written before the entry.
    #[must_use]
    pub fn tag(&self) -> u8 {
        match self {
            Constant::Unusable => 0,
            Constant::Utf8(_) => TAG_UTF8,
            Constant::Integer(_) => TAG_INTEGER,
            Constant::Float(_) => TAG_FLOAT,
            Constant::Long(_) => TAG_LONG,
            Constant::Double(_) => TAG_DOUBLE,
            Constant::Class(_) => TAG_CLASS,
            Constant::String(_) => TAG_STRING,
            Constant::Fieldref { .. } => TAG_FIELDREF,
            Constant::Methodref { .. } => TAG_METHODREF,
            Constant::InterfaceMethodref { .. } => TAG_INTERFACE_METHODREF,
            Constant::NameAndType { .. } => TAG_NAME_AND_TYPE,
            Constant::MethodHandle { .. } => TAG_METHOD_HANDLE,
            Constant::MethodType(_) => TAG_METHOD_TYPE,
            Constant::Dynamic { .. } => TAG_DYNAMIC,
            Constant::InvokeDynamic { .. } => TAG_INVOKE_DYNAMIC,
            Constant::Module(_) => TAG_MODULE,
            Constant::Package(_) => TAG_PACKAGE,
        }
    }
}

/// Kind of a member reference constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    /// `CONSTANT_Fieldref`
    Field,
    /// `CONSTANT_Methodref`
    Method,
    /// `CONSTANT_InterfaceMethodref`
    InterfaceMethod,
}

/// A resolved member reference: owner class, member name and descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    /// Which kind of reference constant this came from
    pub kind: RefKind,
    /// Internal name of the owning class (or an array descriptor)
    pub owner: &'a str,
    /// Member name
    pub name: &'a str,
    /// Member descriptor
    pub descriptor: &'a str,
}

/// Translation of symbolic names while importing constants from another unit.
///
/// The default member and descriptor mappings keep member names and rewrite only the class
/// names inside descriptors, which is what every reference that is not bound to an existing
/// target member needs.
pub trait SymbolMap {
    /// Maps an internal class name.
    fn class(&self, name: &str) -> String;

    /// Maps a member reference to its `(name, descriptor)` in the destination.
    fn member(&self, owner: &str, name: &str, descriptor: &str, is_field: bool) -> (String, String) {
        let _ = (owner, is_field);
        (name.to_string(), self.descriptor(descriptor))
    }

    /// Maps a field or method descriptor.
    fn descriptor(&self, descriptor: &str) -> String {
        descriptor::remap(descriptor, |name| self.class(name))
    }

    /// Maps the name stored in a `CONSTANT_Class`, which may be an array descriptor.
    fn class_constant(&self, name: &str) -> String {
        if name.starts_with('[') {
            self.descriptor(name)
        } else {
            self.class(name)
        }
    }
}

/// A [`SymbolMap`] that leaves every name unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl SymbolMap for Identity {
    fn class(&self, name: &str) -> String {
        name.to_string()
    }
}

/// Source and destination bootstrap tables for one import.
pub struct BootstrapTable<'a> {
    /// Bootstrap methods of the unit constants are imported from
    pub source: &'a [BootstrapMethod],
    /// Attribute list of the destination unit
    pub target: &'a mut Vec<Attribute>,
}

impl BootstrapTable<'_> {
    fn append(&mut self, pool: &mut ConstantPool, method: BootstrapMethod) -> Result<u16> {
        let position = self
            .target
            .iter()
            .position(|attribute| matches!(attribute, Attribute::BootstrapMethods { .. }));
        let position = match position {
            Some(position) => position,
            None => {
                let name = pool.add_utf8(BOOTSTRAP_METHODS)?;
                self.target.push(Attribute::BootstrapMethods {
                    name,
                    methods: Vec::new(),
                });
                self.target.len() - 1
            }
        };

        let Attribute::BootstrapMethods { methods, .. } = &mut self.target[position] else {
            return Err(malformed_error!("BootstrapMethods attribute vanished"));
        };
        if let Some(existing) = methods.iter().position(|m| *m == method) {
            return to_index(existing);
        }
        methods.push(method);
        to_index(methods.len() - 1)
    }
}

fn to_index(value: usize) -> Result<u16> {
    u16::try_from(value).map_err(|_| malformed_error!("Index {} exceeds u16", value))
}

/// The constant pool of one code unit.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    lookup: Option<FxHashMap<Constant, u16>>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        ConstantPool::new()
    }
}

impl ConstantPool {
    /// An empty pool (only the reserved index 0).
    #[must_use]
    pub fn new() -> Self {
        ConstantPool {
            entries: vec![Constant::Unusable],
            lookup: None,
        }
    }

    /// Reads `constant_pool_count` and the entries, interning every UTF-8 value.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] on unknown tags or invalid UTF-8 and
    /// [`crate::Error::OutOfBounds`] on truncation.
    pub fn parse(parser: &mut Parser, symbols: &SymbolPool) -> Result<Self> {
        let count = usize::from(parser.read_be::<u16>()?);
        if count == 0 {
            return Err(malformed_error!("Constant pool count of zero"));
        }

        let mut entries = Vec::with_capacity(count);
        entries.push(Constant::Unusable);
        while entries.len() < count {
            let tag = parser.read_be::<u8>()?;
            let constant = match tag {
                TAG_UTF8 => Constant::Utf8(symbols.intern(&parser.read_mutf8()?)),
                TAG_INTEGER => Constant::Integer(parser.read_be::<i32>()?),
                TAG_FLOAT => Constant::Float(parser.read_be::<u32>()?),
                TAG_LONG => Constant::Long(parser.read_be::<i64>()?),
                TAG_DOUBLE => Constant::Double(parser.read_be::<u64>()?),
                TAG_CLASS => Constant::Class(parser.read_be::<u16>()?),
                TAG_STRING => Constant::String(parser.read_be::<u16>()?),
                TAG_FIELDREF => Constant::Fieldref {
                    class: parser.read_be::<u16>()?,
                    name_and_type: parser.read_be::<u16>()?,
                },
                TAG_METHODREF => Constant::Methodref {
                    class: parser.read_be::<u16>()?,
                    name_and_type: parser.read_be::<u16>()?,
                },
                TAG_INTERFACE_METHODREF => Constant::InterfaceMethodref {
                    class: parser.read_be::<u16>()?,
                    name_and_type: parser.read_be::<u16>()?,
                },
                TAG_NAME_AND_TYPE => Constant::NameAndType {
                    name: parser.read_be::<u16>()?,
                    descriptor: parser.read_be::<u16>()?,
                },
                TAG_METHOD_HANDLE => Constant::MethodHandle {
                    kind: parser.read_be::<u8>()?,
                    reference: parser.read_be::<u16>()?,
                },
                TAG_METHOD_TYPE => Constant::MethodType(parser.read_be::<u16>()?),
                TAG_DYNAMIC => Constant::Dynamic {
                    bootstrap: parser.read_be::<u16>()?,
                    name_and_type: parser.read_be::<u16>()?,
                },
                TAG_INVOKE_DYNAMIC => Constant::InvokeDynamic {
                    bootstrap: parser.read_be::<u16>()?,
                    name_and_type: parser.read_be::<u16>()?,
                },
                TAG_MODULE => Constant::Module(parser.read_be::<u16>()?),
                TAG_PACKAGE => Constant::Package(parser.read_be::<u16>()?),
                _ => {
                    return Err(malformed_error!(
                        "Unknown constant tag {} at pool index {}",
                        tag,
                        entries.len()
                    ))
                }
            };
            let wide = constant.is_wide();
            entries.push(constant);
            if wide {
                entries.push(Constant::Unusable);
            }
        }

        if entries.len() != count {
            return Err(malformed_error!("Wide constant overruns the constant pool"));
        }

        Ok(ConstantPool {
            entries,
            lookup: None,
        })
    }

    /// Writes `constant_pool_count` and all entries in index order.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a UTF-8 value is too long to encode.
    pub fn write(&self, writer: &mut Writer) -> Result<()> {
        writer.write_be(to_index(self.entries.len())?);
        for constant in &self.entries {
            if matches!(constant, Constant::Unusable) {
                continue;
            }
            writer.write_be(constant.tag());
            match constant {
                Constant::Unusable => {}
                Constant::Utf8(value) => writer.write_mutf8(value)?,
                Constant::Integer(value) => writer.write_be(*value),
                Constant::Float(bits) => writer.write_be(*bits),
                Constant::Long(value) => writer.write_be(*value),
                Constant::Double(bits) => writer.write_be(*bits),
                Constant::Class(index)
                | Constant::String(index)
                | Constant::MethodType(index)
                | Constant::Module(index)
                | Constant::Package(index) => writer.write_be(*index),
                Constant::Fieldref {
                    class,
                    name_and_type,
                }
                | Constant::Methodref {
                    class,
                    name_and_type,
                }
                | Constant::InterfaceMethodref {
                    class,
                    name_and_type,
                } => {
                    writer.write_be(*class);
                    writer.write_be(*name_and_type);
                }
                Constant::NameAndType { name, descriptor } => {
                    writer.write_be(*name);
                    writer.write_be(*descriptor);
                }
                Constant::MethodHandle { kind, reference } => {
                    writer.write_be(*kind);
                    writer.write_be(*reference);
                }
                Constant::Dynamic {
                    bootstrap,
                    name_and_type,
                }
                | Constant::InvokeDynamic {
                    bootstrap,
                    name_and_type,
                } => {
                    writer.write_be(*bootstrap);
                    writer.write_be(*name_and_type);
                }
            }
        }
        Ok(())
    }

    /// The `constant_pool_count` value (number of slots including index 0).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the pool holds nothing but the reserved slot.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Iterates `(index, constant)` over usable entries.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, constant)| !matches!(constant, Constant::Unusable))
            .map(|(index, constant)| (index as u16, constant))
    }

    /// The entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for index 0, unusable slots and indices past the end.
    pub fn get(&self, index: u16) -> Result<&Constant> {
        match self.entries.get(usize::from(index)) {
            Some(Constant::Unusable) | None => {
                Err(malformed_error!("Invalid constant pool index {}", index))
            }
            Some(constant) => Ok(constant),
        }
    }

    /// The value of a `CONSTANT_Utf8`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value),
            other => Err(malformed_error!(
                "Expected Utf8 at pool index {}, found tag {}",
                index,
                other.tag()
            )),
        }
    }

    /// The shared value of a `CONSTANT_Utf8`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn utf8_arc(&self, index: u16) -> Result<Arc<str>> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(Arc::clone(value)),
            other => Err(malformed_error!(
                "Expected Utf8 at pool index {}, found tag {}",
                index,
                other.tag()
            )),
        }
    }

    /// The internal name stored in a `CONSTANT_Class`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8(*name),
            other => Err(malformed_error!(
                "Expected Class at pool index {}, found tag {}",
                index,
                other.tag()
            )),
        }
    }

    /// The value of a `CONSTANT_String`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn string(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::String(value) => self.utf8(*value),
            other => Err(malformed_error!(
                "Expected String at pool index {}, found tag {}",
                index,
                other.tag()
            )),
        }
    }

    /// The `(name, descriptor)` of a `CONSTANT_NameAndType`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            other => Err(malformed_error!(
                "Expected NameAndType at pool index {}, found tag {}",
                index,
                other.tag()
            )),
        }
    }

    /// Resolves a field, method or interface method reference.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is not a member reference.
    pub fn member_ref(&self, index: u16) -> Result<MemberRef<'_>> {
        let (kind, class, name_and_type) = match self.get(index)? {
            Constant::Fieldref {
                class,
                name_and_type,
            } => (RefKind::Field, *class, *name_and_type),
            Constant::Methodref {
                class,
                name_and_type,
            } => (RefKind::Method, *class, *name_and_type),
            Constant::InterfaceMethodref {
                class,
                name_and_type,
            } => (RefKind::InterfaceMethod, *class, *name_and_type),
            other => {
                return Err(malformed_error!(
                    "Expected member reference at pool index {}, found tag {}",
                    index,
                    other.tag()
                ))
            }
        };
        let (name, descriptor) = self.name_and_type(name_and_type)?;
        Ok(MemberRef {
            kind,
            owner: self.class_name(class)?,
            name,
            descriptor,
        })
    }

    /// Appends `constant` unless an equal entry exists, returning its index.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool would exceed 65535 slots.
    pub fn add(&mut self, constant: Constant) -> Result<u16> {
        let entries = &self.entries;
        let lookup = self.lookup.get_or_insert_with(|| {
            let mut lookup = FxHashMap::default();
            for (index, entry) in entries.iter().enumerate() {
                if !matches!(entry, Constant::Unusable) {
                    lookup.entry(entry.clone()).or_insert(index as u16);
                }
            }
            lookup
        });

        if let Some(index) = lookup.get(&constant) {
            return Ok(*index);
        }

        let index = self.entries.len();
        let slots = if constant.is_wide() { 2 } else { 1 };
        if index + slots > usize::from(u16::MAX) {
            return Err(malformed_error!("Constant pool exceeds 65535 slots"));
        }

        let index = index as u16;
        let wide = constant.is_wide();
        lookup.insert(constant.clone(), index);
        self.entries.push(constant);
        if wide {
            self.entries.push(Constant::Unusable);
        }
        Ok(index)
    }

    /// Adds a `CONSTANT_Utf8`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_utf8(&mut self, value: &str) -> Result<u16> {
        self.add(Constant::Utf8(Arc::from(value)))
    }

    /// Adds a `CONSTANT_Class`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_class(&mut self, name: &str) -> Result<u16> {
        let name = self.add_utf8(name)?;
        self.add(Constant::Class(name))
    }

    /// Adds a `CONSTANT_String`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_string(&mut self, value: &str) -> Result<u16> {
        let value = self.add_utf8(value)?;
        self.add(Constant::String(value))
    }

    /// Adds a `CONSTANT_Integer`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_integer(&mut self, value: i32) -> Result<u16> {
        self.add(Constant::Integer(value))
    }

    /// Adds a `CONSTANT_Float`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_float(&mut self, value: f32) -> Result<u16> {
        self.add(Constant::Float(value.to_bits()))
    }

    /// Adds a `CONSTANT_Long`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_long(&mut self, value: i64) -> Result<u16> {
        self.add(Constant::Long(value))
    }

    /// Adds a `CONSTANT_Double`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_double(&mut self, value: f64) -> Result<u16> {
        self.add(Constant::Double(value.to_bits()))
    }

    /// Adds a `CONSTANT_NameAndType`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name = self.add_utf8(name)?;
        let descriptor = self.add_utf8(descriptor)?;
        self.add(Constant::NameAndType { name, descriptor })
    }

    /// Adds a `CONSTANT_Fieldref`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_fieldref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        self.add_member_ref(RefKind::Field, owner, name, descriptor)
    }

    /// Adds a `CONSTANT_Methodref`, or a `CONSTANT_InterfaceMethodref` if `interface` is set.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_methodref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface: bool,
    ) -> Result<u16> {
        let kind = if interface {
            RefKind::InterfaceMethod
        } else {
            RefKind::Method
        };
        self.add_member_ref(kind, owner, name, descriptor)
    }

    /// Adds a member reference of the given kind.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_member_ref(
        &mut self,
        kind: RefKind,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let class = self.add_class(owner)?;
        let name_and_type = self.add_name_and_type(name, descriptor)?;
        self.add(match kind {
            RefKind::Field => Constant::Fieldref {
                class,
                name_and_type,
            },
            RefKind::Method => Constant::Methodref {
                class,
                name_and_type,
            },
            RefKind::InterfaceMethod => Constant::InterfaceMethodref {
                class,
                name_and_type,
            },
        })
    }

    /// Returns `index` if it already holds `value`, otherwise adds `value` as a new UTF-8 entry.
    ///
    /// Members remember the pool index their name was decoded from. Reusing that index keeps
    /// unmodified units byte-identical even when the pool holds duplicate strings.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn utf8_or_add(&mut self, index: u16, value: &str) -> Result<u16> {
        if index != 0 && self.utf8(index).is_ok_and(|existing| existing == value) {
            return Ok(index);
        }
        self.add_utf8(value)
    }

    /// Returns `index` if it already names class `name`, otherwise adds a class entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn class_or_add(&mut self, index: u16, name: &str) -> Result<u16> {
        if index != 0 && self.class_name(index).is_ok_and(|existing| existing == name) {
            return Ok(index);
        }
        self.add_class(name)
    }

    /// Copies entry `index` of `source` into this pool, mapping names through `map`.
    ///
    /// Referenced entries are imported recursively. Bootstrap methods of `invokedynamic` and
    /// dynamic constants are appended to `bootstrap.target`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `index` or anything it references is invalid,
    /// or if the pool is full.
    pub fn import(
        &mut self,
        source: &ConstantPool,
        index: u16,
        map: &dyn SymbolMap,
        bootstrap: &mut BootstrapTable,
    ) -> Result<u16> {
        match source.get(index)? {
            Constant::Unusable => Err(malformed_error!("Import of unusable slot {}", index)),
            Constant::Utf8(value) => self.add(Constant::Utf8(Arc::clone(value))),
            constant @ (Constant::Integer(_)
            | Constant::Float(_)
            | Constant::Long(_)
            | Constant::Double(_)) => self.add(constant.clone()),
            Constant::Class(name) => {
                let mapped = map.class_constant(source.utf8(*name)?);
                self.add_class(&mapped)
            }
            Constant::String(value) => self.add_string(source.utf8(*value)?),
            Constant::Fieldref { .. }
            | Constant::Methodref { .. }
            | Constant::InterfaceMethodref { .. } => {
                let member = source.member_ref(index)?;
                let owner = map.class_constant(member.owner);
                let (name, descriptor) = map.member(
                    member.owner,
                    member.name,
                    member.descriptor,
                    member.kind == RefKind::Field,
                );
                self.add_member_ref(member.kind, &owner, &name, &descriptor)
            }
            Constant::NameAndType { name, descriptor } => {
                let descriptor = map.descriptor(source.utf8(*descriptor)?);
                self.add_name_and_type(source.utf8(*name)?, &descriptor)
            }
            Constant::MethodHandle { kind, reference } => {
                let kind = *kind;
                let reference = self.import(source, *reference, map, bootstrap)?;
                self.add(Constant::MethodHandle { kind, reference })
            }
            Constant::MethodType(descriptor) => {
                let descriptor = self.add_utf8(&map.descriptor(source.utf8(*descriptor)?))?;
                self.add(Constant::MethodType(descriptor))
            }
            Constant::Dynamic {
                bootstrap: method,
                name_and_type,
            }
            | Constant::InvokeDynamic {
                bootstrap: method,
                name_and_type,
            } => {
                let dynamic = matches!(source.get(index)?, Constant::Dynamic { .. });
                let Some(original) = bootstrap.source.get(usize::from(*method)) else {
                    return Err(malformed_error!(
                        "Bootstrap method {} missing in source unit",
                        method
                    ));
                };
                let original = original.clone();
                let handle = self.import(source, original.handle, map, bootstrap)?;
                let mut arguments = Vec::with_capacity(original.arguments.len());
                for argument in &original.arguments {
                    arguments.push(self.import(source, *argument, map, bootstrap)?);
                }
                let method = bootstrap.append(self, BootstrapMethod { handle, arguments })?;

                let (name, descriptor) = source.name_and_type(*name_and_type)?;
                let name_and_type = self.add_name_and_type(name, &map.descriptor(descriptor))?;
                self.add(if dynamic {
                    Constant::Dynamic {
                        bootstrap: method,
                        name_and_type,
                    }
                } else {
                    Constant::InvokeDynamic {
                        bootstrap: method,
                        name_and_type,
                    }
                })
            }
            Constant::Module(name) => {
                let name = self.add_utf8(source.utf8(*name)?)?;
                self.add(Constant::Module(name))
            }
            Constant::Package(name) => {
                let name = self.add_utf8(source.utf8(*name)?)?;
                self.add(Constant::Package(name))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_deduplicates() {
        let mut pool = ConstantPool::new();
        let a = pool.add_methodref("a7", "b", "(I)V", false).unwrap();
        let b = pool.add_methodref("a7", "b", "(I)V", false).unwrap();
        assert_eq!(a, b);
        let c = pool.add_methodref("a7", "b", "(I)V", true).unwrap();
        assert_ne!(a, c);

        let member = pool.member_ref(a).unwrap();
        assert_eq!(member.owner, "a7");
        assert_eq!(member.name, "b");
        assert_eq!(member.descriptor, "(I)V");
        assert_eq!(member.kind, RefKind::Method);
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = ConstantPool::new();
        let long = pool.add_long(1 << 40).unwrap();
        let next = pool.add_integer(3).unwrap();
        assert_eq!(next, long + 2);
        assert!(pool.get(long + 1).is_err());
        assert_eq!(pool.iter().count(), 2);
    }

    #[test]
    fn write_parse_roundtrip() {
        let mut pool = ConstantPool::new();
        pool.add_string("héllo\0").unwrap();
        pool.add_double(f64::NAN).unwrap();
        pool.add_float(-0.0).unwrap();
        pool.add_fieldref("a7", "b", "I").unwrap();

        let mut writer = Writer::new();
        pool.write(&mut writer).unwrap();
        let bytes = writer.into_inner();

        let symbols = SymbolPool::new();
        let parsed = ConstantPool::parse(&mut Parser::new(&bytes), &symbols).unwrap();
        assert_eq!(parsed.len(), pool.len());
        for (index, constant) in pool.iter() {
            assert_eq!(parsed.get(index).unwrap(), constant);
        }

        let mut again = Writer::new();
        parsed.write(&mut again).unwrap();
        assert_eq!(again.into_inner(), bytes);
    }

    #[test]
    fn reused_indices() {
        let mut pool = ConstantPool::new();
        let first = pool.add_utf8("x").unwrap();
        assert_eq!(pool.utf8_or_add(first, "x").unwrap(), first);
        let other = pool.utf8_or_add(first, "y").unwrap();
        assert_ne!(other, first);
        assert_eq!(pool.utf8_or_add(0, "x").unwrap(), first);
    }

    struct Rename;

    impl SymbolMap for Rename {
        fn class(&self, name: &str) -> String {
            match name {
                "patch/AlphaPatch" => "a7".to_string(),
                other => other.to_string(),
            }
        }
    }

    #[test]
    fn import_remaps_references() {
        let mut source = ConstantPool::new();
        let field = source
            .add_fieldref("patch/AlphaPatch", "count", "Lpatch/AlphaPatch;")
            .unwrap();
        let array = source.add_class("[Lpatch/AlphaPatch;").unwrap();

        let mut target = ConstantPool::new();
        target.add_utf8("unrelated").unwrap();
        let mut attributes = Vec::new();
        let mut bootstrap = BootstrapTable {
            source: &[],
            target: &mut attributes,
        };

        let imported = target
            .import(&source, field, &Rename, &mut bootstrap)
            .unwrap();
        let member = target.member_ref(imported).unwrap();
        assert_eq!(member.owner, "a7");
        assert_eq!(member.name, "count");
        assert_eq!(member.descriptor, "La7;");

        let imported = target
            .import(&source, array, &Rename, &mut bootstrap)
            .unwrap();
        assert_eq!(target.class_name(imported).unwrap(), "[La7;");
        assert!(attributes.is_empty());
    }

    #[test]
    fn import_invokedynamic_appends_bootstrap() {
        let mut source = ConstantPool::new();
        let factory = source
            .add_methodref(
                "java/lang/invoke/LambdaMetafactory",
                "metafactory",
                "()V",
                false,
            )
            .unwrap();
        let handle = source
            .add(Constant::MethodHandle {
                kind: 6,
                reference: factory,
            })
            .unwrap();
        let nat = source.add_name_and_type("run", "()Ljava/lang/Runnable;").unwrap();
        let indy = source
            .add(Constant::InvokeDynamic {
                bootstrap: 0,
                name_and_type: nat,
            })
            .unwrap();
        let methods = vec![BootstrapMethod {
            handle,
            arguments: vec![],
        }];

        let mut target = ConstantPool::new();
        let mut attributes = Vec::new();
        let mut bootstrap = BootstrapTable {
            source: &methods,
            target: &mut attributes,
        };
        let first = target
            .import(&source, indy, &Identity, &mut bootstrap)
            .unwrap();
        let second = target
            .import(&source, indy, &Identity, &mut bootstrap)
            .unwrap();
        assert_eq!(first, second);

        match &attributes[..] {
            [Attribute::BootstrapMethods { methods, .. }] => assert_eq!(methods.len(), 1),
            other => panic!("unexpected attributes {other:?}"),
        }
    }
}
