//! The code-unit model and its binary codec.
//!
//! A code unit is one compiled class. [`decode`] turns class-file bytes into a [`CodeUnit`],
//! and [`encode`] turns a (possibly edited) unit back into bytes. The model is shaped around
//! two requirements that pull in different directions:
//!
//! - **Pass-through must be byte-faithful.** Most units of an artifact are never touched. They
//!   are decoded in [`DecodeMode::Minimal`], where routine bodies stay raw and the constant
//!   pool keeps every index, so re-encoding reproduces the input exactly.
//! - **Edits must be easy.** Units that transformers work on are decoded in
//!   [`DecodeMode::Full`], where bodies become label-based instruction lists. The encoder
//!   lays them out again, widens jumps that no longer fit, and recomputes `max_stack`,
//!   `max_locals` and the `StackMapTable` from scratch.
//!
//! # Key Components
//!
//! - [`crate::unit::CodeUnit`] - Class header, members and attributes
//! - [`crate::unit::ConstantPool`] - Index-stable pool with deduplicating append and import
//! - [`crate::unit::Insn`] - Normalized instruction model with [`crate::unit::Label`]s
//! - [`crate::unit::frames`] - Type-inference dataflow and the [`crate::unit::Hierarchy`] trait
//! - [`crate::unit::UnitProbe`] - Header-only pre-decode used for planning and hierarchy queries
//! - [`crate::unit::UnitBuilder`] - Programmatic construction of units
//!
//! # Examples
//!
//! ```rust,no_run
//! use classweave::unit::{decode, encode, ClassHierarchy, DecodeMode, EncodeOptions, SymbolPool};
//!
//! let bytes = std::fs::read("client/a7.class")?;
//! let symbols = SymbolPool::new();
//! let unit = decode(&bytes, DecodeMode::Minimal, &symbols)?;
//! let again = encode(&unit, &EncodeOptions::default(), &ClassHierarchy::default())?;
//! assert_eq!(again, bytes);
//! # Ok::<(), classweave::Error>(())
//! ```

pub mod annotation;
pub mod attribute;
pub mod builder;
pub mod constant;
pub mod descriptor;
pub mod frames;
pub mod opcodes;
pub mod stackmap;

mod decoder;
mod encoder;
mod instruction;
mod listing;
mod pool;
mod probe;

pub use annotation::{Annotation, ElementValue};
pub use attribute::{Attribute, BootstrapMethod};
pub use builder::{CodeBuilder, UnitBuilder};
pub use constant::{Constant, ConstantPool, Identity, MemberRef, RefKind, SymbolMap};
pub use decoder::decode;
pub use encoder::{encode, EncodeOptions};
pub use frames::{Frame, Hierarchy, RoutineShape, VType};
pub use instruction::{Body, Code, Handler, Insn, Label, LineEntry, LocalVar, RawCode};
pub use pool::SymbolPool;
pub use probe::{ClassHierarchy, FieldKey, UnitProbe};

use std::sync::Arc;

use bitflags::bitflags;
use strum::{Display, EnumString};

use crate::{unit::constant::BootstrapTable, Result};

/// Class-file magic number.
pub const MAGIC: u32 = 0xCAFE_BABE;
/// Oldest supported major version (JDK 1.1).
pub const MIN_MAJOR_VERSION: u16 = 45;
/// Newest supported major version (JDK 25).
pub const MAX_MAJOR_VERSION: u16 = 69;
/// First major version that requires a `StackMapTable` and forbids `jsr`/`ret`.
pub const STACK_MAP_VERSION: u16 = 50;

bitflags! {
    /// Class, field and routine access flags.
    ///
    /// Several bits carry different names depending on where they appear
    /// (`SUPER`/`SYNCHRONIZED`, `BRIDGE`/`VOLATILE`, `VARARGS`/`TRANSIENT`). Unknown bits are
    /// retained so that flags survive a round trip unchanged.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u16 {
        /// `ACC_PUBLIC`
        const PUBLIC = 0x0001;
        /// `ACC_PRIVATE`
        const PRIVATE = 0x0002;
        /// `ACC_PROTECTED`
        const PROTECTED = 0x0004;
        /// `ACC_STATIC`
        const STATIC = 0x0008;
        /// `ACC_FINAL`
        const FINAL = 0x0010;
        /// `ACC_SYNCHRONIZED` on routines, `ACC_SUPER` on classes
        const SYNCHRONIZED = 0x0020;
        /// `ACC_VOLATILE` on fields, `ACC_BRIDGE` on routines
        const VOLATILE = 0x0040;
        /// `ACC_TRANSIENT` on fields, `ACC_VARARGS` on routines
        const TRANSIENT = 0x0080;
        /// `ACC_NATIVE`
        const NATIVE = 0x0100;
        /// `ACC_INTERFACE`
        const INTERFACE = 0x0200;
        /// `ACC_ABSTRACT`
        const ABSTRACT = 0x0400;
        /// `ACC_STRICT`
        const STRICT = 0x0800;
        /// `ACC_SYNTHETIC`
        const SYNTHETIC = 0x1000;
        /// `ACC_ANNOTATION`
        const ANNOTATION = 0x2000;
        /// `ACC_ENUM`
        const ENUM = 0x4000;
        /// `ACC_MODULE` on classes, `ACC_MANDATED` on parameters
        const MODULE = 0x8000;
    }
}

impl AccessFlags {
    /// `ACC_SUPER`, set on every class compiled since JDK 1.0.2.
    pub const SUPER: AccessFlags = AccessFlags::SYNCHRONIZED;
}

/// How much of a unit [`decode`] materializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DecodeMode {
    /// Decode routine bodies into instruction lists
    Full,
    /// Keep routine bodies raw, the unit may only pass through unmodified
    Minimal,
}

/// A field declaration.
#[derive(Debug, Clone)]
pub struct FieldMember {
    /// Access flags
    pub access: AccessFlags,
    /// Field name
    pub name: Arc<str>,
    /// Field descriptor
    pub descriptor: Arc<str>,
    /// Pool index the name was decoded from, 0 for new members
    pub name_index: u16,
    /// Pool index the descriptor was decoded from, 0 for new members
    pub descriptor_index: u16,
    /// Remaining attributes (`ConstantValue`, `Signature`, annotations)
    pub attributes: Vec<Attribute>,
}

impl FieldMember {
    /// A new field without attributes.
    #[must_use]
    pub fn new(access: AccessFlags, name: &str, descriptor: &str) -> Self {
        FieldMember {
            access,
            name: Arc::from(name),
            descriptor: Arc::from(descriptor),
            name_index: 0,
            descriptor_index: 0,
            attributes: Vec::new(),
        }
    }

    /// `ACC_STATIC` is set.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access.contains(AccessFlags::STATIC)
    }
}

/// A routine (method or constructor) declaration.
#[derive(Debug, Clone)]
pub struct RoutineMember {
    /// Access flags
    pub access: AccessFlags,
    /// Routine name
    pub name: Arc<str>,
    /// Routine descriptor
    pub descriptor: Arc<str>,
    /// Pool index the name was decoded from, 0 for new members
    pub name_index: u16,
    /// Pool index the descriptor was decoded from, 0 for new members
    pub descriptor_index: u16,
    /// Attributes other than `Code`
    pub attributes: Vec<Attribute>,
    /// The body, `None` for abstract and native routines
    pub body: Option<Body>,
    /// Position of the `Code` attribute among `attributes`
    pub body_position: usize,
}

impl RoutineMember {
    /// A new routine with a decoded body (or none).
    #[must_use]
    pub fn new(access: AccessFlags, name: &str, descriptor: &str, code: Option<Code>) -> Self {
        RoutineMember {
            access,
            name: Arc::from(name),
            descriptor: Arc::from(descriptor),
            name_index: 0,
            descriptor_index: 0,
            attributes: Vec::new(),
            body: code.map(Body::Code),
            body_position: 0,
        }
    }

    /// `ACC_STATIC` is set.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access.contains(AccessFlags::STATIC)
    }

    /// Returns `true` for `<init>`.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        &*self.name == "<init>"
    }

    /// The decoded body, if any.
    #[must_use]
    pub fn code(&self) -> Option<&Code> {
        self.body.as_ref().and_then(Body::code)
    }

    /// The decoded body, if any.
    pub fn code_mut(&mut self) -> Option<&mut Code> {
        self.body.as_mut().and_then(Body::code_mut)
    }

    /// The shape the frame computation needs.
    #[must_use]
    pub fn shape<'a>(&'a self, owner: &'a str) -> RoutineShape<'a> {
        RoutineShape {
            owner,
            name: &self.name,
            descriptor: &self.descriptor,
            is_static: self.is_static(),
        }
    }
}

/// A decoded class.
#[derive(Debug, Clone)]
pub struct CodeUnit {
    /// Minor class-file version
    pub minor_version: u16,
    /// Major class-file version
    pub major_version: u16,
    /// The constant pool
    pub pool: ConstantPool,
    /// Class access flags
    pub access: AccessFlags,
    /// Pool indices of the implemented interfaces
    pub interfaces: Vec<u16>,
    /// Fields in declaration order
    pub fields: Vec<FieldMember>,
    /// Routines in declaration order
    pub routines: Vec<RoutineMember>,
    /// Class attributes
    pub attributes: Vec<Attribute>,
    name: Arc<str>,
    this_class: u16,
    super_name: Option<Arc<str>>,
    super_class: u16,
    mode: DecodeMode,
}

impl CodeUnit {
    /// An empty public class.
    #[must_use]
    pub fn new(name: &str, super_name: Option<&str>, major_version: u16) -> Self {
        CodeUnit {
            minor_version: 0,
            major_version,
            pool: ConstantPool::new(),
            access: AccessFlags::PUBLIC | AccessFlags::SUPER,
            interfaces: Vec::new(),
            fields: Vec::new(),
            routines: Vec::new(),
            attributes: Vec::new(),
            name: Arc::from(name),
            this_class: 0,
            super_name: super_name.map(Arc::from),
            super_class: 0,
            mode: DecodeMode::Full,
        }
    }

    /// Internal name of the class.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Internal name of the superclass, `None` only for `java/lang/Object` and modules.
    #[must_use]
    pub fn super_name(&self) -> Option<&str> {
        self.super_name.as_deref()
    }

    /// The mode this unit was decoded in.
    #[must_use]
    pub fn mode(&self) -> DecodeMode {
        self.mode
    }

    /// `ACC_INTERFACE` is set.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.access.contains(AccessFlags::INTERFACE)
    }

    pub(crate) fn header_indices(&self) -> (u16, u16) {
        (self.this_class, self.super_class)
    }

    /// Internal names of the implemented interfaces.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if an interface index is not a class constant.
    pub fn interface_names(&self) -> Result<Vec<&str>> {
        self.interfaces
            .iter()
            .map(|index| self.pool.class_name(*index))
            .collect()
    }

    /// Adds an implemented interface. Returns `false` if it was already present.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_interface(&mut self, name: &str) -> Result<bool> {
        if self.interface_names()?.contains(&name) {
            return Ok(false);
        }
        let index = self.pool.add_class(name)?;
        self.interfaces.push(index);
        Ok(true)
    }

    /// The field with this name and descriptor.
    #[must_use]
    pub fn field(&self, name: &str, descriptor: &str) -> Option<&FieldMember> {
        self.fields
            .iter()
            .find(|field| &*field.name == name && &*field.descriptor == descriptor)
    }

    /// The routine with this name and descriptor.
    #[must_use]
    pub fn routine(&self, name: &str, descriptor: &str) -> Option<&RoutineMember> {
        self.routine_index(name, descriptor)
            .map(|index| &self.routines[index])
    }

    /// The routine with this name and descriptor.
    pub fn routine_mut(&mut self, name: &str, descriptor: &str) -> Option<&mut RoutineMember> {
        self.routine_index(name, descriptor)
            .map(|index| &mut self.routines[index])
    }

    /// Position of the routine with this name and descriptor.
    #[must_use]
    pub fn routine_index(&self, name: &str, descriptor: &str) -> Option<usize> {
        self.routines
            .iter()
            .position(|routine| &*routine.name == name && &*routine.descriptor == descriptor)
    }

    /// Entries of the `BootstrapMethods` attribute, empty if there is none.
    #[must_use]
    pub fn bootstrap_methods(&self) -> &[BootstrapMethod] {
        self.attributes
            .iter()
            .find_map(|attribute| match attribute {
                Attribute::BootstrapMethods { methods, .. } => Some(methods.as_slice()),
                Attribute::Raw { .. } => None,
            })
            .unwrap_or(&[])
    }

    /// Imports constant `index` of `source` into this unit's pool.
    ///
    /// # Errors
    /// See [`ConstantPool::import`].
    pub fn import_constant(
        &mut self,
        source: &CodeUnit,
        index: u16,
        map: &dyn SymbolMap,
    ) -> Result<u16> {
        let CodeUnit {
            pool, attributes, ..
        } = self;
        let mut bootstrap = BootstrapTable {
            source: source.bootstrap_methods(),
            target: attributes,
        };
        pool.import(&source.pool, index, map, &mut bootstrap)
    }

    /// Class-level annotations, visible and invisible.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if an annotation attribute is damaged.
    pub fn annotations(&self) -> Result<Vec<Annotation>> {
        annotation::collect(&self.attributes, &self.pool)
    }
}
