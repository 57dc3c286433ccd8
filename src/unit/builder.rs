//! Programmatic construction of code units.
//!
//! [`UnitBuilder`] assembles a [`CodeUnit`] member by member and [`CodeBuilder`] assembles
//! routine bodies, adding pool constants on the fly. Both collect the first error instead of
//! returning `Result` from every call, so definitions read as one chain; the error surfaces
//! from [`UnitBuilder::build`].
//!
//! # Examples
//!
//! ```rust
//! use classweave::unit::{opcodes::*, AccessFlags, UnitBuilder};
//!
//! let unit = UnitBuilder::new("a7")
//!     .field(AccessFlags::PRIVATE, "b", "I")
//!     .routine(AccessFlags::PUBLIC, "c", "()I", |code| {
//!         code.var(ALOAD, 0).field(GETFIELD, "a7", "b", "I").op(IRETURN);
//!     })
//!     .build()?;
//! assert!(unit.routine("c", "()I").is_some());
//! # Ok::<(), classweave::Error>(())
//! ```

use std::sync::Arc;

use crate::{
    unit::{
        annotation::{invisible_attribute, Annotation},
        descriptor::MethodDescriptor,
        encode,
        frames::OBJECT,
        opcodes::*,
        AccessFlags, ClassHierarchy, Code, CodeUnit, ConstantPool, EncodeOptions, FieldMember,
        Handler, Insn, Label, LineEntry, LocalVar, RoutineMember,
    },
    Error, Result,
};

/// Builds a [`CodeUnit`].
pub struct UnitBuilder {
    unit: CodeUnit,
    annotations: Vec<Annotation>,
    error: Option<Error>,
}

impl UnitBuilder {
    /// A public class extending `java/lang/Object`, class-file version 52.
    #[must_use]
    pub fn new(name: &str) -> Self {
        UnitBuilder {
            unit: CodeUnit::new(name, Some(OBJECT), 52),
            annotations: Vec::new(),
            error: None,
        }
    }

    fn record<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.error.get_or_insert(error);
                None
            }
        }
    }

    /// Sets the major class-file version.
    #[must_use]
    pub fn version(mut self, major: u16) -> Self {
        self.unit.major_version = major;
        self
    }

    /// Sets the superclass.
    #[must_use]
    pub fn super_class(mut self, name: &str) -> Self {
        self.unit.super_name = Some(Arc::from(name));
        self.unit.super_class = 0;
        self
    }

    /// Replaces the class access flags.
    #[must_use]
    pub fn access(mut self, access: AccessFlags) -> Self {
        self.unit.access = access;
        self
    }

    /// Adds an implemented interface.
    #[must_use]
    pub fn interface(mut self, name: &str) -> Self {
        let result = self.unit.add_interface(name);
        self.record(result);
        self
    }

    /// Adds a class-level invisible annotation.
    #[must_use]
    pub fn annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Adds a field.
    #[must_use]
    pub fn field(self, access: AccessFlags, name: &str, descriptor: &str) -> Self {
        self.annotated_field(access, name, descriptor, &[])
    }

    /// Adds a field carrying invisible annotations.
    #[must_use]
    pub fn annotated_field(
        mut self,
        access: AccessFlags,
        name: &str,
        descriptor: &str,
        annotations: &[Annotation],
    ) -> Self {
        let mut field = FieldMember::new(access, name, descriptor);
        if !annotations.is_empty() {
            let attribute = invisible_attribute(&mut self.unit.pool, annotations);
            if let Some(attribute) = self.record(attribute) {
                field.attributes.push(attribute);
            }
        }
        self.unit.fields.push(field);
        self
    }

    /// Adds a routine whose body is assembled by `body`.
    #[must_use]
    pub fn routine(
        self,
        access: AccessFlags,
        name: &str,
        descriptor: &str,
        body: impl FnOnce(&mut CodeBuilder),
    ) -> Self {
        self.annotated_routine(access, name, descriptor, &[], body)
    }

    /// Adds a routine carrying invisible annotations.
    #[must_use]
    pub fn annotated_routine(
        mut self,
        access: AccessFlags,
        name: &str,
        descriptor: &str,
        annotations: &[Annotation],
        body: impl FnOnce(&mut CodeBuilder),
    ) -> Self {
        let mut builder = CodeBuilder::new(&mut self.unit.pool);
        body(&mut builder);
        let (code, error) = (builder.code, builder.error);
        if let Some(error) = error {
            self.error.get_or_insert(error);
        }

        let mut routine = RoutineMember::new(access, name, descriptor, Some(code));
        if !annotations.is_empty() {
            let attribute = invisible_attribute(&mut self.unit.pool, annotations);
            if let Some(attribute) = self.record(attribute) {
                routine.attributes.push(attribute);
            }
        }
        self.unit.routines.push(routine);
        self
    }

    /// Adds a routine without body.
    #[must_use]
    pub fn abstract_routine(mut self, access: AccessFlags, name: &str, descriptor: &str) -> Self {
        self.unit
            .routines
            .push(RoutineMember::new(access, name, descriptor, None));
        self
    }

    /// Finishes the unit.
    ///
    /// # Errors
    /// Returns the first error any builder call ran into.
    pub fn build(mut self) -> Result<CodeUnit> {
        if !self.annotations.is_empty() {
            let attribute = invisible_attribute(&mut self.unit.pool, &self.annotations);
            if let Some(attribute) = self.record(attribute) {
                self.unit.attributes.push(attribute);
            }
        }
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.unit),
        }
    }

    /// Finishes and encodes the unit.
    ///
    /// # Errors
    /// Returns the first builder error, or [`Error::Encode`] if the unit does not encode.
    pub fn bytes(self) -> Result<Vec<u8>> {
        let unit = self.build()?;
        encode(&unit, &EncodeOptions::default(), &ClassHierarchy::default())
    }
}

/// Builds a routine body against the pool of the unit being built.
pub struct CodeBuilder<'a> {
    pool: &'a mut ConstantPool,
    code: Code,
    error: Option<Error>,
}

impl<'a> CodeBuilder<'a> {
    /// A builder for an empty body.
    pub fn new(pool: &'a mut ConstantPool) -> Self {
        CodeBuilder {
            pool,
            code: Code::new(),
            error: None,
        }
    }

    /// The body assembled so far, and the first error, if any.
    #[must_use]
    pub fn finish(self) -> (Code, Option<Error>) {
        (self.code, self.error)
    }

    fn pool_index(&mut self, result: Result<u16>) -> u16 {
        match result {
            Ok(index) => index,
            Err(error) => {
                self.error.get_or_insert(error);
                0
            }
        }
    }

    /// A fresh label, not placed yet.
    pub fn label(&mut self) -> Label {
        self.code.new_label()
    }

    /// Places `label` at the current position.
    pub fn place(&mut self, label: Label) -> &mut Self {
        self.insn(Insn::Label(label))
    }

    /// Appends any instruction.
    pub fn insn(&mut self, insn: Insn) -> &mut Self {
        self.code.insns.push(insn);
        self
    }

    /// Appends an instruction without operands.
    pub fn op(&mut self, op: u8) -> &mut Self {
        self.insn(Insn::Simple(op))
    }

    /// Pushes an `int` constant using the shortest encoding.
    pub fn int(&mut self, value: i32) -> &mut Self {
        match value {
            -1..=5 => self.op((i32::from(ICONST_0) + value) as u8),
            _ if i8::try_from(value).is_ok() => self.insn(Insn::Int { op: BIPUSH, value }),
            _ if i16::try_from(value).is_ok() => self.insn(Insn::Int { op: SIPUSH, value }),
            _ => {
                let index = self.pool.add_integer(value);
                let index = self.pool_index(index);
                self.insn(Insn::Ldc { index })
            }
        }
    }

    /// Pushes a string constant.
    pub fn ldc_string(&mut self, value: &str) -> &mut Self {
        let index = self.pool.add_string(value);
        let index = self.pool_index(index);
        self.insn(Insn::Ldc { index })
    }

    /// A load, store or `ret`.
    pub fn var(&mut self, op: u8, index: u16) -> &mut Self {
        self.insn(Insn::Var { op, index })
    }

    /// `iinc`
    pub fn iinc(&mut self, index: u16, delta: i16) -> &mut Self {
        self.insn(Insn::Iinc { index, delta })
    }

    /// A branch.
    pub fn jump(&mut self, op: u8, target: Label) -> &mut Self {
        self.insn(Insn::Jump { op, target })
    }

    /// `new`, `anewarray`, `checkcast` or `instanceof`.
    pub fn type_insn(&mut self, op: u8, class: &str) -> &mut Self {
        let index = self.pool.add_class(class);
        let index = self.pool_index(index);
        self.insn(Insn::Type { op, index })
    }

    /// A field access.
    pub fn field(&mut self, op: u8, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.add_fieldref(owner, name, descriptor);
        let index = self.pool_index(index);
        self.insn(Insn::Field { op, index })
    }

    /// A call. `invokeinterface` gets an interface method reference and its slot count.
    pub fn invoke(&mut self, op: u8, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let interface = op == INVOKEINTERFACE;
        let index = self.pool.add_methodref(owner, name, descriptor, interface);
        let index = self.pool_index(index);
        if !interface {
            return self.insn(Insn::Method { op, index });
        }
        let count = match MethodDescriptor::parse(descriptor) {
            Ok(parsed) => u8::try_from(parsed.arg_slots() + 1).unwrap_or(u8::MAX),
            Err(error) => {
                self.error.get_or_insert(error);
                1
            }
        };
        self.insn(Insn::InvokeInterface { index, count })
    }

    /// An exception handler. `catch_type` of `None` catches everything.
    pub fn handler(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<&str>) -> &mut Self {
        let catch_type = match catch_type {
            Some(class) => {
                let index = self.pool.add_class(class);
                self.pool_index(index)
            }
            None => 0,
        };
        self.code.handlers.push(Handler {
            start,
            end,
            handler,
            catch_type,
        });
        self
    }

    /// A line number entry.
    pub fn line(&mut self, start: Label, line: u16) -> &mut Self {
        self.code.lines.push(LineEntry { start, line });
        self
    }

    /// A local variable entry.
    pub fn local(&mut self, start: Label, end: Label, name: &str, descriptor: &str, index: u16) -> &mut Self {
        let name = self.pool.add_utf8(name);
        let name = self.pool_index(name);
        let descriptor = self.pool.add_utf8(descriptor);
        let descriptor = self.pool_index(descriptor);
        self.code.locals.push(LocalVar {
            start,
            end,
            name,
            descriptor,
            index,
            generic: false,
        });
        self
    }
}
