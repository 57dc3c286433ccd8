//! The decoded instruction model of a routine body.
//!
//! A decoded body is a flat list of [`Insn`] values. Branch targets, exception ranges, line
//! numbers and local variable scopes refer to [`Label`] pseudo-instructions instead of byte
//! offsets, so code can be inserted or removed without any offset bookkeeping. Offsets only
//! exist again once the encoder lays the list out.
//!
//! All operands that name constants are indices into the constant pool of the unit that owns
//! the body. Copying instructions between units therefore always goes through
//! [`crate::unit::ConstantPool::import`].

use std::fmt;

use crate::unit::{frames::Frame, opcodes};

/// A position in an instruction list.
///
/// Labels are only unique within one body. [`Code::new_label`] hands out fresh ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// One logical instruction.
///
/// Encodings that only differ in operand width are normalized: shorthand and `wide` loads
/// and stores are [`Insn::Var`], `ldc`/`ldc_w`/`ldc2_w` are [`Insn::Ldc`], `goto_w` and
/// `jsr_w` are [`Insn::Jump`] with `goto`/`jsr`. The encoder picks the shortest valid form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insn {
    /// Pseudo-instruction marking a branch target or range boundary
    Label(Label),
    /// Any instruction without operands
    Simple(u8),
    /// `bipush`, `sipush` and `newarray` (the operand is the array type code)
    Int {
        /// Opcode
        op: u8,
        /// Immediate operand
        value: i32,
    },
    /// Loads, stores and `ret`
    Var {
        /// Canonical opcode (`iload` .. `astore`, `ret`)
        op: u8,
        /// Local variable slot
        index: u16,
    },
    /// `iinc`
    Iinc {
        /// Local variable slot
        index: u16,
        /// Signed increment
        delta: i16,
    },
    /// Conditional branches, `goto` and `jsr`
    Jump {
        /// Opcode
        op: u8,
        /// Branch target
        target: Label,
    },
    /// `ldc`, `ldc_w` and `ldc2_w`
    Ldc {
        /// Pool index of a loadable constant
        index: u16,
    },
    /// `new`, `anewarray`, `checkcast` and `instanceof`
    Type {
        /// Opcode
        op: u8,
        /// Pool index of a `CONSTANT_Class`
        index: u16,
    },
    /// `getstatic`, `putstatic`, `getfield` and `putfield`
    Field {
        /// Opcode
        op: u8,
        /// Pool index of a `CONSTANT_Fieldref`
        index: u16,
    },
    /// `invokevirtual`, `invokespecial` and `invokestatic`
    Method {
        /// Opcode
        op: u8,
        /// Pool index of a method reference
        index: u16,
    },
    /// `invokeinterface`
    InvokeInterface {
        /// Pool index of a `CONSTANT_InterfaceMethodref`
        index: u16,
        /// Argument slot count including the receiver
        count: u8,
    },
    /// `invokedynamic`
    InvokeDynamic {
        /// Pool index of a `CONSTANT_InvokeDynamic`
        index: u16,
    },
    /// `multianewarray`
    MultiANewArray {
        /// Pool index of the array `CONSTANT_Class`
        index: u16,
        /// Number of dimensions to allocate
        dims: u8,
    },
    /// `tableswitch`
    TableSwitch {
        /// Target for keys outside `low..=high`
        default: Label,
        /// Lowest key
        low: i32,
        /// Highest key
        high: i32,
        /// One target per key in `low..=high`
        targets: Vec<Label>,
    },
    /// `lookupswitch`
    LookupSwitch {
        /// Target for unmatched keys
        default: Label,
        /// Sorted `(key, target)` pairs
        pairs: Vec<(i32, Label)>,
    },
}

impl Insn {
    /// The opcode, or `None` for a label.
    #[must_use]
    pub fn opcode(&self) -> Option<u8> {
        Some(match self {
            Insn::Label(_) => return None,
            Insn::Simple(op)
            | Insn::Int { op, .. }
            | Insn::Var { op, .. }
            | Insn::Jump { op, .. }
            | Insn::Type { op, .. }
            | Insn::Field { op, .. }
            | Insn::Method { op, .. } => *op,
            Insn::Iinc { .. } => opcodes::IINC,
            Insn::Ldc { .. } => opcodes::LDC,
            Insn::InvokeInterface { .. } => opcodes::INVOKEINTERFACE,
            Insn::InvokeDynamic { .. } => opcodes::INVOKEDYNAMIC,
            Insn::MultiANewArray { .. } => opcodes::MULTIANEWARRAY,
            Insn::TableSwitch { .. } => opcodes::TABLESWITCH,
            Insn::LookupSwitch { .. } => opcodes::LOOKUPSWITCH,
        })
    }

    /// Returns `true` if control never falls through to the next instruction.
    #[must_use]
    pub fn ends_block(&self) -> bool {
        self.opcode().is_some_and(opcodes::ends_block)
    }

    /// Returns `true` for `ireturn` .. `return`.
    #[must_use]
    pub fn is_return(&self) -> bool {
        matches!(self, Insn::Simple(op) if opcodes::is_return(*op))
    }

    /// Every label this instruction can transfer control to.
    #[must_use]
    pub fn targets(&self) -> Vec<Label> {
        match self {
            Insn::Jump { target, .. } => vec![*target],
            Insn::TableSwitch {
                default, targets, ..
            } => std::iter::once(*default)
                .chain(targets.iter().copied())
                .collect(),
            Insn::LookupSwitch { default, pairs } => std::iter::once(*default)
                .chain(pairs.iter().map(|(_, target)| *target))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Rewrites every label reference through `map`.
    pub fn map_labels(&mut self, mut map: impl FnMut(Label) -> Label) {
        match self {
            Insn::Label(label) | Insn::Jump { target: label, .. } => *label = map(*label),
            Insn::TableSwitch {
                default, targets, ..
            } => {
                *default = map(*default);
                for target in targets {
                    *target = map(*target);
                }
            }
            Insn::LookupSwitch { default, pairs } => {
                *default = map(*default);
                for (_, target) in pairs {
                    *target = map(*target);
                }
            }
            _ => {}
        }
    }

    /// Rewrites every constant pool operand through `map`.
    ///
    /// # Errors
    /// Propagates the first error returned by `map`.
    pub fn map_constants(
        &mut self,
        mut map: impl FnMut(u16) -> crate::Result<u16>,
    ) -> crate::Result<()> {
        match self {
            Insn::Ldc { index }
            | Insn::Type { index, .. }
            | Insn::Field { index, .. }
            | Insn::Method { index, .. }
            | Insn::InvokeInterface { index, .. }
            | Insn::InvokeDynamic { index }
            | Insn::MultiANewArray { index, .. } => *index = map(*index)?,
            _ => {}
        }
        Ok(())
    }
}

/// An exception handler range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handler {
    /// First covered instruction
    pub start: Label,
    /// End of the covered range (exclusive)
    pub end: Label,
    /// Handler entry point
    pub handler: Label,
    /// Pool index of the caught class, 0 for any
    pub catch_type: u16,
}

/// A `LineNumberTable` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEntry {
    /// First instruction of the line
    pub start: Label,
    /// Source line number
    pub line: u16,
}

/// A `LocalVariableTable` or `LocalVariableTypeTable` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVar {
    /// Scope start
    pub start: Label,
    /// Scope end (exclusive)
    pub end: Label,
    /// Pool index of the variable name
    pub name: u16,
    /// Pool index of the descriptor, or of the generic signature for type table entries
    pub descriptor: u16,
    /// Local slot
    pub index: u16,
    /// Entry of the `LocalVariableTypeTable`
    pub generic: bool,
}

/// A decoded routine body.
///
/// `max_stack`, `max_locals` and `frames` reflect the body as it was decoded. The encoder
/// recomputes all three, so transformers never need to maintain them.
#[derive(Debug, Clone, Default)]
pub struct Code {
    /// Pool index of the `Code` attribute name, 0 if the body was synthesized
    pub attribute_name: u16,
    /// Operand stack size as decoded
    pub max_stack: u16,
    /// Local variable slots as decoded
    pub max_locals: u16,
    /// The instruction list
    pub insns: Vec<Insn>,
    /// Exception handlers in priority order
    pub handlers: Vec<Handler>,
    /// Line number entries
    pub lines: Vec<LineEntry>,
    /// Local variable entries
    pub locals: Vec<LocalVar>,
    /// Stack map frames expanded from `StackMapTable`, kept for listings only
    pub frames: Vec<(Label, Frame)>,
    next_label: u32,
}

impl Code {
    /// An empty body.
    #[must_use]
    pub fn new() -> Self {
        Code::default()
    }

    /// Hands out a label that is not used anywhere in this body yet.
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// The next label [`Code::new_label`] would return.
    #[must_use]
    pub fn label_watermark(&self) -> u32 {
        self.next_label
    }

    /// Raises the label watermark so that labels below `watermark` are never handed out.
    pub fn reserve_labels(&mut self, watermark: u32) {
        self.next_label = self.next_label.max(watermark);
    }

    /// Position of `label` in the instruction list.
    #[must_use]
    pub fn position(&self, label: Label) -> Option<usize> {
        self.insns.iter().position(|insn| *insn == Insn::Label(label))
    }

    /// Drops line and local variable tables.
    pub fn strip_debug(&mut self) {
        self.lines.clear();
        self.locals.clear();
    }
}

/// A minimally decoded body: the `Code` attribute payload, verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCode {
    /// Pool index of the `Code` attribute name
    pub attribute_name: u16,
    /// The attribute payload (everything after the length field)
    pub data: Vec<u8>,
}

/// The body of a routine.
#[derive(Debug, Clone)]
pub enum Body {
    /// Kept verbatim, may only pass through unmodified
    Raw(RawCode),
    /// Decoded into instructions
    Code(Code),
}

impl Body {
    /// The decoded body, if this is one.
    #[must_use]
    pub fn code(&self) -> Option<&Code> {
        match self {
            Body::Code(code) => Some(code),
            Body::Raw(_) => None,
        }
    }

    /// The decoded body, if this is one.
    pub fn code_mut(&mut self) -> Option<&mut Code> {
        match self {
            Body::Code(code) => Some(code),
            Body::Raw(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_labels() {
        let mut code = Code::new();
        let a = code.new_label();
        let b = code.new_label();
        assert_ne!(a, b);
        code.reserve_labels(10);
        assert_eq!(code.new_label(), Label(10));
        code.reserve_labels(3);
        assert_eq!(code.new_label(), Label(11));
    }

    #[test]
    fn targets_and_relabel() {
        let mut insn = Insn::LookupSwitch {
            default: Label(0),
            pairs: vec![(1, Label(1)), (5, Label(2))],
        };
        assert_eq!(insn.targets(), vec![Label(0), Label(1), Label(2)]);
        insn.map_labels(|label| Label(label.0 + 10));
        assert_eq!(insn.targets(), vec![Label(10), Label(11), Label(12)]);
        assert!(insn.ends_block());
        assert!(!Insn::Label(Label(0)).ends_block());
        assert!(Insn::Simple(opcodes::ARETURN).is_return());
    }
}
