//! Type-inference dataflow over decoded routine bodies.
//!
//! Every edit a transformer makes can invalidate the stack map frames, the operand stack size
//! and the local variable count of a routine. Instead of patching those incrementally, the
//! encoder recomputes all three from scratch for every decoded body with [`analyze`]:
//!
//! 1. The entry frame is derived from the routine descriptor.
//! 2. A worklist propagates frames along fall-through edges, branch edges and exception
//!    edges, merging at every label.
//! 3. The result records which instructions are reachable, the merged frame at each label
//!    and the largest stack and local sizes seen.
//!
//! Frames are kept in *slot* form: `long` and `double` occupy two entries (the value type
//! followed by [`VType::Top`]), which makes the `dup`/`pop` family trivial to model. The
//! `StackMapTable` writer compacts them back to one entry per value.
//!
//! Reference merges need the class hierarchy. [`Hierarchy`] is implemented from unit probes
//! by [`crate::unit::ClassHierarchy`]. Classes it does not know, interfaces, and unrelated
//! classes all merge to `java/lang/Object`.

use std::{fmt, sync::Arc};

use rustc_hash::FxHashMap;

use crate::{
    unit::{
        constant::Constant,
        descriptor::{self, MethodDescriptor},
        opcodes::*,
        ConstantPool, Handler, Insn, Label,
    },
    Result,
};

/// `java/lang/Object`
pub const OBJECT: &str = "java/lang/Object";
/// `java/lang/Throwable`
pub const THROWABLE: &str = "java/lang/Throwable";

/// A verification type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VType {
    /// Unusable or unknown
    Top,
    /// `int` and every narrower integral type
    Integer,
    /// `float`
    Float,
    /// `long`, followed by `Top` in slot form
    Long,
    /// `double`, followed by `Top` in slot form
    Double,
    /// The `null` reference
    Null,
    /// `this` inside a constructor before the super or this constructor call
    UninitializedThis,
    /// An initialized reference: internal class name or array descriptor
    Object(Arc<str>),
    /// The result of the `new` at the given label, before its constructor call
    Uninitialized(Label),
}

impl VType {
    /// A reference type from an internal name or array descriptor.
    #[must_use]
    pub fn object(name: &str) -> VType {
        VType::Object(Arc::from(name))
    }

    /// `long` and `double` take two slots.
    #[must_use]
    pub fn is_wide(&self) -> bool {
        matches!(self, VType::Long | VType::Double)
    }
}

impl fmt::Display for VType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VType::Top => write!(f, "top"),
            VType::Integer => write!(f, "int"),
            VType::Float => write!(f, "float"),
            VType::Long => write!(f, "long"),
            VType::Double => write!(f, "double"),
            VType::Null => write!(f, "null"),
            VType::UninitializedThis => write!(f, "uninitialized_this"),
            VType::Object(name) => write!(f, "{name}"),
            VType::Uninitialized(label) => write!(f, "uninitialized({label})"),
        }
    }
}

/// Local variables and operand stack at one program point, in slot form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    /// Local variable slots
    pub locals: Vec<VType>,
    /// Operand stack slots, bottom first
    pub stack: Vec<VType>,
}

impl Frame {
    /// The frame on routine entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the descriptor is invalid.
    pub fn entry(shape: &RoutineShape) -> Result<Frame> {
        let mut locals = Vec::new();
        if !shape.is_static {
            locals.push(if shape.name == "<init>" && shape.owner != OBJECT {
                VType::UninitializedThis
            } else {
                VType::object(shape.owner)
            });
        }
        for param in MethodDescriptor::parse(shape.descriptor)?.params {
            push_field_type(&mut locals, param);
        }
        Ok(Frame {
            locals,
            stack: Vec::new(),
        })
    }

    /// Locals with the second halves of wide values and trailing `Top`s removed.
    #[must_use]
    pub fn compact_locals(&self) -> Vec<VType> {
        let mut locals = compact(&self.locals);
        while locals.last() == Some(&VType::Top) {
            locals.pop();
        }
        locals
    }

    /// Stack with the second halves of wide values removed.
    #[must_use]
    pub fn compact_stack(&self) -> Vec<VType> {
        compact(&self.stack)
    }

    fn pop(&mut self, slots: usize) -> Result<()> {
        if self.stack.len() < slots {
            return Err(malformed_error!(
                "Operand stack underflow: need {} slots, have {}",
                slots,
                self.stack.len()
            ));
        }
        self.stack.truncate(self.stack.len() - slots);
        Ok(())
    }

    fn pop_value(&mut self) -> Result<VType> {
        self.stack
            .pop()
            .ok_or_else(|| malformed_error!("Operand stack underflow"))
    }

    fn push(&mut self, vtype: VType) {
        let wide = vtype.is_wide();
        self.stack.push(vtype);
        if wide {
            self.stack.push(VType::Top);
        }
    }

    fn load(&self, index: u16) -> VType {
        self.locals
            .get(usize::from(index))
            .cloned()
            .unwrap_or(VType::Top)
    }

    fn store(&mut self, index: u16, vtype: VType) {
        let index = usize::from(index);
        let width = if vtype.is_wide() { 2 } else { 1 };
        if self.locals.len() < index + width {
            self.locals.resize(index + width, VType::Top);
        }
        if index > 0 && self.locals[index - 1].is_wide() {
            self.locals[index - 1] = VType::Top;
        }
        if width == 1 && self.locals[index].is_wide() && index + 1 < self.locals.len() {
            self.locals[index + 1] = VType::Top;
        }
        self.locals[index] = vtype;
        if width == 2 {
            self.locals[index + 1] = VType::Top;
        }
    }

    // Copies the top `count` slots below the `depth` slots underneath them
    fn dup(&mut self, count: usize, depth: usize) -> Result<()> {
        let len = self.stack.len();
        if len < count + depth {
            return Err(malformed_error!("Operand stack underflow in dup"));
        }
        let top = self.stack[len - count..].to_vec();
        let at = len - count - depth;
        self.stack.splice(at..at, top);
        Ok(())
    }

    fn initialize(&mut self, uninitialized: &VType, initialized: &VType) {
        for slot in self.locals.iter_mut().chain(self.stack.iter_mut()) {
            if slot == uninitialized {
                *slot = initialized.clone();
            }
        }
    }
}

fn compact(types: &[VType]) -> Vec<VType> {
    let mut out = Vec::with_capacity(types.len());
    let mut skip = false;
    for vtype in types {
        if skip {
            skip = false;
            continue;
        }
        skip = vtype.is_wide();
        out.push(vtype.clone());
    }
    out
}

/// Expands one-entry-per-value types into slot form.
#[must_use]
pub fn expand(types: &[VType]) -> Vec<VType> {
    let mut out = Vec::with_capacity(types.len());
    for vtype in types {
        out.push(vtype.clone());
        if vtype.is_wide() {
            out.push(VType::Top);
        }
    }
    out
}

/// Appends the slots of a descriptor field type.
pub fn push_field_type(slots: &mut Vec<VType>, field_type: &str) {
    match field_type.as_bytes().first() {
        Some(b'Z' | b'B' | b'C' | b'S' | b'I') => slots.push(VType::Integer),
        Some(b'F') => slots.push(VType::Float),
        Some(b'J') => slots.extend([VType::Long, VType::Top]),
        Some(b'D') => slots.extend([VType::Double, VType::Top]),
        Some(b'L') => slots.push(VType::object(
            descriptor::class_of(field_type).unwrap_or(OBJECT),
        )),
        Some(b'[') => slots.push(VType::object(field_type)),
        _ => {}
    }
}

/// Class hierarchy queries used to merge reference types.
pub trait Hierarchy {
    /// Direct superclass of `name`, `None` if unknown or `java/lang/Object`.
    fn super_class(&self, name: &str) -> Option<&str>;

    /// Returns `true` if `name` is a known interface.
    fn is_interface(&self, name: &str) -> bool;
}

// Throwable types show up in every handler merge and are never part of an artifact
const PLATFORM_SUPERS: &[(&str, &str)] = &[
    ("java/lang/Throwable", OBJECT),
    ("java/lang/Exception", THROWABLE),
    ("java/lang/Error", THROWABLE),
    ("java/lang/RuntimeException", "java/lang/Exception"),
    ("java/lang/InterruptedException", "java/lang/Exception"),
    ("java/lang/ReflectiveOperationException", "java/lang/Exception"),
    ("java/lang/ClassNotFoundException", "java/lang/ReflectiveOperationException"),
    ("java/lang/IllegalArgumentException", "java/lang/RuntimeException"),
    ("java/lang/IllegalStateException", "java/lang/RuntimeException"),
    ("java/lang/NullPointerException", "java/lang/RuntimeException"),
    ("java/lang/ArithmeticException", "java/lang/RuntimeException"),
    ("java/lang/ClassCastException", "java/lang/RuntimeException"),
    ("java/lang/UnsupportedOperationException", "java/lang/RuntimeException"),
    ("java/lang/IndexOutOfBoundsException", "java/lang/RuntimeException"),
    (
        "java/lang/ArrayIndexOutOfBoundsException",
        "java/lang/IndexOutOfBoundsException",
    ),
    ("java/lang/NumberFormatException", "java/lang/IllegalArgumentException"),
    ("java/lang/LinkageError", "java/lang/Error"),
    ("java/lang/VirtualMachineError", "java/lang/Error"),
    ("java/lang/OutOfMemoryError", "java/lang/VirtualMachineError"),
    ("java/lang/StackOverflowError", "java/lang/VirtualMachineError"),
    ("java/io/IOException", "java/lang/Exception"),
    ("java/io/EOFException", "java/io/IOException"),
    ("java/io/FileNotFoundException", "java/io/IOException"),
    ("java/net/SocketException", "java/io/IOException"),
    ("java/lang/String", OBJECT),
];

fn super_of<'a>(hierarchy: &'a dyn Hierarchy, name: &str) -> Option<&'a str> {
    hierarchy.super_class(name).or_else(|| {
        PLATFORM_SUPERS
            .iter()
            .find(|(class, _)| *class == name)
            .map(|(_, parent)| *parent)
    })
}

/// The most specific common superclass of two classes.
#[must_use]
pub fn common_super(hierarchy: &dyn Hierarchy, a: &str, b: &str) -> String {
    if a == b {
        return a.to_string();
    }
    if hierarchy.is_interface(a) || hierarchy.is_interface(b) {
        return OBJECT.to_string();
    }

    let mut ancestors = vec![a];
    let mut current = a;
    while let Some(parent) = super_of(hierarchy, current) {
        if ancestors.len() > 256 || ancestors.contains(&parent) {
            break;
        }
        ancestors.push(parent);
        current = parent;
    }

    let mut current = b;
    for _ in 0..=256 {
        if ancestors.contains(&current) {
            return current.to_string();
        }
        match super_of(hierarchy, current) {
            Some(parent) => current = parent,
            None => break,
        }
    }
    OBJECT.to_string()
}

fn merge_references(hierarchy: &dyn Hierarchy, a: &str, b: &str) -> String {
    match (a.strip_prefix('['), b.strip_prefix('[')) {
        (Some(ea), Some(eb)) => match (descriptor::class_of(ea), descriptor::class_of(eb)) {
            (Some(ca), Some(cb)) => format!("[L{};", common_super(hierarchy, ca, cb)),
            _ if ea.starts_with('[') && eb.starts_with('[') => {
                format!("[{}", merge_references(hierarchy, ea, eb))
            }
            _ if is_reference(ea) && is_reference(eb) => format!("[L{OBJECT};"),
            _ => OBJECT.to_string(),
        },
        (None, None) => common_super(hierarchy, a, b),
        _ => OBJECT.to_string(),
    }
}

fn is_reference(field_type: &str) -> bool {
    field_type.starts_with('L') || field_type.starts_with('[')
}

fn merge_type(hierarchy: &dyn Hierarchy, a: &VType, b: &VType) -> VType {
    if a == b {
        return a.clone();
    }
    match (a, b) {
        (VType::Null, VType::Object(_)) => b.clone(),
        (VType::Object(_), VType::Null) => a.clone(),
        (VType::Object(x), VType::Object(y)) => {
            VType::Object(Arc::from(merge_references(hierarchy, x, y)))
        }
        _ => VType::Top,
    }
}

fn merge_frames(hierarchy: &dyn Hierarchy, current: &Frame, incoming: &Frame) -> Result<Frame> {
    if current.stack.len() != incoming.stack.len() {
        return Err(malformed_error!(
            "Inconsistent stack height at merge point: {} vs {}",
            current.stack.len(),
            incoming.stack.len()
        ));
    }

    let len = current.locals.len().max(incoming.locals.len());
    let locals = (0..len)
        .map(|i| {
            let a = current.locals.get(i).unwrap_or(&VType::Top);
            let b = incoming.locals.get(i).unwrap_or(&VType::Top);
            merge_type(hierarchy, a, b)
        })
        .collect();
    let stack = current
        .stack
        .iter()
        .zip(&incoming.stack)
        .map(|(a, b)| merge_type(hierarchy, a, b))
        .collect();
    Ok(Frame { locals, stack })
}

/// The routine a body belongs to.
#[derive(Debug, Clone, Copy)]
pub struct RoutineShape<'a> {
    /// Internal name of the declaring class
    pub owner: &'a str,
    /// Routine name
    pub name: &'a str,
    /// Routine descriptor
    pub descriptor: &'a str,
    /// `ACC_STATIC` is set
    pub is_static: bool,
}

/// Result of [`analyze`].
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Largest operand stack, in slots
    pub max_stack: u16,
    /// Largest local variable index used, plus one
    pub max_locals: u16,
    /// Per instruction: `true` if some path from the entry reaches it
    pub reachable: Vec<bool>,
    /// Per instruction: the merged frame at labels that were reached
    pub states: Vec<Option<Frame>>,
    /// The entry frame
    pub initial: Frame,
}

struct Machine<'a> {
    pool: &'a ConstantPool,
    owner: &'a str,
    new_types: FxHashMap<Label, Arc<str>>,
    new_labels: FxHashMap<usize, Label>,
}

impl Machine<'_> {
    fn step(&self, position: usize, insn: &Insn, frame: &mut Frame) -> Result<()> {
        match insn {
            Insn::Label(_) => {}
            Insn::Simple(op) => self.simple(*op, frame)?,
            Insn::Int { op, value } => match *op {
                BIPUSH | SIPUSH => frame.push(VType::Integer),
                NEWARRAY => {
                    frame.pop(1)?;
                    let element = match value {
                        4 => "Z",
                        5 => "C",
                        6 => "F",
                        7 => "D",
                        8 => "B",
                        9 => "S",
                        10 => "I",
                        11 => "J",
                        _ => return Err(malformed_error!("Invalid newarray type {}", value)),
                    };
                    frame.push(VType::object(&format!("[{element}")));
                }
                _ => return Err(malformed_error!("Invalid int instruction {}", mnemonic(*op))),
            },
            Insn::Var { op, index } => match *op {
                ILOAD => frame.push(VType::Integer),
                LLOAD => frame.push(VType::Long),
                FLOAD => frame.push(VType::Float),
                DLOAD => frame.push(VType::Double),
                ALOAD => frame.push(frame.load(*index)),
                ISTORE | FSTORE | ASTORE => {
                    let value = frame.pop_value()?;
                    let value = match *op {
                        ISTORE => VType::Integer,
                        FSTORE => VType::Float,
                        _ => value,
                    };
                    frame.store(*index, value);
                }
                LSTORE | DSTORE => {
                    frame.pop(2)?;
                    frame.store(
                        *index,
                        if *op == LSTORE {
                            VType::Long
                        } else {
                            VType::Double
                        },
                    );
                }
                RET => {}
                _ => return Err(malformed_error!("Invalid var instruction {}", mnemonic(*op))),
            },
            Insn::Iinc { index, .. } => frame.store(*index, VType::Integer),
            Insn::Jump { op, .. } => match *op {
                IFEQ..=IFLE | IFNULL | IFNONNULL => frame.pop(1)?,
                IF_ICMPEQ..=IF_ACMPNE => frame.pop(2)?,
                GOTO => {}
                JSR => frame.push(VType::Top),
                _ => return Err(malformed_error!("Invalid jump {}", mnemonic(*op))),
            },
            Insn::Ldc { index } => match self.pool.get(*index)? {
                Constant::Integer(_) => frame.push(VType::Integer),
                Constant::Float(_) => frame.push(VType::Float),
                Constant::Long(_) => frame.push(VType::Long),
                Constant::Double(_) => frame.push(VType::Double),
                Constant::String(_) => frame.push(VType::object("java/lang/String")),
                Constant::Class(_) => frame.push(VType::object("java/lang/Class")),
                Constant::MethodType(_) => frame.push(VType::object("java/lang/invoke/MethodType")),
                Constant::MethodHandle { .. } => {
                    frame.push(VType::object("java/lang/invoke/MethodHandle"));
                }
                Constant::Dynamic { name_and_type, .. } => {
                    let (_, descriptor) = self.pool.name_and_type(*name_and_type)?;
                    push_field_type(&mut frame.stack, descriptor);
                }
                other => {
                    return Err(malformed_error!("ldc of non-loadable tag {}", other.tag()))
                }
            },
            Insn::Type { op, index } => {
                let class = self.pool.class_name(*index)?;
                match *op {
                    NEW => {
                        let label = self
                            .new_labels
                            .get(&position)
                            .copied()
                            .ok_or_else(|| malformed_error!("new at {} has no label", position))?;
                        frame.push(VType::Uninitialized(label));
                    }
                    ANEWARRAY => {
                        frame.pop(1)?;
                        let array = if class.starts_with('[') {
                            format!("[{class}")
                        } else {
                            format!("[L{class};")
                        };
                        frame.push(VType::object(&array));
                    }
                    CHECKCAST => {
                        frame.pop(1)?;
                        frame.push(VType::object(class));
                    }
                    INSTANCEOF => {
                        frame.pop(1)?;
                        frame.push(VType::Integer);
                    }
                    _ => return Err(malformed_error!("Invalid type instruction {}", mnemonic(*op))),
                }
            }
            Insn::Field { op, index } => {
                let field = self.pool.member_ref(*index)?;
                let size = usize::from(descriptor::slot_size(field.descriptor));
                match *op {
                    GETSTATIC => push_field_type(&mut frame.stack, field.descriptor),
                    PUTSTATIC => frame.pop(size)?,
                    GETFIELD => {
                        frame.pop(1)?;
                        push_field_type(&mut frame.stack, field.descriptor);
                    }
                    PUTFIELD => frame.pop(size + 1)?,
                    _ => return Err(malformed_error!("Invalid field instruction {}", mnemonic(*op))),
                }
            }
            Insn::Method { op, index } => {
                let method = self.pool.member_ref(*index)?;
                self.invoke(*op, method.name, method.descriptor, frame)?;
            }
            Insn::InvokeInterface { index, .. } => {
                let method = self.pool.member_ref(*index)?;
                self.invoke(INVOKEINTERFACE, method.name, method.descriptor, frame)?;
            }
            Insn::InvokeDynamic { index } => {
                let Constant::InvokeDynamic { name_and_type, .. } = self.pool.get(*index)? else {
                    return Err(malformed_error!("invokedynamic operand {} is not InvokeDynamic", index));
                };
                let (name, descriptor) = self.pool.name_and_type(*name_and_type)?;
                self.invoke(INVOKEDYNAMIC, name, descriptor, frame)?;
            }
            Insn::MultiANewArray { index, dims } => {
                frame.pop(usize::from(*dims))?;
                frame.push(VType::object(self.pool.class_name(*index)?));
            }
            Insn::TableSwitch { .. } | Insn::LookupSwitch { .. } => frame.pop(1)?,
        }
        Ok(())
    }

    fn invoke(&self, op: u8, name: &str, descriptor: &str, frame: &mut Frame) -> Result<()> {
        let parsed = MethodDescriptor::parse(descriptor)?;
        frame.pop(usize::from(parsed.arg_slots()))?;
        if op != INVOKESTATIC && op != INVOKEDYNAMIC {
            let receiver = frame.pop_value()?;
            if op == INVOKESPECIAL && name == "<init>" {
                let initialized = match &receiver {
                    VType::UninitializedThis => Some(VType::object(self.owner)),
                    VType::Uninitialized(label) => self
                        .new_types
                        .get(label)
                        .map(|class| VType::Object(Arc::clone(class))),
                    _ => None,
                };
                if let Some(initialized) = initialized {
                    frame.initialize(&receiver, &initialized);
                }
            }
        }
        push_field_type(&mut frame.stack, parsed.ret);
        Ok(())
    }

    fn simple(&self, op: u8, frame: &mut Frame) -> Result<()> {
        match op {
            NOP => {}
            ACONST_NULL => frame.push(VType::Null),
            ICONST_M1..=ICONST_5 => frame.push(VType::Integer),
            LCONST_0 | LCONST_1 => frame.push(VType::Long),
            FCONST_0..=FCONST_2 => frame.push(VType::Float),
            DCONST_0 | DCONST_1 => frame.push(VType::Double),
            IALOAD..=SALOAD => {
                frame.pop(1)?;
                let array = frame.pop_value()?;
                match op {
                    LALOAD => frame.push(VType::Long),
                    FALOAD => frame.push(VType::Float),
                    DALOAD => frame.push(VType::Double),
                    AALOAD => match array {
                        VType::Object(name) if name.starts_with('[') => {
                            push_field_type(&mut frame.stack, &name[1..]);
                        }
                        VType::Null => frame.push(VType::Null),
                        _ => frame.push(VType::object(OBJECT)),
                    },
                    _ => frame.push(VType::Integer),
                }
            }
            LASTORE | DASTORE => frame.pop(4)?,
            IASTORE..=SASTORE => frame.pop(3)?,
            POP => frame.pop(1)?,
            POP2 => frame.pop(2)?,
            DUP => frame.dup(1, 0)?,
            DUP_X1 => frame.dup(1, 1)?,
            DUP_X2 => frame.dup(1, 2)?,
            DUP2 => frame.dup(2, 0)?,
            DUP2_X1 => frame.dup(2, 1)?,
            DUP2_X2 => frame.dup(2, 2)?,
            SWAP => {
                let a = frame.pop_value()?;
                let b = frame.pop_value()?;
                frame.stack.push(a);
                frame.stack.push(b);
            }
            IADD..=DREM => {
                let (slots, result) = numeric((op - IADD) % 4);
                frame.pop(slots * 2)?;
                frame.push(result);
            }
            INEG..=DNEG => {
                let (slots, result) = numeric(op - INEG);
                frame.pop(slots)?;
                frame.push(result);
            }
            ISHL..=LUSHR => {
                if (op - ISHL) % 2 == 0 {
                    frame.pop(2)?;
                    frame.push(VType::Integer);
                } else {
                    frame.pop(3)?;
                    frame.push(VType::Long);
                }
            }
            IAND..=LXOR => {
                if (op - IAND) % 2 == 0 {
                    frame.pop(2)?;
                    frame.push(VType::Integer);
                } else {
                    frame.pop(4)?;
                    frame.push(VType::Long);
                }
            }
            I2L..=I2S => {
                let (slots, result) = match op {
                    I2L => (1, VType::Long),
                    I2F => (1, VType::Float),
                    I2D => (1, VType::Double),
                    L2I => (2, VType::Integer),
                    L2F => (2, VType::Float),
                    L2D => (2, VType::Double),
                    F2I => (1, VType::Integer),
                    F2L => (1, VType::Long),
                    F2D => (1, VType::Double),
                    D2I => (2, VType::Integer),
                    D2L => (2, VType::Long),
                    D2F => (2, VType::Float),
                    _ => (1, VType::Integer),
                };
                frame.pop(slots)?;
                frame.push(result);
            }
            LCMP | DCMPL | DCMPG => {
                frame.pop(4)?;
                frame.push(VType::Integer);
            }
            FCMPL | FCMPG => {
                frame.pop(2)?;
                frame.push(VType::Integer);
            }
            IRETURN | FRETURN | ARETURN | ATHROW | MONITORENTER | MONITOREXIT => frame.pop(1)?,
            LRETURN | DRETURN => frame.pop(2)?,
            RETURN => {}
            ARRAYLENGTH => {
                frame.pop(1)?;
                frame.push(VType::Integer);
            }
            _ => return Err(malformed_error!("Invalid simple instruction {}", mnemonic(op))),
        }
        Ok(())
    }
}

// Operand slots and result type of the four numeric kinds (int, long, float, double)
fn numeric(kind: u8) -> (usize, VType) {
    match kind {
        0 => (1, VType::Integer),
        1 => (2, VType::Long),
        2 => (1, VType::Float),
        _ => (2, VType::Double),
    }
}

/// Runs the dataflow over one body.
///
/// Every `new` must be directly preceded by a label; the label identifies the uninitialized
/// value it creates. The encoder guarantees this before it calls the analyzer.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] on undefined labels, stack underflow, inconsistent
/// stack heights at merge points, or control flow falling off the end of the code.
pub fn analyze(
    insns: &[Insn],
    handlers: &[Handler],
    pool: &ConstantPool,
    shape: &RoutineShape,
    hierarchy: &dyn Hierarchy,
) -> Result<Analysis> {
    if insns.is_empty() {
        return Err(malformed_error!("Routine body has no instructions"));
    }

    let mut positions: FxHashMap<Label, usize> = FxHashMap::default();
    let mut new_types: FxHashMap<Label, Arc<str>> = FxHashMap::default();
    let mut new_labels: FxHashMap<usize, Label> = FxHashMap::default();
    for (index, insn) in insns.iter().enumerate() {
        match insn {
            Insn::Label(label) => {
                if positions.insert(*label, index).is_some() {
                    return Err(malformed_error!("Label {} placed twice", label));
                }
            }
            Insn::Type { op: NEW, index: class } => {
                let Some(Insn::Label(label)) = index.checked_sub(1).map(|prev| &insns[prev]) else {
                    return Err(malformed_error!("new at {} is not preceded by a label", index));
                };
                new_types.insert(*label, Arc::from(pool.class_name(*class)?));
                new_labels.insert(index, *label);
            }
            _ => {}
        }
    }
    let resolve = |label: Label| {
        positions
            .get(&label)
            .copied()
            .ok_or_else(|| malformed_error!("Undefined label {}", label))
    };

    let mut ranges = Vec::with_capacity(handlers.len());
    for handler in handlers {
        let catch = if handler.catch_type == 0 {
            VType::object(THROWABLE)
        } else {
            VType::object(pool.class_name(handler.catch_type)?)
        };
        ranges.push((
            resolve(handler.start)?,
            resolve(handler.end)?,
            resolve(handler.handler)?,
            catch,
        ));
    }

    let machine = Machine {
        pool,
        owner: shape.owner,
        new_types,
        new_labels,
    };
    let initial = Frame::entry(shape)?;

    let len = insns.len();
    let mut states: Vec<Option<Frame>> = vec![None; len];
    let mut reachable = vec![false; len];
    let mut queued = vec![false; len];
    let mut worklist = vec![0usize];
    states[0] = Some(initial.clone());
    queued[0] = true;

    let mut max_stack = 0usize;
    let mut max_locals = initial.locals.len();

    let merge_at = |states: &mut Vec<Option<Frame>>,
                        worklist: &mut Vec<usize>,
                        queued: &mut Vec<bool>,
                        at: usize,
                        frame: &Frame|
     -> Result<()> {
        let merged = match &states[at] {
            None => frame.clone(),
            Some(existing) => merge_frames(hierarchy, existing, frame)?,
        };
        if states[at].as_ref() != Some(&merged) {
            states[at] = Some(merged);
            if !queued[at] {
                queued[at] = true;
                worklist.push(at);
            }
        }
        Ok(())
    };

    while let Some(start) = worklist.pop() {
        queued[start] = false;
        let Some(mut frame) = states[start].clone() else {
            continue;
        };

        let mut index = start;
        loop {
            if index >= len {
                return Err(malformed_error!("Execution falls off the end of the code"));
            }
            let insn = &insns[index];
            if index != start && matches!(insn, Insn::Label(_)) {
                merge_at(&mut states, &mut worklist, &mut queued, index, &frame)?;
                break;
            }

            reachable[index] = true;
            max_stack = max_stack.max(frame.stack.len());
            for (from, to, target, catch) in &ranges {
                if (*from..*to).contains(&index) {
                    let exceptional = Frame {
                        locals: frame.locals.clone(),
                        stack: vec![catch.clone()],
                    };
                    merge_at(&mut states, &mut worklist, &mut queued, *target, &exceptional)?;
                }
            }

            if let Insn::Jump { op: JSR, target } = insn {
                let mut callee = frame.clone();
                callee.push(VType::Top);
                max_stack = max_stack.max(callee.stack.len());
                merge_at(&mut states, &mut worklist, &mut queued, resolve(*target)?, &callee)?;
            } else {
                machine.step(index, insn, &mut frame)?;
            }
            max_stack = max_stack.max(frame.stack.len());
            max_locals = max_locals.max(frame.locals.len());

            if !matches!(insn, Insn::Jump { op: JSR, .. }) {
                for target in insn.targets() {
                    merge_at(&mut states, &mut worklist, &mut queued, resolve(target)?, &frame)?;
                }
            }
            if insn.ends_block() {
                break;
            }
            index += 1;
        }
    }

    Ok(Analysis {
        max_stack: u16::try_from(max_stack)
            .map_err(|_| malformed_error!("Operand stack of {} slots", max_stack))?,
        max_locals: u16::try_from(max_locals)
            .map_err(|_| malformed_error!("Local variables of {} slots", max_locals))?,
        reachable,
        states,
        initial,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::ClassHierarchy;

    fn shape<'a>(descriptor: &'a str, is_static: bool) -> RoutineShape<'a> {
        RoutineShape {
            owner: "a7",
            name: "run",
            descriptor,
            is_static,
        }
    }

    #[test]
    fn entry_frames() {
        let frame = Frame::entry(&shape("(JI[I)V", false)).unwrap();
        assert_eq!(
            frame.locals,
            vec![
                VType::object("a7"),
                VType::Long,
                VType::Top,
                VType::Integer,
                VType::object("[I")
            ]
        );
        assert_eq!(frame.compact_locals().len(), 4);

        let ctor = RoutineShape {
            name: "<init>",
            ..shape("()V", false)
        };
        assert_eq!(
            Frame::entry(&ctor).unwrap().locals,
            vec![VType::UninitializedThis]
        );
    }

    #[test]
    fn branch_merge() {
        // int f(int x) { long y = x > 0 ? 1 : 2; return x; }
        let pool = ConstantPool::new();
        let (else_, join) = (Label(0), Label(1));
        let insns = vec![
            Insn::Var { op: ILOAD, index: 0 },
            Insn::Jump { op: IFLE, target: else_ },
            Insn::Simple(LCONST_1),
            Insn::Jump { op: GOTO, target: join },
            Insn::Label(else_),
            Insn::Int { op: BIPUSH, value: 2 },
            Insn::Simple(I2L),
            Insn::Label(join),
            Insn::Var { op: LSTORE, index: 1 },
            Insn::Var { op: ILOAD, index: 0 },
            Insn::Simple(IRETURN),
        ];
        let analysis = analyze(
            &insns,
            &[],
            &pool,
            &shape("(I)I", true),
            &ClassHierarchy::default(),
        )
        .unwrap();

        assert_eq!(analysis.max_stack, 2);
        assert_eq!(analysis.max_locals, 3);
        assert!(analysis.reachable.iter().all(|r| *r));
        let at_join = analysis.states[7].as_ref().unwrap();
        assert_eq!(at_join.stack, vec![VType::Long, VType::Top]);
        assert_eq!(at_join.compact_stack(), vec![VType::Long]);
    }

    #[test]
    fn dead_code_and_handlers() {
        let mut pool = ConstantPool::new();
        let npe = pool.add_class("java/lang/NullPointerException").unwrap();
        let (start, end, handler, dead) = (Label(0), Label(1), Label(2), Label(3));
        let insns = vec![
            Insn::Label(start),
            Insn::Simple(ACONST_NULL),
            Insn::Simple(ATHROW),
            Insn::Label(end),
            Insn::Label(handler),
            Insn::Var { op: ASTORE, index: 0 },
            Insn::Simple(RETURN),
            Insn::Label(dead),
            Insn::Simple(NOP),
            Insn::Simple(RETURN),
        ];
        let handlers = [Handler {
            start,
            end,
            handler,
            catch_type: npe,
        }];
        let analysis = analyze(
            &insns,
            &handlers,
            &pool,
            &shape("()V", true),
            &ClassHierarchy::default(),
        )
        .unwrap();

        assert!(analysis.reachable[5]);
        assert!(!analysis.reachable[8]);
        assert_eq!(
            analysis.states[4].as_ref().unwrap().stack,
            vec![VType::object("java/lang/NullPointerException")]
        );
        assert_eq!(analysis.max_locals, 1);
    }

    #[test]
    fn constructor_initializes_this() {
        let mut pool = ConstantPool::new();
        let init = pool
            .add_methodref(OBJECT, "<init>", "()V", false)
            .unwrap();
        let insns = vec![
            Insn::Var { op: ALOAD, index: 0 },
            Insn::Method {
                op: INVOKESPECIAL,
                index: init,
            },
            Insn::Label(Label(0)),
            Insn::Simple(RETURN),
        ];
        let ctor = RoutineShape {
            name: "<init>",
            ..shape("()V", false)
        };
        let analysis =
            analyze(&insns, &[], &pool, &ctor, &ClassHierarchy::default()).unwrap();
        assert_eq!(
            analysis.states[2].as_ref().unwrap().locals,
            vec![VType::object("a7")]
        );
    }

    #[test]
    fn reference_merges() {
        let hierarchy = ClassHierarchy::default();
        assert_eq!(
            common_super(&hierarchy, "java/io/EOFException", "java/lang/IllegalStateException"),
            "java/lang/Exception"
        );
        assert_eq!(common_super(&hierarchy, "a7", "b2"), OBJECT);
        assert_eq!(
            merge_references(&hierarchy, "[Ljava/io/IOException;", "[Ljava/lang/Error;"),
            "[Ljava/lang/Throwable;"
        );
        assert_eq!(merge_references(&hierarchy, "[I", "[J"), OBJECT);
        assert_eq!(
            merge_type(&hierarchy, &VType::Null, &VType::object("a7")),
            VType::object("a7")
        );
        assert_eq!(merge_type(&hierarchy, &VType::Integer, &VType::Float), VType::Top);
    }

    #[test]
    fn stack_underflow_is_an_error() {
        let pool = ConstantPool::new();
        let insns = vec![Insn::Simple(POP), Insn::Simple(RETURN)];
        assert!(analyze(
            &insns,
            &[],
            &pool,
            &shape("()V", true),
            &ClassHierarchy::default()
        )
        .is_err());
    }
}
