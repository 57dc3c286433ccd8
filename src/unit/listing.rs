//! Symbolic listing of code units.
//!
//! The listing is what gets logged when a unit fails to encode, so it resolves every pool
//! operand it can and falls back to the raw `#index` where the pool is inconsistent.

use std::fmt;

use crate::unit::{
    constant::Constant, opcodes::*, Body, Code, CodeUnit, ConstantPool, Insn, RoutineMember,
};

fn constant(pool: &ConstantPool, index: u16) -> String {
    let Ok(entry) = pool.get(index) else {
        return format!("#{index}");
    };
    let rendered = match entry {
        Constant::Integer(value) => Some(value.to_string()),
        Constant::Float(bits) => Some(format!("{}f", f32::from_bits(*bits))),
        Constant::Long(value) => Some(format!("{value}L")),
        Constant::Double(bits) => Some(format!("{}d", f64::from_bits(*bits))),
        Constant::String(_) => pool.string(index).ok().map(|value| format!("{value:?}")),
        Constant::Class(_) => pool.class_name(index).ok().map(str::to_string),
        Constant::Fieldref { .. } => pool
            .member_ref(index)
            .ok()
            .map(|field| format!("{}.{}:{}", field.owner, field.name, field.descriptor)),
        Constant::Methodref { .. } | Constant::InterfaceMethodref { .. } => pool
            .member_ref(index)
            .ok()
            .map(|method| format!("{}.{}{}", method.owner, method.name, method.descriptor)),
        Constant::InvokeDynamic {
            bootstrap,
            name_and_type,
        }
        | Constant::Dynamic {
            bootstrap,
            name_and_type,
        } => pool
            .name_and_type(*name_and_type)
            .ok()
            .map(|(name, descriptor)| format!("bsm{bootstrap}:{name}{descriptor}")),
        Constant::MethodType(descriptor) => pool.utf8(*descriptor).ok().map(str::to_string),
        _ => None,
    };
    rendered.unwrap_or_else(|| format!("#{index}"))
}

fn write_insn(f: &mut fmt::Formatter<'_>, insn: &Insn, pool: &ConstantPool) -> fmt::Result {
    match insn {
        Insn::Label(label) => return writeln!(f, "    {label}:"),
        Insn::Simple(op) => write!(f, "      {}", mnemonic(*op))?,
        Insn::Int { op, value } => write!(f, "      {} {}", mnemonic(*op), value)?,
        Insn::Var { op, index } => write!(f, "      {} {}", mnemonic(*op), index)?,
        Insn::Iinc { index, delta } => write!(f, "      iinc {index} {delta}")?,
        Insn::Jump { op, target } => write!(f, "      {} {}", mnemonic(*op), target)?,
        Insn::Ldc { index } => write!(f, "      ldc {}", constant(pool, *index))?,
        Insn::Type { op, index }
        | Insn::Field { op, index }
        | Insn::Method { op, index } => {
            write!(f, "      {} {}", mnemonic(*op), constant(pool, *index))?;
        }
        Insn::InvokeInterface { index, count } => {
            write!(f, "      invokeinterface {} {}", constant(pool, *index), count)?;
        }
        Insn::InvokeDynamic { index } => {
            write!(f, "      invokedynamic {}", constant(pool, *index))?;
        }
        Insn::MultiANewArray { index, dims } => {
            write!(f, "      multianewarray {} {}", constant(pool, *index), dims)?;
        }
        Insn::TableSwitch {
            default,
            low,
            high,
            targets,
        } => {
            write!(f, "      tableswitch {low}..={high} [")?;
            for (i, target) in targets.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{target}")?;
            }
            write!(f, "] default {default}")?;
        }
        Insn::LookupSwitch { default, pairs } => {
            write!(f, "      lookupswitch [")?;
            for (i, (key, target)) in pairs.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}: {target}")?;
            }
            write!(f, "] default {default}")?;
        }
    }
    writeln!(f)
}

fn write_code(f: &mut fmt::Formatter<'_>, code: &Code, pool: &ConstantPool) -> fmt::Result {
    writeln!(
        f,
        "    max_stack {} max_locals {}",
        code.max_stack, code.max_locals
    )?;
    for insn in &code.insns {
        write_insn(f, insn, pool)?;
    }
    for handler in &code.handlers {
        let catch = if handler.catch_type == 0 {
            "any".to_string()
        } else {
            constant(pool, handler.catch_type)
        };
        writeln!(
            f,
            "    try {}..{} catch {} -> {}",
            handler.start, handler.end, catch, handler.handler
        )?;
    }
    for line in &code.lines {
        writeln!(f, "    line {} at {}", line.line, line.start)?;
    }
    for (label, frame) in &code.frames {
        let locals: Vec<String> = frame.compact_locals().iter().map(ToString::to_string).collect();
        let stack: Vec<String> = frame.compact_stack().iter().map(ToString::to_string).collect();
        writeln!(
            f,
            "    frame {} locals [{}] stack [{}]",
            label,
            locals.join(", "),
            stack.join(", ")
        )?;
    }
    Ok(())
}

fn write_routine(f: &mut fmt::Formatter<'_>, routine: &RoutineMember, pool: &ConstantPool) -> fmt::Result {
    write!(
        f,
        "  routine {}{} [0x{:04X}]",
        routine.name,
        routine.descriptor,
        routine.access.bits()
    )?;
    match &routine.body {
        None => writeln!(f, " no body"),
        Some(Body::Raw(raw)) => writeln!(f, " raw body, {} bytes", raw.data.len()),
        Some(Body::Code(code)) => {
            writeln!(f)?;
            write_code(f, code, pool)
        }
    }
}

impl fmt::Display for CodeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit {}", self.name())?;
        if let Some(super_name) = self.super_name() {
            write!(f, " extends {super_name}")?;
        }
        if let Ok(interfaces) = self.interface_names() {
            if !interfaces.is_empty() {
                write!(f, " implements {}", interfaces.join(", "))?;
            }
        }
        writeln!(
            f,
            " [0x{:04X}, version {}.{}, {}]",
            self.access.bits(),
            self.major_version,
            self.minor_version,
            self.mode()
        )?;
        for field in &self.fields {
            writeln!(
                f,
                "  field {} {} [0x{:04X}]",
                field.name,
                field.descriptor,
                field.access.bits()
            )?;
        }
        for routine in &self.routines {
            write_routine(f, routine, &self.pool)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::unit::{opcodes::*, AccessFlags, UnitBuilder};

    #[test]
    fn renders_resolved_operands() {
        let unit = UnitBuilder::new("a7")
            .field(AccessFlags::PRIVATE, "b", "I")
            .routine(AccessFlags::PUBLIC, "run", "()V", |code| {
                let done = code.label();
                code.var(ALOAD, 0)
                    .field(GETFIELD, "a7", "b", "I")
                    .jump(IFEQ, done)
                    .ldc_string("hi")
                    .invoke(INVOKESTATIC, "a7", "log", "(Ljava/lang/String;)V")
                    .place(done)
                    .op(RETURN);
            })
            .build()
            .unwrap();

        let listing = unit.to_string();
        assert!(listing.starts_with("unit a7 extends java/lang/Object"));
        assert!(listing.contains("field b I"));
        assert!(listing.contains("getfield a7.b:I"));
        assert!(listing.contains("ifeq L0"));
        assert!(listing.contains("ldc \"hi\""));
        assert!(listing.contains("invokestatic a7.log(Ljava/lang/String;)V"));
        assert!(listing.contains("    L0:"));
    }
}
