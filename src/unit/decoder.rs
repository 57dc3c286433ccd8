//! Parsing of class-file bytes into [`CodeUnit`]s.
//!
//! Bodies are decoded in two passes. The first pass reads instructions and records every
//! branch target as a placeholder label carrying the absolute bytecode offset. The second pass
//! collects every offset anything refers to (branch targets, handler ranges, line and local
//! tables, stack map frames), validates that each one falls on an instruction boundary, and
//! numbers them in offset order. Placeholders are then replaced by the final labels.

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    file::Parser,
    unit::{
        attribute::{
            Attribute, CODE, LINE_NUMBER_TABLE, LOCAL_VARIABLE_TABLE, LOCAL_VARIABLE_TYPE_TABLE,
            SOURCE_DEBUG_EXTENSION, STACK_MAP_TABLE,
        },
        frames::{Frame, RoutineShape, VType},
        opcodes::*,
        stackmap, AccessFlags, Body, Code, CodeUnit, ConstantPool, DecodeMode, FieldMember,
        Handler, Insn, Label, LineEntry, LocalVar, RawCode, RoutineMember, SymbolPool, MAGIC,
        MAX_MAJOR_VERSION, MIN_MAJOR_VERSION,
    },
    Error, Result,
};

/// Decodes class-file bytes into a [`CodeUnit`].
///
/// `SourceDebugExtension` attributes are dropped. Every UTF-8 constant is interned in
/// `symbols`.
///
/// # Errors
/// Returns [`Error::Empty`] for empty input, [`Error::OutOfBounds`] on truncation and
/// [`Error::Malformed`] for anything that is not a well-formed class file of a supported
/// version.
pub fn decode(bytes: &[u8], mode: DecodeMode, symbols: &SymbolPool) -> Result<CodeUnit> {
    if bytes.is_empty() {
        return Err(Error::Empty);
    }

    let mut parser = Parser::new(bytes);
    let magic = parser.read_be::<u32>()?;
    if magic != MAGIC {
        return Err(malformed_error!("Invalid magic 0x{:08X}", magic));
    }
    let minor_version = parser.read_be::<u16>()?;
    let major_version = parser.read_be::<u16>()?;
    if !(MIN_MAJOR_VERSION..=MAX_MAJOR_VERSION).contains(&major_version) {
        return Err(malformed_error!("Unsupported class version {}", major_version));
    }

    let pool = ConstantPool::parse(&mut parser, symbols)?;
    let access = AccessFlags::from_bits_retain(parser.read_be::<u16>()?);
    let this_class = parser.read_be::<u16>()?;
    let name = class_arc(&pool, this_class)?;
    let super_class = parser.read_be::<u16>()?;
    let super_name = match super_class {
        0 => None,
        index => Some(class_arc(&pool, index)?),
    };

    let interface_count = parser.read_be::<u16>()?;
    let mut interfaces = Vec::with_capacity(usize::from(interface_count));
    for _ in 0..interface_count {
        let index = parser.read_be::<u16>()?;
        pool.class_name(index)?;
        interfaces.push(index);
    }

    let field_count = parser.read_be::<u16>()?;
    let mut fields = Vec::with_capacity(usize::from(field_count));
    for _ in 0..field_count {
        let access = AccessFlags::from_bits_retain(parser.read_be::<u16>()?);
        let name_index = parser.read_be::<u16>()?;
        let descriptor_index = parser.read_be::<u16>()?;
        fields.push(FieldMember {
            access,
            name: pool.utf8_arc(name_index)?,
            descriptor: pool.utf8_arc(descriptor_index)?,
            name_index,
            descriptor_index,
            attributes: parse_attributes(&mut parser, &pool)?,
        });
    }

    let routine_count = parser.read_be::<u16>()?;
    let mut routines = Vec::with_capacity(usize::from(routine_count));
    for _ in 0..routine_count {
        routines.push(parse_routine(&mut parser, &pool, &name, mode)?);
    }

    let attributes = parse_attributes(&mut parser, &pool)?;
    if parser.has_more_data() {
        return Err(malformed_error!(
            "{} trailing bytes after class attributes",
            parser.remaining()
        ));
    }

    Ok(CodeUnit {
        minor_version,
        major_version,
        pool,
        access,
        interfaces,
        fields,
        routines,
        attributes,
        name,
        this_class,
        super_name,
        super_class,
        mode,
    })
}

fn class_arc(pool: &ConstantPool, index: u16) -> Result<Arc<str>> {
    match pool.get(index)? {
        crate::unit::Constant::Class(name) => pool.utf8_arc(*name),
        other => Err(malformed_error!(
            "Expected Class at pool index {}, found tag {}",
            index,
            other.tag()
        )),
    }
}

fn parse_attributes(parser: &mut Parser, pool: &ConstantPool) -> Result<Vec<Attribute>> {
    let count = parser.read_be::<u16>()?;
    let mut attributes = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let attribute = Attribute::parse(parser, pool)?;
        if attribute.name(pool)? != SOURCE_DEBUG_EXTENSION {
            attributes.push(attribute);
        }
    }
    Ok(attributes)
}

fn parse_routine(
    parser: &mut Parser,
    pool: &ConstantPool,
    owner: &str,
    mode: DecodeMode,
) -> Result<RoutineMember> {
    let access = AccessFlags::from_bits_retain(parser.read_be::<u16>()?);
    let name_index = parser.read_be::<u16>()?;
    let descriptor_index = parser.read_be::<u16>()?;
    let name = pool.utf8_arc(name_index)?;
    let descriptor = pool.utf8_arc(descriptor_index)?;

    let count = parser.read_be::<u16>()?;
    let mut attributes = Vec::with_capacity(usize::from(count));
    let mut body = None;
    let mut body_position = 0;
    for _ in 0..count {
        let start = parser.pos();
        let attribute_name = parser.read_be::<u16>()?;
        if pool.utf8(attribute_name)? != CODE {
            parser.seek(start)?;
            let attribute = Attribute::parse(parser, pool)?;
            if attribute.name(pool)? != SOURCE_DEBUG_EXTENSION {
                attributes.push(attribute);
            }
            continue;
        }

        if body.is_some() {
            return Err(malformed_error!("Routine {}{} has two Code attributes", name, descriptor));
        }
        let length = parser.read_be::<u32>()? as usize;
        let data = parser.read_bytes(length)?;
        body_position = attributes.len();
        body = Some(match mode {
            DecodeMode::Minimal => Body::Raw(RawCode {
                attribute_name,
                data: data.to_vec(),
            }),
            DecodeMode::Full => {
                let shape = RoutineShape {
                    owner,
                    name: &name,
                    descriptor: &descriptor,
                    is_static: access.contains(AccessFlags::STATIC),
                };
                Body::Code(decode_code(data, attribute_name, pool, &shape)?)
            }
        });
    }

    Ok(RoutineMember {
        access,
        name,
        descriptor,
        name_index,
        descriptor_index,
        attributes,
        body,
        body_position,
    })
}

fn branch(offset: usize, delta: i64, code_length: usize) -> Result<Label> {
    let target = offset as i64 + delta;
    if target < 0 || target >= code_length as i64 {
        return Err(malformed_error!(
            "Branch at {} targets {} outside the code",
            offset,
            target
        ));
    }
    Ok(Label(target as u32))
}

// First pass: instructions with labels holding absolute offsets, plus each instruction's offset
fn decode_insns(code: &[u8]) -> Result<(Vec<Insn>, Vec<u32>)> {
    let length = code.len();
    let mut parser = Parser::new(code);
    let mut insns = Vec::with_capacity(length / 2);
    let mut starts = Vec::with_capacity(length / 2);

    while parser.has_more_data() {
        let offset = parser.pos();
        let op = parser.read_be::<u8>()?;
        let insn = match op {
            NOP..=DCONST_1
            | IALOAD..=SALOAD
            | IASTORE..=LXOR
            | I2L..=DCMPG
            | IRETURN..=RETURN
            | ARRAYLENGTH
            | ATHROW
            | MONITORENTER
            | MONITOREXIT => Insn::Simple(op),
            BIPUSH => Insn::Int {
                op,
                value: i32::from(parser.read_be::<i8>()?),
            },
            SIPUSH => Insn::Int {
                op,
                value: i32::from(parser.read_be::<i16>()?),
            },
            NEWARRAY => Insn::Int {
                op,
                value: i32::from(parser.read_be::<u8>()?),
            },
            LDC => Insn::Ldc {
                index: u16::from(parser.read_be::<u8>()?),
            },
            LDC_W | LDC2_W => Insn::Ldc {
                index: parser.read_be::<u16>()?,
            },
            ILOAD..=ALOAD | ISTORE..=ASTORE | RET => Insn::Var {
                op,
                index: u16::from(parser.read_be::<u8>()?),
            },
            ILOAD_0..=ALOAD_3 | ISTORE_0..=ASTORE_3 => match split_shorthand(op) {
                Some((op, index)) => Insn::Var { op, index },
                None => return Err(malformed_error!("Invalid shorthand opcode {}", op)),
            },
            IINC => Insn::Iinc {
                index: u16::from(parser.read_be::<u8>()?),
                delta: i16::from(parser.read_be::<i8>()?),
            },
            IFEQ..=JSR | IFNULL | IFNONNULL => Insn::Jump {
                op,
                target: branch(offset, i64::from(parser.read_be::<i16>()?), length)?,
            },
            GOTO_W | JSR_W => Insn::Jump {
                op: if op == GOTO_W { GOTO } else { JSR },
                target: branch(offset, i64::from(parser.read_be::<i32>()?), length)?,
            },
            TABLESWITCH => {
                parser.advance_by(3 - offset % 4)?;
                let default = branch(offset, i64::from(parser.read_be::<i32>()?), length)?;
                let low = parser.read_be::<i32>()?;
                let high = parser.read_be::<i32>()?;
                if high < low {
                    return Err(malformed_error!("tableswitch at {} has high < low", offset));
                }
                let count = (i64::from(high) - i64::from(low) + 1) as usize;
                if count > parser.remaining() / 4 {
                    return Err(malformed_error!("tableswitch at {} overruns the code", offset));
                }
                let mut targets = Vec::with_capacity(count);
                for _ in 0..count {
                    targets.push(branch(offset, i64::from(parser.read_be::<i32>()?), length)?);
                }
                Insn::TableSwitch {
                    default,
                    low,
                    high,
                    targets,
                }
            }
            LOOKUPSWITCH => {
                parser.advance_by(3 - offset % 4)?;
                let default = branch(offset, i64::from(parser.read_be::<i32>()?), length)?;
                let count = usize::try_from(parser.read_be::<i32>()?)
                    .map_err(|_| malformed_error!("lookupswitch at {} has negative count", offset))?;
                if count > parser.remaining() / 8 {
                    return Err(malformed_error!("lookupswitch at {} overruns the code", offset));
                }
                let mut pairs = Vec::with_capacity(count);
                for _ in 0..count {
                    let key = parser.read_be::<i32>()?;
                    pairs.push((
                        key,
                        branch(offset, i64::from(parser.read_be::<i32>()?), length)?,
                    ));
                }
                Insn::LookupSwitch { default, pairs }
            }
            GETSTATIC..=PUTFIELD => Insn::Field {
                op,
                index: parser.read_be::<u16>()?,
            },
            INVOKEVIRTUAL..=INVOKESTATIC => Insn::Method {
                op,
                index: parser.read_be::<u16>()?,
            },
            INVOKEINTERFACE => {
                let index = parser.read_be::<u16>()?;
                let count = parser.read_be::<u8>()?;
                parser.advance_by(1)?;
                Insn::InvokeInterface { index, count }
            }
            INVOKEDYNAMIC => {
                let index = parser.read_be::<u16>()?;
                parser.advance_by(2)?;
                Insn::InvokeDynamic { index }
            }
            NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => Insn::Type {
                op,
                index: parser.read_be::<u16>()?,
            },
            WIDE => {
                let widened = parser.read_be::<u8>()?;
                match widened {
                    IINC => Insn::Iinc {
                        index: parser.read_be::<u16>()?,
                        delta: parser.read_be::<i16>()?,
                    },
                    ILOAD..=ALOAD | ISTORE..=ASTORE | RET => Insn::Var {
                        op: widened,
                        index: parser.read_be::<u16>()?,
                    },
                    _ => {
                        return Err(malformed_error!(
                            "wide applied to {} at {}",
                            mnemonic(widened),
                            offset
                        ))
                    }
                }
            }
            MULTIANEWARRAY => Insn::MultiANewArray {
                index: parser.read_be::<u16>()?,
                dims: parser.read_be::<u8>()?,
            },
            _ => return Err(malformed_error!("Unknown opcode {} at {}", op, offset)),
        };
        starts.push(offset as u32);
        insns.push(insn);
    }

    Ok((insns, starts))
}

fn relabel_frame(frame: &mut Frame, labels: &BTreeMap<u32, Label>) -> Result<()> {
    for slot in frame.locals.iter_mut().chain(frame.stack.iter_mut()) {
        if let VType::Uninitialized(label) = slot {
            *label = *labels
                .get(&label.0)
                .ok_or_else(|| malformed_error!("Uninitialized type refers to offset {}", label.0))?;
        }
    }
    Ok(())
}

fn decode_code(
    data: &[u8],
    attribute_name: u16,
    pool: &ConstantPool,
    shape: &RoutineShape,
) -> Result<Code> {
    let mut parser = Parser::new(data);
    let max_stack = parser.read_be::<u16>()?;
    let max_locals = parser.read_be::<u16>()?;
    let code_length = parser.read_be::<u32>()? as usize;
    if code_length == 0 || code_length > usize::from(u16::MAX) {
        return Err(malformed_error!("Code length {} outside 1..=65535", code_length));
    }
    let (insns, starts) = decode_insns(parser.read_bytes(code_length)?)?;

    let mut boundary = vec![false; code_length + 1];
    for start in &starts {
        boundary[*start as usize] = true;
    }
    boundary[code_length] = true;
    let is_start = |offset: u32| (offset as usize) < code_length && boundary[offset as usize];
    let is_end = |offset: u32| (offset as usize) <= code_length && boundary[offset as usize];

    let mut needed: BTreeMap<u32, Label> = BTreeMap::new();
    for insn in &insns {
        for target in insn.targets() {
            if !is_start(target.0) {
                return Err(malformed_error!("Branch into the middle of an instruction at {}", target.0));
            }
            needed.insert(target.0, target);
        }
    }

    let handler_count = parser.read_be::<u16>()?;
    let mut raw_handlers = Vec::with_capacity(usize::from(handler_count));
    for _ in 0..handler_count {
        let start = u32::from(parser.read_be::<u16>()?);
        let end = u32::from(parser.read_be::<u16>()?);
        let handler = u32::from(parser.read_be::<u16>()?);
        let catch_type = parser.read_be::<u16>()?;
        if start >= end || !is_start(start) || !is_end(end) || !is_start(handler) {
            return Err(malformed_error!(
                "Invalid exception handler {}..{} -> {}",
                start,
                end,
                handler
            ));
        }
        for offset in [start, end, handler] {
            needed.insert(offset, Label(offset));
        }
        raw_handlers.push((start, end, handler, catch_type));
    }

    let mut raw_lines = Vec::new();
    let mut raw_locals = Vec::new();
    let mut raw_frames = Vec::new();
    let attribute_count = parser.read_be::<u16>()?;
    for _ in 0..attribute_count {
        let name = pool.utf8(parser.read_be::<u16>()?)?;
        let length = parser.read_be::<u32>()? as usize;
        let mut nested = Parser::new(parser.read_bytes(length)?);
        match name {
            LINE_NUMBER_TABLE => {
                for _ in 0..nested.read_be::<u16>()? {
                    let start = u32::from(nested.read_be::<u16>()?);
                    let line = nested.read_be::<u16>()?;
                    if is_start(start) {
                        needed.insert(start, Label(start));
                        raw_lines.push((start, line));
                    }
                }
            }
            LOCAL_VARIABLE_TABLE | LOCAL_VARIABLE_TYPE_TABLE => {
                let generic = name == LOCAL_VARIABLE_TYPE_TABLE;
                for _ in 0..nested.read_be::<u16>()? {
                    let start = u32::from(nested.read_be::<u16>()?);
                    let end = start + u32::from(nested.read_be::<u16>()?);
                    let name = nested.read_be::<u16>()?;
                    let descriptor = nested.read_be::<u16>()?;
                    let index = nested.read_be::<u16>()?;
                    if is_start(start) && is_end(end) {
                        needed.insert(start, Label(start));
                        needed.insert(end, Label(end));
                        raw_locals.push((start, end, name, descriptor, index, generic));
                    }
                }
            }
            STACK_MAP_TABLE => {
                let initial = Frame::entry(shape)?;
                for (offset, frame) in stackmap::parse(nested.data(), pool, &initial)? {
                    if !is_start(offset) {
                        return Err(malformed_error!("Stack map frame at non-boundary {}", offset));
                    }
                    for slot in frame.locals.iter().chain(frame.stack.iter()) {
                        if let VType::Uninitialized(label) = slot {
                            if !is_start(label.0) {
                                return Err(malformed_error!(
                                    "Uninitialized type at non-boundary {}",
                                    label.0
                                ));
                            }
                            needed.insert(label.0, *label);
                        }
                    }
                    needed.insert(offset, Label(offset));
                    raw_frames.push((offset, frame));
                }
            }
            _ => {}
        }
    }

    for (number, label) in needed.values_mut().enumerate() {
        *label = Label(number as u32);
    }
    let label_at = |offset: u32| -> Result<Label> {
        needed
            .get(&offset)
            .copied()
            .ok_or_else(|| malformed_error!("No label at offset {}", offset))
    };

    let mut code = Code::new();
    code.attribute_name = attribute_name;
    code.max_stack = max_stack;
    code.max_locals = max_locals;
    code.insns.reserve(insns.len() + needed.len());
    for (mut insn, start) in insns.into_iter().zip(starts) {
        if let Some(label) = needed.get(&start) {
            code.insns.push(Insn::Label(*label));
        }
        let mut missing = None;
        insn.map_labels(|placeholder| match needed.get(&placeholder.0) {
            Some(label) => *label,
            None => {
                missing = Some(placeholder.0);
                placeholder
            }
        });
        if let Some(offset) = missing {
            return Err(malformed_error!("No label at offset {}", offset));
        }
        code.insns.push(insn);
    }
    if let Some(label) = needed.get(&(code_length as u32)) {
        code.insns.push(Insn::Label(*label));
    }

    for (start, end, handler, catch_type) in raw_handlers {
        code.handlers.push(Handler {
            start: label_at(start)?,
            end: label_at(end)?,
            handler: label_at(handler)?,
            catch_type,
        });
    }
    for (start, line) in raw_lines {
        code.lines.push(LineEntry {
            start: label_at(start)?,
            line,
        });
    }
    for (start, end, name, descriptor, index, generic) in raw_locals {
        code.locals.push(LocalVar {
            start: label_at(start)?,
            end: label_at(end)?,
            name,
            descriptor,
            index,
            generic,
        });
    }
    for (offset, mut frame) in raw_frames {
        relabel_frame(&mut frame, &needed)?;
        code.frames.push((label_at(offset)?, frame));
    }

    code.reserve_labels(needed.len() as u32);
    Ok(code)
}
