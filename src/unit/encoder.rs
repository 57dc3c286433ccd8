//! Serialization of [`CodeUnit`]s back into class-file bytes.
//!
//! Raw bodies and opaque attributes are copied verbatim and the constant pool is written
//! index-for-index, so a minimally decoded unit that nobody touched comes out byte-identical.
//! Decoded bodies are laid out from scratch:
//!
//! 1. a label is placed in front of every `new` (uninitialized types refer to it),
//! 2. branch offsets are resolved, widening `goto`/`jsr` to `goto_w`/`jsr_w` and rewriting
//!    conditional branches that overflow 16 bits into an inverted branch around a `goto_w`,
//!    repeated until the layout is stable,
//! 3. the dataflow of [`crate::unit::frames::analyze`] yields `max_stack`, `max_locals`,
//!    reachability and the frames at branch targets,
//! 4. unreachable byte ranges are overwritten with `nop ... athrow` so that they verify
//!    against a trivial frame, and are cut out of the exception table.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    file::{Parser, Writer},
    unit::{
        attribute::{
            is_stripped, parse_table, write_count, Attribute, CODE, LINE_NUMBER_TABLE, LOCAL_VARIABLE_TABLE,
            LOCAL_VARIABLE_TYPE_TABLE, STACK_MAP_TABLE,
        },
        descriptor,
        frames::{analyze, Frame, Hierarchy, VType, THROWABLE},
        opcodes::*,
        stackmap, Body, Code, CodeUnit, ConstantPool, Insn, Label, RawCode, RoutineMember,
        MAGIC, STACK_MAP_VERSION,
    },
    Error, Result,
};

/// Settings for [`encode`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Drop `SourceFile`, line number and local variable tables
    pub strip_debug: bool,
    /// Drop runtime annotation attributes
    pub strip_annotations: bool,
}

impl EncodeOptions {
    /// Returns `true` if any stripping is enabled.
    #[must_use]
    pub fn strips(&self) -> bool {
        self.strip_debug || self.strip_annotations
    }
}

/// Encodes a unit into class-file bytes.
///
/// # Errors
/// Returns [`Error::Encode`] carrying the symbolic listing of the unit if any part of it
/// cannot be encoded. The listing is also logged at error level.
pub fn encode(unit: &CodeUnit, options: &EncodeOptions, hierarchy: &dyn Hierarchy) -> Result<Vec<u8>> {
    encode_unit(unit, options, hierarchy).map_err(|error| {
        let listing = unit.to_string();
        log::error!("Failed to encode '{}': {}\n{}", unit.name(), error, listing);
        Error::Encode {
            unit: unit.name().to_string(),
            message: error.to_string(),
            listing,
        }
    })
}

fn encode_unit(unit: &CodeUnit, options: &EncodeOptions, hierarchy: &dyn Hierarchy) -> Result<Vec<u8>> {
    let mut pool = unit.pool.clone();
    let mut body = Writer::with_capacity(4096);

    let (this_index, super_index) = unit.header_indices();
    let this_class = pool.class_or_add(this_index, unit.name())?;
    let super_class = match unit.super_name() {
        Some(name) => pool.class_or_add(super_index, name)?,
        None => 0,
    };
    body.write_be(unit.access.bits());
    body.write_be(this_class);
    body.write_be(super_class);

    write_count(&mut body, unit.interfaces.len())?;
    for interface in &unit.interfaces {
        body.write_be(*interface);
    }

    write_count(&mut body, unit.fields.len())?;
    for field in &unit.fields {
        body.write_be(field.access.bits());
        body.write_be(pool.utf8_or_add(field.name_index, &field.name)?);
        body.write_be(pool.utf8_or_add(field.descriptor_index, &field.descriptor)?);
        write_attributes(&mut body, &field.attributes, &pool, options)?;
    }

    write_count(&mut body, unit.routines.len())?;
    for routine in &unit.routines {
        write_routine(&mut body, unit, routine, &mut pool, options, hierarchy).map_err(|error| {
            Error::Error(format!("{}{}: {}", routine.name, routine.descriptor, error))
        })?;
    }

    write_attributes(&mut body, &unit.attributes, &pool, options)?;

    let mut out = Writer::with_capacity(body.len() + pool.len() * 8 + 10);
    out.write_be(MAGIC);
    out.write_be(unit.minor_version);
    out.write_be(unit.major_version);
    pool.write(&mut out)?;
    out.write_bytes(body.as_slice());
    Ok(out.into_inner())
}

fn write_attributes(
    writer: &mut Writer,
    attributes: &[Attribute],
    pool: &ConstantPool,
    options: &EncodeOptions,
) -> Result<()> {
    let mut kept = Vec::with_capacity(attributes.len());
    for attribute in attributes {
        if !is_stripped(attribute, pool, options.strip_debug, options.strip_annotations)? {
            kept.push(attribute);
        }
    }
    write_count(writer, kept.len())?;
    for attribute in kept {
        attribute.write(writer)?;
    }
    Ok(())
}

fn write_routine(
    writer: &mut Writer,
    unit: &CodeUnit,
    routine: &RoutineMember,
    pool: &mut ConstantPool,
    options: &EncodeOptions,
    hierarchy: &dyn Hierarchy,
) -> Result<()> {
    writer.write_be(routine.access.bits());
    writer.write_be(pool.utf8_or_add(routine.name_index, &routine.name)?);
    writer.write_be(pool.utf8_or_add(routine.descriptor_index, &routine.descriptor)?);

    let code = match &routine.body {
        None => None,
        Some(Body::Raw(raw)) => Some((raw.attribute_name, encode_raw(raw, pool, options)?)),
        Some(Body::Code(code)) => {
            let name = pool.utf8_or_add(code.attribute_name, CODE)?;
            let payload = encode_code(code, unit, routine, pool, options, hierarchy)?;
            Some((name, payload))
        }
    };

    let mut kept = Vec::with_capacity(routine.attributes.len());
    let mut code_at = 0;
    for (position, attribute) in routine.attributes.iter().enumerate() {
        if is_stripped(attribute, pool, options.strip_debug, options.strip_annotations)? {
            continue;
        }
        if position < routine.body_position {
            code_at += 1;
        }
        kept.push(attribute);
    }

    write_count(writer, kept.len() + usize::from(code.is_some()))?;
    for attribute in &kept[..code_at] {
        attribute.write(writer)?;
    }
    if let Some((name, payload)) = &code {
        writer.write_be(*name);
        writer.write_be(
            u32::try_from(payload.len())
                .map_err(|_| malformed_error!("Code attribute of {} bytes", payload.len()))?,
        );
        writer.write_bytes(payload);
    }
    for attribute in &kept[code_at..] {
        attribute.write(writer)?;
    }
    Ok(())
}

// Raw bodies pass through verbatim unless stripping removes nested attributes
fn encode_raw(raw: &RawCode, pool: &ConstantPool, options: &EncodeOptions) -> Result<Vec<u8>> {
    if !options.strips() {
        return Ok(raw.data.clone());
    }

    let mut parser = Parser::new(&raw.data);
    parser.advance_by(4)?;
    let code_length = parser.read_be::<u32>()? as usize;
    parser.advance_by(code_length)?;
    let handlers = usize::from(parser.read_be::<u16>()?);
    parser.advance_by(handlers * 8)?;
    let prefix_end = parser.pos();

    let nested = parse_table(&mut parser, pool)?;
    let mut writer = Writer::with_capacity(raw.data.len());
    writer.write_bytes(&raw.data[..prefix_end]);
    write_attributes(&mut writer, &nested, pool, options)?;
    Ok(writer.into_inner())
}

/// Byte layout of an instruction list.
struct Layout {
    /// Offset of every instruction, plus the code length as last element
    offsets: Vec<u32>,
    /// Position of every label
    positions: FxHashMap<Label, usize>,
}

impl Layout {
    fn offset_of(&self, label: Label) -> Result<u32> {
        self.positions
            .get(&label)
            .map(|position| self.offsets[*position])
            .ok_or_else(|| malformed_error!("Undefined label {}", label))
    }

    fn code_length(&self) -> u32 {
        self.offsets.last().copied().unwrap_or(0)
    }
}

fn lay_out(insns: &[Insn], wide: &[bool], pool: &ConstantPool) -> Result<Layout> {
    let mut offsets = Vec::with_capacity(insns.len() + 1);
    let mut positions = FxHashMap::default();
    let mut offset = 0u32;
    for (position, insn) in insns.iter().enumerate() {
        if let Insn::Label(label) = insn {
            if positions.insert(*label, position).is_some() {
                return Err(malformed_error!("Label {} placed twice", label));
            }
        }
        offsets.push(offset);
        offset += insn_size(insn, offset, wide[position], pool)?;
        if offset > u32::from(u16::MAX) + 1024 {
            return Err(malformed_error!("Code exceeds 65535 bytes"));
        }
    }
    offsets.push(offset);
    Ok(Layout { offsets, positions })
}

fn switch_padding(offset: u32) -> u32 {
    3 - offset % 4
}

fn insn_size(insn: &Insn, offset: u32, wide: bool, pool: &ConstantPool) -> Result<u32> {
    Ok(match insn {
        Insn::Label(_) => 0,
        Insn::Simple(_) => 1,
        Insn::Int { op, .. } => match *op {
            SIPUSH => 3,
            _ => 2,
        },
        Insn::Var { op, index } => {
            if *op != RET && shorthand(*op, *index).is_some() {
                1
            } else if *index < 256 {
                2
            } else {
                4
            }
        }
        Insn::Iinc { index, delta } => {
            if *index < 256 && i8::try_from(*delta).is_ok() {
                3
            } else {
                6
            }
        }
        Insn::Jump { .. } => {
            if wide {
                5
            } else {
                3
            }
        }
        Insn::Ldc { index } => {
            if pool.get(*index)?.is_wide() || *index >= 256 {
                3
            } else {
                2
            }
        }
        Insn::Type { .. } | Insn::Field { .. } | Insn::Method { .. } => 3,
        Insn::InvokeInterface { .. } | Insn::InvokeDynamic { .. } => 5,
        Insn::MultiANewArray { .. } => 4,
        Insn::TableSwitch { targets, .. } => {
            1 + switch_padding(offset) + 12 + 4 * targets.len() as u32
        }
        Insn::LookupSwitch { pairs, .. } => 1 + switch_padding(offset) + 8 + 8 * pairs.len() as u32,
    })
}

fn is_short_branch(from: u32, to: u32) -> bool {
    i16::try_from(i64::from(to) - i64::from(from)).is_ok()
}

// Places a label in front of every `new`, which is how uninitialized types name their origin
fn label_allocations(insns: Vec<Insn>, next_label: &mut u32) -> Vec<Insn> {
    let mut out = Vec::with_capacity(insns.len() + 8);
    for insn in insns {
        if matches!(insn, Insn::Type { op: NEW, .. }) && !matches!(out.last(), Some(Insn::Label(_))) {
            out.push(Insn::Label(Label(*next_label)));
            *next_label += 1;
        }
        out.push(insn);
    }
    out
}

fn first_free_label(code: &Code) -> u32 {
    let mut next = code.label_watermark();
    let mut bump = |label: Label| next = next.max(label.0 + 1);
    for insn in &code.insns {
        if let Insn::Label(label) = insn {
            bump(*label);
        }
        for target in insn.targets() {
            bump(target);
        }
    }
    for handler in &code.handlers {
        bump(handler.start);
        bump(handler.end);
        bump(handler.handler);
    }
    for line in &code.lines {
        bump(line.start);
    }
    for local in &code.locals {
        bump(local.start);
        bump(local.end);
    }
    next
}

// Widens branches until every offset fits its encoding
fn stabilize(
    mut insns: Vec<Insn>,
    next_label: &mut u32,
    pool: &ConstantPool,
) -> Result<(Vec<Insn>, Vec<bool>, Layout)> {
    let mut wide = vec![false; insns.len()];
    loop {
        let layout = lay_out(&insns, &wide, pool)?;
        let mut changed = false;
        let mut rewritten = Vec::with_capacity(insns.len());
        let mut rewritten_wide = Vec::with_capacity(insns.len());

        for (position, insn) in insns.into_iter().enumerate() {
            let Insn::Jump { op, target } = insn else {
                rewritten.push(insn);
                rewritten_wide.push(wide[position]);
                continue;
            };
            if wide[position]
                || is_short_branch(layout.offsets[position], layout.offset_of(target)?)
            {
                rewritten.push(insn);
                rewritten_wide.push(wide[position]);
                continue;
            }

            changed = true;
            match invert_jump(op) {
                None => {
                    rewritten.push(insn);
                    rewritten_wide.push(true);
                }
                Some(inverted) => {
                    let skip = Label(*next_label);
                    *next_label += 1;
                    rewritten.extend([
                        Insn::Jump {
                            op: inverted,
                            target: skip,
                        },
                        Insn::Jump { op: GOTO, target },
                        Insn::Label(skip),
                    ]);
                    rewritten_wide.extend([false, true, false]);
                }
            }
        }

        insns = rewritten;
        wide = rewritten_wide;
        if !changed {
            return Ok((insns, wide, layout));
        }
    }
}

fn branch_offset(from: u32, to: u32) -> i64 {
    i64::from(to) - i64::from(from)
}

fn write_insn(
    writer: &mut Writer,
    insn: &Insn,
    offset: u32,
    wide: bool,
    layout: &Layout,
    pool: &ConstantPool,
) -> Result<()> {
    match insn {
        Insn::Label(_) => {}
        Insn::Simple(op) => writer.write_be(*op),
        Insn::Int { op, value } => {
            writer.write_be(*op);
            match *op {
                BIPUSH => writer.write_be(
                    i8::try_from(*value)
                        .map_err(|_| malformed_error!("bipush operand {} out of range", value))?,
                ),
                SIPUSH => writer.write_be(
                    i16::try_from(*value)
                        .map_err(|_| malformed_error!("sipush operand {} out of range", value))?,
                ),
                _ => writer.write_be(
                    u8::try_from(*value)
                        .map_err(|_| malformed_error!("newarray type {} out of range", value))?,
                ),
            }
        }
        Insn::Var { op, index } => {
            if let Some(short) = shorthand(*op, *index).filter(|_| *op != RET) {
                writer.write_be(short);
            } else if let Ok(index) = u8::try_from(*index) {
                writer.write_be(*op);
                writer.write_be(index);
            } else {
                writer.write_be(WIDE);
                writer.write_be(*op);
                writer.write_be(*index);
            }
        }
        Insn::Iinc { index, delta } => match (u8::try_from(*index), i8::try_from(*delta)) {
            (Ok(index), Ok(delta)) => {
                writer.write_be(IINC);
                writer.write_be(index);
                writer.write_be(delta);
            }
            _ => {
                writer.write_be(WIDE);
                writer.write_be(IINC);
                writer.write_be(*index);
                writer.write_be(*delta);
            }
        },
        Insn::Jump { op, target } => {
            let delta = branch_offset(offset, layout.offset_of(*target)?);
            if wide {
                writer.write_be(if *op == JSR { JSR_W } else { GOTO_W });
                writer.write_be(delta as i32);
            } else {
                writer.write_be(*op);
                writer.write_be(
                    i16::try_from(delta)
                        .map_err(|_| malformed_error!("Branch offset {} overflows", delta))?,
                );
            }
        }
        Insn::Ldc { index } => {
            if pool.get(*index)?.is_wide() {
                writer.write_be(LDC2_W);
                writer.write_be(*index);
            } else if let Ok(short) = u8::try_from(*index) {
                writer.write_be(LDC);
                writer.write_be(short);
            } else {
                writer.write_be(LDC_W);
                writer.write_be(*index);
            }
        }
        Insn::Type { op, index } | Insn::Field { op, index } | Insn::Method { op, index } => {
            writer.write_be(*op);
            writer.write_be(*index);
        }
        Insn::InvokeInterface { index, count } => {
            writer.write_be(INVOKEINTERFACE);
            writer.write_be(*index);
            writer.write_be(*count);
            writer.write_be(0u8);
        }
        Insn::InvokeDynamic { index } => {
            writer.write_be(INVOKEDYNAMIC);
            writer.write_be(*index);
            writer.write_be(0u16);
        }
        Insn::MultiANewArray { index, dims } => {
            writer.write_be(MULTIANEWARRAY);
            writer.write_be(*index);
            writer.write_be(*dims);
        }
        Insn::TableSwitch {
            default,
            low,
            high,
            targets,
        } => {
            if i64::from(*high) - i64::from(*low) + 1 != targets.len() as i64 {
                return Err(malformed_error!(
                    "tableswitch {}..={} has {} targets",
                    low,
                    high,
                    targets.len()
                ));
            }
            writer.write_be(TABLESWITCH);
            for _ in 0..switch_padding(offset) {
                writer.write_be(0u8);
            }
            writer.write_be(branch_offset(offset, layout.offset_of(*default)?) as i32);
            writer.write_be(*low);
            writer.write_be(*high);
            for target in targets {
                writer.write_be(branch_offset(offset, layout.offset_of(*target)?) as i32);
            }
        }
        Insn::LookupSwitch { default, pairs } => {
            writer.write_be(LOOKUPSWITCH);
            for _ in 0..switch_padding(offset) {
                writer.write_be(0u8);
            }
            writer.write_be(branch_offset(offset, layout.offset_of(*default)?) as i32);
            writer.write_be(pairs.len() as i32);
            for (key, target) in pairs {
                writer.write_be(*key);
                writer.write_be(branch_offset(offset, layout.offset_of(*target)?) as i32);
            }
        }
    }
    Ok(())
}

fn to_u16(value: u32, what: &str) -> Result<u16> {
    u16::try_from(value).map_err(|_| malformed_error!("{} {} exceeds u16", what, value))
}

fn encode_code(
    code: &Code,
    unit: &CodeUnit,
    routine: &RoutineMember,
    pool: &mut ConstantPool,
    options: &EncodeOptions,
    hierarchy: &dyn Hierarchy,
) -> Result<Vec<u8>> {
    let mut next_label = first_free_label(code);

    if unit.major_version >= STACK_MAP_VERSION
        && code.insns.iter().any(|insn| {
            matches!(insn, Insn::Jump { op: JSR, .. } | Insn::Var { op: RET, .. })
        })
    {
        return Err(malformed_error!(
            "jsr/ret are not allowed in class version {}",
            unit.major_version
        ));
    }

    let insns = label_allocations(code.insns.clone(), &mut next_label);
    let (insns, wide, layout) = stabilize(insns, &mut next_label, pool)?;
    let code_length = layout.code_length();
    if code_length == 0 || code_length > u32::from(u16::MAX) {
        return Err(malformed_error!("Code length {} outside 1..=65535", code_length));
    }

    let shape = routine.shape(unit.name());
    let analysis = analyze(&insns, &code.handlers, pool, &shape, hierarchy)?;

    let mut bytes = Writer::with_capacity(code_length as usize);
    for (position, insn) in insns.iter().enumerate() {
        write_insn(
            &mut bytes,
            insn,
            layout.offsets[position],
            wide[position],
            &layout,
            pool,
        )?;
    }
    let mut bytes = bytes.into_inner();

    // Unreachable byte ranges, in increasing order
    let mut dead: Vec<(u32, u32)> = Vec::new();
    let mut run: Option<(u32, u32)> = None;
    for (position, insn) in insns.iter().enumerate() {
        if matches!(insn, Insn::Label(_)) {
            continue;
        }
        let (start, end) = (layout.offsets[position], layout.offsets[position + 1]);
        if analysis.reachable[position] {
            dead.extend(run.take());
        } else {
            run = Some(match run {
                Some((from, _)) => (from, end),
                None => (start, end),
            });
        }
    }
    dead.extend(run);
    for (start, end) in &dead {
        let (start, end) = (*start as usize, *end as usize);
        bytes[start..end - 1].fill(NOP);
        bytes[end - 1] = ATHROW;
    }

    let mut max_stack = analysis.max_stack;
    if !dead.is_empty() {
        max_stack = max_stack.max(1);
    }
    let mut max_locals = analysis.max_locals;
    for insn in &insns {
        let used = match insn {
            Insn::Var { op, index } => u32::from(*index) + u32::from(var_width(*op)),
            Insn::Iinc { index, .. } => u32::from(*index) + 1,
            _ => 0,
        };
        max_locals = max_locals.max(to_u16(used, "Local slot")?);
    }
    if !options.strip_debug {
        for local in &code.locals {
            let width = descriptor::slot_size(pool.utf8(local.descriptor)?).max(1);
            max_locals = max_locals.max(to_u16(u32::from(local.index) + u32::from(width), "Local slot")?);
        }
    }

    let mut targets: FxHashSet<Label> = code.handlers.iter().map(|h| h.handler).collect();
    for insn in &insns {
        targets.extend(insn.targets());
    }

    let mut frames: Vec<(u32, Frame)> = Vec::new();
    if unit.major_version >= STACK_MAP_VERSION {
        let mut at_offset: FxHashMap<u32, (bool, Option<&Frame>)> = FxHashMap::default();
        for (position, insn) in insns.iter().enumerate() {
            let Insn::Label(label) = insn else {
                continue;
            };
            let offset = layout.offsets[position];
            if offset >= code_length {
                continue;
            }
            let entry = at_offset.entry(offset).or_insert((false, None));
            entry.0 |= targets.contains(label);
            if let Some(state) = &analysis.states[position] {
                entry.1 = Some(state);
            }
        }
        for (offset, (targeted, state)) in at_offset {
            if let (true, Some(state)) = (targeted, state) {
                frames.push((offset, state.clone()));
            }
        }
        for (start, _) in &dead {
            frames.push((
                *start,
                Frame {
                    locals: Vec::new(),
                    stack: vec![VType::object(THROWABLE)],
                },
            ));
        }
        frames.sort_by_key(|(offset, _)| *offset);
    }

    let mut out = Writer::with_capacity(code_length as usize + 64);
    out.write_be(max_stack);
    out.write_be(max_locals);
    out.write_be(code_length);
    out.write_bytes(&bytes);

    let mut handlers = Vec::with_capacity(code.handlers.len());
    for handler in &code.handlers {
        let target = to_u16(layout.offset_of(handler.handler)?, "Handler offset")?;
        let mut segments = vec![(
            layout.offset_of(handler.start)?,
            layout.offset_of(handler.end)?,
        )];
        for (dead_start, dead_end) in &dead {
            segments = segments
                .into_iter()
                .flat_map(|(start, end)| {
                    if *dead_end <= start || *dead_start >= end {
                        vec![(start, end)]
                    } else {
                        [(start, *dead_start), (*dead_end, end)]
                            .into_iter()
                            .filter(|(s, e)| s < e)
                            .collect()
                    }
                })
                .collect();
        }
        for (start, end) in segments {
            if start < end {
                handlers.push((
                    to_u16(start, "Handler start")?,
                    to_u16(end, "Handler end")?,
                    target,
                    handler.catch_type,
                ));
            }
        }
    }
    write_count(&mut out, handlers.len())?;
    for (start, end, target, catch_type) in handlers {
        out.write_be(start);
        out.write_be(end);
        out.write_be(target);
        out.write_be(catch_type);
    }

    let mut attributes: Vec<Attribute> = Vec::new();
    if !frames.is_empty() {
        let data = stackmap::write(&frames, &analysis.initial, pool, &|label| {
            layout.offset_of(label)
        })?;
        attributes.push(Attribute::Raw {
            name: pool.add_utf8(STACK_MAP_TABLE)?,
            data,
        });
    }

    if !options.strip_debug {
        let mut lines = Writer::new();
        let mut count = 0usize;
        for line in &code.lines {
            let Some(offset) = layout.positions.get(&line.start).map(|p| layout.offsets[*p]) else {
                continue;
            };
            if offset >= code_length {
                continue;
            }
            lines.write_be(to_u16(offset, "Line offset")?);
            lines.write_be(line.line);
            count += 1;
        }
        if count > 0 {
            let mut data = Writer::new();
            write_count(&mut data, count)?;
            data.write_bytes(lines.as_slice());
            attributes.push(Attribute::Raw {
                name: pool.add_utf8(LINE_NUMBER_TABLE)?,
                data: data.into_inner(),
            });
        }

        for generic in [false, true] {
            let mut entries = Writer::new();
            let mut count = 0usize;
            for local in code.locals.iter().filter(|local| local.generic == generic) {
                let (Some(start), Some(end)) = (
                    layout.positions.get(&local.start),
                    layout.positions.get(&local.end),
                ) else {
                    continue;
                };
                let (start, end) = (layout.offsets[*start], layout.offsets[*end]);
                if end < start || start >= code_length {
                    continue;
                }
                entries.write_be(to_u16(start, "Local start")?);
                entries.write_be(to_u16(end - start, "Local length")?);
                entries.write_be(local.name);
                entries.write_be(local.descriptor);
                entries.write_be(local.index);
                count += 1;
            }
            if count > 0 {
                let mut data = Writer::new();
                write_count(&mut data, count)?;
                data.write_bytes(entries.as_slice());
                let name = if generic {
                    LOCAL_VARIABLE_TYPE_TABLE
                } else {
                    LOCAL_VARIABLE_TABLE
                };
                attributes.push(Attribute::Raw {
                    name: pool.add_utf8(name)?,
                    data: data.into_inner(),
                });
            }
        }
    }

    write_count(&mut out, attributes.len())?;
    for attribute in &attributes {
        attribute.write(&mut out)?;
    }
    Ok(out.into_inner())
}
