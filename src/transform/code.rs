//! Body surgery shared by the transformers.
//!
//! Everything here works on decoded bodies. Positions are indices into `Code::insns`, and
//! insertions always go from the highest position down so earlier positions stay valid.

use crate::{
    mapping::MemberTarget,
    patch::PatchUnit,
    unit::{
        descriptor::{slot_size, MethodDescriptor},
        opcodes, AccessFlags, Body, Code, CodeUnit, ConstantPool, Handler, Insn, LocalVar,
        RoutineMember, SymbolMap,
    },
    Result,
};

/// Position of a routine, by exact descriptor or else by a unique name and parameter match.
///
/// The fallback covers covariant return types the mapping recorded against a bridge.
pub(super) fn locate(unit: &CodeUnit, target: &MemberTarget) -> Result<usize> {
    if let Some(index) = unit.routine_index(&target.name, &target.descriptor) {
        return Ok(index);
    }

    let params = params_of(&target.descriptor);
    let mut candidates = unit
        .routines
        .iter()
        .enumerate()
        .filter(|(_, routine)| {
            &*routine.name == target.name && params_of(&routine.descriptor) == params
        })
        .map(|(index, _)| index);
    match (candidates.next(), candidates.next()) {
        (Some(index), None) => Ok(index),
        (None, _) => Err(transform_error!(unit.name(), "routine {} does not exist", target)),
        (Some(_), Some(_)) => Err(transform_error!(
            unit.name(),
            "routine {} matches several overloads",
            target
        )),
    }
}

fn params_of(descriptor: &str) -> &str {
    descriptor
        .find(')')
        .map_or(descriptor, |end| &descriptor[..=end])
}

/// The decoded body of routine `index`.
pub(super) fn body_mut(unit: &mut CodeUnit, index: usize) -> Result<&mut Code> {
    let unit_name = unit.name().to_string();
    let Some(routine) = unit.routines.get_mut(index) else {
        return Err(transform_error!(unit_name, "routine index {} out of range", index));
    };
    let label = format!("{}{}", routine.name, routine.descriptor);
    match routine.body.as_mut() {
        Some(Body::Code(code)) => Ok(code),
        Some(Body::Raw(_)) => Err(transform_error!(
            unit_name,
            "{} was decoded without instructions",
            label
        )),
        None => Err(transform_error!(unit_name, "{} has no body", label)),
    }
}

/// Copies a patch body into `target`, importing every constant it references.
///
/// Generic local variable entries are dropped since their signatures are not remapped, and
/// frames are cleared for the encoder to recompute.
pub(super) fn import_code(
    target: &mut CodeUnit,
    patch: &PatchUnit,
    code: &Code,
    map: &dyn SymbolMap,
) -> Result<Code> {
    let source = &patch.unit;
    let mut copy = code.clone();
    copy.attribute_name = 0;
    copy.frames.clear();

    for insn in &mut copy.insns {
        insn.map_constants(|index| target.import_constant(source, index, map))?;
    }
    for handler in &mut copy.handlers {
        if handler.catch_type != 0 {
            handler.catch_type = target.import_constant(source, handler.catch_type, map)?;
        }
    }

    let mut locals = Vec::with_capacity(copy.locals.len());
    for local in copy.locals.iter().filter(|local| !local.generic) {
        let name = target.pool.add_utf8(source.pool.utf8(local.name)?)?;
        let descriptor = target
            .pool
            .add_utf8(&map.descriptor(source.pool.utf8(local.descriptor)?))?;
        locals.push(LocalVar {
            name,
            descriptor,
            ..local.clone()
        });
    }
    copy.locals = locals;
    Ok(copy)
}

/// A copy of a patch routine for `target`, under `name` and `descriptor`.
pub(super) fn copy_routine(
    target: &mut CodeUnit,
    patch: &PatchUnit,
    routine: &RoutineMember,
    access: AccessFlags,
    descriptor: &str,
    map: &dyn SymbolMap,
) -> Result<RoutineMember> {
    let code = match routine.body.as_ref() {
        Some(Body::Code(code)) => Some(import_code(target, patch, code, map)?),
        Some(Body::Raw(_)) => {
            return Err(transform_error!(
                patch.name(),
                "{}{} was decoded without instructions",
                routine.name,
                routine.descriptor
            ))
        }
        None => None,
    };
    Ok(RoutineMember::new(access, &routine.name, descriptor, code))
}

/// Local slots a body uses, at least the receiver and the parameters.
pub(super) fn locals_used(code: &Code, is_static: bool, descriptor: &str) -> Result<u16> {
    let args = MethodDescriptor::parse(descriptor)?.arg_slots() + u16::from(!is_static);
    let used = code
        .insns
        .iter()
        .filter_map(|insn| match insn {
            Insn::Var { op, index } => Some(index + opcodes::var_width(*op)),
            Insn::Iinc { index, .. } => Some(index + 1),
            _ => None,
        })
        .max()
        .unwrap_or(0);
    Ok(args.max(used).max(code.max_locals))
}

/// Index of the `invokespecial <init>` that initializes `this` in a constructor.
///
/// Every `new` leaves one pending `<init>` call, so the first `<init>` call with no object
/// pending is the one on the receiver.
pub(super) fn constructor_call(code: &Code, pool: &ConstantPool) -> Result<Option<usize>> {
    let mut pending = 0usize;
    for (position, insn) in code.insns.iter().enumerate() {
        match insn {
            Insn::Type {
                op: opcodes::NEW, ..
            } => pending += 1,
            Insn::Method {
                op: opcodes::INVOKESPECIAL,
                index,
            } if pool.member_ref(*index)?.name == "<init>" => {
                if pending == 0 {
                    return Ok(Some(position));
                }
                pending -= 1;
            }
            _ => {}
        }
    }
    Ok(None)
}

/// The position code runs at on entry: the start, or right after the receiver's
/// initialization in constructors.
pub(super) fn entry_point(unit: &CodeUnit, index: usize) -> Result<usize> {
    let routine = &unit.routines[index];
    if !routine.is_constructor() {
        return Ok(0);
    }
    let Some(code) = routine.code() else {
        return Err(transform_error!(unit.name(), "constructor has no decoded body"));
    };
    match constructor_call(code, &unit.pool)? {
        Some(position) => Ok(position + 1),
        None => Err(transform_error!(
            unit.name(),
            "constructor {} never initializes this",
            routine.descriptor
        )),
    }
}

/// Positions of every return instruction.
pub(super) fn returns(code: &Code) -> Vec<usize> {
    code.insns
        .iter()
        .enumerate()
        .filter(|(_, insn)| insn.is_return())
        .map(|(position, _)| position)
        .collect()
}

/// Splices `make(code)` in before each position, last position first.
pub(super) fn insert_before(
    code: &mut Code,
    positions: &[usize],
    mut make: impl FnMut(&mut Code) -> Result<Vec<Insn>>,
) -> Result<()> {
    let mut positions = positions.to_vec();
    positions.sort_unstable();
    positions.dedup();
    for position in positions.into_iter().rev() {
        let snippet = make(code)?;
        code.insns.splice(position..position, snippet);
    }
    Ok(())
}

/// A routine call with the right invoke form for its owner and access.
pub(super) fn invoke(
    pool: &mut ConstantPool,
    owner: &str,
    owner_is_interface: bool,
    name: &str,
    descriptor: &str,
    access: AccessFlags,
) -> Result<Insn> {
    let index = pool.add_methodref(owner, name, descriptor, owner_is_interface)?;
    Ok(if access.contains(AccessFlags::STATIC) {
        Insn::Method {
            op: opcodes::INVOKESTATIC,
            index,
        }
    } else if access.contains(AccessFlags::PRIVATE) {
        Insn::Method {
            op: opcodes::INVOKESPECIAL,
            index,
        }
    } else if owner_is_interface {
        let slots = MethodDescriptor::parse(descriptor)?.arg_slots() + 1;
        Insn::InvokeInterface {
            index,
            count: u8::try_from(slots)
                .map_err(|_| malformed_error!("{} takes too many arguments", descriptor))?,
        }
    } else {
        Insn::Method {
            op: opcodes::INVOKEVIRTUAL,
            index,
        }
    })
}

/// Loads the receiver (for instance callbacks) and the given parameters, starting at the
/// first argument slot of a routine of the given staticness.
pub(super) fn load_arguments(params: &[&str], routine_static: bool, receiver: bool) -> Vec<Insn> {
    let mut insns = Vec::with_capacity(params.len() + 1);
    if receiver {
        insns.push(Insn::Var {
            op: opcodes::ALOAD,
            index: 0,
        });
    }
    let mut slot = u16::from(!routine_static);
    for param in params {
        insns.push(Insn::Var {
            op: opcodes::load_for(param),
            index: slot,
        });
        slot += slot_size(param);
    }
    insns
}

/// Relabels a body so it can be spliced into `host`.
///
/// Labels get fresh numbers from `host`, locals from `args` on move up to `base`, and returns
/// become jumps to the end of the copy. Returns the instructions (ending with the end label)
/// and the relabeled handlers.
pub(super) fn inline(host: &mut Code, fragment: &Code, args: u16, base: u16) -> (Vec<Insn>, Vec<Handler>) {
    let mut labels = rustc_hash::FxHashMap::default();
    let end = host.new_label();
    let mut relabel = |label| *labels.entry(label).or_insert_with(|| host.new_label());

    let shift = |index: u16| {
        if index >= args {
            index - args + base
        } else {
            index
        }
    };

    let mut insns = Vec::with_capacity(fragment.insns.len() + 1);
    let exit = Insn::Jump {
        op: opcodes::GOTO,
        target: end,
    };
    for insn in &fragment.insns {
        if insn.is_return() {
            insns.push(exit.clone());
            continue;
        }
        let mut insn = match insn {
            Insn::Var { op, index } => Insn::Var {
                op: *op,
                index: shift(*index),
            },
            Insn::Iinc { index, delta } => Insn::Iinc {
                index: shift(*index),
                delta: *delta,
            },
            other => other.clone(),
        };
        insn.map_labels(&mut relabel);
        insns.push(insn);
    }
    // a trailing jump to the end label is a no-op
    if insns.last() == Some(&exit) {
        insns.pop();
    }
    insns.push(Insn::Label(end));

    let handlers = fragment
        .handlers
        .iter()
        .map(|handler| Handler {
            start: relabel(handler.start),
            end: relabel(handler.end),
            handler: relabel(handler.handler),
            catch_type: handler.catch_type,
        })
        .collect();
    (insns, handlers)
}

/// The instructions that return the default value of a return type.
pub(super) fn default_return(ret: &str) -> Vec<Insn> {
    let op = opcodes::return_for(ret);
    let push = match ret.as_bytes().first() {
        Some(b'V') => None,
        Some(b'J') => Some(opcodes::LCONST_0),
        Some(b'F') => Some(opcodes::FCONST_0),
        Some(b'D') => Some(opcodes::DCONST_0),
        Some(b'L' | b'[') => Some(opcodes::ACONST_NULL),
        _ => Some(opcodes::ICONST_0),
    };
    push.into_iter().chain([op]).map(Insn::Simple).collect()
}
