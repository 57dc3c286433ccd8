//! `@Construct`: a callback run at the end of every root constructor.
//!
//! A root constructor is one that delegates to the superclass constructor. Constructors that
//! delegate to another constructor of the same unit already run a root constructor, so
//! calling the callback there too would run it twice.

use crate::{
    patch::{PatchMember, PatchUnit},
    transform::{code, TransformContext},
    unit::{CodeUnit, Insn, SymbolMap},
    Result,
};

/// Inserts calls to the callback of `member` before every return of each root constructor.
pub(super) fn apply(
    unit: &mut CodeUnit,
    patch: &PatchUnit,
    member: &PatchMember,
    ctx: &TransformContext,
) -> Result<bool> {
    let Some(source) = patch.routine(member) else {
        return Err(transform_error!(patch.name(), "{} is not a routine", member));
    };
    let owner = unit.name().to_string();
    let descriptor = ctx.remapper.descriptor(&source.descriptor);

    let mut roots = Vec::new();
    for (index, routine) in unit.routines.iter().enumerate() {
        if !routine.is_constructor() {
            continue;
        }
        let Some(body) = routine.code() else {
            return Err(transform_error!(owner, "constructor {} has no decoded body", routine.descriptor));
        };
        let call = code::constructor_call(body, &unit.pool)?;
        let Some(Insn::Method { index: reference, .. }) = call.map(|call| &body.insns[call]) else {
            continue;
        };
        if unit.pool.member_ref(*reference)?.owner != owner {
            roots.push(index);
        }
    }
    if roots.is_empty() {
        return Err(transform_error!(owner, "no constructor delegates to the superclass"));
    }

    let is_interface = unit.is_interface();
    let call = code::invoke(
        &mut unit.pool,
        &owner,
        is_interface,
        &source.name,
        &descriptor,
        source.access,
    )?;
    let mut snippet = code::load_arguments(&[], false, !source.is_static());
    snippet.push(call);

    for index in roots {
        let body = code::body_mut(unit, index)?;
        let positions = code::returns(body);
        code::insert_before(body, &positions, |_| Ok(snippet.clone()))?;
    }
    Ok(true)
}
