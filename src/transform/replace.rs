//! `@Replace`: swaps a target body for the patch body.

use crate::{
    mapping::MemberTarget,
    patch::{PatchMember, PatchUnit},
    transform::{code, TransformContext},
    unit::{Body, CodeUnit, SymbolMap},
    Result,
};

/// Replaces the body of `target` with the patch routine's.
///
/// The remapped patch descriptor and the staticness must match the target exactly.
pub(super) fn apply(
    unit: &mut CodeUnit,
    patch: &PatchUnit,
    member: &PatchMember,
    target: &MemberTarget,
    ctx: &TransformContext,
) -> Result<bool> {
    let Some(source) = patch.routine(member) else {
        return Err(transform_error!(patch.name(), "{} is not a routine", member));
    };
    let Some(body) = source.code() else {
        return Err(transform_error!(patch.name(), "{} has no decoded body", member));
    };

    let index = code::locate(unit, target)?;
    let descriptor = ctx.remapper.descriptor(&source.descriptor);
    let existing = &unit.routines[index];
    if *existing.descriptor != descriptor {
        return Err(transform_error!(
            unit.name(),
            "{} replaces {}{} but has descriptor {}",
            member,
            existing.name,
            existing.descriptor,
            descriptor
        ));
    }
    if existing.is_static() != source.is_static() {
        return Err(transform_error!(
            unit.name(),
            "{} and {} differ in staticness",
            member,
            target
        ));
    }

    let mut replacement = code::import_code(unit, patch, body, ctx.remapper)?;
    let previous = code::body_mut(unit, index)?;
    replacement.attribute_name = previous.attribute_name;
    unit.routines[index].body = Some(Body::Code(replacement));
    Ok(true)
}
