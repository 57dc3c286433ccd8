//! `@Inject`: copies of patch fields and routines.
//!
//! Injection is idempotent. A member whose name and remapped descriptor already exist in the
//! target is left alone, so running the same patches over an already patched artifact is a
//! no-op. Hook, construct and field-hook callbacks are injected through the same path.

use crate::{
    patch::{PatchMember, PatchUnit},
    transform::TransformContext,
    unit::{AccessFlags, CodeUnit, FieldMember, SymbolMap},
    Result,
};

/// Copies a patch field. Returns `false` if the field already exists.
pub(super) fn field(
    target: &mut CodeUnit,
    patch: &PatchUnit,
    member: &PatchMember,
    ctx: &TransformContext,
) -> Result<bool> {
    let Some(source) = patch.field(member) else {
        return Err(transform_error!(patch.name(), "{} is not a field", member));
    };
    let descriptor = ctx.remapper.descriptor(&source.descriptor);
    if target.field(&source.name, &descriptor).is_some() {
        log::debug!("{} already has field {}:{}", target.name(), source.name, descriptor);
        return Ok(false);
    }

    target
        .fields
        .push(FieldMember::new(source.access, &source.name, &descriptor));
    Ok(true)
}

/// `access` with private and protected replaced by public.
pub(super) fn public_access(mut access: AccessFlags) -> AccessFlags {
    access.remove(AccessFlags::PRIVATE | AccessFlags::PROTECTED);
    access.insert(AccessFlags::PUBLIC);
    access
}

/// Copies a patch routine. Returns `false` if the routine already exists.
///
/// `public` widens the copy's access, for callbacks invoked from other units.
pub(super) fn routine(
    target: &mut CodeUnit,
    patch: &PatchUnit,
    member: &PatchMember,
    public: bool,
    ctx: &TransformContext,
) -> Result<bool> {
    let Some(source) = patch.routine(member) else {
        return Err(transform_error!(patch.name(), "{} is not a routine", member));
    };
    let descriptor = ctx.remapper.descriptor(&source.descriptor);
    if target.routine(&source.name, &descriptor).is_some() {
        log::debug!("{} already has {}{}", target.name(), source.name, descriptor);
        return Ok(false);
    }

    let access = if public {
        public_access(source.access)
    } else {
        source.access
    };
    let copy = super::code::copy_routine(target, patch, source, access, &descriptor, ctx.remapper)?;
    target.routines.push(copy);
    Ok(true)
}
