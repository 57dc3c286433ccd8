//! `@FieldHook`: a callback run after every write of a field, across the artifact.
//!
//! The callback lives in the field's owner and was copied there public in the copy phase.
//! Instance fields get the written object duplicated below the `putfield` operands so the
//! callback can be invoked on it; static fields get a plain `invokestatic` after the write.
//! Writes inside the owner's own constructors are left alone, since the object is still
//! under construction there.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    mapping::MemberTarget,
    patch::{PatchMember, PatchUnit},
    transform::{code, TransformContext},
    unit::{descriptor::slot_size, opcodes, Body, Code, CodeUnit, ConstantPool, Hierarchy, Insn},
    Result,
};

fn writes(body: &Code, pool: &ConstantPool, field: &MemberTarget) -> Result<Vec<(usize, u8)>> {
    let mut found = Vec::new();
    for (position, insn) in body.insns.iter().enumerate() {
        let Insn::Field { op, index } = insn else {
            continue;
        };
        if !matches!(*op, opcodes::PUTFIELD | opcodes::PUTSTATIC) {
            continue;
        }
        let reference = pool.member_ref(*index)?;
        if reference.owner == field.owner
            && reference.name == field.name
            && reference.descriptor == field.descriptor
        {
            found.push((position, *op));
        }
    }
    Ok(found)
}

// keeps a copy of the receiver below the putfield operands
fn receiver_copy(wide: bool) -> Vec<Insn> {
    if wide {
        [
            opcodes::DUP2_X1,
            opcodes::POP2,
            opcodes::DUP_X2,
            opcodes::DUP_X2,
            opcodes::POP,
        ]
        .into_iter()
        .map(Insn::Simple)
        .collect()
    } else {
        vec![Insn::Simple(opcodes::DUP2)]
    }
}

/// Hooks every write of `field` in the site units. Returns the units that were changed.
pub(super) fn apply(
    units: &mut BTreeMap<String, CodeUnit>,
    patch: &PatchUnit,
    member: &PatchMember,
    field: &MemberTarget,
    sites: &[String],
    ctx: &mut TransformContext,
) -> Result<BTreeSet<String>> {
    let Some(source) = patch.routine(member) else {
        return Err(transform_error!(patch.name(), "{} is not a routine", member));
    };
    let callback_static = source.is_static();
    let owner_is_interface = units
        .get(&field.owner)
        .map_or_else(|| ctx.hierarchy.is_interface(&field.owner), CodeUnit::is_interface);
    let wide = slot_size(&field.descriptor) == 2;

    let access = super::inject::public_access(source.access);
    let mut hooked = 0;
    let mut skipped = 0;
    let mut changed = BTreeSet::new();
    for site in sites {
        let Some(unit) = units.get_mut(site) else {
            return Err(transform_error!(site, "write site of {} is not loaded", field));
        };

        for index in 0..unit.routines.len() {
            let routine = &unit.routines[index];
            let body = match routine.body.as_ref() {
                Some(Body::Code(body)) => body,
                Some(Body::Raw(_)) => {
                    return Err(transform_error!(
                        site,
                        "{}{} was decoded without instructions",
                        routine.name,
                        routine.descriptor
                    ))
                }
                None => continue,
            };
            let found = writes(body, &unit.pool, field)?;
            if found.is_empty() {
                continue;
            }
            if *site == field.owner && routine.is_constructor() {
                log::debug!(
                    "skipping {} writes of {} in constructor {}",
                    found.len(),
                    field,
                    routine.descriptor
                );
                skipped += found.len();
                continue;
            }

            for (_, op) in &found {
                if (*op == opcodes::PUTSTATIC) != callback_static {
                    return Err(transform_error!(
                        site,
                        "{} callback {} does not match the staticness of {}",
                        if callback_static { "static" } else { "instance" },
                        member,
                        field
                    ));
                }
            }

            let call = code::invoke(
                &mut unit.pool,
                &field.owner,
                owner_is_interface,
                &source.name,
                "()V",
                access,
            )?;
            let body = code::body_mut(unit, index)?;
            for (position, op) in found.iter().rev() {
                // a wide putfield leaves exactly one receiver behind, DUP2 leaves two
                let after = if *op == opcodes::PUTSTATIC || wide {
                    vec![call.clone()]
                } else {
                    vec![Insn::Simple(opcodes::POP), call.clone()]
                };
                body.insns.splice(position + 1..position + 1, after);
                if *op == opcodes::PUTFIELD {
                    body.insns.splice(*position..*position, receiver_copy(wide));
                }
            }
            hooked += found.len();
            changed.insert(site.clone());
        }
    }

    if skipped > 0 {
        log::warn!("{} constructor writes of {} were not hooked", skipped, field);
        ctx.stats.skipped_sites += skipped;
    }
    log::debug!("hooked {} writes of {} in {} units", hooked, field, changed.len());
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test::factories::directive,
        transform::{Remapper, TransformStats},
        unit::{annotation::ElementValue, opcodes::*, AccessFlags, ClassHierarchy, UnitBuilder},
    };

    fn units() -> BTreeMap<String, CodeUnit> {
        let owner = UnitBuilder::new("a7")
            .field(AccessFlags::PUBLIC, "b", "I")
            .field(AccessFlags::PUBLIC, "w", "J")
            .routine(AccessFlags::PUBLIC, "<init>", "()V", |code| {
                code.var(ALOAD, 0)
                    .invoke(INVOKESPECIAL, "java/lang/Object", "<init>", "()V")
                    .var(ALOAD, 0)
                    .int(3)
                    .field(PUTFIELD, "a7", "b", "I")
                    .op(RETURN);
            })
            .routine(AccessFlags::PUBLIC, "onChange", "()V", |code| {
                code.op(RETURN);
            })
            .build()
            .unwrap();
        let writer = UnitBuilder::new("k")
            .routine(AccessFlags::PUBLIC | AccessFlags::STATIC, "set", "(La7;)V", |code| {
                code.var(ALOAD, 0)
                    .int(1)
                    .field(PUTFIELD, "a7", "b", "I")
                    .var(ALOAD, 0)
                    .op(LCONST_1)
                    .field(PUTFIELD, "a7", "w", "J")
                    .op(RETURN);
            })
            .build()
            .unwrap();
        BTreeMap::from([("a7".to_string(), owner), ("k".to_string(), writer)])
    }

    fn patch() -> PatchUnit {
        let unit = UnitBuilder::new("p/AlphaPatch")
            .annotation(directive("Patch").with("value", ElementValue::String("Alpha".into())))
            .annotated_routine(
                AccessFlags::PRIVATE,
                "onChange",
                "()V",
                &[directive("FieldHook").with("value", ElementValue::String("counter".into()))],
                |code| {
                    code.op(RETURN);
                },
            )
            .build()
            .unwrap();
        PatchUnit::from_unit(unit).unwrap()
    }

    fn hook(
        units: &mut BTreeMap<String, CodeUnit>,
        name: &str,
        descriptor: &str,
    ) -> (BTreeSet<String>, usize) {
        let patch = patch();
        let remapper = Remapper::new();
        let hierarchy = ClassHierarchy::default();
        let mut stats = TransformStats::default();
        let mut ctx = TransformContext {
            remapper: &remapper,
            hierarchy: &hierarchy,
            stats: &mut stats,
        };
        let field = MemberTarget {
            owner: "a7".into(),
            name: name.into(),
            descriptor: descriptor.into(),
        };
        let sites = vec!["a7".to_string(), "k".to_string()];
        let changed = apply(units, &patch, &patch.members[0], &field, &sites, &mut ctx).unwrap();
        (changed, stats.skipped_sites)
    }

    #[test]
    fn hooks_writes_outside_constructors() {
        let mut units = units();
        assert_eq!(hook(&mut units, "b", "I"), (BTreeSet::from(["k".to_string()]), 1));

        let set = units["k"].routine("set", "(La7;)V").unwrap().code().unwrap();
        assert_eq!(set.insns[2], Insn::Simple(DUP2));
        assert!(matches!(set.insns[3], Insn::Field { op: PUTFIELD, .. }));
        assert_eq!(set.insns[4], Insn::Simple(POP));
        assert!(matches!(set.insns[5], Insn::Method { op: INVOKEVIRTUAL, .. }));

        let init = units["a7"].routine("<init>", "()V").unwrap().code().unwrap();
        assert_eq!(init.insns.len(), 6);
    }

    #[test]
    fn wide_fields_keep_the_receiver() {
        let mut units = units();
        assert_eq!(hook(&mut units, "w", "J"), (BTreeSet::from(["k".to_string()]), 0));
        let set = units["k"].routine("set", "(La7;)V").unwrap().code().unwrap();
        let ops: Vec<_> = set.insns.iter().filter_map(Insn::opcode).collect();
        assert_eq!(
            &ops[5..],
            &[DUP2_X1, POP2, DUP_X2, DUP_X2, POP, PUTFIELD, INVOKEVIRTUAL, RETURN]
        );
    }
}
