//! The `Alpha` scenario: a class renamed to `a7` by the obfuscator, and a patch written
//! against its symbolic names.
//!
//! ```text
//! Alpha          -> a7
//!   counter:I    -> b:I
//!   tick()V      -> c()V
//! ```

use crate::{
    file::{Artifact, ArtifactKind},
    mapping::{MappingTable, MemberMapping},
    test::factories::minimal_class_bytes,
    unit::{annotation::ElementValue, opcodes::*, AccessFlags, Annotation, CodeUnit, UnitBuilder},
};

/// Name of the patch unit of the scenario.
pub const ALPHA_PATCH: &str = "patches/AlphaPatch";

/// An annotation of the directive vocabulary.
pub fn directive(name: &str) -> Annotation {
    Annotation::new(&format!("classweave/api/{name}"))
}

/// Mapping revision 7 with `Alpha` and two of its members.
pub fn alpha_mapping() -> MappingTable {
    let mut table = MappingTable::new(7);
    table.insert_class("Alpha", "a7").unwrap();
    table
        .insert_field("Alpha", "counter", MemberMapping::new("b", "I"))
        .unwrap();
    table
        .insert_method("Alpha", "tick", MemberMapping::new("c", "()V"))
        .unwrap();
    table
}

fn alpha_builder() -> UnitBuilder {
    UnitBuilder::new("a7")
        .field(AccessFlags::PRIVATE, "b", "I")
        .routine(AccessFlags::PUBLIC, "<init>", "()V", |code| {
            code.var(ALOAD, 0)
                .invoke(INVOKESPECIAL, "java/lang/Object", "<init>", "()V")
                .op(RETURN);
        })
        .routine(AccessFlags::PUBLIC, "c", "()V", |code| {
            code.var(ALOAD, 0)
                .op(DUP)
                .field(GETFIELD, "a7", "b", "I")
                .int(1)
                .op(IADD)
                .field(PUTFIELD, "a7", "b", "I")
                .op(RETURN);
        })
}

/// The obfuscated `a7`, fully decoded.
pub fn alpha_unit() -> CodeUnit {
    alpha_builder().build().unwrap()
}

/// A target artifact holding `a7` and an unrelated unit `k`.
pub fn alpha_artifact() -> Artifact {
    let mut artifact = Artifact::new(ArtifactKind::Target);
    artifact.insert("a7", alpha_builder().bytes().unwrap());
    artifact.insert("k", minimal_class_bytes("k"));
    artifact
}

fn alpha_patch_builder() -> UnitBuilder {
    let patch = directive("Patch").with("value", ElementValue::String("Alpha".into()));
    let hook = directive("Hook")
        .with("value", ElementValue::String("tick".into()))
        .with(
            "at",
            ElementValue::Enum {
                type_name: "Lclassweave/api/At;".into(),
                name: "HEAD".into(),
            },
        );

    UnitBuilder::new(ALPHA_PATCH)
        .annotation(patch)
        .annotated_field(AccessFlags::PRIVATE, "counter", "I", &[directive("Shadow")])
        .annotated_field(AccessFlags::PUBLIC, "ticks", "I", &[directive("Inject")])
        .annotated_routine(
            AccessFlags::PUBLIC,
            "onTick",
            "()V",
            &[directive("Inject")],
            |code| {
                code.var(ALOAD, 0)
                    .op(DUP)
                    .field(GETFIELD, ALPHA_PATCH, "ticks", "I")
                    .int(1)
                    .op(IADD)
                    .field(PUTFIELD, ALPHA_PATCH, "ticks", "I")
                    .op(RETURN);
            },
        )
        .annotated_routine(AccessFlags::PUBLIC, "beforeTick", "()V", &[hook], |code| {
            code.var(ALOAD, 0)
                .op(DUP)
                .field(GETFIELD, ALPHA_PATCH, "counter", "I")
                .int(1)
                .op(IADD)
                .field(PUTFIELD, ALPHA_PATCH, "counter", "I")
                .var(ALOAD, 0)
                .invoke(INVOKEVIRTUAL, ALPHA_PATCH, "onTick", "()V")
                .op(RETURN);
        })
}

/// The patch unit for `Alpha`, fully decoded.
///
/// It shadows `counter`, injects `ticks` and `onTick()V`, and hooks `beforeTick()V` into
/// the head of `tick()V`.
pub fn alpha_patch() -> CodeUnit {
    alpha_patch_builder().build().unwrap()
}

/// The patch tree for `Alpha` as an artifact.
pub fn alpha_patches() -> Artifact {
    let mut patches = Artifact::new(ArtifactKind::Target);
    patches.insert(ALPHA_PATCH, alpha_patch_builder().bytes().unwrap());
    patches
}
