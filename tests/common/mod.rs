//! Artifacts and patches shared by the integration tests.
//!
//! Everything is built through the public [`UnitBuilder`], the same way a patch author's
//! compiler output would look to the pipeline.

#![allow(dead_code)]

use classweave::{
    file::{Artifact, ArtifactKind},
    mapping::MappingTable,
    unit::{opcodes::*, AccessFlags, Annotation, ElementValue, UnitBuilder},
};

pub const ALPHA_MAPPING: &str = r#"{
    "revision": 7,
    "classes": {
        "Alpha": {
            "name": "a7",
            "fields":  { "counter": { "name": "b", "descriptor": "I" } },
            "methods": { "tick":    { "name": "c", "descriptor": "()V" },
                         "reset":   { "name": "d", "descriptor": "()I" } }
        }
    }
}"#;

pub fn mapping() -> MappingTable {
    MappingTable::from_json(ALPHA_MAPPING).unwrap()
}

pub fn directive(name: &str) -> Annotation {
    Annotation::new(&format!("classweave/api/{name}"))
}

pub fn named(name: &str, value: &str) -> Annotation {
    directive(name).with("value", ElementValue::String(value.into()))
}

pub fn at(annotation: Annotation, point: &str) -> Annotation {
    annotation.with(
        "at",
        ElementValue::Enum {
            type_name: "Lclassweave/api/At;".into(),
            name: point.into(),
        },
    )
}

/// The obfuscated `a7`: `counter` is `b`, `tick()V` is `c`, `reset()I` is `d`.
pub fn alpha() -> UnitBuilder {
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
        .routine(AccessFlags::PUBLIC, "d", "()I", |code| {
            code.var(ALOAD, 0).field(GETFIELD, "a7", "b", "I").op(IRETURN);
        })
}

/// A unit with a loop and a handler, so that frames and branch layout matter.
pub fn worker() -> UnitBuilder {
    UnitBuilder::new("w")
        .routine(AccessFlags::PUBLIC | AccessFlags::STATIC, "sum", "(I)I", |code| {
            let head = code.label();
            let done = code.label();
            let start = code.label();
            let end = code.label();
            let handler = code.label();
            code.place(start)
                .int(0)
                .var(ISTORE, 1)
                .place(head)
                .var(ILOAD, 0)
                .jump(IFLE, done)
                .var(ILOAD, 1)
                .var(ILOAD, 0)
                .op(IADD)
                .var(ISTORE, 1)
                .iinc(0, -1)
                .jump(GOTO, head)
                .place(done)
                .var(ILOAD, 1)
                .place(end)
                .op(IRETURN)
                .place(handler)
                .op(POP)
                .int(-1)
                .op(IRETURN)
                .handler(start, end, handler, Some("java/lang/RuntimeException"));
        })
}

pub fn target() -> Artifact {
    let mut artifact = Artifact::new(ArtifactKind::Target);
    artifact.insert("a7", alpha().bytes().unwrap());
    artifact.insert("w", worker().bytes().unwrap());
    artifact
}

pub fn patch_unit(name: &str, target: &str) -> UnitBuilder {
    UnitBuilder::new(name).annotation(named("Patch", target))
}

/// Shadows `counter`, injects `ticks` and `onTick()V`, hooks `beforeTick()V` into `tick`.
pub fn alpha_patch() -> UnitBuilder {
    let owner = "patches/AlphaPatch";
    patch_unit(owner, "Alpha")
        .annotated_field(AccessFlags::PRIVATE, "counter", "I", &[directive("Shadow")])
        .annotated_field(AccessFlags::PUBLIC, "ticks", "I", &[directive("Inject")])
        .annotated_routine(AccessFlags::PUBLIC, "onTick", "()V", &[directive("Inject")], |code| {
            code.var(ALOAD, 0)
                .op(DUP)
                .field(GETFIELD, owner, "ticks", "I")
                .int(1)
                .op(IADD)
                .field(PUTFIELD, owner, "ticks", "I")
                .op(RETURN);
        })
        .annotated_routine(
            AccessFlags::PUBLIC,
            "beforeTick",
            "()V",
            &[at(named("Hook", "tick"), "HEAD")],
            |code| {
                code.var(ALOAD, 0)
                    .op(DUP)
                    .field(GETFIELD, owner, "counter", "I")
                    .int(1)
                    .op(IADD)
                    .field(PUTFIELD, owner, "counter", "I")
                    .var(ALOAD, 0)
                    .invoke(INVOKEVIRTUAL, owner, "onTick", "()V")
                    .op(RETURN);
            },
        )
}

/// A host with a single `Loader` whose `version()I` returns 1.
pub fn host() -> Artifact {
    let mut artifact = Artifact::new(ArtifactKind::Host);
    let loader = UnitBuilder::new("net/example/Loader").routine(
        AccessFlags::PUBLIC | AccessFlags::STATIC,
        "version",
        "()I",
        |code| {
            code.int(1).op(IRETURN);
        },
    );
    artifact.insert("net/example/Loader", loader.bytes().unwrap());
    artifact
}

/// Replaces `Loader.version()I` so that it returns 7.
pub fn host_patches() -> Artifact {
    let patch = patch_unit("patches/LoaderPatch", "net/example/Loader").annotated_routine(
        AccessFlags::PUBLIC | AccessFlags::STATIC,
        "version",
        "()I",
        &[directive("Replace")],
        |code| {
            code.int(7).op(IRETURN);
        },
    );
    Artifact::from_units(ArtifactKind::Host, patches(vec![patch]).into_units())
}

pub fn patches(units: Vec<UnitBuilder>) -> Artifact {
    let mut artifact = Artifact::new(ArtifactKind::Target);
    for unit in units {
        let built = unit.build().unwrap();
        let name = built.name().to_string();
        artifact.insert(name, unit_bytes(&built));
    }
    artifact
}

fn unit_bytes(unit: &classweave::unit::CodeUnit) -> Vec<u8> {
    classweave::unit::encode(
        unit,
        &classweave::unit::EncodeOptions::default(),
        &classweave::unit::ClassHierarchy::default(),
    )
    .unwrap()
}
