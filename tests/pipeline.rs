//! End-to-end build-mode runs against on-disk artifacts.

mod common;

use classweave::{
    prelude::*,
    unit::{opcodes::*, AccessFlags, Insn},
};
use common::*;

fn decoded(artifact: &Artifact, name: &str) -> CodeUnit {
    let symbols = SymbolPool::new();
    decode(artifact.get(name).unwrap(), DecodeMode::Full, &symbols).unwrap()
}

#[test]
fn alpha_becomes_a7() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let client_dir = dir.path().join("client");
    let patch_dir = dir.path().join("patches");
    let mapping_path = dir.path().join("mapping-r7.json");
    target().write_dir(&client_dir)?;
    patches(vec![alpha_patch()]).write_dir(&patch_dir)?;
    std::fs::write(&mapping_path, ALPHA_MAPPING)?;

    let table = MappingTable::from_file(&mapping_path)?;
    let client = Artifact::from_dir(ArtifactKind::Target, &client_dir)?;
    let patch_units = Artifact::from_dir(ArtifactKind::Target, &patch_dir)?;
    let (patched, report) = Pipeline::target(&table, PipelineConfig::default()).run(&client, &patch_units, None)?;

    assert_eq!(report.units_modified, 1);
    assert!(!report.directives.contains_key(&DirectiveKind::Shadow));
    assert_eq!(report.directives[&DirectiveKind::Hook], 1);
    assert_eq!(patched.get("w"), client.get("w"));

    let a7 = decoded(&patched, "a7");
    assert!(a7.field("ticks", "I").is_some());
    assert!(a7.field("counter", "I").is_none());
    assert!(a7.routine("onTick", "()V").is_some());

    // every reference to the patch unit now points at a7, and counter became b
    for (index, _) in a7.pool.iter() {
        if let Ok(class) = a7.pool.class_name(index) {
            assert_ne!(class, "patches/AlphaPatch");
        }
    }
    let hook = a7.routine("beforeTick", "()V").unwrap().code().unwrap();
    let touched: Vec<String> = hook
        .insns
        .iter()
        .filter_map(|insn| match insn {
            Insn::Field { op: PUTFIELD, index } => a7.pool.member_ref(*index).ok(),
            _ => None,
        })
        .map(|field| format!("{}.{}:{}", field.owner, field.name, field.descriptor))
        .collect();
    assert_eq!(touched, ["a7.b:I"]);

    let out = dir.path().join("out");
    patched.write_dir(&out)?;
    assert_eq!(Artifact::from_dir(ArtifactKind::Target, &out)?, patched);
    Ok(())
}

#[test]
fn inject_is_idempotent() -> Result<()> {
    let table = mapping();
    let inject_only = patch_unit("patches/Extra", "Alpha")
        .annotated_field(AccessFlags::PUBLIC, "extra", "J", &[directive("Inject")])
        .annotated_routine(AccessFlags::PUBLIC, "extra", "()J", &[directive("Inject")], |code| {
            code.var(ALOAD, 0).field(GETFIELD, "patches/Extra", "extra", "J").op(LRETURN);
        });
    let patch_units = patches(vec![inject_only]);
    let pipeline = Pipeline::target(&table, PipelineConfig::default());

    let (once, first) = pipeline.run(&target(), &patch_units, None)?;
    let (twice, second) = pipeline.run(&once, &patch_units, None)?;
    assert_eq!(first.units_modified, 1);
    assert_eq!(second.units_modified, 0);
    assert_eq!(second.directives_applied(), 0);
    assert_eq!(once, twice);

    let a7 = decoded(&twice, "a7");
    assert_eq!(a7.fields.iter().filter(|field| &*field.name == "extra").count(), 1);
    assert_eq!(a7.routines.iter().filter(|routine| &*routine.name == "extra").count(), 1);
    Ok(())
}

#[test]
fn unresolved_member_changes_nothing() {
    let table = mapping();
    let broken = patch_unit("patches/Broken", "Alpha").annotated_routine(
        AccessFlags::PUBLIC,
        "render",
        "()V",
        &[named("Replace", "render")],
        |code| {
            code.op(RETURN);
        },
    );
    let client = target();
    let result = Pipeline::target(&table, PipelineConfig::default()).run(
        &client,
        &patches(vec![alpha_patch(), broken]),
        None,
    );
    assert!(matches!(result, Err(Error::Resolution { ref symbol, .. }) if symbol == "Alpha.render"));
    assert_eq!(client, target());
}

#[test]
fn conflicting_directives_are_rejected() {
    let table = mapping();
    let replace = |name: &str| {
        patch_unit(name, "Alpha").annotated_routine(
            AccessFlags::PUBLIC,
            "reset",
            "()I",
            &[directive("Replace")],
            |code| {
                code.int(0).op(IRETURN);
            },
        )
    };
    let result = Pipeline::target(&table, PipelineConfig::default()).run(
        &target(),
        &patches(vec![replace("patches/First"), replace("patches/Second")]),
        None,
    );
    assert!(matches!(result, Err(Error::TransformConflict { ref member, .. }) if member == "d()I"));
}

#[test]
fn replace_and_disable() -> Result<()> {
    let table = mapping();
    let patch = patch_unit("patches/Rules", "Alpha")
        .annotated_routine(AccessFlags::PUBLIC, "reset", "()I", &[directive("Replace")], |code| {
            code.int(42).op(IRETURN);
        })
        .annotated_routine(AccessFlags::PUBLIC, "tick", "()V", &[directive("Disable")], |code| {
            code.op(RETURN);
        });
    let (patched, report) =
        Pipeline::target(&table, PipelineConfig::default()).run(&target(), &patches(vec![patch]), None)?;
    assert_eq!(report.directives[&DirectiveKind::Replace], 1);
    assert_eq!(report.directives[&DirectiveKind::Disable], 1);

    let a7 = decoded(&patched, "a7");
    let reset = a7.routine("d", "()I").unwrap().code().unwrap();
    assert_eq!(reset.insns, [Insn::Int { op: BIPUSH, value: 42 }, Insn::Simple(IRETURN)]);
    let tick = a7.routine("c", "()V").unwrap().code().unwrap();
    assert_eq!(tick.insns, [Insn::Simple(RETURN)]);
    Ok(())
}

#[test]
fn interface_fallback_keeps_member_names() -> Result<()> {
    let mut client = target();
    client.insert(
        "zz",
        classweave::unit::UnitBuilder::new("zz")
            .interface("api/Client")
            .routine(AccessFlags::PUBLIC, "getWorld", "()I", |code| {
                code.int(1).op(IRETURN);
            })
            .bytes()?,
    );
    let patch = classweave::unit::UnitBuilder::new("patches/ClientPatch")
        .annotation(
            named("Patch", "Client").with(
                "implementing",
                classweave::unit::ElementValue::String("api/Client".into()),
            ),
        )
        .annotated_routine(AccessFlags::PUBLIC, "getWorld", "()I", &[directive("Replace")], |code| {
            code.int(2).op(IRETURN);
        });

    let table = mapping();
    let (patched, _) =
        Pipeline::target(&table, PipelineConfig::default()).run(&client, &patches(vec![patch]), None)?;
    let zz = decoded(&patched, "zz");
    let body = zz.routine("getWorld", "()I").unwrap().code().unwrap();
    assert_eq!(body.insns[0], Insn::Simple(ICONST_2));
    Ok(())
}

#[test]
fn host_uses_identity_names() -> Result<()> {
    let mut host = Artifact::new(ArtifactKind::Host);
    host.insert(
        "net/example/Loader",
        classweave::unit::UnitBuilder::new("net/example/Loader")
            .routine(AccessFlags::PUBLIC | AccessFlags::STATIC, "version", "()I", |code| {
                code.int(1).op(IRETURN);
            })
            .bytes()?,
    );
    let mut host_patches = Artifact::new(ArtifactKind::Host);
    let patch = patch_unit("patches/LoaderPatch", "net/example/Loader").annotated_routine(
        AccessFlags::PUBLIC | AccessFlags::STATIC,
        "version",
        "()I",
        &[directive("Disable")],
        |code| {
            code.int(7).op(IRETURN);
        },
    );
    host_patches.insert("patches/LoaderPatch", patch.bytes()?);

    let (patched, report) = Pipeline::host(PipelineConfig::default()).run(&host, &host_patches, None)?;
    assert_eq!(report.kind, ArtifactKind::Host);
    let loader = decoded(&patched, "net/example/Loader");
    let body = loader.routine("version", "()I").unwrap().code().unwrap();
    assert_eq!(body.insns, [Insn::Simple(ICONST_0), Insn::Simple(IRETURN)]);
    Ok(())
}

fn ops(unit: &CodeUnit, name: &str, descriptor: &str) -> Vec<u8> {
    let code = unit.routine(name, descriptor).unwrap().code().unwrap();
    code.insns.iter().filter_map(Insn::opcode).collect()
}

fn callee(unit: &CodeUnit, name: &str, descriptor: &str) -> String {
    let code = unit.routine(name, descriptor).unwrap().code().unwrap();
    let index = code
        .insns
        .iter()
        .find_map(|insn| match insn {
            Insn::Method { op: INVOKEVIRTUAL, index } => Some(*index),
            _ => None,
        })
        .unwrap();
    let call = unit.pool.member_ref(index).unwrap();
    format!("{}.{}{}", call.owner, call.name, call.descriptor)
}

#[test]
fn field_hook_reaches_writes_in_other_units() -> Result<()> {
    let mut client = target();
    client.insert(
        "k",
        classweave::unit::UnitBuilder::new("k")
            .routine(AccessFlags::PUBLIC | AccessFlags::STATIC, "set", "(La7;)V", |code| {
                code.var(ALOAD, 0).int(5).field(PUTFIELD, "a7", "b", "I").op(RETURN);
            })
            .bytes()?,
    );
    let patch = patch_unit("patches/CounterWatch", "Alpha").annotated_routine(
        AccessFlags::PRIVATE,
        "onCounter",
        "()V",
        &[named("FieldHook", "counter")],
        |code| {
            code.op(RETURN);
        },
    );
    let patch_units = patches(vec![patch]);
    let table = mapping();

    let mut capture = DeltaCapture::new();
    let (patched, report) = Pipeline::target(&table, PipelineConfig::default()).run(
        &client,
        &patch_units,
        Some(&mut capture),
    )?;
    assert_eq!(report.units_modified, 2);
    assert_eq!(report.directives[&DirectiveKind::FieldHook], 1);
    assert_ne!(patched.get("k"), client.get("k"));
    assert_eq!(patched.get("w"), client.get("w"));

    let k = decoded(&patched, "k");
    assert_eq!(
        ops(&k, "set", "(La7;)V"),
        [ALOAD, ICONST_5, DUP2, PUTFIELD, POP, INVOKEVIRTUAL, RETURN]
    );
    assert_eq!(callee(&k, "set", "(La7;)V"), "a7.onCounter()V");

    // the owner's own write in c() is hooked too
    let a7 = decoded(&patched, "a7");
    assert_eq!(callee(&a7, "c", "()V"), "a7.onCounter()V");

    let mut fresh = client.clone();
    FastPatcher::default().apply(&capture.into_bundle(), &mut fresh)?;
    assert_eq!(fresh, patched);
    Ok(())
}

#[test]
fn field_hook_on_two_slot_field_encodes() -> Result<()> {
    let mut host = Artifact::new(ArtifactKind::Host);
    host.insert(
        "net/example/Stats",
        classweave::unit::UnitBuilder::new("net/example/Stats")
            .field(AccessFlags::PUBLIC, "total", "J")
            .routine(AccessFlags::PUBLIC, "bump", "()V", |code| {
                code.var(ALOAD, 0)
                    .op(LCONST_1)
                    .field(PUTFIELD, "net/example/Stats", "total", "J")
                    .op(RETURN);
            })
            .bytes()?,
    );
    host.insert(
        "net/example/Feeder",
        classweave::unit::UnitBuilder::new("net/example/Feeder")
            .routine(
                AccessFlags::PUBLIC | AccessFlags::STATIC,
                "feed",
                "(Lnet/example/Stats;)V",
                |code| {
                    code.var(ALOAD, 0)
                        .op(LCONST_0)
                        .field(PUTFIELD, "net/example/Stats", "total", "J")
                        .op(RETURN);
                },
            )
            .bytes()?,
    );
    let patch = patch_unit("patches/StatsWatch", "net/example/Stats").annotated_routine(
        AccessFlags::PUBLIC,
        "onTotal",
        "()V",
        &[named("FieldHook", "total")],
        |code| {
            code.op(RETURN);
        },
    );
    let host_patches = Artifact::from_units(ArtifactKind::Host, patches(vec![patch]).into_units());

    let (patched, report) = Pipeline::host(PipelineConfig::default()).run(&host, &host_patches, None)?;
    assert_eq!(report.units_modified, 2);

    let wide_write = [DUP2_X1, POP2, DUP_X2, DUP_X2, POP, PUTFIELD, INVOKEVIRTUAL, RETURN];
    let feeder = decoded(&patched, "net/example/Feeder");
    let feed = ops(&feeder, "feed", "(Lnet/example/Stats;)V");
    assert_eq!(feed[..2], [ALOAD, LCONST_0]);
    assert_eq!(feed[2..], wide_write);
    assert_eq!(
        callee(&feeder, "feed", "(Lnet/example/Stats;)V"),
        "net/example/Stats.onTotal()V"
    );

    let stats = decoded(&patched, "net/example/Stats");
    assert_eq!(ops(&stats, "bump", "()V")[2..], wide_write);
    Ok(())
}

#[test]
fn shadow_only_patch_leaves_the_unit_alone() -> Result<()> {
    let table = mapping();
    let patch = patch_unit("patches/Alias", "Alpha")
        .annotated_field(AccessFlags::PRIVATE, "counter", "I", &[directive("Shadow")])
        .annotated_routine(AccessFlags::PUBLIC, "tick", "()V", &[directive("Shadow")], |code| {
            code.op(RETURN);
        });
    let client = target();
    let (patched, report) =
        Pipeline::target(&table, PipelineConfig::default()).run(&client, &patches(vec![patch]), None)?;
    assert_eq!(report.units_modified, 0);
    assert_eq!(report.directives_applied(), 0);
    assert_eq!(patched, client);
    Ok(())
}
