use std::path::Path;

use anyhow::{bail, Context};
use classweave::{
    delta::{DeltaBundle, FastPatchConfig, FastPatcher},
    file::ArtifactKind,
};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::{
        build::{self, BuildInputs},
        common::{load_artifact, pipeline_config, write_artifact},
    },
    output::{print_output, Align, TabWriter},
};

/// Build inputs used when the bundle does not exist.
pub struct Fallback<'a> {
    pub mapping: Option<&'a Path>,
    pub target_patches: Option<&'a Path>,
    pub host_patches: Option<&'a Path>,
    pub config: Option<&'a Path>,
    pub strip_debug: bool,
    pub strip_annotations: bool,
}

pub struct FastpatchOptions<'a> {
    pub bundle: &'a Path,
    pub target: &'a Path,
    pub host: Option<&'a Path>,
    pub out: &'a Path,
    pub parallel: bool,
    pub config: Option<&'a Path>,
    pub fallback: Fallback<'a>,
}

#[derive(Debug, Serialize)]
pub struct PatchedArtifact {
    pub kind: ArtifactKind,
    pub units: usize,
    pub patched: usize,
}

fn build_instead(options: &FastpatchOptions, opts: &GlobalOptions) -> anyhow::Result<()> {
    let (Some(mapping), Some(target_patches)) = (options.fallback.mapping, options.fallback.target_patches)
    else {
        bail!(
            "bundle {} does not exist; pass --mapping and --target-patches to build instead",
            options.bundle.display()
        );
    };
    log::warn!("bundle {} does not exist, running build mode", options.bundle.display());

    let summary = build::execute(&BuildInputs {
        target: options.target,
        target_patches,
        mapping,
        host: options.host.zip(options.fallback.host_patches),
        out: options.out,
        bundle: Some(options.bundle),
        config: pipeline_config(
            options.fallback.config,
            options.fallback.strip_debug,
            options.fallback.strip_annotations,
        )?,
    })?;
    print_output(&summary, opts, |summary| build::print_reports(&summary.reports))
}

pub fn run(options: &FastpatchOptions, opts: &GlobalOptions) -> anyhow::Result<()> {
    if !options.bundle.exists() {
        return build_instead(options, opts);
    }

    let config = match options.config {
        Some(path) => FastPatchConfig::from_file(path)
            .with_context(|| format!("failed to read fast-patch config: {}", path.display()))?,
        None => FastPatchConfig::default(),
    };
    let patcher = FastPatcher::new(config.parallel(config.parallel || options.parallel));
    let bundle = DeltaBundle::from_file(options.bundle)
        .with_context(|| format!("failed to read bundle: {}", options.bundle.display()))?;

    let mut inputs = vec![(ArtifactKind::Target, options.target)];
    if let Some(host) = options.host {
        inputs.push((ArtifactKind::Host, host));
    }

    // nothing is written until every artifact patched cleanly
    let mut patched_artifacts = Vec::with_capacity(inputs.len());
    for (kind, dir) in inputs {
        let mut artifact = load_artifact(kind, dir)?;
        let patched = patcher
            .apply(&bundle, &mut artifact)
            .with_context(|| format!("fast patch of {kind} artifact failed"))?;
        patched_artifacts.push((artifact, patched));
    }

    let mut results = Vec::with_capacity(patched_artifacts.len());
    for (artifact, patched) in &patched_artifacts {
        write_artifact(artifact, options.out)?;
        results.push(PatchedArtifact {
            kind: artifact.kind(),
            units: artifact.len(),
            patched: *patched,
        });
    }

    print_output(&results, opts, |results| {
        let mut table = TabWriter::new(vec![
            ("ARTIFACT", Align::Left),
            ("UNITS", Align::Right),
            ("PATCHED", Align::Right),
        ]);
        for result in results {
            table.row(vec![
                result.kind.to_string(),
                result.units.to_string(),
                result.patched.to_string(),
            ]);
        }
        table.print();
    })
}
