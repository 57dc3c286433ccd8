use std::path::Path;

use anyhow::Context;
use classweave::{
    delta::{DeltaBundle, DeltaCapture},
    file::ArtifactKind,
    pipeline::{Pipeline, PipelineConfig, RunReport, Session},
};
use serde::Serialize;

use crate::{
    app::{BuildArgs, GlobalOptions},
    commands::common::{load_artifact, load_mapping, pipeline_config, write_artifact},
    output::{format_size, print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
pub struct BuildSummary {
    pub reports: Vec<RunReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle: Option<BundleSummary>,
}

#[derive(Debug, Serialize)]
pub struct BundleSummary {
    pub path: String,
    pub entries: usize,
    pub blobs: usize,
    pub total_delta_size: u64,
}

/// Paths and settings of one build.
pub struct BuildInputs<'a> {
    pub target: &'a Path,
    pub target_patches: &'a Path,
    pub mapping: &'a Path,
    pub host: Option<(&'a Path, &'a Path)>,
    pub out: &'a Path,
    pub bundle: Option<&'a Path>,
    pub config: PipelineConfig,
}

fn save_bundle(bundle: &DeltaBundle, path: &Path) -> anyhow::Result<BundleSummary> {
    bundle
        .to_file(path)
        .with_context(|| format!("failed to write bundle: {}", path.display()))?;
    Ok(BundleSummary {
        path: path.display().to_string(),
        entries: bundle.len(),
        blobs: bundle.blob_count(),
        total_delta_size: bundle.metadata.total_delta_size,
    })
}

/// Build the target (and the host, if given) and write the results.
pub fn execute(inputs: &BuildInputs) -> anyhow::Result<BuildSummary> {
    let mapping = load_mapping(inputs.mapping)?;
    let target = load_artifact(ArtifactKind::Target, inputs.target)?;
    let target_patches = load_artifact(ArtifactKind::Target, inputs.target_patches)?;
    let config = inputs.config.capture_deltas(inputs.bundle.is_some());

    let (reports, bundle) = match inputs.host {
        Some((host_dir, host_patches_dir)) => {
            let host = load_artifact(ArtifactKind::Host, host_dir)?;
            let host_patches = load_artifact(ArtifactKind::Host, host_patches_dir)?;
            let output = Session::new(mapping, config)
                .build(&host, &host_patches, &target, &target_patches)
                .context("build failed")?;
            write_artifact(&output.host, inputs.out)?;
            write_artifact(&output.target, inputs.out)?;
            (vec![output.host_report, output.target_report], output.bundle)
        }
        None => {
            let mut capture = config.capture_deltas.then(DeltaCapture::new);
            let (patched, report) = Pipeline::target(&mapping, config)
                .run(&target, &target_patches, capture.as_mut())
                .context("build failed")?;
            write_artifact(&patched, inputs.out)?;
            (vec![report], capture.map(DeltaCapture::into_bundle))
        }
    };

    let bundle = match (bundle, inputs.bundle) {
        (Some(bundle), Some(path)) => Some(save_bundle(&bundle, path)?),
        _ => None,
    };
    Ok(BuildSummary { reports, bundle })
}

/// Print run reports as a table.
pub fn print_reports(reports: &[RunReport]) {
    let mut table = TabWriter::new(vec![
        ("ARTIFACT", Align::Left),
        ("UNITS", Align::Right),
        ("FULL", Align::Right),
        ("MINIMAL", Align::Right),
        ("MODIFIED", Align::Right),
        ("DIRECTIVES", Align::Right),
        ("IN", Align::Right),
        ("OUT", Align::Right),
    ]);
    for report in reports {
        table.row(vec![
            report.kind.to_string(),
            report.units_total.to_string(),
            report.units_full.to_string(),
            report.units_minimal.to_string(),
            report.units_modified.to_string(),
            report.directives_applied().to_string(),
            format_size(report.bytes_in),
            format_size(report.bytes_out),
        ]);
    }
    table.print();

    for report in reports.iter().filter(|report| !report.directives.is_empty()) {
        println!();
        println!("{} directives:", report.kind);
        let mut kinds = TabWriter::new(vec![("KIND", Align::Left), ("APPLIED", Align::Right)]).indent("  ");
        for (kind, count) in &report.directives {
            kinds.row(vec![kind.to_string(), count.to_string()]);
        }
        kinds.print();
        if report.skipped_sites > 0 {
            println!("  {} field writes in constructors were not hooked", report.skipped_sites);
        }
    }
}

pub fn run(args: &BuildArgs, opts: &GlobalOptions) -> anyhow::Result<()> {
    let config = pipeline_config(args.config.as_deref(), args.strip_debug, args.strip_annotations)?;
    let host = args.host.as_deref().zip(args.host_patches.as_deref());
    let summary = execute(&BuildInputs {
        target: &args.target,
        target_patches: &args.target_patches,
        mapping: &args.mapping,
        host,
        out: &args.out,
        bundle: args.bundle.as_deref(),
        config,
    })?;

    print_output(&summary, opts, |summary| {
        print_reports(&summary.reports);
        if let Some(bundle) = &summary.bundle {
            println!();
            println!(
                "Bundle {}: {} entries, {} blobs, {}",
                bundle.path,
                bundle.entries,
                bundle.blobs,
                format_size(bundle.total_delta_size)
            );
        }
    })
}
