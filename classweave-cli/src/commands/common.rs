use std::path::Path;

use anyhow::Context;
use classweave::{
    file::{Artifact, ArtifactKind},
    mapping::MappingTable,
    pipeline::PipelineConfig,
};

/// Load an artifact directory.
pub fn load_artifact(kind: ArtifactKind, path: &Path) -> anyhow::Result<Artifact> {
    Artifact::from_dir(kind, path)
        .with_context(|| format!("failed to load {kind} artifact: {}", path.display()))
}

/// Load a mapping table.
pub fn load_mapping(path: &Path) -> anyhow::Result<MappingTable> {
    MappingTable::from_file(path)
        .with_context(|| format!("failed to load mapping table: {}", path.display()))
}

/// Pipeline settings from `--config`, with the strip flags of the command line on top.
pub fn pipeline_config(
    path: Option<&Path>,
    strip_debug: bool,
    strip_annotations: bool,
) -> anyhow::Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("failed to read pipeline config: {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    Ok(config
        .strip_debug(config.strip_debug || strip_debug)
        .strip_annotations(config.strip_annotations || strip_annotations))
}

/// Write an artifact to `<out>/<kind>`.
pub fn write_artifact(artifact: &Artifact, out: &Path) -> anyhow::Result<()> {
    let dir = out.join(artifact.kind().to_string());
    artifact
        .write_dir(&dir)
        .with_context(|| format!("failed to write artifact: {}", dir.display()))
}
