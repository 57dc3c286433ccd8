use std::path::Path;

use anyhow::Context;
use classweave::{
    delta::{hex, BundleMetadata, DeltaBundle},
    file::ArtifactKind,
};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    output::{format_size, print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
pub struct BundleInfo {
    pub metadata: BundleMetadata,
    pub blobs: usize,
    pub entries: Vec<EntryInfo>,
}

#[derive(Debug, Serialize)]
pub struct EntryInfo {
    pub kind: ArtifactKind,
    pub unit: String,
    pub original_sha1: String,
    pub modified_sha1: String,
    pub blob: u32,
    pub delta_size: usize,
}

pub fn run(path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let bundle = DeltaBundle::from_file(path)
        .with_context(|| format!("failed to read bundle: {}", path.display()))?;

    let mut entries = Vec::with_capacity(bundle.len());
    for kind in [ArtifactKind::Host, ArtifactKind::Target] {
        for (unit, entry) in bundle.entries(kind) {
            entries.push(EntryInfo {
                kind,
                unit: unit.to_string(),
                original_sha1: hex(&entry.original_sha1),
                modified_sha1: hex(&entry.modified_sha1),
                blob: entry.blob,
                delta_size: bundle.blob(entry.blob).map_or(0, <[u8]>::len),
            });
        }
    }
    let info = BundleInfo {
        metadata: bundle.metadata.clone(),
        blobs: bundle.blob_count(),
        entries,
    };

    print_output(&info, opts, |info| {
        println!("Generated:   {}", info.metadata.generated.to_rfc3339());
        println!("Host units:  {}", info.metadata.host_units);
        println!("Target:      {}", info.metadata.target_units);
        println!(
            "Blobs:       {} ({})",
            info.blobs,
            format_size(info.metadata.total_delta_size)
        );
        println!();

        let mut table = TabWriter::new(vec![
            ("ARTIFACT", Align::Left),
            ("UNIT", Align::Left),
            ("ORIGINAL", Align::Left),
            ("MODIFIED", Align::Left),
            ("BLOB", Align::Right),
            ("DELTA", Align::Right),
        ]);
        for entry in &info.entries {
            table.row(vec![
                entry.kind.to_string(),
                entry.unit.clone(),
                entry.original_sha1[..12].to_string(),
                entry.modified_sha1[..12].to_string(),
                entry.blob.to_string(),
                format_size(entry.delta_size as u64),
            ]);
        }
        table.print();
    })
}
