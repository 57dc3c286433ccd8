use std::collections::BTreeMap;

use crate::{
    delta::{create_delta, sha1, DeltaBundle},
    file::ArtifactKind,
};

struct Captured {
    original_sha1: [u8; 20],
    modified_sha1: [u8; 20],
    delta: Vec<u8>,
}

/// Collects the deltas of one or more build-mode runs.
///
/// Pass the capture to [`crate::pipeline::Pipeline::run`] for each artifact, then turn it
/// into a [`DeltaBundle`] with [`DeltaCapture::into_bundle`].
#[derive(Default)]
pub struct DeltaCapture {
    entries: BTreeMap<(ArtifactKind, String), Captured>,
}

impl DeltaCapture {
    /// An empty capture.
    #[must_use]
    pub fn new() -> Self {
        DeltaCapture::default()
    }

    /// Records the change of one unit. Identical pairs are not recorded.
    ///
    /// Returns `true` if an entry was recorded.
    pub fn record(&mut self, kind: ArtifactKind, unit: &str, original: &[u8], modified: &[u8]) -> bool {
        if original == modified {
            return false;
        }
        self.entries.insert(
            (kind, unit.to_string()),
            Captured {
                original_sha1: sha1(original),
                modified_sha1: sha1(modified),
                delta: create_delta(original, modified),
            },
        );
        true
    }

    /// Number of recorded units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds the bundle, stamped with the current time.
    #[must_use]
    pub fn into_bundle(self) -> DeltaBundle {
        let mut bundle = DeltaBundle::new();
        for ((kind, unit), captured) in self.entries {
            bundle.insert(
                kind,
                &unit,
                captured.original_sha1,
                captured.modified_sha1,
                captured.delta,
            );
        }
        log::debug!(
            "captured {} deltas into {} blobs",
            bundle.len(),
            bundle.blob_count()
        );
        bundle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_units_are_not_recorded() {
        let mut capture = DeltaCapture::new();
        assert!(!capture.record(ArtifactKind::Target, "k", b"same", b"same"));
        assert!(capture.record(ArtifactKind::Target, "a7", b"before", b"after"));
        assert!(capture.record(ArtifactKind::Host, "a7", b"before", b"after"));
        assert_eq!(capture.len(), 2);

        let bundle = capture.into_bundle();
        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.blob_count(), 1);
        assert_eq!(bundle.metadata.host_units, 1);
        assert_eq!(bundle.metadata.target_units, 1);
        assert!(bundle.entry(ArtifactKind::Target, "k").is_none());
    }
}
