//! Fast mode: replaying a bundle against a fresh artifact.

use std::path::Path;

use rayon::prelude::*;
use serde::Deserialize;

use crate::{
    delta::{apply_delta, hex, sha1, BundleEntry, DeltaBundle},
    file::{Artifact, ArtifactKind},
    Error, Result,
};

/// Settings of a [`FastPatcher`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FastPatchConfig {
    /// Apply deltas on the rayon thread pool
    pub parallel: bool,
}

impl FastPatchConfig {
    /// Sequential defaults.
    #[must_use]
    pub fn new() -> Self {
        FastPatchConfig::default()
    }

    /// Enables or disables parallel application.
    #[must_use]
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Reads the settings from a JSON file.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] or [`crate::Error::Json`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Applies the deltas of a [`DeltaBundle`] to an artifact.
///
/// Application is all-or-nothing: every entry for the artifact's kind is checked and applied
/// to a copy first, and the artifact is only updated once all of them succeeded.
#[derive(Debug, Clone, Default)]
pub struct FastPatcher {
    config: FastPatchConfig,
}

fn patch_unit(
    kind: ArtifactKind,
    artifact: &Artifact,
    bundle: &DeltaBundle,
    unit: &str,
    entry: &BundleEntry,
) -> Result<Vec<u8>> {
    let failure = |message: String| Error::DeltaApply {
        kind,
        unit: unit.to_string(),
        message,
    };

    let Some(original) = artifact.get(unit) else {
        return Err(failure("unit is missing from the artifact".to_string()));
    };
    let found = sha1(original);
    if found != entry.original_sha1 {
        return Err(failure(format!(
            "original has sha1 {}, bundle expects {}",
            hex(&found),
            hex(&entry.original_sha1)
        )));
    }
    let Some(delta) = bundle.blob(entry.blob) else {
        return Err(failure(format!("blob {} is missing", entry.blob)));
    };
    let modified = apply_delta(original, delta).map_err(|error| failure(error.to_string()))?;
    if sha1(&modified) != entry.modified_sha1 {
        return Err(failure(format!(
            "result does not match sha1 {}",
            hex(&entry.modified_sha1)
        )));
    }
    Ok(modified)
}

impl FastPatcher {
    /// A patcher with the given settings.
    #[must_use]
    pub fn new(config: FastPatchConfig) -> Self {
        FastPatcher { config }
    }

    /// Applies every entry of `bundle` for the kind of `artifact`.
    ///
    /// Returns the number of patched units. Units without an entry are left as they are.
    ///
    /// # Errors
    /// Returns [`Error::DeltaApply`] for the first unit (in name order) that is missing, has
    /// an unexpected hash, or whose delta does not reproduce the recorded result. The
    /// artifact is unchanged in that case.
    pub fn apply(&self, bundle: &DeltaBundle, artifact: &mut Artifact) -> Result<usize> {
        let kind = artifact.kind();
        let entries: Vec<(&str, &BundleEntry)> = bundle.entries(kind).collect();

        let patched: Vec<(String, Vec<u8>)> = if self.config.parallel {
            let shared = &*artifact;
            entries
                .par_iter()
                .map(|(unit, entry)| {
                    patch_unit(kind, shared, bundle, unit, entry).map(|bytes| (unit.to_string(), bytes))
                })
                .collect::<Result<_>>()?
        } else {
            entries
                .iter()
                .map(|(unit, entry)| {
                    patch_unit(kind, artifact, bundle, unit, entry).map(|bytes| (unit.to_string(), bytes))
                })
                .collect::<Result<_>>()?
        };

        let count = patched.len();
        for (unit, bytes) in patched {
            artifact.insert(unit, bytes);
        }
        log::info!(
            "fast-patched {} of {} {} units from bundle generated {}",
            count,
            artifact.len(),
            kind,
            bundle.metadata.generated
        );
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::DeltaCapture;

    fn artifact() -> Artifact {
        let mut artifact = Artifact::new(ArtifactKind::Target);
        artifact.insert("a7", b"class a7 before the patch".to_vec());
        artifact.insert("b2", b"class b2 before the patch".to_vec());
        artifact.insert("k", b"untouched".to_vec());
        artifact
    }

    fn bundle() -> DeltaBundle {
        let original = artifact();
        let mut capture = DeltaCapture::new();
        for name in ["a7", "b2"] {
            let before = original.get(name).unwrap();
            let mut after = before.to_vec();
            after.extend_from_slice(b" and after it");
            capture.record(ArtifactKind::Target, name, before, &after);
        }
        capture.record(ArtifactKind::Host, "h", b"host", b"HOST");
        capture.into_bundle()
    }

    #[test]
    fn applies_matching_kind() {
        let bundle = bundle();
        for parallel in [false, true] {
            let mut artifact = artifact();
            let patcher = FastPatcher::new(FastPatchConfig::new().parallel(parallel));
            assert_eq!(patcher.apply(&bundle, &mut artifact).unwrap(), 2);
            assert_eq!(
                artifact.get("a7").unwrap(),
                b"class a7 before the patch and after it"
            );
            assert_eq!(artifact.get("k").unwrap(), b"untouched");
            assert!(!artifact.contains("h"));
        }
    }

    #[test]
    fn tampered_original_changes_nothing() {
        let bundle = bundle();
        let mut artifact = artifact();
        artifact.insert("b2", b"class b2 from another revision".to_vec());
        let before = artifact.clone();

        let result = FastPatcher::default().apply(&bundle, &mut artifact);
        assert!(matches!(
            result,
            Err(Error::DeltaApply { ref unit, kind: ArtifactKind::Target, .. }) if unit == "b2"
        ));
        assert_eq!(artifact, before);

        artifact.remove("b2");
        assert!(FastPatcher::default().apply(&bundle, &mut artifact).is_err());
    }

    #[test]
    fn config_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fastpatch.json");
        std::fs::write(&path, r#"{ "parallel": true }"#).unwrap();
        assert!(FastPatchConfig::from_file(&path).unwrap().parallel);
    }
}
