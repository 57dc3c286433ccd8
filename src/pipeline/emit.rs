//! The emit phase: streaming units back into bytes.

use std::collections::BTreeSet;

use crate::{
    delta::DeltaCapture,
    file::Artifact,
    pipeline::arena::WorkingSet,
    unit::{encode, DecodeMode, EncodeOptions},
    Result,
};

/// What emission produced.
pub(crate) struct Emitted {
    pub artifact: Artifact,
    pub full: usize,
    pub minimal: usize,
    pub modified: usize,
}

/// Drains the decoded units of `set` in name order into a new artifact.
///
/// Units no plan touched keep their original bytes unless stripping is on. Every unit is
/// dropped as soon as it is written, and the symbol pool is cleared at the end.
pub(crate) fn emit(
    set: &mut WorkingSet,
    touched: &BTreeSet<String>,
    options: &EncodeOptions,
    mut capture: Option<&mut DeltaCapture>,
) -> Result<Emitted> {
    let originals = set.originals;
    let mut emitted = Emitted {
        artifact: Artifact::new(set.kind),
        full: 0,
        minimal: 0,
        modified: 0,
    };

    while let Some((name, unit)) = set.units.pop_first() {
        let Some(original) = originals.get(&name) else {
            return Err(malformed_error!("unit {} has no original bytes", name));
        };
        match unit.mode() {
            DecodeMode::Full => emitted.full += 1,
            DecodeMode::Minimal => emitted.minimal += 1,
        }

        let bytes = if touched.contains(&name) || options.strips() {
            encode(&unit, options, &set.hierarchy)?
        } else {
            original.to_vec()
        };
        drop(unit);

        if bytes != original {
            emitted.modified += 1;
            log::debug!("{} changed, {} -> {} bytes", name, original.len(), bytes.len());
            if let Some(capture) = capture.as_deref_mut() {
                capture.record(set.kind, &name, original, &bytes);
            }
        }
        emitted.artifact.insert(name, bytes);
    }

    set.symbols.clear();
    Ok(emitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::factories::{alpha_artifact, alpha_patches};

    #[test]
    fn untouched_units_keep_their_bytes() {
        let artifact = alpha_artifact();
        let patches = alpha_patches();
        let mut set = WorkingSet::load(&artifact, &patches).unwrap();
        set.decode(&BTreeSet::from(["a7".to_string()])).unwrap();

        let mut capture = DeltaCapture::new();
        let emitted = emit(
            &mut set,
            &BTreeSet::new(),
            &EncodeOptions::default(),
            Some(&mut capture),
        )
        .unwrap();
        assert_eq!(emitted.artifact, artifact);
        assert_eq!((emitted.full, emitted.minimal, emitted.modified), (1, 1, 0));
        assert!(capture.is_empty());
        assert!(set.units.is_empty());
        assert!(set.symbols.is_empty());
    }

    #[test]
    fn stripping_re_encodes_everything() {
        let artifact = alpha_artifact();
        let patches = alpha_patches();
        let mut set = WorkingSet::load(&artifact, &patches).unwrap();
        set.decode(&BTreeSet::new()).unwrap();

        let options = EncodeOptions {
            strip_debug: true,
            strip_annotations: false,
        };
        let emitted = emit(&mut set, &BTreeSet::new(), &options, None).unwrap();
        assert_eq!(emitted.artifact.len(), 2);
        assert_eq!(emitted.minimal, 2);
    }
}
