//! The build-mode pipeline: `Load → Classify → Transform → Emit`.
//!
//! One [`Pipeline`] patches one artifact. The host runtime and the target client each get
//! their own instance, sharing every component but no state: each run owns a
//! [`arena::WorkingSet`] that is created by Load and drained by Emit.
//!
//! 1. *Load* probes every artifact unit and fully decodes every patch unit, extracting and
//!    validating its directives.
//! 2. *Classify* resolves all symbolic names, detects conflicting directives, builds the
//!    remapper and decides which units need a full decode. Nothing is modified until every
//!    name has been resolved. Units are then decoded into the working set.
//! 3. *Transform* applies the resolved plans in global phase order.
//! 4. *Emit* encodes the units in name order, captures deltas and evicts each unit.
//!
//! # Examples
//!
//! ```rust,no_run
//! use classweave::prelude::*;
//! use std::path::Path;
//!
//! let table = MappingTable::from_file(Path::new("mapping-r7.json"))?;
//! let client = Artifact::from_dir(ArtifactKind::Target, Path::new("client"))?;
//! let patches = Artifact::from_dir(ArtifactKind::Target, Path::new("patches/target"))?;
//!
//! let pipeline = Pipeline::target(&table, PipelineConfig::default().strip_debug(true));
//! let (patched, report) = pipeline.run(&client, &patches, None)?;
//! println!("{report}");
//! patched.write_dir(Path::new("client-patched"))?;
//! # Ok::<(), classweave::Error>(())
//! ```

pub mod arena;
pub mod classify;

mod emit;

use std::{borrow::Cow, collections::BTreeMap, fmt, path::Path, time::Instant};

use serde::{Deserialize, Serialize};

use crate::{
    delta::{DeltaBundle, DeltaCapture},
    file::{Artifact, ArtifactKind},
    mapping::MappingTable,
    patch::DirectiveKind,
    pipeline::{arena::WorkingSet, classify::classify},
    transform::{apply_all, TransformContext, TransformStats},
    unit::EncodeOptions,
    Error, Result,
};

/// Settings of a build-mode run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Drop `SourceFile`, line number and local variable tables of every unit
    pub strip_debug: bool,
    /// Drop runtime annotations of every unit
    pub strip_annotations: bool,
    /// Have [`Session::build`] capture a delta bundle
    pub capture_deltas: bool,
}

impl PipelineConfig {
    /// Defaults: no stripping, no capture.
    #[must_use]
    pub fn new() -> Self {
        PipelineConfig::default()
    }

    /// Enables or disables debug stripping.
    #[must_use]
    pub fn strip_debug(mut self, strip: bool) -> Self {
        self.strip_debug = strip;
        self
    }

    /// Enables or disables annotation stripping.
    #[must_use]
    pub fn strip_annotations(mut self, strip: bool) -> Self {
        self.strip_annotations = strip;
        self
    }

    /// Enables or disables delta capture in [`Session::build`].
    #[must_use]
    pub fn capture_deltas(mut self, capture: bool) -> Self {
        self.capture_deltas = capture;
        self
    }

    /// Reads the settings from a JSON file. Missing keys keep their defaults.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] or [`crate::Error::Json`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    fn encode_options(&self) -> EncodeOptions {
        EncodeOptions {
            strip_debug: self.strip_debug,
            strip_annotations: self.strip_annotations,
        }
    }
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// The patched artifact
    pub kind: ArtifactKind,
    /// Units in the artifact
    pub units_total: usize,
    /// Units decoded in full
    pub units_full: usize,
    /// Units decoded minimally
    pub units_minimal: usize,
    /// Units whose bytes changed
    pub units_modified: usize,
    /// Applied plans per directive kind
    pub directives: BTreeMap<DirectiveKind, usize>,
    /// Field writes that were left unhooked
    pub skipped_sites: usize,
    /// Total input size
    pub bytes_in: u64,
    /// Total output size
    pub bytes_out: u64,
}

impl RunReport {
    /// An empty report.
    #[must_use]
    pub fn new(kind: ArtifactKind) -> Self {
        RunReport {
            kind,
            units_total: 0,
            units_full: 0,
            units_minimal: 0,
            units_modified: 0,
            directives: BTreeMap::new(),
            skipped_sites: 0,
            bytes_in: 0,
            bytes_out: 0,
        }
    }

    /// Sum of applied plans.
    #[must_use]
    pub fn directives_applied(&self) -> usize {
        self.directives.values().sum()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} units ({} full, {} minimal), {} modified, {} directives applied",
            self.kind,
            self.units_total,
            self.units_full,
            self.units_minimal,
            self.units_modified,
            self.directives_applied()
        )?;
        if self.skipped_sites > 0 {
            write!(f, ", {} write sites skipped", self.skipped_sites)?;
        }
        write!(f, ", {} -> {} bytes", self.bytes_in, self.bytes_out)
    }
}

/// One build-mode pipeline instance.
pub struct Pipeline<'a> {
    kind: ArtifactKind,
    table: Cow<'a, MappingTable>,
    config: PipelineConfig,
}

impl Pipeline<'static> {
    /// The host instance. Host names are not obfuscated, so it resolves through the identity
    /// table.
    #[must_use]
    pub fn host(config: PipelineConfig) -> Self {
        Pipeline {
            kind: ArtifactKind::Host,
            table: Cow::Owned(MappingTable::identity()),
            config,
        }
    }
}

impl<'a> Pipeline<'a> {
    /// The target instance, resolving through `table`.
    #[must_use]
    pub fn target(table: &'a MappingTable, config: PipelineConfig) -> Self {
        Pipeline {
            kind: ArtifactKind::Target,
            table: Cow::Borrowed(table),
            config,
        }
    }

    /// The artifact kind this instance patches.
    #[must_use]
    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Runs all phases over `artifact` with the units of `patches`.
    ///
    /// Changed units are recorded into `capture` if one is given.
    ///
    /// # Errors
    /// Any error aborts the run: [`Error::Decode`] from Load, [`Error::Resolution`],
    /// [`Error::TransformConflict`] or [`Error::Directive`] from Classify,
    /// [`Error::Transform`] from Transform and [`Error::Encode`] from Emit. An artifact of
    /// the other kind is rejected with [`Error::Error`].
    pub fn run(
        &self,
        artifact: &Artifact,
        patches: &Artifact,
        capture: Option<&mut DeltaCapture>,
    ) -> Result<(Artifact, RunReport)> {
        if artifact.kind() != self.kind {
            return Err(Error::Error(format!(
                "{} pipeline cannot patch a {} artifact",
                self.kind,
                artifact.kind()
            )));
        }
        let started = Instant::now();

        let mut set = WorkingSet::load(artifact, patches)?;
        log::info!(
            "{}: loaded {} units and {} patch units",
            self.kind,
            set.probes.len(),
            set.patches.len()
        );

        let classified = classify(&set, &self.table)?;
        set.decode(&classified.full)?;
        log::info!(
            "{}: {} plans, {} units decoded in full",
            self.kind,
            classified.plans.len(),
            classified.full.len()
        );

        let mut stats = TransformStats::default();
        let mut ctx = TransformContext {
            remapper: &classified.remapper,
            hierarchy: &set.hierarchy,
            stats: &mut stats,
        };
        apply_all(&classified.plans, &mut set.units, &set.patches, &mut ctx)?;
        log::info!(
            "{}: applied {} plans to {} units",
            self.kind,
            stats.total(),
            stats.touched.len()
        );

        let emitted = emit::emit(&mut set, &stats.touched, &self.config.encode_options(), capture)?;

        let report = RunReport {
            kind: self.kind,
            units_total: artifact.len(),
            units_full: emitted.full,
            units_minimal: emitted.minimal,
            units_modified: emitted.modified,
            directives: stats.applied,
            skipped_sites: stats.skipped_sites,
            bytes_in: artifact.total_size(),
            bytes_out: emitted.artifact.total_size(),
        };
        log::info!("{} in {:.2?}", report, started.elapsed());
        Ok((emitted.artifact, report))
    }
}

/// Output of [`Session::build`].
pub struct SessionOutput {
    /// The patched host artifact
    pub host: Artifact,
    /// The patched target artifact
    pub target: Artifact,
    /// Report of the host run
    pub host_report: RunReport,
    /// Report of the target run
    pub target_report: RunReport,
    /// Captured deltas of both runs, if capture was enabled
    pub bundle: Option<DeltaBundle>,
}

/// Both pipeline instances of a deployment, sharing one mapping table and one configuration.
pub struct Session {
    mapping: MappingTable,
    config: PipelineConfig,
}

impl Session {
    /// A session patching the target through `mapping`.
    #[must_use]
    pub fn new(mapping: MappingTable, config: PipelineConfig) -> Self {
        Session { mapping, config }
    }

    /// The mapping table of the target run.
    #[must_use]
    pub fn mapping(&self) -> &MappingTable {
        &self.mapping
    }

    /// Builds the host and then the target, optionally capturing both into one bundle.
    ///
    /// # Errors
    /// The first error of either run, see [`Pipeline::run`].
    pub fn build(
        &self,
        host: &Artifact,
        host_patches: &Artifact,
        target: &Artifact,
        target_patches: &Artifact,
    ) -> Result<SessionOutput> {
        let mut capture = self.config.capture_deltas.then(DeltaCapture::new);

        let (host, host_report) =
            Pipeline::host(self.config).run(host, host_patches, capture.as_mut())?;
        let (target, target_report) =
            Pipeline::target(&self.mapping, self.config).run(target, target_patches, capture.as_mut())?;

        Ok(SessionOutput {
            host,
            target,
            host_report,
            target_report,
            bundle: capture.map(DeltaCapture::into_bundle),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test::factories::{alpha_artifact, alpha_mapping, alpha_patches, minimal_class_bytes},
        unit::{decode, opcodes::*, DecodeMode, Insn, SymbolPool},
    };

    #[test]
    fn alpha_scenario() {
        let table = alpha_mapping();
        let artifact = alpha_artifact();
        let mut capture = DeltaCapture::new();
        let (patched, report) = Pipeline::target(&table, PipelineConfig::default())
            .run(&artifact, &alpha_patches(), Some(&mut capture))
            .unwrap();

        assert_eq!(report.units_total, 2);
        assert_eq!((report.units_full, report.units_minimal), (1, 1));
        assert_eq!(report.units_modified, 1);
        assert_eq!(report.directives[&DirectiveKind::Hook], 1);
        assert_eq!(patched.get("k"), artifact.get("k"));
        assert_eq!(capture.len(), 1);

        let symbols = SymbolPool::new();
        let unit = decode(patched.get("a7").unwrap(), DecodeMode::Full, &symbols).unwrap();
        assert!(unit.field("ticks", "I").is_some());
        assert!(unit.routine("onTick", "()V").is_some());
        let tick = unit.routine("c", "()V").unwrap().code().unwrap();
        let Insn::Method { index, .. } = tick.insns[1] else {
            panic!("hook call missing: {:?}", tick.insns);
        };
        let call = unit.pool.member_ref(index).unwrap();
        assert_eq!((call.owner, call.name), ("a7", "beforeTick"));

        let hook = unit.routine("beforeTick", "()V").unwrap().code().unwrap();
        let fields: Vec<_> = hook
            .insns
            .iter()
            .filter_map(|insn| match insn {
                Insn::Field { op: GETFIELD, index } => Some(unit.pool.member_ref(*index).unwrap()),
                _ => None,
            })
            .map(|field| (field.owner.to_string(), field.name.to_string()))
            .collect();
        assert_eq!(fields, [("a7".to_string(), "b".to_string())]);
    }

    #[test]
    fn rejects_the_other_kind() {
        let artifact = alpha_artifact();
        let result = Pipeline::host(PipelineConfig::default()).run(&artifact, &alpha_patches(), None);
        assert!(matches!(result, Err(Error::Error(_))));
    }

    #[test]
    fn session_builds_both_artifacts() {
        let mut host = Artifact::new(ArtifactKind::Host);
        host.insert("net/example/Loader", minimal_class_bytes("net/example/Loader"));
        let host_patches = Artifact::new(ArtifactKind::Host);

        let session = Session::new(alpha_mapping(), PipelineConfig::new().capture_deltas(true));
        let output = session
            .build(&host, &host_patches, &alpha_artifact(), &alpha_patches())
            .unwrap();
        assert_eq!(output.host, host);
        assert_eq!(output.host_report.units_modified, 0);
        assert_eq!(output.target_report.units_modified, 1);

        let bundle = output.bundle.unwrap();
        assert_eq!(bundle.metadata.host_units, 0);
        assert_eq!(bundle.metadata.target_units, 1);
        assert!(bundle.entry(ArtifactKind::Target, "a7").is_some());
    }

    #[test]
    fn config_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"{ "strip_debug": true }"#).unwrap();
        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config, PipelineConfig::new().strip_debug(true));
    }
}
