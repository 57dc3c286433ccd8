//! The phase-scoped working set of one pipeline run.
//!
//! Everything a run holds lives here and nowhere else: probes and decoded units of the
//! artifact, the decoded patch units, the symbol pool and the hierarchy. The set is created
//! by the load phase and consumed by emission, so nothing survives a run.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    file::{Artifact, ArtifactKind},
    patch::PatchUnit,
    unit::{decode, ClassHierarchy, CodeUnit, DecodeMode, SymbolPool, UnitProbe},
    Result,
};

/// Units, patches and lookups of one run.
pub struct WorkingSet<'a> {
    /// Which artifact this run patches
    pub kind: ArtifactKind,
    /// The input bytes, for decoding and for comparison at emit time
    pub originals: &'a Artifact,
    /// Header facts of every artifact unit
    pub probes: BTreeMap<String, UnitProbe>,
    /// Decoded artifact units, filled by [`WorkingSet::decode`]
    pub units: BTreeMap<String, CodeUnit>,
    /// Fully decoded patch units, in name order
    pub patches: Vec<PatchUnit>,
    /// Interned strings of every decoded pool
    pub symbols: SymbolPool,
    /// Superclass links and interface flags of the artifact
    pub hierarchy: ClassHierarchy,
}

impl<'a> WorkingSet<'a> {
    /// The load phase: probes every artifact unit and decodes every patch unit.
    ///
    /// # Errors
    /// Returns [`crate::Error::Decode`] naming the first unit that fails to probe or decode,
    /// and [`crate::Error::Directive`] if a patch unit carries invalid directives.
    pub fn load(originals: &'a Artifact, patches: &Artifact) -> Result<Self> {
        let symbols = SymbolPool::new();

        let mut probes = BTreeMap::new();
        for (name, bytes) in originals.iter() {
            let probe = UnitProbe::parse(bytes, &symbols).map_err(|error| error.in_unit(name))?;
            if probe.name != name {
                return Err(malformed_error!("unit stored as {} declares {}", name, probe.name).in_unit(name));
            }
            probes.insert(name.to_string(), probe);
        }
        let hierarchy = ClassHierarchy::from_probes(probes.values());

        let mut decoded = Vec::with_capacity(patches.len());
        for (name, bytes) in patches.iter() {
            let unit = decode(bytes, DecodeMode::Full, &symbols).map_err(|error| error.in_unit(name))?;
            decoded.push(PatchUnit::from_unit(unit)?);
        }

        log::debug!(
            "loaded {} {} units and {} patch units",
            probes.len(),
            originals.kind(),
            decoded.len()
        );
        Ok(WorkingSet {
            kind: originals.kind(),
            originals,
            probes,
            units: BTreeMap::new(),
            patches: decoded,
            symbols,
            hierarchy,
        })
    }

    /// Decodes every artifact unit, in full if it is named in `full` and minimally otherwise.
    ///
    /// # Errors
    /// Returns [`crate::Error::Decode`] naming the first unit that fails to decode.
    pub fn decode(&mut self, full: &BTreeSet<String>) -> Result<()> {
        for (name, bytes) in self.originals.iter() {
            let mode = if full.contains(name) {
                DecodeMode::Full
            } else {
                DecodeMode::Minimal
            };
            let unit = decode(bytes, mode, &self.symbols).map_err(|error| error.in_unit(name))?;
            self.units.insert(name.to_string(), unit);
        }
        Ok(())
    }
}
