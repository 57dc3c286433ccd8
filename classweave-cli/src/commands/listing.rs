use std::path::Path;

use anyhow::Context;
use classweave::unit::{decode, DecodeMode, SymbolPool};
use serde::Serialize;

use crate::{app::GlobalOptions, output::print_output};

#[derive(Debug, Serialize)]
pub struct UnitSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub super_name: Option<String>,
    pub access: String,
    pub interfaces: Vec<String>,
    pub fields: Vec<String>,
    pub routines: Vec<String>,
    #[serde(skip)]
    pub listing: String,
}

pub fn run(path: &Path, minimal: bool, opts: &GlobalOptions) -> anyhow::Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mode = if minimal {
        DecodeMode::Minimal
    } else {
        DecodeMode::Full
    };
    let symbols = SymbolPool::new();
    let unit = decode(&bytes, mode, &symbols)
        .with_context(|| format!("failed to decode {}", path.display()))?;

    let summary = UnitSummary {
        name: unit.name().to_string(),
        super_name: unit.super_name().map(str::to_string),
        access: format!("{:#06x}", unit.access.bits()),
        interfaces: unit
            .interface_names()?
            .into_iter()
            .map(str::to_string)
            .collect(),
        fields: unit
            .fields
            .iter()
            .map(|field| format!("{}:{}", field.name, field.descriptor))
            .collect(),
        routines: unit
            .routines
            .iter()
            .map(|routine| format!("{}{}", routine.name, routine.descriptor))
            .collect(),
        listing: unit.to_string(),
    };

    print_output(&summary, opts, |summary| print!("{}", summary.listing))
}
