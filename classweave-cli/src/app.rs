use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// classweave - structural patching of compiled JVM class files
#[derive(Debug, Parser)]
#[command(name = "classweave", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Inputs and outputs of a build-mode run.
#[derive(Debug, clap::Args)]
pub struct BuildArgs {
    /// Target client artifact directory.
    #[arg(long, value_name = "DIR")]
    pub target: PathBuf,

    /// Patch units for the target.
    #[arg(long, value_name = "DIR")]
    pub target_patches: PathBuf,

    /// Mapping table (JSON) of the target revision.
    #[arg(long, value_name = "FILE")]
    pub mapping: PathBuf,

    /// Host runtime artifact directory.
    #[arg(long, value_name = "DIR", requires = "host_patches")]
    pub host: Option<PathBuf>,

    /// Patch units for the host.
    #[arg(long, value_name = "DIR", requires = "host")]
    pub host_patches: Option<PathBuf>,

    /// Output directory; artifacts are written to `<DIR>/target` and `<DIR>/host`.
    #[arg(short, long, value_name = "DIR")]
    pub out: PathBuf,

    /// Capture the changes into a delta bundle.
    #[arg(long, value_name = "FILE")]
    pub bundle: Option<PathBuf>,

    /// Pipeline settings (JSON).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Drop debug attributes from every unit.
    #[arg(long)]
    pub strip_debug: bool,

    /// Drop runtime annotations from every unit.
    #[arg(long)]
    pub strip_annotations: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the full pipeline: decode, merge patches, encode.
    Build(BuildArgs),

    /// Replay a delta bundle against fresh artifacts.
    Fastpatch {
        /// Delta bundle produced by `build --bundle`.
        #[arg(long, value_name = "FILE")]
        bundle: PathBuf,

        /// Target client artifact directory.
        #[arg(long, value_name = "DIR")]
        target: PathBuf,

        /// Host runtime artifact directory.
        #[arg(long, value_name = "DIR")]
        host: Option<PathBuf>,

        /// Output directory; artifacts are written to `<DIR>/target` and `<DIR>/host`.
        #[arg(short, long, value_name = "DIR")]
        out: PathBuf,

        /// Apply deltas in parallel.
        #[arg(long)]
        parallel: bool,

        /// Fast-patch settings (JSON).
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Mapping table for the build-mode fallback when the bundle does not exist.
        #[arg(long, value_name = "FILE")]
        mapping: Option<PathBuf>,

        /// Target patch units for the build-mode fallback.
        #[arg(long, value_name = "DIR")]
        target_patches: Option<PathBuf>,

        /// Host patch units for the build-mode fallback.
        #[arg(long, value_name = "DIR")]
        host_patches: Option<PathBuf>,

        /// Pipeline settings (JSON) for the build-mode fallback.
        #[arg(long, value_name = "FILE")]
        pipeline_config: Option<PathBuf>,

        /// Drop debug attributes in the build-mode fallback.
        #[arg(long)]
        strip_debug: bool,

        /// Drop runtime annotations in the build-mode fallback.
        #[arg(long)]
        strip_annotations: bool,
    },

    /// Print the symbolic listing of a class file.
    Listing {
        /// Path to the `.class` file.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Keep routine bodies raw instead of decoding instructions.
        #[arg(long)]
        minimal: bool,
    },

    /// Show the metadata and entries of a delta bundle.
    BundleInfo {
        /// Path to the bundle.
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
}
