mod app;
mod commands;
mod output;

use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })?;

    let cli = Cli::parse();

    // classweave info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("classweave", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::Build(args) => commands::build::run(args, &cli.global),
        Command::Fastpatch {
            bundle,
            target,
            host,
            out,
            parallel,
            config,
            mapping,
            target_patches,
            host_patches,
            pipeline_config,
            strip_debug,
            strip_annotations,
        } => commands::fastpatch::run(
            &commands::fastpatch::FastpatchOptions {
                bundle,
                target,
                host: host.as_deref(),
                out,
                parallel: *parallel,
                config: config.as_deref(),
                fallback: commands::fastpatch::Fallback {
                    mapping: mapping.as_deref(),
                    target_patches: target_patches.as_deref(),
                    host_patches: host_patches.as_deref(),
                    config: pipeline_config.as_deref(),
                    strip_debug: *strip_debug,
                    strip_annotations: *strip_annotations,
                },
            },
            &cli.global,
        ),
        Command::Listing { path, minimal } => commands::listing::run(path, *minimal, &cli.global),
        Command::BundleInfo { path } => commands::bundle_info::run(path, &cli.global),
    }
}
