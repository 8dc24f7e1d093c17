//! layout-check - verify mod layout manifests without starting the host
//!
//! Exit status: 0 when every manifest passes, 1 on any layout mismatch,
//! 2 on I/O or usage errors.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use shadowhook_core::descriptor::DescriptorCatalog;
use shadowhook_core::layout::{verify, LayoutManifest, VerificationReport};
use shadowhook_sdk::PlatformKey;

#[derive(Parser, Debug)]
#[command(name = "layout-check")]
#[command(version, about = "Check mod layout manifests against platform descriptors", long_about = None)]
struct Cli {
    /// Directory of platform descriptor JSON files
    #[arg(short, long, value_name = "DIR")]
    descriptors: PathBuf,

    /// Layout manifest emitted by a mod (repeatable)
    #[arg(short, long = "manifest", value_name = "FILE", required = true)]
    manifests: Vec<PathBuf>,

    /// Check against this platform instead of each manifest's own
    #[arg(short, long, value_name = "KEY")]
    target: Option<PlatformKey>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .try_init();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

/// Check every manifest, printing one line per mismatch
///
/// Returns whether all of them passed.
fn run(cli: &Cli) -> Result<bool> {
    let catalog = DescriptorCatalog::load_dir(&cli.descriptors)
        .with_context(|| format!("loading descriptors from {:?}", cli.descriptors))?;

    let mut passed = true;
    for path in &cli.manifests {
        let manifest = LayoutManifest::load(path).with_context(|| format!("reading manifest {:?}", path))?;
        let report = check(&catalog, &manifest, cli.target.as_ref())?;

        if report.passed() {
            println!(
                "{}: {} class(es) OK on {}",
                manifest.mod_id,
                report.verdicts.len(),
                report.platform
            );
        } else {
            for mismatch in report.mismatches() {
                println!("{}: {}", manifest.mod_id, mismatch);
            }
            passed = false;
        }
    }

    Ok(passed)
}

fn check(
    catalog: &DescriptorCatalog,
    manifest: &LayoutManifest,
    target: Option<&PlatformKey>,
) -> Result<VerificationReport> {
    let platform = match target {
        Some(key) => key.clone(),
        None => manifest.platform()?,
    };
    let descriptor = catalog.require(&platform)?;
    Ok(verify(&descriptor, &manifest.decls()))
}
