//! Snort - Main Entry Point
//!
//! Loads the configuration and rule file, builds the processing graph and
//! writes the statement descriptor for the runtime at the configured
//! segment.

use anyhow::Context;
use clap::Parser;
use openbox_core::{launch, JsonDeployer};
use openbox_snort::config::DEFAULT_CONFIG_PATH;
use openbox_snort::{SnortApp, SnortConfig};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "snort")]
#[command(version)]
#[command(about = "Snort-style intrusion detection on an OpenBox processing graph", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, short, env = "SNORT_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Write the statement descriptor here instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Pretty-print the descriptor
    #[arg(long)]
    pretty: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    tracing::info!("OpenBox Snort v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();

    let (config, warnings) = SnortConfig::load(&cli.config);
    let mut app = SnortApp::new(config).with_config_warnings(warnings);

    let writer: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };
    let mut deployer = JsonDeployer::new(writer);
    if cli.pretty {
        deployer = deployer.pretty();
    }

    let descriptors = launch(&mut app, &mut deployer).context("failed to deploy Snort")?;

    tracing::info!(
        statements = descriptors.len(),
        config_warnings = app.config_warnings().len(),
        rule_file_ok = app.rule_warning().is_none(),
        "Snort deployed"
    );

    Ok(())
}
