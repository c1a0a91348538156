//! Runs one SMTP health-check probe and prints the measurement as a JSON line

use std::{io, path::PathBuf};

use clap::Parser;
use mailprobe::{
    ConfigError, JsonLinesAccumulator, ProbeConfig,
    config::{self, CONFIG_ENV, SAMPLE_CONFIG},
};
use mailprobe_common::logging;

/// Automates an entire SMTP session and reports metrics
#[derive(Parser, Debug)]
#[command(name = "mailprobe")]
#[command(about = "Probe an SMTP server and report the result", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file (RON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server to probe (host:port), overriding the configuration file
    #[arg(short, long)]
    address: Option<String>,

    /// Print an annotated sample configuration and exit
    #[arg(long)]
    sample_config: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.sample_config {
        print!("{SAMPLE_CONFIG}");
        return Ok(());
    }

    logging::init();

    let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let mut probe = match config::find_config_file(cli.config.as_deref(), from_env.as_deref()) {
        Ok(path) => {
            tracing::debug!("Loading configuration from {}", path.display());
            ProbeConfig::load(&path)?
        }
        Err(ConfigError::NotFound { .. }) if cli.address.is_some() => ProbeConfig::default(),
        Err(err) => return Err(err.into()),
    };

    if let Some(address) = cli.address {
        probe.address = address;
    }

    let mut acc = JsonLinesAccumulator::new(io::stdout().lock());
    let record = mailprobe::gather(&probe, &mut acc).await?;
    tracing::info!(
        result = %record.result(),
        "Probe of {} finished in {:.3}s",
        probe.address,
        record.total_time().as_secs_f64()
    );

    Ok(())
}
