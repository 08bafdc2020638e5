//! fwstationd - firmware provisioning station daemon

#![deny(clippy::unwrap_used)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fwstation_config::{ConfigError, DEFAULT_CONFIG_PATH, StationConfig};
use fwstation_flash::{FlashEngine, FlashSettings};
use fwstation_service::StationDaemon;
use fwstation_verify::{VerificationPipeline, VerificationPolicy, compute_file_sha256};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "fwstationd")]
#[command(about = "Firmware provisioning station: verifies firmware from USB storage and flashes target devices")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, env = "FWSTATION_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log lamp states instead of driving GPIO
    #[arg(long, global = true)]
    no_gpio: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the station (default)
    Run,

    /// Verify a mounted firmware volume once and print the verdict
    Verify {
        /// Mount point of the volume
        mount_point: PathBuf,
    },

    /// Load and validate the configuration, then print it
    CheckConfig,

    /// Check that the flash tool can be started
    ToolVersion,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match execute(&cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            match e.downcast_ref::<ConfigError>() {
                Some(_) => ExitCode::from(2),
                None => ExitCode::FAILURE,
            }
        }
    }
}

async fn execute(cli: &Cli) -> Result<ExitCode> {
    match cli.command.as_ref().unwrap_or(&Command::Run) {
        Command::Run => {
            info!(version = env!("CARGO_PKG_VERSION"), "Starting fwstationd");
            let config = load(&cli.config)?;
            StationDaemon::new(config, cli.no_gpio)
                .run()
                .await
                .context("station failed")?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Verify { mount_point } => {
            let config = load(&cli.config)?;
            let pipeline = VerificationPipeline::new(VerificationPolicy::from_config(&config));
            let verdict = pipeline.verify(mount_point).await;
            if verdict.ok {
                println!("PASS  {}", mount_point.display());
                if let Some(manifest) = &verdict.manifest {
                    println!("  device:   {} ({})", manifest.device_name, manifest.device_id);
                    println!("  version:  {}", manifest.firmware_version);
                }
                if let Some(firmware) = &verdict.firmware_path {
                    println!("  firmware: {}", firmware.display());
                    println!("  sha256:   {}", compute_file_sha256(firmware).await?);
                }
                Ok(ExitCode::SUCCESS)
            } else {
                let step = verdict
                    .failed_step
                    .map(|s| s.to_string())
                    .unwrap_or_default();
                println!("FAIL  {} [{step}] {}", mount_point.display(), verdict.reason);
                Ok(ExitCode::FAILURE)
            }
        }
        Command::CheckConfig => {
            let mut config = StationConfig::load_from_path(&cli.config)?;
            for applied in config.apply_env_overrides(|key| std::env::var(key).ok()) {
                println!("# {} overrides the file: {}", applied.variable, applied.value);
            }
            print!("{}", config.to_yaml_string()?);

            let issues = config.collect_issues();
            if issues.is_empty() {
                config.log_security_posture();
                println!("# configuration is valid");
                return Ok(ExitCode::SUCCESS);
            }
            for issue in &issues {
                println!("# invalid: {issue}");
            }
            Ok(ExitCode::from(2))
        }
        Command::ToolVersion => {
            let config = load(&cli.config)?;
            let engine = FlashEngine::new(FlashSettings::from_config(&config.firmware));
            let banner = engine.tool_version().await?;
            println!("{banner}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load(path: &Path) -> Result<StationConfig> {
    StationConfig::load(path).with_context(|| format!("loading {}", path.display()))
}
