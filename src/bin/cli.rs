//! offerwatch CLI
//!
//! Local and scheduled-job entry point. For AWS Lambda, use `offerwatch-lambda`.

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use offerwatch::{bootstrap, error::Result, models::Config};

/// offerwatch - Offer change detection and push fan-out
#[derive(Parser, Debug)]
#[command(
    name = "offerwatch",
    version,
    about = "Watches a promotional offer page and notifies registered devices"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "offerwatch.toml", global = true)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect a new offer and notify subscribers
    Run {
        /// Stop after the comparison; send nothing and write nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Extract the current offer and print it as JSON
    Extract,

    /// Show the persisted offer state
    Info,

    /// Validate the configuration
    Validate,
}

/// Initialize logging; `RUST_LOG` overrides `level`.
fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = Config::load(&cli.config);
    let level = match (&loaded, cli.verbose) {
        (_, true) => "debug".to_string(),
        (Ok(config), false) => config.logging.level.clone(),
        (Err(_), false) => "info".to_string(),
    };
    init_logging(&level);

    let config = loaded.unwrap_or_else(|e| {
        log::warn!(
            "Config load failed from {}: {}. Using defaults.",
            cli.config.display(),
            e
        );
        Config::default()
    });

    match execute(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            let mut source = e.source();
            while let Some(cause) = source {
                log::error!("  caused by: {}", cause);
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli, mut config: Config) -> Result<()> {
    config.apply_env();

    match cli.command {
        Command::Run { dry_run } => {
            config.validate()?;
            let pipeline = bootstrap::build(&config).await?;
            pipeline.run(dry_run).await?;
        }

        Command::Extract => {
            config.validate()?;
            let extractor = bootstrap::build_extractor(&config)?;
            let offer = extractor.fetch_current_offer().await?;
            println!("{}", serde_json::to_string_pretty(&offer)?);
            if !offer.is_valid() {
                log::warn!("Extracted offer is incomplete");
            }
        }

        Command::Info => {
            let store = bootstrap::build_state_store(&config).await?;
            log::info!("State location: {}", store.location());
            match store.read_last_offer().await {
                Some(state) => {
                    log::info!("Last offer: {}", state.offer.title());
                    log::info!("Link: {}", state.offer.link());
                    match state.notified_at {
                        Some(at) => log::info!("Notified at: {}", at.to_rfc3339()),
                        None => log::info!("Notified at: unknown"),
                    }
                }
                None => log::info!("No offer state found yet."),
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");
        }
    }

    Ok(())
}
