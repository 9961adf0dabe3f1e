//! TurnLens CLI
//!
//! Replays recorded tap frames through the turn engine and inspects the
//! producer classification table.

mod config;
mod replay;

use clap::{Parser, Subcommand};
use config::AppConfig;
use std::path::PathBuf;
use std::sync::Arc;
use turnlens_observability::{TurnMetrics, init_logging};
use turnlens_routing::MetricRouter;

#[derive(Parser)]
#[command(name = "turnlens")]
#[command(about = "TurnLens - per-turn latency breakdown for voice pipelines", long_about = None)]
struct Cli {
    /// Path to a YAML or TOML configuration file
    #[arg(long, global = true, env = "TURNLENS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON Lines recording of tap frames and print the session report
    Replay {
        /// Path to the recording
        events: PathBuf,

        /// Print the report as JSON instead of a table
        #[arg(long, default_value = "false")]
        json: bool,

        /// Also print Prometheus metrics collected during the replay
        #[arg(long, default_value = "false")]
        metrics: bool,
    },
    /// Show which producer kind a name maps to
    Classify {
        /// Producer (service) name as reported in measurements
        producer_name: String,
    },
    /// List the producer classification rules in evaluation order
    Rules,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Warning: failed to initialize logging: {}", e);
    }

    match cli.command {
        Commands::Replay {
            events,
            json,
            metrics,
        } => {
            let events = PathBuf::from(shellexpand::tilde(&events.to_string_lossy()).to_string());
            let collector = if metrics {
                Some(Arc::new(TurnMetrics::new()?))
            } else {
                None
            };

            let outcome =
                replay::replay_file(&events, config.observer, !json, collector.clone()).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome.report)?);
            }
            if outcome.stats.unparseable > 0 {
                eprintln!(
                    "Skipped {} unparseable line(s) in {}",
                    outcome.stats.unparseable,
                    events.display()
                );
            }
            if let Some(collector) = collector {
                println!();
                print!("{}", collector.encode_text()?);
            }
        }
        Commands::Classify { producer_name } => {
            let mut router = MetricRouter::new(config.observer.registry());
            match router.classify(&producer_name, None) {
                Ok(kind) => {
                    let rule = router
                        .registry()
                        .find_rule(&producer_name)
                        .map(|rule| rule.display_name())
                        .unwrap_or_default();
                    println!("{} -> {} (rule: {})", producer_name, kind, rule);
                }
                Err(e) => {
                    println!("{} -> unclassified", producer_name);
                    tracing::debug!("{}", e);
                }
            }
        }
        Commands::Rules => {
            let registry = config.observer.registry();
            println!("{:<10} {:<14} {:<24} PATTERN", "PRIORITY", "KIND", "NAME");
            for rule in registry.rules() {
                println!(
                    "{:<10} {:<14} {:<24} {}",
                    rule.priority,
                    rule.kind.as_str(),
                    rule.display_name(),
                    rule.pattern
                );
            }
        }
    }

    Ok(())
}
