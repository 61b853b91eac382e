//! `handsign` command-line interface.
//!
//! ```bash
//! handsign define wave "hello"
//! handsign classify 0.1 0.2 0.3
//! handsign retrain --db learning.db --out offline_model.json
//! handsign analytics --json
//! handsign sync --once
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use handsign::analytics::AnalyticsAggregator;
use handsign::gesture::{GestureStatus, LandmarkVector};
use handsign::learning::RetrainJob;
use handsign::store::LearningStore;
use handsign::sync::{Connectivity, SharedConnectivity};
use handsign::{Config, GestureEngine};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "handsign")]
#[command(about = "Gesture recognition with offline fallback and continuous learning")]
#[command(version)]
struct Cli {
    /// Path to the TOML config (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one landmark vector
    Classify {
        /// Flat landmark coordinates
        #[arg(required = true, allow_hyphen_values = true)]
        coords: Vec<f64>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Define a new gesture (status `training`)
    Define { id: String, label: String },

    /// Enable, disable, or promote a gesture
    Status {
        id: String,
        #[arg(value_parser = ["training", "ready", "disabled"])]
        status: String,
    },

    /// List gesture definitions
    Gestures {
        #[arg(long)]
        json: bool,
    },

    /// Rebuild the offline model from the training log
    Retrain {
        /// Learning database (defaults to the configured one)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Artifact output path (defaults to the active model path)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Artifact version (defaults to a UTC timestamp)
        #[arg(long)]
        version: Option<String>,
    },

    /// Recompute analytics snapshots and print them
    Analytics {
        #[arg(long)]
        db: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Sync with the central store
    Sync {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,

        /// Treat the current link as metered
        #[arg(long)]
        metered: bool,
    },
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(cli.config.as_deref())?;
    init_tracing(&config);

    match cli.command {
        Commands::Classify { coords, json } => {
            let vector = LandmarkVector::new(coords)?;
            let engine = GestureEngine::from_config(config)?;
            let result = engine.classify(&vector).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!(
                    "{} (confidence {:.2}, {}){}",
                    result.label,
                    result.confidence,
                    result.processed_by.as_str(),
                    if result.requires_confirmation {
                        ", needs confirmation"
                    } else {
                        ""
                    }
                );
                for suggestion in &result.suggestions {
                    println!("  - {suggestion}");
                }
            }
        }

        Commands::Define { id, label } => {
            let store = LearningStore::open(&config.database_path())?;
            let def = store.define_gesture(&id, &label)?;
            println!("{} \"{}\" ({})", def.id, def.label, def.status.as_str());
        }

        Commands::Status { id, status } => {
            let store = LearningStore::open(&config.database_path())?;
            if !store.set_gesture_status(&id, GestureStatus::from_str_lossy(&status))? {
                anyhow::bail!("Unknown gesture: {id}");
            }
            println!("{id} → {status}");
        }

        Commands::Gestures { json } => {
            let store = LearningStore::open(&config.database_path())?;
            let gestures = store.gestures()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&gestures)?);
            } else {
                for def in gestures {
                    println!(
                        "{:<16} {:<10} health {:>3}  threshold {:.2}  sessions {}",
                        def.id,
                        def.status.as_str(),
                        def.health_score,
                        def.min_confidence_threshold,
                        def.training_sessions_count
                    );
                }
            }
        }

        Commands::Retrain { db, out, version } => {
            let db = db.unwrap_or_else(|| config.database_path());
            let out = out.unwrap_or_else(|| config.model_path());
            let store = Arc::new(
                LearningStore::open(&db)
                    .with_context(|| format!("Failed to open {}", db.display()))?,
            );
            let (_, summary) = RetrainJob::new(store).run(&out, version)?;
            println!(
                "Wrote model {} ({} gestures from {} samples) to {}",
                summary.version,
                summary.gestures,
                summary.samples,
                summary.output.display()
            );
        }

        Commands::Analytics { db, json } => {
            let db = db.unwrap_or_else(|| config.database_path());
            let store = Arc::new(LearningStore::open(&db)?);
            let snapshots = AnalyticsAggregator::new(store).refresh_all()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshots)?);
            } else {
                for snap in snapshots {
                    println!(
                        "{:<16} success {:>5.2}  trend {:>+5.2}",
                        snap.id, snap.success_rate_7d, snap.improvement_trend
                    );
                }
            }
        }

        Commands::Sync { once, metered } => {
            if !config.sync.enabled {
                anyhow::bail!("Sync is disabled in config ([sync] enabled = false)");
            }
            let link = if metered {
                Connectivity::METERED
            } else {
                Connectivity::UNMETERED
            };
            let engine = GestureEngine::from_config(config)?;
            let service = Arc::new(engine.sync_service(Arc::new(SharedConnectivity::new(link))));

            if once {
                let report = service.run_cycle().await;
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let cancel = CancellationToken::new();
                let task = tokio::spawn(Arc::clone(&service).run(cancel.clone()));
                tokio::signal::ctrl_c().await?;
                cancel.cancel();
                task.await?;
            }
        }
    }

    Ok(())
}
