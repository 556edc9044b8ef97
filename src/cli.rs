use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;

use crate::db::{Database, PruneLimits};
use crate::retention::RetentionWorker;
use crate::settings::Settings;

/// Maintenance commands for the posture event store
#[derive(Debug, Parser)]
#[command(name = "deskwatch")]
#[command(version)]
#[command(about = "Inspect and maintain the posture monitoring event store", long_about = None)]
pub struct Cli {
    /// Settings file (JSON)
    #[arg(short, long, global = true, default_value = "deskwatch.json")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the schema (honours database.reset_on_start) and check integrity
    Init,

    /// Run one retention pass with the configured limits
    Prune,

    /// Drop and recreate both event tables
    Reset,

    /// Print recent capture events as JSON lines
    Captures {
        #[arg(long, default_value = "50")]
        limit: u64,

        /// Only events for this identity group
        #[arg(long)]
        group: Option<String>,
    },

    /// Print recent posture events as JSON lines
    Postures {
        #[arg(long, default_value = "50")]
        limit: u64,

        /// Only bad-posture events
        #[arg(long)]
        bad_only: bool,
    },

    /// Run the retention worker in the foreground until Ctrl-C
    Retain,
}

pub async fn execute(cli: Cli) -> Result<()> {
    let settings = Settings::load(&cli.config)?;
    let reset_on_start = matches!(cli.command, Commands::Init) && settings.database.reset_on_start;
    let db = Database::open(PathBuf::from(&settings.database.path), reset_on_start)?;

    match cli.command {
        Commands::Init => cmd_init(&db).await,
        Commands::Prune => cmd_prune(&db, &settings).await,
        Commands::Reset => db.reset().await,
        Commands::Captures { limit, group } => {
            let events = db.recent_capture_events(limit, group.as_deref()).await?;
            print_json_lines(&events)
        }
        Commands::Postures { limit, bad_only } => {
            let events = db.recent_posture_events(limit, bad_only).await?;
            print_json_lines(&events)
        }
        Commands::Retain => cmd_retain(db, &settings).await,
    }
}

async fn cmd_init(db: &Database) -> Result<()> {
    let status = db.integrity_check().await?;
    if status == "ok" {
        info!("Integrity check passed for {}", db.path().display());
    } else {
        warn!("Integrity check reported: {status}");
    }
    println!("{status}");
    Ok(())
}

async fn cmd_prune(db: &Database, settings: &Settings) -> Result<()> {
    let limits = PruneLimits {
        max_rows: settings.retention.max_rows,
        max_age_days: settings.retention.max_age_days,
    };
    if limits.is_empty() {
        warn!("No retention limits configured; nothing to prune");
    }
    let deleted = db.prune_captures(limits).await?;
    println!("{deleted}");
    Ok(())
}

async fn cmd_retain(db: Database, settings: &Settings) -> Result<()> {
    let Some(worker) = RetentionWorker::from_settings(db, &settings.retention) else {
        warn!("Retention limits are not configured; exiting");
        return Ok(());
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Ctrl-C received, stopping retention worker");
    worker.stop().await
}

fn print_json_lines<T: Serialize>(rows: &[T]) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for row in rows {
        serde_json::to_writer(&mut out, row).context("failed to serialize event")?;
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_filters_and_global_config() {
        let cli = Cli::try_parse_from([
            "deskwatch",
            "captures",
            "--group",
            "child",
            "--limit",
            "5",
            "--config",
            "/etc/deskwatch.json",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("/etc/deskwatch.json"));
        match cli.command {
            Commands::Captures { limit, group } => {
                assert_eq!(limit, 5);
                assert_eq!(group.as_deref(), Some("child"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn postures_default_to_all_rows() {
        let cli = Cli::try_parse_from(["deskwatch", "postures"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("deskwatch.json"));
        match cli.command {
            Commands::Postures { limit, bad_only } => {
                assert_eq!(limit, 50);
                assert!(!bad_only);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[tokio::test]
    async fn prune_command_applies_configured_limits() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("events.sqlite3");
        let config_path = dir.path().join("deskwatch.json");
        std::fs::write(
            &config_path,
            format!(
                r#"{{
                    "database": {{ "path": {} }},
                    "posture": {{ "nose_drop": 0.1, "neck_angle": 40 }},
                    "retention": {{ "max_rows": 1 }}
                }}"#,
                serde_json::to_string(&db_path.to_string_lossy()).unwrap()
            ),
        )
        .unwrap();

        {
            let db = Database::new(db_path.clone()).unwrap();
            for _ in 0..3 {
                db.log_capture_event("child/alice", "child", Some(0.4), None)
                    .await
                    .unwrap();
            }
        }

        let cli = Cli::try_parse_from([
            "deskwatch",
            "--config",
            config_path.to_str().unwrap(),
            "prune",
        ])
        .unwrap();
        execute(cli).await.unwrap();

        let db = Database::new(db_path).unwrap();
        assert_eq!(db.count_capture_events().await.unwrap(), 1);
    }
}
