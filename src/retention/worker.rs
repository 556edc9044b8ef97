use anyhow::{Context, Result};
use log::{info, warn};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::db::{Database, PruneLimits};
use crate::settings::RetentionSettings;

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Background pruning of capture rows on a fixed interval.
pub struct RetentionWorker {
    handle: Option<JoinHandle<()>>,
    cancel_token: CancellationToken,
}

impl RetentionWorker {
    /// Spawns the loop on the current runtime. Returns `None` when neither
    /// limit is configured; the worker never starts in that case.
    pub fn start(db: Database, limits: PruneLimits, poll_interval: Duration) -> Option<Self> {
        if limits.is_empty() {
            info!("Capture retention disabled; no limits configured");
            return None;
        }
        if poll_interval.is_zero() {
            warn!("Capture retention disabled; poll interval must be greater than zero");
            return None;
        }

        info!(
            "Starting capture retention worker (max_rows={:?}, max_age_days={:?}, interval={}s)",
            limits.max_rows,
            limits.max_age_days,
            poll_interval.as_secs_f64()
        );

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(retention_loop(
            db,
            limits,
            poll_interval,
            cancel_token.clone(),
        ));

        Some(Self {
            handle: Some(handle),
            cancel_token,
        })
    }

    pub fn from_settings(db: Database, settings: &RetentionSettings) -> Option<Self> {
        let limits = PruneLimits {
            max_rows: settings.max_rows,
            max_age_days: settings.max_age_days,
        };
        Self::start(db, limits, settings.poll_interval())
    }

    /// Signals the loop and waits for it; a prune already running is
    /// allowed to finish, bounded by a join timeout.
    pub async fn stop(mut self) -> Result<()> {
        self.cancel_token.cancel();

        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        match tokio::time::timeout(STOP_TIMEOUT, handle).await {
            Ok(joined) => joined.context("retention loop task failed to join"),
            Err(_) => {
                warn!(
                    "Retention worker did not stop within {}s",
                    STOP_TIMEOUT.as_secs()
                );
                Ok(())
            }
        }
    }
}

async fn retention_loop(
    db: Database,
    limits: PruneLimits,
    poll_interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match db.prune_captures(limits).await {
                    Ok(0) => {}
                    Ok(deleted) => info!("Pruned {deleted} capture record(s)"),
                    Err(err) => warn!("Capture retention failed: {err:#}"),
                }
            }
            _ = cancel_token.cancelled() => {
                info!("Retention loop shutting down");
                break;
            }
        }
    }
}
