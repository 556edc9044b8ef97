use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use log::warn;
use rusqlite::params;

use crate::db::{
    helpers::{format_timestamp, to_i64},
    Database,
};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PruneLimits {
    /// Keep at most this many capture rows (newest survive).
    pub max_rows: Option<u64>,
    /// Delete capture rows older than this many days.
    pub max_age_days: Option<f64>,
}

impl PruneLimits {
    pub fn is_empty(&self) -> bool {
        self.max_rows.is_none() && self.max_age_days.is_none()
    }
}

impl Database {
    /// Deletes aged-out capture rows, then trims the remainder down to
    /// `max_rows` oldest-first. Both passes share one transaction. Posture
    /// rows pointing at a deleted capture keep their data and have their
    /// reference set to NULL by the schema.
    pub async fn prune_captures(&self, limits: PruneLimits) -> Result<usize> {
        self.prune_captures_at(limits, Utc::now()).await
    }

    pub async fn prune_captures_at(&self, limits: PruneLimits, now: DateTime<Utc>) -> Result<usize> {
        if limits.is_empty() {
            return Ok(0);
        }

        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open prune transaction")?;
            let mut deleted = 0usize;

            match limits.max_age_days.map(|days| age_cutoff(now, days)) {
                Some(Some(cutoff)) => {
                    deleted += tx
                        .execute(
                            "DELETE FROM capture_events WHERE captured_at < ?1",
                            params![format_timestamp(cutoff)],
                        )
                        .context("failed to prune capture events by age")?;
                }
                Some(None) => {
                    warn!("Age cutoff for max_age_days is out of range; skipping age pass");
                }
                None => {}
            }

            if let Some(max_rows) = limits.max_rows {
                deleted += tx
                    .execute(
                        "DELETE FROM capture_events
                         WHERE id NOT IN (
                             SELECT id FROM capture_events
                             ORDER BY captured_at DESC, id DESC
                             LIMIT ?1
                         )",
                        params![to_i64(max_rows)?],
                    )
                    .context("failed to prune capture events by row count")?;
            }

            tx.commit().context("failed to commit prune")?;
            Ok(deleted)
        })
        .await
    }
}

/// `None` when the cutoff falls outside the representable range, in which
/// case no row can be older than it.
fn age_cutoff(now: DateTime<Utc>, max_age_days: f64) -> Option<DateTime<Utc>> {
    let millis = max_age_days * MILLIS_PER_DAY;
    if !millis.is_finite() || millis < 0.0 || millis >= i64::MAX as f64 {
        return None;
    }
    TimeDelta::try_milliseconds(millis as i64).and_then(|age| now.checked_sub_signed(age))
}
