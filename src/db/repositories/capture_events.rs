use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::db::{
    helpers::{format_timestamp, invalid_data, parse_datetime, to_i64},
    models::CaptureEvent,
    Database,
};

fn row_to_capture_event(row: &Row) -> Result<CaptureEvent, rusqlite::Error> {
    let captured_at: String = row.get("captured_at")?;

    Ok(CaptureEvent {
        id: row.get("id")?,
        identity: row.get("identity")?,
        group: row.get("group_tag")?,
        match_distance: row.get("match_distance")?,
        frame_path: row.get("frame_path")?,
        captured_at: parse_datetime(&captured_at, "captured_at").map_err(invalid_data)?,
    })
}

impl Database {
    /// Inserts one capture row and returns its id for posture linkage.
    pub async fn log_capture_event(
        &self,
        identity: &str,
        group: &str,
        match_distance: Option<f64>,
        frame_path: Option<&str>,
    ) -> Result<i64> {
        self.log_capture_event_at(identity, group, match_distance, frame_path, Utc::now())
            .await
    }

    pub async fn log_capture_event_at(
        &self,
        identity: &str,
        group: &str,
        match_distance: Option<f64>,
        frame_path: Option<&str>,
        captured_at: DateTime<Utc>,
    ) -> Result<i64> {
        let identity = identity.to_string();
        let group = group.to_string();
        let frame_path = frame_path.map(str::to_string);
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO capture_events (identity, group_tag, match_distance, frame_path, captured_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    identity,
                    group,
                    match_distance,
                    frame_path,
                    format_timestamp(captured_at),
                ],
            )
            .with_context(|| "failed to insert capture event")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Newest first, optionally restricted to one group.
    pub async fn recent_capture_events(
        &self,
        limit: u64,
        group: Option<&str>,
    ) -> Result<Vec<CaptureEvent>> {
        let group = group.map(str::to_string);
        self.execute(move |conn| {
            let limit = to_i64(limit)?;
            let mut stmt = conn.prepare(
                "SELECT id, identity, group_tag, match_distance, frame_path, captured_at
                 FROM capture_events
                 WHERE (?1 IS NULL OR group_tag = ?1)
                 ORDER BY captured_at DESC, id DESC
                 LIMIT ?2",
            )?;

            let rows = stmt.query_map(params![group, limit], row_to_capture_event)?;
            let mut events = Vec::new();
            for row in rows {
                events.push(row.context("failed to read capture event")?);
            }
            Ok(events)
        })
        .await
    }

    pub async fn get_capture_event(&self, id: i64) -> Result<Option<CaptureEvent>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, identity, group_tag, match_distance, frame_path, captured_at
                 FROM capture_events
                 WHERE id = ?1",
            )?;

            let mut rows = stmt.query_map(params![id], row_to_capture_event)?;
            match rows.next() {
                Some(row) => Ok(Some(row.context("failed to read capture event")?)),
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn count_capture_events(&self) -> Result<u64> {
        self.execute(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM capture_events", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}
