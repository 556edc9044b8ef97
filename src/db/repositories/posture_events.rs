use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::db::{
    helpers::{decode_reasons, encode_reasons, format_timestamp, invalid_data, parse_datetime, to_i64},
    models::{NewPostureEvent, PostureEvent},
    Database,
};

fn row_to_posture_event(row: &Row) -> Result<PostureEvent, rusqlite::Error> {
    let reasons_json: String = row.get("reasons_json")?;
    let recorded_at: String = row.get("recorded_at")?;

    Ok(PostureEvent {
        id: row.get("id")?,
        identity: row.get("identity")?,
        is_bad: row.get("is_bad")?,
        nose_drop: row.get("nose_drop")?,
        neck_angle: row.get("neck_angle")?,
        reasons: decode_reasons(&reasons_json).map_err(invalid_data)?,
        match_distance: row.get("match_distance")?,
        frame_path: row.get("frame_path")?,
        capture_event_id: row.get("capture_event_id")?,
        recorded_at: parse_datetime(&recorded_at, "recorded_at").map_err(invalid_data)?,
    })
}

impl Database {
    /// Inserts one posture row. A `capture_event_id` that does not name an
    /// existing capture row is rejected by the foreign key and nothing is
    /// written.
    pub async fn log_posture_event(&self, event: NewPostureEvent) -> Result<i64> {
        self.log_posture_event_at(event, Utc::now()).await
    }

    pub async fn log_posture_event_at(
        &self,
        event: NewPostureEvent,
        recorded_at: DateTime<Utc>,
    ) -> Result<i64> {
        self.execute(move |conn| {
            let reasons_json = encode_reasons(&event.reasons)?;
            conn.execute(
                "INSERT INTO posture_events (
                    identity,
                    is_bad,
                    nose_drop,
                    neck_angle,
                    reasons_json,
                    match_distance,
                    frame_path,
                    capture_event_id,
                    recorded_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    event.identity,
                    event.is_bad,
                    event.nose_drop,
                    event.neck_angle,
                    reasons_json,
                    event.match_distance,
                    event.frame_path,
                    event.capture_event_id,
                    format_timestamp(recorded_at),
                ],
            )
            .with_context(|| "failed to insert posture event")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Newest first; `bad_only` keeps flagged assessments only.
    pub async fn recent_posture_events(
        &self,
        limit: u64,
        bad_only: bool,
    ) -> Result<Vec<PostureEvent>> {
        self.execute(move |conn| {
            let limit = to_i64(limit)?;
            let mut stmt = conn.prepare(
                "SELECT id, identity, is_bad, nose_drop, neck_angle, reasons_json,
                        match_distance, frame_path, capture_event_id, recorded_at
                 FROM posture_events
                 WHERE (?1 = 0 OR is_bad = 1)
                 ORDER BY recorded_at DESC, id DESC
                 LIMIT ?2",
            )?;

            let rows = stmt.query_map(params![bad_only, limit], row_to_posture_event)?;
            let mut events = Vec::new();
            for row in rows {
                events.push(row.context("failed to read posture event")?);
            }
            Ok(events)
        })
        .await
    }

    pub async fn count_posture_events(&self) -> Result<u64> {
        self.execute(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM posture_events", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    /// Posture rows whose capture reference names a missing capture row.
    /// Always zero while foreign keys are enforced.
    pub async fn dangling_posture_references(&self) -> Result<u64> {
        self.execute(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM posture_events p
                 WHERE p.capture_event_id IS NOT NULL
                   AND NOT EXISTS (SELECT 1 FROM capture_events c WHERE c.id = p.capture_event_id)",
                [],
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}
