use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Schema scripts in order; entry `n` upgrades `user_version` n to n + 1.
const SCHEMA_SCRIPTS: &[(&str, &str)] = &[("schema_v1.sql", include_str!("schemas/schema_v1.sql"))];

fn target_version() -> u32 {
    SCHEMA_SCRIPTS.len() as u32
}

fn stored_version(conn: &Connection) -> Result<u32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read schema version")
}

/// Brings the event tables up to the latest schema. Pending scripts and
/// the version bump commit together.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let from = stored_version(conn)?;
    let to = target_version();
    if from > to {
        bail!("event store schema v{from} is newer than this build supports (v{to})");
    }

    let pending = &SCHEMA_SCRIPTS[from as usize..];
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open schema upgrade transaction")?;
    for (name, script) in pending {
        tx.execute_batch(script)
            .with_context(|| format!("failed to apply {name}"))?;
    }
    tx.pragma_update(None, "user_version", to)
        .context("failed to record schema version")?;
    tx.commit().context("failed to commit schema upgrade")
}

/// Drops both event tables (posture first, it holds the foreign key) and
/// rebuilds the schema from version zero.
pub fn reset_schema(conn: &mut Connection) -> Result<()> {
    {
        let tx = conn
            .transaction()
            .context("failed to open reset transaction")?;
        tx.execute_batch(
            "DROP TABLE IF EXISTS posture_events;
             DROP TABLE IF EXISTS capture_events;",
        )
        .context("failed to drop event tables")?;
        tx.pragma_update(None, "user_version", 0)
            .context("failed to clear schema version")?;
        tx.commit().context("failed to commit table reset")?;
    }

    run_migrations(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();
        assert_eq!(stored_version(&conn).unwrap(), target_version());
    }

    #[test]
    fn newer_schema_is_refused() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", target_version() + 1)
            .unwrap();
        let err = run_migrations(&mut conn).unwrap_err();
        assert!(err.to_string().contains("newer than this build supports"));
    }
}
