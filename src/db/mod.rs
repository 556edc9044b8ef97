use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::Connection;
use tokio::sync::oneshot;

pub mod helpers;
mod migrations;
pub mod models;
mod repositories;

use migrations::{reset_schema, run_migrations};

pub use models::{CaptureEvent, NewPostureEvent, PostureEvent};
pub use repositories::retention::PruneLimits;

const IN_MEMORY: &str = ":memory:";

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

/// Event store. A single worker thread owns the SQLite connection and runs
/// every operation to completion before taking the next one, so the frame
/// loop and the retention worker never interleave statements.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        Self::open(db_path, false)
    }

    /// Opens the store; with `reset_on_start` both tables are dropped and
    /// recreated before the handle is returned.
    pub fn open(db_path: PathBuf, reset_on_start: bool) -> Result<Self> {
        let is_memory = db_path.as_os_str() == IN_MEMORY;
        if !is_memory {
            if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("deskwatch-db".into())
            .spawn(move || {
                let opened = if is_memory {
                    Connection::open_in_memory()
                } else {
                    Connection::open(&path_for_thread)
                };
                let mut conn = match opened {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if !is_memory {
                    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                        error!("Failed to enable WAL mode: {err}");
                    }
                }
                // Without this the SET NULL policy on posture_events is inert.
                if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
                    let _ = ready_tx.send(Err(anyhow::Error::new(err)
                        .context("failed to enable foreign keys")));
                    return;
                }

                let init_result = if reset_on_start {
                    reset_schema(&mut conn).context("failed to reset event tables")
                } else {
                    run_migrations(&mut conn).context("failed to run database migrations")
                };
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        if reset_on_start {
            info!("Event tables reset at {}", db_path.display());
        }
        info!("Database initialized at {}", db_path.display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(PathBuf::from(IN_MEMORY))
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    /// Result of `PRAGMA integrity_check`; `"ok"` for a healthy file.
    pub async fn integrity_check(&self) -> Result<String> {
        self.execute(|conn| {
            conn.query_row("PRAGMA integrity_check", [], |row| row.get::<_, String>(0))
                .context("failed to run integrity check")
        })
        .await
    }

    /// Drops and recreates both event tables.
    pub async fn reset(&self) -> Result<()> {
        self.execute(|conn| reset_schema(conn)).await?;
        info!("Event tables reset at {}", self.db_path.display());
        Ok(())
    }
}
