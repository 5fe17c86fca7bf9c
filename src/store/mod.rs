//! Reference note store over SQLite, reachable through the same JSON command
//! channel any other store implementation would use.

use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use rusqlite::Connection;
use serde_json::json;
use tokio::sync::oneshot;

mod migrations;
pub mod notes;

use migrations::run_migrations;

use crate::{
    executor::Executor,
    models::{NewNote, PageResult},
    protocol::Command,
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

type StoreTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

/// The thread that owns the connection. Closing the task channel is the stop
/// signal; dropping the worker closes it and waits for the thread.
struct Worker {
    tasks: Option<mpsc::Sender<StoreTask>>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn start(mut conn: Connection) -> Result<Self> {
        let (tasks, queue) = mpsc::channel::<StoreTask>();
        let thread = thread::Builder::new()
            .name("notepage-store".into())
            .spawn(move || {
                for task in queue {
                    task(&mut conn);
                }
                log_debug!("Store thread shutting down");
            })
            .context("failed to spawn store worker thread")?;

        Ok(Self {
            tasks: Some(tasks),
            thread: Some(thread),
        })
    }

    fn send(&self, task: StoreTask) -> Result<()> {
        self.tasks
            .as_ref()
            .ok_or_else(|| anyhow!("store thread already stopped"))?
            .send(task)
            .map_err(|_| anyhow!("store thread is no longer accepting work"))
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        drop(self.tasks.take());
        if let Some(thread) = self.thread.take() {
            if let Err(err) = thread.join() {
                log_error!("Failed to join store thread: {err:?}");
            }
        }
    }
}

/// Handle to the store's worker thread, which owns the only connection.
/// Clones share the thread; it shuts down when the last clone drops.
#[derive(Clone)]
pub struct NoteStore {
    worker: Arc<Worker>,
    path: Option<Arc<PathBuf>>,
}

impl NoteStore {
    /// Opens (creating if needed) the database at `path` and migrates it.
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("failed to open SQLite database {}", path.display()))?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            log_warn!("Failed to enable WAL mode: {err}");
        }

        let store = Self::with_connection(conn, Some(path))?;
        if let Some(path) = store.path() {
            log_info!("Note store opened at {}", path.display());
        }
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        Self::with_connection(conn, None)
    }

    /// Migrates `conn` on the calling thread, then hands it to the worker.
    fn with_connection(mut conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        run_migrations(&mut conn).context("failed to run database migrations")?;
        Ok(Self {
            worker: Arc::new(Worker::start(conn)?),
            path: path.map(Arc::new),
        })
    }

    /// `None` for an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref().map(PathBuf::as_path)
    }

    /// Runs `task` on the worker thread and awaits its result.
    pub async fn call<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(task)?
            .await
            .map_err(|_| anyhow!("store thread terminated unexpectedly"))?
    }

    /// [`NoteStore::call`] for synchronous callers. Must not be used from
    /// inside an async task.
    pub fn call_blocking<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(task)?
            .blocking_recv()
            .map_err(|_| anyhow!("store thread terminated unexpectedly"))?
    }

    fn submit<F, T>(&self, task: F) -> Result<oneshot::Receiver<Result<T>>>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.worker.send(Box::new(move |conn| {
            if reply_tx.send(task(conn)).is_err() {
                log_debug!("Store caller dropped before receiving result");
            }
        }))?;

        Ok(reply_rx)
    }

    pub async fn insert_note(&self, note: NewNote) -> Result<i64> {
        self.call(move |conn| notes::insert_note(conn, &note)).await
    }

    pub async fn count_notes(&self) -> Result<u64> {
        self.call(|conn| notes::count_notes(conn)).await
    }

    /// Answers one JSON command. Always returns JSON: a page on success,
    /// `{"error": "..."}` otherwise.
    pub fn handle(&self, text: &str) -> String {
        let command = match Command::decode(text) {
            Ok(command) => command,
            Err(err) => {
                log_warn!("rejecting malformed command: {err}");
                return error_envelope("cmd json error");
            }
        };

        let action = command.action();
        match self.call_blocking(move |conn| answer(conn, &command)) {
            Ok(page) => match serde_json::to_string(&page) {
                Ok(body) => body,
                Err(err) => error_envelope(&format!("encode error: {err}")),
            },
            Err(err) => {
                log_error!("{} failed: {err:#}", action.as_str());
                error_envelope(&format!("{} error", action.as_str()))
            }
        }
    }
}

impl Executor for NoteStore {
    fn execute(&self, command: &str) -> String {
        self.handle(command)
    }
}

fn answer(conn: &mut Connection, command: &Command) -> Result<PageResult> {
    match command {
        Command::Select { limit, offset } => notes::select(conn, *limit, *offset),
        Command::Search {
            query,
            limit,
            offset,
        } => notes::search(conn, query, *limit, *offset),
        Command::Delete {
            query,
            rowid,
            limit,
            offset,
        } => {
            if !notes::delete(conn, *rowid)? {
                log_debug!("delete of missing row {rowid}");
            }
            notes::search(conn, query, *limit, *offset)
        }
    }
}

fn error_envelope(message: &str) -> String {
    json!({ "error": message }).to_string()
}
