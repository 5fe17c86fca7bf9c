pub mod executor;
pub mod models;
pub mod protocol;
pub mod query;
pub mod settings;
pub mod store;
mod utils;

use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;

pub use executor::Executor;
pub use models::{Item, NewNote, PageResult};
pub use query::{
    CachedPage, Gate, QueryEvent, QueryListener, QuerySession, QueryState, SessionError,
    SessionOptions, SessionSnapshot, SessionStatus, StorageAccess,
};
pub use settings::SettingsStore;
pub use store::NoteStore;

/// Installs the env_logger backend once. `RUST_LOG` wins over the default
/// level; later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::Builder::new()
        .filter_level(utils::logging::default_level())
        .parse_default_env()
        .try_init();
}

pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("notepage")
        .join("settings.json")
}

/// Startup inputs; `None` fields fall back to the settings file.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub settings_path: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub execute_timeout_ms: Option<u64>,
}

pub struct App {
    pub settings: SettingsStore,
    pub store: NoteStore,
    pub session: QuerySession,
}

/// Loads settings, passes the storage gate, opens the store and wires a
/// session to it. The session is not started.
pub async fn bootstrap(config: AppConfig) -> Result<App> {
    let settings_path = config.settings_path.unwrap_or_else(default_settings_path);
    let settings = SettingsStore::new(settings_path)?;

    let db_path = config
        .db_path
        .unwrap_or_else(|| settings.store().resolved_db_path());
    let db_dir = db_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let gate = Gate::new(StorageAccess::new(db_dir));
    gate.authorize()
        .await
        .with_context(|| format!("no access to {}", db_path.display()))?;

    let store = NoteStore::open(db_path)?;

    let mut session_settings = settings.session();
    if let Some(timeout_ms) = config.execute_timeout_ms {
        session_settings.execute_timeout_ms = timeout_ms;
    }
    let options = session_settings.options();
    info!(
        "Session ready: timeout {:?}, empty page policy {:?}",
        options.execute_timeout, options.empty_page_policy
    );

    let session = QuerySession::new(std::sync::Arc::new(store.clone()), gate, options);

    Ok(App {
        settings,
        store,
        session,
    })
}
