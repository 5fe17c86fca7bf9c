use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
    time::Duration,
};

use crate::{
    protocol::PAGE_LIMIT,
    query::{EmptyPagePolicy, SessionOptions, DEFAULT_EXECUTE_TIMEOUT},
};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

const DB_DIR: &str = "LocalNative";
const DB_FILE: &str = "localnative.sqlite3";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub execute_timeout_ms: u64,
    pub empty_page_policy: EmptyPagePolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            execute_timeout_ms: DEFAULT_EXECUTE_TIMEOUT.as_millis() as u64,
            empty_page_policy: EmptyPagePolicy::Stay,
        }
    }
}

impl SessionSettings {
    pub fn options(&self) -> SessionOptions {
        SessionOptions {
            limit: PAGE_LIMIT,
            execute_timeout: Duration::from_millis(self.execute_timeout_ms.max(1)),
            empty_page_policy: self.empty_page_policy,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Unset means `~/LocalNative/localnative.sqlite3`.
    pub db_path: Option<PathBuf>,
}

impl StoreSettings {
    pub fn resolved_db_path(&self) -> PathBuf {
        match &self.db_path {
            Some(path) => path.clone(),
            None => default_db_path(),
        }
    }
}

pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DB_DIR)
        .join(DB_FILE)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    session: SessionSettings,
    store: StoreSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    /// Loads `path` if it exists. A file that no longer parses is logged and
    /// replaced by defaults on the next write.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log_warn!("ignoring unreadable settings in {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session(&self) -> SessionSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .session
            .clone()
    }

    pub fn store(&self) -> StoreSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .store
            .clone()
    }

    pub fn update_session(&self, settings: SessionSettings) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        guard.session = settings;
        self.persist(&guard)
    }

    pub fn update_store(&self, settings: StoreSettings) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        guard.store = settings;
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: UserSettings = serde_json::from_str(&contents)?;
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = data;
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();

        let options = store.session().options();
        assert_eq!(options.limit, PAGE_LIMIT);
        assert_eq!(options.execute_timeout, Duration::from_secs(5));
        assert_eq!(options.empty_page_policy, EmptyPagePolicy::Stay);
        assert!(store.store().resolved_db_path().ends_with("LocalNative/localnative.sqlite3"));
    }

    #[test]
    fn updates_persist_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        store
            .update_session(SessionSettings {
                execute_timeout_ms: 250,
                empty_page_policy: EmptyPagePolicy::Retreat,
            })
            .unwrap();
        store
            .update_store(StoreSettings {
                db_path: Some(dir.path().join("notes.sqlite3")),
            })
            .unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.session().execute_timeout_ms, 250);
        assert_eq!(
            reopened.session().options().empty_page_policy,
            EmptyPagePolicy::Retreat
        );
        assert_eq!(
            reopened.store().resolved_db_path(),
            dir.path().join("notes.sqlite3")
        );
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "session": { "empty_page_policy": "retreat" } }"#).unwrap();

        let store = SettingsStore::new(path).unwrap();
        let session = store.session();
        assert_eq!(session.empty_page_policy, EmptyPagePolicy::Retreat);
        assert_eq!(session.execute_timeout_ms, 5000);
        assert_eq!(store.store(), StoreSettings::default());
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.session(), SessionSettings::default());
        assert!(store.reload().is_err());
    }
}
