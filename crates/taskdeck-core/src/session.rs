use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

pub const KEY_USER: &str = "user";
pub const KEY_ACCESS_TOKEN: &str = "accessToken";
pub const KEY_REFRESH_TOKEN: &str = "refreshToken";
pub const KEY_THEME: &str = "theme";

/// Key/value persistence seam for client state. Stands in for the browser's
/// local storage; injected so tests can run against an in-memory double.
pub trait StoragePort: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// File-backed storage: one JSON object in `session.data` under the data
/// directory, rewritten atomically on every mutation.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    cache: RwLock<HashMap<String, String>>,
}

impl FileStorage {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;
        let path = data_dir.join("session.data");

        let cache = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            if raw.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&raw)
                    .with_context(|| format!("failed parsing {}", path.display()))?
            }
        } else {
            HashMap::new()
        };

        info!(file = %path.display(), keys = cache.len(), "opened session storage");
        Ok(Self {
            path,
            cache: RwLock::new(cache),
        })
    }

    fn persist(&self, cache: &HashMap<String, String>) -> anyhow::Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        let serialized = serde_json::to_string_pretty(cache)?;
        temp.write_all(serialized.as_bytes())?;
        temp.flush()?;
        temp.persist(&self.path)
            .map_err(|err| anyhow!("failed to persist {}: {}", self.path.display(), err))?;
        Ok(())
    }
}

impl StoragePort for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.cache.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut cache = self.cache.write();
        cache.insert(key.to_string(), value.to_string());
        self.persist(&cache)
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let mut cache = self.cache.write();
        if cache.remove(key).is_some() {
            self.persist(&cache)?;
        }
        Ok(())
    }
}

/// In-memory storage double for tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    cache: RwLock<HashMap<String, String>>,
}

impl StoragePort for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.cache.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.cache.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.cache.write().remove(key);
        Ok(())
    }
}

/// The user object is derived client-side: register knows all three fields,
/// login only the email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub email: String,
}

impl User {
    /// Greeting name: full name when known, otherwise the email local part.
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.clone(),
            _ => self
                .email
                .split('@')
                .next()
                .unwrap_or(&self.email)
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn storage_value(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

impl std::str::FromStr for Theme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(anyhow!("invalid theme: {other} (expected light or dark)")),
        }
    }
}

/// Holds the current session and keeps it in lockstep with the storage port:
/// every mutation updates both or fails.
pub struct SessionStore {
    storage: Box<dyn StoragePort>,
    current: RwLock<Option<Session>>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("authenticated", &self.current.read().is_some())
            .finish()
    }
}

impl SessionStore {
    /// Hydrate from whatever the storage still holds. A partial record
    /// (some keys missing) counts as no session.
    #[tracing::instrument(skip(storage))]
    pub fn open(storage: Box<dyn StoragePort>) -> Self {
        let current = match (
            storage.get(KEY_USER),
            storage.get(KEY_ACCESS_TOKEN),
            storage.get(KEY_REFRESH_TOKEN),
        ) {
            (Some(user_json), Some(access_token), Some(refresh_token)) => {
                match serde_json::from_str::<User>(&user_json) {
                    Ok(user) => Some(Session {
                        user,
                        access_token,
                        refresh_token,
                    }),
                    Err(err) => {
                        warn!(error = %err, "stored user record unreadable; starting signed out");
                        None
                    }
                }
            }
            _ => None,
        };

        debug!(authenticated = current.is_some(), "hydrated session store");
        Self {
            storage,
            current: RwLock::new(current),
        }
    }

    pub fn session(&self) -> Option<Session> {
        self.current.read().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.current.read().as_ref().map(|s| s.user.clone())
    }

    pub fn access_token(&self) -> Option<String> {
        self.current.read().as_ref().map(|s| s.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.current.read().as_ref().map(|s| s.refresh_token.clone())
    }

    /// Install a fresh session (login/register).
    #[tracing::instrument(skip(self, session), fields(email = %session.user.email))]
    pub fn establish(&self, session: Session) -> anyhow::Result<()> {
        let user_json = serde_json::to_string(&session.user)?;
        self.storage.set(KEY_USER, &user_json)?;
        self.storage.set(KEY_ACCESS_TOKEN, &session.access_token)?;
        self.storage.set(KEY_REFRESH_TOKEN, &session.refresh_token)?;
        *self.current.write() = Some(session);
        info!("session established");
        Ok(())
    }

    /// Replace only the access token (refresh).
    #[tracing::instrument(skip(self, access_token))]
    pub fn rotate_access_token(&self, access_token: String) -> anyhow::Result<()> {
        let mut current = self.current.write();
        let session = current
            .as_mut()
            .ok_or_else(|| anyhow!("no session to rotate"))?;
        self.storage.set(KEY_ACCESS_TOKEN, &access_token)?;
        session.access_token = access_token;
        debug!("access token rotated");
        Ok(())
    }

    /// Drop the session everywhere. The theme survives.
    #[tracing::instrument(skip(self))]
    pub fn clear(&self) -> anyhow::Result<()> {
        self.storage.remove(KEY_USER)?;
        self.storage.remove(KEY_ACCESS_TOKEN)?;
        self.storage.remove(KEY_REFRESH_TOKEN)?;
        *self.current.write() = None;
        info!("session cleared");
        Ok(())
    }

    pub fn theme(&self) -> Theme {
        self.storage
            .get(KEY_THEME)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }

    pub fn set_theme(&self, theme: Theme) -> anyhow::Result<()> {
        self.storage.set(KEY_THEME, theme.storage_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session() -> Session {
        Session {
            user: User {
                first_name: Some("Ada".to_string()),
                last_name: Some("Lovelace".to_string()),
                email: "ada@example.com".to_string(),
            },
            access_token: "acc-1".to_string(),
            refresh_token: "ref-1".to_string(),
        }
    }

    #[test]
    fn establish_writes_store_and_storage_together() {
        let store = SessionStore::open(Box::new(MemoryStorage::default()));
        store.establish(sample_session()).expect("establish");

        assert_eq!(store.access_token().as_deref(), Some("acc-1"));
        assert_eq!(
            store.storage.get(KEY_ACCESS_TOKEN).as_deref(),
            Some("acc-1")
        );
        assert_eq!(store.storage.get(KEY_REFRESH_TOKEN).as_deref(), Some("ref-1"));
        let user: User =
            serde_json::from_str(&store.storage.get(KEY_USER).expect("user key")).expect("json");
        assert_eq!(user.email, "ada@example.com");
    }

    #[test]
    fn rotate_touches_only_the_access_token() {
        let store = SessionStore::open(Box::new(MemoryStorage::default()));
        store.establish(sample_session()).expect("establish");
        store
            .rotate_access_token("acc-2".to_string())
            .expect("rotate");

        assert_eq!(store.access_token().as_deref(), Some("acc-2"));
        assert_eq!(store.storage.get(KEY_ACCESS_TOKEN).as_deref(), Some("acc-2"));
        assert_eq!(store.refresh_token().as_deref(), Some("ref-1"));
    }

    #[test]
    fn clear_removes_session_but_keeps_theme() {
        let store = SessionStore::open(Box::new(MemoryStorage::default()));
        store.set_theme(Theme::Dark).expect("theme");
        store.establish(sample_session()).expect("establish");
        store.clear().expect("clear");

        assert!(store.session().is_none());
        assert!(store.storage.get(KEY_ACCESS_TOKEN).is_none());
        assert_eq!(store.theme(), Theme::Dark);
    }

    #[test]
    fn file_storage_roundtrips_across_reopen() {
        let temp = tempfile::tempdir().expect("tempdir");

        {
            let storage = FileStorage::open(temp.path()).expect("open");
            let store = SessionStore::open(Box::new(storage));
            store.establish(sample_session()).expect("establish");
        }

        let storage = FileStorage::open(temp.path()).expect("reopen");
        let store = SessionStore::open(Box::new(storage));
        let session = store.session().expect("hydrated");
        assert_eq!(session.access_token, "acc-1");
        assert_eq!(session.user.display_name(), "Ada Lovelace");
    }

    #[test]
    fn partial_storage_hydrates_signed_out() {
        let storage = MemoryStorage::default();
        storage.set(KEY_ACCESS_TOKEN, "acc").expect("set");
        let store = SessionStore::open(Box::new(storage));
        assert!(store.session().is_none());
    }

    #[test]
    fn display_name_falls_back_to_email_local_part() {
        let user = User {
            first_name: None,
            last_name: None,
            email: "grace@example.com".to_string(),
        };
        assert_eq!(user.display_name(), "grace");
    }
}
