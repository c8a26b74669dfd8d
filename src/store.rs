use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::domain::subscriber::Subscriber;

/// Everything the service persists: the subscribers and the mailout watermark.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailerState {
    #[serde(default)]
    pub subscribers: Vec<Subscriber>,
    /// Feed items published at or before this instant have already been mailed.
    #[serde(default, with = "chrono::serde::ts_milliseconds")]
    pub last_mailout: DateTime<Utc>,
}

impl MailerState {
    pub fn find_subscriber(&self, email: &str) -> Option<&Subscriber> {
        self.subscribers
            .iter()
            .find(|subscriber| subscriber.email.as_ref() == email)
    }

    pub fn active_subscribers(&self) -> Vec<Subscriber> {
        self.subscribers
            .iter()
            .filter(|subscriber| subscriber.is_active())
            .cloned()
            .collect()
    }

    /// Drops records that older deployments only flagged as unsubscribed.
    /// Returns how many were removed.
    fn remove_inactive(&mut self) -> usize {
        let before = self.subscribers.len();
        self.subscribers.retain(|subscriber| subscriber.is_active());
        before - self.subscribers.len()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Failed to serialize the mailer state.")]
    Serialize(#[source] serde_json::Error),
    #[error("Failed to write the mailer state to {path}.")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Storage for the mailer state.
///
/// `get` and `put` work on the whole document; `flush` makes the current
/// document durable. A read-modify-write made of `get` then `put` is not atomic
/// with respect to other callers.
pub trait Store: Send + Sync {
    fn get(&self) -> MailerState;
    fn put(&self, state: MailerState);
    fn flush(&self) -> Result<(), StoreError>;

    /// `put` followed by `flush`.
    fn save(&self, state: MailerState) -> Result<(), StoreError> {
        self.put(state);
        self.flush()
    }
}

/// Keeps the state in memory and rewrites one pretty printed JSON file on every flush.
pub struct JsonFileStore {
    path: PathBuf,
    state: RwLock<MailerState>,
}

impl JsonFileStore {
    /// Loads the store from `path`. A missing file is not an error: the store
    /// starts empty and the file is created on the first flush. A file that
    /// cannot be read as a mailer state is moved aside first, so the first flush
    /// never overwrites it.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut state = match load(&path) {
            Ok(state) => {
                tracing::info!(
                    subscribers = state.subscribers.len(),
                    last_mailout = %state.last_mailout,
                    "Loaded mailer state from {}",
                    path.display()
                );
                state
            }
            Err(LoadError::Read(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No mailer state at {}, starting empty", path.display());
                MailerState::default()
            }
            Err(err) => {
                tracing::error!(
                    "Unusable mailer state at {}, starting empty: {}",
                    path.display(),
                    err
                );
                set_aside(&path);
                MailerState::default()
            }
        };

        let removed = state.remove_inactive();
        let store = JsonFileStore {
            path,
            state: RwLock::new(state),
        };

        if removed > 0 {
            tracing::info!("Removed {} inactive subscribers", removed);
            if let Err(err) = store.flush() {
                tracing::error!("Failed to persist the migrated mailer state: {:?}", err);
            }
        }

        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(thiserror::Error, Debug)]
enum LoadError {
    #[error("failed to read the file: {0}")]
    Read(#[source] std::io::Error),
    #[error("not a mailer state document: {0}")]
    Parse(#[source] serde_json::Error),
}

/// The document as found on disk, before the records are checked one by one.
#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredState {
    #[serde(default)]
    subscribers: Vec<serde_json::Value>,
    #[serde(default, with = "chrono::serde::ts_milliseconds")]
    last_mailout: DateTime<Utc>,
}

fn load(path: &Path) -> Result<MailerState, LoadError> {
    let contents = std::fs::read_to_string(path).map_err(LoadError::Read)?;
    let stored: StoredState = serde_json::from_str(&contents).map_err(LoadError::Parse)?;

    // A single unreadable record is skipped; it must not cost the others.
    let subscribers = stored
        .subscribers
        .into_iter()
        .filter_map(|record| match serde_json::from_value::<Subscriber>(record.clone()) {
            Ok(subscriber) => Some(subscriber),
            Err(err) => {
                tracing::warn!("Skipping unreadable subscriber record {}: {}", record, err);
                None
            }
        })
        .collect();

    Ok(MailerState {
        subscribers,
        last_mailout: stored.last_mailout,
    })
}

/// Renames an unusable state file to `<name>.corrupt-<epoch ms>`.
fn set_aside(path: &Path) {
    let mut backup = path.as_os_str().to_owned();
    backup.push(format!(".corrupt-{}", Utc::now().timestamp_millis()));
    let backup = PathBuf::from(backup);

    match std::fs::rename(path, &backup) {
        Ok(()) => tracing::warn!("Moved unusable mailer state to {}", backup.display()),
        Err(err) => tracing::error!(
            "Failed to move unusable mailer state {} aside: {}",
            path.display(),
            err
        ),
    }
}

impl Store for JsonFileStore {
    fn get(&self) -> MailerState {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn put(&self, state: MailerState) {
        *self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    fn flush(&self) -> Result<(), StoreError> {
        let contents = {
            let state = self
                .state
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            serde_json::to_string_pretty(&*state).map_err(StoreError::Serialize)?
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        }

        tracing::debug!("Writing mailer state to {}", self.path.display());

        std::fs::write(&self.path, contents).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }
}
