use std::{env, fs, io, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ApplicationState, NotificationRecord};

const STORAGE_DIR_NAME: &str = ".octowatch";
const STATE_FILE: &str = "state.json";

/// On-disk shape of the state snapshot. Deliberately excludes the one-time
/// token prompt flag, so an unresolved prompt re-occurs after a restart.
/// `last_check_time` is optional to tolerate malformed or old files.
#[derive(Default, Serialize, Deserialize)]
struct StoredState {
    last_check_time: Option<i64>,
    #[serde(default)]
    notifications: Vec<NotificationRecord>,
}

impl StoredState {
    fn into_state(self) -> ApplicationState {
        ApplicationState {
            has_prompted_for_token: false,
            // Missing or null check times in persisted data collapse to the
            // epoch, which just means the next fetch looks further back.
            last_check_time: self.last_check_time.unwrap_or(0),
            notifications: self.notifications,
        }
    }
}

#[derive(Clone)]
pub struct StateStore {
    state_path: PathBuf,
}

impl StateStore {
    pub fn initialize() -> Result<Self, StateStoreError> {
        let home = env::var("HOME").map_err(|_| StateStoreError::HomeDirMissing)?;
        let dir = PathBuf::from(home).join(STORAGE_DIR_NAME);
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self {
            state_path: dir.join(STATE_FILE),
        })
    }

    #[cfg(test)]
    fn at(path: PathBuf) -> Self {
        Self { state_path: path }
    }

    /// Restores the previously persisted snapshot, or the initial state
    /// when none exists.
    pub fn restore(&self) -> Result<ApplicationState, StateStoreError> {
        match fs::read_to_string(&self.state_path) {
            Ok(contents) => {
                let stored: StoredState = serde_json::from_str(&contents)?;
                Ok(stored.into_state())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(ApplicationState::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn save(&self, state: &ApplicationState) -> Result<(), StateStoreError> {
        let stored = StoredState {
            last_check_time: Some(state.last_check_time),
            notifications: state.notifications.clone(),
        };
        let data = serde_json::to_string_pretty(&stored)?;
        fs::write(&self.state_path, data)?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("HOME environment variable is not set; cannot persist state under ~/.octowatch")]
    HomeDirMissing,
    #[error("I/O error while handling persisted state: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to serialize persisted state: {0}")]
    Serialization(#[from] serde_json::Error),
}

// -------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SubjectType;

    fn temp_store(name: &str) -> StateStore {
        let path = env::temp_dir().join(format!("octowatch-storage-test-{name}.json"));
        let _ = fs::remove_file(&path);
        StateStore::at(path)
    }

    fn record(id: &str) -> NotificationRecord {
        NotificationRecord {
            id: id.to_owned(),
            subject_type: SubjectType::Issue,
            title: "title".to_owned(),
            body: Some("body".to_owned()),
            reason: "subscribed".to_owned(),
            repo_full_name: "acme/widgets".to_owned(),
            repo_owner_avatar_url: "https://avatars.example/acme".to_owned(),
            subject_id: "1".to_owned(),
            subject_url: "https://github.com/acme/widgets/issues/1".to_owned(),
            user_login: Some("octocat".to_owned()),
            on_dismiss: None,
        }
    }

    #[test]
    fn missing_file_restores_the_initial_state() {
        let store = temp_store("missing");
        let state = store.restore().expect("restore");
        assert_eq!(state.last_check_time, 0);
        assert!(state.notifications.is_empty());
        assert!(!state.has_prompted_for_token);
    }

    #[test]
    fn save_then_restore_round_trips_pending_records() {
        let store = temp_store("roundtrip");
        let state = ApplicationState {
            has_prompted_for_token: true,
            last_check_time: 123_456,
            notifications: vec![record("a"), record("b")],
        };
        store.save(&state).expect("save");

        let restored = store.restore().expect("restore");
        assert_eq!(restored.last_check_time, 123_456);
        assert_eq!(restored.notifications.len(), 2);
        assert_eq!(restored.notifications[0].id, "a");
        assert_eq!(restored.notifications[0].user_login.as_deref(), Some("octocat"));
        // The prompt flag is intentionally not part of the snapshot.
        assert!(!restored.has_prompted_for_token);
    }

    #[test]
    fn null_or_absent_check_time_is_coerced_to_zero() {
        let store = temp_store("nulltime");
        fs::write(
            &store.state_path,
            r#"{"last_check_time": null, "notifications": []}"#,
        )
        .expect("write");
        assert_eq!(store.restore().expect("restore").last_check_time, 0);

        fs::write(&store.state_path, r#"{"notifications": []}"#).expect("write");
        assert_eq!(store.restore().expect("restore").last_check_time, 0);
    }

    #[test]
    fn snapshot_never_contains_the_prompt_flag() {
        let store = temp_store("noflag");
        let state = ApplicationState {
            has_prompted_for_token: true,
            last_check_time: 1,
            notifications: Vec::new(),
        };
        store.save(&state).expect("save");
        let raw = fs::read_to_string(&store.state_path).expect("read");
        assert!(!raw.contains("has_prompted_for_token"));
    }
}
