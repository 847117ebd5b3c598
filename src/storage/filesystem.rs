use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{anyhow, Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use super::traits::{RecordKey, StateRecords};
use crate::project::{PersistedState, Project};

#[derive(Serialize, Deserialize)]
struct UserRecord {
    name: String,
}

/// Filesystem-based record store.
///
/// Layout: `users/<sha256(user)>/user.yaml` plus one `<server>.state.yaml`
/// and, while the server runs, one `<server>.running.yaml` per server.
pub struct FilesystemRecords {
    base_path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    update_lock: Mutex<()>,
}

impl FilesystemRecords {
    /// Create a new filesystem record store
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(base_path.join("users"))
            .with_context(|| format!("Failed to create state directory {:?}", base_path))?;
        Ok(FilesystemRecords {
            base_path,
            update_lock: Mutex::new(()),
        })
    }

    /// Compute SHA-256 hash of a name
    fn compute_hash(name: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn user_dir(&self, user: &str) -> PathBuf {
        self.base_path.join("users").join(Self::compute_hash(user))
    }

    fn server_stem(server: &str) -> String {
        if server.is_empty() {
            "default".to_string()
        } else {
            format!("server-{}", Self::compute_hash(server))
        }
    }

    fn state_path(&self, key: &RecordKey) -> PathBuf {
        self.user_dir(&key.user)
            .join(format!("{}.state.yaml", Self::server_stem(&key.server)))
    }

    fn running_path(&self, key: &RecordKey) -> PathBuf {
        self.user_dir(&key.user)
            .join(format!("{}.running.yaml", Self::server_stem(&key.server)))
    }

    fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {:?}", path))?;
        let value = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(Some(value))
    }

    /// Write to a temp file in the same directory, then rename over `path`
    fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| anyhow!("Record path has no parent: {:?}", path))?;
        let yaml = serde_yaml::to_string(value)?;

        let mut temp = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {:?}", dir))?;
        temp.write_all(yaml.as_bytes())?;
        temp.flush()?;
        temp.persist(path)
            .with_context(|| format!("Failed to persist {:?}", path))?;

        Ok(())
    }

    fn write_state_unlocked(&self, key: &RecordKey, state: &PersistedState) -> Result<()> {
        self.register_user(&key.user)?;
        Self::write_yaml(&self.state_path(key), state)
    }
}

impl StateRecords for FilesystemRecords {
    fn user_exists(&self, user: &str) -> Result<bool> {
        Ok(self.user_dir(user).join("user.yaml").exists())
    }

    fn register_user(&self, user: &str) -> Result<()> {
        let dir = self.user_dir(user);
        let record_path = dir.join("user.yaml");
        if record_path.exists() {
            return Ok(());
        }
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create user directory {:?}", dir))?;
        Self::write_yaml(
            &record_path,
            &UserRecord {
                name: user.to_string(),
            },
        )?;
        tracing::debug!("Registered user {}", user);
        Ok(())
    }

    fn read_state(&self, key: &RecordKey) -> Result<Option<PersistedState>> {
        Self::read_yaml(&self.state_path(key))
            .with_context(|| format!("Failed to load state for {}", key))
    }

    fn write_state(&self, key: &RecordKey, state: &PersistedState) -> Result<()> {
        let _guard = self
            .update_lock
            .lock()
            .map_err(|_| anyhow!("State lock poisoned"))?;
        self.write_state_unlocked(key, state)
    }

    fn update_state<F, T>(&self, key: &RecordKey, update_fn: F) -> Result<T>
    where
        F: FnOnce(&mut Option<PersistedState>) -> Result<T>,
    {
        let _guard = self
            .update_lock
            .lock()
            .map_err(|_| anyhow!("State lock poisoned"))?;

        // 1. Read current state
        let mut state = self.read_state(key)?;

        // 2. Apply updates
        let output = update_fn(&mut state)?;

        // 3. Write atomically
        if let Some(state) = &state {
            self.write_state_unlocked(key, state)?;
        }

        Ok(output)
    }

    fn running(&self, key: &RecordKey) -> Result<Option<Project>> {
        Self::read_yaml(&self.running_path(key))
    }

    fn set_running(&self, key: &RecordKey, project: Option<&Project>) -> Result<()> {
        let path = self.running_path(key);
        match project {
            Some(project) => {
                self.register_user(&key.user)?;
                Self::write_yaml(&path, project)
            }
            None => {
                if path.exists() {
                    fs::remove_file(&path)
                        .with_context(|| format!("Failed to remove {:?}", path))?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_record_reads_none() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let records = FilesystemRecords::new(temp_dir.path())?;

        let key = RecordKey::default_server("alice");
        assert!(records.read_state(&key)?.is_none());
        assert!(!records.user_exists("alice")?);

        Ok(())
    }

    #[test]
    fn test_state_persistence() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let records = FilesystemRecords::new(temp_dir.path())?;

        let key = RecordKey::default_server("alice");
        let state = PersistedState {
            projects: vec![Project::new("https://github.com/a/b", "img:1", "1")],
            deleted_projects: vec!["https://github.com/c/d".to_string()],
        };
        records.write_state(&key, &state)?;

        assert_eq!(records.read_state(&key)?, Some(state));
        assert!(records.user_exists("alice")?);

        // Other servers of the same user are separate records
        assert!(records.read_state(&RecordKey::new("alice", "gpu"))?.is_none());

        Ok(())
    }

    #[test]
    fn test_update_state_writes_only_when_some() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let records = FilesystemRecords::new(temp_dir.path())?;
        let key = RecordKey::default_server("bob");

        let seen = records.update_state(&key, |state| Ok(state.is_some()))?;
        assert!(!seen);
        assert!(records.read_state(&key)?.is_none());

        records.update_state(&key, |state| {
            state
                .get_or_insert_with(PersistedState::default)
                .deleted_projects
                .push("https://github.com/x/y".to_string());
            Ok(())
        })?;
        let state = records.read_state(&key)?.unwrap();
        assert_eq!(state.deleted_projects, vec!["https://github.com/x/y"]);

        Ok(())
    }

    #[test]
    fn test_failed_update_leaves_record() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let records = FilesystemRecords::new(temp_dir.path())?;
        let key = RecordKey::default_server("carol");
        records.write_state(&key, &PersistedState::default())?;

        let result: Result<()> = records.update_state(&key, |state| {
            if let Some(state) = state.as_mut() {
                state.deleted_projects.push("lost".to_string());
            }
            anyhow::bail!("boom")
        });
        assert!(result.is_err());
        assert_eq!(records.read_state(&key)?, Some(PersistedState::default()));

        Ok(())
    }

    #[test]
    fn test_legacy_record_on_disk() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let records = FilesystemRecords::new(temp_dir.path())?;
        let key = RecordKey::default_server("dave");
        records.register_user("dave")?;

        let legacy = "projects:\n- - https://github.com/a/b\n  - img:1\n  - '1'\n  - gh/a/b\n  - never\ndeleted_projects: []\n";
        fs::write(records.state_path(&key), legacy)?;

        let state = records.read_state(&key)?.unwrap();
        assert_eq!(state.projects[0].git_ref, "1");
        assert_eq!(state.projects[0].display_name, "gh/a/b");

        Ok(())
    }

    #[test]
    fn test_running_marker() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let records = FilesystemRecords::new(temp_dir.path())?;
        let key = RecordKey::default_server("erin");
        let project = Project::new("https://github.com/a/b", "img:1", "1");

        assert!(records.running(&key)?.is_none());
        records.set_running(&key, Some(&project))?;
        assert_eq!(records.running(&key)?, Some(project));
        records.set_running(&key, None)?;
        assert!(records.running(&key)?.is_none());
        // Clearing twice is fine
        records.set_running(&key, None)?;

        Ok(())
    }
}
