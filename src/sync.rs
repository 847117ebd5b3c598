//! Bridge between [`ProjectStore`] and the durable record

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::{
    project::{PersistedState, Project},
    storage::{RecordKey, StateRecords},
    store::ProjectStore,
};

pub struct StateSync<R> {
    records: R,
    default_project: Option<Project>,
}

impl<R: StateRecords> StateSync<R> {
    pub fn new(records: R, default_project: Option<Project>) -> Self {
        StateSync {
            records,
            default_project,
        }
    }

    pub fn records(&self) -> &R {
        &self.records
    }

    /// Current store for `key`, without writing anything back
    pub fn load(&self, key: &RecordKey) -> Result<ProjectStore> {
        let persisted = self.records.read_state(key)?;
        Ok(ProjectStore::load(persisted, self.default_project.as_ref()))
    }

    /// State as a launch would see it. Never mutates the record, so
    /// observing does not reorder projects or clear pending deletions.
    pub fn peek(&self, key: &RecordKey) -> Result<PersistedState> {
        Ok(self.load(key)?.into_state())
    }

    pub fn peek_projects(&self, key: &RecordKey) -> Result<Vec<Project>> {
        Ok(self.peek(key)?.projects)
    }

    pub fn peek_deleted_projects(&self, key: &RecordKey) -> Result<Vec<String>> {
        Ok(self.peek(key)?.deleted_projects)
    }

    /// Record a launch (or the stop of a launched server).
    ///
    /// Moves `active` to the tail with a fresh `last_used` (unless it has no
    /// image) and forgets the pending deletions in `drained`, which the
    /// launch's init command already removes.
    pub fn commit_launch(
        &self,
        key: &RecordKey,
        active: &Project,
        drained: &[String],
        now: DateTime<Utc>,
    ) -> Result<PersistedState> {
        self.records.update_state(key, |record| {
            let mut store = ProjectStore::load(record.take(), self.default_project.as_ref());
            if active.has_image() {
                store.upsert(active.clone(), now);
            }
            store.clear_pending(drained);

            let state = store.into_state();
            tracing::info!(
                "Committed launch of {} for {}: {} project(s), {} pending deletion(s)",
                active.repo_url,
                key,
                state.projects.len(),
                state.deleted_projects.len()
            );
            *record = Some(state.clone());
            Ok(state)
        })
    }

    /// Remove a project from the visible list and queue its directory for removal.
    ///
    /// The record is written only when the project was found. The caller
    /// must make sure the server is not running.
    pub fn commit_deletion(&self, key: &RecordKey, repo_url: &str) -> Result<(PersistedState, bool)> {
        self.records.update_state(key, |record| {
            let mut store = ProjectStore::load(record.clone(), self.default_project.as_ref());
            let found = store.mark_deleted(repo_url);
            let state = store.into_state();

            if found {
                tracing::info!("Queued {} of {} for deletion", repo_url, key);
                *record = Some(state.clone());
            } else {
                tracing::debug!("Project {} of {} not found", repo_url, key);
            }
            Ok((state, found))
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;
    use crate::storage::FilesystemRecords;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn default_project() -> Project {
        Project::new("https://github.com/x/y", "", "main")
    }

    fn sync(temp_dir: &TempDir) -> StateSync<FilesystemRecords> {
        let records = FilesystemRecords::new(temp_dir.path()).unwrap();
        StateSync::new(records, Some(default_project()))
    }

    #[test]
    fn test_peek_new_user_is_default() {
        let temp_dir = TempDir::new().unwrap();
        let sync = sync(&temp_dir);
        let key = RecordKey::default_server("alice");

        assert_eq!(sync.peek_projects(&key).unwrap(), vec![default_project()]);
        assert!(sync.peek_deleted_projects(&key).unwrap().is_empty());
        // Peeking writes nothing
        assert!(sync.records().read_state(&key).unwrap().is_none());
    }

    #[test]
    fn test_commit_launch_upserts_and_clears_drained() {
        let temp_dir = TempDir::new().unwrap();
        let sync = sync(&temp_dir);
        let key = RecordKey::default_server("alice");

        let a = Project::new("https://github.com/a/a", "img:a", "a");
        sync.commit_launch(&key, &a, &[], now()).unwrap();
        sync.commit_deletion(&key, "https://github.com/a/a").unwrap();

        let b = Project::new("https://github.com/b/b", "img:b", "b");
        let drained = vec!["https://github.com/a/a".to_string()];
        let state = sync.commit_launch(&key, &b, &drained, now()).unwrap();

        // The default entry from the first load stays behind the launched projects
        let urls: Vec<_> = state.projects.iter().map(|p| p.repo_url.as_str()).collect();
        assert_eq!(urls, vec!["https://github.com/x/y", "https://github.com/b/b"]);
        assert!(state.deleted_projects.is_empty());
        assert_eq!(sync.peek(&key).unwrap(), state);
    }

    #[test]
    fn test_commit_launch_without_image_keeps_list() {
        let temp_dir = TempDir::new().unwrap();
        let sync = sync(&temp_dir);
        let key = RecordKey::default_server("alice");

        let state = sync
            .commit_launch(&key, &default_project(), &[], now())
            .unwrap();
        assert_eq!(state.projects, vec![default_project()]);
    }

    #[test]
    fn test_commit_deletion() {
        let temp_dir = TempDir::new().unwrap();
        let sync = sync(&temp_dir);
        let key = RecordKey::default_server("alice");
        let a = Project::new("https://github.com/a/a", "img:a", "a");
        sync.commit_launch(&key, &a, &[], now()).unwrap();

        let (state, found) = sync
            .commit_deletion(&key, "https://github.com/a/a")
            .unwrap();
        assert!(found);
        assert_eq!(state.deleted_projects, vec!["https://github.com/a/a"]);

        let peeked = sync.peek(&key).unwrap();
        assert!(peeked
            .projects
            .iter()
            .all(|p| p.repo_url != "https://github.com/a/a"));
        assert_eq!(peeked.deleted_projects, vec!["https://github.com/a/a"]);
    }

    #[test]
    fn test_commit_deletion_not_found_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let sync = sync(&temp_dir);
        let key = RecordKey::default_server("alice");

        let (state, found) = sync
            .commit_deletion(&key, "https://github.com/nope/nope")
            .unwrap();
        assert!(!found);
        assert_eq!(state.deleted_projects, vec!["https://github.com/nope/nope"]);
        assert!(sync.records().read_state(&key).unwrap().is_none());
    }
}
