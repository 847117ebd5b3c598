//! In-memory view of a user's projects and pending deletions

use chrono::{DateTime, Utc};

use crate::project::{LastUsed, PersistedState, Project};

/// Ordered project list plus the set of projects awaiting removal from disk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectStore {
    projects: Vec<Project>,
    pending: Vec<String>,
}

impl ProjectStore {
    /// Reconstruct the store from a persisted record.
    ///
    /// A user without any record starts with the default project only.
    /// An existing record is taken as is, even when its project list is empty.
    pub fn load(persisted: Option<PersistedState>, default_project: Option<&Project>) -> Self {
        match persisted {
            Some(state) => {
                let mut store = ProjectStore {
                    projects: Vec::with_capacity(state.projects.len()),
                    pending: Vec::with_capacity(state.deleted_projects.len()),
                };
                // Older records may carry duplicates; the last occurrence wins
                for project in state.projects {
                    store.projects.retain(|p| p.repo_url != project.repo_url);
                    store.projects.push(project);
                }
                for repo_url in state.deleted_projects {
                    store.add_pending(repo_url);
                }
                store
            }
            None => ProjectStore {
                projects: default_project.cloned().into_iter().collect(),
                pending: Vec::new(),
            },
        }
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    /// Most recently launched project
    pub fn last(&self) -> Option<&Project> {
        self.projects.last()
    }

    /// Move `project` to the tail, replacing any entry with the same repo URL
    pub fn upsert(&mut self, mut project: Project, now: DateTime<Utc>) {
        self.projects.retain(|p| p.repo_url != project.repo_url);
        project.last_used = LastUsed::At(now);
        self.projects.push(project);
    }

    /// Remove a project from the list and queue its directory for removal.
    ///
    /// Returns whether the project was in the list. The URL is queued either way.
    pub fn mark_deleted(&mut self, repo_url: &str) -> bool {
        let before = self.projects.len();
        self.projects.retain(|p| p.repo_url != repo_url);
        let found = self.projects.len() != before;
        self.add_pending(repo_url.to_string());
        found
    }

    /// Take every pending URL, leaving the set empty
    pub fn drain_pending(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending)
    }

    /// Forget the given URLs from the pending set
    pub fn clear_pending(&mut self, repo_urls: &[String]) {
        self.pending.retain(|url| !repo_urls.contains(url));
    }

    pub fn into_state(self) -> PersistedState {
        PersistedState {
            projects: self.projects,
            deleted_projects: self.pending,
        }
    }

    fn add_pending(&mut self, repo_url: String) {
        if !self.pending.contains(&repo_url) {
            self.pending.push(repo_url);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    fn store_with(urls: &[&str]) -> ProjectStore {
        let mut store = ProjectStore::load(Some(PersistedState::default()), None);
        for (i, url) in urls.iter().enumerate() {
            store.upsert(Project::new(url, "img:1", "1"), at(i as u32));
        }
        store
    }

    fn urls(store: &ProjectStore) -> Vec<&str> {
        store.projects().iter().map(|p| p.repo_url.as_str()).collect()
    }

    #[test]
    fn test_load_without_record_uses_default() {
        let default = Project::new("https://github.com/x/y", "", "main");
        let store = ProjectStore::load(None, Some(&default));
        assert_eq!(store.projects(), &[default]);
        assert!(store.pending().is_empty());

        let store = ProjectStore::load(None, None);
        assert!(store.projects().is_empty());
    }

    #[test]
    fn test_load_keeps_empty_record() {
        let default = Project::new("https://github.com/x/y", "", "main");
        let store = ProjectStore::load(Some(PersistedState::default()), Some(&default));
        assert!(store.projects().is_empty());
    }

    #[test]
    fn test_load_passes_pending_through() {
        let state = PersistedState {
            projects: vec![],
            deleted_projects: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        let store = ProjectStore::load(Some(state), None);
        assert_eq!(store.pending(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_upsert_moves_to_tail_with_latest_values() {
        let mut store = store_with(&[
            "https://github.com/a/a",
            "https://github.com/b/b",
            "https://github.com/c/c",
        ]);

        store.upsert(Project::new("https://github.com/a/a", "img:2", "2"), at(10));
        store.upsert(Project::new("https://github.com/a/a", "img:3", "3"), at(11));

        assert_eq!(
            urls(&store),
            vec![
                "https://github.com/b/b",
                "https://github.com/c/c",
                "https://github.com/a/a"
            ]
        );
        let last = store.last().unwrap();
        assert_eq!(last.image, "img:3");
        assert_eq!(last.git_ref, "3");
        assert_eq!(last.last_used, LastUsed::At(at(11)));
    }

    #[test]
    fn test_mark_deleted_present() {
        let mut store = store_with(&["https://github.com/a/a", "https://github.com/b/b"]);

        assert!(store.mark_deleted("https://github.com/a/a"));
        assert_eq!(urls(&store), vec!["https://github.com/b/b"]);
        assert_eq!(store.pending(), &["https://github.com/a/a".to_string()]);
    }

    #[test]
    fn test_mark_deleted_absent_still_queues() {
        let mut store = store_with(&["https://github.com/a/a"]);

        assert!(!store.mark_deleted("https://github.com/zzz/zzz"));
        assert_eq!(urls(&store), vec!["https://github.com/a/a"]);
        assert_eq!(store.pending(), &["https://github.com/zzz/zzz".to_string()]);

        // Already pending: not duplicated
        assert!(!store.mark_deleted("https://github.com/zzz/zzz"));
        assert_eq!(store.pending().len(), 1);
    }

    #[test]
    fn test_drain_and_clear_pending() {
        let mut store = store_with(&["https://github.com/a/a", "https://github.com/b/b"]);
        store.mark_deleted("https://github.com/a/a");
        store.mark_deleted("https://github.com/b/b");

        let mut copy = store.clone();
        let drained = copy.drain_pending();
        assert_eq!(drained.len(), 2);
        assert!(copy.pending().is_empty());

        store.mark_deleted("https://github.com/c/c");
        store.clear_pending(&drained);
        assert_eq!(store.pending(), &["https://github.com/c/c".to_string()]);
    }
}
