use std::fmt;

use anyhow::Result;

use crate::project::{PersistedState, Project};

/// Identifies one server of one user; an empty server name is the default server
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub user: String,
    pub server: String,
}

impl RecordKey {
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        RecordKey {
            user: user.into(),
            server: server.into(),
        }
    }

    /// The user's default (unnamed) server
    pub fn default_server(user: impl Into<String>) -> Self {
        Self::new(user, "")
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.server.is_empty() {
            write!(f, "{}", self.user)
        } else {
            write!(f, "{}/{}", self.user, self.server)
        }
    }
}

/// Durable per user-server records
pub trait StateRecords {
    /// Check whether the user is known
    fn user_exists(&self, user: &str) -> Result<bool>;

    /// Make the user known. Registering an existing user is a no-op.
    fn register_user(&self, user: &str) -> Result<()>;

    /// Read the persisted state.
    /// Returns None if nothing was ever written for this key.
    fn read_state(&self, key: &RecordKey) -> Result<Option<PersistedState>>;

    /// Atomically write new state.
    fn write_state(&self, key: &RecordKey, state: &PersistedState) -> Result<()>;

    /// Atomically update state using a closure.
    /// The closure sees None if no record exists; leaving it None writes nothing.
    fn update_state<F, T>(&self, key: &RecordKey, update_fn: F) -> Result<T>
    where
        F: FnOnce(&mut Option<PersistedState>) -> Result<T>;

    /// Project the server is currently running, if it is running
    fn running(&self, key: &RecordKey) -> Result<Option<Project>>;

    /// Record the server as running `project`, or as stopped with None
    fn set_running(&self, key: &RecordKey, project: Option<&Project>) -> Result<()>;
}
