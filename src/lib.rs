//! Persistent projects for a notebook-spawning hub.
//!
//! Every repository a user launches gets its own directory on the user's
//! durable volume. On each launch the active project's directory is
//! materialized and mounted as the home directory, while the whole volume
//! stays visible under the projects root. Deleted projects are removed
//! from disk by the next launch.
#![deny(clippy::mod_module_files)]

pub mod api;
pub mod codec;
pub mod config;
pub mod error;
pub mod planner;
pub mod pod;
pub mod project;
pub mod spawner;
pub mod storage;
pub mod store;
pub mod sync;

pub use config::SpawnerConfig;
pub use planner::{LaunchOptions, LaunchPlan, LaunchPlanner};
pub use project::{LastUsed, PersistedState, Project};
pub use spawner::Spawner;
pub use storage::{FilesystemRecords, RecordKey, StateRecords};
pub use store::ProjectStore;
pub use sync::StateSync;
