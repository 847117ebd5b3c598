use anyhow::{Context, Result};
use chrono::Utc;

use crate::{
    config::SpawnerConfig,
    planner::{LaunchOptions, LaunchPlan, LaunchPlanner},
    project::Project,
    storage::{RecordKey, StateRecords},
    sync::StateSync,
};

/// Hub-side start/stop hooks of a persistent notebook server
pub struct Spawner<R> {
    planner: LaunchPlanner,
    sync: StateSync<R>,
}

impl<R: StateRecords> Spawner<R> {
    pub fn new(config: &SpawnerConfig, records: R) -> Self {
        let planner = LaunchPlanner::new(config);
        let sync = StateSync::new(records, planner.default_project().cloned());
        Spawner { planner, sync }
    }

    pub fn sync(&self) -> &StateSync<R> {
        &self.sync
    }

    pub fn records(&self) -> &R {
        self.sync.records()
    }

    /// Plan and record a server start.
    ///
    /// Fails without touching the record when no project can be launched.
    pub fn start(&self, key: &RecordKey, options: &LaunchOptions) -> Result<LaunchPlan> {
        let now = Utc::now();
        let mut store = self.sync.load(key)?;
        let plan = self.planner.plan(options, &mut store, now)?;

        self.sync
            .commit_launch(key, &plan.active, &plan.drained, now)
            .with_context(|| format!("Failed to record launch for {}", key))?;
        self.records().set_running(key, Some(&plan.active))?;

        Ok(plan)
    }

    /// Record a server stop, refreshing the running project's `last_used`.
    /// Returns the project that was running, if any.
    pub fn stop(&self, key: &RecordKey) -> Result<Option<Project>> {
        let Some(project) = self.records().running(key)? else {
            tracing::debug!("Server {} is not running", key);
            return Ok(None);
        };

        self.sync
            .commit_launch(key, &project, &[], Utc::now())
            .with_context(|| format!("Failed to record stop for {}", key))?;
        self.records().set_running(key, None)?;
        tracing::info!("Stopped {} for {}", project.display_name, key);

        Ok(Some(project))
    }

    pub fn is_running(&self, key: &RecordKey) -> Result<bool> {
        Ok(self.records().running(key)?.is_some())
    }
}
