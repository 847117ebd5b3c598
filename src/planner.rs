//! Per-launch decisions: which project runs, how its directory is prepared,
//! and how the durable volume is mounted

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    codec,
    config::{EnvPassthrough, SpawnerConfig},
    error::Error,
    pod::{InitContainer, VolumeMount},
    project::Project,
    store::ProjectStore,
};

/// Launch-time parameters supplied by the launch service or the user.
/// Values are untrusted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LaunchOptions(BTreeMap<String, serde_json::Value>);

impl LaunchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// String value of `key`, if present and a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    /// Value of `key` as environment text; non-strings are rendered as JSON
    fn render(&self, key: &str) -> Option<String> {
        self.0.get(key).map(|value| match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

impl<K: Into<String>, V: Into<serde_json::Value>> FromIterator<(K, V)> for LaunchOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        LaunchOptions(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Everything the scheduler needs to start the notebook for one project
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchPlan {
    pub active: Project,
    pub init_container: InitContainer,
    /// Notebook container mounts
    pub volume_mounts: Vec<VolumeMount>,
    pub env: BTreeMap<String, String>,
    /// Pending deletions embedded in the init command
    pub drained: Vec<String>,
}

pub struct LaunchPlanner {
    default_project: Option<Project>,
    projects_mount_path: String,
    home_mount_path: String,
    volume_name: String,
    base_volume_mounts: Vec<VolumeMount>,
    singleuser_image: String,
    init_container_name: String,
    env_passthrough: Vec<EnvPassthrough>,
}

impl LaunchPlanner {
    pub fn new(config: &SpawnerConfig) -> Self {
        if config.default_project.is_none() {
            tracing::warn!(
                "No default project configured; launches without parameters or history will fail"
            );
        }
        LaunchPlanner {
            default_project: config.default_project(),
            projects_mount_path: config.projects_mount_path.clone(),
            home_mount_path: config.home_mount_path.clone(),
            volume_name: config.volume_name.clone(),
            base_volume_mounts: config.base_volume_mounts(),
            singleuser_image: config.singleuser_image.clone(),
            init_container_name: config.init_container_name.clone(),
            env_passthrough: config.env_passthrough.clone(),
        }
    }

    pub fn default_project(&self) -> Option<&Project> {
        self.default_project.as_ref()
    }

    /// Plan one launch against `store`.
    ///
    /// Drains the pending deletions into the init command and upserts the
    /// active project, so `store` afterwards holds the state to commit.
    pub fn plan(
        &self,
        options: &LaunchOptions,
        store: &mut ProjectStore,
        now: DateTime<Utc>,
    ) -> Result<LaunchPlan> {
        let active = self.select_active(options, store)?;
        let project_dir = active.directory_name();
        tracing::info!(
            "Launching {} ({}) in directory {}",
            active.display_name,
            active.git_ref,
            project_dir
        );

        let drained = store.drain_pending();
        let command = self.init_command(&drained, &project_dir);

        let image = if active.has_image() {
            active.image.clone()
        } else {
            self.singleuser_image.clone()
        };
        let init_container = InitContainer {
            name: self.init_container_name.clone(),
            image,
            command: vec!["/bin/sh".to_string(), "-c".to_string(), command],
            volume_mounts: vec![self.projects_mount()],
        };

        let volume_mounts = self.rewrite_mounts(&self.base_volume_mounts, &project_dir);
        let env = self.env(options);

        if active.has_image() {
            store.upsert(active.clone(), now);
        } else {
            tracing::debug!("Not recording {}: no image yet", active.repo_url);
        }

        Ok(LaunchPlan {
            active,
            init_container,
            volume_mounts,
            env,
            drained,
        })
    }

    /// Pick the project to launch.
    ///
    /// Explicit launch parameters win over the most recently used project,
    /// which wins over the configured default.
    pub fn select_active(&self, options: &LaunchOptions, store: &ProjectStore) -> Result<Project> {
        // Any token value marks a launch from the launch service
        if let (Some(image), Some(repo_url), true) = (
            options.get_str("image"),
            options.get_str("repo_url"),
            options.contains_key("token"),
        ) {
            let git_ref = image.rsplit(':').next().unwrap_or(image);
            tracing::debug!("Using launch parameters for {}", repo_url);
            return Ok(Project::new(repo_url, image, git_ref));
        }

        if let Some(last) = store.last().filter(|p| p.has_image()) {
            tracing::debug!("Relaunching most recent project {}", last.repo_url);
            return Ok(last.clone());
        }

        match &self.default_project {
            Some(default) => {
                tracing::debug!("Falling back to default project {}", default.repo_url);
                Ok(default.clone())
            }
            None => Err(Error::Configuration(
                "no launch parameters, no previously launched project and no default project configured"
                    .to_string(),
            )
            .into()),
        }
    }

    /// Shell command run by the init container.
    ///
    /// Removes the directories of `drained` projects, then materializes
    /// `project_dir` unless a directory or symlink already occupies it.
    pub fn init_command(&self, drained: &[String], project_dir: &str) -> String {
        let mut commands = Vec::with_capacity(2);

        if !drained.is_empty() {
            let mut paths: Vec<String> = Vec::with_capacity(drained.len());
            for repo_url in drained {
                let path = self.project_path(&codec::directory_name(repo_url));
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
            commands.push(format!("rm -rf {}", paths.join(" ")));
        }

        let path = self.project_path(project_dir);
        commands.push(format!(
            "if [ -d {path} ]; then echo 'directory {path} exists'; \
             elif [ -L {path} ]; then echo '{path} is a symlink'; \
             else mkdir {path} && cp -a ~/. {path}; fi"
        ));

        commands.join(" && ")
    }

    /// Notebook mounts for a launch of `project_dir`.
    ///
    /// Mounts at the projects root or the home directory are dropped (a failed
    /// earlier launch can leave duplicates), then the home directory gets the
    /// project's subtree and the projects root gets the whole volume.
    pub fn rewrite_mounts(&self, base: &[VolumeMount], project_dir: &str) -> Vec<VolumeMount> {
        let home = VolumeMount::new(&self.volume_name, &self.home_mount_path)
            .with_sub_path(project_dir);

        let mut mounts = vec![home];
        mounts.extend(
            base.iter()
                .filter(|m| {
                    !m.mounts_at(&self.projects_mount_path) && !m.mounts_at(&self.home_mount_path)
                })
                .cloned(),
        );
        mounts.push(self.projects_mount());
        mounts
    }

    /// Launch options mirrored into the notebook environment
    pub fn env(&self, options: &LaunchOptions) -> BTreeMap<String, String> {
        self.env_passthrough
            .iter()
            .filter_map(|key| options.render(&key.option).map(|v| (key.env.clone(), v)))
            .collect()
    }

    fn projects_mount(&self) -> VolumeMount {
        VolumeMount::new(&self.volume_name, &self.projects_mount_path)
    }

    fn project_path(&self, project_dir: &str) -> String {
        format!(
            "{}/{}",
            self.projects_mount_path.trim_end_matches('/'),
            project_dir
        )
    }
}
