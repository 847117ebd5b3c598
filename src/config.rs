use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{pod::VolumeMount, project::Project};

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(s) = path.to_str() {
        if let Some(stripped) = s.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if s == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

/// Project launched when a user has no history and gives no launch parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultProjectConfig {
    pub repo_url: String,
    #[serde(default)]
    pub image: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
}

impl DefaultProjectConfig {
    pub fn to_project(&self) -> Project {
        Project::new(&self.repo_url, self.image.clone(), self.git_ref.clone())
    }
}

/// Launch option copied into the notebook environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvPassthrough {
    pub option: String,
    pub env: String,
}

impl EnvPassthrough {
    fn uppercase(option: &str) -> Self {
        EnvPassthrough {
            option: option.to_string(),
            env: option.to_uppercase(),
        }
    }
}

/// Configuration for persistent-binder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpawnerConfig {
    /// Directory holding the per-user state records
    #[serde(default = "defaults::state_dir")]
    pub state_dir: PathBuf,
    #[serde(default)]
    pub default_project: Option<DefaultProjectConfig>,
    /// Where the whole durable volume is mounted
    #[serde(default = "defaults::projects_mount_path")]
    pub projects_mount_path: String,
    /// Where the active project's subtree is mounted
    #[serde(default = "defaults::home_mount_path")]
    pub home_mount_path: String,
    /// Name of the user's durable volume
    #[serde(default = "defaults::volume_name")]
    pub volume_name: String,
    /// Other notebook mounts, kept as is
    #[serde(default)]
    pub extra_volume_mounts: Vec<VolumeMount>,
    /// Image used by the init container when the active project has none
    #[serde(default = "defaults::singleuser_image")]
    pub singleuser_image: String,
    #[serde(default = "defaults::init_container_name")]
    pub init_container_name: String,
    #[serde(default = "defaults::env_passthrough")]
    pub env_passthrough: Vec<EnvPassthrough>,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        SpawnerConfig {
            state_dir: defaults::state_dir(),
            default_project: None,
            projects_mount_path: defaults::projects_mount_path(),
            home_mount_path: defaults::home_mount_path(),
            volume_name: defaults::volume_name(),
            extra_volume_mounts: Vec::new(),
            singleuser_image: defaults::singleuser_image(),
            init_container_name: defaults::init_container_name(),
            env_passthrough: defaults::env_passthrough(),
        }
    }
}

impl SpawnerConfig {
    /// Load configuration from a config file (if any) and environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => {
                let config_path = Self::config_file_path()?;
                tracing::debug!("loading persistent-binder config from {:?}", config_path);
                if config_path.exists() {
                    Self::load_from_file(&config_path)?
                } else {
                    tracing::debug!("no config file at {:?}, using defaults", config_path);
                    SpawnerConfig::default()
                }
            }
        };

        if let Ok(path) = env::var("PERSISTENT_BINDER_STATE_DIR") {
            config.state_dir = expand_tilde(&PathBuf::from(path));
        }

        if let Ok(image) = env::var("PERSISTENT_BINDER_SINGLEUSER_IMAGE") {
            config.singleuser_image = image;
        }

        if let Ok(path) = env::var("PERSISTENT_BINDER_PROJECTS_MOUNT_PATH") {
            config.projects_mount_path = path;
        }

        if let Ok(path) = env::var("PERSISTENT_BINDER_HOME_MOUNT_PATH") {
            config.home_mount_path = path;
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: SpawnerConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.state_dir = expand_tilde(&config.state_dir);

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get default config file path
    pub fn config_file_path() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(".config/persistent-binder/config.yaml"))
            .context("Could not determine home directory for config file")
    }

    pub fn default_project(&self) -> Option<Project> {
        self.default_project.as_ref().map(|p| p.to_project())
    }

    /// Notebook mounts before any project-specific rewrite
    pub fn base_volume_mounts(&self) -> Vec<VolumeMount> {
        let mut mounts = vec![VolumeMount::new(&self.volume_name, &self.home_mount_path)];
        mounts.extend(self.extra_volume_mounts.iter().cloned());
        mounts
    }
}

mod defaults {
    use std::path::PathBuf;

    use super::EnvPassthrough;

    pub(crate) fn state_dir() -> PathBuf {
        dirs::data_dir()
            .map(|dir| dir.join("persistent-binder"))
            .unwrap_or_else(|| PathBuf::from("persistent-binder"))
    }

    pub(crate) fn projects_mount_path() -> String {
        "/projects".to_string()
    }

    pub(crate) fn home_mount_path() -> String {
        "/home/jovyan".to_string()
    }

    pub(crate) fn volume_name() -> String {
        "home".to_string()
    }

    pub(crate) fn singleuser_image() -> String {
        "jupyter/base-notebook:latest".to_string()
    }

    pub(crate) fn init_container_name() -> String {
        "project-manager".to_string()
    }

    pub(crate) fn env_passthrough() -> Vec<EnvPassthrough> {
        let mut keys = vec![EnvPassthrough {
            option: "repo_url".to_string(),
            env: "BINDER_REPO_URL".to_string(),
        }];
        keys.extend(
            [
                "binder_ref_url",
                "binder_launch_host",
                "binder_persistent_request",
                "binder_request",
            ]
            .iter()
            .map(|key| EnvPassthrough::uppercase(key)),
        );
        keys
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");

        let config = SpawnerConfig {
            state_dir: dir.path().join("state"),
            default_project: Some(DefaultProjectConfig {
                repo_url: "https://github.com/x/y".to_string(),
                image: String::new(),
                git_ref: "main".to_string(),
            }),
            ..SpawnerConfig::default()
        };
        config.save(&config_path).unwrap();

        let loaded = SpawnerConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.state_dir, config.state_dir);
        assert_eq!(loaded.default_project, config.default_project);
        assert_eq!(loaded.env_passthrough, config.env_passthrough);
    }

    #[test]
    fn test_defaults_from_minimal_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        std::fs::write(
            &config_path,
            "default_project:\n  repo_url: https://github.com/x/y.git\n  ref: main\n",
        )
        .unwrap();

        let loaded = SpawnerConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.projects_mount_path, "/projects");
        assert_eq!(loaded.home_mount_path, "/home/jovyan");
        assert_eq!(loaded.init_container_name, "project-manager");

        let default = loaded.default_project().unwrap();
        assert_eq!(default.repo_url, "https://github.com/x/y");
        assert_eq!(default.display_name, "gh/x/y");
        assert!(default.image.is_empty());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        std::fs::write(&config_path, "volume_nmae: home\n").unwrap();

        assert!(SpawnerConfig::load_from_file(&config_path).is_err());
    }

    #[test]
    fn test_env_passthrough_defaults() {
        let keys = defaults::env_passthrough();
        assert_eq!(keys[0].env, "BINDER_REPO_URL");
        assert!(keys
            .iter()
            .any(|k| k.option == "binder_launch_host" && k.env == "BINDER_LAUNCH_HOST"));
    }

    #[test]
    fn test_tilde_expansion() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        std::fs::write(&config_path, "state_dir: ~/binder-state\n").unwrap();

        let loaded = SpawnerConfig::load_from_file(&config_path).unwrap();
        if let Some(home) = dirs::home_dir() {
            assert_eq!(loaded.state_dir, home.join("binder-state"));
        }
    }

    #[test]
    fn test_base_volume_mounts() {
        let config = SpawnerConfig {
            extra_volume_mounts: vec![VolumeMount::new("shared", "/shared")],
            ..SpawnerConfig::default()
        };
        let mounts = config.base_volume_mounts();
        assert_eq!(mounts[0], VolumeMount::new("home", "/home/jovyan"));
        assert_eq!(mounts[1], VolumeMount::new("shared", "/shared"));
    }
}
