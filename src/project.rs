use std::fmt;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::codec;

const NEVER: &str = "never";

/// When a project was last launched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastUsed {
    /// Bootstrap default that was never launched
    Never,
    At(DateTime<Utc>),
}

impl LastUsed {
    /// Parse the persisted form: `never` or an ISO-8601 UTC timestamp
    pub fn parse(value: &str) -> Result<Self> {
        if value == NEVER {
            return Ok(LastUsed::Never);
        }
        let at = DateTime::parse_from_rfc3339(value)
            .with_context(|| format!("Invalid last_used timestamp: {}", value))?;
        Ok(LastUsed::At(at.with_timezone(&Utc)))
    }
}

impl fmt::Display for LastUsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LastUsed::Never => f.write_str(NEVER),
            LastUsed::At(at) => f.write_str(&at.to_rfc3339_opts(SecondsFormat::Micros, true)),
        }
    }
}

impl Serialize for LastUsed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LastUsed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        LastUsed::parse(&value).map_err(serde::de::Error::custom)
    }
}

/// One repository launched by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Project {
    pub repo_url: String,
    /// Image the project content was built into; empty for an unlaunched default
    #[serde(default)]
    pub image: String,
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    pub display_name: String,
    pub last_used: LastUsed,
}

impl Project {
    /// Create a never-launched project, normalizing the URL and deriving its display name
    pub fn new(
        repo_url: impl AsRef<str>,
        image: impl Into<String>,
        git_ref: impl Into<String>,
    ) -> Self {
        let repo_url = codec::normalize_repo_url(repo_url.as_ref()).to_string();
        let display_name = codec::display_name(&repo_url);
        Project {
            repo_url,
            image: image.into(),
            git_ref: git_ref.into(),
            display_name,
            last_used: LastUsed::Never,
        }
    }

    /// On-disk directory name under the projects root
    pub fn directory_name(&self) -> String {
        codec::directory_name(&self.repo_url)
    }

    /// True once the project has been built into a real image
    pub fn has_image(&self) -> bool {
        !self.image.is_empty()
    }
}

/// Wire form of a project entry
///
/// Older records store each project as
/// `[repo_url, image, ref, display_name, last_used]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ProjectEntry {
    Named(Project),
    Positional(String, String, String, String, LastUsed),
}

impl From<ProjectEntry> for Project {
    fn from(entry: ProjectEntry) -> Self {
        match entry {
            ProjectEntry::Named(project) => project,
            ProjectEntry::Positional(repo_url, image, git_ref, display_name, last_used) => {
                Project {
                    repo_url,
                    image,
                    git_ref,
                    display_name,
                    last_used,
                }
            }
        }
    }
}

fn deserialize_projects<'de, D>(deserializer: D) -> Result<Vec<Project>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Vec::<ProjectEntry>::deserialize(deserializer)?;
    Ok(entries.into_iter().map(Project::from).collect())
}

/// The durable per user-server record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Launched projects, most recently used last
    #[serde(default, deserialize_with = "deserialize_projects")]
    pub projects: Vec<Project>,

    /// Repo URLs whose directories are removed on the next launch
    #[serde(default)]
    pub deleted_projects: Vec<String>,
}
