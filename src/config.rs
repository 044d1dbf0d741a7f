//! # Configuration (`kira.yml`)
//!
//! This module defines the slice of `kira.yml` the `latest` command consumes
//! and the logic for loading it. Unknown keys are ignored, so a fuller
//! configuration used by other kira commands loads without complaint.
//!
//! ## Key Components
//!
//! - **`Config`**: the resolved configuration, with defaults filled in for
//!   every missing section.
//! - **`WorkspaceConfig` / `ProjectConfig`**: the optional workspace topology.
//!   Projects may point at their own git roots (`path`), share a physical root
//!   (`repo_root`), or live inside the current repository (`mount`).
//! - **`Topology`**: standalone, monorepo or polyrepo, derived from the
//!   project list.
//!
//! ## Example
//!
//! ```yaml
//! git:
//!   trunk_branch: main
//!   fetch_timeout: 60
//! workspace:
//!   projects:
//!     - name: api
//!       path: ../api
//!       remote: upstream
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::defaults::{self, timeout_or};
use crate::error::{Error, Result};

/// The resolved kira configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub work: WorkConfig,
    pub git: GitConfig,
    pub workspace: Option<WorkspaceConfig>,
}

/// Where work items live.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkConfig {
    /// Work item root, relative to the configuration directory.
    pub folder: String,
    pub status_folders: StatusFolders,
}

impl Default for WorkConfig {
    fn default() -> Self {
        Self {
            folder: defaults::WORK_FOLDER.to_string(),
            status_folders: StatusFolders::default(),
        }
    }
}

/// Names of the status folders under the work folder.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatusFolders {
    pub doing: String,
}

impl Default for StatusFolders {
    fn default() -> Self {
        Self {
            doing: defaults::DOING_FOLDER.to_string(),
        }
    }
}

/// Global git settings. Timeouts are in seconds; 0 means the default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub trunk_branch: Option<String>,
    pub remote: Option<String>,
    pub command_timeout: u64,
    pub fetch_timeout: u64,
    pub rebase_timeout: u64,
}

/// Optional multi-project workspace description.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Base directory for project paths, relative to the configuration
    /// directory. Defaults to the configuration directory itself.
    pub root: Option<String>,
    pub projects: Vec<ProjectConfig>,
}

/// One project of the workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
    /// Path of the project's own git repository.
    pub path: Option<String>,
    /// Physical git root shared with other projects.
    pub repo_root: Option<String>,
    /// Subdirectory the project occupies inside its repository.
    pub mount: Option<String>,
    pub trunk_branch: Option<String>,
    pub remote: Option<String>,
}

impl ProjectConfig {
    /// Whether this project lives in a git repository of its own.
    pub fn has_separate_root(&self) -> bool {
        self.path.is_some() || self.repo_root.is_some()
    }
}

/// Workspace topology derived from the project list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// No project list.
    Standalone,
    /// Projects that all live in the current repository.
    Monorepo,
    /// At least one project has a git root of its own.
    Polyrepo,
}

/// Resolved git timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub command: Duration,
    pub fetch: Duration,
    pub rebase: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        GitConfig::default().timeouts()
    }
}

impl GitConfig {
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            command: timeout_or(self.command_timeout, defaults::COMMAND_TIMEOUT_SECS),
            fetch: timeout_or(self.fetch_timeout, defaults::FETCH_TIMEOUT_SECS),
            rebase: timeout_or(self.rebase_timeout, defaults::REBASE_TIMEOUT_SECS),
        }
    }
}

impl Config {
    /// Parse configuration text. `path` is only used in error messages.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let value: serde_yaml::Value =
            serde_yaml::from_str(content).map_err(|e| parse_error(path, e))?;

        // An empty file or one holding only comments is a valid, default config.
        if value.is_null() {
            return Ok(Self::default());
        }

        serde_yaml::from_value(value).map_err(|e| parse_error(path, e))
    }

    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("{} not found, using default configuration", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    pub fn projects(&self) -> &[ProjectConfig] {
        self.workspace
            .as_ref()
            .map(|w| w.projects.as_slice())
            .unwrap_or_default()
    }

    pub fn topology(&self) -> Topology {
        let projects = self.projects();
        if projects.is_empty() {
            Topology::Standalone
        } else if projects.iter().any(ProjectConfig::has_separate_root) {
            Topology::Polyrepo
        } else {
            Topology::Monorepo
        }
    }

    /// Base directory that relative project paths are resolved against.
    pub fn workspace_root(&self, config_dir: &Path) -> PathBuf {
        match self.workspace.as_ref().and_then(|w| w.root.as_deref()) {
            Some(root) => config_dir.join(root),
            None => config_dir.to_path_buf(),
        }
    }

    /// Work item folder holding the item currently in progress.
    pub fn doing_dir(&self, config_dir: &Path) -> PathBuf {
        config_dir
            .join(&self.work.folder)
            .join(&self.work.status_folders.doing)
    }

    /// Remote for a project: project override, then `git.remote`, then `origin`.
    pub fn remote_for(&self, project: Option<&ProjectConfig>) -> String {
        project
            .and_then(|p| p.remote.clone())
            .or_else(|| self.git.remote.clone())
            .unwrap_or_else(|| defaults::REMOTE.to_string())
    }

    /// Configured trunk branch for a project, if any; `None` means auto-detect.
    pub fn trunk_override_for(&self, project: Option<&ProjectConfig>) -> Option<String> {
        project
            .and_then(|p| p.trunk_branch.clone())
            .or_else(|| self.git.trunk_branch.clone())
    }

    pub fn timeouts(&self) -> Timeouts {
        self.git.timeouts()
    }
}

fn parse_error(path: &Path, error: serde_yaml::Error) -> Error {
    Error::ConfigParse {
        path: path.to_path_buf(),
        message: error.to_string(),
        hint: Some(
            "kira.yml must be a YAML mapping; see the 'git', 'work' and 'workspace' sections"
                .to_string(),
        ),
    }
}
