//! Discovery: resolve the repositories that belong to the current work item.
//!
//! ## Process
//!
//! 1.  **Work item**: exactly one markdown file must sit in the configured
//!     doing folder; its front matter `id` (and optional `repos` list) is read.
//!
//! 2.  **Topology**: the workspace section of `kira.yml` decides between a
//!     standalone repository, a monorepo (projects mounted inside the current
//!     repository) and a polyrepo (projects with git roots of their own).
//!     Standalone and monorepo workspaces yield the current repository only;
//!     a polyrepo yields one repository per project, restricted to the work
//!     item's `repos` list when it declares one.
//!
//! 3.  **Validation**: every path must exist and be a git repository. All
//!     failures are collected and reported together, before anything is
//!     mutated.
//!
//! 4.  **Git parameters**: the trunk branch comes from the project override,
//!     then `git.trunk_branch`, then auto-detection (exactly one of `main` /
//!     `master` must exist locally); the remote from the project override,
//!     then `git.remote`, then `origin`.

use std::path::{Path, PathBuf};

use log::debug;

use crate::config::{Config, ProjectConfig, Topology};
use crate::defaults::TRUNK_CANDIDATES;
use crate::error::{Error, Result};
use crate::git::{self, GitRunner, RunOptions};
use crate::repository::RepositoryInfo;
use crate::work_item::WorkItem;

/// Everything discovery resolved for this invocation.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub work_item: WorkItem,
    pub topology: Topology,
    pub repos: Vec<RepositoryInfo>,
}

/// A repository before validation and git parameter resolution.
#[derive(Debug, Clone)]
struct Candidate<'a> {
    name: String,
    path: PathBuf,
    project: Option<&'a ProjectConfig>,
    shared_root_key: Option<String>,
}

/// Run discovery from the directory holding `kira.yml`.
pub fn execute(config: &Config, config_dir: &Path, git: &dyn GitRunner) -> Result<Discovery> {
    let work_item = WorkItem::find_current(config, config_dir)?;
    let topology = config.topology();
    debug!("work item {} ({:?} workspace)", work_item.id, topology);

    let candidates = match topology {
        Topology::Standalone | Topology::Monorepo => vec![current_repository(config_dir)],
        Topology::Polyrepo => polyrepo_candidates(config, config_dir, &work_item)?,
    };

    let repos = resolve(config, candidates, git)?;
    Ok(Discovery {
        work_item,
        topology,
        repos,
    })
}

fn current_repository<'a>(config_dir: &Path) -> Candidate<'a> {
    let name = config_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workspace".to_string());
    Candidate {
        name,
        path: config_dir.to_path_buf(),
        project: None,
        shared_root_key: None,
    }
}

fn polyrepo_candidates<'a>(
    config: &'a Config,
    config_dir: &Path,
    work_item: &WorkItem,
) -> Result<Vec<Candidate<'a>>> {
    let projects = config.projects();

    if let Some(declared) = &work_item.repos {
        let unknown: Vec<String> = declared
            .iter()
            .filter(|name| !projects.iter().any(|p| &p.name == *name))
            .map(|name| format!("{}: not a project in the workspace configuration", name))
            .collect();
        if !unknown.is_empty() {
            return Err(Error::Discovery { failures: unknown });
        }
    }

    let root = config.workspace_root(config_dir);
    Ok(projects
        .iter()
        .filter(|project| {
            work_item
                .repos
                .as_ref()
                .is_none_or(|declared| declared.contains(&project.name))
        })
        .map(|project| {
            let (path, shared_root_key) = match (&project.repo_root, &project.path) {
                (Some(repo_root), _) => (root.join(repo_root), Some(repo_root.clone())),
                (None, Some(path)) => (root.join(path), None),
                (None, None) => (config_dir.to_path_buf(), None),
            };
            Candidate {
                name: project.name.clone(),
                path,
                project: Some(project),
                shared_root_key,
            }
        })
        .collect())
}

fn resolve(
    config: &Config,
    candidates: Vec<Candidate<'_>>,
    git: &dyn GitRunner,
) -> Result<Vec<RepositoryInfo>> {
    let options = RunOptions::new(config.timeouts().command);

    let failures: Vec<String> = candidates
        .iter()
        .filter_map(|candidate| {
            if !candidate.path.exists() {
                Some(format!(
                    "{}: path {} does not exist",
                    candidate.name,
                    candidate.path.display()
                ))
            } else if !git::is_repository(git, &candidate.path, options) {
                Some(format!(
                    "{}: {} is not a git repository",
                    candidate.name,
                    candidate.path.display()
                ))
            } else {
                None
            }
        })
        .collect();
    if !failures.is_empty() {
        return Err(Error::Discovery { failures });
    }

    let mut repos = Vec::with_capacity(candidates.len());
    let mut failures = Vec::new();
    for candidate in candidates {
        let path = std::fs::canonicalize(&candidate.path)?;
        let trunk = match config.trunk_override_for(candidate.project) {
            Some(branch) => Ok(branch),
            None => detect_trunk_branch(git, &candidate.name, &path, options),
        };
        match trunk {
            Ok(trunk_branch) => repos.push(RepositoryInfo {
                remote: config.remote_for(candidate.project),
                name: candidate.name,
                path,
                trunk_branch,
                shared_root_key: candidate.shared_root_key,
            }),
            Err(e) => failures.push(e.to_string()),
        }
    }
    if !failures.is_empty() {
        return Err(Error::Discovery { failures });
    }

    Ok(repos)
}

/// Auto-detect the trunk branch: exactly one of `main` / `master` must exist.
pub fn detect_trunk_branch(
    git: &dyn GitRunner,
    name: &str,
    path: &Path,
    options: RunOptions,
) -> Result<String> {
    let mut found = Vec::new();
    for candidate in TRUNK_CANDIDATES {
        if git::branch_exists(git, path, candidate, options)? {
            found.push(candidate);
        }
    }

    match found.as_slice() {
        [branch] => Ok(branch.to_string()),
        [] => Err(Error::TrunkBranch {
            repo: name.to_string(),
            message: "neither 'main' nor 'master' exists".to_string(),
            hint: Some(
                "set 'trunk_branch' for this project or 'git.trunk_branch' in kira.yml".to_string(),
            ),
        }),
        _ => Err(Error::TrunkBranch {
            repo: name.to_string(),
            message: "both 'main' and 'master' exist".to_string(),
            hint: Some("set 'trunk_branch' in kira.yml to pick one".to_string()),
        }),
    }
}
