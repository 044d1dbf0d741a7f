//! # Work Items
//!
//! Work items are markdown files with YAML front matter, filed into status
//! folders under the work folder. The workflow tracks exactly one active item
//! at a time: the single file in the "doing" folder.
//!
//! Only the bits the update engine needs are read here: the item's `id` and
//! the optional `repos` list naming which workspace projects it touches.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde_yaml::{Mapping, Value};

use crate::config::Config;
use crate::error::{Error, Result};

/// The work item currently being worked on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub path: PathBuf,
    pub id: String,
    /// Projects declared in front matter; `None` means all projects.
    pub repos: Option<Vec<String>>,
}

const FRONT_MATTER_PATTERN: &str = r"(?s)\A\x{FEFF}?---[ \t]*\r?\n(.*?)\r?\n---[ \t]*(?:\r?\n|\z)";

/// Extract and parse the front matter block of a markdown document.
pub fn parse_front_matter(content: &str, path: &Path) -> Result<Mapping> {
    let captures = Regex::new(FRONT_MATTER_PATTERN)?
        .captures(content)
        .ok_or_else(|| Error::FrontMatter {
            path: path.to_path_buf(),
            message: "no front matter block delimited by '---' lines".to_string(),
        })?;

    let block = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    match serde_yaml::from_str::<Value>(block) {
        Ok(Value::Mapping(mapping)) => Ok(mapping),
        Ok(Value::Null) => Ok(Mapping::new()),
        Ok(_) => Err(Error::FrontMatter {
            path: path.to_path_buf(),
            message: "front matter is not a key/value mapping".to_string(),
        }),
        Err(e) => Err(Error::FrontMatter {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
    }
}

/// Read a single front matter field of a work item file.
pub fn read_field(path: &Path, key: &str) -> Result<Option<Value>> {
    let content = std::fs::read_to_string(path)?;
    let mapping = parse_front_matter(&content, path)?;
    Ok(mapping.get(key).cloned())
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl WorkItem {
    /// Build a work item from its file contents.
    pub fn from_content(path: &Path, content: &str) -> Result<Self> {
        let mapping = parse_front_matter(content, path)?;

        let id = mapping
            .get("id")
            .and_then(scalar_to_string)
            .ok_or_else(|| Error::FrontMatter {
                path: path.to_path_buf(),
                message: "missing 'id' field".to_string(),
            })?;

        let repos = match mapping.get("repos") {
            None | Some(Value::Null) => None,
            Some(Value::Sequence(items)) => Some(
                items
                    .iter()
                    .map(|item| {
                        scalar_to_string(item).ok_or_else(|| Error::FrontMatter {
                            path: path.to_path_buf(),
                            message: "'repos' entries must be project names".to_string(),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            Some(_) => {
                return Err(Error::FrontMatter {
                    path: path.to_path_buf(),
                    message: "'repos' must be a list of project names".to_string(),
                })
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            id,
            repos,
        })
    }

    /// Locate the single work item in the configured doing folder.
    pub fn find_current(config: &Config, config_dir: &Path) -> Result<Self> {
        let doing = config.doing_dir(config_dir);
        let pattern = format!("{}/*.md", glob::Pattern::escape(&doing.to_string_lossy()));

        let mut items: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(Error::Glob)?
            .filter_map(|entry| match entry {
                Ok(path) if path.is_file() => Some(path),
                Ok(_) => None,
                Err(e) => {
                    log::warn!("skipping unreadable work item entry: {}", e);
                    None
                }
            })
            .collect();
        items.sort();

        match items.len() {
            0 => Err(Error::WorkItem {
                message: format!("no work item found in {}", doing.display()),
                hint: Some(format!(
                    "move the item you are working on into '{}' first",
                    config.work.status_folders.doing
                )),
            }),
            1 => {
                let path = &items[0];
                let content = std::fs::read_to_string(path)?;
                Self::from_content(path, &content)
            }
            _ => Err(Error::WorkItem {
                message: format!(
                    "{} work items found in {}, expected exactly one: {}",
                    items.len(),
                    doing.display(),
                    items
                        .iter()
                        .filter_map(|p| p.file_name())
                        .map(|n| n.to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                hint: Some("only one work item may be in progress at a time".to_string()),
            }),
        }
    }
}
