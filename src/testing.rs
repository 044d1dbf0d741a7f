//! Scripted `GitRunner` used by unit tests.
//!
//! Responses are keyed by an argument prefix (and optionally a directory);
//! the longest matching prefix wins. Several responses queued for one key
//! are handed out in order, the last one repeating. Anything unscripted
//! succeeds with empty output.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::git::{GitOutput, GitRunner, RunOptions};

#[derive(Debug, Clone)]
enum Response {
    Output(GitOutput),
    Error(String),
}

#[derive(Debug)]
struct Rule {
    dir: Option<PathBuf>,
    prefix: String,
    responses: VecDeque<Response>,
}

#[derive(Debug, Default)]
pub(crate) struct ScriptedGit {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<(PathBuf, String, RunOptions)>>,
}

impl ScriptedGit {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn push(&self, dir: Option<&Path>, prefix: &str, response: Response) {
        let mut rules = self.rules.lock().unwrap();
        let dir = dir.map(Path::to_path_buf);
        if let Some(rule) = rules
            .iter_mut()
            .find(|r| r.dir == dir && r.prefix == prefix)
        {
            rule.responses.push_back(response);
        } else {
            rules.push(Rule {
                dir,
                prefix: prefix.to_string(),
                responses: VecDeque::from([response]),
            });
        }
    }

    /// Script a response for any repository.
    pub(crate) fn on(&self, prefix: &str, output: GitOutput) -> &Self {
        self.push(None, prefix, Response::Output(output));
        self
    }

    /// Script a response for one repository only.
    pub(crate) fn on_in(&self, dir: &Path, prefix: &str, output: GitOutput) -> &Self {
        self.push(Some(dir), prefix, Response::Output(output));
        self
    }

    /// Make matching invocations fail to run (spawn failure or timeout).
    pub(crate) fn on_error(&self, prefix: &str, message: &str) -> &Self {
        self.push(None, prefix, Response::Error(message.to_string()));
        self
    }

    /// Every invocation as `"<args>"`, in call order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, args, _)| args.clone())
            .collect()
    }

    /// Invocations made inside `dir`.
    pub(crate) fn calls_in(&self, dir: &Path) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, _, _)| d == dir)
            .map(|(_, args, _)| args.clone())
            .collect()
    }

    /// Options used for the first invocation starting with `prefix`.
    pub(crate) fn options_for(&self, prefix: &str) -> Option<RunOptions> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|(_, args, _)| args.starts_with(prefix))
            .map(|(_, _, options)| *options)
    }

    pub(crate) fn called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|args| args.starts_with(prefix))
    }
}

impl GitRunner for ScriptedGit {
    fn run(&self, dir: &Path, args: &[&str], options: RunOptions) -> Result<GitOutput> {
        let joined = args.join(" ");
        self.calls
            .lock()
            .unwrap()
            .push((dir.to_path_buf(), joined.clone(), options));

        let mut rules = self.rules.lock().unwrap();
        let best = rules
            .iter_mut()
            .filter(|rule| rule.dir.as_deref().is_none_or(|d| d == dir))
            .filter(|rule| joined.starts_with(&rule.prefix))
            .max_by_key(|rule| (rule.prefix.len(), rule.dir.is_some()));

        let response = match best {
            Some(rule) if rule.responses.len() > 1 => rule.responses.pop_front(),
            Some(rule) => rule.responses.front().cloned(),
            None => None,
        };

        match response {
            Some(Response::Output(output)) => Ok(output),
            Some(Response::Error(message)) => Err(Error::GitCommand {
                command: joined,
                path: dir.to_path_buf(),
                stderr: message,
            }),
            None => Ok(GitOutput::ok("")),
        }
    }
}
