//! Shared test utilities for integration and E2E tests.
//!
//! The fixtures build real, throwaway git repositories with the system `git`
//! binary: a bare "upstream", a "seed" clone standing in for teammates who
//! push to trunk, and a "work" clone where `kira latest` runs.
//!
//! ## Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     if !git_available() {
//!         return;
//!     }
//!     let ws = GitWorkspace::new();
//!     ws.push_upstream("b.txt", "from a teammate\n", "teammate change");
//!     // ... run kira in ws.work()
//! }
//! ```

use std::path::{Path, PathBuf};
use std::process::Command;

use assert_fs::prelude::*;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use assert_cmd::cargo::cargo_bin_cmd;
    #[allow(unused_imports)]
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    #[allow(unused_imports)]
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::{
        git, git_available, git_status, init_repo, GitWorkspace, CONFLICT_BASE, WORK_ITEM,
    };
}

/// Work item committed into every seeded repository.
pub const WORK_ITEM: &str = "---\nid: 42\ntitle: Add login\n---\n\n# Add login\n";

/// Initial content of `a.txt`; tests edit its middle line to force conflicts.
pub const CONFLICT_BASE: &str = "line one\nline two\nline three\n";

/// Whether the system `git` binary is available.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Run git in `dir`, panicking on failure, and return its stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("LC_ALL", "C")
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("failed to spawn git");
    assert!(
        output.status.success(),
        "git {} failed in {}: {}",
        args.join(" "),
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Run git in `dir` and only report whether it succeeded.
#[allow(dead_code)]
pub fn git_status(dir: &Path, args: &[&str]) -> bool {
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("LC_ALL", "C")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Local identity and settings so commits and rebases never depend on the
/// machine's global configuration.
pub fn configure(dir: &Path) {
    git(dir, &["config", "user.name", "Kira Test"]);
    git(dir, &["config", "user.email", "kira@example.com"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
    git(dir, &["config", "rebase.autoStash", "false"]);
    git(dir, &["config", "advice.detachedHead", "false"]);
}

/// `git init` with `main` as the initial branch.
pub fn init_repo(dir: &Path) {
    std::fs::create_dir_all(dir).expect("failed to create repository directory");
    git(dir, &["init", "--quiet"]);
    git(dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    configure(dir);
}

/// One project: bare upstream, seed clone and work clone under a shared root.
pub struct GitWorkspace {
    temp: assert_fs::TempDir,
    name: String,
}

impl GitWorkspace {
    /// Create a project named `work` with a committed work item.
    pub fn new() -> Self {
        let temp = assert_fs::TempDir::new().expect("Failed to create temp directory");
        let ws = Self {
            temp,
            name: "work".to_string(),
        };
        ws.seed_project(&ws.name, true);
        ws
    }

    /// Add another project next to the first one, without a work item.
    #[allow(dead_code)]
    pub fn add_project(&self, name: &str) -> PathBuf {
        self.seed_project(name, false);
        self.temp.path().join(name)
    }

    fn seed_project(&self, name: &str, with_work_item: bool) {
        let root = self.temp.path();
        let upstream = root.join(format!("{}.git", name));
        let seed = root.join(format!("{}-seed", name));

        std::fs::create_dir_all(&upstream).expect("failed to create upstream");
        git(&upstream, &["init", "--quiet", "--bare"]);
        git(&upstream, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        init_repo(&seed);
        self.temp
            .child(format!("{}-seed/a.txt", name))
            .write_str(CONFLICT_BASE)
            .expect("Failed to write file");
        self.temp
            .child(format!("{}-seed/README.md", name))
            .write_str(&format!("# {}\n", name))
            .expect("Failed to write file");
        if with_work_item {
            self.temp
                .child(format!("{}-seed/.work/2_doing/042-add-login.md", name))
                .write_str(WORK_ITEM)
                .expect("Failed to write file");
        }
        git(&seed, &["add", "-A"]);
        git(&seed, &["commit", "--quiet", "-m", "initial commit"]);
        git(&seed, &["remote", "add", "origin", &upstream.to_string_lossy()]);
        git(&seed, &["push", "--quiet", "origin", "main"]);

        git(root, &["clone", "--quiet", &upstream.to_string_lossy(), name]);
        configure(&root.join(name));
    }

    /// Root of the temporary directory holding every repository.
    #[allow(dead_code)]
    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// The working clone `kira latest` runs in.
    pub fn work(&self) -> PathBuf {
        self.temp.path().join(&self.name)
    }

    /// Commit `content` to `file` on trunk from the seed clone and push it.
    pub fn push_upstream(&self, file: &str, content: &str, message: &str) {
        self.push_upstream_to(&self.name, file, content, message);
    }

    /// Like `push_upstream`, for another project.
    pub fn push_upstream_to(&self, project: &str, file: &str, content: &str, message: &str) {
        let seed = self.temp.path().join(format!("{}-seed", project));
        std::fs::write(seed.join(file), content).expect("Failed to write file");
        git(&seed, &["add", file]);
        git(&seed, &["commit", "--quiet", "-m", message]);
        git(&seed, &["push", "--quiet", "origin", "main"]);
    }

    /// Switch the work clone to a new feature branch.
    pub fn start_feature(&self, branch: &str) {
        git(&self.work(), &["checkout", "--quiet", "-b", branch]);
    }

    /// Commit `content` to `file` in the work clone.
    pub fn commit_local(&self, file: &str, content: &str, message: &str) {
        let work = self.work();
        std::fs::write(work.join(file), content).expect("Failed to write file");
        git(&work, &["add", file]);
        git(&work, &["commit", "--quiet", "-m", message]);
    }

    /// Write a file in the work clone without committing it.
    pub fn write(&self, file: &str, content: &str) {
        std::fs::write(self.work().join(file), content).expect("Failed to write file");
    }

    pub fn read(&self, file: &str) -> String {
        std::fs::read_to_string(self.work().join(file)).expect("Failed to read file")
    }

    /// Number of entries in the work clone's stash.
    pub fn stash_count(&self) -> usize {
        git(&self.work(), &["stash", "list"]).lines().count()
    }

    pub fn head(&self) -> String {
        git(&self.work(), &["rev-parse", "HEAD"]).trim().to_string()
    }

    /// Whether a rebase is stopped in the work clone.
    pub fn rebase_in_progress(&self) -> bool {
        let git_dir = self.work().join(".git");
        git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists()
    }

    /// Create a command configured to run in the work clone.
    #[allow(dead_code)]
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("kira");
        cmd.current_dir(self.work())
            .env_remove("KIRA_CONFIG")
            .env("NO_COLOR", "1");
        cmd
    }
}
