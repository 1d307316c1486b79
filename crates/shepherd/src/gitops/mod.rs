//! Local repository operations.
//!
//! The reconciler drives git through the narrow [`RepoOps`] contract; the
//! production implementation ([`GitCli`]) shells out to the `git` binary.
//! Everything is a fallible synchronous call from the reconciler's point of
//! view, with a bounded wall-clock timeout per command.

mod git_cli;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use git_cli::GitCli;

/// Errors from local git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// The command exceeded its wall-clock budget and was aborted. Only the
    /// single command is cancelled, not the whole pass.
    #[error("`git {command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// The command ran and exited unsuccessfully.
    #[error("`git {command}` failed: {detail}")]
    CommandFailed { command: String, detail: String },

    /// The command could not be started or its I/O failed.
    #[error("failed to run `git {command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Command output did not have the expected shape.
    #[error("unable to parse git output: {line}")]
    Parse { line: String },
}

/// Result of a push attempt, threaded explicitly through the retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// All refs updated.
    Pushed,
    /// The remote refused the update (e.g. non-fast-forward); retrying
    /// after a fresh checkout may succeed.
    Rejected,
    /// The push failed outright; retrying is pointless.
    Failed { detail: String },
}

/// One submodule as declared in `.gitmodules`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmoduleEntry {
    /// Relative path of the submodule within the superproject tree.
    pub path: String,
    /// Configured remote URL.
    pub url: String,
}

/// One staged submodule-pointer change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeUpdate {
    /// Relative path of the gitlink entry.
    pub path: String,
    /// Commit hash the entry should point at.
    pub hash: String,
}

/// The git operations the reconciler and mirror depend on.
#[async_trait]
pub trait RepoOps: Send + Sync {
    /// `git clone --depth 1 -b <branch> <url> <dest>`. History is never
    /// used, so a shallow clone keeps setup fast.
    async fn clone_shallow(&self, url: &str, branch: &str, dest: &Path) -> Result<(), GitError>;

    /// Full-history clone of a single branch.
    async fn clone_full(&self, url: &str, branch: &str, dest: &Path) -> Result<(), GitError>;

    /// Bare mirror clone, used by the local mirror.
    async fn clone_mirror(&self, url: &str, dest: &Path) -> Result<(), GitError>;

    /// `git fetch -p <remote>`, retrying once after `git remote prune` when
    /// the fetch is rejected because of stale local refs.
    async fn fetch_prune(&self, dir: &Path, remote: &str) -> Result<(), GitError>;

    /// `git reset --hard <refname>`.
    async fn reset_hard(&self, dir: &Path, refname: &str) -> Result<(), GitError>;

    /// `git clean -d -f`.
    async fn clean(&self, dir: &Path) -> Result<(), GitError>;

    /// Configure the committer identity used for generated commits.
    async fn set_identity(&self, dir: &Path, name: &str, email: &str) -> Result<(), GitError>;

    /// Parse `.gitmodules`, returning declared name → (path, url).
    async fn read_submodule_config(
        &self,
        dir: &Path,
    ) -> Result<BTreeMap<String, SubmoduleEntry>, GitError>;

    /// Current gitlink hashes of the given paths at `refname`.
    async fn current_hashes(
        &self,
        dir: &Path,
        paths: &[String],
        refname: &str,
    ) -> Result<BTreeMap<String, String>, GitError>;

    /// Stage the given gitlink updates and commit them with `message`.
    async fn commit_tree_updates(
        &self,
        dir: &Path,
        updates: &[TreeUpdate],
        message: &str,
    ) -> Result<(), GitError>;

    /// Push the current branch once.
    async fn push(&self, dir: &Path) -> Result<PushOutcome, GitError>;
}
