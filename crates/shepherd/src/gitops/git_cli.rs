//! `RepoOps` implementation that shells out to the `git` binary.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{GitError, PushOutcome, RepoOps, SubmoduleEntry, TreeUpdate};

/// Default wall-clock budget per git command. Mirror clones of large
/// repositories are the slowest operation this has to accommodate.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(240);

/// Runs git commands as child processes, each under a wall-clock timeout.
#[derive(Debug, Clone)]
pub struct GitCli {
    binary: PathBuf,
    timeout: Duration,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("git"),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Use a specific git binary instead of whatever `$PATH` resolves.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Override the per-command timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run a git command to completion, feeding `input` to stdin when given.
    /// Returns the raw output without checking the exit status.
    async fn run(
        &self,
        dir: Option<&Path>,
        args: &[&str],
        input: Option<&str>,
    ) -> Result<std::process::Output, GitError> {
        let rendered = args.join(" ");

        let mut command = Command::new(&self.binary);
        if let Some(dir) = dir {
            command.current_dir(dir);
        }
        command
            .args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let run = async {
            let mut child = command.spawn().map_err(|source| GitError::Io {
                command: rendered.clone(),
                source,
            })?;

            if let Some(input) = input {
                let mut stdin = child.stdin.take().ok_or_else(|| GitError::Io {
                    command: rendered.clone(),
                    source: std::io::Error::other("child stdin unavailable"),
                })?;
                stdin
                    .write_all(input.as_bytes())
                    .await
                    .map_err(|source| GitError::Io {
                        command: rendered.clone(),
                        source,
                    })?;
                // Closing stdin lets git see EOF.
                drop(stdin);
            }

            child
                .wait_with_output()
                .await
                .map_err(|source| GitError::Io {
                    command: rendered.clone(),
                    source,
                })
        };

        match tokio::time::timeout(self.timeout, run).await {
            Ok(result) => result,
            Err(_) => Err(GitError::Timeout {
                command: rendered,
                timeout: self.timeout,
            }),
        }
    }

    /// Run a git command and fail with captured detail unless it exits zero.
    async fn run_checked(
        &self,
        dir: Option<&Path>,
        args: &[&str],
        input: Option<&str>,
    ) -> Result<std::process::Output, GitError> {
        let output = self.run(dir, args, input).await?;
        if output.status.success() {
            return Ok(output);
        }

        Err(command_failed(&args.join(" "), &output))
    }
}

/// Whatever detail a failed command left behind: stderr first, stdout as a
/// fallback, the exit status otherwise.
fn failure_detail(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_owned();

    if !stderr.is_empty() {
        stderr
    } else if !stdout.is_empty() {
        stdout
    } else {
        format!("exit status {}", output.status)
    }
}

fn command_failed(command: &str, output: &std::process::Output) -> GitError {
    GitError::CommandFailed {
        command: command.to_string(),
        detail: failure_detail(output),
    }
}

/// Parse `git config -f .gitmodules --list` output into declared name →
/// (path, url).
fn parse_submodule_config(text: &str) -> Result<BTreeMap<String, SubmoduleEntry>, GitError> {
    let mut paths: BTreeMap<String, String> = BTreeMap::new();
    let mut urls: BTreeMap<String, String> = BTreeMap::new();

    for line in text.lines() {
        if line.is_empty() {
            continue;
        }

        let parsed = line
            .strip_prefix("submodule.")
            .and_then(|rest| rest.split_once('='))
            .and_then(|(key_part, value)| {
                key_part
                    .rsplit_once('.')
                    .map(|(name, key)| (name, key, value))
            });

        let Some((name, key, value)) = parsed else {
            return Err(GitError::Parse {
                line: line.to_string(),
            });
        };

        match key {
            "path" => {
                paths.insert(name.to_string(), value.to_string());
            }
            "url" => {
                urls.insert(name.to_string(), value.to_string());
            }
            _ => {}
        }
    }

    let mut entries = BTreeMap::new();
    for (name, path) in paths {
        if let Some(url) = urls.get(&name) {
            entries.insert(
                name,
                SubmoduleEntry {
                    path,
                    url: url.clone(),
                },
            );
        }
    }

    Ok(entries)
}

/// Parse `git ls-tree` output, keeping only gitlink (160000) entries for the
/// requested paths.
fn parse_ls_tree(text: &str, paths: &[String]) -> Result<BTreeMap<String, String>, GitError> {
    let mut hashes = BTreeMap::new();

    for line in text.lines() {
        if line.is_empty() {
            continue;
        }

        let parsed = line.split_once('\t').and_then(|(meta, path)| {
            let mut fields = meta.split_whitespace();
            match (fields.next(), fields.next(), fields.next()) {
                (Some("160000"), Some("commit"), Some(hash)) => Some((path, hash)),
                _ => None,
            }
        });

        let Some((path, hash)) = parsed else {
            return Err(GitError::Parse {
                line: line.to_string(),
            });
        };

        if !paths.iter().any(|p| p == path) {
            return Err(GitError::Parse {
                line: format!("unexpected path `{path}`"),
            });
        }

        hashes.insert(path.to_string(), hash.to_string());
    }

    Ok(hashes)
}

#[async_trait]
impl RepoOps for GitCli {
    async fn clone_shallow(&self, url: &str, branch: &str, dest: &Path) -> Result<(), GitError> {
        let dest = dest.to_string_lossy();
        self.run_checked(
            None,
            &["clone", "-q", "--depth", "1", "-b", branch, url, &dest],
            None,
        )
        .await?;
        Ok(())
    }

    async fn clone_full(&self, url: &str, branch: &str, dest: &Path) -> Result<(), GitError> {
        let dest = dest.to_string_lossy();
        self.run_checked(None, &["clone", "-q", "-b", branch, url, &dest], None)
            .await?;
        Ok(())
    }

    async fn clone_mirror(&self, url: &str, dest: &Path) -> Result<(), GitError> {
        let dest = dest.to_string_lossy();
        self.run_checked(None, &["clone", "--mirror", "--quiet", url, &dest], None)
            .await?;
        Ok(())
    }

    async fn fetch_prune(&self, dir: &Path, remote: &str) -> Result<(), GitError> {
        match self
            .run_checked(Some(dir), &["fetch", "-p", "--quiet", remote], None)
            .await
        {
            Ok(_) => Ok(()),
            // Old git versions can refuse the fetch when local refs have
            // gone stale; pruning explicitly and retrying once clears it.
            Err(GitError::CommandFailed { detail, .. })
                if detail.contains("some local refs could not be updated") =>
            {
                tracing::warn!(remote, "git fetch failed, pruning and retrying");
                self.run_checked(Some(dir), &["remote", "prune", remote], None)
                    .await?;
                self.run_checked(Some(dir), &["fetch", "-p", "--quiet", remote], None)
                    .await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn reset_hard(&self, dir: &Path, refname: &str) -> Result<(), GitError> {
        self.run_checked(Some(dir), &["reset", "-q", "--hard", refname], None)
            .await?;
        Ok(())
    }

    async fn clean(&self, dir: &Path) -> Result<(), GitError> {
        self.run_checked(Some(dir), &["clean", "-d", "-f"], None)
            .await?;
        Ok(())
    }

    async fn set_identity(&self, dir: &Path, name: &str, email: &str) -> Result<(), GitError> {
        self.run_checked(Some(dir), &["config", "user.name", name], None)
            .await?;
        self.run_checked(Some(dir), &["config", "user.email", email], None)
            .await?;
        Ok(())
    }

    async fn read_submodule_config(
        &self,
        dir: &Path,
    ) -> Result<BTreeMap<String, SubmoduleEntry>, GitError> {
        let output = self
            .run_checked(Some(dir), &["config", "-f", ".gitmodules", "--list"], None)
            .await?;
        parse_submodule_config(&String::from_utf8_lossy(&output.stdout))
    }

    async fn current_hashes(
        &self,
        dir: &Path,
        paths: &[String],
        refname: &str,
    ) -> Result<BTreeMap<String, String>, GitError> {
        if paths.is_empty() {
            return Ok(BTreeMap::new());
        }

        let mut args = vec!["ls-tree", refname, "--"];
        args.extend(paths.iter().map(String::as_str));

        let output = self.run_checked(Some(dir), &args, None).await?;
        parse_ls_tree(&String::from_utf8_lossy(&output.stdout), paths)
    }

    async fn commit_tree_updates(
        &self,
        dir: &Path,
        updates: &[TreeUpdate],
        message: &str,
    ) -> Result<(), GitError> {
        let mut index_info = String::new();
        for update in updates {
            index_info.push_str(&format!("160000 {}\t{}\n", update.hash, update.path));
        }

        self.run_checked(
            Some(dir),
            &["update-index", "--index-info"],
            Some(&index_info),
        )
        .await?;
        self.run_checked(Some(dir), &["commit", "-q", "-F", "-"], Some(message))
            .await?;
        Ok(())
    }

    async fn push(&self, dir: &Path) -> Result<PushOutcome, GitError> {
        let output = self
            .run(Some(dir), &["push", "-q", "--porcelain"], None)
            .await?;

        match output.status.code() {
            Some(0) => Ok(PushOutcome::Pushed),
            Some(1) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
                tracing::warn!(detail = %stderr, "push rejected");
                Ok(PushOutcome::Rejected)
            }
            _ => Ok(PushOutcome::Failed {
                detail: failure_detail(&output),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_submodule_config() {
        let text = "submodule.libs/align.path=libs/align\n\
                    submodule.libs/align.url=../align.git\n\
                    submodule.tools/build.path=tools/build\n\
                    submodule.tools/build.url=https://github.com/boostorg/build.git\n\
                    submodule.tools/build.branch=develop\n";

        let entries = parse_submodule_config(text).expect("parse");
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries["libs/align"],
            SubmoduleEntry {
                path: "libs/align".to_string(),
                url: "../align.git".to_string(),
            }
        );
        assert_eq!(entries["tools/build"].path, "tools/build");
    }

    #[test]
    fn test_parse_submodule_config_skips_incomplete_entries() {
        let text = "submodule.libs/align.path=libs/align\n";
        let entries = parse_submodule_config(text).expect("parse");
        assert!(entries.is_empty());
    }

    #[test]
    fn test_parse_submodule_config_rejects_garbage() {
        let err = parse_submodule_config("not a submodule line").expect_err("parse should fail");
        assert!(matches!(err, GitError::Parse { .. }));
    }

    #[test]
    fn test_parse_ls_tree() {
        let paths = vec!["libs/align".to_string(), "libs/core".to_string()];
        let text = "160000 commit 59c6a5d3af83f5d37d1d132335da44f9bbde0a87\tlibs/align\n\
                    160000 commit 217a9bca5ab1a9d0daf1a30e5a2c3bb17321f52a\tlibs/core\n";

        let hashes = parse_ls_tree(text, &paths).expect("parse");
        assert_eq!(
            hashes["libs/align"],
            "59c6a5d3af83f5d37d1d132335da44f9bbde0a87"
        );
        assert_eq!(
            hashes["libs/core"],
            "217a9bca5ab1a9d0daf1a30e5a2c3bb17321f52a"
        );
    }

    #[test]
    fn test_parse_ls_tree_rejects_non_gitlink_entries() {
        let paths = vec!["README.md".to_string()];
        let text = "100644 blob 2a4ff9efb69ab3c3e5d8bc6c1e9e0e7e68c5e7e3\tREADME.md\n";
        let err = parse_ls_tree(text, &paths).expect_err("blob entry should fail");
        assert!(matches!(err, GitError::Parse { .. }));
    }

    #[test]
    fn test_parse_ls_tree_rejects_unrequested_path() {
        let paths = vec!["libs/align".to_string()];
        let text = "160000 commit 59c6a5d3af83f5d37d1d132335da44f9bbde0a87\tlibs/other\n";
        let err = parse_ls_tree(text, &paths).expect_err("unexpected path should fail");
        assert!(err.to_string().contains("libs/other"));
    }

    #[test]
    fn test_parse_ls_tree_empty_output() {
        let hashes = parse_ls_tree("", &["libs/align".to_string()]).expect("parse");
        assert!(hashes.is_empty());
    }

    #[test]
    fn test_command_failed_prefers_stderr() {
        use std::os::unix::process::ExitStatusExt;

        let output = std::process::Output {
            status: std::process::ExitStatus::from_raw(256),
            stdout: b"out\n".to_vec(),
            stderr: b"err\n".to_vec(),
        };

        let err = command_failed("status", &output);
        let GitError::CommandFailed { detail, .. } = err else {
            panic!("expected CommandFailed");
        };
        assert_eq!(detail, "err");
    }
}
