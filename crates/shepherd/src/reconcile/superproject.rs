//! The per-superproject reconciliation pass.
//!
//! A pass works one superproject/branch pair at a time, against its own
//! working tree and its own event-queue cursor, so independent pairs can run
//! side by side without coordination.
//!
//! The normal path replays queued push events in upstream order, committing
//! and pushing each applicable one so the superproject history mirrors the
//! upstream sequence. When the cursor has lost continuity with the event
//! log (the feed's retention window was outrun), the pass instead asks every
//! submodule remote for its head and reconciles everything in one catch-up
//! commit, retried through a bounded checkout-rebuild cycle if the push is
//! rejected.

use std::collections::BTreeMap;
use std::path::PathBuf;

use sea_orm::DatabaseConnection;

use super::message::{short_name, update_message};
use super::submodule::{EventAction, Submodule, remote_identifier};
use super::{ReconcileError, Result};
use crate::entity::activity_event::EventKind;
use crate::events::{EventLog, EventQueue};
use crate::github::{EventSource, GitHubError, RemoteRefs};
use crate::gitops::{PushOutcome, RepoOps, TreeUpdate};
use crate::mirror::LocalMirror;

/// How many times the checkout-rebuild-push cycle runs before the pass is
/// declared failed. Rejections past the first retry mean something else is
/// pushing to the same branch.
pub const PUSH_ATTEMPTS: usize = 2;

const DEFAULT_COMMIT_NAME: &str = "Automated Commit";
const DEFAULT_COMMIT_EMAIL: &str = "shepherd@localhost";

/// Collaborators a reconciliation pass works against.
pub struct PassContext<'a> {
    /// Local git operations.
    pub ops: &'a dyn RepoOps,
    /// Authoritative branch-head lookups.
    pub refs: &'a dyn RemoteRefs,
    /// Live feed of upstream activity events.
    pub source: &'a dyn EventSource,
    /// Database holding the event log and cursors.
    pub db: &'a DatabaseConnection,
    /// Mirror bookkeeping; the pass only ever marks entries dirty.
    pub mirror: &'a LocalMirror,
}

/// What a pass did, for operator reporting.
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    /// Whether the pass fell back to a full resynchronization.
    pub full_resync: bool,
    /// Commits created.
    pub commits: usize,
    /// Commits successfully pushed.
    pub pushed: usize,
    /// Submodules that accumulated ignored events this pass.
    pub ignored_submodules: usize,
    /// Set when changes were committed but pushing is disabled.
    pub push_warning: bool,
}

/// One tracked superproject/branch pair.
#[derive(Debug, Clone)]
pub struct SuperProject {
    /// Repository identifier of the superproject, e.g. `boostorg/boost`.
    pub module: String,
    /// Superproject branch commits go to.
    pub branch: String,
    /// Submodule branch whose pushes are tracked.
    pub submodule_branch: String,
    /// Local working tree.
    pub path: PathBuf,
    /// Clone/push URL.
    pub url: String,
    /// Organization the submodule URLs resolve against.
    pub remote_org: String,
    /// Whether commits are pushed. When disabled, reconciliation still runs
    /// and the result is kept locally with a warning.
    pub enable_push: bool,
    /// Committer identity for generated commits.
    pub commit_name: String,
    pub commit_email: String,
}

impl SuperProject {
    pub fn new(
        module: impl Into<String>,
        branch: impl Into<String>,
        submodule_branch: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        let module = module.into();
        let remote_org = module
            .split_once('/')
            .map(|(org, _)| org.to_string())
            .unwrap_or_else(|| module.clone());
        let url = format!("git@github.com:{module}.git");

        Self {
            module,
            branch: branch.into(),
            submodule_branch: submodule_branch.into(),
            path: path.into(),
            url,
            remote_org,
            enable_push: false,
            commit_name: DEFAULT_COMMIT_NAME.to_string(),
            commit_email: DEFAULT_COMMIT_EMAIL.to_string(),
        }
    }

    /// Override the clone/push URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Enable or disable pushing.
    #[must_use]
    pub fn with_push(mut self, enable_push: bool) -> Self {
        self.enable_push = enable_push;
        self
    }

    /// Override the committer identity.
    #[must_use]
    pub fn with_committer(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.commit_name = name.into();
        self.commit_email = email.into();
        self
    }

    /// Human-readable identifier for logs.
    pub fn module_branch_name(&self) -> String {
        format!("{}, branch {}", self.module, self.branch)
    }

    /// Run one reconciliation pass.
    ///
    /// With `all` set, every submodule remote is consulted even when the
    /// event queue is continuous, catching anything the feed missed.
    pub async fn update_from_events(&self, ctx: &PassContext<'_>, all: bool) -> Result<PassReport> {
        let log = EventLog::new(ctx.db.clone());
        let mut queue =
            EventQueue::open(&log, &self.submodule_branch, Some(EventKind::Push)).await?;
        let mut report = PassReport::default();

        if !queue.continued_from_last_run() {
            tracing::info!(
                module = %self.module_branch_name(),
                "full refresh of submodules because of gap in event queue"
            );
            report.full_resync = true;
            if self
                .push_updates_from_all(ctx, &mut queue, &mut report)
                .await?
            {
                queue.mark_all_read().await?;
            }
        } else if all {
            tracing::info!(
                module = %self.module_branch_name(),
                "refresh submodules from event queue, and sync all"
            );
            self.push_updates_from_queue(ctx, &mut queue, true, &mut report)
                .await?;
        } else {
            tracing::info!(
                module = %self.module_branch_name(),
                "refresh submodules from event queue"
            );
            self.push_updates_from_queue(ctx, &mut queue, false, &mut report)
                .await?;
        }

        if report.push_warning {
            tracing::warn!(
                module = %self.module_branch_name(),
                "changes not pushed, as configured not to"
            );
        }

        Ok(report)
    }

    /// Full-resync path: authoritative heads from every submodule remote,
    /// one combined commit, bounded push retries.
    ///
    /// Returns true when the queue should be considered fully consumed
    /// (successful push, or nothing to do).
    async fn push_updates_from_all(
        &self,
        ctx: &PassContext<'_>,
        queue: &mut EventQueue<'_>,
        report: &mut PassReport,
    ) -> Result<bool> {
        for attempt in 0..PUSH_ATTEMPTS {
            self.setup_clean_checkout(ctx.ops).await?;
            let mut submodules = self.load_submodules(ctx.ops).await?;
            self.pending_from_remote(ctx.refs, &mut submodules).await?;

            // Catch pushes that land while the remote scan is in flight.
            let resync_start = queue.read_position();
            queue.download_more_events(ctx.source).await?;
            for event in queue.events(Some(resync_start)).await? {
                if event.branch.as_deref() != Some(self.submodule_branch.as_str()) {
                    continue;
                }
                let Some(sub) = submodules.get_mut(&event.repo) else {
                    continue;
                };
                let (Some(before), Some(head)) = (event.before_hash, event.after_hash) else {
                    continue;
                };
                sub.observe_resync_push(&before, &head);
            }

            for sub in submodules.values_mut() {
                sub.promote_pending()?;
            }

            if !self.commit_hashes(ctx, &mut submodules, true).await? {
                // Nothing differed; trivially in sync.
                return Ok(true);
            }
            report.commits += 1;

            if !self.enable_push {
                report.push_warning = true;
                return Ok(false);
            }

            match ctx.ops.push(&self.path).await? {
                PushOutcome::Pushed => {
                    report.pushed += 1;
                    return Ok(true);
                }
                PushOutcome::Rejected => {
                    tracing::warn!(
                        attempt,
                        module = %self.module_branch_name(),
                        "push rejected, rebuilding checkout"
                    );
                }
                PushOutcome::Failed { detail } => {
                    return Err(ReconcileError::PushFailed { detail });
                }
            }
        }

        tracing::error!(module = %self.module_branch_name(), "failed to push");
        Err(ReconcileError::PushRetriesExhausted {
            module: self.module_branch_name(),
        })
    }

    /// Event-queue path. With `check_all`, remote heads are also consulted
    /// and any remaining forecast is committed as a catch-up at the end.
    async fn push_updates_from_queue(
        &self,
        ctx: &PassContext<'_>,
        queue: &mut EventQueue<'_>,
        check_all: bool,
        report: &mut PassReport,
    ) -> Result<()> {
        self.setup_clean_checkout(ctx.ops).await?;
        let mut submodules = self.load_submodules(ctx.ops).await?;

        if check_all {
            self.pending_from_remote(ctx.refs, &mut submodules).await?;
            queue.download_more_events(ctx.source).await?;
        }

        self.apply_queue_events(ctx, queue, &mut submodules, report)
            .await?;

        if check_all {
            for sub in submodules.values_mut() {
                sub.promote_pending()?;
            }

            if self.commit_hashes(ctx, &mut submodules, true).await? {
                report.commits += 1;
                if self.enable_push {
                    match ctx.ops.push(&self.path).await? {
                        PushOutcome::Pushed => report.pushed += 1,
                        PushOutcome::Rejected => {
                            return Err(ReconcileError::PushFailed {
                                detail: "push rejected".to_string(),
                            });
                        }
                        PushOutcome::Failed { detail } => {
                            return Err(ReconcileError::PushFailed { detail });
                        }
                    }
                } else {
                    report.push_warning = true;
                }
            }
        }

        Ok(())
    }

    /// Replay queued events in upstream order, committing and pushing each
    /// applicable push so it becomes its own superproject commit. The cursor
    /// only advances past an event once its commit has been pushed; a push
    /// failure stops the pass (fail-stop) so nothing is skipped.
    async fn apply_queue_events(
        &self,
        ctx: &PassContext<'_>,
        queue: &mut EventQueue<'_>,
        submodules: &mut BTreeMap<String, Submodule>,
        report: &mut PassReport,
    ) -> Result<()> {
        let mut push_failure: Option<ReconcileError> = None;

        'events: for event in queue.events(None).await? {
            if event.branch.as_deref() != Some(self.submodule_branch.as_str()) {
                continue;
            }
            let Some(sub) = submodules.get_mut(&event.repo) else {
                continue;
            };
            let (Some(before), Some(head)) = (event.before_hash, event.after_hash) else {
                continue;
            };

            let action = sub.observe_push(event.source_id, &before, &head);
            if action != EventAction::Apply {
                continue;
            }

            if !self.commit_hashes(ctx, submodules, false).await? {
                return Err(ReconcileError::Internal(
                    "staged submodule update produced no commit".to_string(),
                ));
            }
            report.commits += 1;

            if self.enable_push {
                match ctx.ops.push(&self.path).await? {
                    PushOutcome::Pushed => {
                        report.pushed += 1;
                        queue.mark_read_up_to(event.source_id).await?;
                    }
                    PushOutcome::Rejected => {
                        tracing::error!(
                            module = %self.module_branch_name(),
                            "error pushing to repo"
                        );
                        push_failure = Some(ReconcileError::PushFailed {
                            detail: "push rejected".to_string(),
                        });
                        break 'events;
                    }
                    PushOutcome::Failed { detail } => {
                        push_failure = Some(ReconcileError::PushFailed { detail });
                        break 'events;
                    }
                }
            } else {
                report.push_warning = true;
            }
        }

        // Ignored events are reported once per submodule per pass, even
        // when the pass is about to fail on a push.
        for sub in submodules.values() {
            if sub.ignored_events.is_empty() {
                continue;
            }
            report.ignored_submodules += 1;
            tracing::warn!(
                submodule = %sub.declared_name,
                count = sub.ignored_events.len(),
                "ignored push events as the hash does not match the superproject's current value"
            );
        }

        match push_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Rebuild the submodule set from the working tree: `.gitmodules` for
    /// declarations, `ls-tree` for the recorded hashes. Submodules whose URL
    /// does not resolve to a known remote are excluded.
    async fn load_submodules(&self, ops: &dyn RepoOps) -> Result<BTreeMap<String, Submodule>> {
        let config = ops.read_submodule_config(&self.path).await?;

        let mut submodules: BTreeMap<String, Submodule> = BTreeMap::new();
        let mut remote_by_path: BTreeMap<String, String> = BTreeMap::new();
        let mut paths = Vec::new();

        for (name, entry) in config {
            let Some(remote) = remote_identifier(&entry.url, &self.remote_org) else {
                tracing::debug!(
                    submodule = %name,
                    url = %entry.url,
                    "url does not resolve to a known remote; skipping"
                );
                continue;
            };
            paths.push(entry.path.clone());
            remote_by_path.insert(entry.path.clone(), remote.clone());
            submodules.insert(remote.clone(), Submodule::new(name, entry.path, remote));
        }

        for (path, hash) in ops.current_hashes(&self.path, &paths, "HEAD").await? {
            if let Some(remote) = remote_by_path.get(&path)
                && let Some(sub) = submodules.get_mut(remote)
            {
                sub.current_hash = Some(hash);
            }
        }

        Ok(submodules)
    }

    /// Ask every submodule remote for its authoritative head, forecasting an
    /// update wherever it differs from the recorded hash. A missing branch
    /// makes that submodule unreachable this pass, nothing more.
    async fn pending_from_remote(
        &self,
        refs: &dyn RemoteRefs,
        submodules: &mut BTreeMap<String, Submodule>,
    ) -> Result<()> {
        for sub in submodules.values_mut() {
            match refs.branch_head(&sub.remote, &self.submodule_branch).await {
                Ok(head) => {
                    if sub.current_hash.as_deref() != Some(head.as_str()) {
                        sub.pending_hash = Some(head);
                    }
                }
                Err(GitHubError::NotFound { .. }) => {
                    tracing::error!(
                        repo = %sub.remote,
                        branch = %self.submodule_branch,
                        "unable to find branch"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// Commit every staged submodule update as a single tree update.
    ///
    /// Returns false when nothing was staged. On success each submodule's
    /// recorded hash becomes its staged value and the staged slot is
    /// cleared. With `mark_mirror_dirty`, the mirror is told to fetch the
    /// updated repositories - relevant when the update may have come from a
    /// remote scan the event queue never saw.
    async fn commit_hashes(
        &self,
        ctx: &PassContext<'_>,
        submodules: &mut BTreeMap<String, Submodule>,
        mark_mirror_dirty: bool,
    ) -> Result<bool> {
        let mut updates = Vec::new();
        let mut names = Vec::new();
        let mut dirty_urls = Vec::new();

        for sub in submodules.values_mut() {
            let Some(updated) = sub.updated_hash.take() else {
                continue;
            };
            if sub.current_hash.as_deref() == Some(updated.as_str()) {
                continue;
            }

            updates.push(TreeUpdate {
                path: sub.path.clone(),
                hash: updated.clone(),
            });
            names.push(short_name(&sub.declared_name).to_string());
            dirty_urls.push(format!("https://github.com/{}.git", sub.remote));
            sub.current_hash = Some(updated);
        }

        if updates.is_empty() {
            return Ok(false);
        }

        let message = update_message(&names, &self.submodule_branch);
        let subject = message.lines().next().unwrap_or(&message);
        tracing::info!(branch = %self.branch, "commit: {subject}");

        ctx.ops
            .commit_tree_updates(&self.path, &updates, &message)
            .await?;

        if mark_mirror_dirty {
            for url in &dirty_urls {
                tracing::info!(%url, "schedule mirror fetch");
                ctx.mirror.mark_dirty(url).await.map_err(|e| {
                    ReconcileError::Internal(format!("failed to mark mirror dirty: {e}"))
                })?;
            }
        }

        Ok(true)
    }

    /// Clone the working tree if absent, otherwise fetch and hard-reset it
    /// to the remote branch.
    async fn setup_clean_checkout(&self, ops: &dyn RepoOps) -> Result<()> {
        if !self.path.is_dir() {
            tracing::info!("clone {}", self.module_branch_name());
            ops.clone_shallow(&self.url, &self.branch, &self.path)
                .await?;
        } else {
            tracing::info!("fetch {}", self.module_branch_name());
            ops.fetch_prune(&self.path, "origin").await?;
            ops.reset_hard(&self.path, &format!("origin/{}", self.branch))
                .await?;
            ops.clean(&self.path).await?;
        }

        ops.set_identity(&self.path, &self.commit_name, &self.commit_email)
            .await?;
        Ok(())
    }
}
