//! Maintains local bare mirrors of the organization's repositories.
//!
//! Mirrors are refreshed opportunistically: the event queue marks updated
//! repositories dirty, and a later fetch run works through the dirty rows in
//! priority order. The reconciler also marks repositories dirty after
//! catch-up commits, since those updates may never have appeared in the
//! event feed.

use std::path::PathBuf;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::entity::mirror_entry::{self, Entity as MirrorEntry};
use crate::events::{EventError, EventLog, EventQueue};
use crate::github::{GitHubClient, GitHubError, OrgRepo};
use crate::gitops::{GitError, RepoOps};

/// Cursor name the mirror consumes the event log under.
const MIRROR_QUEUE: &str = "mirror";

/// Errors from mirror maintenance.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Database error from sea-orm.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// Event log or cursor failure.
    #[error(transparent)]
    Events(#[from] EventError),

    /// Upstream fetch failure while listing repositories.
    #[error(transparent)]
    Fetch(#[from] GitHubError),

    /// Local git failure.
    #[error(transparent)]
    Git(#[from] GitError),

    /// A clone URL that could not be keyed by its path.
    #[error("invalid mirror url: {url}")]
    InvalidUrl { url: String },
}

/// Result type for mirror operations.
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Handle to the mirror store and its on-disk root.
#[derive(Clone)]
pub struct LocalMirror {
    root: PathBuf,
    db: DatabaseConnection,
}

impl LocalMirror {
    pub fn new(root: impl Into<PathBuf>, db: DatabaseConnection) -> Self {
        Self {
            root: root.into(),
            db,
        }
    }

    /// Where mirrors live on disk.
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Mark the repository at `url` as needing a fetch. This is the only
    /// write the reconciler performs against mirror state.
    pub async fn mark_dirty(&self, url: &str) -> Result<()> {
        self.update(url, true).await
    }

    /// Upsert a mirror entry keyed by the URL path. An existing dirty flag
    /// is never cleared here, only raised.
    pub async fn update(&self, url: &str, dirty: bool) -> Result<()> {
        let path = Url::parse(url)
            .map(|u| u.path().to_string())
            .map_err(|_| MirrorError::InvalidUrl {
                url: url.to_string(),
            })?;

        let existing = MirrorEntry::find()
            .filter(mirror_entry::Column::Path.eq(path.as_str()))
            .one(&self.db)
            .await?;

        match existing {
            Some(entry) => {
                let mut update = entry.clone().into_active_model();
                if dirty && !entry.dirty {
                    update.dirty = Set(true);
                }
                // The row may predate knowing the URL (e.g. created to set
                // a priority), so always record it.
                update.url = Set(url.to_string());
                update.update(&self.db).await?;
            }
            None => {
                mirror_entry::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    path: Set(path),
                    url: Set(url.to_string()),
                    dirty: Set(dirty),
                    priority: Set(0),
                }
                .insert(&self.db)
                .await?;
            }
        }

        Ok(())
    }

    /// Refresh mirror bookkeeping from the event queue, falling back to a
    /// full repository listing when the queue has a gap.
    pub async fn refresh(&self, client: &GitHubClient, org: &str) -> Result<()> {
        let log = EventLog::new(self.db.clone());
        let mut queue = EventQueue::open(&log, MIRROR_QUEUE, None).await?;

        if !queue.continued_from_last_run() {
            tracing::info!("full refresh of mirrors because of gap in event queue");
            self.refresh_all(client, org).await?;
            queue.mark_all_read().await?;
        } else {
            self.refresh_from_queue(&mut queue).await?;
        }

        Ok(())
    }

    /// Mark every repository with queued activity as dirty.
    async fn refresh_from_queue(&self, queue: &mut EventQueue<'_>) -> Result<()> {
        let mut repos: Vec<String> = Vec::new();
        for event in queue.events(None).await? {
            if !repos.contains(&event.repo) {
                repos.push(event.repo.clone());
            }
            queue.mark_read_up_to(event.source_id).await?;
        }

        for repo in repos {
            self.update(&format!("https://github.com/{repo}.git"), true)
                .await?;
            tracing::info!(%repo, "updated repo");
        }

        Ok(())
    }

    /// Walk the full organization repository listing and mark everything
    /// dirty.
    pub async fn refresh_all(&self, client: &GitHubClient, org: &str) -> Result<()> {
        let route = format!("/orgs/{org}/repos");
        let mut pager = client.paginate::<OrgRepo>(&self.db, &route);

        while let Some(repo) = pager.try_next().await? {
            self.update(&repo.clone_url, true).await?;
        }

        Ok(())
    }

    /// Fetch every dirty mirror in (priority, path) order, clearing the
    /// flag per repository as each fetch lands. A failed fetch leaves its
    /// flag set and aborts the run.
    pub async fn fetch_dirty(&self, ops: &dyn RepoOps) -> Result<usize> {
        let dirty = MirrorEntry::find()
            .filter(mirror_entry::Column::Dirty.eq(true))
            .order_by_asc(mirror_entry::Column::Priority)
            .order_by_asc(mirror_entry::Column::Path)
            .all(&self.db)
            .await?;

        let mut fetched = 0;
        for entry in dirty {
            self.update_mirror(ops, &entry.path, &entry.url).await?;
            clear_dirty(&self.db, entry.id).await?;
            fetched += 1;
        }

        Ok(fetched)
    }

    /// Fetch one mirror, cloning it first if it does not exist yet.
    async fn update_mirror(&self, ops: &dyn RepoOps, path: &str, url: &str) -> Result<()> {
        let full_path = self.root.join(path.trim_start_matches('/'));

        if full_path.is_dir() {
            tracing::info!(%path, "fetch mirror");
            ops.fetch_prune(&full_path, "origin").await?;
        } else {
            tracing::info!(%path, "clone mirror");
            ops.clone_mirror(url, &full_path).await?;
        }

        Ok(())
    }

    /// Every known mirror entry, for inspection tooling.
    pub async fn entries(&self) -> Result<Vec<mirror_entry::Model>> {
        Ok(MirrorEntry::find()
            .order_by_asc(mirror_entry::Column::Priority)
            .order_by_asc(mirror_entry::Column::Path)
            .all(&self.db)
            .await?)
    }
}

/// Clear one entry's dirty flag in its own transaction, so an interrupted
/// run never loses the fetch obligation of rows it did not reach.
async fn clear_dirty(db: &DatabaseConnection, id: Uuid) -> std::result::Result<(), DbErr> {
    let txn = db.begin().await?;

    if let Some(entry) = MirrorEntry::find_by_id(id).one(&txn).await? {
        let mut update = entry.into_active_model();
        update.dirty = Set(false);
        update.update(&txn).await?;
    }

    txn.commit().await?;
    Ok(())
}
