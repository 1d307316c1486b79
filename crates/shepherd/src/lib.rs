//! Shepherd - keeps a superproject's submodule pointers in sync.
//!
//! A superproject pins each of its submodules to a specific commit. Shepherd
//! watches the upstream organization's activity feed, records push events in
//! a durable local log, and replays them against the superproject tree as a
//! series of submodule-pointer commits. When the feed's bounded retention
//! window has been outrun (a "gap"), it falls back to asking every submodule
//! remote for its current head and reconciling in a single catch-up commit.
//!
//! # Features
//!
//! - `migrate` - Enables database migration support. When enabled, you can
//!   use [`connect_and_migrate`] to automatically run migrations on
//!   connection.
//!
//! # Example
//!
//! ```ignore
//! use shepherd::{connect_and_migrate, events::EventLog};
//!
//! let db = connect_and_migrate("sqlite://shepherd.db?mode=rwc").await?;
//! let log = EventLog::new(db.clone());
//! let outcome = log.download(&upstream).await?;
//! println!("stored {} events (gap: {})", outcome.stored, outcome.gap);
//! ```

pub mod api_cache;
pub mod db;
pub mod entity;
pub mod events;
pub mod github;
pub mod gitops;
pub mod mirror;
pub mod reconcile;
pub mod retry;

#[cfg(feature = "migrate")]
pub mod migration;

pub use db::connect;
#[cfg(feature = "migrate")]
pub use db::connect_and_migrate;
pub use entity::prelude::*;
pub use events::{EventLog, EventQueue, IngestOutcome};
pub use github::{EventSource, GitHubClient, GitHubError, GitHubUpstream, RemoteRefs};
pub use gitops::{GitCli, GitError, PushOutcome, RepoOps};
pub use mirror::LocalMirror;
pub use reconcile::{PassContext, PassReport, ReconcileError, SuperProject};
