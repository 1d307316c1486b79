//! MirrorEntry entity - bookkeeping for the local bare-mirror clones.
//!
//! The reconciler only ever sets the dirty flag (keyed by URL); the mirror
//! fetcher consumes and clears it.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "mirror")]
pub struct Model {
    /// Internal UUID primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// URL path of the remote, e.g. `/boostorg/align.git`. Unique; doubles
    /// as the relative on-disk location under the mirror root.
    pub path: String,

    /// Clone URL of the remote.
    pub url: String,

    /// Whether the mirror needs a fetch on the next run.
    pub dirty: bool,

    /// Fetch ordering; lower values are fetched first.
    pub priority: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
