//! ApiCache entity - stores ETags, bodies and pagination links per URL.
//!
//! This enables conditional requests that avoid refetching unchanged data.
//! A row only exists for responses that carried a validator (ETag); the
//! cached body is what a later 304 response resolves to.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "api_cache")]
pub struct Model {
    /// Internal UUID primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Full request URL. Unique; the cache lookup key.
    pub url: String,

    /// The ETag value from the API response.
    #[sea_orm(column_type = "Text")]
    pub etag: String,

    /// Cached response body, reused on 304 Not Modified.
    #[sea_orm(column_type = "Text")]
    pub body: String,

    /// Absolute URL of the next page (from the Link header's rel="next"),
    /// if the response was part of a paginated listing.
    #[sea_orm(column_type = "Text", nullable)]
    pub next_url: Option<String>,

    /// When this cache entry was last updated.
    pub cached_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
