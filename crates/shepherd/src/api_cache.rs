//! API cache operations for storing ETags and cached response bodies.
//!
//! This module provides functions for managing cached API responses,
//! enabling conditional requests that avoid refetching unchanged data. Each
//! entry is keyed by the full request URL and carries the validator (ETag),
//! the body a 304 response resolves to, and the pagination link to the next
//! page when the response was part of a listing.

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set, sea_query::OnConflict,
};
use thiserror::Error;
use uuid::Uuid;

use crate::entity::api_cache::{ActiveModel, Column, Entity as ApiCache, Model};

/// Errors that can occur during API cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Database error from sea-orm.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Get a cache entry by URL.
///
/// Returns `None` if no cache entry exists.
pub async fn get(db: &DatabaseConnection, url: &str) -> Result<Option<Model>> {
    let entry = ApiCache::find()
        .filter(Column::Url.eq(url))
        .one(db)
        .await?;

    Ok(entry)
}

/// Store or update a cache entry.
///
/// This performs an upsert - inserting a new entry or updating an existing
/// one. Only responses that carried a validator are stored, so `etag` and
/// `body` are required.
pub async fn upsert(
    db: &DatabaseConnection,
    url: &str,
    etag: &str,
    body: &str,
    next_url: Option<&str>,
) -> Result<()> {
    let now = Utc::now().fixed_offset();

    let model = ActiveModel {
        id: Set(Uuid::new_v4()),
        url: Set(url.to_string()),
        etag: Set(etag.to_string()),
        body: Set(body.to_string()),
        next_url: Set(next_url.map(String::from)),
        cached_at: Set(now),
    };

    ApiCache::insert(model)
        .on_conflict(
            OnConflict::column(Column::Url)
                .update_columns([Column::Etag, Column::Body, Column::NextUrl, Column::CachedAt])
                .to_owned(),
        )
        .exec(db)
        .await?;

    Ok(())
}

/// Delete a specific cache entry.
pub async fn delete(db: &DatabaseConnection, url: &str) -> Result<bool> {
    let result = ApiCache::delete_many()
        .filter(Column::Url.eq(url))
        .exec(db)
        .await?;

    Ok(result.rows_affected > 0)
}

/// Delete cache entries older than the specified cutoff time.
pub async fn delete_stale(db: &DatabaseConnection, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = ApiCache::delete_many()
        .filter(Column::CachedAt.lt(cutoff.fixed_offset()))
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_error_from_db_error() {
        // We can't easily construct a DbErr, but we can verify the From impl
        fn assert_from_impl<T: From<sea_orm::DbErr>>() {}
        assert_from_impl::<CacheError>();
    }

    #[cfg(feature = "migrate")]
    #[tokio::test]
    async fn upsert_then_get_roundtrips_and_overwrites() {
        let db = crate::db::connect_and_migrate("sqlite::memory:")
            .await
            .expect("migrated in-memory db");

        let url = "https://api.github.com/orgs/boostorg/events";
        assert!(get(&db, url).await.expect("get").is_none());

        upsert(&db, url, "W/\"abc\"", "[1]", Some("https://next"))
            .await
            .expect("insert");
        let entry = get(&db, url).await.expect("get").expect("entry exists");
        assert_eq!(entry.etag, "W/\"abc\"");
        assert_eq!(entry.body, "[1]");
        assert_eq!(entry.next_url.as_deref(), Some("https://next"));

        upsert(&db, url, "W/\"def\"", "[2]", None)
            .await
            .expect("update");
        let entry = get(&db, url).await.expect("get").expect("entry exists");
        assert_eq!(entry.etag, "W/\"def\"");
        assert_eq!(entry.body, "[2]");
        assert_eq!(entry.next_url, None);
    }

    #[cfg(feature = "migrate")]
    #[tokio::test]
    async fn delete_removes_entry() {
        let db = crate::db::connect_and_migrate("sqlite::memory:")
            .await
            .expect("migrated in-memory db");

        upsert(&db, "https://example.test/a", "\"x\"", "{}", None)
            .await
            .expect("insert");
        assert!(delete(&db, "https://example.test/a").await.expect("delete"));
        assert!(!delete(&db, "https://example.test/a").await.expect("delete"));
    }
}
