//! Initial migration to create the shepherd database schema.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_activity_event(manager).await?;
        self.create_ingest_state(manager).await?;
        self.create_queue_cursor(manager).await?;
        self.create_api_cache(manager).await?;
        self.create_mirror(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Mirror::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ApiCache::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(QueueCursor::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(IngestState::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ActivityEvent::Table).to_owned())
            .await?;
        Ok(())
    }
}

impl Migration {
    async fn create_activity_event(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ActivityEvent::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ActivityEvent::SourceId)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ActivityEvent::Kind).string().not_null())
                    .col(ColumnDef::new(ActivityEvent::Repo).string().not_null())
                    .col(ColumnDef::new(ActivityEvent::Branch).string().null())
                    .col(ColumnDef::new(ActivityEvent::BeforeHash).string().null())
                    .col(ColumnDef::new(ActivityEvent::AfterHash).string().null())
                    .col(ColumnDef::new(ActivityEvent::Payload).json().not_null())
                    .col(
                        ColumnDef::new(ActivityEvent::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ActivityEvent::IngestedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ActivityEvent::SequenceStart)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        // Cursor reads filter by kind over a source id range
        manager
            .create_index(
                Index::create()
                    .name("idx_activity_event_kind_source_id")
                    .table(ActivityEvent::Table)
                    .col(ActivityEvent::Kind)
                    .col(ActivityEvent::SourceId)
                    .to_owned(),
            )
            .await?;

        // Index on repo for per-repository inspection
        manager
            .create_index(
                Index::create()
                    .name("idx_activity_event_repo")
                    .table(ActivityEvent::Table)
                    .col(ActivityEvent::Repo)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_ingest_state(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(IngestState::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IngestState::Name)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(IngestState::StartId)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(IngestState::LastId)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_queue_cursor(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(QueueCursor::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(QueueCursor::Name)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(QueueCursor::KindFilter).string().null())
                    .col(
                        ColumnDef::new(QueueCursor::ReadPosition)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(QueueCursor::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_api_cache(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ApiCache::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ApiCache::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(ApiCache::Url).string().not_null())
                    .col(ColumnDef::new(ApiCache::Etag).text().not_null())
                    .col(ColumnDef::new(ApiCache::Body).text().not_null())
                    .col(ColumnDef::new(ApiCache::NextUrl).text().null())
                    .col(
                        ColumnDef::new(ApiCache::CachedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_api_cache_url")
                    .table(ApiCache::Table)
                    .col(ApiCache::Url)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_api_cache_cached_at")
                    .table(ApiCache::Table)
                    .col(ApiCache::CachedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_mirror(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Mirror::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Mirror::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Mirror::Path).string().not_null())
                    .col(ColumnDef::new(Mirror::Url).string().not_null())
                    .col(
                        ColumnDef::new(Mirror::Dirty)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Mirror::Priority)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_mirror_path")
                    .table(Mirror::Table)
                    .col(Mirror::Path)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Dirty rows are fetched ordered by (priority, path)
        manager
            .create_index(
                Index::create()
                    .name("idx_mirror_dirty_priority")
                    .table(Mirror::Table)
                    .col(Mirror::Dirty)
                    .col(Mirror::Priority)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
#[sea_orm(iden = "activity_event")]
enum ActivityEvent {
    Table,
    SourceId,
    Kind,
    Repo,
    Branch,
    BeforeHash,
    AfterHash,
    Payload,
    CreatedAt,
    IngestedAt,
    SequenceStart,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "ingest_state")]
enum IngestState {
    Table,
    Name,
    StartId,
    LastId,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "queue_cursor")]
enum QueueCursor {
    Table,
    Name,
    KindFilter,
    ReadPosition,
    UpdatedAt,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "api_cache")]
enum ApiCache {
    Table,
    Id,
    Url,
    Etag,
    Body,
    NextUrl,
    CachedAt,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "mirror")]
enum Mirror {
    Table,
    Id,
    Path,
    Url,
    Dirty,
    Priority,
}
