//! Diesel-backed SQLite store.
//!
//! Uses diesel-async's SyncConnectionWrapper for async SQLite support.
//! Post configs are stored as validated JSON documents with lookup columns;
//! fingerprints are one row each so the union is a plain `INSERT OR IGNORE`.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel_async::{AsyncConnection, RunQueryDsl, SimpleAsyncConnection};
use tracing::debug;

use super::pool::{SqliteConn, SqlitePool};
use super::{validated, ConfigStore, FingerprintStore, MonitoringSink, StorageError};
use crate::models::{Fingerprint, PostConfig, SourceMonitoringEvent, ISO_DATE_FORMAT};
use crate::schema::{post_configs, post_fingerprints, source_monitoring};

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = post_configs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct PostConfigRecord {
    storage_key: String,
    #[allow(dead_code)]
    content_slug: Option<String>,
    #[allow(dead_code)]
    post_id: Option<i64>,
    document: String,
    #[allow(dead_code)]
    updated_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = post_configs)]
struct NewPostConfig<'a> {
    storage_key: &'a str,
    content_slug: Option<&'a str>,
    post_id: Option<i64>,
    document: &'a str,
    updated_at: &'a str,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = post_fingerprints)]
struct NewFingerprint<'a> {
    post_ref: &'a str,
    run_date: &'a str,
    target: &'a str,
    fingerprint: &'a str,
    created_at: &'a str,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = source_monitoring)]
struct NewMonitoringEvent<'a> {
    post_ref: &'a str,
    source_url: &'a str,
    extractor: &'a str,
    date: &'a str,
    items_found: i32,
    confidence: f32,
    success: bool,
    error: Option<&'a str>,
    recorded_at: &'a str,
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = source_monitoring)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct MonitoringRecord {
    post_ref: String,
    source_url: String,
    extractor: String,
    date: String,
    items_found: i32,
    confidence: f32,
    success: bool,
    error: Option<String>,
    recorded_at: String,
}

impl MonitoringRecord {
    fn into_event(self) -> Option<SourceMonitoringEvent> {
        Some(SourceMonitoringEvent {
            post_ref: self.post_ref,
            source_url: self.source_url,
            extractor: self.extractor,
            date: NaiveDate::parse_from_str(&self.date, ISO_DATE_FORMAT).ok()?,
            items_found: self.items_found.max(0) as usize,
            confidence: self.confidence,
            success: self.success,
            error: self.error,
            recorded_at: DateTime::parse_from_rfc3339(&self.recorded_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(DateTime::UNIX_EPOCH),
        })
    }
}

/// SQLite implementation of every store contract.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn from_path(path: &Path) -> Self {
        Self::new(SqlitePool::from_path(path))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables if missing.
    pub async fn init_schema(&self) -> Result<(), StorageError> {
        let mut conn = self.pool.get().await?;
        conn.batch_execute(include_str!("schema_sqlite.sql")).await?;
        debug!("Schema ready at {}", self.pool.database_url());
        Ok(())
    }

    fn decode(record: PostConfigRecord) -> Result<PostConfig, StorageError> {
        let config: PostConfig = serde_json::from_str(&record.document)?;
        config
            .validate()
            .map_err(|reason| StorageError::InvalidDocument {
                key: record.storage_key,
                reason,
            })?;
        Ok(config)
    }

    /// Most recent monitoring events, newest first.
    pub async fn recent_monitoring(
        &self,
        limit: i64,
    ) -> Result<Vec<SourceMonitoringEvent>, StorageError> {
        let mut conn = self.pool.get().await?;
        let records = source_monitoring::table
            .order(source_monitoring::id.desc())
            .limit(limit)
            .select(MonitoringRecord::as_select())
            .load::<MonitoringRecord>(&mut conn)
            .await?;
        Ok(records.into_iter().filter_map(MonitoringRecord::into_event).collect())
    }
}

/// Look a config row up by content slug, then by legacy numeric id.
async fn find_record(
    conn: &mut SqliteConn,
    post_ref: &str,
) -> Result<Option<PostConfigRecord>, StorageError> {
    let by_slug = post_configs::table
        .filter(post_configs::content_slug.eq(post_ref))
        .select(PostConfigRecord::as_select())
        .first::<PostConfigRecord>(conn)
        .await
        .optional()?;
    if by_slug.is_some() {
        return Ok(by_slug);
    }

    let Ok(legacy_id) = post_ref.parse::<i64>() else {
        return Ok(None);
    };
    let by_id = post_configs::table
        .filter(post_configs::post_id.eq(legacy_id))
        .order(post_configs::storage_key.asc())
        .select(PostConfigRecord::as_select())
        .first::<PostConfigRecord>(conn)
        .await
        .optional()?;
    Ok(by_id)
}

#[async_trait]
impl ConfigStore for SqliteStore {
    async fn get_config(&self, post_ref: &str) -> Result<Option<PostConfig>, StorageError> {
        let mut conn = self.pool.get().await?;
        find_record(&mut conn, post_ref)
            .await?
            .map(Self::decode)
            .transpose()
    }

    async fn save_config(&self, config: &PostConfig) -> Result<(), StorageError> {
        validated(config)?;
        let document = serde_json::to_string(config)?;
        let key = config.storage_key();
        // A legacy id-only row is superseded once the config gains a slug.
        let legacy_key = config
            .post_id
            .map(|id| id.to_string())
            .filter(|legacy| *legacy != key);
        let now = Utc::now().to_rfc3339();

        let mut conn = self.pool.get().await?;
        conn.transaction(|conn| {
            Box::pin(async move {
                if let Some(legacy_key) = &legacy_key {
                    diesel::delete(post_configs::table.find(legacy_key))
                        .execute(conn)
                        .await?;
                }
                diesel::replace_into(post_configs::table)
                    .values(&NewPostConfig {
                        storage_key: &key,
                        content_slug: config.content_slug.as_deref(),
                        post_id: config.post_id,
                        document: &document,
                        updated_at: &now,
                    })
                    .execute(conn)
                    .await?;
                Ok::<(), StorageError>(())
            })
        })
        .await
    }

    async fn list_configs(&self) -> Result<Vec<PostConfig>, StorageError> {
        let mut conn = self.pool.get().await?;
        let records = post_configs::table
            .order(post_configs::storage_key.asc())
            .select(PostConfigRecord::as_select())
            .load::<PostConfigRecord>(&mut conn)
            .await?;
        records.into_iter().map(Self::decode).collect()
    }

    async fn touch(&self, post_ref: &str, at: DateTime<Utc>) -> Result<(), StorageError> {
        let mut conn = self.pool.get().await?;
        let record = find_record(&mut conn, post_ref)
            .await?
            .ok_or_else(|| StorageError::NotFound(post_ref.to_string()))?;

        // Patch the stored document in place so edits saved since the lookup survive.
        let stamp = at.to_rfc3339_opts(SecondsFormat::AutoSi, true);
        let updated = diesel::sql_query(
            "UPDATE post_configs SET document = json_set(document, '$.last_updated', ?), \
             updated_at = ? WHERE storage_key = ?",
        )
        .bind::<Text, _>(stamp)
        .bind::<Text, _>(Utc::now().to_rfc3339())
        .bind::<Text, _>(record.storage_key)
        .execute(&mut conn)
        .await?;

        if updated == 0 {
            return Err(StorageError::NotFound(post_ref.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl FingerprintStore for SqliteStore {
    async fn get_known(
        &self,
        post_ref: &str,
        date: NaiveDate,
        target: &str,
    ) -> Result<HashSet<Fingerprint>, StorageError> {
        let mut conn = self.pool.get().await?;
        let date = date.format(ISO_DATE_FORMAT).to_string();
        let rows: Vec<String> = post_fingerprints::table
            .filter(post_fingerprints::post_ref.eq(post_ref))
            .filter(post_fingerprints::run_date.eq(&date))
            .filter(post_fingerprints::target.eq(target))
            .select(post_fingerprints::fingerprint)
            .load(&mut conn)
            .await?;
        Ok(rows.into_iter().map(Fingerprint::from_stored).collect())
    }

    async fn upsert(
        &self,
        post_ref: &str,
        date: NaiveDate,
        target: &str,
        fingerprints: &[Fingerprint],
    ) -> Result<usize, StorageError> {
        if fingerprints.is_empty() {
            return Ok(0);
        }
        let date = date.format(ISO_DATE_FORMAT).to_string();
        let now = Utc::now().to_rfc3339();
        let rows: Vec<NewFingerprint<'_>> = fingerprints
            .iter()
            .map(|fp| NewFingerprint {
                post_ref,
                run_date: &date,
                target,
                fingerprint: fp.as_str(),
                created_at: &now,
            })
            .collect();

        // SQLite has no multi-row insert in diesel; one statement per row, one transaction.
        let mut conn = self.pool.get().await?;
        conn.transaction(|conn| {
            Box::pin(async move {
                let mut inserted = 0;
                for row in &rows {
                    inserted += diesel::insert_or_ignore_into(post_fingerprints::table)
                        .values(row)
                        .execute(conn)
                        .await?;
                }
                Ok::<usize, StorageError>(inserted)
            })
        })
        .await
    }
}

#[async_trait]
impl MonitoringSink for SqliteStore {
    async fn record(&self, event: &SourceMonitoringEvent) -> Result<(), StorageError> {
        let date = event.date.format(ISO_DATE_FORMAT).to_string();
        let recorded_at = event.recorded_at.to_rfc3339();
        let mut conn = self.pool.get().await?;
        diesel::insert_into(source_monitoring::table)
            .values(&NewMonitoringEvent {
                post_ref: &event.post_ref,
                source_url: &event.source_url,
                extractor: &event.extractor,
                date: &date,
                items_found: i32::try_from(event.items_found).unwrap_or(i32::MAX),
                confidence: event.confidence,
                success: event.success,
                error: event.error.as_deref(),
                recorded_at: &recorded_at,
            })
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}
