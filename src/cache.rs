//! Last-good attendance data, persisted per (user, institution, session).
//!
//! Entries are never dropped for being old. Staleness only tells the caller to
//! refresh; a stale entry is still the fallback when the portal is unreachable.

use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::error::{Error, Result};
use crate::models::{
    CacheEntry, CacheKey, FeedItem, FeedPage, SubjectAttendance, SubjectRegister,
};

/// A payload that can be cached; `KIND` namespaces it within a key.
pub trait CachePayload: Serialize + DeserializeOwned + Send + Sync {
    const KIND: &'static str;
}

impl CachePayload for Vec<SubjectAttendance> {
    const KIND: &'static str = "attendance";
}

impl CachePayload for Vec<SubjectRegister> {
    const KIND: &'static str = "register";
}

impl CachePayload for FeedPage {
    const KIND: &'static str = "feed";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            ttl_minutes: default_ttl_minutes(),
        }
    }
}

fn default_url() -> String {
    "sqlite://attendance-cache.db".to_string()
}

fn default_ttl_minutes() -> i64 {
    30
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::minutes(self.ttl_minutes)
    }
}

#[derive(Debug, Clone)]
pub struct AttendanceCache {
    pool: SqlitePool,
    ttl: Duration,
}

fn db_err(context: &str) -> impl FnOnce(sqlx::Error) -> Error + '_ {
    move |e| Error::cache(context, e)
}

impl AttendanceCache {
    /// Open (or create) the cache database at `url` and apply migrations.
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(url)
            .map_err(db_err("parse cache url"))?
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(db_err("open cache database"))?;

        let cache = Self { pool, ttl };
        cache.init().await?;
        Ok(cache)
    }

    /// A private in-memory cache; lives as long as the returned value.
    pub async fn in_memory(ttl: Duration) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(db_err("parse cache url"))?;
        // One connection that never recycles, or the database goes with it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<StdDuration>)
            .max_lifetime(None::<StdDuration>)
            .connect_with(opts)
            .await
            .map_err(db_err("open in-memory cache"))?;

        let cache = Self { pool, ttl };
        cache.init().await?;
        Ok(cache)
    }

    pub async fn init(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::cache("migrate cache schema", e))?;
        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[tracing::instrument(level = "debug", skip_all, fields(key = %key, kind = T::KIND))]
    pub async fn get<T: CachePayload>(&self, key: &CacheKey) -> Result<Option<CacheEntry<T>>> {
        let row = sqlx::query(
            "SELECT payload, fetched_at FROM attendance_cache \
             WHERE user_id = ?1 AND institution = ?2 AND session_id = ?3 AND kind = ?4",
        )
        .bind(&key.user_id)
        .bind(&key.institution)
        .bind(&key.session_id)
        .bind(T::KIND)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("read cache entry"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let payload: String = row.get("payload");
        let fetched_at: String = row.get("fetched_at");

        let fetched_at = match DateTime::parse_from_rfc3339(&fetched_at) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(e) => {
                tracing::warn!(error = %e, "cached timestamp unreadable; treating as miss");
                return Ok(None);
            }
        };
        match serde_json::from_str(&payload) {
            Ok(payload) => Ok(Some(CacheEntry {
                payload,
                fetched_at,
            })),
            Err(e) => {
                tracing::warn!(error = %e, "cached payload unreadable; treating as miss");
                Ok(None)
            }
        }
    }

    /// Overwrite the entry for `key`, stamped with the current time.
    pub async fn put<T: CachePayload>(&self, key: &CacheKey, payload: &T) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        self.put_at(key, payload, now).await?;
        Ok(now)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(key = %key, kind = T::KIND))]
    pub async fn put_at<T: CachePayload>(
        &self,
        key: &CacheKey,
        payload: &T,
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        let payload =
            serde_json::to_string(payload).map_err(|e| Error::cache("encode cache payload", e))?;
        sqlx::query(
            "INSERT INTO attendance_cache (user_id, institution, session_id, kind, payload, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (user_id, institution, session_id, kind)
             DO UPDATE SET payload = excluded.payload, fetched_at = excluded.fetched_at",
        )
        .bind(&key.user_id)
        .bind(&key.institution)
        .bind(&key.session_id)
        .bind(T::KIND)
        .bind(payload)
        .bind(fetched_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err("write cache entry"))?;
        Ok(())
    }

    /// Remove every payload kind stored for `key`.
    pub async fn invalidate(&self, key: &CacheKey) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM attendance_cache WHERE user_id = ?1 AND institution = ?2 AND session_id = ?3",
        )
        .bind(&key.user_id)
        .bind(&key.institution)
        .bind(&key.session_id)
        .execute(&self.pool)
        .await
        .map_err(db_err("invalidate cache entry"))?;
        Ok(result.rows_affected())
    }

    pub fn is_valid<T>(&self, entry: &CacheEntry<T>) -> bool {
        self.is_valid_at(entry, Utc::now())
    }

    pub fn is_valid_at<T>(&self, entry: &CacheEntry<T>, now: DateTime<Utc>) -> bool {
        now - entry.fetched_at < self.ttl
    }

    /// Merge freshly fetched feed items into the cached page and store it.
    pub async fn merge_feed(
        &self,
        key: &CacheKey,
        fetched: Vec<FeedItem>,
        cursor: Option<String>,
    ) -> Result<FeedPage> {
        let existing = self.get::<FeedPage>(key).await?.map(|e| e.payload);
        let merged = merge_feed_page(existing, fetched, cursor);
        self.put(key, &merged).await?;
        Ok(merged)
    }
}

/// Items are unique by id (the fetched copy wins), newest first with ties
/// ordered by id. The stored cursor survives unless a new one is given.
pub fn merge_feed_page(
    existing: Option<FeedPage>,
    fetched: Vec<FeedItem>,
    cursor: Option<String>,
) -> FeedPage {
    let existing = existing.unwrap_or_default();
    let mut by_id: std::collections::HashMap<String, FeedItem> = existing
        .items
        .into_iter()
        .map(|item| (item.id.clone(), item))
        .collect();
    for item in fetched {
        by_id.insert(item.id.clone(), item);
    }

    let mut items: Vec<FeedItem> = by_id.into_values().collect();
    items.sort_by(|a, b| b.posted_at.cmp(&a.posted_at).then_with(|| a.id.cmp(&b.id)));

    FeedPage {
        items,
        next_cursor: cursor.or(existing.next_cursor),
    }
}

pub fn age_description<T>(entry: &CacheEntry<T>) -> String {
    describe_age(entry.fetched_at, Utc::now())
}

/// Relative age as shown next to cached data: "Just now", "5m ago", "3h ago", "2d ago".
pub fn describe_age(fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now - fetched_at;
    if age < Duration::minutes(1) {
        "Just now".to_string()
    } else if age < Duration::hours(1) {
        format!("{}m ago", age.num_minutes())
    } else if age < Duration::days(1) {
        format!("{}h ago", age.num_hours())
    } else {
        format!("{}d ago", age.num_days())
    }
}
