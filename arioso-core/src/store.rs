//! Categorized, versioned persistent store backed by embedded SQLite.
//!
//! Every record lives in exactly one of four fixed categories, chosen by a
//! pure key classifier. Key naming is the durable contract surface:
//! prefixes must remain stable across versions for migration to work.

use crate::error::Result;
use chrono::Utc;
use rusqlite::OptionalExtension;
use std::collections::HashMap;
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "arioso::store";

/// Current store schema version, stamped into `PRAGMA user_version`.
///
/// Version 3 split account records out of the legacy catch-all category.
pub const SCHEMA_VERSION: i32 = 3;

/// Well-known persisted keys and key builders.
///
/// Prefixes determine categorization; they are persisted, so they must not
/// change once established.
pub mod keys {
    pub const ACCOUNT_PROFILE: &str = "account:profile";
    pub const ACCOUNT_PLAYLISTS: &str = "account:playlists";
    pub const ACCOUNT_SESSION: &str = "account:session";

    #[must_use]
    pub fn media_audio(track_id: &str) -> String {
        format!("media:audio:{track_id}")
    }

    #[must_use]
    pub fn media_cover(track_id: &str) -> String {
        format!("media:cover:{track_id}")
    }

    #[must_use]
    pub fn metadata_lyric(track_id: &str) -> String {
        format!("metadata:lyric:{track_id}")
    }

    #[must_use]
    pub fn metadata_theme(track_id: &str) -> String {
        format!("metadata:theme:{track_id}")
    }

    #[must_use]
    pub fn metadata_tracklist(list_id: &str) -> String {
        format!("metadata:tracklist:{list_id}")
    }
}

/// Account records that lived in the legacy category before version 3.
///
/// One declarative table drives both the eager open-time migration and the
/// lazy read-through migration in [`CacheStore::get`].
const LEGACY_ACCOUNT_KEYS: &[&str] = &[
    keys::ACCOUNT_PROFILE,
    keys::ACCOUNT_PLAYLISTS,
    keys::ACCOUNT_SESSION,
];

const SCHEMA_SQL: &str = r"
-- One table per cache category. Key naming is the durable contract:
-- the classifier routes records here by prefix alone.
CREATE TABLE IF NOT EXISTS account (
    key TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    payload BLOB NOT NULL,
    stored_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS media (
    key TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    payload BLOB NOT NULL,
    stored_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    payload BLOB NOT NULL,
    stored_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS legacy (
    key TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    payload BLOB NOT NULL,
    stored_at INTEGER NOT NULL
);
";

/// The fixed logical partitions of the persistent store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Session and account data
    Account,
    /// Binary media: audio and cover payloads
    Media,
    /// Structured metadata: lyrics, themes, track lists
    Metadata,
    /// Catch-all retained for pre-migration records
    Legacy,
}

impl Category {
    pub const ALL: [Self; 4] = [Self::Account, Self::Media, Self::Metadata, Self::Legacy];

    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Media => "media",
            Self::Metadata => "metadata",
            Self::Legacy => "legacy",
        }
    }

    /// Route a key to its category by prefix.
    #[must_use]
    pub fn classify(key: &str) -> Self {
        if key.starts_with("media:") {
            Self::Media
        } else if key.starts_with("metadata:") {
            Self::Metadata
        } else if key.starts_with("account:") {
            Self::Account
        } else {
            Self::Legacy
        }
    }
}

/// A stored value: raw bytes for media payloads, JSON for structured ones.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(serde_json::Value),
    Blob(Vec<u8>),
}

impl Payload {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::Blob(_) => "blob",
        }
    }

    fn into_stored(self) -> Result<(&'static str, Vec<u8>)> {
        let kind = self.kind();
        let bytes = match self {
            Self::Json(value) => serde_json::to_vec(&value)?,
            Self::Blob(bytes) => bytes,
        };
        Ok((kind, bytes))
    }

    fn from_stored(kind: &str, bytes: Vec<u8>) -> Self {
        if kind == "json" {
            if let Ok(value) = serde_json::from_slice(&bytes) {
                return Self::Json(value);
            }
        }
        Self::Blob(bytes)
    }
}

/// Byte accounting per category, plus a media record count kept separately
/// for display purposes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreUsage {
    pub by_category: HashMap<Category, u64>,
    pub media_count: u64,
    pub total_bytes: u64,
}

/// Versioned, categorized key/value store over a local SQLite database.
pub struct CacheStore {
    conn: Connection,
}

impl CacheStore {
    /// Open the store at the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or opened.
    pub async fn new() -> Result<Self> {
        Self::open(&crate::paths::store_db_path()).await
    }

    /// Open the store at a specific path, creating and migrating the
    /// schema as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub async fn open(path: &Path) -> Result<Self> {
        info!(target: LOG_TARGET, "Opening store database at {:?}", path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).await?;
        Self::initialize(conn).await
    }

    /// Open an in-memory store, used by tests and ephemeral sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::initialize(conn).await
    }

    async fn initialize(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;

            let version: i32 =
                conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

            if version < SCHEMA_VERSION {
                conn.execute_batch(SCHEMA_SQL)?;
                if version > 0 {
                    info!(
                        target: LOG_TARGET,
                        "Upgrading store schema from version {version} to {SCHEMA_VERSION}"
                    );
                    migrate_legacy_account_keys(conn);
                }
                conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            }

            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Store a payload, routing it to its category and overwriting any
    /// existing record for the key.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write transaction fails.
    pub async fn put(&self, key: &str, payload: Payload) -> Result<()> {
        let category = Category::classify(key);
        let (kind, bytes) = payload.into_stored()?;
        let key = key.to_string();
        let stored_at = Utc::now().timestamp();

        self.conn
            .call(move |conn| {
                let sql = format!(
                    "INSERT INTO {} (key, kind, payload, stored_at) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(key) DO UPDATE SET
                        kind = excluded.kind,
                        payload = excluded.payload,
                        stored_at = excluded.stored_at",
                    category.table()
                );
                conn.execute(&sql, rusqlite::params![key, kind, bytes, stored_at])?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    /// Read a payload by key.
    ///
    /// A missing account record is looked up once in the legacy category
    /// and copied forward if found (lazy migration-on-read, idempotent).
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction fails.
    pub async fn get(&self, key: &str) -> Result<Option<Payload>> {
        let category = Category::classify(key);

        if let Some(payload) = self.read(category, key).await? {
            return Ok(Some(payload));
        }

        if category == Category::Account && LEGACY_ACCOUNT_KEYS.contains(&key) {
            return self.lazy_migrate_account_key(key).await;
        }

        Ok(None)
    }

    async fn read(&self, category: Category, key: &str) -> Result<Option<Payload>> {
        let key = key.to_string();

        let row = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT kind, payload FROM {} WHERE key = ?1", category.table());
                let mut stmt = conn.prepare_cached(&sql)?;
                let row = stmt
                    .query_row([key], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
                    })
                    .optional()?;
                Ok(row)
            })
            .await?;

        Ok(row.map(|(kind, bytes)| Payload::from_stored(&kind, bytes)))
    }

    /// Copy a pre-v3 account record forward from the legacy category and
    /// return it, if present.
    async fn lazy_migrate_account_key(&self, key: &str) -> Result<Option<Payload>> {
        let owned_key = key.to_string();

        let copied = self
            .conn
            .call(move |conn| Ok(copy_legacy_into_account(conn, &owned_key)?))
            .await?;

        if !copied {
            return Ok(None);
        }

        debug!(target: LOG_TARGET, "Lazily migrated legacy record {key} into account category");
        self.read(Category::Account, key).await
    }

    /// Delete a single record.
    ///
    /// # Errors
    ///
    /// Returns an error if the write transaction fails.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let category = Category::classify(key);
        let key = key.to_string();

        self.conn
            .call(move |conn| {
                let sql = format!("DELETE FROM {} WHERE key = ?1", category.table());
                conn.execute(&sql, [key])?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    /// Delete every record in one category. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write transaction fails.
    pub async fn delete_by_category(&self, category: Category) -> Result<usize> {
        self.conn
            .call(move |conn| {
                let sql = format!("DELETE FROM {}", category.table());
                let deleted = conn.execute(&sql, [])?;
                Ok(deleted)
            })
            .await
            .map_err(Into::into)
    }

    /// Delete every record across all categories except the preserved keys.
    ///
    /// Categories are cleared independently: a failure in one is logged
    /// and does not abort the others.
    pub async fn clear_all(&self, preserve: &[&str]) {
        let preserve: Vec<String> = preserve.iter().map(ToString::to_string).collect();

        for category in Category::ALL {
            let preserve = preserve.clone();
            let result = self
                .conn
                .call(move |conn| {
                    if preserve.is_empty() {
                        let sql = format!("DELETE FROM {}", category.table());
                        conn.execute(&sql, [])?;
                    } else {
                        let placeholders = vec!["?"; preserve.len()].join(", ");
                        let sql = format!(
                            "DELETE FROM {} WHERE key NOT IN ({placeholders})",
                            category.table()
                        );
                        conn.execute(&sql, rusqlite::params_from_iter(preserve))?;
                    }
                    Ok(())
                })
                .await;

            if let Err(e) = result {
                warn!(target: LOG_TARGET, "Failed to clear category {:?}: {e}", category);
            }
        }
    }

    /// Total bytes held across every category.
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction fails.
    pub async fn usage_total(&self) -> Result<u64> {
        Ok(self.usage_by_category().await?.total_bytes)
    }

    /// Per-category byte accounting plus the media record count.
    ///
    /// Blob payloads contribute their byte length; JSON payloads the
    /// length of their serialized form.
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction fails.
    pub async fn usage_by_category(&self) -> Result<StoreUsage> {
        self.conn
            .call(|conn| {
                let mut usage = StoreUsage::default();

                for category in Category::ALL {
                    let sql = format!(
                        "SELECT COALESCE(SUM(LENGTH(payload)), 0), COUNT(*) FROM {}",
                        category.table()
                    );
                    let (bytes, count): (i64, i64) =
                        conn.query_row(&sql, [], |row| Ok((row.get(0)?, row.get(1)?)))?;

                    let bytes = u64::try_from(bytes).unwrap_or(0);
                    usage.by_category.insert(category, bytes);
                    usage.total_bytes += bytes;
                    if category == Category::Media {
                        usage.media_count = u64::try_from(count).unwrap_or(0);
                    }
                }

                Ok(usage)
            })
            .await
            .map_err(Into::into)
    }

    /// Checkpoint WAL for clean shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the WAL checkpoint fails.
    pub async fn checkpoint(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE)")?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    /// Insert a record into an explicit category, bypassing the classifier.
    #[cfg(test)]
    pub(crate) async fn insert_raw(
        &self,
        category: Category,
        key: &str,
        payload: Payload,
    ) -> Result<()> {
        let (kind, bytes) = payload.into_stored()?;
        let key = key.to_string();
        let stored_at = Utc::now().timestamp();

        self.conn
            .call(move |conn| {
                let sql = format!(
                    "INSERT OR REPLACE INTO {} (key, kind, payload, stored_at) VALUES (?1, ?2, ?3, ?4)",
                    category.table()
                );
                conn.execute(&sql, rusqlite::params![key, kind, bytes, stored_at])?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }
}

/// Copy one known legacy account record into the account table, keeping
/// its original timestamp. Returns whether a record was found.
fn copy_legacy_into_account(conn: &rusqlite::Connection, key: &str) -> rusqlite::Result<bool> {
    let copied = conn.execute(
        "INSERT INTO account (key, kind, payload, stored_at)
         SELECT key, kind, payload, stored_at FROM legacy WHERE key = ?1
         ON CONFLICT(key) DO NOTHING",
        [key],
    )?;
    Ok(copied > 0)
}

/// One-time v3 upgrade: move known account records out of the legacy
/// catch-all. Best-effort per key: a failed copy leaves the legacy record
/// intact rather than losing data.
fn migrate_legacy_account_keys(conn: &rusqlite::Connection) {
    for key in LEGACY_ACCOUNT_KEYS {
        match copy_legacy_into_account(conn, key) {
            Ok(true) => {
                if let Err(e) = conn.execute("DELETE FROM legacy WHERE key = ?1", [key]) {
                    warn!(target: LOG_TARGET, "Migrated {key} but failed to remove legacy copy: {e}");
                } else {
                    info!(target: LOG_TARGET, "Migrated legacy record {key} into account category");
                }
            }
            Ok(false) => {}
            Err(e) => {
                warn!(target: LOG_TARGET, "Failed to migrate legacy record {key}: {e}");
            }
        }
    }
}
