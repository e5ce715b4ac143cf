//! `SQLite` storage for the archive.
//!
//! [`ArchiveStore`] is the seam the pipeline components are written
//! against; [`Storage`] is its `SQLite` implementation. Every write is a
//! keyed upsert, so any write may be retried safely.

use crate::error::{ArchiveError, Result, ResultExt};
use crate::model::{ArchiveStats, Media, Profile, Record, epoch_utc};
use crate::ranking::{SortField, SortKey};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use tracing::{debug, info};

const SCHEMA_VERSION: i32 = 1;

/// Largest batch accepted by [`ArchiveStore::put_records`].
pub const MAX_PUT_SIZE: usize = 500;

const RECORD_COLUMNS: &str = "id, id_str, created_ms, updated_ms, favorites, retweets, ratio, \
                              text, url, deleted, media_json";

const PROFILE_COLUMNS: &str = "handle, name, description, followers, following, item_count, \
                               avatar_json, url, location, verified, link, updated_ms";

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_else(epoch_utc)
}

fn limit_to_i64(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// A store-side record query.
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    /// Include soft-deleted records.
    pub include_deleted: bool,
    /// Ordering keys in precedence order. An `id` tie-break is appended
    /// (in the direction of the first key) unless `id` is already present.
    pub order: Vec<SortKey>,
    /// Maximum rows; `None` returns everything.
    pub limit: Option<usize>,
    /// Rows to skip.
    pub offset: usize,
}

impl RecordQuery {
    /// Non-deleted records in the given order.
    #[must_use]
    pub fn active(order: Vec<SortKey>) -> Self {
        Self {
            include_deleted: false,
            order,
            limit: None,
            offset: 0,
        }
    }

    /// Restrict to one window.
    #[must_use]
    pub const fn window(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }

    fn order_clause(&self) -> String {
        let mut parts: Vec<String> = self
            .order
            .iter()
            .map(|k| format!("{} {}", k.field.column(), direction(k.descending)))
            .collect();

        if !self.order.iter().any(|k| k.field == SortField::Id) {
            let descending = self.order.first().is_none_or(|k| k.descending);
            parts.push(format!("id {}", direction(descending)));
        }
        parts.join(", ")
    }
}

const fn direction(descending: bool) -> &'static str {
    if descending { "DESC" } else { "ASC" }
}

/// Persistent keyed collection of records and the profile.
pub trait ArchiveStore {
    /// Fetch one record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get_record(&self, id: i64) -> Result<Option<Record>>;

    /// Upsert one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put_record(&mut self, record: &Record) -> Result<()>;

    /// Upsert up to [`MAX_PUT_SIZE`] records atomically.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::BatchTooLarge`] for oversized batches, or the
    /// write error; nothing from the batch is committed on error.
    fn put_records(&mut self, records: &[Record]) -> Result<usize>;

    /// Run a filtered, ordered, windowed query.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn query_records(&self, query: &RecordQuery) -> Result<Vec<Record>>;

    /// The record with the highest id, deleted or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn latest_record(&self) -> Result<Option<Record>>;

    /// Set the soft-delete flag on one record.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::NotFound`] when no record has this id.
    fn set_deleted(&mut self, id: i64, deleted: bool) -> Result<()>;

    /// Fetch the profile for a handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get_profile(&self, handle: &str) -> Result<Option<Profile>>;

    /// Replace the profile for its handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put_profile(&mut self, profile: &Profile) -> Result<()>;

    /// Aggregate counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn stats(&self) -> Result<ArchiveStats>;
}

/// `SQLite` storage manager
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ArchiveError::path_error("create", parent, e))?;
        }
        let conn = Self::connect(db_path)
            .with_context(|| format!("Failed to open database '{}'", db_path.display()))?;

        let storage = Self { conn };
        storage.migrate()?;
        debug!(path = %db_path.display(), "Opened archive database");
        Ok(storage)
    }

    fn connect(db_path: &Path) -> rusqlite::Result<Connection> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
            ",
        )?;
        Ok(conn)
    }

    /// Open an existing database, refusing to create a new one.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::DatabaseNotFound`] if the file is missing.
    pub fn open_existing(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if !db_path.exists() {
            return Err(ArchiveError::database_not_found(db_path));
        }
        Self::open(db_path)
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be initialized.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA temp_store = MEMORY;")?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let current_version = self.get_schema_version();

        if current_version > SCHEMA_VERSION {
            return Err(ArchiveError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                found: current_version,
            });
        }

        if current_version < SCHEMA_VERSION {
            info!(
                "Migrating database from version {} to {}",
                current_version, SCHEMA_VERSION
            );
            self.create_schema()?;
            self.set_schema_version(SCHEMA_VERSION)?;
        }

        Ok(())
    }

    fn get_schema_version(&self) -> i32 {
        let result: rusqlite::Result<i32> = self.conn.query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| {
                let value: String = row.get(0)?;
                Ok(value.parse().unwrap_or(0))
            },
        );

        // Treat missing schema table as version 0.
        result.unwrap_or_default()
    }

    fn set_schema_version(&self, version: i32) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?)",
            params![version.to_string()],
        )?;
        Ok(())
    }

    fn create_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY,
                id_str TEXT NOT NULL,
                created_ms INTEGER NOT NULL,
                updated_ms INTEGER NOT NULL,
                favorites INTEGER NOT NULL DEFAULT 0,
                retweets INTEGER NOT NULL DEFAULT 0,
                ratio REAL NOT NULL DEFAULT 0,
                text TEXT NOT NULL DEFAULT '',
                url TEXT NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0,
                media_json TEXT NOT NULL DEFAULT '[]'
            );
            CREATE INDEX IF NOT EXISTS idx_records_best
                ON records(deleted, favorites DESC, retweets DESC, ratio DESC);
            CREATE INDEX IF NOT EXISTS idx_records_updated ON records(deleted, updated_ms);
            CREATE INDEX IF NOT EXISTS idx_records_created ON records(created_ms);

            CREATE TABLE IF NOT EXISTS profiles (
                handle TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                followers INTEGER NOT NULL,
                following INTEGER NOT NULL,
                item_count INTEGER NOT NULL,
                avatar_json TEXT NOT NULL,
                url TEXT NOT NULL,
                location TEXT NOT NULL,
                verified INTEGER NOT NULL,
                link TEXT NOT NULL,
                updated_ms INTEGER NOT NULL
            );
            ",
        )?;

        Ok(())
    }

    fn record_from_row(row: &Row<'_>) -> rusqlite::Result<Record> {
        let media_json: String = row.get(10)?;
        Ok(Record {
            id: row.get(0)?,
            id_str: row.get(1)?,
            created: millis_to_utc(row.get(2)?),
            updated: millis_to_utc(row.get(3)?),
            favorites: row.get(4)?,
            retweets: row.get(5)?,
            ratio: row.get(6)?,
            text: row.get(7)?,
            url: row.get(8)?,
            deleted: row.get::<_, i32>(9)? != 0,
            media: serde_json::from_str(&media_json).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
            })?,
        })
    }

    fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<Profile> {
        let avatar_json: String = row.get(6)?;
        let avatar: Media = serde_json::from_str(&avatar_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(Profile {
            handle: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            followers: row.get(3)?,
            following: row.get(4)?,
            item_count: row.get(5)?,
            avatar,
            url: row.get(7)?,
            location: row.get(8)?,
            verified: row.get::<_, i32>(9)? != 0,
            link: row.get(10)?,
            updated: millis_to_utc(row.get(11)?),
        })
    }

    fn upsert(conn: &Connection, record: &Record) -> Result<()> {
        let mut stmt = conn.prepare_cached(&format!(
            "INSERT OR REPLACE INTO records ({RECORD_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))?;
        stmt.execute(params![
            record.id,
            record.id_str,
            record.created.timestamp_millis(),
            record.updated.timestamp_millis(),
            record.favorites,
            record.retweets,
            record.ratio,
            record.text,
            record.url,
            i32::from(record.deleted),
            serde_json::to_string(&record.media)?,
        ])?;
        Ok(())
    }

    fn count(&self, sql: &str) -> Result<i64> {
        Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
    }
}

impl ArchiveStore for Storage {
    fn get_record(&self, id: i64) -> Result<Option<Record>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?"),
                params![id],
                Self::record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn put_record(&mut self, record: &Record) -> Result<()> {
        Self::upsert(&self.conn, record)
    }

    fn put_records(&mut self, records: &[Record]) -> Result<usize> {
        if records.len() > MAX_PUT_SIZE {
            return Err(ArchiveError::BatchTooLarge {
                size: records.len(),
                limit: MAX_PUT_SIZE,
            });
        }

        let tx = self.conn.transaction()?;
        for record in records {
            Self::upsert(&tx, record)?;
        }
        tx.commit()?;

        debug!("Stored {} records", records.len());
        Ok(records.len())
    }

    fn query_records(&self, query: &RecordQuery) -> Result<Vec<Record>> {
        let filter = if query.include_deleted {
            ""
        } else {
            " WHERE deleted = 0"
        };
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records{filter} ORDER BY {} LIMIT ? OFFSET ?",
            query.order_clause()
        );

        // SQLite treats a negative LIMIT as "no limit".
        let limit = query.limit.map_or(-1, limit_to_i64);
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(
                params![limit, limit_to_i64(query.offset)],
                Self::record_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    fn latest_record(&self) -> Result<Option<Record>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM records ORDER BY id DESC LIMIT 1"),
                [],
                Self::record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn set_deleted(&mut self, id: i64, deleted: bool) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE records SET deleted = ? WHERE id = ?",
            params![i32::from(deleted), id],
        )?;
        if changed == 0 {
            return Err(ArchiveError::not_found("Record", id.to_string()));
        }
        Ok(())
    }

    fn get_profile(&self, handle: &str) -> Result<Option<Profile>> {
        let profile = self
            .conn
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE handle = ?"),
                params![handle],
                Self::profile_from_row,
            )
            .optional()?;
        Ok(profile)
    }

    fn put_profile(&mut self, profile: &Profile) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT OR REPLACE INTO profiles ({PROFILE_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                profile.handle,
                profile.name,
                profile.description,
                profile.followers,
                profile.following,
                profile.item_count,
                serde_json::to_string(&profile.avatar)?,
                profile.url,
                profile.location,
                i32::from(profile.verified),
                profile.link,
                profile.updated.timestamp_millis(),
            ],
        )?;
        info!(handle = %profile.handle, "Stored profile");
        Ok(())
    }

    fn stats(&self) -> Result<ArchiveStats> {
        let records_count = self.count("SELECT COUNT(*) FROM records")?;
        let deleted_count = self.count("SELECT COUNT(*) FROM records WHERE deleted = 1")?;

        let (first, last): (Option<i64>, Option<i64>) = self.conn.query_row(
            "SELECT MIN(created_ms), MAX(created_ms) FROM records",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let profile_updated: Option<i64> =
            self.conn
                .query_row("SELECT MAX(updated_ms) FROM profiles", [], |row| row.get(0))?;

        Ok(ArchiveStats {
            records_count,
            active_count: records_count - deleted_count,
            deleted_count,
            first_created: first.map(millis_to_utc),
            last_created: last.map(millis_to_utc),
            profile_updated: profile_updated.map(millis_to_utc),
        })
    }
}
