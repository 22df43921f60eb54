// SQLite persistence for listing batches, the VIN decode cache and small
// pieces of dashboard state.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::listings::Listing;
use crate::vin::VinQuery;

/// SQLite-backed store shared by the app loop and the CLI.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS listing_batches (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                count      INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS listings (
                batch_id INTEGER NOT NULL REFERENCES listing_batches(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                make     TEXT NOT NULL,
                model    TEXT NOT NULL,
                year     INTEGER NOT NULL,
                price    INTEGER NOT NULL,
                location TEXT NOT NULL,
                PRIMARY KEY (batch_id, position)
            );

            CREATE TABLE IF NOT EXISTS vin_cache (
                vin        TEXT NOT NULL,
                model_year INTEGER NOT NULL,
                response   TEXT NOT NULL,
                fetched_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (vin, model_year)
            );

            CREATE TABLE IF NOT EXISTS dashboard_state (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    // ------------------------------------------------------------------
    // Listings
    // ------------------------------------------------------------------

    /// Store a generated batch in one transaction and return its id.
    pub fn record_listings(&self, listings: &[Listing]) -> Result<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;

        tx.execute(
            "INSERT INTO listing_batches (count) VALUES (?1)",
            params![listings.len() as i64],
        )
        .context("failed to insert listing batch")?;
        let batch_id = tx.last_insert_rowid();

        for (position, listing) in listings.iter().enumerate() {
            tx.execute(
                "INSERT INTO listings (batch_id, position, make, model, year, price, location)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    batch_id,
                    position as i64,
                    listing.make,
                    listing.model,
                    listing.year,
                    listing.price,
                    listing.location,
                ],
            )
            .context("failed to insert listing")?;
        }

        tx.commit().context("failed to commit listing batch")?;
        Ok(batch_id)
    }

    /// The most recently recorded batch, in generation order. `None` if no
    /// batch has ever been recorded.
    pub fn latest_listings(&self) -> Result<Option<Vec<Listing>>> {
        let conn = self.conn();
        let batch_id: Option<i64> = conn
            .query_row(
                "SELECT id FROM listing_batches ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .context("failed to find latest listing batch")?;

        let Some(batch_id) = batch_id else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare(
                "SELECT make, model, year, price, location
                 FROM listings WHERE batch_id = ?1 ORDER BY position",
            )
            .context("failed to prepare latest_listings query")?;

        let listings = stmt
            .query_map(params![batch_id], |row| {
                Ok(Listing {
                    make: row.get(0)?,
                    model: row.get(1)?,
                    year: row.get(2)?,
                    price: row.get(3)?,
                    location: row.get(4)?,
                })
            })
            .context("failed to query listings")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map listing rows")?;

        Ok(Some(listings))
    }

    /// Number of listing batches recorded so far.
    pub fn batch_count(&self) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM listing_batches", [], |row| row.get(0))
            .context("failed to count listing batches")?;
        Ok(count as usize)
    }

    // ------------------------------------------------------------------
    // VIN cache
    // ------------------------------------------------------------------

    /// Store (or replace) the raw decode response for `query`.
    pub fn cache_vin(&self, query: &VinQuery, response: &serde_json::Value) -> Result<()> {
        let conn = self.conn();
        let json_str =
            serde_json::to_string(response).context("failed to serialize VIN response")?;
        conn.execute(
            "INSERT OR REPLACE INTO vin_cache (vin, model_year, response) VALUES (?1, ?2, ?3)",
            params![query.vin, query.model_year.unwrap_or(0), json_str],
        )
        .context("failed to cache VIN response")?;
        Ok(())
    }

    /// Look up a cached decode. A query with and without a model year are
    /// separate entries.
    pub fn cached_vin(&self, query: &VinQuery) -> Result<Option<serde_json::Value>> {
        let conn = self.conn();
        let json_str: Option<String> = conn
            .query_row(
                "SELECT response FROM vin_cache WHERE vin = ?1 AND model_year = ?2",
                params![query.vin, query.model_year.unwrap_or(0)],
                |row| row.get(0),
            )
            .optional()
            .context("failed to query VIN cache")?;

        json_str
            .map(|s| serde_json::from_str(&s).context("failed to deserialize cached VIN response"))
            .transpose()
    }

    /// Drop every cached decode, returning how many rows were removed.
    pub fn clear_vin_cache(&self) -> Result<usize> {
        let conn = self.conn();
        let removed = conn
            .execute("DELETE FROM vin_cache", [])
            .context("failed to clear VIN cache")?;
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Key-value state
    // ------------------------------------------------------------------

    /// Persist an arbitrary JSON value under `key`, overwriting any previous value.
    pub fn save_state(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let conn = self.conn();
        let json_str =
            serde_json::to_string(value).context("failed to serialize state value")?;
        conn.execute(
            "INSERT OR REPLACE INTO dashboard_state (key, value) VALUES (?1, ?2)",
            params![key, json_str],
        )
        .context("failed to save state")?;
        Ok(())
    }

    /// Load a previously saved JSON value by `key`.
    pub fn load_state(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn();
        let json_str: Option<String> = conn
            .query_row(
                "SELECT value FROM dashboard_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("failed to query dashboard state")?;

        json_str
            .map(|s| serde_json::from_str(&s).context("failed to deserialize state value"))
            .transpose()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
