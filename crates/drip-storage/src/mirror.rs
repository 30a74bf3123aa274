//! Local SQLite mirror of the remote collection.
//!
//! One row per unique product URL. The mirror is kept eventually consistent
//! with the remote store: the engine writes through to it after every
//! successful remote write, and `sync` can rebuild it wholesale. Schema
//! changes are additive only and applied idempotently on every open.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::warn;

use drip_core::ProductRecord;

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS coffees (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  roaster TEXT NOT NULL,
  title TEXT NOT NULL,
  url TEXT NOT NULL UNIQUE,
  price TEXT DEFAULT '',
  in_stock INTEGER NOT NULL DEFAULT 1,
  first_seen TEXT NOT NULL,
  last_seen TEXT NOT NULL,
  tried INTEGER DEFAULT 0,
  producer TEXT DEFAULT '',
  country TEXT DEFAULT '',
  region TEXT DEFAULT '',
  process TEXT DEFAULT '',
  variety TEXT DEFAULT '',
  notes TEXT DEFAULT '',
  profile TEXT DEFAULT '',
  image TEXT DEFAULT ''
)";

/// Columns added over time; pre-existing databases gain them on open.
const ADDITIVE_COLUMNS: &[(&str, &str)] = &[
    ("price", "TEXT DEFAULT ''"),
    ("tried", "INTEGER DEFAULT 0"),
    ("producer", "TEXT DEFAULT ''"),
    ("country", "TEXT DEFAULT ''"),
    ("region", "TEXT DEFAULT ''"),
    ("process", "TEXT DEFAULT ''"),
    ("variety", "TEXT DEFAULT ''"),
    ("notes", "TEXT DEFAULT ''"),
    ("profile", "TEXT DEFAULT ''"),
    ("image", "TEXT DEFAULT ''"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRow {
    pub roaster: String,
    pub title: String,
    pub url: String,
    pub price: String,
    pub in_stock: bool,
    pub first_seen: String,
    pub last_seen: String,
    pub tried: bool,
}

#[derive(Debug, Clone)]
pub struct MirrorStore {
    pool: SqlitePool,
    has_legacy_price_text: bool,
}

impl MirrorStore {
    /// Open (and initialize) the mirror database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("creating database directory {}", dir.display()))?;
            }
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);
        Self::connect(options).await
    }

    /// In-memory store, used by tests.
    pub async fn open_in_memory() -> Result<Self> {
        let options =
            SqliteConnectOptions::from_str("sqlite::memory:").context("memory sqlite options")?;
        Self::connect(options).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self> {
        // Single connection: the monitor is a single sequential process and
        // an in-memory database exists per connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("opening sqlite mirror")?;
        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .context("creating coffees table")?;
        ensure_schema(&pool).await?;
        let has_legacy_price_text = table_columns(&pool).await?.contains("price_text");
        Ok(Self {
            pool,
            has_legacy_price_text,
        })
    }

    /// Insert or update the row for `record.product.url`. Returns `true`
    /// when a new row was inserted.
    ///
    /// `first_seen` is fixed at first insertion and never overwritten, even
    /// when the caller passes a different value for an existing row.
    pub async fn upsert(&self, record: &ProductRecord) -> Result<bool> {
        let p = &record.product;
        let existing = sqlx::query("SELECT id FROM coffees WHERE url = ?")
            .bind(&p.url)
            .fetch_optional(&self.pool)
            .await
            .context("looking up mirror row")?;

        if existing.is_none() {
            sqlx::query(
                "INSERT INTO coffees \
                 (roaster, title, url, price, in_stock, first_seen, last_seen, \
                  producer, country, region, process, variety, notes, profile, image) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&p.roaster)
            .bind(&p.title)
            .bind(&p.url)
            .bind(&p.price_text)
            .bind(p.in_stock)
            .bind(&record.first_seen)
            .bind(&record.last_seen)
            .bind(&p.producer)
            .bind(&p.country)
            .bind(&p.region)
            .bind(&p.process)
            .bind(&p.variety)
            .bind(&p.notes)
            .bind(&p.profile)
            .bind(&p.image)
            .execute(&self.pool)
            .await
            .context("inserting mirror row")?;
        } else {
            sqlx::query(
                "UPDATE coffees SET roaster = ?, title = ?, price = ?, in_stock = ?, \
                 last_seen = ?, producer = ?, country = ?, region = ?, process = ?, \
                 variety = ?, notes = ?, profile = ?, image = ? WHERE url = ?",
            )
            .bind(&p.roaster)
            .bind(&p.title)
            .bind(&p.price_text)
            .bind(p.in_stock)
            .bind(&record.last_seen)
            .bind(&p.producer)
            .bind(&p.country)
            .bind(&p.region)
            .bind(&p.process)
            .bind(&p.variety)
            .bind(&p.notes)
            .bind(&p.profile)
            .bind(&p.image)
            .bind(&p.url)
            .execute(&self.pool)
            .await
            .context("updating mirror row")?;
        }

        if self.has_legacy_price_text {
            sqlx::query("UPDATE coffees SET price_text = ? WHERE url = ?")
                .bind(&p.price_text)
                .bind(&p.url)
                .execute(&self.pool)
                .await
                .context("updating legacy price_text")?;
        }
        Ok(existing.is_none())
    }

    /// Set `in_stock = 0` on the roaster's rows whose URL was not seen this
    /// run. An empty seen-set marks the whole roaster stale: zero results
    /// from a successful scrape most plausibly means everything sold out,
    /// and visible staleness beats silently stale in-stock flags.
    pub async fn mark_absent_out_of_stock(
        &self,
        roaster: &str,
        seen_urls: &HashSet<String>,
    ) -> Result<u64> {
        let affected = if seen_urls.is_empty() {
            sqlx::query("UPDATE coffees SET in_stock = 0 WHERE roaster = ?")
                .bind(roaster)
                .execute(&self.pool)
                .await
                .context("marking roaster stale")?
                .rows_affected()
        } else {
            let placeholders = vec!["?"; seen_urls.len()].join(",");
            let sql = format!(
                "UPDATE coffees SET in_stock = 0 WHERE roaster = ? AND url NOT IN ({placeholders})"
            );
            let mut query = sqlx::query(&sql).bind(roaster);
            for url in seen_urls {
                query = query.bind(url);
            }
            query
                .execute(&self.pool)
                .await
                .context("marking absent urls stale")?
                .rows_affected()
        };
        Ok(affected)
    }

    pub async fn set_tried_flag(&self, url: &str, tried: bool) -> Result<u64> {
        let affected = sqlx::query("UPDATE coffees SET tried = ? WHERE url = ?")
            .bind(tried)
            .bind(url)
            .execute(&self.pool)
            .await
            .context("setting tried flag")?
            .rows_affected();
        Ok(affected)
    }

    pub async fn reset_tried_flags(&self) -> Result<()> {
        sqlx::query("UPDATE coffees SET tried = 0")
            .execute(&self.pool)
            .await
            .context("resetting tried flags")?;
        Ok(())
    }

    pub async fn get_row(&self, url: &str) -> Result<Option<MirrorRow>> {
        let row = sqlx::query(
            "SELECT roaster, title, url, COALESCE(price, '') AS price, in_stock, \
             first_seen, last_seen, COALESCE(tried, 0) AS tried \
             FROM coffees WHERE url = ?",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .context("reading mirror row")?;
        Ok(row.map(|r| MirrorRow {
            roaster: r.get("roaster"),
            title: r.get("title"),
            url: r.get("url"),
            price: r.get("price"),
            in_stock: r.get("in_stock"),
            first_seen: r.get("first_seen"),
            last_seen: r.get("last_seen"),
            tried: r.get("tried"),
        }))
    }
}

async fn table_columns(pool: &SqlitePool) -> Result<HashSet<String>> {
    let rows = sqlx::query("PRAGMA table_info('coffees')")
        .fetch_all(pool)
        .await
        .context("reading table_info")?;
    Ok(rows.iter().map(|r| r.get::<String, _>("name")).collect())
}

/// Additive, idempotent migration: add any missing column with a safe
/// default and backfill `price` from the legacy `price_text` column.
async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    let columns = table_columns(pool).await?;
    for (name, decl) in ADDITIVE_COLUMNS {
        if !columns.contains(*name) {
            sqlx::query(&format!("ALTER TABLE coffees ADD COLUMN {name} {decl}"))
                .execute(pool)
                .await
                .with_context(|| format!("adding column {name}"))?;
        }
    }
    if columns.contains("price_text") {
        sqlx::query("UPDATE coffees SET price = COALESCE(NULLIF(price, ''), price_text)")
            .execute(pool)
            .await
            .context("backfilling price from price_text")?;
    }
    Ok(())
}

/// Remove the mirror database file and its WAL/SHM sidecars. Returns the
/// number of files removed.
pub fn remove_mirror_files(path: &Path) -> usize {
    let mut removed = 0;
    let path = path.to_string_lossy();
    for candidate in [path.to_string(), format!("{path}-wal"), format!("{path}-shm")] {
        match std::fs::remove_file(&candidate) {
            Ok(()) => removed += 1,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(file = %candidate, %err, "failed to delete mirror file"),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use drip_core::Product;

    fn record(roaster: &str, url: &str, first_seen: &str, last_seen: &str) -> ProductRecord {
        ProductRecord {
            product: Product::new(roaster, "Test Coffee", url),
            first_seen: first_seen.to_string(),
            last_seen: last_seen.to_string(),
        }
    }

    #[tokio::test]
    async fn first_seen_survives_later_upserts() {
        let store = MirrorStore::open_in_memory().await.expect("open");
        let url = "https://acme.test/products/one";
        store
            .upsert(&record("Acme", url, "2026-08-01 00:00:00+0000", "2026-08-01 00:00:00+0000"))
            .await
            .expect("insert");
        store
            .upsert(&record("Acme", url, "2026-08-20 00:00:00+0000", "2026-08-20 00:00:00+0000"))
            .await
            .expect("update");

        let row = store.get_row(url).await.expect("read").expect("row");
        assert_eq!(row.first_seen, "2026-08-01 00:00:00+0000");
        assert_eq!(row.last_seen, "2026-08-20 00:00:00+0000");
    }

    #[tokio::test]
    async fn staleness_skips_seen_urls_and_other_roasters() {
        let store = MirrorStore::open_in_memory().await.expect("open");
        for (roaster, url) in [
            ("Acme", "https://acme.test/a"),
            ("Acme", "https://acme.test/b"),
            ("Acme", "https://acme.test/c"),
            ("Zed", "https://zed.test/z"),
        ] {
            store
                .upsert(&record(roaster, url, "2026-08-01 00:00:00+0000", "2026-08-01 00:00:00+0000"))
                .await
                .expect("insert");
        }

        let seen: HashSet<String> =
            ["https://acme.test/a", "https://acme.test/b"].iter().map(|s| s.to_string()).collect();
        let affected = store.mark_absent_out_of_stock("Acme", &seen).await.expect("sweep");
        assert_eq!(affected, 1);

        assert!(store.get_row("https://acme.test/a").await.unwrap().unwrap().in_stock);
        assert!(!store.get_row("https://acme.test/c").await.unwrap().unwrap().in_stock);
        assert!(store.get_row("https://zed.test/z").await.unwrap().unwrap().in_stock);
    }

    #[tokio::test]
    async fn empty_seen_set_marks_entire_roaster_stale() {
        let store = MirrorStore::open_in_memory().await.expect("open");
        for url in ["https://acme.test/a", "https://acme.test/b"] {
            store
                .upsert(&record("Acme", url, "2026-08-01 00:00:00+0000", "2026-08-01 00:00:00+0000"))
                .await
                .expect("insert");
        }
        let affected = store
            .mark_absent_out_of_stock("Acme", &HashSet::new())
            .await
            .expect("sweep");
        assert_eq!(affected, 2);
        assert!(!store.get_row("https://acme.test/a").await.unwrap().unwrap().in_stock);
    }

    #[tokio::test]
    async fn tried_flags_set_and_reset() {
        let store = MirrorStore::open_in_memory().await.expect("open");
        let url = "https://acme.test/a";
        store
            .upsert(&record("Acme", url, "2026-08-01 00:00:00+0000", "2026-08-01 00:00:00+0000"))
            .await
            .expect("insert");

        assert_eq!(store.set_tried_flag(url, true).await.expect("set"), 1);
        assert!(store.get_row(url).await.unwrap().unwrap().tried);
        assert_eq!(store.set_tried_flag("https://missing.test", true).await.expect("set"), 0);

        store.reset_tried_flags().await.expect("reset");
        assert!(!store.get_row(url).await.unwrap().unwrap().tried);
    }

    #[tokio::test]
    async fn legacy_table_gains_columns_and_price_backfill() {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").expect("options");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .expect("pool");
        sqlx::query(
            "CREATE TABLE coffees (
               id INTEGER PRIMARY KEY AUTOINCREMENT,
               roaster TEXT NOT NULL, title TEXT NOT NULL, url TEXT NOT NULL UNIQUE,
               price_text TEXT, in_stock INTEGER NOT NULL DEFAULT 1,
               first_seen TEXT NOT NULL, last_seen TEXT NOT NULL)",
        )
        .execute(&pool)
        .await
        .expect("legacy schema");
        sqlx::query(
            "INSERT INTO coffees (roaster, title, url, price_text, first_seen, last_seen)
             VALUES ('Acme', 'Old', 'https://acme.test/old', '$14.00',
                     '2026-01-01 00:00:00+0000', '2026-01-01 00:00:00+0000')",
        )
        .execute(&pool)
        .await
        .expect("legacy row");

        ensure_schema(&pool).await.expect("migrate");
        ensure_schema(&pool).await.expect("migrate twice");

        let columns = table_columns(&pool).await.expect("columns");
        for (name, _) in ADDITIVE_COLUMNS {
            assert!(columns.contains(*name), "missing column {name}");
        }
        let price: String = sqlx::query("SELECT price FROM coffees WHERE url = 'https://acme.test/old'")
            .fetch_one(&pool)
            .await
            .expect("row")
            .get("price");
        assert_eq!(price, "$14.00");
    }
}
