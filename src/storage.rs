use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};

#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone)]
pub struct MediaEntry {
    pub id: i64,
    pub url: String,
    pub media_type: String,
    pub file_path: String,
    pub width: i64,
    pub height: i64,
    pub size_bytes: i64,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub checksum: String,
}

/// One recorded view, kept so the cool-down window survives restarts.
#[derive(Debug, Clone)]
pub struct ViewRecord {
    pub post_id: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone)]
pub struct Options {
    pub path: Option<PathBuf>,
}

impl Store {
    pub fn open(opts: Options) -> Result<Self> {
        let path = if let Some(path) = opts.path {
            path
        } else {
            default_path().context("storage: resolve default path")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("storage: create directory {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("storage: open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", &"WAL")
            .context("storage: set WAL")?;
        conn.pragma_update(None, "foreign_keys", &"ON")
            .context("storage: enable foreign keys")?;
        conn.pragma_update(None, "busy_timeout", &5000)
            .context("storage: set busy timeout")?;
        migrate(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn close(self) -> Result<()> {
        let conn = Arc::try_unwrap(self.conn)
            .map_err(|_| anyhow!("storage: connection still in use"))?
            .into_inner();
        conn.close()
            .map_err(|(_, err)| err)
            .context("storage: close connection")
    }

    pub fn record_view(&self, post_id: &str, recorded_at: DateTime<Utc>) -> Result<()> {
        if post_id.is_empty() {
            bail!("storage: post id required");
        }
        let conn = self.conn.lock();
        conn.execute(
            r#"
INSERT INTO view_log (post_id, recorded_at)
VALUES (?1, ?2)
ON CONFLICT(post_id) DO UPDATE SET
  recorded_at = excluded.recorded_at
"#,
            params![post_id, recorded_at.timestamp()],
        )?;
        Ok(())
    }

    /// Views recorded at or after the cutoff; everything older is useless
    /// for cool-down purposes.
    pub fn recent_views(&self, cutoff: DateTime<Utc>) -> Result<Vec<ViewRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
SELECT post_id, recorded_at
FROM view_log
WHERE recorded_at >= ?1
ORDER BY recorded_at DESC
"#,
        )?;
        let rows = stmt
            .query_map(params![cutoff.timestamp()], view_record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn prune_views(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM view_log WHERE recorded_at < ?1",
            params![cutoff.timestamp()],
        )?;
        Ok(deleted)
    }

    pub fn upsert_media_entry(&self, mut entry: MediaEntry) -> Result<i64> {
        if entry.url.is_empty() {
            bail!("storage: media url required");
        }
        if entry.fetched_at.timestamp() == 0 {
            entry.fetched_at = Utc::now();
        }
        let expires = entry.expires_at.map(|dt| dt.timestamp());
        let conn = self.conn.lock();
        let id: i64 = conn.query_row(
            r#"
INSERT INTO media_cache (url, media_type, file_path, width, height, size_bytes, fetched_at, expires_at, checksum)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
ON CONFLICT(url) DO UPDATE SET
  media_type = excluded.media_type,
  file_path = excluded.file_path,
  width = excluded.width,
  height = excluded.height,
  size_bytes = excluded.size_bytes,
  fetched_at = excluded.fetched_at,
  expires_at = excluded.expires_at,
  checksum = excluded.checksum
RETURNING id
"#,
            params![
                entry.url,
                entry.media_type,
                entry.file_path,
                entry.width,
                entry.height,
                entry.size_bytes,
                entry.fetched_at.timestamp(),
                expires,
                entry.checksum,
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn get_media_entry_by_url(&self, url: &str) -> Result<Option<MediaEntry>> {
        let conn = self.conn.lock();
        conn.query_row(
            r#"
SELECT id, url, media_type, file_path, width, height, size_bytes, fetched_at, expires_at, checksum
FROM media_cache
WHERE url = ?1
"#,
            params![url],
            media_entry_from_row,
        )
        .optional()
        .context("storage: query media entry")
    }

    pub fn total_media_size(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let total: Option<i64> = conn.query_row(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM media_cache",
            [],
            |row| row.get(0),
        )?;
        Ok(total.unwrap_or(0))
    }

    pub fn list_oldest_media(&self, limit: usize) -> Result<Vec<MediaEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
SELECT id, url, media_type, file_path, width, height, size_bytes, fetched_at, expires_at, checksum
FROM media_cache
ORDER BY fetched_at ASC
LIMIT ?1
"#,
        )?;
        let rows = stmt
            .query_map(params![limit as i64], media_entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn delete_media_entries(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let placeholders = ids
            .iter()
            .enumerate()
            .map(|(i, _)| format!("?{}", i + 1))
            .collect::<Vec<_>>()
            .join(",");
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "DELETE FROM media_cache WHERE id IN ({})",
            placeholders
        ))?;
        let params_vec = ids
            .iter()
            .map(|id| id as &dyn rusqlite::ToSql)
            .collect::<Vec<_>>();
        stmt.execute(rusqlite::params_from_iter(params_vec))?;
        Ok(())
    }
}

fn view_record_from_row(row: &Row<'_>) -> rusqlite::Result<ViewRecord> {
    let recorded: i64 = row.get(1)?;
    Ok(ViewRecord {
        post_id: row.get(0)?,
        recorded_at: Utc
            .timestamp_opt(recorded, 0)
            .single()
            .unwrap_or_else(Utc::now),
    })
}

fn media_entry_from_row(row: &Row<'_>) -> rusqlite::Result<MediaEntry> {
    let fetched: i64 = row.get(7)?;
    let expires: Option<i64> = row.get(8)?;
    Ok(MediaEntry {
        id: row.get(0)?,
        url: row.get(1)?,
        media_type: row.get(2)?,
        file_path: row.get(3)?,
        width: row.get(4)?,
        height: row.get(5)?,
        size_bytes: row.get(6)?,
        fetched_at: Utc
            .timestamp_opt(fetched, 0)
            .single()
            .unwrap_or_else(Utc::now),
        expires_at: expires.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        checksum: row.get(9)?,
    })
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at INTEGER NOT NULL
)
"#,
        [],
    )?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    let migrations = migrations();
    for (idx, sql) in migrations.iter().enumerate() {
        let version = (idx + 1) as i64;
        if version <= current {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![
                version,
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or(Duration::from_secs(0))
                    .as_secs() as i64,
            ],
        )?;
    }
    Ok(())
}

fn migrations() -> Vec<&'static str> {
    vec![
        r#"
CREATE TABLE IF NOT EXISTS media_cache (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  url TEXT NOT NULL UNIQUE,
  media_type TEXT NOT NULL,
  file_path TEXT NOT NULL,
  width INTEGER,
  height INTEGER,
  size_bytes INTEGER,
  fetched_at INTEGER NOT NULL,
  expires_at INTEGER,
  checksum TEXT
);

CREATE INDEX IF NOT EXISTS idx_media_cache_fetched_at ON media_cache(fetched_at);
CREATE INDEX IF NOT EXISTS idx_media_cache_expires_at ON media_cache(expires_at);

CREATE TABLE IF NOT EXISTS view_log (
  post_id TEXT PRIMARY KEY,
  recorded_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_view_log_recorded_at ON view_log(recorded_at);
"#,
    ]
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("clipdeck").join("state.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");
        let store = Store::open(Options {
            path: Some(path.clone()),
        })
        .unwrap();
        assert!(path.exists());
        store.close().unwrap();
    }

    #[test]
    fn view_log_round_trip_and_prune() {
        let dir = tempdir().unwrap();
        let store = Store::open(Options {
            path: Some(dir.path().join("state.db")),
        })
        .unwrap();

        let now = Utc::now();
        store.record_view("p1", now - chrono::Duration::minutes(5)).unwrap();
        store.record_view("p2", now - chrono::Duration::hours(6)).unwrap();

        let cutoff = now - chrono::Duration::hours(3);
        let recent = store.recent_views(cutoff).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].post_id, "p1");

        assert_eq!(store.prune_views(cutoff).unwrap(), 1);
        assert!(store.recent_views(now - chrono::Duration::days(30)).unwrap().len() == 1);
    }

    #[test]
    fn record_view_updates_existing_row() {
        let dir = tempdir().unwrap();
        let store = Store::open(Options {
            path: Some(dir.path().join("state.db")),
        })
        .unwrap();

        let first = Utc::now() - chrono::Duration::hours(1);
        let second = Utc::now();
        store.record_view("p1", first).unwrap();
        store.record_view("p1", second).unwrap();

        let recent = store.recent_views(Utc::now() - chrono::Duration::days(1)).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].recorded_at.timestamp(), second.timestamp());
    }

    #[test]
    fn media_cache_round_trip() {
        let dir = tempdir().unwrap();
        let store = Store::open(Options {
            path: Some(dir.path().join("state.db")),
        })
        .unwrap();

        let entry = MediaEntry {
            id: 0,
            url: "https://cdn.example/thumb.jpg".into(),
            media_type: "image/jpeg".into(),
            file_path: "/tmp/thumb.jpg".into(),
            width: 320,
            height: 180,
            size_bytes: 1024,
            fetched_at: Utc::now(),
            expires_at: None,
            checksum: "abc".into(),
        };
        let id = store.upsert_media_entry(entry.clone()).unwrap();
        assert!(id > 0);

        let loaded = store
            .get_media_entry_by_url("https://cdn.example/thumb.jpg")
            .unwrap()
            .unwrap();
        assert_eq!(loaded.size_bytes, 1024);
        assert_eq!(store.total_media_size().unwrap(), 1024);
    }
}
