use crate::db::{self, DbPool};
use crate::error::ClientResult;
use bytes::Bytes;
use rusqlite::{params, OptionalExtension};
use std::path::{Path, PathBuf};

/// A stored response, replayed byte-for-byte on a cache hit.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// One named cache generation: a directory holding an index database of
/// request/response pairs keyed by method and absolute URL.
pub struct CacheStore {
    name: String,
    dir: PathBuf,
    pool: DbPool,
}

impl CacheStore {
    pub fn open(dir: &Path, name: &str) -> ClientResult<Self> {
        let pool = db::create_pool(&dir.join("index.db"))?;
        db::run_migrations(&pool)?;
        Ok(Self {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            pool,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Inserts or replaces the entry for (method, url).
    pub fn put(
        &self,
        method: &str,
        url: &str,
        status: u16,
        content_type: Option<&str>,
        body: &[u8],
    ) -> ClientResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT OR REPLACE INTO entries (method, url, status, content_type, body)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![method, url, status, content_type, body],
        )?;
        Ok(())
    }

    pub fn lookup(&self, method: &str, url: &str) -> ClientResult<Option<CachedResponse>> {
        let conn = self.pool.get()?;
        let entry = conn
            .query_row(
                "SELECT status, content_type, body FROM entries
                 WHERE method = ?1 AND url = ?2",
                params![method, url],
                |row| {
                    Ok(CachedResponse {
                        status: row.get(0)?,
                        content_type: row.get(1)?,
                        body: Bytes::from(row.get::<_, Vec<u8>>(2)?),
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    pub fn contains(&self, method: &str, url: &str) -> ClientResult<bool> {
        let conn = self.pool.get()?;
        let found: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM entries WHERE method = ?1 AND url = ?2",
            params![method, url],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    pub fn len(&self) -> ClientResult<usize> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
