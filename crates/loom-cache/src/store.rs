//! The SQLite-backed build cache store.
//!
//! One handle owns the connection; prepared statements are created lazily
//! through the connection's statement cache and released when the handle is
//! dropped. On open the store applies WAL mode, creates missing tables, and
//! compares the stored schema version: a mismatch clears every data row, and
//! a corrupt container is deleted and recreated exactly once.

use crate::codec::{deserialize_parse_result, serialize_parse_result};
use loom_core::hash::hash_file;
use loom_core::{Error, ErrorCode, Result};
use loom_lang::ParseResult;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Bumped whenever the on-disk layout changes; a mismatch wipes the cache.
const SCHEMA_VERSION: &str = "1";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS schema_info (
  key TEXT PRIMARY KEY,
  value TEXT
);
CREATE TABLE IF NOT EXISTS file_stat (
  path TEXT PRIMARY KEY,
  inode INTEGER,
  mtime_sec INTEGER,
  mtime_nsec INTEGER,
  size INTEGER,
  content_hash TEXT
);
CREATE TABLE IF NOT EXISTS parse_result (
  content_hash TEXT PRIMARY KEY,
  serialized BLOB,
  created_at INTEGER
);
CREATE TABLE IF NOT EXISTS include_dep (
  source_hash TEXT,
  include_path TEXT,
  include_hash TEXT,
  PRIMARY KEY (source_hash, include_path)
);
CREATE INDEX IF NOT EXISTS include_dep_reverse ON include_dep (include_hash);
CREATE TABLE IF NOT EXISTS dep_edge (
  source_hash TEXT,
  source_unit TEXT,
  target_unit TEXT,
  PRIMARY KEY (source_hash, source_unit, target_unit)
);
CREATE TABLE IF NOT EXISTS filelist (
  filelist_key TEXT PRIMARY KEY,
  file_list TEXT,
  top_modules TEXT,
  created_at INTEGER
);
";

/// Stat-identity snapshot of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatEntry {
    pub path: String,
    pub inode: u64,
    pub mtime_sec: i64,
    pub mtime_nsec: i64,
    pub size: i64,
    pub content_hash: String,
}

/// One include-graph edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeDepEntry {
    pub source_hash: String,
    /// The include path literal as written in the source.
    pub include_path: String,
    pub include_hash: String,
}

/// One design-unit dependency edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepEdgeEntry {
    pub source_hash: String,
    pub source_unit: String,
    pub target_unit: String,
}

/// A cached filelist snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilelistEntry {
    pub filelist_key: String,
    pub file_list: Vec<String>,
    pub top_modules: Vec<String>,
    pub created_at: i64,
}

/// Row counts and approximate size of the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub file_stat_count: i64,
    pub parse_result_count: i64,
    pub include_dep_count: i64,
    pub dep_edge_count: i64,
    pub filelist_count: i64,
    pub total_bytes: i64,
}

fn db_err(context: &str, e: rusqlite::Error) -> Error {
    Error::new(ErrorCode::Io, format!("{context}: {e}"))
}

fn now_epoch_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn join_list(items: &[String]) -> String {
    items.join(",")
}

fn split_list(s: &str) -> Vec<String> {
    if s.is_empty() {
        return Vec::new();
    }
    s.split(',').map(ToString::to_string).collect()
}

#[cfg(unix)]
fn stat_identity(path: &Path) -> Result<(u64, i64, i64, i64)> {
    use std::os::unix::fs::MetadataExt;
    let meta = std::fs::metadata(path)?;
    Ok((meta.ino(), meta.mtime(), meta.mtime_nsec(), meta.size() as i64))
}

#[cfg(not(unix))]
fn stat_identity(path: &Path) -> Result<(u64, i64, i64, i64)> {
    let meta = std::fs::metadata(path)?;
    let mtime = meta
        .modified()?
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    Ok((0, mtime.as_secs() as i64, i64::from(mtime.subsec_nanos()), meta.len() as i64))
}

/// The build cache handle.
pub struct BuildCache {
    conn: Connection,
    path: PathBuf,
}

impl BuildCache {
    /// Default store path: `$HOME/.loom/cache/loom_cache.db`, with `/tmp`
    /// standing in when `HOME` is unset.
    #[must_use]
    pub fn default_path() -> PathBuf {
        let home = std::env::var_os("HOME")
            .map_or_else(|| PathBuf::from("/tmp"), PathBuf::from);
        home.join(".loom").join("cache").join("loom_cache.db")
    }

    /// Open (or create) the store at `path`.
    ///
    /// A failing setup deletes the database files and retries once; a second
    /// failure surfaces as an `Io` error.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error when the store cannot be created even after
    /// recovery.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::new(
                        ErrorCode::Io,
                        format!("failed to create cache directory {}: {e}", parent.display()),
                    )
                })?;
            }
        }

        match Self::try_open(path) {
            Ok(cache) => Ok(cache),
            Err(first) => {
                // Corrupt container: delete data, WAL, and shared-memory
                // sidecars, then redo the setup exactly once.
                warn!("cache store unusable ({first}); recreating");
                let _ = std::fs::remove_file(path);
                let _ = std::fs::remove_file(sidecar(path, "-wal"));
                let _ = std::fs::remove_file(sidecar(path, "-shm"));
                Self::try_open(path)
                    .map_err(|e| Error::new(ErrorCode::Io, format!("failed to recreate cache: {e}")))
            }
        }
    }

    fn try_open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| db_err("failed to open cache database", e))?;

        // journal_mode returns a row; the result value is irrelevant here.
        let _ = conn.execute("PRAGMA journal_mode = WAL", []);
        conn.execute_batch("PRAGMA synchronous = NORMAL; PRAGMA cache_size = 10000;")
            .map_err(|e| db_err("failed to apply pragmas", e))?;

        let cache = Self {
            conn,
            path: path.to_path_buf(),
        };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .map_err(|e| db_err("failed to create schema", e))?;

        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM schema_info WHERE key = 'version'",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| db_err("failed to read schema version", e))?;

        match stored {
            Some(version) if version == SCHEMA_VERSION => {}
            Some(version) => {
                debug!("cache schema {version} != {SCHEMA_VERSION}, clearing");
                self.clear()?;
                self.write_version()?;
            }
            None => self.write_version()?,
        }
        Ok(())
    }

    fn write_version(&self) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?1)",
                params![SCHEMA_VERSION],
            )
            .map_err(|e| db_err("failed to write schema version", e))?;
        Ok(())
    }

    /// The database file backing this handle.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ---- stat cache ----

    /// Look up the stat record for a path.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when there is no record.
    pub fn lookup_stat(&self, path: &str) -> Result<FileStatEntry> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT path, inode, mtime_sec, mtime_nsec, size, content_hash \
                 FROM file_stat WHERE path = ?1",
            )
            .map_err(|e| db_err("prepare stat lookup", e))?;

        stmt.query_row(params![path], |row| {
            Ok(FileStatEntry {
                path: row.get(0)?,
                inode: row.get::<_, i64>(1)? as u64,
                mtime_sec: row.get(2)?,
                mtime_nsec: row.get(3)?,
                size: row.get(4)?,
                content_hash: row.get(5)?,
            })
        })
        .optional()
        .map_err(|e| db_err("stat lookup", e))?
        .ok_or_else(|| Error::new(ErrorCode::NotFound, format!("no stat entry for: {path}")))
    }

    /// Insert or replace a stat record.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error on store failure.
    pub fn update_stat(&self, entry: &FileStatEntry) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "INSERT OR REPLACE INTO file_stat \
                 (path, inode, mtime_sec, mtime_nsec, size, content_hash) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .map_err(|e| db_err("prepare stat update", e))?;

        stmt.execute(params![
            entry.path,
            entry.inode as i64,
            entry.mtime_sec,
            entry.mtime_nsec,
            entry.size,
            entry.content_hash,
        ])
        .map_err(|e| db_err("failed to update stat", e))?;
        Ok(())
    }

    /// Remove the stat record for a path, if any.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error on store failure.
    pub fn remove_stat(&self, path: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM file_stat WHERE path = ?1", params![path])
            .map_err(|e| db_err("failed to remove stat", e))?;
        Ok(())
    }

    /// Content hash of a file, from the stat cache when (inode, mtime,
    /// size) are unchanged, otherwise recomputed and stored.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error when the file cannot be resolved or read.
    pub fn cached_file_hash(&self, path: &Path) -> Result<String> {
        let canonical = path.canonicalize().map_err(|_| {
            Error::new(
                ErrorCode::Io,
                format!("cannot resolve path: {}", path.display()),
            )
        })?;
        let key = canonical.to_string_lossy().into_owned();

        let (inode, mtime_sec, mtime_nsec, size) = stat_identity(&canonical)?;

        if let Ok(entry) = self.lookup_stat(&key) {
            if entry.inode == inode
                && entry.mtime_sec == mtime_sec
                && entry.mtime_nsec == mtime_nsec
                && entry.size == size
            {
                return Ok(entry.content_hash);
            }
        }

        let content_hash = hash_file(&canonical)?;
        self.update_stat(&FileStatEntry {
            path: key,
            inode,
            mtime_sec,
            mtime_nsec,
            size,
            content_hash: content_hash.clone(),
        })?;
        Ok(content_hash)
    }

    // ---- parse cache ----

    /// Look up the cached parse result for a content hash.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when absent, `Checksum` for wrong blob magic, and
    /// `Io` for a truncated blob.
    pub fn lookup_parse(&self, content_hash: &str) -> Result<ParseResult> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT serialized FROM parse_result WHERE content_hash = ?1")
            .map_err(|e| db_err("prepare parse lookup", e))?;

        let blob: Option<Vec<u8>> = stmt
            .query_row(params![content_hash], |row| row.get(0))
            .optional()
            .map_err(|e| db_err("parse lookup", e))?;

        match blob {
            Some(blob) => deserialize_parse_result(&blob),
            None => Err(Error::new(
                ErrorCode::NotFound,
                format!("no parse cache for: {content_hash}"),
            )),
        }
    }

    /// Store a parse result under a content hash.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error on store failure.
    pub fn store_parse(&self, content_hash: &str, result: &ParseResult) -> Result<()> {
        let blob = serialize_parse_result(result);
        let mut stmt = self
            .conn
            .prepare_cached(
                "INSERT OR REPLACE INTO parse_result (content_hash, serialized, created_at) \
                 VALUES (?1, ?2, ?3)",
            )
            .map_err(|e| db_err("prepare parse store", e))?;

        stmt.execute(params![content_hash, blob, now_epoch_secs()])
            .map_err(|e| db_err("failed to store parse result", e))?;
        Ok(())
    }

    // ---- include graph ----

    /// All include edges of one source file.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error on store failure.
    pub fn get_includes(&self, source_hash: &str) -> Result<Vec<IncludeDepEntry>> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT source_hash, include_path, include_hash \
                 FROM include_dep WHERE source_hash = ?1",
            )
            .map_err(|e| db_err("prepare include lookup", e))?;

        let rows = stmt
            .query_map(params![source_hash], |row| {
                Ok(IncludeDepEntry {
                    source_hash: row.get(0)?,
                    include_path: row.get(1)?,
                    include_hash: row.get(2)?,
                })
            })
            .map_err(|e| db_err("include lookup", e))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("include lookup", e))
    }

    /// Replace the include edges of one source file.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error on store failure.
    pub fn store_includes(&mut self, source_hash: &str, deps: &[IncludeDepEntry]) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| db_err("begin include store", e))?;

        tx.execute(
            "DELETE FROM include_dep WHERE source_hash = ?1",
            params![source_hash],
        )
        .map_err(|e| db_err("failed to clear include deps", e))?;

        for dep in deps {
            tx.execute(
                "INSERT INTO include_dep (source_hash, include_path, include_hash) \
                 VALUES (?1, ?2, ?3)",
                params![dep.source_hash, dep.include_path, dep.include_hash],
            )
            .map_err(|e| db_err("failed to insert include dep", e))?;
        }

        tx.commit().map_err(|e| db_err("commit include store", e))
    }

    /// Reverse index: all source hashes that include a given content hash.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error on store failure.
    pub fn find_includers(&self, include_hash: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT DISTINCT source_hash FROM include_dep WHERE include_hash = ?1",
            )
            .map_err(|e| db_err("prepare includer lookup", e))?;

        let rows = stmt
            .query_map(params![include_hash], |row| row.get::<_, String>(0))
            .map_err(|e| db_err("includer lookup", e))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("includer lookup", e))
    }

    // ---- design-unit edges ----

    /// All design-unit edges of one source file.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error on store failure.
    pub fn get_edges(&self, source_hash: &str) -> Result<Vec<DepEdgeEntry>> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT source_hash, source_unit, target_unit \
                 FROM dep_edge WHERE source_hash = ?1",
            )
            .map_err(|e| db_err("prepare edge lookup", e))?;

        let rows = stmt
            .query_map(params![source_hash], |row| {
                Ok(DepEdgeEntry {
                    source_hash: row.get(0)?,
                    source_unit: row.get(1)?,
                    target_unit: row.get(2)?,
                })
            })
            .map_err(|e| db_err("edge lookup", e))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("edge lookup", e))
    }

    /// Replace the design-unit edges of one source file.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error on store failure.
    pub fn store_edges(&mut self, source_hash: &str, edges: &[DepEdgeEntry]) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| db_err("begin edge store", e))?;

        tx.execute(
            "DELETE FROM dep_edge WHERE source_hash = ?1",
            params![source_hash],
        )
        .map_err(|e| db_err("failed to clear dep edges", e))?;

        for edge in edges {
            tx.execute(
                "INSERT OR REPLACE INTO dep_edge (source_hash, source_unit, target_unit) \
                 VALUES (?1, ?2, ?3)",
                params![edge.source_hash, edge.source_unit, edge.target_unit],
            )
            .map_err(|e| db_err("failed to insert dep edge", e))?;
        }

        tx.commit().map_err(|e| db_err("commit edge store", e))
    }

    // ---- filelist cache ----

    /// Look up a filelist snapshot by key.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when absent.
    pub fn lookup_filelist(&self, filelist_key: &str) -> Result<FilelistEntry> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT filelist_key, file_list, top_modules, created_at \
                 FROM filelist WHERE filelist_key = ?1",
            )
            .map_err(|e| db_err("prepare filelist lookup", e))?;

        stmt.query_row(params![filelist_key], |row| {
            Ok(FilelistEntry {
                filelist_key: row.get(0)?,
                file_list: split_list(&row.get::<_, String>(1)?),
                top_modules: split_list(&row.get::<_, String>(2)?),
                created_at: row.get(3)?,
            })
        })
        .optional()
        .map_err(|e| db_err("filelist lookup", e))?
        .ok_or_else(|| {
            Error::new(
                ErrorCode::NotFound,
                format!("no filelist cache for key: {filelist_key}"),
            )
        })
    }

    /// Store a filelist snapshot; `created_at` is stamped here.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error on store failure.
    pub fn store_filelist(&self, entry: &FilelistEntry) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "INSERT OR REPLACE INTO filelist \
                 (filelist_key, file_list, top_modules, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .map_err(|e| db_err("prepare filelist store", e))?;

        stmt.execute(params![
            entry.filelist_key,
            join_list(&entry.file_list),
            join_list(&entry.top_modules),
            now_epoch_secs(),
        ])
        .map_err(|e| db_err("failed to store filelist", e))?;
        Ok(())
    }

    // ---- maintenance ----

    /// Drop parse, include, and edge rows whose source hash is no longer
    /// referenced from the stat table.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error on store failure.
    pub fn prune(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "DELETE FROM parse_result WHERE content_hash NOT IN \
                   (SELECT content_hash FROM file_stat);\
                 DELETE FROM include_dep WHERE source_hash NOT IN \
                   (SELECT content_hash FROM file_stat);\
                 DELETE FROM dep_edge WHERE source_hash NOT IN \
                   (SELECT content_hash FROM file_stat);",
            )
            .map_err(|e| db_err("failed to prune cache", e))
    }

    /// Remove every data row, leaving the schema intact.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error on store failure.
    pub fn clear(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "DELETE FROM file_stat;\
                 DELETE FROM parse_result;\
                 DELETE FROM include_dep;\
                 DELETE FROM dep_edge;\
                 DELETE FROM filelist;",
            )
            .map_err(|e| db_err("failed to clear cache", e))
    }

    /// Reclaim space.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error on store failure.
    pub fn vacuum(&self) -> Result<()> {
        self.conn
            .execute_batch("VACUUM;")
            .map_err(|e| db_err("failed to vacuum cache", e))
    }

    /// Row counts per table plus the approximate store size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error on store failure.
    pub fn get_stats(&self) -> Result<CacheStats> {
        let count = |table: &str| -> Result<i64> {
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })
                .map_err(|e| db_err("failed to count rows", e))
        };

        let total_bytes = self
            .conn
            .query_row(
                "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        Ok(CacheStats {
            file_stat_count: count("file_stat")?,
            parse_result_count: count("parse_result")?,
            include_dep_count: count("include_dep")?,
            dep_edge_count: count("dep_edge")?,
            filelist_count: count("filelist")?,
            total_bytes,
        })
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}
