//! Offline tile storage.
//!
//! Two layouts are supported: a single SQLite file with a `tiles` table keyed
//! by `(zoom, x, y, server)` plus a `server` table of known server URLs, and a
//! plain directory tree `{root}/{server_dir}/{zoom}/{x}/{y}.png`.
//!
//! Stores are opened once per thread; SQLite connections are not shared.

use crate::core::config::StorageConfig;
use crate::core::geo::TileCoord;
use crate::tiles::source::TileServer;
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long a connection waits on another writer before reporting busy.
const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Another connection holds the lock; worth retrying later
    #[error("tile store is busy: {0}")]
    Busy(rusqlite::Error),

    #[error("tile store query failed: {0}")]
    Sqlite(rusqlite::Error),

    #[error("tile store IO failed: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Busy(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(failure.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                StoreError::Busy(err)
            }
            _ => StoreError::Sqlite(err),
        }
    }
}

/// Persistent tile storage as seen by one thread.
pub trait TileStore: Send {
    /// Raw image bytes of a tile, `None` when the store does not have it
    fn load(&self, server: &TileServer, coord: TileCoord) -> Result<Option<Vec<u8>>, StoreError>;

    /// Persists raw image bytes
    fn save(&self, server: &TileServer, coord: TileCoord, bytes: &[u8]) -> Result<(), StoreError>;

    /// Records a server the store holds tiles for
    fn register_server(&self, _server: &TileServer) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Opens the configured store for the calling thread.
///
/// `create` prepares the database schema (or root directory) and is meant for
/// the single owner thread; workers open with `create == false` and simply get
/// no store when nothing exists yet.
pub fn open_store(config: &StorageConfig, create: bool) -> Result<Option<Box<dyn TileStore>>, StoreError> {
    match config {
        StorageConfig::None => Ok(None),
        StorageConfig::Database { path } => {
            if create {
                Ok(Some(Box::new(SqliteTileStore::create(path)?)))
            } else if path.exists() {
                Ok(Some(Box::new(SqliteTileStore::open(path)?)))
            } else {
                Ok(None)
            }
        }
        StorageConfig::Files { root } => {
            if create {
                std::fs::create_dir_all(root)?;
            }
            Ok(Some(Box::new(FileTileStore::new(root.clone()))))
        }
    }
}

/// Tiles stored in a single SQLite file.
#[derive(Debug)]
pub struct SqliteTileStore {
    conn: Connection,
}

impl SqliteTileStore {
    /// Opens (creating if needed) the database and its schema
    pub fn create(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS server (
                url      TEXT PRIMARY KEY,
                max_zoom INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS tiles (
                zoom       INTEGER NOT NULL,
                x          INTEGER NOT NULL,
                y          INTEGER NOT NULL,
                server     TEXT NOT NULL,
                tile_image BLOB,
                PRIMARY KEY (zoom, x, y, server)
            );",
        )?;
        log::debug!("opened tile database {}", path.display());
        Ok(Self { conn })
    }

    /// Opens an existing database without touching its schema
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self { conn })
    }

    /// Server URLs recorded in the database with their max zoom
    pub fn servers(&self) -> Result<Vec<(String, u8)>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT url, max_zoom FROM server ORDER BY url")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u8>(1)?)))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl TileStore for SqliteTileStore {
    fn load(&self, server: &TileServer, coord: TileCoord) -> Result<Option<Vec<u8>>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT tile_image FROM tiles WHERE zoom=?1 AND x=?2 AND y=?3 AND server=?4",
        )?;
        let bytes = stmt
            .query_row(
                params![coord.z, coord.x, coord.y, server.url_template],
                |row| row.get::<_, Option<Vec<u8>>>(0),
            )
            .optional()?;
        Ok(bytes.flatten())
    }

    fn save(&self, server: &TileServer, coord: TileCoord, bytes: &[u8]) -> Result<(), StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR REPLACE INTO tiles (zoom, x, y, server, tile_image) VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        stmt.execute(params![coord.z, coord.x, coord.y, server.url_template, bytes])?;
        Ok(())
    }

    fn register_server(&self, server: &TileServer) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO server (url, max_zoom) VALUES (?1, ?2)",
            params![server.url_template, server.max_zoom],
        )?;
        Ok(())
    }
}

/// Tiles stored as `{root}/{server_dir}/{zoom}/{x}/{y}.png`.
#[derive(Debug, Clone)]
pub struct FileTileStore {
    root: PathBuf,
}

impl FileTileStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn tile_path(&self, server: &TileServer, coord: TileCoord) -> PathBuf {
        self.root
            .join(&server.dir_name)
            .join(coord.z.to_string())
            .join(coord.x.to_string())
            .join(format!("{}.png", coord.y))
    }
}

impl TileStore for FileTileStore {
    fn load(&self, server: &TileServer, coord: TileCoord) -> Result<Option<Vec<u8>>, StoreError> {
        match std::fs::read(self.tile_path(server, coord)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, server: &TileServer, coord: TileCoord, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.tile_path(server, coord);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiles.db");
        let server = TileServer::openstreetmap();
        let coord = TileCoord::new(96470, 40519, 17);

        let store = SqliteTileStore::create(&path).unwrap();
        assert_eq!(store.load(&server, coord).unwrap(), None);

        store.save(&server, coord, &[1, 2, 3]).unwrap();
        assert_eq!(store.load(&server, coord).unwrap(), Some(vec![1, 2, 3]));

        // same position, different server
        let other = TileServer::google_normal();
        assert_eq!(store.load(&other, coord).unwrap(), None);

        // a second connection sees the data without recreating the schema
        let reader = SqliteTileStore::open(&path).unwrap();
        assert_eq!(reader.load(&server, coord).unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_sqlite_registers_servers() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteTileStore::create(&dir.path().join("tiles.db")).unwrap();
        store.register_server(&TileServer::openstreetmap()).unwrap();
        store.register_server(&TileServer::openstreetmap()).unwrap();

        let servers = store.servers().unwrap();
        assert_eq!(
            servers,
            vec![("https://a.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(), 19)]
        );
    }

    #[test]
    fn test_file_store_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTileStore::new(dir.path().to_path_buf());
        let server = TileServer::openstreetmap();
        let coord = TileCoord::new(5, 9, 4);

        assert_eq!(
            store.tile_path(&server, coord),
            dir.path().join("OpenStreetMap").join("4").join("5").join("9.png")
        );
        assert_eq!(store.load(&server, coord).unwrap(), None);

        store.save(&server, coord, b"png").unwrap();
        assert_eq!(store.load(&server, coord).unwrap(), Some(b"png".to_vec()));
    }

    #[test]
    fn test_open_store_without_database_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig::Database {
            path: dir.path().join("missing.db"),
        };
        assert!(open_store(&config, false).unwrap().is_none());
        assert!(open_store(&config, true).unwrap().is_some());
        assert!(open_store(&config, false).unwrap().is_some());
        assert!(open_store(&StorageConfig::None, true).unwrap().is_none());
    }

    #[test]
    fn test_busy_is_transient() {
        let busy = rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY), None);
        assert!(StoreError::from(busy).is_transient());

        let other = rusqlite::Error::QueryReturnedNoRows;
        assert!(!StoreError::from(other).is_transient());
    }
}
