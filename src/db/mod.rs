use crate::error::DriveError;
use directories::ProjectDirs;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

mod auth;
mod settings;

pub use auth::{AuthTokenRecord, AUTH_TABLE_SCHEMA};
pub use settings::SETTINGS_TABLE_SCHEMA;

const QUALIFIER: &str = "com";
const ORGANIZATION: &str = "Cloudbox";
const APPLICATION: &str = "Cloudbox";
const DB_FILE_NAME: &str = "cloudbox.db";

pub type StorageResult<T> = Result<T, DriveError>;

/// 本地 sqlite 数据库句柄：只保存路径，每次操作按需打开连接并确保表结构存在。
#[derive(Clone, Debug)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// 平台数据目录下的默认数据库。
    pub fn open_default() -> StorageResult<Self> {
        let dirs = ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION).ok_or_else(|| {
            DriveError::Storage("failed to resolve application data directory".to_string())
        })?;
        let database = Self::at(dirs.data_dir().join(DB_FILE_NAME));
        database.init()?;
        Ok(database)
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn init(&self) -> StorageResult<()> {
        self.with_connection(|_| Ok(()))
    }

    pub(crate) fn with_connection<T, F>(&self, operation: F) -> StorageResult<T>
    where
        F: FnOnce(&Connection) -> StorageResult<T>,
    {
        let conn = self.open_connection()?;
        operation(&conn)
    }

    fn open_connection(&self) -> StorageResult<Connection> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| {
                DriveError::Storage(format!("failed to create database directory {dir:?}: {e}"))
            })?;
        }

        let conn = Connection::open(&self.path)
            .map_err(|e| DriveError::Storage(format!("failed to open SQLite database: {e}")))?;
        apply_migrations(&conn)?;
        Ok(conn)
    }
}

fn apply_migrations(conn: &Connection) -> StorageResult<()> {
    let schema = format!("{AUTH_TABLE_SCHEMA}\n{SETTINGS_TABLE_SCHEMA}");
    conn.execute_batch(&schema).map_err(|e| {
        DriveError::Storage(format!("failed to initialize database schema: {e}"))
    })?;
    Ok(())
}

pub(crate) fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}
