use rusqlite::{params, OptionalExtension};

use super::{current_timestamp_millis, Database, StorageResult};
use crate::error::DriveError;

// 凭据持久化：单行表，登录/刷新时覆盖，登出时删除。

pub const AUTH_TABLE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS auth_tokens (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    access_token TEXT NOT NULL,
    refresh_token TEXT,
    updated_at_millis INTEGER NOT NULL
);";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTokenRecord {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub updated_at_millis: i64,
}

impl AuthTokenRecord {
    pub fn new(access_token: String, refresh_token: Option<String>) -> Self {
        Self {
            access_token,
            refresh_token,
            updated_at_millis: current_timestamp_millis(),
        }
    }
}

impl Database {
    pub fn upsert_auth_record(&self, record: &AuthTokenRecord) -> StorageResult<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO auth_tokens (id, access_token, refresh_token, updated_at_millis)
                VALUES (1, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    access_token = excluded.access_token,
                    refresh_token = excluded.refresh_token,
                    updated_at_millis = excluded.updated_at_millis",
                params![
                    record.access_token,
                    record.refresh_token,
                    record.updated_at_millis,
                ],
            )
            .map_err(|e| DriveError::Storage(format!("failed to upsert auth tokens: {e}")))?;
            Ok(())
        })
    }

    pub fn load_auth_record(&self) -> StorageResult<Option<AuthTokenRecord>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT access_token, refresh_token, updated_at_millis
                FROM auth_tokens
                WHERE id = 1",
                [],
                |row| {
                    Ok(AuthTokenRecord {
                        access_token: row.get(0)?,
                        refresh_token: row.get(1)?,
                        updated_at_millis: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(|e| DriveError::Storage(format!("failed to read auth tokens: {e}")))
        })
    }

    pub fn clear_auth_record(&self) -> StorageResult<()> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM auth_tokens WHERE id = 1", [])
                .map_err(|e| DriveError::Storage(format!("failed to clear auth tokens: {e}")))?;
            Ok(())
        })
    }
}
