//! Session documents, many per user
use crate::memory_db::schema::Session;
use crate::memory_db::sql_timestamp;
use rusqlite::{params, Row};
use tracing::debug;
use std::sync::Arc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

pub struct SessionRecordStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl SessionRecordStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get()
            .map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    pub fn latest(&self, user_id: &str) -> anyhow::Result<Option<Session>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT document FROM sessions WHERE user_id = ?1
             ORDER BY updated_at DESC, rowid DESC LIMIT 1"
        )?;
        let mut rows = stmt.query([user_id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(Self::row_to_session(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn uncompressed(&self, user_id: &str, limit: usize) -> anyhow::Result<Vec<Session>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT document FROM sessions WHERE user_id = ?1 AND is_compressed = FALSE
             ORDER BY created_at DESC, rowid DESC LIMIT ?2"
        )?;
        let mut rows = stmt.query(params![user_id, limit as i64])?;
        let mut sessions = Vec::new();

        while let Some(row) = rows.next()? {
            sessions.push(Self::row_to_session(row)?);
        }

        Ok(sessions)
    }

    pub fn list(&self, user_id: &str) -> anyhow::Result<Vec<Session>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT document FROM sessions WHERE user_id = ?1
             ORDER BY updated_at DESC, rowid DESC"
        )?;
        let mut rows = stmt.query([user_id])?;
        let mut sessions = Vec::new();

        while let Some(row) = rows.next()? {
            sessions.push(Self::row_to_session(row)?);
        }

        Ok(sessions)
    }

    pub fn upsert(&self, session: &Session) -> anyhow::Result<()> {
        let conn = self.get_conn()?;
        let document = serde_json::to_string(session)?;

        debug!(
            "Upserting session {} for {} ({} messages, compressed: {})",
            session.id,
            session.user_id,
            session.messages.len(),
            session.is_compressed
        );

        conn.execute(
            "INSERT INTO sessions (id, user_id, is_compressed, created_at, updated_at, version, document)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                is_compressed = excluded.is_compressed,
                updated_at = excluded.updated_at,
                version = excluded.version,
                document = excluded.document",
            params![
                &session.id,
                &session.user_id,
                session.is_compressed,
                sql_timestamp(&session.created_at),
                sql_timestamp(&session.updated_at),
                session.version as i64,
                document,
            ],
        )?;

        Ok(())
    }

    fn row_to_session(row: &Row) -> anyhow::Result<Session> {
        let document: String = row.get(0)?;
        serde_json::from_str(&document)
            .map_err(|e| anyhow::anyhow!("Session JSON error: {}", e))
    }
}
