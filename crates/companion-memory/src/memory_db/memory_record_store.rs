//! Long-term memory documents (facts, summaries, contradictions)
use crate::memory_db::schema::Memory;
use crate::memory_db::sql_timestamp;
use rusqlite::params;
use tracing::debug;
use std::sync::Arc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

pub struct MemoryRecordStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl MemoryRecordStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get()
            .map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    pub fn find(&self, user_id: &str) -> anyhow::Result<Option<Memory>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT document FROM memories WHERE user_id = ?1")?;
        let mut rows = stmt.query([user_id])?;

        if let Some(row) = rows.next()? {
            let document: String = row.get(0)?;
            let memory = serde_json::from_str(&document)
                .map_err(|e| anyhow::anyhow!("Memory JSON error for {}: {}", user_id, e))?;
            Ok(Some(memory))
        } else {
            Ok(None)
        }
    }

    pub fn upsert(&self, memory: &Memory) -> anyhow::Result<()> {
        let conn = self.get_conn()?;
        let document = serde_json::to_string(memory)?;

        debug!(
            "Upserting memory for {} ({} facts, {} summaries, {} contradictions)",
            memory.user_id,
            memory.facts.len(),
            memory.conversation_summaries.len(),
            memory.contradictions.len()
        );

        conn.execute(
            "INSERT INTO memories (user_id, document, version, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                document = excluded.document,
                version = excluded.version,
                updated_at = excluded.updated_at",
            params![
                &memory.user_id,
                document,
                memory.version as i64,
                sql_timestamp(&memory.updated_at),
            ],
        )?;

        Ok(())
    }
}
