//! User profile documents
use crate::memory_db::schema::UserProfile;
use crate::memory_db::sql_timestamp;
use rusqlite::params;
use tracing::debug;
use std::sync::Arc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

pub struct ProfileStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl ProfileStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get()
            .map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    pub fn find(&self, user_id: &str) -> anyhow::Result<Option<UserProfile>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT document FROM user_profiles WHERE user_id = ?1")?;
        let mut rows = stmt.query([user_id])?;

        if let Some(row) = rows.next()? {
            let document: String = row.get(0)?;
            let profile = serde_json::from_str(&document)
                .map_err(|e| anyhow::anyhow!("Profile JSON error for {}: {}", user_id, e))?;
            Ok(Some(profile))
        } else {
            Ok(None)
        }
    }

    pub fn upsert(&self, profile: &UserProfile) -> anyhow::Result<()> {
        let conn = self.get_conn()?;
        let document = serde_json::to_string(profile)?;

        debug!("Upserting profile {} (version {})", profile.user_id, profile.version);

        conn.execute(
            "INSERT INTO user_profiles (user_id, document, version, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                document = excluded.document,
                version = excluded.version,
                updated_at = excluded.updated_at",
            params![
                &profile.user_id,
                document,
                profile.version as i64,
                sql_timestamp(&profile.updated_at),
            ],
        )?;

        Ok(())
    }
}
