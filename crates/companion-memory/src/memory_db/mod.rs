//! Memory database module - SQLite-based storage for profiles, long-term memory and sessions
pub mod schema;
pub mod migration;
pub mod profile_store;
pub mod memory_record_store;
pub mod session_record_store;
pub use schema::*;
pub use migration::MigrationManager;
pub use profile_store::ProfileStore;
pub use memory_record_store::MemoryRecordStore;
pub use session_record_store::SessionRecordStore;
use std::path::Path;
use std::sync::Arc;
use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::document_store::DocumentStore;

/// Fixed-width RFC 3339 so that lexical order in SQL matches time order.
pub(crate) fn sql_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Pooled SQLite database holding the three document collections
pub struct MemoryDatabase {
    pub profiles: ProfileStore,
    pub memories: MemoryRecordStore,
    pub sessions: SessionRecordStore,
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl MemoryDatabase {
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        info!("Opening companion database at: {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_FULL_MUTEX,
            );
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| anyhow::anyhow!("Failed to create connection pool: {}", e))?;

        {
            let mut conn = pool.get()?;
            let mut migrator = MigrationManager::new(&mut conn);
            migrator.initialize_database()?;
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;",
            )?;
        }
        info!("Companion database initialized successfully");
        Ok(Self::from_pool(pool))
    }

    /// Every pooled connection to `:memory:` is its own database, so the pool
    /// holds exactly one connection that never expires.
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;
        {
            let mut conn = pool.get()?;
            MigrationManager::new(&mut conn).initialize_database()?;
        }
        Ok(Self::from_pool(pool))
    }

    fn from_pool(pool: Pool<SqliteConnectionManager>) -> Self {
        let pool = Arc::new(pool);
        Self {
            profiles: ProfileStore::new(Arc::clone(&pool)),
            memories: MemoryRecordStore::new(Arc::clone(&pool)),
            sessions: SessionRecordStore::new(Arc::clone(&pool)),
            pool,
        }
    }

    pub fn get_stats(&self) -> anyhow::Result<DatabaseStats> {
        let conn = self.pool.get()?;
        Ok(migration::get_database_stats(&conn)?)
    }
}

impl DocumentStore for MemoryDatabase {
    fn find_profile(&self, user_id: &str) -> anyhow::Result<Option<UserProfile>> {
        self.profiles.find(user_id)
    }

    fn upsert_profile(&self, profile: &UserProfile) -> anyhow::Result<()> {
        self.profiles.upsert(profile)
    }

    fn find_memory(&self, user_id: &str) -> anyhow::Result<Option<Memory>> {
        self.memories.find(user_id)
    }

    fn upsert_memory(&self, memory: &Memory) -> anyhow::Result<()> {
        self.memories.upsert(memory)
    }

    fn latest_session(&self, user_id: &str) -> anyhow::Result<Option<Session>> {
        self.sessions.latest(user_id)
    }

    fn uncompressed_sessions(&self, user_id: &str, limit: usize) -> anyhow::Result<Vec<Session>> {
        self.sessions.uncompressed(user_id, limit)
    }

    fn list_sessions(&self, user_id: &str) -> anyhow::Result<Vec<Session>> {
        self.sessions.list(user_id)
    }

    fn upsert_session(&self, session: &Session) -> anyhow::Result<()> {
        self.sessions.upsert(session)
    }
}

impl Drop for MemoryDatabase {
    fn drop(&mut self) {
        if let Ok(conn) = self.pool.get() {
            let _ = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_profile_and_memory_roundtrip_through_sqlite() {
        let db = MemoryDatabase::new_in_memory().unwrap();
        let now = Utc::now();

        assert!(db.find_profile("u1").unwrap().is_none());

        let mut profile = UserProfile::new("u1", now);
        profile.name = Some("Sam".to_string());
        profile.touch(now);
        db.upsert_profile(&profile).unwrap();

        let mut memory = Memory::empty("u1", now);
        memory.facts.push(Fact {
            text: "User likes anime".to_string(),
            confidence: 0.5,
            last_mentioned: now,
            category: FactCategory::Preference,
        });
        memory.touch(now);
        db.upsert_memory(&memory).unwrap();
        memory.touch(now);
        db.upsert_memory(&memory).unwrap();

        assert_eq!(db.find_profile("u1").unwrap().unwrap().name.as_deref(), Some("Sam"));
        let stored = db.find_memory("u1").unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.facts.len(), 1);

        let stats = db.get_stats().unwrap();
        assert_eq!(stats.total_profiles, 1);
        assert_eq!(stats.total_memories, 1);
    }

    #[test]
    fn test_session_queries_order_by_time() {
        let db = MemoryDatabase::new_in_memory().unwrap();
        let now = Utc::now();

        let old = Session::new("u1", now - Duration::hours(3));
        let mut recent = Session::new("u1", now - Duration::hours(1));
        recent.updated_at = now;
        let mut compressed = Session::new("u1", now - Duration::minutes(30));
        compressed.is_compressed = true;
        for s in [&old, &recent, &compressed] {
            db.upsert_session(s).unwrap();
        }
        db.upsert_session(&Session::new("u2", now)).unwrap();

        assert_eq!(db.latest_session("u1").unwrap().unwrap().id, recent.id);

        let pending = db.uncompressed_sessions("u1", 20).unwrap();
        let ids: Vec<&str> = pending.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![recent.id.as_str(), old.id.as_str()]);

        assert_eq!(db.list_sessions("u1").unwrap().len(), 3);
        assert_eq!(db.get_stats().unwrap().compressed_sessions, 1);
    }

    #[test]
    fn test_file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("companion.db");
        let now = Utc::now();

        {
            let db = MemoryDatabase::new(&path).unwrap();
            db.upsert_profile(&UserProfile::new("u1", now)).unwrap();
        }

        let db = MemoryDatabase::new(&path).unwrap();
        assert!(db.find_profile("u1").unwrap().is_some());
    }
}
