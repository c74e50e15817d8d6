//! Database migration system
//!
//! Each migration is a SQL batch applied once, in version order, inside its
//! own transaction. Applied versions are recorded in `schema_version`.

use rusqlite::{Connection, Result, OptionalExtension};
use tracing::{info, warn, error};

use crate::memory_db::schema;

/// Manages database schema migrations over a single borrowed connection
pub struct MigrationManager<'a> {
    conn: &'a mut Connection,
}

impl<'a> MigrationManager<'a> {
    /// Create a migration manager for an open connection
    pub fn new(conn: &'a mut Connection) -> Self {
        Self { conn }
    }

    /// Bring the database up to the latest schema version. Safe to call on
    /// every startup; already applied versions are skipped.
    pub fn initialize_database(&mut self) -> Result<()> {
        info!("Initializing companion database schema...");

        // Version bookkeeping table
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        // Anything newer than this gets applied
        let current_version = self.get_current_version()?;
        info!("Current database schema version: {}", current_version);

        self.apply_migrations(current_version)?;

        Ok(())
    }

    /// Apply pending migrations in ascending version order
    fn apply_migrations(&mut self, current_version: i32) -> Result<()> {
        for (version, migration_sql) in get_migrations().iter() {
            if *version > current_version {
                info!("Applying migration {}...", version);

                // One transaction per version
                let tx = self.conn.transaction()?;

                if let Err(e) = tx.execute_batch(migration_sql) {
                    error!("Failed to apply migration {}: {}", version, e);
                    return Err(e);
                }

                // Record migration
                tx.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    [version],
                )?;

                tx.commit()?;

                info!("Migration {} applied successfully", version);
            }
        }

        Ok(())
    }

    /// Highest applied version, 0 for a fresh database
    pub fn get_current_version(&self) -> Result<i32> {
        self.conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .or_else(|_| Ok(0))
    }

    /// Check if a specific migration has been applied
    pub fn has_migration_applied(&self, version: i32) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT 1 FROM schema_version WHERE version = ?",
                [version],
                |_| Ok(1),
            )
            .optional()
            .map(|result| result.is_some())
    }
}

/// Ordered `(version, sql)` pairs; append new versions, never edit old ones
fn get_migrations() -> Vec<(i32, &'static str)> {
    vec![
        (1, schema::SCHEMA_SQL),
    ]
}

/// Read-only row counts over the three collections
pub fn get_database_stats(conn: &Connection) -> Result<schema::DatabaseStats> {
    fn count(conn: &Connection, sql: &str) -> Result<i64> {
        conn.query_row(sql, [], |row| row.get(0))
            .or_else(|e| {
                warn!("Failed to run count query '{}': {}", sql, e);
                Ok(0)
            })
    }

    Ok(schema::DatabaseStats {
        total_profiles: count(conn, "SELECT COUNT(*) FROM user_profiles")?,
        total_memories: count(conn, "SELECT COUNT(*) FROM memories")?,
        total_sessions: count(conn, "SELECT COUNT(*) FROM sessions")?,
        compressed_sessions: count(conn, "SELECT COUNT(*) FROM sessions WHERE is_compressed = TRUE")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        {
            let mut migrator = MigrationManager::new(&mut conn);
            migrator.initialize_database().unwrap();
            assert_eq!(migrator.get_current_version().unwrap(), 1);
            assert!(migrator.has_migration_applied(1).unwrap());
        }
        let mut migrator = MigrationManager::new(&mut conn);
        migrator.initialize_database().unwrap();
        assert_eq!(migrator.get_current_version().unwrap(), 1);
    }

    #[test]
    fn test_stats_on_empty_database() {
        let mut conn = Connection::open_in_memory().unwrap();
        MigrationManager::new(&mut conn).initialize_database().unwrap();
        let stats = get_database_stats(&conn).unwrap();
        assert_eq!(stats.total_profiles, 0);
        assert_eq!(stats.total_sessions, 0);
    }
}
