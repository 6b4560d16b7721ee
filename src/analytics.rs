//! Usage metrics stored in a local SQLite database.
//!
//! Best-effort by design: recording failures are logged and swallowed so
//! analytics can never take the bot down.

use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::error;

#[derive(Debug, Default, Clone)]
pub struct Metrics {
    /// Requests in the last minute.
    pub rpm: i64,
    /// Tokens in the last minute.
    pub tpm: i64,
    /// Requests today.
    pub rpd: i64,
    /// Today's requests grouped by request type.
    pub breakdown: HashMap<String, i64>,
}

pub struct Analytics {
    conn: Mutex<Connection>,
}

impl Analytics {
    pub fn open(path: impl AsRef<Path>) -> rusqlite::Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> rusqlite::Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
                tokens INTEGER DEFAULT 0,
                request_type TEXT
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn log_request(&self, user_id: i64, tokens: i64, request_type: &str) {
        let Ok(conn) = self.conn.lock() else {
            error!("Analytics lock poisoned");
            return;
        };
        if let Err(e) = conn.execute(
            "INSERT INTO metrics (user_id, tokens, request_type) VALUES (?1, ?2, ?3)",
            params![user_id.to_string(), tokens, request_type],
        ) {
            error!("Analytics log error: {e}");
        }
    }

    pub fn current_metrics(&self) -> Metrics {
        let Ok(conn) = self.conn.lock() else {
            error!("Analytics lock poisoned");
            return Metrics::default();
        };

        match Self::query_metrics(&conn) {
            Ok(metrics) => metrics,
            Err(e) => {
                error!("Analytics metrics error: {e}");
                Metrics::default()
            }
        }
    }

    fn query_metrics(conn: &Connection) -> rusqlite::Result<Metrics> {
        let rpm = conn.query_row(
            "SELECT COUNT(*) FROM metrics WHERE timestamp > datetime('now', '-1 minute')",
            [],
            |row| row.get(0),
        )?;
        let tpm = conn.query_row(
            "SELECT COALESCE(SUM(tokens), 0) FROM metrics
             WHERE timestamp > datetime('now', '-1 minute')",
            [],
            |row| row.get(0),
        )?;
        let rpd = conn.query_row(
            "SELECT COUNT(*) FROM metrics WHERE DATE(timestamp) = DATE('now')",
            [],
            |row| row.get(0),
        )?;

        let mut breakdown = HashMap::new();
        let mut stmt = conn.prepare(
            "SELECT request_type, COUNT(*) FROM metrics
             WHERE DATE(timestamp) = DATE('now')
             GROUP BY request_type",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (kind, count) = row?;
            breakdown.insert(kind, count);
        }

        Ok(Metrics {
            rpm,
            tpm,
            rpd,
            breakdown,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_aggregates_requests() -> rusqlite::Result<()> {
        let analytics = Analytics::open_in_memory()?;
        analytics.log_request(1, 120, "chat");
        analytics.log_request(1, 30, "chat");
        analytics.log_request(2, 8, "image_generation");

        let metrics = analytics.current_metrics();
        assert_eq!(metrics.rpm, 3);
        assert_eq!(metrics.tpm, 158);
        assert_eq!(metrics.rpd, 3);
        assert_eq!(metrics.breakdown.get("chat"), Some(&2));
        assert_eq!(metrics.breakdown.get("image_generation"), Some(&1));
        Ok(())
    }

    #[test]
    fn empty_database_yields_zeroes() -> rusqlite::Result<()> {
        let analytics = Analytics::open_in_memory()?;
        let metrics = analytics.current_metrics();
        assert_eq!(metrics.rpm, 0);
        assert_eq!(metrics.tpm, 0);
        assert_eq!(metrics.rpd, 0);
        assert!(metrics.breakdown.is_empty());
        Ok(())
    }
}
