//! Password history: previous password hashes per user.

use chrono::Utc;
use rusqlite::params;

use vizalert_core::error::Result;
use vizalert_core::types::PasswordHistoryEntry;

use crate::persistence::{ReportDb, db_err, fmt_ts, parse_ts};

impl ReportDb {
    /// Remember `old_password` (a hash) as replaced now.
    pub fn record_password_change(&self, user_id: i64, old_password: Option<&str>) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO password_history (old_password, timestamp, user_id) VALUES (?1, ?2, ?3)",
            params![old_password, fmt_ts(&Utc::now()), user_id],
        )
        .map_err(db_err)?;
        tracing::debug!("🔑 Password history recorded for user {user_id}");
        Ok(conn.last_insert_rowid())
    }

    /// Newest first, at most `limit` entries.
    pub fn password_history(&self, user_id: i64, limit: usize) -> Result<Vec<PasswordHistoryEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, old_password, timestamp FROM password_history
                 WHERE user_id = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2",
            )
            .map_err(db_err)?;
        let rows: Vec<(i64, i64, Option<String>, String)> = stmt
            .query_map(params![user_id, limit as i64], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<_>>()
            .map_err(db_err)?;

        rows.into_iter()
            .map(|(id, user_id, old_password, timestamp)| {
                Ok(PasswordHistoryEntry {
                    id,
                    user_id,
                    old_password,
                    timestamp: parse_ts(&timestamp)?,
                })
            })
            .collect()
    }

    /// Whether `candidate` matches one of the last `depth` passwords.
    pub fn is_password_reused(&self, user_id: i64, candidate: &str, depth: usize) -> Result<bool> {
        Ok(self
            .password_history(user_id, depth)?
            .iter()
            .any(|entry| entry.old_password.as_deref() == Some(candidate)))
    }
}
