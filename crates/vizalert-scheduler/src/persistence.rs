//! SQLite-backed persistence for report schedules, recipients and the
//! append-only execution log.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use vizalert_core::error::{Result, VizAlertError};
use vizalert_core::types::{
    Recipient, RecipientType, ReportExecutionLog, ReportFormat, ReportSchedule, ReportScheduleType, ReportState,
    ReportTarget, ValidatorType,
};

/// Message stored on the ERROR log row written after owners were notified.
pub const ERROR_NOTIFICATION_MARKER: &str = "Notification sent with error";

pub(crate) fn db_err(e: rusqlite::Error) -> VizAlertError {
    VizAlertError::Database(e.to_string())
}

/// Fixed-width UTC timestamps so stored values order lexicographically.
pub(crate) fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| VizAlertError::InvalidData(format!("bad timestamp '{raw}': {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn schedule_type_str(t: ReportScheduleType) -> &'static str {
    match t {
        ReportScheduleType::Alert => "Alert",
        ReportScheduleType::Report => "Report",
    }
}

fn validator_str(v: ValidatorType) -> &'static str {
    match v {
        ValidatorType::NotNull => "not null",
        ValidatorType::Operator => "operator",
    }
}

fn parse_validator(raw: &str) -> Result<ValidatorType> {
    match raw {
        "not null" => Ok(ValidatorType::NotNull),
        "operator" => Ok(ValidatorType::Operator),
        other => Err(VizAlertError::InvalidData(format!("unknown validator '{other}'"))),
    }
}

/// Raw `report_schedule` row before JSON columns are decoded.
struct ScheduleRow {
    id: i64,
    name: String,
    description: Option<String>,
    schedule_type: String,
    target_json: String,
    report_format: String,
    owners_json: String,
    created_by_json: Option<String>,
    changed_by_json: Option<String>,
    grace_period: i64,
    working_timeout: Option<i64>,
    last_state: Option<String>,
    last_eval_at: Option<String>,
    last_value: Option<f64>,
    last_value_row_json: Option<String>,
    force_screenshot: bool,
    extra_json: Option<String>,
    sql: Option<String>,
    database_id: Option<i64>,
    validator_type: Option<String>,
    validator_config_json: Option<String>,
}

impl ScheduleRow {
    fn into_schedule(self, recipients: Vec<Recipient>) -> Result<ReportSchedule> {
        let schedule_type = match self.schedule_type.as_str() {
            "Alert" => ReportScheduleType::Alert,
            "Report" => ReportScheduleType::Report,
            other => return Err(VizAlertError::InvalidData(format!("unknown schedule type '{other}'"))),
        };
        let target: ReportTarget = serde_json::from_str(&self.target_json)?;
        Ok(ReportSchedule {
            id: self.id,
            name: self.name,
            description: self.description,
            schedule_type,
            target,
            report_format: ReportFormat::parse(&self.report_format)?,
            recipients,
            owners: serde_json::from_str(&self.owners_json)?,
            created_by: self.created_by_json.as_deref().map(serde_json::from_str).transpose()?,
            changed_by: self.changed_by_json.as_deref().map(serde_json::from_str).transpose()?,
            grace_period: self.grace_period,
            working_timeout: self.working_timeout,
            last_state: self.last_state.as_deref().map(ReportState::parse).transpose()?,
            last_eval_at: self.last_eval_at.as_deref().map(parse_ts).transpose()?,
            last_value: self.last_value,
            last_value_row_json: self.last_value_row_json,
            force_screenshot: self.force_screenshot,
            extra: self
                .extra_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?
                .unwrap_or(serde_json::Value::Null),
            sql: self.sql,
            database_id: self.database_id,
            validator_type: self.validator_type.as_deref().map(parse_validator).transpose()?,
            validator_config_json: self.validator_config_json,
        })
    }
}

/// Raw `report_execution_log` row.
struct LogRow {
    id: i64,
    uuid: String,
    report_schedule_id: i64,
    scheduled_at: String,
    start_at: String,
    end_at: String,
    value: Option<f64>,
    value_row_json: Option<String>,
    state: String,
    error_message: Option<String>,
}

impl LogRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            uuid: row.get(1)?,
            report_schedule_id: row.get(2)?,
            scheduled_at: row.get(3)?,
            start_at: row.get(4)?,
            end_at: row.get(5)?,
            value: row.get(6)?,
            value_row_json: row.get(7)?,
            state: row.get(8)?,
            error_message: row.get(9)?,
        })
    }

    fn into_log(self) -> Result<ReportExecutionLog> {
        Ok(ReportExecutionLog {
            id: Some(self.id),
            uuid: Uuid::parse_str(&self.uuid)
                .map_err(|e| VizAlertError::InvalidData(format!("bad log uuid: {e}")))?,
            report_schedule_id: self.report_schedule_id,
            scheduled_at: parse_ts(&self.scheduled_at)?,
            start_at: parse_ts(&self.start_at)?,
            end_at: parse_ts(&self.end_at)?,
            value: self.value,
            value_row_json: self.value_row_json,
            state: ReportState::parse(&self.state)?,
            error_message: self.error_message,
        })
    }
}

const LOG_COLUMNS: &str = "id, uuid, report_schedule_id, scheduled_at, start_at, end_at, value, \
                           value_row_json, state, error_message";

const SCHEDULE_CONFIG_UPDATE: &str = "name = excluded.name, description = excluded.description, type = excluded.type,
    target_json = excluded.target_json, report_format = excluded.report_format,
    owners_json = excluded.owners_json, created_by_json = excluded.created_by_json,
    changed_by_json = excluded.changed_by_json, grace_period = excluded.grace_period,
    working_timeout = excluded.working_timeout, force_screenshot = excluded.force_screenshot,
    extra_json = excluded.extra_json, sql = excluded.sql, database_id = excluded.database_id,
    validator_type = excluded.validator_type, validator_config_json = excluded.validator_config_json";

const SCHEDULE_STATE_UPDATE: &str = "last_state = excluded.last_state, last_eval_at = excluded.last_eval_at,
    last_value = excluded.last_value, last_value_row_json = excluded.last_value_row_json";

/// SQLite-backed store for everything the execution engine persists.
///
/// The connection sits behind a mutex so the store can be shared across
/// tasks; every lock covers one statement or one transaction.
pub struct ReportDb {
    conn: Mutex<rusqlite::Connection>,
}

impl ReportDb {
    /// Open or create the database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = rusqlite::Connection::open(path).map_err(db_err)?;
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    /// Fresh in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(db_err)?;
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, rusqlite::Connection>> {
        self.conn
            .lock()
            .map_err(|_| VizAlertError::Database("connection lock poisoned".into()))
    }

    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS report_schedule (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                type TEXT NOT NULL,                 -- 'Alert' | 'Report'
                target_json TEXT NOT NULL,          -- chart or dashboard reference
                report_format TEXT NOT NULL,
                owners_json TEXT NOT NULL DEFAULT '[]',
                created_by_json TEXT,
                changed_by_json TEXT,
                grace_period INTEGER NOT NULL DEFAULT 14400,
                working_timeout INTEGER,
                last_state TEXT,
                last_eval_at TEXT,
                last_value REAL,
                last_value_row_json TEXT,
                force_screenshot INTEGER NOT NULL DEFAULT 0,
                extra_json TEXT,
                sql TEXT,
                database_id INTEGER,
                validator_type TEXT,
                validator_config_json TEXT
            );

            CREATE TABLE IF NOT EXISTS report_recipient (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                report_schedule_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                type TEXT NOT NULL,
                recipient_config_json TEXT NOT NULL,
                FOREIGN KEY (report_schedule_id) REFERENCES report_schedule(id) ON DELETE CASCADE
            );

            -- Append-only: one row per state transition.
            CREATE TABLE IF NOT EXISTS report_execution_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                uuid TEXT NOT NULL,
                report_schedule_id INTEGER NOT NULL,
                scheduled_at TEXT NOT NULL,
                start_at TEXT NOT NULL,
                end_at TEXT NOT NULL,
                value REAL,
                value_row_json TEXT,
                state TEXT NOT NULL,
                error_message TEXT,
                FOREIGN KEY (report_schedule_id) REFERENCES report_schedule(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_execution_log_schedule
                ON report_execution_log(report_schedule_id, end_at);

            CREATE TABLE IF NOT EXISTS password_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                old_password TEXT,
                timestamp TEXT NOT NULL,
                user_id INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_password_history_user
                ON password_history(user_id);
         ",
            )
            .map_err(|e| VizAlertError::Database(format!("Migration: {e}")))
    }

    // ─── Report Schedules ─────────────────────────────────────

    /// Insert or update a schedule, state columns included, and replace its
    /// recipients.
    pub fn save_schedule(&self, schedule: &ReportSchedule) -> Result<()> {
        self.upsert_schedule(schedule, true)
    }

    /// Insert or update a schedule's configuration. An existing schedule
    /// keeps its last state, evaluation time and value.
    pub fn save_schedule_config(&self, schedule: &ReportSchedule) -> Result<()> {
        self.upsert_schedule(schedule, false)
    }

    /// Remove a schedule; its recipients and execution log go with it.
    pub fn delete_schedule(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM report_schedule WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(deleted > 0)
    }

    fn upsert_schedule(&self, schedule: &ReportSchedule, with_state: bool) -> Result<()> {
        let on_conflict = if with_state {
            format!("{SCHEDULE_CONFIG_UPDATE}, {SCHEDULE_STATE_UPDATE}")
        } else {
            SCHEDULE_CONFIG_UPDATE.to_string()
        };
        let sql = format!(
            "INSERT INTO report_schedule
             (id, name, description, type, target_json, report_format, owners_json, created_by_json,
              changed_by_json, grace_period, working_timeout, last_state, last_eval_at, last_value,
              last_value_row_json, force_screenshot, extra_json, sql, database_id, validator_type,
              validator_config_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)
             ON CONFLICT(id) DO UPDATE SET {on_conflict}"
        );

        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute(
            &sql,
            params![
                schedule.id,
                schedule.name,
                schedule.description,
                schedule_type_str(schedule.schedule_type),
                to_json(&schedule.target)?,
                schedule.report_format.as_str(),
                to_json(&schedule.owners)?,
                schedule.created_by.as_ref().map(to_json).transpose()?,
                schedule.changed_by.as_ref().map(to_json).transpose()?,
                schedule.grace_period,
                schedule.working_timeout,
                schedule.last_state.map(|s| s.as_str()),
                schedule.last_eval_at.as_ref().map(fmt_ts),
                schedule.last_value,
                schedule.last_value_row_json,
                schedule.force_screenshot,
                if schedule.extra.is_null() { None } else { Some(to_json(&schedule.extra)?) },
                schedule.sql,
                schedule.database_id,
                schedule.validator_type.map(validator_str),
                schedule.validator_config_json,
            ],
        )
        .map_err(db_err)?;

        tx.execute(
            "DELETE FROM report_recipient WHERE report_schedule_id = ?1",
            params![schedule.id],
        )
        .map_err(db_err)?;
        for (position, recipient) in schedule.recipients.iter().enumerate() {
            tx.execute(
                "INSERT INTO report_recipient (report_schedule_id, position, type, recipient_config_json)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    schedule.id,
                    position as i64,
                    recipient.recipient_type.as_str(),
                    to_json(&recipient.config)?,
                ],
            )
            .map_err(db_err)?;
        }
        tx.commit().map_err(db_err)
    }

    /// Load a schedule with its ordered recipients.
    pub fn find_schedule(&self, id: i64) -> Result<Option<ReportSchedule>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, name, description, type, target_json, report_format, owners_json,
                        created_by_json, changed_by_json, grace_period, working_timeout, last_state,
                        last_eval_at, last_value, last_value_row_json, force_screenshot, extra_json,
                        sql, database_id, validator_type, validator_config_json
                 FROM report_schedule WHERE id = ?1",
                params![id],
                |row| {
                    Ok(ScheduleRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                        schedule_type: row.get(3)?,
                        target_json: row.get(4)?,
                        report_format: row.get(5)?,
                        owners_json: row.get(6)?,
                        created_by_json: row.get(7)?,
                        changed_by_json: row.get(8)?,
                        grace_period: row.get(9)?,
                        working_timeout: row.get(10)?,
                        last_state: row.get(11)?,
                        last_eval_at: row.get(12)?,
                        last_value: row.get(13)?,
                        last_value_row_json: row.get(14)?,
                        force_screenshot: row.get(15)?,
                        extra_json: row.get(16)?,
                        sql: row.get(17)?,
                        database_id: row.get(18)?,
                        validator_type: row.get(19)?,
                        validator_config_json: row.get(20)?,
                    })
                },
            )
            .optional()
            .map_err(db_err)?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare(
                "SELECT type, recipient_config_json FROM report_recipient
                 WHERE report_schedule_id = ?1 ORDER BY position",
            )
            .map_err(db_err)?;
        let raw: Vec<(String, String)> = stmt
            .query_map(params![id], |r| Ok((r.get(0)?, r.get(1)?)))
            .map_err(db_err)?
            .collect::<rusqlite::Result<_>>()
            .map_err(db_err)?;
        let recipients = raw
            .into_iter()
            .map(|(kind, config)| {
                Ok(Recipient {
                    recipient_type: RecipientType::parse(&kind)?,
                    config: serde_json::from_str(&config)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        row.into_schedule(recipients).map(Some)
    }

    pub fn list_schedule_ids(&self) -> Result<Vec<i64>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id FROM report_schedule ORDER BY id")
            .map_err(db_err)?;
        let ids = stmt
            .query_map([], |r| r.get(0))
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<i64>>>()
            .map_err(db_err)?;
        Ok(ids)
    }

    // ─── Transitions & Execution Log ─────────────────────────

    /// Persist the schedule's state fields and append `log`, atomically.
    pub fn record_transition(&self, schedule: &ReportSchedule, log: &ReportExecutionLog) -> Result<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err)?;
        let updated = tx
            .execute(
                "UPDATE report_schedule
                 SET last_state = ?1, last_eval_at = ?2, last_value = ?3, last_value_row_json = ?4
                 WHERE id = ?5",
                params![
                    schedule.last_state.map(|s| s.as_str()),
                    schedule.last_eval_at.as_ref().map(fmt_ts),
                    schedule.last_value,
                    schedule.last_value_row_json,
                    schedule.id,
                ],
            )
            .map_err(db_err)?;
        if updated == 0 {
            return Err(VizAlertError::Database(format!(
                "report schedule {} disappeared during execution",
                schedule.id
            )));
        }
        let id = Self::insert_log_in(&tx, log)?;
        tx.commit().map_err(db_err)?;
        Ok(id)
    }

    /// Append a log row outside of a transition.
    pub fn insert_log(&self, log: &ReportExecutionLog) -> Result<i64> {
        let conn = self.conn()?;
        Self::insert_log_in(&conn, log)
    }

    fn insert_log_in(conn: &rusqlite::Connection, log: &ReportExecutionLog) -> Result<i64> {
        conn.execute(
            "INSERT INTO report_execution_log
             (uuid, report_schedule_id, scheduled_at, start_at, end_at, value, value_row_json, state, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                log.uuid.to_string(),
                log.report_schedule_id,
                fmt_ts(&log.scheduled_at),
                fmt_ts(&log.start_at),
                fmt_ts(&log.end_at),
                log.value,
                log.value_row_json,
                log.state.as_str(),
                log.error_message,
            ],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    fn query_logs(&self, sql_tail: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<ReportExecutionLog>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {LOG_COLUMNS} FROM report_execution_log {sql_tail}"))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(args, LogRow::from_row)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        rows.into_iter().map(LogRow::into_log).collect()
    }

    fn last_log(&self, sql_where: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Option<ReportExecutionLog>> {
        let mut logs = self.query_logs(&format!("{sql_where} ORDER BY end_at DESC, id DESC LIMIT 1"), args)?;
        Ok(logs.pop())
    }

    /// All log rows of a schedule in insertion order.
    pub fn logs_for_schedule(&self, schedule_id: i64) -> Result<Vec<ReportExecutionLog>> {
        self.query_logs("WHERE report_schedule_id = ?1 ORDER BY id", &[&schedule_id])
    }

    /// Log rows written by one execution.
    pub fn logs_for_execution(&self, execution_id: Uuid) -> Result<Vec<ReportExecutionLog>> {
        self.query_logs("WHERE uuid = ?1 ORDER BY id", &[&execution_id.to_string()])
    }

    pub fn count_logs(&self, schedule_id: i64) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM report_execution_log WHERE report_schedule_id = ?1",
                params![schedule_id],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        Ok(count as usize)
    }

    /// Most recent log in `state`.
    pub fn find_last_log_in_state(&self, schedule_id: i64, state: ReportState) -> Result<Option<ReportExecutionLog>> {
        self.last_log(
            "WHERE report_schedule_id = ?1 AND state = ?2",
            &[&schedule_id, &state.as_str()],
        )
    }

    /// Most recent SUCCESS log, used for the alert grace period.
    pub fn find_last_success_log(&self, schedule_id: i64) -> Result<Option<ReportExecutionLog>> {
        self.find_last_log_in_state(schedule_id, ReportState::Success)
    }

    /// Most recent WORKING log that marks entering WORKING; rows written for
    /// a refused re-entry carry an error message and are skipped.
    pub fn find_last_entered_working_log(&self, schedule_id: i64) -> Result<Option<ReportExecutionLog>> {
        self.last_log(
            "WHERE report_schedule_id = ?1 AND state = ?2 AND error_message IS NULL",
            &[&schedule_id, &ReportState::Working.as_str()],
        )
    }

    /// Most recent error notification to owners, unless the schedule has
    /// left the ERROR/WORKING cycle since then.
    pub fn find_last_error_notification(&self, schedule_id: i64) -> Result<Option<ReportExecutionLog>> {
        let Some(last_error) = self.last_log(
            "WHERE report_schedule_id = ?1 AND error_message = ?2",
            &[&schedule_id, &ERROR_NOTIFICATION_MARKER],
        )?
        else {
            return Ok(None);
        };

        let end_at = fmt_ts(&last_error.end_at);
        let recovered = self.last_log(
            "WHERE report_schedule_id = ?1 AND state NOT IN (?2, ?3) AND end_at > ?4",
            &[
                &schedule_id,
                &ReportState::Error.as_str(),
                &ReportState::Working.as_str(),
                &end_at,
            ],
        )?;
        if recovered.is_some() {
            return Ok(None);
        }
        Ok(Some(last_error))
    }
}
