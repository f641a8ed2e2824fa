//! # VizAlert Scheduler
//!
//! Executes one report or alert schedule per invocation:
//! - State machine over the schedule's last state (WORKING, NOOP/ERROR, SUCCESS/GRACE)
//! - Alert trigger evaluation
//! - Notification content (screenshot, CSV, table, documents)
//! - Fan-out to recipients with failure aggregation
//! - SQLite persistence of schedules and the append-only execution log
//!
//! ```text
//! AsyncExecuteReportSchedule ─▶ ReportScheduleStateMachine ─▶ StateHandler
//!        │                                                      │
//!   resolve_executor                          ContentBuilder ─▶ send_notifications
//! ```

pub mod alert;
pub mod content;
pub mod dispatch;
pub mod error;
pub mod execute;
pub mod executor;
pub mod layout;
pub mod machine;
pub mod password_history;
pub mod persistence;
pub mod services;
pub mod state;

pub use alert::{AlertEvaluator, SqlAlertEvaluator};
pub use error::{ReportScheduleError, Result};
pub use execute::AsyncExecuteReportSchedule;
pub use machine::ReportScheduleStateMachine;
pub use persistence::ReportDb;
pub use services::Services;
