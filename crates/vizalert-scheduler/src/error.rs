//! Failure taxonomy of a report schedule execution.

use vizalert_core::VizAlertError;

/// Severity of one failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLevel {
    /// Channel or server side failure.
    Error,
    /// Recipient or request side failure.
    Warning,
}

/// One failed delivery collected by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationFailure {
    pub message: String,
    pub level: ErrorLevel,
}

fn join_messages(failures: &[NotificationFailure]) -> String {
    failures
        .iter()
        .map(|f| f.message.as_str())
        .collect::<Vec<_>>()
        .join(";")
}

#[derive(Debug, thiserror::Error)]
pub enum ReportScheduleError {
    // ── Timeouts ───────────────────────────────────────────
    #[error("A timeout occurred while taking a screenshot.")]
    ScreenshotTimeout,

    #[error("A timeout occurred while generating a csv.")]
    CsvTimeout,

    #[error("A timeout occurred while generating a dataframe.")]
    DataFrameTimeout,

    #[error("A timeout occurred while generating a pdf.")]
    PdfTimeout,

    #[error("Report Schedule reached a working timeout.")]
    WorkingTimeout,

    #[error("A timeout occurred while executing the query.")]
    AlertQueryTimeout,

    // ── Build failures ─────────────────────────────────────
    #[error("Report Schedule execution failed when generating a screenshot. {0}")]
    ScreenshotFailed(String),

    #[error("{0}")]
    CsvFailed(String),

    #[error("Report Schedule execution failed when generating a dataframe. {0}")]
    DataFrameFailed(String),

    #[error("Report Schedule execution failed when generating a pdf. {0}")]
    PdfFailed(String),

    /// The rendered payload came back empty.
    #[error("{0}")]
    MissingArtifact(String),

    // ── Notification aggregates ────────────────────────────
    #[error("{}", join_messages(.0))]
    SystemErrors(Vec<NotificationFailure>),

    #[error("{}", join_messages(.0))]
    ClientErrors(Vec<NotificationFailure>),

    // ── Control signals ────────────────────────────────────
    #[error("Report Schedule is still working, refusing to re-compute.")]
    PreviousWorking,

    #[error("Alert on grace period")]
    AlertGracePeriod,

    // ── Consistency ────────────────────────────────────────
    #[error("Report Schedule state not found")]
    StateNotFound,

    #[error("Report Schedule not found")]
    NotFound,

    #[error("Scheduled work executor not found")]
    ExecutorNotFound,

    #[error("Dashboard layout visits node {0} more than once")]
    LayoutCycle(String),

    // ── Alert evaluation ───────────────────────────────────
    #[error("Alert query returned more than one row. {0} rows returned")]
    AlertQueryMultipleRows(usize),

    #[error("Alert query returned more than one column. {0} columns returned")]
    AlertQueryMultipleColumns(usize),

    #[error("Alert query returned a non-number value.")]
    AlertQueryInvalidType,

    #[error("Alert validator config error.")]
    AlertValidatorConfig,

    #[error("Alert found an error while executing a query. {0}")]
    AlertQuery(String),

    // ── Infrastructure ─────────────────────────────────────
    #[error(transparent)]
    Store(#[from] VizAlertError),

    #[error("Report Schedule execution got an unexpected error. {0}")]
    Unexpected(String),
}

impl ReportScheduleError {
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ScreenshotTimeout
                | Self::CsvTimeout
                | Self::DataFrameTimeout
                | Self::PdfTimeout
                | Self::WorkingTimeout
                | Self::AlertQueryTimeout
        )
    }

    /// Individual messages; aggregates yield one per failed delivery.
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::SystemErrors(failures) | Self::ClientErrors(failures) => {
                failures.iter().map(|f| f.message.clone()).collect()
            }
            other => vec![other.to_string()],
        }
    }
}

pub type Result<T> = std::result::Result<T, ReportScheduleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_message_joined() {
        let err = ReportScheduleError::SystemErrors(vec![
            NotificationFailure { message: "smtp down".into(), level: ErrorLevel::Error },
            NotificationFailure { message: "bad channel".into(), level: ErrorLevel::Warning },
        ]);
        assert_eq!(err.to_string(), "smtp down;bad channel");
        assert_eq!(err.messages(), vec!["smtp down", "bad channel"]);
    }

    #[test]
    fn test_timeout_classification() {
        assert!(ReportScheduleError::PdfTimeout.is_timeout());
        assert!(ReportScheduleError::WorkingTimeout.is_timeout());
        assert!(!ReportScheduleError::PreviousWorking.is_timeout());
        assert!(!ReportScheduleError::CsvFailed("x".into()).is_timeout());
    }
}
