//! Alert trigger evaluation: run the alert SQL, validate the single value it
//! returns and compare it against the configured validator.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Instant;

use vizalert_core::traits::SqlRunner;
use vizalert_core::types::{ExecutionContext, ReportSchedule, Table, ValidatorType};

use crate::error::{ReportScheduleError, Result};

/// Alert queries never need more than one row; two detect violations.
pub const ALERT_SQL_LIMIT: usize = 2;

/// Decides whether an alert fires. Implementations record the observed
/// value on the schedule (`last_value` / `last_value_row_json`) and give up
/// with `AlertQueryTimeout` at `deadline`.
#[async_trait]
pub trait AlertEvaluator: Send + Sync {
    async fn evaluate(&self, schedule: &mut ReportSchedule, ctx: &ExecutionContext, deadline: Instant) -> Result<bool>;
}

/// Comparison operators accepted in `validator_config_json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Operator {
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            _ => None,
        }
    }

    pub fn apply(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Lt => value < threshold,
            Self::Le => value <= threshold,
            Self::Gt => value > threshold,
            Self::Ge => value >= threshold,
            Self::Eq => value == threshold,
            Self::Ne => value != threshold,
        }
    }
}

/// Parse `{"op": ..., "threshold": ...}`.
pub fn parse_validator_config(raw: Option<&str>) -> Result<(Operator, f64)> {
    let config: serde_json::Value = raw
        .and_then(|r| serde_json::from_str(r).ok())
        .ok_or(ReportScheduleError::AlertValidatorConfig)?;
    let op = config["op"]
        .as_str()
        .and_then(Operator::parse)
        .ok_or(ReportScheduleError::AlertValidatorConfig)?;
    let threshold = config["threshold"]
        .as_f64()
        .ok_or(ReportScheduleError::AlertValidatorConfig)?;
    Ok((op, threshold))
}

fn is_falsy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::Number(n) => n.as_f64().is_none_or(|f| f == 0.0 || f.is_nan()),
        _ => false,
    }
}

/// Single cell of a validated result, or `None` for an empty result.
fn single_value(table: &Table) -> Result<Option<&serde_json::Value>> {
    if table.len() > 1 {
        return Err(ReportScheduleError::AlertQueryMultipleRows(table.len()));
    }
    if table.columns.len() > 1 {
        return Err(ReportScheduleError::AlertQueryMultipleColumns(table.columns.len()));
    }
    Ok(table.rows.first().and_then(|row| row.first()))
}

fn numeric(value: &serde_json::Value) -> Result<f64> {
    if is_falsy(value) {
        return Ok(0.0);
    }
    match value {
        serde_json::Value::Number(n) => n.as_f64().ok_or(ReportScheduleError::AlertQueryInvalidType),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ReportScheduleError::AlertQueryInvalidType),
        serde_json::Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        _ => Err(ReportScheduleError::AlertQueryInvalidType),
    }
}

/// Apply the schedule's validator to a query result.
pub fn evaluate_result(schedule: &mut ReportSchedule, table: &Table) -> Result<bool> {
    let value = single_value(table)?;
    match schedule.validator_type {
        Some(ValidatorType::NotNull) => {
            let value = value.cloned().unwrap_or(serde_json::Value::Null);
            schedule.last_value_row_json = Some(value.to_string());
            Ok(!is_falsy(&value))
        }
        Some(ValidatorType::Operator) => {
            let result = value.map(numeric).transpose()?.unwrap_or(0.0);
            schedule.last_value = Some(result);
            let (op, threshold) = parse_validator_config(schedule.validator_config_json.as_deref())?;
            Ok(op.apply(result, threshold))
        }
        None => Err(ReportScheduleError::AlertValidatorConfig),
    }
}

/// Evaluates alerts by running their SQL through a [`SqlRunner`].
pub struct SqlAlertEvaluator<R: SqlRunner> {
    runner: Arc<R>,
}

impl<R: SqlRunner> SqlAlertEvaluator<R> {
    pub fn new(runner: Arc<R>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl<R: SqlRunner + 'static> AlertEvaluator for SqlAlertEvaluator<R> {
    async fn evaluate(&self, schedule: &mut ReportSchedule, ctx: &ExecutionContext, deadline: Instant) -> Result<bool> {
        let (Some(sql), Some(database_id)) = (schedule.sql.clone(), schedule.database_id) else {
            return Err(ReportScheduleError::AlertQuery("alert has no query configured".into()));
        };

        let started = std::time::Instant::now();
        let table = tokio::time::timeout_at(
            deadline,
            self.runner.execute(database_id, &sql, ALERT_SQL_LIMIT, ctx),
        )
        .await
        .map_err(|_| ReportScheduleError::AlertQueryTimeout)?
        .map_err(|e| ReportScheduleError::AlertQuery(e.to_string()))?;
        tracing::info!(
            "🔎 Alert query for schedule {} ran in {} ms",
            schedule.id,
            started.elapsed().as_millis()
        );

        evaluate_result(schedule, &table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use uuid::Uuid;
    use vizalert_core::types::{ChartRef, Identity, ReportFormat, ReportScheduleType, ReportTarget};

    fn alert(validator: ValidatorType, config: Option<&str>) -> ReportSchedule {
        let mut s = ReportSchedule::new(
            1,
            "cpu",
            ReportScheduleType::Alert,
            ReportTarget::Chart(ChartRef { id: 1, slice_name: "c".into(), digest: String::new(), query_context: None }),
            ReportFormat::Visualization,
        );
        s.sql = Some("SELECT cpu FROM hosts".into());
        s.database_id = Some(1);
        s.validator_type = Some(validator);
        s.validator_config_json = config.map(str::to_string);
        s
    }

    fn single(value: serde_json::Value) -> Table {
        Table::new(vec!["v".into()], vec![vec![value]])
    }

    #[test]
    fn test_operator_threshold() {
        let mut s = alert(ValidatorType::Operator, Some(r#"{"op": ">", "threshold": 10}"#));
        assert!(evaluate_result(&mut s, &single(json!(11))).unwrap());
        assert_eq!(s.last_value, Some(11.0));
        assert!(!evaluate_result(&mut s, &single(json!("9.5"))).unwrap());
        assert!(!evaluate_result(&mut s, &Table::new(vec!["v".into()], vec![])).unwrap());
        assert_eq!(s.last_value, Some(0.0));
    }

    #[test]
    fn test_not_null() {
        let mut s = alert(ValidatorType::NotNull, None);
        assert!(evaluate_result(&mut s, &single(json!("x"))).unwrap());
        assert_eq!(s.last_value_row_json.as_deref(), Some("\"x\""));
        assert!(!evaluate_result(&mut s, &single(json!(null))).unwrap());
        assert!(!evaluate_result(&mut s, &single(json!(0))).unwrap());
    }

    #[test]
    fn test_shape_errors() {
        let mut s = alert(ValidatorType::Operator, Some(r#"{"op": ">", "threshold": 1}"#));
        let rows = Table::new(vec!["v".into()], vec![vec![json!(1)], vec![json!(2)]]);
        assert!(matches!(
            evaluate_result(&mut s, &rows),
            Err(ReportScheduleError::AlertQueryMultipleRows(2))
        ));
        let cols = Table::new(vec!["a".into(), "b".into()], vec![vec![json!(1), json!(2)]]);
        assert!(matches!(
            evaluate_result(&mut s, &cols),
            Err(ReportScheduleError::AlertQueryMultipleColumns(2))
        ));
        assert!(matches!(
            evaluate_result(&mut s, &single(json!("abc"))),
            Err(ReportScheduleError::AlertQueryInvalidType)
        ));
    }

    #[test]
    fn test_bad_validator_config() {
        let mut s = alert(ValidatorType::Operator, Some(r#"{"op": "~", "threshold": 1}"#));
        assert!(matches!(
            evaluate_result(&mut s, &single(json!(1))),
            Err(ReportScheduleError::AlertValidatorConfig)
        ));
        let mut s = alert(ValidatorType::Operator, Some("not json"));
        assert!(evaluate_result(&mut s, &single(json!(1))).is_err());
    }

    struct SlowRunner;

    #[async_trait]
    impl SqlRunner for SlowRunner {
        async fn execute(
            &self,
            _database_id: i64,
            _sql: &str,
            _limit: usize,
            _ctx: &ExecutionContext,
        ) -> vizalert_core::Result<Table> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Table::default())
        }
    }

    #[tokio::test]
    async fn test_query_timeout() {
        let evaluator = SqlAlertEvaluator::new(Arc::new(SlowRunner));
        let mut s = alert(ValidatorType::NotNull, None);
        let ctx = ExecutionContext { execution_id: Uuid::new_v4(), executor: Identity::new(Some(1), "alice") };
        assert!(matches!(
            evaluator
                .evaluate(&mut s, &ctx, Instant::now() + Duration::from_millis(20))
                .await,
            Err(ReportScheduleError::AlertQueryTimeout)
        ));
    }
}
