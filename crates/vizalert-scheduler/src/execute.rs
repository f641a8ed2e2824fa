//! Entry point for one scheduled execution.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{ReportScheduleError, Result};
use crate::executor::resolve_executor;
use crate::machine::ReportScheduleStateMachine;
use crate::services::Services;

/// Execute the schedule `model_id` for the tick at `scheduled_at`. The task
/// id doubles as the execution id shared by every log row of the run.
#[derive(Debug, Clone)]
pub struct AsyncExecuteReportSchedule {
    execution_id: Uuid,
    model_id: i64,
    scheduled_at: DateTime<Utc>,
}

impl AsyncExecuteReportSchedule {
    pub fn new(task_id: Uuid, model_id: i64, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            execution_id: task_id,
            model_id,
            scheduled_at,
        }
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    pub async fn run(&self, services: &Services) -> Result<()> {
        match self.execute(services).await {
            Ok(()) => Ok(()),
            Err(ReportScheduleError::Store(e)) => {
                tracing::error!("❌ Execution {} failed unexpectedly: {e}", self.execution_id);
                Err(ReportScheduleError::Unexpected(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn execute(&self, services: &Services) -> Result<()> {
        let schedule = services
            .db
            .find_schedule(self.model_id)?
            .ok_or(ReportScheduleError::NotFound)?;

        let executor = resolve_executor(&services.config.execute_as, &schedule, &services.config.selenium_user)?;
        tracing::info!(
            "Running report schedule {} as user {}",
            self.execution_id,
            executor.username
        );

        ReportScheduleStateMachine::new(services, self.execution_id, schedule, self.scheduled_at, executor)
            .run()
            .await
    }
}
