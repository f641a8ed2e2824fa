//! State machine driver: selects the handler for the schedule's last state.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use vizalert_core::types::{ExecutionContext, Identity, ReportSchedule, ReportState};

use crate::error::{ReportScheduleError, Result};
use crate::services::Services;
use crate::state::{self, ReportRun};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateHandler {
    Working,
    NotTriggeredOrError,
    SuccessOrGrace,
}

/// Handlers in the order they are consulted.
pub const STATE_TABLE: [StateHandler; 3] = [
    StateHandler::Working,
    StateHandler::NotTriggeredOrError,
    StateHandler::SuccessOrGrace,
];

impl StateHandler {
    pub fn current_states(self) -> &'static [ReportState] {
        match self {
            Self::Working => &[ReportState::Working],
            Self::NotTriggeredOrError => &[ReportState::Noop, ReportState::Error],
            Self::SuccessOrGrace => &[ReportState::Success, ReportState::Grace],
        }
    }

    /// Runs for schedules that never executed.
    pub fn is_initial(self) -> bool {
        self == Self::NotTriggeredOrError
    }

    fn handles(self, last_state: Option<ReportState>) -> bool {
        match last_state {
            Some(state) => self.current_states().contains(&state),
            None => self.is_initial(),
        }
    }

    /// First handler of `table` responsible for `last_state`.
    pub fn select(table: &[StateHandler], last_state: Option<ReportState>) -> Option<StateHandler> {
        table.iter().copied().find(|h| h.handles(last_state))
    }

    pub async fn next(self, run: &mut ReportRun<'_>) -> Result<()> {
        match self {
            Self::Working => state::working(run).await,
            Self::NotTriggeredOrError => state::not_triggered_or_error(run).await,
            Self::SuccessOrGrace => state::success_or_grace(run).await,
        }
    }
}

pub struct ReportScheduleStateMachine<'a> {
    services: &'a Services,
    execution_id: Uuid,
    schedule: ReportSchedule,
    scheduled_at: DateTime<Utc>,
    executor: Identity,
}

impl<'a> ReportScheduleStateMachine<'a> {
    pub fn new(
        services: &'a Services,
        execution_id: Uuid,
        schedule: ReportSchedule,
        scheduled_at: DateTime<Utc>,
        executor: Identity,
    ) -> Self {
        Self {
            services,
            execution_id,
            schedule,
            scheduled_at,
            executor,
        }
    }

    pub async fn run(self) -> Result<()> {
        let last_state = self.schedule.last_state;
        let handler = StateHandler::select(&STATE_TABLE, last_state).ok_or(ReportScheduleError::StateNotFound)?;
        tracing::debug!(
            "Schedule {} in state {:?} handled by {:?}",
            self.schedule.id,
            last_state,
            handler
        );

        let ctx = ExecutionContext {
            execution_id: self.execution_id,
            executor: self.executor,
        };
        let mut run = ReportRun::new(self.services, self.schedule, self.scheduled_at, ctx);
        handler.next(&mut run).await
    }
}
