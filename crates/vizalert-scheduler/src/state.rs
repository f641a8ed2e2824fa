//! Per-state handlers. Every transition persists the schedule's state
//! fields and one execution log row together.

use chrono::{DateTime, Duration, Utc};
use tokio::time::Instant;

use vizalert_core::types::{
    ExecutionContext, NotificationContent, Recipient, ReportExecutionLog, ReportSchedule, ReportState,
};

use crate::content::ContentBuilder;
use crate::dispatch::send_notifications;
use crate::error::{ReportScheduleError, Result};
use crate::persistence::ERROR_NOTIFICATION_MARKER;
use crate::services::Services;

/// One execution of one schedule, threaded through the handlers.
pub struct ReportRun<'a> {
    services: &'a Services,
    schedule: ReportSchedule,
    scheduled_at: DateTime<Utc>,
    start_at: DateTime<Utc>,
    deadline: Instant,
    ctx: ExecutionContext,
}

impl<'a> ReportRun<'a> {
    pub fn new(
        services: &'a Services,
        schedule: ReportSchedule,
        scheduled_at: DateTime<Utc>,
        ctx: ExecutionContext,
    ) -> Self {
        Self {
            services,
            schedule,
            scheduled_at,
            start_at: Utc::now(),
            deadline: Instant::now() + services.soft_time_limit(),
            ctx,
        }
    }

    pub fn schedule(&self) -> &ReportSchedule {
        &self.schedule
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// Move to `state`, persisting the schedule fields and a log row in one
    /// transaction. Entering WORKING forgets the previous alert value.
    pub fn update_report_schedule_and_log(&mut self, state: ReportState, error_message: Option<String>) -> Result<()> {
        if state == ReportState::Working {
            self.schedule.last_value = None;
            self.schedule.last_value_row_json = None;
        }
        let now = Utc::now();
        self.schedule.last_state = Some(state);
        self.schedule.last_eval_at = Some(now);

        let log = ReportExecutionLog {
            id: None,
            uuid: self.ctx.execution_id,
            report_schedule_id: self.schedule.id,
            scheduled_at: self.scheduled_at,
            start_at: self.start_at,
            end_at: now,
            value: self.schedule.last_value,
            value_row_json: self.schedule.last_value_row_json.clone(),
            state,
            error_message,
        };
        self.services.db.record_transition(&self.schedule, &log)?;
        tracing::info!(
            "🔄 Report schedule {} → {} [{}]",
            self.schedule.id,
            state,
            self.ctx.execution_id
        );
        Ok(())
    }

    /// Alert fired successfully within the grace period.
    pub fn is_in_grace_period(&self) -> Result<bool> {
        if self.schedule.grace_period <= 0 {
            return Ok(false);
        }
        let last_success = self.services.db.find_last_success_log(self.schedule.id)?;
        Ok(last_success.is_some_and(|log| Utc::now() - Duration::seconds(self.schedule.grace_period) < log.end_at))
    }

    /// Owners were notified of an error within the grace period.
    pub fn is_in_error_grace_period(&self) -> Result<bool> {
        if self.schedule.grace_period <= 0 {
            return Ok(false);
        }
        let last_error = self.services.db.find_last_error_notification(self.schedule.id)?;
        Ok(last_error.is_some_and(|log| Utc::now() - Duration::seconds(self.schedule.grace_period) < log.end_at))
    }

    /// The run that entered WORKING has been there longer than allowed.
    pub fn is_on_working_timeout(&self) -> Result<bool> {
        let (Some(timeout), Some(_)) = (self.schedule.working_timeout, self.schedule.last_eval_at) else {
            return Ok(false);
        };
        let entered = self.services.db.find_last_entered_working_log(self.schedule.id)?;
        Ok(entered.is_some_and(|log| Utc::now() - Duration::seconds(timeout) > log.end_at))
    }

    /// Evaluate the alert trigger, recording the observed value.
    pub async fn evaluate_alert(&mut self) -> Result<bool> {
        self.services.alerts.evaluate(&mut self.schedule, &self.ctx, self.deadline).await
    }

    /// Build the content and deliver it to every recipient. Content that
    /// replaced a missing artifact with an error text is still delivered,
    /// then reported as a failure.
    pub async fn send(&self) -> Result<()> {
        let content = ContentBuilder::new(self.services, &self.schedule, &self.ctx, self.deadline)
            .build()
            .await?;
        self.dispatch(&content, &self.schedule.recipients).await?;
        match content.text {
            Some(text) => Err(ReportScheduleError::MissingArtifact(text)),
            None => Ok(()),
        }
    }

    /// Tell the owners about a failure by email.
    pub async fn send_error(&self, name: &str, message: &str) -> Result<()> {
        let header_data = ContentBuilder::new(self.services, &self.schedule, &self.ctx, self.deadline).header_data();
        let content = NotificationContent::error(name, message, header_data);
        let owners: Vec<Recipient> = self
            .schedule
            .owners
            .iter()
            .filter(|o| !o.email.is_empty())
            .map(|o| Recipient::email(&o.email))
            .collect();
        self.dispatch(&content, &owners).await
    }

    async fn dispatch(&self, content: &NotificationContent, recipients: &[Recipient]) -> Result<()> {
        send_notifications(
            self.services.notifications.as_ref(),
            content,
            recipients,
            self.services.config.notification_dry_run,
            &self.schedule.name,
        )
        .await
    }

    fn error_title(&self) -> String {
        format!("Error occurred for {}: {}", self.schedule.schedule_type, self.schedule.name)
    }

    /// Record `error` as ERROR and notify the owners unless they were
    /// already told within the grace period. The second ERROR row carries
    /// the marker, or the reason the owner notification failed. Problems
    /// while doing so are logged; the caller always raises `error`.
    async fn handle_failure(&mut self, error: &ReportScheduleError) {
        if let Err(e) = self.record_failure(error).await {
            tracing::error!(
                "❌ Could not record failure of schedule {} [{}]: {e}",
                self.schedule.id,
                self.ctx.execution_id
            );
        }
    }

    async fn record_failure(&mut self, error: &ReportScheduleError) -> Result<()> {
        self.update_report_schedule_and_log(ReportState::Error, Some(error.to_string()))?;
        if self.is_in_error_grace_period()? {
            tracing::info!(
                "🔕 Error notification for schedule {} suppressed (grace period)",
                self.schedule.id
            );
            return Ok(());
        }
        let message = match self.send_error(&self.error_title(), &error.to_string()).await {
            Ok(()) => ERROR_NOTIFICATION_MARKER.to_string(),
            Err(e) => {
                tracing::error!("❌ Error notification to owners failed: {e}");
                e.to_string()
            }
        };
        self.update_report_schedule_and_log(ReportState::Error, Some(message))
    }
}

/// Not yet run, last run did not trigger, or last run failed.
pub async fn not_triggered_or_error(run: &mut ReportRun<'_>) -> Result<()> {
    run.update_report_schedule_and_log(ReportState::Working, None)?;

    if let Err(error) = evaluate_and_send(run).await {
        tracing::warn!("⚠️ Report schedule {} failed: {error}", run.schedule.id);
        run.handle_failure(&error).await;
        return Err(error);
    }
    Ok(())
}

async fn evaluate_and_send(run: &mut ReportRun<'_>) -> Result<()> {
    if run.schedule.is_alert() && !run.evaluate_alert().await? {
        return run.update_report_schedule_and_log(ReportState::Noop, None);
    }
    run.send().await?;
    run.update_report_schedule_and_log(ReportState::Success, None)
}

/// A previous execution is still WORKING.
pub async fn working(run: &mut ReportRun<'_>) -> Result<()> {
    if run.is_on_working_timeout()? {
        let error = ReportScheduleError::WorkingTimeout;
        tracing::error!("⏱️ Report schedule {} reached its working timeout", run.schedule.id);
        run.update_report_schedule_and_log(ReportState::Error, Some(error.to_string()))?;
        return Err(error);
    }
    let error = ReportScheduleError::PreviousWorking;
    run.update_report_schedule_and_log(ReportState::Working, Some(error.to_string()))?;
    Err(error)
}

/// Last run delivered, or an alert is resting in its grace period.
pub async fn success_or_grace(run: &mut ReportRun<'_>) -> Result<()> {
    if run.schedule.is_alert() {
        if run.is_in_grace_period()? {
            return run.update_report_schedule_and_log(
                ReportState::Grace,
                Some(ReportScheduleError::AlertGracePeriod.to_string()),
            );
        }
        run.update_report_schedule_and_log(ReportState::Working, None)?;
        match run.evaluate_alert().await {
            Ok(true) => {}
            Ok(false) => return run.update_report_schedule_and_log(ReportState::Noop, None),
            Err(error) => {
                run.handle_failure(&error).await;
                return Err(error);
            }
        }
    }

    if let Err(error) = run.send().await {
        run.update_report_schedule_and_log(ReportState::Error, Some(error.to_string()))?;
        return Err(error);
    }
    run.update_report_schedule_and_log(ReportState::Success, None)
}
