//! Picks the identity a schedule executes as.

use vizalert_core::types::{ExecutorType, Identity, ReportSchedule, User};

use crate::error::{ReportScheduleError, Result};

fn is_owner(schedule: &ReportSchedule, user: &User) -> bool {
    schedule.owners.iter().any(|o| o.id == user.id)
}

/// Resolve the executor from the configured strategies; the first strategy
/// that yields a user wins.
pub fn resolve_executor(
    executor_types: &[ExecutorType],
    schedule: &ReportSchedule,
    selenium_user: &str,
) -> Result<Identity> {
    let owner = |user: &Option<User>| user.as_ref().filter(|u| is_owner(schedule, u)).cloned();

    for executor_type in executor_types {
        let found = match executor_type {
            ExecutorType::Selenium => return Ok(Identity::new(None, selenium_user)),
            ExecutorType::CreatorOwner => owner(&schedule.created_by),
            ExecutorType::Creator => schedule.created_by.clone(),
            ExecutorType::ModifierOwner => owner(&schedule.changed_by),
            ExecutorType::Modifier => schedule.changed_by.clone(),
            ExecutorType::Owner => match schedule.owners.as_slice() {
                [] => None,
                [only] => Some(only.clone()),
                many => owner(&schedule.changed_by)
                    .or_else(|| owner(&schedule.created_by))
                    .or_else(|| many.last().cloned()),
            },
        };
        if let Some(user) = found {
            return Ok(Identity::from(&user));
        }
    }
    Err(ReportScheduleError::ExecutorNotFound)
}
