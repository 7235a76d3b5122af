//! crates/sleep_assistant_core/src/users.rs
//!
//! User-profile operations: preferences, onboarding and sleep goals.

use std::sync::Arc;

use tracing::info;

use crate::domain::{Language, NewUserProfile, SleepGoals, User};
use crate::ports::{PortError, PortResult, UserStore};

const MIN_TARGET_SLEEP_HOURS: i32 = 1;
const MAX_TARGET_SLEEP_HOURS: i32 = 24;

/// Profile operations with input validation in front of the store.
pub struct UserDirectory {
    store: Arc<dyn UserStore>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Fetch or create the user for a chat identity. The returned flag is
    /// true on first contact.
    pub async fn get_or_create(
        &self,
        chat_id: i64,
        profile: &NewUserProfile,
    ) -> PortResult<(User, bool)> {
        let (user, created) = self.store.get_or_create(chat_id, profile).await?;
        if created {
            info!(chat_id, user_id = %user.id, "user_created");
        }
        Ok((user, created))
    }

    pub async fn get_by_chat_id(&self, chat_id: i64) -> PortResult<Option<User>> {
        self.store.get_by_chat_id(chat_id).await
    }

    pub async fn update_language(&self, user: &User, language: Language) -> PortResult<User> {
        let updated = self.store.update_language(user.id, language).await?;
        info!(user_id = %user.id, language = language.as_str(), "language_updated");
        Ok(updated)
    }

    /// Store the user's timezone. Validity of the IANA name is the caller's
    /// concern; conversions degrade gracefully on unknown names.
    pub async fn update_timezone(&self, user: &User, timezone: &str) -> PortResult<User> {
        let updated = self.store.update_timezone(user.id, timezone).await?;
        info!(user_id = %user.id, timezone, "timezone_updated");
        Ok(updated)
    }

    /// Store the goals captured by onboarding and mark the user onboarded.
    pub async fn complete_onboarding(&self, user: &User, goals: &SleepGoals) -> PortResult<User> {
        validate_goals(goals)?;
        let updated = self.store.complete_onboarding(user.id, goals).await?;
        info!(user_id = %user.id, "onboarding_completed");
        Ok(updated)
    }

    pub async fn update_sleep_goals(&self, user: &User, goals: &SleepGoals) -> PortResult<User> {
        validate_goals(goals)?;
        let updated = self.store.update_sleep_goals(user.id, goals).await?;
        info!(user_id = %user.id, "sleep_goals_updated");
        Ok(updated)
    }
}

fn validate_goals(goals: &SleepGoals) -> PortResult<()> {
    if let Some(hours) = goals.target_sleep_hours {
        if !(MIN_TARGET_SLEEP_HOURS..=MAX_TARGET_SLEEP_HOURS).contains(&hours) {
            return Err(PortError::Validation(
                "target sleep hours must be between 1 and 24".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goal_hours_must_stay_in_range() {
        let valid = SleepGoals {
            target_sleep_hours: Some(8),
            ..SleepGoals::default()
        };
        assert!(validate_goals(&valid).is_ok());

        // Absent goals are fine.
        assert!(validate_goals(&SleepGoals::default()).is_ok());

        for hours in [0, -1, 25] {
            let goals = SleepGoals {
                target_sleep_hours: Some(hours),
                ..SleepGoals::default()
            };
            assert!(validate_goals(&goals).is_err(), "hours {hours}");
        }
    }
}
