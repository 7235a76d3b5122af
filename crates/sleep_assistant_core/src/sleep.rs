//! crates/sleep_assistant_core/src/sleep.rs
//!
//! The sleep session lifecycle engine: starting, ending and cancelling
//! sessions, resolving start conflicts, and validating late updates to a
//! completed session's rating or note.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::domain::{
    ConflictResolution, SleepSession, UpdateField, UpdateValidation, User,
};
use crate::ports::{PortError, PortResult, SleepSessionStore};

/// Updates attempted this many hours after wake-up require a warning and an
/// explicit confirmation, whether or not a value already exists.
pub const STALE_UPDATE_HOURS: f64 = 24.0;

/// Goal percentage at or above which the sleep goal counts as met.
pub const GOAL_MET_PERCENTAGE: i64 = 90;

pub const MIN_QUALITY_RATING: f64 = 1.0;
pub const MAX_QUALITY_RATING: f64 = 10.0;

//=========================================================================================
// Pure helpers
//=========================================================================================

/// Session duration in hours, rounded to 2 decimal places.
pub fn duration_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let hours = (end - start).num_milliseconds() as f64 / 3_600_000.0;
    (hours * 100.0).round() / 100.0
}

/// Split a fractional hour count into whole hours and minutes.
pub fn format_duration(hours: f64) -> (i64, i64) {
    let h = hours.trunc();
    let m = ((hours - h) * 60.0) as i64;
    (h as i64, m)
}

/// Render an elapsed time as "N minutes/hours/days ago".
///
/// Exactly 24 hours renders as "1 days ago", not "24 hours ago".
pub fn format_time_ago(hours: f64) -> String {
    if hours < 1.0 {
        format!("{} minutes ago", (hours * 60.0).floor() as i64)
    } else if hours < STALE_UPDATE_HOURS {
        format!("{} hours ago", hours.floor() as i64)
    } else {
        format!("{} days ago", (hours / 24.0).floor() as i64)
    }
}

/// Percentage of the sleep goal covered by the actual duration, floored to
/// an integer (may exceed 100). `None` when either side is unknown.
pub fn calculate_goal_percentage(
    target_hours: Option<f64>,
    duration_hours: Option<f64>,
) -> Option<i64> {
    let target = target_hours?;
    let actual = duration_hours?;
    if target <= 0.0 {
        return None;
    }
    Some(((actual / target) * 100.0).floor() as i64)
}

/// Decide how an update to a completed session's rating or note must be
/// handled, given the time elapsed since wake-up.
///
/// Returns the decision together with `hours_since_wake`. This performs no
/// mutation; applying the value is a separate, explicit step.
pub fn validate_session_update(
    session: &SleepSession,
    field: UpdateField,
    has_existing: bool,
    now: DateTime<Utc>,
) -> (UpdateValidation, f64) {
    let Some(sleep_end) = session.sleep_end else {
        // Active sessions are rejected by the mutators themselves.
        return (UpdateValidation::Allow, 0.0);
    };

    let hours_since_wake = (now - sleep_end).num_milliseconds() as f64 / 3_600_000.0;
    let decision = if hours_since_wake >= STALE_UPDATE_HOURS {
        UpdateValidation::ShowWarning
    } else if has_existing {
        UpdateValidation::AskConfirmation
    } else {
        UpdateValidation::Allow
    };

    debug!(
        session_id = %session.id,
        field = field.as_str(),
        hours_since_wake,
        ?decision,
        "session_update_validated"
    );
    (decision, hours_since_wake)
}

//=========================================================================================
// Lifecycle Engine
//=========================================================================================

/// Governs the sleep session lifecycle for one user's command stream.
///
/// Each method is a single unit of work against the store; a failure leaves
/// prior state untouched.
pub struct SleepTracker {
    store: Arc<dyn SleepSessionStore>,
}

impl SleepTracker {
    pub fn new(store: Arc<dyn SleepSessionStore>) -> Self {
        Self { store }
    }

    pub async fn active_session(&self, user: &User) -> PortResult<Option<SleepSession>> {
        self.store.get_active(user.id).await
    }

    pub async fn last_completed_session(&self, user: &User) -> PortResult<Option<SleepSession>> {
        self.store.get_last_completed(user.id).await
    }

    /// Start a new sleep session at the current instant.
    ///
    /// Fails with `Conflict` when an active session exists; the caller must
    /// resolve it explicitly through [`SleepTracker::resolve_conflict`].
    /// The check-then-write here is best effort: two concurrent starts for
    /// the same user can both pass the check.
    pub async fn start_sleep(&self, user: &User) -> PortResult<SleepSession> {
        if let Some(active) = self.store.get_active(user.id).await? {
            return Err(PortError::Conflict(format!(
                "user already has an active sleep session ({})",
                active.id
            )));
        }

        let session = self.store.create(user.id, Utc::now()).await?;
        info!(user_id = %user.id, session_id = %session.id, "sleep_session_started");
        Ok(session)
    }

    /// End the active session, fixing its end time and derived duration.
    ///
    /// Fails with `NotFound` when no session is active.
    pub async fn end_sleep(&self, user: &User) -> PortResult<SleepSession> {
        let Some(active) = self.store.get_active(user.id).await? else {
            return Err(PortError::NotFound(
                "no active sleep session".to_string(),
            ));
        };

        let now = Utc::now();
        let duration = duration_hours(active.sleep_start, now);
        let session = self.store.complete(active.id, now, duration).await?;
        info!(
            user_id = %user.id,
            session_id = %session.id,
            duration_hours = duration,
            "sleep_session_completed"
        );
        Ok(session)
    }

    /// Discard the active session without producing a completed record.
    /// Not an error when no session is active.
    pub async fn cancel_active(&self, user: &User) -> PortResult<()> {
        if let Some(active) = self.store.get_active(user.id).await? {
            self.store.delete(active.id).await?;
            info!(user_id = %user.id, session_id = %active.id, "sleep_session_cancelled");
        }
        Ok(())
    }

    /// Apply one of the three explicit resolutions for a start conflict.
    ///
    /// Returns the session completed by the resolution (if any) and the
    /// newly started one (if any). `Continue` changes nothing.
    pub async fn resolve_conflict(
        &self,
        user: &User,
        resolution: ConflictResolution,
    ) -> PortResult<(Option<SleepSession>, Option<SleepSession>)> {
        match resolution {
            ConflictResolution::SaveAndStart => {
                let completed = self.end_sleep(user).await?;
                let started = self.start_sleep(user).await?;
                Ok((Some(completed), Some(started)))
            }
            ConflictResolution::Continue => Ok((None, None)),
            ConflictResolution::CancelAndStart => {
                self.cancel_active(user).await?;
                let started = self.start_sleep(user).await?;
                Ok((None, Some(started)))
            }
        }
    }

    /// Advisory staleness check for updating `session`. See
    /// [`validate_session_update`]; the mutators below do not re-run it.
    pub fn validate_update(
        &self,
        session: &SleepSession,
        field: UpdateField,
        has_existing: bool,
    ) -> (UpdateValidation, f64) {
        validate_session_update(session, field, has_existing, Utc::now())
    }

    /// Set or overwrite the quality rating of a completed session.
    pub async fn add_quality_rating(
        &self,
        session: &SleepSession,
        rating: f64,
    ) -> PortResult<SleepSession> {
        if !(MIN_QUALITY_RATING..=MAX_QUALITY_RATING).contains(&rating) {
            return Err(PortError::Validation(
                "quality rating must be between 1.0 and 10.0".to_string(),
            ));
        }
        if session.is_active() {
            return Err(PortError::Validation(
                "cannot rate an active sleep session".to_string(),
            ));
        }

        let updated = self.store.set_quality_rating(session.id, rating).await?;
        info!(session_id = %session.id, rating, "quality_rating_saved");
        Ok(updated)
    }

    /// Set or overwrite the note of a completed session. The text is
    /// trimmed and must be non-empty.
    pub async fn add_note(&self, session: &SleepSession, note: &str) -> PortResult<SleepSession> {
        let trimmed = note.trim();
        if trimmed.is_empty() {
            return Err(PortError::Validation("note cannot be empty".to_string()));
        }
        if session.is_active() {
            return Err(PortError::Validation(
                "cannot add a note to an active sleep session".to_string(),
            ));
        }

        let updated = self.store.set_note(session.id, trimmed).await?;
        info!(session_id = %session.id, "note_saved");
        Ok(updated)
    }

    /// Percentage of the user's sleep goal covered by `session`, when both
    /// sides of the comparison are known.
    pub fn goal_percentage(&self, user: &User, session: &SleepSession) -> Option<i64> {
        calculate_goal_percentage(
            user.target_sleep_hours.map(f64::from),
            session.duration_hours,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{completed_session, test_user, MemoryStore};
    use chrono::Duration;

    fn tracker(store: &Arc<MemoryStore>) -> SleepTracker {
        SleepTracker::new(store.clone())
    }

    #[test]
    fn duration_is_rounded_to_two_decimals() {
        let start = Utc::now();
        assert_eq!(duration_hours(start, start + Duration::hours(8)), 8.0);
        assert_eq!(duration_hours(start, start + Duration::minutes(450)), 7.5);
        // 1h 10m 30s = 1.175 hours, rounds to 1.18.
        assert_eq!(duration_hours(start, start + Duration::seconds(4230)), 1.18);
    }

    #[test]
    fn duration_splits_into_hours_and_minutes() {
        assert_eq!(format_duration(7.5), (7, 30));
        assert_eq!(format_duration(8.0), (8, 0));
        assert_eq!(format_duration(0.25), (0, 15));
    }

    #[test]
    fn time_ago_picks_the_right_unit() {
        assert_eq!(format_time_ago(0.5), "30 minutes ago");
        assert_eq!(format_time_ago(1.0), "1 hours ago");
        assert_eq!(format_time_ago(23.9), "23 hours ago");
        assert_eq!(format_time_ago(24.0), "1 days ago");
        assert_eq!(format_time_ago(72.5), "3 days ago");
    }

    #[test]
    fn goal_percentage_is_floored() {
        assert_eq!(calculate_goal_percentage(Some(8.0), Some(8.0)), Some(100));
        assert_eq!(calculate_goal_percentage(Some(8.0), Some(7.99)), Some(99));
        assert_eq!(calculate_goal_percentage(Some(8.0), Some(12.0)), Some(150));
        assert_eq!(calculate_goal_percentage(Some(8.0), None), None);
        assert_eq!(calculate_goal_percentage(None, Some(8.0)), None);
    }

    #[test]
    fn validation_windows() {
        let now = Utc::now();
        let fresh = completed_session(test_user().id, now - Duration::hours(9), now - Duration::hours(1));

        let (decision, hours) =
            validate_session_update(&fresh, UpdateField::Quality, false, now);
        assert_eq!(decision, UpdateValidation::Allow);
        assert!(hours < 24.0);

        let (decision, _) = validate_session_update(&fresh, UpdateField::Quality, true, now);
        assert_eq!(decision, UpdateValidation::AskConfirmation);

        let stale = completed_session(test_user().id, now - Duration::hours(38), now - Duration::hours(30));
        let (decision, hours) = validate_session_update(&stale, UpdateField::Note, false, now);
        assert_eq!(decision, UpdateValidation::ShowWarning);
        assert!((hours - 30.0).abs() < 0.01);

        // Existing data does not soften the staleness warning.
        let (decision, _) = validate_session_update(&stale, UpdateField::Note, true, now);
        assert_eq!(decision, UpdateValidation::ShowWarning);
    }

    #[test]
    fn validation_boundary_at_exactly_24_hours() {
        let now = Utc::now();
        let session = completed_session(test_user().id, now - Duration::hours(32), now - Duration::hours(24));
        let (decision, hours) = validate_session_update(&session, UpdateField::Quality, false, now);
        assert_eq!(decision, UpdateValidation::ShowWarning);
        assert!((hours - 24.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn start_twice_is_a_conflict() {
        let store = Arc::new(MemoryStore::default());
        let tracker = tracker(&store);
        let user = test_user();

        tracker.start_sleep(&user).await.unwrap();
        let err = tracker.start_sleep(&user).await.unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));
        // The failed start must not have created anything.
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn end_without_active_is_not_found() {
        let store = Arc::new(MemoryStore::default());
        let tracker = tracker(&store);

        let err = tracker.end_sleep(&test_user()).await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }

    #[tokio::test]
    async fn end_fixes_end_time_and_duration() {
        let store = Arc::new(MemoryStore::default());
        let tracker = tracker(&store);
        let user = test_user();

        store.seed_active(user.id, Utc::now() - Duration::hours(8));
        let completed = tracker.end_sleep(&user).await.unwrap();

        assert!(completed.sleep_end.is_some());
        let duration = completed.duration_hours.unwrap();
        assert!((duration - 8.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let store = Arc::new(MemoryStore::default());
        let tracker = tracker(&store);
        let user = test_user();

        tracker.cancel_active(&user).await.unwrap();

        store.seed_active(user.id, Utc::now() - Duration::hours(1));
        tracker.cancel_active(&user).await.unwrap();
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn save_and_start_completes_then_starts() {
        let store = Arc::new(MemoryStore::default());
        let tracker = tracker(&store);
        let user = test_user();

        store.seed_active(user.id, Utc::now() - Duration::hours(1));
        let (completed, started) = tracker
            .resolve_conflict(&user, ConflictResolution::SaveAndStart)
            .await
            .unwrap();

        let completed = completed.unwrap();
        assert!((completed.duration_hours.unwrap() - 1.0).abs() < 0.01);
        let started = started.unwrap();
        assert!(started.is_active());
        assert_ne!(completed.id, started.id);
    }

    #[tokio::test]
    async fn continue_changes_nothing() {
        let store = Arc::new(MemoryStore::default());
        let tracker = tracker(&store);
        let user = test_user();

        store.seed_active(user.id, Utc::now() - Duration::hours(1));
        let (completed, started) = tracker
            .resolve_conflict(&user, ConflictResolution::Continue)
            .await
            .unwrap();

        assert!(completed.is_none());
        assert!(started.is_none());
        assert!(tracker.active_session(&user).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cancel_and_start_discards_the_old_session() {
        let store = Arc::new(MemoryStore::default());
        let tracker = tracker(&store);
        let user = test_user();

        let old_start = Utc::now() - Duration::hours(1);
        store.seed_active(user.id, old_start);
        let (completed, started) = tracker
            .resolve_conflict(&user, ConflictResolution::CancelAndStart)
            .await
            .unwrap();

        assert!(completed.is_none());
        let started = started.unwrap();
        assert!(started.sleep_start > old_start);
        // The discarded session left no completed record behind.
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn quality_rating_bounds_are_inclusive() {
        let store = Arc::new(MemoryStore::default());
        let tracker = tracker(&store);
        let user = test_user();
        let now = Utc::now();
        let session =
            store.seed_completed(user.id, now - Duration::hours(9), now - Duration::hours(1));

        for invalid in [0.5, 10.5, 0.0, -1.0] {
            let err = tracker.add_quality_rating(&session, invalid).await.unwrap_err();
            assert!(matches!(err, PortError::Validation(_)), "rating {invalid}");
        }

        for valid in [1.0, 5.5, 10.0] {
            let updated = tracker.add_quality_rating(&session, valid).await.unwrap();
            assert_eq!(updated.quality_rating, Some(valid));
        }
    }

    #[tokio::test]
    async fn active_sessions_cannot_be_rated_or_annotated() {
        let store = Arc::new(MemoryStore::default());
        let tracker = tracker(&store);
        let user = test_user();
        let active = store.seed_active(user.id, Utc::now() - Duration::hours(1));

        let err = tracker.add_quality_rating(&active, 7.5).await.unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
        let err = tracker.add_note(&active, "slept badly").await.unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
    }

    #[tokio::test]
    async fn notes_are_trimmed_and_must_be_non_empty() {
        let store = Arc::new(MemoryStore::default());
        let tracker = tracker(&store);
        let user = test_user();
        let now = Utc::now();
        let session =
            store.seed_completed(user.id, now - Duration::hours(9), now - Duration::hours(1));

        let err = tracker.add_note(&session, "   ").await.unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));

        let updated = tracker.add_note(&session, "  woke up twice  ").await.unwrap();
        assert_eq!(updated.note.as_deref(), Some("woke up twice"));
    }

    #[tokio::test]
    async fn first_rating_allows_then_rerating_asks() {
        let store = Arc::new(MemoryStore::default());
        let tracker = tracker(&store);
        let user = test_user();
        let now = Utc::now();
        let session =
            store.seed_completed(user.id, now - Duration::hours(8), now - Duration::minutes(5));

        let (decision, _) = tracker.validate_update(
            &session,
            UpdateField::Quality,
            session.quality_rating.is_some(),
        );
        assert_eq!(decision, UpdateValidation::Allow);

        let rated = tracker.add_quality_rating(&session, 7.5).await.unwrap();
        let (decision, _) =
            tracker.validate_update(&rated, UpdateField::Quality, rated.quality_rating.is_some());
        assert_eq!(decision, UpdateValidation::AskConfirmation);
    }

    #[tokio::test]
    async fn goal_percentage_uses_user_target() {
        let store = Arc::new(MemoryStore::default());
        let tracker = tracker(&store);
        let mut user = test_user();
        let now = Utc::now();
        let session =
            store.seed_completed(user.id, now - Duration::hours(8), now);

        user.target_sleep_hours = Some(8);
        let pct = tracker.goal_percentage(&user, &session).unwrap();
        assert!(pct >= GOAL_MET_PERCENTAGE);

        user.target_sleep_hours = None;
        assert_eq!(tracker.goal_percentage(&user, &session), None);
    }
}
