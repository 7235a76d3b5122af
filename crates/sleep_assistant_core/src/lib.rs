pub mod domain;
pub mod ports;
pub mod sleep;
pub mod stats;
pub mod timezone;
pub mod users;

#[cfg(test)]
pub(crate) mod testing;

pub use domain::{
    ConflictResolution, ExportRow, Language, NewUserProfile, SleepGoals, SleepSession,
    SleepStatistics, UpdateField, UpdateValidation, User,
};
pub use ports::{DialogStateStore, PortError, PortResult, SleepSessionStore, UserStore};
pub use sleep::{
    calculate_goal_percentage, duration_hours, format_duration, format_time_ago,
    validate_session_update, SleepTracker, GOAL_MET_PERCENTAGE, MAX_QUALITY_RATING,
    MIN_QUALITY_RATING, STALE_UPDATE_HOURS,
};
pub use stats::StatisticsService;
pub use users::UserDirectory;
