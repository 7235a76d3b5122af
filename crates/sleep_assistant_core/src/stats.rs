//! crates/sleep_assistant_core/src/stats.rs
//!
//! Aggregated statistics and export preparation over completed sessions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::domain::{ExportRow, SleepSession, SleepStatistics, User};
use crate::ports::{PortResult, SleepSessionStore};

/// Read-only reporting over a user's completed sessions. Never mutates.
pub struct StatisticsService {
    store: Arc<dyn SleepSessionStore>,
}

impl StatisticsService {
    pub fn new(store: Arc<dyn SleepSessionStore>) -> Self {
        Self { store }
    }

    /// Summary metrics for the given absolute range. An empty range yields
    /// zeroed statistics, not an error.
    pub async fn get_statistics(
        &self,
        user: &User,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> PortResult<SleepStatistics> {
        let stats = self.store.aggregate(user.id, start, end).await?;
        info!(
            user_id = %user.id,
            total_sessions = stats.total_sessions,
            avg_duration = stats.avg_duration,
            "statistics_generated"
        );
        Ok(stats)
    }

    /// One row per completed session: ascending by start time when a range
    /// is given, newest first when exporting everything.
    pub async fn prepare_export_rows(
        &self,
        user: &User,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> PortResult<Vec<ExportRow>> {
        let sessions = match (start, end) {
            (Some(start), Some(end)) => {
                self.store.list_range(user.id, start, end, true).await?
            }
            _ => self.store.list_all(user.id, true).await?,
        };

        let rows: Vec<ExportRow> = sessions.iter().filter_map(export_row).collect();
        info!(user_id = %user.id, records_count = rows.len(), "export_rows_prepared");
        Ok(rows)
    }

    pub async fn has_any_data(&self, user: &User) -> PortResult<bool> {
        let stats = self.store.aggregate(user.id, None, None).await?;
        Ok(stats.total_sessions > 0)
    }

    /// Start of the user's earliest recorded session, if any.
    pub async fn first_session_date(&self, user: &User) -> PortResult<Option<DateTime<Utc>>> {
        self.store.first_session_start(user.id).await
    }
}

fn export_row(session: &SleepSession) -> Option<ExportRow> {
    let sleep_end = session.sleep_end?;
    Some(ExportRow {
        date: session.sleep_start.format("%Y-%m-%d").to_string(),
        sleep_start: session.sleep_start.format("%Y-%m-%d %H:%M:%S").to_string(),
        sleep_end: sleep_end.format("%Y-%m-%d %H:%M:%S").to_string(),
        duration_hours: session.duration_hours.unwrap_or(0.0),
        quality_rating: session.quality_rating,
        note: session.note.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_user, MemoryStore};
    use chrono::TimeZone;

    fn day(d: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, d, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn empty_history_yields_zeroed_statistics() {
        let store = Arc::new(MemoryStore::default());
        let stats = StatisticsService::new(store.clone());
        let user = test_user();

        let result = stats.get_statistics(&user, None, None).await.unwrap();
        assert_eq!(result, SleepStatistics::default());
        assert!(!stats.has_any_data(&user).await.unwrap());
    }

    #[tokio::test]
    async fn averages_ignore_unrated_sessions() {
        let store = Arc::new(MemoryStore::default());
        let user = test_user();

        let rated = store.seed_completed(user.id, day(1, 22), day(2, 6));
        store
            .set_quality_rating(rated.id, 8.0)
            .await
            .unwrap();
        store.seed_completed(user.id, day(2, 23), day(3, 5));

        let stats = StatisticsService::new(store.clone());
        let result = stats.get_statistics(&user, None, None).await.unwrap();
        assert_eq!(result.total_sessions, 2);
        assert_eq!(result.avg_quality, 8.0);
        assert_eq!(result.avg_duration, 7.0);
        assert_eq!(result.total_sleep_hours, 14.0);
    }

    #[tokio::test]
    async fn ranged_export_is_ascending_and_skips_active() {
        let store = Arc::new(MemoryStore::default());
        let user = test_user();

        store.seed_completed(user.id, day(3, 22), day(4, 6));
        store.seed_completed(user.id, day(1, 22), day(2, 6));
        store.seed_active(user.id, day(5, 22));

        let stats = StatisticsService::new(store.clone());
        let rows = stats
            .prepare_export_rows(&user, Some(day(1, 0)), Some(day(6, 0)))
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, "2026-03-01");
        assert_eq!(rows[1].date, "2026-03-03");
        assert_eq!(rows[0].sleep_start, "2026-03-01 22:00:00");
        assert_eq!(rows[0].duration_hours, 8.0);
        assert_eq!(rows[0].quality_rating, None);
        assert_eq!(rows[0].note, None);
    }

    #[tokio::test]
    async fn unranged_export_is_newest_first() {
        let store = Arc::new(MemoryStore::default());
        let user = test_user();

        store.seed_completed(user.id, day(1, 22), day(2, 6));
        store.seed_completed(user.id, day(3, 22), day(4, 6));

        let stats = StatisticsService::new(store.clone());
        let rows = stats.prepare_export_rows(&user, None, None).await.unwrap();
        assert_eq!(rows[0].date, "2026-03-03");
        assert_eq!(rows[1].date, "2026-03-01");
    }

    #[tokio::test]
    async fn first_session_date_is_the_earliest_start() {
        let store = Arc::new(MemoryStore::default());
        let user = test_user();

        store.seed_completed(user.id, day(3, 22), day(4, 6));
        store.seed_completed(user.id, day(1, 22), day(2, 6));

        let stats = StatisticsService::new(store.clone());
        let first = stats.first_session_date(&user).await.unwrap();
        assert_eq!(first, Some(day(1, 22)));
    }
}
