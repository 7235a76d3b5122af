//! crates/sleep_assistant_core/src/testing.rs
//!
//! In-memory store used by the unit tests in this crate.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Language, SleepSession, SleepStatistics, User};
use crate::ports::{PortError, PortResult, SleepSessionStore};
use crate::sleep::duration_hours;

pub fn test_user() -> User {
    User {
        id: Uuid::new_v4(),
        chat_id: 42,
        username: Some("sleeper".to_string()),
        first_name: None,
        last_name: None,
        language: Language::En,
        timezone: "UTC".to_string(),
        is_onboarded: true,
        target_bedtime: None,
        target_wake_time: None,
        target_sleep_hours: None,
        created_at: Utc::now(),
    }
}

pub fn completed_session(
    user_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> SleepSession {
    SleepSession {
        id: Uuid::new_v4(),
        user_id,
        sleep_start: start,
        sleep_end: Some(end),
        duration_hours: Some(duration_hours(start, end)),
        quality_rating: None,
        note: None,
        created_at: start,
    }
}

#[derive(Default)]
pub struct MemoryStore {
    sessions: Mutex<Vec<SleepSession>>,
}

impl MemoryStore {
    pub fn seed_active(&self, user_id: Uuid, start: DateTime<Utc>) -> SleepSession {
        let session = SleepSession {
            id: Uuid::new_v4(),
            user_id,
            sleep_start: start,
            sleep_end: None,
            duration_hours: None,
            quality_rating: None,
            note: None,
            created_at: start,
        };
        self.sessions.lock().unwrap().push(session.clone());
        session
    }

    pub fn seed_completed(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SleepSession {
        let session = completed_session(user_id, start, end);
        self.sessions.lock().unwrap().push(session.clone());
        session
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    fn update<F>(&self, session_id: Uuid, apply: F) -> PortResult<SleepSession>
    where
        F: FnOnce(&mut SleepSession),
    {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| PortError::NotFound(format!("session {session_id}")))?;
        apply(session);
        Ok(session.clone())
    }
}

#[async_trait]
impl SleepSessionStore for MemoryStore {
    async fn get_active(&self, user_id: Uuid) -> PortResult<Option<SleepSession>> {
        let sessions = self.sessions.lock().unwrap();
        Ok(sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.sleep_end.is_none())
            .max_by_key(|s| s.sleep_start)
            .cloned())
    }

    async fn get_last_completed(&self, user_id: Uuid) -> PortResult<Option<SleepSession>> {
        let sessions = self.sessions.lock().unwrap();
        Ok(sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.sleep_end.is_some())
            .max_by_key(|s| s.sleep_end)
            .cloned())
    }

    async fn create(&self, user_id: Uuid, sleep_start: DateTime<Utc>)
        -> PortResult<SleepSession>
    {
        Ok(self.seed_active(user_id, sleep_start))
    }

    async fn complete(
        &self,
        session_id: Uuid,
        sleep_end: DateTime<Utc>,
        duration_hours: f64,
    ) -> PortResult<SleepSession> {
        self.update(session_id, |s| {
            s.sleep_end = Some(sleep_end);
            s.duration_hours = Some(duration_hours);
        })
    }

    async fn set_quality_rating(&self, session_id: Uuid, rating: f64)
        -> PortResult<SleepSession>
    {
        self.update(session_id, |s| s.quality_rating = Some(rating))
    }

    async fn set_note(&self, session_id: Uuid, note: &str) -> PortResult<SleepSession> {
        self.update(session_id, |s| s.note = Some(note.to_string()))
    }

    async fn delete(&self, session_id: Uuid) -> PortResult<()> {
        self.sessions.lock().unwrap().retain(|s| s.id != session_id);
        Ok(())
    }

    async fn list_range(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        completed_only: bool,
    ) -> PortResult<Vec<SleepSession>> {
        let sessions = self.sessions.lock().unwrap();
        let mut matching: Vec<SleepSession> = sessions
            .iter()
            .filter(|s| {
                s.user_id == user_id
                    && s.sleep_start >= start
                    && s.sleep_start <= end
                    && (!completed_only || s.sleep_end.is_some())
            })
            .cloned()
            .collect();
        matching.sort_by_key(|s| s.sleep_start);
        Ok(matching)
    }

    async fn list_all(&self, user_id: Uuid, completed_only: bool)
        -> PortResult<Vec<SleepSession>>
    {
        let sessions = self.sessions.lock().unwrap();
        let mut matching: Vec<SleepSession> = sessions
            .iter()
            .filter(|s| s.user_id == user_id && (!completed_only || s.sleep_end.is_some()))
            .cloned()
            .collect();
        matching.sort_by_key(|s| std::cmp::Reverse(s.sleep_start));
        Ok(matching)
    }

    async fn first_session_start(&self, user_id: Uuid) -> PortResult<Option<DateTime<Utc>>> {
        let sessions = self.sessions.lock().unwrap();
        Ok(sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.sleep_start)
            .min())
    }

    async fn aggregate(
        &self,
        user_id: Uuid,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> PortResult<SleepStatistics> {
        let sessions = self.sessions.lock().unwrap();
        let completed: Vec<&SleepSession> = sessions
            .iter()
            .filter(|s| {
                s.user_id == user_id
                    && s.sleep_end.is_some()
                    && start.map_or(true, |b| s.sleep_start >= b)
                    && end.map_or(true, |b| s.sleep_start <= b)
            })
            .collect();

        if completed.is_empty() {
            return Ok(SleepStatistics::default());
        }

        let round2 = |v: f64| (v * 100.0).round() / 100.0;
        let total: f64 = completed.iter().filter_map(|s| s.duration_hours).sum();
        let ratings: Vec<f64> = completed.iter().filter_map(|s| s.quality_rating).collect();
        Ok(SleepStatistics {
            total_sessions: completed.len() as i64,
            avg_duration: round2(total / completed.len() as f64),
            avg_quality: if ratings.is_empty() {
                0.0
            } else {
                round2(ratings.iter().sum::<f64>() / ratings.len() as f64)
            },
            total_sleep_hours: round2(total),
        })
    }
}
