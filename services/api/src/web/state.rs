//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use std::sync::Arc;

use sleep_assistant_core::{
    DialogStateStore, SleepTracker, StatisticsService, UserDirectory,
};

use crate::config::Config;
use crate::localization::LocalizationService;

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub users: UserDirectory,
    pub tracker: SleepTracker,
    pub stats: StatisticsService,
    pub dialogs: Arc<dyn DialogStateStore>,
    pub localization: Arc<LocalizationService>,
    pub config: Arc<Config>,
}
