//! services/api/src/web/chat.rs
//!
//! One user turn in, localized replies out.
//!
//! Parses the message into an intent, routes it through a single dispatch
//! `match`, and drives the multi-step flows (onboarding, start-conflict
//! resolution, late-update confirmation, statistics export) via the
//! persisted dialogue state machine.

use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use sleep_assistant_core::domain::{
    ConflictResolution, Language, NewUserProfile, SleepGoals, UpdateField, UpdateValidation, User,
};
use sleep_assistant_core::ports::{PortError, PortResult};
use sleep_assistant_core::sleep::{
    duration_hours, format_duration, format_time_ago, GOAL_MET_PERCENTAGE, MAX_QUALITY_RATING,
    MIN_QUALITY_RATING,
};
use sleep_assistant_core::timezone;
use tracing::{info, warn};

use crate::export::{self, ExportFormat};
use crate::web::dialog::{
    self, DialogState, OnboardingStep, PendingUpdate, StatsQuery, StatsRangeStep,
};
use crate::web::protocol::{ChatRequest, ChatResponse, ExportAttachment};
use crate::web::state::AppState;

//=========================================================================================
// Intent Parsing
//=========================================================================================

/// Parsed user intent. The command set mirrors the assistant's /help text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Start,
    Help,
    Sleep,
    Wake,
    Quality(Option<String>),
    Note(Option<String>),
    Stats,
    Language(Option<String>),
    Cancel,
    Freeform(String),
}

pub fn parse_intent(text: &str) -> Intent {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Intent::Freeform(trimmed.to_string());
    };

    let mut parts = rest.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or_default();
    let arg = parts
        .next()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    match command {
        "start" => Intent::Start,
        "help" => Intent::Help,
        "sleep" => Intent::Sleep,
        "wake" => Intent::Wake,
        "quality" => Intent::Quality(arg),
        "note" => Intent::Note(arg),
        "stats" => Intent::Stats,
        "language" => Intent::Language(arg),
        "cancel" => Intent::Cancel,
        _ => Intent::Freeform(trimmed.to_string()),
    }
}

//=========================================================================================
// Entry Point
//=========================================================================================

/// Process one chat turn for the user identified by `req.chat_id`.
pub async fn handle_chat_message(app: &AppState, req: ChatRequest) -> PortResult<ChatResponse> {
    let profile = NewUserProfile {
        username: req.username.clone(),
        first_name: req.first_name.clone(),
        last_name: req.last_name.clone(),
        language: Language::from_code_or_default(req.language_code.as_deref()),
        timezone: app.config.default_timezone.clone(),
    };
    let (user, created) = app.users.get_or_create(req.chat_id, &profile).await?;

    // An in-flight dialogue takes the turn, except /cancel which always
    // abandons it.
    if let Some(state) = dialog::load(&*app.dialogs, &user).await? {
        if parse_intent(&req.text) == Intent::Cancel {
            dialog::clear(&*app.dialogs, &user).await?;
            return Ok(reply(app, &user, "commands.cancel.done", &[]));
        }
        return continue_dialog(app, &user, state, req.text.trim()).await;
    }

    match parse_intent(&req.text) {
        Intent::Start => handle_start(app, &user, created).await,
        Intent::Help => Ok(help_response(app, &user)),
        Intent::Sleep => handle_sleep(app, &user).await,
        Intent::Wake => handle_wake(app, &user).await,
        Intent::Quality(arg) => handle_quality(app, &user, arg.as_deref()).await,
        Intent::Note(arg) => handle_note(app, &user, arg.as_deref()).await,
        Intent::Stats => handle_stats(app, &user).await,
        Intent::Language(arg) => handle_language(app, &user, arg.as_deref()).await,
        Intent::Cancel => Ok(reply(app, &user, "commands.cancel.nothing", &[])),
        Intent::Freeform(_) => Ok(reply(app, &user, "commands.unknown", &[])),
    }
}

fn text(app: &AppState, user: &User, key: &str, args: &[(&str, String)]) -> String {
    app.localization.get(key, user.language, args)
}

fn reply(app: &AppState, user: &User, key: &str, args: &[(&str, String)]) -> ChatResponse {
    ChatResponse::reply(text(app, user, key, args))
}

fn display_name(user: &User) -> String {
    user.first_name
        .clone()
        .or_else(|| user.username.clone())
        .unwrap_or_default()
}

//=========================================================================================
// Command Handlers
//=========================================================================================

async fn handle_start(app: &AppState, user: &User, created: bool) -> PortResult<ChatResponse> {
    if created || !user.is_onboarded {
        dialog::save(
            &*app.dialogs,
            user,
            &DialogState::Onboarding(OnboardingStep::Language),
        )
        .await?;
        info!(chat_id = user.chat_id, new_user = created, "user_started");
        return Ok(ChatResponse::replies(vec![
            text(app, user, "commands.start.welcome", &[("name", display_name(user))]),
            text(app, user, "commands.start.description", &[]),
            text(app, user, "commands.start.onboarding.question_language", &[]),
        ]));
    }

    Ok(ChatResponse::replies(vec![
        text(app, user, "commands.start.welcome", &[("name", display_name(user))]),
        text(app, user, "commands.help.commands_list", &[]),
    ]))
}

fn help_response(app: &AppState, user: &User) -> ChatResponse {
    ChatResponse::replies(vec![
        text(app, user, "commands.help.title", &[]),
        text(app, user, "commands.help.commands_list", &[]),
    ])
}

async fn handle_sleep(app: &AppState, user: &User) -> PortResult<ChatResponse> {
    match app.tracker.start_sleep(user).await {
        Ok(session) => {
            let time = timezone::format_local_time(session.sleep_start, &user.timezone);
            Ok(reply(app, user, "commands.sleep.started", &[("time", time)]))
        }
        Err(PortError::Conflict(_)) => {
            let Some(active) = app.tracker.active_session(user).await? else {
                // The conflicting session vanished between the two reads;
                // starting again is now safe.
                let session = app.tracker.start_sleep(user).await?;
                let time = timezone::format_local_time(session.sleep_start, &user.timezone);
                return Ok(reply(app, user, "commands.sleep.started", &[("time", time)]));
            };

            let elapsed = duration_hours(active.sleep_start, Utc::now());
            let (h, m) = format_duration(elapsed);
            let time = timezone::format_local_time(active.sleep_start, &user.timezone);
            dialog::save(&*app.dialogs, user, &DialogState::ConflictPrompt).await?;
            info!(
                chat_id = user.chat_id,
                active_session_id = %active.id,
                "sleep_conflict_detected"
            );
            Ok(ChatResponse::replies(vec![
                text(
                    app,
                    user,
                    "commands.sleep.already_active",
                    &[
                        ("time", time),
                        ("duration", h.to_string()),
                        ("minutes", m.to_string()),
                    ],
                ),
                text(app, user, "commands.sleep.conflict_options", &[]),
            ]))
        }
        Err(e) => Err(e),
    }
}

async fn handle_wake(app: &AppState, user: &User) -> PortResult<ChatResponse> {
    let completed = match app.tracker.end_sleep(user).await {
        Ok(session) => session,
        Err(PortError::NotFound(_)) => {
            warn!(chat_id = user.chat_id, "no_sleep_session");
            return Ok(reply(app, user, "commands.wake.no_active_session", &[]));
        }
        Err(e) => return Err(e),
    };

    let Some(sleep_end) = completed.sleep_end else {
        return Err(PortError::Unexpected(
            "completed session has no end time".to_string(),
        ));
    };

    let sleep_time = timezone::format_local_time(completed.sleep_start, &user.timezone);
    let wake_time = timezone::format_local_time(sleep_end, &user.timezone);
    let (h, m) = format_duration(completed.duration_hours.unwrap_or(0.0));

    let goal_comparison = match app.tracker.goal_percentage(user, &completed) {
        Some(percentage) => {
            let key = if percentage >= GOAL_MET_PERCENTAGE {
                "commands.wake.goal_met"
            } else {
                "commands.wake.goal_not_met"
            };
            text(
                app,
                user,
                key,
                &[
                    ("percentage", percentage.to_string()),
                    (
                        "target_hours",
                        user.target_sleep_hours.unwrap_or_default().to_string(),
                    ),
                ],
            )
        }
        None => text(app, user, "commands.wake.no_goal", &[]),
    };

    info!(
        chat_id = user.chat_id,
        session_id = %completed.id,
        duration = completed.duration_hours,
        "wake_completed"
    );
    Ok(reply(
        app,
        user,
        "commands.wake.completed",
        &[
            ("sleep_time", sleep_time),
            ("wake_time", wake_time),
            ("duration", h.to_string()),
            ("minutes", m.to_string()),
            ("goal_comparison", goal_comparison),
        ],
    ))
}

async fn handle_quality(
    app: &AppState,
    user: &User,
    arg: Option<&str>,
) -> PortResult<ChatResponse> {
    let Some(raw) = arg else {
        return Ok(reply(app, user, "commands.quality.invalid_format", &[]));
    };
    // Both comma and dot are accepted as the decimal separator.
    let Ok(rating) = raw.replace(',', ".").parse::<f64>() else {
        return Ok(reply(app, user, "commands.quality.invalid_format", &[]));
    };
    if !(MIN_QUALITY_RATING..=MAX_QUALITY_RATING).contains(&rating) {
        return Ok(reply(app, user, "commands.quality.invalid_range", &[]));
    }

    let Some(last) = app.tracker.last_completed_session(user).await? else {
        info!(chat_id = user.chat_id, "quality_no_session");
        return Ok(reply(app, user, "commands.quality.no_last_session", &[]));
    };

    let has_existing = last.quality_rating.is_some();
    let (decision, hours_since_wake) =
        app.tracker
            .validate_update(&last, UpdateField::Quality, has_existing);
    match decision {
        UpdateValidation::Allow => {
            app.tracker.add_quality_rating(&last, rating).await?;
            Ok(reply(
                app,
                user,
                "commands.quality.saved",
                &[("rating", rating.to_string())],
            ))
        }
        UpdateValidation::AskConfirmation => {
            dialog::save(
                &*app.dialogs,
                user,
                &DialogState::ConfirmUpdate(PendingUpdate::Quality {
                    session_id: last.id,
                    rating,
                }),
            )
            .await?;
            let existing = last
                .quality_rating
                .map(|q| q.to_string())
                .unwrap_or_default();
            Ok(reply(
                app,
                user,
                "commands.quality.confirm_overwrite",
                &[("existing", existing), ("proposed", rating.to_string())],
            ))
        }
        UpdateValidation::ShowWarning => {
            dialog::save(
                &*app.dialogs,
                user,
                &DialogState::ConfirmUpdate(PendingUpdate::Quality {
                    session_id: last.id,
                    rating,
                }),
            )
            .await?;
            Ok(reply(
                app,
                user,
                "commands.quality.stale_warning",
                &[
                    ("time_ago", format_time_ago(hours_since_wake)),
                    ("proposed", rating.to_string()),
                ],
            ))
        }
    }
}

async fn handle_note(app: &AppState, user: &User, arg: Option<&str>) -> PortResult<ChatResponse> {
    let note_text = arg.map(str::trim).filter(|t| !t.is_empty());
    let Some(note_text) = note_text else {
        return Ok(reply(app, user, "commands.note.empty", &[]));
    };

    let Some(last) = app.tracker.last_completed_session(user).await? else {
        info!(chat_id = user.chat_id, "note_no_session");
        return Ok(reply(app, user, "commands.note.no_last_session", &[]));
    };

    let has_existing = last.note.is_some();
    let (decision, hours_since_wake) =
        app.tracker.validate_update(&last, UpdateField::Note, has_existing);
    match decision {
        UpdateValidation::Allow => {
            app.tracker.add_note(&last, note_text).await?;
            // Nudge towards rating the night when it has none yet.
            let key = if last.quality_rating.is_none() {
                "commands.note.saved_suggest_quality"
            } else {
                "commands.note.saved"
            };
            Ok(reply(app, user, key, &[("note", note_text.to_string())]))
        }
        UpdateValidation::AskConfirmation => {
            dialog::save(
                &*app.dialogs,
                user,
                &DialogState::ConfirmUpdate(PendingUpdate::Note {
                    session_id: last.id,
                    text: note_text.to_string(),
                }),
            )
            .await?;
            let existing = last.note.clone().unwrap_or_default();
            Ok(reply(
                app,
                user,
                "commands.note.confirm_overwrite",
                &[("existing", existing), ("proposed", note_text.to_string())],
            ))
        }
        UpdateValidation::ShowWarning => {
            dialog::save(
                &*app.dialogs,
                user,
                &DialogState::ConfirmUpdate(PendingUpdate::Note {
                    session_id: last.id,
                    text: note_text.to_string(),
                }),
            )
            .await?;
            Ok(reply(
                app,
                user,
                "commands.note.stale_warning",
                &[("time_ago", format_time_ago(hours_since_wake))],
            ))
        }
    }
}

async fn handle_stats(app: &AppState, user: &User) -> PortResult<ChatResponse> {
    if !app.stats.has_any_data(user).await? {
        info!(chat_id = user.chat_id, "stats_no_data");
        return Ok(reply(app, user, "commands.stats.no_data", &[]));
    }

    dialog::save(&*app.dialogs, user, &DialogState::StatsPeriod).await?;
    Ok(ChatResponse::replies(vec![
        text(app, user, "commands.stats.title", &[]),
        text(app, user, "commands.stats.select_period", &[]),
    ]))
}

async fn handle_language(
    app: &AppState,
    user: &User,
    arg: Option<&str>,
) -> PortResult<ChatResponse> {
    let language = arg.and_then(|code| Language::from_code(&code.to_lowercase()));
    let Some(language) = language else {
        return Ok(reply(app, user, "commands.language.select", &[]));
    };

    let updated = app.users.update_language(user, language).await?;
    Ok(reply(app, &updated, "commands.language.changed", &[]))
}

//=========================================================================================
// Dialogue Continuations
//=========================================================================================

async fn continue_dialog(
    app: &AppState,
    user: &User,
    state: DialogState,
    input: &str,
) -> PortResult<ChatResponse> {
    match state {
        DialogState::Onboarding(step) => continue_onboarding(app, user, step, input).await,
        DialogState::ConflictPrompt => continue_conflict(app, user, input).await,
        DialogState::ConfirmUpdate(pending) => {
            continue_confirmation(app, user, pending, input).await
        }
        DialogState::StatsPeriod => continue_stats_period(app, user, input).await,
        DialogState::StatsCustomRange(step) => {
            continue_stats_range(app, user, step, input).await
        }
        DialogState::StatsFormat(query) => continue_stats_format(app, user, query, input).await,
    }
}

fn parse_time_of_day(input: &str) -> Option<NaiveTime> {
    let (h, m) = input.trim().split_once(':')?;
    NaiveTime::from_hms_opt(h.trim().parse().ok()?, m.trim().parse().ok()?, 0)
}

async fn continue_onboarding(
    app: &AppState,
    user: &User,
    step: OnboardingStep,
    input: &str,
) -> PortResult<ChatResponse> {
    match step {
        OnboardingStep::Language => {
            let Some(language) = Language::from_code(&input.to_lowercase()) else {
                return Ok(reply(
                    app,
                    user,
                    "commands.start.onboarding.invalid_language",
                    &[],
                ));
            };
            let user = app.users.update_language(user, language).await?;
            dialog::save(
                &*app.dialogs,
                &user,
                &DialogState::Onboarding(OnboardingStep::Bedtime),
            )
            .await?;
            Ok(reply(app, &user, "commands.start.onboarding.question_bedtime", &[]))
        }
        OnboardingStep::Bedtime => {
            let Some(bedtime) = parse_time_of_day(input) else {
                return Ok(reply(app, user, "commands.start.onboarding.invalid_time", &[]));
            };
            dialog::save(
                &*app.dialogs,
                user,
                &DialogState::Onboarding(OnboardingStep::WakeTime { bedtime }),
            )
            .await?;
            info!(chat_id = user.chat_id, "onboarding_bedtime_set");
            Ok(reply(app, user, "commands.start.onboarding.question_waketime", &[]))
        }
        OnboardingStep::WakeTime { bedtime } => {
            let Some(wake_time) = parse_time_of_day(input) else {
                return Ok(reply(app, user, "commands.start.onboarding.invalid_time", &[]));
            };
            dialog::save(
                &*app.dialogs,
                user,
                &DialogState::Onboarding(OnboardingStep::TargetHours { bedtime, wake_time }),
            )
            .await?;
            info!(chat_id = user.chat_id, "onboarding_waketime_set");
            Ok(reply(
                app,
                user,
                "commands.start.onboarding.question_target_hours",
                &[],
            ))
        }
        OnboardingStep::TargetHours { bedtime, wake_time } => {
            let target_hours = input.trim().parse::<i32>().ok().filter(|h| (1..=24).contains(h));
            let Some(target_hours) = target_hours else {
                return Ok(reply(app, user, "commands.start.onboarding.invalid_hours", &[]));
            };
            dialog::save(
                &*app.dialogs,
                user,
                &DialogState::Onboarding(OnboardingStep::Timezone {
                    bedtime,
                    wake_time,
                    target_hours,
                }),
            )
            .await?;
            info!(chat_id = user.chat_id, target_hours, "onboarding_target_hours_set");
            Ok(reply(app, user, "commands.start.onboarding.question_timezone", &[]))
        }
        OnboardingStep::Timezone {
            bedtime,
            wake_time,
            target_hours,
        } => {
            let tz_name = input.trim();
            if !timezone::is_valid(tz_name) {
                return Ok(reply(
                    app,
                    user,
                    "commands.start.onboarding.invalid_timezone",
                    &[],
                ));
            }

            let user = app.users.update_timezone(user, tz_name).await?;
            let goals = SleepGoals {
                target_bedtime: Some(bedtime),
                target_wake_time: Some(wake_time),
                target_sleep_hours: Some(target_hours),
            };
            let user = app.users.complete_onboarding(&user, &goals).await?;
            dialog::clear(&*app.dialogs, &user).await?;
            info!(chat_id = user.chat_id, timezone = tz_name, "onboarding_completed");
            Ok(reply(app, &user, "commands.start.onboarding.completed", &[]))
        }
    }
}

async fn continue_conflict(app: &AppState, user: &User, input: &str) -> PortResult<ChatResponse> {
    let resolution = match input.trim() {
        "1" => Some(ConflictResolution::SaveAndStart),
        "2" => Some(ConflictResolution::Continue),
        "3" => Some(ConflictResolution::CancelAndStart),
        _ => None,
    };
    let Some(resolution) = resolution else {
        return Ok(reply(app, user, "commands.sleep.conflict_unrecognized", &[]));
    };

    dialog::clear(&*app.dialogs, user).await?;
    let (completed, started) = app.tracker.resolve_conflict(user, resolution).await?;

    match resolution {
        ConflictResolution::SaveAndStart => {
            let (Some(completed), Some(started)) = (completed, started) else {
                return Err(PortError::Unexpected(
                    "save-and-start produced no sessions".to_string(),
                ));
            };
            let (h, m) = format_duration(completed.duration_hours.unwrap_or(0.0));
            let time = timezone::format_local_time(started.sleep_start, &user.timezone);
            info!(
                chat_id = user.chat_id,
                old_session_id = %completed.id,
                new_session_id = %started.id,
                "sleep_save_and_start"
            );
            Ok(reply(
                app,
                user,
                "commands.sleep.session_saved",
                &[
                    ("duration", h.to_string()),
                    ("minutes", m.to_string()),
                    ("time", time),
                ],
            ))
        }
        ConflictResolution::Continue => {
            info!(chat_id = user.chat_id, "sleep_continue");
            Ok(reply(app, user, "commands.sleep.already_active_continue", &[]))
        }
        ConflictResolution::CancelAndStart => {
            let Some(started) = started else {
                return Err(PortError::Unexpected(
                    "cancel-and-start produced no session".to_string(),
                ));
            };
            let time = timezone::format_local_time(started.sleep_start, &user.timezone);
            info!(
                chat_id = user.chat_id,
                new_session_id = %started.id,
                "sleep_cancel_and_start"
            );
            Ok(reply(app, user, "commands.sleep.session_cancelled", &[("time", time)]))
        }
    }
}

fn is_affirmative(input: &str) -> bool {
    matches!(
        input.trim().to_lowercase().as_str(),
        "yes" | "y" | "да" | "jah" | "1"
    )
}

async fn continue_confirmation(
    app: &AppState,
    user: &User,
    pending: PendingUpdate,
    input: &str,
) -> PortResult<ChatResponse> {
    dialog::clear(&*app.dialogs, user).await?;

    let discarded_key = match &pending {
        PendingUpdate::Quality { .. } => "commands.quality.discarded",
        PendingUpdate::Note { .. } => "commands.note.discarded",
    };
    if !is_affirmative(input) {
        return Ok(reply(app, user, discarded_key, &[]));
    }

    let Some(last) = app.tracker.last_completed_session(user).await? else {
        return Ok(reply(app, user, discarded_key, &[]));
    };

    match pending {
        PendingUpdate::Quality { session_id, rating } => {
            if last.id != session_id {
                // A newer session appeared since the prompt; leave it alone.
                warn!(chat_id = user.chat_id, "pending_update_outdated");
                return Ok(reply(app, user, discarded_key, &[]));
            }
            app.tracker.add_quality_rating(&last, rating).await?;
            Ok(reply(
                app,
                user,
                "commands.quality.saved",
                &[("rating", rating.to_string())],
            ))
        }
        PendingUpdate::Note { session_id, text: note_text } => {
            if last.id != session_id {
                warn!(chat_id = user.chat_id, "pending_update_outdated");
                return Ok(reply(app, user, discarded_key, &[]));
            }
            let had_note = last.note.is_some();
            app.tracker.add_note(&last, &note_text).await?;
            let key = if had_note {
                "commands.note.updated"
            } else {
                "commands.note.saved"
            };
            Ok(reply(app, user, key, &[("note", note_text)]))
        }
    }
}

async fn continue_stats_period(
    app: &AppState,
    user: &User,
    input: &str,
) -> PortResult<ChatResponse> {
    let now = Utc::now();
    let query = match input.trim() {
        "1" => StatsQuery {
            start: Some(now - Duration::days(7)),
            end: Some(now),
            period_key: "commands.stats.period_week".to_string(),
        },
        "2" => StatsQuery {
            start: Some(now - Duration::days(30)),
            end: Some(now),
            period_key: "commands.stats.period_month".to_string(),
        },
        "3" => StatsQuery {
            start: None,
            end: None,
            period_key: "commands.stats.period_all".to_string(),
        },
        "4" => {
            dialog::save(
                &*app.dialogs,
                user,
                &DialogState::StatsCustomRange(StatsRangeStep::From),
            )
            .await?;
            return Ok(reply(app, user, "commands.stats.custom_date_from", &[]));
        }
        _ => return Ok(reply(app, user, "commands.stats.invalid_period", &[])),
    };

    dialog::save(&*app.dialogs, user, &DialogState::StatsFormat(query)).await?;
    Ok(reply(app, user, "commands.stats.select_format", &[]))
}

async fn continue_stats_range(
    app: &AppState,
    user: &User,
    step: StatsRangeStep,
    input: &str,
) -> PortResult<ChatResponse> {
    let Ok(date) = NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d") else {
        return Ok(reply(app, user, "commands.stats.invalid_date", &[]));
    };

    match step {
        StatsRangeStep::From => {
            dialog::save(
                &*app.dialogs,
                user,
                &DialogState::StatsCustomRange(StatsRangeStep::To { from: date }),
            )
            .await?;
            Ok(reply(app, user, "commands.stats.custom_date_to", &[]))
        }
        StatsRangeStep::To { from } => {
            if date < from {
                return Ok(reply(app, user, "commands.stats.invalid_date", &[]));
            }

            // The bounds are local dates; cover both days fully in the
            // user's own timezone.
            let start = timezone::to_utc(from.and_time(NaiveTime::MIN), &user.timezone);
            let end = timezone::to_utc(date.and_time(NaiveTime::MIN), &user.timezone)
                + Duration::days(1)
                - Duration::seconds(1);
            let query = StatsQuery {
                start: Some(start),
                end: Some(end),
                period_key: "commands.stats.period_custom".to_string(),
            };
            dialog::save(&*app.dialogs, user, &DialogState::StatsFormat(query)).await?;
            Ok(reply(app, user, "commands.stats.select_format", &[]))
        }
    }
}

async fn continue_stats_format(
    app: &AppState,
    user: &User,
    query: StatsQuery,
    input: &str,
) -> PortResult<ChatResponse> {
    let format = match input.trim().to_lowercase().as_str() {
        "1" | "csv" => ExportFormat::Csv,
        "2" | "json" => ExportFormat::Json,
        _ => return Ok(reply(app, user, "commands.stats.invalid_export_format", &[])),
    };

    dialog::clear(&*app.dialogs, user).await?;

    let stats = app.stats.get_statistics(user, query.start, query.end).await?;
    if stats.total_sessions == 0 {
        return Ok(reply(app, user, "commands.stats.no_data", &[]));
    }

    let rows = app
        .stats
        .prepare_export_rows(user, query.start, query.end)
        .await?;
    let bytes =
        export::encode(format, &rows).map_err(|e| PortError::Unexpected(e.to_string()))?;
    let content =
        String::from_utf8(bytes).map_err(|e| PortError::Unexpected(e.to_string()))?;

    let avg_quality = if stats.avg_quality > 0.0 {
        stats.avg_quality.to_string()
    } else {
        "N/A".to_string()
    };
    let period = text(app, user, &query.period_key, &[]);
    info!(
        chat_id = user.chat_id,
        format = format.extension(),
        sessions = stats.total_sessions,
        "stats_exported"
    );

    Ok(ChatResponse::reply(text(
        app,
        user,
        "commands.stats.exported",
        &[
            ("total_sessions", stats.total_sessions.to_string()),
            ("avg_duration", stats.avg_duration.to_string()),
            ("avg_quality", avg_quality),
            ("total_hours", stats.total_sleep_hours.to_string()),
            ("period", period),
        ],
    ))
    .with_attachment(ExportAttachment {
        filename: format!("sleep_stats_{}.{}", user.chat_id, format.extension()),
        content_type: format.content_type().to_string(),
        content,
    }))
}
