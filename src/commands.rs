//! View-layer intents.
//!
//! Each function is one user action. They return `Result<T, String>` (or
//! `ActionError` for lifecycle actions, which carries retry and reconcile
//! hints) and never panic; the binary decides how to render the outcome.

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::ActionError;
use crate::filter::{FilterSpec, FilteredMeetings, ReportFilters};
use crate::lifecycle::Confirmation;
use crate::reconcile::{self, MeetingSnapshot, ReconcileReport};
use crate::session::{Role, Session};
use crate::state::AppState;
use crate::stats::{build_report, compute_statistics_with_window, ReportSummary};
use crate::store::Collection;
use crate::types::{Config, Meeting, MeetingDraft, MeetingPatch, MeetingStatus, Statistics};

fn require_login(state: &AppState) -> Result<Session, String> {
    state
        .session
        .current()
        .ok_or_else(|| "Not logged in. Run `meetdesk login` first.".to_string())
}

fn require_admin(state: &AppState) -> Result<Session, String> {
    let session = require_login(state)?;
    if session.role != Role::Admin {
        return Err(format!("{} is not an administrator", session.username));
    }
    Ok(session)
}

/// Looks a meeting up in its status collection.
async fn find_meeting(
    state: &AppState,
    collection: Collection,
    id: i64,
) -> Result<Meeting, String> {
    let rows = state
        .controller
        .store()
        .list(collection)
        .await
        .map_err(|e| format!("Failed to load {}: {}", collection, e.user_message()))?;
    rows.into_iter()
        .find(|m| m.id == id)
        .map(|m| m.with_status(collection.status()))
        .ok_or_else(|| format!("Meeting {} not found in {}", id, collection))
}

fn persist_journal(state: &AppState) {
    if let Err(e) = state.persist_journal() {
        log::warn!("Commands: could not save cleanup journal: {}", e);
    }
}

pub fn get_config(state: &AppState) -> Config {
    state.config.clone()
}

pub async fn login(
    state: &AppState,
    role: Role,
    username: &str,
    password: &str,
) -> Result<Session, String> {
    let auth = state.auth_client()?;
    let session = auth
        .login(role, username, password)
        .await
        .map_err(|e| e.to_string())?;
    state.session.login(session.clone());
    state.persist_session()?;
    Ok(session)
}

pub fn logout(state: &AppState) -> Result<(), String> {
    state.session.logout();
    state.persist_session()
}

pub fn current_session(state: &AppState) -> Option<Session> {
    state.session.current()
}

/// One status collection, or every collection when `status` is `None`.
pub async fn list_meetings(
    state: &AppState,
    status: Option<MeetingStatus>,
    today: NaiveDate,
) -> Result<Vec<Meeting>, String> {
    match status {
        Some(status) => {
            let collection = Collection::from(status);
            let rows = state
                .controller
                .store()
                .list(collection)
                .await
                .map_err(|e| e.user_message())?;
            Ok(rows.into_iter().map(|m| m.with_status(status)).collect())
        }
        None => Ok(load_snapshot(state, &FilterSpec::default(), today)
            .await
            .all_by_status()),
    }
}

pub async fn load_snapshot(
    state: &AppState,
    filter: &FilterSpec,
    today: NaiveDate,
) -> MeetingSnapshot {
    reconcile::load_snapshot(state.controller.store().as_ref(), filter, today).await
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub statistics: Statistics,
    /// Awaiting a decision, oldest date first.
    pub pending: Vec<Meeting>,
    /// Confirmed meetings inside the upcoming window, soonest first.
    pub upcoming: Vec<Meeting>,
    pub stale_rows: usize,
    pub degraded: Vec<String>,
}

/// Counters plus the two lists the dashboard highlights.
///
/// Statistics are recomputed locally with the configured window; the
/// server's `/statistics` answer uses a fixed 7 days.
pub async fn dashboard(state: &AppState, today: NaiveDate) -> DashboardView {
    let snapshot = load_snapshot(state, &FilterSpec::default(), today).await;
    let window = state.config.upcoming_window_days;
    let horizon = crate::stats::upcoming_horizon(today, window);

    let statistics = if window == crate::stats::UPCOMING_WINDOW_DAYS {
        snapshot.statistics
    } else {
        compute_statistics_with_window(&snapshot.all_by_status(), today, window)
    };

    let mut pending = snapshot.pending.clone();
    pending.sort_by(|a, b| {
        (a.meeting_date, &a.start_time).cmp(&(b.meeting_date, &b.start_time))
    });

    let mut upcoming: Vec<Meeting> = snapshot
        .confirmed
        .iter()
        .filter(|m| m.meeting_date >= today && m.meeting_date <= horizon)
        .cloned()
        .collect();
    upcoming.sort_by(|a, b| {
        (a.meeting_date, &a.start_time).cmp(&(b.meeting_date, &b.start_time))
    });

    DashboardView {
        statistics,
        pending,
        upcoming,
        stale_rows: state.controller.stale_rows().len(),
        degraded: snapshot.degraded,
    }
}

pub async fn filter_meetings(
    state: &AppState,
    filter: &FilterSpec,
) -> Result<FilteredMeetings, String> {
    let query = filter.resolve();
    let rows = state
        .controller
        .store()
        .query(&query)
        .await
        .map_err(|e| format!("Failed to load {}: {}", query.route(), e.user_message()))?;
    Ok(FilteredMeetings::from(rows))
}

pub async fn create_meeting(state: &AppState, draft: &MeetingDraft) -> Result<Meeting, ActionError> {
    require_login(state)?;
    state
        .controller
        .create(draft)
        .await
        .map_err(|e| ActionError::from(&e))
}

pub async fn approve_meeting(state: &AppState, id: i64) -> Result<Meeting, ActionError> {
    require_admin(state)?;
    let meeting = find_meeting(state, Collection::Pending, id).await?;
    let result = state.controller.approve(&meeting).await;
    finish(state, result)
}

pub async fn deny_meeting(state: &AppState, id: i64) -> Result<Meeting, ActionError> {
    require_admin(state)?;
    let meeting = find_meeting(state, Collection::Pending, id).await?;
    let result = state.controller.deny(&meeting).await;
    finish(state, result)
}

pub async fn restore_meeting(state: &AppState, id: i64) -> Result<Meeting, ActionError> {
    require_admin(state)?;
    let meeting = find_meeting(state, Collection::Denied, id).await?;
    let result = state.controller.restore(&meeting).await;
    finish(state, result)
}

/// Saves the journal after a partial transition so a later run can finish it.
fn finish<T>(
    state: &AppState,
    result: Result<T, crate::error::LifecycleError>,
) -> Result<T, ActionError> {
    result.map_err(|e| {
        if e.needs_reconcile() {
            persist_journal(state);
        }
        ActionError::from(&e)
    })
}

/// Irreversible. `confirmed` must come from an explicit user answer.
pub async fn delete_meeting(
    state: &AppState,
    status: MeetingStatus,
    id: i64,
    confirmed: bool,
) -> Result<(), ActionError> {
    require_admin(state)?;
    let collection = Collection::from(status);
    let meeting = find_meeting(state, collection, id).await?;
    let confirmation = confirmed.then(|| Confirmation::for_meeting(meeting.id));

    let result = match collection {
        Collection::Denied => state.controller.permanently_delete(&meeting, confirmation).await,
        Collection::Confirmed => state.controller.delete_confirmed(&meeting, confirmation).await,
        Collection::Pending => {
            return Err(ActionError::from(
                "Pending meetings are denied, not deleted".to_string(),
            ))
        }
    };
    finish(state, result)
}

pub async fn edit_meeting(
    state: &AppState,
    id: i64,
    patch: &MeetingPatch,
) -> Result<Meeting, ActionError> {
    require_admin(state)?;
    let meeting = find_meeting(state, Collection::Confirmed, id).await?;
    let result = state.controller.edit(&meeting, patch).await;
    finish(state, result)
}

/// Report over every collection, filtered client-side.
pub async fn report(
    state: &AppState,
    filters: &ReportFilters,
    today: NaiveDate,
) -> Result<ReportSummary, String> {
    require_admin(state)?;
    let snapshot = load_snapshot(state, &FilterSpec::default(), today).await;
    if !snapshot.degraded.is_empty() {
        log::warn!(
            "Commands: report built without {}",
            snapshot.degraded.join(", ")
        );
    }
    Ok(build_report(&snapshot.all_by_status(), filters, today))
}

pub async fn reconcile_meetings(
    state: &AppState,
    filter: &FilterSpec,
    today: NaiveDate,
) -> ReconcileReport {
    let report = reconcile::reconcile(&state.controller, filter, today).await;
    persist_journal(state);
    report
}
