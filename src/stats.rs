//! Dashboard and report aggregation.
//!
//! Pure functions over a meeting list. Nothing here is cached or stored;
//! callers recompute after every fetch.

use std::collections::HashMap;

use chrono::{Duration, Local, NaiveDate};
use serde::Serialize;

use crate::filter::ReportFilters;
use crate::types::{Meeting, MeetingStatus, Statistics};

/// Bucket for meetings without a responsible department.
pub const NO_DEPARTMENT: &str = "No department";

/// Days ahead (inclusive) that count as "upcoming".
pub const UPCOMING_WINDOW_DAYS: i64 = 7;

/// Days covered by the report timeline, ending today.
pub const TIMELINE_DAYS: i64 = 30;

/// Last day of the upcoming window. Saturates at `NaiveDate::MAX`.
pub fn upcoming_horizon(today: NaiveDate, window_days: i64) -> NaiveDate {
    Duration::try_days(window_days)
        .and_then(|d| today.checked_add_signed(d))
        .unwrap_or(NaiveDate::MAX)
}

pub fn compute_statistics(meetings: &[Meeting], today: NaiveDate) -> Statistics {
    compute_statistics_with_window(meetings, today, UPCOMING_WINDOW_DAYS)
}

/// Counts per status plus upcoming (`today ..= today + window`) and past
/// (`< today`) meetings. Rows without a status count toward `total` only.
pub fn compute_statistics_with_window(
    meetings: &[Meeting],
    today: NaiveDate,
    window_days: i64,
) -> Statistics {
    let horizon = upcoming_horizon(today, window_days);
    let mut stats = Statistics {
        total: meetings.len() as u64,
        ..Default::default()
    };

    for m in meetings {
        match m.status {
            Some(MeetingStatus::Confirmed) => stats.confirmed += 1,
            Some(MeetingStatus::Pending) => stats.pending += 1,
            Some(MeetingStatus::Denied) => stats.denied += 1,
            None => {}
        }
        if m.meeting_date >= today && m.meeting_date <= horizon {
            stats.upcoming += 1;
        } else if m.meeting_date < today {
            stats.past += 1;
        }
    }
    stats
}

/// Statistics as of the local calendar date.
pub fn statistics_today(meetings: &[Meeting]) -> Statistics {
    compute_statistics(meetings, Local::now().date_naive())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakdownEntry {
    pub key: String,
    pub count: usize,
}

/// Sums `weight` per `key`, sorted by total descending; ties keep first-seen order.
fn breakdown<'a, I, K, W>(meetings: I, key: K, weight: W) -> Vec<BreakdownEntry>
where
    I: IntoIterator<Item = &'a Meeting>,
    K: Fn(&Meeting) -> String,
    W: Fn(&Meeting) -> usize,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut entries: Vec<BreakdownEntry> = Vec::new();

    for m in meetings {
        let k = key(m);
        let w = weight(m);
        match index.get(&k) {
            Some(&i) => entries[i].count += w,
            None => {
                index.insert(k.clone(), entries.len());
                entries.push(BreakdownEntry { key: k, count: w });
            }
        }
    }

    // sort_by is stable
    entries.sort_by(|a, b| b.count.cmp(&a.count));
    entries
}

fn department_key(m: &Meeting) -> String {
    let dept = m.responsible_department.trim();
    if dept.is_empty() {
        NO_DEPARTMENT.to_string()
    } else {
        dept.to_string()
    }
}

pub fn by_department<'a, I>(meetings: I) -> Vec<BreakdownEntry>
where
    I: IntoIterator<Item = &'a Meeting>,
{
    breakdown(meetings, department_key, |_| 1)
}

/// Participants summed per department.
pub fn participants_by_department<'a, I>(meetings: I) -> Vec<BreakdownEntry>
where
    I: IntoIterator<Item = &'a Meeting>,
{
    breakdown(meetings, department_key, |m| m.participants_count as usize)
}

/// Meetings per day over the `TIMELINE_DAYS` days ending `today`, oldest
/// first. Days without meetings are present with a zero count.
pub fn timeline<'a, I>(meetings: I, today: NaiveDate) -> Vec<(NaiveDate, usize)>
where
    I: IntoIterator<Item = &'a Meeting>,
{
    let mut days: Vec<(NaiveDate, usize)> = (0..TIMELINE_DAYS)
        .rev()
        .filter_map(|back| today.checked_sub_signed(Duration::days(back)))
        .map(|day| (day, 0))
        .collect();
    let Some(first) = days.first().map(|(d, _)| *d) else {
        return days;
    };

    for m in meetings {
        if m.meeting_date < first || m.meeting_date > today {
            continue;
        }
        let offset = (m.meeting_date - first).num_days() as usize;
        if let Some(slot) = days.get_mut(offset) {
            slot.1 += 1;
        }
    }
    days
}

pub fn by_location<'a, I>(meetings: I) -> Vec<BreakdownEntry>
where
    I: IntoIterator<Item = &'a Meeting>,
{
    breakdown(meetings, |m| m.location.clone(), |_| 1)
}

/// Distinct values in first-seen order, skipping blanks.
fn distinct<'a, I, F>(meetings: I, key: F) -> Vec<String>
where
    I: IntoIterator<Item = &'a Meeting>,
    F: Fn(&Meeting) -> &str,
{
    let mut seen = std::collections::HashSet::new();
    meetings
        .into_iter()
        .map(|m| key(m).trim().to_string())
        .filter(|k| !k.is_empty() && seen.insert(k.clone()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub statistics: Statistics,
    pub total_participants: u64,
    pub avg_participants: u64,
    pub by_department: Vec<BreakdownEntry>,
    pub by_location: Vec<BreakdownEntry>,
    pub participants_by_department: Vec<BreakdownEntry>,
    /// Daily meeting counts for the last 30 days.
    pub timeline: Vec<(NaiveDate, usize)>,
    /// Filter menu options, taken from the unfiltered list.
    pub locations: Vec<String>,
    pub departments: Vec<String>,
    pub meetings: Vec<Meeting>,
}

/// Applies report filters and aggregates the result.
pub fn build_report(meetings: &[Meeting], filters: &ReportFilters, today: NaiveDate) -> ReportSummary {
    let filtered: Vec<Meeting> = filters.apply(meetings).into_iter().cloned().collect();

    let total_participants: u64 = filtered.iter().map(|m| m.participants_count as u64).sum();
    let avg_participants = if filtered.is_empty() {
        0
    } else {
        (total_participants as f64 / filtered.len() as f64).round() as u64
    };

    ReportSummary {
        statistics: compute_statistics(&filtered, today),
        total_participants,
        avg_participants,
        by_department: by_department(&filtered),
        by_location: by_location(&filtered),
        participants_by_department: participants_by_department(&filtered),
        timeline: timeline(&filtered, today),
        locations: distinct(meetings, |m| m.location.as_str()),
        departments: distinct(meetings, |m| m.responsible_department.as_str()),
        meetings: filtered,
    }
}
