//! Filter resolution for the aggregate meeting view.
//!
//! A `FilterSpec` is what the view asks for; `MeetingQuery` is the single
//! store request that answers it. Only one query is ever issued per filter:
//! a specific status overrides the canned period filters, while `custom`
//! and `month` ignore the status entirely.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{wire, Meeting, MeetingStatus};

/// Time window selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Period {
    #[default]
    All,
    #[serde(rename = "last-10-days")]
    Last10Days,
    #[serde(rename = "last-20-days")]
    Last20Days,
    LastMonth,
    LastYear,
    Upcoming,
    Past,
    Custom,
    Month,
}

impl Period {
    pub fn parse(s: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(s.trim().to_string())).ok()
    }
}

/// Status selector; `All` means no status filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Pending,
    Confirmed,
    Denied,
}

impl StatusFilter {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "all" => Some(StatusFilter::All),
            other => MeetingStatus::parse(other).map(StatusFilter::from),
        }
    }

    pub fn status(&self) -> Option<MeetingStatus> {
        match self {
            StatusFilter::All => None,
            StatusFilter::Pending => Some(MeetingStatus::Pending),
            StatusFilter::Confirmed => Some(MeetingStatus::Confirmed),
            StatusFilter::Denied => Some(MeetingStatus::Denied),
        }
    }
}

impl From<MeetingStatus> for StatusFilter {
    fn from(status: MeetingStatus) -> Self {
        match status {
            MeetingStatus::Pending => StatusFilter::Pending,
            MeetingStatus::Confirmed => StatusFilter::Confirmed,
            MeetingStatus::Denied => StatusFilter::Denied,
        }
    }
}

/// Canned server-side filters under `/meetingsTotal/filter/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CannedFilter {
    Last10Days,
    Last20Days,
    LastMonth,
    LastYear,
    Upcoming,
    Past,
}

impl CannedFilter {
    pub fn slug(&self) -> &'static str {
        match self {
            CannedFilter::Last10Days => "last-10-days",
            CannedFilter::Last20Days => "last-20-days",
            CannedFilter::LastMonth => "last-month",
            CannedFilter::LastYear => "last-year",
            CannedFilter::Upcoming => "upcoming",
            CannedFilter::Past => "past",
        }
    }
}

/// Client-held description of the meeting subset the view wants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    #[serde(default)]
    pub period: Period,
    #[serde(default)]
    pub status: StatusFilter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_end: Option<String>,
    /// `YYYY-MM`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<String>,
}

/// A single read against the aggregate view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeetingQuery {
    All,
    Canned(CannedFilter),
    Range { start: NaiveDate, end: NaiveDate },
    Month { year: i32, month: u32 },
    Status(MeetingStatus),
}

impl MeetingQuery {
    /// Path segments below the API root.
    pub fn segments(&self) -> Vec<String> {
        let mut segs = vec!["meetingsTotal".to_string()];
        match self {
            MeetingQuery::All => segs.push("all".into()),
            MeetingQuery::Canned(f) => {
                segs.push("filter".into());
                segs.push(f.slug().into());
            }
            MeetingQuery::Range { .. } => {
                segs.push("range".into());
                segs.push("dates".into());
            }
            MeetingQuery::Month { year, month } => {
                segs.push("month".into());
                segs.push(format!("{:04}-{:02}", year, month));
            }
            MeetingQuery::Status(status) => {
                segs.push("status".into());
                segs.push(status.as_str().into());
            }
        }
        segs
    }

    pub fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            MeetingQuery::Range { start, end } => vec![
                ("start", start.format("%Y-%m-%d").to_string()),
                ("end", end.format("%Y-%m-%d").to_string()),
            ],
            _ => Vec::new(),
        }
    }

    /// Relative route, e.g. `meetingsTotal/status/confirmed`.
    pub fn route(&self) -> String {
        let path = self.segments().join("/");
        let params = self.params();
        if params.is_empty() {
            return path;
        }
        let qs: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        format!("{}?{}", path, qs.join("&"))
    }

    /// Whether a row belongs to this query's answer, given `today`.
    ///
    /// The real store decides this server-side; the test store uses it.
    pub fn matches(&self, meeting: &Meeting, today: NaiveDate) -> bool {
        let date = meeting.meeting_date;
        match self {
            MeetingQuery::All => true,
            MeetingQuery::Canned(f) => {
                let days_ago = |n: i64| today - chrono::Duration::days(n);
                match f {
                    CannedFilter::Last10Days => date >= days_ago(10) && date <= today,
                    CannedFilter::Last20Days => date >= days_ago(20) && date <= today,
                    CannedFilter::LastMonth => date >= days_ago(30) && date <= today,
                    CannedFilter::LastYear => date >= days_ago(365) && date <= today,
                    CannedFilter::Upcoming => date >= today,
                    CannedFilter::Past => date < today,
                }
            }
            MeetingQuery::Range { start, end } => date >= *start && date <= *end,
            MeetingQuery::Month { year, month } => {
                use chrono::Datelike;
                date.year() == *year && date.month() == *month
            }
            MeetingQuery::Status(status) => meeting.status == Some(*status),
        }
    }
}

impl FilterSpec {
    /// Resolves the filter to exactly one store query.
    ///
    /// Incomplete or malformed `custom`/`month` selections fall back to `All`
    /// instead of producing a malformed request.
    pub fn resolve(&self) -> MeetingQuery {
        let mut query = match self.period {
            Period::All => MeetingQuery::All,
            Period::Last10Days => MeetingQuery::Canned(CannedFilter::Last10Days),
            Period::Last20Days => MeetingQuery::Canned(CannedFilter::Last20Days),
            Period::LastMonth => MeetingQuery::Canned(CannedFilter::LastMonth),
            Period::LastYear => MeetingQuery::Canned(CannedFilter::LastYear),
            Period::Upcoming => MeetingQuery::Canned(CannedFilter::Upcoming),
            Period::Past => MeetingQuery::Canned(CannedFilter::Past),
            Period::Custom => self.custom_range().unwrap_or_else(|| {
                log::warn!(
                    "Filter: custom range incomplete or invalid ({:?} .. {:?}), loading all meetings",
                    self.custom_start,
                    self.custom_end
                );
                MeetingQuery::All
            }),
            Period::Month => self.month_query().unwrap_or_else(|| {
                log::warn!(
                    "Filter: month {:?} missing or invalid, loading all meetings",
                    self.month
                );
                MeetingQuery::All
            }),
        };

        if !matches!(self.period, Period::Custom | Period::Month) {
            if let Some(status) = self.status.status() {
                query = MeetingQuery::Status(status);
            }
        }
        query
    }

    fn custom_range(&self) -> Option<MeetingQuery> {
        let start = non_empty(self.custom_start.as_deref()).and_then(wire::parse_date)?;
        let end = non_empty(self.custom_end.as_deref()).and_then(wire::parse_date)?;
        Some(MeetingQuery::Range { start, end })
    }

    fn month_query(&self) -> Option<MeetingQuery> {
        let raw = non_empty(self.month.as_deref())?;
        if raw.len() != 7 {
            return None;
        }
        let first = NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d").ok()?;
        use chrono::Datelike;
        Some(MeetingQuery::Month {
            year: first.year(),
            month: first.month(),
        })
    }
}

/// Result of a filter request. No pagination.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilteredMeetings {
    pub meetings: Vec<Meeting>,
    pub count: usize,
}

impl From<Vec<Meeting>> for FilteredMeetings {
    fn from(meetings: Vec<Meeting>) -> Self {
        Self {
            count: meetings.len(),
            meetings,
        }
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Client-side report filters applied over an already fetched list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: StatusFilter,
    /// `None` or `"all"` disables the location filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// `None` or `"all"` disables the department filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

impl ReportFilters {
    pub fn matches(&self, meeting: &Meeting) -> bool {
        if let Some(start) = self.start_date {
            if meeting.meeting_date < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if meeting.meeting_date > end {
                return false;
            }
        }
        if let Some(status) = self.status.status() {
            if meeting.status != Some(status) {
                return false;
            }
        }
        if let Some(location) = selected(self.location.as_deref()) {
            if meeting.location != location {
                return false;
            }
        }
        if let Some(department) = selected(self.department.as_deref()) {
            if meeting.responsible_department != department {
                return false;
            }
        }
        true
    }

    pub fn apply<'a>(&self, meetings: &'a [Meeting]) -> Vec<&'a Meeting> {
        meetings.iter().filter(|m| self.matches(m)).collect()
    }
}

fn selected(value: Option<&str>) -> Option<&str> {
    non_empty(value).filter(|v| !v.eq_ignore_ascii_case("all"))
}
