use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Application configuration loaded from ~/.meetdesk/config.json
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Root of the meeting store REST API, e.g. `http://localhost:3000/api`.
    #[serde(default = "default_api_url", alias = "api_base_url")]
    pub api_url: String,
    /// Per-request timeout. Absent means requests wait indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    /// Where the CLI keeps the logged-in session between runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_path: Option<String>,
    #[serde(default = "default_upcoming_window_days")]
    pub upcoming_window_days: i64,
}

fn default_api_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_upcoming_window_days() -> i64 {
    7
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            request_timeout_secs: None,
            session_path: None,
            upcoming_window_days: default_upcoming_window_days(),
        }
    }
}

/// Lifecycle state of a meeting. Each state is backed by its own collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingStatus {
    Pending,
    Confirmed,
    Denied,
}

impl MeetingStatus {
    pub const ALL: [MeetingStatus; 3] = [
        MeetingStatus::Pending,
        MeetingStatus::Confirmed,
        MeetingStatus::Denied,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingStatus::Pending => "pending",
            MeetingStatus::Confirmed => "confirmed",
            MeetingStatus::Denied => "denied",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(MeetingStatus::Pending),
            "confirmed" => Some(MeetingStatus::Confirmed),
            "denied" => Some(MeetingStatus::Denied),
            _ => None,
        }
    }
}

impl std::fmt::Display for MeetingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A meeting row as held by one of the store's status collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: i64,
    pub title: String,
    #[serde(with = "wire::date")]
    pub meeting_date: NaiveDate,
    #[serde(deserialize_with = "wire::time")]
    pub start_time: String,
    #[serde(
        default,
        deserialize_with = "wire::optional_time",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_time: Option<String>,
    #[serde(default)]
    pub location: String,
    #[serde(default, deserialize_with = "wire::count")]
    pub participants_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub responsible: String,
    #[serde(default)]
    pub responsible_department: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MeetingStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Meeting {
    /// The insert payload that reproduces this meeting in another collection.
    pub fn to_draft(&self) -> MeetingDraft {
        MeetingDraft {
            title: self.title.clone(),
            meeting_date: self.meeting_date,
            start_time: self.start_time.clone(),
            end_time: self.end_time.clone(),
            location: self.location.clone(),
            participants_count: self.participants_count,
            description: self.description.clone(),
            responsible: self.responsible.clone(),
            responsible_department: self.responsible_department.clone(),
        }
    }

    pub fn with_status(mut self, status: MeetingStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Applies a patch locally, mirroring what the store does on PUT.
    pub fn apply(&mut self, patch: &MeetingPatch) {
        if let Some(ref v) = patch.title {
            self.title = v.clone();
        }
        if let Some(v) = patch.meeting_date {
            self.meeting_date = v;
        }
        if let Some(ref v) = patch.start_time {
            self.start_time = v.clone();
        }
        if let Some(ref v) = patch.end_time {
            self.end_time = Some(v.clone());
        }
        if let Some(ref v) = patch.location {
            self.location = v.clone();
        }
        if let Some(v) = patch.participants_count {
            self.participants_count = v;
        }
        if let Some(ref v) = patch.description {
            self.description = Some(v.clone());
        }
        if let Some(ref v) = patch.responsible {
            self.responsible = v.clone();
        }
        if let Some(ref v) = patch.responsible_department {
            self.responsible_department = v.clone();
        }
    }
}

/// A meeting that has not been stored yet. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingDraft {
    pub title: String,
    #[serde(with = "wire::date")]
    pub meeting_date: NaiveDate,
    pub start_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    pub location: String,
    pub participants_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub responsible: String,
    pub responsible_department: String,
}

impl MeetingDraft {
    /// Checks required fields before submission.
    ///
    /// Missing fields are reported together; malformed values are reported
    /// one at a time, after the missing-field check passes.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut missing = Vec::new();
        if self.title.trim().is_empty() {
            missing.push("title");
        }
        if self.start_time.trim().is_empty() {
            missing.push("start_time");
        }
        if self.end_time.as_deref().map_or(true, |t| t.trim().is_empty()) {
            missing.push("end_time");
        }
        if self.location.trim().is_empty() {
            missing.push("location");
        }
        if self.participants_count == 0 {
            missing.push("participants_count");
        }
        if self.responsible.trim().is_empty() {
            missing.push("responsible");
        }
        if self.responsible_department.trim().is_empty() {
            missing.push("responsible_department");
        }
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields(missing));
        }

        let start = parse_time("start_time", &self.start_time)?;
        let end = parse_time("end_time", self.end_time.as_deref().unwrap_or_default())?;
        if end <= start {
            return Err(ValidationError::InvalidField {
                field: "end_time",
                reason: format!("{} is not after {}", end.format("%H:%M"), start.format("%H:%M")),
            });
        }
        Ok(())
    }
}

/// Partial update of a confirmed meeting. Only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeetingPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        default,
        with = "wire::optional_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub meeting_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible_department: Option<String>,
}

impl MeetingPatch {
    pub fn is_empty(&self) -> bool {
        *self == MeetingPatch::default()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::EmptyPatch);
        }
        if let Some(ref title) = self.title {
            if title.trim().is_empty() {
                return Err(ValidationError::MissingFields(vec!["title"]));
            }
        }
        if let Some(ref t) = self.start_time {
            parse_time("start_time", t)?;
        }
        if let Some(ref t) = self.end_time {
            parse_time("end_time", t)?;
        }
        if self.participants_count == Some(0) {
            return Err(ValidationError::MissingFields(vec!["participants_count"]));
        }
        Ok(())
    }
}

/// Dashboard counters. Derived, never authoritative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(default, deserialize_with = "wire::count64")]
    pub total: u64,
    #[serde(default, deserialize_with = "wire::count64")]
    pub confirmed: u64,
    #[serde(default, deserialize_with = "wire::count64")]
    pub pending: u64,
    #[serde(default, deserialize_with = "wire::count64")]
    pub denied: u64,
    #[serde(default, deserialize_with = "wire::count64")]
    pub upcoming: u64,
    #[serde(default, deserialize_with = "wire::count64")]
    pub past: u64,
}

fn parse_time(field: &'static str, value: &str) -> Result<NaiveTime, ValidationError> {
    wire::parse_time(value).ok_or_else(|| ValidationError::InvalidField {
        field,
        reason: format!("'{}' is not a time of day (HH:MM)", value),
    })
}

/// Lenient wire formats used by the meeting store.
///
/// Dates come back as `YYYY-MM-DD` or as full ISO timestamps, times as
/// `HH:MM` or `HH:MM:SS`, and counts sometimes as numeric strings.
pub(crate) mod wire {
    use chrono::{NaiveDate, NaiveTime};
    use serde::{Deserialize, Deserializer};

    pub fn parse_date(s: &str) -> Option<NaiveDate> {
        let s = s.trim();
        let head = s.get(..10).unwrap_or(s);
        NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
    }

    pub fn parse_time(s: &str) -> Option<NaiveTime> {
        let s = s.trim();
        NaiveTime::parse_from_str(s, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
            .ok()
    }

    /// Normalizes `HH:MM:SS` to `HH:MM`; anything unparseable is kept as sent.
    fn normalize_time(s: String) -> String {
        match parse_time(&s) {
            Some(t) => t.format("%H:%M").to_string(),
            None => s,
        }
    }

    pub fn time<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(normalize_time(String::deserialize(d)?))
    }

    pub fn optional_time<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(Option::<String>::deserialize(d)?
            .filter(|s| !s.trim().is_empty())
            .map(normalize_time))
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        Text(String),
    }

    pub fn count64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        match Option::<NumberOrString>::deserialize(d)? {
            None => Ok(0),
            Some(NumberOrString::Number(n)) => Ok(n),
            Some(NumberOrString::Text(s)) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| serde::de::Error::custom(format!("invalid count '{}'", s))),
        }
    }

    pub fn count<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        let n = count64(d)?;
        u32::try_from(n).map_err(|_| serde::de::Error::custom(format!("count {} too large", n)))
    }

    pub mod date {
        use chrono::NaiveDate;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
            s.serialize_str(&date.format("%Y-%m-%d").to_string())
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
            let raw = String::deserialize(d)?;
            super::parse_date(&raw)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid date '{}'", raw)))
        }
    }

    pub mod optional_date {
        use chrono::NaiveDate;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(date: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
            match date {
                Some(d) => super::date::serialize(d, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
            match Option::<String>::deserialize(d)? {
                None => Ok(None),
                Some(raw) => super::parse_date(&raw)
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid date '{}'", raw))),
            }
        }
    }
}
