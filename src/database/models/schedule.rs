use chrono::{DateTime, FixedOffset, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

use super::macros::string_enum;
use crate::error::{CalendarError, Result};

/// An ISO-8601 timestamp with offset. The text received from the backend is
/// kept and written back verbatim; all arithmetic uses the parsed value in
/// its own offset, never the host's local time.
#[derive(Debug, Clone)]
pub struct Timestamp {
    raw: String,
    parsed: DateTime<FixedOffset>,
}

impl Timestamp {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let parsed = DateTime::parse_from_rfc3339(trimmed)
            .or_else(|_| DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f%#z"))
            .map_err(|e| CalendarError::invalid_date(format!("'{}': {}", raw, e)))?;

        Ok(Self {
            raw: raw.to_string(),
            parsed,
        })
    }

    pub fn from_datetime(datetime: DateTime<FixedOffset>) -> Self {
        Self {
            raw: datetime.to_rfc3339(),
            parsed: datetime,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn datetime(&self) -> DateTime<FixedOffset> {
        self.parsed
    }

    /// Calendar date in the timestamp's own offset.
    pub fn date(&self) -> NaiveDate {
        self.parsed.date_naive()
    }

    /// Fractional hour of day, e.g. 09:30 is 9.5.
    pub fn hour_of_day(&self) -> f64 {
        let time = self.parsed.time();
        time.hour() as f64 + time.minute() as f64 / 60.0 + time.second() as f64 / 3600.0
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.parsed == other.parsed
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parsed.cmp(&other.parsed)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for Timestamp {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self> {
        Timestamp::parse(s)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Timestamp::parse(&raw).map_err(serde::de::Error::custom)
    }
}

string_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum ScheduleStatus {
        Pending => "pending",
        Confirmed => "confirmed",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

impl Default for ScheduleStatus {
    fn default() -> Self {
        ScheduleStatus::Pending
    }
}

/// Local-only marker for optimistic writes awaiting backend confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Synced,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub title: String,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub status: ScheduleStatus,
    pub recurring: bool,
    pub shift_type: Option<String>,
    pub template_id: Option<Uuid>,
    #[serde(skip_deserializing)]
    pub sync_state: SyncState,
}

impl Schedule {
    /// ISO date the schedule is bucketed under.
    pub fn date(&self) -> NaiveDate {
        self.start_time.date()
    }

    pub fn duration_hours(&self) -> f64 {
        let duration = self.end_time.datetime() - self.start_time.datetime();
        duration.num_seconds() as f64 / 3600.0
    }

    pub fn is_active(&self) -> bool {
        self.status != ScheduleStatus::Cancelled
    }

    pub fn is_pending_sync(&self) -> bool {
        self.sync_state == SyncState::Pending
    }

    /// Half-open interval intersection: back-to-back shifts do not overlap.
    pub fn overlaps(&self, other: &Schedule) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }

    /// Recurring classification: the flag, a rota/recurring shift type, or a
    /// template reference. Any one of the three is enough.
    pub fn is_recurring(&self) -> bool {
        self.recurring
            || self
                .shift_type
                .as_deref()
                .map(|t| {
                    let t = t.trim();
                    t.eq_ignore_ascii_case("rota") || t.eq_ignore_ascii_case("recurring")
                })
                .unwrap_or(false)
            || self.template_id.is_some()
    }
}

/// Input for creating a shift; the id is assigned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleInput {
    pub employee_id: Uuid,
    pub title: String,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub location: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub status: ScheduleStatus,
    #[serde(default)]
    pub recurring: bool,
    pub shift_type: Option<String>,
    pub template_id: Option<Uuid>,
}

impl ScheduleInput {
    pub fn validate(&self) -> Result<()> {
        if self.end_time <= self.start_time {
            return Err(CalendarError::invalid_time_range(format!(
                "end_time ({}) must be after start_time ({})",
                self.end_time, self.start_time
            )));
        }
        if self.title.trim().is_empty() {
            return Err(CalendarError::invalid_row("schedules", "title is required"));
        }
        Ok(())
    }

    pub fn into_schedule(self, id: Uuid) -> Schedule {
        Schedule {
            id,
            employee_id: self.employee_id,
            title: self.title,
            start_time: self.start_time,
            end_time: self.end_time,
            location: self.location,
            notes: self.notes,
            status: self.status,
            recurring: self.recurring,
            shift_type: self.shift_type,
            template_id: self.template_id,
            sync_state: SyncState::Synced,
        }
    }
}

/// Partial update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePatch {
    pub employee_id: Option<Uuid>,
    pub title: Option<String>,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub status: Option<ScheduleStatus>,
    pub recurring: Option<bool>,
    pub shift_type: Option<String>,
}

impl SchedulePatch {
    pub fn status(status: ScheduleStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.employee_id.is_none()
            && self.title.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
            && self.location.is_none()
            && self.notes.is_none()
            && self.status.is_none()
            && self.recurring.is_none()
            && self.shift_type.is_none()
    }

    pub fn apply(&self, schedule: &mut Schedule) {
        if let Some(employee_id) = self.employee_id {
            schedule.employee_id = employee_id;
        }
        if let Some(ref title) = self.title {
            schedule.title = title.clone();
        }
        if let Some(ref start_time) = self.start_time {
            schedule.start_time = start_time.clone();
        }
        if let Some(ref end_time) = self.end_time {
            schedule.end_time = end_time.clone();
        }
        if let Some(ref location) = self.location {
            schedule.location = Some(location.clone());
        }
        if let Some(ref notes) = self.notes {
            schedule.notes = Some(notes.clone());
        }
        if let Some(status) = self.status {
            schedule.status = status;
        }
        if let Some(recurring) = self.recurring {
            schedule.recurring = recurring;
        }
        if let Some(ref shift_type) = self.shift_type {
            schedule.shift_type = Some(shift_type.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn schedule(start: &str, end: &str) -> Schedule {
        ScheduleInput {
            employee_id: Uuid::new_v4(),
            title: "Barista".to_string(),
            start_time: Timestamp::parse(start).unwrap(),
            end_time: Timestamp::parse(end).unwrap(),
            location: None,
            notes: None,
            status: ScheduleStatus::Confirmed,
            recurring: false,
            shift_type: None,
            template_id: None,
        }
        .into_schedule(Uuid::new_v4())
    }

    #[test]
    fn test_timestamp_keeps_raw_text() {
        let ts = Timestamp::parse("2025-06-02T09:00:00.000+02:00").unwrap();
        assert_eq!(ts.as_str(), "2025-06-02T09:00:00.000+02:00");
        assert_eq!(
            serde_json::to_string(&ts).unwrap(),
            "\"2025-06-02T09:00:00.000+02:00\""
        );
        assert_eq!(ts.hour_of_day(), 9.0);
    }

    #[test]
    fn test_timestamp_date_uses_own_offset() {
        let ts = Timestamp::parse("2025-06-02T23:30:00-05:00").unwrap();
        assert_eq!(ts.date(), NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
        assert_eq!(ts.hour_of_day(), 23.5);
    }

    #[test]
    fn test_timestamp_accepts_postgres_style() {
        let ts = Timestamp::parse("2025-06-02 09:15:00+00").unwrap();
        assert_eq!(ts.hour_of_day(), 9.25);
    }

    #[test]
    fn test_timestamp_rejects_missing_offset() {
        assert!(matches!(
            Timestamp::parse("2025-06-02T09:00:00"),
            Err(CalendarError::InvalidDate(_))
        ));
        assert!(Timestamp::parse("not a date").is_err());
    }

    #[test]
    fn test_overlap_is_half_open() {
        let a = schedule("2025-06-02T09:00:00Z", "2025-06-02T12:00:00Z");
        let b = schedule("2025-06-02T12:00:00Z", "2025-06-02T16:00:00Z");
        let c = schedule("2025-06-02T11:00:00Z", "2025-06-02T13:00:00Z");
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(b.overlaps(&c));
    }

    #[test]
    fn test_recurring_three_way_or() {
        let mut s = schedule("2025-06-02T09:00:00Z", "2025-06-02T12:00:00Z");
        assert!(!s.is_recurring());

        s.shift_type = Some("Rota".to_string());
        assert!(s.is_recurring());

        s.shift_type = Some("one-off".to_string());
        s.template_id = Some(Uuid::new_v4());
        assert!(s.is_recurring());

        s.template_id = None;
        s.recurring = true;
        assert!(s.is_recurring());
    }

    #[test]
    fn test_patch_applies_only_set_fields() {
        let mut s = schedule("2025-06-02T09:00:00Z", "2025-06-02T12:00:00Z");
        let original_title = s.title.clone();
        SchedulePatch::status(ScheduleStatus::Cancelled).apply(&mut s);
        assert_eq!(s.status, ScheduleStatus::Cancelled);
        assert_eq!(s.title, original_title);
        assert!(!s.is_active());
    }

    #[test]
    fn test_input_rejects_inverted_range() {
        let input = ScheduleInput {
            employee_id: Uuid::new_v4(),
            title: "Cook".to_string(),
            start_time: Timestamp::parse("2025-06-02T12:00:00Z").unwrap(),
            end_time: Timestamp::parse("2025-06-02T09:00:00Z").unwrap(),
            location: None,
            notes: None,
            status: ScheduleStatus::Pending,
            recurring: false,
            shift_type: None,
            template_id: None,
        };
        assert!(matches!(
            input.validate(),
            Err(CalendarError::InvalidTimeRange(_))
        ));
    }
}
