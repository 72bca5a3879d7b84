use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::macros::string_enum;
use super::schedule::Timestamp;
use crate::error::{CalendarError, Result};

string_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum OpenShiftStatus {
        Open => "open",
        Pending => "pending",
        Filled => "filled",
    }
}

impl Default for OpenShiftStatus {
    fn default() -> Self {
        OpenShiftStatus::Open
    }
}

string_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Platform {
        Web => "web",
        Mobile => "mobile",
        Api => "api",
    }
}

impl Default for Platform {
    fn default() -> Self {
        Platform::Web
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenShift {
    pub id: Uuid,
    pub title: String,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub location: Option<String>,
    pub status: OpenShiftStatus,
    pub created_by: Option<Uuid>,
    pub platform: Platform,
}

impl OpenShift {
    pub fn date(&self) -> NaiveDate {
        self.start_time.date()
    }

    /// Still needs someone: open, or requested but not yet confirmed.
    pub fn is_unfilled(&self) -> bool {
        self.status != OpenShiftStatus::Filled
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenShiftInput {
    pub title: String,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub location: Option<String>,
    #[serde(default)]
    pub platform: Platform,
}

impl OpenShiftInput {
    pub fn validate(&self) -> Result<()> {
        if self.end_time <= self.start_time {
            return Err(CalendarError::invalid_time_range(format!(
                "end_time ({}) must be after start_time ({})",
                self.end_time, self.start_time
            )));
        }
        Ok(())
    }
}

string_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum AssignmentStatus {
        Pending => "pending",
        Accepted => "accepted",
        Declined => "declined",
    }
}

impl Default for AssignmentStatus {
    fn default() -> Self {
        AssignmentStatus::Pending
    }
}

/// Links an open shift to an employee. Its status is independent of the
/// status of the schedule it may spawn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenShiftAssignment {
    pub id: Uuid,
    pub open_shift_id: Uuid,
    pub employee_id: Uuid,
    pub status: AssignmentStatus,
    pub schedule_id: Option<Uuid>,
}
