use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use uuid::Uuid;

use super::backend::Table;
use super::models::{
    AssignmentStatus, DayAvailability, DayOfWeek, Employee, OpenShift, OpenShiftAssignment,
    OpenShiftInput, OpenShiftStatus, Platform, Schedule, SchedulePatch,
    ScheduleStatus, SyncState, Timestamp, WeeklyAvailability,
};
use crate::error::{CalendarError, Result};

/// Untyped row as exchanged with the backend.
pub type Row = Value;

// Backend row types. Field names follow the backend's snake_case columns;
// unknown columns are ignored, malformed ones are rejected.

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRow {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub title: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub status: Option<String>,
    pub recurring: Option<bool>,
    pub shift_type: Option<String>,
    pub template_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenShiftRow {
    pub id: Uuid,
    pub title: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub location: Option<String>,
    pub status: Option<String>,
    pub created_by: Option<Uuid>,
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenShiftAssignmentRow {
    pub id: Uuid,
    pub open_shift_id: Uuid,
    pub employee_id: Uuid,
    pub status: Option<String>,
    pub schedule_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DayAvailabilityRow {
    #[serde(default)]
    pub available: bool,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmployeeRow {
    pub id: Uuid,
    pub name: String,
    pub department: Option<String>,
    pub job_title: Option<String>,
    pub hourly_rate: Option<Value>,
    pub shift_pattern_id: Option<Uuid>,
    #[serde(default)]
    pub shift_patterns: HashMap<String, Option<Uuid>>,
    #[serde(default)]
    pub availability: HashMap<String, DayAvailabilityRow>,
}

fn parse_status<T: FromStr<Err = String> + Default>(table: Table, raw: Option<String>) -> Result<T> {
    match raw {
        Some(value) => value
            .parse()
            .map_err(|e: String| CalendarError::invalid_row(table.as_str(), e)),
        None => Ok(T::default()),
    }
}

fn parse_interval(table: Table, start: &str, end: &str) -> Result<(Timestamp, Timestamp)> {
    let start_time =
        Timestamp::parse(start).map_err(|e| CalendarError::invalid_row(table.as_str(), e.to_string()))?;
    let end_time =
        Timestamp::parse(end).map_err(|e| CalendarError::invalid_row(table.as_str(), e.to_string()))?;
    if end_time <= start_time {
        return Err(CalendarError::invalid_row(
            table.as_str(),
            format!("end_time {} is not after start_time {}", end_time, start_time),
        ));
    }
    Ok((start_time, end_time))
}

fn parse_rate(value: &Value) -> Result<BigDecimal> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(CalendarError::invalid_row(
                Table::Employees.as_str(),
                format!("hourly_rate must be numeric, got {}", other),
            ));
        }
    };
    BigDecimal::from_str(text.trim())
        .map_err(|e| CalendarError::invalid_row(Table::Employees.as_str(), e.to_string()))
}

// Conversion functions
impl TryFrom<ScheduleRow> for Schedule {
    type Error = CalendarError;

    fn try_from(row: ScheduleRow) -> Result<Self> {
        let (start_time, end_time) = parse_interval(Table::Schedules, &row.start_time, &row.end_time)?;
        let status: ScheduleStatus = parse_status(Table::Schedules, row.status)?;

        Ok(Self {
            id: row.id,
            employee_id: row.employee_id,
            title: row.title.unwrap_or_default(),
            start_time,
            end_time,
            location: row.location,
            notes: row.notes,
            status,
            recurring: row.recurring.unwrap_or(false),
            shift_type: row.shift_type,
            template_id: row.template_id,
            sync_state: SyncState::Synced,
        })
    }
}

impl TryFrom<OpenShiftRow> for OpenShift {
    type Error = CalendarError;

    fn try_from(row: OpenShiftRow) -> Result<Self> {
        let (start_time, end_time) = parse_interval(Table::OpenShifts, &row.start_time, &row.end_time)?;
        let status: OpenShiftStatus = parse_status(Table::OpenShifts, row.status)?;
        let platform: Platform = parse_status(Table::OpenShifts, row.platform)?;

        Ok(Self {
            id: row.id,
            title: row.title.unwrap_or_default(),
            start_time,
            end_time,
            location: row.location,
            status,
            created_by: row.created_by,
            platform,
        })
    }
}

impl TryFrom<OpenShiftAssignmentRow> for OpenShiftAssignment {
    type Error = CalendarError;

    fn try_from(row: OpenShiftAssignmentRow) -> Result<Self> {
        let status: AssignmentStatus = parse_status(Table::OpenShiftAssignments, row.status)?;
        Ok(Self {
            id: row.id,
            open_shift_id: row.open_shift_id,
            employee_id: row.employee_id,
            status,
            schedule_id: row.schedule_id,
        })
    }
}

impl TryFrom<EmployeeRow> for Employee {
    type Error = CalendarError;

    fn try_from(row: EmployeeRow) -> Result<Self> {
        let hourly_rate = row.hourly_rate.as_ref().filter(|v| !v.is_null()).map(parse_rate).transpose()?;

        let mut pattern_bindings = BTreeMap::new();
        for (day, pattern_id) in row.shift_patterns {
            let day: DayOfWeek = day
                .parse()
                .map_err(|e: String| CalendarError::invalid_row(Table::Employees.as_str(), e))?;
            if let Some(pattern_id) = pattern_id {
                pattern_bindings.insert(day, pattern_id);
            }
        }

        // Times are kept raw here; the availability resolver validates them.
        let mut availability = WeeklyAvailability::new();
        for (day, entry) in row.availability {
            let day: DayOfWeek = day
                .parse()
                .map_err(|e: String| CalendarError::invalid_row(Table::Employees.as_str(), e))?;
            let defaults = DayAvailability::unavailable();
            availability.set_raw(
                day,
                DayAvailability {
                    available: entry.available,
                    start_time: entry.start_time.unwrap_or(defaults.start_time),
                    end_time: entry.end_time.unwrap_or(defaults.end_time),
                },
            );
        }

        Ok(Self {
            id: row.id,
            name: row.name,
            department: row.department,
            job_title: row.job_title,
            hourly_rate,
            shift_pattern_id: row.shift_pattern_id,
            pattern_bindings,
            availability,
        })
    }
}

fn decode<R, T>(table: Table, row: &Row) -> Result<T>
where
    R: for<'de> Deserialize<'de>,
    T: TryFrom<R, Error = CalendarError>,
{
    let typed: R = serde_json::from_value(row.clone())
        .map_err(|e| CalendarError::invalid_row(table.as_str(), e.to_string()))?;
    T::try_from(typed)
}

pub fn decode_schedule(row: &Row) -> Result<Schedule> {
    decode::<ScheduleRow, Schedule>(Table::Schedules, row)
}

pub fn decode_open_shift(row: &Row) -> Result<OpenShift> {
    decode::<OpenShiftRow, OpenShift>(Table::OpenShifts, row)
}

pub fn decode_assignment(row: &Row) -> Result<OpenShiftAssignment> {
    decode::<OpenShiftAssignmentRow, OpenShiftAssignment>(Table::OpenShiftAssignments, row)
}

pub fn decode_employee(row: &Row) -> Result<Employee> {
    decode::<EmployeeRow, Employee>(Table::Employees, row)
}

/// Id of a row, used for delete notifications that carry only the key.
pub fn row_id(row: &Row) -> Option<Uuid> {
    row.get("id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

pub fn encode_schedule(schedule: &Schedule) -> Row {
    json!({
        "id": schedule.id,
        "employee_id": schedule.employee_id,
        "title": schedule.title,
        "start_time": schedule.start_time.as_str(),
        "end_time": schedule.end_time.as_str(),
        "location": schedule.location,
        "notes": schedule.notes,
        "status": schedule.status.as_str(),
        "recurring": schedule.recurring,
        "shift_type": schedule.shift_type,
        "template_id": schedule.template_id,
    })
}

pub fn encode_schedule_patch(patch: &SchedulePatch) -> Row {
    let mut map = Map::new();
    if let Some(employee_id) = patch.employee_id {
        map.insert("employee_id".into(), json!(employee_id));
    }
    if let Some(ref title) = patch.title {
        map.insert("title".into(), json!(title));
    }
    if let Some(ref start_time) = patch.start_time {
        map.insert("start_time".into(), json!(start_time.as_str()));
    }
    if let Some(ref end_time) = patch.end_time {
        map.insert("end_time".into(), json!(end_time.as_str()));
    }
    if let Some(ref location) = patch.location {
        map.insert("location".into(), json!(location));
    }
    if let Some(ref notes) = patch.notes {
        map.insert("notes".into(), json!(notes));
    }
    if let Some(status) = patch.status {
        map.insert("status".into(), json!(status.as_str()));
    }
    if let Some(recurring) = patch.recurring {
        map.insert("recurring".into(), json!(recurring));
    }
    if let Some(ref shift_type) = patch.shift_type {
        map.insert("shift_type".into(), json!(shift_type));
    }
    Value::Object(map)
}

pub fn encode_open_shift_input(input: &OpenShiftInput, created_by: Uuid) -> Row {
    json!({
        "title": input.title,
        "start_time": input.start_time.as_str(),
        "end_time": input.end_time.as_str(),
        "location": input.location,
        "status": OpenShiftStatus::Open.as_str(),
        "created_by": created_by,
        "platform": input.platform.as_str(),
    })
}
