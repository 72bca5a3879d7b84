use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBreakdown {
    pub pending: usize,
    pub confirmed: usize,
    pub completed: usize,
    pub cancelled: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodStats {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub total_shifts: usize,
    pub rota_shifts: usize,
    pub single_shifts: usize,
    pub distinct_employees: usize,
    pub open_positions: usize,
    pub total_hours: f64,
    /// Assigned shifts as a percentage of assigned plus unfilled open shifts.
    pub coverage_pct: f64,
    pub by_status: StatusBreakdown,
}
