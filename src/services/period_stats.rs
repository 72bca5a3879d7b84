use chrono::NaiveDate;
use std::collections::HashSet;

use crate::database::models::{OpenShift, PeriodStats, Schedule, ScheduleStatus, StatusBreakdown, ViewType};
use crate::error::Result;
use crate::services::calendar_grid;
use crate::services::schedule_index::ScheduleIndex;

/// Aggregates over the schedules and open shifts of one period.
///
/// `total_shifts`, the rota/single split and the status breakdown count every
/// schedule, cancelled ones included. Hours, distinct employees and coverage
/// only consider active schedules.
pub fn calculate(
    start: NaiveDate,
    end: NaiveDate,
    schedules: &[&Schedule],
    open_shifts: &[&OpenShift],
) -> PeriodStats {
    let mut by_status = StatusBreakdown::default();
    let mut rota_shifts = 0;
    let mut employees = HashSet::new();
    let mut total_hours = 0.0;
    let mut assigned = 0;

    for schedule in schedules {
        match schedule.status {
            ScheduleStatus::Pending => by_status.pending += 1,
            ScheduleStatus::Confirmed => by_status.confirmed += 1,
            ScheduleStatus::Completed => by_status.completed += 1,
            ScheduleStatus::Cancelled => by_status.cancelled += 1,
        }
        if schedule.is_recurring() {
            rota_shifts += 1;
        }
        if schedule.is_active() {
            employees.insert(schedule.employee_id);
            total_hours += schedule.duration_hours();
            assigned += 1;
        }
    }

    let open_positions = open_shifts.iter().filter(|o| o.is_unfilled()).count();
    let demand = assigned + open_positions;
    let coverage_pct = if demand == 0 {
        0.0
    } else {
        assigned as f64 / demand as f64 * 100.0
    };

    PeriodStats {
        start,
        end,
        total_shifts: schedules.len(),
        rota_shifts,
        single_shifts: schedules.len() - rota_shifts,
        distinct_employees: employees.len(),
        open_positions,
        total_hours,
        coverage_pct,
        by_status,
    }
}

/// Stats for the period proper of `view` at `anchor`; lead and trail days
/// of a month grid are not counted.
pub fn for_period(index: &ScheduleIndex, view: ViewType, anchor: NaiveDate) -> Result<PeriodStats> {
    let (start, end) = calendar_grid::period_range(view, anchor)?;
    Ok(calculate(
        start,
        end,
        &index.by_range(start, end),
        &index.open_shifts_in_range(start, end),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{OpenShiftStatus, Platform, ScheduleInput, Timestamp};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn schedule(employee_id: Uuid, start: &str, end: &str) -> Schedule {
        ScheduleInput {
            employee_id,
            title: "Shift".to_string(),
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

    fn open_shift(status: OpenShiftStatus) -> OpenShift {
        OpenShift {
            id: Uuid::new_v4(),
            title: "Cover".to_string(),
            start_time: Timestamp::parse("2025-06-03T09:00:00Z").unwrap(),
            end_time: Timestamp::parse("2025-06-03T17:00:00Z").unwrap(),
            location: None,
            status,
            created_by: None,
            platform: Platform::Web,
        }
    }

    #[test]
    fn test_recurring_counted_once() {
        let mut rota = schedule(Uuid::new_v4(), "2025-06-02T09:00:00Z", "2025-06-02T17:00:00Z");
        rota.recurring = true;
        rota.shift_type = Some("rota".to_string());
        let single = schedule(Uuid::new_v4(), "2025-06-03T09:00:00Z", "2025-06-03T13:00:00Z");

        let day = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let stats = calculate(day, day, &[&rota, &single], &[]);
        assert_eq!(stats.total_shifts, 2);
        assert_eq!(stats.rota_shifts, 1);
        assert_eq!(stats.single_shifts, 1);
        assert_eq!(stats.total_hours, 12.0);
        assert_eq!(stats.distinct_employees, 2);
    }

    #[test]
    fn test_open_positions_and_coverage() {
        let employee = Uuid::new_v4();
        let a = schedule(employee, "2025-06-02T09:00:00Z", "2025-06-02T12:00:00Z");
        let mut b = schedule(employee, "2025-06-03T09:00:00Z", "2025-06-03T12:00:00Z");
        b.status = ScheduleStatus::Cancelled;
        let open = open_shift(OpenShiftStatus::Open);
        let requested = open_shift(OpenShiftStatus::Pending);
        let filled = open_shift(OpenShiftStatus::Filled);

        let day = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let stats = calculate(day, day, &[&a, &b], &[&open, &requested, &filled]);
        assert_eq!(stats.open_positions, 2);
        assert_eq!(stats.by_status.cancelled, 1);
        assert_eq!(stats.by_status.confirmed, 1);
        assert_eq!(stats.distinct_employees, 1);
        assert!((stats.coverage_pct - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_period() {
        let day = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let stats = calculate(day, day, &[], &[]);
        assert_eq!(stats.total_shifts, 0);
        assert_eq!(stats.coverage_pct, 0.0);
    }
}
