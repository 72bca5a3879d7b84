use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::database::models::{
    DayCell, DayLayout, OpenShift, PeriodStats, ResolvedAvailability, ViewType,
};
use crate::error::Result;
use crate::handlers::shared::CalendarContext;
use crate::services::schedule_index::ScheduleIndex;
use crate::services::session::CalendarSession;
use crate::services::{availability, period_stats, timeline};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeAvailability {
    pub employee_id: Uuid,
    pub name: String,
    pub availability: ResolvedAvailability,
}

/// Everything the presentation layer needs to draw one calendar view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarView {
    pub view: ViewType,
    pub label: String,
    pub cells: Vec<DayCell>,
    pub layouts: Vec<DayLayout>,
    pub open_shifts: Vec<OpenShift>,
    pub stats: PeriodStats,
    /// Working windows for the focused day (day view or selected day).
    pub availability: Vec<EmployeeAvailability>,
    /// Index generation the view was rendered from.
    pub generation: u64,
}

/// Employees whose window cannot be resolved are left out and logged.
pub fn availability_on(index: &ScheduleIndex, date: NaiveDate) -> Vec<EmployeeAvailability> {
    index
        .employees()
        .into_iter()
        .filter_map(|employee| {
            match availability::resolve_for_date(employee, date, index.patterns()) {
                Ok(resolved) => {
                    for warning in &resolved.warnings {
                        log::warn!("Availability of {} on {}: {}", employee.name, date, warning);
                    }
                    Some(EmployeeAvailability {
                        employee_id: employee.id,
                        name: employee.name.clone(),
                        availability: resolved,
                    })
                }
                Err(e) => {
                    log::warn!("Skipping availability of {} on {}: {}", employee.name, date, e);
                    None
                }
            }
        })
        .collect()
}

/// Grid, day layouts, open shifts and stats for `session`, all computed
/// from a single snapshot of the index.
pub fn render_view(ctx: &CalendarContext, session: &CalendarSession) -> Result<CalendarView> {
    let index = ctx.store.snapshot();

    let cells = session.grid()?;
    let layouts = timeline::layout_days(&ctx.layouts, &index, &cells, session.axis)?
        .into_iter()
        .map(|layout| (*layout).clone())
        .collect();

    let (start, end) = session.visible_range()?;
    let open_shifts = index
        .open_shifts_in_range(start, end)
        .into_iter()
        .cloned()
        .collect();

    let stats = period_stats::for_period(&index, session.view, session.current_date)?;

    let focus = match (session.selected_day, session.view) {
        (Some(day), _) => Some(day),
        (None, ViewType::Day) => Some(session.current_date),
        (None, _) => None,
    };
    let availability = focus
        .map(|day| availability_on(&index, day))
        .unwrap_or_default();

    Ok(CalendarView {
        view: session.view,
        label: session.label()?,
        cells,
        layouts,
        open_shifts,
        stats,
        availability,
        generation: index.generation(),
    })
}
