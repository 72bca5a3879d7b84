//! Positions shift blocks on a bounded day timeline.
//!
//! Percentages are raw `f64` (never rounded here) and always satisfy
//! `0 <= left`, `0 <= width`, `left + width <= 100`. Lanes are assigned by a
//! start-ordered sweep that reuses the lowest lane freed by an interval that
//! has already ended, so concurrently active shifts never share a lane.

use chrono::{DateTime, FixedOffset, NaiveDate};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::database::models::{DayCell, DayLayout, LayoutBlock, OverlapDetected, Schedule, TimeAxis};
use crate::error::Result;
use crate::services::layout_cache::LayoutCache;
use crate::services::schedule_index::ScheduleIndex;

struct Placement<'a> {
    schedule: &'a Schedule,
    left_pct: f64,
    width_pct: f64,
    truncated: bool,
}

/// Start/end hours of `schedule` relative to midnight of `date`, measured in
/// the schedule's own offset. Values outside `0..24` belong to other days.
fn relative_hours(schedule: &Schedule, date: NaiveDate) -> (f64, f64) {
    let offset_hours = |ts: &crate::database::models::Timestamp| {
        let days = (ts.date() - date).num_days() as f64;
        days * 24.0 + ts.hour_of_day()
    };
    (offset_hours(&schedule.start_time), offset_hours(&schedule.end_time))
}

fn to_pct(hour: f64, axis: &TimeAxis) -> f64 {
    ((hour - axis.start_hour) / axis.span() * 100.0).clamp(0.0, 100.0)
}

/// Same-employee overlaps among active (non-cancelled) shifts.
pub fn detect_overlaps(shifts: &[Schedule]) -> Vec<OverlapDetected> {
    let mut by_employee: HashMap<Uuid, Vec<&Schedule>> = HashMap::new();
    for shift in shifts.iter().filter(|s| s.is_active()) {
        by_employee.entry(shift.employee_id).or_default().push(shift);
    }

    let mut overlaps = Vec::new();
    for (employee_id, mut list) in by_employee {
        list.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        for (i, first) in list.iter().enumerate() {
            for second in list[i + 1..].iter() {
                if second.start_time >= first.end_time {
                    break;
                }
                overlaps.push(OverlapDetected {
                    employee_id,
                    first: first.id,
                    second: second.id,
                });
            }
        }
    }
    overlaps.sort_by(|a, b| (a.employee_id, a.first, a.second).cmp(&(b.employee_id, b.first, b.second)));
    overlaps
}

fn assign_lanes(placements: &[Placement<'_>]) -> (Vec<usize>, usize) {
    let mut order: Vec<usize> = (0..placements.len()).collect();
    order.sort_by(|&a, &b| {
        let (sa, sb) = (placements[a].schedule, placements[b].schedule);
        sa.start_time
            .cmp(&sb.start_time)
            .then(sa.end_time.cmp(&sb.end_time))
            .then(sa.id.cmp(&sb.id))
    });

    let mut lanes = vec![0; placements.len()];
    let mut active: BinaryHeap<Reverse<(DateTime<FixedOffset>, usize)>> = BinaryHeap::new();
    let mut free: BinaryHeap<Reverse<usize>> = BinaryHeap::new();
    let mut lane_count = 0;

    for index in order {
        let schedule = placements[index].schedule;
        let start = schedule.start_time.datetime();

        while let Some(&Reverse((end, lane))) = active.peek() {
            if end > start {
                break;
            }
            active.pop();
            free.push(Reverse(lane));
        }

        let lane = match free.pop() {
            Some(Reverse(lane)) => lane,
            None => {
                lane_count += 1;
                lane_count - 1
            }
        };
        lanes[index] = lane;
        active.push(Reverse((schedule.end_time.datetime(), lane)));
    }

    (lanes, lane_count)
}

pub fn layout(date: NaiveDate, shifts: &[Schedule], axis: TimeAxis) -> Result<DayLayout> {
    axis.validate()?;

    let mut placements = Vec::new();
    let mut excluded = Vec::new();

    for schedule in shifts {
        let (start_h, end_h) = relative_hours(schedule, date);
        let day_start = start_h.max(0.0);
        let day_end = end_h.min(24.0);
        if day_end <= day_start {
            // Not on this day at all.
            continue;
        }
        if day_end <= axis.start_hour || day_start >= axis.end_hour {
            excluded.push(schedule.id);
            continue;
        }

        let left_pct = to_pct(day_start, &axis);
        let right_pct = to_pct(day_end, &axis);
        placements.push(Placement {
            schedule,
            left_pct,
            width_pct: (right_pct - left_pct).max(0.0),
            truncated: end_h > 24.0 || start_h < 0.0,
        });
    }

    let overlaps = detect_overlaps(shifts);
    if !overlaps.is_empty() {
        log::warn!("{} overlapping shift pair(s) on {}", overlaps.len(), date);
    }

    let (lanes, lane_count) = assign_lanes(&placements);

    let mut blocks: Vec<LayoutBlock> = placements
        .iter()
        .zip(lanes)
        .map(|(placement, lane)| {
            let id = placement.schedule.id;
            LayoutBlock {
                schedule_id: id,
                employee_id: placement.schedule.employee_id,
                left_pct: placement.left_pct,
                width_pct: placement.width_pct,
                lane,
                truncated: placement.truncated,
                overlaps: overlaps
                    .iter()
                    .filter(|o| o.first == id || o.second == id)
                    .cloned()
                    .collect(),
            }
        })
        .collect();
    blocks.sort_by(|a, b| {
        a.left_pct
            .total_cmp(&b.left_pct)
            .then(a.lane.cmp(&b.lane))
            .then(a.schedule_id.cmp(&b.schedule_id))
    });

    Ok(DayLayout {
        date,
        axis,
        blocks,
        lane_count,
        excluded,
        overlaps,
    })
}

/// Layouts for every cell of a grid, served from `cache` where possible.
pub fn layout_days(
    cache: &LayoutCache,
    index: &ScheduleIndex,
    cells: &[DayCell],
    axis: TimeAxis,
) -> Result<Vec<Arc<DayLayout>>> {
    cells
        .iter()
        .map(|cell| cache.layout(index, cell.date, axis))
        .collect()
}
