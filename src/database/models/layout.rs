use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{CalendarError, Result};

/// Visible hour range of a day timeline, `0 <= start_hour < end_hour <= 24`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeAxis {
    pub start_hour: f64,
    pub end_hour: f64,
}

impl TimeAxis {
    pub fn new(start_hour: f64, end_hour: f64) -> Result<Self> {
        let axis = Self {
            start_hour,
            end_hour,
        };
        axis.validate()?;
        Ok(axis)
    }

    pub fn full_day() -> Self {
        Self {
            start_hour: 0.0,
            end_hour: 24.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let in_bounds = |h: f64| h.is_finite() && (0.0..=24.0).contains(&h);
        if !in_bounds(self.start_hour) || !in_bounds(self.end_hour) {
            return Err(CalendarError::invalid_time_range(format!(
                "axis hours must lie within 0..=24, got {}..{}",
                self.start_hour, self.end_hour
            )));
        }
        if self.end_hour <= self.start_hour {
            return Err(CalendarError::invalid_time_range(format!(
                "axis end ({}) must be after start ({})",
                self.end_hour, self.start_hour
            )));
        }
        Ok(())
    }

    pub fn span(&self) -> f64 {
        self.end_hour - self.start_hour
    }

    /// Hashable key for caches; hours are stored to the minute.
    pub fn cache_key(&self) -> (u32, u32) {
        (
            (self.start_hour * 60.0).round() as u32,
            (self.end_hour * 60.0).round() as u32,
        )
    }
}

impl Default for TimeAxis {
    fn default() -> Self {
        Self {
            start_hour: 6.0,
            end_hour: 22.0,
        }
    }
}

/// Two intersecting shifts belonging to one employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlapDetected {
    pub employee_id: Uuid,
    pub first: Uuid,
    pub second: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutBlock {
    pub schedule_id: Uuid,
    pub employee_id: Uuid,
    pub left_pct: f64,
    pub width_pct: f64,
    pub lane: usize,
    /// True when the shift runs past the end of its start day.
    pub truncated: bool,
    pub overlaps: Vec<OverlapDetected>,
}

impl LayoutBlock {
    pub fn has_conflict(&self) -> bool {
        !self.overlaps.is_empty()
    }

    /// Display copy with percentages rounded to two decimals.
    pub fn rounded(&self) -> LayoutBlock {
        let round = |v: f64| (v * 100.0).round() / 100.0;
        LayoutBlock {
            left_pct: round(self.left_pct),
            width_pct: round(self.width_pct),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayLayout {
    pub date: NaiveDate,
    pub axis: TimeAxis,
    pub blocks: Vec<LayoutBlock>,
    pub lane_count: usize,
    /// Shifts on this day that fall entirely outside the axis.
    pub excluded: Vec<Uuid>,
    pub overlaps: Vec<OverlapDetected>,
}

impl DayLayout {
    pub fn block(&self, schedule_id: Uuid) -> Option<&LayoutBlock> {
        self.blocks.iter().find(|b| b.schedule_id == schedule_id)
    }
}
