use chrono::{Datelike, Days, Months, NaiveDate};

use crate::database::models::{DayCell, Direction, Timestamp, ViewType};
use crate::error::{CalendarError, Result};

/// Parses an anchor given as `YYYY-MM-DD` or as a full ISO-8601 timestamp
/// (whose date is taken in its own offset).
pub fn parse_anchor(text: &str) -> Result<NaiveDate> {
    let trimmed = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    Timestamp::parse(trimmed)
        .map(|ts| ts.date())
        .map_err(|_| CalendarError::invalid_date(format!("unparseable anchor date '{}'", text)))
}

fn add_days(date: NaiveDate, days: u64) -> Result<NaiveDate> {
    date.checked_add_days(Days::new(days))
        .ok_or_else(|| CalendarError::invalid_date(format!("{} + {} days is out of range", date, days)))
}

fn sub_days(date: NaiveDate, days: u64) -> Result<NaiveDate> {
    date.checked_sub_days(Days::new(days))
        .ok_or_else(|| CalendarError::invalid_date(format!("{} - {} days is out of range", date, days)))
}

fn week_start(date: NaiveDate) -> Result<NaiveDate> {
    sub_days(date, date.weekday().num_days_from_monday() as u64)
}

fn month_bounds(anchor: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
    let first = anchor
        .with_day(1)
        .ok_or_else(|| CalendarError::invalid_date(format!("no first day for {}", anchor)))?;
    let next_first = first
        .checked_add_months(Months::new(1))
        .ok_or_else(|| CalendarError::invalid_date(format!("month after {} is out of range", anchor)))?;
    Ok((first, sub_days(next_first, 1)?))
}

/// First and last date of the period itself, without lead/trail padding.
pub fn period_range(view: ViewType, anchor: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
    match view {
        ViewType::Day => Ok((anchor, anchor)),
        ViewType::Week => {
            let start = week_start(anchor)?;
            Ok((start, add_days(start, 6)?))
        }
        ViewType::Month => month_bounds(anchor),
    }
}

/// First and last date shown by the grid, padding included.
pub fn grid_range(view: ViewType, anchor: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
    match view {
        ViewType::Day | ViewType::Week => period_range(view, anchor),
        ViewType::Month => {
            let (first, last) = month_bounds(anchor)?;
            let start = week_start(first)?;
            let trailing = 6 - last.weekday().num_days_from_monday() as u64;
            Ok((start, add_days(last, trailing)?))
        }
    }
}

/// Dates a view covers on screen; alias of [`grid_range`].
pub fn visible_range(view: ViewType, anchor: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
    grid_range(view, anchor)
}

pub fn build(view: ViewType, anchor: NaiveDate, today: NaiveDate) -> Result<Vec<DayCell>> {
    let (period_start, period_end) = period_range(view, anchor)?;
    let (grid_start, grid_end) = grid_range(view, anchor)?;

    let cells: Vec<DayCell> = grid_start
        .iter_days()
        .take_while(|date| *date <= grid_end)
        .map(|date| DayCell {
            date,
            is_current_period: period_start <= date && date <= period_end,
            is_today: date == today,
        })
        .collect();

    debug_assert!(view == ViewType::Day || cells.len() % 7 == 0);
    Ok(cells)
}

pub fn build_from_str(view: ViewType, anchor: &str, today: NaiveDate) -> Result<Vec<DayCell>> {
    build(view, parse_anchor(anchor)?, today)
}

/// Moves the anchor one period back or forward. Month steps keep the day of
/// month, clamped to the length of the target month.
pub fn shift_anchor(view: ViewType, anchor: NaiveDate, direction: Direction) -> Result<NaiveDate> {
    let shifted = match (view, direction) {
        (ViewType::Day, Direction::Next) => anchor.checked_add_days(Days::new(1)),
        (ViewType::Day, Direction::Previous) => anchor.checked_sub_days(Days::new(1)),
        (ViewType::Week, Direction::Next) => anchor.checked_add_days(Days::new(7)),
        (ViewType::Week, Direction::Previous) => anchor.checked_sub_days(Days::new(7)),
        (ViewType::Month, Direction::Next) => anchor.checked_add_months(Months::new(1)),
        (ViewType::Month, Direction::Previous) => anchor.checked_sub_months(Months::new(1)),
    };
    shifted.ok_or_else(|| CalendarError::invalid_date(format!("cannot move {:?} from {}", direction, anchor)))
}

pub fn period_label(view: ViewType, anchor: NaiveDate) -> Result<String> {
    Ok(match view {
        ViewType::Day => anchor.format("%A, %B %-d, %Y").to_string(),
        ViewType::Week => format!("Week of {}", week_start(anchor)?.format("%b %-d, %Y")),
        ViewType::Month => anchor.format("%B %Y").to_string(),
    })
}

/// Splits grid cells into display rows of seven.
pub fn weeks(cells: &[DayCell]) -> Vec<&[DayCell]> {
    cells.chunks(7).collect()
}
