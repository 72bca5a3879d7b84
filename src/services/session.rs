use chrono::NaiveDate;
use serde::Serialize;

use crate::database::models::{DayCell, Direction, TimeAxis, ViewType};
use crate::error::Result;
use crate::services::calendar_grid;

/// What a calendar view is looking at. Plain value: navigation returns
/// errors instead of leaving the session half-updated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarSession {
    pub view: ViewType,
    pub current_date: NaiveDate,
    pub selected_day: Option<NaiveDate>,
    pub today: NaiveDate,
    pub axis: TimeAxis,
}

impl CalendarSession {
    pub fn new(view: ViewType, today: NaiveDate, axis: TimeAxis) -> Result<Self> {
        axis.validate()?;
        Ok(Self {
            view,
            current_date: today,
            selected_day: None,
            today,
            axis,
        })
    }

    fn step(&mut self, direction: Direction) -> Result<()> {
        self.current_date = calendar_grid::shift_anchor(self.view, self.current_date, direction)?;
        Ok(())
    }

    pub fn next(&mut self) -> Result<()> {
        self.step(Direction::Next)
    }

    pub fn previous(&mut self) -> Result<()> {
        self.step(Direction::Previous)
    }

    pub fn go_to_today(&mut self) {
        self.current_date = self.today;
    }

    pub fn set_view(&mut self, view: ViewType) {
        self.view = view;
    }

    /// Selecting a day also anchors the view on it; the day view follows the
    /// selection exactly.
    pub fn select_day(&mut self, date: NaiveDate) {
        self.selected_day = Some(date);
        self.current_date = date;
    }

    pub fn clear_selection(&mut self) {
        self.selected_day = None;
    }

    pub fn set_axis(&mut self, axis: TimeAxis) -> Result<()> {
        axis.validate()?;
        self.axis = axis;
        Ok(())
    }

    pub fn visible_range(&self) -> Result<(NaiveDate, NaiveDate)> {
        calendar_grid::visible_range(self.view, self.current_date)
    }

    pub fn period_range(&self) -> Result<(NaiveDate, NaiveDate)> {
        calendar_grid::period_range(self.view, self.current_date)
    }

    pub fn grid(&self) -> Result<Vec<DayCell>> {
        calendar_grid::build(self.view, self.current_date, self.today)
    }

    pub fn label(&self) -> Result<String> {
        calendar_grid::period_label(self.view, self.current_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_navigation_round_trip() {
        let today = date(2025, 6, 4);
        let mut session = CalendarSession::new(ViewType::Week, today, TimeAxis::default()).unwrap();
        session.next().unwrap();
        assert_eq!(session.current_date, date(2025, 6, 11));
        assert_eq!(session.visible_range().unwrap(), (date(2025, 6, 9), date(2025, 6, 15)));

        session.set_view(ViewType::Month);
        session.previous().unwrap();
        assert_eq!(session.current_date, date(2025, 5, 11));
        assert_eq!(session.grid().unwrap().len(), 35);

        session.go_to_today();
        assert_eq!(session.current_date, today);
    }

    #[test]
    fn test_select_day_anchors_view() {
        let mut session =
            CalendarSession::new(ViewType::Day, date(2025, 6, 4), TimeAxis::default()).unwrap();
        session.select_day(date(2025, 6, 20));
        assert_eq!(session.selected_day, Some(date(2025, 6, 20)));
        assert_eq!(session.grid().unwrap()[0].date, date(2025, 6, 20));
        assert_eq!(session.label().unwrap(), "Friday, June 20, 2025");
    }

    #[test]
    fn test_rejects_bad_axis() {
        let axis = TimeAxis {
            start_hour: 20.0,
            end_hour: 8.0,
        };
        assert!(CalendarSession::new(ViewType::Week, date(2025, 6, 4), axis).is_err());
    }
}
