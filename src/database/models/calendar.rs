use chrono::NaiveDate;
use serde::Serialize;

use super::macros::string_enum;

string_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum ViewType {
        Day => "day",
        Week => "week",
        Month => "month",
    }
}

impl Default for ViewType {
    fn default() -> Self {
        ViewType::Week
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayCell {
    pub date: NaiveDate,
    /// False for the lead/trail days borrowed from adjacent months.
    pub is_current_period: bool,
    pub is_today: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Previous,
    Next,
}
