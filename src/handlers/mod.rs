pub mod calendar;
pub mod open_shifts;
pub mod shared;
pub mod shifts;

pub use shared::CalendarContext;
