pub mod availability;
pub mod calendar;
pub mod employee;
pub mod layout;
pub(crate) mod macros;
pub mod open_shift;
pub mod schedule;
pub mod stats;

// Re-export all models for easy importing
pub use availability::*;
pub use calendar::*;
pub use employee::*;
pub use layout::*;
pub use open_shift::*;
pub use schedule::*;
pub use stats::*;
