pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod services;

pub use config::Config;
pub use database::{Backend, InMemoryBackend};
pub use error::CalendarError;
pub use handlers::CalendarContext;
pub use services::{Actor, CalendarSession, IndexStore, SyncReconciler};
