pub mod backend;
pub mod memory;
pub mod models;
pub mod types;

pub use backend::{
    Backend, ChangeEvent, ChangeKind, Notification, NotificationSender, RowFilter,
    SubscriptionHandle, Table,
};
pub use memory::InMemoryBackend;
pub use types::Row;
