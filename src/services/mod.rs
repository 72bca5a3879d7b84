pub mod availability;
pub mod calendar_grid;
pub mod layout_cache;
pub mod period_stats;
pub mod schedule_index;
pub mod session;
pub mod sync_reconciler;
pub mod timeline;
pub mod user_context;

pub use layout_cache::LayoutCache;
pub use schedule_index::{IndexStore, ScheduleIndex};
pub use session::CalendarSession;
pub use sync_reconciler::{ReconcilerState, ReconcilerStats, SyncReconciler};
pub use user_context::Actor;
