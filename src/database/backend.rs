//! Abstract row-oriented backend consumed by the engine.
//!
//! The engine never talks to a concrete store. It selects, writes and
//! subscribes through [`Backend`]; change notifications arrive as typed
//! messages on an mpsc channel owned by the subscriber, so the transport is
//! free to be a websocket, a polling loop or an in-process fake.

use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::models::macros::string_enum;
use super::types::Row;
use crate::error::Result;

string_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub enum Table {
        Employees => "employees",
        Schedules => "schedules",
        OpenShifts => "open_shifts",
        OpenShiftAssignments => "open_shift_assignments",
    }
}

/// Row filter understood by every backend.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RowFilter {
    #[default]
    All,
    /// Rows whose `employee_id` (or `id` for the employees table) is in the set.
    Employees(Vec<Uuid>),
}

impl RowFilter {
    pub fn matches(&self, table: Table, row: &Row) -> bool {
        match self {
            RowFilter::All => true,
            RowFilter::Employees(ids) => {
                let key = match table {
                    Table::Employees => "id",
                    _ => "employee_id",
                };
                row.get(key)
                    .and_then(|v| v.as_str())
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .map(|id| ids.contains(&id))
                    // Tables without an employee column are not scoped.
                    .unwrap_or(row.get(key).is_none())
            }
        }
    }
}

string_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum ChangeKind {
        Insert => "insert",
        Update => "update",
        Delete => "delete",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    /// New row for insert/update, old row (at least its id) for delete.
    pub row: Row,
}

/// Messages delivered on a subscription channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Change(ChangeEvent),
    /// The subscription for `table` stopped delivering; it must be reopened.
    Closed { table: Table, reason: String },
}

/// Disposable subscription. Dropping it, or calling [`unsubscribe`], stops
/// delivery for its table.
///
/// [`unsubscribe`]: SubscriptionHandle::unsubscribe
#[derive(Debug)]
pub struct SubscriptionHandle {
    table: Table,
    token: CancellationToken,
}

impl SubscriptionHandle {
    pub fn new(table: Table, token: CancellationToken) -> Self {
        Self { table, token }
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub fn unsubscribe(self) {
        self.token.cancel();
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

pub type NotificationSender = mpsc::Sender<Notification>;

pub trait Backend: Send + Sync {
    fn select<'a>(&'a self, table: Table, filter: &'a RowFilter) -> BoxFuture<'a, Result<Vec<Row>>>;

    fn insert<'a>(&'a self, table: Table, row: Row) -> BoxFuture<'a, Result<Row>>;

    fn update<'a>(&'a self, table: Table, id: Uuid, patch: Row) -> BoxFuture<'a, Result<Row>>;

    fn delete<'a>(&'a self, table: Table, id: Uuid) -> BoxFuture<'a, Result<()>>;

    fn subscribe<'a>(
        &'a self,
        table: Table,
        filter: RowFilter,
        sender: NotificationSender,
    ) -> BoxFuture<'a, Result<SubscriptionHandle>>;
}
