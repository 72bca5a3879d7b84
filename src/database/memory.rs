//! In-process backend that keeps rows in memory and fans out change
//! notifications to subscribers. Used by tests and by embedders that feed
//! the engine from their own transport.

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::backend::{
    Backend, ChangeEvent, ChangeKind, Notification, NotificationSender, RowFilter,
    SubscriptionHandle, Table,
};
use super::types::{Row, row_id};
use crate::error::{CalendarError, Result};

struct Subscriber {
    table: Table,
    filter: RowFilter,
    sender: NotificationSender,
    token: CancellationToken,
}

#[derive(Default)]
struct FailureInjection {
    selects: usize,
    writes: usize,
    subscribes: usize,
}

fn take_failure(counter: &mut usize) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

#[derive(Default)]
struct State {
    tables: HashMap<Table, BTreeMap<Uuid, Row>>,
    subscribers: Vec<Subscriber>,
    failures: FailureInjection,
    write_latency: Option<Duration>,
    select_calls: usize,
}

impl State {
    fn broadcast(&mut self, event: ChangeEvent) {
        self.subscribers
            .retain(|s| !s.token.is_cancelled() && !s.sender.is_closed());

        for subscriber in &self.subscribers {
            if subscriber.table != event.table || !subscriber.filter.matches(event.table, &event.row) {
                continue;
            }
            match subscriber.sender.try_send(Notification::Change(event.clone())) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    log::warn!(
                        "Subscriber queue for '{}' is full, dropping {} notification",
                        event.table,
                        event.kind
                    );
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<State>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads rows without notifying subscribers.
    pub fn seed(&self, table: Table, rows: impl IntoIterator<Item = Row>) {
        let mut state = self.lock();
        let entries = state.tables.entry(table).or_default();
        for mut row in rows {
            let id = row_id(&row).unwrap_or_else(Uuid::new_v4);
            if let Value::Object(ref mut map) = row {
                map.insert("id".into(), json!(id));
            }
            entries.insert(id, row);
        }
    }

    pub fn rows(&self, table: Table) -> Vec<Row> {
        self.lock()
            .tables
            .get(&table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn row(&self, table: Table, id: Uuid) -> Option<Row> {
        self.lock().tables.get(&table).and_then(|rows| rows.get(&id).cloned())
    }

    pub fn fail_next_selects(&self, count: usize) {
        self.lock().failures.selects = count;
    }

    pub fn fail_next_writes(&self, count: usize) {
        self.lock().failures.writes = count;
    }

    pub fn fail_next_subscribes(&self, count: usize) {
        self.lock().failures.subscribes = count;
    }

    pub fn set_write_latency(&self, latency: Option<Duration>) {
        self.lock().write_latency = latency;
    }

    pub fn select_calls(&self) -> usize {
        self.lock().select_calls
    }

    pub fn subscriber_count(&self, table: Table) -> usize {
        self.lock()
            .subscribers
            .iter()
            .filter(|s| s.table == table && !s.token.is_cancelled() && !s.sender.is_closed())
            .count()
    }

    /// Simulates the transport dropping every subscription on `table`.
    pub fn drop_subscriptions(&self, table: Table, reason: &str) {
        let mut state = self.lock();
        for subscriber in state.subscribers.iter().filter(|s| s.table == table) {
            let _ = subscriber.sender.try_send(Notification::Closed {
                table,
                reason: reason.to_string(),
            });
            subscriber.token.cancel();
        }
        state.subscribers.retain(|s| s.table != table);
    }

    /// Delivers a notification without touching stored rows, e.g. one the
    /// store already applied or one that arrives out of order.
    pub fn emit(&self, event: ChangeEvent) {
        self.lock().broadcast(event);
    }

    /// Writes a row as another client would, notifying subscribers.
    pub fn remote_upsert(&self, table: Table, row: Row) {
        let Some(id) = row_id(&row) else {
            log::warn!("Ignoring remote upsert without id on '{}'", table);
            return;
        };
        let mut state = self.lock();
        let existed = state
            .tables
            .entry(table)
            .or_default()
            .insert(id, row.clone())
            .is_some();
        let kind = if existed { ChangeKind::Update } else { ChangeKind::Insert };
        state.broadcast(ChangeEvent { table, kind, row });
    }

    pub fn remote_delete(&self, table: Table, id: Uuid) {
        let mut state = self.lock();
        let removed = state.tables.entry(table).or_default().remove(&id);
        let row = removed.unwrap_or_else(|| json!({ "id": id }));
        state.broadcast(ChangeEvent {
            table,
            kind: ChangeKind::Delete,
            row,
        });
    }

    /// Changes a stored row silently; only a full refetch will see it.
    pub fn silent_upsert(&self, table: Table, row: Row) {
        self.seed(table, [row]);
    }

    /// Injected failures still pay the configured latency, so a write can be
    /// observed in flight before it fails.
    async fn simulate_write(&self) -> Result<()> {
        let (fail, latency) = {
            let mut state = self.lock();
            (take_failure(&mut state.failures.writes), state.write_latency)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if fail {
            return Err(CalendarError::transport("injected write failure"));
        }
        Ok(())
    }
}

impl Backend for InMemoryBackend {
    fn select<'a>(&'a self, table: Table, filter: &'a RowFilter) -> BoxFuture<'a, Result<Vec<Row>>> {
        async move {
            let mut state = self.lock();
            state.select_calls += 1;
            if take_failure(&mut state.failures.selects) {
                return Err(CalendarError::transport(format!(
                    "injected select failure on '{}'",
                    table
                )));
            }
            Ok(state
                .tables
                .get(&table)
                .map(|rows| {
                    rows.values()
                        .filter(|row| filter.matches(table, row))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }
        .boxed()
    }

    fn insert<'a>(&'a self, table: Table, row: Row) -> BoxFuture<'a, Result<Row>> {
        async move {
            self.simulate_write().await?;

            let Value::Object(mut map) = row else {
                return Err(CalendarError::invalid_row(table.as_str(), "row must be an object"));
            };
            let id = map
                .get("id")
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok())
                .unwrap_or_else(Uuid::new_v4);
            map.insert("id".into(), json!(id));
            let row = Value::Object(map);

            let mut state = self.lock();
            state.tables.entry(table).or_default().insert(id, row.clone());
            state.broadcast(ChangeEvent {
                table,
                kind: ChangeKind::Insert,
                row: row.clone(),
            });
            Ok(row)
        }
        .boxed()
    }

    fn update<'a>(&'a self, table: Table, id: Uuid, patch: Row) -> BoxFuture<'a, Result<Row>> {
        async move {
            self.simulate_write().await?;

            let mut state = self.lock();
            let Some(existing) = state.tables.entry(table).or_default().get_mut(&id) else {
                return Err(CalendarError::NotFound(format!("{} row {}", table, id)));
            };
            if let (Value::Object(target), Value::Object(changes)) = (&mut *existing, patch) {
                for (key, value) in changes {
                    if key != "id" {
                        target.insert(key, value);
                    }
                }
            }
            let row = existing.clone();
            state.broadcast(ChangeEvent {
                table,
                kind: ChangeKind::Update,
                row: row.clone(),
            });
            Ok(row)
        }
        .boxed()
    }

    fn delete<'a>(&'a self, table: Table, id: Uuid) -> BoxFuture<'a, Result<()>> {
        async move {
            self.simulate_write().await?;

            let mut state = self.lock();
            let Some(row) = state.tables.entry(table).or_default().remove(&id) else {
                return Err(CalendarError::NotFound(format!("{} row {}", table, id)));
            };
            state.broadcast(ChangeEvent {
                table,
                kind: ChangeKind::Delete,
                row,
            });
            Ok(())
        }
        .boxed()
    }

    fn subscribe<'a>(
        &'a self,
        table: Table,
        filter: RowFilter,
        sender: NotificationSender,
    ) -> BoxFuture<'a, Result<SubscriptionHandle>> {
        async move {
            let mut state = self.lock();
            if take_failure(&mut state.failures.subscribes) {
                return Err(CalendarError::transport(format!(
                    "injected subscribe failure on '{}'",
                    table
                )));
            }
            let token = CancellationToken::new();
            state.subscribers.push(Subscriber {
                table,
                filter,
                sender,
                token: token.clone(),
            });
            Ok(SubscriptionHandle::new(table, token))
        }
        .boxed()
    }
}
