//! Keeps an [`IndexStore`] consistent with the backend.
//!
//! One task owns the notification receiver, so changes to a row are applied
//! in the order they were received. A fallback timer forces a full refetch
//! and reopens dropped subscriptions; transport errors are logged, counted
//! and left for the next tick.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::database::backend::{
    Backend, ChangeEvent, ChangeKind, Notification, NotificationSender, RowFilter,
    SubscriptionHandle, Table,
};
use crate::database::models::{Employee, OpenShift, OpenShiftAssignment, Schedule};
use crate::database::types::{
    Row, decode_assignment, decode_employee, decode_open_shift, decode_schedule, row_id,
};
use crate::error::{CalendarError, Result};
use crate::services::schedule_index::{IndexStore, ScheduleIndex};
use crate::services::user_context::Actor;

/// Tables mirrored into the index.
pub const WATCHED_TABLES: [Table; 4] = [
    Table::Schedules,
    Table::Employees,
    Table::OpenShifts,
    Table::OpenShiftAssignments,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcilerState {
    Idle,
    Subscribed,
    Reconciling,
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcilerStats {
    pub applied_deltas: u64,
    pub full_reconciles: u64,
    pub quarantined: u64,
    pub transport_errors: u64,
}

#[derive(Default)]
struct Counters {
    applied_deltas: AtomicU64,
    full_reconciles: AtomicU64,
    quarantined: AtomicU64,
    transport_errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ReconcilerStats {
        ReconcilerStats {
            applied_deltas: self.applied_deltas.load(Ordering::Relaxed),
            full_reconciles: self.full_reconciles.load(Ordering::Relaxed),
            quarantined: self.quarantined.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
        }
    }
}

enum Decoded {
    Schedule(Schedule),
    Employee(Employee),
    OpenShift(OpenShift),
    Assignment(OpenShiftAssignment),
}

fn decode_row(table: Table, row: &Row) -> Result<Decoded> {
    Ok(match table {
        Table::Schedules => Decoded::Schedule(decode_schedule(row)?),
        Table::Employees => Decoded::Employee(decode_employee(row)?),
        Table::OpenShifts => Decoded::OpenShift(decode_open_shift(row)?),
        Table::OpenShiftAssignments => Decoded::Assignment(decode_assignment(row)?),
    })
}

fn apply_upsert(index: &mut ScheduleIndex, decoded: Decoded) {
    match decoded {
        Decoded::Schedule(schedule) => {
            index.upsert(schedule);
        }
        Decoded::Employee(employee) => {
            index.upsert_employee(employee);
        }
        Decoded::OpenShift(open_shift) => {
            index.upsert_open_shift(open_shift);
        }
        Decoded::Assignment(assignment) => {
            index.upsert_assignment(assignment);
        }
    }
}

fn apply_delete(index: &mut ScheduleIndex, table: Table, id: Uuid) -> bool {
    match table {
        Table::Schedules => index.remove(id).is_some(),
        Table::Employees => index.remove_employee(id).is_some(),
        Table::OpenShifts => index.remove_open_shift(id).is_some(),
        Table::OpenShiftAssignments => index.remove_assignment(id).is_some(),
    }
}

#[derive(Default)]
struct FullSnapshot {
    schedules: Vec<Schedule>,
    employees: Vec<Employee>,
    open_shifts: Vec<OpenShift>,
    assignments: Vec<OpenShiftAssignment>,
}

impl FullSnapshot {
    fn push(&mut self, decoded: Decoded) {
        match decoded {
            Decoded::Schedule(s) => self.schedules.push(s),
            Decoded::Employee(e) => self.employees.push(e),
            Decoded::OpenShift(o) => self.open_shifts.push(o),
            Decoded::Assignment(a) => self.assignments.push(a),
        }
    }

    fn install(self, index: &mut ScheduleIndex) {
        index.replace_schedules(self.schedules);
        index.replace_employees(self.employees);
        index.replace_open_shifts(self.open_shifts);
        index.replace_assignments(self.assignments);
    }
}

struct Worker {
    backend: Arc<dyn Backend>,
    store: IndexStore,
    filter: RowFilter,
    sender: NotificationSender,
    subscriptions: HashMap<Table, SubscriptionHandle>,
    state: watch::Sender<ReconcilerState>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
}

impl Worker {
    fn set_state(&self, state: ReconcilerState) {
        if self.cancel.is_cancelled() && state != ReconcilerState::Stopped {
            return;
        }
        let previous = self.state.send_replace(state);
        if previous != state {
            log::debug!("Reconciler state {:?} -> {:?}", previous, state);
        }
    }

    /// `Subscribed` only while every watched table has a live subscription;
    /// otherwise the index is fed by fallback refetches alone.
    fn connected_state(&self) -> ReconcilerState {
        let live = WATCHED_TABLES.iter().all(|table| {
            self.subscriptions
                .get(table)
                .is_some_and(SubscriptionHandle::is_active)
        });
        if live {
            ReconcilerState::Subscribed
        } else {
            ReconcilerState::Idle
        }
    }

    fn quarantine(&self, table: Table, error: &CalendarError) {
        Counters::bump(&self.counters.quarantined);
        log::warn!("Quarantined malformed '{}' row: {}", table, error);
    }

    fn transport_error(&self, context: &str, error: &CalendarError) {
        Counters::bump(&self.counters.transport_errors);
        log::error!("Sync {} failed, retrying on next fallback: {}", context, error);
    }

    /// Opens a subscription for every watched table that has none, or whose
    /// subscription was dropped by the transport.
    async fn ensure_subscriptions(&mut self) {
        self.subscriptions.retain(|_, handle| handle.is_active());
        for table in WATCHED_TABLES {
            if self.subscriptions.contains_key(&table) {
                continue;
            }
            let subscribed = self
                .backend
                .subscribe(table, self.filter.clone(), self.sender.clone())
                .await;
            match subscribed {
                Ok(handle) => {
                    log::info!("Subscribed to '{}' changes", table);
                    self.subscriptions.insert(table, handle);
                }
                Err(e) => self.transport_error(&format!("subscribe to '{}'", table), &e),
            }
        }
    }

    async fn fetch_all(&self) -> Result<FullSnapshot> {
        let mut snapshot = FullSnapshot::default();
        for table in WATCHED_TABLES {
            let rows = self.backend.select(table, &self.filter).await?;
            for row in &rows {
                match decode_row(table, row) {
                    Ok(decoded) => snapshot.push(decoded),
                    Err(e) => self.quarantine(table, &e),
                }
            }
        }
        Ok(snapshot)
    }

    /// Refetches every watched table and replaces the index contents in one
    /// mutation. Nothing is applied if any fetch fails or the reconciler is
    /// stopped while fetching.
    async fn full_reconcile(&mut self) {
        self.set_state(ReconcilerState::Reconciling);

        let fetched = tokio::select! {
            _ = self.cancel.cancelled() => return,
            fetched = self.fetch_all() => fetched,
        };

        match fetched {
            Ok(snapshot) if !self.cancel.is_cancelled() => {
                let schedules = snapshot.schedules.len();
                self.store.apply(|index| snapshot.install(index));
                Counters::bump(&self.counters.full_reconciles);
                log::info!("Full reconcile applied ({} schedules)", schedules);
            }
            Ok(_) => return,
            Err(e) => self.transport_error("full reconcile", &e),
        }

        self.set_state(self.connected_state());
    }

    async fn fallback(&mut self) {
        self.ensure_subscriptions().await;
        self.full_reconcile().await;
    }

    fn apply_change(&self, event: ChangeEvent) {
        let ChangeEvent { table, kind, row } = event;
        match kind {
            ChangeKind::Delete => {
                let Some(id) = row_id(&row) else {
                    self.quarantine(table, &CalendarError::invalid_row(table.as_str(), "delete without id"));
                    return;
                };
                let removed = self.store.apply(|index| apply_delete(index, table, id));
                if !removed {
                    log::debug!("Delete for unknown '{}' row {} ignored", table, id);
                }
            }
            ChangeKind::Insert | ChangeKind::Update => match decode_row(table, &row) {
                Ok(decoded) => self.store.apply(|index| apply_upsert(index, decoded)),
                Err(e) => {
                    self.quarantine(table, &e);
                    return;
                }
            },
        }
        Counters::bump(&self.counters.applied_deltas);
    }

    fn handle(&mut self, notification: Notification) {
        match notification {
            Notification::Change(event) => {
                self.set_state(ReconcilerState::Reconciling);
                self.apply_change(event);
                self.set_state(self.connected_state());
            }
            Notification::Closed { table, reason } => {
                self.subscriptions.remove(&table);
                self.transport_error(
                    &format!("subscription to '{}'", table),
                    &CalendarError::transport(reason),
                );
                self.set_state(self.connected_state());
            }
        }
    }

    async fn run(
        mut self,
        mut receiver: mpsc::Receiver<Notification>,
        interval: Duration,
        trigger: Arc<Notify>,
    ) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some(notification) = receiver.recv() => self.handle(notification),
                _ = trigger.notified() => self.fallback().await,
                _ = ticker.tick() => self.fallback().await,
            }
        }

        self.subscriptions.clear();
        self.set_state(ReconcilerState::Stopped);
        log::info!("Reconciler stopped");
    }
}

pub struct SyncReconciler {
    backend: Arc<dyn Backend>,
    store: IndexStore,
    filter: RowFilter,
    interval: Duration,
    buffer: usize,
    state: watch::Sender<ReconcilerState>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
    trigger: Arc<Notify>,
    started: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncReconciler {
    pub fn new(backend: Arc<dyn Backend>, store: IndexStore, actor: &Actor, config: &Config) -> Self {
        let (state, _) = watch::channel(ReconcilerState::Idle);
        Self {
            backend,
            store,
            filter: actor.visible_filter(),
            interval: config.sync_fallback_interval(),
            buffer: config.subscription_buffer,
            state,
            counters: Arc::new(Counters::default()),
            cancel: CancellationToken::new(),
            trigger: Arc::new(Notify::new()),
            started: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn state(&self) -> ReconcilerState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ReconcilerState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> ReconcilerStats {
        self.counters.snapshot()
    }

    /// Subscribes, performs the initial full load and spawns the loop. Load
    /// or subscription failures are retried on the fallback cadence; until
    /// then the state stays `Idle`.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            log::warn!("Reconciler already started (state {:?})", self.state());
            return;
        }

        let (sender, receiver) = mpsc::channel(self.buffer);
        let mut worker = Worker {
            backend: Arc::clone(&self.backend),
            store: self.store.clone(),
            filter: self.filter.clone(),
            sender,
            subscriptions: HashMap::new(),
            state: self.state.clone(),
            counters: Arc::clone(&self.counters),
            cancel: self.cancel.clone(),
        };

        // Subscribe before loading so no change falls between the two.
        worker.ensure_subscriptions().await;
        worker.full_reconcile().await;
        worker.set_state(worker.connected_state());

        let handle = tokio::spawn(worker.run(receiver, self.interval, Arc::clone(&self.trigger)));
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Requests an immediate full reconcile from the running loop.
    pub fn reconcile_now(&self) {
        self.trigger.notify_one();
    }

    /// Cancels the loop, any in-flight fetch and every subscription. The
    /// index is not touched by this reconciler afterwards.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                log::error!("Reconciler task ended abnormally: {}", e);
            }
        }
        self.state.send_replace(ReconcilerState::Stopped);
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == ReconcilerState::Stopped
    }
}

impl Drop for SyncReconciler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::InMemoryBackend;
    use serde_json::json;

    fn schedule_row(id: Uuid, employee_id: Uuid) -> Row {
        json!({
            "id": id,
            "employee_id": employee_id,
            "title": "Shift",
            "start_time": "2025-06-02T09:00:00+00:00",
            "end_time": "2025-06-02T17:00:00+00:00",
            "status": "confirmed"
        })
    }

    fn reconciler(backend: &InMemoryBackend) -> SyncReconciler {
        SyncReconciler::new(
            Arc::new(backend.clone()),
            IndexStore::new(),
            &Actor::manager(Uuid::new_v4()),
            &Config::test_config().unwrap(),
        )
    }

    #[test]
    fn test_update_for_unknown_id_inserts() {
        let store = IndexStore::new();
        let (sender, _receiver) = mpsc::channel(1);
        let (state, _) = watch::channel(ReconcilerState::Subscribed);
        let mut worker = Worker {
            backend: Arc::new(InMemoryBackend::new()),
            store: store.clone(),
            filter: RowFilter::All,
            sender,
            subscriptions: HashMap::new(),
            state,
            counters: Arc::new(Counters::default()),
            cancel: CancellationToken::new(),
        };

        let id = Uuid::new_v4();
        worker.handle(Notification::Change(ChangeEvent {
            table: Table::Schedules,
            kind: ChangeKind::Update,
            row: schedule_row(id, Uuid::new_v4()),
        }));
        assert!(store.snapshot().contains(id));

        worker.handle(Notification::Change(ChangeEvent {
            table: Table::Schedules,
            kind: ChangeKind::Delete,
            row: json!({ "id": Uuid::new_v4() }),
        }));
        assert_eq!(store.snapshot().len(), 1);
        assert_eq!(worker.counters.snapshot().applied_deltas, 2);
    }

    #[tokio::test]
    async fn test_start_loads_and_stop_is_final() {
        let backend = InMemoryBackend::new();
        let id = Uuid::new_v4();
        backend.seed(Table::Schedules, [schedule_row(id, Uuid::new_v4())]);

        let reconciler = reconciler(&backend);
        reconciler.start().await;
        assert_eq!(reconciler.state(), ReconcilerState::Subscribed);
        assert!(reconciler.store().snapshot().contains(id));
        assert_eq!(backend.subscriber_count(Table::Schedules), 1);

        reconciler.stop().await;
        assert!(reconciler.is_stopped());
        assert_eq!(backend.subscriber_count(Table::Schedules), 0);

        let generation = reconciler.store().generation();
        backend.remote_upsert(Table::Schedules, schedule_row(Uuid::new_v4(), Uuid::new_v4()));
        assert_eq!(reconciler.store().generation(), generation);

        // Stopped is final; a second start does nothing.
        reconciler.start().await;
        assert!(reconciler.is_stopped());
    }

    #[tokio::test]
    async fn test_stays_idle_until_subscribed() {
        let backend = InMemoryBackend::new();
        backend.fail_next_subscribes(WATCHED_TABLES.len());

        let reconciler = reconciler(&backend);
        reconciler.start().await;
        assert_eq!(reconciler.state(), ReconcilerState::Idle);
        assert_eq!(reconciler.stats().full_reconciles, 1);
        assert_eq!(backend.subscriber_count(Table::Schedules), 0);

        let mut states = reconciler.watch_state();
        reconciler.reconcile_now();
        let subscribed = tokio::time::timeout(Duration::from_secs(2), async {
            states
                .wait_for(|state| *state == ReconcilerState::Subscribed)
                .await
                .is_ok()
        })
        .await;
        assert!(matches!(subscribed, Ok(true)));
        assert_eq!(backend.subscriber_count(Table::Schedules), 1);

        backend.drop_subscriptions(Table::Schedules, "socket closed");
        let idle = tokio::time::timeout(Duration::from_secs(2), async {
            states
                .wait_for(|state| *state == ReconcilerState::Idle)
                .await
                .is_ok()
        })
        .await;
        assert!(matches!(idle, Ok(true)));

        reconciler.stop().await;
    }
}
