use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

use shiftcal::database::{ChangeEvent, ChangeKind, Table};
use shiftcal::services::{Actor, ReconcilerState};

mod common;

use common::{MockData, TestCalendar, eventually};

fn june_2() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
}

#[tokio::test]
async fn test_initial_load_and_live_deltas() {
    let app = TestCalendar::new();
    let employee = Uuid::new_v4();
    let seeded = Uuid::new_v4();
    app.seed_schedules([MockData::schedule_row(
        seeded,
        employee,
        "2025-06-02T09:00:00Z",
        "2025-06-02T17:00:00Z",
    )]);

    let reconciler = app.reconciler();
    reconciler.start().await;
    assert_eq!(reconciler.state(), ReconcilerState::Subscribed);
    assert_eq!(app.ctx.store.snapshot().by_day(june_2()).len(), 1);

    let remote = Uuid::new_v4();
    app.backend.remote_upsert(
        Table::Schedules,
        MockData::schedule_row(remote, employee, "2025-06-03T09:00:00Z", "2025-06-03T12:00:00Z"),
    );
    assert!(eventually(|| app.ctx.store.snapshot().contains(remote)).await);

    app.backend.remote_delete(Table::Schedules, seeded);
    assert!(eventually(|| !app.ctx.store.snapshot().contains(seeded)).await);

    let stats = reconciler.stats();
    assert!(stats.full_reconciles >= 1);
    assert!(stats.applied_deltas >= 2);

    reconciler.stop().await;
}

#[tokio::test]
async fn test_update_for_unknown_id_inserts_and_unknown_delete_is_noop() {
    let app = TestCalendar::new();
    let reconciler = app.reconciler();
    reconciler.start().await;

    let id = Uuid::new_v4();
    app.backend.emit(ChangeEvent {
        table: Table::Schedules,
        kind: ChangeKind::Update,
        row: MockData::schedule_row(id, Uuid::new_v4(), "2025-06-02T09:00:00Z", "2025-06-02T10:00:00Z"),
    });
    assert!(eventually(|| app.ctx.store.snapshot().contains(id)).await);

    let generation = app.ctx.store.generation();
    app.backend.emit(ChangeEvent {
        table: Table::Schedules,
        kind: ChangeKind::Delete,
        row: json!({ "id": Uuid::new_v4() }),
    });
    assert!(eventually(|| reconciler.stats().applied_deltas == 2).await);
    assert_eq!(app.ctx.store.snapshot().len(), 1);
    assert_eq!(app.ctx.store.generation(), generation);

    reconciler.stop().await;
}

#[tokio::test]
async fn test_malformed_rows_are_quarantined() {
    let app = TestCalendar::new();
    app.seed_schedules([
        json!({ "id": Uuid::new_v4(), "employee_id": Uuid::new_v4(), "start_time": "garbage", "end_time": "2025-06-02T10:00:00Z" }),
        MockData::schedule_row(Uuid::new_v4(), Uuid::new_v4(), "2025-06-02T09:00:00Z", "2025-06-02T10:00:00Z"),
    ]);

    let reconciler = app.reconciler();
    reconciler.start().await;
    assert_eq!(app.ctx.store.snapshot().len(), 1);
    assert_eq!(reconciler.stats().quarantined, 1);

    // Inverted interval and an unknown status are both rejected at the boundary.
    app.backend.emit(ChangeEvent {
        table: Table::Schedules,
        kind: ChangeKind::Insert,
        row: MockData::schedule_row(Uuid::new_v4(), Uuid::new_v4(), "2025-06-02T12:00:00Z", "2025-06-02T09:00:00Z"),
    });
    let mut bad_status =
        MockData::schedule_row(Uuid::new_v4(), Uuid::new_v4(), "2025-06-02T09:00:00Z", "2025-06-02T10:00:00Z");
    bad_status["status"] = json!("on_hold");
    app.backend.emit(ChangeEvent {
        table: Table::Schedules,
        kind: ChangeKind::Insert,
        row: bad_status,
    });

    assert!(eventually(|| reconciler.stats().quarantined == 3).await);
    assert_eq!(app.ctx.store.snapshot().len(), 1);

    reconciler.stop().await;
}

#[tokio::test]
async fn test_fallback_recovers_from_transport_failures() {
    let app = TestCalendar::new();
    app.backend.fail_next_selects(1);
    app.backend.fail_next_subscribes(1);

    let reconciler = app.reconciler();
    reconciler.start().await;
    assert!(reconciler.stats().transport_errors >= 2);
    assert_eq!(app.backend.subscriber_count(Table::Schedules), 0);

    // A change made while unsubscribed is only visible to a full refetch.
    let missed = Uuid::new_v4();
    app.backend.silent_upsert(
        Table::Schedules,
        MockData::schedule_row(missed, Uuid::new_v4(), "2025-06-02T09:00:00Z", "2025-06-02T10:00:00Z"),
    );

    reconciler.reconcile_now();
    assert!(eventually(|| app.ctx.store.snapshot().contains(missed)).await);
    assert!(eventually(|| app.backend.subscriber_count(Table::Schedules) == 1).await);

    reconciler.stop().await;
}

#[tokio::test]
async fn test_dropped_subscription_is_reopened_on_fallback_tick() {
    let app = TestCalendar::new();
    let reconciler = app.reconciler();
    reconciler.start().await;
    let reconciles = reconciler.stats().full_reconciles;

    app.backend.drop_subscriptions(Table::Schedules, "socket closed");
    assert_eq!(app.backend.subscriber_count(Table::Schedules), 0);

    // Test configuration ticks every second.
    assert!(
        tokio::time::timeout(Duration::from_secs(5), async {
            while app.backend.subscriber_count(Table::Schedules) == 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .is_ok()
    );
    assert!(reconciler.stats().full_reconciles > reconciles);
    assert!(reconciler.stats().transport_errors >= 1);

    reconciler.stop().await;
}

#[tokio::test]
async fn test_stop_ends_all_index_mutation() {
    let app = TestCalendar::new();
    let reconciler = app.reconciler();
    let mut states = reconciler.watch_state();
    reconciler.start().await;

    reconciler.stop().await;
    assert_eq!(reconciler.state(), ReconcilerState::Stopped);
    assert_eq!(*states.borrow_and_update(), ReconcilerState::Stopped);

    let generation = app.ctx.store.generation();
    app.backend.remote_upsert(
        Table::Schedules,
        MockData::schedule_row(Uuid::new_v4(), Uuid::new_v4(), "2025-06-02T09:00:00Z", "2025-06-02T10:00:00Z"),
    );
    reconciler.reconcile_now();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(app.ctx.store.generation(), generation);
}

#[tokio::test]
async fn test_employee_sees_only_own_schedules() {
    let app = TestCalendar::new();
    let me = Uuid::new_v4();
    let mine = Uuid::new_v4();
    app.seed_schedules([
        MockData::schedule_row(mine, me, "2025-06-02T09:00:00Z", "2025-06-02T17:00:00Z"),
        MockData::schedule_row(Uuid::new_v4(), Uuid::new_v4(), "2025-06-02T09:00:00Z", "2025-06-02T17:00:00Z"),
    ]);
    app.backend.seed(
        Table::OpenShifts,
        [MockData::open_shift_row(Uuid::new_v4(), "2025-06-04T09:00:00Z", "2025-06-04T17:00:00Z", "open")],
    );

    let reconciler = app.ctx.reconciler(&Actor::employee(me));
    reconciler.start().await;

    let snapshot = app.ctx.store.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.contains(mine));
    // Open shifts are visible to everyone.
    assert_eq!(
        snapshot
            .open_shifts_in_range(june_2(), NaiveDate::from_ymd_opt(2025, 6, 8).unwrap())
            .len(),
        1
    );

    app.backend.remote_upsert(
        Table::Schedules,
        MockData::schedule_row(Uuid::new_v4(), Uuid::new_v4(), "2025-06-03T09:00:00Z", "2025-06-03T17:00:00Z"),
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(app.ctx.store.snapshot().len(), 1);

    reconciler.stop().await;
}
