#![allow(dead_code)]

use fake::Fake;
use fake::faker::name::en::Name;
use serde_json::{Value, json};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use shiftcal::config::Config;
use shiftcal::database::models::*;
use shiftcal::database::{InMemoryBackend, Table};
use shiftcal::handlers::CalendarContext;
use shiftcal::services::{Actor, SyncReconciler};

pub fn setup_test_env() {
    unsafe {
        env::set_var("RUST_LOG", "debug");
    }
    let _ = env_logger::builder().is_test(true).try_init();
}

// Test application wrapper
pub struct TestCalendar {
    pub backend: InMemoryBackend,
    pub ctx: CalendarContext,
    pub manager: Actor,
}

impl TestCalendar {
    pub fn new() -> Self {
        Self::with_config(Config::test_config().expect("test config"))
    }

    pub fn with_config(config: Config) -> Self {
        setup_test_env();
        let backend = InMemoryBackend::new();
        let ctx = CalendarContext::new(Arc::new(backend.clone()), config);
        TestCalendar {
            backend,
            ctx,
            manager: Actor::manager(Uuid::new_v4()),
        }
    }

    pub fn reconciler(&self) -> SyncReconciler {
        self.ctx.reconciler(&self.manager)
    }

    pub fn seed_schedules(&self, rows: impl IntoIterator<Item = Value>) {
        self.backend.seed(Table::Schedules, rows);
    }
}

// Mock data generators
pub struct MockData;

impl MockData {
    pub fn name() -> String {
        Name().fake()
    }

    pub fn employee() -> Employee {
        Employee::new(Uuid::new_v4(), Self::name())
    }

    pub fn schedule_input(employee_id: Uuid, start: &str, end: &str) -> ScheduleInput {
        ScheduleInput {
            employee_id,
            title: "Front desk".to_string(),
            start_time: Timestamp::parse(start).expect("valid start"),
            end_time: Timestamp::parse(end).expect("valid end"),
            location: None,
            notes: None,
            status: ScheduleStatus::Confirmed,
            recurring: false,
            shift_type: None,
            template_id: None,
        }
    }

    pub fn schedule(employee_id: Uuid, start: &str, end: &str) -> Schedule {
        Self::schedule_input(employee_id, start, end).into_schedule(Uuid::new_v4())
    }

    pub fn schedule_row(id: Uuid, employee_id: Uuid, start: &str, end: &str) -> Value {
        json!({
            "id": id,
            "employee_id": employee_id,
            "title": "Front desk",
            "start_time": start,
            "end_time": end,
            "status": "confirmed",
            "recurring": false
        })
    }

    pub fn open_shift_row(id: Uuid, start: &str, end: &str, status: &str) -> Value {
        json!({
            "id": id,
            "title": "Cover",
            "start_time": start,
            "end_time": end,
            "status": status,
            "platform": "web"
        })
    }
}

/// Polls `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
