use chrono::NaiveDate;
use std::future::Future;
use std::sync::Arc;

use crate::config::Config;
use crate::database::backend::Backend;
use crate::database::models::{OverlapDetected, Schedule, ViewType};
use crate::error::{CalendarError, Result};
use crate::services::layout_cache::LayoutCache;
use crate::services::schedule_index::{IndexStore, ScheduleIndex};
use crate::services::session::CalendarSession;
use crate::services::sync_reconciler::SyncReconciler;
use crate::services::user_context::Actor;

/// Everything a calendar view needs: the backend, the shared index and the
/// layout cache built from one configuration.
#[derive(Clone)]
pub struct CalendarContext {
    pub backend: Arc<dyn Backend>,
    pub store: IndexStore,
    pub layouts: LayoutCache,
    pub config: Config,
}

impl CalendarContext {
    pub fn new(backend: Arc<dyn Backend>, config: Config) -> Self {
        Self {
            backend,
            store: IndexStore::new(),
            layouts: LayoutCache::from_config(&config),
            config,
        }
    }

    /// Reconciler feeding this context's store with the rows `actor` sees.
    pub fn reconciler(&self, actor: &Actor) -> SyncReconciler {
        SyncReconciler::new(Arc::clone(&self.backend), self.store.clone(), actor, &self.config)
    }

    /// Navigation state starting at `today`, drawn on the configured
    /// timeline axis.
    pub fn session(&self, view: ViewType, today: NaiveDate) -> Result<CalendarSession> {
        CalendarSession::new(view, today, self.config.timeline_axis()?)
    }
}

/// Rejects `candidate` if it intersects another active schedule of the same
/// employee.
pub fn check_overlap(index: &ScheduleIndex, candidate: &Schedule) -> Result<()> {
    if !candidate.is_active() {
        return Ok(());
    }
    let clash = index
        .by_employee(candidate.employee_id, None)
        .into_iter()
        .find(|other| other.id != candidate.id && other.is_active() && other.overlaps(candidate));

    match clash {
        Some(other) => Err(CalendarError::OverlapDetected(OverlapDetected {
            employee_id: candidate.employee_id,
            first: other.id,
            second: candidate.id,
        })),
        None => Ok(()),
    }
}

/// Second phase of an optimistic write. The speculative change is already in
/// the store; `write` talks to the backend, then either `confirm` installs
/// the authoritative result or `rollback` undoes the speculation.
///
/// Runs on its own task: dropping the caller does not cancel the write, and
/// its outcome still lands in the store.
pub async fn commit<O, T, W, C, R>(store: &IndexStore, write: W, confirm: C, rollback: R) -> Result<T>
where
    O: Send + 'static,
    T: Send + 'static,
    W: Future<Output = Result<O>> + Send + 'static,
    C: FnOnce(&mut ScheduleIndex, O) -> Result<T> + Send + 'static,
    R: FnOnce(&mut ScheduleIndex) + Send + 'static,
{
    let store = store.clone();
    let task = tokio::spawn(async move {
        let outcome = match write.await {
            Ok(output) => store.apply(|index| confirm(index, output)),
            Err(e) => Err(e),
        };
        if let Err(ref e) = outcome {
            log::error!("Write failed, rolling back speculative change: {}", e);
            store.apply(rollback);
        }
        outcome
    });

    task.await
        .map_err(|e| CalendarError::transport(format!("write task aborted: {}", e)))?
}
