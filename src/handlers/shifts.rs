use std::sync::Arc;
use uuid::Uuid;

use crate::database::backend::Table;
use crate::database::models::{Schedule, ScheduleInput, SchedulePatch, ScheduleStatus, SyncState};
use crate::database::types::{Row, decode_schedule, encode_schedule, encode_schedule_patch};
use crate::error::{CalendarError, Result};
use crate::handlers::shared::{CalendarContext, check_overlap, commit};
use crate::services::availability;
use crate::services::schedule_index::ScheduleIndex;
use crate::services::user_context::Actor;

fn confirm_schedule(index: &mut ScheduleIndex, row: Row) -> Result<Schedule> {
    let schedule = decode_schedule(&row)?;
    index.upsert(schedule.clone());
    Ok(schedule)
}

/// Logs assignments that fall outside the employee's resolved working window.
fn warn_outside_availability(index: &ScheduleIndex, schedule: &Schedule) {
    let Some(employee) = index.employee(schedule.employee_id) else {
        return;
    };
    match availability::resolve_for_date(employee, schedule.date(), index.patterns()) {
        Ok(resolved) if !availability::covers(&resolved, schedule) => {
            log::warn!(
                "Schedule {} for {} on {} is outside their availability ({} {}-{})",
                schedule.id,
                employee.name,
                schedule.date(),
                if resolved.available { "available" } else { "unavailable" },
                resolved.start.format("%H:%M"),
                resolved.end.format("%H:%M"),
            );
        }
        Ok(_) => {}
        Err(e) => log::warn!("Cannot resolve availability for {}: {}", employee.name, e),
    }
}

// Shift handlers
pub async fn create_shift(ctx: &CalendarContext, actor: &Actor, input: ScheduleInput) -> Result<Schedule> {
    actor.requires_scheduler()?;
    input.validate()?;

    let id = Uuid::new_v4();
    let mut speculative = input.into_schedule(id);
    speculative.sync_state = SyncState::Pending;

    ctx.store.apply(|index| -> Result<()> {
        check_overlap(index, &speculative)?;
        warn_outside_availability(index, &speculative);
        index.upsert(speculative.clone());
        Ok(())
    })?;

    let backend = Arc::clone(&ctx.backend);
    let row = encode_schedule(&speculative);
    let schedule = commit(
        &ctx.store,
        async move { backend.insert(Table::Schedules, row).await },
        confirm_schedule,
        move |index| {
            if index.get(id).is_some_and(Schedule::is_pending_sync) {
                index.remove(id);
            }
        },
    )
    .await
    .map_err(|e| {
        log::error!("Failed to create shift: {}", e);
        e
    })?;

    log::info!(
        "Shift {} created for employee {} by {} ({} - {})",
        schedule.id,
        schedule.employee_id,
        actor.id,
        schedule.start_time,
        schedule.end_time
    );
    Ok(schedule)
}

pub async fn update_shift(
    ctx: &CalendarContext,
    actor: &Actor,
    id: Uuid,
    patch: SchedulePatch,
) -> Result<Schedule> {
    actor.requires_scheduler()?;
    if patch.is_empty() {
        return ctx
            .store
            .snapshot()
            .get(id)
            .cloned()
            .ok_or(CalendarError::StaleWrite(id));
    }

    let previous = ctx.store.apply(|index| -> Result<Schedule> {
        let previous = index.get(id).cloned().ok_or(CalendarError::StaleWrite(id))?;
        let mut candidate = previous.clone();
        patch.apply(&mut candidate);
        if candidate.end_time <= candidate.start_time {
            return Err(CalendarError::invalid_time_range(format!(
                "end_time ({}) must be after start_time ({})",
                candidate.end_time, candidate.start_time
            )));
        }
        check_overlap(index, &candidate)?;
        candidate.sync_state = SyncState::Pending;
        index.upsert(candidate);
        Ok(previous)
    })?;

    let backend = Arc::clone(&ctx.backend);
    let changes = encode_schedule_patch(&patch);
    let schedule = commit(
        &ctx.store,
        async move {
            match backend.update(Table::Schedules, id, changes).await {
                Err(CalendarError::NotFound(_)) => Err(CalendarError::StaleWrite(id)),
                other => other,
            }
        },
        confirm_schedule,
        move |index| {
            // A remote delete or a newer authoritative row wins over the old copy.
            if index.get(id).is_some_and(Schedule::is_pending_sync) {
                index.upsert(previous);
            }
        },
    )
    .await
    .map_err(|e| {
        log::error!("Failed to update shift {}: {}", id, e);
        e
    })?;

    log::info!("Shift {} updated by {}", id, actor.id);
    Ok(schedule)
}

pub async fn set_status(
    ctx: &CalendarContext,
    actor: &Actor,
    id: Uuid,
    status: ScheduleStatus,
) -> Result<Schedule> {
    update_shift(ctx, actor, id, SchedulePatch::status(status)).await
}

/// Cancellation is a status change; the schedule stays in the index.
pub async fn cancel_shift(ctx: &CalendarContext, actor: &Actor, id: Uuid) -> Result<Schedule> {
    set_status(ctx, actor, id, ScheduleStatus::Cancelled).await
}

pub async fn delete_shift(ctx: &CalendarContext, actor: &Actor, id: Uuid) -> Result<()> {
    actor.requires_scheduler()?;

    let previous = ctx
        .store
        .apply(|index| index.begin_delete(id))
        .ok_or(CalendarError::StaleWrite(id))?;

    let backend = Arc::clone(&ctx.backend);
    commit(
        &ctx.store,
        async move {
            match backend.delete(Table::Schedules, id).await {
                Ok(()) | Err(CalendarError::NotFound(_)) => Ok(()),
                Err(e) => Err(e),
            }
        },
        move |index, ()| {
            index.finish_delete(id);
            Ok(())
        },
        move |index| {
            if !index.cancel_delete(id, previous) {
                log::debug!("Shift {} changed remotely during delete, keeping remote state", id);
            }
        },
    )
    .await
    .map_err(|e| {
        log::error!("Failed to delete shift {}: {}", id, e);
        e
    })?;

    log::info!("Shift {} deleted by {}", id, actor.id);
    Ok(())
}
