use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::backend::Table;
use crate::database::models::{
    AssignmentStatus, OpenShift, OpenShiftAssignment, OpenShiftInput, OpenShiftStatus, Schedule,
    ScheduleStatus, SyncState,
};
use crate::database::types::{
    Row, decode_assignment, decode_open_shift, decode_schedule, encode_open_shift_input,
    encode_schedule,
};
use crate::error::{CalendarError, Result};
use crate::handlers::shared::{CalendarContext, check_overlap, commit};
use crate::services::schedule_index::ScheduleIndex;
use crate::services::user_context::Actor;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenShiftRequest {
    pub open_shift: OpenShift,
    pub assignment: OpenShiftAssignment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenShiftAssignResponse {
    pub open_shift: OpenShift,
    pub assignment: OpenShiftAssignment,
    pub schedule: Schedule,
}

fn status_patch(status: OpenShiftStatus) -> Row {
    json!({ "status": status.as_str() })
}

fn assignment_row(assignment: &OpenShiftAssignment) -> Row {
    json!({
        "id": assignment.id,
        "open_shift_id": assignment.open_shift_id,
        "employee_id": assignment.employee_id,
        "status": assignment.status.as_str(),
        "schedule_id": assignment.schedule_id,
    })
}

/// Runs a compensating backend write after a later step of a multi-row
/// write failed. A failed undo is logged; the original error still wins.
async fn undo<T>(what: String, write: impl Future<Output = Result<T>>) {
    if let Err(e) = write.await {
        log::error!("Failed to {} after partial write: {}", what, e);
    }
}

fn open_shift_for_update(index: &ScheduleIndex, id: Uuid) -> Result<OpenShift> {
    let open_shift = index
        .open_shift(id)
        .cloned()
        .ok_or_else(|| CalendarError::NotFound(format!("open shift {}", id)))?;
    if !open_shift.is_unfilled() {
        return Err(CalendarError::StaleWrite(id));
    }
    Ok(open_shift)
}

pub async fn create_open_shift(
    ctx: &CalendarContext,
    actor: &Actor,
    input: OpenShiftInput,
) -> Result<OpenShift> {
    actor.requires_scheduler()?;
    input.validate()?;

    let id = Uuid::new_v4();
    let speculative = OpenShift {
        id,
        title: input.title.clone(),
        start_time: input.start_time.clone(),
        end_time: input.end_time.clone(),
        location: input.location.clone(),
        status: OpenShiftStatus::Open,
        created_by: Some(actor.id),
        platform: input.platform,
    };
    ctx.store.apply(|index| index.upsert_open_shift(speculative));

    let mut row = encode_open_shift_input(&input, actor.id);
    row["id"] = json!(id);
    let backend = Arc::clone(&ctx.backend);
    let open_shift = commit(
        &ctx.store,
        async move { backend.insert(Table::OpenShifts, row).await },
        |index, row| {
            let open_shift = decode_open_shift(&row)?;
            index.upsert_open_shift(open_shift.clone());
            Ok(open_shift)
        },
        move |index| {
            index.remove_open_shift(id);
        },
    )
    .await
    .map_err(|e| {
        log::error!("Failed to create open shift: {}", e);
        e
    })?;

    log::info!("Open shift {} created by {}", open_shift.id, actor.id);
    Ok(open_shift)
}

/// An employee asks to take an open shift. Creates a pending assignment and
/// moves the open shift to `pending`.
pub async fn request_open_shift(
    ctx: &CalendarContext,
    actor: &Actor,
    open_shift_id: Uuid,
    employee_id: Uuid,
) -> Result<OpenShiftRequest> {
    actor.requires_same_employee(employee_id)?;

    let assignment = OpenShiftAssignment {
        id: Uuid::new_v4(),
        open_shift_id,
        employee_id,
        status: AssignmentStatus::Pending,
        schedule_id: None,
    };

    let (previous, requested) = ctx.store.apply(|index| -> Result<_> {
        let previous = open_shift_for_update(index, open_shift_id)?;
        let duplicate = index
            .assignments_for(open_shift_id)
            .iter()
            .any(|a| a.employee_id == employee_id && a.status != AssignmentStatus::Declined);
        if duplicate {
            return Err(CalendarError::StaleWrite(open_shift_id));
        }
        let mut requested = previous.clone();
        requested.status = OpenShiftStatus::Pending;
        index.upsert_open_shift(requested.clone());
        index.upsert_assignment(assignment.clone());
        Ok((previous, requested))
    })?;

    let backend = Arc::clone(&ctx.backend);
    let row = assignment_row(&assignment);
    let assignment_id = assignment.id;
    let request = commit(
        &ctx.store,
        async move {
            let assignment = backend.insert(Table::OpenShiftAssignments, row).await?;
            let open_shift = match backend
                .update(Table::OpenShifts, open_shift_id, status_patch(OpenShiftStatus::Pending))
                .await
            {
                Ok(row) => row,
                Err(e) => {
                    undo(
                        format!("remove assignment {}", assignment_id),
                        backend.delete(Table::OpenShiftAssignments, assignment_id),
                    )
                    .await;
                    return Err(e);
                }
            };
            Ok::<_, CalendarError>((assignment, open_shift))
        },
        |index, (assignment, open_shift): (Row, Row)| {
            let assignment = decode_assignment(&assignment)?;
            let open_shift = decode_open_shift(&open_shift)?;
            index.upsert_assignment(assignment.clone());
            index.upsert_open_shift(open_shift.clone());
            Ok(OpenShiftRequest {
                open_shift,
                assignment,
            })
        },
        move |index| {
            // Leave alone anything a notification replaced in the meantime.
            if index.assignment(assignment_id) == Some(&assignment) {
                index.remove_assignment(assignment_id);
            }
            if index.open_shift(open_shift_id) == Some(&requested) {
                index.upsert_open_shift(previous);
            }
        },
    )
    .await
    .map_err(|e| {
        log::error!("Failed to request open shift {}: {}", open_shift_id, e);
        e
    })?;

    log::info!("Employee {} requested open shift {}", employee_id, open_shift_id);
    Ok(request)
}

/// A scheduler gives an open shift to an employee: a confirmed schedule is
/// created, the employee's assignment is accepted and the open shift filled.
pub async fn assign_open_shift(
    ctx: &CalendarContext,
    actor: &Actor,
    open_shift_id: Uuid,
    employee_id: Uuid,
) -> Result<OpenShiftAssignResponse> {
    actor.requires_scheduler()?;

    let schedule_id = Uuid::new_v4();
    let (previous_shift, filled, previous_assignment, assignment, schedule) =
        ctx.store.apply(|index| -> Result<_> {
            let open_shift = open_shift_for_update(index, open_shift_id)?;

            let mut schedule = Schedule {
                id: schedule_id,
                employee_id,
                title: open_shift.title.clone(),
                start_time: open_shift.start_time.clone(),
                end_time: open_shift.end_time.clone(),
                location: open_shift.location.clone(),
                notes: None,
                status: ScheduleStatus::Confirmed,
                recurring: false,
                shift_type: None,
                template_id: None,
                sync_state: SyncState::Pending,
            };
            check_overlap(index, &schedule)?;

            // Reuse the employee's own request if there is one.
            let previous_assignment = index
                .assignments_for(open_shift_id)
                .into_iter()
                .find(|a| a.employee_id == employee_id)
                .cloned();
            let assignment = OpenShiftAssignment {
                id: previous_assignment.as_ref().map_or_else(Uuid::new_v4, |a| a.id),
                open_shift_id,
                employee_id,
                status: AssignmentStatus::Accepted,
                schedule_id: Some(schedule_id),
            };

            let mut filled = open_shift.clone();
            filled.status = OpenShiftStatus::Filled;
            index.upsert(schedule.clone());
            index.upsert_assignment(assignment.clone());
            index.upsert_open_shift(filled.clone());

            schedule.sync_state = SyncState::Synced;
            Ok((open_shift, filled, previous_assignment, assignment, schedule))
        })?;

    let backend = Arc::clone(&ctx.backend);
    let schedule_row = encode_schedule(&schedule);
    let assignment_change = assignment_row(&assignment);
    let restore_assignment = previous_assignment.as_ref().map(assignment_row);
    let assignment_id = assignment.id;

    let response = commit(
        &ctx.store,
        async move {
            let schedule = backend.insert(Table::Schedules, schedule_row).await?;
            let discard_schedule = || {
                undo(
                    format!("remove schedule {}", schedule_id),
                    backend.delete(Table::Schedules, schedule_id),
                )
            };

            let written = match &restore_assignment {
                Some(_) => {
                    backend
                        .update(Table::OpenShiftAssignments, assignment_id, assignment_change)
                        .await
                }
                None => backend.insert(Table::OpenShiftAssignments, assignment_change).await,
            };
            let assignment = match written {
                Ok(row) => row,
                Err(e) => {
                    discard_schedule().await;
                    return Err(e);
                }
            };

            let marked = backend
                .update(Table::OpenShifts, open_shift_id, status_patch(OpenShiftStatus::Filled))
                .await;
            let open_shift = match marked {
                Ok(row) => row,
                Err(e) => {
                    let what = format!("restore assignment {}", assignment_id);
                    match restore_assignment {
                        Some(row) => {
                            undo(what, backend.update(Table::OpenShiftAssignments, assignment_id, row)).await
                        }
                        None => undo(what, backend.delete(Table::OpenShiftAssignments, assignment_id)).await,
                    }
                    discard_schedule().await;
                    return Err(e);
                }
            };

            Ok::<_, CalendarError>((schedule, assignment, open_shift))
        },
        |index, (schedule, assignment, open_shift): (Row, Row, Row)| {
            let schedule = decode_schedule(&schedule)?;
            let assignment = decode_assignment(&assignment)?;
            let open_shift = decode_open_shift(&open_shift)?;
            index.upsert(schedule.clone());
            index.upsert_assignment(assignment.clone());
            index.upsert_open_shift(open_shift.clone());
            Ok(OpenShiftAssignResponse {
                open_shift,
                assignment,
                schedule,
            })
        },
        move |index| {
            if index.get(schedule_id).is_some_and(Schedule::is_pending_sync) {
                index.remove(schedule_id);
            }
            if index.assignment(assignment_id) == Some(&assignment) {
                match previous_assignment {
                    Some(previous) => {
                        index.upsert_assignment(previous);
                    }
                    None => {
                        index.remove_assignment(assignment_id);
                    }
                }
            }
            if index.open_shift(open_shift_id) == Some(&filled) {
                index.upsert_open_shift(previous_shift);
            }
        },
    )
    .await
    .map_err(|e| {
        log::error!("Failed to assign open shift {} to {}: {}", open_shift_id, employee_id, e);
        e
    })?;

    log::info!(
        "Open shift {} assigned to {} by {} (schedule {})",
        open_shift_id,
        employee_id,
        actor.id,
        response.schedule.id
    );
    Ok(response)
}
