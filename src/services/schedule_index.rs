//! Local mirror of the backend tables, bucketed for calendar queries.
//!
//! [`ScheduleIndex`] is a plain value; [`IndexStore`] wraps it behind a
//! copy-on-write `Arc` so readers take cheap snapshots while every mutation,
//! whether from a change notification, a full refetch or a local write, goes
//! through [`IndexStore::apply`].

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use uuid::Uuid;

use crate::database::models::{
    Employee, OpenShift, OpenShiftAssignment, PatternCatalog, Schedule, SchedulePatch, ShiftPattern,
};
use crate::error::{CalendarError, Result};

fn bucket_insert(buckets: &mut BTreeMap<NaiveDate, BTreeSet<Uuid>>, date: NaiveDate, id: Uuid) {
    buckets.entry(date).or_default().insert(id);
}

fn bucket_remove(buckets: &mut BTreeMap<NaiveDate, BTreeSet<Uuid>>, date: NaiveDate, id: Uuid) {
    if let Some(ids) = buckets.get_mut(&date) {
        ids.remove(&id);
        if ids.is_empty() {
            buckets.remove(&date);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleIndex {
    schedules: HashMap<Uuid, Schedule>,
    by_day: BTreeMap<NaiveDate, BTreeSet<Uuid>>,
    by_employee: HashMap<Uuid, BTreeSet<Uuid>>,
    open_shifts: HashMap<Uuid, OpenShift>,
    open_by_day: BTreeMap<NaiveDate, BTreeSet<Uuid>>,
    employees: HashMap<Uuid, Employee>,
    assignments: HashMap<Uuid, OpenShiftAssignment>,
    patterns: PatternCatalog,
    /// Schedules removed locally whose backend delete is still in flight.
    pending_deletes: HashSet<Uuid>,
    generation: u64,
}

impl ScheduleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumped by every mutation that changes the contents.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn touch(&mut self) {
        self.generation += 1;
    }

    pub fn len(&self) -> usize {
        self.schedules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedules.is_empty()
    }

    // Schedules

    pub fn get(&self, id: Uuid) -> Option<&Schedule> {
        self.schedules.get(&id)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.schedules.contains_key(&id)
    }

    /// Adds or replaces a schedule, moving it between buckets if its day or
    /// employee changed. Returns the previous version.
    pub fn upsert(&mut self, schedule: Schedule) -> Option<Schedule> {
        let previous = self.detach(schedule.id);
        bucket_insert(&mut self.by_day, schedule.date(), schedule.id);
        self.by_employee
            .entry(schedule.employee_id)
            .or_default()
            .insert(schedule.id);
        self.schedules.insert(schedule.id, schedule);
        self.touch();
        previous
    }

    pub fn insert(&mut self, schedule: Schedule) -> Option<Schedule> {
        self.upsert(schedule)
    }

    /// Applies a patch to an existing schedule. Fails with `StaleWrite` when
    /// the schedule has disappeared in the meantime.
    pub fn update(&mut self, id: Uuid, patch: &SchedulePatch) -> Result<Schedule> {
        let mut schedule = self
            .schedules
            .get(&id)
            .cloned()
            .ok_or(CalendarError::StaleWrite(id))?;
        patch.apply(&mut schedule);
        if schedule.end_time <= schedule.start_time {
            return Err(CalendarError::invalid_time_range(format!(
                "end_time ({}) must be after start_time ({})",
                schedule.end_time, schedule.start_time
            )));
        }
        self.upsert(schedule.clone());
        Ok(schedule)
    }

    fn detach(&mut self, id: Uuid) -> Option<Schedule> {
        let schedule = self.schedules.remove(&id)?;
        bucket_remove(&mut self.by_day, schedule.date(), id);
        if let Some(ids) = self.by_employee.get_mut(&schedule.employee_id) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_employee.remove(&schedule.employee_id);
            }
        }
        Some(schedule)
    }

    /// Removes a schedule. Also settles a local delete of the same id that
    /// is still in flight: the row is gone either way.
    pub fn remove(&mut self, id: Uuid) -> Option<Schedule> {
        let cleared = self.pending_deletes.remove(&id);
        let removed = self.detach(id);
        if cleared || removed.is_some() {
            self.touch();
        }
        removed
    }

    /// Removes a schedule ahead of its backend delete and remembers that the
    /// delete is in flight.
    pub fn begin_delete(&mut self, id: Uuid) -> Option<Schedule> {
        let removed = self.detach(id)?;
        self.pending_deletes.insert(id);
        self.touch();
        Some(removed)
    }

    /// The backend delete succeeded; a copy reinstated meanwhile goes too.
    pub fn finish_delete(&mut self, id: Uuid) {
        self.remove(id);
    }

    /// The backend delete failed. `previous` comes back only while the
    /// delete is still pending and nothing else has put or removed the row.
    pub fn cancel_delete(&mut self, id: Uuid, previous: Schedule) -> bool {
        if !self.pending_deletes.remove(&id) {
            return false;
        }
        if self.contains(id) {
            return false;
        }
        self.upsert(previous);
        true
    }

    pub fn is_delete_pending(&self, id: Uuid) -> bool {
        self.pending_deletes.contains(&id)
    }

    fn sorted<'a>(&'a self, ids: impl Iterator<Item = &'a Uuid>) -> Vec<&'a Schedule> {
        let mut schedules: Vec<&Schedule> = ids.filter_map(|id| self.schedules.get(id)).collect();
        schedules.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        schedules
    }

    /// Schedules starting on `date`, ordered by start time.
    pub fn by_day(&self, date: NaiveDate) -> Vec<&Schedule> {
        match self.by_day.get(&date) {
            Some(ids) => self.sorted(ids.iter()),
            None => Vec::new(),
        }
    }

    /// Owned copy of a day bucket, for layout and rendering.
    pub fn day_schedules(&self, date: NaiveDate) -> Vec<Schedule> {
        self.by_day(date).into_iter().cloned().collect()
    }

    /// Schedules starting within `start..=end`.
    pub fn by_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<&Schedule> {
        if end < start {
            return Vec::new();
        }
        self.sorted(self.by_day.range(start..=end).flat_map(|(_, ids)| ids.iter()))
    }

    pub fn by_employee(&self, employee_id: Uuid, range: Option<(NaiveDate, NaiveDate)>) -> Vec<&Schedule> {
        let Some(ids) = self.by_employee.get(&employee_id) else {
            return Vec::new();
        };
        let mut schedules = self.sorted(ids.iter());
        if let Some((start, end)) = range {
            schedules.retain(|s| start <= s.date() && s.date() <= end);
        }
        schedules
    }

    pub fn schedules(&self) -> impl Iterator<Item = &Schedule> {
        self.schedules.values()
    }

    /// Replaces every schedule with `fresh`, keeping local rows still
    /// awaiting write confirmation that `fresh` does not know about yet.
    /// Rows with a local delete in flight stay hidden; a pending delete whose
    /// row is missing from `fresh` has been settled remotely.
    pub fn replace_schedules(&mut self, fresh: Vec<Schedule>) {
        let fresh_ids: HashSet<Uuid> = fresh.iter().map(|s| s.id).collect();
        let pending: Vec<Schedule> = self
            .schedules
            .values()
            .filter(|s| s.is_pending_sync() && !fresh_ids.contains(&s.id))
            .cloned()
            .collect();
        self.pending_deletes.retain(|id| fresh_ids.contains(id));

        self.schedules.clear();
        self.by_day.clear();
        self.by_employee.clear();
        let fresh = fresh
            .into_iter()
            .filter(|s| !self.pending_deletes.contains(&s.id))
            .collect::<Vec<_>>();
        for schedule in fresh.into_iter().chain(pending) {
            self.upsert(schedule);
        }
        self.touch();
    }

    // Open shifts

    pub fn open_shift(&self, id: Uuid) -> Option<&OpenShift> {
        self.open_shifts.get(&id)
    }

    pub fn upsert_open_shift(&mut self, open_shift: OpenShift) -> Option<OpenShift> {
        let previous = self.remove_open_shift(open_shift.id);
        bucket_insert(&mut self.open_by_day, open_shift.date(), open_shift.id);
        self.open_shifts.insert(open_shift.id, open_shift);
        self.touch();
        previous
    }

    pub fn remove_open_shift(&mut self, id: Uuid) -> Option<OpenShift> {
        let open_shift = self.open_shifts.remove(&id)?;
        bucket_remove(&mut self.open_by_day, open_shift.date(), id);
        self.touch();
        Some(open_shift)
    }

    pub fn open_shifts_in_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<&OpenShift> {
        if end < start {
            return Vec::new();
        }
        let mut shifts: Vec<&OpenShift> = self
            .open_by_day
            .range(start..=end)
            .flat_map(|(_, ids)| ids.iter())
            .filter_map(|id| self.open_shifts.get(id))
            .collect();
        shifts.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        shifts
    }

    pub fn replace_open_shifts(&mut self, fresh: Vec<OpenShift>) {
        self.open_shifts.clear();
        self.open_by_day.clear();
        for open_shift in fresh {
            self.upsert_open_shift(open_shift);
        }
        self.touch();
    }

    // Assignments

    pub fn assignment(&self, id: Uuid) -> Option<&OpenShiftAssignment> {
        self.assignments.get(&id)
    }

    pub fn assignments_for(&self, open_shift_id: Uuid) -> Vec<&OpenShiftAssignment> {
        let mut assignments: Vec<&OpenShiftAssignment> = self
            .assignments
            .values()
            .filter(|a| a.open_shift_id == open_shift_id)
            .collect();
        assignments.sort_by_key(|a| a.id);
        assignments
    }

    pub fn upsert_assignment(&mut self, assignment: OpenShiftAssignment) -> Option<OpenShiftAssignment> {
        self.touch();
        self.assignments.insert(assignment.id, assignment)
    }

    pub fn remove_assignment(&mut self, id: Uuid) -> Option<OpenShiftAssignment> {
        let removed = self.assignments.remove(&id);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    pub fn replace_assignments(&mut self, fresh: Vec<OpenShiftAssignment>) {
        self.assignments = fresh.into_iter().map(|a| (a.id, a)).collect();
        self.touch();
    }

    // Employees and patterns

    pub fn employee(&self, id: Uuid) -> Option<&Employee> {
        self.employees.get(&id)
    }

    pub fn employees(&self) -> Vec<&Employee> {
        let mut employees: Vec<&Employee> = self.employees.values().collect();
        employees.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        employees
    }

    pub fn upsert_employee(&mut self, employee: Employee) -> Option<Employee> {
        self.touch();
        self.employees.insert(employee.id, employee)
    }

    pub fn remove_employee(&mut self, id: Uuid) -> Option<Employee> {
        let removed = self.employees.remove(&id);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    pub fn replace_employees(&mut self, fresh: Vec<Employee>) {
        self.employees = fresh.into_iter().map(|e| (e.id, e)).collect();
        self.touch();
    }

    pub fn patterns(&self) -> &PatternCatalog {
        &self.patterns
    }

    pub fn set_patterns(&mut self, patterns: impl IntoIterator<Item = ShiftPattern>) {
        self.patterns = patterns.into_iter().collect();
        self.touch();
    }

    /// Bucket invariants: every schedule sits in exactly the day and employee
    /// bucket matching its own fields, and no bucket is empty.
    #[cfg(test)]
    fn check_invariants(&self) {
        let day_total: usize = self.by_day.values().map(BTreeSet::len).sum();
        assert_eq!(day_total, self.schedules.len());
        for (date, ids) in &self.by_day {
            assert!(!ids.is_empty());
            for id in ids {
                assert_eq!(self.schedules[id].date(), *date);
            }
        }
        for (employee_id, ids) in &self.by_employee {
            assert!(!ids.is_empty());
            for id in ids {
                assert_eq!(self.schedules[id].employee_id, *employee_id);
            }
        }
    }
}

/// Shared, copy-on-write handle to the index.
#[derive(Clone)]
pub struct IndexStore {
    current: Arc<Mutex<Arc<ScheduleIndex>>>,
    changes: watch::Sender<u64>,
}

impl Default for IndexStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexStore {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            current: Arc::new(Mutex::new(Arc::new(ScheduleIndex::new()))),
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Arc<ScheduleIndex>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Immutable view of the index at this instant. Later mutations never
    /// show through an existing snapshot.
    pub fn snapshot(&self) -> Arc<ScheduleIndex> {
        Arc::clone(&self.lock())
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Runs `mutate` against the index and publishes the new generation if
    /// anything changed. The only way to change the shared index.
    ///
    /// A closure that fails must do so before mutating; validation errors
    /// then leave the generation, and every cached layout, untouched.
    pub fn apply<R>(&self, mutate: impl FnOnce(&mut ScheduleIndex) -> R) -> R {
        let (result, changed) = {
            let mut guard = self.lock();
            let before = guard.generation;
            let index = Arc::make_mut(&mut guard);
            let result = mutate(index);
            let after = index.generation;
            (result, (after != before).then_some(after))
        };
        if let Some(generation) = changed {
            self.changes.send_replace(generation);
        }
        result
    }

    /// Receives the generation number after each mutation.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}
