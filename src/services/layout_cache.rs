//! Memoizes day layouts per index generation.
//!
//! Keys carry the generation of the snapshot they were computed from, so a
//! mutation of the index makes every older entry unreachable without an
//! explicit invalidation pass; the TTL then evicts them.

use chrono::NaiveDate;
use moka::sync::Cache;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::Config;
use crate::database::models::{DayLayout, TimeAxis};
use crate::error::Result;
use crate::services::schedule_index::ScheduleIndex;
use crate::services::timeline;

type LayoutKey = (NaiveDate, (u32, u32), u64);

#[derive(Clone)]
pub struct LayoutCache {
    cache: Cache<LayoutKey, Arc<DayLayout>>,
    misses: Arc<AtomicU64>,
}

impl LayoutCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self {
            cache,
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.layout_cache_capacity, config.layout_cache_ttl())
    }

    /// Layout of `date` in `index`, computed at most once per generation.
    pub fn layout(&self, index: &ScheduleIndex, date: NaiveDate, axis: TimeAxis) -> Result<Arc<DayLayout>> {
        axis.validate()?;
        let key = (date, axis.cache_key(), index.generation());
        self.cache
            .try_get_with(key, || {
                self.misses.fetch_add(1, Ordering::Relaxed);
                timeline::layout(date, &index.day_schedules(date), axis).map(Arc::new)
            })
            .map_err(|e| (*e).clone())
    }

    /// Number of layouts computed rather than served from the cache.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::schedule_index::IndexStore;
    use crate::database::models::{Schedule, ScheduleInput, SchedulePatch, ScheduleStatus, Timestamp};
    use uuid::Uuid;

    fn schedule() -> Schedule {
        ScheduleInput {
            employee_id: Uuid::new_v4(),
            title: "Shift".to_string(),
            start_time: Timestamp::parse("2025-06-02T09:00:00Z").unwrap(),
            end_time: Timestamp::parse("2025-06-02T17:00:00Z").unwrap(),
            location: None,
            notes: None,
            status: ScheduleStatus::Confirmed,
            recurring: false,
            shift_type: None,
            template_id: None,
        }
        .into_schedule(Uuid::new_v4())
    }

    #[test]
    fn test_hits_until_generation_changes() {
        let cache = LayoutCache::new(16, Duration::from_secs(60));
        let store = IndexStore::new();
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        store.apply(|index| index.upsert(schedule()));

        let snapshot = store.snapshot();
        let first = cache.layout(&snapshot, date, TimeAxis::default()).unwrap();
        let second = cache.layout(&snapshot, date, TimeAxis::default()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.misses(), 1);

        store.apply(|index| index.upsert(schedule()));
        let third = cache.layout(&store.snapshot(), date, TimeAxis::default()).unwrap();
        assert_eq!(third.blocks.len(), 2);
        assert_eq!(cache.misses(), 2);
    }

    #[test]
    fn test_rejected_write_keeps_cached_layout() {
        let cache = LayoutCache::new(16, Duration::from_secs(60));
        let store = IndexStore::new();
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        store.apply(|index| index.upsert(schedule()));
        let first = cache.layout(&store.snapshot(), date, TimeAxis::default()).unwrap();

        let missing = Uuid::new_v4();
        let rejected = store.apply(|index| index.update(missing, &SchedulePatch::default()));
        assert!(rejected.is_err());

        let second = cache.layout(&store.snapshot(), date, TimeAxis::default()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_owned_index_changes_miss() {
        let cache = LayoutCache::new(16, Duration::from_secs(60));
        let mut index = ScheduleIndex::new();
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        assert!(cache.layout(&index, date, TimeAxis::default()).unwrap().blocks.is_empty());

        index.upsert(schedule());
        let layout = cache.layout(&index, date, TimeAxis::default()).unwrap();
        assert_eq!(layout.blocks.len(), 1);
        assert_eq!(cache.misses(), 2);
    }

    #[test]
    fn test_invalid_axis_not_cached() {
        let cache = LayoutCache::new(16, Duration::from_secs(60));
        let index = ScheduleIndex::new();
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let axis = TimeAxis {
            start_hour: 10.0,
            end_hour: 10.0,
        };
        assert!(cache.layout(&index, date, axis).is_err());
        assert_eq!(cache.misses(), 0);
    }
}
