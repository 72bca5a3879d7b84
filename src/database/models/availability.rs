use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use super::macros::string_enum;

pub const DEFAULT_START_TIME: &str = "09:00";
pub const DEFAULT_END_TIME: &str = "17:00";

pub fn default_start() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN)
}

pub fn default_end() -> NaiveTime {
    NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN)
}

string_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub enum DayOfWeek {
        Monday => "monday",
        Tuesday => "tuesday",
        Wednesday => "wednesday",
        Thursday => "thursday",
        Friday => "friday",
        Saturday => "saturday",
        Sunday => "sunday",
    }
}

impl DayOfWeek {
    pub fn from_weekday(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }

    pub fn weekday(&self) -> Weekday {
        match self {
            DayOfWeek::Monday => Weekday::Mon,
            DayOfWeek::Tuesday => Weekday::Tue,
            DayOfWeek::Wednesday => Weekday::Wed,
            DayOfWeek::Thursday => Weekday::Thu,
            DayOfWeek::Friday => Weekday::Fri,
            DayOfWeek::Saturday => Weekday::Sat,
            DayOfWeek::Sunday => Weekday::Sun,
        }
    }
}

/// A reusable shift shape such as "Morning: 09:00-17:00". Times stay as the
/// raw `HH:MM` text so malformed values can be reported instead of guessed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShiftPattern {
    pub id: Uuid,
    pub name: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Default)]
pub struct PatternCatalog {
    patterns: HashMap<Uuid, ShiftPattern>,
}

impl PatternCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pattern: ShiftPattern) {
        self.patterns.insert(pattern.id, pattern);
    }

    pub fn get(&self, id: &Uuid) -> Option<&ShiftPattern> {
        self.patterns.get(id)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl FromIterator<ShiftPattern> for PatternCatalog {
    fn from_iter<I: IntoIterator<Item = ShiftPattern>>(iter: I) -> Self {
        let mut catalog = PatternCatalog::new();
        for pattern in iter {
            catalog.insert(pattern);
        }
        catalog
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DayAvailability {
    pub available: bool,
    pub start_time: String,
    pub end_time: String,
}

impl DayAvailability {
    pub fn available(start_time: &str, end_time: &str) -> Self {
        Self {
            available: true,
            start_time: start_time.to_string(),
            end_time: end_time.to_string(),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            start_time: DEFAULT_START_TIME.to_string(),
            end_time: DEFAULT_END_TIME.to_string(),
        }
    }
}

impl Default for DayAvailability {
    fn default() -> Self {
        Self::unavailable()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct WeeklyAvailability {
    days: BTreeMap<DayOfWeek, DayAvailability>,
}

impl WeeklyAvailability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, day: DayOfWeek) -> Option<&DayAvailability> {
        self.days.get(&day)
    }

    /// Editing a day to unavailable resets its times to the default window.
    pub fn set(&mut self, day: DayOfWeek, availability: DayAvailability) {
        let entry = if availability.available {
            availability
        } else {
            DayAvailability::unavailable()
        };
        self.days.insert(day, entry);
    }

    /// Stores the entry exactly as received, used when ingesting backend rows
    /// whose unavailable days may still carry stale times.
    pub fn set_raw(&mut self, day: DayOfWeek, availability: DayAvailability) {
        self.days.insert(day, availability);
    }

    pub fn with(mut self, day: DayOfWeek, availability: DayAvailability) -> Self {
        self.set(day, availability);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DayOfWeek, &DayAvailability)> {
        self.days.iter()
    }
}

string_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum AvailabilitySource {
        Override => "override",
        Pattern => "pattern",
        Availability => "availability",
        Default => "default",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ValidationWarning {
    #[serde(rename_all = "camelCase")]
    MalformedTime { field: String, value: String },
    #[serde(rename_all = "camelCase")]
    MissingPattern { pattern_id: Uuid },
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationWarning::MalformedTime { field, value } => {
                write!(f, "malformed time '{}' in {}", value, field)
            }
            ValidationWarning::MissingPattern { pattern_id } => {
                write!(f, "shift pattern {} not found", pattern_id)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAvailability {
    pub day: DayOfWeek,
    pub available: bool,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub source: AvailabilitySource,
    pub warnings: Vec<ValidationWarning>,
}

impl ResolvedAvailability {
    pub fn hours(&self) -> f64 {
        if !self.available {
            return 0.0;
        }
        (self.end - self.start).num_minutes() as f64 / 60.0
    }
}
