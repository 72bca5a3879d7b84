//! Effective working window of an employee on a weekday.
//!
//! Layers, first match wins: per-weekday pattern binding, the employee's
//! default pattern, the weekly availability entry, then the hard default
//! `09:00-17:00` marked unavailable.

use chrono::{Datelike, NaiveDate, NaiveTime};
use regex::Regex;
use std::sync::LazyLock;

use crate::database::models::{
    AvailabilitySource, DayOfWeek, Employee, PatternCatalog, ResolvedAvailability, Schedule,
    ShiftPattern, ValidationWarning, default_end, default_start,
};
use crate::error::{CalendarError, Result};

static HHMM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([01]\d|2[0-3]):([0-5]\d)$").expect("HH:MM pattern is a valid regex")
});

/// Parses a strict 24-hour `HH:MM` string.
pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    let captures = HHMM.captures(value.trim())?;
    let hour = captures.get(1)?.as_str().parse().ok()?;
    let minute = captures.get(2)?.as_str().parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn fallback(day: DayOfWeek, warnings: Vec<ValidationWarning>) -> ResolvedAvailability {
    ResolvedAvailability {
        day,
        available: false,
        start: default_start(),
        end: default_end(),
        source: AvailabilitySource::Default,
        warnings,
    }
}

fn window(
    day: DayOfWeek,
    source: AvailabilitySource,
    field: &str,
    start_raw: &str,
    end_raw: &str,
    mut warnings: Vec<ValidationWarning>,
) -> Result<ResolvedAvailability> {
    let start = parse_hhmm(start_raw);
    let end = parse_hhmm(end_raw);

    let (start, end) = match (start, end) {
        (Some(start), Some(end)) => (start, end),
        _ => {
            if start.is_none() {
                warnings.push(ValidationWarning::MalformedTime {
                    field: format!("{}.start_time", field),
                    value: start_raw.to_string(),
                });
            }
            if end.is_none() {
                warnings.push(ValidationWarning::MalformedTime {
                    field: format!("{}.end_time", field),
                    value: end_raw.to_string(),
                });
            }
            log::warn!(
                "Malformed time in {} for {}: '{}'-'{}', using default window",
                field,
                day,
                start_raw,
                end_raw
            );
            return Ok(fallback(day, warnings));
        }
    };

    if end <= start {
        return Err(CalendarError::invalid_time_range(format!(
            "{} on {}: end {} must be after start {}",
            field,
            day,
            end.format("%H:%M"),
            start.format("%H:%M")
        )));
    }

    Ok(ResolvedAvailability {
        day,
        available: true,
        start,
        end,
        source,
        warnings,
    })
}

fn pattern_window(
    day: DayOfWeek,
    source: AvailabilitySource,
    pattern: &ShiftPattern,
    warnings: Vec<ValidationWarning>,
) -> Result<ResolvedAvailability> {
    let field = format!("shift_pattern[{}]", pattern.name);
    window(day, source, &field, &pattern.start_time, &pattern.end_time, warnings)
}

pub fn resolve(
    employee: &Employee,
    day: DayOfWeek,
    catalog: &PatternCatalog,
) -> Result<ResolvedAvailability> {
    let mut warnings = Vec::new();

    if let Some(pattern_id) = employee.binding_for(day) {
        match catalog.get(&pattern_id) {
            Some(pattern) => {
                return pattern_window(day, AvailabilitySource::Override, pattern, warnings);
            }
            None => warnings.push(ValidationWarning::MissingPattern { pattern_id }),
        }
    }

    if let Some(pattern_id) = employee.shift_pattern_id {
        match catalog.get(&pattern_id) {
            Some(pattern) => {
                return pattern_window(day, AvailabilitySource::Pattern, pattern, warnings);
            }
            None => warnings.push(ValidationWarning::MissingPattern { pattern_id }),
        }
    }

    if let Some(entry) = employee.availability.get(day) {
        if !entry.available {
            // Stored times on an unavailable day carry no meaning.
            return Ok(ResolvedAvailability {
                source: AvailabilitySource::Availability,
                ..fallback(day, warnings)
            });
        }
        let field = format!("availability.{}", day);
        return window(
            day,
            AvailabilitySource::Availability,
            &field,
            &entry.start_time,
            &entry.end_time,
            warnings,
        );
    }

    Ok(fallback(day, warnings))
}

pub fn resolve_for_date(
    employee: &Employee,
    date: NaiveDate,
    catalog: &PatternCatalog,
) -> Result<ResolvedAvailability> {
    resolve(employee, DayOfWeek::from_weekday(date.weekday()), catalog)
}

/// Monday through Sunday.
pub fn resolve_week(employee: &Employee, catalog: &PatternCatalog) -> Result<Vec<ResolvedAvailability>> {
    DayOfWeek::ALL
        .iter()
        .map(|day| resolve(employee, *day, catalog))
        .collect()
}

/// Whether `schedule` sits entirely inside the resolved window of its day.
pub fn covers(resolved: &ResolvedAvailability, schedule: &Schedule) -> bool {
    if !resolved.available {
        return false;
    }
    let start = schedule.start_time.datetime();
    let end = schedule.end_time.datetime();
    if start.date_naive() != end.date_naive() {
        return false;
    }
    resolved.start <= start.time() && end.time() <= resolved.end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::DayAvailability;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(parse_hhmm("00:00"), NaiveTime::from_hms_opt(0, 0, 0));
        assert_eq!(parse_hhmm("23:59"), NaiveTime::from_hms_opt(23, 59, 0));
        assert_eq!(parse_hhmm(" 07:05 "), NaiveTime::from_hms_opt(7, 5, 0));
        for bad in ["24:00", "9:00", "12:60", "12:00:00", "noon", ""] {
            assert_eq!(parse_hhmm(bad), None, "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_no_data_resolves_to_default() {
        let employee = Employee::new(Uuid::new_v4(), "Ada");
        let resolved = resolve(&employee, DayOfWeek::Monday, &PatternCatalog::new()).unwrap();
        assert_eq!(resolved.source, AvailabilitySource::Default);
        assert!(!resolved.available);
        assert_eq!(resolved.start, default_start());
        assert_eq!(resolved.end, default_end());
        assert_eq!(resolved.hours(), 0.0);
    }

    #[test]
    fn test_pattern_end_before_start_fails() {
        let pattern = ShiftPattern {
            id: Uuid::new_v4(),
            name: "Broken".to_string(),
            start_time: "18:00".to_string(),
            end_time: "08:00".to_string(),
        };
        let mut employee = Employee::new(Uuid::new_v4(), "Ada");
        employee.shift_pattern_id = Some(pattern.id);
        let catalog: PatternCatalog = [pattern].into_iter().collect();

        let err = resolve(&employee, DayOfWeek::Monday, &catalog).unwrap_err();
        assert!(matches!(err, CalendarError::InvalidTimeRange(_)));
    }

    #[test]
    fn test_covers() {
        let mut employee = Employee::new(Uuid::new_v4(), "Ada");
        employee
            .availability
            .set(DayOfWeek::Monday, DayAvailability::available("08:00", "16:00"));
        let resolved = resolve(&employee, DayOfWeek::Monday, &PatternCatalog::new()).unwrap();

        let inside: Schedule = serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "employeeId": employee.id,
            "title": "Shift",
            "startTime": "2025-06-02T09:00:00+00:00",
            "endTime": "2025-06-02T15:00:00+00:00",
            "location": null,
            "notes": null,
            "status": "confirmed",
            "recurring": false,
            "shiftType": null,
            "templateId": null
        }))
        .unwrap();
        assert!(covers(&resolved, &inside));

        let mut late = inside.clone();
        late.end_time = "2025-06-02T17:00:00+00:00".parse().unwrap();
        assert!(!covers(&resolved, &late));
    }
}
