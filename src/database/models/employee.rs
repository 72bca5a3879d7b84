use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::availability::{DayOfWeek, WeeklyAvailability};
use super::macros::string_enum;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: Uuid,
    pub name: String,
    pub department: Option<String>,
    pub job_title: Option<String>,
    pub hourly_rate: Option<BigDecimal>,
    /// Default pattern applied to every weekday without its own binding.
    pub shift_pattern_id: Option<Uuid>,
    pub pattern_bindings: BTreeMap<DayOfWeek, Uuid>,
    pub availability: WeeklyAvailability,
}

impl Employee {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            department: None,
            job_title: None,
            hourly_rate: None,
            shift_pattern_id: None,
            pattern_bindings: BTreeMap::new(),
            availability: WeeklyAvailability::new(),
        }
    }

    pub fn binding_for(&self, day: DayOfWeek) -> Option<Uuid> {
        self.pattern_bindings.get(&day).copied()
    }
}

string_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Role {
        Employee => "employee",
        Manager => "manager",
        Admin => "admin",
        Hr => "hr",
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Employee
    }
}
