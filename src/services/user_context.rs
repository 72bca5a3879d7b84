use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::backend::RowFilter;
use crate::database::models::Role;
use crate::error::{CalendarError, Result};

/// The current actor as reported by the identity provider. Only used to gate
/// which operations are permitted and which rows are subscribed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn employee(id: Uuid) -> Self {
        Self::new(id, Role::Employee)
    }

    pub fn manager(id: Uuid) -> Self {
        Self::new(id, Role::Manager)
    }

    /// Check if actor is admin
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Check if actor is manager
    pub fn is_manager(&self) -> bool {
        self.role == Role::Manager
    }

    pub fn is_hr(&self) -> bool {
        self.role == Role::Hr
    }

    pub fn is_employee(&self) -> bool {
        self.role == Role::Employee
    }

    /// Managers, admins and HR see and edit the whole roster.
    pub fn is_scheduler(&self) -> bool {
        self.is_manager() || self.is_admin() || self.is_hr()
    }

    /// Check if actor can access resource owned by another employee
    pub fn can_access_employee_resource(&self, owner_id: Uuid) -> bool {
        // Actors can always access their own resources
        if self.id == owner_id {
            return true;
        }

        self.is_scheduler()
    }

    pub fn requires_scheduler(&self) -> Result<()> {
        if self.is_scheduler() {
            Ok(())
        } else {
            Err(CalendarError::PermissionDenied(format!(
                "role '{}' cannot manage schedules",
                self.role
            )))
        }
    }

    pub fn requires_same_employee(&self, employee_id: Uuid) -> Result<()> {
        if self.can_access_employee_resource(employee_id) {
            Ok(())
        } else {
            Err(CalendarError::PermissionDenied(format!(
                "employee {} cannot act for employee {}",
                self.id, employee_id
            )))
        }
    }

    /// Row filter for the tables this actor subscribes to.
    pub fn visible_filter(&self) -> RowFilter {
        if self.is_scheduler() {
            RowFilter::All
        } else {
            RowFilter::Employees(vec![self.id])
        }
    }
}
