// libs/appointment-cell/src/services/store.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentAudit, AppointmentError, AppointmentStatus, NotFoundKind};

/// Name of the partial unique index guarding active slots.
pub const ACTIVE_SLOT_CONSTRAINT: &str = "appointments_active_slot_key";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("Appointment {0} not found")]
    NotFound(Uuid),

    #[error("Appointment {appointment_id} is {actual}, expected {expected}")]
    StaleStatus {
        appointment_id: Uuid,
        expected: AppointmentStatus,
        actual: AppointmentStatus,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store error: {0}")]
    Backend(String),
}

/// Fallback mapping for store failures that callers do not handle themselves.
/// Unique violations and stale reads are translated where they can be given
/// domain meaning; reaching this for them means a backend inconsistency.
impl From<StoreError> for AppointmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => AppointmentError::NotFound(NotFoundKind::Appointment(id)),
            StoreError::Unavailable(message) => AppointmentError::RemoteUnavailable {
                service: "appointment-store",
                message,
            },
            other => {
                error!("Unexpected store failure: {}", other);
                AppointmentError::Storage(other.to_string())
            }
        }
    }
}

/// Persistence of appointments and their audit trail.
///
/// Every mutating method writes the row and its audit records as one unit:
/// either all of them are visible afterwards or none is.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Advisory only. Can report a slot as free while a concurrent insert claims it.
    async fn slot_taken(
        &self,
        doctor_id: Uuid,
        appointment_time: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Insert a new appointment with its creation audit records.
    /// Fails with `UniqueViolation` if a non-cancelled row holds the slot.
    async fn insert(
        &self,
        appointment: &Appointment,
        audit: &[AppointmentAudit],
    ) -> Result<Appointment, StoreError>;

    /// Replace the row if its stored status still equals `expected`, appending `audit`.
    async fn transition(
        &self,
        updated: &Appointment,
        expected: AppointmentStatus,
        audit: &AppointmentAudit,
    ) -> Result<Appointment, StoreError>;

    async fn find(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError>;

    async fn list_by_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>, StoreError>;

    async fn list_by_doctor(&self, doctor_id: Uuid) -> Result<Vec<Appointment>, StoreError>;

    async fn list_all(&self) -> Result<Vec<Appointment>, StoreError>;

    /// Audit records for one appointment, oldest first.
    async fn audit_for(&self, appointment_id: Uuid) -> Result<Vec<AppointmentAudit>, StoreError>;
}

#[derive(Default)]
struct MemoryState {
    appointments: HashMap<Uuid, Appointment>,
    active_slots: HashMap<(Uuid, DateTime<Utc>), Uuid>,
    audit_log: Vec<AppointmentAudit>,
}

impl MemoryState {
    fn sorted<F>(&self, filter: F) -> Vec<Appointment>
    where
        F: Fn(&Appointment) -> bool,
    {
        let mut rows: Vec<Appointment> = self.appointments
            .values()
            .filter(|apt| filter(apt))
            .cloned()
            .collect();
        rows.sort_by_key(|apt| (apt.appointment_time, apt.created_at));
        rows
    }
}

/// Single-process store with the same slot guarantee as the database index.
/// Intended for tests and local development.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    state: Mutex<MemoryState>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn audit_len(&self) -> usize {
        self.state.lock().await.audit_log.len()
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn slot_taken(
        &self,
        doctor_id: Uuid,
        appointment_time: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let state = self.state.lock().await;
        Ok(state.active_slots.contains_key(&(doctor_id, appointment_time)))
    }

    async fn insert(
        &self,
        appointment: &Appointment,
        audit: &[AppointmentAudit],
    ) -> Result<Appointment, StoreError> {
        let mut state = self.state.lock().await;
        let slot = (appointment.doctor_id, appointment.appointment_time);

        if appointment.status != AppointmentStatus::Cancelled {
            if state.active_slots.contains_key(&slot) {
                return Err(StoreError::UniqueViolation {
                    constraint: ACTIVE_SLOT_CONSTRAINT.to_string(),
                });
            }
            state.active_slots.insert(slot, appointment.id);
        }

        state.appointments.insert(appointment.id, appointment.clone());
        state.audit_log.extend(audit.iter().cloned());

        debug!("Stored appointment {} with {} audit records", appointment.id, audit.len());
        Ok(appointment.clone())
    }

    async fn transition(
        &self,
        updated: &Appointment,
        expected: AppointmentStatus,
        audit: &AppointmentAudit,
    ) -> Result<Appointment, StoreError> {
        let mut state = self.state.lock().await;

        let actual = state.appointments
            .get(&updated.id)
            .map(|apt| apt.status)
            .ok_or(StoreError::NotFound(updated.id))?;

        if actual != expected {
            return Err(StoreError::StaleStatus {
                appointment_id: updated.id,
                expected,
                actual,
            });
        }

        if updated.status == AppointmentStatus::Cancelled {
            let slot = (updated.doctor_id, updated.appointment_time);
            if state.active_slots.get(&slot) == Some(&updated.id) {
                state.active_slots.remove(&slot);
            }
        }

        state.appointments.insert(updated.id, updated.clone());
        state.audit_log.push(audit.clone());

        Ok(updated.clone())
    }

    async fn find(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.state.lock().await.appointments.get(&appointment_id).cloned())
    }

    async fn list_by_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.state.lock().await.sorted(|apt| apt.patient_id == patient_id))
    }

    async fn list_by_doctor(&self, doctor_id: Uuid) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.state.lock().await.sorted(|apt| apt.doctor_id == doctor_id))
    }

    async fn list_all(&self) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.state.lock().await.sorted(|_| true))
    }

    async fn audit_for(&self, appointment_id: Uuid) -> Result<Vec<AppointmentAudit>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.audit_log
            .iter()
            .filter(|entry| entry.appointment_id == appointment_id)
            .cloned()
            .collect())
    }
}
