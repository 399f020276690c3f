// libs/appointment-cell/src/services/conflict.rs
use std::sync::Arc;

use tracing::{debug, warn};

use crate::models::{Appointment, AppointmentAudit, AppointmentError, ConflictReason};
use crate::services::store::{AppointmentStore, StoreError};

/// Claims a (doctor, time) slot through the store's unique constraint.
///
/// The pre-check is advisory and only saves a round trip for the common case.
/// The insert is authoritative: when two callers race past the pre-check, the
/// store rejects the second write and it is reported as `SlotTaken`.
pub struct ConflictResolver {
    store: Arc<dyn AppointmentStore>,
}

impl ConflictResolver {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    pub async fn claim(
        &self,
        appointment: &Appointment,
        audit: &[AppointmentAudit],
    ) -> Result<Appointment, AppointmentError> {
        let slot_taken = || {
            AppointmentError::Conflict(ConflictReason::SlotTaken {
                doctor_id: appointment.doctor_id,
                appointment_time: appointment.appointment_time,
            })
        };

        debug!("Claiming slot for doctor {} at {}", appointment.doctor_id, appointment.appointment_time);

        if self.store
            .slot_taken(appointment.doctor_id, appointment.appointment_time)
            .await?
        {
            warn!(doctor_id = %appointment.doctor_id,
                  appointment_time = %appointment.appointment_time,
                  "Slot already booked");
            return Err(slot_taken());
        }

        match self.store.insert(appointment, audit).await {
            Ok(stored) => Ok(stored),
            Err(StoreError::UniqueViolation { constraint }) => {
                warn!(doctor_id = %appointment.doctor_id,
                      appointment_time = %appointment.appointment_time,
                      constraint = %constraint,
                      "Lost slot race at write time");
                Err(slot_taken())
            }
            Err(e) => Err(e.into()),
        }
    }
}
