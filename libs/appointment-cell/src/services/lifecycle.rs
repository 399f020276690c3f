// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use shared_models::auth::{Requester, RequesterRole};

use crate::models::{Appointment, AppointmentError, AppointmentStatus, PolicyViolation};

/// Status transitions, who may perform them, and when.
///
/// Pure logic: reads the current row and a timestamp, never touches the store.
#[derive(Debug, Clone)]
pub struct LifecycleStateMachine {
    cutoff_hours: i64,
}

impl LifecycleStateMachine {
    /// Negative cutoffs are clamped to zero.
    pub fn new(cutoff_hours: i64) -> Self {
        Self { cutoff_hours: cutoff_hours.max(0) }
    }

    pub fn cutoff_hours(&self) -> i64 {
        self.cutoff_hours
    }

    pub fn initial_status(&self, auto_accept: bool) -> AppointmentStatus {
        if auto_accept {
            AppointmentStatus::Confirmed
        } else {
            AppointmentStatus::Pending
        }
    }

    /// Get all valid next statuses for a given current status
    pub fn valid_targets(&self, current: AppointmentStatus) -> &'static [AppointmentStatus] {
        match current {
            AppointmentStatus::Pending => &[AppointmentStatus::Confirmed, AppointmentStatus::Cancelled],
            AppointmentStatus::Confirmed => &[AppointmentStatus::Cancelled, AppointmentStatus::Completed],
            // Terminal states - no transitions allowed
            AppointmentStatus::Cancelled | AppointmentStatus::Completed => &[],
        }
    }

    pub fn validate_transition(
        &self,
        appointment: &Appointment,
        target: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        if !self.valid_targets(appointment.status).contains(&target) {
            warn!(appointment_id = %appointment.id,
                  "Invalid status transition attempted: {} -> {}", appointment.status, target);
            return Err(AppointmentError::InvalidState {
                appointment_id: appointment.id,
                current: appointment.status,
                target,
            });
        }
        Ok(())
    }

    /// Ownership and role rules. Assumes the transition itself is legal.
    pub fn authorize(
        &self,
        appointment: &Appointment,
        target: AppointmentStatus,
        requester: &Requester,
    ) -> Result<(), AppointmentError> {
        let allowed = match requester.role {
            RequesterRole::Admin | RequesterRole::System => true,
            RequesterRole::Doctor => appointment.is_owned_by_doctor(requester),
            RequesterRole::Patient => {
                target == AppointmentStatus::Cancelled && appointment.is_owned_by_patient(requester)
            }
        };

        if !allowed {
            warn!(appointment_id = %appointment.id,
                  requester = %requester.audit_tag(),
                  "Requester not allowed to move appointment to {}", target);
            return Err(AppointmentError::Unauthorized {
                appointment_id: appointment.id,
                requester: requester.audit_tag(),
            });
        }
        Ok(())
    }

    /// Patients and doctors may not cancel once `now` reaches
    /// `appointment_time - cutoff_hours`. A cutoff reaching past the
    /// representable time range means the window is already closed.
    pub fn check_cancellation_window(
        &self,
        appointment: &Appointment,
        requester: &Requester,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if requester.role.is_privileged() {
            return Ok(());
        }

        let cutoff = TimeDelta::try_hours(self.cutoff_hours)
            .and_then(|window| appointment.appointment_time.checked_sub_signed(window));
        let closed = match cutoff {
            Some(cutoff) => now >= cutoff,
            None => true,
        };
        if closed {
            warn!(appointment_id = %appointment.id,
                  "Cancellation at {} is past cutoff {:?}", now, cutoff);
            return Err(AppointmentError::PolicyViolation(PolicyViolation::CutoffWindow {
                appointment_id: appointment.id,
                appointment_time: appointment.appointment_time,
                cutoff_hours: self.cutoff_hours,
            }));
        }
        Ok(())
    }

    /// Runs every rule in order: legality, authorization, then timing.
    pub fn check(
        &self,
        appointment: &Appointment,
        target: AppointmentStatus,
        requester: &Requester,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        debug!("Checking transition {} -> {} for {}", appointment.status, target, requester.audit_tag());

        self.validate_transition(appointment, target)?;
        self.authorize(appointment, target, requester)?;
        if target == AppointmentStatus::Cancelled {
            self.check_cancellation_window(appointment, requester, now)?;
        }
        Ok(())
    }

    /// Produces the row to be written. Callers must have run `check` first.
    pub fn apply(
        &self,
        appointment: &Appointment,
        target: AppointmentStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Appointment {
        let mut updated = appointment.clone();
        updated.status = target;
        updated.cancelled_reason = if target == AppointmentStatus::Cancelled {
            reason
        } else {
            None
        };
        updated.updated_at = now;
        updated
    }
}
