// libs/appointment-cell/src/services/audit.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use shared_models::auth::Requester;

use crate::models::{Appointment, AppointmentAudit, AppointmentError, AppointmentStatus, AuditAction};
use crate::services::store::AppointmentStore;

/// Builds audit records and reads them back.
///
/// Records are never written on their own: they travel with the row mutation
/// in the same store call, so a mutation and its history commit together.
pub struct AuditTrail {
    store: Arc<dyn AppointmentStore>,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    fn record(
        appointment: &Appointment,
        action: AuditAction,
        performed_by: String,
        detail: String,
        now: DateTime<Utc>,
    ) -> AppointmentAudit {
        AppointmentAudit {
            id: Uuid::new_v4(),
            appointment_id: appointment.id,
            action,
            performed_by,
            detail,
            timestamp: now,
        }
    }

    pub fn created(appointment: &Appointment, requester: &Requester, now: DateTime<Utc>) -> AppointmentAudit {
        Self::record(
            appointment,
            AuditAction::Created,
            requester.audit_tag(),
            format!(
                "Booked with doctor {} at {} for {} minutes",
                appointment.doctor_id, appointment.appointment_time, appointment.duration_minutes
            ),
            now,
        )
    }

    pub fn auto_confirmed(appointment: &Appointment, now: DateTime<Utc>) -> AppointmentAudit {
        Self::record(
            appointment,
            AuditAction::AutoConfirmed,
            Requester::system().audit_tag(),
            "Confirmed automatically, doctor accepts bookings without review".to_string(),
            now,
        )
    }

    /// CREATED, followed by AUTO_CONFIRMED when the appointment starts out confirmed.
    pub fn creation_records(
        appointment: &Appointment,
        requester: &Requester,
        now: DateTime<Utc>,
    ) -> Vec<AppointmentAudit> {
        let mut records = vec![Self::created(appointment, requester, now)];
        if appointment.status == AppointmentStatus::Confirmed {
            records.push(Self::auto_confirmed(appointment, now));
        }
        records
    }

    pub fn cancelled(
        appointment: &Appointment,
        previous: AppointmentStatus,
        requester: &Requester,
        now: DateTime<Utc>,
    ) -> AppointmentAudit {
        let detail = match appointment.cancelled_reason.as_deref() {
            Some(reason) => format!("Cancelled from {}: {}", previous, reason),
            None => format!("Cancelled from {}", previous),
        };
        Self::record(appointment, AuditAction::Cancelled, requester.audit_tag(), detail, now)
    }

    pub fn status_changed(
        appointment: &Appointment,
        previous: AppointmentStatus,
        requester: &Requester,
        now: DateTime<Utc>,
    ) -> AppointmentAudit {
        Self::record(
            appointment,
            AuditAction::StatusChanged(appointment.status),
            requester.audit_tag(),
            format!("Status changed from {} to {}", previous, appointment.status),
            now,
        )
    }

    /// Oldest first.
    pub async fn history(&self, appointment_id: Uuid) -> Result<Vec<AppointmentAudit>, AppointmentError> {
        debug!("Loading audit trail for appointment {}", appointment_id);
        Ok(self.store.audit_for(appointment_id).await?)
    }
}
