// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use shared_models::auth::Requester;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub cancelled_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn is_owned_by_patient(&self, requester: &Requester) -> bool {
        requester.has_id(self.patient_id)
    }

    pub fn is_owned_by_doctor(&self, requester: &Requester) -> bool {
        requester.has_id(self.doctor_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 4] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::Completed,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "PENDING",
            AppointmentStatus::Confirmed => "CONFIRMED",
            AppointmentStatus::Cancelled => "CANCELLED",
            AppointmentStatus::Completed => "COMPLETED",
        }
    }

    /// Parse a caller-supplied status code, case-insensitively.
    pub fn parse_code(raw: &str) -> Result<Self, AppointmentError> {
        raw.parse()
    }

    pub fn descriptor(&self) -> &'static StatusDescriptor {
        match self {
            AppointmentStatus::Pending => &STATUS_DESCRIPTORS[0],
            AppointmentStatus::Confirmed => &STATUS_DESCRIPTORS[1],
            AppointmentStatus::Cancelled => &STATUS_DESCRIPTORS[2],
            AppointmentStatus::Completed => &STATUS_DESCRIPTORS[3],
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        AppointmentStatus::ALL
            .into_iter()
            .find(|status| status.code() == normalized)
            .ok_or_else(|| AppointmentError::UnsupportedStatus(s.trim().to_string()))
    }
}

/// Reference label for a status code. Loaded once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusDescriptor {
    pub code: AppointmentStatus,
    pub label: &'static str,
}

pub static STATUS_DESCRIPTORS: [StatusDescriptor; 4] = [
    StatusDescriptor {
        code: AppointmentStatus::Pending,
        label: "Awaiting doctor confirmation",
    },
    StatusDescriptor {
        code: AppointmentStatus::Confirmed,
        label: "Confirmed by the clinic",
    },
    StatusDescriptor {
        code: AppointmentStatus::Cancelled,
        label: "Cancelled",
    },
    StatusDescriptor {
        code: AppointmentStatus::Completed,
        label: "Consultation completed",
    },
];

// ==============================================================================
// AUDIT MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum AuditAction {
    Created,
    AutoConfirmed,
    Cancelled,
    StatusChanged(AppointmentStatus),
}

impl AuditAction {
    pub fn tag(&self) -> String {
        match self {
            AuditAction::Created => "CREATED".to_string(),
            AuditAction::AutoConfirmed => "AUTO_CONFIRMED".to_string(),
            AuditAction::Cancelled => "CANCELLED".to_string(),
            AuditAction::StatusChanged(status) => format!("STATUS_{}", status.code()),
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

impl From<AuditAction> for String {
    fn from(action: AuditAction) -> Self {
        action.tag()
    }
}

impl TryFrom<String> for AuditAction {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "CREATED" => Ok(AuditAction::Created),
            "AUTO_CONFIRMED" => Ok(AuditAction::AutoConfirmed),
            "CANCELLED" => Ok(AuditAction::Cancelled),
            other => other
                .strip_prefix("STATUS_")
                .and_then(|code| code.parse().ok())
                .map(AuditAction::StatusChanged)
                .ok_or_else(|| format!("Unknown audit action: {}", other)),
        }
    }
}

/// One immutable entry in an appointment's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentAudit {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub action: AuditAction,
    pub performed_by: String,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAppointment {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_time: DateTime<Utc>,
    pub duration_minutes: i32,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NotFoundKind {
    #[error("Appointment {0} not found")]
    Appointment(Uuid),

    #[error("Patient {0} not found")]
    Patient(Uuid),

    #[error("Doctor {0} not found")]
    Doctor(Uuid),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConflictReason {
    #[error("Doctor {doctor_id} is not available at {appointment_time}")]
    DoctorUnavailable {
        doctor_id: Uuid,
        appointment_time: DateTime<Utc>,
    },

    #[error("Doctor {doctor_id} already has an appointment at {appointment_time}")]
    SlotTaken {
        doctor_id: Uuid,
        appointment_time: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyViolation {
    #[error("Patient {patient_id} is not active")]
    PatientInactive { patient_id: Uuid },

    #[error("Appointment {appointment_id} at {appointment_time} can no longer be cancelled (cutoff is {cutoff_hours}h before start)")]
    CutoffWindow {
        appointment_id: Uuid,
        appointment_time: DateTime<Utc>,
        cutoff_hours: i64,
    },

    #[error("Appointment time {appointment_time} is not in the future")]
    PastAppointmentTime { appointment_time: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("{0}")]
    NotFound(NotFoundKind),

    #[error("{0}")]
    Conflict(ConflictReason),

    #[error("Appointment {appointment_id} cannot move from {current} to {target}")]
    InvalidState {
        appointment_id: Uuid,
        current: AppointmentStatus,
        target: AppointmentStatus,
    },

    #[error("{requester} is not authorized to act on appointment {appointment_id}")]
    Unauthorized {
        appointment_id: Uuid,
        requester: String,
    },

    #[error("{0}")]
    PolicyViolation(PolicyViolation),

    #[error("Unsupported status code: {0}")]
    UnsupportedStatus(String),

    #[error("{service} unavailable: {message}")]
    RemoteUnavailable {
        service: &'static str,
        message: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl AppointmentError {
    /// Stable machine-readable code for API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            AppointmentError::NotFound(NotFoundKind::Appointment(_)) => "APPOINTMENT_NOT_FOUND",
            AppointmentError::NotFound(NotFoundKind::Patient(_)) => "PATIENT_NOT_FOUND",
            AppointmentError::NotFound(NotFoundKind::Doctor(_)) => "DOCTOR_NOT_FOUND",
            AppointmentError::Conflict(ConflictReason::DoctorUnavailable { .. }) => "DOCTOR_UNAVAILABLE",
            AppointmentError::Conflict(ConflictReason::SlotTaken { .. }) => "SLOT_TAKEN",
            AppointmentError::InvalidState { .. } => "INVALID_STATE",
            AppointmentError::Unauthorized { .. } => "UNAUTHORIZED",
            AppointmentError::PolicyViolation(PolicyViolation::PatientInactive { .. }) => "PATIENT_INACTIVE",
            AppointmentError::PolicyViolation(PolicyViolation::CutoffWindow { .. }) => "CUTOFF_WINDOW",
            AppointmentError::PolicyViolation(PolicyViolation::PastAppointmentTime { .. }) => "PAST_APPOINTMENT_TIME",
            AppointmentError::UnsupportedStatus(_) => "UNSUPPORTED_STATUS",
            AppointmentError::RemoteUnavailable { .. } => "REMOTE_UNAVAILABLE",
            AppointmentError::Validation(_) => "VALIDATION",
            AppointmentError::Storage(_) => "STORAGE",
        }
    }
}

// ==============================================================================
// VALIDATION RULES
// ==============================================================================

#[derive(Debug, Clone)]
pub struct AppointmentValidationRules {
    pub min_duration_minutes: i32,
    pub max_duration_minutes: i32,
}

impl Default for AppointmentValidationRules {
    fn default() -> Self {
        Self {
            min_duration_minutes: 1,
            max_duration_minutes: 480,
        }
    }
}
