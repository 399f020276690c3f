// libs/appointment-cell/src/services/gateways.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::{SupabaseClient, SupabaseError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Resource not found")]
    NotFound,

    #[error("Conflict reported upstream: {0}")]
    Conflict(String),

    #[error("Upstream unavailable: {0}")]
    Unavailable(String),
}

impl From<SupabaseError> for GatewayError {
    fn from(err: SupabaseError) -> Self {
        match err.status() {
            Some(404) => GatewayError::NotFound,
            Some(409) => GatewayError::Conflict(err.to_string()),
            _ => GatewayError::Unavailable(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatientVerification {
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DoctorAvailability {
    pub available: bool,
    pub auto_accept: bool,
}

#[async_trait]
pub trait PatientGateway: Send + Sync {
    async fn verify(&self, patient_id: Uuid) -> Result<PatientVerification, GatewayError>;
}

#[async_trait]
pub trait DoctorAvailabilityGateway: Send + Sync {
    async fn verify(
        &self,
        doctor_id: Uuid,
        appointment_time: DateTime<Utc>,
        duration_minutes: i32,
    ) -> Result<DoctorAvailability, GatewayError>;
}

// ==============================================================================
// SUPABASE IMPLEMENTATIONS
// ==============================================================================

#[derive(Debug, Deserialize)]
struct PatientRow {
    #[serde(default)]
    is_active: Option<bool>,
}

pub struct SupabasePatientGateway {
    supabase: Arc<SupabaseClient>,
}

impl SupabasePatientGateway {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl PatientGateway for SupabasePatientGateway {
    async fn verify(&self, patient_id: Uuid) -> Result<PatientVerification, GatewayError> {
        debug!("Verifying patient {}", patient_id);

        let path = format!("/rest/v1/patients?id=eq.{}&select=id,is_active", patient_id);
        let rows: Vec<PatientRow> = self.supabase
            .request(Method::GET, &path, None, None)
            .await?;

        let row = rows.into_iter().next().ok_or(GatewayError::NotFound)?;

        // Rows predating the is_active column count as active.
        Ok(PatientVerification {
            active: row.is_active.unwrap_or(true),
        })
    }
}

#[derive(Debug, Deserialize)]
struct DoctorRow {
    #[serde(default)]
    is_available: Option<bool>,
    #[serde(default)]
    auto_accept_appointments: Option<bool>,
}

pub struct SupabaseDoctorAvailabilityGateway {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseDoctorAvailabilityGateway {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl DoctorAvailabilityGateway for SupabaseDoctorAvailabilityGateway {
    async fn verify(
        &self,
        doctor_id: Uuid,
        appointment_time: DateTime<Utc>,
        duration_minutes: i32,
    ) -> Result<DoctorAvailability, GatewayError> {
        debug!("Checking availability of doctor {} at {} for {} min",
               doctor_id, appointment_time, duration_minutes);

        let path = format!(
            "/rest/v1/doctors?id=eq.{}&select=id,is_available,auto_accept_appointments",
            doctor_id
        );
        let rows: Vec<DoctorRow> = self.supabase
            .request(Method::GET, &path, None, None)
            .await?;

        let doctor = rows.into_iter().next().ok_or(GatewayError::NotFound)?;
        let auto_accept = doctor.auto_accept_appointments.unwrap_or(false);

        if !doctor.is_available.unwrap_or(true) {
            warn!("Doctor {} is not accepting bookings", doctor_id);
            return Ok(DoctorAvailability { available: false, auto_accept });
        }

        let bookable: Value = self.supabase
            .request(
                Method::POST,
                "/rest/v1/rpc/doctor_is_bookable",
                None,
                Some(json!({
                    "p_doctor_id": doctor_id,
                    "p_start_time": appointment_time.to_rfc3339(),
                    "p_duration_minutes": duration_minutes,
                })),
            )
            .await?;

        Ok(DoctorAvailability {
            available: bookable.as_bool().unwrap_or(false),
            auto_accept,
        })
    }
}
