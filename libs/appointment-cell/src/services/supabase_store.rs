// libs/appointment-cell/src/services/supabase_store.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, error, warn};
use uuid::Uuid;

use shared_database::supabase::{SupabaseClient, SupabaseError};

use crate::models::{Appointment, AppointmentAudit, AppointmentStatus};
use crate::services::store::{AppointmentStore, StoreError};

/// SQLSTATE raised by `transition_appointment` for an unknown id.
const NO_DATA_FOUND: &str = "P0002";
/// SQLSTATE raised by `transition_appointment` when the row moved underneath us.
/// The error message carries the status actually stored.
const SERIALIZATION_FAILURE: &str = "40001";

/// PostgREST-backed store. Each mutation is a single RPC call into a Postgres
/// function (see `migrations/`) so the row write and the audit append share
/// one database transaction.
pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn fetch_appointments(&self, path: &str) -> Result<Vec<Appointment>, StoreError> {
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, path, None, None)
            .await
            .map_err(map_error)?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| StoreError::Backend(format!("Failed to parse appointments: {}", e)))
    }
}

fn map_error(err: SupabaseError) -> StoreError {
    if err.is_unique_violation() {
        let constraint = match &err {
            SupabaseError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        };
        return StoreError::UniqueViolation { constraint };
    }

    if err.is_unavailable() {
        warn!("Appointment store unavailable: {}", err);
        return StoreError::Unavailable(err.to_string());
    }

    error!("Appointment store error: {}", err);
    StoreError::Backend(err.to_string())
}

fn rpc_code(err: &SupabaseError) -> Option<&str> {
    match err {
        SupabaseError::Api { code, .. } => code.as_deref(),
        _ => None,
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn slot_taken(
        &self,
        doctor_id: Uuid,
        appointment_time: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let time = appointment_time.to_rfc3339();
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&appointment_time=eq.{}&status=neq.{}&select=id&limit=1",
            doctor_id,
            urlencoding::encode(&time),
            AppointmentStatus::Cancelled,
        );

        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(map_error)?;

        Ok(!rows.is_empty())
    }

    async fn insert(
        &self,
        appointment: &Appointment,
        audit: &[AppointmentAudit],
    ) -> Result<Appointment, StoreError> {
        debug!("Inserting appointment {} via book_appointment", appointment.id);

        let body = json!({
            "p_appointment": appointment,
            "p_audit": audit,
        });

        let row: Value = self.supabase
            .request(Method::POST, "/rest/v1/rpc/book_appointment", None, Some(body))
            .await
            .map_err(map_error)?;

        serde_json::from_value(row)
            .map_err(|e| StoreError::Backend(format!("Failed to parse created appointment: {}", e)))
    }

    async fn transition(
        &self,
        updated: &Appointment,
        expected: AppointmentStatus,
        audit: &AppointmentAudit,
    ) -> Result<Appointment, StoreError> {
        debug!("Transitioning appointment {} from {} to {}", updated.id, expected, updated.status);

        let body = json!({
            "p_appointment": updated,
            "p_expected_status": expected,
            "p_audit": audit,
        });

        let result: Result<Value, SupabaseError> = self.supabase
            .request(Method::POST, "/rest/v1/rpc/transition_appointment", None, Some(body))
            .await;

        let row = match result {
            Ok(row) => row,
            Err(err) if rpc_code(&err) == Some(NO_DATA_FOUND) => {
                return Err(StoreError::NotFound(updated.id));
            }
            Err(err) if rpc_code(&err) == Some(SERIALIZATION_FAILURE) => {
                let actual = match &err {
                    SupabaseError::Api { message, .. } => message.parse().ok(),
                    _ => None,
                };
                return match actual {
                    Some(actual) => Err(StoreError::StaleStatus {
                        appointment_id: updated.id,
                        expected,
                        actual,
                    }),
                    None => Err(StoreError::Backend(err.to_string())),
                };
            }
            Err(err) => return Err(map_error(err)),
        };

        serde_json::from_value(row)
            .map_err(|e| StoreError::Backend(format!("Failed to parse updated appointment: {}", e)))
    }

    async fn find(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        Ok(self.fetch_appointments(&path).await?.into_iter().next())
    }

    async fn list_by_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>, StoreError> {
        let path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&order=appointment_time.asc",
            patient_id
        );
        self.fetch_appointments(&path).await
    }

    async fn list_by_doctor(&self, doctor_id: Uuid) -> Result<Vec<Appointment>, StoreError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&order=appointment_time.asc",
            doctor_id
        );
        self.fetch_appointments(&path).await
    }

    async fn list_all(&self) -> Result<Vec<Appointment>, StoreError> {
        self.fetch_appointments("/rest/v1/appointments?order=appointment_time.asc").await
    }

    async fn audit_for(&self, appointment_id: Uuid) -> Result<Vec<AppointmentAudit>, StoreError> {
        let path = format!(
            "/rest/v1/appointment_audits?appointment_id=eq.{}&order=seq.asc",
            appointment_id
        );

        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(map_error)?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<AppointmentAudit>, _>>()
            .map_err(|e| StoreError::Backend(format!("Failed to parse audit records: {}", e)))
    }
}
