// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use shared_models::auth::{Requester, RequesterRole};
use shared_models::error::AppError;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, CancelAppointmentRequest, NewAppointment,
    UpdateStatusRequest,
};
use crate::services::booking::AppointmentService;

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        let code = err.code();
        let message = err.to_string();
        let kind = match err {
            AppointmentError::NotFound(_) => AppError::NotFound(message),
            AppointmentError::Conflict(_) | AppointmentError::InvalidState { .. } => AppError::Conflict(message),
            AppointmentError::Unauthorized { .. } => AppError::Forbidden(message),
            AppointmentError::PolicyViolation(_) => AppError::PolicyViolation(message),
            AppointmentError::UnsupportedStatus(_) => AppError::BadRequest(message),
            AppointmentError::Validation(_) => AppError::ValidationError(message),
            AppointmentError::RemoteUnavailable { .. } => AppError::ExternalService(message),
            AppointmentError::Storage(_) => AppError::Database(message),
        };
        kind.with_code(code)
    }
}

// ==============================================================================
// READ SCOPING
// ==============================================================================

fn can_view(appointment: &Appointment, requester: &Requester) -> bool {
    match requester.role {
        RequesterRole::Admin | RequesterRole::System => true,
        RequesterRole::Patient => appointment.is_owned_by_patient(requester),
        RequesterRole::Doctor => appointment.is_owned_by_doctor(requester),
    }
}

fn visible_to(appointments: Vec<Appointment>, requester: &Requester) -> Vec<Appointment> {
    appointments
        .into_iter()
        .filter(|apt| can_view(apt, requester))
        .collect()
}

fn ensure_can_view(appointment: &Appointment, requester: &Requester) -> Result<(), AppError> {
    if !can_view(appointment, requester) {
        warn!("{} denied read access to appointment {}", requester.audit_tag(), appointment.id);
        return Err(AppError::Forbidden("Not authorized to view this appointment".to_string()));
    }
    Ok(())
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_appointment(
    State(service): State<Arc<AppointmentService>>,
    Extension(requester): Extension<Requester>,
    Json(request): Json<NewAppointment>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    match requester.role {
        RequesterRole::Patient if !requester.has_id(request.patient_id) => {
            return Err(AppError::Forbidden("Patients can only book appointments for themselves".to_string()));
        }
        RequesterRole::Doctor if !requester.has_id(request.doctor_id) => {
            return Err(AppError::Forbidden("Doctors can only book into their own schedule".to_string()));
        }
        _ => {}
    }

    let appointment = service.create_appointment_as(request, &requester).await?;

    let message = if appointment.status == AppointmentStatus::Confirmed {
        "Appointment booked and confirmed"
    } else {
        "Appointment requested, awaiting doctor confirmation"
    };

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "appointment": appointment,
            "message": message
        })),
    ))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(service): State<Arc<AppointmentService>>,
    Path(appointment_id): Path<Uuid>,
    Extension(requester): Extension<Requester>,
    body: Option<Json<CancelAppointmentRequest>>,
) -> Result<Json<Value>, AppError> {
    let reason = body.and_then(|Json(request)| request.reason);

    let appointment = service.cancel_appointment(appointment_id, &requester, reason).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled"
    })))
}

#[axum::debug_handler]
pub async fn update_status(
    State(service): State<Arc<AppointmentService>>,
    Path(appointment_id): Path<Uuid>,
    Extension(requester): Extension<Requester>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = service
        .update_status(appointment_id, &request.status, &requester, request.notes)
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": format!("Appointment is now {}", appointment.status)
    })))
}

// ==============================================================================
// QUERY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_appointment(
    State(service): State<Arc<AppointmentService>>,
    Path(appointment_id): Path<Uuid>,
    Extension(requester): Extension<Requester>,
) -> Result<Json<Value>, AppError> {
    let appointment = service.get_appointment(appointment_id).await?;
    ensure_can_view(&appointment, &requester)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn get_audit_trail(
    State(service): State<Arc<AppointmentService>>,
    Path(appointment_id): Path<Uuid>,
    Extension(requester): Extension<Requester>,
) -> Result<Json<Value>, AppError> {
    let appointment = service.get_appointment(appointment_id).await?;
    ensure_can_view(&appointment, &requester)?;

    let records = service.audit_trail(appointment_id).await?;

    Ok(Json(json!({
        "appointment_id": appointment_id,
        "records": records,
        "total": records.len()
    })))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(service): State<Arc<AppointmentService>>,
    Extension(requester): Extension<Requester>,
) -> Result<Json<Value>, AppError> {
    if !requester.role.is_privileged() {
        return Err(AppError::Forbidden("Listing all appointments requires admin access".to_string()));
    }

    let appointments = service.list_all().await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_patient_appointments(
    State(service): State<Arc<AppointmentService>>,
    Path(patient_id): Path<Uuid>,
    Extension(requester): Extension<Requester>,
) -> Result<Json<Value>, AppError> {
    if requester.role == RequesterRole::Patient && !requester.has_id(patient_id) {
        return Err(AppError::Forbidden("Not authorized to view these appointments".to_string()));
    }

    let appointments = visible_to(service.list_by_patient(patient_id).await?, &requester);

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_appointments(
    State(service): State<Arc<AppointmentService>>,
    Path(doctor_id): Path<Uuid>,
    Extension(requester): Extension<Requester>,
) -> Result<Json<Value>, AppError> {
    if requester.role == RequesterRole::Doctor && !requester.has_id(doctor_id) {
        return Err(AppError::Forbidden("Not authorized to view these appointments".to_string()));
    }

    let appointments = visible_to(service.list_by_doctor(doctor_id).await?, &requester);

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_statuses(
    State(service): State<Arc<AppointmentService>>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(json!({
        "statuses": service.status_descriptors(),
        "cancellation_cutoff_hours": service.cancellation_cutoff_hours()
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn test_error_mapping_keeps_code_and_status() {
        let cases = [
            (AppointmentError::UnsupportedStatus("FOO".into()), StatusCode::BAD_REQUEST, "UNSUPPORTED_STATUS"),
            (
                AppointmentError::InvalidState {
                    appointment_id: Uuid::nil(),
                    current: AppointmentStatus::Cancelled,
                    target: AppointmentStatus::Confirmed,
                },
                StatusCode::CONFLICT,
                "INVALID_STATE",
            ),
            (
                AppointmentError::Unauthorized { appointment_id: Uuid::nil(), requester: "PATIENT_1".into() },
                StatusCode::FORBIDDEN,
                "UNAUTHORIZED",
            ),
            (
                AppointmentError::RemoteUnavailable { service: "patient-gateway", message: "timeout".into() },
                StatusCode::BAD_GATEWAY,
                "REMOTE_UNAVAILABLE",
            ),
            (AppointmentError::Storage("boom".into()), StatusCode::INTERNAL_SERVER_ERROR, "STORAGE"),
        ];

        for (err, status, code) in cases {
            let app_error = AppError::from(err);
            assert_eq!(app_error.status_code(), status);
            assert_eq!(app_error.code(), code);
            assert_eq!(app_error.into_response().status(), status);
        }
    }
}
