// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
    middleware,
};

use shared_utils::extractor::requester_middleware;

use crate::handlers;
use crate::services::booking::AppointmentService;

pub fn appointment_routes(service: Arc<AppointmentService>) -> Router {
    // Every route needs a verified requester
    let protected_routes = Router::new()
        .route("/", post(handlers::create_appointment).get(handlers::list_appointments))
        .route("/statuses", get(handlers::get_statuses))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/audit", get(handlers::get_audit_trail))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/status", put(handlers::update_status))

        // Appointment listings
        .route("/patients/{patient_id}", get(handlers::get_patient_appointments))
        .route("/doctors/{doctor_id}", get(handlers::get_doctor_appointments))

        .layer(middleware::from_fn(requester_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(service)
}
