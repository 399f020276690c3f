use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::services::{
    DoctorAvailability, DoctorAvailabilityGateway, GatewayError, HttpNotificationGateway,
    NotificationError, NotificationGateway, NotificationMessage, PatientGateway,
    PatientVerification, SupabaseDoctorAvailabilityGateway, SupabasePatientGateway,
};
use shared_database::supabase::SupabaseClient;
use shared_utils::test_utils::TestConfig;

fn client_for(server: &MockServer) -> Arc<SupabaseClient> {
    let config = TestConfig::for_mock_server(&server.uri()).to_app_config();
    Arc::new(SupabaseClient::new(&config))
}

#[tokio::test]
async fn test_patient_lookup() {
    let server = MockServer::start().await;
    let active = Uuid::new_v4();
    let inactive = Uuid::new_v4();
    let legacy = Uuid::new_v4();

    for (id, body) in [
        (active, json!([{ "id": active, "is_active": true }])),
        (inactive, json!([{ "id": inactive, "is_active": false }])),
        (legacy, json!([{ "id": legacy }])),
    ] {
        Mock::given(method("GET"))
            .and(path("/rest/v1/patients"))
            .and(query_param("id", format!("eq.{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let gateway = SupabasePatientGateway::new(client_for(&server));

    assert_eq!(gateway.verify(active).await, Ok(PatientVerification { active: true }));
    assert_eq!(gateway.verify(inactive).await, Ok(PatientVerification { active: false }));
    assert_eq!(gateway.verify(legacy).await, Ok(PatientVerification { active: true }));
    assert_eq!(gateway.verify(Uuid::new_v4()).await, Err(GatewayError::NotFound));
}

#[tokio::test]
async fn test_doctor_availability_uses_bookable_rpc() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let start = Utc.with_ymd_and_hms(2025, 7, 1, 9, 0, 0).unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": doctor_id,
            "is_available": true,
            "auto_accept_appointments": true
        }])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/doctor_is_bookable"))
        .and(body_partial_json(json!({ "p_doctor_id": doctor_id, "p_duration_minutes": 45 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = SupabaseDoctorAvailabilityGateway::new(client_for(&server));

    assert_eq!(
        gateway.verify(doctor_id, start, 45).await,
        Ok(DoctorAvailability { available: true, auto_accept: true })
    );
}

#[tokio::test]
async fn test_doctor_not_accepting_skips_rpc() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": doctor_id,
            "is_available": false
        }])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/doctor_is_bookable"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
        .expect(0)
        .mount(&server)
        .await;

    let gateway = SupabaseDoctorAvailabilityGateway::new(client_for(&server));
    let result = gateway.verify(doctor_id, Utc::now(), 30).await;

    assert_eq!(result, Ok(DoctorAvailability { available: false, auto_accept: false }));
}

#[tokio::test]
async fn test_doctor_gateway_error_classes() {
    let server = MockServer::start().await;
    let missing = Uuid::new_v4();
    let locked = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", missing)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", locked)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": locked }])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/doctor_is_bookable"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "55P03",
            "message": "schedule is locked"
        })))
        .mount(&server)
        .await;

    let gateway = SupabaseDoctorAvailabilityGateway::new(client_for(&server));

    assert_eq!(gateway.verify(missing, Utc::now(), 30).await, Err(GatewayError::NotFound));
    assert_matches!(gateway.verify(locked, Utc::now(), 30).await, Err(GatewayError::Conflict(_)));
}

#[tokio::test]
async fn test_slow_gateway_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let gateway = SupabasePatientGateway::new(client_for(&server));

    assert_matches!(gateway.verify(Uuid::new_v4()).await, Err(GatewayError::Unavailable(_)));
}

fn message() -> NotificationMessage {
    NotificationMessage {
        patient_id: Uuid::new_v4(),
        doctor_id: Uuid::new_v4(),
        appointment_id: Uuid::new_v4(),
        subject: "Appointment confirmed".to_string(),
        body: "Your appointment is confirmed.".to_string(),
        channel: "EMAIL".to_string(),
    }
}

#[tokio::test]
async fn test_http_notification_gateway_posts_json() {
    let server = MockServer::start().await;
    let msg = message();

    Mock::given(method("POST"))
        .and(path("/notifications"))
        .and(body_partial_json(json!({ "appointment_id": msg.appointment_id, "channel": "EMAIL" })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let config = TestConfig::for_mock_server(&server.uri()).to_app_config();
    let gateway = HttpNotificationGateway::new(&config);

    assert_eq!(gateway.send(&msg).await, Ok(()));
}

#[tokio::test]
async fn test_http_notification_gateway_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notifications"))
        .respond_with(ResponseTemplate::new(500).set_body_string("mailer down"))
        .mount(&server)
        .await;

    let config = TestConfig::for_mock_server(&server.uri()).to_app_config();
    let gateway = HttpNotificationGateway::new(&config);

    assert_matches!(
        gateway.send(&message()).await,
        Err(NotificationError::Rejected(detail)) if detail.contains("mailer down")
    );
}
