#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use appointment_cell::models::NewAppointment;
use appointment_cell::services::{
    AppointmentService, Collaborators, DoctorAvailability, DoctorAvailabilityGateway, FixedClock,
    GatewayError, InMemoryAppointmentStore, NotificationError, NotificationGateway,
    NotificationMessage, PatientGateway, PatientVerification,
};
use shared_utils::test_utils::TestConfig;

pub fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
}

/// Answers every lookup with a fixed outcome.
pub struct StubPatients(pub Result<PatientVerification, GatewayError>);

impl StubPatients {
    pub fn active() -> Self {
        Self(Ok(PatientVerification { active: true }))
    }
}

#[async_trait]
impl PatientGateway for StubPatients {
    async fn verify(&self, _: Uuid) -> Result<PatientVerification, GatewayError> {
        self.0.clone()
    }
}

pub struct StubDoctors(pub Result<DoctorAvailability, GatewayError>);

impl StubDoctors {
    pub fn available(auto_accept: bool) -> Self {
        Self(Ok(DoctorAvailability { available: true, auto_accept }))
    }
}

#[async_trait]
impl DoctorAvailabilityGateway for StubDoctors {
    async fn verify(&self, _: Uuid, _: DateTime<Utc>, _: i32) -> Result<DoctorAvailability, GatewayError> {
        self.0.clone()
    }
}

/// Never answers within any reasonable timeout.
pub struct HangingDoctors;

#[async_trait]
impl DoctorAvailabilityGateway for HangingDoctors {
    async fn verify(&self, _: Uuid, _: DateTime<Utc>, _: i32) -> Result<DoctorAvailability, GatewayError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(DoctorAvailability { available: true, auto_accept: false })
    }
}

/// Records every message it is asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<NotificationMessage>>,
}

impl RecordingNotifier {
    pub fn subjects(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|m| m.subject.clone()).collect()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|m| m.body.clone()).collect()
    }
}

#[async_trait]
impl NotificationGateway for RecordingNotifier {
    async fn send(&self, message: &NotificationMessage) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Fails every delivery after counting the attempt.
#[derive(Default)]
pub struct FailingNotifier {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl NotificationGateway for FailingNotifier {
    async fn send(&self, _: &NotificationMessage) -> Result<(), NotificationError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(NotificationError::Transport("connection refused".to_string()))
    }
}

pub struct Harness {
    pub service: Arc<AppointmentService>,
    pub store: Arc<InMemoryAppointmentStore>,
    pub clock: Arc<FixedClock>,
    pub notifier: Arc<RecordingNotifier>,
}

pub struct HarnessBuilder {
    patients: Arc<dyn PatientGateway>,
    doctors: Arc<dyn DoctorAvailabilityGateway>,
    notifications: Option<Arc<dyn NotificationGateway>>,
    now: DateTime<Utc>,
    cutoff_hours: i64,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            patients: Arc::new(StubPatients::active()),
            doctors: Arc::new(StubDoctors::available(false)),
            notifications: None,
            now: at(2025, 1, 1, 8),
            cutoff_hours: 24,
        }
    }

    pub fn patients(mut self, patients: impl PatientGateway + 'static) -> Self {
        self.patients = Arc::new(patients);
        self
    }

    pub fn doctors(mut self, doctors: impl DoctorAvailabilityGateway + 'static) -> Self {
        self.doctors = Arc::new(doctors);
        self
    }

    pub fn auto_accept(self, auto_accept: bool) -> Self {
        self.doctors(StubDoctors::available(auto_accept))
    }

    pub fn notifications(mut self, notifications: Arc<dyn NotificationGateway>) -> Self {
        self.notifications = Some(notifications);
        self
    }

    pub fn now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn build(self) -> Harness {
        let config = TestConfig {
            cancellation_cutoff_hours: self.cutoff_hours,
            ..TestConfig::default()
        }
        .to_app_config();

        let store = Arc::new(InMemoryAppointmentStore::new());
        let clock = Arc::new(FixedClock::new(self.now));
        let notifier = Arc::new(RecordingNotifier::default());

        let service = AppointmentService::with_collaborators(
            &config,
            Collaborators {
                store: store.clone(),
                patients: self.patients,
                doctors: self.doctors,
                notifications: self
                    .notifications
                    .unwrap_or_else(|| notifier.clone() as Arc<dyn NotificationGateway>),
                clock: clock.clone(),
            },
        );

        Harness {
            service: Arc::new(service),
            store,
            clock,
            notifier,
        }
    }
}

/// A 30-minute request at 2025-01-02T09:00Z for fresh ids.
pub fn new_appointment() -> NewAppointment {
    NewAppointment {
        patient_id: Uuid::new_v4(),
        doctor_id: Uuid::new_v4(),
        appointment_time: at(2025, 1, 2, 9),
        duration_minutes: 30,
        notes: Some("Follow-up".to_string()),
    }
}
