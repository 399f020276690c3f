// libs/appointment-cell/src/services/booking.rs
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::{AppConfig, StoreBackend};
use shared_database::supabase::SupabaseClient;
use shared_models::auth::Requester;

use crate::models::{
    Appointment, AppointmentAudit, AppointmentError, AppointmentStatus, AppointmentValidationRules,
    ConflictReason, NewAppointment, NotFoundKind, PolicyViolation, StatusDescriptor,
    STATUS_DESCRIPTORS,
};
use crate::services::audit::AuditTrail;
use crate::services::clock::{Clock, SystemClock};
use crate::services::conflict::ConflictResolver;
use crate::services::gateways::{
    DoctorAvailabilityGateway, GatewayError, PatientGateway, SupabaseDoctorAvailabilityGateway,
    SupabasePatientGateway,
};
use crate::services::lifecycle::LifecycleStateMachine;
use crate::services::notification::{
    HttpNotificationGateway, LogNotificationGateway, NotificationDispatcher, NotificationEvent,
    NotificationGateway,
};
use crate::services::store::{AppointmentStore, InMemoryAppointmentStore, StoreError};
use crate::services::supabase_store::SupabaseAppointmentStore;

const PATIENT_SERVICE: &str = "patient-gateway";
const DOCTOR_SERVICE: &str = "doctor-availability";

/// Everything the service talks to. Production wiring lives in
/// `AppointmentService::new`; tests pass their own.
pub struct Collaborators {
    pub store: Arc<dyn AppointmentStore>,
    pub patients: Arc<dyn PatientGateway>,
    pub doctors: Arc<dyn DoctorAvailabilityGateway>,
    pub notifications: Arc<dyn NotificationGateway>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TransitionKind {
    Cancel,
    StatusUpdate,
}

pub struct AppointmentService {
    store: Arc<dyn AppointmentStore>,
    patients: Arc<dyn PatientGateway>,
    doctors: Arc<dyn DoctorAvailabilityGateway>,
    clock: Arc<dyn Clock>,
    resolver: ConflictResolver,
    lifecycle: LifecycleStateMachine,
    audit: AuditTrail,
    dispatcher: NotificationDispatcher,
    validation_rules: AppointmentValidationRules,
    gateway_timeout: Duration,
}

impl AppointmentService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));

        let store: Arc<dyn AppointmentStore> = match config.store_backend {
            StoreBackend::Supabase => Arc::new(SupabaseAppointmentStore::new(Arc::clone(&supabase))),
            StoreBackend::Memory => {
                warn!("Using in-memory appointment store; data is lost on restart");
                Arc::new(InMemoryAppointmentStore::new())
            }
        };

        let notifications: Arc<dyn NotificationGateway> = if config.is_notification_configured() {
            Arc::new(HttpNotificationGateway::new(config))
        } else {
            info!("NOTIFICATION_URL not set, notifications will only be logged");
            Arc::new(LogNotificationGateway)
        };

        Self::with_collaborators(
            config,
            Collaborators {
                store,
                patients: Arc::new(SupabasePatientGateway::new(Arc::clone(&supabase))),
                doctors: Arc::new(SupabaseDoctorAvailabilityGateway::new(supabase)),
                notifications,
                clock: Arc::new(SystemClock),
            },
        )
    }

    pub fn with_collaborators(config: &AppConfig, collaborators: Collaborators) -> Self {
        let Collaborators { store, patients, doctors, notifications, clock } = collaborators;

        Self {
            resolver: ConflictResolver::new(Arc::clone(&store)),
            audit: AuditTrail::new(Arc::clone(&store)),
            lifecycle: LifecycleStateMachine::new(config.cancellation_cutoff_hours),
            dispatcher: NotificationDispatcher::new(
                notifications,
                config.notification_channel.clone(),
                config.notification_timeout,
            ),
            validation_rules: AppointmentValidationRules::default(),
            gateway_timeout: config.gateway_timeout,
            store,
            patients,
            doctors,
            clock,
        }
    }

    // ==============================================================================
    // MUTATIONS
    // ==============================================================================

    /// Books on the patient's own behalf.
    pub async fn create_appointment(&self, request: NewAppointment) -> Result<Appointment, AppointmentError> {
        let requester = Requester::patient(request.patient_id);
        self.create_appointment_as(request, &requester).await
    }

    /// Books on behalf of `requester`, who is recorded on the CREATED audit row.
    #[instrument(
        skip(self, request, requester),
        fields(patient_id = %request.patient_id, doctor_id = %request.doctor_id, requester = %requester.audit_tag())
    )]
    pub async fn create_appointment_as(
        &self,
        request: NewAppointment,
        requester: &Requester,
    ) -> Result<Appointment, AppointmentError> {
        info!("Booking appointment at {}", request.appointment_time);

        self.validate_request(&request)?;

        let now = self.clock.now();
        if request.appointment_time <= now {
            warn!("Rejected booking in the past: {}", request.appointment_time);
            return Err(AppointmentError::PolicyViolation(PolicyViolation::PastAppointmentTime {
                appointment_time: request.appointment_time,
            }));
        }

        self.verify_patient(request.patient_id).await?;
        let auto_accept = self.verify_doctor(&request).await?;

        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            appointment_time: request.appointment_time,
            duration_minutes: request.duration_minutes,
            status: self.lifecycle.initial_status(auto_accept),
            notes: request.notes,
            cancelled_reason: None,
            created_at: now,
            updated_at: now,
        };

        let records = AuditTrail::creation_records(&appointment, requester, now);
        let stored = self.resolver.claim(&appointment, &records).await?;

        info!(appointment_id = %stored.id, "Appointment created with status {}", stored.status);

        self.dispatcher.dispatch(NotificationEvent::Created(&stored)).await;
        Ok(stored)
    }

    #[instrument(skip(self, requester, reason), fields(requester = %requester.audit_tag()))]
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        requester: &Requester,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        self.transition(
            appointment_id,
            AppointmentStatus::Cancelled,
            requester,
            reason,
            None,
            TransitionKind::Cancel,
        )
        .await
    }

    #[instrument(skip(self, requester, notes), fields(requester = %requester.audit_tag()))]
    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        target_code: &str,
        requester: &Requester,
        notes: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let target = AppointmentStatus::parse_code(target_code)?;

        let reason = if target == AppointmentStatus::Cancelled {
            notes.clone()
        } else {
            None
        };

        self.transition(appointment_id, target, requester, reason, notes, TransitionKind::StatusUpdate)
            .await
    }

    async fn transition(
        &self,
        appointment_id: Uuid,
        target: AppointmentStatus,
        requester: &Requester,
        reason: Option<String>,
        notes: Option<String>,
        kind: TransitionKind,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.load(appointment_id).await?;
        let now = self.clock.now();

        self.lifecycle.check(&current, target, requester, now)?;

        let mut updated = self.lifecycle.apply(&current, target, reason, now);
        if notes.is_some() {
            updated.notes = notes;
        }

        let record: AppointmentAudit = match kind {
            TransitionKind::Cancel => AuditTrail::cancelled(&updated, current.status, requester, now),
            TransitionKind::StatusUpdate => AuditTrail::status_changed(&updated, current.status, requester, now),
        };

        let stored = match self.store.transition(&updated, current.status, &record).await {
            Ok(stored) => stored,
            Err(StoreError::StaleStatus { actual, .. }) => {
                warn!(appointment_id = %appointment_id,
                      "Appointment changed concurrently, now {}", actual);
                return Err(AppointmentError::InvalidState {
                    appointment_id,
                    current: actual,
                    target,
                });
            }
            Err(e) => return Err(e.into()),
        };

        info!(appointment_id = %stored.id,
              patient_id = %stored.patient_id,
              doctor_id = %stored.doctor_id,
              "Appointment moved from {} to {}", current.status, stored.status);

        let event = match kind {
            TransitionKind::Cancel => NotificationEvent::Cancelled {
                appointment: &stored,
                reason: stored.cancelled_reason.as_deref(),
            },
            TransitionKind::StatusUpdate => NotificationEvent::StatusChanged(&stored),
        };
        self.dispatcher.dispatch(event).await;

        Ok(stored)
    }

    // ==============================================================================
    // QUERIES
    // ==============================================================================

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.load(appointment_id).await
    }

    pub async fn list_by_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Listing appointments for patient {}", patient_id);
        Ok(self.store.list_by_patient(patient_id).await?)
    }

    pub async fn list_by_doctor(&self, doctor_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Listing appointments for doctor {}", doctor_id);
        Ok(self.store.list_by_doctor(doctor_id).await?)
    }

    pub async fn list_all(&self) -> Result<Vec<Appointment>, AppointmentError> {
        Ok(self.store.list_all().await?)
    }

    pub async fn audit_trail(&self, appointment_id: Uuid) -> Result<Vec<AppointmentAudit>, AppointmentError> {
        self.load(appointment_id).await?;
        self.audit.history(appointment_id).await
    }

    pub fn status_descriptors(&self) -> &'static [StatusDescriptor] {
        &STATUS_DESCRIPTORS
    }

    pub fn cancellation_cutoff_hours(&self) -> i64 {
        self.lifecycle.cutoff_hours()
    }

    // ==============================================================================
    // HELPERS
    // ==============================================================================

    async fn load(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment {}", appointment_id);
        self.store
            .find(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound(NotFoundKind::Appointment(appointment_id)))
    }

    fn validate_request(&self, request: &NewAppointment) -> Result<(), AppointmentError> {
        let rules = &self.validation_rules;
        if request.duration_minutes < rules.min_duration_minutes
            || request.duration_minutes > rules.max_duration_minutes
        {
            return Err(AppointmentError::Validation(format!(
                "duration_minutes must be between {} and {}, got {}",
                rules.min_duration_minutes, rules.max_duration_minutes, request.duration_minutes
            )));
        }
        Ok(())
    }

    async fn call_gateway<T, F>(&self, call: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        match tokio::time::timeout(self.gateway_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Unavailable(format!(
                "no response within {} ms",
                self.gateway_timeout.as_millis()
            ))),
        }
    }

    async fn verify_patient(&self, patient_id: Uuid) -> Result<(), AppointmentError> {
        let verification = self
            .call_gateway(self.patients.verify(patient_id))
            .await
            .map_err(|e| match e {
                GatewayError::NotFound => AppointmentError::NotFound(NotFoundKind::Patient(patient_id)),
                GatewayError::Conflict(message) | GatewayError::Unavailable(message) => {
                    warn!("Patient gateway failed: {}", message);
                    AppointmentError::RemoteUnavailable { service: PATIENT_SERVICE, message }
                }
            })?;

        if !verification.active {
            warn!("Patient {} is inactive", patient_id);
            return Err(AppointmentError::PolicyViolation(PolicyViolation::PatientInactive { patient_id }));
        }
        Ok(())
    }

    /// Returns the doctor's auto-accept flag.
    async fn verify_doctor(&self, request: &NewAppointment) -> Result<bool, AppointmentError> {
        let unavailable = || {
            AppointmentError::Conflict(ConflictReason::DoctorUnavailable {
                doctor_id: request.doctor_id,
                appointment_time: request.appointment_time,
            })
        };

        let availability = self
            .call_gateway(self.doctors.verify(request.doctor_id, request.appointment_time, request.duration_minutes))
            .await
            .map_err(|e| match e {
                GatewayError::NotFound => AppointmentError::NotFound(NotFoundKind::Doctor(request.doctor_id)),
                GatewayError::Conflict(message) => {
                    warn!("Doctor availability conflict: {}", message);
                    unavailable()
                }
                GatewayError::Unavailable(message) => {
                    warn!("Doctor availability gateway failed: {}", message);
                    AppointmentError::RemoteUnavailable { service: DOCTOR_SERVICE, message }
                }
            })?;

        if !availability.available {
            warn!("Doctor {} unavailable at {}", request.doctor_id, request.appointment_time);
            return Err(unavailable());
        }
        Ok(availability.auto_accept)
    }
}
