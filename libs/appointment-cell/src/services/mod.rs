pub mod audit;
pub mod booking;
pub mod clock;
pub mod conflict;
pub mod gateways;
pub mod lifecycle;
pub mod notification;
pub mod store;
pub mod supabase_store;

pub use audit::AuditTrail;
pub use booking::{AppointmentService, Collaborators};
pub use clock::{Clock, FixedClock, SystemClock};
pub use conflict::ConflictResolver;
pub use gateways::{
    DoctorAvailability, DoctorAvailabilityGateway, GatewayError, PatientGateway, PatientVerification,
    SupabaseDoctorAvailabilityGateway, SupabasePatientGateway,
};
pub use lifecycle::LifecycleStateMachine;
pub use notification::{
    HttpNotificationGateway, LogNotificationGateway, NotificationDispatcher, NotificationError,
    NotificationEvent, NotificationGateway, NotificationMessage,
};
pub use store::{AppointmentStore, InMemoryAppointmentStore, StoreError};
pub use supabase_store::SupabaseAppointmentStore;
