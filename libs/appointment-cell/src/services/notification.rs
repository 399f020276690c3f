// libs/appointment-cell/src/services/notification.rs
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::models::{Appointment, AppointmentStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_id: Uuid,
    pub subject: String,
    pub body: String,
    pub channel: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotificationError {
    #[error("Notification timed out after {0:?}")]
    Timeout(Duration),

    #[error("Notification rejected: {0}")]
    Rejected(String),

    #[error("Notification transport error: {0}")]
    Transport(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send(&self, message: &NotificationMessage) -> Result<(), NotificationError>;
}

/// Posts messages as JSON to an external notification endpoint.
pub struct HttpNotificationGateway {
    client: Client,
    url: String,
}

impl HttpNotificationGateway {
    pub fn new(config: &AppConfig) -> Self {
        let client = Client::builder()
            .timeout(config.notification_timeout)
            .build()
            .unwrap_or_default();

        Self {
            client,
            url: config.notification_url.clone(),
        }
    }
}

#[async_trait]
impl NotificationGateway for HttpNotificationGateway {
    async fn send(&self, message: &NotificationMessage) -> Result<(), NotificationError> {
        debug!("Posting notification for appointment {} to {}", message.appointment_id, self.url);

        let response = self.client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected(format!("HTTP {}: {}", status, text)));
        }
        Ok(())
    }
}

/// Used when no notification endpoint is configured.
pub struct LogNotificationGateway;

#[async_trait]
impl NotificationGateway for LogNotificationGateway {
    async fn send(&self, message: &NotificationMessage) -> Result<(), NotificationError> {
        info!(appointment_id = %message.appointment_id,
              patient_id = %message.patient_id,
              channel = %message.channel,
              "[notification] {}: {}", message.subject, message.body);
        Ok(())
    }
}

pub enum NotificationEvent<'a> {
    Created(&'a Appointment),
    Cancelled {
        appointment: &'a Appointment,
        reason: Option<&'a str>,
    },
    StatusChanged(&'a Appointment),
}

impl NotificationEvent<'_> {
    fn appointment(&self) -> &Appointment {
        match self {
            NotificationEvent::Created(appointment) => appointment,
            NotificationEvent::Cancelled { appointment, .. } => appointment,
            NotificationEvent::StatusChanged(appointment) => appointment,
        }
    }
}

/// Best-effort delivery after a mutation has committed.
///
/// `dispatch` never returns an error. Failures and timeouts are logged with the
/// appointment's identifiers and dropped; there is no retry.
pub struct NotificationDispatcher {
    gateway: Arc<dyn NotificationGateway>,
    channel: String,
    timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(gateway: Arc<dyn NotificationGateway>, channel: impl Into<String>, timeout: Duration) -> Self {
        Self {
            gateway,
            channel: channel.into(),
            timeout,
        }
    }

    pub fn compose(&self, event: &NotificationEvent<'_>) -> NotificationMessage {
        let appointment = event.appointment();
        let when = appointment.appointment_time.format("%Y-%m-%d %H:%M UTC");

        let (subject, body) = match event {
            NotificationEvent::Created(apt) if apt.status == AppointmentStatus::Confirmed => (
                "Appointment confirmed".to_string(),
                format!("Your appointment on {} is confirmed.", when),
            ),
            NotificationEvent::Created(_) => (
                "Appointment requested".to_string(),
                format!("Your appointment request for {} is pending doctor confirmation.", when),
            ),
            NotificationEvent::Cancelled { reason, .. } => cancelled_message(&when.to_string(), *reason),
            NotificationEvent::StatusChanged(apt) => match apt.status {
                AppointmentStatus::Confirmed => (
                    "Appointment confirmed".to_string(),
                    format!("Your appointment on {} has been confirmed by the clinic.", when),
                ),
                AppointmentStatus::Completed => (
                    "Appointment completed".to_string(),
                    format!("Your appointment on {} has been marked as completed.", when),
                ),
                AppointmentStatus::Cancelled => {
                    cancelled_message(&when.to_string(), apt.cancelled_reason.as_deref())
                }
                AppointmentStatus::Pending => (
                    "Appointment pending".to_string(),
                    format!("Your appointment on {} is awaiting confirmation.", when),
                ),
            },
        };

        NotificationMessage {
            patient_id: appointment.patient_id,
            doctor_id: appointment.doctor_id,
            appointment_id: appointment.id,
            subject,
            body,
            channel: self.channel.clone(),
        }
    }

    /// Returns whether the message was delivered.
    pub async fn dispatch(&self, event: NotificationEvent<'_>) -> bool {
        let message = self.compose(&event);

        let outcome = match tokio::time::timeout(self.timeout, self.gateway.send(&message)).await {
            Ok(result) => result,
            Err(_) => Err(NotificationError::Timeout(self.timeout)),
        };

        match outcome {
            Ok(()) => {
                debug!("Notification sent for appointment {}", message.appointment_id);
                true
            }
            Err(e) => {
                warn!(appointment_id = %message.appointment_id,
                      patient_id = %message.patient_id,
                      doctor_id = %message.doctor_id,
                      "Notification failed: {}", e);
                false
            }
        }
    }
}

fn cancelled_message(when: &str, reason: Option<&str>) -> (String, String) {
    let mut body = format!("Your appointment on {} has been cancelled.", when);
    if let Some(reason) = reason {
        body.push_str(&format!(" Reason: {}", reason));
    }
    ("Appointment cancelled".to_string(), body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn appointment(status: AppointmentStatus) -> Appointment {
        let at = Utc.with_ymd_and_hms(2025, 4, 1, 15, 0, 0).unwrap();
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            appointment_time: at,
            duration_minutes: 30,
            status,
            notes: None,
            cancelled_reason: None,
            created_at: at,
            updated_at: at,
        }
    }

    fn dispatcher(gateway: MockNotificationGateway) -> NotificationDispatcher {
        NotificationDispatcher::new(Arc::new(gateway), "SMS", Duration::from_millis(100))
    }

    #[test]
    fn test_compose_creation_phrasing() {
        let d = dispatcher(MockNotificationGateway::new());

        let confirmed = d.compose(&NotificationEvent::Created(&appointment(AppointmentStatus::Confirmed)));
        let pending = d.compose(&NotificationEvent::Created(&appointment(AppointmentStatus::Pending)));

        assert_eq!(confirmed.subject, "Appointment confirmed");
        assert!(confirmed.body.contains("2025-04-01 15:00 UTC"));
        assert_eq!(pending.subject, "Appointment requested");
        assert!(pending.body.contains("pending"));
        assert_eq!(pending.channel, "SMS");
    }

    #[test]
    fn test_compose_cancellation_reason_suffix() {
        let d = dispatcher(MockNotificationGateway::new());
        let apt = appointment(AppointmentStatus::Cancelled);

        let with_reason = d.compose(&NotificationEvent::Cancelled { appointment: &apt, reason: Some("Doctor ill") });
        let without = d.compose(&NotificationEvent::Cancelled { appointment: &apt, reason: None });

        assert!(with_reason.body.ends_with(" Reason: Doctor ill"));
        assert!(!without.body.contains("Reason"));
    }

    #[tokio::test]
    async fn test_dispatch_delivers_message() {
        let apt = appointment(AppointmentStatus::Completed);
        let expected_id = apt.id;
        let mut gateway = MockNotificationGateway::new();
        gateway
            .expect_send()
            .withf(move |m| m.appointment_id == expected_id && m.subject == "Appointment completed")
            .times(1)
            .returning(|_| Ok(()));

        assert!(dispatcher(gateway).dispatch(NotificationEvent::StatusChanged(&apt)).await);
    }

    #[tokio::test]
    async fn test_dispatch_swallows_gateway_error() {
        let mut gateway = MockNotificationGateway::new();
        gateway
            .expect_send()
            .times(1)
            .returning(|_| Err(NotificationError::Rejected("HTTP 500".into())));

        let apt = appointment(AppointmentStatus::Pending);
        assert!(!dispatcher(gateway).dispatch(NotificationEvent::Created(&apt)).await);
    }

    struct SlowGateway;

    #[async_trait]
    impl NotificationGateway for SlowGateway {
        async fn send(&self, _: &NotificationMessage) -> Result<(), NotificationError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatch_times_out() {
        let d = NotificationDispatcher::new(Arc::new(SlowGateway), "EMAIL", Duration::from_millis(20));
        let apt = appointment(AppointmentStatus::Confirmed);

        assert!(!d.dispatch(NotificationEvent::Created(&apt)).await);
    }
}
