use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, http::Request};

use shared_config::{AppConfig, StoreBackend};
use shared_models::auth::Requester;

use crate::extractor::{REQUESTER_ID_HEADER, REQUESTER_ROLE_HEADER};

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_key: String,
    pub cancellation_cutoff_hours: i64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            supabase_service_key: "test-service-key".to_string(),
            cancellation_cutoff_hours: 24,
        }
    }
}

impl TestConfig {
    /// Points every remote collaborator at one mock server.
    pub fn for_mock_server(uri: &str) -> Self {
        Self {
            supabase_url: uri.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_service_key: self.supabase_service_key.clone(),
            store_backend: StoreBackend::Memory,
            cancellation_cutoff_hours: self.cancellation_cutoff_hours,
            gateway_timeout: Duration::from_millis(250),
            notification_url: format!("{}/notifications", self.supabase_url),
            notification_timeout: Duration::from_millis(250),
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestRequester;

impl TestRequester {
    pub fn patient(id: impl ToString) -> Requester {
        Requester::patient(id)
    }

    pub fn doctor(id: impl ToString) -> Requester {
        Requester::doctor(id)
    }

    pub fn admin() -> Requester {
        Requester::admin("admin-1")
    }

    pub fn system() -> Requester {
        Requester::system()
    }
}

/// Builds a request carrying the principal headers the requester middleware expects.
pub fn request_as(
    requester: &Requester,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(REQUESTER_ID_HEADER, requester.id.as_str())
        .header(REQUESTER_ROLE_HEADER, requester.role.as_str());

    let built = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    };

    built.unwrap_or_else(|e| panic!("invalid test request {} {}: {}", method, uri, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_uses_memory_store() {
        let config = TestConfig::for_mock_server("http://127.0.0.1:9999").to_app_config();

        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.notification_url, "http://127.0.0.1:9999/notifications");
    }

    #[test]
    fn test_request_as_sets_headers() {
        let request = request_as(&TestRequester::admin(), "GET", "/appointments", None);

        assert_eq!(request.headers()[REQUESTER_ROLE_HEADER], "ADMIN");
        assert_eq!(request.headers()[REQUESTER_ID_HEADER], "admin-1");
    }
}
