use std::time::Duration;

use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use shared_config::AppConfig;

/// SQLSTATE raised by Postgres when a unique index rejects a row.
pub const UNIQUE_VIOLATION: &str = "23505";

#[derive(Error, Debug)]
pub enum SupabaseError {
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl SupabaseError {
    /// True when the database rejected the write on a unique constraint.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            SupabaseError::Api { status, code, .. } => {
                code.as_deref() == Some(UNIQUE_VIOLATION) || (*status == 409 && code.is_none())
            }
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            SupabaseError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for failures where the remote side could not be reached or answered 5xx.
    pub fn is_unavailable(&self) -> bool {
        match self {
            SupabaseError::Timeout | SupabaseError::Transport(_) => true,
            SupabaseError::Api { status, .. } => *status >= 500,
            SupabaseError::Decode(_) => false,
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SupabaseError::Timeout
        } else if err.is_decode() {
            SupabaseError::Decode(err.to_string())
        } else {
            SupabaseError::Transport(err.to_string())
        }
    }
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_timeout(config, config.gateway_timeout)
    }

    pub fn with_timeout(config: &AppConfig, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with timeout ({}), using defaults", e);
                Client::new()
            });

        Self {
            client,
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
            service_key: config.supabase_service_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Ok(value) = HeaderValue::from_str(&self.anon_key) {
            headers.insert("apikey", value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let bearer = auth_token.unwrap_or(&self.service_key);
        if !bearer.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", bearer)) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        headers
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T, SupabaseError>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let headers = self.get_headers(auth_token);

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await.map_err(SupabaseError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.map_err(SupabaseError::from_reqwest)?;
            error!("API error ({}): {}", status, error_text);
            return Err(Self::classify_error(status.as_u16(), &error_text));
        }

        response.json::<T>().await.map_err(SupabaseError::from_reqwest)
    }

    /// PostgREST reports database errors as `{"code": "...", "message": "..."}`.
    fn classify_error(status: u16, body: &str) -> SupabaseError {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let code = parsed.as_ref()
            .and_then(|v| v.get("code"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let message = parsed.as_ref()
            .and_then(|v| v.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string());

        SupabaseError::Api { status, code, message }
    }
}
