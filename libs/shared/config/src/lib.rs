use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Upper bound for `CANCELLATION_CUTOFF_HOURS`: one year.
pub const MAX_CANCELLATION_CUTOFF_HOURS: i64 = 24 * 366;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Supabase,
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_key: String,
    pub store_backend: StoreBackend,
    pub cancellation_cutoff_hours: i64,
    pub gateway_timeout: Duration,
    pub notification_url: String,
    pub notification_timeout: Duration,
    pub notification_channel: String,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_key: String::new(),
            store_backend: StoreBackend::Supabase,
            cancellation_cutoff_hours: 24,
            gateway_timeout: Duration::from_millis(3000),
            notification_url: String::new(),
            notification_timeout: Duration::from_millis(2000),
            notification_channel: "EMAIL".to_string(),
            port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let store_backend = match env::var("APPOINTMENT_STORE")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str()
        {
            "memory" => StoreBackend::Memory,
            "" | "supabase" => StoreBackend::Supabase,
            other => {
                warn!("Unknown APPOINTMENT_STORE '{}', using supabase", other);
                StoreBackend::Supabase
            }
        };

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            store_backend,
            cancellation_cutoff_hours: cutoff_in_range(
                parse_or("CANCELLATION_CUTOFF_HOURS", defaults.cancellation_cutoff_hours),
                defaults.cancellation_cutoff_hours,
            ),
            gateway_timeout: Duration::from_millis(
                parse_or("GATEWAY_TIMEOUT_MS", defaults.gateway_timeout.as_millis() as u64),
            ),
            notification_url: env::var("NOTIFICATION_URL")
                .unwrap_or_else(|_| {
                    warn!("NOTIFICATION_URL not set, notifications will only be logged");
                    String::new()
                }),
            notification_timeout: Duration::from_millis(
                parse_or("NOTIFICATION_TIMEOUT_MS", defaults.notification_timeout.as_millis() as u64),
            ),
            notification_channel: env::var("NOTIFICATION_CHANNEL")
                .unwrap_or(defaults.notification_channel),
            port: parse_or("PORT", defaults.port),
        };

        if config.store_backend == StoreBackend::Supabase && !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_service_key.is_empty()
    }

    pub fn is_notification_configured(&self) -> bool {
        !self.notification_url.is_empty()
    }
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

fn cutoff_in_range(hours: i64, default: i64) -> i64 {
    if (0..=MAX_CANCELLATION_CUTOFF_HOURS).contains(&hours) {
        hours
    } else {
        warn!(
            "CANCELLATION_CUTOFF_HOURS must be within 0..={}, got {}; using default {}",
            MAX_CANCELLATION_CUTOFF_HOURS, hours, default
        );
        default
    }
}
