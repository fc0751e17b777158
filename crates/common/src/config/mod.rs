//! Configuration management for MentorHub services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml)
//! - Default values
//!
//! The payment, scheduling and sweeper sections are handed to the
//! components that need them at construction time.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::db::models::PaymentMode;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Payment configuration
    #[serde(default)]
    pub payments: PaymentsConfig,

    /// Scheduling rules
    #[serde(default)]
    pub scheduling: SchedulingConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Allowed CORS origins (empty means any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,

    /// Read replica URL (optional)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Give up connecting after this many seconds of retries
    #[serde(default = "default_connect_retry_budget")]
    pub connect_retry_budget_secs: u64,

    /// Run pending migrations on startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Shared secret of the identity service's HS256 tokens
    pub jwt_secret: Option<String>,

    /// Allowed clock skew when validating `exp`
    #[serde(default = "default_jwt_leeway")]
    pub jwt_leeway_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentsConfig {
    /// Mode used when a booking request does not name one
    #[serde(default = "default_payment_mode")]
    pub mode: PaymentMode,

    /// ISO currency code for every session
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Price used when neither the profile nor the user record sets one
    #[serde(default = "default_session_price")]
    pub default_session_price: f64,

    /// Minutes a student has to submit manual payment proof
    #[serde(default = "default_manual_window")]
    pub manual_window_minutes: i64,

    /// UPI identifier shown in manual payment instructions
    #[serde(default)]
    pub upi_id: String,

    /// QR image shown in manual payment instructions
    #[serde(default)]
    pub qr_image_url: String,

    /// Online gateway settings
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Gateway provider: razorpay, mock
    #[serde(default = "default_gateway_provider")]
    pub provider: String,

    /// Public key id handed to the checkout client
    pub key_id: Option<String>,

    /// Secret used for API auth and signature verification
    pub key_secret: Option<String>,

    /// API base URL
    #[serde(default = "default_gateway_api_base")]
    pub api_base: String,

    /// Request timeout in seconds
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
}

/// How booking conflicts are detected
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictMode {
    /// Same mentor, same `scheduled_start`
    Exact,
    /// Same mentor, intersecting `[start, start + duration)` intervals
    Overlap,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulingConfig {
    /// Days covered by the upcoming-slot projection
    #[serde(default = "default_window_days")]
    pub window_days: u32,

    /// Students may not cancel closer than this to the start
    #[serde(default = "default_cancel_cutoff")]
    pub student_cancel_cutoff_minutes: i64,

    /// Durations accepted for rules and bookings
    #[serde(default = "default_allowed_durations")]
    pub allowed_durations: Vec<u32>,

    /// Conflict detection strategy
    #[serde(default = "default_conflict_mode")]
    pub conflict_mode: ConflictMode,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log filter (RUST_LOG syntax)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_connect_retry_budget() -> u64 { 60 }
fn default_run_migrations() -> bool { true }
fn default_jwt_leeway() -> u64 { 30 }
fn default_payment_mode() -> PaymentMode { PaymentMode::Manual }
fn default_currency() -> String { "INR".to_string() }
fn default_session_price() -> f64 { 499.0 }
fn default_manual_window() -> i64 { 30 }
fn default_gateway_provider() -> String { "razorpay".to_string() }
fn default_gateway_api_base() -> String { "https://api.razorpay.com/v1".to_string() }
fn default_gateway_timeout() -> u64 { 15 }
fn default_window_days() -> u32 { 7 }
fn default_cancel_cutoff() -> i64 { 120 }
fn default_allowed_durations() -> Vec<u32> { vec![30, 60] }
fn default_conflict_mode() -> ConflictMode { ConflictMode::Exact }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "mentorhub-gateway".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_enabled() -> bool { true }

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_leeway_secs: default_jwt_leeway(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            provider: default_gateway_provider(),
            key_id: None,
            key_secret: None,
            api_base: default_gateway_api_base(),
            timeout_secs: default_gateway_timeout(),
        }
    }
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            mode: default_payment_mode(),
            currency: default_currency(),
            default_session_price: default_session_price(),
            manual_window_minutes: default_manual_window(),
            upi_id: String::new(),
            qr_image_url: String::new(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            student_cancel_cutoff_minutes: default_cancel_cutoff(),
            allowed_durations: default_allowed_durations(),
            conflict_mode: default_conflict_mode(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl PaymentsConfig {
    /// Manual payment window as a chrono duration
    pub fn manual_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.manual_window_minutes)
    }
}

impl SchedulingConfig {
    /// Whether a duration is one of the accepted session lengths
    pub fn allows_duration(&self, minutes: u32) -> bool {
        self.allowed_durations.contains(&minutes)
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__PAYMENTS__MANUAL_WINDOW_MINUTES=45
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        let config: Self = config.try_deserialize()?;
        config.check()?;
        Ok(config)
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.check()?;
        Ok(config)
    }

    /// Reject settings that would make the booking flow misbehave
    fn check(&self) -> Result<(), ConfigError> {
        if self.payments.manual_window_minutes <= 0 {
            return Err(ConfigError::Message(
                "payments.manual_window_minutes must be positive".to_string(),
            ));
        }
        if self.payments.default_session_price <= 0.0 {
            return Err(ConfigError::Message(
                "payments.default_session_price must be positive".to_string(),
            ));
        }
        if self.scheduling.allowed_durations.iter().any(|d| *d == 0) {
            return Err(ConfigError::Message(
                "scheduling.allowed_durations must not contain 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
                cors_origins: Vec::new(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/mentorhub".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
                connect_retry_budget_secs: default_connect_retry_budget(),
                run_migrations: default_run_migrations(),
            },
            auth: AuthConfig::default(),
            payments: PaymentsConfig::default(),
            scheduling: SchedulingConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}
