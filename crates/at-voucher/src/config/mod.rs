use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::workflows::applications::DisabilityKind;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub program: ProgramConfig,
    pub inbound: InboundConfig,
    pub notifications: NotificationConfig,
    pub accounts: AccountsConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let defaults = ProgramConfig::default();
        let program = ProgramConfig {
            voucher_validity_months: read_var(
                "VOUCHER_VALIDITY_MONTHS",
                defaults.voucher_validity_months,
            )?,
            minimum_redemption_cents: read_var(
                "VOUCHER_MIN_REDEMPTION_CENTS",
                defaults.minimum_redemption_cents,
            )?,
            expiry_warning_days: read_var(
                "VOUCHER_EXPIRY_WARNING_DAYS",
                defaults.expiry_warning_days,
            )?,
            web_proof_limit_per_hour: read_var(
                "PROOF_WEB_LIMIT_PER_HOUR",
                defaults.web_proof_limit_per_hour,
            )?,
            email_proof_limit_per_hour: read_var(
                "PROOF_EMAIL_LIMIT_PER_HOUR",
                defaults.email_proof_limit_per_hour,
            )?,
            max_proof_rejections: read_var("PROOF_MAX_REJECTIONS", defaults.max_proof_rejections)?,
            fpl_base_cents: read_var("FPL_BASE_CENTS", defaults.fpl_base_cents)?,
            fpl_increment_cents: read_var("FPL_INCREMENT_CENTS", defaults.fpl_increment_cents)?,
            fpl_modifier_percent: read_var("FPL_MODIFIER_PERCENT", defaults.fpl_modifier_percent)?,
            password_reset_ttl_minutes: read_var(
                "PASSWORD_RESET_TTL_MINUTES",
                defaults.password_reset_ttl_minutes,
            )?,
            voucher_values_cents: defaults.voucher_values_cents,
        };

        let webhook_secret = match env::var("WEBHOOK_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ if environment == AppEnvironment::Production => {
                return Err(ConfigError::MissingWebhookSecret)
            }
            _ => "development-webhook-secret".to_string(),
        };

        let notifications = NotificationConfig {
            max_attempts: read_var("NOTIFICATION_MAX_ATTEMPTS", 3)?,
            retry_base_millis: read_var("NOTIFICATION_RETRY_BASE_MILLIS", 500)?,
        };

        let sweep_interval_secs = read_var("SWEEP_INTERVAL_SECS", 3_600)?;

        let bootstrap_admin_email = env::var("BOOTSTRAP_ADMIN_EMAIL")
            .ok()
            .map(|email| email.trim().to_string())
            .filter(|email| !email.is_empty());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            program,
            inbound: InboundConfig {
                webhook_secret,
                sweep_interval_secs,
            },
            notifications,
            accounts: AccountsConfig {
                bootstrap_admin_email,
            },
        })
    }
}

fn read_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Program rules: eligibility thresholds, voucher values, and proof limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramConfig {
    pub voucher_validity_months: u32,
    pub minimum_redemption_cents: u64,
    pub expiry_warning_days: i64,
    pub web_proof_limit_per_hour: usize,
    pub email_proof_limit_per_hour: usize,
    pub max_proof_rejections: u32,
    pub fpl_base_cents: u64,
    pub fpl_increment_cents: u64,
    pub fpl_modifier_percent: u64,
    pub password_reset_ttl_minutes: i64,
    pub voucher_values_cents: BTreeMap<DisabilityKind, u64>,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        let voucher_values_cents = BTreeMap::from([
            (DisabilityKind::Hearing, 500_000),
            (DisabilityKind::Vision, 500_000),
            (DisabilityKind::Speech, 400_000),
            (DisabilityKind::Mobility, 300_000),
            (DisabilityKind::Cognition, 300_000),
        ]);

        Self {
            voucher_validity_months: 6,
            minimum_redemption_cents: 1_000,
            expiry_warning_days: 30,
            web_proof_limit_per_hour: 5,
            email_proof_limit_per_hour: 10,
            max_proof_rejections: 8,
            fpl_base_cents: 1_506_000,
            fpl_increment_cents: 538_000,
            fpl_modifier_percent: 400,
            password_reset_ttl_minutes: 120,
            voucher_values_cents,
        }
    }
}

/// Shared secret and scheduling for inbound callbacks and periodic sweeps.
#[derive(Debug, Clone)]
pub struct InboundConfig {
    pub webhook_secret: String,
    pub sweep_interval_secs: u64,
}

/// Account provisioning for a freshly started service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountsConfig {
    /// Administrator created at startup when no account uses this address yet.
    pub bootstrap_admin_email: Option<String>,
}

/// Delivery retry policy for the notification worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationConfig {
    pub max_attempts: u32,
    pub retry_base_millis: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_base_millis: 500,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { name: &'static str, value: String },
    MissingWebhookSecret,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { name, value } => {
                write!(f, "{name} has an invalid value '{value}'")
            }
            ConfigError::MissingWebhookSecret => {
                write!(f, "WEBHOOK_SECRET must be set in production")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
