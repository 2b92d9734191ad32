//! Configuration structures for appliance access.

use crate::error::{LookupError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Connection settings for a Safeguard appliance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplianceConfig {
    /// Appliance host name or IP address, optionally with a scheme and port.
    pub address: String,

    /// Optional CA certificate file used to verify the appliance TLS certificate.
    #[serde(default)]
    pub ca_file: Option<PathBuf>,

    /// Accept any appliance TLS certificate.
    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Version segment of the service URLs (e.g. "v4").
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

impl ApplianceConfig {
    /// Create a configuration for the given appliance address with defaults.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    /// Base URL of the appliance, always without a trailing slash.
    ///
    /// A bare host is assumed to speak HTTPS.
    pub fn base_url(&self) -> Result<String> {
        let address = self.address.trim().trim_end_matches('/');
        if address.is_empty() {
            return Err(LookupError::Config(
                "Missing appliance IP address or host name.".to_string(),
            ));
        }
        if address.starts_with("https://") || address.starts_with("http://") {
            Ok(address.to_string())
        } else {
            Ok(format!("https://{address}"))
        }
    }

    /// URL of a service endpoint, e.g. `service_url("core", "Me/RequestEntitlements")`.
    pub fn service_url(&self, service: &str, path: &str) -> Result<String> {
        Ok(format!(
            "{}/service/{}/{}/{}",
            self.base_url()?,
            service,
            self.api_version,
            path.trim_start_matches('/')
        ))
    }

    /// URL of the embedded secure token service.
    pub fn token_url(&self) -> Result<String> {
        Ok(format!("{}/RSTS/oauth2/token", self.base_url()?))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ApplianceConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            ca_file: None,
            insecure_skip_verify: false,
            timeout_ms: default_timeout_ms(),
            api_version: default_api_version(),
        }
    }
}

/// Username/password authentication against an identity provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct PasswordAuth {
    pub username: String,

    pub password: String,

    /// Identity provider name used in the token scope.
    #[serde(default = "default_provider")]
    pub provider: String,
}

impl PasswordAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            provider: default_provider(),
        }
    }
}

impl std::fmt::Debug for PasswordAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("provider", &self.provider)
            .finish()
    }
}

/// Client certificate authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateAuth {
    /// Client certificate (PEM).
    pub certificate_file: PathBuf,

    /// Client private key (PEM).
    pub key_file: PathBuf,
}

/// How a session proves its identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Credentials {
    Password(PasswordAuth),
    Certificate(CertificateAuth),
}

impl From<PasswordAuth> for Credentials {
    fn from(auth: PasswordAuth) -> Self {
        Self::Password(auth)
    }
}

impl From<CertificateAuth> for Credentials {
    fn from(auth: CertificateAuth) -> Self {
        Self::Certificate(auth)
    }
}

/// Bounded retry policy for the password workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,

    #[serde(default = "default_max_elapsed_ms")]
    pub max_elapsed_ms: u64,
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_interval_ms: default_initial_interval_ms(),
            max_elapsed_ms: default_max_elapsed_ms(),
        }
    }
}

/// How a duplicate access-request create is recognised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictDetection {
    /// Appliance error codes meaning a request already exists.
    #[serde(default)]
    pub error_codes: Vec<u64>,

    /// Message fragment checked when no structured code matches.
    #[serde(default = "default_conflict_fragment")]
    pub message_fragment: String,
}

impl Default for ConflictDetection {
    fn default() -> Self {
        Self {
            error_codes: Vec::new(),
            message_fragment: default_conflict_fragment(),
        }
    }
}

/// The `a2aconnection` mapping used by A2A credential lookups.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct A2aConnection {
    #[serde(default)]
    pub spp_appliance: Option<String>,

    #[serde(default)]
    pub spp_certificate_file: Option<PathBuf>,

    #[serde(default)]
    pub spp_certificate_key: Option<PathBuf>,

    /// Optional TLS certificate of the appliance.
    #[serde(default)]
    pub spp_tls_cert: Option<PathBuf>,
}

impl A2aConnection {
    /// Check required keys and split into appliance and certificate settings.
    pub fn validate(&self) -> Result<(ApplianceConfig, CertificateAuth)> {
        let appliance = non_empty(self.spp_appliance.as_deref()).ok_or_else(|| {
            LookupError::Config("Missing appliance IP address or host name.".to_string())
        })?;
        let certificate_file = self
            .spp_certificate_file
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| {
                LookupError::Config("Missing client authentication certificate path.".to_string())
            })?;
        let key_file = self
            .spp_certificate_key
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| {
                LookupError::Config("Missing client authentication key path.".to_string())
            })?;

        let appliance = ApplianceConfig {
            ca_file: self.spp_tls_cert.clone(),
            ..ApplianceConfig::new(appliance)
        };
        Ok((
            appliance,
            CertificateAuth {
                certificate_file,
                key_file,
            },
        ))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// Default value functions for serde
fn default_timeout_ms() -> u64 {
    30_000
}

fn default_api_version() -> String {
    "v4".to_string()
}

fn default_provider() -> String {
    "local".to_string()
}

fn default_max_attempts() -> u32 {
    2
}

fn default_initial_interval_ms() -> u64 {
    500
}

fn default_max_elapsed_ms() -> u64 {
    10_000
}

fn default_conflict_fragment() -> String {
    "You already have a request for the account".to_string()
}
