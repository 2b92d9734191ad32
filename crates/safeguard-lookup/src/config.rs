// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use safeguard_secrets::{
    A2aConnection, ApplianceConfig, CertificateAuth, ConflictDetection, Credentials, PasswordAuth,
    RetryConfig,
};
use std::path::{Path, PathBuf};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// JSON structured logging for log aggregation.
    Json,
}

/// Secret output format on stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One secret per line.
    #[default]
    Text,
    /// A JSON array of strings.
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "safeguard-lookup",
    version,
    about = "Retrieve secrets from Safeguard for Privileged Passwords"
)]
pub struct Args {
    /// Log output format: text or json. Logs go to stderr; RUST_LOG sets the level.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    /// Secret output format: text or json.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check out an asset password through a privileged access request.
    Password(PasswordArgs),

    /// Retrieve A2A credentials by API key with a client certificate.
    Credential(CredentialArgs),

    /// Print the AWX credential-type input schema, or resolve a credential from its inputs.
    CredentialType(CredentialTypeArgs),
}

#[derive(clap::Args, Debug)]
pub struct PasswordArgs {
    /// Asset name or network address to get the password for.
    pub asset: String,

    /// Appliance IP address or host name.
    #[arg(long, env = "SPP_APPLIANCE")]
    pub appliance: String,

    /// Authentication user name.
    #[arg(long, env = "SPP_USERNAME")]
    pub username: Option<String>,

    /// Authentication password.
    #[arg(long, env = "SPP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Client certificate (PEM) to authenticate with instead of a password.
    #[arg(long, requires = "key")]
    pub cert: Option<PathBuf>,

    /// Private key (PEM) of the client certificate.
    #[arg(long, requires = "cert")]
    pub key: Option<PathBuf>,

    /// Identity provider used to authenticate the user.
    #[arg(long, default_value = "local")]
    pub provider: String,

    /// CA certificate (PEM) used to verify the appliance.
    #[arg(long)]
    pub ca_file: Option<PathBuf>,

    /// Accept any appliance TLS certificate.
    #[arg(long)]
    pub insecure: bool,

    /// Per-request timeout in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    pub timeout_ms: u64,

    /// Total attempts for the checkout sequence on transient failures (1 = no retry).
    #[arg(long, default_value_t = 2)]
    pub max_attempts: u32,

    /// Appliance error code that means an access request already exists (repeatable).
    #[arg(long, value_name = "CODE")]
    pub conflict_code: Vec<u64>,
}

impl PasswordArgs {
    pub fn appliance_config(&self) -> ApplianceConfig {
        ApplianceConfig {
            ca_file: self.ca_file.clone(),
            insecure_skip_verify: self.insecure,
            timeout_ms: self.timeout_ms,
            ..ApplianceConfig::new(self.appliance.clone())
        }
    }

    /// A certificate pair wins over a username and password.
    pub fn credentials(&self) -> Result<Credentials> {
        if let (Some(cert), Some(key)) = (self.cert.as_ref(), self.key.as_ref()) {
            return Ok(CertificateAuth {
                certificate_file: cert.clone(),
                key_file: key.clone(),
            }
            .into());
        }
        let username = self
            .username
            .clone()
            .context("Missing authentication user name.")?;
        let password = self
            .password
            .clone()
            .context("Missing authentication password.")?;
        Ok(PasswordAuth {
            provider: self.provider.clone(),
            ..PasswordAuth::new(username, password)
        }
        .into())
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            ..Default::default()
        }
    }

    pub fn conflict_detection(&self) -> ConflictDetection {
        ConflictDetection {
            error_codes: self.conflict_code.clone(),
            ..Default::default()
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct CredentialArgs {
    /// API keys of the credentials to retrieve.
    #[arg(required = true, value_name = "API_KEY")]
    pub api_keys: Vec<String>,

    /// JSON file with the a2aconnection mapping (spp_appliance, spp_certificate_file, ...).
    #[arg(long)]
    pub connection: Option<PathBuf>,

    /// Appliance IP address or host name; overrides the connection file.
    #[arg(long, env = "SPP_APPLIANCE")]
    pub appliance: Option<String>,

    /// A2A client authentication certificate (PEM).
    #[arg(long)]
    pub cert: Option<PathBuf>,

    /// A2A client authentication private key (PEM).
    #[arg(long)]
    pub key: Option<PathBuf>,

    /// TLS certificate (PEM) associated with the appliance.
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// Accept any appliance TLS certificate.
    #[arg(long)]
    pub insecure: bool,

    /// Per-request timeout in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    pub timeout_ms: u64,
}

impl CredentialArgs {
    /// The effective connection: the file if given, with flags taking precedence.
    pub fn connection(&self) -> Result<A2aConnection> {
        let mut connection = match self.connection.as_ref() {
            Some(path) => load_connection(path)?,
            None => A2aConnection::default(),
        };
        if let Some(appliance) = self.appliance.as_ref() {
            connection.spp_appliance = Some(appliance.clone());
        }
        if let Some(cert) = self.cert.as_ref() {
            connection.spp_certificate_file = Some(cert.clone());
        }
        if let Some(key) = self.key.as_ref() {
            connection.spp_certificate_key = Some(key.clone());
        }
        if let Some(tls_cert) = self.tls_cert.as_ref() {
            connection.spp_tls_cert = Some(tls_cert.clone());
        }
        Ok(connection)
    }
}

#[derive(clap::Args, Debug)]
pub struct CredentialTypeArgs {
    /// Resolve a credential from the given inputs instead of printing the schema.
    #[arg(long)]
    pub resolve: bool,

    /// Plugin input as id=value (repeatable), e.g. spp_api_key=...
    #[arg(long = "input", value_parser = parse_key_value, value_name = "ID=VALUE")]
    pub inputs: Vec<(String, String)>,

    /// Accept any appliance TLS certificate.
    #[arg(long)]
    pub insecure: bool,
}

/// Read an a2aconnection mapping from a JSON file.
pub fn load_connection(path: &Path) -> Result<A2aConnection> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read connection file {}", path.display()))?;
    serde_json::from_str(&data)
        .with_context(|| format!("failed to parse connection file {}", path.display()))
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| "expected id=value".to_string())?;
    if key.is_empty() {
        return Err("input id must not be empty".into());
    }
    Ok((key.to_string(), value.to_string()))
}
