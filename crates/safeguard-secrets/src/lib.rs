//! Secret retrieval from One Identity Safeguard for Privileged Passwords.
//!
//! Two lookups are provided:
//! - Asset passwords, checked out through a privileged access request on
//!   behalf of a password or client-certificate identity
//! - A2A credentials, retrieved by API key with a client certificate
//!
//! # Example
//!
//! ```no_run
//! use safeguard_secrets::{ApplianceConfig, CredentialSource, PasswordAuth, PasswordLookup};
//!
//! # async fn example() -> safeguard_secrets::Result<()> {
//! let lookup = PasswordLookup::new(
//!     ApplianceConfig::new("spp.example.com"),
//!     PasswordAuth::new("ansible", "hunter2"),
//! );
//! let password = lookup.fetch("web01").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod provider;
pub mod safeguard;

// Re-exports for convenience
pub use config::{
    A2aConnection, ApplianceConfig, CertificateAuth, ConflictDetection, Credentials, PasswordAuth,
    RetryConfig,
};
pub use error::{LookupError, Result};
pub use provider::{CredentialSource, SecretValue};
pub use safeguard::{
    lookup_password, A2aClient, A2aLookup, PasswordLookup, PasswordWorkflow, Session,
    WorkflowState,
};
