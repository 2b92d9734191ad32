//! Safeguard for Privileged Passwords appliance integration.
//!
//! This module provides:
//! - Password and client-certificate authentication through the embedded token service
//! - The access-request workflow for on-demand asset password checkout
//! - A2A credential retrieval by API key

pub mod access_request;
mod a2a;
mod auth;
mod client;
mod workflow;

#[cfg(test)]
pub(crate) mod testing;

pub use a2a::A2aClient;
pub use auth::{load_identity, Session};
pub use client::{build_http_client, ApiResponse, ApplianceApi};
pub use workflow::{lookup_password, PasswordWorkflow, WorkflowState};

use crate::config::{ApplianceConfig, CertificateAuth, ConflictDetection, Credentials, RetryConfig};
use crate::error::Result;
use crate::provider::{CredentialSource, SecretValue};
use async_trait::async_trait;
use tracing::debug;

/// Asset password lookups through access requests.
///
/// Every fetch opens and closes its own session.
#[derive(Debug, Clone)]
pub struct PasswordLookup {
    appliance: ApplianceConfig,
    credentials: Credentials,
    retry: RetryConfig,
    conflict: ConflictDetection,
}

impl PasswordLookup {
    pub fn new(appliance: ApplianceConfig, credentials: impl Into<Credentials>) -> Self {
        Self {
            appliance,
            credentials: credentials.into(),
            retry: RetryConfig::default(),
            conflict: ConflictDetection::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_conflict_detection(mut self, conflict: ConflictDetection) -> Self {
        self.conflict = conflict;
        self
    }
}

#[async_trait]
impl CredentialSource for PasswordLookup {
    async fn fetch(&self, term: &str) -> Result<SecretValue> {
        lookup_password(
            &self.appliance,
            &self.credentials,
            term,
            &self.retry,
            &self.conflict,
        )
        .await
    }

    fn kind(&self) -> &'static str {
        "password"
    }
}

/// A2A credential lookups keyed by API key.
pub struct A2aLookup {
    client: A2aClient,
}

impl A2aLookup {
    pub fn new(appliance: &ApplianceConfig, auth: &CertificateAuth) -> Result<Self> {
        Ok(Self {
            client: A2aClient::new(appliance, auth)?,
        })
    }

    pub fn from_client(client: A2aClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CredentialSource for A2aLookup {
    async fn fetch(&self, term: &str) -> Result<SecretValue> {
        debug!("retrieving A2A credential");
        self.client.get_credential(term).await
    }

    async fn fetch_all(&self, terms: &[String]) -> Result<Vec<SecretValue>> {
        self.client.get_credentials(terms).await
    }

    fn kind(&self) -> &'static str {
        "a2a"
    }
}
