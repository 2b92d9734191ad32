//! The password checkout workflow: resolve, request, check out.

use crate::config::{ApplianceConfig, ConflictDetection, Credentials, RetryConfig};
use crate::error::{LookupError, Result};
use crate::provider::SecretValue;
use crate::safeguard::access_request::{
    check_out_password, create_or_reuse_request, resolve_entitlement,
};
use crate::safeguard::auth::Session;
use crate::safeguard::client::ApplianceApi;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::time::Duration;
use tracing::{debug, warn};

/// Where a workflow run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkflowState {
    #[default]
    Unauthenticated,
    Authenticated,
    EntitlementResolved,
    RequestReady,
    CheckedOut,
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::CheckedOut | Self::Failed)
    }

    /// Whether `next` directly follows `self`.
    ///
    /// Any live state may fail. A retry rewinds a live state to `Authenticated`.
    pub fn can_advance_to(self, next: WorkflowState) -> bool {
        use WorkflowState::*;
        match (self, next) {
            (CheckedOut | Failed, _) => false,
            (_, Failed) => true,
            (Unauthenticated, Authenticated)
            | (Authenticated, EntitlementResolved)
            | (EntitlementResolved, RequestReady)
            | (RequestReady, CheckedOut) => true,
            (Authenticated | EntitlementResolved | RequestReady, Authenticated) => true,
            _ => false,
        }
    }
}

/// Drives one asset's checkout over an authenticated session.
pub struct PasswordWorkflow<'a, A: ApplianceApi + ?Sized> {
    api: &'a A,
    retry: &'a RetryConfig,
    conflict: &'a ConflictDetection,
    state: WorkflowState,
    attempts: u32,
}

impl<'a, A: ApplianceApi + ?Sized> PasswordWorkflow<'a, A> {
    /// Start a workflow over a session that is already authenticated.
    pub fn new(api: &'a A, retry: &'a RetryConfig, conflict: &'a ConflictDetection) -> Self {
        Self {
            api,
            retry,
            conflict,
            state: WorkflowState::Authenticated,
            attempts: 0,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Run to completion, retrying the whole sequence on transient failures.
    pub async fn run(&mut self, asset: &str) -> Result<SecretValue> {
        let max_attempts = self.retry.max_attempts.max(1);
        let initial_interval = Duration::from_millis(self.retry.initial_interval_ms);
        let mut backoff = ExponentialBackoff {
            current_interval: initial_interval,
            initial_interval,
            max_elapsed_time: Some(Duration::from_millis(self.retry.max_elapsed_ms)),
            ..Default::default()
        };

        loop {
            self.attempts += 1;
            let err = match self.attempt(asset).await {
                Ok(secret) => return Ok(secret),
                Err(e) => e,
            };

            if self.attempts >= max_attempts || !err.is_transient() {
                self.advance(WorkflowState::Failed)?;
                return Err(err);
            }

            match backoff.next_backoff() {
                Some(delay) => {
                    warn!(
                        error = %err,
                        asset = %asset,
                        attempt = self.attempts,
                        delay_ms = delay.as_millis() as u64,
                        "retrying password checkout after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    self.advance(WorkflowState::Authenticated)?;
                }
                None => {
                    self.advance(WorkflowState::Failed)?;
                    return Err(err);
                }
            }
        }
    }

    async fn attempt(&mut self, asset: &str) -> Result<SecretValue> {
        let entitlement = resolve_entitlement(self.api, asset).await?;
        self.advance(WorkflowState::EntitlementResolved)?;

        let request_id =
            create_or_reuse_request(self.api, &entitlement, asset, self.conflict).await?;
        self.advance(WorkflowState::RequestReady)?;

        let secret = check_out_password(self.api, &request_id).await?;
        self.advance(WorkflowState::CheckedOut)?;
        Ok(secret)
    }

    fn advance(&mut self, next: WorkflowState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(LookupError::InconsistentState(format!(
                "illegal workflow transition {:?} -> {:?}",
                self.state, next
            )));
        }
        debug!(from = ?self.state, to = ?next, "workflow transition");
        self.state = next;
        Ok(())
    }
}

/// Check out the password for `asset` using a fresh session.
///
/// The session is logged out whatever the outcome.
pub async fn lookup_password(
    config: &ApplianceConfig,
    credentials: &Credentials,
    asset: &str,
    retry: &RetryConfig,
    conflict: &ConflictDetection,
) -> Result<SecretValue> {
    if asset.trim().is_empty() {
        return Err(LookupError::Config("Missing asset name.".to_string()));
    }
    debug!(
        address = %config.address,
        asset = %asset,
        "connecting to Safeguard to request password"
    );
    let session = Session::open(config, credentials).await?;

    let result = PasswordWorkflow::new(&session, retry, conflict)
        .run(asset)
        .await;
    session.logout().await;
    result
}
