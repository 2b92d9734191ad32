//! CredentialSource trait and the secret value type.

use crate::error::{LookupError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A secret returned by the appliance.
///
/// The bytes are wiped on drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretValue {
    data: Vec<u8>,
}

impl SecretValue {
    /// Create a new secret value from bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Create a secret value from a string.
    pub fn from_string(s: String) -> Self {
        Self::new(s.into_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Get the secret as a string (UTF-8).
    pub fn as_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.data)
            .map_err(|e| LookupError::Decode(format!("secret is not valid UTF-8: {}", e)))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretValue")
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}

/// A source that turns a lookup term into a secret.
///
/// The term is an asset name for password lookups and an API key for A2A
/// credential lookups.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn fetch(&self, term: &str) -> Result<SecretValue>;

    /// Fetch every term in order, stopping at the first failure.
    async fn fetch_all(&self, terms: &[String]) -> Result<Vec<SecretValue>> {
        let mut secrets = Vec::with_capacity(terms.len());
        for term in terms {
            secrets.push(self.fetch(term).await?);
        }
        Ok(secrets)
    }

    /// Short name used in logs.
    fn kind(&self) -> &'static str;
}

#[async_trait]
impl<T: CredentialSource + ?Sized> CredentialSource for Arc<T> {
    async fn fetch(&self, term: &str) -> Result<SecretValue> {
        (**self).fetch(term).await
    }

    fn kind(&self) -> &'static str {
        (**self).kind()
    }
}
