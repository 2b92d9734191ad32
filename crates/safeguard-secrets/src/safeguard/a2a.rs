//! Application-to-Application credential retrieval.

use crate::config::{ApplianceConfig, CertificateAuth};
use crate::error::{LookupError, Result};
use crate::provider::SecretValue;
use crate::safeguard::auth::load_identity;
use crate::safeguard::client::{build_http_client, send};
use reqwest::{header, Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info};

/// Client for the A2A service, authenticated by a client certificate.
///
/// Each credential is addressed by the API key of its A2A registration.
pub struct A2aClient {
    http: Client,
    config: ApplianceConfig,
}

impl A2aClient {
    pub fn new(config: &ApplianceConfig, auth: &CertificateAuth) -> Result<Self> {
        let identity = load_identity(auth)?;
        let http = build_http_client(config, Some(identity))?;
        info!(address = %config.address, "configured Safeguard A2A client");
        Ok(Self::with_http(http, config))
    }

    /// Wrap an already configured HTTP client.
    pub fn with_http(http: Client, config: &ApplianceConfig) -> Self {
        Self {
            http,
            config: config.clone(),
        }
    }

    /// Retrieve the password bound to `api_key`.
    pub async fn get_credential(&self, api_key: &str) -> Result<SecretValue> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(LookupError::Config("Missing credential API key.".to_string()));
        }

        let url = self.config.service_url("a2a", "Credentials")?;
        let request = self
            .http
            .get(url)
            .query(&[("type", "Password")])
            .header(header::AUTHORIZATION, format!("A2A {api_key}"))
            .header(header::ACCEPT, "application/json");
        let response = send(request).await?;

        if response.status != StatusCode::OK {
            return Err(LookupError::api(
                "retrieving the credential",
                response.status.as_u16(),
                &response.body,
            ));
        }

        match response.json::<Value>()? {
            Value::String(password) => {
                debug!("retrieved A2A credential");
                Ok(SecretValue::from_string(password))
            }
            _ => Err(LookupError::Decode(
                "A2A credential response is not a string".to_string(),
            )),
        }
    }

    /// Retrieve one credential per API key, in order.
    pub async fn get_credentials(&self, api_keys: &[String]) -> Result<Vec<SecretValue>> {
        let mut secrets = Vec::with_capacity(api_keys.len());
        for key in api_keys {
            secrets.push(self.get_credential(key).await?);
        }
        Ok(secrets)
    }
}
