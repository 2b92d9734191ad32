//! HTTP plumbing shared by every appliance service.

use crate::config::ApplianceConfig;
use crate::error::{LookupError, Result};
use async_trait::async_trait;
use reqwest::{Certificate, Client, ClientBuilder, Identity, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

/// Status and raw body of an appliance reply.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            LookupError::Decode(format!("{} (status {})", e, self.status.as_u16()))
        })
    }
}

/// Authenticated access to the core service of an appliance.
///
/// `path` is relative to the core service root, e.g. `"Me/RequestEntitlements"`.
#[async_trait]
pub trait ApplianceApi: Send + Sync {
    async fn invoke(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<ApiResponse>;
}

/// Build an HTTP client honouring the appliance TLS and timeout settings.
pub fn build_http_client(config: &ApplianceConfig, identity: Option<Identity>) -> Result<Client> {
    let mut builder = ClientBuilder::new()
        .timeout(config.timeout())
        .pool_max_idle_per_host(1);

    if let Some(ref ca_path) = config.ca_file {
        let ca_cert = std::fs::read(ca_path).map_err(|e| {
            LookupError::Config(format!("failed to read CA file {:?}: {}", ca_path, e))
        })?;
        let cert = Certificate::from_pem(&ca_cert).map_err(|e| {
            LookupError::Config(format!("failed to parse CA certificate {:?}: {}", ca_path, e))
        })?;
        builder = builder.add_root_certificate(cert);
    }

    if config.insecure_skip_verify {
        debug!(address = %config.address, "appliance TLS verification disabled");
        builder = builder.danger_accept_invalid_certs(true);
    }

    if let Some(identity) = identity {
        builder = builder.identity(identity);
    }

    builder
        .build()
        .map_err(|e| LookupError::Config(format!("failed to build HTTP client: {}", e)))
}

/// Read the whole reply, turning send and read failures into transport errors.
pub(crate) async fn send(request: reqwest::RequestBuilder) -> Result<ApiResponse> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;
    Ok(ApiResponse { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_json() {
        let response = ApiResponse::new(StatusCode::OK, r#"[{"Id": 1}]"#);
        let parsed: Vec<serde_json::Value> = response.json().unwrap();
        assert_eq!(parsed.len(), 1);

        let response = ApiResponse::new(StatusCode::OK, "not json");
        let err = response.json::<Vec<serde_json::Value>>().unwrap_err();
        assert!(matches!(err, LookupError::Decode(_)));
    }

    #[test]
    fn test_build_client_missing_ca_file() {
        let config = ApplianceConfig {
            ca_file: Some("/nonexistent/ca.pem".into()),
            ..ApplianceConfig::new("spp.example.com")
        };
        let err = build_http_client(&config, None).unwrap_err();
        assert!(err.to_string().contains("failed to read CA file"));
    }

    #[test]
    fn test_build_client_insecure() {
        let config = ApplianceConfig {
            insecure_skip_verify: true,
            ..ApplianceConfig::new("spp.example.com")
        };
        assert!(build_http_client(&config, None).is_ok());
    }
}
