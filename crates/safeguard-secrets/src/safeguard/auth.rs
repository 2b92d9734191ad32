//! Appliance authentication and the authenticated session handle.

use crate::config::{ApplianceConfig, CertificateAuth, Credentials, PasswordAuth};
use crate::error::{excerpt, LookupError, Result};
use crate::safeguard::client::{build_http_client, send, ApiResponse, ApplianceApi};
use async_trait::async_trait;
use reqwest::{Client, Identity, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Token minted by the embedded secure token service.
#[derive(Deserialize)]
struct StsTokenResponse {
    access_token: String,
}

/// Reply to the STS token exchange at `Token/LoginResponse`.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LoginResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    user_token: Option<String>,
}

/// Load a client certificate and key into a TLS identity.
pub fn load_identity(auth: &CertificateAuth) -> Result<Identity> {
    let cert = std::fs::read(&auth.certificate_file).map_err(|e| {
        LookupError::Config(format!(
            "failed to read client certificate {:?}: {}",
            auth.certificate_file, e
        ))
    })?;
    let key = Zeroizing::new(std::fs::read(&auth.key_file).map_err(|e| {
        LookupError::Config(format!(
            "failed to read client key {:?}: {}",
            auth.key_file, e
        ))
    })?);

    let mut pem = Zeroizing::new(Vec::with_capacity(cert.len() + key.len() + 1));
    pem.extend_from_slice(&cert);
    pem.push(b'\n');
    pem.extend_from_slice(&key);

    debug!(path = ?auth.certificate_file, "loaded client certificate");
    Identity::from_pem(&pem)
        .map_err(|e| LookupError::Config(format!("invalid client certificate or key: {}", e)))
}

/// An authenticated connection to one appliance.
///
/// Owned by a single lookup and consumed by [`Session::logout`].
pub struct Session {
    http: Client,
    config: ApplianceConfig,
    user_token: Zeroizing<String>,
}

impl Session {
    /// Authenticate with whichever credentials were configured.
    pub async fn open(config: &ApplianceConfig, credentials: &Credentials) -> Result<Self> {
        match credentials {
            Credentials::Password(auth) => Self::connect_password(config, auth).await,
            Credentials::Certificate(auth) => Self::connect_certificate(config, auth).await,
        }
    }

    /// Authenticate with a username and password.
    pub async fn connect_password(config: &ApplianceConfig, auth: &PasswordAuth) -> Result<Self> {
        if auth.username.is_empty() {
            return Err(LookupError::Config("Missing authentication user name.".to_string()));
        }
        let http = build_http_client(config, None)?;
        let body = json!({
            "grant_type": "password",
            "username": auth.username,
            "password": auth.password,
            "scope": format!("rsts:sts:primaryproviderid:{}", auth.provider),
        });

        let session = Self::connect(http, config, &body).await?;
        info!(
            address = %config.address,
            username = %auth.username,
            "connected to Safeguard"
        );
        Ok(session)
    }

    /// Authenticate with a client certificate.
    pub async fn connect_certificate(
        config: &ApplianceConfig,
        auth: &CertificateAuth,
    ) -> Result<Self> {
        let identity = load_identity(auth)?;
        let http = build_http_client(config, Some(identity))?;
        let body = json!({
            "grant_type": "client_credentials",
            "scope": "rsts:sts:primaryproviderid:certificate",
        });

        let session = Self::connect(http, config, &body).await?;
        info!(address = %config.address, "connected to Safeguard with client certificate");
        Ok(session)
    }

    async fn connect(http: Client, config: &ApplianceConfig, sts_body: &Value) -> Result<Self> {
        let response = send(http.post(config.token_url()?).json(sts_body)).await?;
        if !response.status.is_success() {
            return Err(LookupError::Authentication(format!(
                "{} - {}",
                response.status.as_u16(),
                excerpt(&response.body)
            )));
        }
        let sts: StsTokenResponse = response.json().map_err(|_| {
            LookupError::Authentication("no access token in token service response".to_string())
        })?;
        let sts_token = Zeroizing::new(sts.access_token);

        let url = config.service_url("core", "Token/LoginResponse")?;
        let exchange = json!({ "StsAccessToken": sts_token.as_str() });
        let response = send(http.post(url).json(&exchange)).await?;
        if !response.status.is_success() {
            return Err(LookupError::Authentication(format!(
                "token exchange failed: {} - {}",
                response.status.as_u16(),
                excerpt(&response.body)
            )));
        }
        let login: LoginResponse = response.json()?;

        match (login.status.as_deref(), login.user_token) {
            (Some("Success") | None, Some(token)) if !token.is_empty() => Ok(Self {
                http,
                config: config.clone(),
                user_token: Zeroizing::new(token),
            }),
            (status, _) => Err(LookupError::Authentication(format!(
                "token exchange returned status {}",
                status.unwrap_or("<none>")
            ))),
        }
    }

    /// End the session on the appliance.
    ///
    /// A failed logout is logged and otherwise ignored.
    pub async fn logout(self) {
        match self.invoke(Method::POST, "Token/Logout", &[], None).await {
            Ok(response) if response.status.is_success() => {
                debug!(address = %self.config.address, "logged out of Safeguard");
            }
            Ok(response) => {
                warn!(
                    status = response.status.as_u16(),
                    "Safeguard logout rejected"
                );
            }
            Err(e) => {
                warn!(error = %e, "Safeguard logout failed");
            }
        }
    }

    pub fn config(&self) -> &ApplianceConfig {
        &self.config
    }
}

#[async_trait]
impl ApplianceApi for Session {
    async fn invoke(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<ApiResponse> {
        let url = self.config.service_url("core", path)?;
        let mut request = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(self.user_token.as_str())
            .header(reqwest::header::ACCEPT, "application/json");

        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(b) = body {
            request = request.json(b);
        }

        let response = send(request).await?;
        debug!(
            method = %method,
            path = %path,
            status = response.status.as_u16(),
            "appliance request completed"
        );
        if response.status == StatusCode::UNAUTHORIZED {
            return Err(LookupError::Authentication(format!(
                "session rejected by appliance: {}",
                excerpt(&response.body)
            )));
        }
        Ok(response)
    }
}
