//! Entitlement resolution, access-request creation and password checkout.

use crate::config::ConflictDetection;
use crate::error::{LookupError, Result};
use crate::provider::SecretValue;
use crate::safeguard::client::{ApiResponse, ApplianceApi};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::debug;

const ACCESS_REQUEST_TYPE: &str = "Password";

/// Identifier of an appliance object. The appliance uses integers for
/// accounts and assets and strings for access requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceId {
    Number(u64),
    Text(String),
}

impl ResourceId {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Text(s) if s.trim().is_empty())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Entry of `Me/RequestEntitlements`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Entitlement {
    #[serde(default)]
    pub account: EntitlementAccount,
}

/// The account half of an entitlement.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EntitlementAccount {
    #[serde(default)]
    pub id: Option<ResourceId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub asset_id: Option<ResourceId>,
    #[serde(default)]
    pub asset_name: Option<String>,
    #[serde(default)]
    pub asset_network_address: Option<String>,
}

impl EntitlementAccount {
    /// Case-insensitive exact match on asset name or network address.
    pub fn matches_asset(&self, asset: &str) -> bool {
        let wanted = asset.to_lowercase();
        [&self.asset_name, &self.asset_network_address]
            .into_iter()
            .flatten()
            .any(|candidate| candidate.to_lowercase() == wanted)
    }
}

/// The account/asset pair a password can be requested for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntitlement {
    pub account_id: ResourceId,
    pub asset_id: ResourceId,
}

/// Lifecycle state of an access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum AccessRequestState {
    Created,
    RequestAvailable,
    PasswordCheckedOut,
    Expired,
    #[default]
    #[serde(other)]
    Other,
}

impl AccessRequestState {
    /// States in which a password can be checked out.
    pub fn allows_checkout(self) -> bool {
        matches!(self, Self::RequestAvailable | Self::PasswordCheckedOut)
    }
}

/// Entry of `AccessRequests`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccessRequest {
    pub id: ResourceId,
    #[serde(default)]
    pub account_asset_name: Option<String>,
    #[serde(default)]
    pub was_expired: bool,
    #[serde(default)]
    pub state: AccessRequestState,
}

impl AccessRequest {
    fn is_reusable_for(&self, asset: &str) -> bool {
        self.account_asset_name.as_deref() == Some(asset)
            && !self.was_expired
            && self.state.allows_checkout()
    }
}

/// Body of `POST AccessRequests`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NewAccessRequest<'a> {
    pub account_id: &'a ResourceId,
    pub asset_id: &'a ResourceId,
    pub access_request_type: &'static str,
    pub reason_comment: String,
}

/// Error document returned by the appliance.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Find the single entitlement for `asset`.
pub async fn resolve_entitlement<A: ApplianceApi + ?Sized>(
    api: &A,
    asset: &str,
) -> Result<ResolvedEntitlement> {
    // Filtering server-side by asset name returns nothing; search by term instead.
    let response = api
        .invoke(
            Method::GET,
            "Me/RequestEntitlements",
            &[("q", asset), ("accessRequestType", ACCESS_REQUEST_TYPE)],
            None,
        )
        .await?;
    if response.status != StatusCode::OK {
        return Err(LookupError::api(
            "obtaining entitlements",
            response.status.as_u16(),
            &response.body,
        ));
    }

    let entitlements: Vec<Entitlement> = response.json()?;
    let mut matches = entitlements
        .into_iter()
        .filter(|e| e.account.matches_asset(asset));

    let entitlement = match (matches.next(), matches.next()) {
        (None, _) => {
            return Err(LookupError::NotFound(format!(
                "Asset with name '{asset}' not found"
            )))
        }
        (Some(_), Some(_)) => {
            return Err(LookupError::AmbiguousMatch(format!(
                "Multiple entitlements found for '{asset}': {} matches",
                2 + matches.count()
            )))
        }
        (Some(e), None) => e,
    };

    let account = entitlement.account;
    match (account.id, account.asset_id) {
        (Some(account_id), Some(asset_id)) => {
            debug!(
                asset = %asset,
                account_id = %account_id,
                asset_id = %asset_id,
                "resolved entitlement"
            );
            Ok(ResolvedEntitlement {
                account_id,
                asset_id,
            })
        }
        _ => Err(LookupError::Decode(format!(
            "entitlement for '{asset}' has no account or asset id"
        ))),
    }
}

/// Whether a rejected create means a request already exists.
///
/// A structured error code wins; the message fragment is the fallback.
pub fn is_duplicate_request(conflict: &ConflictDetection, response: &ApiResponse) -> bool {
    if response.status != StatusCode::BAD_REQUEST {
        return false;
    }
    let error: ApiErrorBody = serde_json::from_str(&response.body).unwrap_or_default();
    if let Some(code) = error.code {
        if conflict.error_codes.contains(&code) {
            return true;
        }
    }
    !conflict.message_fragment.is_empty() && response.body.contains(&conflict.message_fragment)
}

/// Create a password request for `entitlement`, or reuse the one the
/// appliance says already exists.
pub async fn create_or_reuse_request<A: ApplianceApi + ?Sized>(
    api: &A,
    entitlement: &ResolvedEntitlement,
    asset: &str,
    conflict: &ConflictDetection,
) -> Result<ResourceId> {
    let request = NewAccessRequest {
        account_id: &entitlement.account_id,
        asset_id: &entitlement.asset_id,
        access_request_type: ACCESS_REQUEST_TYPE,
        reason_comment: format!("Lookup request for asset '{asset}'"),
    };
    let body = serde_json::to_value(&request)?;
    let response = api
        .invoke(Method::POST, "AccessRequests", &[], Some(&body))
        .await?;

    if response.status == StatusCode::CREATED {
        let created: AccessRequest = response.json()?;
        debug!(asset = %asset, request_id = %created.id, "created access request");
        return Ok(created.id);
    }

    if is_duplicate_request(conflict, &response) {
        debug!(asset = %asset, "access request already exists");
        return find_existing_request(api, asset).await;
    }

    Err(LookupError::request_creation(
        response.status.as_u16(),
        &response.body,
    ))
}

/// Locate the existing request for `asset` after a duplicate create.
pub async fn find_existing_request<A: ApplianceApi + ?Sized>(
    api: &A,
    asset: &str,
) -> Result<ResourceId> {
    let response = api
        .invoke(Method::GET, "AccessRequests", &[("q", asset)], None)
        .await?;
    if response.status != StatusCode::OK {
        return Err(LookupError::api(
            "obtaining access requests",
            response.status.as_u16(),
            &response.body,
        ));
    }
    let requests: Vec<AccessRequest> = response.json()?;
    select_request(&requests, asset)
}

/// Pick the request to check out from the candidates for `asset`.
pub fn select_request(requests: &[AccessRequest], asset: &str) -> Result<ResourceId> {
    match requests {
        [] => Err(LookupError::InconsistentState(format!(
            "Access request not found for '{asset}', but it should exist"
        ))),
        [only] => Ok(only.id.clone()),
        many => {
            debug!(
                asset = %asset,
                count = many.len(),
                "multiple access requests found, selecting by asset name and state"
            );
            many.iter()
                .find(|r| r.is_reusable_for(asset))
                .map(|r| r.id.clone())
                .ok_or_else(|| {
                    LookupError::AmbiguousMatch(format!(
                        "Multiple access requests found for '{asset}', but none matches \
                         the asset name in a checkout state without having expired"
                    ))
                })
        }
    }
}

/// Check out the password of an access request.
pub async fn check_out_password<A: ApplianceApi + ?Sized>(
    api: &A,
    request_id: &ResourceId,
) -> Result<SecretValue> {
    if request_id.is_empty() {
        return Err(LookupError::InconsistentState(
            "access request id is empty".to_string(),
        ));
    }
    let path = format!("AccessRequests/{request_id}/CheckOutPassword");
    let response = api.invoke(Method::POST, &path, &[], None).await?;
    if response.status != StatusCode::OK {
        return Err(LookupError::checkout(
            response.status.as_u16(),
            &response.body,
        ));
    }

    let secret = match response.json::<Value>()? {
        Value::String(password) => password,
        Value::Object(mut fields) => match fields
            .remove("password")
            .or_else(|| fields.remove("Password"))
        {
            Some(Value::String(password)) => password,
            _ => {
                return Err(LookupError::Decode(
                    "checkout response has no password field".to_string(),
                ))
            }
        },
        _ => {
            return Err(LookupError::Decode(
                "checkout response is not a password".to_string(),
            ))
        }
    };
    debug!(request_id = %request_id, "checked out password");
    Ok(SecretValue::from_string(secret))
}
