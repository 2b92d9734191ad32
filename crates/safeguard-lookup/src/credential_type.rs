// SPDX-License-Identifier: Apache-2.0
//! AWX credential-type plugin inputs.

use safeguard_secrets::{A2aConnection, LookupError, Result};
use serde::Serialize;
use std::collections::HashMap;

pub const PLUGIN_NAME: &str = "SPP Credential Plugin";

pub const API_KEY: &str = "spp_api_key";
pub const APPLIANCE: &str = "spp_appliance";
pub const CERTIFICATE_PATH: &str = "spp_certificate_path";
pub const KEY_PATH: &str = "spp_key_path";

#[derive(Debug, Serialize)]
pub struct InputField {
    pub id: &'static str,
    pub label: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Inputs {
    pub fields: Vec<InputField>,
    pub metadata: Vec<InputField>,
    pub required: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct CredentialType {
    pub name: &'static str,
    pub inputs: Inputs,
}

/// The schema AWX renders for this credential type.
pub fn credential_type() -> CredentialType {
    let field = |id, label| InputField {
        id,
        label,
        kind: "string",
    };
    CredentialType {
        name: PLUGIN_NAME,
        inputs: Inputs {
            fields: vec![
                field(API_KEY, "Safeguard Credential API key"),
                field(APPLIANCE, "Safeguard Appliance IP or Host name"),
                field(CERTIFICATE_PATH, "Safeguard client certificate file path"),
                field(KEY_PATH, "Safeguard client key file path"),
            ],
            metadata: Vec::new(),
            required: vec![API_KEY, APPLIANCE, CERTIFICATE_PATH, KEY_PATH],
        },
    }
}

/// Check the plugin inputs and turn them into an API key and connection.
pub fn resolve_inputs(inputs: &HashMap<String, String>) -> Result<(String, A2aConnection)> {
    let get = |id: &str| {
        inputs
            .get(id)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    };

    let api_key = get(API_KEY)
        .ok_or_else(|| LookupError::Config("Missing credential API key.".to_string()))?;
    let appliance = get(APPLIANCE).ok_or_else(|| {
        LookupError::Config("Missing appliance IP address or host name.".to_string())
    })?;
    let certificate = get(CERTIFICATE_PATH).ok_or_else(|| {
        LookupError::Config("Missing client authentication certificate path.".to_string())
    })?;
    let key = get(KEY_PATH).ok_or_else(|| {
        LookupError::Config("Missing client authentication key path.".to_string())
    })?;

    Ok((
        api_key.to_string(),
        A2aConnection {
            spp_appliance: Some(appliance.to_string()),
            spp_certificate_file: Some(certificate.into()),
            spp_certificate_key: Some(key.into()),
            spp_tls_cert: None,
        },
    ))
}
