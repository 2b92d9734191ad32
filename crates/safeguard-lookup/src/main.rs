// SPDX-License-Identifier: Apache-2.0
use crate::config::{Args, Command, CredentialArgs, CredentialTypeArgs, LogFormat, OutputFormat};
use crate::credential_type::{credential_type, resolve_inputs};
use anyhow::{Context, Result};
use clap::Parser;
use safeguard_secrets::{A2aConnection, A2aLookup, CredentialSource, PasswordLookup, SecretValue};
use std::collections::HashMap;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_format)?;

    if let Command::CredentialType(CredentialTypeArgs { resolve: false, .. }) = &args.command {
        println!("{}", serde_json::to_string_pretty(&credential_type())?);
        return Ok(());
    }

    let secrets = fetch_secrets(&args.command).await?;
    print_secrets(args.output, &secrets)
}

fn init_logging(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_timer(UtcTime::rfc_3339())
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
    }
    Ok(())
}

/// Run the lookup named by `command`.
async fn fetch_secrets(command: &Command) -> Result<Vec<SecretValue>> {
    match command {
        Command::Password(args) => {
            let lookup = PasswordLookup::new(args.appliance_config(), args.credentials()?)
                .with_retry(args.retry())
                .with_conflict_detection(args.conflict_detection());
            let secret = lookup
                .fetch(&args.asset)
                .await
                .context("Error obtaining password")?;
            Ok(vec![secret])
        }
        Command::Credential(args) => {
            let lookup = a2a_lookup(args)?;
            info!(count = args.api_keys.len(), "retrieving A2A credentials");
            lookup
                .fetch_all(&args.api_keys)
                .await
                .context("Failed to retrieve the credential")
        }
        Command::CredentialType(args) => {
            let inputs: HashMap<String, String> = args.inputs.iter().cloned().collect();
            let (api_key, connection) = resolve_inputs(&inputs)?;
            let lookup = connect_a2a(&connection, args.insecure, None)?;
            let secret = lookup
                .fetch(&api_key)
                .await
                .context("Failed to retrieve the credential")?;
            Ok(vec![secret])
        }
    }
}

fn a2a_lookup(args: &CredentialArgs) -> Result<A2aLookup> {
    let connection = args.connection()?;
    connect_a2a(&connection, args.insecure, Some(args.timeout_ms))
}

fn connect_a2a(
    connection: &A2aConnection,
    insecure: bool,
    timeout_ms: Option<u64>,
) -> Result<A2aLookup> {
    let (mut appliance, auth) = connection.validate()?;
    appliance.insecure_skip_verify = insecure;
    if let Some(timeout_ms) = timeout_ms {
        appliance.timeout_ms = timeout_ms;
    }
    Ok(A2aLookup::new(&appliance, &auth)?)
}

fn print_secrets(format: OutputFormat, secrets: &[SecretValue]) -> Result<()> {
    let values = secrets
        .iter()
        .map(SecretValue::as_str)
        .collect::<safeguard_secrets::Result<Vec<&str>>>()?;
    match format {
        OutputFormat::Text => {
            for value in values {
                println!("{value}");
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string(&values)?),
    }
    Ok(())
}

mod config;
mod credential_type;
