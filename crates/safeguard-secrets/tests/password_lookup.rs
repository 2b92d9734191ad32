use safeguard_secrets::{
    lookup_password, ApplianceConfig, ConflictDetection, CredentialSource, Credentials,
    LookupError, PasswordAuth, PasswordLookup, RetryConfig,
};
use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CORE: &str = "/service/core/v4";

async fn mock_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/RSTS/oauth2/token"))
        .and(body_json(json!({
            "grant_type": "password",
            "username": "ansible",
            "password": "hunter2",
            "scope": "rsts:sts:primaryproviderid:local"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "sts-token",
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{CORE}/Token/LoginResponse")))
        .and(body_json(json!({"StsAccessToken": "sts-token"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Status": "Success",
            "UserToken": "user-token"
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{CORE}/Token/Logout")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(server)
        .await;
}

async fn mock_entitlements(server: &MockServer, asset: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("{CORE}/Me/RequestEntitlements")))
        .and(query_param("q", asset))
        .and(query_param("accessRequestType", "Password"))
        .and(header("Authorization", "Bearer user-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

fn entitlement(account_id: u64, asset_id: u64, asset: &str) -> serde_json::Value {
    json!({
        "Account": {
            "Id": account_id,
            "Name": "root",
            "AssetId": asset_id,
            "AssetName": asset,
            "AssetNetworkAddress": format!("{asset}.example.com")
        }
    })
}

fn config(server: &MockServer) -> ApplianceConfig {
    ApplianceConfig::new(server.uri())
}

fn auth() -> Credentials {
    PasswordAuth::new("ansible", "hunter2").into()
}

#[tokio::test]
async fn creates_request_and_checks_out_password() {
    let server = MockServer::start().await;
    mock_login(&server).await;
    mock_entitlements(&server, "web01", json!([entitlement(7, 3, "web01")])).await;

    Mock::given(method("POST"))
        .and(path(format!("{CORE}/AccessRequests")))
        .and(body_partial_json(json!({
            "AccountId": 7,
            "AssetId": 3,
            "AccessRequestType": "Password"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "Id": "42",
            "State": "RequestAvailable"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{CORE}/AccessRequests/42/CheckOutPassword")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"password": "S3cr3t"})))
        .expect(1)
        .mount(&server)
        .await;

    let secret = lookup_password(
        &config(&server),
        &auth(),
        "web01",
        &RetryConfig::default(),
        &ConflictDetection::default(),
    )
    .await
    .unwrap();
    assert_eq!(secret.as_str().unwrap(), "S3cr3t");
}

#[tokio::test]
async fn reuses_existing_request_after_conflict() {
    let server = MockServer::start().await;
    mock_login(&server).await;
    mock_entitlements(&server, "web01", json!([entitlement(7, 3, "web01")])).await;

    Mock::given(method("POST"))
        .and(path(format!("{CORE}/AccessRequests")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "Code": 60000,
            "Message": "You already have a request for the account root on asset web01."
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{CORE}/AccessRequests")))
        .and(query_param("q", "web01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "Id": "41",
                "AccountAssetName": "web01-standby",
                "WasExpired": false,
                "State": "RequestAvailable"
            },
            {
                "Id": "43",
                "AccountAssetName": "web01",
                "WasExpired": false,
                "State": "RequestAvailable"
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{CORE}/AccessRequests/43/CheckOutPassword")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("S3cr3t")))
        .expect(1)
        .mount(&server)
        .await;

    let lookup = PasswordLookup::new(config(&server), auth());
    let secret = lookup.fetch("web01").await.unwrap();
    assert_eq!(secret.as_str().unwrap(), "S3cr3t");
}

#[tokio::test]
async fn missing_entitlement_stops_before_request_creation() {
    let server = MockServer::start().await;
    mock_login(&server).await;
    mock_entitlements(&server, "web01", json!([])).await;

    Mock::given(method("POST"))
        .and(path(format!("{CORE}/AccessRequests")))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let err = lookup_password(
        &config(&server),
        &auth(),
        "web01",
        &RetryConfig::default(),
        &ConflictDetection::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, LookupError::NotFound(_)));
}

#[tokio::test]
async fn ambiguous_entitlements_stop_before_request_creation() {
    let server = MockServer::start().await;
    mock_login(&server).await;
    mock_entitlements(
        &server,
        "web01",
        json!([entitlement(7, 3, "web01"), entitlement(8, 3, "WEB01")]),
    )
    .await;

    Mock::given(method("POST"))
        .and(path(format!("{CORE}/AccessRequests")))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let err = lookup_password(
        &config(&server),
        &auth(),
        "web01",
        &RetryConfig::default(),
        &ConflictDetection::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, LookupError::AmbiguousMatch(_)));
}

#[tokio::test]
async fn checkout_failure_still_logs_out() {
    let server = MockServer::start().await;
    mock_login(&server).await;
    mock_entitlements(&server, "web01", json!([entitlement(7, 3, "web01")])).await;

    Mock::given(method("POST"))
        .and(path(format!("{CORE}/AccessRequests")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"Id": "42"})))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{CORE}/AccessRequests/42/CheckOutPassword")))
        .respond_with(ResponseTemplate::new(403).set_body_string("Request is not approved"))
        .expect(1)
        .mount(&server)
        .await;

    let err = lookup_password(
        &config(&server),
        &auth(),
        "web01",
        &RetryConfig::default(),
        &ConflictDetection::default(),
    )
    .await
    .unwrap_err();
    match err {
        LookupError::Checkout { status, body } => {
            assert_eq!(status, 403);
            assert_eq!(body, "Request is not approved");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn rejected_credentials_fail_authentication() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/RSTS/oauth2/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_request",
            "error_description": "Access denied."
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{CORE}/Me/RequestEntitlements")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let err = lookup_password(
        &config(&server),
        &auth(),
        "web01",
        &RetryConfig::default(),
        &ConflictDetection::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, LookupError::Authentication(_)));
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn structured_conflict_code_is_honoured() {
    let server = MockServer::start().await;
    mock_login(&server).await;
    mock_entitlements(&server, "db01", json!([entitlement(9, 5, "db01")])).await;

    Mock::given(method("POST"))
        .and(path(format!("{CORE}/AccessRequests")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "Code": 60657,
            "Message": "Duplicate access request."
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{CORE}/AccessRequests")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"Id": "9-5-1", "AccountAssetName": "db01", "State": "PasswordCheckedOut"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{CORE}/AccessRequests/9-5-1/CheckOutPassword")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("db-pass")))
        .expect(1)
        .mount(&server)
        .await;

    let conflict = ConflictDetection {
        error_codes: vec![60657],
        ..Default::default()
    };
    let lookup = PasswordLookup::new(config(&server), auth()).with_conflict_detection(conflict);
    let secret = lookup.fetch("db01").await.unwrap();
    assert_eq!(secret.as_str().unwrap(), "db-pass");
}
