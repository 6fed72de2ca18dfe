use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use synaptic_identity::{
    FakeBackend, IdentityMethod, IdentityResponse, ManagedIdentityCredential,
    ManagedIdentitySource, SynapticError, TokenCredential, IMDS_ENDPOINT,
};

const PG_SCOPE: &str = "https://ossrdbms-aad.database.windows.net/.default";

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

// ---------------------------------------------------------------------------
// Source detection
// ---------------------------------------------------------------------------

#[test]
fn defaults_to_imds() {
    let credential = ManagedIdentityCredential::new();
    assert_eq!(
        credential.source(),
        &ManagedIdentitySource::Imds {
            endpoint: IMDS_ENDPOINT.to_string()
        }
    );
    assert!(credential.client_id().is_none());
}

#[test]
fn app_service_selected_when_both_variables_set() {
    let credential = ManagedIdentityCredential::from_lookup(env(&[
        ("IDENTITY_ENDPOINT", "http://localhost:4141/msi/token"),
        ("IDENTITY_HEADER", "secret-header"),
        ("AZURE_CLIENT_ID", "user-assigned"),
    ]));
    assert!(matches!(
        credential.source(),
        ManagedIdentitySource::AppService { endpoint, .. } if endpoint == "http://localhost:4141/msi/token"
    ));
    assert_eq!(credential.client_id(), Some("user-assigned"));
}

#[test]
fn partial_app_service_environment_falls_back_to_imds() {
    let credential = ManagedIdentityCredential::from_lookup(env(&[(
        "IDENTITY_ENDPOINT",
        "http://localhost:4141/msi/token",
    )]));
    assert!(matches!(
        credential.source(),
        ManagedIdentitySource::Imds { .. }
    ));
}

#[test]
fn debug_hides_app_service_header() {
    let credential = ManagedIdentityCredential::app_service("http://localhost/token", "hdr-secret");
    let debug = format!("{credential:?}");
    assert!(!debug.contains("hdr-secret"));
}

// ---------------------------------------------------------------------------
// Token requests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn imds_request_shape_and_token() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_response(IdentityResponse::new(
        200,
        json!({"access_token": "imds-token", "expires_on": "1700000000"}),
    ));
    let credential = ManagedIdentityCredential::new().with_backend(backend.clone());

    let token = credential.get_token(&[PG_SCOPE]).await.unwrap();
    assert_eq!(token.token, "imds-token");
    assert_eq!(token.expires_on, Some(1_700_000_000));

    let requests = backend.requests().await;
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert!(request.method == IdentityMethod::Get);
    assert_eq!(request.url, IMDS_ENDPOINT);
    assert_eq!(request.query_value("api-version"), Some("2018-02-01"));
    assert_eq!(
        request.query_value("resource"),
        Some("https://ossrdbms-aad.database.windows.net")
    );
    assert_eq!(request.header_value("metadata"), Some("true"));
    assert!(request.query_value("client_id").is_none());
}

#[tokio::test]
async fn user_assigned_identity_sends_client_id() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_response(IdentityResponse::new(200, json!({"access_token": "t"})));
    let credential = ManagedIdentityCredential::new()
        .with_client_id("abc-123")
        .with_backend(backend.clone());

    credential.get_token(&[PG_SCOPE]).await.unwrap();
    let requests = backend.requests().await;
    assert_eq!(requests[0].query_value("client_id"), Some("abc-123"));
}

#[tokio::test]
async fn app_service_request_uses_identity_header() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_response(IdentityResponse::new(
        200,
        json!({"access_token": "as-token", "expires_on": 1700000100}),
    ));
    let credential = ManagedIdentityCredential::app_service("http://localhost:4141/msi/token", "hdr")
        .with_backend(backend.clone());

    let token = credential.get_token(&[PG_SCOPE]).await.unwrap();
    assert_eq!(token.token, "as-token");
    assert_eq!(token.expires_on, Some(1_700_000_100));

    let requests = backend.requests().await;
    assert_eq!(requests[0].url, "http://localhost:4141/msi/token");
    assert_eq!(requests[0].query_value("api-version"), Some("2019-08-01"));
    assert_eq!(requests[0].header_value("X-IDENTITY-HEADER"), Some("hdr"));
}

#[tokio::test]
async fn custom_imds_endpoint() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_response(IdentityResponse::new(200, json!({"access_token": "t"})));
    let credential = ManagedIdentityCredential::new()
        .with_imds_endpoint("http://127.0.0.1:9999/token")
        .with_backend(backend.clone());

    credential.get_token(&[PG_SCOPE]).await.unwrap();
    assert_eq!(backend.requests().await[0].url, "http://127.0.0.1:9999/token");
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rejects_multiple_scopes() {
    let backend = Arc::new(FakeBackend::new());
    let credential = ManagedIdentityCredential::new().with_backend(backend.clone());

    let err = credential.get_token(&["a", "b"]).await.unwrap_err();
    assert!(matches!(err, SynapticError::Identity { .. }));
    assert!(backend.requests().await.is_empty());
}

#[tokio::test]
async fn error_status_reports_description() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_response(IdentityResponse::new(
        400,
        json!({"error": "invalid_request", "error_description": "Identity not found"}),
    ));
    let credential = ManagedIdentityCredential::new().with_backend(backend);

    let err = credential.get_token(&[PG_SCOPE]).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("400"), "got: {message}");
    assert!(message.contains("Identity not found"), "got: {message}");
}

#[tokio::test]
async fn missing_access_token_is_a_parsing_error() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_response(IdentityResponse::new(200, json!({"token_type": "Bearer"})));
    let credential = ManagedIdentityCredential::new().with_backend(backend);

    let err = credential.get_token(&[PG_SCOPE]).await.unwrap_err();
    assert!(matches!(err, SynapticError::Parsing(_)));
}

#[tokio::test]
async fn transport_error_is_propagated() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_error(SynapticError::identity("connection refused"));
    let credential = ManagedIdentityCredential::new().with_backend(backend);

    let err = credential.get_token(&[PG_SCOPE]).await.unwrap_err();
    assert!(err.to_string().contains("connection refused"));
}
