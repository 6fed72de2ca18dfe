use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use synaptic_identity::{
    AccessToken, DefaultAzureCredential, FakeBackend, IdentityResponse, SynapticError,
    TokenCredential,
};

struct FixedCredential(Result<&'static str, &'static str>);

#[async_trait]
impl TokenCredential for FixedCredential {
    async fn get_token(&self, _scopes: &[&str]) -> Result<AccessToken, SynapticError> {
        match self.0 {
            Ok(token) => Ok(AccessToken::new(token)),
            Err(message) => Err(SynapticError::identity(message)),
        }
    }
}

fn named(name: &str, credential: FixedCredential) -> (String, Arc<dyn TokenCredential>) {
    (name.to_string(), Arc::new(credential))
}

// ---------------------------------------------------------------------------
// Chain composition
// ---------------------------------------------------------------------------

#[test]
fn chain_without_environment_is_managed_identity_only() {
    let chain = DefaultAzureCredential::from_lookup(|_| None, Arc::new(FakeBackend::new()));
    assert_eq!(chain.source_names(), vec!["ManagedIdentityCredential"]);
}

#[test]
fn chain_with_service_principal_tries_environment_first() {
    let vars: HashMap<&str, &str> = [
        ("AZURE_TENANT_ID", "t"),
        ("AZURE_CLIENT_ID", "c"),
        ("AZURE_CLIENT_SECRET", "s"),
    ]
    .into_iter()
    .collect();
    let chain = DefaultAzureCredential::from_lookup(
        |key| vars.get(key).map(|v| v.to_string()),
        Arc::new(FakeBackend::new()),
    );
    assert_eq!(
        chain.source_names(),
        vec!["EnvironmentCredential", "ManagedIdentityCredential"]
    );
}

// ---------------------------------------------------------------------------
// Token acquisition
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_success_wins() {
    let chain = DefaultAzureCredential::from_credentials(vec![
        named("broken", FixedCredential(Err("unavailable"))),
        named("good", FixedCredential(Ok("from-good"))),
        named("never", FixedCredential(Ok("from-never"))),
    ]);
    let token = chain.get_token(&["scope"]).await.unwrap();
    assert_eq!(token.token, "from-good");
}

#[tokio::test]
async fn all_failures_are_listed() {
    let chain = DefaultAzureCredential::from_credentials(vec![
        named("first", FixedCredential(Err("no env"))),
        named("second", FixedCredential(Err("imds timeout"))),
    ]);
    let err = chain.get_token(&["scope"]).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("first: identity error: no env"), "got: {message}");
    assert!(message.contains("second: identity error: imds timeout"), "got: {message}");

    let inner = err.source().expect("last failure kept as source");
    assert!(inner.to_string().contains("imds timeout"));
}

#[tokio::test]
async fn empty_chain_fails() {
    let chain = DefaultAzureCredential::from_credentials(Vec::new());
    assert!(chain.get_token(&["scope"]).await.is_err());
}

#[tokio::test]
async fn default_chain_reaches_managed_identity_through_backend() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_response(IdentityResponse::new(200, json!({"access_token": "mi"})));
    let chain = DefaultAzureCredential::from_lookup(|_| None, backend.clone());

    let token = chain
        .get_token(&["https://ossrdbms-aad.database.windows.net/.default"])
        .await
        .unwrap();
    assert_eq!(token.token, "mi");
    assert_eq!(backend.requests().await.len(), 1);
}
