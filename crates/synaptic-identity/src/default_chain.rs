use std::sync::Arc;

use async_trait::async_trait;
use synaptic_core::{AccessToken, SynapticError, TokenCredential};

use crate::{ClientSecretCredential, HttpBackend, IdentityBackend, ManagedIdentityCredential};

/// Tries a list of credentials in order and returns the first token issued.
///
/// The default chain is: a service principal from `AZURE_*` environment
/// variables when all of them are present, then the managed identity of the
/// host.
pub struct DefaultAzureCredential {
    sources: Vec<(String, Arc<dyn TokenCredential>)>,
}

impl DefaultAzureCredential {
    pub fn new() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), Arc::new(HttpBackend::new()))
    }

    /// Build the default chain from an environment lookup, sending every
    /// request through `backend`.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        backend: Arc<dyn IdentityBackend>,
    ) -> Self {
        let mut sources: Vec<(String, Arc<dyn TokenCredential>)> = Vec::new();
        if let Some(env) = ClientSecretCredential::from_lookup(&lookup) {
            sources.push((
                "EnvironmentCredential".to_string(),
                Arc::new(env.with_backend(backend.clone())),
            ));
        }
        sources.push((
            "ManagedIdentityCredential".to_string(),
            Arc::new(ManagedIdentityCredential::from_lookup(&lookup).with_backend(backend)),
        ));
        Self { sources }
    }

    /// A custom chain of named credentials.
    pub fn from_credentials(sources: Vec<(String, Arc<dyn TokenCredential>)>) -> Self {
        Self { sources }
    }

    /// Names of the credentials in the order they are tried.
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|(name, _)| name.as_str()).collect()
    }
}

impl Default for DefaultAzureCredential {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenCredential for DefaultAzureCredential {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken, SynapticError> {
        if self.sources.is_empty() {
            return Err(SynapticError::identity(
                "DefaultAzureCredential has no credentials configured",
            ));
        }

        let mut failures = Vec::with_capacity(self.sources.len());
        let mut last_error = None;

        for (name, credential) in &self.sources {
            match credential.get_token(scopes).await {
                Ok(token) => {
                    tracing::debug!(credential = %name, "token acquired");
                    return Ok(token);
                }
                Err(e) => {
                    tracing::debug!(credential = %name, error = %e, "credential unavailable");
                    failures.push(format!("- {name}: {e}"));
                    last_error = Some(e);
                }
            }
        }

        let message = format!(
            "DefaultAzureCredential failed to retrieve a token from the included credentials.\n{}",
            failures.join("\n")
        );
        Err(match last_error {
            Some(e) => SynapticError::identity_with_source(message, e),
            None => SynapticError::identity(message),
        })
    }
}
