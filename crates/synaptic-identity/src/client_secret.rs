use std::{fmt, sync::Arc};

use async_trait::async_trait;
use synaptic_core::{AccessToken, SynapticError, TokenCredential};

use crate::{parse_token_response, HttpBackend, IdentityBackend, IdentityRequest};

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Service principal credential using the OAuth2 client credentials grant.
pub struct ClientSecretCredential {
    tenant_id: String,
    client_id: String,
    client_secret: String,
    authority_host: String,
    backend: Arc<dyn IdentityBackend>,
}

impl ClientSecretCredential {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            backend: Arc::new(HttpBackend::new()),
        }
    }

    /// Build from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`
    /// and optional `AZURE_AUTHORITY_HOST`. `None` when any required
    /// variable is missing.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let credential = Self::new(
            non_empty("AZURE_TENANT_ID")?,
            non_empty("AZURE_CLIENT_ID")?,
            non_empty("AZURE_CLIENT_SECRET")?,
        );
        Some(match non_empty("AZURE_AUTHORITY_HOST") {
            Some(host) => credential.with_authority_host(host),
            None => credential,
        })
    }

    pub fn with_authority_host(mut self, host: impl Into<String>) -> Self {
        self.authority_host = host.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn IdentityBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host, self.tenant_id
        )
    }
}

impl fmt::Debug for ClientSecretCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecretCredential")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("authority_host", &self.authority_host)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken, SynapticError> {
        if scopes.is_empty() {
            return Err(SynapticError::identity(
                "ClientSecretCredential requires at least one scope",
            ));
        }

        let form = vec![
            ("grant_type".to_string(), "client_credentials".to_string()),
            ("client_id".to_string(), self.client_id.clone()),
            ("client_secret".to_string(), self.client_secret.clone()),
            ("scope".to_string(), scopes.join(" ")),
        ];
        let request = IdentityRequest::post_form(self.token_url(), form);

        tracing::debug!(
            tenant_id = %self.tenant_id,
            client_id = %self.client_id,
            "requesting client credentials token"
        );

        let response = self.backend.send(request).await?;
        parse_token_response(response, "ClientSecretCredential")
    }
}
