use std::{fmt, sync::Arc};

use async_trait::async_trait;
use synaptic_core::{AccessToken, SynapticError, TokenCredential};

use crate::{
    parse_token_response, scope_to_resource, HttpBackend, IdentityBackend, IdentityRequest,
};

/// Instance Metadata Service token endpoint available on Azure VMs and AKS nodes.
pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

/// Where a managed identity token is requested from.
#[derive(Clone, PartialEq, Eq)]
pub enum ManagedIdentitySource {
    Imds { endpoint: String },
    /// App Service / Functions local identity endpoint.
    AppService { endpoint: String, header: String },
}

impl fmt::Debug for ManagedIdentitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagedIdentitySource::Imds { endpoint } => {
                f.debug_struct("Imds").field("endpoint", endpoint).finish()
            }
            ManagedIdentitySource::AppService { endpoint, .. } => f
                .debug_struct("AppService")
                .field("endpoint", endpoint)
                .field("header", &"<redacted>")
                .finish(),
        }
    }
}

/// Token credential backed by the Azure managed identity of the host.
pub struct ManagedIdentityCredential {
    source: ManagedIdentitySource,
    client_id: Option<String>,
    backend: Arc<dyn IdentityBackend>,
}

impl ManagedIdentityCredential {
    /// System-assigned identity through IMDS.
    pub fn new() -> Self {
        Self {
            source: ManagedIdentitySource::Imds {
                endpoint: IMDS_ENDPOINT.to_string(),
            },
            client_id: None,
            backend: Arc::new(HttpBackend::new()),
        }
    }

    /// Identity through the App Service endpoint.
    pub fn app_service(endpoint: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            source: ManagedIdentitySource::AppService {
                endpoint: endpoint.into(),
                header: header.into(),
            },
            ..Self::new()
        }
    }

    /// Detect the source from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Detect the source from `IDENTITY_ENDPOINT`, `IDENTITY_HEADER` and
    /// `AZURE_CLIENT_ID` as returned by `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut credential = match (non_empty("IDENTITY_ENDPOINT"), non_empty("IDENTITY_HEADER")) {
            (Some(endpoint), Some(header)) => Self::app_service(endpoint, header),
            _ => Self::new(),
        };
        credential.client_id = non_empty("AZURE_CLIENT_ID");
        credential
    }

    /// Select a user-assigned identity.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Override the IMDS endpoint (ignored for App Service).
    pub fn with_imds_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        if let ManagedIdentitySource::Imds { endpoint: current } = &mut self.source {
            *current = endpoint.into();
        }
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn IdentityBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn source(&self) -> &ManagedIdentitySource {
        &self.source
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    fn build_request(&self, resource: &str) -> IdentityRequest {
        let request = match &self.source {
            ManagedIdentitySource::Imds { endpoint } => IdentityRequest::get(endpoint)
                .with_query("api-version", IMDS_API_VERSION)
                .with_query("resource", resource)
                .with_header("Metadata", "true"),
            ManagedIdentitySource::AppService { endpoint, header } => {
                IdentityRequest::get(endpoint)
                    .with_query("api-version", APP_SERVICE_API_VERSION)
                    .with_query("resource", resource)
                    .with_header("X-IDENTITY-HEADER", header)
            }
        };
        match &self.client_id {
            Some(client_id) => request.with_query("client_id", client_id),
            None => request,
        }
    }

    fn provider_name(&self) -> &'static str {
        match self.source {
            ManagedIdentitySource::Imds { .. } => "ManagedIdentityCredential (IMDS)",
            ManagedIdentitySource::AppService { .. } => "ManagedIdentityCredential (App Service)",
        }
    }
}

impl Default for ManagedIdentityCredential {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ManagedIdentityCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedIdentityCredential")
            .field("source", &self.source)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken, SynapticError> {
        let [scope] = scopes else {
            return Err(SynapticError::identity(format!(
                "{} supports exactly one scope, got {}",
                self.provider_name(),
                scopes.len()
            )));
        };
        let resource = scope_to_resource(scope);
        let request = self.build_request(resource);

        tracing::debug!(
            provider = self.provider_name(),
            endpoint = %request.url,
            resource = %resource,
            "requesting managed identity token"
        );

        let response = self.backend.send(request).await?;
        tracing::debug!(
            provider = self.provider_name(),
            status = response.status,
            "managed identity endpoint responded"
        );
        parse_token_response(response, self.provider_name())
    }
}
