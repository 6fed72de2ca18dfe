use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Boxed inner cause carried by identity failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error type shared by the connector crates.
#[derive(Debug, Error)]
pub enum SynapticError {
    /// Structural or semantic problem with user-supplied configuration.
    #[error("config error: {0}")]
    Config(String),
    /// The connector could not obtain what it needs to open a connection.
    #[error("connection error: {0}")]
    Connection(String),
    /// An identity provider refused or failed to issue a token.
    #[error("identity error: {message}")]
    Identity {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    #[error("parsing error: {0}")]
    Parsing(String),
}

impl SynapticError {
    /// Identity failure without an inner cause.
    pub fn identity(message: impl Into<String>) -> Self {
        SynapticError::Identity {
            message: message.into(),
            source: None,
        }
    }

    /// Identity failure wrapping the error that caused it.
    pub fn identity_with_source(
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        SynapticError::Identity {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// Bearer token issued by an identity provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    /// Expiry as unix seconds, when the provider reports one.
    pub expires_on: Option<u64>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_on: None,
        }
    }

    pub fn with_expires_on(mut self, expires_on: u64) -> Self {
        self.expires_on = Some(expires_on);
        self
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TokenCredential trait (implemented in synaptic-identity)
// ---------------------------------------------------------------------------

/// Source of access tokens for a set of OAuth scopes.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Request a token valid for every scope in `scopes`.
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken, SynapticError>;
}
