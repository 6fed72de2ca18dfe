//! Azure identity credentials for Synaptic connectors.
//!
//! Every credential implements [`TokenCredential`](synaptic_core::TokenCredential)
//! and talks to its token endpoint through an [`IdentityBackend`], so tests
//! can swap the reqwest-based [`HttpBackend`] for a [`FakeBackend`].
//!
//! # Quick start
//!
//! ```rust,no_run
//! use synaptic_identity::{DefaultAzureCredential, TokenCredential};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let credential = DefaultAzureCredential::new();
//! let token = credential
//!     .get_token(&["https://ossrdbms-aad.database.windows.net/.default"])
//!     .await?;
//! # let _ = token;
//! # Ok(())
//! # }
//! ```

mod backend;
mod client_secret;
mod default_chain;
mod managed_identity;
mod token;

pub use backend::{
    FakeBackend, HttpBackend, IdentityBackend, IdentityMethod, IdentityRequest, IdentityResponse,
};
pub use client_secret::{ClientSecretCredential, DEFAULT_AUTHORITY_HOST};
pub use default_chain::DefaultAzureCredential;
pub use managed_identity::{ManagedIdentityCredential, ManagedIdentitySource, IMDS_ENDPOINT};
pub use token::{parse_token_response, scope_to_resource};

// Re-export core types for convenience.
pub use synaptic_core::{AccessToken, SynapticError, TokenCredential};
