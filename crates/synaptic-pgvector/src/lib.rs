//! PostgreSQL + pgvector connection configuration for the Synaptic framework.
//!
//! This crate provides [`PostgresConfig`], the settings object handed to the
//! Postgres memory connector. It validates that the connection settings are
//! consistent with the selected [`AuthType`], checks the column mapping and
//! any custom table-creation SQL, and resolves the final connection string,
//! exchanging an Entra ID token for the password when
//! [`AuthType::AzureIdentity`] is used.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use synaptic_pgvector::{DefaultAzureCredential, PostgresConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = PostgresConfig::azure_identity("myserver.postgres.database.azure.com", 5432, "app")
//!     .with_database("memory");
//! config.validate()?;
//!
//! let credential = DefaultAzureCredential::new();
//! let connection_string = config.resolve_connection_string(&credential).await?;
//! # let _ = connection_string;
//! # Ok(())
//! # }
//! ```

mod config;

pub use config::{
    AuthType, ColumnRole, PostgresConfig, COLUMN_CONTENT, COLUMN_EMBEDDING, COLUMN_ID,
    COLUMN_PAYLOAD, COLUMN_TAGS, DEFAULT_DATABASE, DEFAULT_SCHEMA, DEFAULT_TABLE_NAME_PREFIX,
    POSTGRES_TOKEN_SCOPE, SQL_PLACEHOLDER_LOCK_ID, SQL_PLACEHOLDER_TABLE_NAME,
    SQL_PLACEHOLDER_VECTOR_SIZE,
};

// Re-export credential types for convenience.
pub use synaptic_core::{AccessToken, SynapticError, TokenCredential};
pub use synaptic_identity::{DefaultAzureCredential, ManagedIdentityCredential};
