use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use synaptic_core::{SynapticError, TokenCredential};
use synaptic_identity::DefaultAzureCredential;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Key for the `columns` map.
pub const COLUMN_ID: &str = "id";
/// Key for the `columns` map.
pub const COLUMN_EMBEDDING: &str = "embedding";
/// Key for the `columns` map.
pub const COLUMN_TAGS: &str = "tags";
/// Key for the `columns` map.
pub const COLUMN_CONTENT: &str = "content";
/// Key for the `columns` map.
pub const COLUMN_PAYLOAD: &str = "payload";

pub const DEFAULT_DATABASE: &str = "postgres";
pub const DEFAULT_SCHEMA: &str = "public";
pub const DEFAULT_TABLE_NAME_PREFIX: &str = "km-";

/// Mandatory placeholder in custom table-creation SQL.
pub const SQL_PLACEHOLDER_TABLE_NAME: &str = "%%table_name%%";
/// Mandatory placeholder in custom table-creation SQL.
pub const SQL_PLACEHOLDER_VECTOR_SIZE: &str = "%%vector_size%%";
/// Optional placeholder in custom table-creation SQL.
pub const SQL_PLACEHOLDER_LOCK_ID: &str = "%%lock_id%%";

/// Entra ID scope for Azure Database for PostgreSQL.
pub const POSTGRES_TOKEN_SCOPE: &str = "https://ossrdbms-aad.database.windows.net/.default";

// ---------------------------------------------------------------------------
// AuthType
// ---------------------------------------------------------------------------

/// How the connector authenticates against Postgres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum AuthType {
    /// Caller supplies a complete connection string.
    #[default]
    ConnectionString,
    /// Host, port and user are supplied; the password is an Entra ID token.
    AzureIdentity,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::ConnectionString => "ConnectionString",
            AuthType::AzureIdentity => "AzureIdentity",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthType {
    type Err = SynapticError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("ConnectionString") {
            Ok(AuthType::ConnectionString)
        } else if s.eq_ignore_ascii_case("AzureIdentity") {
            Ok(AuthType::AzureIdentity)
        } else {
            Err(SynapticError::Config(format!(
                "Postgres: unknown authentication type '{s}'."
            )))
        }
    }
}

impl TryFrom<String> for AuthType {
    type Error = SynapticError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ---------------------------------------------------------------------------
// ColumnRole
// ---------------------------------------------------------------------------

/// Logical column of a memory table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnRole {
    Id,
    Embedding,
    Tags,
    Content,
    Payload,
}

impl ColumnRole {
    /// Every role, in the order validation checks them.
    pub const ALL: [ColumnRole; 5] = [
        ColumnRole::Id,
        ColumnRole::Embedding,
        ColumnRole::Tags,
        ColumnRole::Content,
        ColumnRole::Payload,
    ];

    /// Key used in the `columns` map.
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnRole::Id => COLUMN_ID,
            ColumnRole::Embedding => COLUMN_EMBEDDING,
            ColumnRole::Tags => COLUMN_TAGS,
            ColumnRole::Content => COLUMN_CONTENT,
            ColumnRole::Payload => COLUMN_PAYLOAD,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ColumnRole::Id => "Id",
            ColumnRole::Embedding => "Embedding",
            ColumnRole::Tags => "Tags",
            ColumnRole::Content => "Content",
            ColumnRole::Payload => "Payload",
        }
    }
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PostgresConfig
// ---------------------------------------------------------------------------

/// Connection and schema settings for the Postgres memory connector.
///
/// Fields can be set freely; [`validate`](PostgresConfig::validate) checks
/// them as a whole and normalizes whitespace before the connector uses them.
/// Deserializes from the PascalCase shape used in application settings
/// (`Auth`, `ConnectionString`, `Host`, `Port`, `UserName`, `Columns`, ...).
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PostgresConfig {
    pub auth: AuthType,
    /// Used with [`AuthType::ConnectionString`] only.
    pub connection_string: String,
    /// Used with [`AuthType::AzureIdentity`] only.
    pub host: String,
    /// Used with [`AuthType::AzureIdentity`] only. `0` means unset.
    pub port: u16,
    /// Used with [`AuthType::AzureIdentity`] only.
    pub user_name: String,
    pub database: String,
    pub schema: String,
    /// Mandatory prefix that distinguishes connector tables from others in
    /// the same schema.
    pub table_name_prefix: String,
    /// Column role (see [`ColumnRole`]) to physical column name. Entries
    /// supplied when deserializing are merged over the defaults.
    #[serde(deserialize_with = "merge_default_columns")]
    pub columns: HashMap<String, String>,
    /// Optional custom SQL for creating tables, one entry per line. Must
    /// contain `%%table_name%%` and `%%vector_size%%`; `%%lock_id%%` is
    /// optional. Example:
    ///
    /// ```text
    /// BEGIN;
    /// SELECT pg_advisory_xact_lock(%%lock_id%%);
    /// CREATE TABLE IF NOT EXISTS %%table_name%% (
    ///   id        TEXT NOT NULL PRIMARY KEY,
    ///   embedding vector(%%vector_size%%),
    ///   tags      TEXT[] DEFAULT '{}'::TEXT[] NOT NULL,
    ///   content   TEXT DEFAULT '' NOT NULL,
    ///   payload   JSONB DEFAULT '{}'::JSONB NOT NULL
    /// );
    /// COMMIT;
    /// ```
    pub create_table_sql: Vec<String>,
    #[serde(skip)]
    dispatch: Option<Dispatch>,
}

fn default_columns() -> HashMap<String, String> {
    ColumnRole::ALL
        .iter()
        .map(|role| (role.as_str().to_string(), role.as_str().to_string()))
        .collect()
}

fn merge_default_columns<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = HashMap::<String, String>::deserialize(deserializer)?;
    let mut columns = default_columns();
    columns.extend(overrides);
    Ok(columns)
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

fn config_error(message: impl fmt::Display) -> SynapticError {
    SynapticError::Config(format!("Postgres: {message}"))
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            auth: AuthType::ConnectionString,
            connection_string: String::new(),
            host: String::new(),
            port: 0,
            user_name: String::new(),
            database: DEFAULT_DATABASE.to_string(),
            schema: DEFAULT_SCHEMA.to_string(),
            table_name_prefix: DEFAULT_TABLE_NAME_PREFIX.to_string(),
            columns: default_columns(),
            create_table_sql: Vec::new(),
            dispatch: None,
        }
    }
}

impl PostgresConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_connection_string(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            ..Self::default()
        }
    }

    pub fn azure_identity(host: impl Into<String>, port: u16, user_name: impl Into<String>) -> Self {
        Self {
            auth: AuthType::AzureIdentity,
            host: host.into(),
            port,
            user_name: user_name.into(),
            ..Self::default()
        }
    }

    /// Parse a JSON settings section.
    pub fn from_json(json: &str) -> Result<Self, SynapticError> {
        serde_json::from_str(json)
            .map_err(|e| config_error(format_args!("invalid configuration: {e}")))
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, SynapticError> {
        serde_json::from_value(value)
            .map_err(|e| config_error(format_args!("invalid configuration: {e}")))
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_table_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_name_prefix = prefix.into();
        self
    }

    pub fn with_column(mut self, role: ColumnRole, name: impl Into<String>) -> Self {
        self.columns.insert(role.as_str().to_string(), name.into());
        self
    }

    pub fn with_create_table_sql<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.create_table_sql = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Route this config's diagnostics to `dispatch`. Without one they are
    /// discarded.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Physical column name mapped to `role`.
    pub fn column(&self, role: ColumnRole) -> Option<&str> {
        self.columns.get(role.as_str()).map(String::as_str)
    }

    /// Name of the table backing `index`.
    pub fn table_name(&self, index: &str) -> String {
        format!("{}{}", self.table_name_prefix, index)
    }

    /// Custom table-creation SQL with its placeholders filled in, or `None`
    /// when no custom SQL is configured.
    pub fn render_create_table_sql(
        &self,
        table_name: &str,
        vector_size: usize,
        lock_id: i64,
    ) -> Option<String> {
        if self.create_table_sql.is_empty() {
            return None;
        }
        let sql = self.create_table_sql.join("\n");
        Some(
            sql.trim()
                .replace(
                    SQL_PLACEHOLDER_TABLE_NAME,
                    &format!("{}.\"{}\"", self.schema, table_name),
                )
                .replace(SQL_PLACEHOLDER_VECTOR_SIZE, &vector_size.to_string())
                .replace(SQL_PLACEHOLDER_LOCK_ID, &lock_id.to_string()),
        )
    }

    /// Check that the settings are complete and consistent.
    ///
    /// Trims `table_name_prefix` and `connection_string` up front and, on
    /// success, every mapped column name. Rules run in a fixed order and the
    /// first violation is returned as [`SynapticError::Config`].
    pub fn validate(&mut self) -> Result<(), SynapticError> {
        self.table_name_prefix = self.table_name_prefix.trim().to_string();
        self.connection_string = self.connection_string.trim().to_string();

        if let Err(e) = self.check_rules() {
            self.in_diagnostics(|| {
                tracing::warn!(auth = %self.auth, error = %e, "postgres configuration rejected")
            });
            return Err(e);
        }

        for role in ColumnRole::ALL {
            if let Some(name) = self.columns.get_mut(role.as_str()) {
                *name = name.trim().to_string();
            }
        }

        self.in_diagnostics(|| {
            tracing::debug!(
                auth = %self.auth,
                database = %self.database,
                schema = %self.schema,
                table_name_prefix = %self.table_name_prefix,
                custom_sql = !self.create_table_sql.is_empty(),
                "postgres configuration validated"
            )
        });
        Ok(())
    }

    fn check_rules(&self) -> Result<(), SynapticError> {
        match self.auth {
            AuthType::ConnectionString => {
                if is_blank(&self.connection_string) {
                    return Err(config_error("ConnectionString is empty."));
                }
                if !is_blank(&self.host) {
                    return Err(config_error(
                        "Host should not be used when Auth is 'ConnectionString'.",
                    ));
                }
                if self.port > 0 {
                    return Err(config_error(
                        "Port should not be used when Auth is 'ConnectionString'.",
                    ));
                }
                if !is_blank(&self.user_name) {
                    return Err(config_error(
                        "UserName should not be used when Auth is 'ConnectionString'.",
                    ));
                }
            }
            AuthType::AzureIdentity => {
                if !is_blank(&self.connection_string) {
                    return Err(config_error(
                        "ConnectionString should not be used when Auth is 'AzureIdentity'.",
                    ));
                }
                if is_blank(&self.host) {
                    return Err(config_error("Host is empty."));
                }
                if self.port < 1 {
                    return Err(config_error("Port is empty."));
                }
                if is_blank(&self.user_name) {
                    return Err(config_error("UserName is empty."));
                }
            }
        }

        if is_blank(&self.table_name_prefix) {
            return Err(config_error("TableNamePrefix is empty."));
        }

        for role in ColumnRole::ALL {
            match self.columns.get(role.as_str()) {
                None => {
                    return Err(config_error(format_args!(
                        "the name of the {} column is not defined.",
                        role.label()
                    )))
                }
                Some(name) if is_blank(name) => {
                    return Err(config_error(format_args!(
                        "the name of the {} column is empty.",
                        role.label()
                    )))
                }
                Some(_) => {}
            }
        }

        if !self.create_table_sql.is_empty() {
            let sql = self.create_table_sql.join("\n");
            let sql = sql.trim();
            for placeholder in [SQL_PLACEHOLDER_TABLE_NAME, SQL_PLACEHOLDER_VECTOR_SIZE] {
                if !sql.contains(placeholder) {
                    return Err(config_error(format_args!(
                        "the custom SQL to create tables is not valid, \
                         it should contain a {placeholder} placeholder."
                    )));
                }
            }
        }

        Ok(())
    }

    /// Connection string for the configured auth type.
    ///
    /// With [`AuthType::ConnectionString`] the configured string is returned
    /// as is. With [`AuthType::AzureIdentity`] a token for
    /// [`POSTGRES_TOKEN_SCOPE`] is requested from `credential` and used as
    /// the password. Token failures surface as [`SynapticError::Connection`].
    pub async fn resolve_connection_string(
        &self,
        credential: &dyn TokenCredential,
    ) -> Result<String, SynapticError> {
        self.in_diagnostics(|| {
            tracing::debug!(auth = %self.auth, "resolving postgres connection string")
        });

        match self.auth {
            AuthType::ConnectionString => Ok(self.connection_string.clone()),
            AuthType::AzureIdentity => self.connection_string_from_token(credential).await,
        }
    }

    /// [`resolve_connection_string`](Self::resolve_connection_string) using
    /// [`DefaultAzureCredential`] built from the process environment.
    pub async fn resolve_connection_string_default(&self) -> Result<String, SynapticError> {
        self.resolve_connection_string(&DefaultAzureCredential::new()).await
    }

    async fn connection_string_from_token(
        &self,
        credential: &dyn TokenCredential,
    ) -> Result<String, SynapticError> {
        let token = credential
            .get_token(&[POSTGRES_TOKEN_SCOPE])
            .with_subscriber(self.diagnostics())
            .await
            .map_err(|e| {
                let cause = std::error::Error::source(&e)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "acquire token failed".to_string());
                let err = SynapticError::Connection(format!("{e} \n\n{cause}"));
                self.in_diagnostics(|| {
                    tracing::warn!(
                        host = %self.host,
                        user = %self.user_name,
                        error = %err,
                        "failed to acquire postgres access token"
                    )
                });
                err
            })?;

        self.in_diagnostics(|| {
            tracing::debug!(
                host = %self.host,
                port = self.port,
                user = %self.user_name,
                database = %self.database,
                "built postgres connection string from access token"
            )
        });

        Ok(format!(
            "Server={}; User Id={}; Database={}; Port={}; Password={}; SSLMode=Prefer",
            self.host, self.user_name, self.database, self.port, token.token
        ))
    }

    fn diagnostics(&self) -> Dispatch {
        self.dispatch.clone().unwrap_or_else(Dispatch::none)
    }

    fn in_diagnostics<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.diagnostics(), f)
    }
}

// The connection string may embed a password, so it is never printed.
impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let connection_string = if self.connection_string.is_empty() {
            ""
        } else {
            "<redacted>"
        };
        f.debug_struct("PostgresConfig")
            .field("auth", &self.auth)
            .field("connection_string", &connection_string)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user_name", &self.user_name)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("table_name_prefix", &self.table_name_prefix)
            .field("columns", &self.columns)
            .field("create_table_sql", &self.create_table_sql)
            .finish_non_exhaustive()
    }
}
