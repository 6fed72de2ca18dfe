use std::{collections::VecDeque, fmt, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use synaptic_core::SynapticError;
use tokio::sync::Mutex;

/// HTTP verb and body shape of a token request.
#[derive(Clone, PartialEq, Eq)]
pub enum IdentityMethod {
    Get,
    /// `application/x-www-form-urlencoded` POST.
    PostForm(Vec<(String, String)>),
}

#[derive(Clone)]
pub struct IdentityRequest {
    pub method: IdentityMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl IdentityRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: IdentityMethod::Get,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            method: IdentityMethod::PostForm(form),
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Value of a query parameter, if present.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value of a header (case-insensitive name), if present.
    pub fn header_value(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Value of a form field, if this is a form POST.
    pub fn form_value(&self, key: &str) -> Option<&str> {
        match &self.method {
            IdentityMethod::Get => None,
            IdentityMethod::PostForm(form) => form
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
        }
    }
}

// Header and form values can carry secrets, only their names are printed.
impl fmt::Debug for IdentityRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = match &self.method {
            IdentityMethod::Get => "GET",
            IdentityMethod::PostForm(_) => "POST",
        };
        let form_keys: Vec<&str> = match &self.method {
            IdentityMethod::Get => Vec::new(),
            IdentityMethod::PostForm(form) => form.iter().map(|(k, _)| k.as_str()).collect(),
        };
        let header_keys: Vec<&str> = self.headers.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("IdentityRequest")
            .field("method", &method)
            .field("url", &self.url)
            .field("query", &self.query)
            .field("headers", &header_keys)
            .field("form", &form_keys)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct IdentityResponse {
    pub status: u16,
    pub body: Value,
}

impl IdentityResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }
}

/// Transport used by credentials to reach an identity endpoint.
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    async fn send(&self, request: IdentityRequest) -> Result<IdentityResponse, SynapticError>;
}

/// Production backend using reqwest.
pub struct HttpBackend {
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Use a preconfigured client (timeouts, proxies, TLS roots).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityBackend for HttpBackend {
    async fn send(&self, request: IdentityRequest) -> Result<IdentityResponse, SynapticError> {
        let mut builder = match &request.method {
            IdentityMethod::Get => self.client.get(&request.url),
            IdentityMethod::PostForm(form) => self.client.post(&request.url).form(form),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }

        let response = builder.send().await.map_err(|e| {
            SynapticError::identity_with_source(
                format!("HTTP request to {} failed", request.url),
                e,
            )
        })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| {
            SynapticError::identity_with_source(
                format!("failed to read response from {}", request.url),
                e,
            )
        })?;

        // Error pages are not always JSON; keep them as a string for the message.
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(IdentityResponse { status, body })
    }
}

/// Test backend with queued responses that records every request it receives.
pub struct FakeBackend {
    responses: Arc<Mutex<VecDeque<Result<IdentityResponse, SynapticError>>>>,
    requests: Arc<Mutex<Vec<IdentityRequest>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push_response(&self, response: IdentityResponse) -> &Self {
        self.responses
            .try_lock()
            .expect("not concurrent during setup")
            .push_back(Ok(response));
        self
    }

    pub fn push_error(&self, error: SynapticError) -> &Self {
        self.responses
            .try_lock()
            .expect("not concurrent during setup")
            .push_back(Err(error));
        self
    }

    /// Requests received so far, oldest first.
    pub async fn requests(&self) -> Vec<IdentityRequest> {
        self.requests.lock().await.clone()
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityBackend for FakeBackend {
    async fn send(&self, request: IdentityRequest) -> Result<IdentityResponse, SynapticError> {
        self.requests.lock().await.push(request);
        let mut responses = self.responses.lock().await;
        responses
            .pop_front()
            .unwrap_or_else(|| Err(SynapticError::identity("FakeBackend exhausted")))
    }
}
