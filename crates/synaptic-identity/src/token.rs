use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use synaptic_core::{AccessToken, SynapticError};

use crate::IdentityResponse;

/// Convert a v2 OAuth scope into the v1 resource identifier expected by
/// managed identity endpoints (`https://x/.default` -> `https://x`).
pub fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

/// Turn a token endpoint response into an [`AccessToken`].
///
/// `provider` names the credential in error messages.
pub fn parse_token_response(
    response: IdentityResponse,
    provider: &str,
) -> Result<AccessToken, SynapticError> {
    if !(200..300).contains(&response.status) {
        return Err(SynapticError::identity(format!(
            "{provider} token request failed ({}): {}",
            response.status,
            error_detail(&response.body),
        )));
    }

    let token = response
        .body
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            SynapticError::Parsing(format!("{provider} response is missing 'access_token'"))
        })?;

    let expires_on = response
        .body
        .get("expires_on")
        .and_then(as_seconds)
        .or_else(|| {
            response
                .body
                .get("expires_in")
                .and_then(as_seconds)
                .map(|secs| unix_now().saturating_add(secs))
        });

    Ok(AccessToken {
        token: token.to_string(),
        expires_on,
    })
}

/// Best-effort human readable reason from an error body.
fn error_detail(body: &Value) -> String {
    if let Some(desc) = body.get("error_description").and_then(Value::as_str) {
        return desc.to_string();
    }
    match body.get("error") {
        Some(Value::String(s)) => return s.clone(),
        Some(Value::Object(obj)) => {
            if let Some(msg) = obj.get("message").and_then(Value::as_str) {
                return msg.to_string();
            }
        }
        _ => {}
    }
    if let Some(msg) = body.get("message").and_then(Value::as_str) {
        return msg.to_string();
    }
    match body {
        Value::Null => "empty response body".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// IMDS reports numbers as strings.
fn as_seconds(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
