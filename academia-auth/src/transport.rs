//! Shared plumbing for the HTTP adapters

use academia_core::{config_error, AuthError, AuthResult};
use reqwest::{Response, StatusCode};
use serde_json::Value;
use url::Url;

/// Parse a base URL so that `join` appends below its path instead of replacing the last segment
pub(crate) fn parse_base_url(raw: &str) -> AuthResult<Url> {
    let mut normalized = raw.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Url::parse(&normalized)
        .map_err(|e| config_error!(format!("Invalid remote base_url {:?}: {}", raw, e), "parse_base_url", e))
}

pub(crate) fn endpoint(base: &Url, path: &str) -> AuthResult<Url> {
    base.join(path)
        .map_err(|e| config_error!(format!("Invalid endpoint path {:?}: {}", path, e), "endpoint", e))
}

/// Connection-level failure: the request never got an answer
pub(crate) fn transport_error(e: reqwest::Error) -> AuthError {
    AuthError::unavailable_with_source(format!("Request failed: {}", e), Box::new(e))
}

/// Human-readable message out of an error body, trying the field names
/// identity and REST backends commonly use
pub(crate) fn error_message(body: &str, status: StatusCode) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            ["error_description", "msg", "message", "error"]
                .iter()
                .find_map(|field| json.get(*field).and_then(Value::as_str).map(str::to_string))
        })
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
        })
}

/// Map a non-success response: 4xx means the service answered and refused,
/// anything else means it is not in a state to answer
pub(crate) async fn error_from_response(response: Response) -> AuthError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body, status);

    if status.is_client_error() {
        AuthError::rejected(message)
    } else {
        AuthError::unavailable(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_keeps_path_prefix() {
        let base = parse_base_url("https://example.com/project").unwrap();
        let url = endpoint(&base, "auth/v1/token").unwrap();
        assert_eq!(url.as_str(), "https://example.com/project/auth/v1/token");
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        assert!(matches!(
            parse_base_url("not a url"),
            Err(AuthError::Config { .. })
        ));
    }

    #[test]
    fn test_error_message_field_order() {
        let body = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
        assert_eq!(
            error_message(body, StatusCode::BAD_REQUEST),
            "Invalid login credentials"
        );
        assert_eq!(
            error_message(r#"{"msg":"User already registered"}"#, StatusCode::UNPROCESSABLE_ENTITY),
            "User already registered"
        );
        assert_eq!(
            error_message("<html>", StatusCode::BAD_GATEWAY),
            "Bad Gateway"
        );
    }
}
