use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Everything that can go wrong between a command and the service.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Client-side, field-level validation. Never reaches the network.
    #[error("{0}")]
    Validation(String),

    /// Refresh failed or there are no stored credentials. The session has
    /// already been cleared when this surfaces.
    #[error("session expired; please log in again")]
    SessionExpired,

    /// Server-side business error, normalized for display.
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response shape: {0}")]
    Decode(String),

    /// The session storage port failed while a mutation was in flight.
    #[error("session storage error: {0}")]
    Storage(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for the errors the dashboard renders as "log in again".
    pub fn is_auth_failure(&self) -> bool {
        match self {
            ApiError::SessionExpired => true,
            ApiError::Api { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }
}

const HTML_FALLBACK: &str = "The server returned an unexpected error page. Please try again.";
const MAX_DISPLAY_LEN: usize = 160;

static UNRECOGNIZED_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Unrecognized field "([^"]+)""#).expect("static pattern")
});

/// Reduce a server error body to one displayable line.
///
/// The service answers with any of: an envelope/object carrying a `message`
/// field, a bare JSON string, a map of field names to messages (validation),
/// or a proxy-generated HTML page.
pub fn normalize_error_body(status: u16, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return format!("Request failed with status {status}");
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        match value {
            Value::String(message) => return shorten_known_patterns(&message),
            Value::Object(map) => {
                if let Some(Value::String(message)) = map.get("message") {
                    return shorten_known_patterns(message);
                }
                // Validation payloads are field -> message maps.
                let mut entries: Vec<(&String, &Value)> = map.iter().collect();
                entries.sort_by_key(|(key, _)| key.as_str());
                let joined = entries
                    .iter()
                    .filter_map(|(_, value)| value.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                if !joined.is_empty() {
                    return shorten_known_patterns(&joined);
                }
                return format!("Request failed with status {status}");
            }
            _ => return format!("Request failed with status {status}"),
        }
    }

    if trimmed.starts_with('<') {
        return HTML_FALLBACK.to_string();
    }

    shorten_known_patterns(trimmed)
}

/// Two server messages are verbose enough to need truncation: the
/// `Invalid request: <root cause chain>` wrapper and Jackson's
/// `Unrecognized field "x" (class ..., not marked as ignorable ...)`.
fn shorten_known_patterns(message: &str) -> String {
    if let Some(captures) = UNRECOGNIZED_FIELD.captures(message) {
        return format!("Unrecognized field \"{}\"", &captures[1]);
    }

    if let Some(rest) = message.strip_prefix("Invalid request:") {
        let first_line = rest.lines().next().unwrap_or(rest);
        let cut = first_line.split(" (").next().unwrap_or(first_line).trim();
        return truncate(&format!("Invalid request: {cut}"));
    }

    truncate(message)
}

fn truncate(message: &str) -> String {
    if message.chars().count() <= MAX_DISPLAY_LEN {
        return message.to_string();
    }
    let cut: String = message.chars().take(MAX_DISPLAY_LEN).collect();
    format!("{}…", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_field_wins() {
        let body = r#"{"code":400,"message":"Validation failed","response":null}"#;
        assert_eq!(normalize_error_body(400, body), "Validation failed");
    }

    #[test]
    fn bare_string_passes_through() {
        assert_eq!(normalize_error_body(500, r#""boom""#), "boom");
    }

    #[test]
    fn field_map_values_joined_in_key_order() {
        let body = r#"{"title":"Title is required","dueDate":"Due date is required"}"#;
        assert_eq!(
            normalize_error_body(400, body),
            "Due date is required; Title is required"
        );
    }

    #[test]
    fn html_page_gets_friendly_fallback() {
        let body = "<!DOCTYPE html><html><body><h1>502 Bad Gateway</h1></body></html>";
        assert_eq!(normalize_error_body(502, body), HTML_FALLBACK);
    }

    #[test]
    fn invalid_request_is_cut_to_first_sentence() {
        let body = r#"{"message":"Invalid request: Cannot deserialize value of type `java.time.LocalDate` from String \"31-07-2024\" (through reference chain: TaskRequest[\"dueDate\"])"}"#;
        assert_eq!(
            normalize_error_body(400, body),
            "Invalid request: Cannot deserialize value of type `java.time.LocalDate` from String \"31-07-2024\""
        );
    }

    #[test]
    fn unrecognized_field_keeps_only_the_field() {
        let body = r#"{"message":"Unrecognized field \"titel\" (class com.trading.task_management.tasks.dto.TaskRequest), not marked as ignorable (4 known properties)"}"#;
        assert_eq!(normalize_error_body(400, body), "Unrecognized field \"titel\"");
    }

    #[test]
    fn empty_body_reports_status() {
        assert_eq!(normalize_error_body(503, "  "), "Request failed with status 503");
    }

    #[test]
    fn auth_failures_are_flagged() {
        assert!(ApiError::SessionExpired.is_auth_failure());
        assert!(ApiError::Api { status: 403, message: "Forbidden".to_string() }.is_auth_failure());
        assert!(!ApiError::Api { status: 404, message: "nope".to_string() }.is_auth_failure());
    }
}
