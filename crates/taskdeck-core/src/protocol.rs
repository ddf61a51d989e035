//! Wire shapes of the task-management service.
//!
//! Task endpoints wrap their payloads in a common envelope; auth endpoints
//! answer with a flat token response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::Task;

/// `{ code, timestamp, message, response }`: the envelope every task
/// endpoint answers with.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub code: u16,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message: Option<String>,
    pub response: Option<T>,
}

/// Pagination block nested inside the envelope of the list endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageBlock {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_elements: u64,
    pub page_size: u32,
    #[serde(default)]
    pub data: Vec<Task>,
}

/// Flat response of the auth endpoints. Refresh answers with a fresh access
/// token and echoes no refresh token.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthenticateRequest {
    pub email: String,
    pub password: String,
}

/// Body of both the refresh and the logout call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}
