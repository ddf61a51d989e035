//! HTTP wrapper around the task-management service.
//!
//! Every call goes through one send path, which attaches the bearer token
//! for non-auth endpoints and, on a 401, refreshes the access token and
//! replays the original request exactly once. Concurrent 401s funnel through
//! one refresh gate: whoever holds the gate performs the refresh, waiters
//! observe the rotated token and skip their own call.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{ApiError, normalize_error_body};
use crate::protocol::{
    ApiEnvelope, AuthenticateRequest, PageBlock, RefreshTokenRequest, RegisterRequest,
    TokenResponse,
};
use crate::query::TaskQuery;
use crate::session::{Session, SessionStore, User};
use crate::task::{Task, TaskChanges, TaskDraft};

pub const BASE_PATH: &str = "/api/task-management";

/// Public endpoints that must never carry an Authorization header. Logout is
/// deliberately absent: it authenticates like any other call.
const AUTH_ENDPOINTS: [&str; 3] = [
    "/auth/v1/register",
    "/auth/v1/authenticate",
    "/auth/v1/refresh-token",
];

pub(crate) fn is_auth_endpoint(path: &str) -> bool {
    AUTH_ENDPOINTS.iter().any(|prefix| path.starts_with(prefix))
}

pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    session: Arc<SessionStore>,
    refresh_gate: Mutex<()>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient").field("base", &self.base.as_str()).finish()
    }
}

impl ApiClient {
    pub fn new(server_url: &str, session: Arc<SessionStore>) -> anyhow::Result<Self> {
        let base = Url::parse(&format!("{}{}/", server_url.trim_end_matches('/'), BASE_PATH))?;
        debug!(base = %base, "api client ready");
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            session,
            refresh_gate: Mutex::new(()),
        })
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|err| ApiError::Decode(format!("invalid endpoint {path}: {err}")))
    }

    /// One plain round trip: build, attach bearer (non-auth paths only),
    /// send.
    async fn dispatch<B: Serialize + ?Sized>(
        &self,
        method: &Method,
        path: &str,
        params: Option<&[(String, String)]>,
        body: Option<&B>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = self.endpoint(path)?;
        let mut request = self.http.request(method.clone(), url);

        if let Some(params) = params {
            request = request.query(params);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        if !is_auth_endpoint(path)
            && let Some(token) = self.session.access_token()
        {
            request = request.bearer_auth(token);
        }

        debug!(%method, path, "dispatching request");
        Ok(request.send().await?)
    }

    /// Send with 401 handling: at most one refresh attempt and at most one
    /// replay of the original request, counted explicitly.
    #[tracing::instrument(skip(self, params, body), fields(%method, path))]
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        params: Option<&[(String, String)]>,
        body: Option<&B>,
    ) -> Result<(StatusCode, String), ApiError> {
        let mut attempted_refresh = false;
        loop {
            let response = self.dispatch(&method, path, params, body).await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED
                && !is_auth_endpoint(path)
                && !attempted_refresh
            {
                attempted_refresh = true;
                info!(path, "401 received; attempting token refresh");
                let stale = self.session.access_token();
                self.refresh_access_token(stale).await?;
                continue;
            }

            let text = response.text().await?;
            if status.is_success() {
                return Ok((status, text));
            }

            let message = normalize_error_body(status.as_u16(), &text);
            warn!(status = status.as_u16(), message = %message, "request failed");
            return Err(ApiError::Api {
                status: status.as_u16(),
                message,
            });
        }
    }

    /// Refresh the access token, deduplicating concurrent attempts.
    ///
    /// `stale_token` is the access token the caller saw when it got its 401;
    /// if the stored token differs by the time the gate is acquired, another
    /// request already refreshed and this one has nothing to do.
    async fn refresh_access_token(&self, stale_token: Option<String>) -> Result<(), ApiError> {
        let _gate = self.refresh_gate.lock().await;

        if self.session.access_token() != stale_token {
            debug!("token already rotated by a concurrent refresh");
            return Ok(());
        }

        let Some(refresh_token) = self.session.refresh_token() else {
            self.drop_session()?;
            return Err(ApiError::SessionExpired);
        };

        let response = self
            .dispatch(
                &Method::POST,
                "/auth/v1/refresh-token",
                None,
                Some(&RefreshTokenRequest { refresh_token }),
            )
            .await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "refresh rejected; clearing session");
            self.drop_session()?;
            return Err(ApiError::SessionExpired);
        }

        let tokens: TokenResponse = serde_json::from_str(&text)
            .map_err(|err| ApiError::Decode(err.to_string()))?;
        match tokens.access_token {
            Some(token) if !token.is_empty() => {
                self.session
                    .rotate_access_token(token)
                    .map_err(|err| ApiError::Storage(err.to_string()))?;
                info!("access token refreshed");
                Ok(())
            }
            _ => {
                warn!("refresh response carried no access token; clearing session");
                self.drop_session()?;
                Err(ApiError::SessionExpired)
            }
        }
    }

    fn drop_session(&self) -> Result<(), ApiError> {
        self.session
            .clear()
            .map_err(|err| ApiError::Storage(err.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ApiError> {
        serde_json::from_str(text).map_err(|err| ApiError::Decode(err.to_string()))
    }

    fn unwrap_envelope<T: DeserializeOwned>(&self, text: &str) -> Result<T, ApiError> {
        let envelope: ApiEnvelope<T> = self.decode(text)?;
        envelope
            .response
            .ok_or_else(|| ApiError::Decode("envelope carried no payload".to_string()))
    }

    // --- auth operations ---------------------------------------------------

    /// Register and establish the session; the user object is derived from
    /// the submitted form since the token response carries none.
    #[tracing::instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: RegisterRequest) -> Result<Session, ApiError> {
        let (_, text) = self
            .send(Method::POST, "/auth/v1/register", None, Some(&request))
            .await?;
        let tokens: TokenResponse = self.decode(&text)?;

        let user = User {
            first_name: Some(request.first_name),
            last_name: Some(request.last_name),
            email: request.email,
        };
        self.install_session(user, tokens)
    }

    /// Authenticate and establish the session; only the email is known here.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        let request = AuthenticateRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let (_, text) = self
            .send(Method::POST, "/auth/v1/authenticate", None, Some(&request))
            .await?;
        let tokens: TokenResponse = self.decode(&text)?;

        let user = User {
            first_name: None,
            last_name: None,
            email: email.to_string(),
        };
        self.install_session(user, tokens)
    }

    fn install_session(&self, user: User, tokens: TokenResponse) -> Result<Session, ApiError> {
        let (Some(access_token), Some(refresh_token)) =
            (tokens.access_token, tokens.refresh_token)
        else {
            return Err(ApiError::Decode(
                "auth response missing access or refresh token".to_string(),
            ));
        };

        let session = Session {
            user,
            access_token,
            refresh_token,
        };
        self.session
            .establish(session.clone())
            .map_err(|err| ApiError::Storage(err.to_string()))?;
        Ok(session)
    }

    /// Server-side logout, then clear. The session is cleared only when the
    /// call succeeds; a failed call leaves it in place (see DESIGN.md).
    #[tracing::instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), ApiError> {
        let Some(refresh_token) = self.session.refresh_token() else {
            return Err(ApiError::SessionExpired);
        };

        self.send(
            Method::POST,
            "/auth/v1/logout",
            None,
            Some(&RefreshTokenRequest { refresh_token }),
        )
        .await?;
        self.drop_session()
    }

    // --- task operations ---------------------------------------------------

    #[tracing::instrument(skip(self, query))]
    pub async fn fetch_tasks(&self, query: &TaskQuery) -> Result<PageBlock, ApiError> {
        let params = query.to_params();
        let (_, text) = self
            .send::<()>(Method::GET, "/v1/tasks", Some(&params), None)
            .await?;
        self.unwrap_envelope(&text)
    }

    #[tracing::instrument(skip(self, query))]
    pub async fn search_tasks(&self, title: &str, query: &TaskQuery) -> Result<PageBlock, ApiError> {
        let params = query.to_search_params(title);
        let (_, text) = self
            .send::<()>(Method::GET, "/v1/tasks/search", Some(&params), None)
            .await?;
        self.unwrap_envelope(&text)
    }

    #[tracing::instrument(skip(self, draft), fields(title = %draft.title))]
    pub async fn create_task(&self, draft: &TaskDraft) -> Result<Task, ApiError> {
        let (_, text) = self
            .send(Method::POST, "/v1/new-task", None, Some(draft))
            .await?;
        self.unwrap_envelope(&text)
    }

    #[tracing::instrument(skip(self, changes), fields(%id))]
    pub async fn update_task(&self, id: Uuid, changes: &TaskChanges) -> Result<Task, ApiError> {
        let (_, text) = self
            .send(Method::PUT, &format!("/v1/tasks/{id}"), None, Some(changes))
            .await?;
        self.unwrap_envelope(&text)
    }

    #[tracing::instrument(skip(self), fields(%id))]
    pub async fn delete_task(&self, id: Uuid) -> Result<(), ApiError> {
        self.send::<()>(Method::DELETE, &format!("/v1/tasks/{id}"), None, None)
            .await?;
        Ok(())
    }
}
