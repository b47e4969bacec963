//! Middleware stages the client runs around every call.
//!
//! Request stages run once, in order, before the first dispatch. Response
//! stages only see non-2xx responses; the first one that asks for a retry or
//! fails the call wins, and a response no stage claims is normalised by
//! [`normalize_error`].

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{header::HeaderValue, Method, StatusCode};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use shared_models::auth::{AuthPayload, RefreshRequest};
use shared_models::error::{AuthFailureReason, ClientError};

use crate::client::AuthFailureHandler;
use crate::session::Session;
use crate::transport::{ApiRequest, ApiResponse, Transport};

pub const REFRESH_PATH: &str = "/auth/refresh";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub trait RequestStage: Send + Sync {
    fn name(&self) -> &'static str;
    fn on_request(&self, request: &mut ApiRequest) -> Result<(), ClientError>;
}

#[derive(Debug)]
pub enum StageOutcome {
    /// Not handled here; hand the response to the next stage.
    Continue,
    /// Resubmit this request. Ignored for requests that were already retried.
    Retry(ApiRequest),
    /// Stop and surface this error.
    Fail(ClientError),
}

#[async_trait]
pub trait ResponseStage: Send + Sync {
    fn name(&self) -> &'static str;
    async fn on_error(&self, request: &ApiRequest, response: &ApiResponse) -> StageOutcome;
}

#[derive(Clone, Default)]
pub struct Pipeline {
    request_stages: Vec<Arc<dyn RequestStage>>,
    response_stages: Vec<Arc<dyn ResponseStage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request id, bearer auth, and refresh-on-401.
    pub fn standard(
        session: Session,
        transport: Arc<dyn Transport>,
        on_auth_failure: Option<AuthFailureHandler>,
    ) -> Self {
        Self::new()
            .with_request_stage(Arc::new(RequestIdStage))
            .with_request_stage(Arc::new(BearerAuth::new(session.clone())))
            .with_response_stage(Arc::new(RefreshOnUnauthorized::new(
                session,
                transport,
                on_auth_failure,
            )))
    }

    pub fn with_request_stage(mut self, stage: Arc<dyn RequestStage>) -> Self {
        self.request_stages.push(stage);
        self
    }

    pub fn with_response_stage(mut self, stage: Arc<dyn ResponseStage>) -> Self {
        self.response_stages.push(stage);
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.request_stages
            .iter()
            .map(|s| s.name())
            .chain(self.response_stages.iter().map(|s| s.name()))
            .collect()
    }

    pub fn prepare(&self, request: &mut ApiRequest) -> Result<(), ClientError> {
        for stage in &self.request_stages {
            stage.on_request(request)?;
        }
        Ok(())
    }

    pub async fn handle_error(&self, request: &ApiRequest, response: &ApiResponse) -> StageOutcome {
        for stage in &self.response_stages {
            match stage.on_error(request, response).await {
                StageOutcome::Continue => continue,
                StageOutcome::Retry(_) if request.retried => {
                    warn!(
                        "Stage {} asked to retry request {} a second time, ignoring",
                        stage.name(),
                        request.id
                    );
                }
                outcome => return outcome,
            }
        }
        StageOutcome::Continue
    }
}

pub struct RequestIdStage;

impl RequestStage for RequestIdStage {
    fn name(&self) -> &'static str {
        "request-id"
    }

    fn on_request(&self, request: &mut ApiRequest) -> Result<(), ClientError> {
        let value = HeaderValue::from_str(&request.id.to_string())
            .map_err(|e| ClientError::Config(e.to_string()))?;
        request.headers.insert(REQUEST_ID_HEADER, value);
        Ok(())
    }
}

/// Attaches the stored access token, when there is one.
pub struct BearerAuth {
    session: Session,
}

impl BearerAuth {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

impl RequestStage for BearerAuth {
    fn name(&self) -> &'static str {
        "bearer-auth"
    }

    fn on_request(&self, request: &mut ApiRequest) -> Result<(), ClientError> {
        if let Some(token) = self.session.access_token() {
            request.set_bearer(&token)?;
        }
        Ok(())
    }
}

/// Exchanges the refresh token for a new access token on a 401 and asks for
/// one retry. When that is impossible the session is cleared and the auth
/// failure handler is told.
///
/// Refreshes are serialised: a 401 that arrives while another refresh is in
/// flight waits for it and reuses its token instead of refreshing again.
pub struct RefreshOnUnauthorized {
    session: Session,
    transport: Arc<dyn Transport>,
    on_auth_failure: Option<AuthFailureHandler>,
    in_flight: Mutex<()>,
}

impl RefreshOnUnauthorized {
    pub fn new(
        session: Session,
        transport: Arc<dyn Transport>,
        on_auth_failure: Option<AuthFailureHandler>,
    ) -> Self {
        Self {
            session,
            transport,
            on_auth_failure,
            in_flight: Mutex::new(()),
        }
    }

    fn fail(&self, reason: AuthFailureReason) -> StageOutcome {
        warn!("Dropping session: {}", reason);
        self.session.clear();
        if let Some(handler) = &self.on_auth_failure {
            handler(reason);
        }
        StageOutcome::Fail(ClientError::SessionExpired(reason))
    }

    fn retry_with(&self, request: &ApiRequest, token: &str) -> StageOutcome {
        let mut retry = request.clone();
        if let Err(e) = retry.set_bearer(token) {
            return StageOutcome::Fail(e);
        }
        retry.retried = true;
        StageOutcome::Retry(retry)
    }

    async fn refresh(&self, refresh_token: String) -> Result<String, AuthFailureReason> {
        // Straight to the transport: a 401 here must not re-enter this stage.
        let body = serde_json::to_value(RefreshRequest { refresh_token }).map_err(|e| {
            warn!("Could not encode refresh request: {}", e);
            AuthFailureReason::RefreshRejected
        })?;
        let request = ApiRequest::new(Method::POST, REFRESH_PATH).with_body(body);

        let response = match self.transport.send(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Token refresh call failed: {}", e);
                return Err(AuthFailureReason::RefreshRejected);
            }
        };

        if !response.is_success() {
            warn!("Token refresh rejected with status {}", response.status);
            return Err(AuthFailureReason::RefreshRejected);
        }

        let body = response.json().unwrap_or(Value::Null);
        let (access_token, rotated) =
            extract_tokens(&body).ok_or(AuthFailureReason::MissingAccessToken)?;

        if let Err(e) = self.session.store_tokens(&access_token, rotated.as_deref()) {
            warn!("Could not persist refreshed token: {}", e);
        }

        Ok(access_token)
    }
}

#[async_trait]
impl ResponseStage for RefreshOnUnauthorized {
    fn name(&self) -> &'static str {
        "refresh-on-401"
    }

    async fn on_error(&self, request: &ApiRequest, response: &ApiResponse) -> StageOutcome {
        if response.status != StatusCode::UNAUTHORIZED || request.retried {
            return StageOutcome::Continue;
        }

        let _guard = self.in_flight.lock().await;

        // Someone else refreshed while this request was in flight or waiting.
        if let Some(current) = self.session.access_token() {
            if request.bearer_token() != Some(current.as_str()) {
                debug!("Request {} reusing token refreshed by another request", request.id);
                return self.retry_with(request, &current);
            }
        }

        // Another request's refresh already failed and dropped the session;
        // the failure has been reported once.
        if request.bearer_token().is_some() && self.session.access_token().is_none() {
            debug!("Request {} found the session already cleared", request.id);
            return StageOutcome::Fail(ClientError::SessionExpired(AuthFailureReason::RefreshRejected));
        }

        let Some(refresh_token) = self.session.refresh_token() else {
            return self.fail(AuthFailureReason::MissingRefreshToken);
        };

        info!("Access token rejected for request {}, refreshing", request.id);
        match self.refresh(refresh_token).await {
            Ok(token) => self.retry_with(request, &token),
            Err(reason) => self.fail(reason),
        }
    }
}

/// Finds the new access token (and a rotated refresh token, if any) in a
/// refresh response, looking inside `data` first.
pub fn extract_tokens(body: &Value) -> Option<(String, Option<String>)> {
    [body.get("data"), Some(body)]
        .into_iter()
        .flatten()
        .filter(|v| v.is_object())
        .filter_map(|v| serde_json::from_value::<AuthPayload>(v.clone()).ok())
        .find_map(|payload| {
            payload
                .access_token
                .filter(|t| !t.is_empty())
                .map(|token| (token, payload.refresh_token.filter(|t| !t.is_empty())))
        })
}

/// Builds the uniform error for a non-2xx response.
///
/// Message priority: the server's `message` field, then its `error` string,
/// then the generic transport message for the status.
pub fn normalize_error(response: &ApiResponse) -> ClientError {
    let status = response.status.as_u16();

    let data = match response.json() {
        Ok(Value::Null) => None,
        Ok(value) => Some(value),
        Err(_) => {
            let text = response.text();
            (!text.trim().is_empty()).then(|| Value::String(text))
        }
    };

    let message = data
        .as_ref()
        .and_then(server_message)
        .unwrap_or_else(|| format!("Request failed with status code {}", status));

    ClientError::Api {
        message,
        status: Some(status),
        data,
    }
}

fn server_message(body: &Value) -> Option<String> {
    ["message", "error"]
        .iter()
        .filter_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|m| !m.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn unauthorized() -> ApiResponse {
        ApiResponse::json_body(StatusCode::UNAUTHORIZED, &json!({ "message": "Token expired" }))
    }

    fn request_with_token(token: &str) -> ApiRequest {
        let mut request = ApiRequest::new(Method::GET, "/doctors");
        request.set_bearer(token).unwrap();
        request
    }

    #[test]
    fn test_normalize_prefers_server_message() {
        let response = ApiResponse::json_body(
            StatusCode::BAD_REQUEST,
            &json!({ "success": false, "message": "Email already registered" }),
        );
        let err = normalize_error(&response);
        assert_eq!(
            err,
            ClientError::Api {
                message: "Email already registered".to_string(),
                status: Some(400),
                data: Some(json!({ "success": false, "message": "Email already registered" })),
            }
        );
    }

    #[test]
    fn test_normalize_falls_back_to_error_field() {
        let response = ApiResponse::json_body(StatusCode::CONFLICT, &json!({ "error": "Slot taken" }));
        assert_eq!(normalize_error(&response).message(), "Slot taken");
    }

    #[test]
    fn test_normalize_uses_transport_message() {
        let response = ApiResponse::new(StatusCode::INTERNAL_SERVER_ERROR, Vec::new());
        let err = normalize_error(&response);
        assert_eq!(err.message(), "Request failed with status code 500");
        assert_eq!(err.status(), Some(500));
        assert!(err.data().is_none());
    }

    #[test]
    fn test_normalize_keeps_plain_text_body() {
        let response = ApiResponse::new(StatusCode::BAD_GATEWAY, "upstream down");
        let err = normalize_error(&response);
        assert_eq!(err.message(), "Request failed with status code 502");
        assert_eq!(err.data(), Some(&Value::String("upstream down".to_string())));
    }

    #[test]
    fn test_extract_tokens_shapes() {
        assert_eq!(
            extract_tokens(&json!({ "data": { "accessToken": "a1" } })),
            Some(("a1".to_string(), None))
        );
        assert_eq!(
            extract_tokens(&json!({ "accessToken": "a2", "refreshToken": "r2" })),
            Some(("a2".to_string(), Some("r2".to_string())))
        );
        assert_eq!(
            extract_tokens(&json!({ "access_token": "a3" })),
            Some(("a3".to_string(), None))
        );
        assert_eq!(extract_tokens(&json!({ "data": { "accessToken": "" } })), None);
        assert_eq!(extract_tokens(&json!({ "success": true })), None);
        assert_eq!(extract_tokens(&Value::Null), None);
    }

    #[test]
    fn test_bearer_auth_attaches_stored_token() {
        let session = Session::in_memory();
        let stage = BearerAuth::new(session.clone());

        let mut anonymous = ApiRequest::new(Method::GET, "/specialties");
        stage.on_request(&mut anonymous).unwrap();
        assert!(anonymous.bearer_token().is_none());

        session.store_access_token("stored").unwrap();
        let mut authed = ApiRequest::new(Method::GET, "/specialties");
        stage.on_request(&mut authed).unwrap();
        assert_eq!(authed.bearer_token(), Some("stored"));
    }

    #[test]
    fn test_standard_pipeline_order() {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let pipeline = Pipeline::standard(Session::in_memory(), transport, None);
        assert_eq!(pipeline.stage_names(), vec!["request-id", "bearer-auth", "refresh-on-401"]);
    }

    #[tokio::test]
    async fn test_non_401_is_not_handled() {
        let mut transport = MockTransport::new();
        transport.expect_send().never();
        let stage = RefreshOnUnauthorized::new(Session::in_memory(), Arc::new(transport), None);

        let response = ApiResponse::new(StatusCode::FORBIDDEN, Vec::new());
        let outcome = stage.on_error(&request_with_token("t"), &response).await;
        assert_matches!(outcome, StageOutcome::Continue);
    }

    #[tokio::test]
    async fn test_retried_request_is_not_refreshed_again() {
        let mut transport = MockTransport::new();
        transport.expect_send().never();
        let session = Session::in_memory();
        session.store_tokens("t", Some("r")).unwrap();
        let stage = RefreshOnUnauthorized::new(session, Arc::new(transport), None);

        let mut request = request_with_token("t");
        request.retried = true;
        let outcome = stage.on_error(&request, &unauthorized()).await;
        assert_matches!(outcome, StageOutcome::Continue);
    }

    #[tokio::test]
    async fn test_refresh_success_requests_retry() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|req| {
                req.path == REFRESH_PATH
                    && req.body == Some(json!({ "refreshToken": "refresh-1" }))
                    && req.bearer_token().is_none()
            })
            .times(1)
            .returning(|_| {
                Ok(ApiResponse::json_body(
                    StatusCode::OK,
                    &json!({ "success": true, "data": { "accessToken": "access-2" } }),
                ))
            });

        let session = Session::in_memory();
        session.store_tokens("access-1", Some("refresh-1")).unwrap();
        let stage = RefreshOnUnauthorized::new(session.clone(), Arc::new(transport), None);

        let outcome = stage.on_error(&request_with_token("access-1"), &unauthorized()).await;
        assert_matches!(outcome, StageOutcome::Retry(retry) => {
            assert!(retry.retried);
            assert_eq!(retry.bearer_token(), Some("access-2"));
            assert_eq!(retry.path, "/doctors");
        });
        assert_eq!(session.access_token().as_deref(), Some("access-2"));
        assert_eq!(session.refresh_token().as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn test_refresh_transport_failure_clears_session() {
        let mut transport = MockTransport::new();
        transport.expect_send().times(1).returning(|_| {
            Err(crate::transport::TransportError {
                message: "connection reset".to_string(),
                timed_out: false,
            })
        });

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let handler: AuthFailureHandler = Arc::new(move |reason| {
            assert_eq!(reason, AuthFailureReason::RefreshRejected);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let session = Session::in_memory();
        session.store_tokens("access-1", Some("refresh-1")).unwrap();
        let stage = RefreshOnUnauthorized::new(session.clone(), Arc::new(transport), Some(handler));

        let outcome = stage.on_error(&request_with_token("access-1"), &unauthorized()).await;
        assert_matches!(
            outcome,
            StageOutcome::Fail(ClientError::SessionExpired(AuthFailureReason::RefreshRejected))
        );
        assert!(!session.is_authenticated());
        assert!(session.refresh_token().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_without_token_in_response_fails() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_| Ok(ApiResponse::json_body(StatusCode::OK, &json!({ "success": true }))));

        let session = Session::in_memory();
        session.store_tokens("access-1", Some("refresh-1")).unwrap();
        let stage = RefreshOnUnauthorized::new(session.clone(), Arc::new(transport), None);

        let outcome = stage.on_error(&request_with_token("access-1"), &unauthorized()).await;
        assert_matches!(
            outcome,
            StageOutcome::Fail(ClientError::SessionExpired(AuthFailureReason::MissingAccessToken))
        );
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_stale_token_reuses_newer_one() {
        let mut transport = MockTransport::new();
        transport.expect_send().never();

        let session = Session::in_memory();
        session.store_tokens("access-2", Some("refresh-1")).unwrap();
        let stage = RefreshOnUnauthorized::new(session, Arc::new(transport), None);

        let outcome = stage.on_error(&request_with_token("access-1"), &unauthorized()).await;
        assert_matches!(outcome, StageOutcome::Retry(retry) => {
            assert_eq!(retry.bearer_token(), Some("access-2"));
        });
    }

    #[tokio::test]
    async fn test_session_cleared_by_another_request_is_not_reported_again() {
        let mut transport = MockTransport::new();
        transport.expect_send().never();

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let handler: AuthFailureHandler = Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let stage = RefreshOnUnauthorized::new(Session::in_memory(), Arc::new(transport), Some(handler));

        let outcome = stage.on_error(&request_with_token("access-1"), &unauthorized()).await;
        assert_matches!(
            outcome,
            StageOutcome::Fail(ClientError::SessionExpired(AuthFailureReason::RefreshRejected))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_anonymous_401_still_reports_failure() {
        let mut transport = MockTransport::new();
        transport.expect_send().never();

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let handler: AuthFailureHandler = Arc::new(move |reason| {
            assert_eq!(reason, AuthFailureReason::MissingRefreshToken);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let stage = RefreshOnUnauthorized::new(Session::in_memory(), Arc::new(transport), Some(handler));

        let outcome = stage.on_error(&ApiRequest::new(Method::GET, "/doctors"), &unauthorized()).await;
        assert_matches!(outcome, StageOutcome::Fail(ClientError::SessionExpired(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
