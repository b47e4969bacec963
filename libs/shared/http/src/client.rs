use std::sync::Arc;

use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;
use shared_models::error::{AuthFailureReason, ClientError};

use crate::pipeline::{normalize_error, Pipeline, StageOutcome};
use crate::session::Session;
use crate::transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport};

/// Called once the session has been dropped after a failed refresh. Takes the
/// place of the browser's redirect to the login view.
pub type AuthFailureHandler = Arc<dyn Fn(AuthFailureReason) + Send + Sync>;

/// The one HTTP client every service goes through.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    session: Session,
    pipeline: Pipeline,
}

pub struct ApiClientBuilder {
    config: AppConfig,
    session: Session,
    transport: Option<Arc<dyn Transport>>,
    on_auth_failure: Option<AuthFailureHandler>,
}

impl ApiClientBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn on_auth_failure<F>(mut self, handler: F) -> Self
    where
        F: Fn(AuthFailureReason) + Send + Sync + 'static,
    {
        self.on_auth_failure = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> Result<ApiClient, ClientError> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&self.config)?),
        };

        let pipeline = Pipeline::standard(self.session.clone(), transport.clone(), self.on_auth_failure);

        Ok(ApiClient {
            transport,
            session: self.session,
            pipeline,
        })
    }
}

impl ApiClient {
    pub fn builder(config: &AppConfig, session: Session) -> ApiClientBuilder {
        ApiClientBuilder {
            config: config.clone(),
            session,
            transport: None,
            on_auth_failure: None,
        }
    }

    pub fn new(config: &AppConfig, session: Session) -> Result<Self, ClientError> {
        Self::builder(config, session).build()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Runs `request` through the pipeline and returns the raw 2xx response.
    ///
    /// A 401 gets at most one refresh and one resubmission; whatever the
    /// resubmission returns is final.
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse, ClientError> {
        self.pipeline.prepare(&mut request)?;

        loop {
            debug!(
                "Dispatching {} {} ({}, retried: {})",
                request.method, request.path, request.id, request.retried
            );

            let response = self.transport.send(&request).await.map_err(|e| {
                error!("Transport failure for {} {}: {}", request.method, request.path, e);
                ClientError::Transport(e.message)
            })?;

            if response.is_success() {
                return Ok(response);
            }

            match self.pipeline.handle_error(&request, &response).await {
                StageOutcome::Retry(next) => {
                    debug!("Retrying request {} once", request.id);
                    request = next;
                    request.retried = true;
                }
                StageOutcome::Fail(err) => return Err(err),
                StageOutcome::Continue => {
                    let err = normalize_error(&response);
                    error!("API error ({}) for {} {}: {}", response.status, request.method, request.path, err);
                    return Err(err);
                }
            }
        }
    }

    /// Sends `request` and decodes the 2xx body as `T`.
    pub async fn request<T>(&self, request: ApiRequest) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        let response = self.send(request).await?;
        let payload = response.json()?;
        serde_json::from_value(payload).map_err(|e| ClientError::Decode(e.to_string()))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.request(ApiRequest::new(Method::GET, path)).await
    }

    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        self.request(ApiRequest::new(Method::GET, path).with_query(query)).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(ApiRequest::new(Method::POST, path).with_body(to_body(body)?)).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(ApiRequest::new(Method::PUT, path).with_body(to_body(body)?)).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(ApiRequest::new(Method::PATCH, path).with_body(to_body(body)?)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.request(ApiRequest::new(Method::DELETE, path)).await
    }

    /// Binary download (PDF/XLSX exports) through the same auth handling.
    pub async fn download(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<u8>, ClientError> {
        let response = self
            .send(ApiRequest::new(Method::GET, path).with_query(query))
            .await?;
        Ok(response.body)
    }
}

fn to_body<B: Serialize + ?Sized>(body: &B) -> Result<Value, ClientError> {
    serde_json::to_value(body).map_err(|e| ClientError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, TransportError};
    use assert_matches::assert_matches;
    use reqwest::StatusCode;
    use serde_json::json;

    fn client_with(transport: MockTransport, session: Session) -> ApiClient {
        ApiClient::builder(&AppConfig::default(), session)
            .transport(Arc::new(transport))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_transport_failure_is_normalized() {
        let mut transport = MockTransport::new();
        transport.expect_send().times(1).returning(|_| {
            Err(TransportError {
                message: "operation timed out".to_string(),
                timed_out: true,
            })
        });

        let client = client_with(transport, Session::in_memory());
        let err = client.get::<Value>("/doctors").await.unwrap_err();

        assert_matches!(err, ClientError::Transport(ref msg) if msg == "operation timed out");
        let body = err.to_error_body();
        assert!(!body.success);
        assert_eq!(body.status, None);
        assert_eq!(body.data, None);
    }

    #[tokio::test]
    async fn test_request_id_and_bearer_are_attached() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|req| {
                req.bearer_token() == Some("stored-token")
                    && req.headers.contains_key(crate::pipeline::REQUEST_ID_HEADER)
                    && !req.retried
            })
            .times(1)
            .returning(|_| Ok(ApiResponse::json_body(StatusCode::OK, &json!({ "data": [] }))));

        let session = Session::in_memory();
        session.store_access_token("stored-token").unwrap();

        let client = client_with(transport, session);
        let body: Value = client.get("/specialties").await.unwrap();
        assert_eq!(body, json!({ "data": [] }));
    }

    #[tokio::test]
    async fn test_decode_error_for_unexpected_shape() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .returning(|_| Ok(ApiResponse::json_body(StatusCode::OK, &json!({ "count": "many" }))));

        #[derive(Debug, serde::Deserialize)]
        struct Stats {
            #[allow(dead_code)]
            count: u32,
        }

        let client = client_with(transport, Session::in_memory());
        let result = client.get::<Stats>("/reports/stats").await;
        assert_matches!(result, Err(ClientError::Decode(_)));
    }

    #[tokio::test]
    async fn test_download_returns_raw_bytes() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|req| req.query == vec![("format".to_string(), "pdf".to_string())])
            .returning(|_| Ok(ApiResponse::new(StatusCode::OK, b"%PDF-1.7".to_vec())));

        let client = client_with(transport, Session::in_memory());
        let bytes = client.download("/reports/export", &[("format", "pdf")]).await.unwrap();
        assert_eq!(bytes, b"%PDF-1.7".to_vec());
    }
}
