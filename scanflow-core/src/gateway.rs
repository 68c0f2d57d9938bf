//! Authenticated request gateway.
//!
//! Every remote call goes through [`Gateway::send`], which:
//! - attaches the current bearer token unless the request is anonymous
//! - validates both the HTTP status and the application-level `success` flag
//! - on a 401, performs one coalesced token refresh and retries the same
//!   request once with the refreshed token
//! - reports each attempt to the telemetry sink without letting the sink
//!   affect the request

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use reqwest::{multipart, Client, Method};
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::collaborators::{AuthProvider, RequestEvent, TelemetrySink};
use crate::config::ApiConfig;

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// No response was obtained (connect failure, timeout, dropped body).
    #[error("Network error: {message}")]
    Network { message: String },

    /// The server answered with a failure, via status or `success: false`.
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Invalid request payload: {0}")]
    Payload(String),
}

impl GatewayError {
    /// HTTP status, or 0 when no response was received.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Api { status, .. } => *status,
            _ => 0,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GatewayError::Api { status: 401, .. })
    }

    fn from_transport(e: reqwest::Error) -> Self {
        let message = if e.is_timeout() {
            format!("request timed out: {}", e)
        } else {
            e.to_string()
        };
        GatewayError::Network { message }
    }
}

// ============================================================================
// Requests
// ============================================================================

/// A file attached to a multipart body.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Bytes,
}

/// Cloneable multipart description, rebuilt into a form for every attempt.
#[derive(Debug, Clone, Default)]
pub struct MultipartPayload {
    pub fields: Vec<(String, String)>,
    pub file: Option<FilePart>,
}

impl MultipartPayload {
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn file(mut self, file: FilePart) -> Self {
        self.file = Some(file);
        self
    }

    fn to_form(&self) -> Result<multipart::Form, GatewayError> {
        let mut form = multipart::Form::new();
        for (name, value) in &self.fields {
            form = form.text(name.clone(), value.clone());
        }
        if let Some(file) = &self.file {
            let part = multipart::Part::bytes(file.bytes.to_vec())
                .file_name(file.file_name.clone())
                .mime_str(&file.mime)
                .map_err(|e| GatewayError::Payload(e.to_string()))?;
            form = form.part(file.field.clone(), part);
        }
        Ok(form)
    }
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart(MultipartPayload),
}

/// One logical remote operation. A retry after refresh resends this exact
/// request, idempotency key included.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: RequestBody,
    pub anonymous: bool,
    pub idempotency_key: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: RequestBody::Empty,
            anonymous: false,
            idempotency_key: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn multipart(mut self, payload: MultipartPayload) -> Self {
        self.body = RequestBody::Multipart(payload);
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }

    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

// ============================================================================
// Refresh coalescing
// ============================================================================

type SharedRefresh = Shared<BoxFuture<'static, Option<String>>>;

#[derive(Default)]
struct RefreshSlot {
    /// Bumped each time a refresh completes.
    generation: u64,
    latest: Option<String>,
    in_flight: Option<SharedRefresh>,
}

/// Single in-flight token refresh shared by every request that saw a 401.
struct RefreshCoordinator {
    auth: Arc<dyn AuthProvider>,
    slot: Arc<Mutex<RefreshSlot>>,
}

impl RefreshCoordinator {
    fn new(auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            auth,
            slot: Arc::new(Mutex::new(RefreshSlot::default())),
        }
    }

    fn generation(&self) -> u64 {
        self.slot.lock().generation
    }

    /// Refresh on behalf of a request sent during `observed`. If a refresh
    /// already finished since then its outcome is reused; if one is running
    /// the caller joins it.
    async fn refresh(&self, observed: u64) -> Option<String> {
        let shared = {
            let mut slot = self.slot.lock();
            if slot.generation > observed {
                return slot.latest.clone();
            }
            if let Some(in_flight) = slot.in_flight.clone() {
                in_flight
            } else {
                let fut = Self::run_refresh(self.auth.clone(), self.slot.clone())
                    .boxed()
                    .shared();
                slot.in_flight = Some(fut.clone());
                fut
            }
        };
        shared.await
    }

    async fn run_refresh(auth: Arc<dyn AuthProvider>, slot: Arc<Mutex<RefreshSlot>>) -> Option<String> {
        tracing::info!("Access token rejected, refreshing");
        let token = auth.refresh_token().await;
        if token.is_none() {
            tracing::warn!("Token refresh failed, signing out");
            auth.sign_out().await;
        }
        {
            let mut slot = slot.lock();
            slot.generation += 1;
            slot.latest = token.clone();
            slot.in_flight = None;
        }
        token
    }
}

// ============================================================================
// Gateway
// ============================================================================

pub struct Gateway {
    client: Client,
    base_url: String,
    auth: Arc<dyn AuthProvider>,
    telemetry: Arc<dyn TelemetrySink>,
    refresh: RefreshCoordinator,
}

impl Gateway {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        auth: Arc<dyn AuthProvider>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(GatewayError::from_transport)?;
        let base_url: String = base_url.into();

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            refresh: RefreshCoordinator::new(auth.clone()),
            auth,
            telemetry,
        })
    }

    pub fn from_config(
        config: &ApiConfig,
        auth: Arc<dyn AuthProvider>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Result<Self, GatewayError> {
        Self::new(config.base_url.clone(), config.timeout(), auth, telemetry)
    }

    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, GatewayError> {
        let observed = self.refresh.generation();
        let token = if request.anonymous {
            None
        } else {
            self.auth.current_token().await
        };

        match self.send_once(request, token.as_deref()).await {
            Err(e) if e.is_unauthorized() && !request.anonymous => {
                match self.refresh.refresh(observed).await {
                    Some(fresh) => {
                        tracing::debug!(path = %request.path, "Retrying request with refreshed token");
                        self.send_once(request, Some(&fresh)).await
                    }
                    None => Err(e),
                }
            }
            other => other,
        }
    }

    async fn send_once(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<ApiResponse, GatewayError> {
        let start = Instant::now();
        let result = self.execute(request, token).await;
        self.report(request, start.elapsed(), &result);
        result
    }

    async fn execute(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<ApiResponse, GatewayError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.client.request(request.method.clone(), &url);

        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(key) = &request.idempotency_key {
            builder = builder.header(IDEMPOTENCY_HEADER, key);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(body),
            RequestBody::Multipart(payload) => builder.multipart(payload.to_form()?),
        };

        let response = builder.send().await.map_err(GatewayError::from_transport)?;
        let status = response.status();
        let text = response.text().await.map_err(GatewayError::from_transport)?;
        let body: Option<Value> = if text.trim().is_empty() {
            Some(Value::Object(Default::default()))
        } else {
            serde_json::from_str(&text).ok()
        };

        if !status.is_success() {
            let (code, message) = error_detail(body.as_ref(), &text);
            tracing::warn!(status = status.as_u16(), code = ?code, message = %message, "API error");
            return Err(GatewayError::Api {
                status: status.as_u16(),
                code,
                message,
            });
        }

        let body = body.filter(Value::is_object).ok_or_else(|| {
            GatewayError::MalformedResponse(format!(
                "expected a JSON object from {}",
                request.path
            ))
        })?;

        if body.get("success").and_then(Value::as_bool) == Some(false) {
            let (code, message) = error_detail(Some(&body), &text);
            tracing::warn!(status = status.as_u16(), code = ?code, message = %message, "API reported failure");
            return Err(GatewayError::Api {
                status: status.as_u16(),
                code,
                message,
            });
        }

        Ok(ApiResponse {
            status: status.as_u16(),
            body,
        })
    }

    fn report(&self, request: &ApiRequest, elapsed: Duration, result: &Result<ApiResponse, GatewayError>) {
        let event = RequestEvent {
            endpoint: request.path.clone(),
            method: request.method.to_string(),
            duration_ms: elapsed.as_millis() as u64,
            success: result.is_ok(),
            status_code: match result {
                Ok(response) => response.status,
                Err(e) => e.status_code(),
            },
        };
        let telemetry = &self.telemetry;
        if catch_unwind(AssertUnwindSafe(|| telemetry.record_request(&event))).is_err() {
            tracing::warn!(endpoint = %event.endpoint, "Telemetry sink panicked; event dropped");
        }
    }
}

/// Pull `(code, message)` out of an error body such as
/// `{"error": {"code": "...", "message": "..."}}` or
/// `{"success": false, "error": "...", "code": "..."}`.
fn error_detail(body: Option<&Value>, raw: &str) -> (Option<String>, String) {
    let Some(body) = body else {
        return (None, raw.trim().to_string());
    };
    let error = body.get("error");
    let code = error
        .and_then(|e| e.get("code"))
        .or_else(|| body.get("code"))
        .or_else(|| body.get("error_code"))
        .and_then(|c| match c {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
    let message = error
        .and_then(|e| e.get("message"))
        .or_else(|| body.get("message"))
        .or(error)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| raw.trim().to_string());
    (code, message)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FakeAuth {
        token: Mutex<Option<String>>,
        refreshed: Option<String>,
        refresh_calls: AtomicUsize,
        sign_outs: AtomicUsize,
    }

    impl FakeAuth {
        fn new(token: &str, refreshed: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                token: Mutex::new(Some(token.to_string())),
                refreshed: refreshed.map(str::to_string),
                refresh_calls: AtomicUsize::new(0),
                sign_outs: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AuthProvider for FakeAuth {
        async fn current_token(&self) -> Option<String> {
            self.token.lock().clone()
        }

        async fn refresh_token(&self) -> Option<String> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if let Some(fresh) = &self.refreshed {
                *self.token.lock() = Some(fresh.clone());
            }
            self.refreshed.clone()
        }

        async fn is_authenticated(&self) -> bool {
            self.token.lock().is_some()
        }

        async fn sign_out(&self) {
            self.sign_outs.fetch_add(1, Ordering::SeqCst);
            *self.token.lock() = None;
        }
    }

    #[derive(Default)]
    struct RecordingTelemetry {
        events: Mutex<Vec<RequestEvent>>,
    }

    impl TelemetrySink for RecordingTelemetry {
        fn record_request(&self, event: &RequestEvent) {
            self.events.lock().push(event.clone());
        }
    }

    struct PanickingTelemetry;

    impl TelemetrySink for PanickingTelemetry {
        fn record_request(&self, _event: &RequestEvent) {
            panic!("sink exploded");
        }
    }

    fn gateway(
        uri: &str,
        auth: Arc<FakeAuth>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Gateway {
        Gateway::new(uri, Duration::from_secs(5), auth, telemetry).expect("Failed to build gateway")
    }

    async fn mount_token_gate(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/expenses"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/expenses"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "code": "token_expired", "message": "Token expired" }
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_send_attaches_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/expenses"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
            .mount(&server)
            .await;

        let gw = gateway(&server.uri(), FakeAuth::new("tok-1", None), Arc::new(RecordingTelemetry::default()));
        let response = gw.send(&ApiRequest::get("/expenses")).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body["items"], json!([]));
    }

    #[tokio::test]
    async fn test_anonymous_request_has_no_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let gw = gateway(&server.uri(), FakeAuth::new("tok-1", None), Arc::new(RecordingTelemetry::default()));
        gw.send(&ApiRequest::get("/health").anonymous()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_401_refreshes_once_and_retries_same_request() {
        let server = MockServer::start().await;
        mount_token_gate(&server).await;

        let auth = FakeAuth::new("stale", Some("fresh"));
        let gw = gateway(&server.uri(), auth.clone(), Arc::new(RecordingTelemetry::default()));

        let request = ApiRequest::get("/expenses").idempotency_key("save-1");
        let response = gw.send(&request).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(auth.refresh_calls.load(Ordering::SeqCst), 1);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        for r in &requests {
            assert_eq!(r.headers.get(IDEMPOTENCY_HEADER).unwrap(), "save-1");
        }
    }

    #[tokio::test]
    async fn test_failed_refresh_surfaces_original_401_and_signs_out() {
        let server = MockServer::start().await;
        mount_token_gate(&server).await;

        let auth = FakeAuth::new("stale", None);
        let gw = gateway(&server.uri(), auth.clone(), Arc::new(RecordingTelemetry::default()));

        let err = gw.send(&ApiRequest::get("/expenses")).await.unwrap_err();

        assert_eq!(
            err,
            GatewayError::Api {
                status: 401,
                code: Some("token_expired".to_string()),
                message: "Token expired".to_string(),
            }
        );
        assert_eq!(auth.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(auth.sign_outs.load(Ordering::SeqCst), 1);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_failure_is_not_retried_again() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "nope" })))
            .mount(&server)
            .await;

        let auth = FakeAuth::new("stale", Some("also-rejected"));
        let gw = gateway(&server.uri(), auth.clone(), Arc::new(RecordingTelemetry::default()));

        let err = gw.send(&ApiRequest::get("/expenses")).await.unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(auth.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_401s_share_one_refresh() {
        let server = MockServer::start().await;
        mount_token_gate(&server).await;

        let auth = FakeAuth::new("stale", Some("fresh"));
        let gw = gateway(&server.uri(), auth.clone(), Arc::new(RecordingTelemetry::default()));

        let requests: Vec<ApiRequest> = (0..5)
            .map(|i| ApiRequest::get("/expenses").idempotency_key(format!("req-{i}")))
            .collect();
        let results = futures::future::join_all(requests.iter().map(|r| gw.send(r))).await;

        assert!(results.iter().all(Result::is_ok), "results: {results:?}");
        assert_eq!(auth.refresh_calls.load(Ordering::SeqCst), 1);

        let fresh_hits = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.headers.get("authorization").map(|v| v == "Bearer fresh").unwrap_or(false))
            .count();
        assert_eq!(fresh_hits, 5);
    }

    #[tokio::test]
    async fn test_network_error_skips_refresh() {
        let auth = FakeAuth::new("stale", Some("fresh"));
        let telemetry = Arc::new(RecordingTelemetry::default());
        let gw = gateway("http://127.0.0.1:1", auth.clone(), telemetry.clone());

        let err = gw.send(&ApiRequest::get("/expenses")).await.unwrap_err();

        assert!(matches!(err, GatewayError::Network { .. }));
        assert_eq!(err.status_code(), 0);
        assert_eq!(auth.refresh_calls.load(Ordering::SeqCst), 0);

        let events = telemetry.events.lock();
        assert_eq!(events.len(), 1);
        assert!(!events[0].success);
        assert_eq!(events[0].status_code, 0);
    }

    #[tokio::test]
    async fn test_timeout_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let auth = FakeAuth::new("stale", Some("fresh"));
        let gw = Gateway::new(
            server.uri(),
            Duration::from_millis(200),
            auth.clone(),
            Arc::new(RecordingTelemetry::default()),
        )
        .unwrap();

        let err = gw.send(&ApiRequest::get("/expenses")).await.unwrap_err();

        assert!(matches!(err, GatewayError::Network { .. }), "got {err:?}");
        assert_eq!(auth.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_application_failure_inside_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "error": "Expense is locked",
                "code": "EXPENSE_LOCKED"
            })))
            .mount(&server)
            .await;

        let gw = gateway(&server.uri(), FakeAuth::new("tok", None), Arc::new(RecordingTelemetry::default()));
        let err = gw
            .send(&ApiRequest::put("/expenses/1").json(json!({ "vendor": "x" })))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            GatewayError::Api {
                status: 200,
                code: Some("EXPENSE_LOCKED".to_string()),
                message: "Expense is locked".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_server_error_is_surfaced_without_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let auth = FakeAuth::new("tok", Some("fresh"));
        let gw = gateway(&server.uri(), auth.clone(), Arc::new(RecordingTelemetry::default()));
        let err = gw.send(&ApiRequest::get("/expenses")).await.unwrap_err();

        assert_eq!(err.status_code(), 503);
        assert!(err.to_string().contains("upstream down"));
        assert_eq!(auth.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_object_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let gw = gateway(&server.uri(), FakeAuth::new("tok", None), Arc::new(RecordingTelemetry::default()));
        let err = gw.send(&ApiRequest::get("/expenses")).await.unwrap_err();

        assert!(matches!(err, GatewayError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_multipart_upload_and_telemetry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/receipts/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true, "id": "exp_1" })))
            .mount(&server)
            .await;

        let telemetry = Arc::new(RecordingTelemetry::default());
        let gw = gateway(&server.uri(), FakeAuth::new("tok", None), telemetry.clone());

        let payload = MultipartPayload::default()
            .text("entity", "Acme LLC")
            .file(FilePart {
                field: "receipt".to_string(),
                file_name: "r.jpg".to_string(),
                mime: "image/jpeg".to_string(),
                bytes: Bytes::from_static(b"\xFF\xD8\xFFfake"),
            });
        let response = gw
            .send(&ApiRequest::post("/receipts/upload").multipart(payload))
            .await
            .unwrap();
        assert_eq!(response.body["id"], "exp_1");

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("Acme LLC"));
        assert!(body.contains("filename=\"r.jpg\""));

        let events = telemetry.events.lock();
        assert_eq!(
            events[0],
            RequestEvent {
                endpoint: "/receipts/upload".to_string(),
                method: "POST".to_string(),
                duration_ms: events[0].duration_ms,
                success: true,
                status_code: 200,
            }
        );
    }

    #[tokio::test]
    async fn test_panicking_telemetry_does_not_fail_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let gw = gateway(&server.uri(), FakeAuth::new("tok", None), Arc::new(PanickingTelemetry));
        assert!(gw.send(&ApiRequest::get("/expenses")).await.is_ok());
    }
}
