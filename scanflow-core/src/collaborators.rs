//! Interfaces to the collaborators the pipeline consumes but does not own.

use async_trait::async_trait;

/// Token source owned by the authentication layer. The pipeline only ever
/// holds a transient copy of a token for the duration of one request.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn current_token(&self) -> Option<String>;

    /// Obtain a fresh token. Callers coalesce concurrent refreshes.
    async fn refresh_token(&self) -> Option<String>;

    async fn is_authenticated(&self) -> bool;

    async fn sign_out(&self);
}

/// Reports whether the device can reach the network right now.
pub trait ConnectivityOracle: Send + Sync {
    fn is_connected(&self) -> bool;
}

/// Connectivity that never changes; used by the CLI and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedConnectivity(pub bool);

impl ConnectivityOracle for FixedConnectivity {
    fn is_connected(&self) -> bool {
        self.0
    }
}

/// Latency/outcome of one remote request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEvent {
    pub endpoint: String,
    pub method: String,
    pub duration_ms: u64,
    pub success: bool,
    /// 0 when no response was received.
    pub status_code: u16,
}

/// Fire-and-forget sink for request events.
pub trait TelemetrySink: Send + Sync {
    fn record_request(&self, event: &RequestEvent);
}

/// Default sink: request events as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn record_request(&self, event: &RequestEvent) {
        tracing::info!(
            target: "scanflow::telemetry",
            endpoint = %event.endpoint,
            method = %event.method,
            duration_ms = event.duration_ms,
            success = event.success,
            status_code = event.status_code,
            "request"
        );
    }
}
