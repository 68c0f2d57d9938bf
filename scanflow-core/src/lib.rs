pub mod collaborators;
pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod queue;

pub use collaborators::{
    AuthProvider, ConnectivityOracle, FixedConnectivity, RequestEvent, TelemetrySink,
    TracingTelemetry,
};
pub use config::ScanflowConfig;
pub use error::{ScanflowError, ValidationError};
pub use gateway::{ApiRequest, ApiResponse, FilePart, Gateway, GatewayError, MultipartPayload};
pub use models::{
    CapturedImage, Confidence, ImageSource, OfflineQueueItem, ReceiptFields, RemoteRef,
    SubmissionRecord,
};
pub use normalize::{normalize, normalize_on, NormalizedReceipt};
pub use progress::{Stage, StageProjector, StageUpdate, Track};
pub use queue::{FileQueue, OfflineStore, QueueError};
