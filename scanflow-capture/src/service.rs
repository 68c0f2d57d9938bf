//! Remote extraction (`submit`) and update (`update`) endpoints.

use async_trait::async_trait;
use bytes::Bytes;
use scanflow_core::config::ApiConfig;
use scanflow_core::gateway::{ApiRequest, FilePart, Gateway, GatewayError, MultipartPayload};
use scanflow_core::normalize::{normalize_tags, tags_to_string};
use scanflow_core::{CapturedImage, ReceiptFields};
use serde_json::{json, Value};
use std::sync::Arc;

/// What the user chose before capturing: applied to the upload and used as
/// defaults when the response does not echo it back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionContext {
    pub entity: String,
    pub tags: Vec<String>,
    pub notes: String,
}

impl SubmissionContext {
    pub fn new(entity: impl Into<String>, tags: &[&str], notes: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            tags: normalize_tags(tags),
            notes: notes.into(),
        }
    }
}

/// Seam between the capture controller and the backend.
#[async_trait]
pub trait ReceiptService: Send + Sync {
    /// Upload a receipt image for extraction. Returns the raw response body.
    async fn submit(
        &self,
        image: &CapturedImage,
        context: &SubmissionContext,
        idempotency_key: &str,
    ) -> Result<Value, GatewayError>;

    /// Persist edited fields onto an existing server record.
    async fn update(
        &self,
        remote_id: &str,
        fields: &ReceiptFields,
        idempotency_key: &str,
    ) -> Result<Value, GatewayError>;
}

/// [`ReceiptService`] over the authenticated gateway.
pub struct HttpReceiptService {
    gateway: Arc<Gateway>,
    upload_path: String,
    update_path_prefix: String,
}

impl HttpReceiptService {
    pub fn new(gateway: Arc<Gateway>, config: &ApiConfig) -> Self {
        Self {
            gateway,
            upload_path: config.upload_path.clone(),
            update_path_prefix: config.update_path_prefix.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ReceiptService for HttpReceiptService {
    async fn submit(
        &self,
        image: &CapturedImage,
        context: &SubmissionContext,
        idempotency_key: &str,
    ) -> Result<Value, GatewayError> {
        let bytes = tokio::fs::read(&image.path).await.map_err(|e| {
            GatewayError::Payload(format!("cannot read {}: {}", image.path.display(), e))
        })?;

        let payload = MultipartPayload::default()
            .text("entity", context.entity.clone())
            .text("tags", tags_to_string(&context.tags))
            .text("notes", context.notes.clone())
            .text("source", source_label(image))
            .file(FilePart {
                field: "receipt".to_string(),
                file_name: image.file_name(),
                mime: mime_for(image).to_string(),
                bytes: Bytes::from(bytes),
            });

        let request = ApiRequest::post(self.upload_path.clone())
            .multipart(payload)
            .idempotency_key(idempotency_key);
        Ok(self.gateway.send(&request).await?.body)
    }

    async fn update(
        &self,
        remote_id: &str,
        fields: &ReceiptFields,
        idempotency_key: &str,
    ) -> Result<Value, GatewayError> {
        let body = json!({
            "vendor": fields.vendor.trim(),
            "amount": fields.amount.trim(),
            "date": fields.date.format("%Y-%m-%d").to_string(),
            "entity": fields.entity,
            "tags": normalize_tags(&fields.tags),
            "notes": fields.notes,
        });
        let request = ApiRequest::put(format!("{}/{}", self.update_path_prefix, remote_id))
            .json(body)
            .idempotency_key(idempotency_key);
        Ok(self.gateway.send(&request).await?.body)
    }
}

fn source_label(image: &CapturedImage) -> &'static str {
    match image.source {
        scanflow_core::ImageSource::Camera => "camera",
        scanflow_core::ImageSource::Library => "library",
    }
}

fn mime_for(image: &CapturedImage) -> &'static str {
    let ext = image
        .path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "heic" => "image/heic",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}
