use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::progress::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    Camera,
    Library,
}

/// Local handle to a captured receipt photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedImage {
    pub path: PathBuf,
    pub source: ImageSource,
}

impl CapturedImage {
    pub fn new(path: impl Into<PathBuf>, source: ImageSource) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "receipt.jpg".to_string())
    }
}

/// The user-editable receipt fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptFields {
    pub vendor: String,
    /// Decimal amount as entered or extracted, e.g. `"12.50"`.
    pub amount: String,
    pub date: NaiveDate,
    pub entity: String,
    pub tags: Vec<String>,
    pub notes: String,
}

impl ReceiptFields {
    pub fn empty(today: NaiveDate) -> Self {
        Self {
            vendor: String::new(),
            amount: String::new(),
            date: today,
            entity: String::new(),
            tags: Vec::new(),
            notes: String::new(),
        }
    }

    /// Required-field check run before every save attempt.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.vendor.trim().is_empty() {
            return Err(ValidationError::MissingVendor);
        }
        let amount = self.amount.trim();
        if amount.is_empty() {
            return Err(ValidationError::MissingAmount);
        }
        BigDecimal::from_str(amount)
            .map(|_| ())
            .map_err(|_| ValidationError::InvalidAmount(amount.to_string()))
    }
}

/// Extraction confidence, kept in both conventions the UI needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    /// 0.0–1.0, for comparisons.
    pub fraction: f64,
    /// 0–100, for display.
    pub percent: u8,
}

impl Confidence {
    pub const ZERO: Confidence = Confidence {
        fraction: 0.0,
        percent: 0,
    };
}

impl Default for Confidence {
    fn default() -> Self {
        Self::ZERO
    }
}

/// Server-side record identifier as reported by the extraction response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RemoteRef {
    /// A real identifier the backend can update.
    Remote(String),
    /// A locally-tagged sentinel (mock/offline record); never updatable.
    Placeholder(String),
}

impl RemoteRef {
    pub fn as_remote(&self) -> Option<&str> {
        match self {
            RemoteRef::Remote(id) => Some(id),
            RemoteRef::Placeholder(_) => None,
        }
    }
}

/// One receipt transaction, in flight or completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub local_id: Uuid,
    /// Set only after the upload completed with a 2xx response.
    pub remote_id: Option<RemoteRef>,
    pub fields: ReceiptFields,
    pub confidence: Confidence,
    pub ai_enhanced: bool,
    pub stage: Stage,
}

impl SubmissionRecord {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            remote_id: None,
            fields: ReceiptFields::empty(today),
            confidence: Confidence::ZERO,
            ai_enhanced: false,
            stage: Stage::Uploading,
        }
    }

    /// The identifier an update may target, if any.
    pub fn updatable_remote_id(&self) -> Option<&str> {
        self.remote_id.as_ref().and_then(RemoteRef::as_remote)
    }
}
