//! Capture session controller.
//!
//! One controller drives one receipt at a time through
//! `idle → processing → editing → saving → {saved_remote | saved_offline | failed}`.
//! Every async result is applied only if the session that started it is
//! still current; abandoning a session lets in-flight work finish in the
//! background and discards its result.

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use scanflow_core::config::ProgressConfig;
use scanflow_core::normalize::{normalize, normalize_tags, NormalizedReceipt};
use scanflow_core::progress::{Stage, StageProjector, StageUpdate, Track};
use scanflow_core::{
    CapturedImage, ConnectivityOracle, GatewayError, OfflineQueueItem, OfflineStore, QueueError,
    ReceiptFields, SubmissionRecord, ValidationError,
};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

use crate::narrator::{narrate, Completion, Pacer};
use crate::service::{ReceiptService, SubmissionContext};
use crate::strategy::{decide_save_strategy, EnqueueReason, SaveStrategy};

// ============================================================================
// State and outcomes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Processing,
    Editing,
    Saving,
    SavedRemote,
    SavedOffline,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Processing => "processing",
            SessionState::Editing => "editing",
            SessionState::Saving => "saving",
            SessionState::SavedRemote => "saved_remote",
            SessionState::SavedOffline => "saved_offline",
            SessionState::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    SavedRemote { remote_id: String },
    /// Queued for the drain process; sync happens later.
    SavedOffline {
        item: OfflineQueueItem,
        reason: EnqueueReason,
    },
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Could not queue receipt offline: {0}")]
    Queue(#[from] QueueError),

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("a save is already in progress")]
    SaveInProgress,

    #[error("capture session was abandoned")]
    SessionDisposed,
}

// ============================================================================
// Controller
// ============================================================================

/// Everything the controller talks to, injected at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub service: Arc<dyn ReceiptService>,
    pub queue: Arc<dyn OfflineStore>,
    pub connectivity: Arc<dyn ConnectivityOracle>,
    pub pacer: Arc<dyn Pacer>,
}

struct SessionInner {
    session_id: Uuid,
    state: SessionState,
    record: Option<SubmissionRecord>,
    image: Option<CapturedImage>,
    context: SubmissionContext,
    /// Date the fields defaulted to when the session started.
    captured_on: NaiveDate,
    history: Vec<StageUpdate>,
    processing_error: Option<GatewayError>,
    last_error: Option<String>,
}

impl SessionInner {
    fn idle() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            state: SessionState::Idle,
            record: None,
            image: None,
            context: SubmissionContext::default(),
            captured_on: Utc::now().date_naive(),
            history: Vec::new(),
            processing_error: None,
            last_error: None,
        }
    }
}

pub struct CaptureController {
    deps: Collaborators,
    progress: ProgressConfig,
    inner: Mutex<SessionInner>,
    progress_tx: watch::Sender<Option<StageUpdate>>,
}

impl CaptureController {
    pub fn new(deps: Collaborators, progress: ProgressConfig) -> Self {
        let (progress_tx, _) = watch::channel(None);
        Self {
            deps,
            progress,
            inner: Mutex::new(SessionInner::idle()),
            progress_tx,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.lock().session_id
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn record(&self) -> Option<SubmissionRecord> {
        self.inner.lock().record.clone()
    }

    pub fn fields(&self) -> Option<ReceiptFields> {
        self.inner.lock().record.as_ref().map(|r| r.fields.clone())
    }

    /// Every stage update emitted for the current session, in order.
    pub fn stage_history(&self) -> Vec<StageUpdate> {
        self.inner.lock().history.clone()
    }

    /// Set when the last upload failed and the fields were left for manual entry.
    pub fn processing_error(&self) -> Option<GatewayError> {
        self.inner.lock().processing_error.clone()
    }

    /// User-facing message for the last failed save attempt.
    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<Option<StageUpdate>> {
        self.progress_tx.subscribe()
    }

    /// Start a session for a freshly acquired image and run the upload.
    ///
    /// Returns once the session has reached `editing`. An upload failure is
    /// not an error here: the record comes back with default fields and
    /// [`processing_error`](Self::processing_error) is set.
    pub async fn capture(
        &self,
        image: CapturedImage,
        context: SubmissionContext,
    ) -> Result<SubmissionRecord, CaptureError> {
        let session_id = {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Idle {
                return Err(CaptureError::InvalidState {
                    operation: "capture",
                    state: inner.state,
                });
            }

            let captured_on = Utc::now().date_naive();
            let mut record = SubmissionRecord::new(captured_on);
            apply_context(&mut record.fields, &context);

            *inner = SessionInner {
                state: SessionState::Processing,
                record: Some(record),
                image: Some(image),
                context,
                captured_on,
                ..SessionInner::idle()
            };
            tracing::info!(session_id = %inner.session_id, "Capture session started");
            inner.session_id
        };
        self.progress_tx.send_replace(None);

        self.process(session_id, FieldMerge::Replace).await
    }

    /// Re-run the upload after a processing failure. The fresh request
    /// starts again at `uploading`; it never resumes the failed one.
    /// Fields the user already filled in are kept; the extraction only fills
    /// the empty ones.
    pub async fn restart_processing(&self) -> Result<SubmissionRecord, CaptureError> {
        let session_id = {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Editing || inner.processing_error.is_none() {
                return Err(CaptureError::InvalidState {
                    operation: "restart processing",
                    state: inner.state,
                });
            }
            inner.session_id = Uuid::new_v4();
            inner.state = SessionState::Processing;
            inner.history.clear();
            inner.processing_error = None;
            tracing::info!(session_id = %inner.session_id, "Restarting receipt processing");
            inner.session_id
        };
        self.progress_tx.send_replace(None);

        self.process(session_id, FieldMerge::KeepEdits).await
    }

    /// Dispose the current session. Work still in flight for it completes
    /// but its result is dropped.
    pub fn abandon(&self) {
        let mut inner = self.inner.lock();
        tracing::info!(session_id = %inner.session_id, state = %inner.state, "Capture session abandoned");
        *inner = SessionInner::idle();
        drop(inner);
        self.progress_tx.send_replace(None);
    }

    /// Replace the editable fields. Allowed while editing, and after a failed
    /// save, which returns the session to editing.
    pub fn update_fields(&self, mut fields: ReceiptFields) -> Result<(), CaptureError> {
        let mut inner = self.inner.lock();
        let state = inner.state;
        if !matches!(state, SessionState::Editing | SessionState::Failed) {
            return Err(CaptureError::InvalidState {
                operation: "edit fields",
                state,
            });
        }
        let Some(record) = inner.record.as_mut() else {
            return Err(CaptureError::InvalidState {
                operation: "edit fields",
                state,
            });
        };

        fields.tags = normalize_tags(&fields.tags);
        record.fields = fields;
        inner.state = SessionState::Editing;
        Ok(())
    }

    /// Persist the edited fields: remote update when there is a real server
    /// record and the device is online, otherwise the offline queue.
    pub async fn save(&self) -> Result<SaveOutcome, CaptureError> {
        let (session_id, record, image) = {
            let mut inner = self.inner.lock();
            let state = inner.state;
            match state {
                SessionState::Editing | SessionState::Failed => {}
                SessionState::Saving => return Err(CaptureError::SaveInProgress),
                _ => {
                    return Err(CaptureError::InvalidState {
                        operation: "save",
                        state,
                    })
                }
            }
            let Some(record) = inner.record.clone() else {
                return Err(CaptureError::InvalidState {
                    operation: "save",
                    state,
                });
            };

            if let Err(e) = record.fields.validate() {
                tracing::debug!(field = e.field(), error = %e, "Save blocked by validation");
                inner.state = SessionState::Editing;
                inner.last_error = Some(e.to_string());
                return Err(e.into());
            }

            inner.state = SessionState::Saving;
            inner.last_error = None;
            (inner.session_id, record, inner.image.clone())
        };
        let mut guard = SaveGuard {
            inner: &self.inner,
            session_id,
            armed: true,
        };

        let connected = self.deps.connectivity.is_connected();
        let strategy = decide_save_strategy(connected, record.remote_id.as_ref());
        tracing::info!(
            session_id = %session_id,
            local_id = %record.local_id,
            connected,
            strategy = ?strategy,
            "Saving receipt"
        );

        let result = match strategy {
            SaveStrategy::UpdateRemote(remote_id) => {
                let key = Uuid::new_v4().to_string();
                self.deps
                    .service
                    .update(&remote_id, &record.fields, &key)
                    .await
                    .map(|_| SaveOutcome::SavedRemote { remote_id })
                    .map_err(CaptureError::from)
            }
            SaveStrategy::EnqueueOffline(reason) => {
                let item = OfflineQueueItem::new(
                    record.local_id,
                    record.fields.clone(),
                    image,
                    record.updatable_remote_id().map(str::to_string),
                );
                self.deps
                    .queue
                    .append(item)
                    .await
                    .map(|item| SaveOutcome::SavedOffline { item, reason })
                    .map_err(CaptureError::from)
            }
        };

        guard.disarm();
        let mut inner = self.inner.lock();
        if inner.session_id != session_id {
            tracing::warn!(session_id = %session_id, "Save finished for an abandoned session");
            return Err(CaptureError::SessionDisposed);
        }

        match result {
            Ok(outcome) => {
                inner.state = match &outcome {
                    SaveOutcome::SavedRemote { remote_id } => {
                        tracing::info!(remote_id = %remote_id, "Receipt saved");
                        SessionState::SavedRemote
                    }
                    SaveOutcome::SavedOffline { item, reason } => {
                        tracing::warn!(id = %item.id, reason = ?reason, "Receipt saved offline; will sync later");
                        SessionState::SavedOffline
                    }
                };
                Ok(outcome)
            }
            Err(CaptureError::Queue(e)) => {
                tracing::error!(error = %e, "Offline enqueue failed; fields kept for retry");
                inner.state = SessionState::Editing;
                inner.last_error = Some(e.to_string());
                Err(CaptureError::Queue(e))
            }
            Err(e) => {
                tracing::error!(error = %e, "Remote save failed; fields kept for retry");
                inner.state = SessionState::Failed;
                inner.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Upload the session image and narrate it. The upload runs as its own
    /// task so it completes even if this future is dropped; the guard then
    /// leaves the session in `editing` for manual entry.
    async fn process(&self, session_id: Uuid, merge: FieldMerge) -> Result<SubmissionRecord, CaptureError> {
        let (image, context) = {
            let inner = self.inner.lock();
            match inner.image.clone() {
                Some(image) => (image, inner.context.clone()),
                None => {
                    return Err(CaptureError::InvalidState {
                        operation: "process",
                        state: inner.state,
                    })
                }
            }
        };
        let key = Uuid::new_v4().to_string();
        let mut guard = ProcessGuard {
            inner: &self.inner,
            session_id,
            armed: true,
        };

        let service = self.deps.service.clone();
        let submit_context = context.clone();
        let submission = tokio::spawn(async move { service.submit(&image, &submit_context, &key).await });
        let upload = async {
            match submission.await {
                Ok(result) => result.map(|raw| normalize(&raw)),
                Err(e) => Err(GatewayError::Network {
                    message: format!("upload task failed: {}", e),
                }),
            }
        };

        let mut projector = StageProjector::new();
        let result = narrate(
            self.deps.pacer.as_ref(),
            &self.progress,
            &mut projector,
            upload,
            classify_upload,
            |update| self.publish(session_id, update),
        )
        .await;

        guard.disarm();
        let mut lock = self.inner.lock();
        let inner = &mut *lock;
        if inner.session_id != session_id || inner.state != SessionState::Processing {
            tracing::info!(session_id = %session_id, "Discarding upload result for an abandoned session");
            return Err(CaptureError::SessionDisposed);
        }
        let Some(record) = inner.record.as_mut() else {
            return Err(CaptureError::SessionDisposed);
        };
        record.stage = projector.current().unwrap_or(record.stage);

        let processing_error = match result {
            Ok(normalized) => {
                tracing::info!(
                    session_id = %session_id,
                    ai_enhanced = normalized.ai_enhanced,
                    confidence = normalized.confidence.percent,
                    has_remote_id = normalized.remote_id.is_some(),
                    "Receipt processed"
                );
                let mut fields = match merge {
                    FieldMerge::Replace => normalized.fields,
                    FieldMerge::KeepEdits => keep_user_edits(&record.fields, normalized.fields, inner.captured_on),
                };
                apply_context(&mut fields, &context);
                record.fields = fields;
                record.confidence = normalized.confidence;
                record.ai_enhanced = normalized.ai_enhanced;
                record.remote_id = normalized.remote_id;
                None
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Upload failed; falling back to manual entry");
                record.remote_id = None;
                Some(e)
            }
        };

        let record = record.clone();
        inner.processing_error = processing_error;
        inner.state = SessionState::Editing;
        Ok(record)
    }

    fn publish(&self, session_id: Uuid, update: &StageUpdate) {
        let mut inner = self.inner.lock();
        if inner.session_id != session_id {
            return;
        }
        if let Some(record) = inner.record.as_mut() {
            record.stage = update.stage;
        }
        inner.history.push(update.clone());
        drop(inner);
        self.progress_tx.send_replace(Some(update.clone()));
    }
}

fn classify_upload(result: &Result<NormalizedReceipt, GatewayError>) -> Completion {
    match result {
        Ok(normalized) => Completion::Succeeded(Track::from_ai_enhanced(normalized.ai_enhanced)),
        Err(e) => Completion::Failed(e.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldMerge {
    /// Extracted fields become the record's fields.
    Replace,
    /// Non-empty fields already on the record win over extracted ones.
    KeepEdits,
}

fn keep_user_edits(current: &ReceiptFields, extracted: ReceiptFields, captured_on: NaiveDate) -> ReceiptFields {
    fn pick(current: &str, extracted: String) -> String {
        if current.trim().is_empty() {
            extracted
        } else {
            current.to_string()
        }
    }

    ReceiptFields {
        vendor: pick(&current.vendor, extracted.vendor),
        amount: pick(&current.amount, extracted.amount),
        date: if current.date == captured_on {
            extracted.date
        } else {
            current.date
        },
        entity: pick(&current.entity, extracted.entity),
        tags: if current.tags.is_empty() {
            extracted.tags
        } else {
            current.tags.clone()
        },
        notes: pick(&current.notes, extracted.notes),
    }
}

/// The user's pre-capture choices fill whatever the response left empty.
fn apply_context(fields: &mut ReceiptFields, context: &SubmissionContext) {
    if fields.entity.trim().is_empty() {
        fields.entity = context.entity.clone();
    }
    if fields.tags.is_empty() {
        fields.tags = context.tags.clone();
    }
    if fields.notes.trim().is_empty() {
        fields.notes = context.notes.clone();
    }
}

/// Returns a cancelled save to `editing` so the session is not stuck in
/// `saving`.
struct SaveGuard<'a> {
    inner: &'a Mutex<SessionInner>,
    session_id: Uuid,
    armed: bool,
}

impl SaveGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for SaveGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.session_id == self.session_id && inner.state == SessionState::Saving {
            tracing::warn!(session_id = %self.session_id, "Save cancelled before completion");
            inner.state = SessionState::Editing;
        }
    }
}

/// Moves a session whose `process` future was dropped out of `processing`
/// so the user can still enter the fields by hand.
struct ProcessGuard<'a> {
    inner: &'a Mutex<SessionInner>,
    session_id: Uuid,
    armed: bool,
}

impl ProcessGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ProcessGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.session_id != self.session_id || inner.state != SessionState::Processing {
            return;
        }
        tracing::warn!(session_id = %self.session_id, "Processing cancelled; upload continues in the background");
        if let Some(record) = inner.record.as_mut() {
            record.stage = Stage::Error;
            record.remote_id = None;
        }
        inner.processing_error = Some(GatewayError::Network {
            message: "processing cancelled before the upload completed".to_string(),
        });
        inner.state = SessionState::Editing;
    }
}

// ============================================================================
// TESTS
// ============================================================================
