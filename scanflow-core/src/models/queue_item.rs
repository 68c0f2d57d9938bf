use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::receipt::{CapturedImage, ReceiptFields};

/// Durable snapshot of an edited receipt awaiting remote submission.
///
/// Items are immutable once written; the drain process removes them after a
/// confirmed remote save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineQueueItem {
    pub id: Uuid,
    pub local_id: Uuid,
    /// Microseconds since the epoch, strictly increasing per queue.
    pub enqueued_at: i64,
    pub fields: ReceiptFields,
    pub image: Option<CapturedImage>,
    /// Real server id when the upload succeeded before connectivity dropped.
    pub remote_id: Option<String>,
}

impl OfflineQueueItem {
    pub fn new(
        local_id: Uuid,
        fields: ReceiptFields,
        image: Option<CapturedImage>,
        remote_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            local_id,
            enqueued_at: 0,
            fields,
            image,
            remote_id,
        }
    }
}
