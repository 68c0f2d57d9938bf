pub mod queue_item;
pub mod receipt;

pub use queue_item::OfflineQueueItem;
pub use receipt::{
    CapturedImage, Confidence, ImageSource, ReceiptFields, RemoteRef, SubmissionRecord,
};
