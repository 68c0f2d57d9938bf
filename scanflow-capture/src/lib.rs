pub mod narrator;
pub mod service;
pub mod session;
pub mod strategy;

pub use narrator::{narrate, Completion, Pacer, TokioPacer};
pub use service::{HttpReceiptService, ReceiptService, SubmissionContext};
pub use session::{CaptureController, CaptureError, Collaborators, SaveOutcome, SessionState};
pub use strategy::{decide_save_strategy, EnqueueReason, SaveStrategy};
