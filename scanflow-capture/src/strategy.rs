use scanflow_core::RemoteRef;

/// Why a save goes to the offline queue instead of the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueReason {
    Offline,
    /// The upload never produced a server record.
    NoRemoteRecord,
    /// The only identifier is a local sentinel.
    PlaceholderRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStrategy {
    UpdateRemote(String),
    EnqueueOffline(EnqueueReason),
}

/// The backend has no direct create endpoint, so anything without a real
/// server record is queued rather than created.
pub fn decide_save_strategy(connected: bool, remote_id: Option<&RemoteRef>) -> SaveStrategy {
    if !connected {
        return SaveStrategy::EnqueueOffline(EnqueueReason::Offline);
    }
    match remote_id {
        Some(RemoteRef::Remote(id)) => SaveStrategy::UpdateRemote(id.clone()),
        Some(RemoteRef::Placeholder(_)) => SaveStrategy::EnqueueOffline(EnqueueReason::PlaceholderRecord),
        None => SaveStrategy::EnqueueOffline(EnqueueReason::NoRemoteRecord),
    }
}
