//! Reconciliation error types

/// Result of a sync or command step
pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Reconciliation errors
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Unknown installed office '{0}'")]
    UnknownOffice(String),

    #[error("Store error: {0}")]
    Store(#[from] ofisu_core::Error),

    #[error("Platform error: {0}")]
    Platform(#[from] ofisu_net::Error),

    #[error("Stale cache: {0}")]
    StaleCache(String),

    #[error("Sync of guild {guild_id} timed out after {secs}s")]
    Timeout { guild_id: String, secs: u64 },
}
