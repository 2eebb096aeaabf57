use crate::id::ServiceId;

/// Network or RPC level failure talking to a registry. Always transient.
#[derive(Debug, Clone, thiserror::Error)]
#[error("remote failure: {0}")]
pub struct RemoteError(pub String);

#[derive(Debug, Clone, thiserror::Error)]
pub enum RenewalError {
    #[error("lease renewal denied: {0}")]
    Denied(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("proxy export failed: {0}")]
pub struct ExportError(pub String);

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("service descriptor needs a non-empty Name entry")]
    MissingName,

    #[error("proxy already attached to service {0}")]
    ProxyAlreadyAttached(ServiceId),
}

/// Errors that stop the join pipeline from starting or running a batch.
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("discovery subscription failed: {0}")]
    Subscribe(RemoteError),

    #[error("registration batch aborted: {0}")]
    BatchAborted(String),
}
