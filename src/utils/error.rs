use thiserror::Error;

pub type Result<T> = std::result::Result<T, IpfsError>;

#[derive(Error, Debug)]
pub enum IpfsError {
    #[error("Repo init failed: {0}")]
    RepoInit(String),

    #[error("Repo open failed: {0}")]
    RepoOpen(String),

    #[error("Node start failed: {0}")]
    NodeStart(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Key load failed: {0}")]
    KeyLoad(String),

    #[error("Corrupt key file: {0}")]
    CorruptKey(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Publish failed: {0}")]
    PublishTransport(String),

    #[error("Lookup timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Name points to another name: {0}")]
    UnresolvedIndirection(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Block not found: {0}")]
    BlockNotFound(String),

    #[error("Block verification failed: {0}")]
    BlockVerificationFailed(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Coarse grouping of errors so callers can tell "stopped" from "failed"
/// from "simply absent".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Bootstrap,
    Identity,
    Transport,
    Cancellation,
    Absence,
    Content,
}

impl IpfsError {
    pub fn class(&self) -> ErrorClass {
        match self {
            IpfsError::RepoInit(_)
            | IpfsError::RepoOpen(_)
            | IpfsError::NodeStart(_)
            | IpfsError::ConfigError(_) => ErrorClass::Bootstrap,
            IpfsError::KeyLoad(_) | IpfsError::CorruptKey(_) | IpfsError::KeyDerivation(_) => {
                ErrorClass::Identity
            }
            IpfsError::PublishTransport(_) | IpfsError::Timeout(_) | IpfsError::NetworkError(_) => {
                ErrorClass::Transport
            }
            IpfsError::Cancelled => ErrorClass::Cancellation,
            IpfsError::NotFound(_) | IpfsError::UnresolvedIndirection(_) => ErrorClass::Absence,
            IpfsError::InvalidPath(_)
            | IpfsError::InvalidRecord(_)
            | IpfsError::BlockNotFound(_)
            | IpfsError::BlockVerificationFailed(_)
            | IpfsError::IoError(_)
            | IpfsError::SerializationError(_) => ErrorClass::Content,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, IpfsError::Cancelled)
    }
}

impl From<std::io::Error> for IpfsError {
    fn from(err: std::io::Error) -> Self {
        IpfsError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for IpfsError {
    fn from(err: serde_json::Error) -> Self {
        IpfsError::SerializationError(err.to_string())
    }
}
