use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Device is busy: {0}")]
    DeviceBusy(String),

    #[error("Scan cancelled")]
    Cancelled,

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Unsupported resolution: {dpi} dpi")]
    UnsupportedResolution { dpi: u32 },

    #[error("Unsupported mode: {0}")]
    UnsupportedMode(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Out of memory: failed to allocate {bytes} bytes")]
    OutOfMemory { bytes: usize },

    #[error("Transfer ended early: expected {expected} bytes, got {delivered}")]
    ShortTransfer { expected: u64, delivered: u64 },

    #[error("Acquisition worker failed: {0}")]
    WorkerFailed(String),

    #[error("No scan session is active")]
    NoSession,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Driver-level status vocabulary a frontend sees for each error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Good,
    Busy,
    Cancelled,
    IoError,
    Invalid,
    NoMemory,
    Unsupported,
}

impl ScanError {
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Self::Io(_) | Self::ShortTransfer { .. } | Self::WorkerFailed(_) => Status::IoError,
            Self::DeviceBusy(_) => Status::Busy,
            Self::Cancelled => Status::Cancelled,
            Self::InvalidGeometry(_)
            | Self::InvalidArgument(_)
            | Self::NoSession
            | Self::Config(_) => Status::Invalid,
            Self::UnsupportedResolution { .. } | Self::UnsupportedMode(_) => Status::Unsupported,
            Self::OutOfMemory { .. } => Status::NoMemory,
        }
    }

    /// Busy devices can be retried; everything else ends the session.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::DeviceBusy(_))
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
