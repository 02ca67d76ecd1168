//! Error types for reduction and scan operations.

use thiserror::Error;

use crate::dispatch::OperationKind;
use crate::element::ElemType;

/// Result type for reduction and scan operations.
pub type Result<T> = std::result::Result<T, ScanError>;

/// Error types that can occur while selecting or launching a kernel.
#[derive(Error, Debug)]
pub enum ScanError {
    /// No tile size from the dispatcher's walk fits the substrate.
    #[error("no usable tile size for {op} on {elem} (largest candidate {max_tile_size})")]
    NoUsableTileSize {
        /// Operation that was being dispatched
        op: OperationKind,
        /// Element type of the input
        elem: ElemType,
        /// First tile size the walk started from
        max_tile_size: u32,
    },

    /// Tile size is not a power of two, or outside the range the caller asked for.
    #[error("invalid tile size: {0}")]
    InvalidTileSize(u32),

    /// The capability descriptor is malformed.
    #[error("invalid capabilities: {0}")]
    InvalidCapabilities(String),

    /// Invalid buffer size or dimensions.
    #[error("Invalid buffer size: expected {expected}, got {actual}")]
    InvalidBufferSize {
        /// Expected buffer size
        expected: usize,
        /// Actual buffer size
        actual: usize,
    },

    /// The selection handed to a launch does not match the launched operation.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A cooperative launch asked for more live tiles than the substrate guarantees.
    #[error("cooperative launch of {requested} tiles exceeds the {max} concurrently live tiles")]
    CooperativeLaunchUnavailable {
        /// Tiles requested by the launch
        requested: u32,
        /// Tiles the substrate keeps live at once
        max: u32,
    },

    /// Engine configuration could not be parsed or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// Reading a configuration file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Kernel launch failed.
    #[error("Kernel launch failed: {0}")]
    KernelLaunchFailed(String),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl From<toml::de::Error> for ScanError {
    fn from(err: toml::de::Error) -> Self {
        ScanError::Config(err.to_string())
    }
}
