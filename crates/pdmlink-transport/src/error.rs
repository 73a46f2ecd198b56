/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the device behind the locator.
    #[error("failed to open {locator}: {source}")]
    Open {
        locator: String,
        source: serialport::Error,
    },

    /// Failed to apply a port setting (timeout, buffer clear).
    #[error("failed to configure {locator}: {source}")]
    Configure {
        locator: String,
        source: serialport::Error,
    },

    /// An I/O error occurred on the byte stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport has been closed.
    #[error("transport closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
