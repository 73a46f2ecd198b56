use std::time::Duration;

use crate::error::Result;

/// A duplex byte stream to a chain of modules.
///
/// Implementations are used by exactly one owner at a time; callers that
/// share a chain must serialize access above this layer.
pub trait Transport: Send {
    /// Write every byte of `data` (blocking).
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Read up to `buf.len()` bytes, waiting at most `timeout` for the first
    /// byte to arrive.
    ///
    /// Returns `Ok(0)` when the timeout elapses without data. A short read
    /// is not an error.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Drop any bytes that arrived but have not been read yet.
    fn discard_input(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release the underlying device. Further I/O fails with
    /// [`TransportError::Closed`](crate::TransportError::Closed).
    fn close(&mut self) -> Result<()>;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;
}

impl std::fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("type", &self.transport_name())
            .finish()
    }
}

/// Opens a [`Transport`] on demand.
///
/// A locator is opaque to the rest of the stack; only the connector knows
/// whether it names a serial device, a test double, or something else.
pub trait Connector: Send + Sync {
    /// Open a fresh transport.
    fn connect(&self) -> Result<Box<dyn Transport>>;

    /// The locator this connector opens, for logs and error messages.
    fn locator(&self) -> &str;
}

impl<F> Connector for F
where
    F: Fn() -> Result<Box<dyn Transport>> + Send + Sync,
{
    fn connect(&self) -> Result<Box<dyn Transport>> {
        self()
    }

    fn locator(&self) -> &str {
        "<custom>"
    }
}
