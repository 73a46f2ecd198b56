//! One request/response cycle over an owned transport, with bounded retry.

use std::time::{Duration, Instant};

use bytes::BytesMut;
use pdmlink_frame::{
    decode_response, frame_len_hint, Address, FrameError, FrameFormat, Request, Response, Status,
    MAX_FRAME_LEN,
};
use pdmlink_transport::{Transport, TransportError};
use tracing::{debug, trace, warn};

use crate::error::PdmError;

/// Why an exchange gave up.
#[derive(Debug)]
pub(crate) enum Fault {
    Checksum {
        attempts: u32,
    },
    Timeout {
        attempts: u32,
        timeout: Duration,
    },
    Malformed(String),
    AddressMismatch {
        expected: Address,
        received: Address,
    },
    Status(Status),
    Io(TransportError),
}

impl Fault {
    /// Faults after which the byte stream can no longer be trusted.
    pub(crate) fn breaks_link(&self) -> bool {
        matches!(self, Fault::AddressMismatch { .. } | Fault::Io(_))
    }

    pub(crate) fn into_error(self, address: Address) -> PdmError {
        match self {
            Fault::Checksum { attempts } => PdmError::Checksum { attempts },
            Fault::Timeout { attempts, timeout } => PdmError::ConnectionFailure {
                reason: format!(
                    "no response from module {address} after {attempts} attempt(s) of {timeout:?}"
                ),
                timed_out: true,
            },
            Fault::Malformed(reason) => PdmError::Protocol(reason),
            Fault::AddressMismatch { expected, received } => PdmError::Protocol(format!(
                "response from address {received} while waiting for {expected}"
            )),
            Fault::Status(status) => PdmError::Status { address, status },
            Fault::Io(err) => PdmError::connection(format!("transport error: {err}")),
        }
    }
}

enum Attempt {
    Frame(Response),
    Corrupt,
    TimedOut,
}

/// Transport plus the per-connection framing state.
pub(crate) struct Wire {
    transport: Box<dyn Transport>,
    format: FrameFormat,
    timeout: Duration,
    retries: u32,
    rx: BytesMut,
}

impl Wire {
    pub(crate) fn new(
        transport: Box<dyn Transport>,
        format: FrameFormat,
        timeout: Duration,
        retries: u32,
    ) -> Self {
        Self {
            transport,
            format,
            timeout,
            retries,
            rx: BytesMut::with_capacity(MAX_FRAME_LEN),
        }
    }

    /// Send `request` and return the module's OK response.
    ///
    /// Corrupted and missing responses are retried with the identical frame.
    pub(crate) fn exchange(&mut self, request: &Request) -> Result<Response, Fault> {
        let mut frame = BytesMut::with_capacity(request.wire_size());
        request
            .encode(&self.format, &mut frame)
            .map_err(|err| Fault::Malformed(err.to_string()))?;

        let attempts = self.retries.saturating_add(1);
        let mut last_corrupt = false;
        for attempt in 1..=attempts {
            if attempt > 1 {
                warn!(
                    address = request.address,
                    command = %request.command,
                    attempt,
                    reason = if last_corrupt { "checksum" } else { "timeout" },
                    "retrying exchange"
                );
            }

            match self.attempt(request, &frame)? {
                Attempt::Frame(response) => return self.check(request, response),
                Attempt::Corrupt => last_corrupt = true,
                Attempt::TimedOut => last_corrupt = false,
            }
        }

        if last_corrupt {
            Err(Fault::Checksum { attempts })
        } else {
            Err(Fault::Timeout {
                attempts,
                timeout: self.timeout,
            })
        }
    }

    pub(crate) fn close(&mut self) -> Result<(), TransportError> {
        self.transport.close()
    }

    fn attempt(&mut self, request: &Request, frame: &[u8]) -> Result<Attempt, Fault> {
        // Anything still buffered belongs to an earlier, abandoned exchange.
        self.transport.discard_input().map_err(Fault::Io)?;
        self.rx.clear();

        self.transport.write(frame).map_err(Fault::Io)?;
        debug!(
            address = request.address,
            command = %request.command,
            len = frame.len(),
            "frame sent"
        );

        // A timeout too large to express as an instant means "no deadline".
        let deadline = Instant::now().checked_add(self.timeout);
        let mut chunk = [0u8; MAX_FRAME_LEN];
        loop {
            match decode_response(&self.format, &mut self.rx) {
                Ok(Some(response)) => {
                    debug!(
                        address = request.address,
                        status = %response.status,
                        len = response.payload.len(),
                        "frame received"
                    );
                    return Ok(Attempt::Frame(response));
                }
                Ok(None) => {}
                Err(FrameError::Checksum { .. }) => return Ok(Attempt::Corrupt),
                Err(err) => return Err(Fault::Malformed(err.to_string())),
            }

            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => self.timeout,
            };
            if remaining.is_zero() {
                return Ok(Attempt::TimedOut);
            }

            // Ask for exactly the rest of the frame once its length is known.
            let wanted = frame_len_hint(&self.rx)
                .map_or(1, |total| total.saturating_sub(self.rx.len()))
                .clamp(1, chunk.len());
            let n = self
                .transport
                .read(&mut chunk[..wanted], remaining)
                .map_err(Fault::Io)?;
            if n == 0 {
                trace!(buffered = self.rx.len(), "read timed out");
                return Ok(Attempt::TimedOut);
            }
            self.rx.extend_from_slice(&chunk[..n]);
        }
    }

    fn check(&self, request: &Request, response: Response) -> Result<Response, Fault> {
        if let Some(received) = response.address {
            if received != request.address {
                return Err(Fault::AddressMismatch {
                    expected: request.address,
                    received,
                });
            }
        }
        if !response.status.is_ok() {
            return Err(Fault::Status(response.status));
        }
        Ok(response)
    }
}

impl std::fmt::Debug for Wire {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wire")
            .field("transport", &self.transport)
            .field("format", &self.format)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .finish()
    }
}
