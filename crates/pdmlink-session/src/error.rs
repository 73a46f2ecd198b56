use pdmlink_frame::{Address, FrameError, ProtocolVersion, Register, Status, VersionRange};

/// Errors surfaced by links and device sessions.
///
/// Lower-level [`FrameError`] and [`TransportError`](pdmlink_transport::TransportError)
/// values are folded into these kinds; they never reach callers directly.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PdmError {
    /// Every attempt of an exchange came back corrupted.
    #[error("checksum error after {attempts} attempt(s)")]
    Checksum { attempts: u32 },

    /// Framing or protocol violation: bad length, address mismatch, out of
    /// range value, register unavailable at the negotiated version.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The module speaks a protocol version outside the accepted range.
    #[error("protocol version {version} not supported (accepted {supported})")]
    ProtocolVersionNotSupported {
        version: ProtocolVersion,
        supported: VersionRange,
    },

    /// The transport could not be opened, broke, timed out, or the link is
    /// failed or closed.
    #[error("connection failure: {reason}")]
    ConnectionFailure { reason: String, timed_out: bool },

    /// The module answered with a fault status.
    #[error("module {address} reported status {status}")]
    Status { address: Address, status: Status },

    /// A setter was given a value the register cannot hold.
    #[error("invalid value for {register}: {reason}")]
    InvalidValue { register: Register, reason: String },
}

impl PdmError {
    pub(crate) fn connection(reason: impl Into<String>) -> Self {
        PdmError::ConnectionFailure {
            reason: reason.into(),
            timed_out: false,
        }
    }

    pub(crate) fn invalid(register: Register, reason: impl Into<String>) -> Self {
        PdmError::InvalidValue {
            register,
            reason: reason.into(),
        }
    }

    /// True when the exchange gave up waiting for a response.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            PdmError::ConnectionFailure {
                timed_out: true,
                ..
            }
        )
    }
}

impl From<FrameError> for PdmError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Checksum { .. } => PdmError::Checksum { attempts: 1 },
            FrameError::ReadOnly(register) => PdmError::invalid(register, "register is read-only"),
            FrameError::PayloadWidth {
                register,
                expected,
                actual,
            } => PdmError::invalid(register, format!("expected a {expected} value, got {actual}")),
            other => PdmError::Protocol(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PdmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_errors_map_onto_public_kinds() {
        let err: PdmError = FrameError::Checksum {
            computed: 1,
            received: 2,
        }
        .into();
        assert_eq!(err, PdmError::Checksum { attempts: 1 });

        let err: PdmError = FrameError::Malformed("short".into()).into();
        assert!(matches!(err, PdmError::Protocol(_)));

        let err: PdmError = FrameError::ReadOnly(Register::Frequency).into();
        assert!(matches!(
            err,
            PdmError::InvalidValue {
                register: Register::Frequency,
                ..
            }
        ));
    }

    #[test]
    fn display_includes_status_names() {
        let err = PdmError::Status {
            address: 2,
            status: Status::QUERY_ERROR,
        };
        assert_eq!(err.to_string(), "module 2 reported status QUERY_ERROR");
    }

    #[test]
    fn timeout_flag() {
        assert!(!PdmError::connection("gone").is_timeout());
        assert!(PdmError::ConnectionFailure {
            reason: "no response".into(),
            timed_out: true
        }
        .is_timeout());
    }
}
