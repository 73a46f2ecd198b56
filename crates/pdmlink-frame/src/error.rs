use crate::register::{Register, ValueKind};

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    /// The transmitted checksum disagrees with the computed one.
    #[error("checksum mismatch (computed {computed:#04x}, received {received:#04x})")]
    Checksum { computed: u8, received: u8 },

    /// The frame is structurally invalid (bad length byte, missing fields).
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The data does not fit in a single frame.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A register value does not match the register's fixed width.
    #[error("register {register} takes a {expected} value, got {actual}")]
    PayloadWidth {
        register: Register,
        expected: ValueKind,
        actual: ValueKind,
    },

    /// The register is read-only.
    #[error("register {0} is read-only")]
    ReadOnly(Register),
}

pub type Result<T> = std::result::Result<T, FrameError>;
