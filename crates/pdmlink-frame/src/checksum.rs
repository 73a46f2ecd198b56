//! Frame checksum algorithms.
//!
//! The checksum always covers every byte that precedes it in the frame,
//! starting with the length byte.

/// Checksum algorithm used by a [`FrameFormat`](crate::FrameFormat).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Checksum {
    /// XOR of all bytes, minus one (wrapping). Used by PDM firmware.
    #[default]
    XorDecrement,
    /// Plain XOR of all bytes.
    Xor,
}

impl Checksum {
    /// Compute the checksum byte for `data`.
    pub fn compute(self, data: &[u8]) -> u8 {
        let xor = data.iter().fold(0u8, |acc, byte| acc ^ byte);
        match self {
            Checksum::XorDecrement => xor.wrapping_sub(1),
            Checksum::Xor => xor,
        }
    }

    /// Human-readable algorithm name.
    pub fn name(self) -> &'static str {
        match self {
            Checksum::XorDecrement => "xor-1",
            Checksum::Xor => "xor",
        }
    }
}
