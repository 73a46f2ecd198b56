use std::fmt;
use std::str::FromStr;

use crate::error::FrameError;

/// Protocol version reported by a module, e.g. `3.4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    pub const V3_4: ProtocolVersion = ProtocolVersion::new(3, 4);
    pub const V3_7: ProtocolVersion = ProtocolVersion::new(3, 7);

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Parse the identify response payload (`major`, `minor`).
    pub fn from_payload(payload: &[u8]) -> Result<Self, FrameError> {
        match payload {
            [major, minor] => Ok(Self::new(*major, *minor)),
            other => Err(FrameError::Malformed(format!(
                "protocol version payload must be 2 bytes, got {}",
                other.len()
            ))),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ProtocolVersion {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            FrameError::Malformed(format!(
                "invalid version '{s}': expected '<major>.<minor>'"
            ))
        };
        let (major, minor) = s.split_once('.').ok_or_else(invalid)?;
        let major = major.parse::<u8>().map_err(|_| invalid())?;
        let minor = minor.parse::<u8>().map_err(|_| invalid())?;
        Ok(Self::new(major, minor))
    }
}

/// Closed range of protocol versions a link accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRange {
    pub min: ProtocolVersion,
    pub max: ProtocolVersion,
}

impl VersionRange {
    pub const fn new(min: ProtocolVersion, max: ProtocolVersion) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, version: ProtocolVersion) -> bool {
        self.min <= version && version <= self.max
    }
}

impl Default for VersionRange {
    /// Versions 3.4 through 3.7.
    fn default() -> Self {
        Self::new(ProtocolVersion::V3_4, ProtocolVersion::V3_7)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_major_then_minor() {
        assert!(ProtocolVersion::new(3, 10) > ProtocolVersion::new(3, 7));
        assert!(ProtocolVersion::new(4, 0) > ProtocolVersion::new(3, 10));
    }

    #[test]
    fn default_range_bounds_are_inclusive() {
        let range = VersionRange::default();
        assert!(!range.contains(ProtocolVersion::new(3, 3)));
        assert!(range.contains(ProtocolVersion::new(3, 4)));
        assert!(range.contains(ProtocolVersion::new(3, 7)));
        assert!(!range.contains(ProtocolVersion::new(3, 8)));
        assert!(!range.contains(ProtocolVersion::new(4, 4)));
    }

    #[test]
    fn parse_and_display() {
        let version: ProtocolVersion = "3.7".parse().unwrap();
        assert_eq!(version, ProtocolVersion::V3_7);
        assert_eq!(version.to_string(), "3.7");
        assert!("3".parse::<ProtocolVersion>().is_err());
        assert!("3.x".parse::<ProtocolVersion>().is_err());
        assert!("3.4.1".parse::<ProtocolVersion>().is_err());
    }

    #[test]
    fn from_payload_requires_two_bytes() {
        assert_eq!(
            ProtocolVersion::from_payload(&[3, 5]).unwrap(),
            ProtocolVersion::new(3, 5)
        );
        assert!(matches!(
            ProtocolVersion::from_payload(&[3]),
            Err(FrameError::Malformed(_))
        ));
    }
}
