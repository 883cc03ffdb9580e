use std::fmt;

use crate::error::Result;
use crate::wire::buffer::MessageBuffer;
use crate::wire::{Decode, Encode};

/// Negotiated wire-format revision, carried by every handshake message.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    #[inline]
    pub const fn new(major: u16, minor: u16) -> ProtocolVersion {
        ProtocolVersion { major, minor }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// The revision this implementation speaks natively.
pub const CURRENT_VERSION: ProtocolVersion = ProtocolVersion::new(3, 1);

/// Tag of a buffer whose peer has not completed the handshake yet.
pub const UNKNOWN_VERSION: ProtocolVersion = ProtocolVersion::new(0, 0);

/// Magic bytes opening every handshake message.
pub const PREAMBLE: [u8; 4] = *b"VIB-";

/// First field of `ParticipantAnnouncement`, `ParticipantAnnouncementReply`
/// and `KnownParticipants`: lets the receiver learn the wire version before
/// deciding how to decode the rest of the frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RegistryMsgHeader {
    pub preamble: [u8; 4],
    pub version_high: u16,
    pub version_low: u16,
}

impl RegistryMsgHeader {
    #[inline]
    pub fn new(version: ProtocolVersion) -> RegistryMsgHeader {
        RegistryMsgHeader {
            preamble: PREAMBLE,
            version_high: version.major,
            version_low: version.minor,
        }
    }

    #[inline]
    pub fn version(&self) -> ProtocolVersion {
        ProtocolVersion::new(self.version_high, self.version_low)
    }

    #[inline]
    pub fn preamble_valid(&self) -> bool {
        self.preamble == PREAMBLE
    }
}

impl Encode for RegistryMsgHeader {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_raw(&self.preamble);
        buffer.write_u16(self.version_high);
        buffer.write_u16(self.version_low);
    }
}

impl Decode for RegistryMsgHeader {
    fn decode(buffer: &mut MessageBuffer) -> Result<RegistryMsgHeader> {
        let mut preamble = [0u8; 4];
        buffer.read_raw(&mut preamble)?;

        Ok(RegistryMsgHeader {
            preamble,
            version_high: buffer.read_u16()?,
            version_low: buffer.read_u16()?,
        })
    }
}

/// Whether this implementation can speak the given revision. Every accepted
/// legacy revision must have a matching codec adapter in `protocol::compat`.
pub fn version_supported(version: ProtocolVersion) -> bool {
    version == ProtocolVersion::new(3, 0) || version == CURRENT_VERSION
}

/// Maps a wire revision to the distribution release range that produced it.
/// Used for operator-facing diagnostics when a handshake is rejected.
pub fn version_to_release(version: ProtocolVersion) -> &'static str {
    match (version.major, version.minor) {
        (1, _) => "< v2.0.0",
        (2, 0) => "v2.0.0 - v3.4.0",
        (2, 1) => "v3.4.1 - v3.99.21",
        (3, 0) => "v3.99.22",
        (3, 1) => "v3.99.23 - current",
        _ => "Unknown version range",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = RegistryMsgHeader::new(CURRENT_VERSION);

        let mut buffer = MessageBuffer::new();
        header.encode(&mut buffer);

        let decoded = RegistryMsgHeader::decode(&mut buffer).unwrap();
        assert_eq!(decoded, header);
        assert!(decoded.preamble_valid());
        assert_eq!(decoded.version(), CURRENT_VERSION);
    }

    #[test]
    fn test_preamble_bytes() {
        let mut buffer = MessageBuffer::new();
        RegistryMsgHeader::new(CURRENT_VERSION).encode(&mut buffer);

        let bytes = buffer.release_storage();
        assert_eq!(&bytes[..4], b"VIB-");
    }

    #[test]
    fn test_supported_versions() {
        assert!(version_supported(ProtocolVersion::new(3, 0)));
        assert!(version_supported(ProtocolVersion::new(3, 1)));
        assert!(!version_supported(ProtocolVersion::new(1, 0)));
        assert!(!version_supported(ProtocolVersion::new(2, 1)));
        assert!(!version_supported(ProtocolVersion::new(3, 2)));
    }

    #[test]
    fn test_release_mapping() {
        assert_eq!(version_to_release(ProtocolVersion::new(1, 0)), "< v2.0.0");
        assert_eq!(version_to_release(ProtocolVersion::new(3, 1)), "v3.99.23 - current");
        assert_eq!(version_to_release(ProtocolVersion::new(9, 9)), "Unknown version range");
    }
}
