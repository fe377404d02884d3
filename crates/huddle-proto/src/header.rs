//! Frame header with zero-copy parsing.
//!
//! The header is a fixed 12-byte big-endian structure. It is small enough
//! that routing code can read the opcode and payload length without touching
//! the CBOR body.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    Opcode,
    errors::{ProtocolError, Result},
};

/// Fixed 12-byte frame header (big endian).
///
/// Layout: `magic[4] | version[1] | flags[1] | opcode[2] | payload_size[4]`.
///
/// Every 12-byte pattern is a valid bit pattern for this struct, so casting
/// untrusted network bytes is safe; semantic validation (magic, version, size
/// limit) happens in [`FrameHeader::from_bytes`].
#[repr(C, packed)]
#[derive(Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    magic: [u8; 4],
    version: u8,
    flags: u8,
    opcode: [u8; 2],
    pub(crate) payload_size: [u8; 4],
}

impl FrameHeader {
    /// Size of the serialized header.
    pub const SIZE: usize = 12;

    /// Magic number: "HDLE" in ASCII.
    pub const MAGIC: u32 = 0x4844_4C45;

    /// Current protocol version.
    pub const VERSION: u8 = 0x01;

    /// Maximum payload size (1 MiB). Chat events are small; anything larger
    /// is treated as hostile.
    pub const MAX_PAYLOAD_SIZE: u32 = 1024 * 1024;

    /// Create a header for the given opcode with an empty payload.
    #[must_use]
    pub fn new(opcode: Opcode) -> Self {
        Self {
            magic: Self::MAGIC.to_be_bytes(),
            version: Self::VERSION,
            flags: 0,
            opcode: opcode.to_u16().to_be_bytes(),
            payload_size: [0; 4],
        }
    }

    /// Parse a header from the start of `bytes` without copying.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if fewer than [`Self::SIZE`] bytes
    /// - `ProtocolError::InvalidMagic` if the magic number is wrong
    /// - `ProtocolError::UnsupportedVersion` if the version is not 1
    /// - `ProtocolError::PayloadTooLarge` if the declared size exceeds the
    ///   limit
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::FrameTooShort {
                expected: Self::SIZE,
                actual: bytes.len(),
            })?
            .0;

        if u32::from_be_bytes(header.magic) != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic);
        }

        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        let payload_size = u32::from_be_bytes(header.payload_size);
        if payload_size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Serialize header to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(IntoBytes::as_bytes(self));
        arr
    }

    /// Protocol version byte.
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Reserved flag bits (always zero in version 1).
    #[must_use]
    pub fn flags(&self) -> u8 {
        self.flags
    }

    /// Operation code as raw u16.
    #[must_use]
    pub fn opcode(&self) -> u16 {
        u16::from_be_bytes(self.opcode)
    }

    /// Operation code as enum. `None` if unrecognized.
    #[must_use]
    pub fn opcode_enum(&self) -> Option<Opcode> {
        Opcode::from_u16(self.opcode())
    }

    /// Declared payload length in bytes.
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }
}

impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let opcode = self.opcode();
        f.debug_struct("FrameHeader")
            .field("version", &self.version())
            .field("opcode", &format_args!("{opcode:#06x}"))
            .field("event", &self.opcode_enum().map(Opcode::event_name))
            .field("payload_size", &self.payload_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_header_is_valid() {
        let header = FrameHeader::new(Opcode::JoinGroup);
        let bytes = header.to_bytes();

        let parsed = FrameHeader::from_bytes(&bytes).expect("valid header");
        assert_eq!(parsed.opcode_enum(), Some(Opcode::JoinGroup));
        assert_eq!(parsed.payload_size(), 0);
        assert_eq!(parsed.version(), FrameHeader::VERSION);
        assert_eq!(&bytes[0..4], b"HDLE");
    }

    #[test]
    fn short_buffer_rejected() {
        let bytes = [0u8; FrameHeader::SIZE - 1];
        assert_eq!(
            FrameHeader::from_bytes(&bytes),
            Err(ProtocolError::FrameTooShort { expected: FrameHeader::SIZE, actual: 11 })
        );
    }

    #[test]
    fn bad_magic_rejected() {
        let mut bytes = FrameHeader::new(Opcode::Ping).to_bytes();
        bytes[0] = b'X';
        assert_eq!(FrameHeader::from_bytes(&bytes), Err(ProtocolError::InvalidMagic));
    }

    #[test]
    fn unknown_version_rejected() {
        let mut bytes = FrameHeader::new(Opcode::Ping).to_bytes();
        bytes[4] = 9;
        assert_eq!(FrameHeader::from_bytes(&bytes), Err(ProtocolError::UnsupportedVersion(9)));
    }

    #[test]
    fn oversized_payload_rejected() {
        let mut bytes = FrameHeader::new(Opcode::SendMessage).to_bytes();
        bytes[8..12].copy_from_slice(&(FrameHeader::MAX_PAYLOAD_SIZE + 1).to_be_bytes());
        assert!(matches!(
            FrameHeader::from_bytes(&bytes),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
    }
}
