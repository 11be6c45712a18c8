use crate::{PacketType, ProtocolError, MAGIC, MAX_PACKET_SIZE};

/// Size in bytes of the on-wire header. Fixed, so framing never needs a
/// varint or a second read to learn how much more to read.
pub const HEADER_LEN: usize = 24;

/// The 24-byte packet header shared by every registered type.
///
/// On the wire (little-endian, after the 4-byte magic):
///
/// ```text
/// magic(4) | type(2) | length(4) | sequence(4) | crc32(4) | client_id(4) | flags(2)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub packet_type: PacketType,
    /// Payload byte count. Never includes the header itself.
    pub length: u32,
    /// Monotonic per-(sender) counter. See `DESIGN.md` for why this is
    /// per-sender-global rather than per-(sender, type).
    pub sequence: u32,
    pub crc32: u32,
    /// Originating client id. `0` is reserved for server-originated
    /// broadcasts (SERVER_STATE, CLEAR_CONSOLE).
    pub client_id: u32,
    pub flags: u16,
}

impl PacketHeader {
    /// Builds a header for an outbound packet, computing the CRC over
    /// `payload` and filling in `length` from its size.
    ///
    /// Returns `Err` if `payload` exceeds `MAX_PACKET_SIZE` or is empty for
    /// a type that requires a non-empty payload.
    pub fn for_send(
        packet_type: PacketType,
        client_id: u32,
        sequence: u32,
        payload: &[u8],
    ) -> Result<Self, ProtocolError> {
        let length = u32::try_from(payload.len()).map_err(|_| ProtocolError::LengthExceeded(u32::MAX))?;

        if length > MAX_PACKET_SIZE {
            return Err(ProtocolError::LengthExceeded(length));
        }

        if length == 0 && !packet_type.allows_empty_payload() {
            return Err(ProtocolError::EmptyPayloadNotAllowed);
        }

        Ok(Self {
            packet_type,
            length,
            sequence,
            crc32: crate::checksum(payload),
            client_id,
            flags: 0,
        })
    }

    /// Serializes the header into its fixed 24-byte wire form.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];

        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..6].copy_from_slice(&(self.packet_type as u16).to_le_bytes());
        buf[6..10].copy_from_slice(&self.length.to_le_bytes());
        buf[10..14].copy_from_slice(&self.sequence.to_le_bytes());
        buf[14..18].copy_from_slice(&self.crc32.to_le_bytes());
        buf[18..22].copy_from_slice(&self.client_id.to_le_bytes());
        buf[22..24].copy_from_slice(&self.flags.to_le_bytes());

        buf
    }

    /// Parses a header out of exactly `HEADER_LEN` bytes.
    ///
    /// Validates magic, the type enum range, and the length bound, but does
    /// *not* validate the CRC (that requires the payload, which hasn't been
    /// read yet by the time a caller typically wants the header).
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let Some(bytes) = bytes.get(..HEADER_LEN) else {
            return Err(ProtocolError::Truncated {
                need: HEADER_LEN,
                have: bytes.len(),
            });
        };

        if bytes[0..4] != MAGIC {
            return Err(ProtocolError::InvalidMagic);
        }

        let packet_type = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
        let packet_type = PacketType::try_from(packet_type)?;

        let length = u32::from_le_bytes(bytes[6..10].try_into().unwrap());
        if length > MAX_PACKET_SIZE {
            return Err(ProtocolError::LengthExceeded(length));
        }

        let sequence = u32::from_le_bytes(bytes[10..14].try_into().unwrap());
        let crc32 = u32::from_le_bytes(bytes[14..18].try_into().unwrap());
        let client_id = u32::from_le_bytes(bytes[18..22].try_into().unwrap());
        let flags = u16::from_le_bytes(bytes[22..24].try_into().unwrap());

        Ok(Self {
            packet_type,
            length,
            sequence,
            crc32,
            client_id,
            flags,
        })
    }

    /// Validates `payload` against this header's recorded length and CRC.
    ///
    /// Callers are expected to have already read exactly `self.length`
    /// bytes; this only checks that what was read matches what the header
    /// promised.
    pub fn validate_payload(&self, payload: &[u8]) -> Result<(), ProtocolError> {
        if payload.len() != usize::try_from(self.length).unwrap() {
            return Err(ProtocolError::Truncated {
                need: self.length as usize,
                have: payload.len(),
            });
        }

        let computed = crate::checksum(payload);
        if computed != self.crc32 {
            return Err(ProtocolError::CrcMismatch {
                expected: self.crc32,
                computed,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let header = PacketHeader::for_send(PacketType::Audio, 7, 42, b"hello").unwrap();
        let encoded = header.encode();
        let decoded = PacketHeader::decode(&encoded).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn rejects_bad_magic() {
        let header = PacketHeader::for_send(PacketType::Ping, 0, 0, b"").unwrap();
        let mut encoded = header.encode();
        encoded[0] ^= 0xFF;
        assert!(matches!(
            PacketHeader::decode(&encoded),
            Err(ProtocolError::InvalidMagic)
        ));
    }

    #[test]
    fn rejects_unknown_type() {
        let header = PacketHeader::for_send(PacketType::Ping, 0, 0, b"").unwrap();
        let mut encoded = header.encode();
        encoded[4..6].copy_from_slice(&999u16.to_le_bytes());
        assert!(matches!(
            PacketHeader::decode(&encoded),
            Err(ProtocolError::UnknownType(999))
        ));
    }

    #[test]
    fn rejects_oversized_length() {
        let header = PacketHeader::for_send(PacketType::Ping, 0, 0, b"").unwrap();
        let mut encoded = header.encode();
        encoded[6..10].copy_from_slice(&(MAX_PACKET_SIZE + 1).to_le_bytes());
        assert!(matches!(
            PacketHeader::decode(&encoded),
            Err(ProtocolError::LengthExceeded(_))
        ));
    }

    #[test]
    fn empty_payload_rejected_for_audio_but_allowed_for_ping() {
        assert!(PacketHeader::for_send(PacketType::Audio, 0, 0, b"").is_err());
        assert!(PacketHeader::for_send(PacketType::Ping, 0, 0, b"").is_ok());
        assert!(PacketHeader::for_send(PacketType::StreamStop, 0, 0, b"").is_ok());
    }

    #[test]
    fn crc_mismatch_detected() {
        let header = PacketHeader::for_send(PacketType::Audio, 0, 0, b"hello").unwrap();
        assert!(header.validate_payload(b"hellp").is_err());
        assert!(header.validate_payload(b"hello").is_ok());
    }

    proptest::proptest! {
        /// Invariant 1 (spec §8): any header built by `for_send` and decoded
        /// back reports the same magic-implied fields, and `validate_payload`
        /// accepts the exact payload it was built from.
        #[test]
        fn header_round_trips_for_arbitrary_payloads(
            client_id: u32,
            sequence: u32,
            payload in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..4096),
        ) {
            let header = PacketHeader::for_send(PacketType::Audio, client_id, sequence, &payload).unwrap();
            let decoded = PacketHeader::decode(&header.encode()).unwrap();
            proptest::prop_assert_eq!(decoded, header);
            proptest::prop_assert!(decoded.validate_payload(&payload).is_ok());
        }

        /// Invariant 2 (spec §8): for any two sends of the same type from the
        /// same sender, a strictly-later sequence number must report a
        /// strictly-later header, matching `StreamTransport`'s monotonic
        /// per-sender counter.
        #[test]
        fn sequence_ordering_is_preserved_through_encode_decode(
            client_id: u32,
            first in 0u32..u32::MAX,
        ) {
            let second = first + 1;
            let a = PacketHeader::for_send(PacketType::Ping, client_id, first, b"").unwrap();
            let b = PacketHeader::for_send(PacketType::Ping, client_id, second, b"").unwrap();
            let a = PacketHeader::decode(&a.encode()).unwrap();
            let b = PacketHeader::decode(&b.encode()).unwrap();
            proptest::prop_assert!(b.sequence > a.sequence);
        }

    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(8))]

        /// Any payload exceeding `MAX_PACKET_SIZE` is rejected at construction.
        /// Kept to a handful of cases since each one allocates a multi-megabyte
        /// buffer.
        #[test]
        fn oversized_payloads_are_always_rejected(extra in 1u32..1024) {
            let oversized = vec![0u8; (MAX_PACKET_SIZE + extra) as usize];
            proptest::prop_assert!(PacketHeader::for_send(PacketType::Audio, 0, 0, &oversized).is_err());
        }
    }
}
