/// CRC32 (IEEE) over payload bytes only — never the header.
#[inline]
pub fn checksum(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}
