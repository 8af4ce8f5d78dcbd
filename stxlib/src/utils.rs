//! General library utilities such as parsing and conversions.

use std::{
    io::{self, Read, Write},
    time::SystemTime,
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Returns the number of milliseconds since the unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// Returns the number of seconds since the unix epoch.
pub fn now_secs() -> u64 {
    now_ms() / 1000
}

/// Parses a `0x` prefixed hex balance as returned by the node's account endpoint.
///
/// # Examples
///
/// ```
/// use stxlib::utils::parse_hex_balance;
///
/// assert_eq!(parse_hex_balance("0x00000000000000000000000000989680"), Some(10_000_000));
/// assert_eq!(parse_hex_balance("0x"), Some(0));
/// assert_eq!(parse_hex_balance("zz"), None);
/// ```
pub fn parse_hex_balance(balance: &str) -> Option<u128> {
    let digits = balance.strip_prefix("0x").unwrap_or(balance);
    if digits.is_empty() {
        return Some(0);
    }
    u128::from_str_radix(digits, 16).ok()
}

/// Ensures a transaction id carries exactly one `0x` prefix.
pub fn prefix_tx_id(tx_id: &str) -> String {
    format!("0x{}", tx_id.trim_start_matches("0x"))
}

pub(crate) fn write_string<W: Write>(mut writer: W, value: &str) -> io::Result<()> {
    writer.write_u64::<LittleEndian>(value.len() as u64)?;
    writer.write_all(value.as_bytes())
}

/// Reads exactly `len` bytes. The buffer grows with the bytes actually read, so a corrupt length prefix ends in
/// an `UnexpectedEof` error instead of a huge allocation.
pub(crate) fn read_bytes<R: Read>(reader: R, len: u64) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    reader.take(len).read_to_end(&mut bytes)?;
    if bytes.len() as u64 != len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected {len} bytes, found {}", bytes.len()),
        ));
    }

    Ok(bytes)
}

pub(crate) fn read_string<R: Read>(mut reader: R) -> io::Result<String> {
    let len = reader.read_u64::<LittleEndian>()?;
    let bytes = read_bytes(&mut reader, len)?;

    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_round_trip() {
        let mut buffer = Vec::new();
        write_string(&mut buffer, "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM").unwrap();
        assert_eq!(
            read_string(buffer.as_slice()).unwrap(),
            "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM"
        );
    }

    #[test]
    fn oversized_length_prefix_is_an_error() {
        let mut buffer = Vec::new();
        buffer.write_u64::<LittleEndian>(u64::MAX).unwrap();
        buffer.extend_from_slice(b"ST2");
        let error = read_string(buffer.as_slice()).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn tx_id_prefix_is_not_doubled() {
        assert_eq!(prefix_tx_id("abc"), "0xabc");
        assert_eq!(prefix_tx_id("0xabc"), "0xabc");
    }
}
