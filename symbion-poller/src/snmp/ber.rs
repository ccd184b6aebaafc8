//! Minimal BER codec for SNMPv2c messages
//!
//! Only the subset needed for GetRequest/Response: definite lengths,
//! INTEGER, OCTET STRING, NULL, OBJECT IDENTIFIER, SEQUENCE, the SMIv2
//! application types and the context-specific PDU/exception tags.

pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_NULL: u8 = 0x05;
pub const TAG_OID: u8 = 0x06;
pub const TAG_SEQUENCE: u8 = 0x30;
pub const TAG_IP_ADDRESS: u8 = 0x40;
pub const TAG_COUNTER32: u8 = 0x41;
pub const TAG_GAUGE32: u8 = 0x42;
pub const TAG_TIMETICKS: u8 = 0x43;
pub const TAG_OPAQUE: u8 = 0x44;
pub const TAG_COUNTER64: u8 = 0x46;
pub const TAG_NO_SUCH_OBJECT: u8 = 0x80;
pub const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
pub const TAG_END_OF_MIB_VIEW: u8 = 0x82;
pub const TAG_GET_REQUEST: u8 = 0xA0;
pub const TAG_GET_RESPONSE: u8 = 0xA2;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnmpCodecError {
    #[error("truncated message")]
    Truncated,
    #[error("unexpected tag 0x{found:02x}, expected 0x{expected:02x}")]
    UnexpectedTag { expected: u8, found: u8 },
    #[error("unsupported length encoding")]
    BadLength,
    #[error("integer does not fit in 64 bits")]
    IntegerOverflow,
    #[error("invalid object identifier: {0}")]
    InvalidOid(String),
    #[error("trailing bytes after message")]
    TrailingBytes,
}

pub fn encode_length(len: usize, out: &mut Vec<u8>) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    let significant = &bytes[skip..];
    out.push(0x80 | significant.len() as u8);
    out.extend_from_slice(significant);
}

pub fn encode_tlv(tag: u8, content: &[u8], out: &mut Vec<u8>) {
    out.push(tag);
    encode_length(content.len(), out);
    out.extend_from_slice(content);
}

/// Two's complement, minimal number of octets
pub fn encode_integer(value: i64, out: &mut Vec<u8>) {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let (head, next) = (bytes[start], bytes[start + 1]);
        let redundant = (head == 0x00 && next & 0x80 == 0) || (head == 0xFF && next & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    encode_tlv(TAG_INTEGER, &bytes[start..], out);
}

pub fn encode_oid(oid: &str, out: &mut Vec<u8>) -> Result<(), SnmpCodecError> {
    let invalid = || SnmpCodecError::InvalidOid(oid.to_string());
    let arcs = oid
        .trim_start_matches('.')
        .split('.')
        .map(|part| part.parse::<u32>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;

    if arcs.len() < 2 || arcs[0] > 2 || (arcs[0] < 2 && arcs[1] >= 40) {
        return Err(invalid());
    }
    let first = arcs[0]
        .checked_mul(40)
        .and_then(|v| v.checked_add(arcs[1]))
        .ok_or_else(invalid)?;

    let mut content = Vec::with_capacity(arcs.len() + 4);
    push_base128(first, &mut content);
    for arc in &arcs[2..] {
        push_base128(*arc, &mut content);
    }
    encode_tlv(TAG_OID, &content, out);
    Ok(())
}

fn push_base128(mut value: u32, out: &mut Vec<u8>) {
    let mut tmp = [0u8; 5];
    let mut i = tmp.len() - 1;
    tmp[i] = (value & 0x7F) as u8;
    value >>= 7;
    while value > 0 {
        i -= 1;
        tmp[i] = (value & 0x7F) as u8 | 0x80;
        value >>= 7;
    }
    out.extend_from_slice(&tmp[i..]);
}

pub fn decode_integer(content: &[u8]) -> Result<i64, SnmpCodecError> {
    if content.is_empty() {
        return Err(SnmpCodecError::Truncated);
    }
    if content.len() > 8 {
        return Err(SnmpCodecError::IntegerOverflow);
    }
    let mut value: i64 = if content[0] & 0x80 != 0 { -1 } else { 0 };
    for byte in content {
        value = (value << 8) | i64::from(*byte);
    }
    Ok(value)
}

/// Counter32, Gauge32, TimeTicks and Counter64 are unsigned on the wire
pub fn decode_unsigned(content: &[u8]) -> Result<u64, SnmpCodecError> {
    if content.is_empty() {
        return Err(SnmpCodecError::Truncated);
    }
    let content = match content {
        [0, rest @ ..] if !rest.is_empty() => rest,
        _ => content,
    };
    if content.len() > 8 {
        return Err(SnmpCodecError::IntegerOverflow);
    }
    Ok(content
        .iter()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte)))
}

pub fn decode_oid(content: &[u8]) -> Result<String, SnmpCodecError> {
    let invalid = || SnmpCodecError::InvalidOid(format!("{content:02x?}"));
    let mut arcs: Vec<u32> = Vec::with_capacity(content.len() + 1);
    let mut value: u32 = 0;
    let mut pending = false;

    for byte in content {
        value = value
            .checked_mul(128)
            .and_then(|v| v.checked_add(u32::from(byte & 0x7F)))
            .ok_or_else(invalid)?;
        pending = byte & 0x80 != 0;
        if !pending {
            if arcs.is_empty() {
                let (first, second) = match value {
                    0..=39 => (0, value),
                    40..=79 => (1, value - 40),
                    _ => (2, value - 80),
                };
                arcs.push(first);
                arcs.push(second);
            } else {
                arcs.push(value);
            }
            value = 0;
        }
    }
    if pending || arcs.is_empty() {
        return Err(invalid());
    }

    Ok(arcs
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join("."))
}

/// Cursor over a BER buffer
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn byte(&mut self) -> Result<u8, SnmpCodecError> {
        let byte = *self.buf.get(self.pos).ok_or(SnmpCodecError::Truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    fn length(&mut self) -> Result<usize, SnmpCodecError> {
        let first = self.byte()?;
        if first < 0x80 {
            return Ok(usize::from(first));
        }
        let count = usize::from(first & 0x7F);
        if count == 0 || count > 4 {
            return Err(SnmpCodecError::BadLength);
        }
        let mut len = 0usize;
        for _ in 0..count {
            len = (len << 8) | usize::from(self.byte()?);
        }
        Ok(len)
    }

    /// Next tag and its content
    pub fn read_tlv(&mut self) -> Result<(u8, &'a [u8]), SnmpCodecError> {
        let tag = self.byte()?;
        let len = self.length()?;
        let end = self.pos.checked_add(len).ok_or(SnmpCodecError::BadLength)?;
        let content = self.buf.get(self.pos..end).ok_or(SnmpCodecError::Truncated)?;
        self.pos = end;
        Ok((tag, content))
    }

    pub fn expect(&mut self, expected: u8) -> Result<&'a [u8], SnmpCodecError> {
        let (found, content) = self.read_tlv()?;
        if found != expected {
            return Err(SnmpCodecError::UnexpectedTag { expected, found });
        }
        Ok(content)
    }

    pub fn read_integer(&mut self) -> Result<i64, SnmpCodecError> {
        decode_integer(self.expect(TAG_INTEGER)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integer_bytes(value: i64) -> Vec<u8> {
        let mut out = Vec::new();
        encode_integer(value, &mut out);
        out
    }

    #[test]
    fn test_integer_minimal_encoding() {
        assert_eq!(integer_bytes(0), vec![0x02, 0x01, 0x00]);
        assert_eq!(integer_bytes(127), vec![0x02, 0x01, 0x7F]);
        assert_eq!(integer_bytes(128), vec![0x02, 0x02, 0x00, 0x80]);
        assert_eq!(integer_bytes(-1), vec![0x02, 0x01, 0xFF]);
        assert_eq!(integer_bytes(-129), vec![0x02, 0x02, 0xFF, 0x7F]);
    }

    #[test]
    fn test_integer_decoding_sign_extends() {
        assert_eq!(decode_integer(&[0xFF]), Ok(-1));
        assert_eq!(decode_integer(&[0x00, 0x80]), Ok(128));
        assert_eq!(decode_integer(&[0x01, 0x00]), Ok(256));
        assert_eq!(decode_integer(&[]), Err(SnmpCodecError::Truncated));
        assert_eq!(decode_integer(&[0; 9]), Err(SnmpCodecError::IntegerOverflow));
    }

    #[test]
    fn test_unsigned_strips_sign_octet() {
        // Counter32 0xFFFFFFFF is sent with a leading zero
        assert_eq!(decode_unsigned(&[0x00, 0xFF, 0xFF, 0xFF, 0xFF]), Ok(4_294_967_295));
        assert_eq!(decode_unsigned(&[0x00]), Ok(0));
        assert_eq!(decode_unsigned(&[0x05, 0x39]), Ok(1337));
    }

    #[test]
    fn test_oid_encoding_known_vector() {
        let mut out = Vec::new();
        encode_oid("1.3.6.1.4.1.2021.10.1.3.1", &mut out).unwrap();
        assert_eq!(
            out,
            vec![0x06, 0x0B, 0x2B, 0x06, 0x01, 0x04, 0x01, 0x8F, 0x65, 0x0A, 0x01, 0x03, 0x01]
        );
        assert_eq!(decode_oid(&out[2..]).unwrap(), "1.3.6.1.4.1.2021.10.1.3.1");
    }

    #[test]
    fn test_oid_rejects_garbage() {
        let mut out = Vec::new();
        assert!(encode_oid("1.3.six", &mut out).is_err());
        assert!(encode_oid("1", &mut out).is_err());
        assert!(encode_oid("1.40", &mut out).is_err());
        assert!(decode_oid(&[0x2B, 0x86]).is_err());
    }

    #[test]
    fn test_long_form_length() {
        let mut out = Vec::new();
        encode_length(300, &mut out);
        assert_eq!(out, vec![0x82, 0x01, 0x2C]);

        let mut message = Vec::new();
        encode_tlv(TAG_OCTET_STRING, &[b'x'; 300], &mut message);
        let mut reader = Reader::new(&message);
        let content = reader.expect(TAG_OCTET_STRING).unwrap();
        assert_eq!(content.len(), 300);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_reader_detects_truncation_and_wrong_tag() {
        let mut reader = Reader::new(&[0x04, 0x05, b'a']);
        assert_eq!(reader.read_tlv(), Err(SnmpCodecError::Truncated));

        let mut reader = Reader::new(&[0x05, 0x00]);
        assert_eq!(
            reader.expect(TAG_INTEGER),
            Err(SnmpCodecError::UnexpectedTag { expected: TAG_INTEGER, found: TAG_NULL })
        );
    }
}
