//! Variable-length integer and string decoding
//!
//! TMOD tables store integers as base-128 varints: seven data bits per byte,
//! least-significant group first, with the high bit set on every byte except
//! the last. Strings are a varint byte length followed by UTF-8 bytes.

use std::io::{ErrorKind, Read};

use crate::error::{TmodError, TmodResult, VarintFault};

/// Longest encoding of a 32-bit value
pub const MAX_VARINT_BYTES: usize = 5;

/// Upper bound on the buffer reserved up front for a string body
const MAX_STRING_PREALLOC: u64 = 4096;

/// Read a varint, returning the value and the number of bytes consumed
pub fn read_varint<R: Read>(reader: &mut R) -> TmodResult<(u64, usize)> {
    let mut result = 0u64;
    let mut consumed = 0usize;

    loop {
        if consumed == MAX_VARINT_BYTES {
            return Err(TmodError::MalformedVarint {
                consumed,
                fault: VarintFault::Overlong,
            });
        }

        let mut byte = [0u8; 1];
        if let Err(e) = reader.read_exact(&mut byte) {
            if e.kind() == ErrorKind::UnexpectedEof {
                return Err(TmodError::MalformedVarint {
                    consumed,
                    fault: VarintFault::Exhausted,
                });
            }
            return Err(e.into());
        }

        result |= u64::from(byte[0] & 0x7F) << (7 * consumed);
        consumed += 1;

        if byte[0] & 0x80 == 0 {
            break;
        }
    }

    // Five groups carry 35 bits; the top three must be clear
    if result > u64::from(u32::MAX) {
        return Err(TmodError::MalformedVarint {
            consumed,
            fault: VarintFault::Overlong,
        });
    }

    Ok((result, consumed))
}

/// Read a varint and reinterpret its low 32 bits as a signed integer
pub fn read_i32<R: Read>(reader: &mut R) -> TmodResult<(i32, usize)> {
    let (value, consumed) = read_varint(reader)?;
    Ok((value as u32 as i32, consumed))
}

/// Read a varint-length-prefixed UTF-8 string
///
/// Returns the string and the total bytes consumed (prefix included).
pub fn read_string<R: Read>(reader: &mut R) -> TmodResult<(String, usize)> {
    let (len, prefix) = read_varint(reader)?;

    let mut bytes = Vec::with_capacity(len.min(MAX_STRING_PREALLOC) as usize);
    let available = (&mut *reader).take(len).read_to_end(&mut bytes)?;

    if (available as u64) < len {
        return Err(TmodError::TruncatedString {
            expected: len,
            available: available as u64,
        });
    }

    let value = String::from_utf8(bytes)?;
    Ok((value, prefix + available))
}
