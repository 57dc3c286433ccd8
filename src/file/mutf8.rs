//! Modified UTF-8 as used by `CONSTANT_Utf8` entries.
//!
//! Differs from standard UTF-8 in two ways: `U+0000` is written as the two bytes `C0 80`,
//! and supplementary characters are written as two separately encoded surrogates (six bytes)
//! instead of one four-byte sequence.

use crate::Result;

/// Decodes modified UTF-8 bytes into a Rust string.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] on truncated sequences, four-byte forms or unpaired
/// surrogates.
pub fn decode(bytes: &[u8]) -> Result<String> {
    if bytes.iter().all(|b| *b != 0 && *b < 0x80) {
        // Fast path, plain ASCII covers nearly all identifiers and descriptors
        return Ok(String::from_utf8_lossy(bytes).into_owned());
    }

    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        if b0 & 0x80 == 0 {
            if b0 == 0 {
                return Err(malformed_error!("Raw NUL byte in modified UTF-8"));
            }
            units.push(u16::from(b0));
            i += 1;
        } else if b0 & 0xE0 == 0xC0 {
            let Some(&b1) = bytes.get(i + 1) else {
                return Err(malformed_error!("Truncated two-byte modified UTF-8 sequence"));
            };
            if b1 & 0xC0 != 0x80 {
                return Err(malformed_error!("Invalid continuation byte {:#04x}", b1));
            }
            units.push((u16::from(b0 & 0x1F) << 6) | u16::from(b1 & 0x3F));
            i += 2;
        } else if b0 & 0xF0 == 0xE0 {
            let (Some(&b1), Some(&b2)) = (bytes.get(i + 1), bytes.get(i + 2)) else {
                return Err(malformed_error!(
                    "Truncated three-byte modified UTF-8 sequence"
                ));
            };
            if b1 & 0xC0 != 0x80 || b2 & 0xC0 != 0x80 {
                return Err(malformed_error!("Invalid continuation byte in sequence"));
            }
            units.push(
                (u16::from(b0 & 0x0F) << 12) | (u16::from(b1 & 0x3F) << 6) | u16::from(b2 & 0x3F),
            );
            i += 3;
        } else {
            return Err(malformed_error!(
                "Invalid modified UTF-8 lead byte {:#04x}",
                b0
            ));
        }
    }

    String::from_utf16(&units).map_err(|_| malformed_error!("Unpaired surrogate in modified UTF-8"))
}

/// Encodes a string as modified UTF-8.
#[must_use]
pub fn encode(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(value));
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

/// Number of bytes [`encode`] produces for `value`.
#[must_use]
pub fn encoded_len(value: &str) -> usize {
    value
        .encode_utf16()
        .map(|unit| match unit {
            0x0001..=0x007F => 1,
            0x0000 | 0x0080..=0x07FF => 2,
            _ => 3,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii() {
        assert_eq!(decode(b"java/lang/Object").unwrap(), "java/lang/Object");
        assert_eq!(encode("()V"), b"()V");
    }

    #[test]
    fn nul_and_supplementary() {
        let text = "a\0\u{1F600}é";
        let bytes = encode(text);
        assert_eq!(&bytes[1..3], &[0xC0, 0x80]);
        assert_eq!(bytes.len(), encoded_len(text));
        // surrogate pair is two three-byte sequences
        assert_eq!(bytes.len(), 1 + 2 + 6 + 2);
        assert_eq!(decode(&bytes).unwrap(), text);
    }

    #[test]
    fn rejects_invalid() {
        assert!(decode(&[0x00]).is_err());
        assert!(decode(&[0xC3]).is_err());
        assert!(decode(&[0xF0, 0x9F, 0x98, 0x80]).is_err());
        // lone high surrogate
        assert!(decode(&[0xED, 0xA0, 0x80]).is_err());
    }
}
