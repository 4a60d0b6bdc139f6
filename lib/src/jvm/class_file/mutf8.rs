//! The "modified UTF-8" encoding of `CONSTANT_Utf8_info` ([JVMS 4.4.7][0])
//!
//! Strings are encoded one UTF-16 code unit at a time, so supplementary characters become two
//! 3-byte surrogates. `U+0000` uses the 2-byte form, which keeps encoded strings free of zero
//! bytes.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.4.7

pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(string.len());
    for unit in string.encode_utf16() {
        match unit {
            0x0001..=0x007F => buffer.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                buffer.push(0xC0 | (unit >> 6) as u8);
                buffer.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                buffer.push(0xE0 | (unit >> 12) as u8);
                buffer.push(0x80 | (unit >> 6 & 0x3F) as u8);
                buffer.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    buffer
}

/// Lone surrogates and malformed sequences decode to `U+FFFD`
pub fn decode_modified_utf8(bytes: &[u8]) -> String {
    let continuation = |at: usize| -> Option<u16> {
        bytes
            .get(at)
            .filter(|byte| *byte & 0xC0 == 0x80)
            .map(|byte| (*byte & 0x3F) as u16)
    };

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let lead = bytes[i] as u16;
        let (unit, len) = match lead {
            0x00..=0x7F => (lead, 1),
            0xC0..=0xDF => match continuation(i + 1) {
                Some(b1) => ((lead & 0x1F) << 6 | b1, 2),
                None => (0xFFFD, 1),
            },
            0xE0..=0xEF => match (continuation(i + 1), continuation(i + 2)) {
                (Some(b1), Some(b2)) => ((lead & 0x0F) << 12 | b1 << 6 | b2, 3),
                _ => (0xFFFD, 1),
            },
            _ => (0xFFFD, 1),
        };
        units.push(unit);
        i += len;
    }
    String::from_utf16_lossy(&units)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ascii_is_unchanged() {
        assert_eq!(encode_modified_utf8("foo"), b"foo");
        assert_eq!(decode_modified_utf8(b"hel10_World"), "hel10_World");
    }

    #[test]
    fn null_uses_two_bytes() {
        assert_eq!(encode_modified_utf8("a\0a"), vec![b'a', 0xC0, 0x80, b'a']);
        assert_eq!(decode_modified_utf8(&[b'a', 0xC0, 0x80, b'a']), "a\0a");
    }

    #[test]
    fn bmp_matches_utf8() {
        let text = "Ąǎ ऄअ ะ ༁ €";
        assert_eq!(encode_modified_utf8(text), text.as_bytes());
        assert_eq!(decode_modified_utf8(text.as_bytes()), text);
    }

    #[test]
    fn supplementary_characters_are_surrogate_pairs() {
        let encoded = vec![0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80];
        assert_eq!(encode_modified_utf8("\u{1F600}"), encoded);
        assert_eq!(decode_modified_utf8(&encoded), "\u{1F600}");

        let text = "\u{10000}x\u{10FFFF}";
        assert_eq!(decode_modified_utf8(&encode_modified_utf8(text)), text);
    }

    #[test]
    fn malformed_input() {
        assert_eq!(decode_modified_utf8(&[0xED, 0xA0, 0x80, b'a']), "\u{FFFD}a");
        assert_eq!(decode_modified_utf8(&[0xC3]), "\u{FFFD}");
        assert_eq!(decode_modified_utf8(&[0xFF, b'b']), "\u{FFFD}b");
    }
}
