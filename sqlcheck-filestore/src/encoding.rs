//! The encoding policy of §4.4: try UTF-8 (with and without a BOM), then
//! the legacy encodings GBK-authored source fixtures actually show up in,
//! then fall back to UTF-8 with replacement.

use encoding_rs::{GBK, UTF_8, WINDOWS_1252};

/// Decodes `bytes` per the policy, or `None` if the first 1 KiB contains a
/// NUL byte (treated as binary, never attempted as text).
pub fn decode_text(bytes: &[u8]) -> Option<String> {
    let probe = &bytes[..bytes.len().min(1024)];
    if probe.contains(&0u8) {
        return None;
    }

    if let Ok(s) = std::str::from_utf8(bytes) {
        return Some(s.to_string());
    }

    let without_bom = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    if let Ok(s) = std::str::from_utf8(without_bom) {
        return Some(s.to_string());
    }

    for encoding in [WINDOWS_1252, GBK] {
        let (decoded, _, had_errors) = encoding.decode(bytes);
        if !had_errors {
            return Some(decoded.into_owned());
        }
    }

    let (decoded, _, _) = UTF_8.decode(bytes);
    Some(decoded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_utf8_decodes_directly() {
        assert_eq!(decode_text("SELECT 1;".as_bytes()).unwrap(), "SELECT 1;");
    }

    #[test]
    fn utf8_bom_is_stripped() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("SELECT 1;".as_bytes());
        assert_eq!(decode_text(&bytes).unwrap(), "SELECT 1;");
    }

    #[test]
    fn embedded_nul_in_first_kib_is_rejected_as_binary() {
        let mut bytes = vec![b'a', 0u8, b'b'];
        bytes.extend(std::iter::repeat(b'c').take(2000));
        assert!(decode_text(&bytes).is_none());
    }

    #[test]
    fn gbk_bytes_decode_without_tripping_replacement_fallback() {
        let (encoded, _, had_errors) = GBK.encode("查询");
        assert!(!had_errors);
        let decoded = decode_text(&encoded).unwrap();
        assert_eq!(decoded, "查询");
    }
}
