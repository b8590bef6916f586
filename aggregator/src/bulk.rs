//! Detection of subscriptions delivered as one base64 blob.

use crate::codec::Scheme;
use crate::encoding::decode_base64_lenient;

/// Returns the plain URI list contained in `text`.
///
/// Text that already contains `://` is a plain list and is returned as is.
/// Otherwise the whole text is base64-decoded, and the result is only used
/// when it mentions at least one supported scheme. Anything else is returned
/// unchanged, so arbitrary plaintext is never mistaken for base64.
pub fn unwrap_bulk(text: &str) -> String {
    if text.contains("://") {
        return text.to_string();
    }

    match decode_base64_lenient(text) {
        Some(decoded) if contains_known_scheme(&decoded) => decoded,
        _ => text.to_string(),
    }
}

fn contains_known_scheme(text: &str) -> bool {
    let lowered = text.to_ascii_lowercase();
    Scheme::PREFIXES.iter().any(|prefix| lowered.contains(prefix))
}

/// Trimmed, non-empty lines that are not `#` comments.
pub fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::encode_base64;

    #[test]
    fn test_plain_list_untouched() {
        let text = "vless://u@h.test:443\ntrojan://p@h.test:443";
        assert_eq!(unwrap_bulk(text), text);
    }

    #[test]
    fn test_base64_list_decoded() {
        let list = "vless://u@h.test:443\nss://bWV0aG9kOnBhc3M=@e.test:8388";
        let blob = encode_base64(list);
        assert_eq!(unwrap_bulk(&blob), list);

        // wrapped at 76 columns and without padding
        let wrapped: String = blob
            .trim_end_matches('=')
            .as_bytes()
            .chunks(76)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(unwrap_bulk(&wrapped), list);
    }

    #[test]
    fn test_base64_without_known_scheme_untouched() {
        let blob = encode_base64("just some words");
        assert_eq!(unwrap_bulk(&blob), blob);
    }

    #[test]
    fn test_plaintext_untouched() {
        assert_eq!(unwrap_bulk("hello world"), "hello world");
        assert_eq!(unwrap_bulk(""), "");
    }

    #[test]
    fn test_split_lines() {
        let text = "  a://1 \r\n\n# comment\n   \nb://2\r\n";
        assert_eq!(split_lines(text).collect::<Vec<_>>(), vec!["a://1", "b://2"]);
    }
}
