//! Base64 and percent-encoding helpers shared by the codec, the bulk decoder
//! and the chunker.

use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Accepts padded and unpadded input as well as stray trailing bits, the way
/// subscription providers emit it in practice.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Same characters left unescaped as `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Decodes base64 text into UTF-8, tolerating whitespace, missing padding and
/// the URL-safe alphabet. Returns `None` for anything that is not valid base64
/// or does not decode to UTF-8.
pub fn decode_base64_lenient(input: &str) -> Option<String> {
    let normalized: String = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();

    if normalized.is_empty() {
        return None;
    }

    let bytes = LENIENT.decode(normalized.trim_end_matches('=')).ok()?;
    String::from_utf8(bytes).ok()
}

/// Standard, padded base64 of the UTF-8 bytes of `input`.
pub fn encode_base64(input: &str) -> String {
    STANDARD.encode(input.as_bytes())
}

/// Percent-encodes a URI component (userinfo, fragment).
pub fn encode_component(input: &str) -> String {
    utf8_percent_encode(input, COMPONENT).to_string()
}

/// Percent-decodes a URI component. Invalid UTF-8 sequences are replaced.
pub fn decode_component(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}
