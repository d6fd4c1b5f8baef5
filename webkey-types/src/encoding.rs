//! Base64url helpers used for all byte strings crossing the page boundary.
//!
//! The page-side hooks encode binary fields (challenges, user handles, raw
//! credential ids) as unpadded base64url, so that is the canonical encoding
//! here. Decoding is lenient about padding since relying parties are not.

use data_encoding::{BASE64URL, BASE64URL_NOPAD, Specification};

/// Convert bytes to base64url without padding.
pub fn base64url(data: &[u8]) -> String {
    BASE64URL_NOPAD.encode(data)
}

/// Try parsing from base64url, accepting both padded and unpadded input.
pub fn try_from_base64url(input: &str) -> Option<Vec<u8>> {
    let specs = BASE64URL.specification();
    let padding = specs.padding?;
    let specs = Specification {
        check_trailing_bits: false,
        padding: None,
        ..specs
    };
    let encoding = specs.encoding().ok()?;
    let sane_string = input.trim_end_matches(padding);
    encoding.decode(sane_string.as_bytes()).ok()
}
