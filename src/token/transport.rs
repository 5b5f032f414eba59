//! Encoding applied to refresh tokens where they cross the client boundary.

use crate::token::Error;
use base64ct::{Base64, Encoding};

/// Standard padded base64 of the signed refresh token.
#[must_use]
pub fn encode_refresh(token: &str) -> String {
    Base64::encode_string(token.as_bytes())
}

/// # Errors
///
/// Returns [`Error::InvalidToken`] if the value is not base64 or not UTF-8.
pub fn decode_refresh(encoded: &str) -> Result<String, Error> {
    let bytes = Base64::decode_vec(encoded.trim()).map_err(|_| Error::InvalidToken)?;
    String::from_utf8(bytes).map_err(|_| Error::InvalidToken)
}
