use crate::error::{ClientError, ClientResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Application server key the backend signs push messages with, as a
/// base64url string. Overridable through `push.vapid_public_key`.
pub const DEFAULT_VAPID_PUBLIC_KEY: &str =
    "BEl62iUYgUivxIkv69yViEuiBIa-Ib9-SkvMeAtA3LFgDzkrxZJjSgSnfckjBJuBkr3qBUYIHBQFLXYp5Nksh8U";

/// Decodes a base64url application server key into raw bytes.
///
/// Keys come unpadded off the wire. The input is padded with `=` to a
/// multiple of four, `-` and `_` are mapped to the standard alphabet,
/// and the result is decoded as standard base64.
pub fn decode_application_server_key(key: &str) -> ClientResult<Vec<u8>> {
    let padding = (4 - key.len() % 4) % 4;
    let padded = format!("{key}{}", "=".repeat(padding));
    let standard = padded.replace('-', "+").replace('_', "/");
    STANDARD
        .decode(standard)
        .map_err(|e| ClientError::BadRequest(format!("invalid application server key: {e}")))
}
