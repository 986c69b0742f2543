use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};

/// `base64(sha256(utf8(input)))`, the building block of the obs-websocket 4.x
/// challenge/response.
pub fn hash_encode(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    general_purpose::STANDARD.encode(digest)
}

pub fn secret(password: &str, salt: &str) -> String {
    hash_encode(&format!("{password}{salt}"))
}

/// Value of the `auth` parameter sent with `Authenticate`.
pub fn auth_response(password: &str, salt: &str, challenge: &str) -> String {
    let secret = secret(password, salt);
    hash_encode(&format!("{secret}{challenge}"))
}
