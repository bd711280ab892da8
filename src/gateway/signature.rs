use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Verify a webhook body against its `X-Guard-Signature-256` header.
/// Returns true if the signature is valid, false otherwise.
pub fn verify_signature(secret: &str, body: &[u8], signature_header: &str) -> bool {
    // Signature format: "sha256=<hex_signature>"
    let Some(hex_sig) = signature_header.strip_prefix("sha256=") else {
        return false;
    };

    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    // Constant-time comparison
    mac.verify_slice(&expected).is_ok()
}

/// Produce the header value for a body — used by tests and operational
/// tooling to exercise the endpoint.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
