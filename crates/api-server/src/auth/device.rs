//! Device MAC tokens
//!
//! A device credential is `<deviceId>:<hexlower-64>` where the digest is
//! HMAC-SHA256 over the device id keyed on the deployment secret. The
//! verifier recomputes and compares in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

fn mac_digest_hex(secret: &str, device_id: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(device_id.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Mint the sole valid token for a device under the given secret.
pub fn device_token(device_id: Uuid, secret: &str) -> String {
    let id = device_id.to_string();
    let digest = mac_digest_hex(secret, &id);
    format!("{}:{}", id, digest)
}

/// Verify a presented token. Any parse failure or digest mismatch is an
/// authentication failure; the caller maps it to UNAUTHORIZED.
pub fn verify_device_token(token: &str, secret: &str) -> Result<Uuid, String> {
    let (id, presented) = token
        .split_once(':')
        .ok_or_else(|| "Malformed device token".to_string())?;
    let expected = mac_digest_hex(secret, id);
    if !bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
        return Err("Device token digest mismatch".to_string());
    }
    Uuid::parse_str(id).map_err(|_| "Invalid device id in token".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_token_verifies() {
        let device_id = Uuid::new_v4();
        let token = device_token(device_id, "s");
        assert_eq!(verify_device_token(&token, "s").unwrap(), device_id);
    }

    #[test]
    fn any_other_digest_is_rejected() {
        let device_id = Uuid::new_v4();
        let token = device_token(device_id, "s");
        let (id, digest) = token.split_once(':').unwrap();

        // flip one hex character
        let mut tampered: Vec<char> = digest.chars().collect();
        tampered[0] = if tampered[0] == 'a' { 'b' } else { 'a' };
        let tampered: String = tampered.into_iter().collect();
        assert!(verify_device_token(&format!("{}:{}", id, tampered), "s").is_err());

        // a digest for the wrong secret is rejected too
        let other = device_token(device_id, "other");
        assert!(verify_device_token(&other, "s").is_err());
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!(verify_device_token("no-colon-here", "s").is_err());
        assert!(verify_device_token(":", "s").is_err());
        assert!(verify_device_token("", "s").is_err());
    }

    #[test]
    fn digest_is_lowercase_hex_over_the_device_id() {
        let device_id = Uuid::new_v4();
        let token = device_token(device_id, "s");
        let (id, digest) = token.split_once(':').unwrap();
        assert_eq!(id, device_id.to_string());
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
