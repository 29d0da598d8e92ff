//! Account credentials and session tokens.
//!
//! Credentials are HMAC-SHA256 over phone and password; session tokens are
//! an HMAC-signed payload, checked on every authenticated request. No
//! session state lives in the store.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac(secret: &str, data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Hex credential stored on the account row.
pub fn credential_hash(secret: &str, phone: &str, password: &str) -> String {
    hex::encode(mac(secret, format!("{phone}\n{password}").as_bytes()))
}

/// "base64(account_id:phone).hex(hmac)" bearer token.
pub fn issue_token(secret: &str, account_id: i64, phone: &str) -> String {
    let payload = format!("{account_id}:{phone}");
    let encoded = URL_SAFE_NO_PAD.encode(payload.as_bytes());
    let sig = hex::encode(mac(secret, encoded.as_bytes()));
    format!("{encoded}.{sig}")
}

/// Verify a bearer token, returning the account id and phone it was issued
/// for.
pub fn verify_token(secret: &str, token: &str) -> Option<(i64, String)> {
    let (encoded, sig) = token.split_once('.')?;
    let expected = mac(secret, encoded.as_bytes());
    let given = hex::decode(sig).ok()?;
    if !constant_time_eq(&expected, &given) {
        return None;
    }
    let payload = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    let payload = String::from_utf8(payload).ok()?;
    let (id, phone) = payload.split_once(':')?;
    Some((id.parse().ok()?, phone.to_string()))
}

/// Constant-time admin token comparison.
pub fn admin_token_ok(expected: &str, given: &str) -> bool {
    constant_time_eq(expected.as_bytes(), given.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Extract the token from an "Authorization: Bearer ..." header value.
pub fn bearer(header: &str) -> Option<&str> {
    header.strip_prefix("Bearer ").map(str::trim)
}
