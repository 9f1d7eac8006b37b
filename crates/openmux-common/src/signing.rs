//! The two vendor request-signing algorithms (SPEC_FULL.md §4.5, §9).
//!
//! Both are reproduced byte-for-byte per the open questions in §9: they are
//! cargo-culted from the vendors' web apps, have no public specification, and must
//! not be "cleaned up" or re-derived. Only the helper plumbing (md5, hex, nonce
//! generation) is idiomatic Rust; the algorithm steps themselves are load-bearing.

use md5::{Digest, Md5};
use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Fixed 32-hex secret carried in the ticket-vendor adapter.
pub const TICKET_VENDOR_SECRET: &str = "8f14e45fceea167a5a36dedd4bea2543";

/// Fixed query-string seed object the composite-vendor adapter always sends
/// alongside the per-request fields. The upstream expects these exact keys.
pub const FAKE_USER_DATA: &[(&str, &str)] = &[
    ("platform", "web"),
    ("channel", "official"),
    ("client_version", "1.0.0"),
];

pub fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    hex_lower(&hasher.finalize())
}

fn hex_lower(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

pub fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

pub fn random_hex_nonce(len_bytes: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len_bytes).map(|_| rng.random()).collect();
    hex_lower(&bytes)
}

/// Timestamp-mangling signature headers: `X-Timestamp`, `X-Nonce`, `X-Sign`.
///
/// `T = now_ms.to_string()`; `A = sum_of_digits(T) - digit_value(T[-2])`;
/// `a = A mod 10`; `timestamp = T` with its second-to-last character replaced by `a`.
pub struct TimestampSignature {
    pub timestamp: String,
    pub nonce: String,
    pub sign: String,
}

pub fn sign_timestamp_mangled(now_ms: u128, secret: &str, nonce: &str) -> TimestampSignature {
    let t = now_ms.to_string();
    let digits: Vec<char> = t.chars().collect();
    let sum_of_digits: u32 = digits.iter().filter_map(|c| c.to_digit(10)).sum();
    let second_last_idx = digits.len().saturating_sub(2);
    let second_last_value = digits
        .get(second_last_idx)
        .and_then(|c| c.to_digit(10))
        .unwrap_or(0);
    let a = (sum_of_digits.wrapping_sub(second_last_value)) % 10;

    let mut mangled: Vec<char> = digits;
    if let Some(slot) = mangled.get_mut(second_last_idx) {
        *slot = std::char::from_digit(a, 10).unwrap_or('0');
    }
    let timestamp: String = mangled.into_iter().collect();

    let sign = md5_hex(&format!("{timestamp}-{nonce}-{secret}"));

    TimestampSignature {
        timestamp,
        nonce: nonce.to_string(),
        sign,
    }
}

/// `yy`/`x-signature` composite signature headers: `token`, `x-timestamp`,
/// `x-signature`, `yy`.
pub struct CompositeSignature {
    pub token: String,
    pub x_timestamp: String,
    pub x_signature: String,
    pub yy: String,
}

pub fn sign_composite(now_ms: u128, user_id: &str, jwt_token: &str) -> CompositeSignature {
    let unix = now_ms.to_string();
    let timestamp = (now_ms / 1000).to_string();

    let mut pairs: Vec<(String, String)> = FAKE_USER_DATA
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    pairs.push(("uuid".to_string(), user_id.to_string()));
    pairs.push(("user_id".to_string(), user_id.to_string()));
    pairs.push(("unix".to_string(), unix.clone()));
    pairs.push(("token".to_string(), jwt_token.to_string()));

    let query_str = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let uri = format!("/v1/api/user/info?{query_str}");
    let encoded_uri = urlencoding::encode(&uri).into_owned();

    let yy = md5_hex(&format!(
        "{encoded_uri}_{{}}{}ooui",
        md5_hex(&unix)
    ));
    let x_signature = md5_hex(&format!("{timestamp}{jwt_token}{{}}"));

    CompositeSignature {
        token: jwt_token.to_string(),
        x_timestamp: timestamp,
        x_signature,
        yy,
    }
}
