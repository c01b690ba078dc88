//! Request signing for the S3 REST API (signature version 2).
//!
//! ```text
//! StringToSign = METHOD \n
//!                Content-MD5 \n      (always empty here)
//!                Content-Type \n
//!                Date \n
//!                /bucket/key
//! Signature    = base64(HMAC-SHA1(secret, StringToSign))
//! Authorization: AWS <access key id>:<signature>
//! ```

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Format used by the `Date` and `Expires` headers.
const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// How long uploaded objects may be cached.
pub const CACHE_LIFETIME_DAYS: i64 = 365;

#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

pub fn string_to_sign(
    method: &str,
    content_type: &str,
    date: &str,
    bucket: &str,
    key: &str,
) -> String {
    format!("{method}\n\n{content_type}\n{date}\n/{bucket}/{key}")
}

impl Credentials {
    pub fn sign(&self, string_to_sign: &str) -> String {
        let mut mac = HmacSha1::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(string_to_sign.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }

    /// Value of the `Authorization` header for a request.
    pub fn authorization(&self, string_to_sign: &str) -> String {
        format!("AWS {}:{}", self.access_key_id, self.sign(string_to_sign))
    }
}

pub fn http_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE).to_string()
}

/// `Expires` header value for an object uploaded at `at`.
pub fn expires(at: DateTime<Utc>) -> String {
    http_date(at + Duration::days(CACHE_LIFETIME_DAYS))
}
