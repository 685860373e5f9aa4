//! Capability tokens and their validation.
//!
//! A capability token is a base64-encoded JSON document describing exactly one
//! resource (a blob, or an entry inside an archive blob) together with an
//! expiry. The token travels in the request path next to a lowercase-hex
//! HMAC-SHA256 signature computed over the base64 text with the process
//! secret key. Nothing inside the token is trusted until that signature has
//! been verified.

use crate::error::{TokenError, TokenResult};
use base64::{Engine as _, engine::general_purpose};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use time::OffsetDateTime;

type HmacSha256 = Hmac<Sha256>;

/// Length of a hex-encoded HMAC-SHA256 signature.
pub const SIGNATURE_HEX_LEN: usize = 64;

/// A verified capability token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapabilityToken {
    /// Content hash of the blob this token grants access to.
    pub hash: String,
    /// Expiry as seconds since the Unix epoch.
    pub expires: i64,
    /// Whether the blob is an archive whose entries are served individually.
    pub is_archive: bool,
    /// Display filename. Required to match the request path for plain blobs.
    pub filename: Option<String>,
    /// Content type override for plain blobs.
    pub content_type: Option<String>,
    /// Charset appended to the content type override.
    pub charset: Option<String>,
}

impl CapabilityToken {
    /// Create a token for a plain blob served under `filename`.
    pub fn for_blob(hash: impl Into<String>, expires: i64, filename: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            expires,
            is_archive: false,
            filename: Some(filename.into()),
            content_type: None,
            charset: None,
        }
    }

    /// Create a token for an archive blob whose entries are addressable.
    pub fn for_archive(hash: impl Into<String>, expires: i64) -> Self {
        Self {
            hash: hash.into(),
            expires,
            is_archive: true,
            filename: None,
            content_type: None,
            charset: None,
        }
    }

    /// Encode as the base64 JSON form carried in request paths.
    pub fn encode(&self) -> String {
        let payload = TokenPayload {
            hash: Some(self.hash.clone()),
            expires: Some(Expiry::Seconds(self.expires)),
            zip: self.is_archive.then_some(ArchiveFlag::Flag(true)),
            filename: self.filename.clone(),
            content_type: self.content_type.clone(),
            charset: self.charset.clone(),
        };
        // Serializing a struct of strings and integers cannot fail.
        let json = serde_json::to_vec(&payload).unwrap_or_default();
        general_purpose::STANDARD.encode(json)
    }

    /// Content type from the token, with the charset appended when present.
    pub fn content_type_header(&self) -> Option<String> {
        let content_type = self.content_type.as_deref()?;
        match self.charset.as_deref() {
            Some(charset) if !charset.is_empty() => {
                Some(format!("{content_type}; charset={charset}"))
            }
            _ => Some(content_type.to_string()),
        }
    }
}

/// Raw JSON payload as written by token issuers.
#[derive(Debug, Serialize, Deserialize)]
struct TokenPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires: Option<Expiry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    zip: Option<ArchiveFlag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filename: Option<String>,
    #[serde(
        default,
        rename = "contentType",
        skip_serializing_if = "Option::is_none"
    )]
    content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    charset: Option<String>,
}

/// Issuers write the archive flag either as a boolean or as `0`/`1`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ArchiveFlag {
    Flag(bool),
    Number(serde_json::Number),
}

impl ArchiveFlag {
    fn is_set(&self) -> bool {
        match self {
            Self::Flag(flag) => *flag,
            Self::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        }
    }
}

/// Expiry in epoch seconds, integral or fractional.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Expiry {
    Seconds(i64),
    Fractional(f64),
}

impl Expiry {
    fn has_passed(&self, now: i64) -> bool {
        match self {
            Self::Seconds(secs) => *secs <= now,
            Self::Fractional(secs) => *secs <= now as f64,
        }
    }

    fn as_seconds(&self) -> i64 {
        match self {
            Self::Seconds(secs) => *secs,
            Self::Fractional(secs) => secs.floor() as i64,
        }
    }
}

/// Fast shape check: exactly 64 lowercase hex characters.
pub fn is_signature_shaped(signature: &str) -> bool {
    signature.len() == SIGNATURE_HEX_LEN
        && signature
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Validates capability tokens against the process secret key.
#[derive(Clone)]
pub struct TokenVerifier {
    secret: Vec<u8>,
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl TokenVerifier {
    /// Create a verifier for the given secret key.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self) -> TokenResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret).map_err(|_| TokenError::InvalidSignature)
    }

    /// Compute the lowercase-hex signature for an encoded token.
    pub fn sign(&self, encoded: &str) -> String {
        match self.mac() {
            Ok(mut mac) => {
                mac.update(encoded.as_bytes());
                hex::encode(mac.finalize().into_bytes())
            }
            Err(_) => String::new(),
        }
    }

    /// Encode and sign a token, returning `(encoded, signature)`.
    pub fn issue(&self, token: &CapabilityToken) -> (String, String) {
        let encoded = token.encode();
        let signature = self.sign(&encoded);
        (encoded, signature)
    }

    /// Verify a token against the current wall clock.
    pub fn verify(&self, encoded: &str, signature: &str) -> TokenResult<CapabilityToken> {
        self.verify_at(encoded, signature, OffsetDateTime::now_utc().unix_timestamp())
    }

    /// Verify a token as of `now` (seconds since the Unix epoch).
    ///
    /// Checks run cheapest first: signature shape, MAC, payload decoding,
    /// required fields and finally expiry. An expiry equal to `now` is
    /// already expired.
    pub fn verify_at(
        &self,
        encoded: &str,
        signature: &str,
        now: i64,
    ) -> TokenResult<CapabilityToken> {
        if !is_signature_shaped(signature) {
            return Err(TokenError::InvalidSignature);
        }

        let expected = hex::decode(signature).map_err(|_| TokenError::InvalidSignature)?;
        let mut mac = self.mac()?;
        mac.update(encoded.as_bytes());
        mac.verify_slice(&expected)
            .map_err(|_| TokenError::InvalidSignature)?;

        let json = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| TokenError::MalformedToken(format!("invalid base64: {e}")))?;
        let payload: TokenPayload = serde_json::from_slice(&json)
            .map_err(|e| TokenError::MalformedToken(format!("invalid payload: {e}")))?;

        let hash = payload
            .hash
            .filter(|h| !h.is_empty())
            .ok_or(TokenError::MissingField("hash"))?;
        let expires = payload.expires.ok_or(TokenError::MissingField("expires"))?;

        if expires.has_passed(now) {
            return Err(TokenError::Expired);
        }

        Ok(CapabilityToken {
            hash,
            expires: expires.as_seconds(),
            is_archive: payload.zip.as_ref().is_some_and(ArchiveFlag::is_set),
            filename: payload.filename,
            content_type: payload.content_type,
            charset: payload.charset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn verifier() -> TokenVerifier {
        TokenVerifier::new("test-secret")
    }

    fn sign_json(json: &str) -> (String, String) {
        let encoded = general_purpose::STANDARD.encode(json);
        let signature = verifier().sign(&encoded);
        (encoded, signature)
    }

    #[test]
    fn test_issue_then_verify() {
        let token = CapabilityToken::for_blob("abc123", NOW + 10, "file");
        let (encoded, signature) = verifier().issue(&token);

        let verified = verifier().verify_at(&encoded, &signature, NOW).unwrap();
        assert_eq!(verified, token);
    }

    #[test]
    fn test_signature_shape_rejected_before_mac() {
        let token = CapabilityToken::for_blob("abc123", NOW + 10, "file");
        let (encoded, signature) = verifier().issue(&token);

        let upper = signature.to_uppercase();
        let short = &signature[..63];
        let long = format!("{signature}0");
        let non_hex = format!("{}g", &signature[..63]);

        for bad in [upper.as_str(), short, long.as_str(), non_hex.as_str(), ""] {
            assert_eq!(
                verifier().verify_at(&encoded, bad, NOW),
                Err(TokenError::InvalidSignature),
                "signature {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_every_mutated_byte_is_rejected() {
        let token = CapabilityToken::for_archive("zip1", NOW + 10);
        let (encoded, signature) = verifier().issue(&token);

        for i in 0..encoded.len() {
            let mut bytes = encoded.clone().into_bytes();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let mutated = String::from_utf8(bytes).unwrap();
            if mutated == encoded {
                continue;
            }
            assert_eq!(
                verifier().verify_at(&mutated, &signature, NOW),
                Err(TokenError::InvalidSignature),
                "mutation at byte {i} should be rejected"
            );
        }
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = CapabilityToken::for_blob("abc123", NOW + 10, "file");
        let (encoded, signature) = TokenVerifier::new("other-secret").issue(&token);

        assert_eq!(
            verifier().verify_at(&encoded, &signature, NOW),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_expiry_boundary_is_expired() {
        let token = CapabilityToken::for_blob("abc123", NOW, "file");
        let (encoded, signature) = verifier().issue(&token);

        assert_eq!(
            verifier().verify_at(&encoded, &signature, NOW),
            Err(TokenError::Expired)
        );
        assert!(verifier().verify_at(&encoded, &signature, NOW - 1).is_ok());
    }

    #[test]
    fn test_fractional_expiry() {
        let (encoded, signature) = sign_json(r#"{"hash":"h","expires":1700000000.5}"#);

        let token = verifier().verify_at(&encoded, &signature, NOW).unwrap();
        assert_eq!(token.expires, NOW);
        assert_eq!(
            verifier().verify_at(&encoded, &signature, NOW + 1),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_signed_garbage_is_malformed() {
        let encoded = "not base64 at all!";
        let signature = verifier().sign(encoded);
        assert!(matches!(
            verifier().verify_at(encoded, &signature, NOW),
            Err(TokenError::MalformedToken(_))
        ));

        let (encoded, signature) = sign_json("[1, 2, 3]");
        assert!(matches!(
            verifier().verify_at(&encoded, &signature, NOW),
            Err(TokenError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_missing_fields() {
        let (encoded, signature) = sign_json(r#"{"expires":1700000010}"#);
        assert_eq!(
            verifier().verify_at(&encoded, &signature, NOW),
            Err(TokenError::MissingField("hash"))
        );

        let (encoded, signature) = sign_json(r#"{"hash":"","expires":1700000010}"#);
        assert_eq!(
            verifier().verify_at(&encoded, &signature, NOW),
            Err(TokenError::MissingField("hash"))
        );

        let (encoded, signature) = sign_json(r#"{"hash":"abc"}"#);
        assert_eq!(
            verifier().verify_at(&encoded, &signature, NOW),
            Err(TokenError::MissingField("expires"))
        );
    }

    #[test]
    fn test_archive_flag_forms() {
        for (json, expected) in [
            (r#"{"hash":"z","expires":1700000010,"zip":1}"#, true),
            (r#"{"hash":"z","expires":1700000010,"zip":0}"#, false),
            (r#"{"hash":"z","expires":1700000010,"zip":true}"#, true),
            (r#"{"hash":"z","expires":1700000010,"zip":false}"#, false),
            (r#"{"hash":"z","expires":1700000010}"#, false),
        ] {
            let (encoded, signature) = sign_json(json);
            let token = verifier().verify_at(&encoded, &signature, NOW).unwrap();
            assert_eq!(token.is_archive, expected, "payload {json}");
        }
    }

    #[test]
    fn test_content_type_header() {
        let (encoded, signature) = sign_json(
            r#"{"hash":"h","expires":1700000010,"filename":"a.txt","contentType":"text/plain","charset":"latin1"}"#,
        );
        let token = verifier().verify_at(&encoded, &signature, NOW).unwrap();
        assert_eq!(
            token.content_type_header().as_deref(),
            Some("text/plain; charset=latin1")
        );

        let mut token = CapabilityToken::for_blob("h", NOW, "a.bin");
        assert_eq!(token.content_type_header(), None);
        token.content_type = Some("application/pdf".to_string());
        assert_eq!(
            token.content_type_header().as_deref(),
            Some("application/pdf")
        );
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", verifier());
        assert!(!rendered.contains("test-secret"));
        assert!(rendered.contains("redacted"));
    }
}
