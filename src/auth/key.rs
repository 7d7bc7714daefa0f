//! Private key parsing and signed claim sets.
//!
//! # Responsibilities
//! - Parse a service-account private key in either binary encoding
//! - Build the claim set exchanged at the OAuth token endpoint
//! - Sign claim sets as RS256 JWTs
//! - Read the `exp` claim of an issued token
//!
//! # Design Decisions
//! - A PEM envelope is unwrapped first, whatever its label says
//! - PKCS#8 is tried first, PKCS#1 second; both failing is a single error
//! - Claim sets are created fresh for every mint and never stored

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, LineEnding};
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// Lifetime of a signed claim set.
pub const CLAIM_LIFETIME_SECS: u64 = 3600;

/// Which binary encoding a key was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEncoding {
    /// PKCS#8 `PrivateKeyInfo` (primary).
    Pkcs8,
    /// PKCS#1 `RSAPrivateKey` (legacy fallback).
    Pkcs1,
}

/// A parsed RSA signing key.
pub struct PrivateKey {
    inner: RsaPrivateKey,
    encoding: KeyEncoding,
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

impl PrivateKey {
    /// Parse a key blob, PEM-wrapped or raw DER.
    pub fn parse(blob: &[u8]) -> GatewayResult<Self> {
        let der = match rsa::pkcs1::pem::decode_vec(blob) {
            Ok((_label, der)) => der,
            Err(_) => blob.to_vec(),
        };

        let primary = match RsaPrivateKey::from_pkcs8_der(&der) {
            Ok(inner) => {
                return Ok(Self {
                    inner,
                    encoding: KeyEncoding::Pkcs8,
                })
            }
            Err(e) => e,
        };

        match RsaPrivateKey::from_pkcs1_der(&der) {
            Ok(inner) => Ok(Self {
                inner,
                encoding: KeyEncoding::Pkcs1,
            }),
            Err(legacy) => Err(GatewayError::KeyParse(format!(
                "not PKCS#8 ({}) and not PKCS#1 ({})",
                primary, legacy
            ))),
        }
    }

    pub fn encoding(&self) -> KeyEncoding {
        self.encoding
    }

    fn encoding_key(&self) -> GatewayResult<EncodingKey> {
        let pem = self
            .inner
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| GatewayError::KeyParse(e.to_string()))?;
        EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| GatewayError::KeyParse(e.to_string()))
    }
}

/// Claims sent as the JWT-bearer assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSet {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: u64,
    pub exp: u64,

    /// Audience of the identity token being requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_audience: Option<String>,

    /// OAuth scope when an access token is requested instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl ClaimSet {
    /// Claims for an identity token scoped to `target_audience`.
    pub fn identity(
        email: &str,
        token_endpoint: &str,
        target_audience: &str,
        issued_at: u64,
    ) -> Self {
        Self {
            target_audience: Some(target_audience.to_string()),
            ..Self::base(email, token_endpoint, issued_at)
        }
    }

    /// Claims for an access token carrying `scope`.
    pub fn access(email: &str, token_endpoint: &str, scope: &str, issued_at: u64) -> Self {
        Self {
            scope: Some(scope.to_string()),
            ..Self::base(email, token_endpoint, issued_at)
        }
    }

    fn base(email: &str, token_endpoint: &str, issued_at: u64) -> Self {
        Self {
            iss: email.to_string(),
            sub: email.to_string(),
            aud: token_endpoint.to_string(),
            iat: issued_at,
            exp: issued_at + CLAIM_LIFETIME_SECS,
            target_audience: None,
            scope: None,
        }
    }

    /// Serialize and sign as an RS256 JWT.
    pub fn sign(&self, key: &PrivateKey, key_id: Option<&str>) -> GatewayResult<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = key_id.map(str::to_string);

        encode(&header, self, &key.encoding_key()?)
            .map_err(|e| GatewayError::TokenExchange(format!("could not encode JWT: {}", e)))
    }
}

/// Read the `exp` claim of a JWT without verifying it.
pub fn token_expiry(token: &str) -> Option<u64> {
    #[derive(Deserialize)]
    struct Expiry {
        exp: u64,
    }

    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice::<Expiry>(&bytes).ok().map(|e| e.exp)
}
