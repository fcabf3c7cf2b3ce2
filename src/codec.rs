//! License key generation and HMAC signing.
//!
//! Keys have the shape `COMPL-XXXX-XXXX-XXXX-XXXX` where every `X` is an
//! uppercase hex digit (64 bits of entropy). The signature is a lowercase hex
//! HMAC-SHA256 over the key alone, so a presented `(key, signature)` pair can
//! be checked before any database round trip.

use std::fmt;

use hmac::{Hmac, Mac};
use rand::{RngCore, rngs::OsRng};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::models::Tier;

type HmacSha256 = Hmac<Sha256>;

pub const KEY_PREFIX: &str = "COMPL";
/// `COMPL-` plus four groups of four hex digits joined by dashes.
pub const KEY_LENGTH: usize = 25;
/// Hex-encoded HMAC-SHA256 output.
pub const SIGNATURE_LENGTH: usize = 64;

const GROUP_COUNT: usize = 4;
const GROUP_LEN: usize = 4;
const SIGNATURE_CONTEXT: &[u8] = b"complio-license-v1:";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed license key: {0}")]
    Malformed(String),

    #[error("random source unavailable: {0}")]
    Generation(String),

    #[error("invalid signing secret: {0}")]
    InvalidSecret(String),
}

/// A freshly issued key with its signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedKey {
    pub license_key: String,
    pub signature: String,
}

/// Issues and verifies license keys with a secret held by this service only.
#[derive(Clone)]
pub struct KeyCodec {
    mac: HmacSha256,
}

impl fmt::Debug for KeyCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyCodec").finish_non_exhaustive()
    }
}

impl KeyCodec {
    pub fn new(secret: &[u8]) -> Result<Self, CodecError> {
        if secret.is_empty() {
            return Err(CodecError::InvalidSecret("secret is empty".into()));
        }
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| CodecError::InvalidSecret(e.to_string()))?;
        Ok(Self { mac })
    }

    /// Generate a new random key and sign it.
    pub fn issue(&self, tier: Tier, customer_ref: &str) -> Result<IssuedKey, CodecError> {
        let license_key = generate_license_key()?;
        let signature = self.sign(&license_key)?;
        tracing::debug!(
            license_key = %license_key,
            tier = %tier,
            customer = %customer_ref,
            "Issued license key"
        );
        Ok(IssuedKey {
            license_key,
            signature,
        })
    }

    /// Compute the signature for a well-formed key.
    pub fn sign(&self, license_key: &str) -> Result<String, CodecError> {
        check_key_format(license_key)?;
        Ok(hex::encode(self.digest(license_key)))
    }

    /// Check a presented `(key, signature)` pair in constant time.
    ///
    /// Only a malformed key is an error; any other mismatch, including a
    /// signature of the wrong length or charset, is `Ok(false)`.
    pub fn verify(&self, license_key: &str, signature: &str) -> Result<bool, CodecError> {
        check_key_format(license_key)?;

        if !is_canonical_signature(signature) {
            return Ok(false);
        }
        let Ok(presented) = hex::decode(signature) else {
            return Ok(false);
        };

        let expected = self.digest(license_key);
        Ok(expected.as_slice().ct_eq(presented.as_slice()).into())
    }

    fn digest(&self, license_key: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(SIGNATURE_CONTEXT);
        mac.update(license_key.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

/// Generate a key in the `COMPL-XXXX-XXXX-XXXX-XXXX` format from the OS RNG.
pub fn generate_license_key() -> Result<String, CodecError> {
    let mut bytes = [0u8; GROUP_COUNT * GROUP_LEN / 2];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| CodecError::Generation(e.to_string()))?;

    let hex_string = hex::encode_upper(bytes);
    let groups: Vec<&str> = (0..GROUP_COUNT)
        .map(|i| &hex_string[i * GROUP_LEN..(i + 1) * GROUP_LEN])
        .collect();

    Ok(format!("{}-{}", KEY_PREFIX, groups.join("-")))
}

/// Reject anything that is not exactly `COMPL-XXXX-XXXX-XXXX-XXXX`.
pub fn check_key_format(license_key: &str) -> Result<(), CodecError> {
    if license_key.len() != KEY_LENGTH {
        return Err(CodecError::Malformed(format!(
            "expected {} characters, got {}",
            KEY_LENGTH,
            license_key.len()
        )));
    }

    let mut parts = license_key.split('-');
    if parts.next() != Some(KEY_PREFIX) {
        return Err(CodecError::Malformed(format!(
            "expected {}- prefix",
            KEY_PREFIX
        )));
    }

    let groups: Vec<&str> = parts.collect();
    let well_formed = groups.len() == GROUP_COUNT
        && groups.iter().all(|group| {
            group.len() == GROUP_LEN
                && group
                    .bytes()
                    .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
        });

    if !well_formed {
        return Err(CodecError::Malformed(
            "expected four groups of four uppercase hex digits".into(),
        ));
    }
    Ok(())
}

fn is_canonical_signature(signature: &str) -> bool {
    signature.len() == SIGNATURE_LENGTH
        && signature
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
