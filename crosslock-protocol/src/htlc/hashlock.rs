// Secret generation and commitment derivation for the hashlock.
//
// The secret is known only to this process until the completion protocol
// reveals it on the destination ledger. Both lock contracts gate release on
// sha256(secret) == commitment, so the commitment must be byte-identical on
// both sides.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Width of the commitment digest. Both ledgers store it as a fixed 32-byte
/// word (`bytes32` on the contract ledger, fixed-width vector on the object
/// ledger).
pub const COMMITMENT_WIDTH: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HashLockError {
    #[error("secret length {requested} outside the range [{min}, {max}] accepted by both ledgers")]
    InvalidLength {
        requested: usize,
        min: usize,
        max: usize,
    },
    #[error("commitment width {width} is not representable on both ledgers (native widths {native_a} and {native_b})")]
    EncodingMismatch {
        width: usize,
        native_a: usize,
        native_b: usize,
    },
}

/// Secret length bounds accepted by one ledger's lock contract. These are a
/// property of the deployed escrow implementation, so they travel in config
/// rather than as constants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretConstraints {
    pub min_len: usize,
    pub max_len: usize,
}

/// The swap secret. Never serialized, redacted in debug output, zeroed when
/// dropped.
pub struct Secret(Vec<u8>);

impl Secret {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Secret(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Clone for Secret {
    fn clone(&self) -> Self {
        Secret(self.0.clone())
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({} bytes, redacted)", self.0.len())
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        for byte in self.0.iter_mut() {
            *byte = 0;
        }
    }
}

/// SHA-256 digest of the secret, supplied identically to both locks.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Commitment([u8; COMMITMENT_WIDTH]);

impl Commitment {
    pub fn from_bytes(bytes: [u8; COMMITMENT_WIDTH]) -> Self {
        Commitment(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; COMMITMENT_WIDTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parses a `0x`-prefixed (or bare) hex string of exactly the commitment
    /// width. Anything else would be a lossy conversion on one of the
    /// ledgers, so it is rejected rather than truncated or padded.
    pub fn from_hex(s: &str) -> Result<Self, HashLockError> {
        let stripped = s.trim_start_matches("0x");
        let bytes = hex::decode(stripped).map_err(|_| HashLockError::EncodingMismatch {
            width: stripped.len() / 2,
            native_a: COMMITMENT_WIDTH,
            native_b: COMMITMENT_WIDTH,
        })?;
        let arr: [u8; COMMITMENT_WIDTH] =
            bytes
                .try_into()
                .map_err(|v: Vec<u8>| HashLockError::EncodingMismatch {
                    width: v.len(),
                    native_a: COMMITMENT_WIDTH,
                    native_b: COMMITMENT_WIDTH,
                })?;
        Ok(Commitment(arr))
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", self.to_hex())
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Generates a random secret of `length_bytes`, validating the length
/// against the bounds of both ledgers' lock contracts before any ledger is
/// touched.
pub fn generate_secret(
    length_bytes: usize,
    a: &SecretConstraints,
    b: &SecretConstraints,
) -> Result<Secret, HashLockError> {
    let min = a.min_len.max(b.min_len);
    let max = a.max_len.min(b.max_len);
    if length_bytes < min || length_bytes > max {
        return Err(HashLockError::InvalidLength {
            requested: length_bytes,
            min,
            max,
        });
    }
    let mut bytes = vec![0u8; length_bytes];
    OsRng.fill_bytes(&mut bytes);
    Ok(Secret(bytes))
}

/// Derives the commitment for a secret. Pure and deterministic: the same
/// secret always yields the same commitment.
pub fn commit(secret: &Secret) -> Commitment {
    let digest = Sha256::digest(secret.as_bytes());
    Commitment(digest.into())
}

/// Checks that the commitment digest fits both ledgers' native encodings
/// without truncation or padding.
pub fn check_commitment_encoding(
    native_width_a: usize,
    native_width_b: usize,
) -> Result<(), HashLockError> {
    if native_width_a != COMMITMENT_WIDTH || native_width_b != COMMITMENT_WIDTH {
        return Err(HashLockError::EncodingMismatch {
            width: COMMITMENT_WIDTH,
            native_a: native_width_a,
            native_b: native_width_b,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn bounds(min: usize, max: usize) -> SecretConstraints {
        SecretConstraints {
            min_len: min,
            max_len: max,
        }
    }

    #[test]
    fn commit_is_deterministic() {
        let secret = Secret::from_bytes(vec![7u8; 32]);
        assert_eq!(commit(&secret), commit(&secret));
    }

    #[test]
    fn distinct_secrets_yield_distinct_commitments() {
        let a = bounds(32, 32);
        let b = bounds(32, 32);
        let mut seen = HashSet::new();
        for _ in 0..256 {
            let secret = generate_secret(32, &a, &b).unwrap();
            assert!(seen.insert(commit(&secret)), "commitment collision");
        }
    }

    #[test]
    fn length_validated_against_both_ledgers() {
        // Ledger A accepts [16, 64], ledger B accepts [32, 32]; the merged
        // window is exactly 32.
        let a = bounds(16, 64);
        let b = bounds(32, 32);
        assert!(generate_secret(32, &a, &b).is_ok());
        let err = generate_secret(16, &a, &b).unwrap_err();
        assert_eq!(
            err,
            HashLockError::InvalidLength {
                requested: 16,
                min: 32,
                max: 32
            }
        );
        assert!(generate_secret(64, &a, &b).is_err());
    }

    #[test]
    fn commitment_hex_round_trip() {
        let secret = Secret::from_bytes(b"a fixed thirty-two byte secret!!".to_vec());
        assert_eq!(secret.len(), 32);
        let commitment = commit(&secret);
        let parsed = Commitment::from_hex(&commitment.to_hex()).unwrap();
        assert_eq!(parsed, commitment);
    }

    #[test]
    fn short_hex_rejected_not_padded() {
        assert!(Commitment::from_hex("0xabcd").is_err());
    }

    #[test]
    fn encoding_check_rejects_narrow_ledger() {
        assert!(check_commitment_encoding(32, 32).is_ok());
        let err = check_commitment_encoding(32, 20).unwrap_err();
        assert!(matches!(err, HashLockError::EncodingMismatch { .. }));
    }

    #[test]
    fn secret_debug_is_redacted() {
        let secret = Secret::from_bytes(vec![0xAA; 32]);
        let printed = format!("{:?}", secret);
        assert!(!printed.contains("aa"));
        assert!(printed.contains("redacted"));
    }
}
