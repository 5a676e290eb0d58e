//! Public-key fingerprinting and shared-secret comparison.
//!
//! A fingerprint is the SHA-256 digest of a DER-encoded
//! SubjectPublicKeyInfo. A CSR and the certificate later issued for it
//! carry the same SPKI, so both produce the same fingerprint.

use corral_common::encoding::hex_encode;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Compute the fingerprint of a DER-encoded SubjectPublicKeyInfo.
///
/// Returns the digest as a lowercase hex string (64 chars).
pub fn fingerprint_spki(spki_der: &[u8]) -> String {
    let hash = Sha256::digest(spki_der);
    hex_encode(&hash)
}

/// Compare two secrets in constant time.
///
/// Length mismatch returns `false` early; only equal-length inputs are
/// compared byte-for-byte.
pub fn secrets_match(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    if a_bytes.len() != b_bytes.len() {
        return false;
    }

    a_bytes.ct_eq(b_bytes).into()
}
