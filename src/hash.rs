use num_bigint::BigUint;
use sha2::{Digest, Sha256};

/// Computes a sha256 of the big-endian bytes of `value`.
pub fn hash_value(value: &BigUint) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(value.to_bytes_be());
    hasher.finalize().into()
}

/// Short, log-safe tag for a pseudonym: the leading 8 bytes of its sha256.
pub fn fingerprint(value: &BigUint) -> String {
    hash_value(value)[..8]
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}
