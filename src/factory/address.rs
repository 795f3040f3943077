//! Deterministic contract-address derivation.
//!
//! `derive_address` is a pure function of `(owner_address, salt, workchain)`:
//! identical inputs always yield the identical address, across processes and
//! time, and any single-input change flips the output. Fields are
//! length-prefixed before hashing so `("ab", "c")` and `("a", "bc")` cannot
//! collide.

use sha3::{Digest, Keccak256};

/// Base workchain (standard addresses).
pub const WORKCHAIN_BASE: i8 = 0;
/// Masterchain.
pub const WORKCHAIN_MASTER: i8 = -1;

/// Derive the raw-form contract address for an agent wallet.
pub fn derive_address(owner_address: &str, salt: &str, workchain: i8) -> String {
    let mut hasher = Keccak256::new();
    hasher.update((owner_address.len() as u64).to_be_bytes());
    hasher.update(owner_address.as_bytes());
    hasher.update((salt.len() as u64).to_be_bytes());
    hasher.update(salt.as_bytes());
    hasher.update([workchain as u8]);
    let hash = hasher.finalize();

    format!("{}:{}", workchain, hex::encode(hash))
}
