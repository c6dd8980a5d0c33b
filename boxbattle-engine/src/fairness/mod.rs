//! Commit-reveal fairness proofs.
//!
//! `combinedHash = SHA256("{serverSeed}:{clientSeed}:{nonce}")`. The first
//! eight bytes of that digest, read big-endian, drive both the uniform and the
//! weighted result. `resultHash = SHA256("{result}")`.

pub mod scheme;

pub use scheme::{Commitment, PublicCommitment, RevealedCommitment, RevealedSeedPair, SeedPair};

use crate::{EngineError, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

pub const SERVER_SEED_BYTES: usize = 32;
pub const CLIENT_SEED_BYTES: usize = 16;
const HASH_HEX_LEN: usize = 64;

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Fresh 32-byte server seed, hex encoded.
pub fn generate_server_seed() -> String {
    random_hex(SERVER_SEED_BYTES)
}

/// Fresh 16-byte client seed, hex encoded.
pub fn generate_client_seed() -> String {
    random_hex(CLIENT_SEED_BYTES)
}

pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_ref());
    hex::encode(hasher.finalize())
}

pub fn combined_hash(server_seed: &str, client_seed: &str, nonce: u64) -> String {
    sha256_hex(format!("{}:{}:{}", server_seed, client_seed, nonce))
}

pub fn result_hash(result: u64) -> String {
    sha256_hex(result.to_string())
}

/// Big-endian value of the first eight bytes of a hex digest.
pub fn hash_value(combined_hash: &str) -> Result<u64> {
    let bytes = hex::decode(combined_hash)
        .map_err(|e| EngineError::InvalidInput(format!("Combined hash is not hex: {}", e)))?;
    let head: [u8; 8] = bytes
        .get(..8)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| EngineError::InvalidInput("Combined hash shorter than 8 bytes".into()))?;
    Ok(u64::from_be_bytes(head))
}

/// Uniform index in `[0, item_count)` derived from the hash.
pub fn uniform_result(combined_hash: &str, item_count: u64) -> Result<u64> {
    if item_count == 0 {
        return Err(EngineError::InvalidInput("Item count must be positive".into()));
    }
    Ok(hash_value(combined_hash)? % item_count)
}

/// Deterministic weighted pick: the hash value modulo the total weight,
/// walked against the cumulative table.
///
/// Entry `i` owns the half-open range `[cumulative_before, cumulative_after)`,
/// so a zero weight never wins. This differs from `selector::pick_index`,
/// whose inclusive walk lets a roll of 0 land on a leading zero-weight item.
pub fn weighted_result(combined_hash: &str, weights: &[u64]) -> Result<usize> {
    let total: u64 = weights.iter().sum();
    if total == 0 {
        return Err(EngineError::InvalidInput(
            "Weights must contain a positive entry".into(),
        ));
    }

    let target = hash_value(combined_hash)? % total;
    let mut cumulative = 0u64;
    for (index, weight) in weights.iter().enumerate() {
        cumulative += weight;
        if target < cumulative {
            return Ok(index);
        }
    }
    Ok(weights.len() - 1)
}

fn check_hash_shape(label: &str, value: &str) -> Result<()> {
    if value.len() != HASH_HEX_LEN || hex::decode(value).is_err() {
        return Err(EngineError::InvalidInput(format!(
            "{} must be a 64 character hex digest",
            label
        )));
    }
    Ok(())
}

/// Recompute both hashes from a revealed seed and compare with the published ones.
///
/// Returns `Ok(false)` on any mismatch. Errors only for malformed arguments.
pub fn verify(
    server_seed: &str,
    client_seed: &str,
    nonce: u64,
    claimed_combined_hash: &str,
    claimed_result_hash: &str,
    claimed_result: u64,
) -> Result<bool> {
    let seed_bytes = hex::decode(server_seed)
        .map_err(|e| EngineError::InvalidInput(format!("Server seed is not hex: {}", e)))?;
    if seed_bytes.len() != SERVER_SEED_BYTES {
        return Err(EngineError::InvalidInput(format!(
            "Server seed must be {} bytes",
            SERVER_SEED_BYTES
        )));
    }
    check_hash_shape("Combined hash", claimed_combined_hash)?;
    check_hash_shape("Result hash", claimed_result_hash)?;

    let combined_matches =
        combined_hash(server_seed, client_seed, nonce).eq_ignore_ascii_case(claimed_combined_hash);
    let result_matches = result_hash(claimed_result).eq_ignore_ascii_case(claimed_result_hash);

    Ok(combined_matches && result_matches)
}
