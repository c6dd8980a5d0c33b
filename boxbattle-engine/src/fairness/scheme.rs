use super::{
    combined_hash, generate_client_seed, generate_server_seed, result_hash, sha256_hex,
    uniform_result, verify, weighted_result, SERVER_SEED_BYTES,
};
use crate::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Characters of the combined hash shown before reveal.
const PREVIEW_HEX_CHARS: usize = 16;

/// A committed draw. The server seed stays private until `reveal`, which
/// consumes the commitment.
pub struct Commitment {
    server_seed: String,
    client_seed: String,
    nonce: u64,
    item_count: u64,
    combined_hash: String,
    result_hash: String,
    result: u64,
    created_at: DateTime<Utc>,
}

impl Commitment {
    /// Commit with a fresh server seed. A missing client seed is generated.
    pub fn commit(client_seed: Option<String>, nonce: u64, item_count: u64) -> Result<Self> {
        let client_seed = client_seed.unwrap_or_else(generate_client_seed);
        Self::from_seeds(generate_server_seed(), client_seed, nonce, item_count)
    }

    /// Rebuild a commitment from known seeds.
    pub fn from_seeds(
        server_seed: String,
        client_seed: String,
        nonce: u64,
        item_count: u64,
    ) -> Result<Self> {
        let decoded = hex::decode(&server_seed)
            .map_err(|e| EngineError::InvalidInput(format!("Server seed is not hex: {}", e)))?;
        if decoded.len() != SERVER_SEED_BYTES {
            return Err(EngineError::InvalidInput(format!(
                "Server seed must be {} bytes",
                SERVER_SEED_BYTES
            )));
        }

        let combined = combined_hash(&server_seed, &client_seed, nonce);
        let result = uniform_result(&combined, item_count)?;

        Ok(Self {
            server_seed,
            client_seed,
            nonce,
            item_count,
            result_hash: result_hash(result),
            combined_hash: combined,
            result,
            created_at: Utc::now(),
        })
    }

    pub fn client_seed(&self) -> &str {
        &self.client_seed
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn item_count(&self) -> u64 {
        self.item_count
    }

    pub fn combined_hash(&self) -> &str {
        &self.combined_hash
    }

    pub fn result_hash(&self) -> &str {
        &self.result_hash
    }

    /// Plaintext result, for server-side use only.
    pub fn result(&self) -> u64 {
        self.result
    }

    /// Weighted index derived from this commitment's combined hash.
    pub fn weighted_result(&self, weights: &[u64]) -> Result<usize> {
        weighted_result(&self.combined_hash, weights)
    }

    /// What may be shown to players before the reveal.
    pub fn public(&self) -> PublicCommitment {
        PublicCommitment {
            client_seed: self.client_seed.clone(),
            nonce: self.nonce,
            combined_hash_preview: format!(
                "{}...",
                &self.combined_hash[..PREVIEW_HEX_CHARS.min(self.combined_hash.len())]
            ),
            result_hash: self.result_hash.clone(),
            created_at: self.created_at,
        }
    }

    pub fn reveal(self) -> RevealedCommitment {
        let verification_reference = format!(
            "sha256(\"{}:{}:{}\") = {}; first 8 bytes mod {} = {}; sha256(\"{}\") = {}",
            self.server_seed,
            self.client_seed,
            self.nonce,
            self.combined_hash,
            self.item_count,
            self.result,
            self.result,
            self.result_hash
        );

        tracing::info!(nonce = self.nonce, "Revealed fairness commitment");

        RevealedCommitment {
            server_seed: self.server_seed,
            client_seed: self.client_seed,
            nonce: self.nonce,
            item_count: self.item_count,
            combined_hash: self.combined_hash,
            result_hash: self.result_hash,
            result: self.result,
            created_at: self.created_at,
            verification_reference,
        }
    }
}

impl std::fmt::Debug for Commitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Commitment")
            .field("client_seed", &self.client_seed)
            .field("nonce", &self.nonce)
            .field("combined_hash", &self.combined_hash)
            .field("result_hash", &self.result_hash)
            .finish_non_exhaustive()
    }
}

/// Pre-reveal view of a commitment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicCommitment {
    pub client_seed: String,
    pub nonce: u64,
    pub combined_hash_preview: String,
    pub result_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Fully disclosed commitment, checkable by anyone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevealedCommitment {
    pub server_seed: String,
    pub client_seed: String,
    pub nonce: u64,
    pub item_count: u64,
    pub combined_hash: String,
    pub result_hash: String,
    pub result: u64,
    pub created_at: DateTime<Utc>,
    pub verification_reference: String,
}

impl RevealedCommitment {
    pub fn verify(&self) -> Result<bool> {
        let proof_holds = verify(
            &self.server_seed,
            &self.client_seed,
            self.nonce,
            &self.combined_hash,
            &self.result_hash,
            self.result,
        )?;
        Ok(proof_holds && uniform_result(&self.combined_hash, self.item_count)? == self.result)
    }
}

/// One server seed paired with one client seed, issuing increasing nonces.
pub struct SeedPair {
    server_seed: String,
    client_seed: String,
    server_seed_hash: String,
    next_nonce: u64,
}

impl SeedPair {
    pub fn new(client_seed: Option<String>) -> Self {
        let server_seed = generate_server_seed();
        Self {
            server_seed_hash: sha256_hex(&server_seed),
            server_seed,
            client_seed: client_seed.unwrap_or_else(generate_client_seed),
            next_nonce: 0,
        }
    }

    /// Published up front so the seed cannot be swapped later.
    pub fn server_seed_hash(&self) -> &str {
        &self.server_seed_hash
    }

    pub fn client_seed(&self) -> &str {
        &self.client_seed
    }

    pub fn next_nonce(&self) -> u64 {
        self.next_nonce
    }

    /// Commit the next draw of the pairing.
    pub fn commit(&mut self, item_count: u64) -> Result<Commitment> {
        let commitment = Commitment::from_seeds(
            self.server_seed.clone(),
            self.client_seed.clone(),
            self.next_nonce,
            item_count,
        )?;
        self.next_nonce += 1;
        Ok(commitment)
    }

    /// Disclose the server seed. The pairing cannot issue further draws.
    pub fn reveal(self) -> RevealedSeedPair {
        RevealedSeedPair {
            server_seed: self.server_seed,
            client_seed: self.client_seed,
            server_seed_hash: self.server_seed_hash,
            nonces_used: self.next_nonce,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevealedSeedPair {
    pub server_seed: String,
    pub client_seed: String,
    pub server_seed_hash: String,
    pub nonces_used: u64,
}

impl RevealedSeedPair {
    /// Whether the disclosed seed matches the hash published before play.
    pub fn matches_published_hash(&self) -> bool {
        sha256_hex(&self.server_seed) == self.server_seed_hash
    }
}
