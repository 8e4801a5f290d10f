//! Theorem records: content addressing and similarity signatures.

use crate::job::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Dimension of the similarity signature vector.
pub const SIGNATURE_DIM: usize = 64;

/// Content hash of a (statement, proof) pair, the identity key of a
/// theorem record. Textually different pairs hash differently; identical
/// pairs always collide, which is what deduplication relies on.
pub fn content_hash(statement: &str, proof: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(statement.as_bytes());
    hasher.update([0x1f]);
    hasher.update(proof.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn token_bucket(token: &str) -> usize {
    // FNV-1a over the lowercased token.
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in token.bytes() {
        hash ^= b.to_ascii_lowercase() as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    (hash % SIGNATURE_DIM as u64) as usize
}

/// Deterministic feature-hashed token signature for nearest-neighbor
/// ranking. Tokens are maximal alphanumeric runs; counts are hashed into a
/// fixed-size vector and L2-normalized.
pub fn signature(statement: &str) -> Vec<f32> {
    let mut vector = vec![0f32; SIGNATURE_DIM];
    for token in statement
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
    {
        vector[token_bucket(token)] += 1.0;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

/// Cosine similarity between two signatures.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// A verified theorem stored permanently.
///
/// Append-only: once written, the (statement, proof) content is never
/// mutated or removed. The content hash guarantees at most one record per
/// distinct verified pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TheoremRecord {
    /// Identity key: content hash of (statement, proof).
    pub content_hash: String,
    pub statement: String,
    pub proof: String,
    /// Plain-language proof narrative; attached best-effort after
    /// verification and fillable later if generation was unavailable.
    pub explanation: Option<String>,
    /// Similarity signature of the statement.
    pub signature: Vec<f32>,
    /// The job that produced this record.
    pub source_job: JobId,
    pub inserted_at: DateTime<Utc>,
}

impl TheoremRecord {
    /// Build a record for a verified pair, computing hash and signature.
    pub fn new(
        statement: impl Into<String>,
        proof: impl Into<String>,
        explanation: Option<String>,
        source_job: JobId,
    ) -> Self {
        let statement = statement.into();
        let proof = proof.into();
        Self {
            content_hash: content_hash(&statement, &proof),
            signature: signature(&statement),
            statement,
            proof,
            explanation,
            source_job,
            inserted_at: Utc::now(),
        }
    }
}
