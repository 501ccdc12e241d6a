//! Embedding and generation backends
//!
//! The engine only sees the two traits here. `HarmonicEmbedder` is an
//! offline embedder based on Harmonic Token Projection:
//! "Harmonic Token Projection: A Vocabulary-Free, Training-Free,
//!  Deterministic, and Reversible Embedding Methodology"
//! https://arxiv.org/html/2511.20665
//!
//! It needs no model or network, which makes it the backend of choice for
//! tests and for machines without an Ollama install. It does not understand
//! semantics; shared tokens are what make two texts close.

use std::f64::consts::PI;

use crate::error::{BrainError, Result};

/// `embed(text) -> vector`. Implementations must return vectors of one fixed length.
pub trait EmbeddingBackend: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// `generate(prompt) -> text`
pub trait GenerationBackend: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Reject vectors cosine similarity cannot rank: empty, non-finite or zero-norm.
pub fn check_embedding(vector: Vec<f32>) -> Result<Vec<f32>> {
    if vector.is_empty() {
        return Err(BrainError::BackendModel("empty embedding".into()));
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(BrainError::BackendModel("embedding has non-finite values".into()));
    }
    if vector.iter().all(|x| *x == 0.0) {
        return Err(BrainError::BackendModel("embedding has zero norm".into()));
    }
    Ok(vector)
}

/// Embedding dimension (2 * number of coprime moduli)
pub const HARMONIC_DIM: usize = 384;

const NUM_MODULI: usize = HARMONIC_DIM / 2;

/// Maximum token length (Unicode code points)
const MAX_TOKEN_LENGTH: usize = 64;

/// First NUM_MODULI primes, so the moduli are pairwise coprime
static COPRIME_MODULI: &[u64] = &[
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71,
    73, 79, 83, 89, 97, 101, 103, 107, 109, 113, 127, 131, 137, 139, 149, 151,
    157, 163, 167, 173, 179, 181, 191, 193, 197, 199, 211, 223, 227, 229, 233,
    239, 241, 251, 257, 263, 269, 271, 277, 281, 283, 293, 307, 311, 313, 317,
    331, 337, 347, 349, 353, 359, 367, 373, 379, 383, 389, 397, 401, 409, 419,
    421, 431, 433, 439, 443, 449, 457, 461, 463, 467, 479, 487, 491, 499, 503,
    509, 521, 523, 541, 547, 557, 563, 569, 571, 577, 587, 593, 599, 601, 607,
    613, 617, 619, 631, 641, 643, 647, 653, 659, 661, 673, 677, 683, 691, 701,
    709, 719, 727, 733, 739, 743, 751, 757, 761, 769, 773, 787, 797, 809, 811,
    821, 823, 827, 829, 839, 853, 857, 859, 863, 877, 881, 883, 887, 907, 911,
    919, 929, 937, 941, 947, 953, 967, 971, 977, 983, 991, 997, 1009, 1013,
    1019, 1021, 1031, 1033, 1039, 1049, 1051, 1061, 1063, 1069, 1087, 1091,
    1093, 1097, 1103, 1109, 1117, 1123, 1129, 1151, 1153, 1163, 1171, 1181,
];

/// Deterministic Harmonic Token Projection embedder
pub struct HarmonicEmbedder {
    moduli: Vec<u64>,
}

impl HarmonicEmbedder {
    pub fn new() -> Self {
        Self {
            moduli: COPRIME_MODULI[..NUM_MODULI].to_vec(),
        }
    }

    /// Mean of per-token projections, L2 normalized.
    ///
    /// Text without tokens has no meaningful direction and is rejected as
    /// a model error rather than returned as a zero vector.
    fn project(&self, text: &str) -> Result<Vec<f32>> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Err(BrainError::BackendModel("no tokens to embed".into()));
        }

        let mut sum = vec![0.0f64; HARMONIC_DIM];
        for token in &tokens {
            for (acc, val) in sum.iter_mut().zip(self.embed_token(token)) {
                *acc += val;
            }
        }
        let count = tokens.len() as f64;
        for val in &mut sum {
            *val /= count;
        }

        let norm: f64 = sum.iter().map(|x| x * x).sum::<f64>().sqrt();
        Ok(if norm > 0.0 {
            sum.iter().map(|x| (*x / norm) as f32).collect()
        } else {
            sum.iter().map(|x| *x as f32).collect()
        })
    }

    /// Token → base-2^16 integer N → for each modulus m: angle 2π(N mod m)/m
    /// projected to (sin, cos).
    fn embed_token(&self, token: &str) -> Vec<f64> {
        let n = token_to_integer(token);

        let mut embedding = Vec::with_capacity(HARMONIC_DIM);
        for &m in &self.moduli {
            let theta = 2.0 * PI * ((n % m) as f64) / (m as f64);
            embedding.push(theta.sin());
            embedding.push(theta.cos());
        }
        embedding
    }
}

impl Default for HarmonicEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingBackend for HarmonicEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.project(text)
    }
}

/// N = Σ u_j * B^(L-j) where B = 2^16, wrapping on overflow
fn token_to_integer(token: &str) -> u64 {
    token
        .chars()
        .take(MAX_TOKEN_LENGTH)
        .fold(0u64, |n, c| n.wrapping_mul(65536).wrapping_add(c as u64))
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}
