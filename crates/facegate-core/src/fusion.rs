//! Score fusion: raw metrics, overall similarity and simulated sub-model scores.
//!
//! The sub-model scores produced here are SIMULATED stand-ins for third-party
//! face models that are not available to this system. Each one is
//! `clamp(cosine * weight + jitter, 0, 1)` with a bounded random jitter. They
//! are not real inferences and carry no accuracy claim; every report marks
//! them with `sub_scores_simulated = true`.

use crate::error::MatchError;
use crate::metrics;
use crate::types::{FaceDescriptor, SimilarityReport, SubModelScore};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Weight and jitter range of one simulated sub-model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedModel {
    pub name: &'static str,
    pub weight: f32,
    /// Upper bound of the uniform jitter added on top of `cosine * weight`.
    pub max_jitter: f32,
}

pub const SIMULATED_MODELS: [SimulatedModel; 3] = [
    SimulatedModel { name: "facenet", weight: 0.90, max_jitter: 0.10 },
    SimulatedModel { name: "vggface", weight: 0.85, max_jitter: 0.15 },
    SimulatedModel { name: "arcface", weight: 0.95, max_jitter: 0.05 },
];

/// Source of per-model scores layered on top of the measured metrics.
///
/// A real model integration replaces the simulator by implementing this trait
/// and returning `false` from [`is_simulated`](Self::is_simulated).
pub trait ScoreSimulator {
    fn sub_model_scores(&mut self, cosine: f32) -> Vec<SubModelScore>;

    fn is_simulated(&self) -> bool {
        true
    }
}

/// Jitter-based simulator over [`SIMULATED_MODELS`], driven by any RNG.
pub struct JitterSimulator<R: Rng> {
    rng: R,
}

/// Simulator with a fixed seed; identical seeds give identical scores.
pub type SeededSimulator = JitterSimulator<StdRng>;

impl<R: Rng> JitterSimulator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

impl SeededSimulator {
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl<R: Rng> ScoreSimulator for JitterSimulator<R> {
    fn sub_model_scores(&mut self, cosine: f32) -> Vec<SubModelScore> {
        SIMULATED_MODELS
            .iter()
            .map(|model| {
                let jitter = self.rng.gen_range(0.0..=model.max_jitter);
                SubModelScore {
                    model: model.name.to_string(),
                    score: (cosine * model.weight + jitter).clamp(0.0, 1.0),
                }
            })
            .collect()
    }
}

/// Compare two descriptors with every metric and fuse them into a report.
pub fn fuse(
    a: &FaceDescriptor,
    b: &FaceDescriptor,
    simulator: &mut dyn ScoreSimulator,
) -> Result<SimilarityReport, MatchError> {
    let euclidean_distance = metrics::euclidean(a.values(), b.values())?;
    let manhattan_distance = metrics::manhattan(a.values(), b.values())?;
    let cosine_similarity = metrics::cosine(a.values(), b.values())?;

    Ok(SimilarityReport {
        euclidean_distance,
        manhattan_distance,
        cosine_similarity,
        overall_similarity: metrics::similarity_from_distance(euclidean_distance),
        sub_model_scores: simulator.sub_model_scores(cosine_similarity),
        sub_scores_simulated: simulator.is_simulated(),
    })
}
