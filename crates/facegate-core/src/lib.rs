//! facegate-core: face descriptor similarity and matching engine.
//!
//! Compares fixed-length face descriptors produced by an external feature
//! extractor: raw metrics, score fusion, threshold authentication, quorum
//! group authentication and ranked population matching.

pub mod codec;
pub mod decision;
pub mod error;
pub mod fusion;
pub mod group;
pub mod metrics;
pub mod population;
pub mod service;
pub mod source;
pub mod types;

pub use error::{MatchError, SourceError};
pub use fusion::{JitterSimulator, ScoreSimulator, SeededSimulator};
pub use population::{PlaceholderQuality, QualityEstimator};
pub use service::{FaceMatchService, MatchConfig};
pub use source::{DescriptorSource, MemorySource};
pub use types::{
    AuthenticationOutcome, DisplayInfo, EvaluationMetrics, FaceDescriptor, GroupAuthResult,
    Identity, MatchCandidate, MatchResult, MemberFailure, MemberOutcome, RankedMatch,
    SimilarityReport, SubModelScore,
};
