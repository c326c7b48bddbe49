use serde::{Deserialize, Serialize};
use std::fmt;

/// Face descriptor produced by the external feature extractor (typically 128-dimensional).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceDescriptor {
    values: Vec<f32>,
}

impl FaceDescriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<f32> {
        self.values
    }

    /// Index of the first NaN or infinite component.
    pub fn first_non_finite(&self) -> Option<usize> {
        self.values.iter().position(|v| !v.is_finite())
    }
}

impl From<Vec<f32>> for FaceDescriptor {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// Opaque identity reference (user id, username, email...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Identity {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Display metadata used to annotate ranked matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub display_name: String,
    pub handle: String,
}

/// A population row: an enrolled identity and its canonical descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub identity: Identity,
    pub descriptor: FaceDescriptor,
}

/// Named score from one (simulated) sub-model, clamped to [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubModelScore {
    pub model: String,
    pub score: f32,
}

/// Full comparison of two descriptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityReport {
    pub euclidean_distance: f32,
    pub manhattan_distance: f32,
    pub cosine_similarity: f32,
    /// `exp(-euclidean_distance)`, in (0, 1].
    pub overall_similarity: f32,
    /// Simulated stand-ins for unavailable third-party models. Not measured inferences.
    pub sub_model_scores: Vec<SubModelScore>,
    pub sub_scores_simulated: bool,
}

/// Outcome of comparing one probe against one stored descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationOutcome {
    pub authenticated: bool,
    pub distance: f32,
    pub similarity: f32,
}

/// Why a single group member did not produce a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum MemberFailure {
    NoEnrollment,
    UnresolvedIdentity,
    Lookup(String),
}

impl fmt::Display for MemberFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoEnrollment => f.write_str("no enrollment"),
            Self::UnresolvedIdentity => f.write_str("unresolved identity"),
            Self::Lookup(msg) => write!(f, "lookup failed: {msg}"),
        }
    }
}

/// Per-member slot of a group authentication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberOutcome {
    pub identity: Identity,
    pub authenticated: bool,
    pub distance: Option<f32>,
    pub similarity: Option<f32>,
    pub error: Option<MemberFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupAuthResult {
    /// Same order as the input batch.
    pub members: Vec<MemberOutcome>,
    pub authenticated_count: usize,
    pub required_count: usize,
    pub group_authenticated: bool,
}

/// One row of a population ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedMatch {
    pub identity: Identity,
    pub display_name: String,
    pub handle: String,
    pub similarity: f32,
}

/// Headline figures attached to a population match.
///
/// `true_positive_rate`, `false_positive_rate` and `accuracy` come from a
/// [`QualityEstimator`](crate::population::QualityEstimator); the default one
/// returns illustrative constants, flagged by `quality_simulated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationMetrics {
    pub total_faces: usize,
    pub matched_above_threshold: usize,
    pub threshold: f32,
    pub true_positive_rate: f32,
    pub false_positive_rate: f32,
    pub accuracy: f32,
    pub quality_simulated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Similarity-descending, not truncated.
    pub matches: Vec<RankedMatch>,
    pub metrics: EvaluationMetrics,
}
