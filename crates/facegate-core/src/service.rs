//! Boundary facade: the four caller-facing matching operations.

use crate::decision::{self, DEFAULT_AUTH_THRESHOLD};
use crate::error::MatchError;
use crate::fusion::{self, ScoreSimulator};
use crate::group;
use crate::population::{self, PlaceholderQuality, QualityEstimator, DEFAULT_MATCH_THRESHOLD};
use crate::source::DescriptorSource;
use crate::types::{
    AuthenticationOutcome, FaceDescriptor, GroupAuthResult, Identity, MatchResult,
    SimilarityReport,
};

/// Default descriptor length of the bundled feature extractor.
pub const DEFAULT_DESCRIPTOR_DIM: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchConfig {
    /// Euclidean distance threshold for `authenticate` / `authenticate_group`.
    pub auth_threshold: f32,
    /// Similarity threshold for `match_against_population`.
    pub match_threshold: f32,
    /// Expected probe length; `None` accepts any length.
    pub descriptor_dim: Option<usize>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            auth_threshold: DEFAULT_AUTH_THRESHOLD,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            descriptor_dim: Some(DEFAULT_DESCRIPTOR_DIM),
        }
    }
}

pub struct FaceMatchService<S, Q = PlaceholderQuality> {
    config: MatchConfig,
    simulator: S,
    quality: Q,
}

impl<S: ScoreSimulator> FaceMatchService<S> {
    pub fn new(config: MatchConfig, simulator: S) -> Self {
        Self::with_quality(config, simulator, PlaceholderQuality)
    }
}

impl<S: ScoreSimulator, Q: QualityEstimator> FaceMatchService<S, Q> {
    pub fn with_quality(config: MatchConfig, simulator: S, quality: Q) -> Self {
        Self {
            config,
            simulator,
            quality,
        }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Reject descriptors with the wrong dimensionality or a NaN/infinite component.
    pub fn check_descriptor(&self, probe: &FaceDescriptor) -> Result<(), MatchError> {
        if let Some(expected) = self.config.descriptor_dim {
            if probe.len() != expected {
                return Err(MatchError::DimensionMismatch {
                    left: expected,
                    right: probe.len(),
                });
            }
        }
        match probe.first_non_finite() {
            Some(index) => Err(MatchError::NonFiniteDescriptor { index }),
            None => Ok(()),
        }
    }

    /// Full similarity report between two descriptors.
    pub fn compare_two_descriptors(
        &mut self,
        a: &FaceDescriptor,
        b: &FaceDescriptor,
    ) -> Result<SimilarityReport, MatchError> {
        self.check_descriptor(a)?;
        self.check_descriptor(b)?;
        fusion::fuse(a, b, &mut self.simulator)
    }

    /// Authenticate one probe against an identity's enrolled descriptor.
    pub fn authenticate(
        &self,
        source: &dyn DescriptorSource,
        identity: &Identity,
        probe: &FaceDescriptor,
        threshold: Option<f32>,
    ) -> Result<AuthenticationOutcome, MatchError> {
        self.check_descriptor(probe)?;
        let threshold = threshold.unwrap_or(self.config.auth_threshold);
        let stored = source
            .enrolled_descriptor(identity)
            .map_err(MatchError::from_lookup)?;
        let outcome = decision::decide(identity, stored.as_ref(), probe, threshold)?;

        tracing::info!(
            identity = %identity,
            authenticated = outcome.authenticated,
            distance = outcome.distance,
            threshold,
            "authentication decided"
        );
        Ok(outcome)
    }

    /// Authenticate a batch and apply the quorum (default: unanimous).
    pub fn authenticate_group(
        &self,
        source: &dyn DescriptorSource,
        members: &[(Identity, FaceDescriptor)],
        required_count: Option<usize>,
    ) -> Result<GroupAuthResult, MatchError> {
        if members.is_empty() {
            return Err(MatchError::EmptyGroup);
        }
        for (_, probe) in members {
            self.check_descriptor(probe)?;
        }
        group::authenticate_group(source, members, required_count, self.config.auth_threshold)
    }

    /// Rank the probe against the whole enrolled population.
    pub fn match_against_population(
        &self,
        source: &dyn DescriptorSource,
        probe: &FaceDescriptor,
        threshold: Option<f32>,
    ) -> Result<MatchResult, MatchError> {
        self.check_descriptor(probe)?;
        let threshold = threshold.unwrap_or(self.config.match_threshold);
        population::match_population(source, probe, threshold, &self.quality)
    }
}
