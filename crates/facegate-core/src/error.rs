use crate::types::Identity;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("descriptor dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
    #[error("descriptor component {index} is not a finite number")]
    NonFiniteDescriptor { index: usize },
    #[error("identity {0} has no enrolled face descriptor; fall back to another authentication method")]
    NoEnrolledDescriptor(Identity),
    #[error("group authentication requires at least one member")]
    EmptyGroup,
    #[error("identity {0} could not be resolved")]
    UnresolvedIdentity(Identity),
    #[error("malformed descriptor token: {0}")]
    MalformedToken(String),
    #[error("descriptor source: {0}")]
    Source(#[from] SourceError),
}

/// Failures reported by a [`DescriptorSource`](crate::source::DescriptorSource).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("unknown identity: {0}")]
    UnknownIdentity(Identity),
    #[error("backend: {0}")]
    Backend(String),
}

impl MatchError {
    /// Fold a collaborator lookup failure into the caller-facing taxonomy.
    pub fn from_lookup(err: SourceError) -> Self {
        match err {
            SourceError::UnknownIdentity(id) => Self::UnresolvedIdentity(id),
            other => Self::Source(other),
        }
    }
}
