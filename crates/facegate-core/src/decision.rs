use crate::error::MatchError;
use crate::metrics;
use crate::types::{AuthenticationOutcome, FaceDescriptor, Identity};

/// Euclidean distance below which a probe authenticates against a stored descriptor.
pub const DEFAULT_AUTH_THRESHOLD: f32 = 0.6;

/// Decide whether `probe` matches the enrolled `stored` descriptor.
///
/// `authenticated` is `euclidean(stored, probe) < threshold`. An identity
/// without enrollment yields `NoEnrolledDescriptor`, and the caller is expected
/// to fall back to a non-biometric path.
pub fn decide(
    identity: &Identity,
    stored: Option<&FaceDescriptor>,
    probe: &FaceDescriptor,
    threshold: f32,
) -> Result<AuthenticationOutcome, MatchError> {
    let stored = stored.ok_or_else(|| MatchError::NoEnrolledDescriptor(identity.clone()))?;
    compare(stored, probe, threshold)
}

/// Threshold decision against a known-present stored descriptor.
pub fn compare(
    stored: &FaceDescriptor,
    probe: &FaceDescriptor,
    threshold: f32,
) -> Result<AuthenticationOutcome, MatchError> {
    let distance = metrics::euclidean(stored.values(), probe.values())?;
    Ok(AuthenticationOutcome {
        authenticated: distance < threshold,
        distance,
        similarity: metrics::similarity_from_distance(distance),
    })
}
