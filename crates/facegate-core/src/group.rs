//! Group (quorum) authentication over a batch of identity/probe pairs.

use crate::decision;
use crate::error::{MatchError, SourceError};
use crate::source::DescriptorSource;
use crate::types::{FaceDescriptor, GroupAuthResult, Identity, MemberFailure, MemberOutcome};

/// Authenticate every member independently, then apply the quorum.
///
/// Missing enrollments and unresolved identities are recorded in the member's
/// slot and never stop the batch; the slots keep the input order. A probe whose
/// length differs from the stored descriptor fails the whole request with
/// `DimensionMismatch`. `required_count` defaults to the batch size (unanimous).
pub fn authenticate_group(
    source: &dyn DescriptorSource,
    members: &[(Identity, FaceDescriptor)],
    required_count: Option<usize>,
    threshold: f32,
) -> Result<GroupAuthResult, MatchError> {
    if members.is_empty() {
        return Err(MatchError::EmptyGroup);
    }
    let required_count = required_count.unwrap_or(members.len());

    let outcomes = members
        .iter()
        .map(|(identity, probe)| evaluate_member(source, identity, probe, threshold))
        .collect::<Result<Vec<MemberOutcome>, MatchError>>()?;

    let authenticated_count = outcomes.iter().filter(|m| m.authenticated).count();
    let group_authenticated = authenticated_count >= required_count;

    tracing::info!(
        members = outcomes.len(),
        authenticated_count,
        required_count,
        group_authenticated,
        "group authentication evaluated"
    );

    Ok(GroupAuthResult {
        members: outcomes,
        authenticated_count,
        required_count,
        group_authenticated,
    })
}

fn evaluate_member(
    source: &dyn DescriptorSource,
    identity: &Identity,
    probe: &FaceDescriptor,
    threshold: f32,
) -> Result<MemberOutcome, MatchError> {
    let failed = |failure: MemberFailure| {
        tracing::debug!(identity = %identity, reason = %failure, "group member not authenticated");
        MemberOutcome {
            identity: identity.clone(),
            authenticated: false,
            distance: None,
            similarity: None,
            error: Some(failure),
        }
    };

    let stored = match source.enrolled_descriptor(identity) {
        Ok(Some(stored)) => stored,
        Ok(None) => return Ok(failed(MemberFailure::NoEnrollment)),
        Err(SourceError::UnknownIdentity(_)) => return Ok(failed(MemberFailure::UnresolvedIdentity)),
        Err(SourceError::Backend(msg)) => return Ok(failed(MemberFailure::Lookup(msg))),
    };

    let outcome = decision::compare(&stored, probe, threshold)?;
    Ok(MemberOutcome {
        identity: identity.clone(),
        authenticated: outcome.authenticated,
        distance: Some(outcome.distance),
        similarity: Some(outcome.similarity),
        error: None,
    })
}
