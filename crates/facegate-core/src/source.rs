//! Storage collaborator contract consumed by the matching engine.

use crate::error::SourceError;
use crate::types::{DisplayInfo, FaceDescriptor, Identity, MatchCandidate};
use std::collections::HashMap;

/// Read access to enrolled identities.
///
/// Each call is a point-in-time read; consistency under concurrent writes is
/// the implementor's concern.
pub trait DescriptorSource {
    /// Canonical descriptor of `identity`, or `None` when it has no biometric enrollment.
    /// Unknown identities fail with [`SourceError::UnknownIdentity`].
    fn enrolled_descriptor(&self, identity: &Identity) -> Result<Option<FaceDescriptor>, SourceError>;

    /// Every identity that has a canonical descriptor.
    fn list_population(&self) -> Result<Vec<MatchCandidate>, SourceError>;

    fn display_info(&self, identity: &Identity) -> Result<Option<DisplayInfo>, SourceError>;
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    info: Option<DisplayInfo>,
    descriptor: Option<FaceDescriptor>,
}

/// In-memory [`DescriptorSource`], population order = insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    order: Vec<Identity>,
    entries: HashMap<Identity, MemoryEntry>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an identity.
    pub fn insert(
        &mut self,
        identity: impl Into<Identity>,
        info: Option<DisplayInfo>,
        descriptor: Option<FaceDescriptor>,
    ) {
        let identity = identity.into();
        if !self.entries.contains_key(&identity) {
            self.order.push(identity.clone());
        }
        self.entries.insert(identity, MemoryEntry { info, descriptor });
    }

    /// Insert an enrolled identity whose display name and handle are its id.
    pub fn enroll(&mut self, identity: impl Into<Identity>, descriptor: FaceDescriptor) {
        let identity = identity.into();
        let info = DisplayInfo {
            display_name: identity.to_string(),
            handle: identity.to_string(),
        };
        self.insert(identity, Some(info), Some(descriptor));
    }
}

impl DescriptorSource for MemorySource {
    fn enrolled_descriptor(&self, identity: &Identity) -> Result<Option<FaceDescriptor>, SourceError> {
        self.entries
            .get(identity)
            .map(|e| e.descriptor.clone())
            .ok_or_else(|| SourceError::UnknownIdentity(identity.clone()))
    }

    fn list_population(&self) -> Result<Vec<MatchCandidate>, SourceError> {
        Ok(self
            .order
            .iter()
            .filter_map(|id| {
                let entry = self.entries.get(id)?;
                let descriptor = entry.descriptor.clone()?;
                Some(MatchCandidate {
                    identity: id.clone(),
                    descriptor,
                })
            })
            .collect())
    }

    fn display_info(&self, identity: &Identity) -> Result<Option<DisplayInfo>, SourceError> {
        Ok(self.entries.get(identity).and_then(|e| e.info.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_population_skips_unenrolled_and_keeps_order() {
        let mut src = MemorySource::new();
        src.enroll("b", FaceDescriptor::new(vec![1.0]));
        src.insert("password-only", None, None);
        src.enroll("a", FaceDescriptor::new(vec![2.0]));

        let ids: Vec<_> = src
            .list_population()
            .unwrap()
            .into_iter()
            .map(|c| c.identity.to_string())
            .collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn test_unknown_identity() {
        let src = MemorySource::new();
        let err = src.enrolled_descriptor(&Identity::new("ghost")).unwrap_err();
        assert_eq!(err, SourceError::UnknownIdentity(Identity::new("ghost")));
        assert_eq!(src.display_info(&Identity::new("ghost")).unwrap(), None);
    }

    #[test]
    fn test_reinsert_replaces_without_duplicating() {
        let mut src = MemorySource::new();
        src.enroll("a", FaceDescriptor::new(vec![1.0]));
        src.enroll("a", FaceDescriptor::new(vec![3.0]));
        let pop = src.list_population().unwrap();
        assert_eq!(pop.len(), 1);
        assert_eq!(pop[0].descriptor.values(), &[3.0]);
    }
}
