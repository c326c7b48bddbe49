use facegate_core::{FaceDescriptor, Identity, MatchError};
use facegate_store::StoreError;
use serde::Serialize;
use zbus::{interface, DBusError};

use crate::config::Config;
use crate::engine::{EngineError, EngineHandle};

/// D-Bus interface for the Facegate matching daemon.
///
/// Bus name: org.freedesktop.Facegate1
/// Object path: /org/freedesktop/Facegate1
///
/// Results are JSON documents. A threshold `<= 0` or a required count of `0`
/// selects the configured default.
pub struct FacegateService {
    engine: EngineHandle,
    config: Config,
}

impl FacegateService {
    pub fn new(engine: EngineHandle, config: Config) -> Self {
        Self { engine, config }
    }
}

/// Errors returned over the bus as `org.freedesktop.Facegate1.Error.<Variant>`.
#[derive(Debug, DBusError)]
#[zbus(prefix = "org.freedesktop.Facegate1.Error")]
pub enum FacegateError {
    #[zbus(error)]
    ZBus(zbus::Error),
    /// Malformed input: wrong dimensionality, non-finite values, empty group,
    /// unknown identity or duplicate handle.
    InvalidArgs(String),
    /// The identity has no enrolled face; the caller should use another
    /// authentication method.
    NoEnrolledDescriptor(String),
    TimedOut(String),
    Failed(String),
}

type Result<T> = std::result::Result<T, FacegateError>;

// Values outside the f32 range become infinite here and are rejected by the engine.
fn descriptor(values: Vec<f64>) -> FaceDescriptor {
    FaceDescriptor::new(values.into_iter().map(|v| v as f32).collect())
}

fn threshold(value: f64) -> Option<f32> {
    (value > 0.0).then_some(value as f32)
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| FacegateError::Failed(format!("encode result: {e}")))
}

fn to_bus_error(err: EngineError) -> FacegateError {
    let msg = err.to_string();
    match err {
        EngineError::Match(
            MatchError::DimensionMismatch { .. }
            | MatchError::NonFiniteDescriptor { .. }
            | MatchError::EmptyGroup
            | MatchError::MalformedToken(_)
            | MatchError::UnresolvedIdentity(_),
        )
        | EngineError::Store(StoreError::DuplicateHandle(_) | StoreError::UnknownIdentity(_)) => {
            FacegateError::InvalidArgs(msg)
        }
        EngineError::Match(MatchError::NoEnrolledDescriptor(_)) => {
            FacegateError::NoEnrolledDescriptor(msg)
        }
        EngineError::Timeout(_) => FacegateError::TimedOut(msg),
        _ => FacegateError::Failed(msg),
    }
}

#[interface(name = "org.freedesktop.Facegate1")]
impl FacegateService {
    /// Full similarity report between two descriptors.
    async fn compare(&self, a: Vec<f64>, b: Vec<f64>) -> Result<String> {
        tracing::info!(len_a = a.len(), len_b = b.len(), "compare requested");
        let report = self
            .engine
            .compare(descriptor(a), descriptor(b))
            .await
            .map_err(to_bus_error)?;
        to_json(&report)
    }

    /// Authenticate a probe against one identity's enrolled descriptor.
    async fn authenticate(
        &self,
        identity: &str,
        probe: Vec<f64>,
        threshold_override: f64,
    ) -> Result<String> {
        tracing::info!(identity, "authenticate requested");
        let outcome = self
            .engine
            .authenticate(
                Identity::new(identity),
                descriptor(probe),
                threshold(threshold_override),
            )
            .await
            .map_err(to_bus_error)?;
        to_json(&outcome)
    }

    /// Authenticate a group of (identity, probe) pairs against a quorum.
    async fn authenticate_group(
        &self,
        members: Vec<(String, Vec<f64>)>,
        required_count: u32,
    ) -> Result<String> {
        tracing::info!(members = members.len(), required_count, "authenticate_group requested");
        let members = members
            .into_iter()
            .map(|(id, probe)| (Identity::new(id), descriptor(probe)))
            .collect();
        let required = (required_count > 0).then_some(required_count as usize);
        let result = self
            .engine
            .authenticate_group(members, required)
            .await
            .map_err(to_bus_error)?;
        to_json(&result)
    }

    /// Rank a probe against every enrolled identity.
    async fn match_population(
        &self,
        probe: Vec<f64>,
        threshold_override: f64,
    ) -> Result<String> {
        tracing::info!(len = probe.len(), "match requested");
        let result = self
            .engine
            .match_population(descriptor(probe), threshold(threshold_override))
            .await
            .map_err(to_bus_error)?;
        to_json(&result)
    }

    /// Register a new identity; returns its generated id.
    async fn register(&self, display_name: &str, handle: &str) -> Result<String> {
        tracing::info!(handle, "register requested");
        let identity = self
            .engine
            .register(display_name.to_string(), handle.to_string())
            .await
            .map_err(to_bus_error)?;
        Ok(identity.to_string())
    }

    /// Append a face sample for an identity.
    async fn enroll(
        &self,
        identity: &str,
        descriptor_values: Vec<f64>,
    ) -> Result<String> {
        tracing::info!(identity, "enroll requested");
        let outcome = self
            .engine
            .enroll(Identity::new(identity), descriptor(descriptor_values))
            .await
            .map_err(to_bus_error)?;
        to_json(&outcome)
    }

    async fn list_identities(&self) -> Result<String> {
        let identities = self.engine.list_identities().await.map_err(to_bus_error)?;
        to_json(&identities)
    }

    async fn remove_identity(&self, identity: &str) -> Result<bool> {
        tracing::info!(identity, "remove_identity requested");
        self.engine
            .remove_identity(Identity::new(identity))
            .await
            .map_err(to_bus_error)
    }

    /// Return daemon status information.
    async fn status(&self) -> Result<String> {
        let identities = self.engine.list_identities().await.map_err(to_bus_error)?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "db_path": self.config.db_path,
            "auth_threshold": self.config.auth_threshold,
            "match_threshold": self.config.match_threshold,
            "descriptor_dim": self.config.descriptor_dim,
            "identities": identities.len(),
            "enrolled": identities.iter().filter(|i| i.enrolled).count(),
            "sub_model_scores": "simulated",
            "quality_figures": "placeholder",
        })
        .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_override() {
        assert_eq!(threshold(0.0), None);
        assert_eq!(threshold(-1.0), None);
        assert_eq!(threshold(0.5), Some(0.5));
    }

    #[test]
    fn test_descriptor_conversion_is_exact_for_f32_values() {
        let values = [0.1f32, -3.75, 1e-7];
        let d = descriptor(values.iter().map(|v| *v as f64).collect());
        assert_eq!(d.values(), &values);
    }

    #[test]
    fn test_out_of_range_doubles_become_non_finite() {
        let d = descriptor(vec![1e300, f64::NAN, 0.5]);
        assert_eq!(d.first_non_finite(), Some(0));
        assert!(d.values()[1].is_nan());
    }

    #[test]
    fn test_error_mapping() {
        let err = to_bus_error(EngineError::Match(MatchError::EmptyGroup));
        assert!(matches!(err, FacegateError::InvalidArgs(_)));
        let err = to_bus_error(EngineError::Match(MatchError::NonFiniteDescriptor { index: 2 }));
        assert!(matches!(err, FacegateError::InvalidArgs(_)));
        let err = to_bus_error(EngineError::Timeout(10));
        assert!(matches!(err, FacegateError::TimedOut(_)));
        let err = to_bus_error(EngineError::ChannelClosed);
        assert!(matches!(err, FacegateError::Failed(_)));
    }

    #[test]
    fn test_missing_enrollment_has_its_own_error_name() {
        let err = to_bus_error(EngineError::Match(MatchError::NoEnrolledDescriptor(
            Identity::new("bob"),
        )));
        assert!(matches!(err, FacegateError::NoEnrolledDescriptor(_)));
        assert_eq!(
            err.name().as_str(),
            "org.freedesktop.Facegate1.Error.NoEnrolledDescriptor"
        );
        assert!(err.description().is_some_and(|d| d.contains("bob")));
    }
}
