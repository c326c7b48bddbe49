//! Ranked nearest-neighbour matching of one probe against the enrolled population.

use crate::error::{MatchError, SourceError};
use crate::metrics;
use crate::source::DescriptorSource;
use crate::types::{EvaluationMetrics, FaceDescriptor, MatchResult, RankedMatch};

/// Similarity above which a ranked row counts as a match.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.75;

/// Headline quality figures reported alongside a ranking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityFigures {
    pub true_positive_rate: f32,
    pub false_positive_rate: f32,
    pub accuracy: f32,
}

/// Produces the quality figures for a population match.
///
/// Nothing in this system has ground truth, so the only implementation is
/// [`PlaceholderQuality`]. A real evaluator would implement this and report
/// `is_simulated() == false`.
pub trait QualityEstimator {
    fn estimate(&self, total_faces: usize, matched_above_threshold: usize) -> QualityFigures;

    fn is_simulated(&self) -> bool {
        true
    }
}

/// Fixed illustrative figures, gated only on how many rows cleared the threshold.
///
/// These numbers are NOT measured from ground truth. Reports built with this
/// estimator carry `quality_simulated = true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderQuality;

impl QualityEstimator for PlaceholderQuality {
    fn estimate(&self, _total_faces: usize, matched_above_threshold: usize) -> QualityFigures {
        match matched_above_threshold {
            0 => QualityFigures {
                true_positive_rate: 0.0,
                false_positive_rate: 0.0,
                accuracy: 0.85,
            },
            1 => QualityFigures {
                true_positive_rate: 0.95,
                false_positive_rate: 0.02,
                accuracy: 0.97,
            },
            _ => QualityFigures {
                true_positive_rate: 0.95,
                false_positive_rate: 0.05,
                accuracy: 0.92,
            },
        }
    }
}

/// Rank every population member by `exp(-euclidean(probe, member))`.
///
/// Rows whose identity has no display metadata are dropped, as are rows whose
/// stored descriptor yields a NaN or infinite distance. The ranking is
/// similarity-descending with ties kept in population order, and is not
/// truncated. A probe whose length differs from a population descriptor fails
/// the whole request with `DimensionMismatch`.
pub fn match_population(
    source: &dyn DescriptorSource,
    probe: &FaceDescriptor,
    threshold: f32,
    quality: &dyn QualityEstimator,
) -> Result<MatchResult, MatchError> {
    let population = source.list_population()?;
    let total_faces = population.len();

    let mut matches = Vec::with_capacity(total_faces);
    for candidate in &population {
        let distance = metrics::euclidean(probe.values(), candidate.descriptor.values())?;
        if !distance.is_finite() {
            tracing::warn!(
                identity = %candidate.identity,
                "dropping population row with non-finite descriptor"
            );
            continue;
        }
        let info = match source.display_info(&candidate.identity) {
            Ok(Some(info)) => info,
            Ok(None) | Err(SourceError::UnknownIdentity(_)) => {
                tracing::warn!(identity = %candidate.identity, "dropping unresolved population row");
                continue;
            }
            Err(err) => {
                tracing::warn!(identity = %candidate.identity, error = %err, "dropping population row");
                continue;
            }
        };
        matches.push(RankedMatch {
            identity: candidate.identity.clone(),
            display_name: info.display_name,
            handle: info.handle,
            similarity: metrics::similarity_from_distance(distance),
        });
    }

    // Stable sort: equal similarities keep population order.
    matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

    let matched_above_threshold = matches.iter().filter(|m| m.similarity > threshold).count();
    let figures = quality.estimate(total_faces, matched_above_threshold);

    tracing::info!(
        total_faces,
        ranked = matches.len(),
        matched_above_threshold,
        threshold,
        "population match evaluated"
    );

    Ok(MatchResult {
        matches,
        metrics: EvaluationMetrics {
            total_faces,
            matched_above_threshold,
            threshold,
            true_positive_rate: figures.true_positive_rate,
            false_positive_rate: figures.false_positive_rate,
            accuracy: figures.accuracy,
            quality_simulated: quality.is_simulated(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use crate::types::{DisplayInfo, Identity};

    fn desc(values: &[f32]) -> FaceDescriptor {
        FaceDescriptor::new(values.to_vec())
    }

    fn five() -> MemorySource {
        let mut src = MemorySource::new();
        src.enroll("p0", desc(&[0.9, 0.1, 0.0]));
        src.enroll("p1", desc(&[0.0, 1.0, 0.3]));
        src.enroll("p2", desc(&[0.25, 0.5, 0.75]));
        src.enroll("p3", desc(&[-1.0, 0.0, 2.0]));
        src.enroll("p4", desc(&[0.3, 0.5, 0.7]));
        src
    }

    #[test]
    fn test_exact_probe_ranks_first_with_similarity_one() {
        let src = five();
        let result = match_population(&src, &desc(&[0.25, 0.5, 0.75]), 0.75, &PlaceholderQuality)
            .unwrap();

        assert_eq!(result.matches.len(), 5);
        assert_eq!(result.matches[0].identity, Identity::new("p2"));
        assert_eq!(result.matches[0].similarity, 1.0);
        assert_eq!(result.metrics.total_faces, 5);
        assert!(result
            .matches
            .windows(2)
            .all(|w| w[0].similarity >= w[1].similarity));
    }

    #[test]
    fn test_threshold_counts_and_placeholder_figures() {
        let src = five();
        let result = match_population(&src, &desc(&[0.25, 0.5, 0.75]), 0.75, &PlaceholderQuality)
            .unwrap();
        // p2 (1.0) and p4 (distance ~0.0707) clear 0.75.
        assert_eq!(result.metrics.matched_above_threshold, 2);
        assert_eq!(result.metrics.true_positive_rate, 0.95);
        assert_eq!(result.metrics.false_positive_rate, 0.05);
        assert_eq!(result.metrics.accuracy, 0.92);
        assert!(result.metrics.quality_simulated);

        let strict = match_population(&src, &desc(&[0.25, 0.5, 0.75]), 0.99, &PlaceholderQuality)
            .unwrap();
        assert_eq!(strict.metrics.matched_above_threshold, 1);
        assert_eq!(strict.metrics.false_positive_rate, 0.02);
    }

    #[test]
    fn test_no_matches_above_threshold() {
        let src = five();
        let result =
            match_population(&src, &desc(&[10.0, 10.0, 10.0]), 0.75, &PlaceholderQuality).unwrap();
        assert_eq!(result.metrics.matched_above_threshold, 0);
        assert_eq!(result.metrics.true_positive_rate, 0.0);
        assert_eq!(result.matches.len(), 5);
    }

    #[test]
    fn test_ties_keep_population_order() {
        let mut src = MemorySource::new();
        src.enroll("first", desc(&[1.0, 0.0]));
        src.enroll("second", desc(&[-1.0, 0.0]));
        src.enroll("third", desc(&[0.0, 1.0]));
        let result = match_population(&src, &desc(&[0.0, 0.0]), 0.75, &PlaceholderQuality).unwrap();
        let order: Vec<_> = result.matches.iter().map(|m| m.identity.as_str()).collect();
        assert_eq!(order, ["first", "second", "third"]);
    }

    #[test]
    fn test_unresolved_rows_are_dropped() {
        let mut src = five();
        src.insert("hidden", None, Some(desc(&[0.25, 0.5, 0.75])));
        src.insert(
            "named",
            Some(DisplayInfo {
                display_name: "Named".into(),
                handle: "named@example.com".into(),
            }),
            Some(desc(&[0.0, 0.0, 0.0])),
        );
        let result = match_population(&src, &desc(&[0.25, 0.5, 0.75]), 0.75, &PlaceholderQuality)
            .unwrap();
        assert_eq!(result.metrics.total_faces, 7);
        assert_eq!(result.matches.len(), 6);
        assert!(result.matches.iter().all(|m| m.identity.as_str() != "hidden"));
        let named = result.matches.iter().find(|m| m.identity.as_str() == "named").unwrap();
        assert_eq!(named.handle, "named@example.com");
    }

    #[test]
    fn test_non_finite_stored_rows_never_outrank_exact_match() {
        let mut src = MemorySource::new();
        src.enroll("exact", desc(&[0.1, 0.2]));
        src.enroll("nan", desc(&[-f32::NAN, 0.2]));
        src.enroll("inf", desc(&[f32::INFINITY, 0.2]));
        src.enroll("near", desc(&[0.1, 0.3]));
        let result = match_population(&src, &desc(&[0.1, 0.2]), 0.75, &PlaceholderQuality).unwrap();

        let order: Vec<_> = result.matches.iter().map(|m| m.identity.as_str()).collect();
        assert_eq!(order, ["exact", "near"]);
        assert_eq!(result.matches[0].similarity, 1.0);
        assert!(result.matches.iter().all(|m| m.similarity > 0.0 && m.similarity <= 1.0));
        assert_eq!(result.metrics.total_faces, 4);
    }

    #[test]
    fn test_empty_population() {
        let src = MemorySource::new();
        let result = match_population(&src, &desc(&[1.0]), 0.75, &PlaceholderQuality).unwrap();
        assert!(result.matches.is_empty());
        assert_eq!(result.metrics.total_faces, 0);
        assert_eq!(result.metrics.accuracy, 0.85);
    }

    #[test]
    fn test_dimension_mismatch_aborts() {
        let src = five();
        let err = match_population(&src, &desc(&[0.0; 64]), 0.75, &PlaceholderQuality).unwrap_err();
        assert_eq!(err, MatchError::DimensionMismatch { left: 64, right: 3 });
    }
}
