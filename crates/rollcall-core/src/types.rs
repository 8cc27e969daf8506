use serde::{Deserialize, Serialize};
use std::fmt;

/// A known person the engine can recognize, keyed by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    /// Location of the reference photo (path or URI, provider-interpreted).
    pub reference_image: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, reference_image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reference_image: reference_image.into(),
        }
    }
}

/// Bounding box of a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
}

fn full_confidence() -> f32 {
    1.0
}

/// Face descriptor. Opaque to the engine apart from the distance metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor {
    pub values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Euclidean distance between two descriptors. Lower = more similar.
    ///
    /// Descriptors of different lengths are compared over the shared prefix.
    pub fn euclidean_distance(&self, other: &Descriptor) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Reference descriptor learned for one identity.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledDescriptor {
    pub identity: String,
    pub descriptor: Descriptor,
}

/// A face found in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub descriptor: Descriptor,
}

/// Result of matching a candidate descriptor against the reference set.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched { identity: String, distance: f32 },
    /// No reference was close enough. Carries the nearest distance when
    /// the reference set was non-empty.
    Unmatched { distance: Option<f32> },
}

impl MatchOutcome {
    pub fn identity(&self) -> Option<&str> {
        match self {
            MatchOutcome::Matched { identity, .. } => Some(identity),
            MatchOutcome::Unmatched { .. } => None,
        }
    }
}

impl fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchOutcome::Matched { identity, distance } => write!(f, "{identity} ({distance:.2})"),
            MatchOutcome::Unmatched { distance: Some(d) } => write!(f, "unknown ({d:.2})"),
            MatchOutcome::Unmatched { distance: None } => f.write_str("unknown"),
        }
    }
}

/// Strategy for comparing a candidate descriptor against the learned references.
pub trait Matcher {
    fn best_match(
        &self,
        candidate: &Descriptor,
        references: &[LabeledDescriptor],
        max_distance: f32,
    ) -> MatchOutcome;
}

/// Nearest-neighbour matcher over Euclidean distance.
///
/// A match requires the nearest distance to be strictly below `max_distance`.
/// Ties keep the earliest reference.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn best_match(
        &self,
        candidate: &Descriptor,
        references: &[LabeledDescriptor],
        max_distance: f32,
    ) -> MatchOutcome {
        let mut best: Option<(usize, f32)> = None;

        for (i, reference) in references.iter().enumerate() {
            let distance = candidate.euclidean_distance(&reference.descriptor);
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((i, distance));
            }
        }

        match best {
            Some((idx, distance)) if distance < max_distance => MatchOutcome::Matched {
                identity: references[idx].identity.clone(),
                distance,
            },
            Some((_, distance)) => MatchOutcome::Unmatched {
                distance: Some(distance),
            },
            None => MatchOutcome::Unmatched { distance: None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(identity: &str, values: Vec<f32>) -> LabeledDescriptor {
        LabeledDescriptor {
            identity: identity.into(),
            descriptor: Descriptor::new(values),
        }
    }

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Descriptor::new(vec![0.3, 0.4]);
        assert!(a.euclidean_distance(&a).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_known() {
        let a = Descriptor::new(vec![0.0, 0.0]);
        let b = Descriptor::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_matcher_picks_nearest() {
        // Nearest reference is last; every entry must be considered.
        let candidate = Descriptor::new(vec![1.0, 0.0, 0.0]);
        let references = vec![
            reference("decoy1", vec![0.0, 1.0, 0.0]),
            reference("decoy2", vec![0.0, 0.0, 1.0]),
            reference("alice", vec![0.9, 0.0, 0.0]),
        ];

        let outcome = EuclideanMatcher.best_match(&candidate, &references, 0.6);
        match outcome {
            MatchOutcome::Matched { identity, distance } => {
                assert_eq!(identity, "alice");
                assert!((distance - 0.1).abs() < 1e-5);
            }
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn test_matcher_threshold_is_exclusive() {
        let candidate = Descriptor::new(vec![0.0]);
        let references = vec![reference("alice", vec![0.5])];

        let outcome = EuclideanMatcher.best_match(&candidate, &references, 0.5);
        assert_eq!(outcome, MatchOutcome::Unmatched { distance: Some(0.5) });
    }

    #[test]
    fn test_matcher_too_far_is_unknown() {
        let candidate = Descriptor::new(vec![1.0, 0.0]);
        let references = vec![reference("bob", vec![0.0, 1.0])];

        let outcome = EuclideanMatcher.best_match(&candidate, &references, 0.6);
        assert!(outcome.identity().is_none());
        assert!(outcome.to_string().starts_with("unknown ("));
    }

    #[test]
    fn test_matcher_empty_references() {
        let candidate = Descriptor::new(vec![1.0]);
        let outcome = EuclideanMatcher.best_match(&candidate, &[], 0.6);
        assert_eq!(outcome, MatchOutcome::Unmatched { distance: None });
        assert_eq!(outcome.to_string(), "unknown");
    }

    #[test]
    fn test_matched_label() {
        let outcome = MatchOutcome::Matched {
            identity: "Alice".into(),
            distance: 0.4213,
        };
        assert_eq!(outcome.to_string(), "Alice (0.42)");
    }
}
