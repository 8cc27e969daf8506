//! Face capability provider contract.
//!
//! Detection, descriptor extraction and model assets live behind this
//! trait; the engine only sequences calls and interprets results.

use crate::frame::Frame;
use crate::types::{Descriptor, Detection, EuclideanMatcher, LabeledDescriptor, MatchOutcome, Matcher};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("model assets unavailable: {0}")]
    AssetsUnavailable(String),
    #[error("models not loaded")]
    NotLoaded,
    #[error("inference failed: {0}")]
    InferenceFailed(String),
}

/// One roster entry to learn a reference descriptor from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub identity: String,
    pub image: String,
}

#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Load every model artifact from `asset_base`.
    async fn load_models(&self, asset_base: &str) -> Result<(), ProviderError>;

    /// Compute one descriptor per reference image.
    ///
    /// Entries whose image yields no detectable face (or cannot be read)
    /// are omitted from the result rather than failing the call.
    async fn learn_references(
        &self,
        references: &[ReferenceImage],
    ) -> Result<Vec<LabeledDescriptor>, ProviderError>;

    /// Detect every face in `frame` and describe it.
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, ProviderError>;

    /// Find the closest reference within `max_distance`.
    fn match_best(
        &self,
        descriptor: &Descriptor,
        references: &[LabeledDescriptor],
        max_distance: f32,
    ) -> MatchOutcome {
        EuclideanMatcher.best_match(descriptor, references, max_distance)
    }
}
