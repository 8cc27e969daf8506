//! Capability provider that replays a scenario file.
//!
//! Reference images map to fixed descriptors, and faces "appear" in frames
//! during configured time windows. No image is ever decoded.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

use crate::frame::Frame;
use crate::provider::{CapabilityProvider, ProviderError, ReferenceImage};
use crate::types::{BoundingBox, Descriptor, Detection, LabeledDescriptor};

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("failed to read scenario {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid scenario: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Scenario {
    /// When set, `load_models` fails with this message.
    #[serde(default)]
    pub load_error: Option<String>,
    /// Added to every `detect` call.
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default, rename = "reference")]
    pub references: Vec<ScriptedReference>,
    #[serde(default, rename = "appearance")]
    pub appearances: Vec<Appearance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptedReference {
    pub image: String,
    /// `None` means the photo has no detectable face.
    #[serde(default)]
    pub descriptor: Option<Descriptor>,
}

/// A face visible while the stream's elapsed time is in `[from_ms, until_ms)`.
#[derive(Debug, Clone, Deserialize)]
pub struct Appearance {
    pub descriptor: Descriptor,
    #[serde(default)]
    pub from_ms: u64,
    #[serde(default)]
    pub until_ms: Option<u64>,
    #[serde(default = "default_bbox")]
    pub bbox: BoundingBox,
}

fn default_bbox() -> BoundingBox {
    BoundingBox {
        x: 0.0,
        y: 0.0,
        width: 100.0,
        height: 100.0,
        confidence: 1.0,
    }
}

impl Appearance {
    fn visible_at(&self, elapsed: Duration) -> bool {
        let ms = elapsed.as_millis();
        ms >= u128::from(self.from_ms) && self.until_ms.map_or(true, |until| ms < u128::from(until))
    }
}

impl Scenario {
    pub fn from_toml(text: &str) -> Result<Self, ScenarioError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ScenarioError> {
        let text = std::fs::read_to_string(path).map_err(|source| ScenarioError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }
}

pub struct ScriptedProvider {
    scenario: Scenario,
    loaded: AtomicBool,
}

impl ScriptedProvider {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            loaded: AtomicBool::new(false),
        }
    }

    fn ensure_loaded(&self) -> Result<(), ProviderError> {
        if self.loaded.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ProviderError::NotLoaded)
        }
    }
}

#[async_trait]
impl CapabilityProvider for ScriptedProvider {
    async fn load_models(&self, asset_base: &str) -> Result<(), ProviderError> {
        if let Some(message) = &self.scenario.load_error {
            return Err(ProviderError::AssetsUnavailable(format!("{asset_base}: {message}")));
        }
        self.loaded.store(true, Ordering::Release);
        tracing::info!(asset_base, "scripted models loaded");
        Ok(())
    }

    async fn learn_references(
        &self,
        references: &[ReferenceImage],
    ) -> Result<Vec<LabeledDescriptor>, ProviderError> {
        self.ensure_loaded()?;
        let learned = references
            .iter()
            .filter_map(|reference| {
                let descriptor = self
                    .scenario
                    .references
                    .iter()
                    .find(|r| r.image == reference.image)
                    .and_then(|r| r.descriptor.clone())?;
                Some(LabeledDescriptor {
                    identity: reference.identity.clone(),
                    descriptor,
                })
            })
            .collect();
        Ok(learned)
    }

    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, ProviderError> {
        self.ensure_loaded()?;
        if self.scenario.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.scenario.latency_ms)).await;
        }
        Ok(self
            .scenario
            .appearances
            .iter()
            .filter(|a| a.visible_at(frame.elapsed))
            .map(|a| Detection {
                bbox: a.bbox,
                descriptor: a.descriptor.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Dimensions;

    const SCENARIO: &str = r#"
        latency_ms = 0

        [[reference]]
        image = "faces/alice.jpg"
        descriptor = [0.1, 0.2]

        [[reference]]
        image = "faces/empty.jpg"

        [[appearance]]
        descriptor = [0.1, 0.2]
        from_ms = 100
        until_ms = 200
        bbox = { x = 10.0, y = 20.0, width = 80.0, height = 90.0 }

        [[appearance]]
        descriptor = [5.0, 5.0]
        from_ms = 150
    "#;

    fn frame_at(ms: u64) -> Frame {
        Frame::blank(Dimensions::new(4, 4), 0, Duration::from_millis(ms))
    }

    fn reference(identity: &str, image: &str) -> ReferenceImage {
        ReferenceImage {
            identity: identity.into(),
            image: image.into(),
        }
    }

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::from_toml(SCENARIO).unwrap();
        assert_eq!(scenario.references.len(), 2);
        assert!(scenario.references[1].descriptor.is_none());
        assert_eq!(scenario.appearances[0].bbox.height, 90.0);
        assert_eq!(scenario.appearances[0].bbox.confidence, 1.0);
        assert_eq!(scenario.appearances[1].until_ms, None);
    }

    #[tokio::test]
    async fn test_calls_before_load_fail() {
        let provider = ScriptedProvider::new(Scenario::from_toml(SCENARIO).unwrap());
        assert_eq!(
            provider.detect(&frame_at(0)).await,
            Err(ProviderError::NotLoaded)
        );
    }

    #[tokio::test]
    async fn test_load_error() {
        let scenario = Scenario {
            load_error: Some("404".into()),
            ..Scenario::default()
        };
        let provider = ScriptedProvider::new(scenario);
        let err = provider.load_models("/models").await.unwrap_err();
        assert!(matches!(err, ProviderError::AssetsUnavailable(m) if m.contains("404")));
    }

    #[tokio::test]
    async fn test_learn_skips_faceless_and_unknown_images() {
        let provider = ScriptedProvider::new(Scenario::from_toml(SCENARIO).unwrap());
        provider.load_models("/models").await.unwrap();

        let learned = provider
            .learn_references(&[
                reference("Alice", "faces/alice.jpg"),
                reference("Empty", "faces/empty.jpg"),
                reference("Missing", "faces/missing.jpg"),
            ])
            .await
            .unwrap();
        assert_eq!(learned.len(), 1);
        assert_eq!(learned[0].identity, "Alice");
    }

    #[tokio::test]
    async fn test_detect_by_time_window() {
        let provider = ScriptedProvider::new(Scenario::from_toml(SCENARIO).unwrap());
        provider.load_models("/models").await.unwrap();

        assert!(provider.detect(&frame_at(50)).await.unwrap().is_empty());
        assert_eq!(provider.detect(&frame_at(100)).await.unwrap().len(), 1);
        assert_eq!(provider.detect(&frame_at(175)).await.unwrap().len(), 2);
        let late = provider.detect(&frame_at(5_000)).await.unwrap();
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].descriptor.values, vec![5.0, 5.0]);
    }
}
