//! Drawing surface for detection boxes and labels.

use crate::frame::Dimensions;
use crate::types::BoundingBox;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Surface the capture loop draws each pass onto.
pub trait Overlay: Send {
    /// Match the surface to the video. Called once, when polling begins.
    fn resize(&mut self, dimensions: Dimensions);
    fn clear(&mut self);
    fn draw_box(&mut self, bbox: &BoundingBox, label: &str);
}

pub struct NoopOverlay;

impl Overlay for NoopOverlay {
    fn resize(&mut self, _dimensions: Dimensions) {}
    fn clear(&mut self) {}
    fn draw_box(&mut self, _bbox: &BoundingBox, _label: &str) {}
}

/// Emits every drawn box as a trace event.
pub struct TracingOverlay;

impl Overlay for TracingOverlay {
    fn resize(&mut self, dimensions: Dimensions) {
        tracing::debug!(%dimensions, "overlay resized");
    }

    fn clear(&mut self) {}

    fn draw_box(&mut self, bbox: &BoundingBox, label: &str) {
        tracing::debug!(
            x = bbox.x,
            y = bbox.y,
            width = bbox.width,
            height = bbox.height,
            label,
            "face"
        );
    }
}

/// In-memory canvas contents.
#[derive(Debug, Clone, Default)]
pub struct Canvas {
    pub dimensions: Option<Dimensions>,
    pub resize_count: usize,
    /// Boxes drawn since the last clear.
    pub boxes: Vec<(BoundingBox, String)>,
}

/// Canvas shared between the capture loop and an observer.
#[derive(Clone, Default)]
pub struct SharedCanvas {
    inner: Arc<Mutex<Canvas>>,
}

impl SharedCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Canvas {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Canvas> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Overlay for SharedCanvas {
    fn resize(&mut self, dimensions: Dimensions) {
        let mut canvas = self.lock();
        canvas.dimensions = Some(dimensions);
        canvas.resize_count += 1;
    }

    fn clear(&mut self) {
        self.lock().boxes.clear();
    }

    fn draw_box(&mut self, bbox: &BoundingBox, label: &str) {
        self.lock().boxes.push((*bbox, label.to_string()));
    }
}
