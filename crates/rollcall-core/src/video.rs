//! Video sources and the latest-frame feed the capture loop reads from.
//!
//! A source publishes frames into a single-slot `watch` channel. The
//! capture loop only ever looks at the most recent frame, so a slow
//! detection pass never builds a backlog.

use crate::frame::{Dimensions, Frame};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("stream failed: {0}")]
    StreamFailed(String),
    #[error("video stream ended before the first frame")]
    StreamEnded,
}

/// Something that can acquire a camera stream.
#[async_trait]
pub trait VideoSource: Send {
    /// Acquire the stream. Frames start flowing into the returned feed.
    async fn start(&mut self) -> Result<VideoFeed, CameraError>;
}

/// Create a connected publisher/feed pair.
pub fn feed() -> (FramePublisher, VideoFeed) {
    let (tx, rx) = watch::channel(None);
    (FramePublisher { tx }, VideoFeed { rx })
}

/// Writing end of a feed, owned by the source.
pub struct FramePublisher {
    tx: watch::Sender<Option<Arc<Frame>>>,
}

impl FramePublisher {
    /// Replace the current frame. Returns false once the feed has been dropped.
    pub fn publish(&self, frame: Frame) -> bool {
        self.tx.send(Some(Arc::new(frame))).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Reading end of a feed, owned by the capture loop.
pub struct VideoFeed {
    rx: watch::Receiver<Option<Arc<Frame>>>,
}

impl VideoFeed {
    /// Wait for the first frame and report its dimensions.
    pub async fn playable(&mut self) -> Result<Dimensions, CameraError> {
        let current = self
            .rx
            .wait_for(|frame| frame.is_some())
            .await
            .map_err(|_| CameraError::StreamEnded)?;
        current
            .as_ref()
            .map(|frame| frame.dimensions())
            .ok_or(CameraError::StreamEnded)
    }

    /// Most recent frame, if any has arrived.
    pub fn current_frame(&self) -> Option<Arc<Frame>> {
        self.rx.borrow().clone()
    }
}

/// Publishes blank frames of fixed size at a fixed rate.
///
/// Stands in for a camera when none is configured; detections come
/// entirely from the provider.
pub struct SyntheticSource {
    dimensions: Dimensions,
    frame_interval: Duration,
}

impl SyntheticSource {
    pub fn new(dimensions: Dimensions, frame_interval: Duration) -> Self {
        Self {
            dimensions,
            frame_interval,
        }
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new(Dimensions::new(640, 480), Duration::from_millis(33))
    }
}

#[async_trait]
impl VideoSource for SyntheticSource {
    async fn start(&mut self) -> Result<VideoFeed, CameraError> {
        let (publisher, feed) = feed();
        let dimensions = self.dimensions;
        let frame_interval = self.frame_interval;

        tokio::spawn(async move {
            let started = tokio::time::Instant::now();
            let mut ticker = tokio::time::interval(frame_interval);
            let mut sequence = 0u32;
            loop {
                ticker.tick().await;
                let frame = Frame::blank(dimensions, sequence, started.elapsed());
                if !publisher.publish(frame) {
                    tracing::debug!(frames = sequence, "synthetic feed dropped; stopping");
                    break;
                }
                sequence = sequence.wrapping_add(1);
            }
        });

        tracing::info!(%dimensions, "synthetic video source started");
        Ok(feed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_playable_waits_for_first_frame() {
        let (publisher, mut feed) = feed();
        assert!(feed.current_frame().is_none());

        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            publisher.publish(Frame::blank(Dimensions::new(8, 6), 0, Duration::ZERO));
            publisher
        });

        let dims = feed.playable().await.unwrap();
        assert_eq!(dims, Dimensions::new(8, 6));
        assert_eq!(feed.current_frame().unwrap().width, 8);
        drop(task.await.unwrap());
    }

    #[tokio::test]
    async fn test_playable_fails_when_publisher_dropped() {
        let (publisher, mut feed) = feed();
        drop(publisher);
        assert_eq!(feed.playable().await, Err(CameraError::StreamEnded));
    }

    #[tokio::test]
    async fn test_publisher_sees_dropped_feed() {
        let (publisher, feed) = feed();
        assert!(!publisher.is_closed());
        drop(feed);
        assert!(publisher.is_closed());
        assert!(!publisher.publish(Frame::blank(Dimensions::new(1, 1), 0, Duration::ZERO)));
    }

    #[tokio::test]
    async fn test_synthetic_source_publishes_frames() {
        let mut source = SyntheticSource::new(Dimensions::new(32, 24), Duration::from_millis(5));
        let mut feed = source.start().await.unwrap();
        assert_eq!(feed.playable().await.unwrap(), Dimensions::new(32, 24));

        tokio::time::sleep(Duration::from_millis(30)).await;
        let frame = feed.current_frame().unwrap();
        assert!(frame.sequence > 0);
        assert_eq!(frame.data.len(), 32 * 24);
    }
}
