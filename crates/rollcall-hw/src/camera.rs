//! V4L2 camera capture via the `v4l` crate.

use async_trait::async_trait;
use rollcall_core::video::{self, CameraError, FramePublisher, VideoFeed, VideoSource};
use rollcall_core::Frame;
use std::io;
use std::path::Path;
use std::time::Instant;
use tokio::sync::oneshot;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

use crate::format::{self, PixelFormat};

const REQUESTED_WIDTH: u32 = 640;
const REQUESTED_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;
const EBUSY: i32 = 16;

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Opened V4L2 device with a negotiated grayscale-convertible format.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0").
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| open_error(device_path, e))?;

        let caps = device.query_caps().map_err(|e| open_error(device_path, e))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamFailed(format!(
                "{device_path} ({}) is not a capture device",
                caps.card
            )));
        }
        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        // Ask for YUYV; webcams commonly honour it, IR sensors often come back GREY.
        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = REQUESTED_WIDTH;
        fmt.height = REQUESTED_HEIGHT;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;
        let pixel_format = PixelFormat::from_fourcc(&negotiated.fourcc.repr).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {:?} (need YUYV or GREY)",
                negotiated.fourcc
            ))
        })?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?negotiated.fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc: negotiated.fourcc,
            pixel_format,
        })
    }

    /// Stream frames into `publisher` until the feed is dropped or the
    /// device fails. Blocks the calling thread.
    fn stream_into(
        &self,
        publisher: FramePublisher,
        ready: oneshot::Sender<Result<(), CameraError>>,
    ) {
        let mut stream =
            match MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready.send(Err(CameraError::StreamFailed(format!(
                        "failed to create mmap stream: {e}"
                    ))));
                    return;
                }
            };
        let _ = ready.send(Ok(()));

        let mut started: Option<Instant> = None;
        let mut published = 0u64;
        while !publisher.is_closed() {
            let (buf, meta) = match stream.next() {
                Ok(next) => next,
                Err(e) => {
                    tracing::error!(device = %self.device_path, error = %e, "failed to dequeue buffer");
                    break;
                }
            };

            let data = match format::to_grayscale(buf, self.pixel_format, self.width, self.height) {
                Ok(data) => data,
                Err(e) => {
                    tracing::debug!(seq = meta.sequence, error = %e, "dropping malformed frame");
                    continue;
                }
            };

            let elapsed = started.get_or_insert_with(Instant::now).elapsed();
            let frame = Frame {
                data,
                width: self.width,
                height: self.height,
                sequence: meta.sequence,
                elapsed,
            };
            if !publisher.publish(frame) {
                break;
            }
            published += 1;
        }

        tracing::info!(device = %self.device_path, frames = published, "camera stream stopped");
    }
}

fn open_error(device_path: &str, e: io::Error) -> CameraError {
    match e.kind() {
        io::ErrorKind::PermissionDenied => CameraError::PermissionDenied(device_path.to_string()),
        io::ErrorKind::NotFound => CameraError::DeviceNotFound(device_path.to_string()),
        _ if e.raw_os_error() == Some(EBUSY) => CameraError::DeviceBusy,
        _ => CameraError::StreamFailed(format!("{device_path}: {e}")),
    }
}

/// Webcam video source. The device is owned by a dedicated capture thread
/// that exits once the capture loop drops its feed.
pub struct V4lSource {
    device_path: String,
}

impl V4lSource {
    pub fn new(device_path: impl Into<String>) -> Self {
        Self {
            device_path: device_path.into(),
        }
    }
}

#[async_trait]
impl VideoSource for V4lSource {
    async fn start(&mut self) -> Result<VideoFeed, CameraError> {
        let (publisher, feed) = video::feed();
        let (ready_tx, ready_rx) = oneshot::channel();
        let device_path = self.device_path.clone();

        std::thread::Builder::new()
            .name("rollcall-camera".into())
            .spawn(move || match Camera::open(&device_path) {
                Ok(camera) => camera.stream_into(publisher, ready_tx),
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| CameraError::StreamFailed(format!("failed to spawn capture thread: {e}")))?;

        ready_rx
            .await
            .map_err(|_| CameraError::StreamFailed("capture thread exited".into()))??;
        Ok(feed)
    }
}

/// List available V4L2 video capture devices.
pub fn list_devices() -> Vec<DeviceInfo> {
    let mut devices = Vec::new();

    for i in 0..16 {
        let path = format!("/dev/video{i}");
        if !Path::new(&path).exists() {
            continue;
        }
        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            continue;
        }
        devices.push(DeviceInfo {
            path,
            name: caps.card.clone(),
            driver: caps.driver.clone(),
            bus: caps.bus.clone(),
        });
    }

    devices
}
