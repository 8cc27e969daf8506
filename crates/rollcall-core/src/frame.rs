//! Frame type shared by video sources and capability providers.

use std::time::Duration;

/// A captured grayscale video frame.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
    /// Time since the stream delivered its first frame.
    pub elapsed: Duration,
}

impl Frame {
    /// Uniform black frame, used by the synthetic source.
    pub fn blank(dimensions: Dimensions, sequence: u32, elapsed: Duration) -> Self {
        Self {
            data: vec![0; dimensions.pixel_count()],
            width: dimensions.width,
            height: dimensions.height,
            sequence,
            elapsed,
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("elapsed", &self.elapsed)
            .finish_non_exhaustive()
    }
}

/// Playable video dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
