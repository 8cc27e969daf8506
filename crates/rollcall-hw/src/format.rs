//! Pixel format conversion to 8-bit grayscale.

use thiserror::Error;

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, Y channel kept).
    Yuyv,
    /// 8-bit grayscale.
    Grey,
}

impl PixelFormat {
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"GREY" => Some(PixelFormat::Grey),
            _ => None,
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Yuyv => 2,
            PixelFormat::Grey => 1,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("buffer too short for {width}x{height} {format:?}: expected {expected}, got {actual}")]
    ShortBuffer {
        format: PixelFormat,
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Convert one raw capture buffer to grayscale (width * height bytes).
pub fn to_grayscale(
    buf: &[u8],
    format: PixelFormat,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, FormatError> {
    let pixels = width as usize * height as usize;
    let expected = pixels * format.bytes_per_pixel();
    if buf.len() < expected {
        return Err(FormatError::ShortBuffer {
            format,
            width,
            height,
            expected,
            actual: buf.len(),
        });
    }

    Ok(match format {
        PixelFormat::Grey => buf[..pixels].to_vec(),
        // YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
        PixelFormat::Yuyv => buf[..expected].iter().step_by(2).copied().collect(),
    })
}
