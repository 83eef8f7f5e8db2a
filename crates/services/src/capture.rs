//! Frame sources and the JPEG encoder used by the sampler.

use std::path::PathBuf;

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

use crate::error::{CaptureError, EncodeError};

/// A camera-like device that yields RGB frames.
///
/// `capture` returning `Ok(None)` means no data for this tick; an `Err` means
/// the device is gone.
pub trait FrameSource: Send {
    /// Acquire the device.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError` if the device cannot be opened.
    fn open(&mut self) -> Result<(), CaptureError>;

    /// Grab the current frame.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError` if the device is not open or was lost.
    fn capture(&mut self) -> Result<Option<RgbImage>, CaptureError>;
}

/// Turns a frame into the bytes sent to the service.
pub trait FrameEncoder: Send {
    /// # Errors
    ///
    /// Returns `EncodeError` if encoding fails or yields no data.
    fn encode(&self, frame: &RgbImage) -> Result<Vec<u8>, EncodeError>;
}

//
// ─── SOURCES ───────────────────────────────────────────────────────────────────
//

/// Replays a fixed set of image files in a loop.
#[derive(Debug, Clone)]
pub struct StillFrameSource {
    paths: Vec<PathBuf>,
    frames: Vec<RgbImage>,
    cursor: usize,
}

impl StillFrameSource {
    #[must_use]
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            frames: Vec::new(),
            cursor: 0,
        }
    }

    #[must_use]
    pub fn from_frames(frames: Vec<RgbImage>) -> Self {
        Self {
            paths: Vec::new(),
            frames,
            cursor: 0,
        }
    }
}

impl FrameSource for StillFrameSource {
    fn open(&mut self) -> Result<(), CaptureError> {
        for path in &self.paths {
            let frame = image::open(path)
                .map_err(|source| CaptureError::Open {
                    path: path.clone(),
                    source,
                })?
                .to_rgb8();
            self.frames.push(frame);
        }
        self.paths.clear();

        if self.frames.is_empty() {
            return Err(CaptureError::NoFrames);
        }
        Ok(())
    }

    fn capture(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        if self.frames.is_empty() {
            return Err(CaptureError::NotOpen);
        }
        let frame = self.frames[self.cursor % self.frames.len()].clone();
        self.cursor = (self.cursor + 1) % self.frames.len();
        Ok(Some(frame))
    }
}

/// Produces solid black frames; stands in when no camera is available.
#[derive(Debug, Clone)]
pub struct BlankFrameSource {
    width: u32,
    height: u32,
    open: bool,
}

impl BlankFrameSource {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            open: false,
        }
    }
}

impl FrameSource for BlankFrameSource {
    fn open(&mut self) -> Result<(), CaptureError> {
        self.open = true;
        Ok(())
    }

    fn capture(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        if !self.open {
            return Err(CaptureError::NotOpen);
        }
        Ok(Some(RgbImage::from_pixel(
            self.width,
            self.height,
            Rgb([0, 0, 0]),
        )))
    }
}

//
// ─── ENCODER ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegFrameEncoder {
    quality: u8,
}

impl JpegFrameEncoder {
    pub const DEFAULT_QUALITY: u8 = 85;

    #[must_use]
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    #[must_use]
    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegFrameEncoder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_QUALITY)
    }
}

impl FrameEncoder for JpegFrameEncoder {
    fn encode(&self, frame: &RgbImage) -> Result<Vec<u8>, EncodeError> {
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, self.quality).encode_image(frame)?;
        if buf.is_empty() {
            return Err(EncodeError::Empty);
        }
        Ok(buf)
    }
}
