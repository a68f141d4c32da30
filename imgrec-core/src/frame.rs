//! Pixel buffers shared by capture and matching.
//!
//! A [`Frame`] is an owned, row-major, top-to-bottom grid of 3-channel RGB
//! samples.  A [`Template`] is a frame decoded from a reference image on
//! disk and never mutated afterwards.

use std::path::{Path, PathBuf};

use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::errors::{AutomationError, Result};

/// Number of colour channels per sample (R, G, B).
pub const CHANNELS: usize = 3;

// ---------------------------------------------------------------------------
// Region
// ---------------------------------------------------------------------------

/// Rectangle in screen (or frame) coordinates.
///
/// `x`/`y` may be negative on multi-monitor setups where a monitor sits left
/// of or above the primary display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Region) -> bool {
        let right = self.x as i64 + self.width as i64;
        let bottom = self.y as i64 + self.height as i64;
        other.x >= self.x
            && other.y >= self.y
            && other.x as i64 + other.width as i64 <= right
            && other.y as i64 + other.height as i64 <= bottom
    }

    /// Parse `X,Y,W,H`.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(AutomationError::CaptureError(format!(
                "region must be X,Y,W,H, got '{s}'"
            )));
        }
        let bad = |e: std::num::ParseIntError| {
            AutomationError::CaptureError(format!("invalid region '{s}': {e}"))
        };
        Ok(Self {
            x: parts[0].parse().map_err(bad)?,
            y: parts[1].parse().map_err(bad)?,
            width: parts[2].parse().map_err(bad)?,
            height: parts[3].parse().map_err(bad)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// Owned RGB pixel data.
///
/// Invariant: `width > 0`, `height > 0` and
/// `data.len() == width * height * CHANNELS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap an RGB buffer, checking the size invariant.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(AutomationError::CaptureError(format!(
                "frame must not be empty ({width}x{height})"
            )));
        }
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(AutomationError::CaptureError(format!(
                "frame buffer size mismatch: {} bytes for {width}x{height} (expected {expected})",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Build a frame from 32-bit BGRA pixels (GDI / DXGI layout), dropping alpha.
    pub fn from_bgra(width: u32, height: u32, bgra: &[u8]) -> Result<Self> {
        let rgb: Vec<u8> = bgra
            .chunks_exact(4)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect();
        Self::new(width, height, rgb)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGB bytes, row-major.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// RGB sample at (`x`, `y`).
    ///
    /// # Panics
    ///
    /// Panics if (`x`, `y`) lies outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) outside {}x{} frame",
            self.width,
            self.height
        );
        let i = (y as usize * self.width as usize + x as usize) * CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Copy out a sub-rectangle given in frame coordinates.
    pub fn crop(&self, region: &Region) -> Result<Frame> {
        let bounds = Region::new(0, 0, self.width, self.height);
        if region.is_empty() || !bounds.contains(region) {
            return Err(AutomationError::CaptureError(format!(
                "crop region {region:?} outside {}x{} frame",
                self.width, self.height
            )));
        }
        let row_bytes = region.width as usize * CHANNELS;
        let mut data = Vec::with_capacity(row_bytes * region.height as usize);
        for row in 0..region.height as usize {
            let start =
                ((region.y as usize + row) * self.width as usize + region.x as usize) * CHANNELS;
            data.extend_from_slice(&self.data[start..start + row_bytes]);
        }
        Frame::new(region.width, region.height, data)
    }

    /// 8-bit intensity image using the ITU-R BT.601 luma weights.
    pub fn to_gray(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            let [r, g, b] = self.pixel(x, y);
            let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
            Luma([luma.round().clamp(0.0, 255.0) as u8])
        })
    }

    pub fn from_rgb_image(img: image::RgbImage) -> Result<Self> {
        let (w, h) = img.dimensions();
        Self::new(w, h, img.into_raw())
    }

    pub fn to_rgb_image(&self) -> Result<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            AutomationError::CaptureError(
                "image::RgbImage::from_raw failed: buffer size mismatch".into(),
            )
        })
    }

    /// Decode any image file the `image` crate understands.
    pub fn open(path: &Path) -> Result<Self> {
        let img = image::open(path).map_err(|e| {
            AutomationError::CaptureError(format!("cannot decode {}: {e}", path.display()))
        })?;
        Self::from_rgb_image(img.to_rgb8())
    }

    /// Encode the frame as a PNG held in memory.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let img = self.to_rgb_image()?;
        let mut buf: Vec<u8> = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buf);
        img.write_to(&mut cursor, image::ImageFormat::Png)
            .map_err(|e| AutomationError::CaptureError(format!("PNG encoding failed: {e}")))?;
        Ok(buf)
    }
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// Reference image searched for inside captured frames.
#[derive(Debug, Clone)]
pub struct Template {
    path: PathBuf,
    frame: Frame,
}

impl Template {
    /// Load a template from disk.
    ///
    /// Returns `None` when the file is missing or cannot be decoded; a
    /// missing asset must not abort an automation run.
    pub fn load(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::warn!("template {} does not exist", path.display());
            return None;
        }
        match Frame::open(path) {
            Ok(frame) => Some(Self {
                path: path.to_path_buf(),
                frame,
            }),
            Err(e) => {
                log::warn!("template {} unreadable: {e}", path.display());
                None
            }
        }
    }

    pub fn from_frame(path: impl Into<PathBuf>, frame: Frame) -> Self {
        Self {
            path: path.into(),
            frame,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> Frame {
        let mut data = Vec::new();
        for y in 0..h {
            for x in 0..w {
                data.extend_from_slice(&[(x * 10) as u8, (y * 10) as u8, 7]);
            }
        }
        Frame::new(w, h, data).unwrap()
    }

    #[test]
    fn test_frame_rejects_bad_buffer() {
        assert!(Frame::new(2, 2, vec![0; 11]).is_err());
        assert!(Frame::new(0, 2, vec![]).is_err());
        assert!(Frame::new(2, 2, vec![0; 12]).is_ok());
    }

    #[test]
    fn test_from_bgra_swaps_channels() {
        let f = Frame::from_bgra(1, 1, &[1, 2, 3, 0]).unwrap();
        assert_eq!(f.pixel(0, 0), [3, 2, 1]);
    }

    #[test]
    fn test_crop_copies_sub_rectangle() {
        let f = gradient(5, 4);
        let c = f.crop(&Region::new(1, 2, 3, 2)).unwrap();
        assert_eq!((c.width(), c.height()), (3, 2));
        assert_eq!(c.pixel(0, 0), f.pixel(1, 2));
        assert_eq!(c.pixel(2, 1), f.pixel(3, 3));
    }

    #[test]
    #[should_panic(expected = "outside 5x4 frame")]
    fn test_pixel_past_row_end_panics() {
        gradient(5, 4).pixel(5, 0);
    }

    #[test]
    fn test_crop_out_of_bounds() {
        let f = gradient(5, 4);
        assert!(f.crop(&Region::new(3, 0, 3, 1)).is_err());
        assert!(f.crop(&Region::new(-1, 0, 2, 2)).is_err());
        assert!(f.crop(&Region::new(0, 0, 0, 2)).is_err());
    }

    #[test]
    fn test_gray_conversion_weights() {
        let f = Frame::new(1, 1, vec![255, 255, 255]).unwrap();
        assert_eq!(f.to_gray().get_pixel(0, 0)[0], 255);
        let red = Frame::new(1, 1, vec![200, 0, 0]).unwrap();
        assert_eq!(red.to_gray().get_pixel(0, 0)[0], 60);
    }

    #[test]
    fn test_region_parse() {
        assert_eq!(Region::parse("10, -5,30,40").unwrap(), Region::new(10, -5, 30, 40));
        assert!(Region::parse("1,2,3").is_err());
        assert!(Region::parse("a,2,3,4").is_err());
    }

    #[test]
    fn test_template_missing_file_is_none() {
        assert!(Template::load("/definitely/not/here.png").is_none());
    }

    #[test]
    fn test_template_corrupt_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();
        assert!(Template::load(&path).is_none());
    }

    #[test]
    fn test_png_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.png");
        let f = gradient(6, 3);
        std::fs::write(&path, f.encode_png().unwrap()).unwrap();
        let t = Template::load(&path).unwrap();
        assert_eq!(t.frame(), &f);
    }
}
