//! Template matching by normalized correlation coefficient.
//!
//! Both images are reduced to 8-bit luma ([`Frame::to_gray`]), then every
//! template-sized window of the frame is scored with the zero-mean
//! normalized cross-correlation
//!
//! ```text
//!            sum (T(x,y) - mean T) * (I(x,y) - mean I)
//! score = -------------------------------------------------
//!          sqrt( sum (T - mean T)^2 * sum (I - mean I)^2 )
//! ```
//!
//! which lies in `[-1, 1]` (1.0 = perfect match) and is invariant to uniform
//! brightness offset and scaling.  Window sums and sums of squares come from
//! `imageproc` integral images, so only the cross term is computed per pixel.
//!
//! The first window in raster order (top-to-bottom, then left-to-right)
//! scoring at least the threshold wins, even if a later window scores
//! higher.  Rows are scored in parallel with Rayon; `find_map_first`
//! preserves the raster-order result.

use std::path::Path;

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::{integral_image, integral_squared_image, sum_image_pixels};
use rayon::prelude::*;
use serde::Serialize;

use crate::frame::{Frame, Template};

/// Default minimum score for a window to count as a match.
pub const DEFAULT_THRESHOLD: f32 = 0.8;

/// Denominators below this are treated as a flat (zero-variance) window.
const FLAT_EPSILON: f64 = 1e-6;

/// A matched location, already offset to the template's center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchPoint {
    /// Center X in frame coordinates.
    pub x: i32,
    /// Center Y in frame coordinates.
    pub y: i32,
    /// Correlation score of the winning window.
    pub score: f32,
}

type Integral = ImageBuffer<Luma<u64>, Vec<u64>>;

/// Grayscale frame with its summed-area tables.
struct Searchable {
    gray: GrayImage,
    sum: Integral,
    sq_sum: Integral,
}

impl Searchable {
    fn new(frame: &Frame) -> Self {
        let gray = frame.to_gray();
        let sum = integral_image::<_, u64>(&gray);
        let sq_sum = integral_squared_image::<_, u64>(&gray);
        Self { gray, sum, sq_sum }
    }

    /// `(sum, sum of squares)` over the `w`x`h` window at (`x`, `y`).
    fn window(&self, x: u32, y: u32, w: u32, h: u32) -> (u64, u64) {
        let (right, bottom) = (x + w - 1, y + h - 1);
        (
            sum_image_pixels(&self.sum, x, y, right, bottom)[0],
            sum_image_pixels(&self.sq_sum, x, y, right, bottom)[0],
        )
    }
}

/// Precomputed zero-mean template.
struct Prepared {
    width: u32,
    height: u32,
    zero_mean: Vec<f64>,
    norm: f64,
}

impl Prepared {
    fn new(template: &Frame) -> Self {
        let gray = template.to_gray();
        let raw = gray.as_raw();
        let mean = raw.iter().map(|&v| v as f64).sum::<f64>() / raw.len() as f64;
        let zero_mean: Vec<f64> = raw.iter().map(|&v| v as f64 - mean).collect();
        let norm = zero_mean.iter().map(|v| v * v).sum::<f64>().sqrt();
        Self {
            width: gray.width(),
            height: gray.height(),
            zero_mean,
            norm,
        }
    }
}

fn score_window(frame: &Searchable, tpl: &Prepared, x: u32, y: u32) -> f64 {
    let n = tpl.width as u128 * tpl.height as u128;
    let (sum, sq_sum) = frame.window(x, y, tpl.width, tpl.height);
    // n^2 * variance, exact in integers so a flat window is exactly zero.
    let spread = (n * sq_sum as u128).saturating_sub(sum as u128 * sum as u128);
    let denom = (spread as f64 / n as f64).sqrt() * tpl.norm;
    if denom <= FLAT_EPSILON {
        return 0.0;
    }

    // The template is zero-mean, so the window mean drops out of the cross term.
    let fw = frame.gray.width() as usize;
    let (tw, x) = (tpl.width as usize, x as usize);
    let raw = frame.gray.as_raw();
    let mut cross = 0.0f64;
    for ty in 0..tpl.height as usize {
        let start = (y as usize + ty) * fw + x;
        let trow = &tpl.zero_mean[ty * tw..(ty + 1) * tw];
        cross += raw[start..start + tw]
            .iter()
            .zip(trow)
            .map(|(&f, &t)| f as f64 * t)
            .sum::<f64>();
    }
    (cross / denom).clamp(-1.0, 1.0)
}

fn fits(frame: &Frame, template: &Frame, x: u32, y: u32) -> bool {
    let inside = |origin: u32, extent: u32, limit: u32| {
        origin.checked_add(extent).is_some_and(|end| end <= limit)
    };
    inside(x, template.width(), frame.width()) && inside(y, template.height(), frame.height())
}

/// Score a single window whose top-left corner is (`x`, `y`).
///
/// Returns `None` when the window does not fit inside the frame.
pub fn score_at(frame: &Frame, template: &Frame, x: u32, y: u32) -> Option<f32> {
    if !fits(frame, template, x, y) {
        return None;
    }
    let searchable = Searchable::new(frame);
    let tpl = Prepared::new(template);
    Some(score_window(&searchable, &tpl, x, y) as f32)
}

/// Find the first window in raster order whose score is `>= threshold`.
///
/// Returns `None` when the template is larger than the frame in either axis
/// or no window reaches the threshold.
pub fn find(frame: &Frame, template: &Template, threshold: f32) -> Option<MatchPoint> {
    find_frame(frame, template.frame(), threshold)
}

/// [`find`] for a template that is already a bare frame.
pub fn find_frame(frame: &Frame, template: &Frame, threshold: f32) -> Option<MatchPoint> {
    if !fits(frame, template, 0, 0) {
        log::debug!(
            "template {}x{} larger than frame {}x{}",
            template.width(),
            template.height(),
            frame.width(),
            frame.height()
        );
        return None;
    }

    let searchable = Searchable::new(frame);
    let tpl = Prepared::new(template);
    let cols = frame.width() - template.width() + 1;
    let rows = frame.height() - template.height() + 1;
    let threshold = threshold as f64;

    let hit = (0..rows).into_par_iter().find_map_first(|y| {
        (0..cols).find_map(|x| {
            let score = score_window(&searchable, &tpl, x, y);
            (score >= threshold).then_some((x, y, score))
        })
    });

    hit.map(|(x, y, score)| MatchPoint {
        x: (x + tpl.width / 2) as i32,
        y: (y + tpl.height / 2) as i32,
        score: score as f32,
    })
}

/// Load the template at `path` and search for it in `frame`.
///
/// A missing or unreadable template yields `None`, the same as no match.
pub fn find_template(frame: &Frame, path: &Path, threshold: f32) -> Option<MatchPoint> {
    let template = Template::load(path)?;
    find(frame, &template, threshold)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
