// ============================================================
// Layer 3 — Image Record
// ============================================================
// One decoded greyscale image. Pixels are stored row-major as
// f32 so the same type carries raw 8-bit values, raw 16-bit
// values, standardised values and mask probabilities.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Source identifier, usually the file stem
    pub id: String,
    pub rows: usize,
    pub cols: usize,
    /// Row-major, `rows * cols` values
    pub pixels: Vec<f32>,
}

impl ImageRecord {
    pub fn new(id: impl Into<String>, rows: usize, cols: usize, pixels: Vec<f32>) -> Self {
        debug_assert_eq!(pixels.len(), rows * cols);
        Self { id: id.into(), rows, cols, pixels }
    }
}

/// A training image together with its ground-truth mask.
#[derive(Debug, Clone)]
pub struct LabelledImage {
    pub image: ImageRecord,
    pub mask:  ImageRecord,
}

/// Mean and population standard deviation of every training pixel.
/// Test images are standardised with the same values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormStats {
    pub mean: f64,
    pub std:  f64,
}

impl NormStats {
    pub fn apply(&self, value: f32) -> f32 {
        ((value as f64 - self.mean) / self.std) as f32
    }
}
