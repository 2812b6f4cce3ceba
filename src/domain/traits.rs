// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer talks to image storage only through
// these traits, so a directory of PNGs can be swapped for any
// other source (or an in-memory fixture in tests).

use anyhow::Result;
use crate::domain::image_record::{ImageRecord, LabelledImage};

// ─── ImageSource ──────────────────────────────────────────────────────────────
/// Anything that can supply training pairs and test images.
///
/// Implementations:
///   - PngDirectoryLoader → `<dir>/train/*.png` + `*_mask.png`, `<dir>/test/*.png`
pub trait ImageSource {
    /// Load every (image, mask) training pair, ordered by id.
    fn load_train(&self) -> Result<Vec<LabelledImage>>;

    /// Load every test image, ordered by id.
    fn load_test(&self) -> Result<Vec<ImageRecord>>;
}

// ─── MaskSink ─────────────────────────────────────────────────────────────────
/// Anything that can persist predicted masks.
///
/// Implementations:
///   - PngMaskWriter → one 8-bit PNG per prediction
pub trait MaskSink {
    /// Persist one predicted mask (values in [0, 1]).
    fn write(&self, prediction: &ImageRecord) -> Result<()>;
}
