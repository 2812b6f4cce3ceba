// ============================================================
// Layer 6 — Prediction Writer
// ============================================================
// Writes each predicted mask as an 8-bit greyscale PNG:
//
//   pixel = u8(probability * 255)     (truncating)
//
// Output name: <last '/'-segment of the id>_pred_fractalunet.png

use anyhow::{anyhow, Context, Result};
use image::GrayImage;
use std::{fs, path::PathBuf};

use crate::domain::{image_record::ImageRecord, traits::MaskSink};

const PRED_SUFFIX: &str = "_pred_fractalunet.png";

/// File name for the prediction of the image identified by `id`.
pub fn prediction_file_name(id: &str) -> String {
    let base = id.rsplit('/').next().unwrap_or(id);
    format!("{base}{PRED_SUFFIX}")
}

/// Map a [0, 1] probability to a byte; out-of-range values saturate.
pub fn to_byte(p: f32) -> u8 {
    (p * 255.0) as u8
}

pub struct PngMaskWriter {
    dir: PathBuf,
}

impl PngMaskWriter {
    /// Create the writer, creating its directory if it does not exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create prediction directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}

impl MaskSink for PngMaskWriter {
    fn write(&self, prediction: &ImageRecord) -> Result<()> {
        let bytes: Vec<u8> = prediction.pixels.iter().map(|&p| to_byte(p)).collect();
        let img = GrayImage::from_raw(prediction.cols as u32, prediction.rows as u32, bytes)
            .ok_or_else(|| anyhow!(
                "prediction '{}' has {} pixels, expected {}x{}",
                prediction.id, prediction.pixels.len(), prediction.rows, prediction.cols
            ))?;

        let path = self.dir.join(prediction_file_name(&prediction.id));
        img.save(&path)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;

        tracing::debug!("Wrote prediction '{}'", path.display());
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_uses_last_path_segment() {
        assert_eq!(prediction_file_name("raw/test/17"), "17_pred_fractalunet.png");
        assert_eq!(prediction_file_name("42"), "42_pred_fractalunet.png");
    }

    #[test]
    fn test_to_byte_truncates_and_saturates() {
        assert_eq!(to_byte(0.0), 0);
        assert_eq!(to_byte(1.0), 255);
        assert_eq!(to_byte(0.5), 127);
        assert_eq!(to_byte(1.5), 255);
        assert_eq!(to_byte(-0.2), 0);
    }

    #[test]
    fn test_writes_png_with_scaled_values() {
        let tmp    = tempfile::tempdir().unwrap();
        let writer = PngMaskWriter::new(tmp.path().join("preds_8")).unwrap();
        let pred   = ImageRecord::new("a/b/case7", 2, 2, vec![0.0, 0.25, 0.5, 1.0]);
        writer.write(&pred).unwrap();

        let path = writer.dir().join("case7_pred_fractalunet.png");
        let img  = image::open(&path).unwrap().to_luma8();
        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(img.into_raw(), vec![0, 63, 127, 255]);
    }

    #[test]
    fn test_wrong_pixel_count_is_an_error() {
        let tmp    = tempfile::tempdir().unwrap();
        let writer = PngMaskWriter::new(tmp.path()).unwrap();
        let bad    = ImageRecord { id: "x".into(), rows: 3, cols: 3, pixels: vec![0.0; 4] };
        assert!(writer.write(&bad).is_err());
    }
}
