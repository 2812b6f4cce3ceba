// ============================================================
// Layer 4 — Preprocessor
// ============================================================
// Turns decoded images into network inputs.
//
// Images are standardised with statistics computed over every
// pixel of the training set:
//
//   x' = (x - mean) / std      (population std, ddof = 0)
//
// The same statistics are saved with the model and reused for
// the test images, so train and test inputs live on one scale.
//
// Masks are stored as 0/255 and rescaled to [0, 1] so they can
// be compared directly with the hard-sigmoid output.

use anyhow::{bail, Result};

use crate::data::dataset::SegmentationSample;
use crate::domain::image_record::{ImageRecord, LabelledImage, NormStats};

const MASK_SCALE: f32 = 255.0;

pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Mean and population standard deviation over every pixel of
    /// every image. A constant training set falls back to std = 1
    /// so standardisation never divides by zero.
    pub fn fit_stats<'a>(&self, images: impl IntoIterator<Item = &'a ImageRecord> + Clone) -> Result<NormStats> {
        let (sum, count) = images
            .clone()
            .into_iter()
            .flat_map(|img| img.pixels.iter())
            .fold((0.0f64, 0usize), |(s, n), &p| (s + p as f64, n + 1));

        if count == 0 {
            bail!("cannot compute normalisation statistics over an empty image set");
        }

        let mean = sum / count as f64;
        let var  = images
            .into_iter()
            .flat_map(|img| img.pixels.iter())
            .map(|&p| (p as f64 - mean).powi(2))
            .sum::<f64>()
            / count as f64;

        let mut std = var.sqrt();
        if !(std.is_finite() && std > 0.0) {
            tracing::warn!("Training pixels have zero variance (std = {std}); using std = 1");
            std = 1.0;
        }

        tracing::debug!("Normalisation stats: mean={mean:.4}, std={std:.4}");
        Ok(NormStats { mean, std })
    }

    /// Standardise an image in place.
    pub fn standardise(&self, image: &mut ImageRecord, stats: &NormStats) {
        for p in image.pixels.iter_mut() {
            *p = stats.apply(*p);
        }
    }

    /// Rescale a 0/255 mask to [0, 1] in place.
    pub fn scale_mask(&self, mask: &mut ImageRecord) {
        for p in mask.pixels.iter_mut() {
            *p /= MASK_SCALE;
        }
    }

    /// Fit statistics on the training images, then turn every pair
    /// into a ready-to-batch sample.
    pub fn prepare_training(&self, pairs: Vec<LabelledImage>) -> Result<(Vec<SegmentationSample>, NormStats)> {
        let stats = self.fit_stats(pairs.iter().map(|p| &p.image))?;

        let samples = pairs
            .into_iter()
            .map(|LabelledImage { mut image, mut mask }| {
                self.standardise(&mut image, &stats);
                self.scale_mask(&mut mask);
                SegmentationSample::new(image.pixels, mask.pixels)
            })
            .collect();

        Ok((samples, stats))
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn record(pixels: Vec<f32>) -> ImageRecord {
        let n = pixels.len();
        ImageRecord::new("r", 1, n, pixels)
    }

    #[test]
    fn test_stats_span_all_images() {
        let p      = Preprocessor::new();
        let images = vec![record(vec![1.0, 3.0]), record(vec![5.0, 7.0])];
        let stats  = p.fit_stats(images.iter()).unwrap();

        assert!((stats.mean - 4.0).abs() < 1e-12);
        // population variance of 1,3,5,7 is 5
        assert!((stats.std - 5.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_standardised_images_have_zero_mean_unit_std() {
        let p        = Preprocessor::new();
        let mut img  = record(vec![2.0, 4.0, 6.0, 8.0]);
        let stats    = p.fit_stats(std::iter::once(&img)).unwrap();
        p.standardise(&mut img, &stats);

        let mean: f32 = img.pixels.iter().sum::<f32>() / 4.0;
        let var:  f32 = img.pixels.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-6);
        assert!((var - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_constant_images_fall_back_to_unit_std() {
        let p      = Preprocessor::new();
        let images = vec![record(vec![9.0; 4])];
        let stats  = p.fit_stats(images.iter()).unwrap();
        assert_eq!(stats.std, 1.0);
    }

    #[test]
    fn test_empty_set_is_an_error() {
        let p: Preprocessor = Preprocessor::default();
        let images: Vec<ImageRecord> = Vec::new();
        assert!(p.fit_stats(images.iter()).is_err());
    }

    #[test]
    fn test_prepare_training_scales_masks() {
        let p     = Preprocessor::new();
        let pairs = vec![LabelledImage {
            image: record(vec![0.0, 10.0]),
            mask:  record(vec![0.0, 255.0]),
        }];
        let (samples, stats) = p.prepare_training(pairs).unwrap();

        assert_eq!(samples[0].mask, vec![0.0, 1.0]);
        assert!((stats.mean - 5.0).abs() < 1e-12);
        assert!((samples[0].image[0] + 1.0).abs() < 1e-6);
        assert!((samples[0].image[1] - 1.0).abs() < 1e-6);
    }
}
