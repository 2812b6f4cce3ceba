use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

/// One standardised image and its [0, 1] mask, both row-major
/// with `rows * cols` values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationSample {
    pub image: Vec<f32>,
    pub mask:  Vec<f32>,
}

impl SegmentationSample {
    pub fn new(image: Vec<f32>, mask: Vec<f32>) -> Self {
        debug_assert_eq!(image.len(), mask.len());
        Self { image, mask }
    }

    /// Fraction of mask pixels that are foreground
    pub fn foreground_ratio(&self) -> f32 {
        if self.mask.is_empty() {
            return 0.0;
        }
        self.mask.iter().filter(|&&m| m >= 0.5).count() as f32 / self.mask.len() as f32
    }
}

pub struct SegmentationDataset {
    samples: Vec<SegmentationSample>,
}

impl SegmentationDataset {
    pub fn new(samples: Vec<SegmentationSample>) -> Self { Self { samples } }

    pub fn sample_count(&self) -> usize { self.samples.len() }
}

impl Dataset<SegmentationSample> for SegmentationDataset {
    fn get(&self, index: usize) -> Option<SegmentationSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
