// ============================================================
// Layer 4 — Segmentation Batcher
// ============================================================
// Implements Burn's Batcher trait to convert a Vec of samples
// into NCHW tensors.
//
//   Input:  Vec of N samples, each with rows * cols pixels
//   Output: images [N, 1, rows, cols], masks [N, 1, rows, cols]
//
// All pixels of the batch are flattened into one Vec, turned
// into a 1D tensor and reshaped, the same way for both halves.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::SegmentationSample;

/// A batch of images and masks ready for the model forward pass.
#[derive(Debug, Clone)]
pub struct SegmentationBatch<B: Backend> {
    /// Standardised inputs — shape: [batch, 1, rows, cols]
    pub images: Tensor<B, 4>,

    /// Ground truth masks in [0, 1] — shape: [batch, 1, rows, cols]
    pub masks: Tensor<B, 4>,
}

/// Holds the spatial geometry so flat pixel vectors can be
/// reshaped back into images.
#[derive(Clone, Debug)]
pub struct SegmentationBatcher {
    pub rows: usize,
    pub cols: usize,
}

impl SegmentationBatcher {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }
}

/// Stack `n` flat single-channel images into an [n, 1, rows, cols] tensor.
pub fn stack_images<B: Backend>(
    flat:   Vec<f32>,
    n:      usize,
    rows:   usize,
    cols:   usize,
    device: &B::Device,
) -> Tensor<B, 4> {
    Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([n, 1, rows, cols])
}

impl<B: Backend> Batcher<B, SegmentationSample, SegmentationBatch<B>> for SegmentationBatcher {
    fn batch(&self, items: Vec<SegmentationSample>, device: &B::Device) -> SegmentationBatch<B> {
        let batch_size = items.len();

        let image_flat: Vec<f32> = items
            .iter()
            .flat_map(|s| s.image.iter().copied())
            .collect();

        let mask_flat: Vec<f32> = items
            .iter()
            .flat_map(|s| s.mask.iter().copied())
            .collect();

        let images = stack_images::<B>(image_flat, batch_size, self.rows, self.cols, device);
        let masks  = stack_images::<B>(mask_flat,  batch_size, self.rows, self.cols, device);

        SegmentationBatch { images, masks }
    }
}
