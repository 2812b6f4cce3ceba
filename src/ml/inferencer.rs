// ============================================================
// Layer 5 — Inferencer
// ============================================================
use anyhow::{anyhow, bail, Result};
use burn::prelude::*;

use crate::data::batcher::stack_images;
use crate::domain::image_record::ImageRecord;
use crate::infra::checkpoint::{CheckpointManager, ModelArtifact};
use crate::ml::model::FractalUNet;

pub type InferBackend = burn::backend::Wgpu;

pub struct Inferencer<B: Backend> {
    model:    FractalUNet<B>,
    artifact: ModelArtifact,
    device:   B::Device,
}

impl<B: Backend> Inferencer<B> {
    /// Rebuild the network from the saved artefact and load the best weights.
    pub fn from_checkpoint(ckpt_manager: &CheckpointManager, device: B::Device) -> Result<Self> {
        let artifact = ckpt_manager.load_artifact()?;
        artifact.model.validate_geometry(artifact.img_rows, artifact.img_cols)?;
        let model: FractalUNet<B> = artifact.model.init(&device);
        let model = ckpt_manager.load_weights(model, &device)?;
        tracing::info!(
            "Model loaded: {}-bit, {}x{}, base_filters={}",
            artifact.bit_depth, artifact.img_rows, artifact.img_cols, artifact.model.base_filters
        );
        Ok(Self { model, artifact, device })
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    /// Predict a mask for every (already standardised) image.
    /// Each returned record keeps the source id; pixels are in [0, 1].
    pub fn predict(&self, images: &[ImageRecord], batch_size: usize) -> Result<Vec<ImageRecord>> {
        let (rows, cols) = (self.artifact.img_rows, self.artifact.img_cols);

        if let Some(bad) = images.iter().find(|img| img.rows != rows || img.cols != cols) {
            bail!(
                "image '{}' is {}x{}, the model expects {rows}x{cols}",
                bad.id, bad.rows, bad.cols
            );
        }

        let mut predictions = Vec::with_capacity(images.len());

        for chunk in images.chunks(batch_size.max(1)) {
            let flat: Vec<f32> = chunk.iter().flat_map(|img| img.pixels.iter().copied()).collect();
            let input  = stack_images::<B>(flat, chunk.len(), rows, cols, &self.device);
            let output = self.model.forward(input);

            let values: Vec<f32> = output
                .into_data()
                .convert::<f32>()
                .to_vec()
                .map_err(|e| anyhow!("Cannot read predictions back from the device: {e:?}"))?;

            for (img, mask) in chunk.iter().zip(values.chunks(rows * cols)) {
                predictions.push(ImageRecord::new(img.id.clone(), rows, cols, mask.to_vec()));
            }
        }

        tracing::info!("Predicted {} masks", predictions.len());
        Ok(predictions)
    }
}
