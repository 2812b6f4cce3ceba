// ============================================================
// Layer 2 — PredictUseCase
// ============================================================
// Runs the saved network over the test images:
//
//   Step 1: Load artefact + best weights   (Layer 6 / Layer 5)
//   Step 2: Load test images               (Layer 4 - data)
//   Step 3: Standardise with TRAIN stats   (Layer 4 - data)
//   Step 4: Predict masks                  (Layer 5 - ml)
//   Step 5: Write PNGs (8-bit runs only)   (Layer 6 - infra)

use anyhow::{bail, Result};
use burn::prelude::Backend;
use std::path::PathBuf;

use crate::data::{loader::PngDirectoryLoader, preprocessor::Preprocessor};
use crate::domain::{
    bit_depth::BitDepth,
    traits::{ImageSource, MaskSink},
};
use crate::infra::{checkpoint::CheckpointManager, mask_writer::PngMaskWriter};
use crate::ml::inferencer::{InferBackend, Inferencer};

#[derive(Debug, Clone)]
pub struct PredictConfig {
    pub data_dir:   PathBuf,
    pub output_dir: PathBuf,
    pub bit_depth:  BitDepth,
    pub batch_size: usize,
}

/// What a prediction run produced.
#[derive(Debug, Clone)]
pub struct PredictOutcome {
    pub predicted: usize,
    pub written:   usize,
    /// Directory the PNGs went to, when any were written
    pub pred_dir:  Option<PathBuf>,
}

pub struct PredictUseCase {
    config: PredictConfig,
}

impl PredictUseCase {
    pub fn new(config: PredictConfig) -> Self {
        Self { config }
    }

    /// Predict on the default GPU device.
    pub fn execute(&self) -> Result<PredictOutcome> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        self.execute_on::<InferBackend>(device)
    }

    pub fn execute_on<B: Backend>(&self, device: B::Device) -> Result<PredictOutcome> {
        let cfg = &self.config;

        // ── Step 1: Rebuild the trained network ───────────────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.output_dir, cfg.bit_depth)?;
        let inferencer   = Inferencer::<B>::from_checkpoint(&ckpt_manager, device)?;
        let artifact     = inferencer.artifact().clone();
        if artifact.bit_depth != cfg.bit_depth {
            bail!(
                "artefact '{}' was trained on {}-bit data, not {}-bit",
                ckpt_manager.artifact_path().display(),
                artifact.bit_depth,
                cfg.bit_depth
            );
        }

        // ── Step 2: Load test images at the training geometry ─────────────────
        let loader = PngDirectoryLoader::new(&cfg.data_dir, cfg.bit_depth, artifact.img_rows, artifact.img_cols);
        let mut images = loader.load_test()?;

        // ── Step 3: Put them on the training scale ────────────────────────────
        let preprocessor = Preprocessor::new();
        for image in images.iter_mut() {
            preprocessor.standardise(image, &artifact.stats);
        }

        // ── Step 4: Predict ───────────────────────────────────────────────────
        let predictions = inferencer.predict(&images, cfg.batch_size)?;

        // ── Step 5: Persist ───────────────────────────────────────────────────
        if !cfg.bit_depth.writes_predictions() {
            tracing::info!("{}-bit run: predictions are not written to disk", cfg.bit_depth);
            return Ok(PredictOutcome { predicted: predictions.len(), written: 0, pred_dir: None });
        }

        let pred_dir = cfg.output_dir.join(format!("preds_{}", cfg.bit_depth));
        let writer   = PngMaskWriter::new(&pred_dir)?;
        for prediction in &predictions {
            writer.write(prediction)?;
        }
        tracing::info!("Saved {} predicted masks to '{}'", predictions.len(), writer.dir().display());

        Ok(PredictOutcome {
            predicted: predictions.len(),
            written:   predictions.len(),
            pred_dir:  Some(pred_dir),
        })
    }
}
