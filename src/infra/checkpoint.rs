// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder.
//
// Files per bit depth, all inside the output directory:
//
//   weights_fractalunet_8.mpk   ← best weights so far (by val_loss)
//   fractalunet_8.json          ← model config + normalisation stats
//
// The JSON artefact is written before training starts. Without
// it, inference could neither rebuild the network nor put test
// images on the training scale.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use std::{fs, path::PathBuf};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{Deserialize, Serialize};

use crate::domain::{bit_depth::BitDepth, image_record::NormStats};
use crate::ml::model::{FractalUNet, FractalUNetConfig};

/// Everything inference needs besides the weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub bit_depth: BitDepth,
    pub img_rows:  usize,
    pub img_cols:  usize,
    pub model:     FractalUNetConfig,
    pub stats:     NormStats,
}

/// Manages saving and loading of the checkpoint for one bit depth.
pub struct CheckpointManager {
    dir: PathBuf,
    bit: BitDepth,
}

impl CheckpointManager {
    /// Create a new CheckpointManager, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>, bit: BitDepth) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create output directory '{}'", dir.display()))?;
        Ok(Self { dir, bit })
    }

    /// Weights path without extension; the recorder appends `.mpk`
    pub fn weights_path(&self) -> PathBuf {
        self.dir.join(format!("weights_fractalunet_{}", self.bit))
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.dir.join(format!("fractalunet_{}.json", self.bit))
    }

    /// Overwrite the stored weights with `model`'s parameters.
    pub fn save_weights<B: Backend>(&self, model: &FractalUNet<B>) -> Result<()> {
        let path = self.weights_path();

        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| {
                format!("Failed to save weights to '{}'", path.display())
            })?;

        tracing::debug!("Saved weights to '{}'", path.display());
        Ok(())
    }

    /// Load the stored weights into `model`.
    /// The architecture must match the one that was saved.
    pub fn load_weights<B: Backend>(
        &self,
        model:  FractalUNet<B>,
        device: &B::Device,
    ) -> Result<FractalUNet<B>> {
        let path = self.weights_path();
        tracing::info!("Loading weights from '{}'", path.display());

        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load weights '{}'. Have you trained the model first?",
                    path.display())
            })?;

        Ok(model.load_record(record))
    }

    pub fn save_artifact(&self, artifact: &ModelArtifact) -> Result<()> {
        let path = self.artifact_path();
        let json = serde_json::to_string_pretty(artifact)?;

        fs::write(&path, json)
            .with_context(|| {
                format!("Cannot write model artefact to '{}'", path.display())
            })?;

        tracing::debug!("Saved model artefact to '{}'", path.display());
        Ok(())
    }

    pub fn load_artifact(&self) -> Result<ModelArtifact> {
        let path = self.artifact_path();

        let json = fs::read_to_string(&path)
            .with_context(|| {
                format!(
                    "Cannot read model artefact from '{}'. \
                     Make sure you have run 'train' before 'predict'.",
                    path.display()
                )
            })?;

        serde_json::from_str(&json)
            .with_context(|| format!("Malformed model artefact '{}'", path.display()))
    }
}
