// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Validate geometry           (Layer 5 - ml)
//   Step 2: Load train images + masks   (Layer 4 - data)
//   Step 3: Standardise / scale         (Layer 4 - data)
//   Step 4: Split train/validation      (Layer 4 - data)
//   Step 5: Build datasets              (Layer 4 - data)
//   Step 6: Save artefact, open logs    (Layer 6 - infra)
//   Step 7: Run training loop           (Layer 5 - ml)

use anyhow::{bail, Result};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::data::{
    dataset::SegmentationDataset,
    loader::PngDirectoryLoader,
    preprocessor::Preprocessor,
    splitter::split_validation,
};
use crate::domain::{bit_depth::BitDepth, image_record::NormStats, traits::ImageSource};
use crate::infra::{
    checkpoint::{CheckpointManager, ModelArtifact},
    event_log::EventLogger,
    metrics::MetricsLogger,
};
use crate::ml::{
    model::FractalUNetConfig,
    trainer::{train_loop, TrainBackend, TrainingSummary},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run. Defaults reproduce the
// reference run: 512x512 inputs, batch 4, 500 epochs, 16 base
// filters, cyclic LR 1e-5..6e-5 over 2000 iterations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data_dir:            PathBuf,
    pub output_dir:          PathBuf,
    pub bit_depth:           BitDepth,
    pub img_rows:            usize,
    pub img_cols:            usize,
    pub batch_size:          usize,
    pub epochs:              usize,
    pub base_filters:        usize,
    pub depth:               usize,
    /// Fraction of samples (taken from the end) held out for validation
    pub validation_split:    f64,
    /// Seed for the per-epoch shuffle of the training set
    pub seed:                u64,
    pub base_lr:             f64,
    pub max_lr:              f64,
    /// Half a cycle, in batch iterations
    pub lr_step_size:        f64,
    pub plateau_factor:      f64,
    pub plateau_patience:    usize,
    pub early_stop_patience: usize,
    /// Smallest val_loss decrease that counts as an improvement
    pub min_delta:           f64,
    pub adam_epsilon:        f32,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir:            PathBuf::from("data"),
            output_dir:          PathBuf::from("."),
            bit_depth:           BitDepth::Eight,
            img_rows:            512,
            img_cols:            512,
            batch_size:          4,
            epochs:              500,
            base_filters:        16,
            depth:               4,
            validation_split:    0.2,
            seed:                42,
            base_lr:             1e-5,
            max_lr:              6e-5,
            lr_step_size:        2000.0,
            plateau_factor:      0.1,
            plateau_patience:    5,
            early_stop_patience: 30,
            min_delta:           1e-5,
            adam_epsilon:        1e-7,
        }
    }
}

impl TrainConfig {
    pub fn model_config(&self) -> FractalUNetConfig {
        FractalUNetConfig::new()
            .with_base_filters(self.base_filters)
            .with_depth(self.depth)
    }
}

/// Result of a training run.
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub stats:   NormStats,
    pub summary: TrainingSummary,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Train on the default GPU device.
    pub fn execute(&self) -> Result<TrainOutcome> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        tracing::info!("Using WGPU device: {:?}", device);
        self.execute_on::<TrainBackend>(device)
    }

    /// Execute the full training pipeline end to end on any autodiff backend.
    pub fn execute_on<B: AutodiffBackend>(&self, device: B::Device) -> Result<TrainOutcome> {
        let cfg       = &self.config;
        let model_cfg = cfg.model_config();

        // ── Step 1: Reject geometries the network cannot pool ─────────────────
        model_cfg.validate_geometry(cfg.img_rows, cfg.img_cols)?;
        if cfg.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }

        // ── Step 2: Load training pairs ───────────────────────────────────────
        tracing::info!(
            "Loading {}-bit training data from '{}'",
            cfg.bit_depth,
            cfg.data_dir.display()
        );
        let loader = PngDirectoryLoader::new(&cfg.data_dir, cfg.bit_depth, cfg.img_rows, cfg.img_cols);
        let pairs  = loader.load_train()?;
        if pairs.is_empty() {
            bail!("no training pairs found under '{}'", cfg.data_dir.join("train").display());
        }

        // ── Step 3: Standardise images, scale masks ───────────────────────────
        let (samples, stats) = Preprocessor::new().prepare_training(pairs)?;
        let foreground = samples.iter().map(|s| s.foreground_ratio()).sum::<f32>() / samples.len() as f32;
        tracing::info!(
            "Prepared {} samples (mean={:.3}, std={:.3}, foreground={:.2}%)",
            samples.len(),
            stats.mean,
            stats.std,
            foreground * 100.0
        );

        // ── Step 4: Hold out the tail for validation ──────────────────────────
        let (train_samples, val_samples) = split_validation(samples, cfg.validation_split);
        tracing::info!(
            "Split: {} train, {} validation",
            train_samples.len(),
            val_samples.len()
        );
        if train_samples.is_empty() {
            bail!("validation split {} leaves no training samples", cfg.validation_split);
        }

        // ── Step 5: Build Burn datasets ───────────────────────────────────────
        let train_dataset = SegmentationDataset::new(train_samples);
        let val_dataset   = SegmentationDataset::new(val_samples);

        // ── Step 6: Save artefact for inference ───────────────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.output_dir, cfg.bit_depth)?;
        ckpt_manager.save_artifact(&ModelArtifact {
            bit_depth: cfg.bit_depth,
            img_rows:  cfg.img_rows,
            img_cols:  cfg.img_cols,
            model:     model_cfg.clone(),
            stats,
        })?;
        let logger = MetricsLogger::create(&cfg.output_dir, cfg.bit_depth)?;
        let mut events = EventLogger::create(&cfg.output_dir)?;
        tracing::info!(
            "Logging epochs to '{}' and '{}'",
            logger.csv_path().display(),
            events.dir().display()
        );

        // ── Step 7: Run training loop (Layer 5) ───────────────────────────────
        let summary = train_loop::<B>(
            cfg, &model_cfg, train_dataset, val_dataset, &ckpt_manager, &logger, &mut events, device,
        )?;

        Ok(TrainOutcome { stats, summary })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_defaults_match_reference_run() {
        let cfg = TrainConfig::default();
        assert_eq!((cfg.img_rows, cfg.img_cols), (512, 512));
        assert_eq!(cfg.batch_size, 4);
        assert_eq!(cfg.epochs, 500);
        assert_eq!(cfg.model_config().base_filters, 16);
        assert!(cfg.model_config().validate_geometry(cfg.img_rows, cfg.img_cols).is_ok());
    }

    #[test]
    fn test_rejects_unpoolable_geometry_before_loading() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = TrainConfig {
            data_dir: tmp.path().join("does-not-exist"),
            img_rows: 30,
            img_cols: 32,
            ..TrainConfig::default()
        };
        let err = TrainUseCase::new(cfg).execute_on::<TestBackend>(Default::default()).unwrap_err();
        assert!(err.to_string().contains("not divisible"));
    }

    #[test]
    fn test_rejects_huge_depth_without_panicking() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = TrainConfig {
            data_dir: tmp.path().join("does-not-exist"),
            depth:    64,
            ..TrainConfig::default()
        };
        let err = TrainUseCase::new(cfg).execute_on::<TestBackend>(Default::default()).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_missing_data_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = TrainConfig {
            data_dir: tmp.path().to_path_buf(),
            output_dir: tmp.path().to_path_buf(),
            img_rows: 16,
            img_cols: 16,
            ..TrainConfig::default()
        };
        assert!(TrainUseCase::new(cfg).execute_on::<TestBackend>(Default::default()).is_err());
    }
}
