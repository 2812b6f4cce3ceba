// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Full train + validation loop using Burn's DataLoader and Adam.
//
// Key Burn points:
//   - Training runs on an AutodiffBackend for gradients
//   - model.valid() returns the model on the inner backend,
//     where BatchNorm switches to its running statistics
//   - Validation batches are built on the inner backend too
//
// Per batch:  lr from LrSchedule → forward → -dice → backward
//             → Adam step
// Per epoch:  validation → CSV row + TensorBoard scalars →
//             early stopping, plateau cut, save-best
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::Result;
use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::SegmentationBatcher, dataset::SegmentationDataset};
use crate::infra::{
    checkpoint::CheckpointManager,
    event_log::EventLogger,
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::{
    callbacks::{BestCheckpoint, CyclicLr, EarlyStopping, LrSchedule, ReduceLrOnPlateau},
    metrics::{dice_coef_loss, MetricAverager, MetricSnapshot},
    model::{FractalUNet, FractalUNetConfig},
};

pub type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// What happened during a fit.
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub epochs_run:    usize,
    pub best_monitor:  f64,
    pub stopped_early: bool,
    /// Number of plateau learning-rate cuts
    pub lr_cuts:       usize,
}

/// What the epoch-end callbacks ask of the loop.
#[derive(Debug, Clone, Copy, PartialEq)]
struct EpochDecision {
    /// Factor to apply to the held learning rate
    lr_factor: Option<f64>,
    stop:      bool,
}

/// Epoch-end callbacks, run in this order: early stopping,
/// plateau cut, save-best.
struct EpochEnd {
    early_stop: EarlyStopping,
    plateau:    ReduceLrOnPlateau,
    best:       BestCheckpoint,
    saved_any:  bool,
}

impl EpochEnd {
    fn new(cfg: &TrainConfig) -> Self {
        Self {
            early_stop: EarlyStopping::new(cfg.early_stop_patience, cfg.min_delta),
            plateau:    ReduceLrOnPlateau::new(cfg.plateau_factor, cfg.plateau_patience, cfg.min_delta),
            best:       BestCheckpoint::new(),
            saved_any:  false,
        }
    }

    /// `epoch` is 1-based and only used in log lines.
    fn step<B: Backend>(
        &mut self,
        epoch:        usize,
        monitored:    f64,
        model:        &FractalUNet<B>,
        ckpt_manager: &CheckpointManager,
    ) -> Result<EpochDecision> {
        let stop      = self.early_stop.on_epoch_end(monitored);
        let lr_factor = self.plateau.on_epoch_end(monitored);

        if self.best.should_save(monitored) {
            ckpt_manager.save_weights(model)?;
            self.saved_any = true;
            tracing::info!("Epoch {}: monitored loss improved to {:.5}, weights saved", epoch, monitored);
        }

        Ok(EpochDecision { lr_factor, stop })
    }
}

#[allow(clippy::too_many_arguments)]
pub fn train_loop<B: AutodiffBackend>(
    cfg:           &TrainConfig,
    model_cfg:     &FractalUNetConfig,
    train_dataset: SegmentationDataset,
    val_dataset:   SegmentationDataset,
    ckpt_manager:  &CheckpointManager,
    logger:        &MetricsLogger,
    events:        &mut EventLogger,
    device:        B::Device,
) -> Result<TrainingSummary> {

    // ── Build model ───────────────────────────────────────────────────────────
    let mut model: FractalUNet<B> = model_cfg.init(&device);
    tracing::info!(
        "Model ready: {} parameters, base_filters={}, depth={}",
        model.num_params(),
        model_cfg.base_filters,
        model_cfg.depth
    );

    // ── Adam optimiser ────────────────────────────────────────────────────────
    let mut optim = AdamConfig::new().with_epsilon(cfg.adam_epsilon).init();

    // ── Callbacks ─────────────────────────────────────────────────────────────
    let mut schedule  = LrSchedule::new(CyclicLr::new(cfg.base_lr, cfg.max_lr, cfg.lr_step_size));
    let mut epoch_end = EpochEnd::new(cfg);

    if val_dataset.sample_count() == 0 {
        tracing::warn!("Validation set is empty; monitoring training loss instead of val_loss");
    }

    // ── Data loaders ──────────────────────────────────────────────────────────
    let batcher = SegmentationBatcher::new(cfg.img_rows, cfg.img_cols);

    let train_loader = DataLoaderBuilder::<B, _, _>::new(batcher.clone())
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(1)
        .set_device(device.clone())
        .build(train_dataset);

    // Inner backend: no autodiff graph during validation
    let val_loader = DataLoaderBuilder::<B::InnerBackend, _, _>::new(batcher)
        .batch_size(cfg.batch_size)
        .num_workers(1)
        .set_device(device.clone())
        .build(val_dataset);

    // ── Epoch loop ────────────────────────────────────────────────────────────
    let mut epochs_run    = 0usize;
    let mut stopped_early = false;
    let mut lr_cuts       = 0usize;

    for epoch in 0..cfg.epochs {

        // ── Training phase ────────────────────────────────────────────────────
        let mut train_avg = MetricAverager::new();

        for batch in train_loader.iter() {
            let lr         = schedule.next_batch();
            let batch_size = batch.images.dims()[0];

            let preds = model.forward(batch.images);
            let loss  = dice_coef_loss(batch.masks.clone(), preds.clone());

            let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
            let snapshot = MetricSnapshot::evaluate(batch.masks.inner(), preds.inner())
                .with_loss(loss_val);
            train_avg.add(&snapshot, batch_size);

            // Backward pass + Adam update
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(lr, model, grads);
        }

        // ── Validation phase ──────────────────────────────────────────────────
        let model_valid = model.valid();
        let mut val_avg = MetricAverager::new();

        for batch in val_loader.iter() {
            let batch_size = batch.images.dims()[0];
            let preds      = model_valid.forward(batch.images);
            val_avg.add(&MetricSnapshot::evaluate(batch.masks, preds), batch_size);
        }

        let train_m = train_avg.mean();
        let val_m   = val_avg.mean();
        epochs_run  = epoch + 1;

        // Logged before any plateau cut of this epoch
        let lr = schedule.current();
        println!(
            "Epoch {:>3}/{} | loss={:.4} | dice={:.4} | val_loss={:.4} | val_dice={:.4} | val_f1={:.4} | lr={:.2e}",
            epochs_run, cfg.epochs, train_m.loss, train_m.dice_coef,
            val_m.loss, val_m.dice_coef, val_m.f1_score, lr,
        );

        let metrics = EpochMetrics::new(epoch, lr, train_m, val_m);
        logger.log(&metrics)?;
        events.log(&metrics);
        tracing::debug!("Epoch {}: {} optimiser steps so far", epochs_run, schedule.iteration());

        let monitored = if val_avg.samples() > 0 { val_m.loss } else { train_m.loss };

        // ── Early stopping / plateau / save best ──────────────────────────────
        let decision = epoch_end.step(epochs_run, monitored, &model_valid, ckpt_manager)?;
        if let Some(factor) = decision.lr_factor {
            schedule.reduce(factor);
            lr_cuts += 1;
            tracing::info!("Epoch {}: reducing learning rate to {:.1e} for the next batch", epochs_run, schedule.current());
        }
        if decision.stop {
            tracing::info!("Epoch {}: early stopping", epochs_run);
            stopped_early = true;
            break;
        }
    }

    // A run whose loss never became finite still leaves weights behind
    if !epoch_end.saved_any {
        tracing::warn!("No epoch improved the monitored loss; saving final weights");
        ckpt_manager.save_weights(&model.valid())?;
    }

    tracing::info!("Training complete after {} epochs", epochs_run);
    Ok(TrainingSummary {
        epochs_run,
        best_monitor: epoch_end.best.best(),
        stopped_early,
        lr_cuts,
    })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::SegmentationSample;
    use crate::domain::bit_depth::BitDepth;
    use crate::infra::event_log::event_files;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn square_sample(rows: usize, cols: usize, offset: usize) -> SegmentationSample {
        let mut image = vec![-1.0; rows * cols];
        let mut mask  = vec![0.0; rows * cols];
        for r in offset..offset + rows / 2 {
            for c in offset..offset + cols / 2 {
                image[r * cols + c] = 1.0;
                mask[r * cols + c]  = 1.0;
            }
        }
        SegmentationSample::new(image, mask)
    }

    struct Sinks {
        ckpt:   CheckpointManager,
        logger: MetricsLogger,
        events: EventLogger,
    }

    fn sinks(dir: &std::path::Path, bit: BitDepth) -> Sinks {
        Sinks {
            ckpt:   CheckpointManager::new(dir, bit).unwrap(),
            logger: MetricsLogger::create(dir, bit).unwrap(),
            events: EventLogger::create(dir).unwrap(),
        }
    }

    /// The `lr` column of every CSV row.
    fn logged_lrs(logger: &MetricsLogger) -> Vec<f64> {
        let log = std::fs::read_to_string(logger.csv_path()).unwrap();
        log.lines()
            .skip(1)
            .map(|row| row.split(',').nth(5).unwrap().parse().unwrap())
            .collect()
    }

    fn flat_weights(model: &FractalUNet<NdArray>) -> Vec<f32> {
        model.encoder_a[0].conv1.weight.val().into_data().convert::<f32>().to_vec().unwrap()
    }

    fn max_abs_diff(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, f32::max)
    }

    #[test]
    fn test_tiny_training_run_writes_artefacts() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = TrainConfig {
            img_rows:   8,
            img_cols:   8,
            batch_size: 2,
            epochs:     2,
            base_filters: 2,
            depth:      2,
            output_dir: tmp.path().to_path_buf(),
            ..TrainConfig::default()
        };
        let model_cfg = cfg.model_config();

        let train = SegmentationDataset::new((0..4).map(|i| square_sample(8, 8, i % 3)).collect());
        let val   = SegmentationDataset::new(vec![square_sample(8, 8, 1)]);

        let mut out = sinks(tmp.path(), BitDepth::Eight);
        let summary = train_loop::<TestBackend>(
            &cfg, &model_cfg, train, val, &out.ckpt, &out.logger, &mut out.events, Default::default(),
        ).unwrap();

        assert_eq!(summary.epochs_run, 2);
        assert!(!summary.stopped_early);

        let mut weights = out.ckpt.weights_path();
        weights.set_extension("mpk");
        assert!(weights.exists());

        let log = std::fs::read_to_string(out.logger.csv_path()).unwrap();
        assert_eq!(log.lines().count(), 1 + summary.epochs_run);

        let events = event_files(&tmp.path().join("logs").join("fractalunet")).unwrap();
        assert_eq!(events.len(), 1);
        assert!(std::fs::metadata(&events[0]).unwrap().len() > 0);
    }

    #[test]
    fn test_early_stopping_ends_the_run() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = TrainConfig {
            img_rows:   4,
            img_cols:   4,
            batch_size: 1,
            epochs:     10,
            base_filters: 1,
            depth:      1,
            // no later epoch can beat the first by this much
            min_delta:  10.0,
            early_stop_patience: 2,
            output_dir: tmp.path().to_path_buf(),
            ..TrainConfig::default()
        };
        let model_cfg = cfg.model_config();

        let train = SegmentationDataset::new(vec![square_sample(4, 4, 0)]);
        let val   = SegmentationDataset::new(vec![square_sample(4, 4, 1)]);

        let mut out = sinks(tmp.path(), BitDepth::Sixteen);
        let summary = train_loop::<TestBackend>(
            &cfg, &model_cfg, train, val, &out.ckpt, &out.logger, &mut out.events, Default::default(),
        ).unwrap();

        assert!(summary.stopped_early);
        assert_eq!(summary.epochs_run, 3);
    }

    #[test]
    fn test_plateau_cuts_do_not_shrink_the_cycle() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = TrainConfig {
            img_rows:   4,
            img_cols:   4,
            batch_size: 1,
            epochs:     4,
            base_filters: 1,
            depth:      1,
            base_lr:    1e-5,
            max_lr:     6e-5,
            lr_step_size: 2.0,
            // every epoch after the first stalls, patience 1 cuts each time
            min_delta:  10.0,
            plateau_patience: 1,
            output_dir: tmp.path().to_path_buf(),
            ..TrainConfig::default()
        };
        let model_cfg = cfg.model_config();

        let train = SegmentationDataset::new(vec![square_sample(4, 4, 0), square_sample(4, 4, 1)]);
        let val   = SegmentationDataset::new(vec![square_sample(4, 4, 1)]);

        let mut out = sinks(tmp.path(), BitDepth::Eight);
        let summary = train_loop::<TestBackend>(
            &cfg, &model_cfg, train, val, &out.ckpt, &out.logger, &mut out.events, Default::default(),
        ).unwrap();
        assert_eq!(summary.epochs_run, 4);
        assert_eq!(summary.lr_cuts, 3);

        // two batches per epoch: the logged rate is the cycle at iteration 2, 4, 6, 8
        let clr      = CyclicLr::new(cfg.base_lr, cfg.max_lr, cfg.lr_step_size);
        let expected = [2, 4, 6, 8].map(|it| clr.lr_at(it));
        let logged   = logged_lrs(&out.logger);
        assert_eq!(logged.len(), 4);
        for (got, want) in logged.iter().zip(expected) {
            assert!((got - want).abs() < want * 1e-6, "{got} != {want}");
        }
        // the peak is still reached after three cuts
        assert!((logged[2] - 6e-5).abs() < 1e-12);
    }

    #[test]
    fn test_checkpoint_keeps_the_best_epoch() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = TrainConfig { output_dir: tmp.path().to_path_buf(), ..TrainConfig::default() };
        let model_cfg = FractalUNetConfig::new().with_base_filters(2).with_depth(1);
        let device    = Default::default();
        let ckpt      = CheckpointManager::new(tmp.path(), BitDepth::Eight).unwrap();

        let epochs: Vec<FractalUNet<NdArray>> = (0..3).map(|_| model_cfg.init(&device)).collect();
        let mut epoch_end = EpochEnd::new(&cfg);

        // improve, improve, then worsen
        for (i, (model, loss)) in epochs.iter().zip([-0.5, -0.7, -0.6]).enumerate() {
            let decision = epoch_end.step(i + 1, loss, model, &ckpt).unwrap();
            assert!(!decision.stop);
        }
        assert_eq!(epoch_end.best.best(), -0.7);

        let fresh: FractalUNet<NdArray> = model_cfg.init(&device);
        let loaded = flat_weights(&ckpt.load_weights(fresh, &device).unwrap());

        // half-precision record
        assert!(max_abs_diff(&loaded, &flat_weights(&epochs[1])) < 1e-2);
        assert!(max_abs_diff(&loaded, &flat_weights(&epochs[2])) > 1e-2);
    }
}
