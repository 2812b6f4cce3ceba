// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// This layer contains the Burn-specific model code.
//
// What's in this layer:
//
//   model.rs      — The FractalUNet: two stacked U-Nets with
//                   cross-connections between the first U's
//                   decoder and the second U's encoder
//
//   metrics.rs    — Dice coefficient / loss, precision, recall,
//                   F1 and binary accuracy over whole batches
//
//   callbacks.rs  — Cyclic learning rate, plateau reduction,
//                   early stopping and save-best policy
//
//   trainer.rs    — The training loop: forward, Dice loss,
//                   backward, Adam step, validation, logging
//
//   inferencer.rs — Loads the best weights and predicts masks
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Ronneberger et al. (2015) U-Net

/// FractalUNet architecture
pub mod model;

/// Segmentation loss and metrics
pub mod metrics;

/// Learning-rate schedule and stopping rules
pub mod callbacks;

/// Full training loop with validation and checkpointing
pub mod trainer;

/// Inference engine — loads weights and predicts masks
pub mod inferencer;
