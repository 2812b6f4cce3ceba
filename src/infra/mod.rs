// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches the filesystem on the way out:
//
//   checkpoint.rs  — best weights via Burn's CompactRecorder,
//                    plus a JSON artefact with the model config
//                    and normalisation stats so `predict` can
//                    rebuild the exact network on its own.
//
//   metrics.rs     — one CSV row per epoch with the training
//                    and validation metrics and the LR in use.
//
//   event_log.rs   — the same per-epoch values as TensorBoard
//                    scalars under logs/fractalunet.
//
//   mask_writer.rs — writes predicted masks as 8-bit PNGs.
//
// Every artefact name carries the bit depth, so 8-bit and
// 16-bit runs can share an output directory.
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Epoch metrics CSV logger
pub mod metrics;

/// TensorBoard scalar event writer
pub mod event_log;

/// Prediction PNG writer
pub mod mask_writer;
