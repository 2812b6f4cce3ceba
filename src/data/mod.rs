// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from PNG files on disk to
// tensor batches ready for the FractalUNet.
//
// The pipeline flows in this order:
//
//   <data_dir>/train/*.png, *_mask.png, <data_dir>/test/*.png
//       │
//       ▼
//   PngDirectoryLoader → decodes 8/16-bit greyscale, resizes
//       │
//       ▼
//   Preprocessor       → standardises images, scales masks to [0, 1]
//       │
//       ▼
//   split_validation   → last 20% held out for validation
//       │
//       ▼
//   SegmentationDataset → implements Burn's Dataset trait
//       │
//       ▼
//   SegmentationBatcher → stacks samples into [N, 1, H, W] tensors
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Loads PNG images and masks from a directory tree
pub mod loader;

/// Standardises images and rescales masks
pub mod preprocessor;

/// Implements Burn's Dataset trait for segmentation samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Splits samples into train/validation sets
pub mod splitter;
