// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types describing what the segmentation pipeline
// works with: bit depths, decoded greyscale images and the
// normalisation statistics carried from training to inference.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Image bit depth (8 or 16) that keys every artefact name
pub mod bit_depth;

// A decoded single-channel image plus its identifier
pub mod image_record;

// Core abstractions (traits) that other layers implement
pub mod traits;
