// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Holds out the LAST fraction of the samples for validation,
// without shuffling first:
//
//   split_at = floor(n * (1 - validation_fraction))
//   train    = samples[..split_at]
//   val      = samples[split_at..]
//
// Samples arrive sorted by id, so the split is reproducible
// across runs. Shuffling happens later, per epoch, inside the
// training DataLoader only.

/// Split `samples` into (train, validation).
///
/// # Arguments
/// * `samples`             - All available samples (consumed by this function)
/// * `validation_fraction` - Proportion held out, e.g. 0.2 = last 20%
pub fn split_validation<T>(mut samples: Vec<T>, validation_fraction: f64) -> (Vec<T>, Vec<T>) {
    let total    = samples.len();
    let fraction = validation_fraction.clamp(0.0, 1.0);
    let split_at = ((total as f64) * (1.0 - fraction)).floor() as usize;

    // Clamp to valid range to avoid panics on tiny datasets
    let split_at = split_at.min(total);

    let val = samples.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation",
        samples.len(),
        val.len(),
    );

    (samples, val)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correct_split_sizes() {
        let items: Vec<usize> = (0..100).collect();
        let (train, val)      = split_validation(items, 0.2);
        assert_eq!(train.len(), 80);
        assert_eq!(val.len(),   20);
    }

    #[test]
    fn test_validation_is_the_tail() {
        let items: Vec<usize> = (0..10).collect();
        let (train, val)      = split_validation(items, 0.2);
        assert_eq!(train, (0..8).collect::<Vec<_>>());
        assert_eq!(val, vec![8, 9]);
    }

    #[test]
    fn test_rounds_training_share_down() {
        // 7 * 0.8 = 5.6 → 5 train, 2 validation
        let items: Vec<usize> = (0..7).collect();
        let (train, val)      = split_validation(items, 0.2);
        assert_eq!(train.len(), 5);
        assert_eq!(val.len(),   2);
    }

    #[test]
    fn test_empty_dataset() {
        let items: Vec<usize> = Vec::new();
        let (train, val)      = split_validation(items, 0.2);
        assert!(train.is_empty());
        assert!(val.is_empty());
    }

    #[test]
    fn test_zero_fraction_keeps_everything_for_training() {
        let items: Vec<usize> = (0..10).collect();
        let (train, val)      = split_validation(items, 0.0);
        assert_eq!(train.len(), 10);
        assert!(val.is_empty());
    }
}
