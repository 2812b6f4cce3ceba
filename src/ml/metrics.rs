// ============================================================
// Layer 5 — Segmentation Loss and Metrics
// ============================================================
// Every function reduces over the WHOLE flattened batch, so a
// batch of four 512x512 masks is scored as one long vector.
//
//   dice      = (2 Σ t·p + 1) / (Σ t + Σ p + 1)
//   loss      = -dice
//   precision = Σ round(clip(t·p)) / (Σ round(clip(p)) + ε)
//   recall    = Σ round(clip(t·p)) / (Σ round(clip(t)) + ε)
//   f1        = 2 p r / (p + r + ε)
//   accuracy  = mean(round(p) == t)
//
// Only the Dice loss is differentiated. The thresholded metrics
// are evaluated for reporting and carry no useful gradient.

use burn::prelude::*;

/// Added to numerator and denominator of the Dice coefficient
pub const SMOOTH: f64 = 1.0;
/// Guards the precision / recall / F1 denominators
pub const EPSILON: f64 = 1e-7;

fn flat<B: Backend, const D: usize>(t: Tensor<B, D>) -> Tensor<B, 1> {
    t.flatten::<1>(0, D - 1)
}

/// Dice coefficient, shape [1].
pub fn dice_coef<B: Backend, const D: usize>(y_true: Tensor<B, D>, y_pred: Tensor<B, D>) -> Tensor<B, 1> {
    let t = flat(y_true);
    let p = flat(y_pred);
    let intersection = (t.clone() * p.clone()).sum();
    (intersection * 2.0 + SMOOTH) / (t.sum() + p.sum() + SMOOTH)
}

/// Training loss: the negated Dice coefficient, shape [1].
pub fn dice_coef_loss<B: Backend, const D: usize>(y_true: Tensor<B, D>, y_pred: Tensor<B, D>) -> Tensor<B, 1> {
    dice_coef(y_true, y_pred).neg()
}

fn true_positives<B: Backend>(t: Tensor<B, 1>, p: Tensor<B, 1>) -> Tensor<B, 1> {
    (t * p).clamp(0.0, 1.0).round().sum()
}

fn positives<B: Backend>(x: Tensor<B, 1>) -> Tensor<B, 1> {
    x.clamp(0.0, 1.0).round().sum()
}

/// Share of predicted-positive pixels that are truly positive, shape [1].
pub fn precision<B: Backend, const D: usize>(y_true: Tensor<B, D>, y_pred: Tensor<B, D>) -> Tensor<B, 1> {
    let t = flat(y_true);
    let p = flat(y_pred);
    true_positives(t, p.clone()) / (positives(p) + EPSILON)
}

/// Share of truly positive pixels that are predicted positive, shape [1].
pub fn recall<B: Backend, const D: usize>(y_true: Tensor<B, D>, y_pred: Tensor<B, D>) -> Tensor<B, 1> {
    let t = flat(y_true);
    let p = flat(y_pred);
    true_positives(t.clone(), p) / (positives(t) + EPSILON)
}

/// Harmonic mean of precision and recall, shape [1].
pub fn f1_score<B: Backend, const D: usize>(y_true: Tensor<B, D>, y_pred: Tensor<B, D>) -> Tensor<B, 1> {
    let p = precision(y_true.clone(), y_pred.clone());
    let r = recall(y_true, y_pred);
    (p.clone() * r.clone() * 2.0) / (p + r + EPSILON)
}

/// Fraction of pixels whose rounded prediction equals the target, shape [1].
pub fn binary_accuracy<B: Backend, const D: usize>(y_true: Tensor<B, D>, y_pred: Tensor<B, D>) -> Tensor<B, 1> {
    flat(y_pred).round().equal(flat(y_true)).float().mean()
}

fn scalar<B: Backend>(t: Tensor<B, 1>) -> f64 {
    t.into_scalar().elem::<f64>()
}

/// Host-side values of every metric for one batch (or an average of batches).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricSnapshot {
    pub loss:      f64,
    pub dice_coef: f64,
    pub accuracy:  f64,
    pub precision: f64,
    pub recall:    f64,
    pub f1_score:  f64,
}

impl MetricSnapshot {
    /// Evaluate every metric on one batch of targets and predictions.
    pub fn evaluate<B: Backend, const D: usize>(y_true: Tensor<B, D>, y_pred: Tensor<B, D>) -> Self {
        let dice = scalar(dice_coef(y_true.clone(), y_pred.clone()));
        let p    = scalar(precision(y_true.clone(), y_pred.clone()));
        let r    = scalar(recall(y_true.clone(), y_pred.clone()));
        Self {
            loss:      -dice,
            dice_coef: dice,
            accuracy:  scalar(binary_accuracy(y_true, y_pred)),
            precision: p,
            recall:    r,
            f1_score:  2.0 * p * r / (p + r + EPSILON),
        }
    }

    /// Replace the loss with the value taken from the autodiff graph.
    pub fn with_loss(mut self, loss: f64) -> Self {
        self.loss = loss;
        self
    }
}

/// Sample-weighted running mean of batch metrics, reset each epoch.
#[derive(Debug, Default)]
pub struct MetricAverager {
    sum:     MetricSnapshot,
    samples: usize,
}

impl MetricAverager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, batch: &MetricSnapshot, batch_size: usize) {
        let w = batch_size as f64;
        self.sum.loss      += batch.loss * w;
        self.sum.dice_coef += batch.dice_coef * w;
        self.sum.accuracy  += batch.accuracy * w;
        self.sum.precision += batch.precision * w;
        self.sum.recall    += batch.recall * w;
        self.sum.f1_score  += batch.f1_score * w;
        self.samples       += batch_size;
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Weighted mean, or NaN everywhere when nothing was added.
    pub fn mean(&self) -> MetricSnapshot {
        if self.samples == 0 {
            return MetricSnapshot {
                loss:      f64::NAN,
                dice_coef: f64::NAN,
                accuracy:  f64::NAN,
                precision: f64::NAN,
                recall:    f64::NAN,
                f1_score:  f64::NAN,
            };
        }
        let n = self.samples as f64;
        MetricSnapshot {
            loss:      self.sum.loss / n,
            dice_coef: self.sum.dice_coef / n,
            accuracy:  self.sum.accuracy / n,
            precision: self.sum.precision / n,
            recall:    self.sum.recall / n,
            f1_score:  self.sum.f1_score / n,
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn t2(values: [[f32; 4]; 2]) -> Tensor<TestBackend, 2> {
        Tensor::from_floats(values, &Default::default())
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_identical_masks_give_perfect_dice() {
        let mask = t2([[1.0, 0.0, 1.0, 1.0], [0.0, 0.0, 1.0, 0.0]]);
        let dice = scalar(dice_coef(mask.clone(), mask));
        assert!(close(dice, 1.0));
    }

    #[test]
    fn test_dice_value_with_smoothing() {
        let y_true = t2([[1.0, 1.0, 0.0, 0.0], [0.0, 0.0, 0.0, 0.0]]);
        let y_pred = t2([[1.0, 0.0, 1.0, 0.0], [0.0, 0.0, 0.0, 0.0]]);
        // (2 * 1 + 1) / (2 + 2 + 1) = 0.6
        let dice = scalar(dice_coef(y_true, y_pred));
        assert!(close(dice, 0.6));
    }

    #[test]
    fn test_empty_masks_are_a_perfect_match() {
        let zeros = t2([[0.0; 4]; 2]);
        assert!(close(scalar(dice_coef(zeros.clone(), zeros)), 1.0));
    }

    #[test]
    fn test_loss_is_negated_dice() {
        let y_true = t2([[1.0, 0.0, 1.0, 0.0], [1.0, 1.0, 0.0, 0.0]]);
        let y_pred = t2([[0.8, 0.1, 0.4, 0.3], [0.9, 0.6, 0.2, 0.0]]);
        let dice = scalar(dice_coef(y_true.clone(), y_pred.clone()));
        let loss = scalar(dice_coef_loss(y_true, y_pred));
        assert_eq!(loss, -dice);
    }

    #[test]
    fn test_precision_recall_f1_are_consistent() {
        // 3 true positives, 1 false positive, 1 false negative
        let y_true = t2([[1.0, 1.0, 1.0, 1.0], [0.0, 0.0, 0.0, 0.0]]);
        let y_pred = t2([[0.9, 0.8, 0.7, 0.1], [0.9, 0.0, 0.2, 0.0]]);

        let p  = scalar(precision(y_true.clone(), y_pred.clone()));
        let r  = scalar(recall(y_true.clone(), y_pred.clone()));
        let f1 = scalar(f1_score(y_true, y_pred));

        assert!(close(p, 0.75));
        assert!(close(r, 0.75));
        assert!(close(f1, 2.0 * p * r / (p + r)));
    }

    #[test]
    fn test_binary_accuracy_rounds_predictions() {
        let y_true = t2([[1.0, 0.0, 1.0, 0.0], [1.0, 1.0, 0.0, 0.0]]);
        let y_pred = t2([[0.9, 0.2, 0.3, 0.1], [0.6, 0.7, 0.8, 0.0]]);
        // wrong at (0, 2) and (1, 2)
        assert!(close(scalar(binary_accuracy(y_true, y_pred)), 0.75));
    }

    #[test]
    fn test_no_predicted_positives_gives_zero_precision() {
        let y_true = t2([[1.0, 0.0, 0.0, 0.0], [0.0, 0.0, 0.0, 0.0]]);
        let y_pred = t2([[0.1; 4]; 2]);
        let snap   = MetricSnapshot::evaluate(y_true, y_pred);
        assert_eq!(snap.precision, 0.0);
        assert_eq!(snap.recall, 0.0);
        assert_eq!(snap.f1_score, 0.0);
        assert!(snap.loss.is_finite());
    }

    #[test]
    fn test_snapshot_matches_tensor_functions() {
        let y_true = t2([[1.0, 0.0, 1.0, 0.0], [1.0, 1.0, 0.0, 0.0]]);
        let y_pred = t2([[0.8, 0.1, 0.4, 0.3], [0.9, 0.6, 0.2, 0.0]]);
        let snap   = MetricSnapshot::evaluate(y_true.clone(), y_pred.clone());

        assert!(close(snap.dice_coef, scalar(dice_coef(y_true.clone(), y_pred.clone()))));
        assert!(close(snap.f1_score, scalar(f1_score(y_true, y_pred))));
        assert_eq!(snap.loss, -snap.dice_coef);
    }

    #[test]
    fn test_averager_weights_by_batch_size() {
        let mut avg = MetricAverager::new();
        avg.add(&MetricSnapshot { loss: -1.0, ..Default::default() }, 3);
        avg.add(&MetricSnapshot { loss: -0.0, ..Default::default() }, 1);
        assert_eq!(avg.samples(), 4);
        assert!(close(avg.mean().loss, -0.75));
    }

    #[test]
    fn test_empty_averager_is_nan() {
        assert!(MetricAverager::new().mean().loss.is_nan());
    }
}
