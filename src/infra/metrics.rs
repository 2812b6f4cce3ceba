// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training metrics to a CSV file after each epoch.
//
// Output file: <output_dir>/log_fractalunet_<bit>.csv
//
// Columns are sorted by name after the epoch index, and the
// epoch index starts at 0:
//
//   epoch,acc,dice_coef,f1score,loss,lr,precision,recall,
//   val_acc,val_dice_coef,val_f1score,val_loss,val_precision,val_recall
//
// How to read the metrics:
//   - loss is -dice, so it falls towards -1 as the masks improve
//   - if val_loss rises while loss keeps falling → overfitting
//   - lr is the rate the optimiser holds at epoch end, before any
//     plateau cut (the cycle overwrites a cut after one batch)
//
// A new run truncates the file and starts a fresh log.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::bit_depth::BitDepth;
use crate::ml::metrics::MetricSnapshot;

pub const CSV_HEADER: &str = "epoch,acc,dice_coef,f1score,loss,lr,precision,recall,\
val_acc,val_dice_coef,val_f1score,val_loss,val_precision,val_recall";

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone)]
pub struct EpochMetrics {
    /// The epoch index (starts at 0)
    pub epoch: usize,

    /// Learning rate held by the optimiser when the epoch ended
    pub lr: f64,

    /// Sample-weighted means over the training batches
    pub train: MetricSnapshot,

    /// Sample-weighted means over the validation batches
    pub val: MetricSnapshot,
}

impl EpochMetrics {
    pub fn new(epoch: usize, lr: f64, train: MetricSnapshot, val: MetricSnapshot) -> Self {
        Self { epoch, lr, train, val }
    }

    /// Every logged value with its column name, in CSV order after `epoch`.
    pub fn scalars(&self) -> [(&'static str, f64); 13] {
        let (t, v) = (&self.train, &self.val);
        [
            ("acc",           t.accuracy),
            ("dice_coef",     t.dice_coef),
            ("f1score",       t.f1_score),
            ("loss",          t.loss),
            ("lr",            self.lr),
            ("precision",     t.precision),
            ("recall",        t.recall),
            ("val_acc",       v.accuracy),
            ("val_dice_coef", v.dice_coef),
            ("val_f1score",   v.f1_score),
            ("val_loss",      v.loss),
            ("val_precision", v.precision),
            ("val_recall",    v.recall),
        ]
    }

    fn csv_row(&self) -> String {
        let mut row = self.epoch.to_string();
        for (name, value) in self.scalars() {
            let cell = if name == "lr" { format!("{value:e}") } else { format!("{value:.6}") };
            row.push(',');
            row.push_str(&cell);
        }
        row
    }
}

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    /// Full path to the CSV file
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create the log for one bit depth, overwriting any previous run.
    pub fn create(dir: impl AsRef<Path>, bit: BitDepth) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let csv_path = dir.join(format!("log_fractalunet_{bit}.csv"));
        let mut f = fs::File::create(&csv_path)
            .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
        writeln!(f, "{CSV_HEADER}")?;
        tracing::debug!("Created metrics CSV: '{}'", csv_path.display());

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row in the CSV.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot append to '{}'", self.csv_path.display()))?;

        writeln!(f, "{}", m.csv_row())?;

        tracing::debug!(
            "Logged epoch {} metrics: loss={:.4}, val_loss={:.4}",
            m.epoch,
            m.train.loss,
            m.val.loss,
        );

        Ok(())
    }

    /// Return the path to the metrics CSV file
    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(loss: f64) -> MetricSnapshot {
        MetricSnapshot {
            loss,
            dice_coef: -loss,
            accuracy:  0.9,
            precision: 0.8,
            recall:    0.7,
            f1_score:  0.75,
        }
    }

    #[test]
    fn test_writes_header_then_rows() {
        let tmp    = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::create(tmp.path(), BitDepth::Eight).unwrap();
        logger.log(&EpochMetrics::new(0, 1e-5, snapshot(-0.5), snapshot(-0.4))).unwrap();
        logger.log(&EpochMetrics::new(1, 2e-5, snapshot(-0.6), snapshot(-0.45))).unwrap();

        assert!(logger.csv_path().ends_with("log_fractalunet_8.csv"));
        let text  = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].starts_with("0,0.900000,0.500000,0.750000,-0.500000,1e-5,"));
        assert_eq!(lines[2].split(',').count(), lines[0].split(',').count());
    }

    #[test]
    fn test_header_matches_scalar_names() {
        let m     = EpochMetrics::new(0, 1e-5, snapshot(-0.5), snapshot(-0.4));
        let names: Vec<&str> = std::iter::once("epoch")
            .chain(m.scalars().iter().map(|(name, _)| *name))
            .collect();
        assert_eq!(names.join(","), CSV_HEADER);
    }

    #[test]
    fn test_new_run_truncates_old_log() {
        let tmp = tempfile::tempdir().unwrap();
        let first = MetricsLogger::create(tmp.path(), BitDepth::Sixteen).unwrap();
        first.log(&EpochMetrics::new(0, 1e-5, snapshot(-0.1), snapshot(-0.1))).unwrap();

        let second = MetricsLogger::create(tmp.path(), BitDepth::Sixteen).unwrap();
        let text   = fs::read_to_string(second.csv_path()).unwrap();
        assert_eq!(text.lines().count(), 1);
    }
}
