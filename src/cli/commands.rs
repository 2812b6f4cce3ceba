// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `train`, `predict` and `run`
// and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, BitDepth)

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::{predict_use_case::PredictConfig, train_use_case::TrainConfig};
use crate::domain::bit_depth::BitDepth;

/// The top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the network on `<data-dir>/train`
    Train(TrainArgs),

    /// Predict masks for `<data-dir>/test` with saved weights
    Predict(PredictArgs),

    /// Train, then predict with the best weights
    Run(TrainArgs),
}

/// `--bit 8` or `--bit 16`
fn parse_bit_depth(s: &str) -> Result<BitDepth, String> {
    let bits: u8 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    BitDepth::try_from(bits).map_err(|e| e.to_string())
}

/// All arguments for the `train` and `run` commands.
/// Each field becomes a --flag on the command line.
#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// Bit depth of the input images: 8 or 16
    #[arg(long = "bit", value_parser = parse_bit_depth)]
    pub bit_depth: BitDepth,

    /// Directory holding `train/` and `test/`
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Where weights, artefact, CSV log and predictions are written
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Image height fed to the network; must divide by 2^depth
    #[arg(long, default_value_t = 512)]
    pub img_rows: usize,

    /// Image width fed to the network; must divide by 2^depth
    #[arg(long, default_value_t = 512)]
    pub img_cols: usize,

    #[arg(long, default_value_t = 4)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 500)]
    pub epochs: usize,

    /// Filters at the top level, doubled at every level below
    #[arg(long, default_value_t = 16)]
    pub base_filters: usize,

    /// Number of max-pool steps in each U
    #[arg(long, default_value_t = 4)]
    pub depth: usize,

    /// Fraction of samples held out (from the end) for validation
    #[arg(long, default_value_t = 0.2)]
    pub validation_split: f64,

    /// Seed for the per-epoch training shuffle
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Lower bound of the cyclic learning rate
    #[arg(long, default_value_t = 1e-5)]
    pub base_lr: f64,

    /// Upper bound of the cyclic learning rate
    #[arg(long, default_value_t = 6e-5)]
    pub max_lr: f64,

    /// Batch iterations in half a learning-rate cycle
    #[arg(long, default_value_t = 2000.0)]
    pub lr_step_size: f64,

    /// Epochs without improvement before training stops
    #[arg(long, default_value_t = 30)]
    pub early_stop_patience: usize,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// Settings without a flag keep their TrainConfig default.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            data_dir:            a.data_dir,
            output_dir:          a.output_dir,
            bit_depth:           a.bit_depth,
            img_rows:            a.img_rows,
            img_cols:            a.img_cols,
            batch_size:          a.batch_size,
            epochs:              a.epochs,
            base_filters:        a.base_filters,
            depth:               a.depth,
            validation_split:    a.validation_split,
            seed:                a.seed,
            base_lr:             a.base_lr,
            max_lr:              a.max_lr,
            lr_step_size:        a.lr_step_size,
            early_stop_patience: a.early_stop_patience,
            ..TrainConfig::default()
        }
    }
}

/// All arguments for the `predict` command
#[derive(Args, Debug, Clone)]
pub struct PredictArgs {
    /// Bit depth the weights were trained for: 8 or 16
    #[arg(long = "bit", value_parser = parse_bit_depth)]
    pub bit_depth: BitDepth,

    /// Directory holding `test/`
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Directory the training run wrote its weights to
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    #[arg(long, default_value_t = 4)]
    pub batch_size: usize,
}

impl From<PredictArgs> for PredictConfig {
    fn from(a: PredictArgs) -> Self {
        PredictConfig {
            data_dir:   a.data_dir,
            output_dir: a.output_dir,
            bit_depth:  a.bit_depth,
            batch_size: a.batch_size,
        }
    }
}

impl From<&TrainConfig> for PredictConfig {
    fn from(c: &TrainConfig) -> Self {
        PredictConfig {
            data_dir:   c.data_dir.clone(),
            output_dir: c.output_dir.clone(),
            bit_depth:  c.bit_depth,
            batch_size: c.batch_size,
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_bit_flag_parses_both_depths() {
        assert_eq!(parse_bit_depth("8").unwrap(), BitDepth::Eight);
        assert_eq!(parse_bit_depth("16").unwrap(), BitDepth::Sixteen);
        assert!(parse_bit_depth("12").is_err());
        assert!(parse_bit_depth("eight").is_err());
    }

    #[test]
    fn test_train_args_fill_config() {
        let cli = Cli::try_parse_from(["fractal-unet", "train", "--bit", "16", "--epochs", "3"]).unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: TrainConfig = args.into();
        assert_eq!(cfg.bit_depth, BitDepth::Sixteen);
        assert_eq!(cfg.epochs, 3);
        assert_eq!(cfg.img_rows, 512);
        assert_eq!(cfg.plateau_patience, TrainConfig::default().plateau_patience);
    }

    #[test]
    fn test_bit_is_required() {
        assert!(Cli::try_parse_from(["fractal-unet", "predict"]).is_err());
    }
}
