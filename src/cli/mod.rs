// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `train`   — fits the network and keeps the best weights
//   2. `predict` — loads those weights and segments the test set
//   3. `run`     — both, back to back

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, TrainArgs};

use crate::application::{
    predict_use_case::{PredictConfig, PredictOutcome, PredictUseCase},
    train_use_case::{TrainConfig, TrainUseCase},
};

#[derive(Parser, Debug)]
#[command(
    name = "fractal-unet",
    version = "0.1.0",
    about = "Train a stacked dual U-Net on greyscale images and masks, then predict masks."
)]
pub struct Cli {
    /// The subcommand to run (train, predict or run)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)   => run_train(args).map(|_| ()),
            Commands::Predict(args) => run_predict(args.into()),
            Commands::Run(args)     => {
                let config = run_train(args)?;
                run_predict(PredictConfig::from(&config))
            }
        }
    }
}

/// Handles the `train` subcommand and returns the config it ran with.
fn run_train(args: TrainArgs) -> Result<TrainConfig> {
    let config: TrainConfig = args.into();
    tracing::info!(
        "Starting {}-bit training on images in: {}",
        config.bit_depth,
        config.data_dir.display()
    );

    println!("{}", "-".repeat(30));
    println!("Loading and preprocessing train data...");
    println!("{}", "-".repeat(30));

    let use_case = TrainUseCase::new(config);
    let outcome  = use_case.execute()?;
    tracing::info!(
        "Training statistics: mean={:.4}, std={:.4}",
        outcome.stats.mean,
        outcome.stats.std
    );

    println!(
        "Training complete after {} epochs (best monitored loss {:.6}, {} LR cuts{}).",
        outcome.summary.epochs_run,
        outcome.summary.best_monitor,
        outcome.summary.lr_cuts,
        if outcome.summary.stopped_early { ", stopped early" } else { "" }
    );
    Ok(use_case.config().clone())
}

/// Handles the `predict` subcommand.
fn run_predict(config: PredictConfig) -> Result<()> {
    println!("{}", "-".repeat(30));
    println!("Loading and preprocessing test data...");
    println!("{}", "-".repeat(30));

    let outcome: PredictOutcome = PredictUseCase::new(config).execute()?;
    match outcome.pred_dir {
        Some(dir) => println!("Saved {} predicted masks to {}", outcome.written, dir.display()),
        None      => println!("Predicted {} masks (not written for this bit depth)", outcome.predicted),
    }
    Ok(())
}
