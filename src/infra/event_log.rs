// ============================================================
// Layer 6 — TensorBoard Event Log
// ============================================================
// Writes every CSV column as a TensorBoard scalar, one step per
// epoch, so a run can be followed with `tensorboard --logdir`.
//
// Output directory: <output_dir>/logs/fractalunet
//
// The directory is shared by 8-bit and 16-bit runs; each run
// opens its own `events.out.tfevents.*` file inside it.

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tensorboard_rs::summary_writer::SummaryWriter;

use crate::infra::metrics::EpochMetrics;

pub struct EventLogger {
    dir:    PathBuf,
    writer: SummaryWriter,
}

impl EventLogger {
    /// Open a new event file under `<output_dir>/logs/fractalunet`.
    pub fn create(output_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = output_dir.as_ref().join("logs").join("fractalunet");
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create event log directory '{}'", dir.display()))?;

        let writer = SummaryWriter::new(&dir);
        tracing::debug!("Writing TensorBoard events to '{}'", dir.display());
        Ok(Self { dir, writer })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Add one scalar per column at step `epoch` and flush to disk.
    pub fn log(&mut self, m: &EpochMetrics) {
        for (tag, value) in m.scalars() {
            self.writer.add_scalar(tag, value as f32, m.epoch);
        }
        self.writer.flush();
    }
}

/// Event files written into `dir` so far.
#[cfg(test)]
pub(crate) fn event_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Cannot read directory '{}'", dir.display()))?
    {
        let path = entry?.path();
        let is_event = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("events.out.tfevents"));
        if is_event {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
