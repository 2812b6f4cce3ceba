// ============================================================
// Layer 3 — Bit Depth
// ============================================================
// The pipeline runs once per source bit depth. Every file it
// produces (weights, CSV log, prediction directory) carries
// the numeric value, e.g. `weights_fractalunet_8.mpk`.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitDepth {
    Eight,
    Sixteen,
}

impl BitDepth {
    /// Numeric value used in artefact names and log lines
    pub fn bits(self) -> u8 {
        match self {
            BitDepth::Eight   => 8,
            BitDepth::Sixteen => 16,
        }
    }

    /// Only the 8-bit run writes its predictions out as PNG files
    pub fn writes_predictions(self) -> bool {
        self == BitDepth::Eight
    }
}

impl TryFrom<u8> for BitDepth {
    type Error = anyhow::Error;

    fn try_from(bits: u8) -> Result<Self> {
        match bits {
            8  => Ok(BitDepth::Eight),
            16 => Ok(BitDepth::Sixteen),
            other => bail!("unsupported bit depth {other}: expected 8 or 16"),
        }
    }
}

impl fmt::Display for BitDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}
