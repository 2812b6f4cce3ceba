// ============================================================
// Layer 4 — PNG Directory Loader
// ============================================================
// Loads greyscale images and masks with the `image` crate.
//
// Expected layout:
//
//   <data_dir>/
//     train/
//       0001.png        ← input image (8 or 16 bit greyscale)
//       0001_mask.png   ← binary mask, 0 or 255
//       ...
//     test/
//       0101.png
//       ...
//
// Images are decoded at the requested bit depth, so a 16-bit
// source keeps its full 0..=65535 range. Anything that is not
// already rows x cols is resized: bilinear for images, nearest
// neighbour for masks so they stay binary.

use anyhow::{bail, Context, Result};
use image::{imageops::FilterType, ImageBuffer, Pixel};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::{
    bit_depth::BitDepth,
    image_record::{ImageRecord, LabelledImage},
    traits::ImageSource,
};

const MASK_SUFFIX: &str = "_mask";

/// Loads training pairs and test images from a directory of PNGs.
/// Implements the ImageSource trait from Layer 3.
pub struct PngDirectoryLoader {
    dir:       PathBuf,
    bit_depth: BitDepth,
    rows:      usize,
    cols:      usize,
}

impl PngDirectoryLoader {
    pub fn new(dir: impl Into<PathBuf>, bit_depth: BitDepth, rows: usize, cols: usize) -> Self {
        Self { dir: dir.into(), bit_depth, rows, cols }
    }

    /// Sorted list of `(stem, path)` for every non-mask PNG in `sub`.
    fn list_images(&self, sub: &str) -> Result<Vec<(String, PathBuf)>> {
        let dir = self.dir.join(sub);
        if !dir.is_dir() {
            bail!("image directory '{}' does not exist", dir.display());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)
            .with_context(|| format!("Cannot read directory '{}'", dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("png") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                tracing::warn!("Skipping '{}': file name is not UTF-8", path.display());
                continue;
            };
            if stem.ends_with(MASK_SUFFIX) {
                continue;
            }
            entries.push((stem.to_string(), path));
        }

        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    fn read_image(&self, id: &str, path: &Path) -> Result<ImageRecord> {
        let img = image::open(path)
            .with_context(|| format!("Cannot decode image '{}'", path.display()))?;

        let pixels: Vec<f32> = match self.bit_depth {
            BitDepth::Eight => fit(img.to_luma8(), self.rows, self.cols, FilterType::Triangle)
                .into_raw()
                .into_iter()
                .map(f32::from)
                .collect(),
            BitDepth::Sixteen => fit(img.to_luma16(), self.rows, self.cols, FilterType::Triangle)
                .into_raw()
                .into_iter()
                .map(f32::from)
                .collect(),
        };

        Ok(ImageRecord::new(id, self.rows, self.cols, pixels))
    }

    fn read_mask(&self, id: &str, path: &Path) -> Result<ImageRecord> {
        let img = image::open(path)
            .with_context(|| format!("Cannot decode mask '{}'", path.display()))?;
        let pixels = fit(img.to_luma8(), self.rows, self.cols, FilterType::Nearest)
            .into_raw()
            .into_iter()
            .map(f32::from)
            .collect();
        Ok(ImageRecord::new(id, self.rows, self.cols, pixels))
    }
}

impl ImageSource for PngDirectoryLoader {
    fn load_train(&self) -> Result<Vec<LabelledImage>> {
        let dir   = self.dir.join("train");
        let mut pairs = Vec::new();

        for (id, path) in self.list_images("train")? {
            let mask_path = dir.join(format!("{id}{MASK_SUFFIX}.png"));
            if !mask_path.exists() {
                // An unlabelled image is skipped, not fatal
                tracing::warn!("Skipping '{}': no mask at '{}'", path.display(), mask_path.display());
                continue;
            }
            let image = self.read_image(&id, &path)?;
            let mask  = self.read_mask(&id, &mask_path)?;
            pairs.push(LabelledImage { image, mask });
        }

        tracing::info!(
            "Loaded {} training pairs ({}-bit) from '{}'",
            pairs.len(),
            self.bit_depth,
            dir.display()
        );
        Ok(pairs)
    }

    fn load_test(&self) -> Result<Vec<ImageRecord>> {
        let images = self
            .list_images("test")?
            .into_iter()
            .map(|(id, path)| self.read_image(&id, &path))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!("Loaded {} test images ({}-bit)", images.len(), self.bit_depth);
        Ok(images)
    }
}

/// Resize to rows x cols unless the image already has that size.
fn fit<P>(
    img:    ImageBuffer<P, Vec<P::Subpixel>>,
    rows:   usize,
    cols:   usize,
    filter: FilterType,
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + 'static,
    P::Subpixel: 'static,
{
    if img.width() as usize == cols && img.height() as usize == rows {
        img
    } else {
        image::imageops::resize(&img, cols as u32, rows as u32, filter)
    }
}
