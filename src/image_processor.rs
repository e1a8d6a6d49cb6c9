use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use image::DynamicImage;
use rayon::prelude::*;
use wd_tagger::{Tagger, Thresholds};

use crate::Config;

pub type DecodedBatch = Vec<(PathBuf, DynamicImage)>;

pub struct ImageProcessor {
    input_dir: PathBuf,
    output_dir: PathBuf,
    thresholds: Thresholds,
}

impl ImageProcessor {
    pub fn new(config: &Config) -> Self {
        Self {
            input_dir: Path::new(&config.input_dir).to_path_buf(),
            output_dir: Path::new(&config.output_dir).to_path_buf(),
            thresholds: Thresholds {
                general: config.general_threshold,
                character: config.character_threshold,
                general_mcut: config.general_mcut_enabled,
                character_mcut: config.character_mcut_enabled,
            },
        }
    }

    /// Decode a batch in parallel. Files that fail to decode are skipped.
    pub fn load(&self, paths: &[PathBuf]) -> DecodedBatch {
        paths
            .par_iter()
            .filter_map(|p| match image::open(p) {
                Ok(img) => Some((p.clone(), img)),
                Err(e) => {
                    tracing::warn!("Skipping {}: {e}", p.display());
                    None
                }
            })
            .collect()
    }

    pub fn process(&self, batch: DecodedBatch, model: &mut Tagger) -> Result<()> {
        let (paths, images): (Vec<_>, Vec<_>) = batch.into_iter().unzip();
        let labels = model
            .run_with(&images, &self.thresholds)
            .with_context(|| format!("tagging {} images", images.len()))?;

        for (path, predictions) in paths.iter().zip(&labels) {
            let output_file = self.output_path(path)?;
            let tags: Vec<_> = predictions.tags().into_iter().map(|(t, _)| t).collect();
            fs::write(&output_file, tags.join(", "))
                .with_context(|| output_file.display().to_string())?;
            tracing::debug!("{} -> {} tags", path.display(), tags.len());
        }
        Ok(())
    }

    /// `<output_dir>/<relative dir>/<stem>.txt`, creating the directory.
    fn output_path(&self, path: &Path) -> Result<PathBuf> {
        let relative = path
            .strip_prefix(&self.input_dir)
            .with_context(|| path.display().to_string())?;
        let output_subdir = self
            .output_dir
            .join(relative.parent().unwrap_or(Path::new("")));
        fs::create_dir_all(&output_subdir).with_context(|| output_subdir.display().to_string())?;

        let filename = path
            .file_stem()
            .with_context(|| format!("{} has no file name", path.display()))?
            .to_string_lossy();
        Ok(output_subdir.join(format!("{}.txt", filename)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor(input: &Path, output: &Path) -> ImageProcessor {
        ImageProcessor {
            input_dir: input.to_path_buf(),
            output_dir: output.to_path_buf(),
            thresholds: Thresholds::default(),
        }
    }

    #[test]
    fn test_output_path_mirrors_tree() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let processor = processor(input.path(), output.path());

        let image = input.path().join("a").join("b").join("cat.png");
        let txt = processor.output_path(&image).unwrap();

        assert_eq!(txt, output.path().join("a").join("b").join("cat.txt"));
        assert!(output.path().join("a").join("b").is_dir());
    }

    #[test]
    fn test_output_path_outside_input_dir() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let processor = processor(input.path(), output.path());

        assert!(processor.output_path(Path::new("/elsewhere/x.png")).is_err());
    }

    #[test]
    fn test_load_skips_unreadable() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let processor = processor(input.path(), output.path());

        let broken = input.path().join("broken.png");
        fs::write(&broken, b"not an image").unwrap();
        assert!(processor.load(&[broken]).is_empty());
    }
}
