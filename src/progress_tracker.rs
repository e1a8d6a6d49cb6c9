use std::path::{Path, PathBuf};
use std::thread;

use anyhow::Result;
use image::ImageFormat;
use indicatif::{ProgressBar, ProgressStyle};
use walkdir::WalkDir;
use wd_tagger::Tagger;

use crate::image_processor::ImageProcessor;

/// Decoded batches waiting for the model.
const PREFETCH: usize = 2;

pub struct ProgressTracker {
    image_paths: Vec<Vec<PathBuf>>,
}

impl ProgressTracker {
    pub fn new<P: AsRef<Path>>(input_dir: P, batch_size: usize) -> Self {
        let image_paths: Vec<_> = WalkDir::new(input_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && ImageFormat::from_path(e.path()).is_ok())
            .map(|e| e.into_path())
            .collect();
        tracing::info!("Found {} images", image_paths.len());
        let batched_paths: Vec<_> = image_paths.chunks(batch_size).map(|c| c.to_vec()).collect();

        Self {
            image_paths: batched_paths,
        }
    }

    /// Decode on a worker thread while the model runs on this one.
    pub fn process(self, processor: &ImageProcessor, model: &mut Tagger) -> Result<()> {
        let style = ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-");
        let progress = ProgressBar::new(self.image_paths.len() as u64).with_style(style);

        let (sender, receiver) = crossbeam_channel::bounded(PREFETCH);
        thread::scope(|s| {
            let batches = &self.image_paths;
            s.spawn(move || {
                for paths in batches {
                    if sender.send(processor.load(paths)).is_err() {
                        // consumer stopped after an error
                        break;
                    }
                }
            });

            let result = receiver.iter().try_for_each(|batch| {
                processor.process(batch, model)?;
                progress.inc(1);
                anyhow::Ok(())
            });
            drop(receiver);
            result
        })?;

        progress.finish();
        Ok(())
    }
}
