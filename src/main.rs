use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use clap::Parser;
use hf_hub::api::sync::Api;
use wd_tagger::{Tagger, DEFAULT_CHARACTER_THRESHOLD, DEFAULT_GENERAL_THRESHOLD};

use crate::image_processor::ImageProcessor;
use crate::progress_tracker::ProgressTracker;

mod image_processor;
mod logging;
mod progress_tracker;

const MODEL_FILE: &str = "model.onnx";
const TAGS_FILE: &str = "selected_tags.csv";

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[arg(short, long)]
    input_dir: String,

    #[arg(short, long)]
    output_dir: String,

    /// Local ONNX model, downloaded from --repo when omitted
    #[arg(short, long)]
    model_path: Option<String>,

    /// Local tag CSV, downloaded from --repo when omitted
    #[arg(short, long)]
    csv_path: Option<String>,

    /// Hugging Face repository holding model.onnx and selected_tags.csv
    #[arg(short, long, default_value = "SmilingWolf/wd-vit-tagger-v3")]
    repo: String,

    #[arg(short, long, default_value_t = 0)]
    device_id: i32,

    /// Images decoded and written per step
    #[arg(short, long, default_value_t = 1)]
    batch_size: usize,

    #[arg(long, default_value_t = DEFAULT_GENERAL_THRESHOLD)]
    general_threshold: f32,

    #[arg(long, action)]
    general_mcut_enabled: bool,

    #[arg(long, default_value_t = DEFAULT_CHARACTER_THRESHOLD)]
    character_threshold: f32,

    #[arg(long, action)]
    character_mcut_enabled: bool,

    #[arg(short, long, action)]
    verbose: bool,

    #[arg(long, action)]
    json_logs: bool,
}

impl Config {
    fn validate(&self) -> Result<()> {
        ensure!(
            Path::new(&self.input_dir).exists(),
            "Input directory does not exist"
        );
        if let Some(model_path) = &self.model_path {
            ensure!(Path::new(model_path).exists(), "Model path does not exist");
        }
        if let Some(csv_path) = &self.csv_path {
            ensure!(Path::new(csv_path).exists(), "CSV path does not exist");
        }
        ensure!(self.batch_size > 0, "Batch size must be positive");
        for (name, value) in [
            ("general", self.general_threshold),
            ("character", self.character_threshold),
        ] {
            ensure!(
                (0.0..=1.0).contains(&value),
                "The {name} threshold must be within [0, 1], got {value}"
            );
        }
        Ok(())
    }

    /// Local paths, fetching whatever is missing from the Hugging Face Hub.
    fn model_files(&self) -> Result<(PathBuf, PathBuf)> {
        if let (Some(model), Some(csv)) = (&self.model_path, &self.csv_path) {
            return Ok((model.into(), csv.into()));
        }

        let api = Api::new()?;
        let repo = api.model(self.repo.clone());
        let fetch = |local: &Option<String>, file: &str| -> Result<PathBuf> {
            match local {
                Some(path) => Ok(path.into()),
                None => {
                    tracing::info!("Fetching {file} from {}", self.repo);
                    repo.get(file)
                        .with_context(|| format!("downloading {file} from {}", self.repo))
                }
            }
        };
        Ok((fetch(&self.model_path, MODEL_FILE)?, fetch(&self.csv_path, TAGS_FILE)?))
    }
}

fn main() -> Result<()> {
    let config = Config::parse();
    logging::init(config.verbose, config.json_logs);
    config.validate()?;

    let (model_path, csv_path) = config.model_files()?;
    let mut model = Tagger::with_device(&model_path, &csv_path, config.device_id)
        .with_context(|| format!("loading {}", model_path.display()))?;
    let image_processor = ImageProcessor::new(&config);
    let progress_tracker = ProgressTracker::new(&config.input_dir, config.batch_size);
    progress_tracker.process(&image_processor, &mut model)?;
    model.destroy()?;
    Ok(())
}
