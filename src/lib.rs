//! Pre- and post-processing for WaifuDiffusion-style image taggers.
//!
//! Images are padded to a white square, resized and fed to the model in
//! chunks that respect its batch dimension. Each output vector is split into
//! rating, general and character tags using fixed or MCut thresholds.
//!
//! ```no_run
//! use wd_tagger::{Tagger, DEFAULT_CHARACTER_THRESHOLD, DEFAULT_GENERAL_THRESHOLD};
//!
//! # fn main() -> wd_tagger::Result<()> {
//! let mut tagger = Tagger::new("model.onnx", "selected_tags.csv")?;
//! let image = image::DynamicImage::new_rgb8(512, 768);
//! let predictions = tagger.run(
//!     &[image],
//!     DEFAULT_GENERAL_THRESHOLD,
//!     DEFAULT_CHARACTER_THRESHOLD,
//!     false,
//!     false,
//! )?;
//! println!("{:?}", predictions[0].general_names());
//! tagger.destroy()?;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod engine;
pub mod error;
pub mod labels;
pub mod model;
mod padding;
pub mod threshold;

pub use batch::BatchSize;
pub use engine::{InferenceEngine, OrtEngine, TensorBuffer};
pub use error::{ConfigError, Result, TaggerError, TensorError};
pub use labels::{Category, Predictions, TagCatalog};
pub use model::{ImagePreprocessor, Tagger};
pub use threshold::{
    mcut_threshold, Thresholds, CHARACTER_MCUT_FLOOR, DEFAULT_CHARACTER_THRESHOLD,
    DEFAULT_GENERAL_THRESHOLD,
};
