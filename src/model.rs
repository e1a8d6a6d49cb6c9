use std::path::Path;
use std::sync::Arc;

use image::{imageops, DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use ndarray::prelude::*;
use num_traits::AsPrimitive;

use crate::batch::{self, BatchSize};
use crate::engine::{InferenceEngine, OrtEngine, TensorBuffer};
use crate::error::{ConfigError, Result, TaggerError, TensorError};
use crate::labels::{Predictions, TagCatalog};
use crate::padding::Padding;
use crate::threshold::Thresholds;

/// Turns decoded images into the tagger's NHWC, BGR, 0-255 input layout.
pub struct ImagePreprocessor {
    target_size: u32,
}

/// 8-bit RGB view of any image. Alpha is premultiplied into the colour
/// channels, and 16-bit samples keep their high byte.
fn to_rgb8(image: &DynamicImage) -> RgbImage {
    match image {
        DynamicImage::ImageRgb8(rgb) => rgb.clone(),
        DynamicImage::ImageLuma8(_) => image.to_rgb8(),
        DynamicImage::ImageRgba8(_) | DynamicImage::ImageLumaA8(_) => {
            premultiply(&image.to_rgba8())
        }
        _ => {
            let wide = image.to_rgba16();
            let narrow = RgbaImage::from_fn(wide.width(), wide.height(), |x, y| {
                Rgba(wide.get_pixel(x, y).0.map(|v| (v >> 8) as u8))
            });
            premultiply(&narrow)
        }
    }
}

fn premultiply(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgba([r, g, b, a]) = *image.get_pixel(x, y);
        Rgb([r, g, b].map(|c| premultiply_channel(c, a)))
    })
}

/// `c * a` in 16-bit space, truncated back to 8 bits. Opaque pixels are unchanged.
fn premultiply_channel(c: u8, a: u8) -> u8 {
    let (c, a) = (u32::from(c) * 0x101, u32::from(a) * 0x101);
    ((c * a / 0xffff) >> 8) as u8
}

impl ImagePreprocessor {
    pub fn new(target_size: u32) -> Self {
        Self { target_size }
    }

    pub fn target_size(&self) -> u32 {
        self.target_size
    }

    /// Pad to a white square, resize with Lanczos3 when needed and emit
    /// `target_size * target_size * 3` values, rows first, pixels as B, G, R.
    pub fn preprocess(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let padded = to_rgb8(image).padding_square(Rgb([255, 255, 255]));
        let resized = match padded.width() != self.target_size {
            true => imageops::resize(
                &padded,
                self.target_size,
                self.target_size,
                imageops::FilterType::Lanczos3,
            ),
            false => padded,
        };

        let size: usize = self.target_size.as_();
        let view = ArrayView3::from_shape((size, size, 3), resized.as_raw().as_slice())
            .map_err(|e| TensorError::Input {
                shape: vec![1, size.as_(), size.as_(), 3],
                message: e.to_string(),
            })?;
        let tensor: Vec<f32> = view.slice(s![.., .., ..;-1]).iter().map(|&v| v.as_()).collect();

        Ok(tensor)
    }
}

/// A loaded tagging session: one engine, one tag catalog.
pub struct Tagger<E = OrtEngine> {
    engine: E,
    catalog: Arc<TagCatalog>,
    preprocessor: ImagePreprocessor,
    batch_size: BatchSize,
    output_width: usize,
}

impl Tagger<OrtEngine> {
    /// Load the ONNX model and tag CSV.
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(model_path: P, tags_path: Q) -> Result<Self> {
        Self::with_device(model_path, tags_path, 0)
    }

    /// Like [`Tagger::new`], running on the given CUDA device when available.
    pub fn with_device<P: AsRef<Path>, Q: AsRef<Path>>(
        model_path: P,
        tags_path: Q,
        device_id: i32,
    ) -> Result<Self> {
        let engine = OrtEngine::load(model_path, device_id)?;
        let catalog = TagCatalog::from_csv(tags_path)?;
        Self::with_engine(engine, Arc::new(catalog))
    }
}

fn shape_error(message: String) -> TaggerError {
    ConfigError::Shape { message }.into()
}

impl<E: InferenceEngine> Tagger<E> {
    /// Wrap an engine whose input is `[batch, size, size, 3]` and output is
    /// `[batch, catalog.len()]`.
    pub fn with_engine(engine: E, catalog: Arc<TagCatalog>) -> Result<Self> {
        let (batch_dim, target_size) = match *engine.input_shape() {
            [batch, h, w, 3] if h > 0 && h == w => (batch, h),
            ref shape => {
                return Err(shape_error(format!(
                    "expected input [batch, size, size, 3], got {shape:?}"
                )))
            }
        };
        let output_width = match *engine.output_shape() {
            [batch, width] if batch == batch_dim && width > 0 => width,
            ref shape => {
                return Err(shape_error(format!(
                    "expected output [{batch_dim}, tags], got {shape:?}"
                )))
            }
        };
        let batch_size = BatchSize::from_dim(batch_dim)?;
        let target_size =
            u32::try_from(target_size).map_err(|e| shape_error(format!("input size: {e}")))?;
        let output_width =
            usize::try_from(output_width).map_err(|e| shape_error(format!("output width: {e}")))?;
        if output_width != catalog.len() {
            return Err(shape_error(format!(
                "model predicts {output_width} tags but the catalog has {}",
                catalog.len()
            )));
        }

        tracing::info!(
            "Tagger ready (size: {target_size}, batch: {batch_size:?}, tags: {output_width})"
        );

        Ok(Self {
            engine,
            catalog,
            preprocessor: ImagePreprocessor::new(target_size),
            batch_size,
            output_width,
        })
    }

    pub fn catalog(&self) -> &Arc<TagCatalog> {
        &self.catalog
    }

    pub fn target_size(&self) -> u32 {
        self.preprocessor.target_size()
    }

    pub fn batch_size(&self) -> BatchSize {
        self.batch_size
    }

    /// Predict tags for every image, in input order.
    ///
    /// All tags scoring strictly above the thresholds are kept. With MCut
    /// enabled the threshold is derived per image from its own scores, and
    /// the character cutoff never drops below
    /// [`CHARACTER_MCUT_FLOOR`](crate::threshold::CHARACTER_MCUT_FLOOR).
    pub fn run(
        &mut self,
        images: &[DynamicImage],
        general_threshold: f32,
        character_threshold: f32,
        general_mcut_enabled: bool,
        character_mcut_enabled: bool,
    ) -> Result<Vec<Predictions>> {
        self.run_with(
            images,
            &Thresholds {
                general: general_threshold,
                character: character_threshold,
                general_mcut: general_mcut_enabled,
                character_mcut: character_mcut_enabled,
            },
        )
    }

    pub fn run_with(
        &mut self,
        images: &[DynamicImage],
        thresholds: &Thresholds,
    ) -> Result<Vec<Predictions>> {
        let mut predictions = Vec::with_capacity(images.len());

        for (i, chunk) in batch::plan(images, self.batch_size).into_iter().enumerate() {
            tracing::debug!("Processing chunk {i} ({} images)", chunk.len());
            let output = self.infer_chunk(chunk)?;
            predictions.extend(
                output
                    .data()
                    .chunks_exact(self.output_width)
                    .take(chunk.len())
                    .map(|preds| self.catalog.analyze(preds, thresholds)),
            );
        }

        Ok(predictions)
    }

    fn infer_chunk(&mut self, chunk: &[DynamicImage]) -> Result<TensorBuffer> {
        let size: usize = self.target_size().as_();
        let call_len = self.batch_size.call_len(chunk.len());
        let mut data = Vec::with_capacity(call_len * size * size * 3);
        for image in chunk {
            data.extend(self.preprocessor.preprocess(image)?);
        }
        // blank white slots fill a short final chunk; their outputs are dropped
        data.resize(call_len * size * size * 3, 255.0);

        let in_shape = batch::resolve_shape(self.engine.input_shape(), call_len);
        let input = TensorBuffer::new(in_shape.clone(), data).map_err(|message| {
            TensorError::Input {
                shape: in_shape,
                message,
            }
        })?;

        let out_shape = batch::resolve_shape(self.engine.output_shape(), call_len);
        let output = self.engine.infer(input)?;
        if output.shape() != out_shape.as_slice() {
            return Err(TensorError::Output {
                message: format!("engine returned {:?}", output.shape()),
                shape: out_shape,
            }
            .into());
        }

        Ok(output)
    }

    /// Release the engine. The session cannot be used afterwards.
    pub fn destroy(self) -> Result<()> {
        self.engine.release()
    }
}
