//! Inference backends.
//!
//! The tagger only needs "flat buffer + shape in, flat buffer + shape out";
//! [`OrtEngine`] provides that on top of ONNX Runtime.

use std::path::Path;

#[cfg(feature = "cuda")]
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::Session;
use ort::value::{Tensor, ValueType};

use crate::error::{ConfigError, Result, TaggerError, TensorError};

/// A flat `f32` buffer with a concrete shape.
#[derive(Clone, Debug, PartialEq)]
pub struct TensorBuffer {
    shape: Vec<i64>,
    data: Vec<f32>,
}

impl TensorBuffer {
    /// Fails when the shape has a non-positive dimension or does not match
    /// the data length.
    pub fn new(shape: Vec<i64>, data: Vec<f32>) -> std::result::Result<Self, String> {
        if let Some(dim) = shape.iter().find(|&&d| d <= 0) {
            return Err(format!("unresolved dimension {dim} in {shape:?}"));
        }
        let expected: i64 = shape.iter().product();
        if usize::try_from(expected).ok() != Some(data.len()) {
            return Err(format!(
                "shape {shape:?} needs {expected} values, got {}",
                data.len()
            ));
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> &[i64] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_parts(self) -> (Vec<i64>, Vec<f32>) {
        (self.shape, self.data)
    }
}

/// A synchronous model with one input and one output tensor.
///
/// Shapes may use `-1` in the leading (batch) dimension.
pub trait InferenceEngine {
    /// Declared input shape, NHWC.
    fn input_shape(&self) -> &[i64];

    /// Declared output shape, `[batch, tags]`.
    fn output_shape(&self) -> &[i64];

    fn infer(&mut self, input: TensorBuffer) -> Result<TensorBuffer>;

    /// Release backend resources. Called once, by [`Tagger::destroy`](crate::Tagger::destroy).
    fn release(self) -> Result<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// ONNX Runtime backed engine.
pub struct OrtEngine {
    session: Session,
    input_name: String,
    output_name: String,
    input_shape: Vec<i64>,
    output_shape: Vec<i64>,
}

fn tensor_shape(value_type: &ValueType) -> Option<Vec<i64>> {
    match value_type {
        ValueType::Tensor { shape, .. } => Some(shape.iter().copied().collect()),
        _ => None,
    }
}

impl OrtEngine {
    /// Load a model. With the `cuda` feature the CUDA execution provider is
    /// registered on `device_id`; ONNX Runtime falls back to CPU without it.
    pub fn load<P: AsRef<Path>>(model_path: P, device_id: i32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(ConfigError::ModelNotFound(model_path.to_path_buf()).into());
        }
        let model_error = |message: String| ConfigError::Model {
            path: model_path.to_path_buf(),
            message,
        };

        let builder = Session::builder()
            .map_err(|e| model_error(format!("Failed to create ONNX session builder: {e}")))?;
        #[cfg(feature = "cuda")]
        let builder = builder
            .with_execution_providers([CUDAExecutionProvider::default()
                .with_device_id(device_id)
                .build()])
            .map_err(|e| model_error(format!("Failed to register execution provider: {e}")))?;
        #[cfg(not(feature = "cuda"))]
        tracing::debug!("Built without CUDA support, ignoring device id {device_id}");

        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| model_error(format!("Failed to load ONNX model: {e}")))?;

        let input = session
            .inputs()
            .first()
            .ok_or_else(|| model_error("Model has no inputs".to_string()))?;
        let output = session
            .outputs()
            .first()
            .ok_or_else(|| model_error("Model has no outputs".to_string()))?;

        let input_name = input.name().to_string();
        let output_name = output.name().to_string();
        let input_shape = tensor_shape(input.dtype())
            .ok_or_else(|| model_error(format!("Input {input_name:?} is not a tensor")))?;
        let output_shape = tensor_shape(output.dtype())
            .ok_or_else(|| model_error(format!("Output {output_name:?} is not a tensor")))?;

        tracing::debug!(
            "Loaded model from {:?} (input: {:?} {:?}, output: {:?} {:?})",
            model_path,
            input_name,
            input_shape,
            output_name,
            output_shape,
        );

        Ok(Self {
            session,
            input_name,
            output_name,
            input_shape,
            output_shape,
        })
    }
}

impl InferenceEngine for OrtEngine {
    fn input_shape(&self) -> &[i64] {
        &self.input_shape
    }

    fn output_shape(&self) -> &[i64] {
        &self.output_shape
    }

    fn infer(&mut self, input: TensorBuffer) -> Result<TensorBuffer> {
        let (shape, data) = input.into_parts();
        let value = Tensor::from_array((shape.clone(), data)).map_err(|e| TensorError::Input {
            shape,
            message: e.to_string(),
        })?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => value])
            .map_err(TaggerError::inference)?;

        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| TensorError::Output {
                shape: self.output_shape.clone(),
                message: e.to_string(),
            })?;
        let shape: Vec<i64> = shape.iter().copied().collect();

        TensorBuffer::new(shape.clone(), data.to_vec())
            .map_err(|message| TensorError::Output { shape, message }.into())
    }

    /// Dropping an ort session frees it natively and has no failure path.
    fn release(self) -> Result<()> {
        drop(self.session);
        tracing::debug!("Released ONNX session");
        Ok(())
    }
}
