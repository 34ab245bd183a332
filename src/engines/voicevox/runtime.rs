//! The inference boundary: named tensors in, named tensors out.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use ndarray::ArrayD;

use crate::error::Result;

/// Model groups inside a voice model file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Domain {
    Talk,
    SingingTeacher,
    FrameDecode,
}

impl Domain {
    pub fn operations(self) -> &'static [Operation] {
        match self {
            Self::Talk => &[
                Operation::PredictDuration,
                Operation::PredictIntonation,
                Operation::Decode,
            ],
            Self::SingingTeacher => &[
                Operation::PredictSingConsonantLength,
                Operation::PredictSingF0,
                Operation::PredictSingVolume,
            ],
            Self::FrameDecode => &[Operation::SfDecode],
        }
    }

    /// Key of the domain in `manifest.json`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Talk => "talk",
            Self::SingingTeacher => "singing_teacher",
            Self::FrameDecode => "frame_decode",
        }
    }
}

/// One inference entry point of a voice model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    PredictDuration,
    PredictIntonation,
    Decode,
    PredictSingConsonantLength,
    PredictSingF0,
    PredictSingVolume,
    SfDecode,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Self::PredictDuration => "predict_duration",
            Self::PredictIntonation => "predict_intonation",
            Self::Decode => "decode",
            Self::PredictSingConsonantLength => "predict_sing_consonant_length",
            Self::PredictSingF0 => "predict_sing_f0",
            Self::PredictSingVolume => "predict_sing_volume",
            Self::SfDecode => "sf_decode",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dense array of one of the dtypes the models exchange.
#[derive(Clone, Debug, PartialEq)]
pub enum Tensor {
    Int64(ArrayD<i64>),
    Float32(ArrayD<f32>),
}

impl Tensor {
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Int64(a) => a.shape(),
            Self::Float32(a) => a.shape(),
        }
    }

    pub fn dtype(&self) -> &'static str {
        match self {
            Self::Int64(_) => "int64",
            Self::Float32(_) => "float32",
        }
    }
}

impl From<ArrayD<i64>> for Tensor {
    fn from(a: ArrayD<i64>) -> Self {
        Self::Int64(a)
    }
}

impl From<ArrayD<f32>> for Tensor {
    fn from(a: ArrayD<f32>) -> Self {
        Self::Float32(a)
    }
}

/// Serialization of a model inside a voice model file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelFormat {
    Onnx,
    /// Opaque binary meant for a vendor runtime.
    VvBin,
}

/// A model as read from a voice model file.
#[derive(Clone)]
pub struct ModelBytes {
    pub format: ModelFormat,
    pub bytes: Arc<[u8]>,
}

impl fmt::Debug for ModelBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBytes")
            .field("format", &self.format)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Session tuning passed down from `SynthesizerOptions`.
#[derive(Clone, Debug, Default)]
pub struct SessionOptions {
    pub cpu_num_threads: Option<usize>,
    pub optimized_model_cache_dir: Option<PathBuf>,
}

/// Creates inference sessions from model bytes.
pub trait InferenceRuntime: Send + Sync {
    fn new_session(
        &self,
        model: &ModelBytes,
        operation: Operation,
        options: &SessionOptions,
    ) -> Result<Arc<dyn InferenceSession>>;
}

/// A loaded model. Sessions may be run from several threads at once.
pub trait InferenceSession: Send + Sync {
    /// Run the model. Failures are reported as [`crate::Error::Inference`].
    fn run(&self, inputs: Vec<(&'static str, Tensor)>) -> Result<Vec<(String, Tensor)>>;
}
