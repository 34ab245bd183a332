//! ONNX Runtime backend, enabled by the `onnxruntime` feature.

use std::path::PathBuf;
use std::sync::Arc;

use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionInputValue};
use ort::value::TensorRef;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use super::runtime::{
    InferenceRuntime, InferenceSession, ModelBytes, ModelFormat, Operation, SessionOptions, Tensor,
};
use crate::error::{Error, Result};

/// Runs `onnx` models on the CPU execution provider.
///
/// ```no_run
/// use vvtts_rs::blocking::Synthesizer;
/// use vvtts_rs::onnx::Onnxruntime;
/// use vvtts_rs::SynthesizerOptions;
///
/// let synthesizer = Synthesizer::new(Onnxruntime::new(), SynthesizerOptions::default());
/// ```
#[derive(Debug, Default)]
pub struct Onnxruntime {
    _private: (),
}

impl Onnxruntime {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InferenceRuntime for Onnxruntime {
    fn new_session(
        &self,
        model: &ModelBytes,
        operation: Operation,
        options: &SessionOptions,
    ) -> Result<Arc<dyn InferenceSession>> {
        if model.format != ModelFormat::Onnx {
            return Err(Error::Inference {
                operation: operation.name(),
                message: "`vv_bin` models are not supported by ONNX Runtime".to_owned(),
            });
        }
        let session = init_session(model, operation, options)?;
        Ok(Arc::new(OnnxSession {
            operation,
            session: Mutex::new(session),
        }))
    }
}

/// Build a session, caching the optimized graph when a cache directory is set.
///
/// The first load runs Level3 optimization and writes the result to the cache.
/// Later loads read the cached graph with optimization disabled.
fn init_session(model: &ModelBytes, operation: Operation, options: &SessionOptions) -> Result<Session> {
    let providers = vec![CPUExecutionProvider::default().build()];
    let cache = options
        .optimized_model_cache_dir
        .as_deref()
        .map(|dir| dir.join(cache_file_name(model, operation)));

    let mut builder = Session::builder()?;
    let from_cache = match &cache {
        Some(path) if path.exists() => {
            log::info!("Loading pre-optimized `{operation}` graph from {}", path.display());
            builder = builder.with_optimization_level(GraphOptimizationLevel::Disable)?;
            true
        }
        Some(path) => {
            log::info!(
                "Optimizing `{operation}` graph; saving it to {}",
                path.display()
            );
            builder = builder
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .with_optimized_model_path(path)?;
            false
        }
        None => {
            builder = builder.with_optimization_level(GraphOptimizationLevel::Level3)?;
            false
        }
    };
    builder = builder
        .with_execution_providers(providers)?
        .with_parallel_execution(true)?;
    if let Some(threads) = options.cpu_num_threads {
        builder = builder
            .with_intra_threads(threads)?
            .with_inter_threads(threads)?;
    }

    match cache {
        Some(path) if from_cache => Ok(builder.commit_from_file(path)?),
        _ => Ok(builder.commit_from_memory(&model.bytes)?),
    }
}

/// Models of different voice files share operation names, so the content is
/// part of the key.
fn cache_file_name(model: &ModelBytes, operation: Operation) -> PathBuf {
    let digest = format!("{:x}", Sha256::digest(&*model.bytes));
    PathBuf::from(format!("{}-{}.onnx", operation.name(), &digest[..16]))
}

struct OnnxSession {
    operation: Operation,
    session: Mutex<Session>,
}

impl InferenceSession for OnnxSession {
    fn run(&self, inputs: Vec<(&'static str, Tensor)>) -> Result<Vec<(String, Tensor)>> {
        let fail = |e: ort::Error| Error::Inference {
            operation: self.operation.name(),
            message: e.to_string(),
        };

        let values = inputs
            .iter()
            .map(|(name, tensor)| {
                let value: SessionInputValue<'_> = match tensor {
                    Tensor::Int64(a) => TensorRef::from_array_view(a.view())?.into(),
                    Tensor::Float32(a) => TensorRef::from_array_view(a.view())?.into(),
                };
                Ok((*name, value))
            })
            .collect::<ort::Result<Vec<_>>>()
            .map_err(fail)?;

        let mut session = self.session.lock();
        let outputs = session.run(values).map_err(fail)?;
        outputs
            .iter()
            .map(|(name, value)| {
                let tensor = match value.try_extract_array::<f32>() {
                    Ok(a) => Tensor::Float32(a.to_owned()),
                    Err(_) => Tensor::Int64(value.try_extract_array::<i64>().map_err(fail)?.to_owned()),
                };
                Ok((name.to_string(), tensor))
            })
            .collect()
    }
}
