//! Speech synthesis engines.
//!
//! # Inference Runtimes
//!
//! Enable runtimes via Cargo features:
//! - `onnxruntime` - ONNX Runtime on the CPU execution provider

pub mod voicevox;
