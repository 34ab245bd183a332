//! VOICEVOX-style synthesis engine.
//!
//! Voice models (`.vvm` archives) are loaded into a [`engine::Synthesizer`]
//! and addressed by style id afterwards. Inference goes through the
//! [`runtime::InferenceRuntime`] trait; the `onnxruntime` feature provides
//! an implementation on top of ONNX Runtime.
//!
//! # Voice Model Layout
//!
//! ```text
//! 0.vvm (zip)
//! ├── manifest.json      # format version, model id, domains
//! ├── metas.json         # characters and their styles
//! └── *.onnx / *.bin     # one network per operation of each domain
//! ```

pub mod analyzer;
pub mod audio;
pub mod engine;
mod marshal;
mod model;
pub mod morph;
pub mod nonblocking;
#[cfg(feature = "onnxruntime")]
pub mod onnx;
mod pipeline;
pub mod runtime;
mod song;
#[cfg(test)]
mod testing;
pub mod voices;
