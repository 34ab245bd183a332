//! # vvtts-rs
//!
//! A Rust library for VOICEVOX-style Japanese text-to-speech.
//!
//! ## Features
//!
//! - **Audio queries**: editable accent phrases with predicted lengths and pitches
//! - **Voice models**: load and unload `.vvm` archives at runtime
//! - **Chunked rendering**: precompute once, render any frame range
//! - **Morphing and singing**: blend two talk styles, or sing a score
//! - **User dictionaries**: persisted as JSON, exported as MeCab CSV
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! vvtts-rs = { version = "2026.2", features = ["onnxruntime"] }
//! ```
//!
//! ```ignore
//! use vvtts_rs::blocking::Synthesizer;
//! use vvtts_rs::onnx::Onnxruntime;
//! use vvtts_rs::{StyleId, SynthesizerOptions, TtsOptions, VoiceModelFile};
//!
//! let synthesizer = Synthesizer::new(Onnxruntime::new(), SynthesizerOptions::default());
//! synthesizer.load_voice_model(&VoiceModelFile::open("models/0.vvm")?)?;
//!
//! let wav = synthesizer.tts_from_kana("コンニチワ'", StyleId(0), &TtsOptions::default())?;
//! std::fs::write("output.wav", wav)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod engines;
pub mod error;
pub mod metas;
pub mod options;
pub mod query;
pub mod user_dict;

pub use engines::voicevox::analyzer::{KanaAnalyzer, TextAnalyzer};
pub use engines::voicevox::audio::{wav_from_s16le, AudioFeature, FRAME_RATE};
pub use engines::voicevox::morph::MorphableTargetInfo;
pub use engines::voicevox::runtime::{
    Domain, InferenceRuntime, InferenceSession, ModelBytes, ModelFormat, Operation, SessionOptions,
    Tensor,
};
pub use engines::voicevox::voices::VoiceModelFile;
pub use error::{Error, ErrorKind, Result};
pub use metas::{
    CharacterMeta, PermittedSynthesisMorphing, SpeakerSupportedFeatures, StyleId, StyleMeta,
    StyleType, VoiceModelId, VoiceModelMeta,
};
pub use options::{
    SynthesisOptions, SynthesisOptionsBuilder, SynthesizerOptions, SynthesizerOptionsBuilder,
    TtsOptions, TtsOptionsBuilder, ValidationPolicy,
};
pub use query::{
    AccentPhrase, AudioQuery, FrameAudioQuery, FramePhoneme, Mora, Note, NoteId, SamplingRate,
    Score,
};
pub use user_dict::{UserDict, UserDictWord, UserDictWordType};

/// Synchronous API. Calls block the current thread for the duration of inference.
pub mod blocking {
    pub use crate::engines::voicevox::engine::{ClosingGuard, Synthesizer};
}

/// Async API on tokio. Inference runs on the blocking thread pool.
pub mod nonblocking {
    pub use crate::engines::voicevox::nonblocking::Synthesizer;
}

#[cfg(feature = "onnxruntime")]
pub use engines::voicevox::onnx;
