use std::path::PathBuf;

use uuid::Uuid;

use crate::metas::{StyleId, VoiceModelId};
use crate::query::kana::KanaParseError;
use crate::user_dict::InvalidWordError;

/// Errors produced by this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Style {style_id} not found. Load a voice model that provides it first.")]
    StyleNotFound { style_id: StyleId },
    #[error("Voice model {model_id} is not loaded.")]
    ModelNotFound { model_id: VoiceModelId },
    #[error("Voice model {model_id} is already loaded.")]
    ModelAlreadyLoaded { model_id: VoiceModelId },
    #[error("Style {style_id} is already provided by a loaded voice model.")]
    StyleAlreadyLoaded { style_id: StyleId },
    #[error("Character `{character}` ({speaker_uuid}) does not support {feature}.")]
    SpeakerFeature {
        character: String,
        speaker_uuid: String,
        feature: &'static str,
    },
    #[error("Invalid {what}: {reason}")]
    InvalidQuery { what: &'static str, reason: String },
    #[error("The synthesizer has been closed.")]
    Closed,
    #[error(transparent)]
    InvalidWord(#[from] InvalidWordError),
    #[error("Word {0} not found in the user dictionary.")]
    WordNotFound(Uuid),
    #[error("Failed to load user dictionary from {path}: {reason}")]
    LoadUserDict { path: PathBuf, reason: String },
    #[error("Failed to save user dictionary to {path}: {reason}")]
    SaveUserDict { path: PathBuf, reason: String },
    #[error("Failed to serialize user dictionary: {0}")]
    SerializeUserDict(#[source] serde_json::Error),
    #[error("Failed to load voice model {path}: {reason}")]
    LoadModel { path: PathBuf, reason: String },
    #[error(transparent)]
    ParseKana(#[from] KanaParseError),
    #[error("Text analysis failed: {0}")]
    AnalyzeText(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("No text analyzer configured. Use the `*_from_kana` methods or set one with `with_text_analyzer()`.")]
    NoTextAnalyzer,
    #[error("Inference failed in `{operation}`: {message}")]
    Inference {
        operation: &'static str,
        message: String,
    },
    #[error("Inference backend broke the `{operation}` contract: {detail}")]
    InferenceOutputMismatch {
        operation: &'static str,
        detail: String,
    },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WAV encoding failed: {0}")]
    Wav(#[from] hound::Error),
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[cfg(feature = "onnxruntime")]
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
}

/// Coarse classification of [`Error`], stable across message changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    StyleNotFound,
    ModelNotFound,
    ModelAlreadyLoaded,
    StyleAlreadyLoaded,
    SpeakerFeature,
    InvalidQuery,
    ClosedResource,
    InvalidWord,
    WordNotFound,
    LoadUserDict,
    SaveUserDict,
    LoadModel,
    ParseKana,
    AnalyzeText,
    NoTextAnalyzer,
    Inference,
    InferenceOutputMismatch,
    Config,
    Io,
    Join,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::StyleNotFound { .. } => ErrorKind::StyleNotFound,
            Self::ModelNotFound { .. } => ErrorKind::ModelNotFound,
            Self::ModelAlreadyLoaded { .. } => ErrorKind::ModelAlreadyLoaded,
            Self::StyleAlreadyLoaded { .. } => ErrorKind::StyleAlreadyLoaded,
            Self::SpeakerFeature { .. } => ErrorKind::SpeakerFeature,
            Self::InvalidQuery { .. } => ErrorKind::InvalidQuery,
            Self::Closed => ErrorKind::ClosedResource,
            Self::InvalidWord(_) => ErrorKind::InvalidWord,
            Self::WordNotFound(_) => ErrorKind::WordNotFound,
            Self::LoadUserDict { .. } => ErrorKind::LoadUserDict,
            Self::SaveUserDict { .. } | Self::SerializeUserDict(_) => ErrorKind::SaveUserDict,
            Self::LoadModel { .. } => ErrorKind::LoadModel,
            Self::ParseKana(_) => ErrorKind::ParseKana,
            Self::AnalyzeText(_) => ErrorKind::AnalyzeText,
            Self::NoTextAnalyzer => ErrorKind::NoTextAnalyzer,
            Self::Inference { .. } => ErrorKind::Inference,
            Self::InferenceOutputMismatch { .. } | Self::Shape(_) => {
                ErrorKind::InferenceOutputMismatch
            }
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) | Self::Wav(_) => ErrorKind::Io,
            Self::Join(_) => ErrorKind::Join,
            #[cfg(feature = "onnxruntime")]
            Self::Ort(_) => ErrorKind::Inference,
        }
    }

    pub(crate) fn invalid_query(what: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidQuery {
            what,
            reason: reason.into(),
        }
    }
}

impl From<derive_builder::UninitializedFieldError> for Error {
    fn from(e: derive_builder::UninitializedFieldError) -> Self {
        Self::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
