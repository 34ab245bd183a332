//! Configuration for the synthesizer and its synthesis calls.

use std::path::PathBuf;

use derive_builder::Builder;
use serde::Deserialize;

use crate::error::Error;

/// How recoverable problems in queries are reported.
///
/// `Warn` logs them with `log::warn!` and carries on. `Strict` turns every
/// such warning into an [`Error::InvalidQuery`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    #[default]
    Warn,
    Strict,
}

/// Parameters for constructing a synthesizer.
///
/// ```
/// use vvtts_rs::{SynthesizerOptionsBuilder, ValidationPolicy};
///
/// let options = SynthesizerOptionsBuilder::default()
///     .cpu_num_threads(2usize)
///     .validation(ValidationPolicy::Strict)
///     .build()?;
/// assert_eq!(options.cpu_num_threads, Some(2));
/// # Ok::<(), vvtts_rs::Error>(())
/// ```
#[derive(Builder, Clone, Debug, Default, Deserialize)]
#[builder(default, build_fn(validate = "Self::validate", error = "Error"))]
#[serde(default)]
pub struct SynthesizerOptions {
    /// Number of CPU threads per inference session.
    /// `None` leaves the choice to the runtime.
    #[builder(setter(into, strip_option))]
    pub cpu_num_threads: Option<usize>,
    pub validation: ValidationPolicy,
    /// Directory for caching optimized model graphs, when the runtime supports it.
    #[builder(setter(into, strip_option))]
    pub optimized_model_cache_dir: Option<PathBuf>,
}

impl SynthesizerOptionsBuilder {
    fn validate(&self) -> Result<(), Error> {
        if let Some(Some(0)) = self.cpu_num_threads {
            return Err(Error::Config("`cpu_num_threads` must be positive".to_string()));
        }
        Ok(())
    }
}

/// Options for rendering an `AudioQuery`.
#[derive(Builder, Clone, Copy, Debug, PartialEq, Eq)]
#[builder(default, build_fn(error = "Error"))]
pub struct SynthesisOptions {
    /// Raise the pitch at the end of interrogative accent phrases.
    pub enable_interrogative_upspeak: bool,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            enable_interrogative_upspeak: true,
        }
    }
}

/// Options for text-to-speech calls.
#[derive(Builder, Clone, Copy, Debug, PartialEq, Eq)]
#[builder(default, build_fn(error = "Error"))]
pub struct TtsOptions {
    pub enable_interrogative_upspeak: bool,
}

impl Default for TtsOptions {
    fn default() -> Self {
        Self {
            enable_interrogative_upspeak: true,
        }
    }
}

impl From<&TtsOptions> for SynthesisOptions {
    fn from(options: &TtsOptions) -> Self {
        Self {
            enable_interrogative_upspeak: options.enable_interrogative_upspeak,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_upspeak() {
        assert!(SynthesisOptions::default().enable_interrogative_upspeak);
        let built = TtsOptionsBuilder::default().build().unwrap();
        assert!(built.enable_interrogative_upspeak);
        let off = TtsOptionsBuilder::default()
            .enable_interrogative_upspeak(false)
            .build()
            .unwrap();
        assert!(!SynthesisOptions::from(&off).enable_interrogative_upspeak);
    }

    #[test]
    fn zero_threads_is_rejected() {
        let err = SynthesizerOptionsBuilder::default()
            .cpu_num_threads(0usize)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn policy_loads_from_json() {
        let options: SynthesizerOptions =
            serde_json::from_str(r#"{"validation": "strict", "cpu_num_threads": 4}"#).unwrap();
        assert_eq!(options.validation, ValidationPolicy::Strict);
        assert_eq!(options.cpu_num_threads, Some(4));
        assert_eq!(options.optimized_model_cache_dir, None);
    }
}
