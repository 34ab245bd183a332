//! Editable prosody plans: talk queries, singing scores and frame queries.

pub mod kana;
pub mod phoneme;
mod sampling_rate;
pub mod song;
mod talk;

pub use sampling_rate::{SamplingRate, DEFAULT_SAMPLING_RATE};
pub use song::{FrameAudioQuery, FramePhoneme, Note, NoteId, Score};
pub use talk::{AccentPhrase, AudioQuery, Mora};

use crate::error::{Error, Result};
use crate::options::ValidationPolicy;

/// Log a recoverable query problem, or fail under [`ValidationPolicy::Strict`].
pub(crate) fn report(
    policy: ValidationPolicy,
    what: &'static str,
    reason: impl Into<String>,
) -> Result<()> {
    let reason = reason.into();
    match policy {
        ValidationPolicy::Warn => {
            log::warn!("{what}: {reason}");
            Ok(())
        }
        ValidationPolicy::Strict => Err(Error::invalid_query(what, reason)),
    }
}

pub(crate) fn check_finite(policy: ValidationPolicy, what: &'static str, v: f32) -> Result<()> {
    if v.is_nan() {
        report(policy, what, "should not be NaN")
    } else if v.is_infinite() {
        report(policy, what, "should not be infinite")
    } else {
        Ok(())
    }
}

pub(crate) fn check_non_negative(
    policy: ValidationPolicy,
    what: &'static str,
    v: f32,
) -> Result<()> {
    check_finite(policy, what, v)?;
    if v < 0. {
        report(policy, what, "should not be negative")?;
    }
    Ok(())
}
