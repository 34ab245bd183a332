use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::options::ValidationPolicy;

/// Output sampling rate in Hz. Models render at 24 kHz and upsample by repetition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SamplingRate(pub u32);

impl SamplingRate {
    pub const DEFAULT: Self = Self(DEFAULT_SAMPLING_RATE);

    /// Number of output samples per model sample.
    pub fn upsample_factor(self) -> usize {
        (self.0 / DEFAULT_SAMPLING_RATE) as usize
    }

    pub(crate) fn validate(self, policy: ValidationPolicy) -> Result<()> {
        if self.0 == 0 || self.0 % DEFAULT_SAMPLING_RATE != 0 {
            return Err(Error::invalid_query(
                "output_sampling_rate",
                format!("{} is not a multiple of {DEFAULT_SAMPLING_RATE}", self.0),
            ));
        }
        if self.0 != DEFAULT_SAMPLING_RATE {
            super::report(
                policy,
                "output_sampling_rate",
                format!("{} Hz is upsampled by sample repetition", self.0),
            )?;
        }
        Ok(())
    }
}

impl Default for SamplingRate {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for SamplingRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rate every model decodes at.
pub const DEFAULT_SAMPLING_RATE: u32 = 24000;
