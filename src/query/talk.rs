use serde::{Deserialize, Serialize};

use super::phoneme::{is_consonant, is_mora_tail};
use super::{check_finite, check_non_negative, report, SamplingRate};
use crate::error::{Error, Result};
use crate::options::ValidationPolicy;

/// One consonant+vowel unit carrying one pitch value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mora {
    /// Display glyph, usually katakana.
    pub text: String,
    pub consonant: Option<String>,
    /// Seconds. Present iff `consonant` is.
    pub consonant_length: Option<f32>,
    pub vowel: String,
    /// Seconds.
    pub vowel_length: f32,
    /// Log-f0. Zero means unvoiced or silent.
    pub pitch: f32,
}

impl Mora {
    /// A silent mora, as inserted between phrases.
    pub(crate) fn pause() -> Self {
        Self {
            text: "、".to_string(),
            consonant: None,
            consonant_length: None,
            vowel: "pau".to_string(),
            vowel_length: 0.,
            pitch: 0.,
        }
    }

    pub fn validate(&self, policy: ValidationPolicy) -> Result<()> {
        match (&self.consonant, self.consonant_length) {
            (Some(consonant), Some(length)) => {
                if !is_consonant(consonant) {
                    return Err(Error::invalid_query(
                        "mora",
                        format!("`{consonant}` is not a consonant phoneme"),
                    ));
                }
                check_non_negative(policy, "consonant_length", length)?;
            }
            (None, None) => {}
            _ => {
                return Err(Error::invalid_query(
                    "mora",
                    "`consonant` and `consonant_length` must be both present or both absent",
                ))
            }
        }
        if !is_mora_tail(&self.vowel) {
            return Err(Error::invalid_query(
                "mora",
                format!("`{}` cannot end a mora", self.vowel),
            ));
        }
        check_non_negative(policy, "vowel_length", self.vowel_length)?;
        check_finite(policy, "pitch", self.pitch)
    }
}

/// A run of moras sharing one pitch-accent pattern.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccentPhrase {
    pub moras: Vec<Mora>,
    /// 1-based position of the mora after which the pitch drops.
    pub accent: usize,
    /// Silence following the phrase.
    pub pause_mora: Option<Mora>,
    /// Raise the pitch at the end of the phrase when synthesizing.
    #[serde(default)]
    pub is_interrogative: bool,
}

impl AccentPhrase {
    pub fn validate(&self, policy: ValidationPolicy) -> Result<()> {
        if self.accent == 0 {
            return Err(Error::invalid_query("accent", "must not be zero"));
        }
        if self.accent > self.moras.len() {
            report(
                policy,
                "accent",
                format!(
                    "{} exceeds the number of moras ({})",
                    self.accent,
                    self.moras.len()
                ),
            )?;
        }
        for mora in &self.moras {
            mora.validate(policy)?;
        }
        if let Some(pause_mora) = &self.pause_mora {
            pause_mora.validate(policy)?;
        }
        Ok(())
    }
}

/// The complete, editable prosodic plan of one utterance.
///
/// Serializes with the VOICEVOX engine schema: scalar fields are camelCase,
/// `accent_phrases` and `kana` are not.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioQuery {
    pub accent_phrases: Vec<AccentPhrase>,
    #[serde(rename = "speedScale")]
    pub speed_scale: f32,
    #[serde(rename = "pitchScale")]
    pub pitch_scale: f32,
    #[serde(rename = "intonationScale")]
    pub intonation_scale: f32,
    #[serde(rename = "volumeScale")]
    pub volume_scale: f32,
    #[serde(rename = "prePhonemeLength")]
    pub pre_phoneme_length: f32,
    #[serde(rename = "postPhonemeLength")]
    pub post_phoneme_length: f32,
    #[serde(rename = "outputSamplingRate")]
    pub output_sampling_rate: SamplingRate,
    #[serde(rename = "outputStereo")]
    pub output_stereo: bool,
    /// Read-only AquesTalk-style notation. Only queries created from text carry it;
    /// it is ignored on input.
    #[serde(skip_deserializing)]
    pub kana: Option<String>,
}

impl AudioQuery {
    pub fn from_accent_phrases(accent_phrases: Vec<AccentPhrase>) -> Self {
        Self {
            accent_phrases,
            speed_scale: 1.,
            pitch_scale: 0.,
            intonation_scale: 1.,
            volume_scale: 1.,
            pre_phoneme_length: 0.1,
            post_phoneme_length: 0.1,
            output_sampling_rate: SamplingRate::default(),
            output_stereo: false,
            kana: None,
        }
    }

    pub(crate) fn with_kana(self, kana: Option<String>) -> Self {
        Self { kana, ..self }
    }

    pub fn channels(&self) -> u16 {
        if self.output_stereo {
            2
        } else {
            1
        }
    }

    pub fn validate(&self, policy: ValidationPolicy) -> Result<()> {
        for phrase in &self.accent_phrases {
            phrase.validate(policy)?;
        }
        check_non_negative(policy, "speed_scale", self.speed_scale)?;
        if self.speed_scale == 0. {
            return Err(Error::invalid_query("speed_scale", "must not be zero"));
        }
        check_finite(policy, "pitch_scale", self.pitch_scale)?;
        check_finite(policy, "intonation_scale", self.intonation_scale)?;
        check_non_negative(policy, "volume_scale", self.volume_scale)?;
        check_non_negative(policy, "pre_phoneme_length", self.pre_phoneme_length)?;
        check_non_negative(policy, "post_phoneme_length", self.post_phoneme_length)?;
        self.output_sampling_rate.validate(policy)
    }
}
