//! Singing: scores of notes and frame-level audio queries.

use serde::{Deserialize, Serialize};

use super::kana::lookup_mora;
use super::phoneme::phoneme_id;
use super::{check_finite, check_non_negative, SamplingRate};
use crate::error::{Error, Result};
use crate::options::ValidationPolicy;

/// Caller-chosen identifier correlating notes with frame phonemes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub String);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Note {
    #[serde(default)]
    pub id: Option<NoteId>,
    /// MIDI note number. Absent for rests.
    #[serde(default)]
    pub key: Option<u8>,
    pub frame_length: u64,
    /// One mora of kana (hiragana is accepted), or empty for a rest.
    pub lyric: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub notes: Vec<Note>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FramePhoneme {
    pub phoneme: String,
    pub frame_length: u64,
    #[serde(default)]
    pub note_id: Option<NoteId>,
}

/// Frame-level singing parameters, as predicted by a singing-teacher style.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameAudioQuery {
    pub f0: Vec<f32>,
    pub volume: Vec<f32>,
    pub phonemes: Vec<FramePhoneme>,
    pub volume_scale: f32,
    pub output_sampling_rate: SamplingRate,
    pub output_stereo: bool,
}

/// A validated note: its phonemes and key as the models consume them.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct NoteFeature {
    pub(crate) id: Option<NoteId>,
    pub(crate) consonant: Option<String>,
    /// `pau` for rests.
    pub(crate) vowel: String,
    pub(crate) key: Option<u8>,
    pub(crate) frame_length: usize,
}

impl NoteFeature {
    pub(crate) fn phonemes(&self) -> impl Iterator<Item = &str> {
        self.consonant.as_deref().into_iter().chain([&*self.vowel])
    }

    /// Key as fed to the models. Rests are -1.
    pub(crate) fn key_id(&self) -> i64 {
        self.key.map_or(-1, i64::from)
    }
}

/// One frame phoneme of a query, aligned with the note it belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct AlignedPhoneme {
    pub(crate) phoneme: i64,
    pub(crate) key: i64,
    pub(crate) frame_length: usize,
}

fn hira_to_kana(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'ぁ'..='ゔ' => char::from_u32(u32::from(c) + 0x60).unwrap_or(c),
            c => c,
        })
        .collect()
}

impl Note {
    pub fn validate(&self) -> Result<()> {
        self.to_feature().map(|_| ())
    }

    pub(crate) fn to_feature(&self) -> Result<NoteFeature> {
        let frame_length = usize::try_from(self.frame_length)
            .map_err(|_| Error::invalid_query("note", "`frame_length` is too large"))?;
        let (consonant, vowel) = match (self.key, &*self.lyric) {
            (None, "") => (None, "pau".to_string()),
            (Some(_), "") => {
                return Err(Error::invalid_query("note", "a rest must not have a `key`"))
            }
            (None, lyric) => {
                return Err(Error::invalid_query(
                    "note",
                    format!("`{lyric}` needs a `key`"),
                ))
            }
            (Some(key), _) if key > 127 => {
                return Err(Error::invalid_query(
                    "note",
                    format!("`key` {key} is out of the MIDI range"),
                ))
            }
            (Some(_), lyric) => {
                let mora = lookup_mora(&hira_to_kana(lyric)).ok_or_else(|| {
                    Error::invalid_query("note", format!("`{lyric}` is not a single mora"))
                })?;
                (mora.consonant.clone(), mora.vowel.clone())
            }
        };
        Ok(NoteFeature {
            id: self.id.clone(),
            consonant,
            vowel,
            key: self.key,
            frame_length,
        })
    }
}

impl Score {
    pub fn validate(&self) -> Result<()> {
        self.note_features().map(|_| ())
    }

    /// Validate every note and require the score to open with a rest.
    pub(crate) fn note_features(&self) -> Result<Vec<NoteFeature>> {
        let features = self
            .notes
            .iter()
            .map(Note::to_feature)
            .collect::<Result<Vec<_>>>()?;
        match features.first() {
            Some(first) if first.key.is_none() => Ok(features),
            _ => Err(Error::invalid_query(
                "score",
                "the first note must be a rest",
            )),
        }
    }

    pub fn frame_length(&self) -> u64 {
        self.notes.iter().map(|n| n.frame_length).sum()
    }
}

impl FramePhoneme {
    pub(crate) fn phoneme_id(&self) -> Result<i64> {
        phoneme_id(&self.phoneme).ok_or_else(|| {
            Error::invalid_query("frame phoneme", format!("unknown phoneme `{}`", self.phoneme))
        })
    }

    fn frame_length_usize(&self) -> Result<usize> {
        usize::try_from(self.frame_length)
            .map_err(|_| Error::invalid_query("frame phoneme", "`frame_length` is too large"))
    }
}

impl FrameAudioQuery {
    pub fn frame_length(&self) -> usize {
        self.f0.len()
    }

    pub fn channels(&self) -> u16 {
        if self.output_stereo {
            2
        } else {
            1
        }
    }

    pub fn validate(&self, policy: ValidationPolicy) -> Result<()> {
        let mut phoneme_frames = 0usize;
        for phoneme in &self.phonemes {
            phoneme.phoneme_id()?;
            phoneme_frames += phoneme.frame_length_usize()?;
        }
        if self.f0.len() != self.volume.len() || self.f0.len() != phoneme_frames {
            return Err(Error::invalid_query(
                "frame audio query",
                format!(
                    "`f0` ({}), `volume` ({}) and `phonemes` ({phoneme_frames} frames) disagree in length",
                    self.f0.len(),
                    self.volume.len(),
                ),
            ));
        }
        for &f0 in &self.f0 {
            check_finite(policy, "f0", f0)?;
        }
        for &volume in &self.volume {
            check_non_negative(policy, "volume", volume)?;
        }
        check_non_negative(policy, "volumeScale", self.volume_scale)?;
        self.output_sampling_rate.validate(policy)
    }

    /// Phoneme ids repeated per frame.
    pub(crate) fn frame_phoneme_ids(&self) -> Result<Vec<i64>> {
        let mut ids = Vec::with_capacity(self.frame_length());
        for phoneme in &self.phonemes {
            let id = phoneme.phoneme_id()?;
            ids.extend(std::iter::repeat(id).take(phoneme.frame_length_usize()?));
        }
        Ok(ids)
    }
}

/// Check that `query` was created from `score`: both must spell out the same phonemes.
pub fn ensure_compatible(score: &Score, query: &FrameAudioQuery) -> Result<()> {
    align(&score.note_features()?, &query.phonemes).map(|_| ())
}

/// Pair each frame phoneme of a query with the key of its note.
pub(crate) fn align(notes: &[NoteFeature], phonemes: &[FramePhoneme]) -> Result<Vec<AlignedPhoneme>> {
    let mismatch = || {
        Error::invalid_query(
            "frame audio query",
            "its phonemes do not match the score",
        )
    };

    let mut frame_phonemes = phonemes.iter();
    let mut aligned = Vec::with_capacity(phonemes.len());
    for note in notes {
        for expected in note.phonemes() {
            let actual = frame_phonemes.next().ok_or_else(mismatch)?;
            let id = actual.phoneme_id()?;
            if phoneme_id(expected) != Some(id) {
                return Err(mismatch());
            }
            aligned.push(AlignedPhoneme {
                phoneme: id,
                key: note.key_id(),
                frame_length: actual.frame_length_usize()?,
            });
        }
    }
    if frame_phonemes.next().is_some() {
        return Err(mismatch());
    }
    Ok(aligned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doremi() -> Score {
        let note = |key: Option<u8>, frame_length, lyric: &str| Note {
            id: Some(NoteId(format!("{lyric}{frame_length}"))),
            key,
            frame_length,
            lyric: lyric.to_string(),
        };
        Score {
            notes: vec![
                note(None, 15, ""),
                note(Some(60), 45, "ド"),
                note(Some(62), 45, "レ"),
                note(Some(64), 45, "ミ"),
                note(None, 15, ""),
            ],
        }
    }

    #[test]
    fn features_spell_out_phonemes() {
        let features = doremi().note_features().unwrap();
        let phonemes = features.iter().flat_map(NoteFeature::phonemes).collect::<Vec<_>>();
        assert_eq!(phonemes, ["pau", "d", "o", "r", "e", "m", "i", "pau"]);
        assert_eq!(features[0].key_id(), -1);
        assert_eq!(features[2].key_id(), 62);
    }

    #[test]
    fn hiragana_lyrics_are_accepted() {
        let note = Note {
            id: None,
            key: Some(60),
            frame_length: 10,
            lyric: "きゃ".to_string(),
        };
        let feature = note.to_feature().unwrap();
        assert_eq!(feature.consonant.as_deref(), Some("ky"));
        assert_eq!(feature.vowel, "a");
    }

    #[test]
    fn invalid_notes_are_rejected() {
        let with = |key, lyric: &str| Note {
            id: None,
            key,
            frame_length: 1,
            lyric: lyric.to_string(),
        };
        assert!(with(Some(60), "").validate().is_err());
        assert!(with(None, "ド").validate().is_err());
        assert!(with(Some(60), "ドレ").validate().is_err());
        assert!(with(Some(200), "ド").validate().is_err());

        let mut score = doremi();
        score.notes.remove(0);
        assert!(score.validate().is_err());
        assert!(Score { notes: vec![] }.validate().is_err());
    }

    #[test]
    fn alignment_rejects_foreign_queries() {
        let features = doremi().note_features().unwrap();
        let phonemes = ["pau", "d", "o", "r", "e", "m", "i", "pau"]
            .iter()
            .map(|p| FramePhoneme {
                phoneme: p.to_string(),
                frame_length: 3,
                note_id: None,
            })
            .collect::<Vec<_>>();
        let aligned = align(&features, &phonemes).unwrap();
        let keys = aligned.iter().map(|a| a.key).collect::<Vec<_>>();
        assert_eq!(keys, [-1, 60, 60, 62, 62, 64, 64, -1]);

        assert!(align(&features, &phonemes[..7]).is_err());
        let mut swapped = phonemes.clone();
        swapped[1].phoneme = "t".to_string();
        assert!(align(&features, &swapped).is_err());
    }

    #[test]
    fn frame_query_uses_camel_case() {
        let query: FrameAudioQuery = serde_json::from_value(json!({
            "f0": [0.0, 5.5],
            "volume": [0.0, 0.5],
            "phonemes": [{"phoneme": "pau", "frame_length": 1}, {"phoneme": "a", "frame_length": 1, "note_id": "x"}],
            "volumeScale": 1.0,
            "outputSamplingRate": 24000,
            "outputStereo": false
        }))
        .unwrap();
        assert!(query.validate(ValidationPolicy::Strict).is_ok());
        assert_eq!(query.frame_phoneme_ids().unwrap(), [0, 7]);

        let mut short = query.clone();
        short.volume.pop();
        assert!(short.validate(ValidationPolicy::Warn).is_err());
    }
}
