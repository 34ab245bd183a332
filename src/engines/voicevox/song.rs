//! Singing: score to frame-level query, and frame-level query to waveform.

use super::audio::{to_s16le_pcm, wav_from_s16le};
use super::marshal::{self, PredictSingConsonantLength, PredictSingF0, PredictSingVolume, SfDecode};
use super::model::DomainSessions;
use super::runtime::Operation;
use crate::error::{Error, Result};
use crate::query::phoneme::{phoneme_id, PHONEME_LIST};
use crate::query::song::{align, AlignedPhoneme, NoteFeature};
use crate::query::{FrameAudioQuery, FramePhoneme, NoteId, SamplingRate, Score};

/// A phoneme of the score with its predicted length in frames.
struct TimedPhoneme {
    phoneme: i64,
    key: i64,
    note_id: Option<NoteId>,
    frame_length: usize,
}

pub(crate) fn create_sing_frame_audio_query(
    sessions: &DomainSessions,
    speaker_id: i64,
    score: &Score,
) -> Result<FrameAudioQuery> {
    let notes = score.note_features()?;
    let phonemes = timed_phonemes(sessions, speaker_id, &notes)?;

    let aligned = phonemes
        .iter()
        .map(|p| AlignedPhoneme {
            phoneme: p.phoneme,
            key: p.key,
            frame_length: p.frame_length,
        })
        .collect::<Vec<_>>();
    let (frame_phonemes, frame_keys) = expand(&aligned);
    log::debug!(
        "score of {} notes spans {} frames",
        notes.len(),
        frame_phonemes.len()
    );

    let f0 = marshal::run(
        sessions.session(Operation::PredictSingF0)?,
        PredictSingF0 {
            phonemes: frame_phonemes.clone(),
            notes: frame_keys.clone(),
            speaker_id,
        },
    )?;
    let volume = marshal::run(
        sessions.session(Operation::PredictSingVolume)?,
        PredictSingVolume {
            phonemes: frame_phonemes,
            notes: frame_keys,
            frame_f0s: f0.clone(),
            speaker_id,
        },
    )?;

    Ok(FrameAudioQuery {
        f0,
        volume,
        phonemes: phonemes
            .into_iter()
            .map(|p| FramePhoneme {
                phoneme: PHONEME_LIST[p.phoneme as usize].to_owned(),
                frame_length: p.frame_length as u64,
                note_id: p.note_id,
            })
            .collect(),
        volume_scale: 1.,
        output_sampling_rate: SamplingRate::DEFAULT,
        output_stereo: false,
    })
}

/// Split every note into its phonemes, moving each consonant into the tail of
/// the previous note.
fn timed_phonemes(
    sessions: &DomainSessions,
    speaker_id: i64,
    notes: &[NoteFeature],
) -> Result<Vec<TimedPhoneme>> {
    let ids = |p: &str| {
        phoneme_id(p).ok_or_else(|| Error::invalid_query("note", format!("unknown phoneme `{p}`")))
    };
    let consonants = notes
        .iter()
        .map(|n| n.consonant.as_deref().map_or(Ok(-1), ids))
        .collect::<Result<Vec<_>>>()?;
    let vowels = notes
        .iter()
        .map(|n| ids(&n.vowel))
        .collect::<Result<Vec<_>>>()?;
    let note_lengths = notes.iter().map(|n| n.frame_length as i64).collect::<Vec<_>>();

    let consonant_lengths = marshal::run(
        sessions.session(Operation::PredictSingConsonantLength)?,
        PredictSingConsonantLength {
            consonants: consonants.clone(),
            vowels: vowels.clone(),
            note_durations: note_lengths.clone(),
            speaker_id,
        },
    )?;
    if consonant_lengths.first().is_some_and(|&l| l != 0) {
        return Err(Error::InferenceOutputMismatch {
            operation: Operation::PredictSingConsonantLength.name(),
            detail: "the first note must not have a consonant".to_owned(),
        });
    }

    let mut phonemes = Vec::with_capacity(notes.len() * 2);
    for (i, note) in notes.iter().enumerate() {
        let note_length = note_lengths[i];
        let next_consonant_length = match consonants.get(i + 1).copied() {
            None => 0,
            Some(-1) => 0,
            Some(_) => match consonant_lengths[i + 1] {
                l if l < 0 || l > note_length => note_length / 2,
                l => l,
            },
        };
        phonemes.push(TimedPhoneme {
            phoneme: vowels[i],
            key: note.key_id(),
            note_id: note.id.clone(),
            frame_length: (note_length - next_consonant_length) as usize,
        });
        if next_consonant_length > 0 {
            let next = &notes[i + 1];
            phonemes.push(TimedPhoneme {
                phoneme: consonants[i + 1],
                key: next.key_id(),
                note_id: next.id.clone(),
                frame_length: next_consonant_length as usize,
            });
        }
    }
    Ok(phonemes)
}

/// Per-frame phoneme ids and keys.
fn expand(phonemes: &[AlignedPhoneme]) -> (Vec<i64>, Vec<i64>) {
    let mut frame_phonemes = Vec::new();
    let mut frame_keys = Vec::new();
    for p in phonemes {
        frame_phonemes.extend(std::iter::repeat(p.phoneme).take(p.frame_length));
        frame_keys.extend(std::iter::repeat(p.key).take(p.frame_length));
    }
    (frame_phonemes, frame_keys)
}

/// Predict the per-frame f0 of `query`, which must have been made from `score`.
pub(crate) fn create_sing_frame_f0(
    sessions: &DomainSessions,
    speaker_id: i64,
    score: &Score,
    query: &FrameAudioQuery,
) -> Result<Vec<f32>> {
    let (phonemes, notes) = expand(&align(&score.note_features()?, &query.phonemes)?);
    marshal::run(
        sessions.session(Operation::PredictSingF0)?,
        PredictSingF0 {
            phonemes,
            notes,
            speaker_id,
        },
    )
}

/// Predict the per-frame volume of `query` from its phonemes and its `f0`.
pub(crate) fn create_sing_frame_volume(
    sessions: &DomainSessions,
    speaker_id: i64,
    score: &Score,
    query: &FrameAudioQuery,
) -> Result<Vec<f32>> {
    let (phonemes, notes) = expand(&align(&score.note_features()?, &query.phonemes)?);
    if query.f0.len() != phonemes.len() {
        return Err(Error::invalid_query(
            "frame audio query",
            format!("`f0` has {} frames, its phonemes {}", query.f0.len(), phonemes.len()),
        ));
    }
    marshal::run(
        sessions.session(Operation::PredictSingVolume)?,
        PredictSingVolume {
            phonemes,
            notes,
            frame_f0s: query.f0.clone(),
            speaker_id,
        },
    )
}

/// Render a frame-level query into a WAV file.
pub(crate) fn frame_synthesis(
    sessions: &DomainSessions,
    speaker_id: i64,
    query: &FrameAudioQuery,
) -> Result<Vec<u8>> {
    let wave = marshal::run(
        sessions.session(Operation::SfDecode)?,
        SfDecode {
            frame_phonemes: query.frame_phoneme_ids()?,
            frame_f0s: query.f0.clone(),
            frame_volumes: query.volume.clone(),
            speaker_id,
        },
    )?;
    let pcm = to_s16le_pcm(
        &wave,
        query.volume_scale,
        query.output_sampling_rate,
        query.output_stereo,
    );
    wav_from_s16le(&pcm, query.output_sampling_rate, query.output_stereo)
}
