//! Fills the acoustic fields of accent phrases from the talk models.
//!
//! Every function takes the phrases by reference and returns new ones, so a
//! failed inference leaves the caller's phrases as they were.

use super::marshal::{self, PredictDuration, PredictIntonation};
use super::model::DomainSessions;
use super::runtime::Operation;
use crate::error::{Error, Result};
use crate::query::phoneme::{is_mora_tail, is_unvoiced_mora_tail, phoneme_id};
use crate::query::{AccentPhrase, Mora};

/// Predicted lengths are clamped to at least this many seconds.
const MIN_PHONEME_LENGTH: f32 = 0.01;

/// Predict `consonant_length` and `vowel_length` of every mora.
///
/// Pause moras are left as they are.
pub(crate) fn replace_phoneme_length(
    sessions: &DomainSessions,
    speaker_id: i64,
    accent_phrases: &[AccentPhrase],
) -> Result<Vec<AccentPhrase>> {
    let phonemes = flatten(accent_phrases.iter().flat_map(|p| &p.moras));
    let vowel_indexes = vowel_indexes(&phonemes);
    log::debug!("predicting {} phoneme lengths", phonemes.len());

    let lengths = marshal::run(
        sessions.session(Operation::PredictDuration)?,
        PredictDuration {
            phoneme_list: ids(&phonemes)?,
            speaker_id,
        },
    )?;
    let lengths = lengths
        .into_iter()
        .map(|l| l.max(MIN_PHONEME_LENGTH))
        .collect::<Vec<_>>();

    // Index 0 is the leading pause.
    let mut vowel_indexes = vowel_indexes.into_iter().skip(1);
    Ok(accent_phrases
        .iter()
        .map(|phrase| AccentPhrase {
            moras: phrase
                .moras
                .iter()
                .zip(vowel_indexes.by_ref())
                .map(|(mora, v)| Mora {
                    consonant_length: mora.consonant.as_ref().map(|_| lengths[v - 1]),
                    vowel_length: lengths[v],
                    ..mora.clone()
                })
                .collect(),
            ..phrase.clone()
        })
        .collect())
}

/// Predict the `pitch` of every mora, pause moras included.
pub(crate) fn replace_mora_pitch(
    sessions: &DomainSessions,
    speaker_id: i64,
    accent_phrases: &[AccentPhrase],
) -> Result<Vec<AccentPhrase>> {
    let phonemes = flatten(
        accent_phrases
            .iter()
            .flat_map(|p| p.moras.iter().chain(&p.pause_mora)),
    );
    let vowel_indexes = vowel_indexes(&phonemes);
    let phoneme_ids = ids(&phonemes)?;

    let mut start_accent = vec![0];
    let mut end_accent = vec![0];
    let mut start_accent_phrase = vec![0];
    let mut end_accent_phrase = vec![0];
    for phrase in accent_phrases {
        let accent = phrase.accent as isize;
        push_accent_marks(&mut start_accent, phrase, if accent == 1 { 0 } else { 1 });
        push_accent_marks(&mut end_accent, phrase, accent - 1);
        push_accent_marks(&mut start_accent_phrase, phrase, 0);
        push_accent_marks(&mut end_accent_phrase, phrase, -1);
    }
    for list in [
        &mut start_accent,
        &mut end_accent,
        &mut start_accent_phrase,
        &mut end_accent_phrase,
    ] {
        list.push(0);
    }

    let at_vowels = |list: &[i64]| vowel_indexes.iter().map(|&i| list[i]).collect::<Vec<_>>();
    let consonant_phoneme_list = vowel_indexes
        .iter()
        .enumerate()
        .map(|(k, &v)| match k.checked_sub(1).map(|prev| vowel_indexes[prev]) {
            Some(prev) if v - prev > 1 => phoneme_ids[v - 1],
            _ => -1,
        })
        .collect();
    log::debug!("predicting intonation of {} moras", vowel_indexes.len());

    let mut f0 = marshal::run(
        sessions.session(Operation::PredictIntonation)?,
        PredictIntonation {
            vowel_phoneme_list: at_vowels(&phoneme_ids),
            consonant_phoneme_list,
            start_accent_list: at_vowels(&start_accent),
            end_accent_list: at_vowels(&end_accent),
            start_accent_phrase_list: at_vowels(&start_accent_phrase),
            end_accent_phrase_list: at_vowels(&end_accent_phrase),
            speaker_id,
        },
    )?;
    for (f0, &v) in f0.iter_mut().zip(&vowel_indexes) {
        if is_unvoiced_mora_tail(phonemes[v]) {
            *f0 = 0.;
        }
    }

    let mut pitches = f0.into_iter().skip(1);
    let mut with_pitch = |mora: &Mora| Mora {
        pitch: pitches.next().unwrap_or_default(),
        ..mora.clone()
    };
    Ok(accent_phrases
        .iter()
        .map(|phrase| AccentPhrase {
            moras: phrase.moras.iter().map(&mut with_pitch).collect(),
            pause_mora: phrase.pause_mora.as_ref().map(&mut with_pitch),
            ..phrase.clone()
        })
        .collect())
}

/// Lengths first, then pitch.
pub(crate) fn replace_mora_data(
    sessions: &DomainSessions,
    speaker_id: i64,
    accent_phrases: &[AccentPhrase],
) -> Result<Vec<AccentPhrase>> {
    let accent_phrases = replace_phoneme_length(sessions, speaker_id, accent_phrases)?;
    replace_mora_pitch(sessions, speaker_id, &accent_phrases)
}

/// `[pau, (consonant?, vowel)*, pau]`
fn flatten<'a>(moras: impl IntoIterator<Item = &'a Mora>) -> Vec<&'a str> {
    let mut phonemes = vec!["pau"];
    for mora in moras {
        phonemes.extend(mora.consonant.as_deref());
        phonemes.push(&mora.vowel);
    }
    phonemes.push("pau");
    phonemes
}

fn vowel_indexes(phonemes: &[&str]) -> Vec<usize> {
    phonemes
        .iter()
        .enumerate()
        .filter(|(_, p)| is_mora_tail(p))
        .map(|(i, _)| i)
        .collect()
}

fn ids(phonemes: &[&str]) -> Result<Vec<i64>> {
    phonemes
        .iter()
        .map(|p| {
            phoneme_id(p).ok_or_else(|| Error::invalid_query("phoneme", format!("unknown phoneme `{p}`")))
        })
        .collect()
}

/// One 0/1 entry per phoneme of `phrase`. A negative `point` counts from the end.
fn push_accent_marks(list: &mut Vec<i64>, phrase: &AccentPhrase, point: isize) {
    let len = phrase.moras.len() as isize;
    for (i, mora) in phrase.moras.iter().enumerate() {
        let i = i as isize;
        let value = i64::from(i == point || (point < 0 && i == len + point));
        list.push(value);
        if mora.consonant.is_some() {
            list.push(value);
        }
    }
    if phrase.pause_mora.is_some() {
        list.push(0);
    }
}
