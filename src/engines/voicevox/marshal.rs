//! Typed input signatures for every operation, and checked output extraction.
//!
//! Nothing here computes. Each signature only knows how to lay its fields out
//! as named tensors and how long its single output must be.

use ndarray::{arr0, Array, Array2, ArrayD, IxDyn};

use super::runtime::{InferenceSession, Operation, Tensor};
use crate::error::{Error, Result};
use crate::query::phoneme::NUM_PHONEMES;

/// Waveform samples produced per acoustic frame.
pub(crate) const SAMPLES_PER_FRAME: usize = 256;

pub(crate) trait Element: Copy {
    const DTYPE: &'static str;
    fn extract(tensor: Tensor) -> Option<ArrayD<Self>>;
}

impl Element for f32 {
    const DTYPE: &'static str = "float32";

    fn extract(tensor: Tensor) -> Option<ArrayD<Self>> {
        match tensor {
            Tensor::Float32(a) => Some(a),
            Tensor::Int64(_) => None,
        }
    }
}

impl Element for i64 {
    const DTYPE: &'static str = "int64";

    fn extract(tensor: Tensor) -> Option<ArrayD<Self>> {
        match tensor {
            Tensor::Int64(a) => Some(a),
            Tensor::Float32(_) => None,
        }
    }
}

pub(crate) trait Signature {
    const OPERATION: Operation;
    const OUTPUT: &'static str;
    type Output: Element;

    /// Number of elements the output must have.
    fn output_len(&self) -> usize;

    fn into_tensors(self) -> Result<Vec<(&'static str, Tensor)>>;
}

/// Run `input` on `session` and return its output flattened in logical order.
pub(crate) fn run<S: Signature>(session: &dyn InferenceSession, input: S) -> Result<Vec<S::Output>> {
    let mismatch = |detail: String| Error::InferenceOutputMismatch {
        operation: S::OPERATION.name(),
        detail,
    };

    let expected_len = input.output_len();
    let inputs = input.into_tensors()?;
    log::debug!(
        "`{}`: inputs {:?}",
        S::OPERATION,
        inputs.iter().map(|(name, t)| (*name, t.shape())).collect::<Vec<_>>()
    );

    let mut outputs = session.run(inputs)?;
    let index = outputs
        .iter()
        .position(|(name, _)| name == S::OUTPUT)
        .or_else(|| (outputs.len() == 1).then_some(0))
        .ok_or_else(|| mismatch(format!("missing output `{}`", S::OUTPUT)))?;
    let (_, tensor) = outputs.swap_remove(index);

    let dtype = tensor.dtype();
    let array = <S::Output as Element>::extract(tensor).ok_or_else(|| {
        mismatch(format!(
            "`{}` is {dtype}, expected {}",
            S::OUTPUT,
            <S::Output as Element>::DTYPE
        ))
    })?;
    if array.len() != expected_len {
        return Err(mismatch(format!(
            "`{}` has {} elements, expected {expected_len}",
            S::OUTPUT,
            array.len()
        )));
    }
    Ok(array.into_iter().collect())
}

fn vector<T>(v: Vec<T>) -> ArrayD<T> {
    Array::from_vec(v).into_dyn()
}

fn batch<T>(v: Vec<T>) -> Result<ArrayD<T>> {
    let len = v.len();
    Ok(Array::from_shape_vec(IxDyn(&[1, len]), v)?)
}

fn speaker(speaker_id: i64) -> Tensor {
    vector(vec![speaker_id]).into()
}

pub(crate) struct PredictDuration {
    pub(crate) phoneme_list: Vec<i64>,
    pub(crate) speaker_id: i64,
}

impl Signature for PredictDuration {
    const OPERATION: Operation = Operation::PredictDuration;
    const OUTPUT: &'static str = "phoneme_length";
    type Output = f32;

    fn output_len(&self) -> usize {
        self.phoneme_list.len()
    }

    fn into_tensors(self) -> Result<Vec<(&'static str, Tensor)>> {
        Ok(vec![
            ("phoneme_list", vector(self.phoneme_list).into()),
            ("speaker_id", speaker(self.speaker_id)),
        ])
    }
}

pub(crate) struct PredictIntonation {
    pub(crate) vowel_phoneme_list: Vec<i64>,
    pub(crate) consonant_phoneme_list: Vec<i64>,
    pub(crate) start_accent_list: Vec<i64>,
    pub(crate) end_accent_list: Vec<i64>,
    pub(crate) start_accent_phrase_list: Vec<i64>,
    pub(crate) end_accent_phrase_list: Vec<i64>,
    pub(crate) speaker_id: i64,
}

impl Signature for PredictIntonation {
    const OPERATION: Operation = Operation::PredictIntonation;
    const OUTPUT: &'static str = "f0_list";
    type Output = f32;

    fn output_len(&self) -> usize {
        self.vowel_phoneme_list.len()
    }

    fn into_tensors(self) -> Result<Vec<(&'static str, Tensor)>> {
        let length = self.vowel_phoneme_list.len() as i64;
        Ok(vec![
            ("length", arr0(length).into_dyn().into()),
            ("vowel_phoneme_list", vector(self.vowel_phoneme_list).into()),
            ("consonant_phoneme_list", vector(self.consonant_phoneme_list).into()),
            ("start_accent_list", vector(self.start_accent_list).into()),
            ("end_accent_list", vector(self.end_accent_list).into()),
            ("start_accent_phrase_list", vector(self.start_accent_phrase_list).into()),
            ("end_accent_phrase_list", vector(self.end_accent_phrase_list).into()),
            ("speaker_id", speaker(self.speaker_id)),
        ])
    }
}

pub(crate) struct Decode {
    /// `[frames, 1]`
    pub(crate) f0: Array2<f32>,
    /// `[frames, NUM_PHONEMES]`, one-hot.
    pub(crate) phoneme: Array2<f32>,
    pub(crate) speaker_id: i64,
}

impl Signature for Decode {
    const OPERATION: Operation = Operation::Decode;
    const OUTPUT: &'static str = "wave";
    type Output = f32;

    fn output_len(&self) -> usize {
        self.phoneme.nrows() * SAMPLES_PER_FRAME
    }

    fn into_tensors(self) -> Result<Vec<(&'static str, Tensor)>> {
        debug_assert_eq!(self.phoneme.ncols(), NUM_PHONEMES);
        debug_assert_eq!(self.f0.nrows(), self.phoneme.nrows());
        Ok(vec![
            ("f0", self.f0.into_dyn().into()),
            ("phoneme", self.phoneme.into_dyn().into()),
            ("speaker_id", speaker(self.speaker_id)),
        ])
    }
}

pub(crate) struct PredictSingConsonantLength {
    pub(crate) consonants: Vec<i64>,
    pub(crate) vowels: Vec<i64>,
    pub(crate) note_durations: Vec<i64>,
    pub(crate) speaker_id: i64,
}

impl Signature for PredictSingConsonantLength {
    const OPERATION: Operation = Operation::PredictSingConsonantLength;
    const OUTPUT: &'static str = "consonant_lengths";
    type Output = i64;

    fn output_len(&self) -> usize {
        self.note_durations.len()
    }

    fn into_tensors(self) -> Result<Vec<(&'static str, Tensor)>> {
        Ok(vec![
            ("consonants", batch(self.consonants)?.into()),
            ("vowels", batch(self.vowels)?.into()),
            ("note_durations", batch(self.note_durations)?.into()),
            ("speaker_id", speaker(self.speaker_id)),
        ])
    }
}

pub(crate) struct PredictSingF0 {
    pub(crate) phonemes: Vec<i64>,
    pub(crate) notes: Vec<i64>,
    pub(crate) speaker_id: i64,
}

impl Signature for PredictSingF0 {
    const OPERATION: Operation = Operation::PredictSingF0;
    const OUTPUT: &'static str = "f0s";
    type Output = f32;

    fn output_len(&self) -> usize {
        self.phonemes.len()
    }

    fn into_tensors(self) -> Result<Vec<(&'static str, Tensor)>> {
        Ok(vec![
            ("phonemes", batch(self.phonemes)?.into()),
            ("notes", batch(self.notes)?.into()),
            ("speaker_id", speaker(self.speaker_id)),
        ])
    }
}

pub(crate) struct PredictSingVolume {
    pub(crate) phonemes: Vec<i64>,
    pub(crate) notes: Vec<i64>,
    pub(crate) frame_f0s: Vec<f32>,
    pub(crate) speaker_id: i64,
}

impl Signature for PredictSingVolume {
    const OPERATION: Operation = Operation::PredictSingVolume;
    const OUTPUT: &'static str = "volumes";
    type Output = f32;

    fn output_len(&self) -> usize {
        self.phonemes.len()
    }

    fn into_tensors(self) -> Result<Vec<(&'static str, Tensor)>> {
        Ok(vec![
            ("phonemes", batch(self.phonemes)?.into()),
            ("notes", batch(self.notes)?.into()),
            ("frame_f0s", batch(self.frame_f0s)?.into()),
            ("speaker_id", speaker(self.speaker_id)),
        ])
    }
}

pub(crate) struct SfDecode {
    pub(crate) frame_phonemes: Vec<i64>,
    pub(crate) frame_f0s: Vec<f32>,
    pub(crate) frame_volumes: Vec<f32>,
    pub(crate) speaker_id: i64,
}

impl Signature for SfDecode {
    const OPERATION: Operation = Operation::SfDecode;
    const OUTPUT: &'static str = "wav";
    type Output = f32;

    fn output_len(&self) -> usize {
        self.frame_phonemes.len() * SAMPLES_PER_FRAME
    }

    fn into_tensors(self) -> Result<Vec<(&'static str, Tensor)>> {
        Ok(vec![
            ("frame_phonemes", batch(self.frame_phonemes)?.into()),
            ("frame_f0s", batch(self.frame_f0s)?.into()),
            ("frame_volumes", batch(self.frame_volumes)?.into()),
            ("speaker_id", speaker(self.speaker_id)),
        ])
    }
}
