//! Frame layout of a query, chunked decoding and PCM/WAV assembly.

use std::io::Cursor;

use ndarray::Array2;

use super::marshal::{self, Decode, SAMPLES_PER_FRAME};
use super::model::DomainSessions;
use super::runtime::Operation;
use crate::error::{Error, Result};
use crate::metas::StyleId;
use crate::options::SynthesisOptions;
use crate::query::kana::mora_to_text;
use crate::query::phoneme::{is_mora_tail, phoneme_id, NUM_PHONEMES};
use crate::query::{AccentPhrase, AudioQuery, Mora, SamplingRate, DEFAULT_SAMPLING_RATE};

/// Acoustic frames per second.
pub const FRAME_RATE: f64 = DEFAULT_SAMPLING_RATE as f64 / SAMPLES_PER_FRAME as f64;

/// Silence added around the utterance before decoding, in seconds.
const PADDING_SECONDS: f64 = 0.4;

/// Extra frames decoded on each side of a chunk so its edges match a full render.
///
/// Chunked and full renders are identical as long as the decoder's receptive
/// field reaches no further than this many frames in either direction.
const MARGIN: usize = 14;

/// Longest utterance `precompute_render` lays out, about 12 hours.
const MAX_FRAME_LENGTH: usize = 1 << 22;

const UPSPEAK_VOWEL_LENGTH: f32 = 0.15;
const UPSPEAK_PITCH_DELTA: f32 = 0.3;
const UPSPEAK_MAX_PITCH: f32 = 6.5;

/// A query laid out as decoder frames, ready to be rendered in chunks.
///
/// Produced by `Synthesizer::precompute_render`. Rendering `0..frame_length()`
/// in any number of consecutive chunks gives the same bytes as one render.
#[derive(Clone, Debug)]
pub struct AudioFeature {
    style_id: StyleId,
    /// `[frames]`, padding included.
    f0: Vec<f32>,
    /// `[frames, NUM_PHONEMES]`, padding included.
    phoneme: Array2<f32>,
    frame_length: usize,
    padding_frame_length: usize,
    volume_scale: f32,
    output_sampling_rate: SamplingRate,
    output_stereo: bool,
}

impl AudioFeature {
    pub fn style_id(&self) -> StyleId {
        self.style_id
    }

    /// Number of frames of the utterance, padding excluded.
    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    pub fn frame_rate(&self) -> f64 {
        FRAME_RATE
    }

    pub fn volume_scale(&self) -> f32 {
        self.volume_scale
    }

    pub fn output_sampling_rate(&self) -> SamplingRate {
        self.output_sampling_rate
    }

    pub fn output_stereo(&self) -> bool {
        self.output_stereo
    }

    /// Frame range clipped to the utterance, or `None` when it is empty.
    fn clip(&self, start: usize, end: usize) -> Option<(usize, usize)> {
        let end = end.min(self.frame_length);
        let start = start.min(end);
        (start < end).then_some((start, end))
    }
}

/// Lay `query` out as decoder frames. No inference happens here.
pub(crate) fn precompute_render(
    query: &AudioQuery,
    style_id: StyleId,
    options: &SynthesisOptions,
) -> Result<AudioFeature> {
    let accent_phrases = if options.enable_interrogative_upspeak {
        with_interrogative_upspeak(&query.accent_phrases)
    } else {
        query.accent_phrases.clone()
    };
    let moras = accent_phrases
        .iter()
        .flat_map(|p| p.moras.iter().chain(&p.pause_mora))
        .collect::<Vec<_>>();

    let mut phonemes = vec!["pau"];
    let mut phoneme_lengths = vec![query.pre_phoneme_length];
    let mut f0s = vec![0.];
    for mora in &moras {
        if let Some(consonant) = &mora.consonant {
            phonemes.push(consonant);
            phoneme_lengths.push(mora.consonant_length.unwrap_or_default());
        }
        phonemes.push(&mora.vowel);
        phoneme_lengths.push(mora.vowel_length);
        f0s.push(mora.pitch * 2f32.powf(query.pitch_scale));
    }
    phonemes.push("pau");
    phoneme_lengths.push(query.post_phoneme_length);
    f0s.push(0.);

    let voiced = f0s.iter().filter(|&&f0| f0 > 0.).copied().collect::<Vec<_>>();
    let mean = voiced.iter().sum::<f32>() / voiced.len() as f32;
    if !mean.is_nan() {
        for f0 in f0s.iter_mut().filter(|f0| **f0 > 0.) {
            *f0 = (*f0 - mean) * query.intonation_scale + mean;
        }
    }

    let mut frames_per_phoneme = Vec::with_capacity(phoneme_lengths.len());
    let mut frame_length = 0usize;
    for &length in &phoneme_lengths {
        let frames = (f64::from(length) * FRAME_RATE).round_ties_even();
        let frames = (frames / f64::from(query.speed_scale))
            .round_ties_even()
            .max(0.);
        if frames > MAX_FRAME_LENGTH as f64 {
            return Err(too_long());
        }
        let frames = frames as usize;
        frame_length = frame_length
            .checked_add(frames)
            .filter(|&n| n <= MAX_FRAME_LENGTH)
            .ok_or_else(too_long)?;
        frames_per_phoneme.push(frames);
    }
    let padding_frame_length = (PADDING_SECONDS * FRAME_RATE).round() as usize;
    let total = frame_length + 2 * padding_frame_length;

    let mut phoneme = Array2::<f32>::zeros((total, NUM_PHONEMES));
    let mut f0 = Vec::with_capacity(total);
    f0.resize(padding_frame_length, 0.);
    let mut frame = padding_frame_length;
    let mut pending = 0;
    let mut mora_f0s = f0s.iter();
    for (&p, &n) in phonemes.iter().zip(&frames_per_phoneme) {
        let id = phoneme_id(p)
            .ok_or_else(|| Error::invalid_query("phoneme", format!("unknown phoneme `{p}`")))?;
        for row in frame..frame + n {
            phoneme[[row, id as usize]] = 1.;
        }
        frame += n;
        pending += n;
        // Consonant frames take the pitch of the vowel that follows them.
        if is_mora_tail(p) {
            let value = mora_f0s.next().copied().unwrap_or_default();
            f0.extend(std::iter::repeat(value).take(pending));
            pending = 0;
        }
    }
    f0.resize(total, 0.);
    for row in (0..padding_frame_length).chain(frame..total) {
        phoneme[[row, 0]] = 1.;
    }
    log::debug!("laid out {} phonemes as {frame_length} frames", phonemes.len());

    Ok(AudioFeature {
        style_id,
        f0,
        phoneme,
        frame_length,
        padding_frame_length,
        volume_scale: query.volume_scale,
        output_sampling_rate: query.output_sampling_rate,
        output_stereo: query.output_stereo,
    })
}

fn too_long() -> Error {
    Error::invalid_query(
        "audio query",
        format!("the utterance is longer than {MAX_FRAME_LENGTH} frames"),
    )
}

/// Append a rising mora to every interrogative phrase that ends voiced.
fn with_interrogative_upspeak(accent_phrases: &[AccentPhrase]) -> Vec<AccentPhrase> {
    accent_phrases
        .iter()
        .map(|phrase| {
            let mut phrase = phrase.clone();
            if phrase.is_interrogative {
                if let Some(last) = phrase.moras.last().filter(|m| m.pitch != 0.) {
                    let mora = Mora {
                        text: mora_to_text(None, &last.vowel),
                        consonant: None,
                        consonant_length: None,
                        vowel: last.vowel.clone(),
                        vowel_length: UPSPEAK_VOWEL_LENGTH,
                        pitch: (last.pitch + UPSPEAK_PITCH_DELTA).min(UPSPEAK_MAX_PITCH),
                    };
                    phrase.moras.push(mora);
                }
            }
            phrase
        })
        .collect()
}

/// Decode frames `start..end` of `feature` into 24 kHz samples.
pub(crate) fn decode(
    sessions: &DomainSessions,
    speaker_id: i64,
    feature: &AudioFeature,
    start: usize,
    end: usize,
) -> Result<Vec<f32>> {
    let Some((start, end)) = feature.clip(start, end) else {
        return Ok(Vec::new());
    };
    let from = feature.padding_frame_length + start - MARGIN;
    let to = feature.padding_frame_length + end + MARGIN;
    log::debug!("decoding frames {start}..{end} ({} with margins)", to - from);

    let f0 = Array2::from_shape_vec((to - from, 1), feature.f0[from..to].to_vec())?;
    let phoneme = feature.phoneme.slice(ndarray::s![from..to, ..]).to_owned();
    let wave = marshal::run(
        sessions.session(Operation::Decode)?,
        Decode {
            f0,
            phoneme,
            speaker_id,
        },
    )?;
    let trim = MARGIN * SAMPLES_PER_FRAME;
    Ok(wave[trim..wave.len() - trim].to_vec())
}

/// Decode frames `start..end` of `feature` into PCM bytes.
pub(crate) fn render(
    sessions: &DomainSessions,
    speaker_id: i64,
    feature: &AudioFeature,
    start: usize,
    end: usize,
) -> Result<Vec<u8>> {
    let wave = decode(sessions, speaker_id, feature, start, end)?;
    Ok(to_s16le_pcm(
        &wave,
        feature.volume_scale,
        feature.output_sampling_rate,
        feature.output_stereo,
    ))
}

/// Signed 16-bit little-endian PCM. Each sample is repeated once per channel
/// and once per multiple of the model rate.
pub(crate) fn to_s16le_pcm(
    wave: &[f32],
    volume_scale: f32,
    output_sampling_rate: SamplingRate,
    output_stereo: bool,
) -> Vec<u8> {
    let channels = if output_stereo { 2 } else { 1 };
    let repeat = output_sampling_rate.upsample_factor() * channels;
    let mut pcm = Vec::with_capacity(wave.len() * 2 * repeat);
    for &sample in wave {
        let sample = ((sample * volume_scale).clamp(-1., 1.) * i16::MAX as f32) as i16;
        for _ in 0..repeat {
            pcm.extend_from_slice(&sample.to_le_bytes());
        }
    }
    pcm
}

/// Wrap s16le `pcm` in a WAV container.
pub fn wav_from_s16le(
    pcm: &[u8],
    output_sampling_rate: SamplingRate,
    output_stereo: bool,
) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: if output_stereo { 2 } else { 1 },
        sample_rate: output_sampling_rate.0,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut wav = Cursor::new(Vec::with_capacity(44 + pcm.len()));
    let mut writer = hound::WavWriter::new(&mut wav, spec)?;
    for sample in pcm.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([sample[0], sample[1]]))?;
    }
    writer.finalize()?;
    Ok(wav.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::voicevox::testing;
    use crate::query::kana::parse_kana;
    use crate::ErrorKind;

    fn query(kana: &str) -> AudioQuery {
        let mut phrases = parse_kana(kana).unwrap();
        for mora in phrases.iter_mut().flat_map(|p| p.moras.iter_mut()) {
            mora.consonant_length = mora.consonant.as_ref().map(|_| 0.05);
            mora.vowel_length = 0.1;
            mora.pitch = 5.5;
        }
        AudioQuery::from_accent_phrases(phrases)
    }

    fn feature(query: &AudioQuery, upspeak: bool) -> AudioFeature {
        let options = SynthesisOptions {
            enable_interrogative_upspeak: upspeak,
        };
        precompute_render(query, StyleId(302), &options).unwrap()
    }

    #[test]
    fn frames_are_padded_and_rounded_half_to_even() {
        let query = query("ア'");
        let feature = feature(&query, true);
        // pre 0.1s → 9.375 → 9, "ア" 0.1s → 9, post 0.1s → 9
        assert_eq!(feature.frame_length(), 27);
        assert_eq!(feature.padding_frame_length, 38);
        assert_eq!(feature.f0.len(), 27 + 2 * 38);
        assert_eq!(feature.phoneme.nrows(), feature.f0.len());
        for row in feature.phoneme.rows() {
            assert_eq!(row.sum(), 1.);
        }
        let voiced = feature.f0.iter().filter(|&&f0| f0 > 0.).count();
        assert_eq!(voiced, 9);
        assert_eq!(feature.f0[38 + 9], 5.5);

        let mut slow = query.clone();
        slow.speed_scale = 0.5;
        assert_eq!(self::feature(&slow, true).frame_length(), 54);
    }

    #[test]
    fn oversized_lengths_are_rejected() {
        let options = SynthesisOptions::default();
        let mut long = query("ア'");
        long.pre_phoneme_length = 1e30;
        let err = precompute_render(&long, StyleId(302), &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidQuery);

        let mut fast = query("ア'");
        fast.speed_scale = 1e-30;
        let err = precompute_render(&fast, StyleId(302), &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidQuery);

        let mut mora = query("ア'");
        mora.accent_phrases[0].moras[0].vowel_length = f32::INFINITY;
        let err = precompute_render(&mora, StyleId(302), &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidQuery);

        // Many phonemes that each fit but overflow together.
        let mut many = query("ア'");
        many.accent_phrases[0].moras[0].vowel_length = 30_000.;
        let mora = many.accent_phrases[0].moras[0].clone();
        many.accent_phrases[0].moras = vec![mora; 4];
        let err = precompute_render(&many, StyleId(302), &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidQuery);
    }

    #[test]
    fn consonant_frames_carry_the_vowel_pitch() {
        let mut query = query("カ'");
        query.pre_phoneme_length = 0.;
        query.post_phoneme_length = 0.;
        let feature = feature(&query, true);
        // k: 0.05s → 4.6875 → 5, a: 0.1s → 9
        assert_eq!(feature.frame_length(), 14);
        assert!(feature.f0[38..52].iter().all(|&f0| f0 == 5.5));
        assert_eq!(feature.phoneme[[38, 23]], 1.);
        assert_eq!(feature.phoneme[[43, 7]], 1.);
    }

    #[test]
    fn intonation_scales_around_the_voiced_mean() {
        let mut query = query("アイ'");
        query.accent_phrases[0].moras[1].pitch = 6.5;
        query.intonation_scale = 0.;
        let feature = feature(&query, true);
        let voiced = feature.f0.iter().filter(|&&f0| f0 > 0.).collect::<Vec<_>>();
        assert!(voiced.iter().all(|&&f0| f0 == 6.));

        query.pitch_scale = 1.;
        query.intonation_scale = 1.;
        let feature = self::feature(&query, true);
        assert!(feature.f0.iter().any(|&f0| f0 == 13.));
    }

    #[test]
    fn upspeak_extends_interrogative_phrases() {
        let query = query("ア'？");
        let with = feature(&query, true);
        let without = feature(&query, false);
        // 0.15s → 14.0625 → 14
        assert_eq!(with.frame_length(), without.frame_length() + 14);

        let phrases = with_interrogative_upspeak(&query.accent_phrases);
        let added = phrases[0].moras.last().unwrap();
        assert_eq!(added.text, "ア");
        assert_eq!(added.vowel_length, 0.15);
        assert_eq!(added.pitch, 5.8);

        let mut silent = query.clone();
        silent.accent_phrases[0].moras[0].pitch = 0.;
        assert_eq!(with_interrogative_upspeak(&silent.accent_phrases)[0].moras.len(), 1);
    }

    #[test]
    fn chunked_render_matches_full_render() {
        let model = testing::loaded_model();
        let sessions = model.talk(302);
        let feature = feature(&query("コンニチワ'"), true);
        let n = feature.frame_length();

        let full = render(sessions, 0, &feature, 0, n).unwrap();
        assert_eq!(full.len(), n * SAMPLES_PER_FRAME * 2);

        let mut chunked = Vec::new();
        for start in (0..n).step_by(7) {
            chunked.extend(render(sessions, 0, &feature, start, start + 7).unwrap());
        }
        assert_eq!(chunked, full);

        assert!(render(sessions, 0, &feature, n, n + 10).unwrap().is_empty());
        assert_eq!(render(sessions, 0, &feature, n - 1, n + 10).unwrap().len(), 512);
    }

    #[test]
    fn chunks_match_while_the_decoder_looks_no_further_than_the_margin() {
        let feature = feature(&query("コンニチワ'"), true);
        let n = feature.frame_length();
        let chunked_and_full = |radius| {
            let model = testing::loaded_model_on(&testing::WideDecoderRuntime { radius });
            let sessions = model.talk(302);
            let full = render(sessions, 0, &feature, 0, n).unwrap();
            let chunked = (0..n)
                .step_by(7)
                .flat_map(|start| render(sessions, 0, &feature, start, start + 7).unwrap())
                .collect::<Vec<_>>();
            (chunked, full)
        };

        let (chunked, full) = chunked_and_full(MARGIN);
        assert_eq!(chunked, full);

        let (chunked, full) = chunked_and_full(MARGIN + 8);
        assert_eq!(chunked.len(), full.len());
        assert_ne!(chunked, full);
    }

    #[test]
    fn pcm_clamps_and_upsamples() {
        let pcm = to_s16le_pcm(&[0.5, 2., -2.], 1., SamplingRate(24000), false);
        assert_eq!(pcm, [0xff, 0x3f, 0xff, 0x7f, 0x01, 0x80]);

        let pcm = to_s16le_pcm(&[0.25], 2., SamplingRate(48000), true);
        assert_eq!(pcm.len(), 2 * 2 * 2);
        assert!(pcm.chunks(2).all(|s| s == [0xff, 0x3f]));
    }

    #[test]
    fn wav_header_is_canonical() {
        let pcm = to_s16le_pcm(&[0.1; 100], 1., SamplingRate(48000), true);
        let wav = wav_from_s16le(&pcm, SamplingRate(48000), true).unwrap();
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(&wav[8..16], b"WAVEfmt ");
        assert_eq!(wav.len(), 44 + 100 * 2 * 2 * 2);

        let mut reader = hound::WavReader::new(Cursor::new(&wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 48000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len(), 400);
        let samples = reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        let expected = pcm
            .chunks_exact(2)
            .map(|s| i16::from_le_bytes([s[0], s[1]]))
            .collect::<Vec<_>>();
        assert_eq!(samples, expected);
        assert_eq!(&wav[44..], &pcm[..]);
    }

    #[test]
    fn empty_pcm_is_a_valid_wav() {
        let wav = wav_from_s16le(&[], SamplingRate(24000), false).unwrap();
        assert_eq!(wav.len(), 44);
        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len(), 0);
    }
}
