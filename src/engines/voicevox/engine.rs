use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex, RwLock};

use super::analyzer::TextAnalyzer;
use super::audio::{self, AudioFeature};
use super::model::{DomainSessions, LoadedModel};
use super::morph::{self, MorphableTargetInfo};
use super::pipeline;
use super::runtime::{Domain, InferenceRuntime, SessionOptions};
use super::song;
use super::voices::VoiceModelFile;
use crate::error::{Error, Result};
use crate::metas::{self, CharacterMeta, StyleId, StyleType, VoiceModelId, VoiceModelMeta};
use crate::options::{SynthesisOptions, SynthesizerOptions, TtsOptions};
use crate::query::kana::{create_kana, parse_kana};
use crate::query::{AccentPhrase, AudioQuery, FrameAudioQuery, Score};
use crate::user_dict::UserDict;

/// The synchronous speech synthesizer.
///
/// A cheap handle: clones share the loaded models and the open/closed state.
/// Dropping the last handle closes it.
///
/// # Quick Start
///
/// ```rust,no_run
/// # #[cfg(feature = "onnxruntime")]
/// # {
/// use vvtts_rs::blocking::Synthesizer;
/// use vvtts_rs::onnx::Onnxruntime;
/// use vvtts_rs::{StyleId, SynthesizerOptions, TtsOptions, VoiceModelFile};
///
/// let synthesizer = Synthesizer::new(Onnxruntime::new(), SynthesizerOptions::default());
/// synthesizer.load_voice_model(&VoiceModelFile::open("models/0.vvm")?)?;
/// let wav = synthesizer.tts_from_kana("コンニチワ'", StyleId(0), &TtsOptions::default())?;
/// std::fs::write("out.wav", wav)?;
/// # }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone)]
pub struct Synthesizer {
    inner: Arc<Inner>,
}

struct Inner {
    runtime: Box<dyn InferenceRuntime>,
    text_analyzer: Option<Box<dyn TextAnalyzer>>,
    options: SynthesizerOptions,
    state: Mutex<State>,
    drained: Condvar,
    models: RwLock<IndexMap<VoiceModelId, Arc<LoadedModel>>>,
}

#[derive(Default)]
struct State {
    closed: bool,
    in_flight: usize,
}

/// Marks a call in progress. `close()` waits for every one to drop.
struct Call<'a> {
    inner: &'a Inner,
}

impl Drop for Call<'_> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.in_flight -= 1;
        if state.in_flight == 0 {
            self.inner.drained.notify_all();
        }
    }
}

impl Inner {
    fn enter(&self) -> Result<Call<'_>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::Closed);
        }
        state.in_flight += 1;
        Ok(Call { inner: self })
    }

    fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        while state.in_flight > 0 {
            self.drained.wait(&mut state);
        }
        drop(state);

        let unloaded = std::mem::take(&mut *self.models.write());
        log::info!("Synthesizer closed; released {} voice models", unloaded.len());
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.close();
    }
}

/// A loaded style: the sessions to run and the speaker index to run them with.
struct Resolved {
    model: Arc<LoadedModel>,
    sessions: Arc<DomainSessions>,
    speaker_id: i64,
}

impl Resolved {
    fn character(&self, style_id: StyleId) -> Result<&CharacterMeta> {
        self.model
            .style(style_id)
            .map(|(character, _)| character)
            .ok_or(Error::StyleNotFound { style_id })
    }
}

fn ensure_loadable(
    models: &IndexMap<VoiceModelId, Arc<LoadedModel>>,
    model: &VoiceModelFile,
) -> Result<()> {
    if models.contains_key(&model.id()) {
        return Err(Error::ModelAlreadyLoaded {
            model_id: model.id(),
        });
    }
    let clash = model
        .metas()
        .iter()
        .flat_map(|c| &c.styles)
        .find(|style| models.values().any(|m| m.style(style.id).is_some()));
    match clash {
        Some(style) => Err(Error::StyleAlreadyLoaded { style_id: style.id }),
        None => Ok(()),
    }
}

impl Synthesizer {
    /// Create a synthesizer without a text analyzer. Only the `*_from_kana`
    /// entry points accept text.
    pub fn new(runtime: impl InferenceRuntime + 'static, options: SynthesizerOptions) -> Self {
        Self::build(Box::new(runtime), None, options)
    }

    pub fn with_text_analyzer(
        runtime: impl InferenceRuntime + 'static,
        text_analyzer: impl TextAnalyzer + 'static,
        options: SynthesizerOptions,
    ) -> Self {
        Self::build(Box::new(runtime), Some(Box::new(text_analyzer)), options)
    }

    fn build(
        runtime: Box<dyn InferenceRuntime>,
        text_analyzer: Option<Box<dyn TextAnalyzer>>,
        options: SynthesizerOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                runtime,
                text_analyzer,
                options,
                state: Mutex::default(),
                drained: Condvar::new(),
                models: RwLock::default(),
            }),
        }
    }

    /// A handle that closes the synthesizer when dropped.
    pub fn scoped(&self) -> ClosingGuard {
        ClosingGuard {
            synthesizer: self.clone(),
        }
    }

    /// Refuse new calls, wait for running ones and release every model.
    ///
    /// Closing twice is a no-op. Calling this from inside a call on the same
    /// synthesizer never returns.
    pub fn close(&self) {
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    pub fn options(&self) -> &SynthesizerOptions {
        &self.inner.options
    }

    pub fn load_voice_model(&self, model: &VoiceModelFile) -> Result<()> {
        let _call = self.inner.enter()?;
        ensure_loadable(&self.inner.models.read(), model)?;

        let session_options = SessionOptions {
            cpu_num_threads: self.inner.options.cpu_num_threads,
            optimized_model_cache_dir: self.inner.options.optimized_model_cache_dir.clone(),
        };
        let loaded = LoadedModel::load(model, &*self.inner.runtime, &session_options)?;

        // Sessions are built without the lock; another call may have loaded a
        // clashing model meanwhile.
        let mut models = self.inner.models.write();
        ensure_loadable(&models, model)?;
        models.insert(model.id(), Arc::new(loaded));
        drop(models);
        log::info!("Loaded voice model {}", model.id());
        Ok(())
    }

    pub fn unload_voice_model(&self, model_id: VoiceModelId) -> Result<()> {
        let _call = self.inner.enter()?;
        self.inner
            .models
            .write()
            .shift_remove(&model_id)
            .ok_or(Error::ModelNotFound { model_id })?;
        log::info!("Unloaded voice model {model_id}");
        Ok(())
    }

    pub fn is_loaded_voice_model(&self, model_id: VoiceModelId) -> Result<bool> {
        let _call = self.inner.enter()?;
        Ok(self.inner.models.read().contains_key(&model_id))
    }

    /// Metadata of every loaded model, merged by character.
    pub fn metas(&self) -> Result<VoiceModelMeta> {
        let _call = self.inner.enter()?;
        let models = self.inner.models.read();
        Ok(metas::merge(models.values().flat_map(|m| &m.metas)))
    }

    fn resolve(&self, style_id: StyleId, domain: Domain) -> Result<Resolved> {
        let models = self.inner.models.read();
        models
            .values()
            .find_map(|model| {
                let sessions = model.sessions_for(style_id, domain)?;
                Some(Resolved {
                    model: model.clone(),
                    sessions: sessions.clone(),
                    speaker_id: sessions.inner_voice_id(style_id),
                })
            })
            .ok_or(Error::StyleNotFound { style_id })
    }

    fn validate_phrases(&self, accent_phrases: &[AccentPhrase]) -> Result<()> {
        accent_phrases
            .iter()
            .try_for_each(|p| p.validate(self.inner.options.validation))
    }

    fn text_analyzer(&self) -> Result<&dyn TextAnalyzer> {
        self.inner
            .text_analyzer
            .as_deref()
            .ok_or(Error::NoTextAnalyzer)
    }

    pub fn replace_mora_data(
        &self,
        accent_phrases: &[AccentPhrase],
        style_id: StyleId,
    ) -> Result<Vec<AccentPhrase>> {
        let _call = self.inner.enter()?;
        self.replace_mora_data_inner(accent_phrases, style_id)
    }

    fn replace_mora_data_inner(
        &self,
        accent_phrases: &[AccentPhrase],
        style_id: StyleId,
    ) -> Result<Vec<AccentPhrase>> {
        self.validate_phrases(accent_phrases)?;
        let talk = self.resolve(style_id, Domain::Talk)?;
        pipeline::replace_mora_data(&talk.sessions, talk.speaker_id, accent_phrases)
    }

    pub fn replace_phoneme_length(
        &self,
        accent_phrases: &[AccentPhrase],
        style_id: StyleId,
    ) -> Result<Vec<AccentPhrase>> {
        let _call = self.inner.enter()?;
        self.validate_phrases(accent_phrases)?;
        let talk = self.resolve(style_id, Domain::Talk)?;
        pipeline::replace_phoneme_length(&talk.sessions, talk.speaker_id, accent_phrases)
    }

    pub fn replace_mora_pitch(
        &self,
        accent_phrases: &[AccentPhrase],
        style_id: StyleId,
    ) -> Result<Vec<AccentPhrase>> {
        let _call = self.inner.enter()?;
        self.validate_phrases(accent_phrases)?;
        let talk = self.resolve(style_id, Domain::Talk)?;
        pipeline::replace_mora_pitch(&talk.sessions, talk.speaker_id, accent_phrases)
    }

    /// Analyze `text` with the configured text analyzer and predict its
    /// lengths and pitches.
    pub fn create_accent_phrases(&self, text: &str, style_id: StyleId) -> Result<Vec<AccentPhrase>> {
        let _call = self.inner.enter()?;
        let accent_phrases = self.text_analyzer()?.analyze(text)?;
        self.replace_mora_data_inner(&accent_phrases, style_id)
    }

    /// Like [`Self::create_accent_phrases`], for AquesTalk-style kana.
    pub fn create_accent_phrases_from_kana(
        &self,
        kana: &str,
        style_id: StyleId,
    ) -> Result<Vec<AccentPhrase>> {
        let _call = self.inner.enter()?;
        self.replace_mora_data_inner(&parse_kana(kana)?, style_id)
    }

    pub fn audio_query(&self, text: &str, style_id: StyleId) -> Result<AudioQuery> {
        let _call = self.inner.enter()?;
        self.audio_query_inner(text, style_id)
    }

    fn audio_query_inner(&self, text: &str, style_id: StyleId) -> Result<AudioQuery> {
        let accent_phrases = self.text_analyzer()?.analyze(text)?;
        let accent_phrases = self.replace_mora_data_inner(&accent_phrases, style_id)?;
        let kana = create_kana(&accent_phrases);
        Ok(AudioQuery::from_accent_phrases(accent_phrases).with_kana(Some(kana)))
    }

    pub fn audio_query_from_kana(&self, kana: &str, style_id: StyleId) -> Result<AudioQuery> {
        let _call = self.inner.enter()?;
        self.audio_query_from_kana_inner(kana, style_id)
    }

    fn audio_query_from_kana_inner(&self, kana: &str, style_id: StyleId) -> Result<AudioQuery> {
        let accent_phrases = self.replace_mora_data_inner(&parse_kana(kana)?, style_id)?;
        Ok(AudioQuery::from_accent_phrases(accent_phrases).with_kana(Some(kana.to_owned())))
    }

    /// Lay `query` out as frames for [`Self::render`].
    pub fn precompute_render(
        &self,
        query: &AudioQuery,
        style_id: StyleId,
        options: &SynthesisOptions,
    ) -> Result<AudioFeature> {
        let _call = self.inner.enter()?;
        self.precompute_render_inner(query, style_id, options)
    }

    fn precompute_render_inner(
        &self,
        query: &AudioQuery,
        style_id: StyleId,
        options: &SynthesisOptions,
    ) -> Result<AudioFeature> {
        query.validate(self.inner.options.validation)?;
        self.resolve(style_id, Domain::Talk)?;
        audio::precompute_render(query, style_id, options)
    }

    /// Render frames `start..end` of `feature` as PCM without a header.
    ///
    /// The range is clipped to the feature. Concatenating consecutive chunks
    /// gives the same bytes as rendering the whole range at once.
    pub fn render(&self, feature: &AudioFeature, start: usize, end: usize) -> Result<Vec<u8>> {
        let _call = self.inner.enter()?;
        let talk = self.resolve(feature.style_id(), Domain::Talk)?;
        audio::render(&talk.sessions, talk.speaker_id, feature, start, end)
    }

    /// Render `query` into a WAV file.
    pub fn synthesis(
        &self,
        query: &AudioQuery,
        style_id: StyleId,
        options: &SynthesisOptions,
    ) -> Result<Vec<u8>> {
        let _call = self.inner.enter()?;
        self.synthesis_inner(query, style_id, options)
    }

    fn synthesis_inner(
        &self,
        query: &AudioQuery,
        style_id: StyleId,
        options: &SynthesisOptions,
    ) -> Result<Vec<u8>> {
        let feature = self.precompute_render_inner(query, style_id, options)?;
        let talk = self.resolve(style_id, Domain::Talk)?;
        let pcm = audio::render(
            &talk.sessions,
            talk.speaker_id,
            &feature,
            0,
            feature.frame_length(),
        )?;
        audio::wav_from_s16le(&pcm, query.output_sampling_rate, query.output_stereo)
    }

    pub fn tts(&self, text: &str, style_id: StyleId, options: &TtsOptions) -> Result<Vec<u8>> {
        let _call = self.inner.enter()?;
        let query = self.audio_query_inner(text, style_id)?;
        self.synthesis_inner(&query, style_id, &options.into())
    }

    pub fn tts_from_kana(&self, kana: &str, style_id: StyleId, options: &TtsOptions) -> Result<Vec<u8>> {
        let _call = self.inner.enter()?;
        let query = self.audio_query_from_kana_inner(kana, style_id)?;
        self.synthesis_inner(&query, style_id, &options.into())
    }

    /// Render `query` with both styles and blend the waveforms:
    /// `base * (1 - morph_rate) + target * morph_rate`.
    pub fn synthesis_morphing(
        &self,
        query: &AudioQuery,
        base_style_id: StyleId,
        target_style_id: StyleId,
        morph_rate: f32,
        options: &SynthesisOptions,
    ) -> Result<Vec<u8>> {
        let _call = self.inner.enter()?;
        let base = self.resolve(base_style_id, Domain::Talk)?;
        let target = self.resolve(target_style_id, Domain::Talk)?;
        morph::ensure_permitted(
            base.character(base_style_id)?,
            target.character(target_style_id)?,
        )?;
        morph::ensure_rate(morph_rate)?;

        let feature = self.precompute_render_inner(query, base_style_id, options)?;
        let n = feature.frame_length();
        let base_wave = audio::decode(&base.sessions, base.speaker_id, &feature, 0, n)?;
        let target_wave = audio::decode(&target.sessions, target.speaker_id, &feature, 0, n)?;
        let wave = morph::mix(&base_wave, &target_wave, morph_rate);

        let pcm = audio::to_s16le_pcm(
            &wave,
            query.volume_scale,
            query.output_sampling_rate,
            query.output_stereo,
        );
        audio::wav_from_s16le(&pcm, query.output_sampling_rate, query.output_stereo)
    }

    /// For every other loaded style, whether `style_id` may morph into it.
    pub fn morphable_targets(
        &self,
        style_id: StyleId,
    ) -> Result<BTreeMap<StyleId, MorphableTargetInfo>> {
        let _call = self.inner.enter()?;
        let models = self.inner.models.read();
        let (base_character, base_style) = models
            .values()
            .find_map(|m| m.style(style_id))
            .ok_or(Error::StyleNotFound { style_id })?;

        Ok(models
            .values()
            .flat_map(|m| &m.metas)
            .flat_map(|character| character.styles.iter().map(move |style| (character, style)))
            .filter(|(_, style)| style.id != style_id)
            .map(|(character, style)| {
                let is_morphable = base_style.r#type == StyleType::Talk
                    && style.r#type == StyleType::Talk
                    && morph::is_permitted(base_character, character);
                (style.id, MorphableTargetInfo { is_morphable })
            })
            .collect())
    }

    /// Predict a frame-level singing query from `score` with a singing-teacher style.
    pub fn create_sing_frame_audio_query(
        &self,
        score: &Score,
        style_id: StyleId,
    ) -> Result<FrameAudioQuery> {
        let _call = self.inner.enter()?;
        let teacher = self.resolve(style_id, Domain::SingingTeacher)?;
        song::create_sing_frame_audio_query(&teacher.sessions, teacher.speaker_id, score)
    }

    pub fn create_sing_frame_f0(
        &self,
        score: &Score,
        query: &FrameAudioQuery,
        style_id: StyleId,
    ) -> Result<Vec<f32>> {
        let _call = self.inner.enter()?;
        let teacher = self.resolve(style_id, Domain::SingingTeacher)?;
        song::create_sing_frame_f0(&teacher.sessions, teacher.speaker_id, score, query)
    }

    pub fn create_sing_frame_volume(
        &self,
        score: &Score,
        query: &FrameAudioQuery,
        style_id: StyleId,
    ) -> Result<Vec<f32>> {
        let _call = self.inner.enter()?;
        let teacher = self.resolve(style_id, Domain::SingingTeacher)?;
        song::create_sing_frame_volume(&teacher.sessions, teacher.speaker_id, score, query)
    }

    /// Render a frame-level query into a WAV file with a frame-decode style.
    pub fn frame_synthesis(&self, query: &FrameAudioQuery, style_id: StyleId) -> Result<Vec<u8>> {
        let _call = self.inner.enter()?;
        query.validate(self.inner.options.validation)?;
        let decoder = self.resolve(style_id, Domain::FrameDecode)?;
        song::frame_synthesis(&decoder.sessions, decoder.speaker_id, query)
    }

    /// Hand the words of `dict` to the text analyzer.
    pub fn use_user_dict(&self, dict: &UserDict) -> Result<()> {
        let _call = self.inner.enter()?;
        self.text_analyzer()?.use_user_dict(&dict.to_mecab_format())
    }
}

/// Closes its synthesizer when dropped. Returned by [`Synthesizer::scoped`].
pub struct ClosingGuard {
    synthesizer: Synthesizer,
}

impl Deref for ClosingGuard {
    type Target = Synthesizer;

    fn deref(&self) -> &Synthesizer {
        &self.synthesizer
    }
}

impl Drop for ClosingGuard {
    fn drop(&mut self) {
        self.synthesizer.close();
    }
}
