//! Async facade over the blocking synthesizer.
//!
//! Every call runs on tokio's blocking thread pool, so inference never stalls
//! the async executor.

use std::collections::BTreeMap;

use super::analyzer::TextAnalyzer;
use super::audio::AudioFeature;
use super::engine;
use super::morph::MorphableTargetInfo;
use super::runtime::InferenceRuntime;
use super::voices::VoiceModelFile;
use crate::error::Result;
use crate::metas::{StyleId, VoiceModelId, VoiceModelMeta};
use crate::options::{SynthesisOptions, SynthesizerOptions, TtsOptions};
use crate::query::{AccentPhrase, AudioQuery, FrameAudioQuery, Score};
use crate::user_dict::UserDict;

/// The asynchronous speech synthesizer. Cloning shares the same models.
#[derive(Clone)]
pub struct Synthesizer {
    blocking: engine::Synthesizer,
}

impl Synthesizer {
    pub fn new(runtime: impl InferenceRuntime + 'static, options: SynthesizerOptions) -> Self {
        engine::Synthesizer::new(runtime, options).into()
    }

    pub fn with_text_analyzer(
        runtime: impl InferenceRuntime + 'static,
        text_analyzer: impl TextAnalyzer + 'static,
        options: SynthesizerOptions,
    ) -> Self {
        engine::Synthesizer::with_text_analyzer(runtime, text_analyzer, options).into()
    }

    /// The blocking synthesizer sharing this one's state.
    pub fn as_blocking(&self) -> &engine::Synthesizer {
        &self.blocking
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&engine::Synthesizer) -> Result<T> + Send + 'static,
    {
        let synthesizer = self.blocking.clone();
        tokio::task::spawn_blocking(move || f(&synthesizer)).await?
    }

    /// Waits for in-flight calls without blocking the executor.
    pub async fn close(&self) -> Result<()> {
        let synthesizer = self.blocking.clone();
        tokio::task::spawn_blocking(move || synthesizer.close()).await?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.blocking.is_closed()
    }

    pub async fn load_voice_model(&self, model: &VoiceModelFile) -> Result<()> {
        let model = model.clone();
        self.run(move |s| s.load_voice_model(&model)).await
    }

    pub async fn unload_voice_model(&self, model_id: VoiceModelId) -> Result<()> {
        self.run(move |s| s.unload_voice_model(model_id)).await
    }

    pub async fn is_loaded_voice_model(&self, model_id: VoiceModelId) -> Result<bool> {
        self.run(move |s| s.is_loaded_voice_model(model_id)).await
    }

    pub async fn metas(&self) -> Result<VoiceModelMeta> {
        self.run(|s| s.metas()).await
    }

    pub async fn create_accent_phrases(
        &self,
        text: &str,
        style_id: StyleId,
    ) -> Result<Vec<AccentPhrase>> {
        let text = text.to_owned();
        self.run(move |s| s.create_accent_phrases(&text, style_id))
            .await
    }

    pub async fn create_accent_phrases_from_kana(
        &self,
        kana: &str,
        style_id: StyleId,
    ) -> Result<Vec<AccentPhrase>> {
        let kana = kana.to_owned();
        self.run(move |s| s.create_accent_phrases_from_kana(&kana, style_id))
            .await
    }

    pub async fn replace_mora_data(
        &self,
        accent_phrases: &[AccentPhrase],
        style_id: StyleId,
    ) -> Result<Vec<AccentPhrase>> {
        let accent_phrases = accent_phrases.to_vec();
        self.run(move |s| s.replace_mora_data(&accent_phrases, style_id))
            .await
    }

    pub async fn replace_phoneme_length(
        &self,
        accent_phrases: &[AccentPhrase],
        style_id: StyleId,
    ) -> Result<Vec<AccentPhrase>> {
        let accent_phrases = accent_phrases.to_vec();
        self.run(move |s| s.replace_phoneme_length(&accent_phrases, style_id))
            .await
    }

    pub async fn replace_mora_pitch(
        &self,
        accent_phrases: &[AccentPhrase],
        style_id: StyleId,
    ) -> Result<Vec<AccentPhrase>> {
        let accent_phrases = accent_phrases.to_vec();
        self.run(move |s| s.replace_mora_pitch(&accent_phrases, style_id))
            .await
    }

    pub async fn audio_query(&self, text: &str, style_id: StyleId) -> Result<AudioQuery> {
        let text = text.to_owned();
        self.run(move |s| s.audio_query(&text, style_id)).await
    }

    pub async fn audio_query_from_kana(&self, kana: &str, style_id: StyleId) -> Result<AudioQuery> {
        let kana = kana.to_owned();
        self.run(move |s| s.audio_query_from_kana(&kana, style_id))
            .await
    }

    pub async fn precompute_render(
        &self,
        query: &AudioQuery,
        style_id: StyleId,
        options: &SynthesisOptions,
    ) -> Result<AudioFeature> {
        let (query, options) = (query.clone(), *options);
        self.run(move |s| s.precompute_render(&query, style_id, &options))
            .await
    }

    pub async fn render(&self, feature: &AudioFeature, start: usize, end: usize) -> Result<Vec<u8>> {
        let feature = feature.clone();
        self.run(move |s| s.render(&feature, start, end)).await
    }

    pub async fn synthesis(
        &self,
        query: &AudioQuery,
        style_id: StyleId,
        options: &SynthesisOptions,
    ) -> Result<Vec<u8>> {
        let (query, options) = (query.clone(), *options);
        self.run(move |s| s.synthesis(&query, style_id, &options))
            .await
    }

    pub async fn tts(&self, text: &str, style_id: StyleId, options: &TtsOptions) -> Result<Vec<u8>> {
        let (text, options) = (text.to_owned(), *options);
        self.run(move |s| s.tts(&text, style_id, &options)).await
    }

    pub async fn tts_from_kana(
        &self,
        kana: &str,
        style_id: StyleId,
        options: &TtsOptions,
    ) -> Result<Vec<u8>> {
        let (kana, options) = (kana.to_owned(), *options);
        self.run(move |s| s.tts_from_kana(&kana, style_id, &options))
            .await
    }

    pub async fn synthesis_morphing(
        &self,
        query: &AudioQuery,
        base_style_id: StyleId,
        target_style_id: StyleId,
        morph_rate: f32,
        options: &SynthesisOptions,
    ) -> Result<Vec<u8>> {
        let (query, options) = (query.clone(), *options);
        self.run(move |s| {
            s.synthesis_morphing(&query, base_style_id, target_style_id, morph_rate, &options)
        })
        .await
    }

    pub async fn morphable_targets(
        &self,
        style_id: StyleId,
    ) -> Result<BTreeMap<StyleId, MorphableTargetInfo>> {
        self.run(move |s| s.morphable_targets(style_id)).await
    }

    pub async fn create_sing_frame_audio_query(
        &self,
        score: &Score,
        style_id: StyleId,
    ) -> Result<FrameAudioQuery> {
        let score = score.clone();
        self.run(move |s| s.create_sing_frame_audio_query(&score, style_id))
            .await
    }

    pub async fn create_sing_frame_f0(
        &self,
        score: &Score,
        query: &FrameAudioQuery,
        style_id: StyleId,
    ) -> Result<Vec<f32>> {
        let (score, query) = (score.clone(), query.clone());
        self.run(move |s| s.create_sing_frame_f0(&score, &query, style_id))
            .await
    }

    pub async fn create_sing_frame_volume(
        &self,
        score: &Score,
        query: &FrameAudioQuery,
        style_id: StyleId,
    ) -> Result<Vec<f32>> {
        let (score, query) = (score.clone(), query.clone());
        self.run(move |s| s.create_sing_frame_volume(&score, &query, style_id))
            .await
    }

    pub async fn frame_synthesis(&self, query: &FrameAudioQuery, style_id: StyleId) -> Result<Vec<u8>> {
        let query = query.clone();
        self.run(move |s| s.frame_synthesis(&query, style_id))
            .await
    }

    /// The dictionary is converted up front. Later edits to `dict` are not seen.
    pub async fn use_user_dict(&self, dict: &UserDict) -> Result<()> {
        let snapshot = UserDict::new();
        snapshot.import(dict);
        self.run(move |s| s.use_user_dict(&snapshot)).await
    }
}

impl From<engine::Synthesizer> for Synthesizer {
    fn from(blocking: engine::Synthesizer) -> Self {
        Self { blocking }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::voicevox::analyzer::KanaAnalyzer;
    use crate::engines::voicevox::testing::{self, FakeRuntime, VvmBuilder};
    use crate::ErrorKind;

    async fn synthesizer() -> Synthesizer {
        testing::init_logger();
        let synthesizer =
            Synthesizer::with_text_analyzer(FakeRuntime, KanaAnalyzer, SynthesizerOptions::default());
        let vvm = VvmBuilder::talk_and_sing().write();
        let file = VoiceModelFile::open(&vvm).unwrap();
        std::fs::remove_file(vvm).unwrap();
        synthesizer.load_voice_model(&file).await.unwrap();
        synthesizer
    }

    #[tokio::test]
    async fn matches_the_blocking_synthesizer() {
        let synthesizer = synthesizer().await;
        let style = StyleId(302);
        let options = TtsOptions::default();

        let wav = synthesizer.tts_from_kana("コンニチワ'", style, &options).await.unwrap();
        let blocking = synthesizer
            .as_blocking()
            .tts_from_kana("コンニチワ'", style, &options)
            .unwrap();
        assert_eq!(wav, blocking);

        let query = synthesizer.audio_query("コンニチワ'", style).await.unwrap();
        let feature = synthesizer
            .precompute_render(&query, style, &SynthesisOptions::default())
            .await
            .unwrap();
        let pcm = synthesizer
            .render(&feature, 0, feature.frame_length())
            .await
            .unwrap();
        assert_eq!(pcm, wav[44..]);
    }

    #[tokio::test]
    async fn closing_rejects_later_calls() {
        let synthesizer = synthesizer().await;
        let id = VvmBuilder::talk_and_sing().id();
        assert!(synthesizer.is_loaded_voice_model(id).await.unwrap());

        synthesizer.close().await.unwrap();
        assert!(synthesizer.is_closed());
        let err = synthesizer.metas().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClosedResource);
        synthesizer.close().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_calls_share_models() {
        let synthesizer = synthesizer().await;
        let calls = (0..4).map(|i| {
            let synthesizer = synthesizer.clone();
            tokio::spawn(async move {
                synthesizer
                    .tts_from_kana("ア'", StyleId(302 + i % 2), &TtsOptions::default())
                    .await
            })
        });
        for call in calls.collect::<Vec<_>>() {
            assert!(call.await.unwrap().is_ok());
        }
    }
}
