//! Test doubles: a deterministic inference runtime and a VVM writer.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use ndarray::{Array, IxDyn};
use serde_json::{json, Value};
use uuid::Uuid;

use super::marshal::SAMPLES_PER_FRAME;
use super::model::{DomainSessions, LoadedModel};
use super::runtime::{
    Domain, InferenceRuntime, InferenceSession, ModelBytes, Operation, SessionOptions, Tensor,
};
use super::voices::VoiceModelFile;
use crate::error::{Error, Result};
use crate::metas::{StyleId, VoiceModelId};
use crate::query::phoneme::NUM_PHONEMES;

pub(crate) const DUMMY1_UUID: &str = "574bc678-8370-44be-b941-08e46e7b47d7";
pub(crate) const DUMMY2_UUID: &str = "dd9ccd75-75f6-40ce-a3db-960cbed2e905";
const TALK_AND_SING_ID: &str = "9d38a0a1-1b9c-4a8e-8f45-0d6d3f4c9a30";

/// Every output depends only on the inputs of its own element (or frame), so
/// decoding a sub-range gives exactly the matching slice of a full decode.
pub(crate) struct FakeRuntime;

impl InferenceRuntime for FakeRuntime {
    fn new_session(
        &self,
        _: &ModelBytes,
        operation: Operation,
        _: &SessionOptions,
    ) -> Result<Arc<dyn InferenceSession>> {
        Ok(Arc::new(FakeSession { operation }))
    }
}

struct FakeSession {
    operation: Operation,
}

impl InferenceSession for FakeSession {
    fn run(&self, inputs: Vec<(&'static str, Tensor)>) -> Result<Vec<(String, Tensor)>> {
        let inputs = inputs.into_iter().collect::<HashMap<_, _>>();
        let ints = |name: &str| match &inputs[name] {
            Tensor::Int64(a) => a.iter().copied().collect::<Vec<_>>(),
            Tensor::Float32(_) => panic!("`{name}` should be int64"),
        };
        let floats = |name: &str| match &inputs[name] {
            Tensor::Float32(a) => a.iter().copied().collect::<Vec<_>>(),
            Tensor::Int64(_) => panic!("`{name}` should be float32"),
        };
        let speaker = ints("speaker_id")[0] as f32;

        let (name, tensor): (&str, Tensor) = match self.operation {
            Operation::PredictDuration => {
                let lengths = ints("phoneme_list")
                    .iter()
                    .map(|&p| if p == 0 { 0.2 } else { 0.05 + 0.01 * (p % 5) as f32 })
                    .collect::<Vec<_>>();
                ("phoneme_length", flat(lengths))
            }
            Operation::PredictIntonation => {
                let starts = ints("start_accent_list");
                let f0 = ints("vowel_phoneme_list")
                    .iter()
                    .zip(starts)
                    .map(|(&v, s)| if v == 0 { 0. } else { 5. + 0.25 * speaker + 0.5 * s as f32 })
                    .collect::<Vec<_>>();
                ("f0_list", flat(f0))
            }
            Operation::Decode => {
                let f0 = floats("f0");
                let phoneme = floats("phoneme");
                let wave = phoneme
                    .chunks(NUM_PHONEMES)
                    .zip(f0)
                    .flat_map(|(one_hot, f0)| {
                        let id = one_hot.iter().position(|&x| x == 1.).unwrap_or(0);
                        let value = 0.01 * f0 + 0.001 * id as f32 + 0.1 * speaker;
                        (0..SAMPLES_PER_FRAME).map(move |i| value + i as f32 * 1e-5)
                    })
                    .collect::<Vec<_>>();
                ("wave", flat(wave))
            }
            Operation::PredictSingConsonantLength => {
                let lengths = ints("consonants")
                    .iter()
                    .map(|&c| if c < 0 { 0 } else { 3 })
                    .collect::<Vec<_>>();
                ("consonant_lengths", batch(lengths))
            }
            Operation::PredictSingF0 => {
                let f0 = ints("notes")
                    .iter()
                    .map(|&key| {
                        if key < 0 {
                            0.
                        } else {
                            440. * 2f32.powf((key - 69) as f32 / 12.) + speaker
                        }
                    })
                    .collect::<Vec<_>>();
                ("f0s", batch(f0))
            }
            Operation::PredictSingVolume => {
                let volumes = ints("phonemes")
                    .iter()
                    .zip(floats("frame_f0s"))
                    .map(|(&p, f0)| if p == 0 { 0. } else { 0.5 + f0 * 1e-4 })
                    .collect::<Vec<_>>();
                ("volumes", batch(volumes))
            }
            Operation::SfDecode => {
                let phonemes = ints("frame_phonemes");
                let wav = floats("frame_f0s")
                    .into_iter()
                    .zip(floats("frame_volumes"))
                    .zip(phonemes)
                    .flat_map(|((f0, volume), p)| {
                        let value = f0 * 1e-4 + 0.1 * volume + 0.001 * p as f32 + 0.01 * speaker;
                        std::iter::repeat(value).take(SAMPLES_PER_FRAME)
                    })
                    .collect::<Vec<_>>();
                ("wav", batch(wav))
            }
        };
        Ok(vec![(name.to_owned(), tensor)])
    }
}

/// Like [`FakeRuntime`], except that `operation` misbehaves.
pub(crate) struct FaultyRuntime {
    pub(crate) operation: Operation,
    pub(crate) fault: Fault,
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum Fault {
    /// The backend reports an error.
    Fail,
    /// The output is one element short.
    Truncate,
}

impl InferenceRuntime for FaultyRuntime {
    fn new_session(
        &self,
        _: &ModelBytes,
        operation: Operation,
        _: &SessionOptions,
    ) -> Result<Arc<dyn InferenceSession>> {
        let inner = FakeSession { operation };
        if operation == self.operation {
            Ok(Arc::new(FaultySession {
                inner,
                fault: self.fault,
            }))
        } else {
            Ok(Arc::new(inner))
        }
    }
}

struct FaultySession {
    inner: FakeSession,
    fault: Fault,
}

impl InferenceSession for FaultySession {
    fn run(&self, inputs: Vec<(&'static str, Tensor)>) -> Result<Vec<(String, Tensor)>> {
        let operation = self.inner.operation.name();
        match self.fault {
            Fault::Fail => Err(Error::Inference {
                operation,
                message: "device lost".to_owned(),
            }),
            Fault::Truncate => {
                let outputs = self.inner.run(inputs)?;
                Ok(outputs
                    .into_iter()
                    .map(|(name, tensor)| {
                        let tensor = match tensor {
                            Tensor::Float32(a) => flat(drop_last(a.into_iter().collect())),
                            Tensor::Int64(a) => flat(drop_last(a.into_iter().collect())),
                        };
                        (name, tensor)
                    })
                    .collect())
            }
        }
    }
}

fn drop_last<T>(mut v: Vec<T>) -> Vec<T> {
    v.pop();
    v
}

/// Like [`FakeRuntime`], but every decoded frame is the mean of the frames
/// up to `radius` away, within the frames it was given.
pub(crate) struct WideDecoderRuntime {
    pub(crate) radius: usize,
}

impl InferenceRuntime for WideDecoderRuntime {
    fn new_session(
        &self,
        _: &ModelBytes,
        operation: Operation,
        _: &SessionOptions,
    ) -> Result<Arc<dyn InferenceSession>> {
        Ok(Arc::new(WideDecoderSession {
            inner: FakeSession { operation },
            radius: self.radius,
        }))
    }
}

struct WideDecoderSession {
    inner: FakeSession,
    radius: usize,
}

impl InferenceSession for WideDecoderSession {
    fn run(&self, inputs: Vec<(&'static str, Tensor)>) -> Result<Vec<(String, Tensor)>> {
        let mut outputs = self.inner.run(inputs)?;
        if self.inner.operation != Operation::Decode {
            return Ok(outputs);
        }
        let Tensor::Float32(wave) = &outputs[0].1 else {
            panic!("`wave` should be float32");
        };
        let frames = wave
            .iter()
            .step_by(SAMPLES_PER_FRAME)
            .copied()
            .collect::<Vec<_>>();
        let wave = (0..frames.len())
            .flat_map(|t| {
                let end = (t + self.radius + 1).min(frames.len());
                let window = &frames[t.saturating_sub(self.radius)..end];
                let mean = window.iter().sum::<f32>() / window.len() as f32;
                (0..SAMPLES_PER_FRAME).map(move |i| mean + i as f32 * 1e-5)
            })
            .collect::<Vec<_>>();
        outputs[0].1 = flat(wave);
        Ok(outputs)
    }
}

fn flat<T>(v: Vec<T>) -> Tensor
where
    Tensor: From<ndarray::ArrayD<T>>,
{
    Array::from_vec(v).into_dyn().into()
}

fn batch<T>(v: Vec<T>) -> Tensor
where
    Tensor: From<ndarray::ArrayD<T>>,
{
    let len = v.len();
    Array::from_shape_vec(IxDyn(&[1, len]), v).unwrap().into()
}

/// Writes voice model files for tests.
pub(crate) struct VvmBuilder {
    manifest: Value,
    metas: Value,
}

impl VvmBuilder {
    /// Two characters.
    ///
    /// `dummy1` (`ALL`): talk styles 302, 303.
    /// `dummy2` (`SELF_ONLY`): talk 304, singing teacher 6000, frame decode 3000, sing 3001.
    pub(crate) fn talk_and_sing() -> Self {
        let manifest = json!({
            "vvm_format_version": 1,
            "id": TALK_AND_SING_ID,
            "metas_filename": "metas.json",
            "talk": domain(Domain::Talk, json!({"302": 0, "303": 1, "304": 2})),
            "singing_teacher": domain(Domain::SingingTeacher, json!({"6000": 0, "3001": 1})),
            "frame_decode": domain(Domain::FrameDecode, json!({"3000": 0, "3001": 1})),
        });
        let metas = json!([
            {
                "name": "dummy1",
                "styles": [
                    {"id": 302, "name": "normal", "type": "talk", "order": 0},
                    {"id": 303, "name": "sweet", "type": "talk", "order": 1}
                ],
                "version": "0.0.1",
                "speaker_uuid": DUMMY1_UUID,
                "order": 0,
                "supported_features": {"permitted_synthesis_morphing": "ALL"}
            },
            {
                "name": "dummy2",
                "styles": [
                    {"id": 304, "name": "normal", "type": "talk"},
                    {"id": 6000, "name": "teacher", "type": "singing_teacher"},
                    {"id": 3000, "name": "decoder", "type": "frame_decode"},
                    {"id": 3001, "name": "singer", "type": "sing"}
                ],
                "version": "0.0.1",
                "speaker_uuid": DUMMY2_UUID,
                "order": 1,
                "supported_features": {"permitted_synthesis_morphing": "SELF_ONLY"}
            }
        ]);
        Self { manifest, metas }
    }

    /// A talk-only model whose single character carries `style_ids`.
    pub(crate) fn talk_only(speaker_uuid: &str, style_ids: &[u32]) -> Self {
        let inner = style_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.to_string(), json!(i)))
            .collect::<serde_json::Map<_, _>>();
        let manifest = json!({
            "vvm_format_version": 1,
            "id": Uuid::new_v4().to_string(),
            "metas_filename": "metas.json",
            "talk": domain(Domain::Talk, Value::Object(inner)),
        });
        let styles = style_ids
            .iter()
            .map(|id| json!({"id": id, "name": format!("style-{id}"), "type": "talk"}))
            .collect::<Vec<_>>();
        let metas = json!([{
            "name": "extra",
            "styles": styles,
            "version": "0.0.1",
            "speaker_uuid": speaker_uuid,
        }]);
        Self { manifest, metas }
    }

    pub(crate) fn manifest_field(mut self, key: &str, value: Value) -> Self {
        self.manifest[key] = value;
        self
    }

    pub(crate) fn id(&self) -> VoiceModelId {
        serde_json::from_value(self.manifest["id"].clone()).unwrap()
    }

    pub(crate) fn write(&self) -> PathBuf {
        let path = std::env::temp_dir().join(format!("vvtts-{}.vvm", Uuid::new_v4()));
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        let options = zip::write::SimpleFileOptions::default();

        zip.start_file("manifest.json", options).unwrap();
        zip.write_all(self.manifest.to_string().as_bytes()).unwrap();
        zip.start_file("metas.json", options).unwrap();
        zip.write_all(self.metas.to_string().as_bytes()).unwrap();
        for domain in [Domain::Talk, Domain::SingingTeacher, Domain::FrameDecode] {
            for operation in domain.operations() {
                zip.start_file(format!("{}.onnx", operation.name()), options)
                    .unwrap();
                zip.write_all(operation.name().as_bytes()).unwrap();
            }
        }
        zip.finish().unwrap();
        path
    }
}

fn domain(domain: Domain, style_id_to_inner_voice_id: Value) -> Value {
    let mut entry = serde_json::Map::new();
    for operation in domain.operations() {
        entry.insert(
            operation.name().to_owned(),
            json!({"type": "onnx", "filename": format!("{}.onnx", operation.name())}),
        );
    }
    entry.insert(
        "style_id_to_inner_voice_id".to_owned(),
        style_id_to_inner_voice_id,
    );
    Value::Object(entry)
}

/// The model of [`VvmBuilder::talk_and_sing`], loaded on [`FakeRuntime`].
pub(crate) fn loaded_model() -> LoadedModel {
    loaded_model_on(&FakeRuntime)
}

pub(crate) fn loaded_model_on(runtime: &dyn InferenceRuntime) -> LoadedModel {
    let vvm = VvmBuilder::talk_and_sing().write();
    let file = VoiceModelFile::open(&vvm).unwrap();
    let model = LoadedModel::load(&file, runtime, &SessionOptions::default()).unwrap();
    std::fs::remove_file(vvm).unwrap();
    model
}

impl LoadedModel {
    pub(crate) fn talk(&self, style_id: u32) -> &DomainSessions {
        self.sessions_for(StyleId(style_id), Domain::Talk).unwrap()
    }
}

/// Installs the test logger.
pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
