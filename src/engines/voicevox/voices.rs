use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::runtime::{Domain, ModelBytes, ModelFormat, Operation};
use crate::error::{Error, Result};
use crate::metas::{StyleId, StyleType, VoiceModelId, VoiceModelMeta};

const MANIFEST_FILENAME: &str = "manifest.json";

/// An opened voice model (`.vvm`) file.
///
/// Opening reads only the manifest and the metadata. Model bytes are read when
/// the file is loaded into a synthesizer.
#[derive(Clone, Debug)]
pub struct VoiceModelFile {
    path: PathBuf,
    id: VoiceModelId,
    metas: VoiceModelMeta,
    domains: BTreeMap<Domain, DomainManifest>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    vvm_format_version: u64,
    id: VoiceModelId,
    metas_filename: String,
    #[serde(default)]
    talk: Option<DomainManifest>,
    #[serde(default)]
    singing_teacher: Option<DomainManifest>,
    #[serde(default)]
    frame_decode: Option<DomainManifest>,
}

#[derive(Clone, Debug, Deserialize)]
struct DomainManifest {
    /// Style ids as decimal strings. Integer keys do not survive `flatten`.
    #[serde(default)]
    style_id_to_inner_voice_id: BTreeMap<String, u32>,
    /// Keyed by operation name.
    #[serde(flatten)]
    models: BTreeMap<String, ModelFile>,
}

#[derive(Clone, Debug, Deserialize)]
struct ModelFile {
    r#type: ModelFileType,
    filename: String,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ModelFileType {
    Onnx,
    VvBin,
}

/// Model bytes of one domain, ready to become sessions.
#[derive(Debug)]
pub(crate) struct DomainModels {
    pub(crate) models: Vec<(Operation, ModelBytes)>,
    pub(crate) style_id_to_inner_voice_id: BTreeMap<StyleId, u32>,
}

impl VoiceModelFile {
    /// Open a voice model file and validate its manifest against its metadata.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Opening voice model {}", path.display());
        let error = |reason: String| Error::LoadModel {
            path: path.to_owned(),
            reason,
        };

        let mut zip = open_archive(path).map_err(error)?;
        let manifest = read_entry(&mut zip, MANIFEST_FILENAME).map_err(error)?;
        let manifest = serde_json::from_slice::<Manifest>(&manifest)
            .map_err(|e| error(format!("invalid {MANIFEST_FILENAME}: {e}")))?;
        if manifest.vvm_format_version != 1 {
            return Err(error(format!(
                "unknown format (`vvm_format_version={}`)",
                manifest.vvm_format_version
            )));
        }

        let metas = read_entry(&mut zip, &manifest.metas_filename).map_err(error)?;
        let metas = serde_json::from_slice::<VoiceModelMeta>(&metas)
            .map_err(|e| error(format!("invalid {}: {e}", manifest.metas_filename)))?;

        let mut domains = BTreeMap::new();
        for (domain, entry) in [
            (Domain::Talk, manifest.talk),
            (Domain::SingingTeacher, manifest.singing_teacher),
            (Domain::FrameDecode, manifest.frame_decode),
        ] {
            if let Some(entry) = entry {
                if let Some(key) = entry
                    .style_id_to_inner_voice_id
                    .keys()
                    .find(|k| k.parse::<u32>().is_err())
                {
                    return Err(error(format!(
                        "`{}` maps a non-numeric style id `{key}`",
                        domain.name()
                    )));
                }
                for operation in domain.operations() {
                    if !entry.models.contains_key(operation.name()) {
                        return Err(error(format!(
                            "`{}` lacks a model for `{operation}`",
                            domain.name()
                        )));
                    }
                }
                domains.insert(domain, entry);
            }
        }

        for style in metas.iter().flat_map(|c| &c.styles) {
            let required: &[Domain] = match style.r#type {
                StyleType::Talk => &[Domain::Talk],
                StyleType::SingingTeacher => &[Domain::SingingTeacher],
                StyleType::FrameDecode => &[Domain::FrameDecode],
                StyleType::Sing => &[Domain::SingingTeacher, Domain::FrameDecode],
                StyleType::Reserved(_) => {
                    log::warn!("style {} has an unsupported type and cannot be used", style.id);
                    &[]
                }
            };
            if let Some(missing) = required.iter().find(|d| !domains.contains_key(d)) {
                return Err(error(format!(
                    "style {} is `{}` but the model has no `{}` domain",
                    style.id,
                    style.r#type,
                    missing.name()
                )));
            }
        }

        Ok(Self {
            path: path.to_owned(),
            id: manifest.id,
            metas,
            domains,
        })
    }

    pub fn id(&self) -> VoiceModelId {
        self.id
    }

    pub fn metas(&self) -> &VoiceModelMeta {
        &self.metas
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the file, keeping its id and metadata.
    pub fn close(self) -> (VoiceModelId, VoiceModelMeta) {
        (self.id, self.metas)
    }

    /// Read the model bytes of every domain the file provides.
    pub(crate) fn read_models(&self) -> Result<BTreeMap<Domain, DomainModels>> {
        let error = |reason: String| Error::LoadModel {
            path: self.path.clone(),
            reason,
        };
        let mut zip = open_archive(&self.path).map_err(error)?;

        let mut loaded = BTreeMap::new();
        for (&domain, entry) in &self.domains {
            let mut models = Vec::with_capacity(domain.operations().len());
            for &operation in domain.operations() {
                let file = entry.models.get(operation.name()).ok_or_else(|| {
                    error(format!("`{}` lacks a model for `{operation}`", domain.name()))
                })?;
                let bytes = read_entry(&mut zip, &file.filename).map_err(error)?;
                let format = match file.r#type {
                    ModelFileType::Onnx => ModelFormat::Onnx,
                    ModelFileType::VvBin => ModelFormat::VvBin,
                };
                models.push((
                    operation,
                    ModelBytes {
                        format,
                        bytes: bytes.into(),
                    },
                ));
            }
            loaded.insert(
                domain,
                DomainModels {
                    models,
                    style_id_to_inner_voice_id: entry
                        .style_id_to_inner_voice_id
                        .iter()
                        .filter_map(|(k, &v)| Some((StyleId(k.parse().ok()?), v)))
                        .collect(),
                },
            );
        }
        Ok(loaded)
    }
}

fn open_archive(path: &Path) -> std::result::Result<zip::ZipArchive<File>, String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    zip::ZipArchive::new(file).map_err(|e| format!("Failed to open zip archive: {e}"))
}

fn read_entry(
    zip: &mut zip::ZipArchive<File>,
    name: &str,
) -> std::result::Result<Vec<u8>, String> {
    let mut entry = zip
        .by_name(name)
        .map_err(|e| format!("Failed to find {name}: {e}"))?;
    let mut data = Vec::new();
    entry
        .read_to_end(&mut data)
        .map_err(|e| format!("Failed to read {name}: {e}"))?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::voicevox::testing::VvmBuilder;
    use crate::ErrorKind;
    use serde_json::json;

    #[test]
    fn opens_and_reads_domains() {
        let vvm = VvmBuilder::talk_and_sing().write();
        let file = VoiceModelFile::open(&vvm).unwrap();
        assert_eq!(file.metas().len(), 2);

        let models = file.read_models().unwrap();
        assert_eq!(models.len(), 3);
        let talk = &models[&Domain::Talk];
        let operations = talk.models.iter().map(|(op, _)| *op).collect::<Vec<_>>();
        assert_eq!(operations, Domain::Talk.operations());
        assert_eq!(talk.style_id_to_inner_voice_id.get(&StyleId(302)), Some(&0));

        let (id, metas) = file.close();
        assert_eq!(id, VvmBuilder::talk_and_sing().id());
        assert_eq!(metas.len(), 2);
        std::fs::remove_file(vvm).unwrap();
    }

    #[test]
    fn rejects_unknown_format_version() {
        let vvm = VvmBuilder::talk_and_sing()
            .manifest_field("vvm_format_version", json!(2))
            .write();
        let err = VoiceModelFile::open(&vvm).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LoadModel);
        assert!(err.to_string().contains("vvm_format_version=2"));
        std::fs::remove_file(vvm).unwrap();
    }

    #[test]
    fn styles_need_their_domains() {
        let vvm = VvmBuilder::talk_and_sing()
            .manifest_field("frame_decode", serde_json::Value::Null)
            .write();
        let err = VoiceModelFile::open(&vvm).unwrap_err();
        assert!(err.to_string().contains("frame_decode"), "{err}");
        std::fs::remove_file(vvm).unwrap();
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let err = VoiceModelFile::open("/nonexistent/model.vvm").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LoadModel);
    }
}
