use std::collections::BTreeMap;
use std::sync::Arc;

use super::runtime::{Domain, InferenceRuntime, InferenceSession, Operation, SessionOptions};
use super::voices::VoiceModelFile;
use crate::error::{Error, Result};
use crate::metas::{CharacterMeta, StyleId, StyleMeta, StyleType, VoiceModelId, VoiceModelMeta};

/// Sessions of one domain of a loaded voice model.
pub(crate) struct DomainSessions {
    sessions: BTreeMap<Operation, Arc<dyn InferenceSession>>,
    style_id_to_inner_voice_id: BTreeMap<StyleId, u32>,
}

impl DomainSessions {
    pub(crate) fn session(&self, operation: Operation) -> Result<&dyn InferenceSession> {
        self.sessions
            .get(&operation)
            .map(|s| &**s)
            .ok_or_else(|| Error::Inference {
                operation: operation.name(),
                message: "no session for this operation".to_owned(),
            })
    }

    /// The speaker index the networks know this style by. Falls back to the
    /// raw style id when the manifest has no mapping.
    pub(crate) fn inner_voice_id(&self, style_id: StyleId) -> i64 {
        i64::from(
            self.style_id_to_inner_voice_id
                .get(&style_id)
                .copied()
                .unwrap_or(style_id.raw_id()),
        )
    }
}

/// A voice model whose sessions are ready to run.
pub(crate) struct LoadedModel {
    pub(crate) id: VoiceModelId,
    pub(crate) metas: VoiceModelMeta,
    domains: BTreeMap<Domain, Arc<DomainSessions>>,
}

impl LoadedModel {
    pub(crate) fn load(
        file: &VoiceModelFile,
        runtime: &dyn InferenceRuntime,
        options: &SessionOptions,
    ) -> Result<Self> {
        let mut domains = BTreeMap::new();
        for (domain, models) in file.read_models()? {
            let mut sessions = BTreeMap::new();
            for (operation, bytes) in &models.models {
                log::info!(
                    "Creating `{operation}` session for model {} ({} bytes)",
                    file.id(),
                    bytes.bytes.len()
                );
                sessions.insert(*operation, runtime.new_session(bytes, *operation, options)?);
            }
            domains.insert(
                domain,
                Arc::new(DomainSessions {
                    sessions,
                    style_id_to_inner_voice_id: models.style_id_to_inner_voice_id,
                }),
            );
        }
        Ok(Self {
            id: file.id(),
            metas: file.metas().clone(),
            domains,
        })
    }

    pub(crate) fn style(&self, style_id: StyleId) -> Option<(&CharacterMeta, &StyleMeta)> {
        self.metas.iter().find_map(|character| {
            character
                .styles
                .iter()
                .find(|style| style.id == style_id)
                .map(|style| (character, style))
        })
    }

    /// Sessions serving `style_id` in `domain`, if the style has a type that
    /// domain can run.
    pub(crate) fn sessions_for(
        &self,
        style_id: StyleId,
        domain: Domain,
    ) -> Option<&Arc<DomainSessions>> {
        let (_, style) = self.style(style_id)?;
        serves(style.r#type, domain)
            .then(|| self.domains.get(&domain))
            .flatten()
    }
}

pub(crate) fn serves(style_type: StyleType, domain: Domain) -> bool {
    matches!(
        (style_type, domain),
        (StyleType::Talk, Domain::Talk)
            | (StyleType::SingingTeacher | StyleType::Sing, Domain::SingingTeacher)
            | (StyleType::FrameDecode | StyleType::Sing, Domain::FrameDecode)
    )
}
