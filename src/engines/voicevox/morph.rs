use serde::Serialize;

use crate::error::{Error, Result};
use crate::metas::{CharacterMeta, PermittedSynthesisMorphing};

/// Whether a style can be a morphing target for a given base style.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct MorphableTargetInfo {
    pub is_morphable: bool,
}

pub(crate) fn is_permitted(base: &CharacterMeta, target: &CharacterMeta) -> bool {
    use PermittedSynthesisMorphing::{All, SelfOnly};

    match (
        base.supported_features.permitted_synthesis_morphing,
        target.supported_features.permitted_synthesis_morphing,
    ) {
        (All, All) => true,
        (SelfOnly, SelfOnly) => base.speaker_uuid == target.speaker_uuid,
        _ => false,
    }
}

pub(crate) fn ensure_permitted(base: &CharacterMeta, target: &CharacterMeta) -> Result<()> {
    if is_permitted(base, target) {
        return Ok(());
    }
    use PermittedSynthesisMorphing::{All, SelfOnly};

    // Blame the side whose permission rules the pair out.
    let offending = match (
        base.supported_features.permitted_synthesis_morphing,
        target.supported_features.permitted_synthesis_morphing,
    ) {
        (All, _) => target,
        (SelfOnly, All | SelfOnly) => base,
        (SelfOnly, _) => target,
        _ => base,
    };
    Err(Error::SpeakerFeature {
        character: offending.name.clone(),
        speaker_uuid: offending.speaker_uuid.clone(),
        feature: "synthesis morphing",
    })
}

pub(crate) fn ensure_rate(morph_rate: f32) -> Result<()> {
    if morph_rate.is_finite() && (0. ..=1.).contains(&morph_rate) {
        Ok(())
    } else {
        Err(Error::invalid_query(
            "morph rate",
            format!("{morph_rate} is not in [0, 1]"),
        ))
    }
}

/// Sample-wise `base * (1 - rate) + target * rate`.
pub(crate) fn mix(base: &[f32], target: &[f32], morph_rate: f32) -> Vec<f32> {
    debug_assert_eq!(base.len(), target.len());
    base.iter()
        .zip(target)
        .map(|(&b, &t)| b * (1. - morph_rate) + t * morph_rate)
        .collect()
}
