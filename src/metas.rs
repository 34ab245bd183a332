//! Character and style metadata carried by voice models.

use std::fmt;

use indexmap::IndexMap;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Identifier of a style: one voice/delivery mode of a character.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleId(pub u32);

impl StyleId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw_id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StyleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a voice model file, taken from its manifest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoiceModelId(pub Uuid);

impl fmt::Display for VoiceModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata of every character in one voice model (or in a set of loaded models).
pub type VoiceModelMeta = Vec<CharacterMeta>;

/// Marker carried by the `Reserved` variants. It cannot be built outside this crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Reserved(());

/// Capability of a style.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StyleType {
    /// Speech synthesis from an `AudioQuery`.
    #[default]
    Talk,
    /// Predicts frame-level singing parameters from a score.
    SingingTeacher,
    /// Renders a `FrameAudioQuery` into a waveform.
    FrameDecode,
    /// Both `SingingTeacher` and `FrameDecode`.
    Sing,
    /// A value introduced by a newer model format.
    Reserved(Reserved),
}

impl StyleType {
    fn as_str(self) -> Option<&'static str> {
        match self {
            Self::Talk => Some("talk"),
            Self::SingingTeacher => Some("singing_teacher"),
            Self::FrameDecode => Some("frame_decode"),
            Self::Sing => Some("sing"),
            Self::Reserved(_) => None,
        }
    }
}

impl fmt::Display for StyleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str().unwrap_or("reserved"))
    }
}

impl Serialize for StyleType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_str() {
            Some(s) => serializer.serialize_str(s),
            None => Err(serde::ser::Error::custom("reserved style type cannot be serialized")),
        }
    }
}

impl<'de> Deserialize<'de> for StyleType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(match &*s {
            "talk" => Self::Talk,
            "singing_teacher" => Self::SingingTeacher,
            "frame_decode" => Self::FrameDecode,
            "sing" => Self::Sing,
            other => {
                log::warn!("unknown style type `{other}`");
                Self::Reserved(Reserved(()))
            }
        })
    }
}

/// Which morphing partners a character permits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PermittedSynthesisMorphing {
    /// Morphing with any character that also permits `All`.
    #[default]
    All,
    /// Morphing only between styles of the same character.
    SelfOnly,
    /// No morphing.
    Nothing,
    /// A value introduced by a newer model format. Never permits morphing.
    Reserved(Reserved),
}

impl Serialize for PermittedSynthesisMorphing {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::All => serializer.serialize_str("ALL"),
            Self::SelfOnly => serializer.serialize_str("SELF_ONLY"),
            Self::Nothing => serializer.serialize_str("NOTHING"),
            Self::Reserved(_) => Err(serde::ser::Error::custom(
                "reserved morphing permission cannot be serialized",
            )),
        }
    }
}

impl<'de> Deserialize<'de> for PermittedSynthesisMorphing {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Visitor;

        impl de::Visitor<'_> for Visitor {
            type Value = PermittedSynthesisMorphing;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a morphing permission string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(match v {
                    "ALL" => PermittedSynthesisMorphing::All,
                    "SELF_ONLY" => PermittedSynthesisMorphing::SelfOnly,
                    "NOTHING" => PermittedSynthesisMorphing::Nothing,
                    other => {
                        log::warn!("unknown morphing permission `{other}`");
                        PermittedSynthesisMorphing::Reserved(Reserved(()))
                    }
                })
            }
        }

        deserializer.deserialize_str(Visitor)
    }
}

/// Features a character declares support for.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeakerSupportedFeatures {
    #[serde(default)]
    pub permitted_synthesis_morphing: PermittedSynthesisMorphing,
}

/// Metadata of a character.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CharacterMeta {
    pub name: String,
    pub styles: Vec<StyleMeta>,
    pub version: String,
    pub speaker_uuid: String,
    /// Display order. Characters without one are listed last.
    #[serde(default)]
    pub order: Option<u32>,
    #[serde(default)]
    pub supported_features: SpeakerSupportedFeatures,
}

/// Metadata of a style.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StyleMeta {
    pub id: StyleId,
    pub name: String,
    #[serde(rename = "type", default)]
    pub r#type: StyleType,
    #[serde(default)]
    pub order: Option<u32>,
}

/// Merge character metadata by `speaker_uuid`.
///
/// Styles of the same character are concatenated. Characters and styles are
/// then stably sorted by `order`, with `None` placed last.
pub fn merge<'a>(metas: impl IntoIterator<Item = &'a CharacterMeta>) -> VoiceModelMeta {
    let mut by_uuid = IndexMap::<&str, CharacterMeta>::new();
    for character in metas {
        match by_uuid.get_mut(&*character.speaker_uuid) {
            Some(acc) => {
                if acc.name != character.name || acc.version != character.version {
                    log::warn!(
                        "`{}`: differing metadata between models ({:?}/{:?} vs {:?}/{:?})",
                        character.speaker_uuid,
                        acc.name,
                        acc.version,
                        character.name,
                        character.version,
                    );
                }
                acc.styles.extend(character.styles.iter().cloned());
            }
            None => {
                by_uuid.insert(&character.speaker_uuid, character.clone());
            }
        }
    }

    let mut merged = by_uuid.into_values().collect::<Vec<_>>();
    for character in &mut merged {
        character.styles.sort_by_key(|style| order_key(style.order));
    }
    merged.sort_by_key(|character| order_key(character.order));
    merged
}

fn order_key(order: Option<u32>) -> u64 {
    order.map_or(u64::from(u32::MAX) + 1, u64::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn character(uuid: &str, order: Option<u32>, styles: &[(u32, Option<u32>)]) -> CharacterMeta {
        CharacterMeta {
            name: format!("chara-{uuid}"),
            styles: styles
                .iter()
                .map(|&(id, order)| StyleMeta {
                    id: StyleId(id),
                    name: format!("style-{id}"),
                    r#type: StyleType::Talk,
                    order,
                })
                .collect(),
            version: "0.0.1".to_string(),
            speaker_uuid: uuid.to_string(),
            order,
            supported_features: SpeakerSupportedFeatures::default(),
        }
    }

    #[test]
    fn merge_groups_by_uuid_and_sorts_by_order() {
        let metas = [
            character("b", None, &[(5, Some(1))]),
            character("a", Some(1), &[(3, None), (2, Some(2))]),
            character("b", None, &[(4, Some(0))]),
            character("c", Some(0), &[(1, Some(0))]),
        ];

        let merged = merge(&metas);

        let uuids = merged.iter().map(|c| c.speaker_uuid.as_str()).collect::<Vec<_>>();
        assert_eq!(uuids, ["c", "a", "b"]);

        let style_ids = |c: &CharacterMeta| c.styles.iter().map(|s| s.id.0).collect::<Vec<_>>();
        assert_eq!(style_ids(&merged[1]), [2, 3]);
        assert_eq!(style_ids(&merged[2]), [4, 5]);
    }

    #[test]
    fn style_type_defaults_to_talk() {
        let style: StyleMeta = serde_json::from_value(json!({"id": 302, "name": "normal"})).unwrap();
        assert_eq!(style.r#type, StyleType::Talk);
        assert_eq!(style.order, None);
    }

    #[test]
    fn unknown_enum_values_become_reserved() {
        let style: StyleMeta =
            serde_json::from_value(json!({"id": 1, "name": "x", "type": "whisper"})).unwrap();
        assert!(matches!(style.r#type, StyleType::Reserved(_)));
        assert!(serde_json::to_string(&style).is_err());

        let features: SpeakerSupportedFeatures =
            serde_json::from_value(json!({"permitted_synthesis_morphing": "SOMETIMES"})).unwrap();
        assert!(matches!(
            features.permitted_synthesis_morphing,
            PermittedSynthesisMorphing::Reserved(_)
        ));
    }

    #[test]
    fn character_meta_round_trips() {
        let value = json!({
            "name": "dummy",
            "styles": [{"id": 6000, "name": "teacher", "type": "singing_teacher", "order": 0}],
            "version": "0.1.0",
            "speaker_uuid": "574bc678-8370-44be-b941-08e46e7b47d7",
            "order": 3,
            "supported_features": {"permitted_synthesis_morphing": "SELF_ONLY"}
        });
        let meta: CharacterMeta = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(meta.styles[0].r#type, StyleType::SingingTeacher);
        assert_eq!(
            meta.supported_features.permitted_synthesis_morphing,
            PermittedSynthesisMorphing::SelfOnly
        );
        assert_eq!(serde_json::to_value(&meta).unwrap(), value);
    }
}
