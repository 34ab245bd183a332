use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

use super::part_of_speech::{detail, MAX_PRIORITY, MIN_PRIORITY, PART_OF_SPEECH_DETAIL};
use super::text::{count_moras, to_zenkaku};

/// A pronunciation override. Always valid once constructed.
#[derive(Clone, Debug, PartialEq)]
pub struct UserDictWord {
    surface: String,
    pronunciation: String,
    accent_type: usize,
    word_type: UserDictWordType,
    priority: u32,
    mora_count: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserDictWordType {
    ProperNoun,
    #[default]
    CommonNoun,
    Verb,
    Adjective,
    Suffix,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidWordError {
    #[error("invalid user dictionary word: bad pronunciation ({1}): {0:?}")]
    InvalidPronunciation(String, &'static str),
    #[error(
        "invalid user dictionary word: priority must be within {MIN_PRIORITY}..={MAX_PRIORITY}: {0}"
    )]
    InvalidPriority(u32),
    #[error("invalid user dictionary word: accent type {0} is outside ..={1}")]
    InvalidAccentType(usize, usize),
}

pub const DEFAULT_PRIORITY: u32 = 5;

const SUTEGANA: [char; 10] = ['ァ', 'ィ', 'ゥ', 'ェ', 'ォ', 'ャ', 'ュ', 'ョ', 'ヮ', 'ッ'];

/// Optional attributes of a [`UserDictWord`].
#[derive(Clone, Copy, Debug)]
pub struct UserDictWordBuilder {
    word_type: UserDictWordType,
    priority: u32,
}

impl Default for UserDictWordBuilder {
    fn default() -> Self {
        Self {
            word_type: UserDictWordType::default(),
            priority: DEFAULT_PRIORITY,
        }
    }
}

impl UserDictWordBuilder {
    pub fn word_type(self, word_type: UserDictWordType) -> Self {
        Self { word_type, ..self }
    }

    pub fn priority(self, priority: u32) -> Self {
        Self { priority, ..self }
    }

    /// Validate and build. `surface` is normalized to full-width.
    pub fn build(
        self,
        surface: &str,
        pronunciation: impl Into<String>,
        accent_type: usize,
    ) -> Result<UserDictWord, InvalidWordError> {
        UserDictWord::new(
            surface,
            pronunciation.into(),
            accent_type,
            self.word_type,
            self.priority,
        )
    }
}

impl UserDictWord {
    pub fn builder() -> UserDictWordBuilder {
        UserDictWordBuilder::default()
    }

    fn new(
        surface: &str,
        pronunciation: String,
        accent_type: usize,
        word_type: UserDictWordType,
        priority: u32,
    ) -> Result<Self, InvalidWordError> {
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
            return Err(InvalidWordError::InvalidPriority(priority));
        }
        validate_pronunciation(&pronunciation)?;
        let mora_count = count_moras(&pronunciation);
        if accent_type > mora_count {
            return Err(InvalidWordError::InvalidAccentType(accent_type, mora_count));
        }
        Ok(Self {
            surface: to_zenkaku(surface),
            pronunciation,
            accent_type,
            word_type,
            priority,
            mora_count,
        })
    }

    pub fn surface(&self) -> &str {
        &self.surface
    }

    pub fn pronunciation(&self) -> &str {
        &self.pronunciation
    }

    pub fn accent_type(&self) -> usize {
        self.accent_type
    }

    pub fn word_type(&self) -> UserDictWordType {
        self.word_type
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn mora_count(&self) -> usize {
        self.mora_count
    }

    /// One line of a MeCab user dictionary CSV.
    pub(crate) fn to_mecab_format(&self) -> String {
        let pos = detail(self.word_type);
        format!(
            "{},{},{},{},{},{},{},{},*,*,*,{},{},{}/{},*",
            self.surface,
            pos.context_id,
            pos.context_id,
            pos.cost(self.priority),
            pos.part_of_speech,
            pos.part_of_speech_detail_1,
            pos.part_of_speech_detail_2,
            pos.part_of_speech_detail_3,
            self.pronunciation,
            self.pronunciation,
            self.accent_type,
            self.mora_count,
        )
    }
}

pub(crate) fn validate_pronunciation(pronunciation: &str) -> Result<(), InvalidWordError> {
    let invalid = |reason| InvalidWordError::InvalidPronunciation(pronunciation.to_string(), reason);

    let chars = pronunciation.chars().collect::<Vec<_>>();
    if chars.is_empty() || !chars.iter().all(|&c| matches!(c, 'ァ'..='ヴ' | 'ー')) {
        return Err(invalid("non-katakana characters"));
    }

    for (i, &c) in chars.iter().enumerate() {
        if let Some(&next) = chars.get(i + 1) {
            // Small kana may follow ッ as in キャット, but never another small kana.
            let small_follows = SUTEGANA[..SUTEGANA.len() - 1].contains(&next);
            if SUTEGANA.contains(&c) && (small_follows || (c == 'ッ' && SUTEGANA.contains(&next)))
            {
                return Err(invalid("consecutive sutegana"));
            }
        }
        if c == 'ヮ' && i != 0 && !matches!(chars[i - 1], 'ク' | 'グ') {
            return Err(invalid("ヮ other than クヮ/グヮ"));
        }
    }
    Ok(())
}

/// The VOICEVOX engine word schema.
#[derive(Deserialize, Serialize)]
struct SerdeRepr<S> {
    surface: S,
    priority: u32,
    #[serde(default = "default_context_id")]
    context_id: i32,
    part_of_speech: S,
    part_of_speech_detail_1: S,
    part_of_speech_detail_2: S,
    part_of_speech_detail_3: S,
    inflectional_type: S,
    inflectional_form: S,
    stem: S,
    yomi: S,
    pronunciation: S,
    accent_type: usize,
    mora_count: Option<usize>,
    accent_associative_rule: S,
}

const fn default_context_id() -> i32 {
    1348
}

impl Serialize for UserDictWord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let pos = detail(self.word_type);
        SerdeRepr::<&str> {
            surface: &self.surface,
            priority: self.priority,
            context_id: pos.context_id,
            part_of_speech: pos.part_of_speech,
            part_of_speech_detail_1: pos.part_of_speech_detail_1,
            part_of_speech_detail_2: pos.part_of_speech_detail_2,
            part_of_speech_detail_3: pos.part_of_speech_detail_3,
            inflectional_type: "*",
            inflectional_form: "*",
            stem: "*",
            yomi: &self.pronunciation,
            pronunciation: &self.pronunciation,
            accent_type: self.accent_type,
            mora_count: Some(self.mora_count),
            accent_associative_rule: "*",
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for UserDictWord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = SerdeRepr::<String>::deserialize(deserializer)?;

        for (name, value) in [
            ("inflectional_type", &repr.inflectional_type),
            ("inflectional_form", &repr.inflectional_form),
            ("stem", &repr.stem),
            ("accent_associative_rule", &repr.accent_associative_rule),
        ] {
            if value != "*" {
                return Err(D::Error::custom(format!("`{name}` must be \"*\"")));
            }
        }
        if repr.yomi != repr.pronunciation {
            return Err(D::Error::custom("`yomi` must equal `pronunciation`"));
        }

        let (word_type, _) = PART_OF_SPEECH_DETAIL
            .iter()
            .find(|(_, pos)| {
                repr.part_of_speech == pos.part_of_speech
                    && repr.part_of_speech_detail_1 == pos.part_of_speech_detail_1
                    && repr.part_of_speech_detail_2 == pos.part_of_speech_detail_2
                    && repr.part_of_speech_detail_3 == pos.part_of_speech_detail_3
                    && repr.context_id == pos.context_id
            })
            .ok_or_else(|| D::Error::custom("could not determine `word_type`"))?;

        let word = Self::new(
            &repr.surface,
            repr.pronunciation,
            repr.accent_type,
            *word_type,
            repr.priority,
        )
        .map_err(D::Error::custom)?;

        if repr.mora_count.is_some_and(|n| n != word.mora_count) {
            return Err(D::Error::custom("wrong value for `mora_count`"));
        }
        Ok(word)
    }
}
