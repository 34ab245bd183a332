use std::path::Path;

use indexmap::IndexMap;
use parking_lot::Mutex;
use uuid::Uuid;

use super::word::UserDictWord;
use crate::error::{Error, Result};

/// A table of pronunciation overrides keyed by word id.
///
/// Stored on disk as a JSON object from uuid to word.
#[derive(Debug, Default)]
pub struct UserDict {
    words: Mutex<IndexMap<Uuid, UserDictWord>>,
}

impl UserDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_json(&self) -> Result<String> {
        self.with_words(|words| serde_json::to_string(words)).map_err(Error::SerializeUserDict)
    }

    /// Run `f` with exclusive access to the words.
    pub fn with_words<R>(&self, f: impl FnOnce(&mut IndexMap<Uuid, UserDictWord>) -> R) -> R {
        f(&mut self.words.lock())
    }

    /// Replace the content with the dictionary stored at `path`.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let error = |reason: String| Error::LoadUserDict {
            path: path.to_owned(),
            reason,
        };
        let bytes = std::fs::read(path).map_err(|e| error(e.to_string()))?;
        let words = serde_json::from_slice::<IndexMap<Uuid, UserDictWord>>(&bytes)
            .map_err(|e| error(e.to_string()))?;
        log::info!("Loaded {} words from {}", words.len(), path.display());
        self.with_words(|current| *current = words);
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let error = |reason: String| Error::SaveUserDict {
            path: path.to_owned(),
            reason,
        };
        let json = self
            .with_words(|words| serde_json::to_string(words))
            .map_err(|e| error(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| error(e.to_string()))
    }

    pub fn add_word(&self, word: UserDictWord) -> Uuid {
        let word_uuid = Uuid::new_v4();
        self.with_words(|words| words.insert(word_uuid, word));
        word_uuid
    }

    pub fn update_word(&self, word_uuid: Uuid, new_word: UserDictWord) -> Result<()> {
        self.with_words(|words| match words.get_mut(&word_uuid) {
            Some(word) => {
                *word = new_word;
                Ok(())
            }
            None => Err(Error::WordNotFound(word_uuid)),
        })
    }

    pub fn remove_word(&self, word_uuid: Uuid) -> Result<UserDictWord> {
        self.with_words(|words| words.shift_remove(&word_uuid))
            .ok_or(Error::WordNotFound(word_uuid))
    }

    /// Insert every word of `other`. Words of `other` win on id collisions.
    pub fn import(&self, other: &Self) {
        if std::ptr::eq(self, other) {
            return;
        }
        let imported = other.with_words(|words| words.clone());
        self.with_words(|words| words.extend(imported));
    }

    /// The dictionary as MeCab user dictionary CSV, one word per line.
    pub fn to_mecab_format(&self) -> String {
        self.with_words(|words| {
            words
                .values()
                .map(UserDictWord::to_mecab_format)
                .collect::<Vec<_>>()
                .join("\n")
        })
    }
}
