use crate::error::{Error, Result};
use crate::query::kana::parse_kana;
use crate::query::AccentPhrase;

/// Turns text into accent phrases whose acoustic fields are still unset.
///
/// Implementations wrap a morphological analyzer such as OpenJTalk. The
/// synthesizer fills lengths and pitches afterwards.
pub trait TextAnalyzer: Send + Sync {
    /// Failures should be reported as [`Error::AnalyzeText`].
    fn analyze(&self, text: &str) -> Result<Vec<AccentPhrase>>;

    /// Apply a user dictionary given as MeCab CSV.
    fn use_user_dict(&self, mecab_csv: &str) -> Result<()> {
        log::warn!(
            "this analyzer ignores user dictionaries ({} words dropped)",
            mecab_csv.lines().count()
        );
        Ok(())
    }
}

/// Reads text that is already written in AquesTalk-style kana.
#[derive(Clone, Copy, Debug, Default)]
pub struct KanaAnalyzer;

impl TextAnalyzer for KanaAnalyzer {
    fn analyze(&self, text: &str) -> Result<Vec<AccentPhrase>> {
        parse_kana(text).map_err(|e| Error::AnalyzeText(Box::new(e)))
    }
}
