//! AquesTalk-style kana notation.
//!
//! A text is a sequence of accent phrases separated by `/` (no pause) or `、`
//! (pause). Each phrase is katakana with exactly one `'` after the accented
//! mora. A leading `_` marks a mora as unvoiced and a trailing `？` marks the
//! phrase as interrogative, e.g. `アンドロ'イドワ、ヒ'_ツジノ/ユメ'オ/ミ'ルカ？`.

use std::collections::HashMap;
use std::sync::LazyLock;

use super::talk::{AccentPhrase, Mora};

const UNVOICE_SYMBOL: char = '_';
const ACCENT_SYMBOL: char = '\'';
const NOPAUSE_DELIMITER: char = '/';
const PAUSE_DELIMITER: char = '、';
const WIDE_INTERROGATION_MARK: char = '？';
const LOOP_LIMIT: usize = 300;

/// Longest key of [`TEXT_TO_MORA`] in chars: an unvoice mark plus two kana.
const MAX_MORA_CHARS: usize = 3;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KanaParseError {
    #[error("accent cannot be placed at the beginning of a phrase: {0}")]
    AccentTop(String),
    #[error("second accent cannot be set in a phrase: {0}")]
    AccentTwice(String),
    #[error("accent not found in the phrase: {0}")]
    AccentNotFound(String),
    #[error("unknown text in the phrase: {0}")]
    UnknownText(String),
    #[error("phrase {0} is empty")]
    EmptyPhrase(usize),
    #[error("interrogation mark cannot be placed anywhere other than the end of a phrase: {0}")]
    InterrogationMarkNotAtEnd(String),
    #[error("too long a phrase: {0}")]
    InfiniteLoop(String),
}

/// Kana table: text, consonant (empty when absent) and vowel.
pub(crate) const MORA_KANA: [(&str, &str, &str); 144] = [
    ("ヴォ", "v", "o"),
    ("ヴェ", "v", "e"),
    ("ヴィ", "v", "i"),
    ("ヴァ", "v", "a"),
    ("ヴ", "v", "u"),
    ("ン", "", "N"),
    ("ワ", "w", "a"),
    ("ロ", "r", "o"),
    ("レ", "r", "e"),
    ("ル", "r", "u"),
    ("リョ", "ry", "o"),
    ("リュ", "ry", "u"),
    ("リャ", "ry", "a"),
    ("リェ", "ry", "e"),
    ("リ", "r", "i"),
    ("ラ", "r", "a"),
    ("ヨ", "y", "o"),
    ("ユ", "y", "u"),
    ("ヤ", "y", "a"),
    ("モ", "m", "o"),
    ("メ", "m", "e"),
    ("ム", "m", "u"),
    ("ミョ", "my", "o"),
    ("ミュ", "my", "u"),
    ("ミャ", "my", "a"),
    ("ミェ", "my", "e"),
    ("ミ", "m", "i"),
    ("マ", "m", "a"),
    ("ポ", "p", "o"),
    ("ボ", "b", "o"),
    ("ホ", "h", "o"),
    ("ペ", "p", "e"),
    ("ベ", "b", "e"),
    ("ヘ", "h", "e"),
    ("プ", "p", "u"),
    ("ブ", "b", "u"),
    ("フォ", "f", "o"),
    ("フェ", "f", "e"),
    ("フィ", "f", "i"),
    ("ファ", "f", "a"),
    ("フ", "f", "u"),
    ("ピョ", "py", "o"),
    ("ピュ", "py", "u"),
    ("ピャ", "py", "a"),
    ("ピェ", "py", "e"),
    ("ピ", "p", "i"),
    ("ビョ", "by", "o"),
    ("ビュ", "by", "u"),
    ("ビャ", "by", "a"),
    ("ビェ", "by", "e"),
    ("ビ", "b", "i"),
    ("ヒョ", "hy", "o"),
    ("ヒュ", "hy", "u"),
    ("ヒャ", "hy", "a"),
    ("ヒェ", "hy", "e"),
    ("ヒ", "h", "i"),
    ("パ", "p", "a"),
    ("バ", "b", "a"),
    ("ハ", "h", "a"),
    ("ノ", "n", "o"),
    ("ネ", "n", "e"),
    ("ヌ", "n", "u"),
    ("ニョ", "ny", "o"),
    ("ニュ", "ny", "u"),
    ("ニャ", "ny", "a"),
    ("ニェ", "ny", "e"),
    ("ニ", "n", "i"),
    ("ナ", "n", "a"),
    ("ドゥ", "d", "u"),
    ("ド", "d", "o"),
    ("トゥ", "t", "u"),
    ("ト", "t", "o"),
    ("デョ", "dy", "o"),
    ("デュ", "dy", "u"),
    ("デャ", "dy", "a"),
    ("ディ", "d", "i"),
    ("デ", "d", "e"),
    ("テョ", "ty", "o"),
    ("テュ", "ty", "u"),
    ("テャ", "ty", "a"),
    ("ティ", "t", "i"),
    ("テ", "t", "e"),
    ("ツォ", "ts", "o"),
    ("ツェ", "ts", "e"),
    ("ツィ", "ts", "i"),
    ("ツァ", "ts", "a"),
    ("ツ", "ts", "u"),
    ("ッ", "", "cl"),
    ("チョ", "ch", "o"),
    ("チュ", "ch", "u"),
    ("チャ", "ch", "a"),
    ("チェ", "ch", "e"),
    ("チ", "ch", "i"),
    ("ダ", "d", "a"),
    ("タ", "t", "a"),
    ("ゾ", "z", "o"),
    ("ソ", "s", "o"),
    ("ゼ", "z", "e"),
    ("セ", "s", "e"),
    ("ズィ", "z", "i"),
    ("ズ", "z", "u"),
    ("スィ", "s", "i"),
    ("ス", "s", "u"),
    ("ジョ", "j", "o"),
    ("ジュ", "j", "u"),
    ("ジャ", "j", "a"),
    ("ジェ", "j", "e"),
    ("ジ", "j", "i"),
    ("ショ", "sh", "o"),
    ("シュ", "sh", "u"),
    ("シャ", "sh", "a"),
    ("シェ", "sh", "e"),
    ("シ", "sh", "i"),
    ("ザ", "z", "a"),
    ("サ", "s", "a"),
    ("ゴ", "g", "o"),
    ("コ", "k", "o"),
    ("ゲ", "g", "e"),
    ("ケ", "k", "e"),
    ("グヮ", "gw", "a"),
    ("グ", "g", "u"),
    ("クヮ", "kw", "a"),
    ("ク", "k", "u"),
    ("ギョ", "gy", "o"),
    ("ギュ", "gy", "u"),
    ("ギャ", "gy", "a"),
    ("ギェ", "gy", "e"),
    ("ギ", "g", "i"),
    ("キョ", "ky", "o"),
    ("キュ", "ky", "u"),
    ("キャ", "ky", "a"),
    ("キェ", "ky", "e"),
    ("キ", "k", "i"),
    ("ガ", "g", "a"),
    ("カ", "k", "a"),
    ("オ", "", "o"),
    ("エ", "", "e"),
    ("ウォ", "w", "o"),
    ("ウェ", "w", "e"),
    ("ウィ", "w", "i"),
    ("ウ", "", "u"),
    ("イェ", "y", "e"),
    ("イ", "", "i"),
    ("ア", "", "a"),
];

/// Every kana mora plus its `_`-prefixed unvoiced variant.
static TEXT_TO_MORA: LazyLock<HashMap<String, Mora>> = LazyLock::new(|| {
    let mut map = HashMap::with_capacity(MORA_KANA.len() * 2);
    for &(text, consonant, vowel) in &MORA_KANA {
        let mora = Mora {
            text: text.to_string(),
            consonant: (!consonant.is_empty()).then(|| consonant.to_string()),
            consonant_length: (!consonant.is_empty()).then_some(0.),
            vowel: vowel.to_string(),
            vowel_length: 0.,
            pitch: 0.,
        };
        if matches!(vowel, "a" | "i" | "u" | "e" | "o") {
            map.insert(
                format!("{UNVOICE_SYMBOL}{text}"),
                Mora {
                    vowel: vowel.to_uppercase(),
                    ..mora.clone()
                },
            );
        }
        map.insert(text.to_string(), mora);
    }
    map
});

/// Look up a single mora of kana, e.g. a singing lyric.
pub(crate) fn lookup_mora(text: &str) -> Option<&'static Mora> {
    TEXT_TO_MORA.get(text).filter(|_| !text.starts_with(UNVOICE_SYMBOL))
}

/// Katakana for a consonant/vowel pair. Unvoiced vowels map to their voiced
/// kana. Pairs absent from the table come back as the concatenated phonemes.
pub fn mora_to_text(consonant: Option<&str>, vowel: &str) -> String {
    let vowel = match vowel {
        "A" | "I" | "U" | "E" | "O" => vowel.to_lowercase(),
        _ => vowel.to_string(),
    };
    let consonant = consonant.unwrap_or("");
    MORA_KANA
        .iter()
        .find(|&&(_, c, v)| c == consonant && v == vowel)
        .map_or_else(|| format!("{consonant}{vowel}"), |&(text, _, _)| text.to_string())
}

fn text_to_accent_phrase(phrase: &str) -> Result<AccentPhrase, KanaParseError> {
    let chars = phrase.chars().collect::<Vec<_>>();
    let mut accent_index = None;
    let mut moras = Vec::new();
    let mut base_index = 0;
    let mut loop_count = 0;

    while base_index < chars.len() {
        loop_count += 1;
        if loop_count > LOOP_LIMIT {
            return Err(KanaParseError::InfiniteLoop(phrase.to_string()));
        }

        if chars[base_index] == ACCENT_SYMBOL {
            if moras.is_empty() {
                return Err(KanaParseError::AccentTop(phrase.to_string()));
            }
            if accent_index.is_some() {
                return Err(KanaParseError::AccentTwice(phrase.to_string()));
            }
            accent_index = Some(moras.len());
            base_index += 1;
            continue;
        }

        let mut stack = String::new();
        let mut matched = None;
        for &c in chars[base_index..].iter().take(MAX_MORA_CHARS) {
            if c == ACCENT_SYMBOL {
                break;
            }
            stack.push(c);
            if let Some(mora) = TEXT_TO_MORA.get(&stack) {
                matched = Some((stack.chars().count(), mora));
            }
        }
        let (consumed, mora) = matched.ok_or_else(|| KanaParseError::UnknownText(stack))?;
        moras.push(mora.clone());
        base_index += consumed;
    }

    let accent = accent_index.ok_or_else(|| KanaParseError::AccentNotFound(phrase.to_string()))?;
    Ok(AccentPhrase {
        moras,
        accent,
        pause_mora: None,
        is_interrogative: false,
    })
}

/// Parse kana notation into accent phrases with zero lengths and pitches.
pub fn parse_kana(text: &str) -> Result<Vec<AccentPhrase>, KanaParseError> {
    let chars = text.chars().collect::<Vec<_>>();
    let mut parsed = Vec::new();
    let mut phrase_base = 0;

    if chars.is_empty() {
        return Err(KanaParseError::EmptyPhrase(1));
    }

    for i in 0..=chars.len() {
        let delimiter = chars.get(i).copied();
        if !matches!(delimiter, None | Some(PAUSE_DELIMITER | NOPAUSE_DELIMITER)) {
            continue;
        }
        if phrase_base == i {
            return Err(KanaParseError::EmptyPhrase(parsed.len() + 1));
        }

        let mut phrase = &chars[phrase_base..i];
        let is_interrogative = phrase.contains(&WIDE_INTERROGATION_MARK);
        if is_interrogative {
            if phrase.iter().position(|&c| c == WIDE_INTERROGATION_MARK) != Some(phrase.len() - 1)
            {
                return Err(KanaParseError::InterrogationMarkNotAtEnd(
                    phrase.iter().collect(),
                ));
            }
            phrase = &phrase[..phrase.len() - 1];
        }

        let mut accent_phrase = text_to_accent_phrase(&phrase.iter().collect::<String>())?;
        if delimiter == Some(PAUSE_DELIMITER) {
            accent_phrase.pause_mora = Some(Mora::pause());
        }
        accent_phrase.is_interrogative = is_interrogative;
        parsed.push(accent_phrase);
        phrase_base = i + 1;
    }

    Ok(parsed)
}

/// Render accent phrases back into kana notation.
pub fn create_kana(accent_phrases: &[AccentPhrase]) -> String {
    let mut text = String::new();
    for phrase in accent_phrases {
        for (i, mora) in phrase.moras.iter().enumerate() {
            if matches!(&*mora.vowel, "A" | "E" | "I" | "O" | "U") {
                text.push(UNVOICE_SYMBOL);
            }
            text.push_str(&mora.text);
            if i + 1 == phrase.accent {
                text.push(ACCENT_SYMBOL);
            }
        }
        if phrase.is_interrogative {
            text.push(WIDE_INTERROGATION_MARK);
        }
        text.push(if phrase.pause_mora.is_some() {
            PAUSE_DELIMITER
        } else {
            NOPAUSE_DELIMITER
        });
    }
    text.pop();
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unvoiced_variants_exist_for_plain_vowels_only() {
        assert_eq!(TEXT_TO_MORA["_ツ"].vowel, "U");
        assert_eq!(TEXT_TO_MORA["_ツ"].consonant.as_deref(), Some("ts"));
        assert!(!TEXT_TO_MORA.contains_key("_ン"));
        assert!(!TEXT_TO_MORA.contains_key("_ッ"));
        assert_eq!(TEXT_TO_MORA.len(), 144 * 2 - 2);
    }

    #[test]
    fn parses_longest_match_and_accent() {
        let phrases = parse_kana("キャ'ット").unwrap();
        assert_eq!(phrases.len(), 1);
        let texts = phrases[0].moras.iter().map(|m| m.text.as_str()).collect::<Vec<_>>();
        assert_eq!(texts, ["キャ", "ッ", "ト"]);
        assert_eq!(phrases[0].accent, 1);
        assert_eq!(phrases[0].moras[0].consonant_length, Some(0.));
        assert_eq!(phrases[0].moras[1].consonant_length, None);
    }

    #[test]
    fn delimiters_set_pause_and_interrogative() {
        let phrases = parse_kana("ア'、イ'/ウ'？").unwrap();
        assert_eq!(phrases.len(), 3);
        assert_eq!(phrases[0].pause_mora, Some(Mora::pause()));
        assert_eq!(phrases[1].pause_mora, None);
        assert!(phrases[2].is_interrogative);
        assert!(!phrases[0].is_interrogative);
    }

    #[test]
    fn kana_round_trips() {
        let text = "アンドロ'イドワ、デンキ'/ヒ'_ツジノ/ユメ'オ/ミ'ルカ？";
        assert_eq!(create_kana(&parse_kana(text).unwrap()), text);
    }

    #[test]
    fn rejects_malformed_notation() {
        assert_eq!(
            parse_kana("'ア"),
            Err(KanaParseError::AccentTop("'ア".to_string()))
        );
        assert_eq!(
            parse_kana("ア'イ'"),
            Err(KanaParseError::AccentTwice("ア'イ'".to_string()))
        );
        assert_eq!(
            parse_kana("アイ"),
            Err(KanaParseError::AccentNotFound("アイ".to_string()))
        );
        assert!(matches!(parse_kana("ア'x"), Err(KanaParseError::UnknownText(_))));
        assert_eq!(parse_kana("ア'//イ'"), Err(KanaParseError::EmptyPhrase(2)));
        assert_eq!(parse_kana(""), Err(KanaParseError::EmptyPhrase(1)));
        assert!(matches!(
            parse_kana("ア？イ'"),
            Err(KanaParseError::InterrogationMarkNotAtEnd(_))
        ));
    }

    #[test]
    fn mora_to_text_handles_unvoiced_and_unknown() {
        assert_eq!(mora_to_text(None, "a"), "ア");
        assert_eq!(mora_to_text(None, "A"), "ア");
        assert_eq!(mora_to_text(Some("ky"), "o"), "キョ");
        assert_eq!(mora_to_text(None, "cl"), "ッ");
        assert_eq!(mora_to_text(Some("x"), "a"), "xa");
    }

    #[test]
    fn lookup_rejects_unvoiced_keys() {
        assert!(lookup_mora("ド").is_some());
        assert!(lookup_mora("_ド").is_none());
        assert!(lookup_mora("ドド").is_none());
    }
}
