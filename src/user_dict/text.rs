use std::sync::LazyLock;

use regex::Regex;

static SPACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{Z}").expect("valid regex"));

static MORA_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        "(?:",
        "[イ][ェ]|[ヴ][ャュョ]|[トド][ゥ]|[テデ][ィャュョ]|[デ][ェ]|[クグ][ヮ]|",
        "[キシチニヒミリギジビピ][ェャュョ]|",
        "[ツフヴ][ァ]|[ウスツフヴズ][ィ]|[ウツフヴ][ェォ]|",
        "[ァ-ヴー]",
        ")",
    ))
    .expect("valid regex")
});

/// Convert printable ASCII to full-width forms and every separator to U+3000.
pub(crate) fn to_zenkaku(s: &str) -> String {
    SPACE_REGEX
        .replace_all(s, "\u{3000}")
        .chars()
        .map(|c| match u32::from(c) {
            i @ 0x21..=0x7e => char::from_u32(0xfee0 + i).unwrap_or(c),
            _ => c,
        })
        .collect()
}

/// Number of moras in a katakana pronunciation.
pub(crate) fn count_moras(pronunciation: &str) -> usize {
    MORA_REGEX.find_iter(pronunciation).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zenkaku_conversion() {
        assert_eq!(to_zenkaku("hoge"), "ｈｏｇｅ");
        assert_eq!(to_zenkaku("a b\u{3000}1!"), "ａ\u{3000}ｂ\u{3000}１！");
        assert_eq!(to_zenkaku("単語"), "単語");
    }

    #[test]
    fn mora_counting() {
        assert_eq!(count_moras("ヨミ"), 2);
        assert_eq!(count_moras("キャット"), 3);
        assert_eq!(count_moras("ウィーク"), 3);
        assert_eq!(count_moras("グヮ"), 1);
        assert_eq!(count_moras("ティーチャー"), 4);
    }
}
