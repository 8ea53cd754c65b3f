//! Small text helpers shared by the field extractors.

/// Convert full-width ASCII variants (digits, latin letters, punctuation
/// commonly seen on receipts) to their half-width forms.
pub fn to_halfwidth(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
            'Ａ'..='Ｚ' => char::from_u32(c as u32 - 'Ａ' as u32 + 'A' as u32).unwrap_or(c),
            'ａ'..='ｚ' => char::from_u32(c as u32 - 'ａ' as u32 + 'a' as u32).unwrap_or(c),
            '　' => ' ',
            '，' => ',',
            '．' => '.',
            '：' => ':',
            '／' => '/',
            '－' => '-',
            '￥' => '¥',
            '（' => '(',
            '）' => ')',
            _ => c,
        })
        .collect()
}

pub fn is_kanji(c: char) -> bool {
    ('\u{4E00}'..='\u{9FFF}').contains(&c)
}

pub fn is_hiragana(c: char) -> bool {
    ('\u{3040}'..='\u{309F}').contains(&c)
}

pub fn is_katakana(c: char) -> bool {
    ('\u{30A0}'..='\u{30FF}').contains(&c)
}

/// True if the string contains any Japanese script.
pub fn contains_japanese(s: &str) -> bool {
    s.chars().any(|c| is_kanji(c) || is_hiragana(c) || is_katakana(c))
}

/// True if over half the non-whitespace characters are ASCII digits.
pub fn is_mostly_digits(s: &str) -> bool {
    let chars: Vec<char> = s.chars().filter(|c| !c.is_whitespace()).collect();
    if chars.is_empty() {
        return false;
    }
    let digits = chars.iter().filter(|c| c.is_ascii_digit()).count();
    digits * 2 > chars.len()
}

/// Strip leading and trailing separator junk (colons, dashes, brackets,
/// whitespace) left behind after a label is removed.
pub fn strip_edge_separators(s: &str) -> &str {
    s.trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, ':' | '：' | '-' | '－' | '=' | '・' | '|' | '[' | ']')
    })
}

/// Collapse runs of whitespace to a single ASCII space.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halfwidth_digits_and_symbols() {
        assert_eq!(to_halfwidth("￥１，２３４"), "¥1,234");
        assert_eq!(to_halfwidth("（株）ＡＢＣ"), "(株)ABC");
    }

    #[test]
    fn script_detection() {
        assert!(contains_japanese("合計"));
        assert!(contains_japanese("レシート"));
        assert!(!contains_japanese("Total 1234"));
    }

    #[test]
    fn mostly_digits() {
        assert!(is_mostly_digits("1,234"));
        assert!(!is_mostly_digits("株式会社1"));
        assert!(!is_mostly_digits(""));
    }

    #[test]
    fn edge_separator_stripping() {
        assert_eq!(strip_edge_separators("： 田中商店 -"), "田中商店");
        assert_eq!(strip_edge_separators("[合計]"), "合計");
    }
}
