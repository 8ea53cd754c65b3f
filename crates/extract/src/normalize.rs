//! Stateless value canonicalization, shared by the extractors and by
//! manual-edit flows. Nothing here errors: a value that cannot be
//! normalized comes back unchanged (dates, payees) or as the documented
//! sentinel (amounts get 0, usage gets 雑費).

use chrono::{Local, NaiveDate};

use crate::date;
use crate::tables;
use crate::text::{collapse_whitespace, is_kanji, strip_edge_separators, to_halfwidth};
use crate::usage::keyword_category;
use crate::{amount, extract::re};

re!(re_entity_spacing, r"(株式会社|有限会社|合同会社)\s+|\s+(株式会社|有限会社|合同会社)");

/// Canonicalize any recognized date shape to `YYYY/MM/DD`. The input comes
/// back unchanged when nothing matches or the match fails validation.
pub fn normalize_date(raw: &str) -> String {
    let today = Local::now().date_naive();
    match date::match_date(raw, today) {
        Some((d, _)) => date::format_canonical(d),
        None => raw.to_string(),
    }
}

/// Parse a currency string to whole yen; 0 for anything non-positive,
/// out of range, or unparseable.
pub fn normalize_amount(raw: &str) -> i64 {
    amount::parse_amount(raw).unwrap_or(0)
}

/// ロ (katakana ro) read inside a kanji word is almost always 口 (mouth
/// kanji). Substitute only when both neighbors are kanji so katakana words
/// are left alone.
fn fix_kana_kanji_confusion(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    chars
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            if c == 'ロ'
                && i > 0
                && i + 1 < chars.len()
                && is_kanji(chars[i - 1])
                && is_kanji(chars[i + 1])
            {
                '口'
            } else {
                c
            }
        })
        .collect()
}

/// Clean up an OCR-read business name: width folding, confusion-pair
/// substitution, separator trimming, and entity-affix spacing.
pub fn normalize_payee(raw: &str) -> String {
    let mut s = to_halfwidth(raw);
    for (from, to) in tables::OCR_CONFUSION_PAIRS {
        s = s.replace(*from, &to.to_string());
    }
    s = fix_kana_kanji_confusion(&s);
    s = collapse_whitespace(strip_edge_separators(&s));
    // 株式会社山田, never 株式会社 山田.
    while let Some(m) = re_entity_spacing().find(&s) {
        let compact: String = s[m.range()].chars().filter(|c| !c.is_whitespace()).collect();
        s.replace_range(m.range(), &compact);
    }
    s
}

/// Map free-form usage text onto the standard category set. First keyword
/// hit in table order wins; unmatched non-empty input passes through; empty
/// input becomes 雑費.
pub fn normalize_usage(raw: &str) -> String {
    let cleaned = collapse_whitespace(strip_edge_separators(raw));
    if cleaned.is_empty() {
        return tables::USAGE_DEFAULT_CATEGORY.to_string();
    }
    match keyword_category(&cleaned) {
        Some((category, _)) => category.to_string(),
        None => cleaned,
    }
}

// ── Validation predicates for manual-edit flows ──────────────────────────────

pub fn is_valid_normalized_date(value: &str) -> bool {
    NaiveDate::parse_from_str(value, "%Y/%m/%d")
        .map(|d| date::in_valid_range(d, Local::now().date_naive()))
        .unwrap_or(false)
}

pub fn is_valid_normalized_amount(value: i64) -> bool {
    (tables::AMOUNT_MIN..=tables::AMOUNT_MAX).contains(&value)
}

pub fn is_valid_normalized_payee(value: &str) -> bool {
    (2..=100).contains(&value.trim().chars().count())
}

pub fn is_valid_normalized_usage(value: &str) -> bool {
    (1..=50).contains(&value.trim().chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_era_conversion() {
        assert_eq!(normalize_date("令和6年1月15日"), "2024/01/15");
        assert_eq!(normalize_date("平成31年4月30日"), "2019/04/30");
        assert_eq!(normalize_date("2024-01-25"), "2024/01/25");
    }

    #[test]
    fn date_passthrough_on_no_match() {
        assert_eq!(normalize_date("日付なし"), "日付なし");
        assert_eq!(normalize_date("2024/2/30"), "2024/2/30");
    }

    #[test]
    fn amount_parsing() {
        assert_eq!(normalize_amount("¥1,234,567"), 1_234_567);
        assert_eq!(normalize_amount("-100"), 0);
        assert_eq!(normalize_amount("1500.50"), 1501);
        assert_eq!(normalize_amount("ただの文字"), 0);
    }

    #[test]
    fn payee_cleanup() {
        assert_eq!(normalize_payee("  ：株式会社 山田  "), "株式会社山田");
        assert_eq!(normalize_payee("山田 株式会社"), "山田株式会社");
        assert_eq!(normalize_payee("會社つばめ"), "会社つばめ");
        assert_eq!(normalize_payee("（株）ＡＢＣ"), "(株)ABC");
    }

    #[test]
    fn payee_kana_kanji_confusion_is_contextual() {
        // ロ between kanji becomes 口.
        assert_eq!(normalize_payee("山ロ商店"), "山口商店");
        // Katakana words keep their ロ.
        assert_eq!(normalize_payee("メロンパンの店"), "メロンパンの店");
    }

    #[test]
    fn usage_standardization() {
        assert_eq!(normalize_usage("打合せ"), "会議費");
        assert_eq!(normalize_usage("タクシー"), "交通費");
        assert_eq!(normalize_usage(""), "雑費");
        assert_eq!(normalize_usage("  "), "雑費");
        assert_eq!(normalize_usage("特別な催し"), "特別な催し");
    }

    #[test]
    fn validation_predicates() {
        assert!(is_valid_normalized_date("2024/01/15"));
        assert!(!is_valid_normalized_date("1899/12/31"));
        assert!(!is_valid_normalized_date("not a date"));
        assert!(is_valid_normalized_amount(1));
        assert!(!is_valid_normalized_amount(0));
        assert!(!is_valid_normalized_amount(10_000_001));
        assert!(is_valid_normalized_payee("田中"));
        assert!(!is_valid_normalized_payee("田"));
        assert!(is_valid_normalized_usage("会議費"));
        assert!(!is_valid_normalized_usage(""));
    }
}
