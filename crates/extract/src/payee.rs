//! Payee extraction: store and company names, including headings split
//! across two lines.

use ryoshu_core::RecognizedText;

use crate::extract::{re, Candidate, Layout};
use crate::tables;
use crate::text::{contains_japanese, is_mostly_digits, to_halfwidth};

re!(re_pure_digits, r"^[\d\s,.\-/:¥円]+$");
re!(re_separators_only, r"^[\s\-=_*・。、.:：|]+$");
re!(re_pure_latin, r"^[A-Za-z\s.\-']+$");
re!(re_amount_shape, r"^[¥￥]?\s*\d{1,3}(?:,\d{3})*(?:\.\d+)?\s*円?$");
re!(re_date_shape, r"\d{4}[/\-.年]\d{1,2}[/\-.月]\d{1,2}|\d{1,2}月\d{1,2}日");

/// Lines that can never be a payee, regardless of score.
fn rejected(text: &str) -> bool {
    let s = to_halfwidth(text);
    let trimmed = s.trim();
    trimmed.chars().count() < 2
        || re_pure_digits().is_match(trimmed)
        || re_separators_only().is_match(trimmed)
        || re_pure_latin().is_match(trimmed)
        || re_amount_shape().is_match(trimmed)
        || re_date_shape().is_match(trimmed)
}

/// Highest boost among business suffixes contained in the text.
fn suffix_boost(text: &str) -> f32 {
    tables::PAYEE_SUFFIX_BOOSTS
        .iter()
        .filter(|(suffix, _)| text.contains(suffix))
        .map(|(_, boost)| *boost)
        .fold(0.0, f32::max)
}

fn looks_like_business(text: &str) -> bool {
    contains_japanese(text) && !is_mostly_digits(text)
}

fn score(text: &RecognizedText, layout: &Layout) -> f32 {
    let value = text.text.trim();
    let mut score = text.confidence + suffix_boost(value);

    if tables::PAYEE_CORPORATE_PREFIXES.iter().any(|p| value.starts_with(p)) {
        score += tables::PAYEE_BOOST_CORPORATE_PREFIX;
    }
    if layout.vertical_ratio(&text.bounding_box) <= tables::PAYEE_UPPER_REGION_RATIO {
        score += tables::PAYEE_BOOST_UPPER_REGION;
    }
    let len = value.chars().count();
    if (3..=30).contains(&len) {
        score += tables::PAYEE_BOOST_GOOD_LENGTH;
    } else if len > 30 {
        score += tables::PAYEE_PENALTY_TOO_LONG;
    }
    if looks_like_business(value) {
        score += tables::PAYEE_BOOST_BUSINESS_LOOK;
    }
    if layout.avg_height() > 0.0
        && text.bounding_box.height > layout.avg_height() * tables::PAYEE_HEADING_HEIGHT_RATIO
    {
        score += tables::PAYEE_BOOST_HEADING_HEIGHT;
    }
    if tables::PAYEE_BOILERPLATE_MARKERS.iter().any(|m| value.contains(m)) {
        score += tables::PAYEE_PENALTY_BOILERPLATE;
    }
    score
}

/// A heading broken across two lines: `a` sits directly above `b` with
/// horizontal overlap, closer than half a line height.
fn vertically_adjacent(a: &RecognizedText, b: &RecognizedText) -> bool {
    let gap = b.bounding_box.y - a.bounding_box.bottom();
    let half_line = a.bounding_box.height.max(b.bounding_box.height) / 2.0;
    gap >= 0.0 && gap <= half_line && a.bounding_box.horizontal_overlap(&b.bounding_box) > 0.0
}

pub(crate) fn candidates(texts: &[RecognizedText], layout: &Layout) -> Vec<Candidate> {
    let mut pool = Vec::new();
    for t in texts {
        if rejected(&t.text) {
            continue;
        }
        pool.push(Candidate::new(t.text.trim(), score(t, layout), Some(t.bounding_box)));
    }

    // Merge two-line headings when the concatenation carries a business
    // suffix that neither line completes on its own.
    for a in texts {
        for b in texts {
            if std::ptr::eq(a, b) || !vertically_adjacent(a, b) {
                continue;
            }
            let joined = format!("{}{}", a.text.trim(), b.text.trim());
            if suffix_boost(&joined) > 0.0 && looks_like_business(&joined) && !rejected(&joined) {
                let merged_score =
                    a.confidence.min(b.confidence) + tables::PAYEE_BOOST_MULTILINE_MERGE;
                pool.push(Candidate::new(
                    joined,
                    merged_score,
                    Some(a.bounding_box.union(&b.bounding_box)),
                ));
            }
        }
    }
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use ryoshu_core::Rect;

    fn text(s: &str, conf: f32, rect: Rect) -> RecognizedText {
        RecognizedText::new(s, conf, rect)
    }

    fn line(s: &str, conf: f32, y: f32) -> RecognizedText {
        text(s, conf, Rect::new(10.0, y, 200.0, 20.0))
    }

    #[test]
    fn rejects_non_name_lines() {
        assert!(rejected("1234"));
        assert!(rejected("¥1,234"));
        assert!(rejected("2024/01/15"));
        assert!(rejected("----"));
        assert!(rejected("あ"));
        assert!(rejected("THANK YOU"));
        assert!(!rejected("田中商店"));
    }

    #[test]
    fn suffix_boost_takes_best_match() {
        // 株式会社 (0.4) outranks the also-contained 店 (0.3).
        assert_eq!(suffix_boost("株式会社田中商店"), 0.4);
        assert_eq!(suffix_boost("喫茶アルプス堂"), 0.25);
        assert_eq!(suffix_boost("ミーティング"), 0.0);
    }

    #[test]
    fn corporate_name_at_top_scores_high() {
        let texts = vec![
            line("株式会社青空商店", 0.7, 10.0),
            line("ご来店ありがとうございます", 0.7, 50.0),
            line("適当な行", 0.7, 400.0),
        ];
        let layout = Layout::of(&texts);
        let pool = candidates(&texts, &layout);
        let best =
            pool.iter().max_by(|a, b| a.score.partial_cmp(&b.score).unwrap()).unwrap();
        assert_eq!(best.value, "株式会社青空商店");
    }

    #[test]
    fn boilerplate_penalized() {
        let texts = vec![line("領収書", 0.9, 10.0), line("山田屋", 0.6, 40.0)];
        let layout = Layout::of(&texts);
        let pool = candidates(&texts, &layout);
        let receipt_word = pool.iter().find(|c| c.value == "領収書").unwrap();
        let shop = pool.iter().find(|c| c.value == "山田屋").unwrap();
        assert!(shop.score > receipt_word.score);
    }

    #[test]
    fn two_line_heading_merged() {
        let texts = vec![
            text("株式", 0.8, Rect::new(50.0, 10.0, 80.0, 24.0)),
            text("会社みどり", 0.7, Rect::new(50.0, 38.0, 120.0, 24.0)),
        ];
        let layout = Layout::of(&texts);
        let pool = candidates(&texts, &layout);
        let merged = pool.iter().find(|c| c.value == "株式会社みどり").expect("merged candidate");
        assert!((merged.score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn distant_lines_not_merged() {
        let texts = vec![
            text("株式", 0.8, Rect::new(50.0, 10.0, 80.0, 24.0)),
            text("会社みどり", 0.7, Rect::new(50.0, 200.0, 120.0, 24.0)),
        ];
        let layout = Layout::of(&texts);
        let pool = candidates(&texts, &layout);
        assert!(pool.iter().all(|c| c.value != "株式会社みどり"));
    }
}
