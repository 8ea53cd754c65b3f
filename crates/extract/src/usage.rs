//! Usage (expense category) extraction. Unlike the other fields there is
//! always an answer: the fallback ladder ends at 雑費.

use ryoshu_core::RecognizedText;

use crate::extract::{re, Candidate, Layout};
use crate::tables;
use crate::text::strip_edge_separators;

re!(re_usage_label, r"(?:用途|目的|利用内容|適用)\s*[:：]?\s*(.+)");

/// First keyword hit in table order; order is significant.
pub(crate) fn keyword_category(text: &str) -> Option<(&'static str, f32)> {
    tables::USAGE_CATEGORIES
        .iter()
        .find(|(kw, _, _)| text.contains(kw))
        .map(|(_, cat, weight)| (*cat, *weight))
}

fn business_hint(text: &str) -> Option<&'static str> {
    tables::USAGE_BUSINESS_HINTS
        .iter()
        .find(|(kw, _)| text.contains(kw))
        .map(|(_, cat)| *cat)
}

pub(crate) fn candidates(texts: &[RecognizedText], layout: &Layout) -> Vec<Candidate> {
    let mut pool = Vec::new();

    for t in texts {
        let ratio = layout.vertical_ratio(&t.bounding_box);

        // Keyword hits in the body of the receipt.
        if (tables::USAGE_SLICE_TOP_RATIO..=tables::USAGE_SLICE_BOTTOM_RATIO).contains(&ratio) {
            if let Some((category, weight)) = keyword_category(&t.text) {
                pool.push(Candidate::new(category, t.confidence + weight, Some(t.bounding_box)));
            }
        }

        // Explicit "用途: …" lines anywhere.
        if let Some(c) = re_usage_label().captures(&t.text) {
            let raw_value = strip_edge_separators(&c[1]);
            if !raw_value.is_empty() {
                let value = keyword_category(raw_value)
                    .map(|(cat, _)| cat.to_string())
                    .unwrap_or_else(|| raw_value.to_string());
                pool.push(Candidate::new(
                    value,
                    t.confidence + tables::USAGE_BOOST_EXPLICIT_LABEL,
                    Some(t.bounding_box),
                ));
            }
        }

        // Business-type inference (カフェ, ホテル, …) anywhere.
        if let Some(category) = business_hint(&t.text) {
            pool.push(Candidate::new(
                category,
                t.confidence + tables::USAGE_BOOST_BUSINESS_HINT,
                Some(t.bounding_box),
            ));
        }
    }

    if !pool.is_empty() {
        return pool;
    }

    // Frequency scan across everything recognized.
    let mut counts: Vec<(&'static str, u32)> = Vec::new();
    for t in texts {
        for (kw, cat, _) in tables::USAGE_CATEGORIES {
            if t.text.contains(kw) {
                match counts.iter_mut().find(|(c, _)| c == cat) {
                    Some((_, n)) => *n += 1,
                    None => counts.push((cat, 1)),
                }
            }
        }
    }
    if let Some((category, count)) = counts.into_iter().max_by_key(|(_, n)| *n) {
        let score = tables::USAGE_FREQUENCY_BASE + tables::USAGE_FREQUENCY_STEP * count as f32;
        return vec![Candidate::new(category, score, None)];
    }

    // Broad substring fallbacks.
    for (kw, cat) in tables::USAGE_SUBSTRING_FALLBACKS {
        if texts.iter().any(|t| t.text.contains(kw)) {
            return vec![Candidate::new(*cat, tables::USAGE_FREQUENCY_BASE, None)];
        }
    }

    vec![Candidate::new(tables::USAGE_DEFAULT_CATEGORY, tables::USAGE_DEFAULT_CONFIDENCE, None)]
}
