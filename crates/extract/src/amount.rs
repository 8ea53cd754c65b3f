//! Amount extraction: currency-marked or labeled digit groups, parsed to
//! whole yen.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use ryoshu_core::RecognizedText;
use std::str::FromStr;

use crate::extract::{re, Candidate, Layout};
use crate::tables;
use crate::text::to_halfwidth;

re!(re_amount_shape, r"[¥￥]\s*(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?|(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?\s*円|\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?");
re!(re_has_currency, r"[¥￥]|円");
re!(re_comma_grouped, r"\d{1,3}(?:,\d{3})+");

/// Strip currency markers and grouping, parse, and round half-away-from-zero
/// to whole yen. `None` when the text has no parseable number or the value
/// falls outside the accepted range.
pub(crate) fn parse_amount(raw: &str) -> Option<i64> {
    let cleaned: String = to_halfwidth(raw)
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '¥' && *c != '円' && *c != ',')
        .collect();
    let dec = Decimal::from_str(&cleaned).ok()?;
    let value = dec.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero).to_i64()?;
    (tables::AMOUNT_MIN..=tables::AMOUNT_MAX).contains(&value).then_some(value)
}

/// Boost of the best matching label, checked in table order so compound
/// labels win over their substrings.
fn label_boost(text: &str) -> f32 {
    tables::AMOUNT_LABEL_BOOSTS
        .iter()
        .find(|(label, _)| text.contains(label))
        .map(|(_, boost)| *boost)
        .unwrap_or(0.0)
}

pub(crate) fn candidates(texts: &[RecognizedText], layout: &Layout) -> Vec<Candidate> {
    let mut pool = Vec::new();
    for t in texts {
        let halfwidth = to_halfwidth(&t.text);
        let label = label_boost(&halfwidth);
        let Some(m) = re_amount_shape().find(&halfwidth) else { continue };
        // A bare ungrouped number needs a label or currency marker to count
        // as an amount shape at all.
        let has_currency = re_has_currency().is_match(&halfwidth);
        let comma_grouped = re_comma_grouped().is_match(m.as_str());
        if label == 0.0 && !has_currency && !comma_grouped {
            continue;
        }
        let Some(value) = parse_amount(m.as_str()) else { continue };

        let mut score = t.confidence + label;
        if comma_grouped {
            score += tables::AMOUNT_BOOST_COMMA_GROUPING;
        }
        if has_currency {
            score += tables::AMOUNT_BOOST_CURRENCY_SYMBOL;
        }
        score += if (100..=100_000).contains(&value) {
            tables::AMOUNT_BOOST_COMMON_RANGE
        } else if (10..=1_000_000).contains(&value) {
            tables::AMOUNT_BOOST_PLAUSIBLE_RANGE
        } else {
            tables::AMOUNT_PENALTY_IMPLAUSIBLE_RANGE
        };
        if layout.vertical_ratio(&t.bounding_box) >= 1.0 - tables::AMOUNT_LOWER_REGION_RATIO {
            score += tables::AMOUNT_BOOST_LOWER_REGION;
        }
        if value < 10 {
            score += tables::AMOUNT_PENALTY_TINY;
        }
        if value % 50 == 0 || value % 100 == 0 {
            score += tables::AMOUNT_BOOST_ROUND_VALUE;
        }

        pool.push(Candidate::new(value.to_string(), score, Some(t.bounding_box)));
    }
    pool
}
