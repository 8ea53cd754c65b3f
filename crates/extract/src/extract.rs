//! Field extraction: turns an ordered list of recognized text spans into
//! the four structured receipt fields with ranked alternates.

use chrono::{Local, NaiveDate};
use ryoshu_core::{FieldKind, FieldResult, ReceiptRecord, RecognizedText, RecordMetadata, Rect};
use tracing::debug;

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        pub(crate) fn $name() -> &'static regex::Regex {
            static R: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
            R.get_or_init(|| regex::Regex::new($pat).expect("invalid regex"))
        }
    };
}
pub(crate) use re;

// ── Candidate pool ───────────────────────────────────────────────────────────

/// One value a field extractor considered. `score` is the raw additive
/// confidence and may exceed 1.0; ranking happens on the raw value and
/// clamping only when a `FieldResult` is emitted.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub value: String,
    pub score: f32,
    pub bbox: Option<Rect>,
}

impl Candidate {
    pub fn new(value: impl Into<String>, score: f32, bbox: Option<Rect>) -> Self {
        Self { value: value.into(), score, bbox }
    }
}

/// Sort by raw score descending, dedup case-insensitively after trimming
/// (first occurrence wins), cap at `max`, and emit the top candidate as the
/// field's primary value.
pub(crate) fn select_candidates(mut pool: Vec<Candidate>, max: usize) -> FieldResult {
    if pool.is_empty() {
        return FieldResult::empty();
    }
    pool.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut seen: Vec<String> = Vec::new();
    let mut kept: Vec<Candidate> = Vec::new();
    for c in pool {
        let key = c.value.trim().to_lowercase();
        if key.is_empty() || seen.contains(&key) {
            continue;
        }
        seen.push(key);
        kept.push(c);
        if kept.len() == max {
            break;
        }
    }
    if kept.is_empty() {
        return FieldResult::empty();
    }

    let top = kept[0].clone();
    let candidates = kept.into_iter().map(|c| c.value).collect();
    FieldResult::new(top.value, top.score, candidates, top.bbox)
}

// ── Receipt layout ───────────────────────────────────────────────────────────

/// Vertical extent and average text height of the recognized spans, used by
/// the positional confidence boosts.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Layout {
    top: f32,
    bottom: f32,
    avg_height: f32,
}

impl Layout {
    pub(crate) fn of(texts: &[RecognizedText]) -> Self {
        if texts.is_empty() {
            return Self { top: 0.0, bottom: 0.0, avg_height: 0.0 };
        }
        let top = texts.iter().map(|t| t.bounding_box.y).fold(f32::INFINITY, f32::min);
        let bottom =
            texts.iter().map(|t| t.bounding_box.bottom()).fold(f32::NEG_INFINITY, f32::max);
        let avg_height =
            texts.iter().map(|t| t.bounding_box.height).sum::<f32>() / texts.len() as f32;
        Self { top, bottom, avg_height }
    }

    /// Vertical position of `rect`'s center as a 0..1 ratio of the text
    /// extent; 0.5 when the extent is degenerate.
    pub(crate) fn vertical_ratio(&self, rect: &Rect) -> f32 {
        let extent = self.bottom - self.top;
        if extent <= 0.0 {
            return 0.5;
        }
        ((rect.center_y() - self.top) / extent).clamp(0.0, 1.0)
    }

    pub(crate) fn avg_height(&self) -> f32 {
        self.avg_height
    }
}

// ── Extractor ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Cap on the ranked alternates kept per field.
    pub max_candidates: usize,
    /// Override for "today" in date recency scoring and month/day-only
    /// year inference. `None` means the local calendar date.
    pub today: Option<NaiveDate>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self { max_candidates: 5, today: None }
    }
}

/// Converts recognized text spans into a `ReceiptRecord`. Stateless apart
/// from configuration; safe to share.
#[derive(Debug, Clone, Default)]
pub struct FieldExtractor {
    config: ExtractorConfig,
}

impl FieldExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    fn today(&self) -> NaiveDate {
        self.config.today.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Run all four field extractors over one OCR pass.
    pub fn extract(&self, texts: &[RecognizedText], content_hash: impl Into<String>) -> ReceiptRecord {
        let record = ReceiptRecord {
            date: self.extract_date(texts),
            payee: self.extract_payee(texts),
            amount: self.extract_amount(texts),
            usage: self.extract_usage(texts),
            metadata: RecordMetadata {
                processed_at: chrono::Utc::now(),
                content_hash: content_hash.into(),
            },
        };
        debug!(
            date = %record.date.value,
            payee = %record.payee.value,
            amount = %record.amount.value,
            usage = %record.usage.value,
            "extracted receipt fields"
        );
        record
    }

    pub fn extract_field(&self, texts: &[RecognizedText], kind: FieldKind) -> FieldResult {
        match kind {
            FieldKind::Date => self.extract_date(texts),
            FieldKind::Payee => self.extract_payee(texts),
            FieldKind::Amount => self.extract_amount(texts),
            FieldKind::Usage => self.extract_usage(texts),
        }
    }

    pub fn extract_date(&self, texts: &[RecognizedText]) -> FieldResult {
        let layout = Layout::of(texts);
        let pool = crate::date::candidates(texts, &layout, self.today());
        select_candidates(pool, self.config.max_candidates)
    }

    pub fn extract_payee(&self, texts: &[RecognizedText]) -> FieldResult {
        let layout = Layout::of(texts);
        let pool = crate::payee::candidates(texts, &layout);
        select_candidates(pool, self.config.max_candidates)
    }

    pub fn extract_amount(&self, texts: &[RecognizedText]) -> FieldResult {
        let layout = Layout::of(texts);
        let pool = crate::amount::candidates(texts, &layout);
        select_candidates(pool, self.config.max_candidates)
    }

    pub fn extract_usage(&self, texts: &[RecognizedText]) -> FieldResult {
        let layout = Layout::of(texts);
        let pool = crate::usage::candidates(texts, &layout);
        select_candidates(pool, self.config.max_candidates)
    }

    /// Re-extract one field from a region-scoped OCR pass and merge it into
    /// an existing record. The primary value is replaced only when the new
    /// extraction is strictly more confident; candidates are unioned under
    /// the usual dedup-and-cap rule. `processed_at` is always refreshed.
    pub fn merge_region_candidates(
        &self,
        mut record: ReceiptRecord,
        region_texts: &[RecognizedText],
        kind: FieldKind,
    ) -> ReceiptRecord {
        let fresh = self.extract_field(region_texts, kind);
        let field = record.field_mut(kind);

        let mut merged: Vec<String> = Vec::new();
        let mut seen: Vec<String> = Vec::new();
        let push = |v: &str, merged: &mut Vec<String>, seen: &mut Vec<String>| {
            let key = v.trim().to_lowercase();
            if key.is_empty() || seen.contains(&key) || merged.len() >= self.config.max_candidates {
                return;
            }
            seen.push(key);
            merged.push(v.to_string());
        };

        if fresh.confidence > field.confidence {
            // New winner first so it heads the candidate list.
            push(&fresh.value, &mut merged, &mut seen);
            for v in fresh.candidates.iter().chain(field.candidates.iter()) {
                push(v, &mut merged, &mut seen);
            }
            field.value = fresh.value;
            field.confidence = fresh.confidence;
            field.bounding_box = fresh.bounding_box;
        } else {
            for v in field.candidates.iter().chain(fresh.candidates.iter()) {
                push(v, &mut merged, &mut seen);
            }
        }
        field.candidates = merged;

        record.metadata.processed_at = chrono::Utc::now();
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str, conf: f32, y: f32) -> RecognizedText {
        RecognizedText::new(s, conf, Rect::new(10.0, y, 200.0, 20.0))
    }

    fn extractor() -> FieldExtractor {
        FieldExtractor::new(ExtractorConfig {
            today: NaiveDate::from_ymd_opt(2024, 6, 1),
            ..Default::default()
        })
    }

    #[test]
    fn select_orders_dedups_and_caps() {
        let pool = vec![
            Candidate::new("A", 0.3, None),
            Candidate::new("b", 0.9, None),
            Candidate::new(" B ", 0.7, None),
            Candidate::new("c", 0.8, None),
            Candidate::new("d", 0.5, None),
            Candidate::new("e", 0.4, None),
            Candidate::new("f", 0.35, None),
        ];
        let result = select_candidates(pool, 5);
        assert_eq!(result.value, "b");
        assert_eq!(result.candidates, vec!["b", "c", "d", "e", "f"]);
    }

    #[test]
    fn select_clamps_emitted_confidence_only() {
        let pool = vec![Candidate::new("847", 1.45, None)];
        let result = select_candidates(pool, 5);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn select_empty_pool_is_empty_result() {
        let result = select_candidates(vec![], 5);
        assert!(result.is_empty());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn extract_builds_full_record() {
        let texts = vec![
            text("株式会社山田商店", 0.8, 10.0),
            text("令和6年1月15日", 0.8, 40.0),
            text("会議費", 0.7, 200.0),
            text("合計 ¥847", 0.7, 400.0),
        ];
        let record = extractor().extract(&texts, "abc123");
        assert_eq!(record.date.value, "2024/01/15");
        assert_eq!(record.amount.value, "847");
        assert_eq!(record.payee.value, "株式会社山田商店");
        assert_eq!(record.usage.value, "会議費");
        assert_eq!(record.metadata.content_hash, "abc123");
    }

    #[test]
    fn labeled_total_beats_item_prices() {
        let texts = vec![
            text("コーヒー ¥350", 0.85, 200.0),
            text("サンドイッチ ¥420", 0.85, 230.0),
            text("合計 ¥847", 0.55, 420.0),
        ];
        let result = extractor().extract_amount(&texts);
        assert_eq!(result.value, "847");
        assert!(result.confidence > 0.9, "confidence was {}", result.confidence);
    }

    #[test]
    fn candidates_never_exceed_cap_or_repeat() {
        let texts: Vec<RecognizedText> = (0..12)
            .map(|i| text(&format!("¥{}", 100 + i * 10), 0.6, 100.0 + i as f32 * 25.0))
            .collect();
        let result = extractor().extract_amount(&texts);
        assert!(result.candidates.len() <= 5);
        let lowered: Vec<String> =
            result.candidates.iter().map(|c| c.trim().to_lowercase()).collect();
        let mut unique = lowered.clone();
        unique.dedup();
        assert_eq!(lowered.len(), unique.len());
    }

    #[test]
    fn merge_replaces_only_on_higher_confidence() {
        let ex = extractor();
        let base = vec![text("令和6年1月15日", 0.5, 40.0), text("その他", 0.4, 100.0)];
        let record = ex.extract(&base, "h");
        let before = record.date.confidence;

        let region = vec![text("令和6年2月20日", 0.95, 40.0)];
        let merged = ex.merge_region_candidates(record.clone(), &region, FieldKind::Date);
        assert!(merged.date.confidence > before);
        assert_eq!(merged.date.value, "2024/02/20");
        assert!(merged.date.candidates.contains(&"2024/02/20".to_string()));
        assert!(merged.date.candidates.contains(&"2024/01/15".to_string()));

        // A weaker region pass keeps the old primary.
        let weak = vec![text("令和5年3月3日", 0.05, 40.0)];
        let kept = ex.merge_region_candidates(merged.clone(), &weak, FieldKind::Date);
        assert_eq!(kept.date.value, "2024/02/20");
    }

    #[test]
    fn merge_with_empty_region_keeps_field() {
        let ex = extractor();
        let record = ex.extract(&[text("合計 ¥500", 0.8, 300.0)], "h");
        let merged = ex.merge_region_candidates(record.clone(), &[], FieldKind::Amount);
        assert_eq!(merged.amount.value, record.amount.value);
        assert!(merged.metadata.processed_at >= record.metadata.processed_at);
    }
}
