use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

/// One OCR-detected text span with position and confidence.
/// Immutable after creation; region re-OCR produces new instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedText {
    pub text: String,
    /// Confidence in this span (0.0 = guessed, 1.0 = certain).
    pub confidence: f32,
    pub bounding_box: Rect,
    /// Alternate readings retained for manual override.
    pub candidates: Vec<String>,
}

impl RecognizedText {
    pub fn new(text: impl Into<String>, confidence: f32, bounding_box: Rect) -> Self {
        let text = text.into();
        Self {
            candidates: vec![text.clone()],
            text,
            confidence: confidence.clamp(0.0, 1.0),
            bounding_box,
        }
    }
}

/// Which of the four structured receipt attributes a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Date,
    Payee,
    Amount,
    Usage,
}

/// One logical field of a receipt with its primary value and the ranked
/// alternates a correction UI can offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldResult {
    pub value: String,
    pub confidence: f32,
    /// Confidence-descending, deduplicated case-insensitively after trimming.
    pub candidates: Vec<String>,
    pub bounding_box: Option<Rect>,
}

impl FieldResult {
    pub fn new(
        value: impl Into<String>,
        confidence: f32,
        candidates: Vec<String>,
        bounding_box: Option<Rect>,
    ) -> Self {
        Self {
            value: value.into(),
            confidence: confidence.clamp(0.0, 1.0),
            candidates,
            bounding_box,
        }
    }

    /// The "nothing found" result. Missing data is not an error.
    pub fn empty() -> Self {
        Self { value: String::new(), confidence: 0.0, candidates: vec![], bounding_box: None }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty() && self.candidates.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub processed_at: DateTime<Utc>,
    /// SHA-256 hex of the source pixel buffer; identifies the capture.
    pub content_hash: String,
}

/// The fully extracted, confidence-annotated representation of a receipt.
/// Created once per OCR pass; region re-OCR merges into individual fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptRecord {
    pub date: FieldResult,
    pub payee: FieldResult,
    pub amount: FieldResult,
    pub usage: FieldResult,
    pub metadata: RecordMetadata,
}

impl ReceiptRecord {
    pub fn field(&self, kind: FieldKind) -> &FieldResult {
        match kind {
            FieldKind::Date => &self.date,
            FieldKind::Payee => &self.payee,
            FieldKind::Amount => &self.amount,
            FieldKind::Usage => &self.usage,
        }
    }

    pub fn field_mut(&mut self, kind: FieldKind) -> &mut FieldResult {
        match kind {
            FieldKind::Date => &mut self.date,
            FieldKind::Payee => &mut self.payee,
            FieldKind::Amount => &mut self.amount,
            FieldKind::Usage => &mut self.usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_text_clamps_confidence() {
        let r = RecognizedText::new("合計", 1.5, Rect::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(r.confidence, 1.0);
        let r = RecognizedText::new("合計", -0.2, Rect::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(r.confidence, 0.0);
    }

    #[test]
    fn recognized_text_seeds_candidates_with_text() {
        let r = RecognizedText::new("株式会社山田", 0.8, Rect::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(r.candidates, vec!["株式会社山田".to_string()]);
    }

    #[test]
    fn field_result_empty_has_zero_confidence() {
        let f = FieldResult::empty();
        assert!(f.is_empty());
        assert_eq!(f.confidence, 0.0);
    }

    #[test]
    fn record_field_accessors_match() {
        let mut record = ReceiptRecord {
            date: FieldResult::empty(),
            payee: FieldResult::empty(),
            amount: FieldResult::new("847", 0.9, vec!["847".into()], None),
            usage: FieldResult::empty(),
            metadata: RecordMetadata { processed_at: Utc::now(), content_hash: "00".into() },
        };
        assert_eq!(record.field(FieldKind::Amount).value, "847");
        record.field_mut(FieldKind::Date).value = "2024/01/15".into();
        assert_eq!(record.date.value, "2024/01/15");
    }
}
