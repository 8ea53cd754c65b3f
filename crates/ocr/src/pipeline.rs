//! End-to-end orchestration: pixel buffer in, structured receipt out.

use ryoshu_core::{hash_pixels, to_hex, FieldKind, PixelBuffer, ReceiptRecord, RecognizedText, Rect};
use ryoshu_extract::FieldExtractor;
use tracing::info;

use crate::engine::TextRecognitionEngine;
use crate::error::OcrError;

/// The result of a single receipt processing run.
#[derive(Debug, Clone)]
pub struct OcrOutcome {
    /// SHA-256 hex digest of the pixel buffer, identifying the capture.
    pub content_hash: String,
    /// Raw recognized spans, kept for region re-OCR and debugging overlays.
    pub texts: Vec<RecognizedText>,
    /// Structured fields extracted from the recognized spans.
    pub record: ReceiptRecord,
}

/// Orchestrates: hash → recognition → extraction.
pub struct ReceiptPipeline {
    engine: TextRecognitionEngine,
    extractor: FieldExtractor,
}

impl ReceiptPipeline {
    pub fn new(engine: TextRecognitionEngine, extractor: FieldExtractor) -> Self {
        Self { engine, extractor }
    }

    pub fn engine(&self) -> &TextRecognitionEngine {
        &self.engine
    }

    /// Full processing of a decoded capture. A wholly failed recognition
    /// call errors; recognized-but-sparse input still yields a record with
    /// empty fields for the caller's manual-entry fallback.
    pub async fn process(&self, buf: &PixelBuffer) -> Result<OcrOutcome, OcrError> {
        let content_hash = to_hex(&hash_pixels(buf));
        let texts = self.engine.process_full_image(buf).await?;
        let record = self.extractor.extract(&texts, content_hash.clone());
        info!(hash = %content_hash, spans = texts.len(), "receipt processed");
        Ok(OcrOutcome { content_hash, texts, record })
    }

    /// Re-OCR one rectangle (e.g. after the user draws a box around a field
    /// the first pass missed) and merge the new candidates into the record.
    pub async fn reprocess_region(
        &self,
        buf: &PixelBuffer,
        record: ReceiptRecord,
        rect: Rect,
        kind: FieldKind,
    ) -> Result<ReceiptRecord, OcrError> {
        let region_texts = self.engine.process_region(buf, rect).await?;
        Ok(self.extractor.merge_region_candidates(record, &region_texts, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{vocab_size, EngineConfig, VOCAB};
    use crate::infer::{MockLoader, MockSession, ModelSpec, Tensor};
    use crate::models::ModelCache;
    use crate::worker::OffloadWorker;
    use ryoshu_extract::{ExtractorConfig, FieldExtractor};
    use std::sync::Arc;

    fn logits_for(text: &str, p: f32) -> Tensor {
        let v = vocab_size();
        let steps: Vec<usize> =
            text.chars().map(|c| VOCAB.iter().position(|&vc| vc == c).unwrap() + 1).collect();
        let mut data = vec![0.0f32; steps.len() * v];
        for (t, idx) in steps.iter().enumerate() {
            data[t * v + idx] = p;
        }
        Tensor::new(vec![1, steps.len(), v], data)
    }

    fn pipeline_recognizing(text: &str) -> ReceiptPipeline {
        let mut detection = vec![0.0f32; 16];
        detection[0] = 0.9;
        let loader = MockLoader::new(10)
            .with_session(
                "detect",
                Arc::new(MockSession::returning(
                    vec![Tensor::new(vec![1, 1, 4, 4], detection)],
                    10,
                )),
            )
            .with_session(
                "recognize",
                Arc::new(MockSession::returning(vec![logits_for(text, 0.9)], 10)),
            );
        let cache = Arc::new(ModelCache::new(Arc::new(loader), 1_000_000));
        let engine = TextRecognitionEngine::new(
            cache,
            Arc::new(OffloadWorker::spawn()),
            ModelSpec::new("detect", "detect.onnx"),
            ModelSpec::new("recognize", "recognize.onnx"),
            EngineConfig { detection_side: 64, ..Default::default() },
        );
        ReceiptPipeline::new(engine, FieldExtractor::new(ExtractorConfig::default()))
    }

    #[tokio::test]
    async fn process_produces_record_with_content_hash() {
        let pipeline = pipeline_recognizing("合計 ¥847");
        pipeline.engine().preload_models().await.unwrap();
        let buf = PixelBuffer::filled(64, 64, [250, 250, 250, 255]).unwrap();

        let outcome = pipeline.process(&buf).await.unwrap();
        assert_eq!(outcome.content_hash.len(), 64);
        assert_eq!(outcome.record.metadata.content_hash, outcome.content_hash);
        assert_eq!(outcome.record.amount.value, "847");
        assert!(!outcome.texts.is_empty());
    }

    #[tokio::test]
    async fn identical_buffers_hash_identically() {
        let pipeline = pipeline_recognizing("合計 ¥847");
        pipeline.engine().preload_models().await.unwrap();
        let buf = PixelBuffer::filled(64, 64, [250, 250, 250, 255]).unwrap();
        let a = pipeline.process(&buf).await.unwrap();
        let b = pipeline.process(&buf).await.unwrap();
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[tokio::test]
    async fn sparse_recognition_yields_empty_fields_not_errors() {
        // Recognized text carries no date or payee; the record still comes
        // back, with empty fields for the form to fill in manually.
        let pipeline = pipeline_recognizing("合計 ¥847");
        pipeline.engine().preload_models().await.unwrap();
        let buf = PixelBuffer::filled(64, 64, [250, 250, 250, 255]).unwrap();
        let outcome = pipeline.process(&buf).await.unwrap();
        assert!(outcome.record.date.is_empty());
        assert_eq!(outcome.record.date.confidence, 0.0);
    }

    #[tokio::test]
    async fn too_small_input_is_an_input_error() {
        let pipeline = pipeline_recognizing("合計 ¥847");
        pipeline.engine().preload_models().await.unwrap();
        let buf = PixelBuffer::filled(8, 8, [0, 0, 0, 255]).unwrap();
        let err = pipeline.process(&buf).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Input);
    }

    #[tokio::test]
    async fn reprocess_region_merges_into_record() {
        let pipeline = pipeline_recognizing("合計 ¥847");
        pipeline.engine().preload_models().await.unwrap();
        let buf = PixelBuffer::filled(64, 64, [250, 250, 250, 255]).unwrap();
        let outcome = pipeline.process(&buf).await.unwrap();

        let merged = pipeline
            .reprocess_region(
                &buf,
                outcome.record.clone(),
                Rect::new(0.0, 0.0, 40.0, 40.0),
                FieldKind::Amount,
            )
            .await
            .unwrap();
        assert_eq!(merged.amount.value, "847");
        assert!(merged.metadata.processed_at >= outcome.record.metadata.processed_at);
    }

    #[tokio::test]
    async fn record_serializes_for_export() {
        let pipeline = pipeline_recognizing("合計 ¥847");
        pipeline.engine().preload_models().await.unwrap();
        let buf = PixelBuffer::filled(64, 64, [250, 250, 250, 255]).unwrap();
        let outcome = pipeline.process(&buf).await.unwrap();

        let json = serde_json::to_string(&outcome.record).unwrap();
        let back: ReceiptRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, outcome.record);
    }
}
