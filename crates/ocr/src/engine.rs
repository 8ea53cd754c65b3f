//! Two-stage text recognition: detection finds candidate regions, each
//! region is cropped and decoded by the recognition model.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ryoshu_core::{PixelBuffer, RecognizedText, Rect};
use tokio::task;
use tracing::{debug, instrument};

use crate::error::OcrError;
use crate::imageops::DETECTION_SIDE;
use crate::infer::{InferenceSession, ModelSpec, Tensor};
use crate::models::ModelCache;
use crate::worker::{OffloadWorker, Task, TaskOutput};

/// Recognition output alphabet. Class 0 is the CTC blank and the class
/// after the last vocab entry is padding; both are skipped when decoding.
pub const VOCAB: &[char] = &[
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I',
    'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'a', 'b',
    'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u',
    'v', 'w', 'x', 'y', 'z', '/', '-', '.', ',', ':', '(', ')', '¥', ' ', '円', '年', '月', '日',
    '令', '和', '平', '成', '昭', '大', '正', '元', '合', '計', '小', '総', '額', '税', '込', '金',
    'お', '会', '領', '収', '書', '株', '式', '社', '有', '限', '店', '商', '事', '用', '途', '目',
    '的',
];

/// Total class count the recognition head emits: blank + vocab + pad.
pub fn vocab_size() -> usize {
    VOCAB.len() + 2
}

/// Per-timestep arg-max decode. Returns the concatenated non-blank/non-pad
/// characters and the mean of their winning probabilities.
pub(crate) fn decode_logits(logits: &Tensor) -> (String, f32) {
    let (steps, classes) = match logits.shape.as_slice() {
        [_, t, v] => (*t, *v),
        [t, v] => (*t, *v),
        _ => return (String::new(), 0.0),
    };
    let pad = classes - 1;

    let mut text = String::new();
    let mut probs = Vec::new();
    for t in 0..steps {
        let row = &logits.data[t * classes..(t + 1) * classes];
        let (best, prob) = row
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, p)| (i, *p))
            .unwrap_or((0, 0.0));
        if best == 0 || best >= pad {
            continue;
        }
        let Some(c) = VOCAB.get(best - 1) else { continue };
        text.push(*c);
        probs.push(prob.clamp(0.0, 1.0));
    }

    if probs.is_empty() {
        (text, 0.0)
    } else {
        let mean = probs.iter().sum::<f32>() / probs.len() as f32;
        (text, mean)
    }
}

/// Threshold the detection confidence map and map above-threshold cells to
/// slightly inflated boxes in source coordinates, then merge overlapping
/// boxes keeping the union bbox and max confidence (simplified NMS).
pub(crate) fn postprocess_detection(
    map: &Tensor,
    side: u32,
    scale: f32,
    img_w: u32,
    img_h: u32,
    threshold: f32,
) -> Vec<(Rect, f32)> {
    let (grid_h, grid_w) = match map.shape.as_slice() {
        [_, _, h, w] => (*h, *w),
        [h, w] => (*h, *w),
        _ => return vec![],
    };
    let cell_w = side as f32 / grid_w as f32;
    let cell_h = side as f32 / grid_h as f32;

    let mut boxes: Vec<(Rect, f32)> = Vec::new();
    for gy in 0..grid_h {
        for gx in 0..grid_w {
            let conf = map.data[gy * grid_w + gx];
            if conf < threshold {
                continue;
            }
            // Inflate by a quarter cell so adjacent hot cells merge.
            let x0 = (gx as f32 * cell_w - cell_w * 0.25) / scale;
            let y0 = (gy as f32 * cell_h - cell_h * 0.25) / scale;
            let x1 = ((gx + 1) as f32 * cell_w + cell_w * 0.25) / scale;
            let y1 = ((gy + 1) as f32 * cell_h + cell_h * 0.25) / scale;
            let x0 = x0.clamp(0.0, img_w as f32);
            let y0 = y0.clamp(0.0, img_h as f32);
            let rect =
                Rect::new(x0, y0, x1.min(img_w as f32) - x0, y1.min(img_h as f32) - y0);
            if rect.width <= 0.0 || rect.height <= 0.0 {
                continue;
            }
            boxes.push((rect, conf));
        }
    }

    // Highest confidence first so a merged cluster keeps its peak value.
    boxes.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let mut merged: Vec<(Rect, f32)> = Vec::new();
    for (rect, conf) in boxes {
        match merged.iter_mut().find(|(m, _)| m.intersects(&rect)) {
            Some((m, c)) => {
                *m = m.union(&rect);
                *c = c.max(conf);
            }
            None => merged.push((rect, conf)),
        }
    }
    merged.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    merged
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninitialized,
    Initializing,
    Ready,
    Busy,
}

impl State {
    fn name(self) -> &'static str {
        match self {
            State::Uninitialized => "uninitialized",
            State::Initializing => "initializing",
            State::Ready => "ready",
            State::Busy => "busy",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub detection_threshold: f32,
    pub detection_side: u32,
    pub batch_size: usize,
    pub offload_timeout: Duration,
    pub min_side: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            detection_threshold: 0.3,
            detection_side: DETECTION_SIDE,
            batch_size: 5,
            offload_timeout: Duration::from_secs(2),
            min_side: 32,
        }
    }
}

pub struct TextRecognitionEngine {
    cache: Arc<ModelCache>,
    worker: Arc<OffloadWorker>,
    detection: ModelSpec,
    recognition: ModelSpec,
    config: EngineConfig,
    state: Mutex<State>,
}

/// Restores `Busy` to `Ready` when a call completes, even on error.
struct BusyGuard<'a>(&'a Mutex<State>);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let mut st = self.0.lock().expect("state mutex");
        if *st == State::Busy {
            *st = State::Ready;
        }
    }
}

impl TextRecognitionEngine {
    pub fn new(
        cache: Arc<ModelCache>,
        worker: Arc<OffloadWorker>,
        detection: ModelSpec,
        recognition: ModelSpec,
        config: EngineConfig,
    ) -> Self {
        Self { cache, worker, detection, recognition, config, state: Mutex::new(State::Uninitialized) }
    }

    /// Load both models up front and transition to `Ready`.
    pub async fn preload_models(&self) -> Result<(), OcrError> {
        {
            let mut st = self.state.lock().expect("state mutex");
            if *st == State::Ready {
                return Ok(());
            }
            *st = State::Initializing;
        }
        let result = self.cache.preload(&[self.detection.clone(), self.recognition.clone()]).await;
        let mut st = self.state.lock().expect("state mutex");
        match result {
            Ok(()) => {
                *st = State::Ready;
                Ok(())
            }
            Err(e) => {
                *st = State::Uninitialized;
                Err(e)
            }
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Back to `Uninitialized`; models are dropped.
    pub fn destroy(&self) {
        self.cache.clear();
        *self.state.lock().expect("state mutex") = State::Uninitialized;
    }

    fn begin(&self) -> Result<BusyGuard<'_>, OcrError> {
        let mut st = self.state.lock().expect("state mutex");
        match *st {
            State::Ready => {
                *st = State::Busy;
                Ok(BusyGuard(&self.state))
            }
            other => Err(OcrError::NotReady(other.name())),
        }
    }

    fn check_input(&self, buf: &PixelBuffer) -> Result<(), OcrError> {
        if buf.width() < self.config.min_side || buf.height() < self.config.min_side {
            return Err(OcrError::ImageTooSmall {
                width: buf.width(),
                height: buf.height(),
                min_side: self.config.min_side,
            });
        }
        Ok(())
    }

    /// OCR over the whole image: detect regions, then recognize them in
    /// small batches with a yield in between to keep the host responsive.
    #[instrument(skip_all, fields(w = buf.width(), h = buf.height()))]
    pub async fn process_full_image(
        &self,
        buf: &PixelBuffer,
    ) -> Result<Vec<RecognizedText>, OcrError> {
        self.check_input(buf)?;
        let _guard = self.begin()?;
        self.process_buffer(buf).await
    }

    /// OCR restricted to `rect`: crop first, then the identical pipeline,
    /// with bounding boxes translated back into full-image coordinates.
    #[instrument(skip_all, fields(x = rect.x, y = rect.y))]
    pub async fn process_region(
        &self,
        buf: &PixelBuffer,
        rect: Rect,
    ) -> Result<Vec<RecognizedText>, OcrError> {
        self.check_input(buf)?;
        let _guard = self.begin()?;

        let cropped = match self
            .worker
            .execute(Task::Crop { buf: buf.clone(), rect }, self.config.offload_timeout)
            .await
        {
            TaskOutput::Buffer(b) => b,
            _ => return Err(OcrError::Detection("unexpected crop output".into())),
        };

        let texts = self.process_buffer(&cropped).await?;
        Ok(texts
            .into_iter()
            .map(|t| RecognizedText {
                bounding_box: t.bounding_box.translate(rect.x, rect.y),
                ..t
            })
            .collect())
    }

    async fn process_buffer(&self, buf: &PixelBuffer) -> Result<Vec<RecognizedText>, OcrError> {
        let regions = self.detect(buf).await?;
        debug!(regions = regions.len(), "detection complete");

        let mut results = Vec::new();
        for batch in regions.chunks(self.config.batch_size.max(1)) {
            let batch_futures =
                batch.iter().map(|(rect, conf)| self.recognize_region(buf, *rect, *conf));
            for recognized in futures::future::join_all(batch_futures).await {
                if let Some(text) = recognized? {
                    results.push(text);
                }
            }
            task::yield_now().await;
        }
        Ok(results)
    }

    async fn detect(&self, buf: &PixelBuffer) -> Result<Vec<(Rect, f32)>, OcrError> {
        let side = self.config.detection_side;
        let (tensor, scale) = match self
            .worker
            .execute(Task::DetectionTensor { buf: buf.clone(), side }, self.config.offload_timeout)
            .await
        {
            TaskOutput::ScaledTensor { tensor, scale } => (tensor, scale),
            _ => return Err(OcrError::Detection("unexpected preprocess output".into())),
        };

        let session = self.cache.get(&self.detection).await?;
        let outputs = run_session(session, vec![tensor]).await?;
        let map = outputs
            .first()
            .ok_or_else(|| OcrError::Detection("detection produced no output".into()))?;

        Ok(postprocess_detection(
            map,
            side,
            scale,
            buf.width(),
            buf.height(),
            self.config.detection_threshold,
        ))
    }

    async fn recognize_region(
        &self,
        buf: &PixelBuffer,
        rect: Rect,
        region_conf: f32,
    ) -> Result<Option<RecognizedText>, OcrError> {
        let cropped = match self
            .worker
            .execute(Task::Crop { buf: buf.clone(), rect }, self.config.offload_timeout)
            .await
        {
            TaskOutput::Buffer(b) => b,
            _ => return Err(OcrError::Recognition("unexpected crop output".into())),
        };
        let tensor = match self
            .worker
            .execute(Task::RecognitionTensor { buf: cropped }, self.config.offload_timeout)
            .await
        {
            TaskOutput::Tensor(t) => t,
            _ => return Err(OcrError::Recognition("unexpected preprocess output".into())),
        };

        let session = self.cache.get(&self.recognition).await?;
        let outputs = run_session(session, vec![tensor]).await?;
        let logits = outputs
            .first()
            .ok_or_else(|| OcrError::Recognition("recognition produced no output".into()))?;

        let (text, char_conf) = decode_logits(logits);
        if text.is_empty() {
            return Ok(None);
        }
        let confidence = (char_conf * region_conf).clamp(0.0, 1.0);
        Ok(Some(RecognizedText::new(text, confidence, rect)))
    }
}

async fn run_session(
    session: Arc<dyn InferenceSession>,
    inputs: Vec<Tensor>,
) -> Result<Vec<Tensor>, OcrError> {
    task::spawn_blocking(move || session.run(&inputs))
        .await
        .map_err(|e| OcrError::Recognition(e.to_string()))?
}
