//! OCR engine for receipt photos: offloaded image preprocessing, cached
//! ONNX inference sessions, two-stage detection/recognition, and the
//! pipeline that feeds recognized text into field extraction.

pub mod engine;
pub mod error;
pub mod imageops;
pub mod infer;
pub mod models;
pub mod pipeline;
pub mod worker;

pub use engine::{EngineConfig, TextRecognitionEngine};
pub use error::{ErrorKind, OcrError};
pub use infer::{InferenceSession, LoadedModel, MockLoader, MockSession, ModelLoader, ModelSpec, Tensor};
pub use models::{CacheInfo, ModelCache};
pub use pipeline::{OcrOutcome, ReceiptPipeline};
pub use worker::{OffloadWorker, Task, TaskOutput};
