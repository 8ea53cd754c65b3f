//! The inference seam: tensor type, session trait, model loading.
//!
//! `MockSession` is always available and carries the whole test suite; the
//! real ONNX Runtime backend lives in the `onnx` submodule behind the
//! feature of the same name.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::OcrError;

/// Dense float tensor in row-major layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Self { shape, data }
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self { shape, data: vec![0.0; len] }
    }
}

/// An opaque loaded model: tensors in, tensors out. Implementations must be
/// callable from blocking contexts.
pub trait InferenceSession: Send + Sync {
    fn run(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>, OcrError>;

    /// Rough resident size, used by the cache's byte budget.
    fn estimated_bytes(&self) -> u64;

    /// Free backend resources ahead of drop. Failures are logged by the
    /// cache, never propagated.
    fn release(&self) -> Result<(), OcrError> {
        Ok(())
    }
}

/// Identifies a model to the loader. The cache keys on `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub path: PathBuf,
}

impl ModelSpec {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self { name: name.into(), path: path.into() }
    }
}

#[derive(Clone)]
pub struct LoadedModel {
    pub session: Arc<dyn InferenceSession>,
    pub byte_size: u64,
}

/// Turns a `ModelSpec` into a live session. Called on a blocking thread by
/// the model cache.
pub trait ModelLoader: Send + Sync {
    fn load(&self, spec: &ModelSpec) -> Result<LoadedModel, OcrError>;
}

// ── Mock backend (always available, used for tests) ───────────────────────────

type MockHandler = dyn Fn(&[Tensor]) -> Result<Vec<Tensor>, OcrError> + Send + Sync;

/// Scripted session: answers every `run` via a fixed handler. Useful for
/// exercising the engine and cache without any model files.
pub struct MockSession {
    handler: Box<MockHandler>,
    byte_size: u64,
    fail_release: bool,
}

impl MockSession {
    pub fn returning(outputs: Vec<Tensor>, byte_size: u64) -> Self {
        Self { handler: Box::new(move |_| Ok(outputs.clone())), byte_size, fail_release: false }
    }

    pub fn with_handler<F>(handler: F, byte_size: u64) -> Self
    where
        F: Fn(&[Tensor]) -> Result<Vec<Tensor>, OcrError> + Send + Sync + 'static,
    {
        Self { handler: Box::new(handler), byte_size, fail_release: false }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            handler: Box::new(move |_| Err(OcrError::Recognition(message.clone()))),
            byte_size: 0,
            fail_release: false,
        }
    }

    /// Make `release` fail, for exercising the cache's warn-and-continue path.
    pub fn failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }
}

impl InferenceSession for MockSession {
    fn run(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>, OcrError> {
        (self.handler)(inputs)
    }

    fn estimated_bytes(&self) -> u64 {
        self.byte_size
    }

    fn release(&self) -> Result<(), OcrError> {
        if self.fail_release {
            Err(OcrError::Worker("scripted release failure".into()))
        } else {
            Ok(())
        }
    }
}

/// Loader that fabricates `MockSession`s and counts loads per model name.
/// Specific sessions can be scripted per name; unscripted names get an
/// empty-output session.
pub struct MockLoader {
    byte_size: u64,
    fail_for: Option<String>,
    load_delay: Option<std::time::Duration>,
    sessions: std::sync::Mutex<std::collections::HashMap<String, Arc<dyn InferenceSession>>>,
    counts: std::sync::Mutex<std::collections::HashMap<String, usize>>,
}

impl MockLoader {
    pub fn new(byte_size: u64) -> Self {
        Self {
            byte_size,
            fail_for: None,
            load_delay: None,
            sessions: Default::default(),
            counts: Default::default(),
        }
    }

    /// Serve this exact session for loads of `name`.
    pub fn with_session(self, name: impl Into<String>, session: Arc<dyn InferenceSession>) -> Self {
        self.sessions.lock().expect("sessions mutex").insert(name.into(), session);
        self
    }

    /// Every load of `name` fails with a model-load error.
    pub fn failing_for(mut self, name: impl Into<String>) -> Self {
        self.fail_for = Some(name.into());
        self
    }

    /// Sleep inside `load`, to widen the in-flight window in tests.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    pub fn load_count(&self, name: &str) -> usize {
        self.counts.lock().expect("counts mutex").get(name).copied().unwrap_or(0)
    }
}

impl ModelLoader for MockLoader {
    fn load(&self, spec: &ModelSpec) -> Result<LoadedModel, OcrError> {
        if let Some(delay) = self.load_delay {
            std::thread::sleep(delay);
        }
        *self.counts.lock().expect("counts mutex").entry(spec.name.clone()).or_insert(0) += 1;
        if self.fail_for.as_deref() == Some(spec.name.as_str()) {
            return Err(OcrError::ModelLoad {
                name: spec.name.clone(),
                reason: "scripted failure".into(),
            });
        }
        if let Some(session) = self.sessions.lock().expect("sessions mutex").get(&spec.name) {
            return Ok(LoadedModel { session: Arc::clone(session), byte_size: self.byte_size });
        }
        Ok(LoadedModel {
            session: Arc::new(MockSession::returning(vec![], self.byte_size)),
            byte_size: self.byte_size,
        })
    }
}

// ── ONNX Runtime backend (optional, gated behind `onnx` feature) ──────────────

#[cfg(feature = "onnx")]
pub mod onnx {
    use std::sync::Mutex;

    use ndarray::{ArrayD, IxDyn};
    use ort::session::{builder::GraphOptimizationLevel, Session};

    use super::*;

    pub struct OnnxSession {
        session: Mutex<Session>,
        byte_size: u64,
    }

    impl InferenceSession for OnnxSession {
        fn run(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>, OcrError> {
            let input = inputs
                .first()
                .ok_or_else(|| OcrError::Recognition("no input tensor".into()))?;
            let array = ArrayD::from_shape_vec(IxDyn(&input.shape), input.data.clone())
                .map_err(|e| OcrError::Recognition(e.to_string()))?;
            let value = ort::value::Value::from_array(array)
                .map_err(|e| OcrError::Recognition(e.to_string()))?;

            let mut session = self.session.lock().expect("session mutex");
            let outputs = session
                .run(ort::inputs!["x" => value])
                .map_err(|e| OcrError::Recognition(e.to_string()))?;

            let mut tensors = Vec::with_capacity(outputs.len());
            for (_, output) in outputs.iter() {
                let (shape, data) = output
                    .try_extract_tensor::<f32>()
                    .map_err(|e| OcrError::Recognition(e.to_string()))?;
                tensors.push(Tensor::new(
                    shape.iter().map(|d| *d as usize).collect(),
                    data.to_vec(),
                ));
            }
            Ok(tensors)
        }

        fn estimated_bytes(&self) -> u64 {
            self.byte_size
        }
    }

    /// Loads `.onnx` files from disk with Level3 graph optimization.
    pub struct OnnxLoader {
        pub intra_threads: usize,
    }

    impl Default for OnnxLoader {
        fn default() -> Self {
            Self { intra_threads: 4 }
        }
    }

    impl ModelLoader for OnnxLoader {
        fn load(&self, spec: &ModelSpec) -> Result<LoadedModel, OcrError> {
            let load_err = |e: ort::Error| OcrError::ModelLoad {
                name: spec.name.clone(),
                reason: e.to_string(),
            };
            // File size stands in for resident size; close enough for the
            // cache's byte budget.
            let byte_size = std::fs::metadata(&spec.path)
                .map_err(|e| OcrError::ModelLoad { name: spec.name.clone(), reason: e.to_string() })?
                .len();
            let session = Session::builder()
                .map_err(load_err)?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(load_err)?
                .with_intra_threads(self.intra_threads)
                .map_err(load_err)?
                .commit_from_file(&spec.path)
                .map_err(load_err)?;

            Ok(LoadedModel {
                session: Arc::new(OnnxSession { session: Mutex::new(session), byte_size }),
                byte_size,
            })
        }
    }
}
