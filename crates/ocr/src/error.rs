use thiserror::Error;

/// Coarse failure class, used by callers to pick a recovery strategy:
/// `System` usually retries after a reload, `Processing` falls back to
/// manual field entry, `Input` is rejected before the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    System,
    Processing,
    Input,
}

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Failed to load model '{name}': {reason}")]
    ModelLoad { name: String, reason: String },

    #[error("Inference backend not available; build with the `onnx` feature")]
    BackendUnavailable,

    #[error("Text detection failed: {0}")]
    Detection(String),

    #[error("Text recognition failed: {0}")]
    Recognition(String),

    #[error("Engine is not ready (state: {0})")]
    NotReady(&'static str),

    #[error("Offloaded task timed out after {timeout_ms}ms")]
    TaskTimeout { timeout_ms: u64 },

    #[error("Worker failed: {0}")]
    Worker(String),

    #[error("Image too small: {width}x{height} (minimum side {min_side})")]
    ImageTooSmall { width: u32, height: u32, min_side: u32 },

    #[error(transparent)]
    Buffer(#[from] ryoshu_core::BufferError),
}

impl OcrError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OcrError::ModelLoad { .. } | OcrError::BackendUnavailable => ErrorKind::System,
            OcrError::Detection(_)
            | OcrError::Recognition(_)
            | OcrError::NotReady(_)
            | OcrError::TaskTimeout { .. }
            | OcrError::Worker(_) => ErrorKind::Processing,
            OcrError::ImageTooSmall { .. } | OcrError::Buffer(_) => ErrorKind::Input,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_partition_the_variants() {
        let load = OcrError::ModelLoad { name: "detect".into(), reason: "io".into() };
        assert_eq!(load.kind(), ErrorKind::System);
        assert_eq!(OcrError::Recognition("bad".into()).kind(), ErrorKind::Processing);
        let small = OcrError::ImageTooSmall { width: 8, height: 8, min_side: 32 };
        assert_eq!(small.kind(), ErrorKind::Input);
    }
}
