//! Offloads CPU-heavy image transforms to blocking threads behind a
//! request/response channel pair. Every task has a pure same-thread
//! equivalent (`run_inline`), and both paths call the same functions in
//! `imageops`, so falling back never changes results.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ryoshu_core::{PixelBuffer, Rect};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::error::OcrError;
use crate::imageops;
use crate::infer::Tensor;

/// One offloadable transform with its payload.
#[derive(Debug, Clone)]
pub enum Task {
    Crop { buf: PixelBuffer, rect: Rect },
    Resize { buf: PixelBuffer, width: u32, height: u32 },
    Perspective { buf: PixelBuffer, quad: [(f32, f32); 4], out_w: u32, out_h: u32 },
    DetectionTensor { buf: PixelBuffer, side: u32 },
    RecognitionTensor { buf: PixelBuffer },
}

impl Task {
    pub fn kind(&self) -> &'static str {
        match self {
            Task::Crop { .. } => "crop",
            Task::Resize { .. } => "resize",
            Task::Perspective { .. } => "perspective",
            Task::DetectionTensor { .. } => "detection_tensor",
            Task::RecognitionTensor { .. } => "recognition_tensor",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutput {
    Buffer(PixelBuffer),
    Tensor(Tensor),
    ScaledTensor { tensor: Tensor, scale: f32 },
}

/// Synchronous execution of a task. This is both the worker-thread body and
/// the same-thread fallback.
pub fn run_inline(task: Task) -> TaskOutput {
    match task {
        Task::Crop { buf, rect } => TaskOutput::Buffer(imageops::crop(&buf, rect)),
        Task::Resize { buf, width, height } => {
            TaskOutput::Buffer(imageops::resize(&buf, width, height))
        }
        Task::Perspective { buf, quad, out_w, out_h } => {
            TaskOutput::Buffer(imageops::perspective_warp(&buf, quad, out_w, out_h))
        }
        Task::DetectionTensor { buf, side } => {
            let (tensor, scale) = imageops::detection_tensor(&buf, side);
            TaskOutput::ScaledTensor { tensor, scale }
        }
        Task::RecognitionTensor { buf } => TaskOutput::Tensor(imageops::recognition_tensor(&buf)),
    }
}

struct Request {
    id: u64,
    task: Task,
}

enum Response {
    Done { id: u64, result: Result<TaskOutput, String> },
    Fatal { reason: String },
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<TaskOutput, OcrError>>>>>;
type Executor = Arc<dyn Fn(Task) -> Result<TaskOutput, String> + Send + Sync>;

/// Dispatches tasks to a worker loop and correlates responses by task id.
/// After a fatal worker error the worker is not restarted; `dispatch`
/// reports it unavailable and `execute` runs everything inline.
pub struct OffloadWorker {
    tx: mpsc::UnboundedSender<Request>,
    pending: PendingMap,
    next_id: AtomicU64,
    unavailable: Arc<AtomicBool>,
}

impl OffloadWorker {
    pub fn spawn() -> Self {
        Self::spawn_with(Arc::new(|task| Ok(run_inline(task))))
    }

    fn spawn_with(executor: Executor) -> Self {
        let (req_tx, mut req_rx) = mpsc::unbounded_channel::<Request>();
        let (resp_tx, mut resp_rx) = mpsc::unbounded_channel::<Response>();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let unavailable = Arc::new(AtomicBool::new(false));

        // Worker loop: pull requests, run them on blocking threads.
        tokio::spawn(async move {
            while let Some(Request { id, task }) = req_rx.recv().await {
                let executor = Arc::clone(&executor);
                let resp_tx = resp_tx.clone();
                tokio::spawn(async move {
                    let joined = tokio::task::spawn_blocking(move || executor(task)).await;
                    let msg = match joined {
                        Ok(result) => Response::Done { id, result },
                        // A panic in a transform poisons the whole worker.
                        Err(e) => Response::Fatal { reason: e.to_string() },
                    };
                    let _ = resp_tx.send(msg);
                });
            }
        });

        // Router loop: correlate responses with pending dispatches.
        {
            let pending = Arc::clone(&pending);
            let unavailable = Arc::clone(&unavailable);
            tokio::spawn(async move {
                while let Some(response) = resp_rx.recv().await {
                    match response {
                        Response::Done { id, result } => {
                            let sender = pending.lock().expect("pending mutex").remove(&id);
                            match sender {
                                Some(tx) => {
                                    let _ = tx.send(result.map_err(OcrError::Worker));
                                }
                                // Timed out or otherwise forgotten.
                                None => debug!(task_id = id, "task not found, dropping response"),
                            }
                        }
                        Response::Fatal { reason } => {
                            error!(%reason, "worker failed fatally, rejecting all pending tasks");
                            unavailable.store(true, Ordering::SeqCst);
                            let drained: Vec<_> = {
                                let mut map = pending.lock().expect("pending mutex");
                                map.drain().collect()
                            };
                            for (_, tx) in drained {
                                let _ = tx.send(Err(OcrError::Worker(reason.clone())));
                            }
                        }
                    }
                }
            });
        }

        Self { tx: req_tx, pending, next_id: AtomicU64::new(1), unavailable }
    }

    pub fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }

    /// Offload a task, failing on timeout or worker loss. The underlying
    /// computation is not cancelled on timeout; its late response is
    /// discarded by the router.
    pub async fn dispatch(&self, task: Task, timeout: Duration) -> Result<TaskOutput, OcrError> {
        if !self.is_available() {
            return Err(OcrError::Worker("worker unavailable".into()));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().expect("pending mutex").insert(id, tx);

        if self.tx.send(Request { id, task }).is_err() {
            self.pending.lock().expect("pending mutex").remove(&id);
            return Err(OcrError::Worker("worker channel closed".into()));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                // Router dropped our sender without answering.
                self.pending.lock().expect("pending mutex").remove(&id);
                Err(OcrError::Worker("response channel closed".into()))
            }
            Err(_) => {
                self.pending.lock().expect("pending mutex").remove(&id);
                Err(OcrError::TaskTimeout { timeout_ms: timeout.as_millis() as u64 })
            }
        }
    }

    /// Offload with transparent same-thread fallback: callers always get a
    /// result, the worker path is purely an optimization.
    pub async fn execute(&self, task: Task, timeout: Duration) -> TaskOutput {
        if !self.is_available() {
            return run_inline(task);
        }
        match self.dispatch(task.clone(), timeout).await {
            Ok(output) => output,
            Err(e) => {
                warn!(kind = task.kind(), error = %e, "offload failed, running inline");
                run_inline(task)
            }
        }
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.lock().expect("pending mutex").len()
    }
}
