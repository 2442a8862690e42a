//! Parallel detection pipeline
//!
//! One reader thread pulls frames from the source into a bounded queue,
//! `worker_count` threads run the detector on them, and the calling thread
//! collects the per-frame results:
//!
//! ```text
//! source ──> reader ──[bounded queue]──> workers ──> aggregator
//!                 └──── read failures ──────────────────^
//! ```
//!
//! The queue bound gives backpressure: the reader blocks once
//! `queue_capacity` frames are waiting. A single `Done` sentinel ends the
//! run; each worker that sees it puts it back before exiting so the next
//! worker sees it too.
use crate::config::LabelerConfig;
use crate::detector::{DetectorParams, ObjectDetector};
use crate::error::{LabelError, Result};
use crate::source::FrameSource;
use crossbeam::channel::{bounded, Receiver, Sender};
use floctrack::{FrameIdx, FrameObjects};
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Shared flag to stop a labeling run early
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A frame that produced no objects because reading or detection failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameFailure {
    pub frame_idx: FrameIdx,
    pub reason: String,
}

/// Result of one labeling run
#[derive(Debug, Clone, Default)]
pub struct LabelOutput {
    /// Detector output keyed by frame
    pub objects: BTreeMap<FrameIdx, FrameObjects>,
    /// Frames that failed, in frame order
    pub failures: Vec<FrameFailure>,
    /// The run was stopped through its [`CancelToken`] before every frame was seen
    pub cancelled: bool,
}

impl LabelOutput {
    /// Total objects across all labeled frames
    pub fn num_objects(&self) -> usize {
        self.objects.values().map(|f| f.len()).sum()
    }
}

/// Progress callback, called with `(processed, total)` after every frame
pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize) + Sync);

enum WorkItem<F> {
    Frame { frame_idx: FrameIdx, frame: F },
    Done,
}

struct FrameResult {
    frame_idx: FrameIdx,
    outcome: std::result::Result<FrameObjects, String>,
}

/// Label every frame in `x1..=x2` with `detector`.
///
/// Input errors (empty range, range past the end of the source, bad worker
/// settings) are returned before any thread starts. Once running, a frame
/// that cannot be read, or whose detector call fails or panics, is recorded
/// in [`LabelOutput::failures`] and the other frames carry on. Without
/// cancellation every frame in the range ends up in exactly one of
/// `objects` or `failures`.
#[allow(clippy::too_many_arguments)]
pub fn run_labeler<S, D>(
    source: &mut S,
    x1: FrameIdx,
    x2: FrameIdx,
    detector: &D,
    params: &DetectorParams,
    config: &LabelerConfig,
    cancel: &CancelToken,
    progress: Option<ProgressFn<'_>>,
) -> Result<LabelOutput>
where
    S: FrameSource,
    D: ObjectDetector<S::Frame> + ?Sized,
{
    if x1 > x2 {
        return Err(LabelError::InvalidRange { x1, x2 });
    }
    let frame_count = source.frame_count();
    if x2 as usize >= frame_count {
        return Err(LabelError::FrameOutOfRange {
            frame_idx: x2,
            frame_count,
        });
    }
    config.validate()?;

    let total = (x2 - x1) as usize + 1;
    log::info!(
        "Labeling frames {}..={} with '{}' on {} workers",
        x1,
        x2,
        detector.name(),
        config.worker_count
    );
    let start = Instant::now();

    let output = thread::scope(|scope| -> Result<LabelOutput> {
        let (input_tx, input_rx) = bounded::<WorkItem<S::Frame>>(config.queue_capacity);
        let (result_tx, result_rx) = bounded::<FrameResult>(config.queue_capacity);

        let workers: Vec<_> = (0..config.worker_count)
            .map(|worker_id| {
                let input_tx = input_tx.clone();
                let input_rx = input_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    detect_frames(worker_id, detector, params, input_tx, input_rx, result_tx, cancel)
                })
            })
            .collect();

        let reader = {
            let result_tx = result_tx.clone();
            scope.spawn(move || read_frames(source, x1, x2, input_tx, result_tx, cancel))
        };

        // the aggregator must only see senders owned by threads
        drop(result_tx);
        drop(input_rx);

        let output = collect_results(&result_rx, total, cancel, progress);

        let mut panicked = Vec::new();
        if let Err(payload) = reader.join() {
            panicked.push(format!("reader: {}", panic_message(payload.as_ref())));
        }
        for (worker_id, handle) in workers.into_iter().enumerate() {
            if let Err(payload) = handle.join() {
                panicked.push(format!("worker {}: {}", worker_id, panic_message(payload.as_ref())));
            }
        }
        if !panicked.is_empty() {
            return Err(LabelError::WorkerPanic(panicked.join("; ")));
        }
        Ok(output)
    })?;

    let elapsed = start.elapsed();
    log::info!(
        "Labeled {} frames ({} objects, {} failed) in {:.1}ms{}",
        output.objects.len(),
        output.num_objects(),
        output.failures.len(),
        elapsed.as_secs_f64() * 1000.0,
        if output.cancelled { " (cancelled)" } else { "" }
    );
    Ok(output)
}

/// Reader thread: seek once, then read sequentially, re-seeking after a
/// failed read so one bad frame does not shift the rest.
fn read_frames<S: FrameSource>(
    source: &mut S,
    x1: FrameIdx,
    x2: FrameIdx,
    input_tx: Sender<WorkItem<S::Frame>>,
    result_tx: Sender<FrameResult>,
    cancel: &CancelToken,
) {
    let mut needs_seek = true;
    for frame_idx in x1..=x2 {
        if cancel.is_cancelled() {
            log::debug!("Reader stopping at frame {}: cancelled", frame_idx);
            break;
        }

        if needs_seek {
            match guarded(|| source.seek(frame_idx)) {
                Ok(()) => needs_seek = false,
                Err(reason) => {
                    report_read_failure(&result_tx, frame_idx, reason);
                    continue;
                }
            }
        }

        match guarded(|| source.read()) {
            Ok(frame) => {
                if input_tx.send(WorkItem::Frame { frame_idx, frame }).is_err() {
                    log::debug!("Reader stopping at frame {}: no workers left", frame_idx);
                    break;
                }
            }
            Err(reason) => {
                report_read_failure(&result_tx, frame_idx, reason);
                needs_seek = true;
            }
        }
    }

    // fails only when every worker already exited
    let _ = input_tx.send(WorkItem::Done);
}

fn report_read_failure(result_tx: &Sender<FrameResult>, frame_idx: FrameIdx, reason: String) {
    log::warn!("Frame {}: read failed: {}", frame_idx, reason);
    let result = FrameResult {
        frame_idx,
        outcome: Err(format!("read failed: {}", reason)),
    };
    if result_tx.send(result).is_err() {
        log::error!("Result channel closed while reporting frame {}", frame_idx);
    }
}

/// Worker thread: run the detector until the sentinel or cancellation
fn detect_frames<F, D>(
    worker_id: usize,
    detector: &D,
    params: &DetectorParams,
    input_tx: Sender<WorkItem<F>>,
    input_rx: Receiver<WorkItem<F>>,
    result_tx: Sender<FrameResult>,
    cancel: &CancelToken,
) where
    D: ObjectDetector<F> + ?Sized,
{
    let mut processed = 0usize;
    while let Ok(item) = input_rx.recv() {
        let (frame_idx, frame) = match item {
            WorkItem::Frame { frame_idx, frame } => (frame_idx, frame),
            WorkItem::Done => {
                // hand the sentinel on to the next worker
                let _ = input_tx.send(WorkItem::Done);
                break;
            }
        };
        if cancel.is_cancelled() {
            break;
        }

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| detector.detect(&frame, frame_idx, params))) {
            Ok(Ok(objects)) => Ok(objects),
            Ok(Err(e)) => Err(e),
            Err(payload) => Err(format!("detector panicked: {}", panic_message(payload.as_ref()))),
        };
        if let Err(reason) = &outcome {
            log::warn!("Frame {}: detection failed: {}", frame_idx, reason);
        }
        processed += 1;

        if result_tx.send(FrameResult { frame_idx, outcome }).is_err() {
            log::error!("Worker {}: result channel closed", worker_id);
            break;
        }
    }
    log::debug!("Worker {} exiting after {} frames", worker_id, processed);
}

fn collect_results(
    result_rx: &Receiver<FrameResult>,
    total: usize,
    cancel: &CancelToken,
    progress: Option<ProgressFn<'_>>,
) -> LabelOutput {
    let mut output = LabelOutput::default();
    let mut failures: BTreeMap<FrameIdx, String> = BTreeMap::new();
    let mut processed = 0usize;
    let mut last_decile = 0usize;

    while processed < total {
        let Ok(result) = result_rx.recv() else {
            break;
        };
        if output.objects.contains_key(&result.frame_idx) || failures.contains_key(&result.frame_idx) {
            log::error!("Frame {} reported twice, keeping the first result", result.frame_idx);
            continue;
        }
        match result.outcome {
            Ok(objects) => {
                log::debug!("Frame {}: {} objects", result.frame_idx, objects.len());
                output.objects.insert(result.frame_idx, objects);
            }
            Err(reason) => {
                failures.insert(result.frame_idx, reason);
            }
        }
        processed += 1;

        if let Some(progress) = progress {
            progress(processed, total);
        }
        let decile = processed * 10 / total;
        if decile > last_decile {
            last_decile = decile;
            log::info!("Labeling progress: {}/{} frames ({}%)", processed, total, decile * 10);
        }
    }

    output.failures = failures
        .into_iter()
        .map(|(frame_idx, reason)| FrameFailure { frame_idx, reason })
        .collect();
    output.cancelled = processed < total && cancel.is_cancelled();
    output
}

/// Run a source call, turning both errors and panics into a reason string
fn guarded<T>(f: impl FnOnce() -> Result<T>) -> std::result::Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(format!("source panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
