// Sequential batch executor
//
// `JobRunner::start` snapshots the pairing list, preflights the toolkit and
// spawns one worker task. The worker walks the snapshot in order, running at
// most one encode at a time, and reports through an unbounded event channel.
// The caller steers it with `BatchControl`: two flags plus a `Notify` that
// wakes the worker while it is parked on the encoder's status stream.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::error::{HardsubError, Result};
use crate::media::{EncodeJob, EncodeProcess, MediaToolkit};
use crate::options::EncodeOptions;
use crate::pairing::{FailureReason, Pairing, Status};
use crate::progress::{EtaEstimator, parse_elapsed, percent_complete};

/// Notifications sent from the worker to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    Started {
        batch_id: Uuid,
        total: usize,
    },
    ItemStarted {
        index: usize,
        media: PathBuf,
        caption: PathBuf,
    },
    Progress {
        index: usize,
        percent: u8,
        /// Remaining batch time, unknown until progress has been made
        eta_secs: Option<u64>,
        output_bytes: Option<u64>,
    },
    ItemDone {
        index: usize,
        status: Status,
    },
    BatchDone {
        succeeded: usize,
        total: usize,
    },
    Cancelled {
        succeeded: usize,
        total: usize,
    },
}

/// Skip/cancel switches shared between the caller and the worker
#[derive(Debug, Clone, Default)]
pub struct BatchControl {
    inner: Arc<ControlState>,
}

#[derive(Debug, Default)]
struct ControlState {
    skip: AtomicBool,
    cancel: AtomicBool,
    wake: Notify,
}

impl BatchControl {
    /// Abandon the current item and continue with the next one
    pub fn skip(&self) {
        self.inner.skip.store(true, Ordering::SeqCst);
        self.inner.wake.notify_one();
    }

    /// Stop the batch; irreversible
    pub fn cancel(&self) {
        self.inner.cancel.store(true, Ordering::SeqCst);
        self.inner.wake.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.load(Ordering::SeqCst)
    }

    fn skip_requested(&self) -> bool {
        self.inner.skip.load(Ordering::SeqCst)
    }

    fn clear_skip(&self) {
        self.inner.skip.store(false, Ordering::SeqCst);
    }

    async fn signalled(&self) {
        self.inner.wake.notified().await
    }
}

/// Final state of a batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub succeeded: usize,
    pub total: usize,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// The snapshot taken at start, with final statuses
    pub pairings: Vec<Pairing>,
}

/// Caller side of a running batch
pub struct BatchHandle {
    batch_id: Uuid,
    control: BatchControl,
    events: mpsc::UnboundedReceiver<BatchEvent>,
    worker: JoinHandle<BatchReport>,
}

impl BatchHandle {
    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    pub fn control(&self) -> BatchControl {
        self.control.clone()
    }

    pub fn skip(&self) {
        self.control.skip();
    }

    pub fn cancel(&self) {
        self.control.cancel();
    }

    /// Next event, `None` once the worker has finished
    pub async fn next_event(&mut self) -> Option<BatchEvent> {
        self.events.recv().await
    }

    /// Wait for the worker and return its report
    pub async fn finish(self) -> Result<BatchReport> {
        self.worker
            .await
            .map_err(|e| HardsubError::Worker(e.to_string()))
    }
}

pub struct JobRunner {
    toolkit: Arc<dyn MediaToolkit>,
}

impl JobRunner {
    pub fn new(toolkit: Arc<dyn MediaToolkit>) -> Self {
        Self { toolkit }
    }

    /// Validate and start a batch. Only an empty batch, an unusable caption
    /// style or an unusable toolchain are reported here; everything later
    /// flows through events.
    pub async fn start(&self, pairings: &[Pairing], options: EncodeOptions) -> Result<BatchHandle> {
        let snapshot: Vec<Pairing> = pairings.iter().map(Pairing::snapshot).collect();
        let total = snapshot.iter().filter(|p| p.is_runnable()).count();
        if total == 0 {
            return Err(HardsubError::InvalidBatch(
                "no selected video has a subtitle".to_string(),
            ));
        }

        options.style.validate()?;
        self.toolkit.check_availability().await?;

        let batch_id = Uuid::new_v4();
        let control = BatchControl::default();
        let (tx, rx) = mpsc::unbounded_channel();

        let worker = BatchWorker {
            batch_id,
            toolkit: Arc::clone(&self.toolkit),
            options,
            pairings: snapshot,
            total,
            control: control.clone(),
            events: tx,
        };

        info!("Starting batch {} with {} videos", batch_id, total);
        let span = info_span!("batch", id = %batch_id);
        let worker = tokio::spawn(worker.run().instrument(span));

        Ok(BatchHandle {
            batch_id,
            control,
            events: rx,
            worker,
        })
    }
}

/// How one item ended
enum ItemOutcome {
    Done(Status),
    Cancelled,
}

struct BatchWorker {
    batch_id: Uuid,
    toolkit: Arc<dyn MediaToolkit>,
    options: EncodeOptions,
    pairings: Vec<Pairing>,
    total: usize,
    control: BatchControl,
    events: mpsc::UnboundedSender<BatchEvent>,
}

impl BatchWorker {
    async fn run(mut self) -> BatchReport {
        let started_at = Utc::now();
        let mut eta = EtaEstimator::new(self.total);
        let mut succeeded = 0;
        let mut cancelled = false;

        self.emit(BatchEvent::Started {
            batch_id: self.batch_id,
            total: self.total,
        });

        for index in 0..self.pairings.len() {
            if !self.pairings[index].is_runnable() {
                continue;
            }
            if self.control.is_cancelled() {
                cancelled = true;
                break;
            }
            self.control.clear_skip();

            let outcome = self.process(index, &eta).await;
            let status = match &outcome {
                ItemOutcome::Done(status) => status.clone(),
                ItemOutcome::Cancelled => Status::Skipped,
            };

            if let Status::Completed { .. } = status {
                succeeded += 1;
            }
            self.set_status(index, status.clone());
            self.emit(BatchEvent::ItemDone { index, status });
            eta.item_finished();

            if let ItemOutcome::Cancelled = outcome {
                cancelled = true;
                break;
            }
        }

        if cancelled {
            info!("Batch cancelled after {} of {} succeeded", succeeded, self.total);
            self.emit(BatchEvent::Cancelled {
                succeeded,
                total: self.total,
            });
        } else {
            info!("Batch finished: {}/{} succeeded", succeeded, self.total);
            self.emit(BatchEvent::BatchDone {
                succeeded,
                total: self.total,
            });
        }

        BatchReport {
            batch_id: self.batch_id,
            succeeded,
            total: self.total,
            cancelled,
            started_at,
            finished_at: Utc::now(),
            pairings: self.pairings,
        }
    }

    async fn process(&mut self, index: usize, eta: &EtaEstimator) -> ItemOutcome {
        self.set_status(index, Status::Processing { percent: 0 });

        let pairing = &self.pairings[index];
        let media = pairing.media.path().to_path_buf();
        let caption = match &pairing.caption {
            Some(caption) => caption.path().to_path_buf(),
            None => {
                return ItemOutcome::Done(Status::Failed {
                    reason: FailureReason::InvocationException {
                        message: "pairing has no subtitle".to_string(),
                    },
                });
            }
        };
        let output = pairing.output_path(&self.options.output, &self.options.output_extension);

        info!("Processing {} with {}", media.display(), caption.display());
        self.emit(BatchEvent::ItemStarted {
            index,
            media: media.clone(),
            caption: caption.clone(),
        });

        let duration = match self.toolkit.probe_duration(&media).await {
            Ok(duration) if duration.is_finite() && duration > 0.0 => duration,
            Ok(duration) => {
                warn!("{}: probe returned {}", media.display(), duration);
                return failed(FailureReason::DurationUnavailable);
            }
            Err(e) => {
                warn!("{}: {}", media.display(), e);
                return failed(FailureReason::DurationUnavailable);
            }
        };
        self.pairings[index].media.duration = Some(duration);

        // Requests that arrived while probing stop the item before an encoder exists
        if self.control.is_cancelled() {
            info!("Cancel requested, not starting encoder");
            return ItemOutcome::Cancelled;
        }
        if self.control.skip_requested() {
            info!("Skip requested, not starting encoder");
            self.control.clear_skip();
            return ItemOutcome::Done(Status::Skipped);
        }

        if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                warn!("Cannot create {}: {}", dir.display(), e);
                return failed(FailureReason::InvocationException { message: e.to_string() });
            }
        }

        let job = EncodeJob {
            input: media.clone(),
            caption,
            output: output.clone(),
            preset: self.options.preset,
            crf: self.options.crf,
            style: self.options.style.clone(),
        };

        let mut process = match self.toolkit.spawn_encode(&job).await {
            Ok(process) => process,
            Err(e) => {
                warn!("{}: {}", media.display(), e);
                return failed(FailureReason::InvocationException { message: e.to_string() });
            }
        };

        if let Some(outcome) = self.follow_progress(index, process.as_mut(), duration, &output, eta).await {
            return outcome;
        }

        match process.wait().await {
            Ok(exit) if exit.success() => {
                info!("Completed {}", output.display());
                ItemOutcome::Done(Status::Completed { output })
            }
            Ok(exit) => {
                warn!("{}: encoder exited with {:?}", media.display(), exit.code);
                failed(FailureReason::ToolExitedWithError { code: exit.code })
            }
            Err(e) => failed(FailureReason::InvocationException { message: e.to_string() }),
        }
    }

    /// Read status lines until the stream closes. Returns early with the
    /// item's outcome when it was skipped, cancelled or the stream broke.
    async fn follow_progress(
        &mut self,
        index: usize,
        process: &mut dyn EncodeProcess,
        duration: f64,
        output: &Path,
        eta: &EtaEstimator,
    ) -> Option<ItemOutcome> {
        let mut last_percent = 0u8;

        loop {
            if self.control.is_cancelled() {
                info!("Cancel requested, stopping encoder");
                terminate(process).await;
                return Some(ItemOutcome::Cancelled);
            }
            if self.control.skip_requested() {
                info!("Skip requested, stopping encoder");
                terminate(process).await;
                self.control.clear_skip();
                return Some(ItemOutcome::Done(Status::Skipped));
            }

            let line = tokio::select! {
                _ = self.control.signalled() => continue,
                line = process.next_line() => line,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => {
                    warn!("Lost encoder output: {}", e);
                    terminate(process).await;
                    return Some(failed(FailureReason::InvocationException { message: e.to_string() }));
                }
            };

            let Some(elapsed) = parse_elapsed(&line) else {
                continue;
            };
            let percent = percent_complete(elapsed, duration);
            if percent < last_percent {
                continue;
            }
            last_percent = percent;

            self.set_status(index, Status::Processing { percent });
            let output_bytes = tokio::fs::metadata(output).await.ok().map(|m| m.len());
            self.emit(BatchEvent::Progress {
                index,
                percent,
                eta_secs: eta.estimate(percent).map(|d| d.as_secs()),
                output_bytes,
            });
        }
    }

    fn set_status(&mut self, index: usize, status: Status) {
        if let Err(e) = self.pairings[index].advance(status) {
            // Only reachable through a bug in the worker loop
            warn!("{}", e);
        }
    }

    fn emit(&self, event: BatchEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

fn failed(reason: FailureReason) -> ItemOutcome {
    ItemOutcome::Done(Status::Failed { reason })
}

async fn terminate(process: &mut dyn EncodeProcess) {
    if let Err(e) = process.terminate().await {
        warn!("Failed to terminate encoder: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MockMediaToolkit, ProcessExit};
    use crate::pairing::{CaptionFile, MediaFile};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    /// Scripted encoder run
    #[derive(Clone)]
    struct Script {
        lines: Vec<&'static str>,
        exit_code: Option<i32>,
        /// Keep the stream open after the last line until terminated
        hang: bool,
    }

    impl Script {
        fn ok(lines: Vec<&'static str>) -> Self {
            Self { lines, exit_code: Some(0), hang: false }
        }
    }

    struct ScriptedProcess {
        lines: VecDeque<String>,
        exit_code: Option<i32>,
        hang: bool,
        terminated: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EncodeProcess for ScriptedProcess {
        async fn next_line(&mut self) -> Result<Option<String>> {
            match self.lines.pop_front() {
                Some(line) => Ok(Some(line)),
                None if self.hang => std::future::pending().await,
                None => Ok(None),
            }
        }

        async fn wait(&mut self) -> Result<ProcessExit> {
            Ok(ProcessExit { code: self.exit_code })
        }

        async fn terminate(&mut self) -> Result<()> {
            self.terminated.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct ScriptedToolkit {
        duration: Option<f64>,
        scripts: Mutex<VecDeque<Script>>,
        spawned: Mutex<Vec<EncodeJob>>,
        terminated: Arc<AtomicUsize>,
        spawn_error: bool,
        /// Runs once, inside the next duration probe
        during_probe: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    }

    impl ScriptedToolkit {
        fn new(duration: f64, scripts: Vec<Script>) -> Self {
            Self {
                duration: Some(duration),
                scripts: Mutex::new(scripts.into()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl MediaToolkit for ScriptedToolkit {
        async fn check_availability(&self) -> Result<()> {
            Ok(())
        }

        async fn version_info(&self) -> Result<String> {
            Ok("ffmpeg version scripted".to_string())
        }

        async fn probe_duration(&self, _path: &Path) -> Result<f64> {
            if let Some(hook) = self.during_probe.lock().unwrap().take() {
                hook();
            }
            self.duration.ok_or_else(|| HardsubError::Probe("no duration".to_string()))
        }

        async fn spawn_encode(&self, job: &EncodeJob) -> Result<Box<dyn EncodeProcess>> {
            if self.spawn_error {
                return Err(HardsubError::Media("Failed to spawn ffmpeg: not found".to_string()));
            }
            self.spawned.lock().unwrap().push(job.clone());
            let script = self.scripts.lock().unwrap().pop_front().expect("unexpected encode");
            Ok(Box::new(ScriptedProcess {
                lines: script.lines.into_iter().map(String::from).collect(),
                exit_code: script.exit_code,
                hang: script.hang,
                terminated: Arc::clone(&self.terminated),
            }))
        }
    }

    fn pairing(name: &str) -> Pairing {
        Pairing::new(
            MediaFile::new(format!("/videos/{}.mp4", name)),
            Some(CaptionFile::new(format!("/videos/{}.srt", name))),
        )
    }

    fn options() -> EncodeOptions {
        EncodeOptions {
            output: crate::options::OutputLocation::Directory(std::env::temp_dir().join("hardsub-runner-tests")),
            ..Default::default()
        }
    }

    async fn drain(handle: &mut BatchHandle) -> Vec<BatchEvent> {
        let mut events = Vec::new();
        while let Some(event) = handle.next_event().await {
            events.push(event);
        }
        events
    }

    fn item_done(events: &[BatchEvent]) -> Vec<(usize, Status)> {
        events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::ItemDone { index, status } => Some((*index, status.clone())),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let runner = JobRunner::new(Arc::new(ScriptedToolkit::default()));

        let mut unselected = pairing("a");
        unselected.selected = false;
        let unmatched = Pairing::new(MediaFile::new("/videos/b.mp4"), None);

        let result = runner.start(&[unselected, unmatched], options()).await;
        assert!(matches!(result, Err(HardsubError::InvalidBatch(_))));

        let result = runner.start(&[], options()).await;
        assert!(matches!(result, Err(HardsubError::InvalidBatch(_))));
    }

    #[tokio::test]
    async fn test_missing_tool_blocks_start() {
        let mut toolkit = MockMediaToolkit::new();
        toolkit
            .expect_check_availability()
            .times(1)
            .returning(|| Err(HardsubError::ToolUnavailable("ffmpeg".to_string())));
        toolkit.expect_probe_duration().never();
        toolkit.expect_spawn_encode().never();

        let runner = JobRunner::new(Arc::new(toolkit));
        let result = runner.start(&[pairing("a")], options()).await;
        assert!(matches!(result, Err(HardsubError::ToolUnavailable(_))));
    }

    #[tokio::test]
    async fn test_probe_failure_fails_item_without_encoding() {
        let mut toolkit = MockMediaToolkit::new();
        toolkit.expect_check_availability().returning(|| Ok(()));
        toolkit
            .expect_probe_duration()
            .times(1)
            .returning(|_| Err(HardsubError::Probe("timed out after 30s".to_string())));
        toolkit.expect_spawn_encode().never();

        let runner = JobRunner::new(Arc::new(toolkit));
        let mut handle = runner.start(&[pairing("a")], options()).await.unwrap();
        let events = drain(&mut handle).await;

        assert_eq!(
            item_done(&events),
            vec![(0, Status::Failed { reason: FailureReason::DurationUnavailable })]
        );
        assert_eq!(events.last(), Some(&BatchEvent::BatchDone { succeeded: 0, total: 1 }));
        assert!(!events.iter().any(|e| matches!(e, BatchEvent::Progress { .. })));

        let report = handle.finish().await.unwrap();
        assert!(!report.cancelled);
        assert_eq!(report.pairings[0].media.duration, None);
    }

    #[tokio::test]
    async fn test_non_positive_duration_counts_as_probe_failure() {
        let mut toolkit = MockMediaToolkit::new();
        toolkit.expect_check_availability().returning(|| Ok(()));
        toolkit.expect_probe_duration().returning(|_| Ok(0.0));
        toolkit.expect_spawn_encode().never();

        let runner = JobRunner::new(Arc::new(toolkit));
        let mut handle = runner.start(&[pairing("a")], options()).await.unwrap();
        let events = drain(&mut handle).await;
        assert_eq!(
            item_done(&events),
            vec![(0, Status::Failed { reason: FailureReason::DurationUnavailable })]
        );
    }

    #[tokio::test]
    async fn test_successful_batch_reports_progress() {
        let toolkit = Arc::new(ScriptedToolkit::new(
            100.0,
            vec![
                Script::ok(vec![
                    "Input #0, mov,mp4",
                    "frame=1 time=00:00:10.00 bitrate=1k",
                    "frame=2 time=00:00:05.00 bitrate=1k",
                    "frame=3 time=00:00:55.50 bitrate=1k",
                    "frame=4 time=00:01:40.00 bitrate=1k",
                ]),
                Script::ok(vec!["time=00:00:20.00"]),
            ],
        ));
        let runner = JobRunner::new(toolkit.clone());

        let mut handle = runner.start(&[pairing("ep1"), pairing("ep2")], options()).await.unwrap();
        let events = drain(&mut handle).await;

        let first: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::Progress { index: 0, percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        assert_eq!(first, vec![10, 55, 99]);

        let done = item_done(&events);
        assert_eq!(done.len(), 2);
        assert!(matches!(&done[0].1, Status::Completed { output } if output.ends_with("ep1_subbed.mp4")));
        assert_eq!(events.last(), Some(&BatchEvent::BatchDone { succeeded: 2, total: 2 }));

        let spawned = toolkit.spawned.lock().unwrap().clone();
        assert_eq!(spawned.len(), 2);
        assert_eq!(spawned[0].input, PathBuf::from("/videos/ep1.mp4"));
        assert_eq!(spawned[1].caption, PathBuf::from("/videos/ep2.srt"));

        let report = handle.finish().await.unwrap();
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.pairings[0].media.duration, Some(100.0));
        assert!(matches!(report.pairings[1].status(), Status::Completed { .. }));
    }

    #[tokio::test]
    async fn test_events_are_not_interleaved() {
        let toolkit = Arc::new(ScriptedToolkit::new(
            10.0,
            vec![
                Script::ok(vec!["time=00:00:01.00", "time=00:00:02.00"]),
                Script::ok(vec!["time=00:00:03.00"]),
            ],
        ));
        let runner = JobRunner::new(toolkit);
        let mut handle = runner.start(&[pairing("a"), pairing("b")], options()).await.unwrap();
        let events = drain(&mut handle).await;

        let indices: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::ItemStarted { index, .. }
                | BatchEvent::Progress { index, .. }
                | BatchEvent::ItemDone { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(indices, vec![0, 0, 0, 0, 1, 1, 1]);
    }

    #[tokio::test]
    async fn test_tool_error_is_isolated() {
        let toolkit = Arc::new(ScriptedToolkit::new(
            60.0,
            vec![
                Script { lines: vec!["time=00:00:01.00"], exit_code: Some(1), hang: false },
                Script::ok(vec![]),
            ],
        ));
        let runner = JobRunner::new(toolkit);
        let mut handle = runner.start(&[pairing("a"), pairing("b")], options()).await.unwrap();
        let events = drain(&mut handle).await;

        let done = item_done(&events);
        assert_eq!(
            done[0].1,
            Status::Failed { reason: FailureReason::ToolExitedWithError { code: Some(1) } }
        );
        assert!(matches!(done[1].1, Status::Completed { .. }));
        assert_eq!(events.last(), Some(&BatchEvent::BatchDone { succeeded: 1, total: 2 }));
    }

    #[tokio::test]
    async fn test_spawn_failure_becomes_invocation_exception() {
        let toolkit = Arc::new(ScriptedToolkit {
            duration: Some(10.0),
            spawn_error: true,
            ..Default::default()
        });
        let runner = JobRunner::new(toolkit);
        let mut handle = runner.start(&[pairing("a")], options()).await.unwrap();
        let events = drain(&mut handle).await;

        match &item_done(&events)[0].1 {
            Status::Failed { reason } => {
                assert!(reason.to_string().starts_with("invocation exception: "));
            }
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unrunnable_pairings_are_left_alone() {
        let toolkit = Arc::new(ScriptedToolkit::new(10.0, vec![Script::ok(vec![])]));
        let runner = JobRunner::new(toolkit);

        let mut excluded = pairing("excluded");
        excluded.selected = false;
        let unmatched = Pairing::new(MediaFile::new("/videos/none.mp4"), None);

        let mut handle = runner
            .start(&[excluded, unmatched, pairing("c")], options())
            .await
            .unwrap();
        let events = drain(&mut handle).await;

        assert_eq!(item_done(&events).iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![2]);
        assert_eq!(events.last(), Some(&BatchEvent::BatchDone { succeeded: 1, total: 1 }));

        let report = handle.finish().await.unwrap();
        assert_eq!(report.pairings[0].status(), &Status::Unprocessed);
        assert_eq!(report.pairings[1].status(), &Status::NoCaption);
    }

    #[tokio::test]
    async fn test_skip_moves_to_next_item() {
        let toolkit = Arc::new(ScriptedToolkit::new(
            100.0,
            vec![
                Script { lines: vec!["time=00:00:30.00"], exit_code: None, hang: true },
                Script::ok(vec!["time=00:00:50.00"]),
            ],
        ));
        let runner = JobRunner::new(toolkit.clone());
        let mut handle = runner.start(&[pairing("a"), pairing("b")], options()).await.unwrap();

        let mut events = Vec::new();
        while let Some(event) = handle.next_event().await {
            if let BatchEvent::Progress { index: 0, .. } = event {
                handle.skip();
            }
            events.push(event);
        }

        let done = item_done(&events);
        assert_eq!(done, vec![(0, Status::Skipped), (1, done[1].1.clone())]);
        assert!(matches!(done[1].1, Status::Completed { .. }));
        assert_eq!(events.last(), Some(&BatchEvent::BatchDone { succeeded: 1, total: 2 }));
        assert_eq!(toolkit.terminated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_stops_remaining_items() {
        let toolkit = Arc::new(ScriptedToolkit::new(
            100.0,
            vec![
                Script { lines: vec!["time=00:00:10.00"], exit_code: None, hang: true },
                Script::ok(vec![]),
                Script::ok(vec![]),
            ],
        ));
        let runner = JobRunner::new(toolkit.clone());
        let mut handle = runner
            .start(&[pairing("a"), pairing("b"), pairing("c")], options())
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Some(event) = handle.next_event().await {
            if let BatchEvent::Progress { index: 0, .. } = event {
                handle.cancel();
            }
            events.push(event);
        }

        let done = item_done(&events);
        assert!(done.len() <= 1);
        assert!(done.iter().all(|(index, _)| *index == 0));
        assert_eq!(events.last(), Some(&BatchEvent::Cancelled { succeeded: 0, total: 3 }));
        assert!(!events.iter().any(|e| matches!(e, BatchEvent::ItemStarted { index, .. } if *index > 0)));
        assert_eq!(toolkit.spawned.lock().unwrap().len(), 1);
        assert_eq!(toolkit.terminated.load(Ordering::SeqCst), 1);

        let report = handle.finish().await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.pairings[1].status(), &Status::Queued);
        assert_eq!(report.pairings[2].status(), &Status::Queued);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_capped() {
        let toolkit = Arc::new(ScriptedToolkit::new(
            30.0,
            vec![Script::ok(vec![
                "time=00:00:03.00",
                "time=00:00:01.00",
                "time=N/A",
                "time=00:00:15.00",
                "time=00:00:15.00",
                "time=00:00:45.00",
            ])],
        ));
        let runner = JobRunner::new(toolkit);
        let mut handle = runner.start(&[pairing("a")], options()).await.unwrap();
        let events = drain(&mut handle).await;

        let percents: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        assert_eq!(percents, vec![10, 50, 50, 99]);
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_caller_edits_do_not_affect_running_batch() {
        let toolkit = Arc::new(ScriptedToolkit::new(10.0, vec![Script::ok(vec![]), Script::ok(vec![])]));
        let runner = JobRunner::new(toolkit.clone());

        let mut list = vec![pairing("a"), pairing("b")];
        let mut handle = runner.start(&list, options()).await.unwrap();
        list[1].selected = false;
        list.clear();

        let events = drain(&mut handle).await;
        assert_eq!(item_done(&events).len(), 2);
        assert_eq!(toolkit.spawned.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_before_first_item_runs_nothing() {
        let toolkit = Arc::new(ScriptedToolkit::new(10.0, vec![Script::ok(vec![]), Script::ok(vec![])]));
        let runner = JobRunner::new(toolkit.clone());

        // The worker has not been polled yet on the test runtime
        let mut handle = runner.start(&[pairing("a"), pairing("b")], options()).await.unwrap();
        handle.cancel();
        let events = drain(&mut handle).await;

        assert!(item_done(&events).is_empty());
        assert!(!events.iter().any(|e| matches!(e, BatchEvent::ItemStarted { .. })));
        assert_eq!(events.last(), Some(&BatchEvent::Cancelled { succeeded: 0, total: 2 }));
        assert!(toolkit.spawned.lock().unwrap().is_empty());

        let report = handle.finish().await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.pairings[0].status(), &Status::Queued);
    }

    #[tokio::test]
    async fn test_stale_skip_is_cleared_before_an_item() {
        let toolkit = Arc::new(ScriptedToolkit::new(10.0, vec![Script::ok(vec!["time=00:00:05.00"])]));
        let runner = JobRunner::new(toolkit.clone());

        let mut handle = runner.start(&[pairing("a")], options()).await.unwrap();
        handle.skip();
        let events = drain(&mut handle).await;

        let done = item_done(&events);
        assert_eq!(done.len(), 1);
        assert!(matches!(done[0].1, Status::Completed { .. }));
        assert_eq!(events.last(), Some(&BatchEvent::BatchDone { succeeded: 1, total: 1 }));
        assert_eq!(toolkit.terminated.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_probe_never_spawns_encoder() {
        let toolkit = Arc::new(ScriptedToolkit::new(10.0, vec![Script::ok(vec![]), Script::ok(vec![])]));
        let runner = JobRunner::new(toolkit.clone());

        let mut handle = runner.start(&[pairing("a"), pairing("b")], options()).await.unwrap();
        let control = handle.control();
        *toolkit.during_probe.lock().unwrap() = Some(Box::new(move || control.cancel()));
        let events = drain(&mut handle).await;

        assert_eq!(item_done(&events), vec![(0, Status::Skipped)]);
        assert_eq!(events.last(), Some(&BatchEvent::Cancelled { succeeded: 0, total: 2 }));
        assert!(toolkit.spawned.lock().unwrap().is_empty());
        assert_eq!(toolkit.terminated.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_skip_during_probe_moves_on_without_encoding() {
        let toolkit = Arc::new(ScriptedToolkit::new(10.0, vec![Script::ok(vec![])]));
        let runner = JobRunner::new(toolkit.clone());

        let mut handle = runner.start(&[pairing("a"), pairing("b")], options()).await.unwrap();
        let control = handle.control();
        *toolkit.during_probe.lock().unwrap() = Some(Box::new(move || control.skip()));
        let events = drain(&mut handle).await;

        let done = item_done(&events);
        assert_eq!(done[0], (0, Status::Skipped));
        assert!(matches!(done[1], (1, Status::Completed { .. })));
        assert_eq!(events.last(), Some(&BatchEvent::BatchDone { succeeded: 1, total: 2 }));

        let spawned = toolkit.spawned.lock().unwrap().clone();
        assert_eq!(spawned.len(), 1);
        assert_eq!(spawned[0].input, PathBuf::from("/videos/b.mp4"));
    }

    #[tokio::test]
    async fn test_bad_caption_style_blocks_start() {
        let mut toolkit = MockMediaToolkit::new();
        toolkit.expect_check_availability().never();

        let mut options = options();
        options.style.font_name = Some("Broken', Font".to_string());

        let runner = JobRunner::new(Arc::new(toolkit));
        let result = runner.start(&[pairing("a")], options).await;
        assert!(matches!(result, Err(HardsubError::InvalidOption(_))));
    }
}
