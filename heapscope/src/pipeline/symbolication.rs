//! # Background Symbolication
//!
//! Walks a snapshot in order and fills in every record's resolved backtrace,
//! reporting progress every page of records so a consumer can redraw
//! partial results.
//!
//! ## Progress Contract
//!
//! - `on_progress(completed, total)` after every `page_size` records and once
//!   at the end with `completed == total`
//! - `completed` never decreases
//! - `on_done()` exactly once, after the final progress call
//! - a cancelled run skips both the final progress call and `on_done()`
//!
//! Cancellation is polled right before each record, never in the middle of
//! one, so a record is either untouched or fully resolved.

use crossbeam_channel::{unbounded, Receiver};
use log::{debug, info};
use std::io;
use std::sync::Arc;

use super::background_task::{BackgroundTask, StopToken, TaskOutcome, TaskState};
use super::stack_resolver::StackResolver;
use crate::domain::{AllocationSnapshot, LibraryMapping};
use crate::symbolization::AddressResolutionCache;

/// Records processed between two progress callbacks
pub const PAGE_SIZE: usize = 20;

/// Pipeline progress for consumers that prefer a channel over callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    Progress { completed: usize, total: usize },
    Done,
}

/// Starts symbolication workers sharing one resolution cache
#[derive(Clone)]
pub struct SymbolicationPipeline {
    cache: Arc<AddressResolutionCache>,
    page_size: usize,
}

impl SymbolicationPipeline {
    pub fn new(cache: Arc<AddressResolutionCache>) -> Self {
        Self { cache, page_size: PAGE_SIZE }
    }

    /// Use a different progress page size (minimum 1)
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<AddressResolutionCache> {
        &self.cache
    }

    /// Start resolving `snapshot` on a background thread
    ///
    /// Callbacks run on the worker thread.
    ///
    /// # Errors
    /// Returns an error if the worker thread cannot be spawned
    pub fn start<P, D>(
        &self,
        snapshot: Arc<AllocationSnapshot>,
        mappings: Arc<[LibraryMapping]>,
        mut on_progress: P,
        on_done: D,
    ) -> io::Result<BackgroundTask>
    where
        P: FnMut(usize, usize) + Send + 'static,
        D: FnOnce() + Send + 'static,
    {
        let cache = Arc::clone(&self.cache);
        let page_size = self.page_size;
        let name = format!("symbolicate-{}", snapshot.session().0);

        let mut task = BackgroundTask::new(name, move |stop: &StopToken| {
            let outcome = resolve_snapshot(&snapshot, &mappings, &cache, page_size, stop, &mut on_progress);
            if outcome == TaskOutcome::Completed {
                on_done();
            }
            outcome
        });
        task.start()?;
        Ok(task)
    }

    /// Start resolving `snapshot`, reporting through a channel
    ///
    /// # Errors
    /// Returns an error if the worker thread cannot be spawned
    pub fn start_with_events(
        &self,
        snapshot: Arc<AllocationSnapshot>,
        mappings: Arc<[LibraryMapping]>,
    ) -> io::Result<(BackgroundTask, Receiver<PipelineEvent>)> {
        let (tx, rx) = unbounded();
        let done_tx = tx.clone();

        let task = self.start(
            snapshot,
            mappings,
            move |completed, total| {
                // Receiver may be gone if the consumer lost interest
                let _ = tx.send(PipelineEvent::Progress { completed, total });
            },
            move || {
                let _ = done_tx.send(PipelineEvent::Done);
            },
        )?;
        Ok((task, rx))
    }
}

/// The pipeline body: resolve every unresolved record of `snapshot` in order
///
/// Runs on the calling thread; [`SymbolicationPipeline::start`] wraps it in
/// a background task.
pub fn resolve_snapshot(
    snapshot: &AllocationSnapshot,
    mappings: &[LibraryMapping],
    cache: &AddressResolutionCache,
    page_size: usize,
    stop: &StopToken,
    on_progress: &mut dyn FnMut(usize, usize),
) -> TaskOutcome {
    let resolver = StackResolver::new(cache, mappings);
    let total = snapshot.len();
    let page_size = page_size.max(1);
    let mut completed = 0;

    for record in snapshot.records() {
        if stop.is_stop_requested() {
            info!("Symbolication of {} cancelled at {completed}/{total}", snapshot.session());
            return TaskOutcome::Cancelled;
        }

        if !record.is_resolved() {
            let backtrace = resolver.resolve_backtrace(&record.raw_backtrace);
            record.set_resolved_backtrace(backtrace);
        }

        completed += 1;
        // The final count is reported after the loop
        if completed % page_size == 0 && completed != total {
            on_progress(completed, total);
        }
    }

    on_progress(completed, total);
    debug!(
        "Symbolication of {} done: {total} records, {} cached addresses",
        snapshot.session(),
        cache.len()
    );
    TaskOutcome::Completed
}

/// Owns the pipeline run for the snapshot currently on screen
///
/// Starting a new run always stops and joins the previous one first, so two
/// workers never race to fill the same cache entries.
pub struct SymbolicationSession {
    pipeline: SymbolicationPipeline,
    current: Option<BackgroundTask>,
}

impl SymbolicationSession {
    #[must_use]
    pub fn new(pipeline: SymbolicationPipeline) -> Self {
        Self { pipeline, current: None }
    }

    /// Replace the running pipeline with one for `snapshot`
    ///
    /// # Errors
    /// Returns an error if the worker thread cannot be spawned
    pub fn restart<P, D>(
        &mut self,
        snapshot: Arc<AllocationSnapshot>,
        mappings: Arc<[LibraryMapping]>,
        on_progress: P,
        on_done: D,
    ) -> io::Result<()>
    where
        P: FnMut(usize, usize) + Send + 'static,
        D: FnOnce() + Send + 'static,
    {
        self.stop();
        self.current = Some(self.pipeline.start(snapshot, mappings, on_progress, on_done)?);
        Ok(())
    }

    /// Stop and join the running pipeline, if any
    pub fn stop(&mut self) -> Option<TaskState> {
        let mut task = self.current.take()?;
        task.request_stop();
        Some(task.join())
    }

    /// Wait for the running pipeline to finish on its own
    pub fn wait(&mut self) -> Option<TaskState> {
        self.current.take().map(|mut task| task.join())
    }

    #[must_use]
    pub fn state(&self) -> Option<TaskState> {
        self.current.as_ref().map(BackgroundTask::state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AllocationRecord, RawAddress, ResolvedFrame, SessionId, SymbolizeError};
    use crate::symbolization::SymbolSource;
    use std::sync::Mutex;

    struct EchoSource;

    impl SymbolSource for EchoSource {
        fn symbolize(&self, library: &str, offset: u64) -> Result<ResolvedFrame, SymbolizeError> {
            Ok(ResolvedFrame::from_symbolizer(Some(library.into()), &format!("f{offset:x}"), "a.c:7"))
        }
    }

    fn snapshot_of(n: usize) -> AllocationSnapshot {
        let records = (0..n)
            .map(|i| AllocationRecord::new(16, 1, false, vec![RawAddress(0x1000 + i as u64)]))
            .collect();
        AllocationSnapshot::new(SessionId(7), records)
    }

    fn mappings() -> Vec<LibraryMapping> {
        vec![LibraryMapping::new("liba.so", 0x1000, 0x10_0000)]
    }

    #[test]
    fn test_progress_pages_and_final_count() {
        let cache = AddressResolutionCache::new(Arc::new(EchoSource));
        let snapshot = snapshot_of(45);
        let mut calls = Vec::new();

        let outcome = resolve_snapshot(
            &snapshot,
            &mappings(),
            &cache,
            PAGE_SIZE,
            &StopToken::new(),
            &mut |done, total| calls.push((done, total)),
        );

        assert_eq!(outcome, TaskOutcome::Completed);
        assert_eq!(calls, vec![(20, 45), (40, 45), (45, 45)]);
        assert_eq!(snapshot.resolved_count(), 45);
    }

    #[test]
    fn test_exact_page_multiple_reports_total_once() {
        let cache = AddressResolutionCache::new(Arc::new(EchoSource));
        let snapshot = snapshot_of(40);
        let mut calls = Vec::new();

        resolve_snapshot(&snapshot, &mappings(), &cache, PAGE_SIZE, &StopToken::new(), &mut |d, t| {
            calls.push((d, t));
        });

        assert_eq!(calls, vec![(20, 40), (40, 40)]);
    }

    #[test]
    fn test_stop_before_start_touches_nothing() {
        let cache = AddressResolutionCache::new(Arc::new(EchoSource));
        let snapshot = snapshot_of(5);
        let stop = StopToken::new();
        stop.request_stop();
        let mut calls = Vec::new();

        let outcome =
            resolve_snapshot(&snapshot, &mappings(), &cache, PAGE_SIZE, &stop, &mut |d, t| calls.push((d, t)));

        assert_eq!(outcome, TaskOutcome::Cancelled);
        assert!(calls.is_empty());
        assert_eq!(snapshot.resolved_count(), 0);
    }

    #[test]
    fn test_already_resolved_records_are_kept() {
        let cache = AddressResolutionCache::new(Arc::new(EchoSource));
        let snapshot = snapshot_of(2);
        let marker = heapscope_common::ResolvedBacktrace::default();
        snapshot.records()[0].set_resolved_backtrace(marker.clone());

        resolve_snapshot(&snapshot, &mappings(), &cache, PAGE_SIZE, &StopToken::new(), &mut |_, _| {});

        assert_eq!(snapshot.records()[0].resolved_backtrace().map(|b| b.as_ref()), Some(&marker));
        assert!(snapshot.records()[1].is_resolved());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_background_run_calls_done_after_last_progress() {
        let pipeline = SymbolicationPipeline::new(Arc::new(AddressResolutionCache::new(Arc::new(EchoSource))));
        let log = Arc::new(Mutex::new(Vec::new()));
        let progress_log = Arc::clone(&log);
        let done_log = Arc::clone(&log);

        let mut task = pipeline
            .start(
                Arc::new(snapshot_of(25)),
                mappings().into(),
                move |d, t| progress_log.lock().unwrap().push(format!("{d}/{t}")),
                move || done_log.lock().unwrap().push("done".to_string()),
            )
            .unwrap();

        assert_eq!(task.join(), TaskState::Completed);
        assert_eq!(*log.lock().unwrap(), vec!["20/25", "25/25", "done"]);
    }

    #[test]
    fn test_event_channel() {
        let pipeline = SymbolicationPipeline::new(Arc::new(AddressResolutionCache::new(Arc::new(EchoSource))))
            .with_page_size(2);
        let (mut task, events) = pipeline.start_with_events(Arc::new(snapshot_of(3)), mappings().into()).unwrap();

        assert_eq!(task.join(), TaskState::Completed);
        let received: Vec<PipelineEvent> = events.try_iter().collect();
        assert_eq!(
            received,
            vec![
                PipelineEvent::Progress { completed: 2, total: 3 },
                PipelineEvent::Progress { completed: 3, total: 3 },
                PipelineEvent::Done,
            ]
        );
    }

    #[test]
    fn test_session_restart_stops_previous_run() {
        let pipeline = SymbolicationPipeline::new(Arc::new(AddressResolutionCache::new(Arc::new(EchoSource))));
        let mut session = SymbolicationSession::new(pipeline);

        session.restart(Arc::new(snapshot_of(3)), mappings().into(), |_, _| {}, || {}).unwrap();
        session.restart(Arc::new(snapshot_of(3)), mappings().into(), |_, _| {}, || {}).unwrap();

        assert_eq!(session.wait(), Some(TaskState::Completed));
        assert_eq!(session.stop(), None);
    }
}
