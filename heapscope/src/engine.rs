//! Engine facade
//!
//! Ties the shared pieces together the way the native heap panel uses them:
//! one symbolizer pool and one resolution cache for the whole session, one
//! symbolication run at a time, and pure analysis on top.

use log::info;
use std::io;
use std::sync::Arc;

use crate::analysis::{diff, LibraryAggregate, LibraryAggregator, SnapshotDiff};
use crate::classification::FrameClassifier;
use crate::domain::{AllocationSnapshot, LibraryMapping};
use crate::export::TextExporter;
use crate::pipeline::{PipelineEvent, SymbolicationPipeline, SymbolicationSession, TaskState};
use crate::symbolization::{AddressResolutionCache, SymbolProcessPool, SymbolSource, SymbolizerConfig};

/// What to show after a capture: the full snapshot or only what is new
#[derive(Debug, Clone)]
pub struct CaptureView {
    pub snapshot: Arc<AllocationSnapshot>,
    /// Memory added since the backup, when the view is a diff
    pub delta: Option<u64>,
}

pub struct HeapEngine {
    pool: Option<Arc<SymbolProcessPool>>,
    pipeline: SymbolicationPipeline,
    session: SymbolicationSession,
    aggregator: LibraryAggregator,
    exporter: TextExporter,
}

impl HeapEngine {
    /// Engine backed by real symbolizer subprocesses
    #[must_use]
    pub fn new(config: SymbolizerConfig, classifier: FrameClassifier) -> Self {
        let pool = Arc::new(SymbolProcessPool::new(config));
        let mut engine = Self::with_source(Arc::clone(&pool) as Arc<dyn SymbolSource>, classifier);
        engine.pool = Some(pool);
        engine
    }

    /// Engine backed by any symbol source
    #[must_use]
    pub fn with_source(source: Arc<dyn SymbolSource>, classifier: FrameClassifier) -> Self {
        let cache = Arc::new(AddressResolutionCache::new(source));
        let pipeline = SymbolicationPipeline::new(cache);
        Self {
            pool: None,
            session: SymbolicationSession::new(pipeline.clone()),
            pipeline,
            aggregator: LibraryAggregator::new(classifier.clone()),
            exporter: TextExporter::new(classifier),
        }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<AddressResolutionCache> {
        self.pipeline.cache()
    }

    /// Decide what to symbolicate after a new capture
    ///
    /// With a backup from the same session, only new records are kept;
    /// otherwise the whole capture is shown.
    #[must_use]
    pub fn prepare_view(
        &self,
        current: Arc<AllocationSnapshot>,
        backup: Option<&AllocationSnapshot>,
    ) -> CaptureView {
        match backup {
            Some(backup) if current.is_refinement_of(backup) => {
                let SnapshotDiff { records, total_delta } = diff(&current, backup);
                info!("Showing {} new records ({total_delta} bytes)", records.len());
                let snapshot = AllocationSnapshot::from_shared(current.session(), records);
                CaptureView { snapshot: Arc::new(snapshot), delta: Some(total_delta) }
            }
            _ => CaptureView { snapshot: current, delta: None },
        }
    }

    /// Start symbolicating `snapshot`, replacing any run in progress
    ///
    /// # Errors
    /// Returns an error if the worker thread cannot be spawned
    pub fn symbolicate<P, D>(
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
        self.session.restart(snapshot, mappings, on_progress, on_done)
    }

    /// Start symbolicating `snapshot` and report through a channel
    ///
    /// # Errors
    /// Returns an error if the worker thread cannot be spawned
    pub fn symbolicate_with_events(
        &mut self,
        snapshot: Arc<AllocationSnapshot>,
        mappings: Arc<[LibraryMapping]>,
    ) -> io::Result<crossbeam_channel::Receiver<PipelineEvent>> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let done_tx = tx.clone();
        self.symbolicate(
            snapshot,
            mappings,
            move |completed, total| {
                let _ = tx.send(PipelineEvent::Progress { completed, total });
            },
            move || {
                let _ = done_tx.send(PipelineEvent::Done);
            },
        )?;
        Ok(rx)
    }

    /// Stop the current run and wait for it
    pub fn cancel(&mut self) -> Option<TaskState> {
        self.session.stop()
    }

    /// Wait for the current run to finish
    pub fn wait(&mut self) -> Option<TaskState> {
        self.session.wait()
    }

    #[must_use]
    pub fn aggregate(&self, snapshot: &AllocationSnapshot) -> Vec<LibraryAggregate> {
        self.aggregator.aggregate(snapshot)
    }

    #[must_use]
    pub fn aggregator(&self) -> &LibraryAggregator {
        &self.aggregator
    }

    #[must_use]
    pub fn exporter(&self) -> &TextExporter {
        &self.exporter
    }

    /// Stop work and terminate every symbolizer subprocess
    pub fn shutdown(&mut self) {
        self.session.stop();
        if let Some(pool) = &self.pool {
            pool.release_all();
        }
    }
}

impl Drop for HeapEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
