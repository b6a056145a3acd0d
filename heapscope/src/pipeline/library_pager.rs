//! Incremental delivery of a library's member records
//!
//! A library can own thousands of call sites. Instead of handing them to the
//! presentation layer in one go, a pager streams them in small chunks from a
//! background task, and is replaced whenever the selected library changes.

use std::io;
use std::sync::Arc;

use super::background_task::{BackgroundTask, StopToken, TaskOutcome, TaskState};
use crate::analysis::LibraryAggregate;
use crate::domain::AllocationRecord;

/// Records delivered per chunk
pub const CHUNK_SIZE: usize = 10;

/// Streams the records of the selected library in chunks
#[derive(Default)]
pub struct LibraryPager {
    current: Option<BackgroundTask>,
}

impl LibraryPager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start paging `library`, stopping any previous selection first
    ///
    /// `on_chunk(start, records)` gets consecutive slices of the library's
    /// records, `start` being the index of the first one.
    ///
    /// # Errors
    /// Returns an error if the worker thread cannot be spawned
    pub fn select<F>(&mut self, library: Arc<LibraryAggregate>, mut on_chunk: F) -> io::Result<()>
    where
        F: FnMut(usize, &[Arc<AllocationRecord>]) + Send + 'static,
    {
        self.cancel();

        let name = format!("page-{}", library.library);
        let mut task = BackgroundTask::new(name, move |stop: &StopToken| {
            for (i, chunk) in library.records.chunks(CHUNK_SIZE).enumerate() {
                if stop.is_stop_requested() {
                    return TaskOutcome::Cancelled;
                }
                on_chunk(i * CHUNK_SIZE, chunk);
            }
            TaskOutcome::Completed
        });
        task.start()?;
        self.current = Some(task);
        Ok(())
    }

    /// Stop the current pager, if any, and wait for it
    pub fn cancel(&mut self) -> Option<TaskState> {
        let mut task = self.current.take()?;
        task.request_stop();
        Some(task.join())
    }

    /// Wait for the current pager to deliver everything
    pub fn wait(&mut self) -> Option<TaskState> {
        self.current.take().map(|mut task| task.join())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawAddress;
    use std::sync::Mutex;

    fn aggregate_with(n: u32) -> Arc<LibraryAggregate> {
        let records: Vec<Arc<AllocationRecord>> = (0..n)
            .map(|i| Arc::new(AllocationRecord::new(n - i, 1, false, vec![RawAddress(u64::from(i) + 1)])))
            .collect();
        Arc::new(LibraryAggregate {
            library: "libfoo.so".to_string(),
            total_size: records.iter().map(|r| r.total_size()).sum(),
            total_count: u64::from(n),
            records,
        })
    }

    #[test]
    fn test_pages_every_record_in_order() {
        let mut pager = LibraryPager::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        pager
            .select(aggregate_with(25), move |start, chunk| {
                sink.lock().unwrap().push((start, chunk.len()));
            })
            .unwrap();

        assert_eq!(pager.wait(), Some(TaskState::Completed));
        assert_eq!(*seen.lock().unwrap(), vec![(0, 10), (10, 10), (20, 5)]);
    }

    #[test]
    fn test_new_selection_cancels_previous() {
        let mut pager = LibraryPager::new();
        pager.select(aggregate_with(3), |_, _| {}).unwrap();
        pager.select(aggregate_with(3), |_, _| {}).unwrap();

        assert!(pager.cancel().is_some_and(TaskState::is_finished));
        assert_eq!(pager.cancel(), None);
    }
}
