//! Cooperative-cancellation background worker
//!
//! ```text
//! Created ──start()──▶ Running ──body returns──▶ Completed
//!                         │
//!                         └──request_stop() + body polls──▶ Cancelled
//! ```
//!
//! The body gets a [`StopToken`] and checks it at points where it holds no
//! lock. `request_stop()` only flips an atomic flag, so a caller can request
//! a stop and then `join()` while the worker is anywhere in its body without
//! the two ever waiting on each other.

use log::{debug, warn};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Lifecycle of a background task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Running,
    Completed,
    Cancelled,
}

impl TaskState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Completed,
            _ => Self::Cancelled,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Running => 1,
            Self::Completed => 2,
            Self::Cancelled => 3,
        }
    }

    /// Returns true once the worker has finished, either way
    #[must_use]
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// What a task body reports when it returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Cancelled,
}

/// Shared stop flag handed to the task body
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Poll point: true once a stop was requested
    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Release);
    }
}

type TaskBody = Box<dyn FnOnce(&StopToken) -> TaskOutcome + Send + 'static>;

/// A unit of background work running on its own thread
pub struct BackgroundTask {
    name: String,
    stop: StopToken,
    state: Arc<AtomicU8>,
    body: Option<TaskBody>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundTask {
    /// Create a task; nothing runs until [`BackgroundTask::start`]
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(&StopToken) -> TaskOutcome + Send + 'static,
    {
        Self {
            name: name.into(),
            stop: StopToken::new(),
            state: Arc::new(AtomicU8::new(TaskState::Created.as_u8())),
            body: Some(Box::new(body)),
            handle: None,
        }
    }

    /// Spawn the worker thread (`Created` → `Running`)
    ///
    /// Starting an already started task does nothing.
    ///
    /// # Errors
    /// Returns an error if the OS refuses to create the thread
    pub fn start(&mut self) -> io::Result<()> {
        let Some(body) = self.body.take() else {
            return Ok(());
        };

        self.state.store(TaskState::Running.as_u8(), Ordering::Release);
        let stop = self.stop.clone();
        let state = Arc::clone(&self.state);
        let name = self.name.clone();

        let spawned = thread::Builder::new().name(self.name.clone()).spawn(move || {
            let final_state = match body(&stop) {
                TaskOutcome::Completed => TaskState::Completed,
                TaskOutcome::Cancelled => TaskState::Cancelled,
            };
            state.store(final_state.as_u8(), Ordering::Release);
            debug!("Task {name} finished: {final_state:?}");
        });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.state.store(TaskState::Cancelled.as_u8(), Ordering::Release);
                Err(e)
            }
        }
    }

    /// Ask the body to return at its next poll point
    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    /// Block until the worker is done and return its final state
    ///
    /// Safe to call repeatedly, before `start()` (returns `Created`), and
    /// right after `request_stop()`.
    pub fn join(&mut self) -> TaskState {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Task {} panicked", self.name);
                self.state.store(TaskState::Cancelled.as_u8(), Ordering::Release);
            }
        }
        self.state()
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.request_stop();
            self.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    #[test]
    fn test_runs_to_completion() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let mut task = BackgroundTask::new("test-complete", move |_stop: &StopToken| {
            flag.store(true, Ordering::SeqCst);
            TaskOutcome::Completed
        });

        assert_eq!(task.state(), TaskState::Created);
        task.start().unwrap();
        assert_eq!(task.join(), TaskState::Completed);
        assert!(ran.load(Ordering::SeqCst));
        // Joining again is harmless
        assert_eq!(task.join(), TaskState::Completed);
    }

    #[test]
    fn test_join_before_start_returns_created() {
        let mut task = BackgroundTask::new("test-idle", |_stop: &StopToken| TaskOutcome::Completed);
        assert_eq!(task.join(), TaskState::Created);
    }

    #[test]
    fn test_stop_then_join_cancels_promptly() {
        let iterations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&iterations);
        let mut task = BackgroundTask::new("test-cancel", move |stop: &StopToken| {
            loop {
                if stop.is_stop_requested() {
                    return TaskOutcome::Cancelled;
                }
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(1));
            }
        });

        task.start().unwrap();
        thread::sleep(Duration::from_millis(10));

        let requested = Instant::now();
        task.request_stop();
        assert_eq!(task.join(), TaskState::Cancelled);
        assert!(requested.elapsed() < Duration::from_secs(1));

        let seen = iterations.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(5));
        assert_eq!(iterations.load(Ordering::SeqCst), seen);
    }

    #[test]
    fn test_panicking_body_reports_cancelled() {
        let mut task = BackgroundTask::new("test-panic", |_stop: &StopToken| -> TaskOutcome {
            panic!("boom");
        });
        task.start().unwrap();
        assert_eq!(task.join(), TaskState::Cancelled);
    }
}
