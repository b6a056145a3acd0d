//! Pool of long-running symbolizer subprocesses
//!
//! Each native library gets its own `addr2line`-style subprocess, started on
//! first use and kept alive with its stdin/stdout pipes open. A request is
//! one hex offset on a line; the answer is exactly two lines (method name,
//! then `file:line`).
//!
//! ```text
//!  resolve(libc.so, 0x1a2b)          addr2line -C -f -e <symbols>/system/lib/libc_debug.so
//!        │   "00001a2b\n"  ──────────▶  stdin
//!        │                              stdout
//!        ◀── "malloc\n" "malloc.c:42\n" ─┘
//! ```
//!
//! The pipe protocol is stateful: the answer to request N must be read before
//! request N+1 is written. Every process therefore sits behind its own mutex,
//! held for the full write+read exchange. Requests for different libraries
//! never wait on each other.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::config::SymbolizerConfig;
use crate::domain::{ResolvedFrame, SymbolizeError};

/// Anything able to turn a library-relative offset into a frame
///
/// The resolution cache only talks to symbolizers through this trait so a
/// fake can stand in for real subprocesses.
pub trait SymbolSource: Send + Sync {
    /// Symbolize `offset` inside `library`
    ///
    /// # Errors
    /// Returns an error if the symbolizer cannot be started or stops answering
    fn symbolize(&self, library: &str, offset: u64) -> Result<ResolvedFrame, SymbolizeError>;
}

/// One running symbolizer subprocess
#[derive(Debug)]
pub struct SymbolProcess {
    library: String,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl SymbolProcess {
    /// Write one request and read its two-line answer
    fn exchange(&mut self, offset: u64) -> io::Result<(String, String)> {
        writeln!(self.stdin, "{offset:08x}")?;
        self.stdin.flush()?;

        let method = read_answer_line(&mut self.stdout)?;
        let location = read_answer_line(&mut self.stdout)?;
        Ok((method, location))
    }

    fn terminate(&mut self) {
        // Already-exited children report an error here, which is fine
        let _ = self.child.kill();
        let _ = self.child.wait();
        debug!("Symbolizer for {} terminated", self.library);
    }
}

impl Drop for SymbolProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn read_answer_line(reader: &mut impl BufRead) -> io::Result<String> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "symbolizer closed its output"));
    }
    let trimmed = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(trimmed);
    Ok(line)
}

/// Shared handle to a pooled process; lock it for one request/response exchange
pub type ProcessHandle = Arc<Mutex<SymbolProcess>>;

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One symbolizer subprocess per library name
pub struct SymbolProcessPool {
    config: SymbolizerConfig,
    processes: Mutex<HashMap<String, ProcessHandle>>,
}

impl SymbolProcessPool {
    #[must_use]
    pub fn new(config: SymbolizerConfig) -> Self {
        Self { config, processes: Mutex::new(HashMap::new()) }
    }

    /// Path of the unstripped binary the symbolizer should read for `library`
    ///
    /// The device ships a stripped `libc.so`; its symbols live in
    /// `libc_debug.so`.
    #[must_use]
    pub fn symbol_file_for(&self, library: &str) -> PathBuf {
        let mut path = self.config.symbols_root.join(library.trim_start_matches('/'));
        if path.file_name().is_some_and(|name| name == "libc.so") {
            path.set_file_name("libc_debug.so");
        }
        path
    }

    /// Return the running process for `library`, starting it if needed
    ///
    /// A failed start is not remembered: the next call tries again. The
    /// resolution cache makes sure a given address only asks once.
    ///
    /// # Errors
    /// Returns `StartFailed` if the process cannot be spawned or one of its
    /// pipes is missing
    pub fn acquire(&self, library: &str) -> Result<ProcessHandle, SymbolizeError> {
        let mut processes = lock_ignoring_poison(&self.processes);
        if let Some(handle) = processes.get(library) {
            return Ok(Arc::clone(handle));
        }

        let process = self.spawn(library)?;
        let handle = Arc::new(Mutex::new(process));
        processes.insert(library.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    fn spawn(&self, library: &str) -> Result<SymbolProcess, SymbolizeError> {
        let symbol_file = self.symbol_file_for(library);
        let mut child = Command::new(&self.config.symbolizer_path)
            .arg("-C")
            .arg("-f")
            .arg("-e")
            .arg(&symbol_file)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                warn!(
                    "Failed to start {} for {}: {e}",
                    self.config.symbolizer_path.display(),
                    symbol_file.display()
                );
                SymbolizeError::start_failed(library, e)
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SymbolizeError::start_failed(
                library,
                io::Error::new(io::ErrorKind::BrokenPipe, "symbolizer pipes unavailable"),
            ));
        };

        info!("Started symbolizer for {library} ({})", symbol_file.display());
        Ok(SymbolProcess {
            library: library.to_string(),
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Resolve a library-relative offset with an acquired process
    ///
    /// # Errors
    /// Returns `IoFailure` if the write fails or either answer line hits
    /// end-of-stream
    pub fn resolve(handle: &ProcessHandle, offset: u64) -> Result<ResolvedFrame, SymbolizeError> {
        let mut process = lock_ignoring_poison(handle);
        match process.exchange(offset) {
            Ok((method, location)) => Ok(ResolvedFrame::from_symbolizer(
                Some(process.library.clone()),
                &method,
                &location,
            )),
            Err(e) => {
                warn!("Symbolizer for {} failed at offset 0x{offset:x}: {e}", process.library);
                Err(SymbolizeError::io_failure(&process.library, e))
            }
        }
    }

    /// Terminate and forget the process for `library`
    pub fn release(&self, library: &str) {
        let removed = lock_ignoring_poison(&self.processes).remove(library);
        if let Some(handle) = removed {
            lock_ignoring_poison(&handle).terminate();
        }
    }

    /// Terminate every pooled process
    pub fn release_all(&self) {
        let drained: Vec<ProcessHandle> =
            lock_ignoring_poison(&self.processes).drain().map(|(_, handle)| handle).collect();
        for handle in drained {
            lock_ignoring_poison(&handle).terminate();
        }
    }

    /// Number of running processes
    #[must_use]
    pub fn len(&self) -> usize {
        lock_ignoring_poison(&self.processes).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SymbolSource for SymbolProcessPool {
    fn symbolize(&self, library: &str, offset: u64) -> Result<ResolvedFrame, SymbolizeError> {
        let handle = self.acquire(library)?;
        Self::resolve(&handle, offset)
    }
}

impl Drop for SymbolProcessPool {
    fn drop(&mut self) {
        self.release_all();
    }
}
