//! In-memory output registry
//!
//! Stands in for a host when embedding the splitter in a process that
//! manages its own recordings, and is what the test suites drive. Every
//! host call is recorded so callers can assert on the exact sequence.

use super::traits::{Output, OutputError, OutputRegistry, OutputResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A host call made through a [`MemoryHandle`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputCall {
    Stop,
    SetPath(PathBuf),
    /// Start, with the path the output was configured with at that moment
    Start(Option<PathBuf>),
}

#[derive(Debug, Default)]
struct OutputInner {
    active: bool,
    path: Option<PathBuf>,
    calls: Vec<OutputCall>,
    failing_stops: u32,
    failing_starts: u32,
    failing_set_paths: u32,
}

/// Host-side view of a simulated output
#[derive(Debug, Clone)]
pub struct MemoryOutput {
    kind: String,
    inner: Arc<Mutex<OutputInner>>,
}

impl MemoryOutput {
    fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            inner: Arc::new(Mutex::new(OutputInner::default())),
        }
    }

    /// Start recording as if the user pressed record
    pub fn begin_recording(&self, path: impl Into<PathBuf>) {
        let mut inner = self.inner.lock();
        inner.path = Some(path.into());
        inner.active = true;
    }

    /// Stop recording as if the user pressed stop
    pub fn halt(&self) {
        self.inner.lock().active = false;
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().active
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.inner.lock().path.clone()
    }

    /// All calls made through handles, oldest first
    pub fn calls(&self) -> Vec<OutputCall> {
        self.inner.lock().calls.clone()
    }

    /// Paths passed to `start`, in order
    pub fn started_paths(&self) -> Vec<PathBuf> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                OutputCall::Start(Some(path)) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn stop_count(&self) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, OutputCall::Stop))
            .count()
    }

    /// Make the next `n` stop calls fail
    pub fn fail_next_stops(&self, n: u32) {
        self.inner.lock().failing_stops = n;
    }

    /// Make the next `n` start calls fail
    pub fn fail_next_starts(&self, n: u32) {
        self.inner.lock().failing_starts = n;
    }

    /// Make the next `n` set_path calls fail
    pub fn fail_next_set_paths(&self, n: u32) {
        self.inner.lock().failing_set_paths = n;
    }
}

/// Registry of simulated outputs
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    kinds: Vec<String>,
    outputs: Mutex<HashMap<String, MemoryOutput>>,
    outstanding: Arc<AtomicUsize>,
    lookups: AtomicUsize,
}

impl MemoryRegistry {
    /// Registry probing `kinds` in order, with no outputs registered yet
    pub fn new(kinds: &[&str]) -> Self {
        Self {
            kinds: kinds.iter().map(|k| k.to_string()).collect(),
            outputs: Mutex::new(HashMap::new()),
            outstanding: Arc::new(AtomicUsize::new(0)),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Registry with one idle output per kind
    pub fn with_kinds(kinds: &[&str]) -> Self {
        let registry = Self::new(kinds);
        for kind in kinds {
            registry.register(kind);
        }
        registry
    }

    /// Register an output for `kind`, returning the existing one if present
    pub fn register(&self, kind: &str) -> MemoryOutput {
        self.outputs
            .lock()
            .entry(kind.to_string())
            .or_insert_with(|| MemoryOutput::new(kind))
            .clone()
    }

    pub fn output(&self, kind: &str) -> Option<MemoryOutput> {
        self.outputs.lock().get(kind).cloned()
    }

    /// Number of handles acquired and not yet released
    pub fn outstanding_handles(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Total `lookup` calls, including ones for unregistered kinds
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl OutputRegistry for MemoryRegistry {
    type Handle = MemoryHandle;

    fn known_kinds(&self) -> Vec<String> {
        self.kinds.clone()
    }

    fn lookup(&self, kind: &str) -> Option<MemoryHandle> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let output = self.outputs.lock().get(kind).cloned()?;
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        Some(MemoryHandle {
            output,
            outstanding: self.outstanding.clone(),
        })
    }
}

/// Borrowed handle to a [`MemoryOutput`]; releases on drop
#[derive(Debug)]
pub struct MemoryHandle {
    output: MemoryOutput,
    outstanding: Arc<AtomicUsize>,
}

impl Drop for MemoryHandle {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Output for MemoryHandle {
    fn kind(&self) -> &str {
        &self.output.kind
    }

    fn is_active(&self) -> bool {
        self.output.is_active()
    }

    fn current_path(&self) -> Option<PathBuf> {
        self.output.path()
    }

    async fn stop(&mut self) -> OutputResult<()> {
        let mut inner = self.output.inner.lock();
        inner.calls.push(OutputCall::Stop);
        if inner.failing_stops > 0 {
            inner.failing_stops -= 1;
            return Err(OutputError::StopFailed {
                kind: self.output.kind.clone(),
                reason: "simulated failure".to_string(),
            });
        }
        inner.active = false;
        Ok(())
    }

    async fn start(&mut self) -> OutputResult<()> {
        let mut inner = self.output.inner.lock();
        let path = inner.path.clone();
        inner.calls.push(OutputCall::Start(path));
        if inner.failing_starts > 0 {
            inner.failing_starts -= 1;
            return Err(OutputError::StartFailed {
                kind: self.output.kind.clone(),
                reason: "simulated failure".to_string(),
            });
        }
        inner.active = true;
        Ok(())
    }

    fn set_path(&mut self, path: &Path) -> OutputResult<()> {
        let mut inner = self.output.inner.lock();
        inner.calls.push(OutputCall::SetPath(path.to_path_buf()));
        if inner.failing_set_paths > 0 {
            inner.failing_set_paths -= 1;
            return Err(OutputError::SetPathFailed {
                kind: self.output.kind.clone(),
                reason: "simulated failure".to_string(),
            });
        }
        inner.path = Some(path.to_path_buf());
        Ok(())
    }
}
