//! Split controller
//!
//! Polls the output registry, tracks how long the active recording has been
//! running, and performs the stop → rename → restart cycle once the split
//! duration is reached.

use super::state::{Session, SplitState};
use crate::config::SplitterConfig;
use crate::output::{find_active_output, Output, OutputRegistry};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Events emitted by the controller
#[derive(Debug, Clone)]
pub enum SplitEvent {
    /// An output was seen active and a new session began
    SessionStarted {
        kind: String,
        path: Option<PathBuf>,
        at: DateTime<Utc>,
    },
    /// The output was stopped and restarted into a new file
    Split {
        kind: String,
        index: u32,
        path: Option<PathBuf>,
        at: DateTime<Utc>,
    },
    /// The output was stopped at the split point and left stopped
    Stopped { kind: String, at: DateTime<Utc> },
    /// The output stopped on its own before the next split
    SessionEnded { kind: String, splits: u32 },
    /// Every restart attempt after a split failed
    RestartFailed { kind: String, error: String },
    /// The watch loop exited
    Shutdown,
}

/// Watches the active output and splits it on a timer
pub struct SplitController<R: OutputRegistry> {
    registry: Arc<R>,

    config: SplitterConfig,

    /// Output kinds checked each tick, in priority order
    kinds: Vec<String>,

    /// Session being tracked, if an output is recording
    session: Option<Session>,

    state: Arc<RwLock<SplitState>>,

    event_tx: broadcast::Sender<SplitEvent>,
}

impl<R: OutputRegistry> SplitController<R> {
    pub fn new(registry: Arc<R>, config: SplitterConfig) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        // An empty list in the settings means "whatever the host offers"
        let kinds = if config.output_kinds.is_empty() {
            registry.known_kinds()
        } else {
            config.output_kinds.clone()
        };
        Self {
            registry,
            config,
            kinds,
            session: None,
            state: Arc::new(RwLock::new(SplitState::Idle)),
            event_tx,
        }
    }

    /// Get the current controller state
    pub fn state(&self) -> SplitState {
        *self.state.read()
    }

    /// Session currently being tracked
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Subscribe to controller events
    pub fn subscribe(&self) -> broadcast::Receiver<SplitEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn shared_state(&self) -> Arc<RwLock<SplitState>> {
        self.state.clone()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<SplitEvent> {
        self.event_tx.clone()
    }

    fn set_state(&self, state: SplitState) {
        *self.state.write() = state;
    }

    fn emit(&self, event: SplitEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Run the watch loop until `cancel` fires.
    ///
    /// Returns immediately if the splitter is disabled in the configuration.
    pub async fn run(mut self, cancel: CancellationToken) {
        if !self.config.enable_stop {
            tracing::info!("Auto split is disabled, watch loop not started");
            return;
        }

        let poll_interval = self.config.poll_interval();
        tracing::info!(
            "Watch loop started: split every {:?}, restart {}, poll {:?}, outputs {:?}",
            self.config.split_duration(),
            self.config.enable_restart,
            poll_interval,
            self.kinds
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.poll_once(&cancel).await;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        self.set_state(SplitState::Idle);
        self.emit(SplitEvent::Shutdown);
        tracing::info!("Watch loop stopped");
    }

    /// Evaluate one poll tick.
    ///
    /// The output handle acquired here is released before returning.
    pub async fn poll_once(&mut self, cancel: &CancellationToken) {
        let Some(mut output) = find_active_output(&*self.registry, &self.kinds) else {
            if let Some(session) = self.session.take() {
                tracing::info!(
                    "Output '{}' stopped after {} split(s)",
                    session.kind,
                    session.split_count
                );
                self.emit(SplitEvent::SessionEnded {
                    kind: session.kind,
                    splits: session.split_count,
                });
            }
            self.set_state(SplitState::Idle);
            return;
        };

        let now = Instant::now();
        let session = match self.session.take() {
            Some(session) if session.kind == output.kind() => session,
            previous => {
                if let Some(previous) = previous {
                    tracing::info!(
                        "Active output changed from '{}' to '{}'",
                        previous.kind,
                        output.kind()
                    );
                    self.emit(SplitEvent::SessionEnded {
                        kind: previous.kind,
                        splits: previous.split_count,
                    });
                }
                self.begin_session(&output, now);
                return;
            }
        };

        if !session.is_due(now, self.config.split_duration()) {
            self.session = Some(session);
            return;
        }

        self.session = self.split(&mut output, session, cancel).await;
    }

    fn begin_session(&mut self, output: &R::Handle, now: Instant) {
        let session = Session::begin(output.kind(), output.current_path(), now);
        tracing::info!(
            "Recording detected on '{}' -> {:?}",
            session.kind,
            session.base_filename
        );
        self.emit(SplitEvent::SessionStarted {
            kind: session.kind.clone(),
            path: session.base_filename.clone(),
            at: session.wall_started_at,
        });
        self.session = Some(session);
        self.set_state(SplitState::Recording);
    }

    /// Stop the output and, if restarting is enabled, move it to the next
    /// sequenced file. Returns the session if it continues.
    async fn split(
        &mut self,
        output: &mut R::Handle,
        mut session: Session,
        cancel: &CancellationToken,
    ) -> Option<Session> {
        tracing::debug!(
            "Splitting '{}' after {:?}",
            session.kind,
            session.elapsed(Instant::now())
        );

        if let Err(e) = output.stop().await {
            // Output is presumably still recording; try again next window
            tracing::error!("Failed to stop '{}' for split: {}", session.kind, e);
            session.restart_window(Instant::now());
            return Some(session);
        }

        if !self.config.enable_restart {
            tracing::info!("Stopped '{}' at split point", session.kind);
            return self.end_stopped(session);
        }

        match session.next_path() {
            Some(path) => {
                if let Err(e) = output.set_path(&path) {
                    // Restarting now would write over the segment just finished
                    tracing::error!(
                        "Failed to rename output to {:?}, leaving it stopped: {}",
                        path,
                        e
                    );
                    return self.end_stopped(session);
                }
            }
            None => {
                tracing::warn!(
                    "Output '{}' has no destination path, restarting without rename",
                    session.kind
                );
            }
        }
        let index = session.advance(Instant::now());

        match self.restart(output, cancel).await {
            Restart::Started => {}
            Restart::Cancelled => {
                tracing::info!("Restart of '{}' abandoned on shutdown", session.kind);
                self.set_state(SplitState::Idle);
                return None;
            }
            Restart::Failed(error) => {
                tracing::error!("Giving up restarting '{}': {}", session.kind, error);
                self.emit(SplitEvent::RestartFailed {
                    kind: session.kind,
                    error,
                });
                self.set_state(SplitState::Idle);
                return None;
            }
        }

        session.restart_window(Instant::now());
        let path = output.current_path();
        tracing::info!("Split #{} of '{}' -> {:?}", index, session.kind, path);
        self.emit(SplitEvent::Split {
            kind: session.kind.clone(),
            index,
            path,
            at: Utc::now(),
        });
        Some(session)
    }

    /// End the session with the output left stopped
    fn end_stopped(&self, session: Session) -> Option<Session> {
        self.emit(SplitEvent::Stopped {
            kind: session.kind,
            at: Utc::now(),
        });
        self.set_state(SplitState::Idle);
        None
    }

    /// Start the output, retrying one poll interval apart
    async fn restart(&self, output: &mut R::Handle, cancel: &CancellationToken) -> Restart {
        let attempts = self.config.max_restart_attempts();
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match output.start().await {
                Ok(()) => return Restart::Started,
                Err(e) => {
                    tracing::warn!("Restart attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = e.to_string();
                }
            }

            if attempt < attempts && !pause(self.config.poll_interval(), cancel).await {
                return Restart::Cancelled;
            }
        }

        Restart::Failed(last_error)
    }
}

/// Outcome of restarting an output after a split
enum Restart {
    Started,
    Cancelled,
    Failed(String),
}

impl<R: OutputRegistry + 'static> SplitController<R> {
    /// Run the controller on the current tokio runtime
    pub fn spawn(self) -> SplitterHandle {
        let cancel = CancellationToken::new();
        let state = self.state.clone();
        let task = tokio::spawn(self.run(cancel.clone()));
        SplitterHandle {
            cancel,
            state,
            task,
        }
    }
}

/// Sleep for `duration`. Returns `false` if cancelled first.
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Owner of a running controller task
pub struct SplitterHandle {
    cancel: CancellationToken,
    state: Arc<RwLock<SplitState>>,
    task: JoinHandle<()>,
}

impl SplitterHandle {
    /// Get the controller's current state
    pub fn state(&self) -> SplitState {
        *self.state.read()
    }

    /// Whether the watch loop has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Token that stops the watch loop when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the watch loop and wait for it to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::error!("Watch loop task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{MemoryOutput, MemoryRegistry, OutputCall};

    const KIND: &str = "simple_file_output";

    fn config(split_secs: i64, restart: bool) -> SplitterConfig {
        SplitterConfig {
            enable_restart: restart,
            hours: 0,
            minutes: 0,
            seconds: split_secs,
            ..Default::default()
        }
    }

    fn setup(config: SplitterConfig) -> (Arc<MemoryRegistry>, MemoryOutput, SplitController<MemoryRegistry>) {
        let registry = Arc::new(MemoryRegistry::with_kinds(&[
            KIND,
            "adv_file_output",
            "adv_ffmpeg_output",
        ]));
        let output = registry.output(KIND).unwrap();
        let controller = SplitController::new(registry.clone(), config);
        (registry, output, controller)
    }

    async fn wait_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    fn drain(rx: &mut broadcast::Receiver<SplitEvent>) -> Vec<SplitEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_splits_with_sequenced_names() {
        let (registry, output, controller) = setup(config(1, true));
        output.begin_recording("/rec/a.mp4");
        let handle = controller.spawn();

        wait_ms(3500).await;

        assert_eq!(
            output.started_paths(),
            vec![
                PathBuf::from("/rec/a_0001.mp4"),
                PathBuf::from("/rec/a_0002.mp4"),
                PathBuf::from("/rec/a_0003.mp4"),
            ]
        );
        assert_eq!(handle.state(), SplitState::Recording);
        assert!(output.is_active());
        assert_eq!(registry.outstanding_handles(), 0);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_split_happens_within_one_poll_of_duration() {
        let (_registry, output, controller) = setup(config(1, true));
        output.begin_recording("/rec/a.mp4");
        let handle = controller.spawn();

        wait_ms(999).await;
        assert_eq!(output.stop_count(), 0);

        wait_ms(200).await;
        assert_eq!(output.stop_count(), 1);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_order_is_stop_rename_start() {
        let (_registry, output, controller) = setup(config(1, true));
        output.begin_recording("clip.mkv");
        let handle = controller.spawn();

        wait_ms(1100).await;

        assert_eq!(
            output.calls(),
            vec![
                OutputCall::Stop,
                OutputCall::SetPath(PathBuf::from("clip_0001.mkv")),
                OutputCall::Start(Some(PathBuf::from("clip_0001.mkv"))),
            ]
        );

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_session_restarts_numbering() {
        let (_registry, output, controller) = setup(config(1, true));
        output.begin_recording("/rec/a.mp4");
        let handle = controller.spawn();

        wait_ms(2500).await;
        output.halt();
        wait_ms(550).await;
        assert_eq!(handle.state(), SplitState::Idle);

        output.begin_recording("/rec/b.mp4");
        wait_ms(1650).await;

        assert_eq!(
            output.started_paths(),
            vec![
                PathBuf::from("/rec/a_0001.mp4"),
                PathBuf::from("/rec/a_0002.mp4"),
                PathBuf::from("/rec/b_0001.mp4"),
            ]
        );

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_restart_output_stays_stopped() {
        let (_registry, output, controller) = setup(config(1, false));
        let mut rx = controller.subscribe();
        output.begin_recording("/rec/a.mp4");
        let handle = controller.spawn();

        wait_ms(1100).await;
        assert_eq!(output.calls(), vec![OutputCall::Stop]);
        assert!(!output.is_active());
        assert_eq!(handle.state(), SplitState::Idle);

        wait_ms(3000).await;
        assert_eq!(output.calls(), vec![OutputCall::Stop]);

        // Externally restarted: a fresh session, stopped again one window later
        output.begin_recording("/rec/a.mp4");
        wait_ms(1300).await;
        assert_eq!(output.calls(), vec![OutputCall::Stop, OutputCall::Stop]);

        let events = drain(&mut rx);
        let started = events
            .iter()
            .filter(|e| matches!(e, SplitEvent::SessionStarted { .. }))
            .count();
        let stopped = events
            .iter()
            .filter(|e| matches!(e, SplitEvent::Stopped { .. }))
            .count();
        assert_eq!(started, 2);
        assert_eq!(stopped, 2);
        assert!(!events.iter().any(|e| matches!(e, SplitEvent::Split { .. })));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_never_polls() {
        let mut config = config(1, true);
        config.enable_stop = false;
        let (registry, output, controller) = setup(config);
        output.begin_recording("/rec/a.mp4");

        controller.run(CancellationToken::new()).await;

        assert_eq!(registry.lookup_count(), 0);
        assert!(output.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_stop_detected_without_rename() {
        let (_registry, output, controller) = setup(config(10, true));
        let mut rx = controller.subscribe();
        output.begin_recording("/rec/a.mp4");
        let handle = controller.spawn();

        wait_ms(2100).await;
        output.halt();
        wait_ms(200).await;

        assert_eq!(handle.state(), SplitState::Idle);
        assert!(output.calls().is_empty());

        let events = drain(&mut rx);
        assert!(matches!(
            events.last(),
            Some(SplitEvent::SessionEnded { splits: 0, .. })
        ));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration_splits_once_per_poll() {
        let (_registry, output, controller) = setup(config(0, true));
        output.begin_recording("a.mp4");
        let handle = controller.spawn();

        wait_ms(1100).await;

        // Detected at 0ms, then one split per 200ms tick
        assert_eq!(output.stop_count(), 5);
        assert_eq!(output.started_paths().last(), Some(&PathBuf::from("a_0005.mp4")));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_exits_promptly() {
        let (_registry, output, controller) = setup(config(600, true));
        let mut rx = controller.subscribe();
        output.begin_recording("a.mp4");
        let handle = controller.spawn();

        // Next tick is due at 400ms, so the loop is mid-sleep here
        wait_ms(300).await;
        let started = Instant::now();
        let result = tokio::time::timeout(Duration::from_millis(50), handle.shutdown()).await;

        assert!(result.is_ok());
        assert_eq!(Instant::now(), started);
        assert!(matches!(drain(&mut rx).last(), Some(SplitEvent::Shutdown)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_restart_backoff_is_not_a_failure() {
        let (_registry, output, controller) = setup(config(1, true));
        let mut rx = controller.subscribe();
        output.begin_recording("a.mp4");
        output.fail_next_starts(10);
        let handle = controller.spawn();

        // First start fails at 1000ms; the retry waits until 1200ms
        wait_ms(1100).await;
        handle.shutdown().await;

        let starts = output
            .calls()
            .iter()
            .filter(|c| matches!(c, OutputCall::Start(_)))
            .count();
        assert_eq!(starts, 1);
        let events = drain(&mut rx);
        assert!(!events
            .iter()
            .any(|e| matches!(e, SplitEvent::RestartFailed { .. })));
        assert!(matches!(events.last(), Some(SplitEvent::Shutdown)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_kinds_outside_settings_are_left_alone() {
        let mut config = config(1, true);
        config.output_kinds = vec!["adv_file_output".to_string()];
        let (_registry, output, controller) = setup(config);
        output.begin_recording("/rec/a.mp4");
        let handle = controller.spawn();

        wait_ms(1100).await;

        assert!(output.calls().is_empty());
        assert_eq!(handle.state(), SplitState::Idle);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_kind_list_uses_registry_kinds() {
        let mut config = config(1, true);
        config.output_kinds.clear();
        let (_registry, output, controller) = setup(config);
        output.begin_recording("/rec/a.mp4");
        let handle = controller.spawn();

        wait_ms(1100).await;

        assert_eq!(output.started_paths(), vec![PathBuf::from("/rec/a_0001.mp4")]);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_is_retried() {
        let (_registry, output, controller) = setup(config(1, true));
        output.begin_recording("a.mp4");
        output.fail_next_starts(2);
        let handle = controller.spawn();

        wait_ms(1500).await;

        assert_eq!(
            output.calls(),
            vec![
                OutputCall::Stop,
                OutputCall::SetPath(PathBuf::from("a_0001.mp4")),
                OutputCall::Start(Some(PathBuf::from("a_0001.mp4"))),
                OutputCall::Start(Some(PathBuf::from("a_0001.mp4"))),
                OutputCall::Start(Some(PathBuf::from("a_0001.mp4"))),
            ]
        );
        assert!(output.is_active());
        assert_eq!(handle.state(), SplitState::Recording);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_gives_up_after_attempts() {
        let (_registry, output, controller) = setup(config(1, true));
        let mut rx = controller.subscribe();
        output.begin_recording("a.mp4");
        output.fail_next_starts(10);
        let handle = controller.spawn();

        wait_ms(2000).await;

        assert!(!output.is_active());
        assert_eq!(handle.state(), SplitState::Idle);
        let starts = output
            .calls()
            .iter()
            .filter(|c| matches!(c, OutputCall::Start(_)))
            .count();
        assert_eq!(starts, 3);
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, SplitEvent::RestartFailed { .. })));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_stop_retries_next_window() {
        let (_registry, output, controller) = setup(config(1, true));
        output.begin_recording("a.mp4");
        output.fail_next_stops(1);
        let handle = controller.spawn();

        wait_ms(1500).await;
        assert_eq!(output.calls(), vec![OutputCall::Stop]);
        assert!(output.is_active());

        wait_ms(1000).await;
        assert_eq!(output.started_paths(), vec![PathBuf::from("a_0001.mp4")]);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_rename_leaves_output_stopped() {
        let (_registry, output, controller) = setup(config(1, true));
        let mut rx = controller.subscribe();
        output.begin_recording("a.mp4");
        output.fail_next_set_paths(1);
        let handle = controller.spawn();

        wait_ms(1100).await;

        assert_eq!(
            output.calls(),
            vec![
                OutputCall::Stop,
                OutputCall::SetPath(PathBuf::from("a_0001.mp4")),
            ]
        );
        assert!(output.started_paths().is_empty());
        assert!(!output.is_active());
        assert_eq!(handle.state(), SplitState::Idle);
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, SplitEvent::Stopped { .. })));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_once_drives_state_machine() {
        let (registry, output, mut controller) = setup(config(0, false));
        let cancel = CancellationToken::new();

        controller.poll_once(&cancel).await;
        assert_eq!(controller.state(), SplitState::Idle);

        output.begin_recording("a.mp4");
        controller.poll_once(&cancel).await;
        assert_eq!(controller.state(), SplitState::Recording);
        assert_eq!(
            controller.session().and_then(|s| s.base_filename.clone()),
            Some(PathBuf::from("a.mp4"))
        );

        controller.poll_once(&cancel).await;
        assert_eq!(controller.state(), SplitState::Idle);
        assert!(controller.session().is_none());
        assert_eq!(output.calls(), vec![OutputCall::Stop]);
        assert_eq!(registry.outstanding_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_outputs_starts_new_session() {
        let (registry, output, mut controller) = setup(config(60, true));
        let other = registry.output("adv_file_output").unwrap();
        let cancel = CancellationToken::new();

        other.begin_recording("/rec/adv.mkv");
        controller.poll_once(&cancel).await;
        assert_eq!(controller.session().map(|s| s.kind.as_str()), Some("adv_file_output"));

        // Higher-priority output becomes active while the other still records
        output.begin_recording("/rec/simple.mp4");
        controller.poll_once(&cancel).await;
        assert_eq!(controller.session().map(|s| s.kind.as_str()), Some(KIND));
        assert_eq!(
            controller.session().and_then(|s| s.base_filename.clone()),
            Some(PathBuf::from("/rec/simple.mp4"))
        );
    }
}
