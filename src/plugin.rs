//! Host module glue
//!
//! Owns the split controller on behalf of the host: reads the settings on
//! `load`, runs the watch loop on a dedicated thread, and tears it down on
//! `unload`.

use crate::config::SplitterConfig;
use crate::output::OutputRegistry;
use crate::splitter::{SplitController, SplitEvent, SplitState};
use crate::utils::error::AppResult;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub const MODULE_NAME: &str = "AutoSplit";
pub const MODULE_AUTHOR: &str = "FODK";
pub const MODULE_DESCRIPTION: &str = "Stops and restarts recording when the split time is reached";

/// Errors raised while loading the module
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("AutoSplit is already loaded")]
    AlreadyLoaded,

    #[error("Failed to build watch runtime: {0}")]
    Runtime(std::io::Error),

    #[error("Failed to spawn watch thread: {0}")]
    Thread(std::io::Error),
}

/// Install a tracing subscriber unless the host already has one
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "auto_split=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

struct WatchThread {
    cancel: CancellationToken,
    state: Arc<RwLock<SplitState>>,
    events: broadcast::Sender<SplitEvent>,
    thread: JoinHandle<()>,
}

/// The module instance a host loads and unloads
pub struct AutoSplitPlugin<R: OutputRegistry + 'static> {
    registry: Arc<R>,
    config_dir: PathBuf,
    watch: Option<WatchThread>,
}

impl<R: OutputRegistry + 'static> AutoSplitPlugin<R> {
    /// `config_dir` is the directory the host assigns to this module
    pub fn new(registry: Arc<R>, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            config_dir: config_dir.into(),
            watch: None,
        }
    }

    pub fn name(&self) -> &'static str {
        MODULE_NAME
    }

    pub fn author(&self) -> &'static str {
        MODULE_AUTHOR
    }

    pub fn description(&self) -> &'static str {
        MODULE_DESCRIPTION
    }

    pub fn is_loaded(&self) -> bool {
        self.watch.is_some()
    }

    /// Controller state, or `Idle` when not loaded
    pub fn state(&self) -> SplitState {
        self.watch
            .as_ref()
            .map(|w| *w.state.read())
            .unwrap_or_default()
    }

    /// Subscribe to controller events while loaded
    pub fn subscribe(&self) -> Option<broadcast::Receiver<SplitEvent>> {
        self.watch.as_ref().map(|w| w.events.subscribe())
    }

    /// Read settings and start the watch thread
    pub fn load(&mut self) -> AppResult<()> {
        if self.watch.is_some() {
            return Err(PluginError::AlreadyLoaded.into());
        }

        init_logging();
        tracing::info!("Loading {} v{}", MODULE_NAME, env!("CARGO_PKG_VERSION"));

        let config = SplitterConfig::load_or_default(&self.config_dir);
        let controller = SplitController::new(self.registry.clone(), config);
        let state = controller.shared_state();
        let events = controller.event_sender();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(PluginError::Runtime)?;

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let thread = std::thread::Builder::new()
            .name("auto-split-watch".to_string())
            .spawn(move || {
                runtime.block_on(controller.run(token));
            })
            .map_err(PluginError::Thread)?;

        self.watch = Some(WatchThread {
            cancel,
            state,
            events,
            thread,
        });
        Ok(())
    }

    /// Stop the watch thread and wait for it to exit
    pub fn unload(&mut self) {
        let Some(watch) = self.watch.take() else {
            return;
        };

        watch.cancel.cancel();
        if watch.thread.join().is_err() {
            tracing::error!("Watch thread panicked");
        }
        tracing::info!("{} unloaded", MODULE_NAME);
    }
}

impl<R: OutputRegistry + 'static> Drop for AutoSplitPlugin<R> {
    fn drop(&mut self) {
        self.unload();
    }
}
