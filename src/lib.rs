//! AutoSplit - split long recordings into sequenced files.
//!
//! Watches the host's recording outputs and, once the configured duration
//! has elapsed, stops the active output and restarts it into
//! `<name>_0001.<ext>`, `<name>_0002.<ext>`, and so on.

pub mod config;
pub mod output;
pub mod plugin;
pub mod splitter;
pub mod utils;

pub use config::SplitterConfig;
pub use output::{Output, OutputRegistry};
pub use plugin::{AutoSplitPlugin, PluginError};
pub use splitter::{SplitController, SplitEvent, SplitState, SplitterHandle};
