//! Split controller module
//!
//! This module implements the timed split loop:
//! - SplitState / Session for tracking the active recording
//! - SplitController to poll outputs and perform splits
//! - Filename sequencing for split files

pub mod controller;
pub mod naming;
pub mod state;

pub use controller::{SplitController, SplitEvent, SplitterHandle};
pub use naming::sequenced_path;
pub use state::{Session, SplitState};
