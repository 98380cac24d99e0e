//! Host recording outputs
//!
//! - `traits`: the `Output` / `OutputRegistry` seam the controller polls
//! - `lookup`: first-active-wins output discovery
//! - `memory`: in-memory registry used for embedding and tests

pub mod lookup;
pub mod memory;
pub mod traits;

pub use lookup::find_active_output;
pub use memory::{MemoryHandle, MemoryOutput, MemoryRegistry, OutputCall};
pub use traits::{Output, OutputError, OutputRegistry, OutputResult};

/// Output kinds checked by default, in priority order
pub const DEFAULT_OUTPUT_KINDS: [&str; 3] =
    ["simple_file_output", "adv_file_output", "adv_ffmpeg_output"];
