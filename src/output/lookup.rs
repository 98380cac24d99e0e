//! Active output lookup

use super::traits::{Output, OutputRegistry};

/// Return the first output, in `kinds` order, that reports itself active.
///
/// Handles for inactive outputs are dropped (released) before the next
/// kind is looked up.
pub fn find_active_output<R: OutputRegistry>(registry: &R, kinds: &[String]) -> Option<R::Handle> {
    for kind in kinds {
        let Some(handle) = registry.lookup(kind) else {
            continue;
        };
        if handle.is_active() {
            return Some(handle);
        }
    }
    None
}
