/// Progress and cancellation sink for long-running tree operations.
///
/// Traversals poll [`is_cancelled`](Reporter::is_cancelled) once per node
/// and abort promptly when it turns true; progress is reported in bytes
/// processed.
pub trait Reporter: Send + Sync {
    /// Called after a unit of work, with the number of bytes it covered.
    fn on_progress(&self, _bytes: u64) {}

    /// Polled at node granularity; returning true aborts the operation
    /// with a cancellation error.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// A reporter that ignores progress and never cancels.
impl Reporter for () {}
