//! Racing a run against an interrupt signal.

use std::future::Future;
use std::io;

/// Runs `work` until it finishes or `interrupt` fires.
///
/// Returns `None` when interrupted. An interrupt future that fails (for
/// example because the signal handler could not be installed) never cancels
/// the work.
pub async fn until_interrupted<T>(
    work: impl Future<Output = T>,
    interrupt: impl Future<Output = io::Result<()>>,
) -> Option<T> {
    tokio::select! {
        out = work => Some(out),
        Ok(()) = interrupt => None,
    }
}
