//! Errors surfaced by the scheduling core.

use thiserror::Error;

/// Failure to set up a [`TaskQueue`](crate::TaskQueue).
#[derive(Debug, Error)]
pub enum TaskQueueError {
    #[error("failed to spawn task queue worker `{name}`")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
