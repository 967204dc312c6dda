use emu_core::TaskQueueError;
use thiserror::Error;

use crate::config::ConfigError;

/// Failure to build a [`Skeleton`](crate::Skeleton).
#[derive(Debug, Error)]
pub enum SkeletonError {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),
    #[error("could not start the sound worker")]
    SoundWorker(#[from] TaskQueueError),
}
