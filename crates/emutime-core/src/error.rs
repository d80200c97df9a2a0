use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimingError {
    #[error("failed to spawn dispatch thread: {0}")]
    ThreadSpawn(#[source] io::Error),
}
