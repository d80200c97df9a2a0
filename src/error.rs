use std::io;

use emutime_core::TimingError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("config I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error(transparent)]
    Timing(#[from] TimingError),
}
