//! Crate-level error type and the fatal-error path
//!
//! Configuration problems and unknown visual states abort the experiment.
//! The participant only ever sees a generic notice; details go to the log.

use thiserror::Error;

use crate::choice::TimeParseError;
use crate::config::ConfigError;
use crate::recorder::RecorderError;
use crate::sim::sprite::SpriteError;
use crate::transport::TransportError;

/// Notice shown to the participant when execution is aborted
pub const FATAL_NOTICE: &str = "An error has occurred.\n\nIf you are a study participant, \
please leave the study and report this issue to the researcher.";

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Time(#[from] TimeParseError),
    #[error(transparent)]
    Sprite(#[from] SpriteError),
    #[error(transparent)]
    Recorder(#[from] RecorderError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    /// Whether this error must abort the experiment
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Time(_) | Error::Sprite(_))
    }
}

/// Log the diagnostic detail and return the participant-facing notice
pub fn fatal(err: &dyn std::error::Error) -> &'static str {
    log::error!("Execution aborted: {err}");
    let mut source = err.source();
    while let Some(cause) = source {
        log::error!("  caused by: {cause}");
        source = cause.source();
    }
    FATAL_NOTICE
}
