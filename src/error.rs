//! Crate-level error aggregate for callers that drive the whole pipeline.

use thiserror::Error;

use crate::config::ConfigError;
use crate::correlator::MalformedLogLine;
use crate::identity::IdentityError;
use crate::logsource::PollError;
use crate::reporter::SinkError;
use crate::telemetry::LogError;
use crate::wire::{ClientError, FramingError};

#[derive(Error, Debug)]
pub enum TraceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error(transparent)]
    Malformed(#[from] MalformedLogLine),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Logging(#[from] LogError),
}

impl TraceError {
    /// Process exit code for the CLI: 2 for configuration problems, 1 for
    /// everything else.
    pub fn exit_code(&self) -> u8 {
        match self {
            TraceError::Config(_) | TraceError::Logging(_) => 2,
            _ => 1,
        }
    }
}
