//! Our error types for the Manson PSUs.

use thiserror::Error;

use crate::{codec::CodecError, command::Command, models::ModelError};

pub type Result<T, I> = core::result::Result<T, Error<I>>;

/// Custom error type for Manson PSU communications.
#[derive(Error, Debug)]
pub enum Error<I: embedded_io::Error> {
    #[error("Serial communication error")]
    SerialError(I),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("Command {0} is not supported by this model")]
    FunctionNotSupportedForModel(Command),
    #[error("Not connected")]
    NotConnected,
    #[error("Response does not fit the receive buffer")]
    BufferError,
    #[error("Invalid response received")]
    InvalidResponse,
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
