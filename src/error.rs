use thiserror::Error;

use crate::store::StoreError;

/// Why a single inbound message could not be stored.
///
/// Neither variant is fatal: the pipeline logs the error and moves on to the
/// next message.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),
}
