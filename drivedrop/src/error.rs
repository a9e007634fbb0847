use std::fmt::Display;
use std::io;

use thiserror::Error;

/// Errors that can occur while authenticating, resolving the destination or uploading.
///
/// `Config`, `Auth` and `Destination` abort a run. `Upload` and `Io` are recovered
/// per file by the uploader, except when the refresh token cannot be written or the
/// source folder cannot be listed.
#[derive(Debug, Error)]
pub enum Error {
    /// A local credential or configuration file is missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// The token endpoint refused the exchange or could not be reached
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The destination folder could not be resolved or created
    #[error("Destination unavailable: {0}")]
    Destination(String),

    /// A single file could not be uploaded
    #[error("Upload failed: {0}")]
    Upload(String),

    /// A local file system operation failed
    #[error("I/O error ({context}): {source}")]
    Io {
        /// What was being done when the error happened
        context: String,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Wraps an `io::Error` with a short description of the failed operation.
    pub fn io(context: impl Display, source: io::Error) -> Self {
        Error::Io {
            context: context.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
