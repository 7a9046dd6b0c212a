//! Error and Result types for the sensorshell client.
//!
//! # Examples
//!
//! Handling an error returned while adding a record.
//!
//! ```rust
//! use sensorshell::{errors::Error, Record};
//!
//! fn handle(result: Result<(), Error>) {
//!     match result {
//!         Ok(()) => {}
//!         Err(Error::Validation(msg)) => println!("bad record: {msg}"),
//!         Err(err) => println!("unexpected error: {err}"),
//!     }
//! }
//! ```

pub use crate::{client::ClientError, config::ConfigError, shell::ShellError, spool::SpoolError};

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All the errors that can occur while operating a sensorshell.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The shell's configuration was missing a required key or had an
    /// invalid value for one that has no safe default.
    #[error("configuration error")]
    Config(#[from] ConfigError),

    /// The server rejected or could not be reached for a request.
    #[error("server client error")]
    Client(#[from] ClientError),

    /// A record failed validation before it could be added to a buffer.
    #[error("invalid record: {0}")]
    Validation(String),

    /// An operation was attempted on a shell that already completed `quit`.
    #[error("shell is closed")]
    ShellClosed,

    /// `quit` completed its teardown but the final flush failed.
    #[error("shell error")]
    Shell(#[from] ShellError),

    /// The offline spool could not be read from or written to.
    #[error("spool I/O error")]
    Spool(#[from] SpoolError),
}
