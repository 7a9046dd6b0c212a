//! A uniform handle over either a single [`SensorShell`] or a
//! [`MultiSensorShell`], chosen once at construction from
//! `config.multishell_enabled`, so callers don't have to branch on the mode
//! themselves.

use std::collections::HashMap;

use crate::config::Config;
use crate::multi_shell::MultiSensorShell;
use crate::record::Record;
use crate::shell::{SensorShell, ShellError};

/// Either a single shell or a multishell, presenting the same operations.
pub enum SensorShellFacade {
    /// A single, directly-connected shell.
    Single(SensorShell),
    /// Several child shells dispatched across round-robin or at random.
    Multi(MultiSensorShell),
}

impl SensorShellFacade {
    /// Builds a [`SensorShellFacade::Multi`] if `config.multishell_enabled`,
    /// otherwise a [`SensorShellFacade::Single`].
    ///
    /// # Errors
    ///
    /// Returns the underlying shell's or multishell's startup error.
    pub async fn new(config: Config) -> Result<Self, ShellError> {
        if config.multishell_enabled {
            Ok(Self::Multi(MultiSensorShell::new(config).await?))
        } else {
            Ok(Self::Single(SensorShell::new(config).await?))
        }
    }

    /// Adds a record, see [`SensorShell::add`] / [`MultiSensorShell::add`].
    ///
    /// # Errors
    ///
    /// See the delegated method.
    pub async fn add(&self, record: Record) -> Result<(), ShellError> {
        match self {
            Self::Single(shell) => shell.add(record).await,
            Self::Multi(multi) => multi.add(record).await,
        }
    }

    /// Adds a record built from a flat key/value map.
    ///
    /// # Errors
    ///
    /// See the delegated method.
    pub async fn add_map(&self, fields: &HashMap<String, String>) -> Result<(), ShellError> {
        match self {
            Self::Single(shell) => shell.add_map(fields).await,
            Self::Multi(multi) => multi.add_map(fields).await,
        }
    }

    /// Records a `statechange` digest. The resource compared against the
    /// memo is read from `fields["resource"]`; see
    /// [`SensorShell::statechange`].
    ///
    /// # Errors
    ///
    /// See the delegated method.
    pub async fn statechange(&self, checksum: u64, fields: &HashMap<String, String>) -> Result<(), ShellError> {
        match self {
            Self::Single(shell) => shell.statechange(checksum, fields).await,
            Self::Multi(multi) => multi.statechange(checksum, fields).await,
        }
    }

    /// Forces an immediate send, returning the number of records sent.
    ///
    /// # Errors
    ///
    /// See the delegated method.
    pub async fn send(&self) -> Result<usize, ShellError> {
        match self {
            Self::Single(shell) => shell.send().await,
            Self::Multi(multi) => multi.send().await,
        }
    }

    /// Checks reachability.
    pub async fn ping(&self) -> bool {
        match self {
            Self::Single(shell) => shell.ping().await,
            Self::Multi(multi) => multi.ping().await,
        }
    }

    /// Flushes and closes the shell(s).
    ///
    /// # Errors
    ///
    /// See the delegated method.
    pub async fn quit(&self) -> Result<(), ShellError> {
        match self {
            Self::Single(shell) => shell.quit().await,
            Self::Multi(multi) => multi.quit().await,
        }
    }
}
