//! Client-side telemetry relay for development-activity sensors.
//!
//! A [`SensorShellFacade`] buffers [`Record`]s produced by IDE/tool sensors,
//! flushes them to a SensorBase server on a timer or when the buffer fills,
//! and spools failed sends to disk for replay the next time the shell
//! starts up. See [`Config`] for the properties that control timing,
//! buffering and the optional multishell fan-out.
//!
//! # Examples
//!
//! ```no_run
//! use std::collections::HashMap;
//!
//! use sensorshell::{Config, SensorShellFacade};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut properties = HashMap::new();
//! properties.insert("host".to_owned(), "http://localhost:9876/sensorbase".to_owned());
//! properties.insert("user".to_owned(), "alice@example.com".to_owned());
//! properties.insert("password".to_owned(), "secret".to_owned());
//!
//! let config = Config::from_map(&properties)?;
//! let shell = SensorShellFacade::new(config).await?;
//!
//! let mut fields = HashMap::new();
//! fields.insert("tool".to_owned(), "Eclipse".to_owned());
//! fields.insert("sensorDataType".to_owned(), "DevEvent".to_owned());
//! fields.insert("resource".to_owned(), "file:///tmp/Foo.java".to_owned());
//! shell.add_map(&fields).await?;
//!
//! shell.quit().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod errors;
pub mod facade;
pub mod labels;
pub mod multi_shell;
pub mod probe;
pub mod record;
pub mod shell;
pub mod spool;
pub mod xml;

pub use client::{ClientError, ServerClient};
pub use config::{Config, ConfigError};
pub use errors::{Error, Result};
pub use facade::SensorShellFacade;
pub use labels::ShellLabel;
pub use multi_shell::MultiSensorShell;
pub use record::{Batch, Properties, Record, RESERVED_FIELDS};
pub use shell::{SensorShell, ShellError};
pub use spool::{SpoolError, SpoolStore};
