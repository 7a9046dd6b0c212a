//! Offline spool: batches that couldn't be sent are written to disk here,
//! and replayed by the shell's startup recovery pass.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Local;
use tokio::fs;

use crate::record::Batch;
use crate::xml;

static COLLISION_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Errors raised while reading or writing the offline spool directory.
#[derive(Debug, thiserror::Error)]
pub enum SpoolError {
    /// A filesystem operation on the spool directory failed.
    #[error("spool filesystem error")]
    Io(#[from] std::io::Error),

    /// A spooled file's content could not be decoded as a batch.
    #[error("corrupt spool file {path}")]
    Corrupt {
        /// Path of the offending file.
        path: PathBuf,
        /// The underlying decode error.
        #[source]
        source: xml::XmlError,
    },

    /// No platform data directory could be resolved (`dirs::data_dir`
    /// returned `None`).
    #[error("could not resolve a user data directory for the offline spool")]
    NoDataDir,
}

/// A directory of spooled `<SensorDatas>` files, one per failed send.
#[derive(Clone, Debug)]
pub struct SpoolStore {
    dir: PathBuf,
}

impl SpoolStore {
    /// Resolves the spool directory as `<data dir>/sensorshell/offline`, per
    /// the documented on-disk layout. One process is assumed to own one
    /// spool directory; nothing here partitions it per account, since a
    /// [`crate::multi_shell::MultiSensorShell`]'s children share one
    /// account and a recovery helper must see the same directory as the
    /// shell that spooled to it.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::NoDataDir`] if the platform has no resolvable
    /// data directory.
    pub fn resolve() -> Result<Self, SpoolError> {
        let base = dirs::data_dir().ok_or(SpoolError::NoDataDir)?;
        Ok(Self::at(base.join("sensorshell").join("offline")))
    }

    /// Builds a spool store rooted at an explicit directory, primarily for
    /// tests that want an isolated temporary location.
    #[must_use]
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory this store reads and writes.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn filename() -> String {
        let timestamp = Local::now().format("%Y.%m.%d.%H.%M.%S%.3f");
        let suffix = COLLISION_COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("{timestamp}.{suffix}.xml")
    }

    /// Writes `batch` to a new, uniquely-named file in the spool directory,
    /// creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::Io`] if the directory can't be created or the
    /// file can't be written.
    pub async fn store(&self, batch: &Batch) -> Result<PathBuf, SpoolError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(Self::filename());
        let body = xml::to_xml(batch).map_err(|source| SpoolError::Corrupt {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, body).await?;
        Ok(path)
    }

    /// Lists spooled files in filename order (oldest first, since the
    /// timestamp prefix sorts chronologically).
    ///
    /// Returns an empty list, rather than an error, if the spool directory
    /// does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::Io`] on any other filesystem failure.
    pub async fn list(&self) -> Result<Vec<PathBuf>, SpoolError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Reads and decodes a spooled file without removing it.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::Io`] on a filesystem failure or
    /// [`SpoolError::Corrupt`] if the file's content isn't a valid batch.
    pub async fn load(&self, path: &Path) -> Result<Batch, SpoolError> {
        let body = fs::read_to_string(path).await?;
        xml::from_xml(&body).map_err(|source| SpoolError::Corrupt {
            path: path.to_owned(),
            source,
        })
    }

    /// Removes a spooled file, called only after its batch has been fully
    /// acknowledged by the server.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::Io`] if the file can't be removed.
    pub async fn delete(&self, path: &Path) -> Result<(), SpoolError> {
        fs::remove_file(path).await?;
        Ok(())
    }

    /// Whether any spooled batches remain, i.e. `hasOfflineData`.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::Io`] on a filesystem failure.
    pub async fn has_offline_data(&self) -> Result<bool, SpoolError> {
        Ok(!self.list().await?.is_empty())
    }
}
