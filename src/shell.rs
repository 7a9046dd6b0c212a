//! `SensorShell`: buffers records in memory, flushes them to the server on
//! a timer or when the buffer fills, and falls back to an on-disk spool
//! when the server can't be reached.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::client::ServerClient;
use crate::config::Config;
use crate::labels::ShellLabel;
use crate::probe;
use crate::record::{Batch, Record};
use crate::spool::SpoolStore;

/// Errors raised by shell operations.
///
/// Network and spool failures are deliberately not variants here: per the
/// shell's error propagation policy, `flush`/`send`/`quit` absorb those
/// internally (logging via `tracing`) rather than surfacing them, so a
/// caller only ever has to handle these two.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum ShellError {
    /// The shell's `quit` was already called; no further operations are
    /// accepted.
    #[error("shell is closed")]
    Closed,

    /// A record failed its own field validation.
    #[error("invalid record")]
    InvalidRecord,
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Init = 0,
    Running = 1,
    Terminating = 2,
    Terminated = 3,
}

impl State {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Init,
            1 => Self::Running,
            2 => Self::Terminating,
            _ => Self::Terminated,
        }
    }
}

/// Tracks the last `statechange` call's `(resource, checksum)` pair. A new
/// call is only queued as a record if either component differs from the
/// memo; the memo is then unconditionally updated regardless of whether the
/// call was queued. Defaults to `("", 0)`, so the very first call for any
/// non-empty resource or non-zero checksum always queues.
struct StateChangeMemo {
    last_resource: String,
    last_checksum: u64,
}

impl Default for StateChangeMemo {
    fn default() -> Self {
        Self {
            last_resource: String::new(),
            last_checksum: 0,
        }
    }
}

struct Inner {
    config: Config,
    client: ServerClient,
    spool: SpoolStore,
    label: ShellLabel,
    buffer: Mutex<Vec<Record>>,
    statechange: Mutex<StateChangeMemo>,
    state: AtomicU8,
    /// Set for the duration of a flush so the autoflush tick can skip a
    /// reentrant run rather than queue up behind the mutex.
    flushing: AtomicBool,
    /// Count of records successfully delivered over this shell's lifetime,
    /// for diagnostics.
    total_sent: AtomicUsize,
}

/// A single buffering, autoflushing connection to the server.
///
/// Cloning a `SensorShell` is cheap and shares the same buffer and
/// background autoflush task; it exists to hand a handle to a
/// [`crate::multi_shell::MultiSensorShell`]'s child tasks.
#[derive(Clone)]
pub struct SensorShell {
    inner: Arc<Inner>,
    autoflush: Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl SensorShell {
    /// Builds and starts a shell: constructs the server client, runs startup
    /// recovery of any spooled batches if `config.offline_recovery_enabled`,
    /// and starts the autoflush timer.
    ///
    /// # Errors
    ///
    /// Returns [`ShellError`] if the spool directory exists but can't be
    /// resolved. This is the only way constructing a shell can fail; network
    /// reachability and recovery failures are logged, not propagated.
    pub async fn new(config: Config) -> Result<Self, ShellError> {
        let label = ShellLabel::single(config.host.clone());
        Self::new_labeled(config, label).await
    }

    /// Like [`SensorShell::new`] but with an explicit label, so a
    /// [`crate::multi_shell::MultiSensorShell`] can tag each child with its
    /// index rather than every child logging as an indistinguishable
    /// [`ShellLabel::single`].
    pub(crate) async fn new_labeled(config: Config, label: ShellLabel) -> Result<Self, ShellError> {
        let client = ServerClient::new(&config);
        let spool = match SpoolStore::resolve() {
            Ok(spool) => spool,
            Err(err) => {
                tracing::error!(shell = %label, error = %err, "failed to resolve offline spool directory");
                return Err(ShellError::Closed);
            }
        };

        if config.offline_recovery_enabled {
            Self::recover(&config, &client, &spool, &label).await;
        }

        let inner = Arc::new(Inner {
            client,
            spool,
            label,
            buffer: Mutex::new(Vec::new()),
            statechange: Mutex::new(StateChangeMemo::default()),
            state: AtomicU8::new(State::Running as u8),
            flushing: AtomicBool::new(false),
            total_sent: AtomicUsize::new(0),
            config,
        });

        let shell = Self {
            inner,
            autoflush: Arc::new(std::sync::Mutex::new(None)),
        };
        shell.start_autoflush();
        Ok(shell)
    }

    /// Replays every spooled batch, oldest first, through a throwaway helper
    /// shell whose own recovery/autoflush/spool-on-failure are all disabled
    /// so it can't recurse or split a replayed batch back onto disk. A file
    /// is only deleted once its batch is fully acknowledged (the helper's
    /// `send` reports the same count as the batch held); a file that isn't
    /// fully acknowledged is left in place and recovery continues with the
    /// next file, rather than stopping the whole pass. One bad or
    /// permanently-rejected file otherwise would block every later,
    /// recoverable batch forever.
    async fn recover(config: &Config, client: &ServerClient, spool: &SpoolStore, label: &ShellLabel) {
        if !probe::is_pingable(client, config.timeout).await {
            return;
        }

        let files = match spool.list().await {
            Ok(files) => files,
            Err(err) => {
                tracing::warn!(shell = %label, error = %err, "failed to list offline spool during recovery");
                return;
            }
        };

        if files.is_empty() {
            return;
        }

        let helper_label = ShellLabel::recovery_helper(config.host.clone());
        let mut helper_config = config.clone();
        helper_config.offline_cache_enabled = false;
        helper_config.offline_recovery_enabled = false;
        helper_config.autosend_maxbuffer = 0;
        helper_config.autosend_interval = None;

        let helper = match Box::pin(Self::new_labeled(helper_config, helper_label.clone())).await {
            Ok(helper) => helper,
            Err(err) => {
                tracing::warn!(shell = %label, error = %err, "failed to start offline recovery helper");
                return;
            }
        };

        for path in &files {
            let batch = match spool.load(path).await {
                Ok(batch) => batch,
                Err(err) => {
                    tracing::warn!(shell = %helper_label, error = %err, path = %path.display(), "skipping corrupt spool file");
                    continue;
                }
            };
            let expected = batch.len();

            for record in batch.0 {
                if let Err(err) = helper.add(record).await {
                    tracing::warn!(shell = %helper_label, error = %err, "recovery helper rejected a record");
                }
            }

            let sent = helper.send().await;
            if sent == expected {
                if let Err(err) = spool.delete(path).await {
                    tracing::warn!(shell = %helper_label, error = %err, path = %path.display(), "recovered batch but failed to delete spool file");
                }
            } else {
                tracing::info!(
                    shell = %helper_label,
                    path = %path.display(),
                    expected,
                    sent,
                    "offline recovery did not fully deliver a batch, leaving it spooled"
                );
            }
        }

        if let Err(err) = helper.quit().await {
            tracing::warn!(shell = %helper_label, error = %err, "failed to close offline recovery helper");
        }
    }

    fn start_autoflush(&self) {
        let Some(period) = self.inner.config.autosend_interval else {
            return;
        };

        let shell = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if State::from_u8(shell.inner.state.load(Ordering::Acquire)) != State::Running {
                    break;
                }
                if shell.inner.flushing.load(Ordering::Acquire) {
                    continue;
                }
                shell.flush().await;
            }
        });

        *self.autoflush.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(handle);
    }

    fn require_running(&self) -> Result<(), ShellError> {
        if State::from_u8(self.inner.state.load(Ordering::Acquire)) == State::Running {
            Ok(())
        } else {
            Err(ShellError::Closed)
        }
    }

    /// Appends one already-built record to the buffer, forcing an immediate
    /// flush if this add fills the buffer to `autosend_maxbuffer`.
    /// `autosend_maxbuffer == 0` disables this trigger; the buffer then only
    /// drains via the autoflush timer or an explicit `send`.
    ///
    /// # Errors
    ///
    /// Returns [`ShellError::Closed`] if `quit` was already called, or
    /// [`ShellError::InvalidRecord`] if the record fails validation.
    pub async fn add(&self, record: Record) -> Result<(), ShellError> {
        self.require_running()?;
        record.validate().map_err(|_| ShellError::InvalidRecord)?;

        let should_flush = {
            let mut buffer = self.inner.buffer.lock().await;
            buffer.push(record);
            self.inner.config.autosend_maxbuffer != 0 && buffer.len() >= self.inner.config.autosend_maxbuffer
        };

        if should_flush {
            self.flush().await;
        }
        Ok(())
    }

    /// Builds a record from a flat key/value map via [`Record::from_map`]
    /// and adds it.
    ///
    /// # Errors
    ///
    /// Returns [`ShellError::InvalidRecord`] if `timestamp` or `runtime` is
    /// present but unparseable, or if the built record otherwise fails
    /// validation. See also [`SensorShell::add`].
    pub async fn add_map(&self, fields: &HashMap<String, String>) -> Result<(), ShellError> {
        let record = Record::from_map(fields, &self.inner.config.user).map_err(|_| ShellError::InvalidRecord)?;
        self.add(record).await
    }

    /// Records a state-change digest. The resource is read from
    /// `fields["resource"]` (treated as `""` if absent); `fields` is queued
    /// as a record only if the pair `(resource, checksum)` differs from the
    /// pair recorded by the previous `statechange` call. The memo is updated
    /// unconditionally either way, so an unchanged pair is never queued
    /// twice in a row but a later reversion back to it queues again.
    /// `statechange_interval` is carried in `Config` for callers that want
    /// to rate-limit their own polling, but is not consulted here.
    ///
    /// # Errors
    ///
    /// See [`SensorShell::add`].
    pub async fn statechange(&self, checksum: u64, fields: &HashMap<String, String>) -> Result<(), ShellError> {
        self.require_running()?;

        let resource = fields.get("resource").cloned().unwrap_or_default();

        let mut memo = self.inner.statechange.lock().await;
        let unchanged = memo.last_resource == resource && memo.last_checksum == checksum;
        memo.last_resource = resource;
        memo.last_checksum = checksum;
        drop(memo);

        if unchanged {
            return Ok(());
        }

        self.add_map(fields).await
    }

    /// Sends whatever is currently buffered, regardless of size, and returns
    /// the number of records actually delivered. Never fails on a network or
    /// spool error: those are logged and the batch is spooled (if
    /// `offline_cache_enabled`) for later recovery instead.
    ///
    /// # Errors
    ///
    /// Returns [`ShellError::Closed`] if `quit` was already called.
    pub async fn send(&self) -> Result<usize, ShellError> {
        self.require_running()?;
        Ok(self.flush().await)
    }

    async fn flush(&self) -> usize {
        self.inner.flushing.store(true, Ordering::Release);
        let sent = self.flush_inner().await;
        self.inner.flushing.store(false, Ordering::Release);
        sent
    }

    async fn flush_inner(&self) -> usize {
        let records = {
            let mut buffer = self.inner.buffer.lock().await;
            std::mem::take(&mut *buffer)
        };

        if records.is_empty() {
            return 0;
        }

        let count = records.len();
        let batch = Batch::from(records);

        if !probe::is_pingable(&self.inner.client, self.inner.config.timeout).await {
            if self.inner.config.offline_cache_enabled {
                self.spool_or_log(&batch, count, "server unreachable").await;
            } else {
                tracing::warn!(shell = %self.inner.label, count, "server unreachable, offline cache disabled, records dropped");
            }
            return 0;
        }

        match self.inner.client.put_batch(&batch).await {
            Ok(()) => {
                self.inner.total_sent.fetch_add(count, Ordering::Relaxed);
                count
            }
            Err(err) => {
                if self.inner.config.offline_cache_enabled {
                    self.spool_or_log(&batch, count, &err.to_string()).await;
                } else {
                    tracing::warn!(shell = %self.inner.label, error = %err, count, "send failed, offline cache disabled, records dropped");
                }
                0
            }
        }
    }

    /// Spools `batch` to disk, logging the reason it couldn't be sent and,
    /// on a spool failure too, that the records are lost.
    async fn spool_or_log(&self, batch: &Batch, count: usize, reason: &str) {
        match self.inner.spool.store(batch).await {
            Ok(_) => {
                tracing::warn!(shell = %self.inner.label, reason, count, "send failed, batch spooled for later recovery");
            }
            Err(spool_err) => {
                tracing::error!(shell = %self.inner.label, error = %spool_err, reason, "failed to spool batch after send failure, records dropped");
            }
        }
    }

    /// Checks reachability, bounded by the configured timeout.
    pub async fn ping(&self) -> bool {
        probe::is_pingable(&self.inner.client, self.inner.config.timeout).await
    }

    /// Total records successfully delivered over this shell's lifetime.
    #[must_use]
    pub fn total_sent(&self) -> usize {
        self.inner.total_sent.load(Ordering::Relaxed)
    }

    /// Flushes any remaining buffered records and stops the autoflush timer.
    /// Further calls to `add`/`send`/`statechange`/`quit` return
    /// [`ShellError::Closed`]. The final flush's outcome is logged, never
    /// propagated: by the time a caller is quitting, there's nothing further
    /// for it to do about a failed send beyond what `flush` already did
    /// (spool it).
    ///
    /// # Errors
    ///
    /// Returns [`ShellError::Closed`] if `quit` was already called.
    pub async fn quit(&self) -> Result<(), ShellError> {
        let previous = self.inner.state.swap(State::Terminating as u8, Ordering::AcqRel);
        if State::from_u8(previous) != State::Running {
            return Err(ShellError::Closed);
        }

        let handle = self.autoflush.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take();
        if let Some(handle) = handle {
            handle.abort();
        }

        self.flush().await;
        self.inner.state.store(State::Terminated as u8, Ordering::Release);
        Ok(())
    }
}
