//! `MultiSensorShell`: fans records out across several child
//! [`SensorShell`]s, generalizing the teacher's `Cluster`/`Node` round-robin
//! node selection (`cluster/mod.rs`) to a set of independent server
//! connections instead of partition-owning nodes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::labels::ShellLabel;
use crate::record::Record;
use crate::shell::{SensorShell, ShellError};

/// Dispatches records across `numshells` child shells.
///
/// With `batchsize > 0`, records are sent to the current child until
/// `batchsize` records have been dispatched to it, then dispatch moves to
/// the next child round-robin. With `batchsize == 0`, every `add` picks a
/// child uniformly at random, the same "no partition map, just spread load"
/// fallback the teacher's cluster falls back to when it has no partition
/// information for a key.
pub struct MultiSensorShell {
    children: Vec<SensorShell>,
    batchsize: usize,
    cursor: Mutex<Cursor>,
    picked: AtomicUsize,
}

struct Cursor {
    index: usize,
    sent_to_current: usize,
}

impl MultiSensorShell {
    /// Builds `config.multishell_numshells` child shells, each configured
    /// via [`Config::for_multishell_child`].
    ///
    /// # Errors
    ///
    /// Returns the first child's startup error, if any.
    pub async fn new(config: Config) -> Result<Self, ShellError> {
        let child_config = config.for_multishell_child();
        let mut children = Vec::with_capacity(config.multishell_numshells);
        for index in 0..config.multishell_numshells {
            let label = ShellLabel::child(config.host.clone(), index);
            children.push(SensorShell::new_labeled(child_config.clone(), label).await?);
        }

        Ok(Self {
            children,
            batchsize: config.multishell_batchsize,
            cursor: Mutex::new(Cursor {
                index: 0,
                sent_to_current: 0,
            }),
            picked: AtomicUsize::new(0),
        })
    }

    async fn pick(&self) -> &SensorShell {
        if self.batchsize == 0 {
            let index = rand::thread_rng().gen_range(0..self.children.len());
            self.picked.store(index, Ordering::Relaxed);
            return &self.children[index];
        }

        let mut cursor = self.cursor.lock().await;
        if cursor.sent_to_current >= self.batchsize {
            cursor.index = (cursor.index + 1) % self.children.len();
            cursor.sent_to_current = 0;
        }
        cursor.sent_to_current += 1;
        self.picked.store(cursor.index, Ordering::Relaxed);
        &self.children[cursor.index]
    }

    /// Routes one record to the next child per the batching policy.
    ///
    /// # Errors
    ///
    /// See [`SensorShell::add`].
    pub async fn add(&self, record: Record) -> Result<(), ShellError> {
        self.pick().await.add(record).await
    }

    /// Routes a flat key/value map to the next child.
    ///
    /// # Errors
    ///
    /// See [`SensorShell::add_map`].
    pub async fn add_map(&self, fields: &HashMap<String, String>) -> Result<(), ShellError> {
        self.pick().await.add_map(fields).await
    }

    /// Forwards a `statechange` to the next child. Note each child keeps its
    /// own dedup memo, so the same `(resource, checksum)` pair routed to two
    /// different children is queued by both; this mirrors the general
    /// multishell tradeoff of independent connections over shared state.
    ///
    /// # Errors
    ///
    /// See [`SensorShell::statechange`].
    pub async fn statechange(&self, checksum: u64, fields: &HashMap<String, String>) -> Result<(), ShellError> {
        self.pick().await.statechange(checksum, fields).await
    }

    /// Flushes every child and returns the total number of records sent.
    /// Continues past a failing child so one unreachable shell doesn't block
    /// the others from sending; the first error encountered, if any, is
    /// returned after all children have been given the chance to flush.
    ///
    /// # Errors
    ///
    /// Returns the first child's error, if any occurred.
    pub async fn send(&self) -> Result<usize, ShellError> {
        let mut total = 0;
        let mut first_error = None;
        for child in &self.children {
            match child.send().await {
                Ok(count) => total += count,
                Err(err) => {
                    tracing::warn!(error = %err, "one multishell child failed to send");
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(total),
        }
    }

    /// Pings via the first child only, mirroring the teacher's
    /// single-seed-node reachability check before fanning a real command out
    /// to the whole cluster.
    pub async fn ping(&self) -> bool {
        match self.children.first() {
            Some(child) => child.ping().await,
            None => false,
        }
    }

    /// Closes every child shell, continuing past individual failures and
    /// returning the first one encountered.
    ///
    /// # Errors
    ///
    /// Returns the first child's `quit` error, if any occurred.
    pub async fn quit(&self) -> Result<(), ShellError> {
        let mut first_error = None;
        for child in &self.children {
            if let Err(err) = child.quit().await {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Number of child shells, for tests and diagnostics.
    #[must_use]
    pub fn numshells(&self) -> usize {
        self.children.len()
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn config_for(server: &MockServer, numshells: usize, batchsize: usize) -> Config {
        let map = HashMap::from([
            ("host".to_owned(), server.uri()),
            ("user".to_owned(), "alice".to_owned()),
            ("password".to_owned(), "secret".to_owned()),
            ("multishell.enabled".to_owned(), "true".to_owned()),
            ("multishell.numshells".to_owned(), numshells.to_string()),
            ("multishell.batchsize".to_owned(), batchsize.to_string()),
            ("multishell.maxbuffer".to_owned(), "1000".to_owned()),
            ("multishell.autosend.timeinterval".to_owned(), "60".to_owned()),
            ("offline.recovery.enabled".to_owned(), "false".to_owned()),
        ]);
        Config::from_map(&map).unwrap()
    }

    fn record(resource: &str) -> Record {
        let ts = chrono::Utc::now();
        Record::new(ts, ts, "alice", "Eclipse", "DevEvent", resource)
    }

    #[tokio::test]
    async fn round_robin_distributes_evenly_across_children() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).mount(&server).await;
        Mock::given(method("PUT")).respond_with(ResponseTemplate::new(201)).mount(&server).await;

        let config = config_for(&server, 3, 1).await;
        let multi = MultiSensorShell::new(config).await.unwrap();

        for i in 0..6 {
            multi.add(record(&format!("file{i}.java"))).await.unwrap();
        }

        for child in &multi.children {
            let buffered = child.send().await.unwrap();
            assert_eq!(buffered, 2);
        }
    }

    #[tokio::test]
    async fn batchsize_zero_still_reaches_every_child_eventually() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).mount(&server).await;
        Mock::given(method("PUT")).respond_with(ResponseTemplate::new(201)).mount(&server).await;

        let config = config_for(&server, 4, 0).await;
        let multi = MultiSensorShell::new(config).await.unwrap();

        for i in 0..200 {
            multi.add(record(&format!("file{i}.java"))).await.unwrap();
        }

        let total: usize = {
            let mut sum = 0;
            for child in &multi.children {
                sum += child.send().await.unwrap();
            }
            sum
        };
        assert_eq!(total, 200);
    }

    #[tokio::test]
    async fn quit_closes_all_children() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

        let config = config_for(&server, 2, 1).await;
        let multi = MultiSensorShell::new(config).await.unwrap();
        multi.quit().await.unwrap();

        let err = multi.add(record("foo.java")).await.unwrap_err();
        assert!(matches!(err, ShellError::Closed));
    }
}
