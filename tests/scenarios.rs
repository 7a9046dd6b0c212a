//! End-to-end scenarios against a mock SensorBase server: the happy path,
//! offline queueing and recovery, statechange deduplication, forced
//! flushing at the buffer limit, partial recovery, and multishell
//! distribution.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sensorshell::{Config, SensorShellFacade};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn base_properties(host: &str) -> HashMap<String, String> {
    HashMap::from([
        ("host".to_owned(), host.to_owned()),
        ("user".to_owned(), "alice@example.com".to_owned()),
        ("password".to_owned(), "secret".to_owned()),
        ("autosend.timeinterval".to_owned(), "60".to_owned()),
        ("offline.recovery.enabled".to_owned(), "false".to_owned()),
    ])
}

fn dev_event(resource: &str) -> HashMap<String, String> {
    HashMap::from([
        ("tool".to_owned(), "Eclipse".to_owned()),
        ("sensorDataType".to_owned(), "DevEvent".to_owned()),
        ("resource".to_owned(), resource.to_owned()),
    ])
}

/// S1: a shell with a reachable server sends on an explicit `send` and the
/// server receives exactly the records that were added.
#[tokio::test]
async fn s1_happy_path_send_delivers_buffered_records() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).mount(&server).await;
    Mock::given(method("PUT"))
        .and(path("/sensordata"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let config = Config::from_map(&base_properties(&server.uri())).unwrap();
    let shell = SensorShellFacade::new(config).await.unwrap();

    shell.add_map(&dev_event("foo.java")).await.unwrap();
    shell.add_map(&dev_event("bar.java")).await.unwrap();
    let sent = shell.send().await.unwrap();
    assert_eq!(sent, 2);

    shell.quit().await.unwrap();
}

/// S2: a batch that fails to send is spooled to disk, and a later recovery
/// pass (the one `SensorShell::new` runs at startup when
/// `offline.recovery.enabled` is set) delivers it once the server answers.
/// Drives the spool and client directly, the way `SensorShell::recover`
/// does internally, rather than through a real shell: the shell always
/// spools under the platform data directory, which a parallel test binary
/// can't safely repoint via a process-wide environment variable.
#[tokio::test]
async fn s2_offline_then_recovery_delivers_the_spooled_batch() {
    let dir = tempfile::tempdir().unwrap();
    let spool = sensorshell::SpoolStore::at(dir.path());

    let down = MockServer::start().await;
    let config = Config::from_map(&base_properties(&down.uri())).unwrap();
    let client = sensorshell::ServerClient::new(&config);

    let batch = sensorshell::Batch(vec![sensorshell::Record::new(
        chrono::Utc::now(),
        chrono::Utc::now(),
        "alice@example.com",
        "Eclipse",
        "DevEvent",
        "foo.java",
    )]);
    assert!(client.put_batch(&batch).await.is_err());
    spool.store(&batch).await.unwrap();
    assert!(spool.has_offline_data().await.unwrap());

    let up = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/sensordata"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&up)
        .await;

    let recovered_config = Config::from_map(&base_properties(&up.uri())).unwrap();
    let recovered_client = sensorshell::ServerClient::new(&recovered_config);

    for file in spool.list().await.unwrap() {
        let pending = spool.load(&file).await.unwrap();
        recovered_client.put_batch(&pending).await.unwrap();
        spool.delete(&file).await.unwrap();
    }

    assert!(!spool.has_offline_data().await.unwrap());
}

/// S3: `statechange` only queues a record when the `(resource, checksum)`
/// pair differs from the previous call; an unchanged pair is skipped, but a
/// later call that changes either component queues again even if it matches
/// an earlier pair seen before the most recent call.
#[tokio::test]
async fn s3_statechange_only_queues_on_a_changed_resource_or_checksum() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).mount(&server).await;
    Mock::given(method("PUT"))
        .and(path("/sensordata"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let config = Config::from_map(&base_properties(&server.uri())).unwrap();
    let shell = SensorShellFacade::new(config).await.unwrap();

    let fields = dev_event("foo.java");
    shell.statechange(100, &fields).await.unwrap(); // queues: first call ever
    shell.statechange(100, &fields).await.unwrap(); // skipped: unchanged
    shell.statechange(200, &fields).await.unwrap(); // queues: checksum changed
    shell.statechange(200, &fields).await.unwrap(); // skipped: unchanged
    shell.statechange(100, &fields).await.unwrap(); // queues: reverted checksum

    let sent = shell.send().await.unwrap();
    assert_eq!(sent, 3);
}

/// S4: adding a record that fills the buffer to `autosend.maxbuffer`
/// triggers an immediate flush without waiting for the timer or an explicit
/// `send`.
#[tokio::test]
async fn s4_maxbuffer_forces_an_immediate_flush() {
    let count = Arc::new(AtomicUsize::new(0));
    let server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).mount(&server).await;
    let counter = count.clone();
    Mock::given(method("PUT"))
        .and(path("/sensordata"))
        .respond_with(move |_req: &Request| {
            counter.fetch_add(1, Ordering::SeqCst);
            ResponseTemplate::new(201)
        })
        .mount(&server)
        .await;

    let mut properties = base_properties(&server.uri());
    properties.insert("autosend.maxbuffer".to_owned(), "3".to_owned());
    let config = Config::from_map(&properties).unwrap();
    let shell = SensorShellFacade::new(config).await.unwrap();

    shell.add_map(&dev_event("a.java")).await.unwrap();
    shell.add_map(&dev_event("b.java")).await.unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 0);

    shell.add_map(&dev_event("c.java")).await.unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

/// S5: recovery that encounters a server rejection leaves that batch
/// spooled (it is never deleted on anything short of full acknowledgment)
/// but keeps going rather than aborting the whole pass, so one
/// permanently-rejected batch can't block every later, recoverable one.
#[tokio::test]
async fn s5_recovery_leaves_rejected_batches_spooled_but_keeps_going() {
    let dir = tempfile::tempdir().unwrap();
    let spool = sensorshell::SpoolStore::at(dir.path());

    let ts = chrono::Utc::now();
    let first = sensorshell::Batch(vec![sensorshell::Record::new(
        ts, ts, "alice@example.com", "Eclipse", "DevEvent", "first.java",
    )]);
    let second = sensorshell::Batch(vec![sensorshell::Record::new(
        ts, ts, "alice@example.com", "Eclipse", "DevEvent", "second.java",
    )]);
    spool.store(&first).await.unwrap();
    spool.store(&second).await.unwrap();

    let server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).mount(&server).await;
    Mock::given(method("PUT"))
        .and(path("/sensordata"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let properties = base_properties(&server.uri());
    let config = Config::from_map(&properties).unwrap();
    let client = sensorshell::ServerClient::new(&config);

    let files_before = spool.list().await.unwrap();
    assert_eq!(files_before.len(), 2);

    // Mirrors what `SensorShell::recover` does with each file: attempt
    // delivery, only delete on success, and never stop the loop on a
    // rejection.
    for file in &files_before {
        let batch = spool.load(file).await.unwrap();
        if client.put_batch(&batch).await.is_ok() {
            spool.delete(file).await.unwrap();
        }
    }

    let files_after = spool.list().await.unwrap();
    assert_eq!(files_after, files_before);
}

/// S6: a multishell configuration spreads records across its children
/// rather than sending everything through one connection.
#[tokio::test]
async fn s6_multishell_distributes_records_across_children() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).mount(&server).await;
    Mock::given(method("PUT"))
        .and(path("/sensordata"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let mut properties = base_properties(&server.uri());
    properties.insert("multishell.enabled".to_owned(), "true".to_owned());
    properties.insert("multishell.numshells".to_owned(), "3".to_owned());
    properties.insert("multishell.batchsize".to_owned(), "2".to_owned());
    properties.insert("multishell.maxbuffer".to_owned(), "1000".to_owned());
    let config = Config::from_map(&properties).unwrap();

    let shell = SensorShellFacade::new(config).await.unwrap();
    for i in 0..6 {
        shell.add_map(&dev_event(&format!("file{i}.java"))).await.unwrap();
    }

    let sent = shell.send().await.unwrap();
    assert_eq!(sent, 6);
}
