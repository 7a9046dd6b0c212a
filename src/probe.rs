//! Bounded-latency reachability check.
//!
//! `is_pingable` must answer quickly even when the network is black-holing
//! requests rather than rejecting them, so the actual `is_registered` call is
//! raced against a timer. The loser keeps running to completion in the
//! background and its result is simply discarded, the same "abandon the
//! straggler, don't cancel it" approach the teacher's
//! `task::Task::wait_till_complete` uses for its own deadline race.

use std::time::Duration;

use tokio::time::sleep;

use crate::client::ServerClient;

/// Races `client.is_registered()` against `timeout`.
///
/// Returns `true` only if the registration check completes within `timeout`
/// and reports the account as registered. A timeout, a transport error, and
/// an unregistered account are indistinguishable to the caller: all three
/// just mean "not currently reachable".
pub async fn is_pingable(client: &ServerClient, timeout: Duration) -> bool {
    let client = client.clone();
    let mut probe = tokio::spawn(async move { client.is_registered().await });

    tokio::select! {
        result = &mut probe => result.unwrap_or(false),
        () = sleep(timeout) => {
            // Don't abort: a response that arrives after the deadline still
            // isn't ours to wait on, but the task is left to finish on its
            // own so the underlying connection isn't torn down mid-flight.
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::Config;

    fn config_for(host: String) -> Config {
        let map = HashMap::from([
            ("host".to_owned(), host),
            ("user".to_owned(), "alice".to_owned()),
            ("password".to_owned(), "secret".to_owned()),
        ]);
        Config::from_map(&map).unwrap()
    }

    #[tokio::test]
    async fn returns_true_when_server_answers_in_time() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/alice"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = ServerClient::new(&config_for(server.uri()));
        assert!(is_pingable(&client, Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn returns_false_when_server_is_slower_than_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/alice"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
            .mount(&server)
            .await;

        let client = ServerClient::new(&config_for(server.uri()));
        assert!(!is_pingable(&client, Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn returns_false_when_nothing_is_listening() {
        let map = HashMap::from([
            ("host".to_owned(), "http://127.0.0.1:1".to_owned()),
            ("user".to_owned(), "alice".to_owned()),
            ("password".to_owned(), "secret".to_owned()),
        ]);
        let client = ServerClient::new(&Config::from_map(&map).unwrap());
        assert!(!is_pingable(&client, Duration::from_secs(2)).await);
    }
}
