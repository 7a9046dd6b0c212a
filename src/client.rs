//! HTTP client talking to the SensorBase server.
//!
//! Mirrors the shape of the teacher's `Client` in `client.rs`: a thin,
//! cloneable wrapper around a connection object (there `Arc<Cluster>`, here
//! `reqwest::Client`) that turns domain calls into wire requests and maps
//! transport/protocol failures onto a dedicated error enum.

use std::time::Duration;

use reqwest::StatusCode;

use crate::config::Config;
use crate::record::Batch;
use crate::xml;

/// Hard timeout applied to the unauthenticated `/ping` liveness check,
/// independent of the configured request timeout. A ping exists to answer
/// "is the network up" quickly, not to wait out a slow server.
pub const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// The server's success status for an accepted sensor data batch.
const SENSORDATA_CREATED: StatusCode = StatusCode::CREATED;

/// Errors raised while talking to the SensorBase server.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request could not be sent or the connection was reset before a
    /// response was read.
    #[error("network error contacting server")]
    Network(#[from] reqwest::Error),

    /// The server responded `401 Unauthorized` or `403 Forbidden`.
    #[error("server rejected credentials")]
    Unauthorized,

    /// The server rejected the request body, `400 Bad Request`.
    #[error("server rejected request: {0}")]
    BadRequest(String),

    /// The server returned any other non-success status.
    #[error("server returned status {0}")]
    Server(StatusCode),

    /// The batch could not be encoded as XML.
    #[error("failed to encode batch")]
    Encode(#[from] xml::XmlError),
}

/// A cloneable handle to one SensorBase server, bound to one set of
/// credentials. `host` always ends in `/`, enforced by [`Config::from_map`].
#[derive(Clone, Debug)]
pub struct ServerClient {
    http: reqwest::Client,
    host: String,
    user: String,
    password: String,
}

impl ServerClient {
    /// Builds a client from a validated [`Config`].
    ///
    /// # Panics
    ///
    /// Panics if the underlying `reqwest` TLS backend fails to initialize,
    /// which only happens on a broken build environment.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("reqwest client builder should not fail with default TLS backend");

        Self {
            http,
            host: config.host.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
        }
    }

    fn ping_url(&self) -> String {
        format!("{}ping", self.host)
    }

    fn registration_url(&self) -> String {
        format!("{}users/{}", self.host, self.user)
    }

    fn sensordata_url(&self) -> String {
        format!("{}sensordata", self.host)
    }

    /// Hits the server's unauthenticated liveness endpoint, bounded by
    /// [`PING_TIMEOUT`] rather than the configured request timeout.
    pub async fn ping(&self) -> bool {
        let request = self.http.get(self.ping_url()).timeout(PING_TIMEOUT);
        matches!(request.send().await, Ok(response) if response.status().is_success())
    }

    /// Checks that the account named by `user`/`password` is registered on
    /// the server, using the client's configured request timeout.
    pub async fn is_registered(&self) -> bool {
        let request = self.http.get(self.registration_url()).basic_auth(&self.user, Some(&self.password));
        matches!(request.send().await, Ok(response) if response.status().is_success())
    }

    /// Uploads a batch of records as one `<SensorDatas>` document via `PUT
    /// host/sensordata`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Encode`] if the batch cannot be serialized,
    /// [`ClientError::Network`] on a transport failure, or one of
    /// [`ClientError::Unauthorized`], [`ClientError::BadRequest`],
    /// [`ClientError::Server`] depending on the response status. Only `201
    /// Created` counts as success.
    pub async fn put_batch(&self, batch: &Batch) -> Result<(), ClientError> {
        let body = xml::to_xml(batch)?;

        let response = self
            .http
            .put(self.sensordata_url())
            .basic_auth(&self.user, Some(&self.password))
            .header("Content-Type", "application/xml")
            .body(body)
            .send()
            .await?;

        match response.status() {
            SENSORDATA_CREATED => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ClientError::Unauthorized),
            StatusCode::BAD_REQUEST => {
                let text = response.text().await.unwrap_or_default();
                Err(ClientError::BadRequest(text))
            }
            status => Err(ClientError::Server(status)),
        }
    }
}
