//! An HTTP adapter that exchanges a device fingerprint for a segment configuration.

use std::sync::mpsc::Sender;

use reqwest::Url;

use crate::{DeviceFingerprint, Error, Result};

/// Default settings-server endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://test-auto-tune.uca.cloud.unity3d.com";

const SETTINGS_PATH: &str = "/v1/settings";

/// Configuration for [`FetchClient`].
#[derive(Debug, Clone)]
pub struct FetchClientConfig {
    /// Base URL of the settings server.
    pub endpoint: String,
    /// Accept endpoint certificates that fail validation.
    ///
    /// Defaults to `true` because the experimental settings service runs behind a certificate
    /// the default trust store rejects. This is a policy for that private endpoint, not a
    /// general recommendation; deployments pointing at a properly certified endpoint should
    /// disable it.
    pub accept_invalid_certs: bool,
}

impl Default for FetchClientConfig {
    fn default() -> FetchClientConfig {
        FetchClientConfig {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            accept_invalid_certs: true,
        }
    }
}

impl FetchClientConfig {
    /// Create a new `FetchClientConfig` using the default endpoint.
    pub fn new() -> FetchClientConfig {
        FetchClientConfig::default()
    }

    /// Override the settings-server endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> FetchClientConfig {
        self.endpoint = endpoint.into();
        self
    }

    /// Override the relaxed certificate policy.
    pub fn with_accept_invalid_certs(mut self, accept: bool) -> FetchClientConfig {
        self.accept_invalid_certs = accept;
        self
    }
}

/// Completion signal of a single fetch attempt. Exactly one of these is delivered per
/// [`FetchClient::fetch`] call.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The exchange completed with a 2xx status; `raw_json` is the unparsed response body.
    Success {
        /// Raw response body, handed to the engine for parsing.
        raw_json: String,
    },
    /// The exchange failed (connection, TLS, non-2xx status, or body read).
    Error(Error),
    /// The transport aborted without completing the exchange.
    Cancelled,
}

/// A client that exchanges a [`DeviceFingerprint`] for a raw segment-configuration response.
///
/// Single-attempt: no internal retry and no timeout beyond the transport default. A stalled
/// request simply never completes and no outcome is ever sent; the engine makes that observable
/// through its time-since-fetch-start accessor but does not recover it.
pub struct FetchClient {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::Client,
    url: Url,
}

impl FetchClient {
    /// Creates a fetch client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] if the endpoint does not parse as a URL, or a network
    /// error if the TLS backend fails to initialize.
    pub fn new(config: FetchClientConfig) -> Result<FetchClient> {
        let url = Url::parse(&config.endpoint)
            .and_then(|base| base.join(SETTINGS_PATH))
            .map_err(Error::InvalidEndpoint)?;

        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(FetchClient { client, url })
    }

    /// Starts one asynchronous fetch.
    ///
    /// Spawns a worker thread that POSTs the JSON-encoded fingerprint to
    /// `{endpoint}/v1/settings` and sends exactly one [`FetchOutcome`] on `completion`. Returns
    /// as soon as the worker is spawned; the caller's poll loop drains the channel.
    pub fn fetch(
        &self,
        fingerprint: DeviceFingerprint,
        completion: Sender<FetchOutcome>,
    ) -> Result<()> {
        let client = self.client.clone();
        let url = self.url.clone();

        std::thread::Builder::new()
            .name("autotune-fetch".to_owned())
            .spawn(move || {
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    run_exchange(&client, url, &fingerprint)
                }))
                // A panic inside the transport stack means the request was torn down without
                // completing; report it as a cancellation.
                .unwrap_or(FetchOutcome::Cancelled);

                // Error means the receiving engine was dropped; nothing useful to do with the
                // outcome in that case.
                let _ = completion.send(outcome);
            })?;

        Ok(())
    }
}

fn run_exchange(client: &reqwest::Client, url: Url, fingerprint: &DeviceFingerprint) -> FetchOutcome {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => return FetchOutcome::Error(Error::from(err)),
    };

    log::debug!(target: "autotune", "sending segment request to {}", url);
    let result = runtime.block_on(async {
        let response = client
            .post(url)
            .json(fingerprint)
            .send()
            .await?
            .error_for_status()?;
        response.text().await
    });

    match result {
        Ok(raw_json) => {
            log::debug!(target: "autotune", "segment response payload: {}", raw_json);
            FetchOutcome::Success { raw_json }
        }
        Err(err) => {
            log::warn!(target: "autotune", "segment request failed: {:?}", err);
            FetchOutcome::Error(Error::from(err))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;
    use crate::device::UnknownDeviceInfo;

    fn fingerprint() -> DeviceFingerprint {
        DeviceFingerprint::build(&UnknownDeviceInfo, "sheet", "build")
    }

    #[test]
    fn delivers_success_with_raw_body() {
        let mut server = mockito::Server::new();
        let body = r#"{"segment_id":"abc","group":7,"params":[]}"#;
        let mock = server
            .mock("POST", "/v1/settings")
            .match_header("content-type", "application/json")
            .with_status(200)
            .with_body(body)
            .create();

        let client =
            FetchClient::new(FetchClientConfig::new().with_endpoint(server.url())).unwrap();
        let (tx, rx) = mpsc::channel();
        client.fetch(fingerprint(), tx).unwrap();

        let outcome = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        match outcome {
            FetchOutcome::Success { raw_json } => assert_eq!(raw_json, body),
            other => panic!("expected success, got {:?}", other),
        }
        mock.assert();
    }

    #[test]
    fn delivers_error_on_server_failure() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/v1/settings")
            .with_status(500)
            .create();

        let client =
            FetchClient::new(FetchClientConfig::new().with_endpoint(server.url())).unwrap();
        let (tx, rx) = mpsc::channel();
        client.fetch(fingerprint(), tx).unwrap();

        let outcome = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(matches!(outcome, FetchOutcome::Error(Error::Network(_))));
    }

    #[test]
    fn rejects_unparseable_endpoint() {
        let result = FetchClient::new(FetchClientConfig::new().with_endpoint("not a url"));
        assert!(matches!(result, Err(Error::InvalidEndpoint(_))));
    }
}
