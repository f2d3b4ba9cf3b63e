//! Outbound delivery of beacons to the collection endpoint.
//!
//! The tracker hands each serialized payload to a [`Transport`] and moves on.
//! [`HttpTransport`] posts it on the ambient tokio runtime without the caller
//! waiting; [`CaptureTransport`] keeps it in memory for tests.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use toolbird_core::{TrackerError, TrackerResult};

/// Default per-request timeout for [`HttpTransport`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A JSON body bound for one collector URL.
#[derive(Debug, Clone, PartialEq)]
pub struct BeaconRequest {
    pub url: String,
    pub body: serde_json::Value,
}

/// Fire-and-forget delivery. Implementations must return promptly and must
/// not report failures back to the caller.
pub trait Transport: Send + Sync {
    fn dispatch(&self, request: BeaconRequest);
}

/// Posts beacons as `application/json` with reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
    in_flight: Mutex<JoinSet<()>>,
}

impl HttpTransport {
    pub fn new() -> TrackerResult<Self> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> TrackerResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            in_flight: Mutex::new(JoinSet::new()),
        })
    }

    /// Wait for every request dispatched so far. Only needed by short-lived
    /// hosts (such as a CLI) that would otherwise exit mid-request.
    pub async fn drain(&self) {
        let mut pending = std::mem::take(&mut *self.in_flight.lock());
        while pending.join_next().await.is_some() {}
    }

    /// Number of requests spawned and not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }
}

impl Transport for HttpTransport {
    fn dispatch(&self, request: BeaconRequest) {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                let err = TrackerError::NoRuntime(request.url);
                warn!(error = %err, "beacon dropped");
                return;
            }
        };

        let mut in_flight = self.in_flight.lock();
        while in_flight.try_join_next().is_some() {}
        in_flight.spawn_on(post(self.client.clone(), request), &handle);
    }
}

async fn post(client: reqwest::Client, request: BeaconRequest) {
    let result = client
        .post(&request.url)
        .json(&request.body)
        .send()
        .await
        .map_err(TrackerError::from);

    match result {
        Ok(response) if response.status().is_success() => {
            debug!(url = %request.url, status = %response.status(), "beacon delivered");
        }
        Ok(response) => {
            debug!(url = %request.url, status = %response.status(), "collector rejected beacon");
        }
        Err(e) => {
            debug!(url = %request.url, error = %e, "beacon delivery failed");
        }
    }
}

/// In-memory transport that records every beacon.
#[derive(Default)]
pub struct CaptureTransport {
    requests: Mutex<Vec<BeaconRequest>>,
}

impl CaptureTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<BeaconRequest> {
        self.requests.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Count beacons whose URL ends with `path`, e.g. `"/identify"`.
    pub fn count_path(&self, path: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url.ends_with(path))
            .count()
    }

    pub fn clear(&self) {
        self.requests.lock().clear();
    }
}

impl Transport for CaptureTransport {
    fn dispatch(&self, request: BeaconRequest) {
        self.requests.lock().push(request);
    }
}
