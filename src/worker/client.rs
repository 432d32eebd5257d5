//! Coordinator transport
//!
//! The `CoordinatorClient` trait is the seam between the orchestrator and
//! the wire; `RestClient` is the blocking HTTP implementation speaking the
//! coordinator's JSON protocol.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;

use super::wire::{CapabilityReport, Sequence, SequenceId, WorkPackage, WorkResult, WorkerId};

/// Transport operation result type
pub type ClientResult<T> = Result<T, ClientError>;

/// Error types for coordinator transport
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("coordinator does not know this worker")]
    UnknownWorker,

    #[error("unexpected coordinator response status {0}")]
    UnexpectedStatus(u16),
}

/// Operations the coordinator exposes to a worker.
pub trait CoordinatorClient: Send + Sync {
    /// Register this worker; returns the coordinator-issued identity.
    fn register(&self, report: &CapabilityReport) -> ClientResult<WorkerId>;

    /// Ask for a work package. `None` means no work is available.
    fn poll_work(&self, worker: &WorkerId) -> ClientResult<Option<WorkPackage>>;

    /// Fetch one sequence of a package that was handed out without inlined
    /// sequence data.
    fn fetch_sequence(
        &self,
        package_id: &str,
        sequence: &SequenceId,
        worker: &WorkerId,
    ) -> ClientResult<Sequence>;

    /// Submit one batch of results for a package.
    fn submit_results(&self, package_id: &str, results: &WorkResult) -> ClientResult<()>;

    /// Liveness ping. `Err(ClientError::UnknownWorker)` means the
    /// coordinator dropped this worker.
    fn heartbeat(&self, worker: &WorkerId) -> ClientResult<()>;
}

/// Blocking REST client for the coordinator protocol.
pub struct RestClient {
    base_url: String,
    client: Client,
}

impl RestClient {
    /// Build a client with a fixed per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> ClientResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

impl CoordinatorClient for RestClient {
    fn register(&self, report: &CapabilityReport) -> ClientResult<WorkerId> {
        let url = format!("{}/worker/register", self.base_url);
        let response = self
            .client
            .post(url)
            .json(report)
            .send()?
            .error_for_status()?;
        Ok(response.json()?)
    }

    fn poll_work(&self, worker: &WorkerId) -> ClientResult<Option<WorkPackage>> {
        let url = format!("{}/work/", self.base_url);
        let response = self
            .client
            .post(url)
            .json(worker)
            .send()?
            .error_for_status()?;
        Ok(response.json()?)
    }

    fn fetch_sequence(
        &self,
        package_id: &str,
        sequence: &SequenceId,
        worker: &WorkerId,
    ) -> ClientResult<Sequence> {
        let url = format!(
            "{}/work/{}/sequence/{}/{}",
            self.base_url, package_id, sequence, worker.id
        );
        let response = self.client.get(url).send()?.error_for_status()?;
        Ok(response.json()?)
    }

    fn submit_results(&self, package_id: &str, results: &WorkResult) -> ClientResult<()> {
        let url = format!("{}/work/{}/result", self.base_url, package_id);
        self.client
            .post(url)
            .json(results)
            .send()?
            .error_for_status()?;
        Ok(())
    }

    fn heartbeat(&self, worker: &WorkerId) -> ClientResult<()> {
        let url = format!("{}/worker/pulse", self.base_url);
        let response = self.client.post(url).json(worker).send()?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(ClientError::UnknownWorker),
            status if status.is_success() => Ok(()),
            status => Err(ClientError::UnexpectedStatus(status.as_u16())),
        }
    }
}
