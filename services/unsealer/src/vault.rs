//! Vault HTTP API client.
//!
//! Two calls per instance:
//! - `GET /v1/sys/seal-status` to read the seal state
//! - `POST /v1/sys/unseal` to submit the unseal key
//!
//! Neither call retries; the next reconciliation cycle is the retry.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::credentials::UnsealKey;
use crate::error::{ActuationError, ProbeError};
use crate::types::{InstanceAddress, SealStatus};

/// Acknowledgement of an accepted unseal submission.
#[derive(Debug, Clone)]
pub struct Ack {
    /// HTTP status returned by the instance.
    pub status: u16,

    /// Raw response body. Informational only.
    pub body: String,

    /// Seal status echoed back by the instance, when it decodes.
    pub seal_status: Option<SealStatus>,
}

impl Ack {
    /// Whether the instance reported itself sealed after the submission.
    ///
    /// `None` when the response body was not a seal status.
    pub fn still_sealed(&self) -> Option<bool> {
        self.seal_status.as_ref().map(|s| s.sealed)
    }
}

/// Operations the reconciler performs against a single vault instance.
#[async_trait]
pub trait VaultApi: Send + Sync {
    /// Fetch the instance's current seal status.
    async fn seal_status(&self, address: &InstanceAddress) -> Result<SealStatus, ProbeError>;

    /// Submit the full unseal key.
    ///
    /// Safe to call on an instance that is already unsealed.
    async fn unseal(
        &self,
        address: &InstanceAddress,
        key: &UnsealKey,
    ) -> Result<Ack, ActuationError>;
}

#[derive(Serialize)]
struct UnsealRequest<'a> {
    key: &'a str,
}

/// `VaultApi` over plain HTTP.
pub struct HttpVaultClient {
    client: reqwest::Client,
    port: u16,
    timeout: Duration,
}

impl HttpVaultClient {
    /// Create a client for instances listening on `port`.
    pub fn new(port: u16, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            port,
            timeout,
        })
    }

    fn url(&self, address: &InstanceAddress, endpoint: &str) -> String {
        format!("{}/{}", address.base_url(self.port), endpoint)
    }
}

#[async_trait]
impl VaultApi for HttpVaultClient {
    async fn seal_status(&self, address: &InstanceAddress) -> Result<SealStatus, ProbeError> {
        let url = self.url(address, "v1/sys/seal-status");
        debug!(url = %url, "Fetching seal status");

        let transport = |source: reqwest::Error| {
            if source.is_timeout() {
                ProbeError::Timeout {
                    address: address.clone(),
                    after: self.timeout,
                }
            } else {
                ProbeError::Transport {
                    address: address.clone(),
                    source,
                }
            }
        };

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let body = response.text().await.map_err(transport)?;

        if !status.is_success() {
            return Err(ProbeError::Status {
                address: address.clone(),
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|source| ProbeError::Decode {
            address: address.clone(),
            source,
        })
    }

    async fn unseal(
        &self,
        address: &InstanceAddress,
        key: &UnsealKey,
    ) -> Result<Ack, ActuationError> {
        let url = self.url(address, "v1/sys/unseal");
        debug!(url = %url, "Submitting unseal key");

        let transport = |source: reqwest::Error| {
            if source.is_timeout() {
                ActuationError::Timeout {
                    address: address.clone(),
                    after: self.timeout,
                }
            } else {
                ActuationError::Transport {
                    address: address.clone(),
                    source,
                }
            }
        };

        let response = self
            .client
            .post(&url)
            .json(&UnsealRequest { key: key.expose() })
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let body = response.text().await.map_err(transport)?;

        if !status.is_success() {
            return Err(ActuationError::Rejected {
                address: address.clone(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(Ack {
            status: status.as_u16(),
            seal_status: serde_json::from_str(&body).ok(),
            body,
        })
    }
}
