//! Cluster directory lookups.
//!
//! Resolves the vault service name to the addresses currently backing it by
//! reading the service's `Endpoints` object from the cluster API.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::credentials::ServiceAccount;
use crate::error::DirectoryError;
use crate::types::InstanceAddress;

/// Resolves a service name to its instance addresses.
#[async_trait]
pub trait ServiceDirectory: Send + Sync {
    /// Current addresses for `service`. An empty set is an error.
    async fn resolve(&self, service: &str) -> Result<Vec<InstanceAddress>, DirectoryError>;
}

/// Directory backed by the cluster API's core/v1 Endpoints resource.
pub struct EndpointsDirectory {
    client: reqwest::Client,
    base_url: String,
    namespace: String,
    token: String,
}

impl EndpointsDirectory {
    /// Create a client for `api_server` authenticated as `account`.
    ///
    /// The service-account CA is trusted when present; otherwise certificate
    /// verification is disabled, matching an in-cluster client without a CA.
    pub fn new(
        api_server: &str,
        account: &ServiceAccount,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout);

        builder = match &account.ca_pem {
            Some(pem) => builder.add_root_certificate(reqwest::Certificate::from_pem(pem)?),
            None => {
                warn!("No cluster CA found, skipping TLS verification for the cluster API");
                builder.danger_accept_invalid_certs(true)
            }
        };

        Ok(Self {
            client: builder.build()?,
            base_url: api_server.trim_end_matches('/').to_string(),
            namespace: account.namespace.clone(),
            token: account.token.clone(),
        })
    }
}

#[async_trait]
impl ServiceDirectory for EndpointsDirectory {
    async fn resolve(&self, service: &str) -> Result<Vec<InstanceAddress>, DirectoryError> {
        let url = format!(
            "{}/api/v1/namespaces/{}/endpoints/{}",
            self.base_url, self.namespace, service
        );
        debug!(url = %url, "Fetching service endpoints");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| DirectoryError::Request {
                service: service.to_string(),
                source,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| DirectoryError::Request {
                service: service.to_string(),
                source,
            })?;

        if !status.is_success() {
            return Err(DirectoryError::Status {
                service: service.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let endpoints: Endpoints =
            serde_json::from_str(&body).map_err(|source| DirectoryError::Decode {
                service: service.to_string(),
                source,
            })?;

        let addresses = endpoints.ready_addresses();
        if addresses.is_empty() {
            return Err(DirectoryError::NoAddresses {
                service: service.to_string(),
            });
        }

        debug!(
            service,
            address_count = addresses.len(),
            "Resolved service endpoints"
        );
        Ok(addresses)
    }
}

/// The subset of a core/v1 Endpoints object the unsealer reads.
#[derive(Debug, Deserialize)]
struct Endpoints {
    #[serde(default)]
    subsets: Vec<EndpointSubset>,
}

#[derive(Debug, Deserialize)]
struct EndpointSubset {
    #[serde(default)]
    addresses: Vec<EndpointAddress>,
}

#[derive(Debug, Deserialize)]
struct EndpointAddress {
    ip: String,
}

impl Endpoints {
    /// Ready addresses across every subset, de-duplicated in first-seen order.
    fn ready_addresses(&self) -> Vec<InstanceAddress> {
        let mut seen = HashSet::new();
        self.subsets
            .iter()
            .flat_map(|subset| subset.addresses.iter())
            .filter(|address| !address.ip.is_empty())
            .filter(|address| seen.insert(address.ip.clone()))
            .map(|address| InstanceAddress::new(address.ip.as_str()))
            .collect()
    }
}
