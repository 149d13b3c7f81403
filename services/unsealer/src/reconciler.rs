//! Reconciliation loop that keeps vault instances unsealed.
//!
//! Each cycle:
//! - Resolves the vault service to its current addresses (fatal on failure)
//! - Probes every address for its seal status
//! - Submits the unseal key to instances that reported sealed
//!
//! Per-instance failures are logged and skipped; the next cycle is the retry.
//! Cycles keep no memory of previous cycles.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::credentials::UnsealKey;
use crate::directory::ServiceDirectory;
use crate::error::{ActuationError, DirectoryError, ProbeError, ReconcileError};
use crate::types::InstanceAddress;
use crate::vault::{Ack, VaultApi};

/// Reconciliation loop configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Service to resolve each cycle.
    pub service_name: String,

    /// Sleep between the end of a cycle and the next discovery.
    pub refresh_interval: Duration,

    /// Maximum instances probed/unsealed concurrently.
    pub max_concurrency: usize,

    /// Extra discovery attempts before giving up.
    pub directory_retries: u32,

    /// Delay between discovery attempts.
    pub directory_retry_delay: Duration,
}

impl From<&Config> for ReconcilerConfig {
    fn from(config: &Config) -> Self {
        Self {
            service_name: config.service_name.clone(),
            refresh_interval: config.refresh_interval,
            max_concurrency: config.max_concurrency,
            directory_retries: config.directory_retries,
            directory_retry_delay: config.directory_retry_delay,
        }
    }
}

/// What happened to one instance during a cycle.
#[derive(Debug)]
pub enum InstanceOutcome {
    /// Instance was sealed and accepted the unseal key.
    Unsealed(Ack),

    /// Instance reported unsealed; nothing was sent.
    AlreadyUnsealed,

    /// Seal status could not be read; instance skipped this cycle.
    ProbeFailed(ProbeError),

    /// Instance was sealed but the unseal submission failed.
    UnsealFailed(ActuationError),
}

/// Outcome for a single address.
#[derive(Debug)]
pub struct InstanceReport {
    pub address: InstanceAddress,
    pub outcome: InstanceOutcome,
}

/// Result of one full pass over the discovered addresses.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub instances: Vec<InstanceReport>,
}

impl CycleReport {
    fn count(&self, pred: impl Fn(&InstanceOutcome) -> bool) -> usize {
        self.instances.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn unsealed(&self) -> usize {
        self.count(|o| matches!(o, InstanceOutcome::Unsealed(_)))
    }

    pub fn already_unsealed(&self) -> usize {
        self.count(|o| matches!(o, InstanceOutcome::AlreadyUnsealed))
    }

    pub fn probe_failures(&self) -> usize {
        self.count(|o| matches!(o, InstanceOutcome::ProbeFailed(_)))
    }

    pub fn unseal_failures(&self) -> usize {
        self.count(|o| matches!(o, InstanceOutcome::UnsealFailed(_)))
    }

    /// Outcome recorded for `address`, if it was part of the cycle.
    pub fn outcome(&self, address: &InstanceAddress) -> Option<&InstanceOutcome> {
        self.instances
            .iter()
            .find(|r| &r.address == address)
            .map(|r| &r.outcome)
    }
}

/// Drives discovery, probing and unsealing on a fixed cadence.
pub struct Reconciler {
    directory: Arc<dyn ServiceDirectory>,
    vault: Arc<dyn VaultApi>,
    key: UnsealKey,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(
        config: ReconcilerConfig,
        directory: Arc<dyn ServiceDirectory>,
        vault: Arc<dyn VaultApi>,
        key: UnsealKey,
    ) -> Self {
        Self {
            directory,
            vault,
            key,
            config,
        }
    }

    /// Run cycles until shutdown or a fatal discovery failure.
    ///
    /// Shutdown is honored at any point, abandoning an in-flight cycle.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), ReconcileError> {
        info!(
            service = %self.config.service_name,
            refresh_interval_secs = self.config.refresh_interval.as_secs(),
            max_concurrency = self.config.max_concurrency,
            directory_retries = self.config.directory_retries,
            "Starting reconciliation loop"
        );

        loop {
            if *shutdown.borrow() {
                info!("Reconciler shutting down");
                return Ok(());
            }

            // Shutdown may arrive mid-cycle, including during discovery back-off.
            let cycle = tokio::select! {
                result = self.run_cycle() => result,
                _ = shutdown_requested(&mut shutdown) => {
                    info!("Reconciler shutting down during cycle");
                    return Ok(());
                }
            };

            if let Err(e) = cycle {
                error!(error = %e, "Vault service discovery failed, stopping");
                return Err(e);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.refresh_interval) => {}
                _ = shutdown_requested(&mut shutdown) => {
                    info!("Reconciler shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Perform a single reconciliation pass.
    pub async fn run_cycle(&self) -> Result<CycleReport, ReconcileError> {
        let addresses = self.discover().await?;
        debug!(address_count = addresses.len(), "Starting reconciliation cycle");

        let instances = stream::iter(addresses)
            .map(|address| self.reconcile_instance(address))
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        let report = CycleReport { instances };
        info!(
            instances = report.instances.len(),
            unsealed = report.unsealed(),
            already_unsealed = report.already_unsealed(),
            probe_failures = report.probe_failures(),
            unseal_failures = report.unseal_failures(),
            "Vault unseal actions complete"
        );

        Ok(report)
    }

    /// Resolve the service, retrying up to the configured limit.
    async fn discover(&self) -> Result<Vec<InstanceAddress>, ReconcileError> {
        let service = &self.config.service_name;
        let max_attempts = self.config.directory_retries.saturating_add(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let failure = match self.directory.resolve(service).await {
                Ok(addresses) if !addresses.is_empty() => return Ok(dedup(addresses)),
                Ok(_) => DirectoryError::NoAddresses {
                    service: service.clone(),
                },
                Err(e) => e,
            };

            if attempt >= max_attempts {
                return Err(ReconcileError::Directory {
                    attempts: attempt,
                    source: failure,
                });
            }

            warn!(
                service = %service,
                attempt,
                max_attempts,
                error = %failure,
                "Vault service discovery failed, will retry"
            );
            tokio::time::sleep(self.config.directory_retry_delay).await;
        }
    }

    /// Probe one instance and unseal it if it reported sealed.
    async fn reconcile_instance(&self, address: InstanceAddress) -> InstanceReport {
        let status = match self.vault.seal_status(&address).await {
            Ok(status) => status,
            Err(e) => {
                warn!(
                    address = %address,
                    phase = "probe",
                    error = %e,
                    "Failed to fetch seal status, skipping instance this cycle"
                );
                return InstanceReport {
                    address,
                    outcome: InstanceOutcome::ProbeFailed(e),
                };
            }
        };

        if !status.sealed {
            info!(
                address = %address,
                phase = "probe",
                "Vault instance is already unsealed"
            );
            return InstanceReport {
                address,
                outcome: InstanceOutcome::AlreadyUnsealed,
            };
        }

        if !status.initialized {
            warn!(
                address = %address,
                phase = "probe",
                "Vault instance is sealed and not initialized, unseal will likely be rejected"
            );
        }
        debug!(
            address = %address,
            phase = "probe",
            threshold = status.threshold,
            shares = status.shares,
            progress = status.progress,
            "Vault instance is sealed"
        );

        let outcome = match self.vault.unseal(&address, &self.key).await {
            Ok(ack) => {
                info!(
                    address = %address,
                    phase = "unseal",
                    status = ack.status,
                    still_sealed = ?ack.still_sealed(),
                    "Sent unseal request"
                );
                InstanceOutcome::Unsealed(ack)
            }
            Err(e) => {
                warn!(
                    address = %address,
                    phase = "unseal",
                    error = %e,
                    "Failed to unseal instance"
                );
                InstanceOutcome::UnsealFailed(e)
            }
        };

        InstanceReport { address, outcome }
    }
}

/// Resolves once shutdown has been signalled. Never resolves if the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn dedup(addresses: Vec<InstanceAddress>) -> Vec<InstanceAddress> {
    let mut seen = HashSet::new();
    addresses
        .into_iter()
        .filter(|a| seen.insert(a.clone()))
        .collect()
}
