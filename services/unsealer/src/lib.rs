//! Vault unsealer library.
//!
//! A long-running agent that keeps every vault instance behind a cluster
//! service unsealed. Each cycle it resolves the service to its backing
//! addresses, checks every instance's seal status, and submits the unseal key
//! to the ones that are sealed.
//!
//! ## Modules
//!
//! - `config`: env-driven configuration, read once at startup
//! - `credentials`: unseal key and service-account files
//! - `directory`: service name to instance address resolution
//! - `vault`: seal-status probe and unseal submission
//! - `reconciler`: the discovery/probe/unseal loop

pub mod config;
pub mod credentials;
pub mod directory;
pub mod error;
pub mod reconciler;
pub mod types;
pub mod vault;

// Re-export commonly used types
pub use config::Config;
pub use credentials::{ServiceAccount, UnsealKey};
pub use directory::{EndpointsDirectory, ServiceDirectory};
pub use reconciler::{CycleReport, InstanceOutcome, Reconciler, ReconcilerConfig};
pub use types::{InstanceAddress, SealStatus};
pub use vault::{Ack, HttpVaultClient, VaultApi};
