//! Error types for the unsealer.
//!
//! Bootstrap errors (`ConfigError`, `CredentialError`) and directory errors are
//! fatal. Probe and actuation errors are scoped to a single instance and only
//! cause that instance to be skipped for the current cycle.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::InstanceAddress;

/// Invalid or missing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("{key} must be an integer, got {value:?}")]
    InvalidInteger { key: &'static str, value: String },

    #[error("{key} is out of range: {detail}")]
    OutOfRange { key: &'static str, detail: String },
}

/// Credential files that could not be loaded.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is empty")]
    Empty { path: PathBuf },
}

/// Failure to resolve the vault service to instance addresses.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("endpoints lookup for {service} failed: {source}")]
    Request {
        service: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("endpoints lookup for {service} returned {status}: {body}")]
    Status {
        service: String,
        status: u16,
        body: String,
    },

    #[error("endpoints for {service} could not be decoded: {source}")]
    Decode {
        service: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("service {service} has no ready addresses")]
    NoAddresses { service: String },
}

/// Failure to read an instance's seal status.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("seal-status request to {address} timed out after {after:?}")]
    Timeout {
        address: InstanceAddress,
        after: Duration,
    },

    #[error("seal-status request to {address} failed: {source}")]
    Transport {
        address: InstanceAddress,
        #[source]
        source: reqwest::Error,
    },

    #[error("seal-status request to {address} returned {status}: {body}")]
    Status {
        address: InstanceAddress,
        status: u16,
        body: String,
    },

    #[error("seal-status from {address} could not be decoded: {source}")]
    Decode {
        address: InstanceAddress,
        #[source]
        source: serde_json::Error,
    },
}

impl ProbeError {
    /// Address of the instance that failed.
    pub fn address(&self) -> &InstanceAddress {
        match self {
            ProbeError::Timeout { address, .. }
            | ProbeError::Transport { address, .. }
            | ProbeError::Status { address, .. }
            | ProbeError::Decode { address, .. } => address,
        }
    }
}

/// Failure to submit the unseal key to an instance.
#[derive(Debug, Error)]
pub enum ActuationError {
    #[error("unseal request to {address} timed out after {after:?}")]
    Timeout {
        address: InstanceAddress,
        after: Duration,
    },

    #[error("unseal request to {address} failed: {source}")]
    Transport {
        address: InstanceAddress,
        #[source]
        source: reqwest::Error,
    },

    #[error("unseal request to {address} rejected with {status}: {body}")]
    Rejected {
        address: InstanceAddress,
        status: u16,
        body: String,
    },
}

impl ActuationError {
    /// Address of the instance that failed.
    pub fn address(&self) -> &InstanceAddress {
        match self {
            ActuationError::Timeout { address, .. }
            | ActuationError::Transport { address, .. }
            | ActuationError::Rejected { address, .. } => address,
        }
    }
}

/// Conditions that stop the reconciliation loop.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("directory lookup failed after {attempts} attempt(s): {source}")]
    Directory {
        attempts: u32,
        #[source]
        source: DirectoryError,
    },
}
