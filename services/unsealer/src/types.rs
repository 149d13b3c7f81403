//! Core data types shared by the directory, vault client and reconciler.

use std::fmt;
use std::net::Ipv6Addr;

use serde::{Deserialize, Serialize};

/// Address of one vault instance, as reported by the cluster directory.
///
/// Recomputed every cycle; two instances with the same address in consecutive
/// cycles are the same target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceAddress(String);

impl InstanceAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Host portion suitable for a URL authority (IPv6 literals are bracketed).
    pub fn url_host(&self) -> String {
        match self.0.parse::<Ipv6Addr>() {
            Ok(_) => format!("[{}]", self.0),
            Err(_) => self.0.clone(),
        }
    }

    /// Base URL of the instance's HTTP API on `port`.
    pub fn base_url(&self, port: u16) -> String {
        format!("http://{}:{}", self.url_host(), port)
    }
}

impl fmt::Display for InstanceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceAddress {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Snapshot of an instance's `/v1/sys/seal-status` response.
///
/// `t`, `n` and `progress` describe threshold unsealing and are informational
/// only; a single full key is always submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealStatus {
    #[serde(rename = "type", default)]
    pub seal_type: String,
    #[serde(default)]
    pub initialized: bool,
    pub sealed: bool,
    #[serde(rename = "t", default)]
    pub threshold: u32,
    #[serde(rename = "n", default)]
    pub shares: u32,
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub build_date: String,
    #[serde(default)]
    pub migration: bool,
    #[serde(default)]
    pub recovery_seal: bool,
    #[serde(default)]
    pub storage_type: String,
}
