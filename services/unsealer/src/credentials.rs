//! Credentials read from the local filesystem at startup.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CredentialError;

/// The vault unseal key. Opaque; never printed.
#[derive(Clone)]
pub struct UnsealKey(String);

impl UnsealKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Load the key from `path`, stripping a single trailing `\n`.
    ///
    /// The key is opaque, so any other trailing bytes (including `\r`) are kept.
    pub fn load(path: &Path) -> Result<Self, CredentialError> {
        read_trimmed(path, LineEnding::Lf).map(Self)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UnsealKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UnsealKey(<redacted>)")
    }
}

/// The agent's own cluster identity, as mounted by the cluster runtime.
#[derive(Clone)]
pub struct ServiceAccount {
    pub namespace: String,
    pub token: String,
    /// PEM bundle for the cluster API, when the runtime provides one.
    pub ca_pem: Option<Vec<u8>>,
}

impl ServiceAccount {
    /// Load `namespace`, `token` and (optionally) `ca.crt` from `dir`.
    pub fn load(dir: &Path) -> Result<Self, CredentialError> {
        let namespace = read_trimmed(&dir.join("namespace"), LineEnding::LfOrCrLf)?;
        let token = read_trimmed(&dir.join("token"), LineEnding::LfOrCrLf)?;

        let ca_path = dir.join("ca.crt");
        let ca_pem = match fs::read(&ca_path) {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(CredentialError::Read {
                    path: ca_path,
                    source,
                })
            }
        };

        Ok(Self {
            namespace,
            token,
            ca_pem,
        })
    }
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("namespace", &self.namespace)
            .field("token", &"<redacted>")
            .field("ca_pem", &self.ca_pem.as_ref().map(Vec::len))
            .finish()
    }
}

/// Trailing line ending removed from a credential file.
#[derive(Debug, Clone, Copy)]
enum LineEnding {
    Lf,
    LfOrCrLf,
}

fn read_trimmed(path: &Path, ending: LineEnding) -> Result<String, CredentialError> {
    let raw = fs::read_to_string(path).map_err(|source| CredentialError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let value = match ending {
        LineEnding::Lf => raw.strip_suffix('\n'),
        LineEnding::LfOrCrLf => raw
            .strip_suffix("\r\n")
            .or_else(|| raw.strip_suffix('\n')),
    }
    .unwrap_or(&raw);

    if value.is_empty() {
        return Err(CredentialError::Empty {
            path: PathBuf::from(path),
        });
    }

    Ok(value.to_string())
}
