//! Error taxonomy for the deployment engine.

use std::path::PathBuf;

use alloy_core::primitives::{Address, B256};

use crate::version::Version;

/// Result alias used across the crate.
pub type Result<T, E = ScrError> = std::result::Result<T, E>;

/// Errors surfaced by the registry, trust, admin and orchestration layers.
///
/// Local precondition failures (versions, names, missing records) are raised before any
/// mutating remote call is issued. Remote failures are fatal for the current operation.
#[derive(Debug, thiserror::Error)]
pub enum ScrError {
    #[error("malformed version '{0}', expected two zero-padded groups like '01.00'")]
    MalformedVersion(String),

    #[error("version {version} is above the maximum supported version {max}")]
    VersionOutOfRange { version: Version, max: Version },

    #[error("version {requested} must be greater than the current version {previous}")]
    VersionNotMonotonic { previous: Version, requested: Version },

    #[error("record '{name}' not found for admin {admin}")]
    RecordNotFound { name: String, admin: Address },

    #[error("record name '{0}' does not fit in 31 bytes")]
    NameTooLong(String),

    #[error("contract at {address} is not a known ProxyAdmin: {reason}")]
    UntrustedAdminContract { address: Address, reason: String },

    #[error("deployment aborted: {0}")]
    DeploymentAborted(String),

    #[error("transaction {} failed: {reason}", tx_hash.map(|h| h.to_string()).unwrap_or_else(|| "<unsent>".to_string()))]
    TransactionFailed { tx_hash: Option<B256>, reason: String },

    #[error("registration of '{name}' failed")]
    RegistrationFailed {
        name: String,
        #[source]
        source: Box<ScrError>,
    },

    #[error(
        "upgrade of proxy {proxy} not verified: previous logic {previous}, expected {expected}, found {actual}"
    )]
    UpgradeVerificationFailed {
        proxy: Address,
        previous: Address,
        expected: Address,
        actual: Address,
    },

    #[error("proxy {proxy} is administered by {actual}, expected {expected}")]
    ProxyAdminMismatch {
        proxy: Address,
        expected: Address,
        actual: Address,
    },

    #[error("manifest I/O error on {}", path.display())]
    ManifestIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest {} is not valid JSON", path.display())]
    ManifestFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no deployment found for proxy {0} on this network")]
    ProxyNotFound(Address),

    #[error("deployment at {0} is not upgradeable")]
    NotUpgradeable(Address),

    #[error("artifact error: {0}")]
    Artifact(String),

    #[error("ABI error: {0}")]
    AbiEncoding(String),

    #[error("trust duration of {0}s is outside the accepted range")]
    TrustDurationOutOfRange(u64),

    #[error("code at {code} is still not trusted by {truster}")]
    TrustNotGranted { code: Address, truster: Address },

    #[error("missing configuration: {0}")]
    MissingConfig(&'static str),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Rpc(#[from] anyhow::Error),
}

impl ScrError {
    /// Build a [`ScrError::TransactionFailed`] from any displayable reason.
    pub fn tx_failed(tx_hash: Option<B256>, reason: impl std::fmt::Display) -> Self {
        Self::TransactionFailed {
            tx_hash,
            reason: reason.to_string(),
        }
    }
}
