//! Engine configuration.
//!
//! Values come from, in increasing priority: built-in defaults, a TOML file, and `SCR_`
//! prefixed environment variables (`__` separates nested keys, e.g.
//! `SCR_CONTRACTS__CONTRACT_REGISTRY`).

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use alloy_core::primitives::Address;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    artifact::ArtifactStore,
    context::{ExecutionContext, GasOptions, Network},
    error::{Result, ScrError},
    ledger::Ledger,
    manifest::{DEFAULT_MANIFEST_FILE, ManifestStore},
    rpc::{ReceiptPolling, RpcLedger},
    trust::DEFAULT_TRUST_DURATION,
    version::Version,
};

/// Default configuration file name.
pub const CONFIG_FILENAME: &str = "scr.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "SCR_";

/// Target network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub rpc_url: Url,
    /// When set, the node's chain id must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "localhost".to_string(),
            rpc_url: Url::parse("http://127.0.0.1:8545").expect("static URL is valid"),
            chain_id: None,
        }
    }
}

/// Addresses of the shared services deployed once per network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemContracts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_registry: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_trust: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_deployer: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgradeable_deployer: Option<Address>,
    /// Proxy admin used for new upgradeable deployments when none is given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_admin: Option<Address>,
}

impl SystemContracts {
    pub fn registry(&self) -> Result<Address> {
        self.contract_registry
            .ok_or(ScrError::MissingConfig("contracts.contract_registry"))
    }

    pub fn code_trust(&self) -> Result<Address> {
        self.code_trust
            .ok_or(ScrError::MissingConfig("contracts.code_trust"))
    }

    pub fn contract_deployer(&self) -> Result<Address> {
        self.contract_deployer
            .ok_or(ScrError::MissingConfig("contracts.contract_deployer"))
    }

    pub fn upgradeable_deployer(&self) -> Result<Address> {
        self.upgradeable_deployer
            .ok_or(ScrError::MissingConfig("contracts.upgradeable_deployer"))
    }
}

/// Full engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrConfig {
    pub network: NetworkConfig,
    /// Node-managed account transactions are sent from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<Address>,
    pub manifest_path: PathBuf,
    pub artifacts_dir: PathBuf,
    #[serde(default)]
    pub contracts: SystemContracts,
    pub trust_duration_secs: u64,
    pub max_version: Version,
    #[serde(default)]
    pub gas: GasOptions,
    pub receipt_polling: ReceiptPolling,
}

impl Default for ScrConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            signer: None,
            manifest_path: PathBuf::from(DEFAULT_MANIFEST_FILE),
            artifacts_dir: PathBuf::from("artifacts"),
            contracts: SystemContracts::default(),
            trust_duration_secs: DEFAULT_TRUST_DURATION.as_secs(),
            max_version: Version::MAX,
            gas: GasOptions::default(),
            receipt_polling: ReceiptPolling::default(),
        }
    }
}

impl ScrConfig {
    /// Load defaults, then `path` if it exists, then the environment.
    pub fn load(path: &Path) -> Result<Self> {
        Self::figment(path)
            .extract()
            .map_err(|e| ScrError::Config(e.to_string()))
    }

    fn figment(path: &Path) -> Figment {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No configuration file, using defaults and environment");
        }

        Figment::from(Serialized::defaults(ScrConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Save the configuration as TOML.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ScrError::Config(format!("failed to serialize configuration: {e}")))?;
        std::fs::write(path, content).map_err(|e| {
            ScrError::Config(format!("failed to write {}: {e}", path.display()))
        })?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    pub fn trust_duration(&self) -> Duration {
        Duration::from_secs(self.trust_duration_secs)
    }

    pub fn signer(&self) -> Result<Address> {
        self.signer.ok_or(ScrError::MissingConfig("signer"))
    }

    pub fn artifacts(&self) -> ArtifactStore {
        ArtifactStore::new(&self.artifacts_dir)
    }

    pub fn manifest(&self, network: Network) -> ManifestStore {
        ManifestStore::new(&self.manifest_path, network)
    }

    /// Build an execution context over JSON-RPC.
    pub async fn connect(&self) -> Result<ExecutionContext<RpcLedger>> {
        let ledger = RpcLedger::new(self.network.rpc_url.clone())?.polling(self.receipt_polling);
        self.context_for(ledger).await
    }

    /// Build an execution context over any ledger, checking the chain id.
    pub async fn context_for<L: Ledger>(&self, ledger: L) -> Result<ExecutionContext<L>> {
        let signer = self.signer()?;
        let chain_id = ledger.chain_id().await?;

        match self.network.chain_id {
            Some(expected) if expected != chain_id => {
                return Err(ScrError::Config(format!(
                    "network '{}' expects chain id {} but the node reports {}",
                    self.network.name, expected, chain_id
                )));
            }
            _ => {}
        }

        let network = Network::new(self.network.name.clone(), chain_id);
        tracing::info!(network = %network, signer = %signer, "Connected");
        Ok(ExecutionContext::new(network, ledger, signer).with_gas(self.gas))
    }
}
