//! Off-chain deployment manifest.
//!
//! The manifest is a single JSON document holding one [`NetworkDeployment`] per network. It is a
//! cache of what was deployed from this machine: the registry stays the source of truth, so an
//! entry missing here is tolerated while an entry for something that never reached the ledger is
//! not (entries are only written after the remote step succeeded).
//!
//! Every mutation is a full read-modify-write performed under an exclusive advisory lock on a
//! `<manifest>.lock` sidecar, and lands through a rename of `<manifest>.tmp` over the manifest.

use std::{
    ffi::OsString,
    fmt,
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    str::FromStr,
};

use alloy_core::primitives::{Address, B256};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::{
    context::Network,
    error::{Result, ScrError},
};

/// Default manifest file name.
pub const DEFAULT_MANIFEST_FILE: &str = "scr-deployments.json";

/// A single, immutable contract instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegularDeployment {
    pub contract_name: String,
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_tx_hash: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byte_code_hash: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// A proxy fronting a replaceable logic contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeDeployment {
    pub contract_name: String,
    pub admin: Address,
    pub proxy: Address,
    pub logic: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_deploy_tx_hash: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic_deploy_tx_hash: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_timestamp: Option<DateTime<Utc>>,
    /// Hash of the current logic's deployed code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byte_code_hash: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// A manifest contract entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ContractDeployment {
    Regular(RegularDeployment),
    Upgradeable(UpgradeDeployment),
}

impl ContractDeployment {
    pub fn contract_name(&self) -> &str {
        match self {
            Self::Regular(d) => &d.contract_name,
            Self::Upgradeable(d) => &d.contract_name,
        }
    }

    /// The proxy address, for upgradeable entries.
    pub fn proxy(&self) -> Option<Address> {
        match self {
            Self::Regular(_) => None,
            Self::Upgradeable(d) => Some(d.proxy),
        }
    }

    /// The address callers interact with: the proxy or the plain contract.
    pub fn public_address(&self) -> Address {
        match self {
            Self::Regular(d) => d.address,
            Self::Upgradeable(d) => d.proxy,
        }
    }
}

impl From<RegularDeployment> for ContractDeployment {
    fn from(deployment: RegularDeployment) -> Self {
        Self::Regular(deployment)
    }
}

impl From<UpgradeDeployment> for ContractDeployment {
    fn from(deployment: UpgradeDeployment) -> Self {
        Self::Upgradeable(deployment)
    }
}

/// How a caller designates a contract: by address or by contract name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractRef {
    Address(Address),
    Name(String),
}

impl FromStr for ContractRef {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.parse::<Address>() {
            Ok(address) => Self::Address(address),
            Err(_) => Self::Name(s.to_string()),
        })
    }
}

impl fmt::Display for ContractRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(address) => write!(f, "{address}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// Everything known about one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDeployment {
    pub network: Network,
    #[serde(default)]
    pub proxy_admins: Vec<RegularDeployment>,
    #[serde(default)]
    pub contracts: Vec<ContractDeployment>,
}

impl NetworkDeployment {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            proxy_admins: Vec::new(),
            contracts: Vec::new(),
        }
    }

    /// Replace the upgradeable entry with the same proxy, or append.
    pub fn upsert_contract(&mut self, deployment: ContractDeployment) {
        let existing = deployment.proxy().and_then(|proxy| {
            self.contracts
                .iter()
                .position(|c| c.proxy() == Some(proxy))
        });

        match existing {
            Some(index) => self.contracts[index] = deployment,
            None => self.contracts.push(deployment),
        }
    }

    /// Replace the admin entry with the same address, or append.
    pub fn upsert_proxy_admin(&mut self, admin: RegularDeployment) {
        match self
            .proxy_admins
            .iter()
            .position(|a| a.address == admin.address)
        {
            Some(index) => self.proxy_admins[index] = admin,
            None => self.proxy_admins.push(admin),
        }
    }

    /// Address lookups match a proxy or a regular address; name lookups return the last match.
    pub fn find_contract(&self, contract: &ContractRef) -> Option<&ContractDeployment> {
        match contract {
            ContractRef::Address(address) => self.contracts.iter().find(|c| match c {
                ContractDeployment::Regular(d) => d.address == *address,
                ContractDeployment::Upgradeable(d) => d.proxy == *address,
            }),
            ContractRef::Name(name) => self
                .contracts
                .iter()
                .rev()
                .find(|c| c.contract_name() == name),
        }
    }

    /// Resolve a proxy admin entry.
    ///
    /// With a proxy, the admin recorded for that proxy is used and an unknown proxy is an
    /// error. With an admin address, it is looked up directly. With neither, the first known
    /// admin is returned.
    pub fn find_proxy_admin(
        &self,
        proxy: Option<Address>,
        admin: Option<Address>,
    ) -> Result<Option<&RegularDeployment>> {
        if let Some(proxy) = proxy {
            let admin = self
                .contracts
                .iter()
                .find_map(|c| match c {
                    ContractDeployment::Upgradeable(d) if d.proxy == proxy => Some(d.admin),
                    _ => None,
                })
                .ok_or(ScrError::ProxyNotFound(proxy))?;
            return Ok(self.proxy_admins.iter().find(|a| a.address == admin));
        }

        if let Some(admin) = admin {
            return Ok(self.proxy_admins.iter().find(|a| a.address == admin));
        }

        let first = self.proxy_admins.first();
        if let Some(first) = first {
            tracing::debug!(admin = %first.address, "No admin requested, defaulting to the first known ProxyAdmin");
        }
        Ok(first)
    }
}

/// File backed store of [`NetworkDeployment`]s, scoped to one network.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
    network: Network,
}

/// Advisory lock held on the manifest sidecar until dropped.
struct ManifestLock {
    file: File,
}

impl Drop for ManifestLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(error = %e, "Failed to release manifest lock");
        }
    }
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>, network: Network) -> Self {
        Self {
            path: path.into(),
            network,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Every network deployment in the file.
    pub fn load(&self) -> Result<Vec<NetworkDeployment>> {
        let _lock = self.lock(false)?;
        self.read()
    }

    /// The entry for this store's network, if any.
    pub fn find_for_current_network(&self) -> Result<Option<NetworkDeployment>> {
        let found = self
            .load()?
            .into_iter()
            .find(|d| d.network == self.network);

        if found.is_none() {
            tracing::debug!(network = %self.network, "No deployments recorded for this network");
        }
        Ok(found)
    }

    pub fn upsert_contract(&self, deployment: ContractDeployment) -> Result<()> {
        self.save_deployment(deployment, None)
    }

    pub fn upsert_proxy_admin(&self, admin: RegularDeployment) -> Result<()> {
        self.mutate(|net| net.upsert_proxy_admin(admin))
    }

    /// Upsert a contract and, optionally, its proxy admin in a single locked write.
    pub fn save_deployment(
        &self,
        deployment: ContractDeployment,
        proxy_admin: Option<RegularDeployment>,
    ) -> Result<()> {
        let name = deployment.contract_name().to_string();
        let address = deployment.public_address();

        self.mutate(|net| {
            if let Some(admin) = proxy_admin {
                net.upsert_proxy_admin(admin);
            }
            net.upsert_contract(deployment);
        })?;

        tracing::info!(
            contract = %name,
            address = %address,
            path = %self.path.display(),
            "Deployment saved to manifest"
        );
        Ok(())
    }

    pub fn find_contract(&self, contract: &ContractRef) -> Result<Option<ContractDeployment>> {
        Ok(self
            .find_for_current_network()?
            .and_then(|net| net.find_contract(contract).cloned()))
    }

    pub fn find_proxy_admin(
        &self,
        proxy: Option<Address>,
        admin: Option<Address>,
    ) -> Result<Option<RegularDeployment>> {
        let Some(net) = self.find_for_current_network()? else {
            tracing::warn!(network = %self.network, "No deployments for this network, no ProxyAdmin known");
            return Ok(None);
        };
        Ok(net.find_proxy_admin(proxy, admin)?.cloned())
    }

    fn mutate(&self, apply: impl FnOnce(&mut NetworkDeployment)) -> Result<()> {
        let _lock = self.lock(true)?;
        let mut deployments = self.read()?;

        let index = match deployments.iter().position(|d| d.network == self.network) {
            Some(index) => index,
            None => {
                deployments.push(NetworkDeployment::new(self.network.clone()));
                deployments.len() - 1
            }
        };
        apply(&mut deployments[index]);

        self.write(&deployments)
    }

    fn read(&self) -> Result<Vec<NetworkDeployment>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "No deployments file, starting from an empty manifest");
                return Ok(Vec::new());
            }
            Err(source) => return Err(self.io_error(source)),
        };

        if content.trim().is_empty() {
            tracing::warn!(path = %self.path.display(), "Deployments file is empty, starting from an empty manifest");
            return Ok(Vec::new());
        }

        serde_json::from_str(&content).map_err(|source| ScrError::ManifestFormat {
            path: self.path.clone(),
            source,
        })
    }

    fn write(&self, deployments: &[NetworkDeployment]) -> Result<()> {
        let content =
            serde_json::to_string_pretty(deployments).map_err(|source| ScrError::ManifestFormat {
                path: self.path.clone(),
                source,
            })?;

        let tmp = self.sidecar("tmp");
        std::fs::write(&tmp, content).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }

    fn lock(&self, exclusive: bool) -> Result<ManifestLock> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.sidecar("lock"))
            .map_err(|e| self.io_error(e))?;

        let locked = if exclusive {
            FileExt::lock_exclusive(&file)
        } else {
            FileExt::lock_shared(&file)
        };
        locked.map_err(|e| self.io_error(e))?;

        Ok(ManifestLock { file })
    }

    fn sidecar(&self, extension: &str) -> PathBuf {
        let mut name: OsString = self.path.as_os_str().to_owned();
        name.push(".");
        name.push(extension);
        PathBuf::from(name)
    }

    fn io_error(&self, source: std::io::Error) -> ScrError {
        ScrError::ManifestIo {
            path: self.path.clone(),
            source,
        }
    }
}
