//! Upgrade orchestration.
//!
//! An upgrade only counts once the admin reports the freshly deployed logic behind the proxy,
//! and that logic differs from the one seen before the transaction. A mined transaction alone
//! proves nothing.

use alloy_core::primitives::{Address, B256, U256, keccak256};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    admin::{AdminGuard, VerifiedAdmin},
    artifact::{ArtifactStore, PROXY_ADMIN_ARTIFACT},
    context::ExecutionContext,
    contracts::{ADMIN_SLOT, IMPLEMENTATION_SLOT, slot_to_address},
    error::{Result, ScrError},
    ledger::{Ledger, TxReceipt},
    manifest::{ContractDeployment, ContractRef, ManifestStore, UpgradeDeployment},
};

/// An upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// Artifact of the new logic.
    pub contract_name: String,
    pub proxy: Address,
    /// Admin of the proxy, looked up in the manifest when `None`.
    pub admin: Option<Address>,
    /// `initialize` arguments, used when `initialize` is set.
    pub args: Vec<String>,
    pub initialize: bool,
    /// Value attached to `upgradeAndCall`.
    pub value: Option<U256>,
    /// Update the manifest entry once verified.
    pub save: bool,
}

impl UpgradeRequest {
    pub fn new(contract_name: impl Into<String>, proxy: Address) -> Self {
        Self {
            contract_name: contract_name.into(),
            proxy,
            admin: None,
            args: Vec::new(),
            initialize: false,
            value: None,
            save: false,
        }
    }

    pub fn admin(mut self, admin: Option<Address>) -> Self {
        self.admin = admin;
        self
    }

    pub fn initialize(mut self, args: Vec<String>) -> Self {
        self.initialize = true;
        self.args = args;
        self
    }

    pub fn value(mut self, value: Option<U256>) -> Self {
        self.value = value;
        self
    }

    pub fn save(mut self, save: bool) -> Self {
        self.save = save;
        self
    }
}

/// Result of a verified upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeOutcome {
    pub previous_logic: Address,
    pub deployment: UpgradeDeployment,
    /// Hash of the `upgrade` or `upgradeAndCall` transaction.
    pub tx_hash: B256,
}

/// Logic and admin of a proxy, read from its storage and through its admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicInfo {
    pub logic_from_proxy: Address,
    pub admin_from_proxy: Address,
    pub logic_from_admin: Address,
    pub admin_from_admin: Address,
}

impl LogicInfo {
    /// Whether the proxy storage and the admin agree.
    pub fn is_consistent(&self) -> bool {
        self.logic_from_proxy == self.logic_from_admin
            && self.admin_from_proxy == self.admin_from_admin
    }
}

/// Result of [`UpgradeOrchestrator::change_logic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicChange {
    pub previous_logic: Address,
    pub actual_logic: Address,
    pub tx_hash: B256,
}

/// Swaps logic behind existing proxies.
pub struct UpgradeOrchestrator<'a, L> {
    ctx: &'a ExecutionContext<L>,
    manifest: &'a ManifestStore,
    artifacts: &'a ArtifactStore,
    admin_guard: Option<AdminGuard>,
}

impl<'a, L: Ledger> UpgradeOrchestrator<'a, L> {
    pub fn new(
        ctx: &'a ExecutionContext<L>,
        manifest: &'a ManifestStore,
        artifacts: &'a ArtifactStore,
    ) -> Self {
        Self {
            ctx,
            manifest,
            artifacts,
            admin_guard: None,
        }
    }

    /// Use an explicit guard instead of the `ProxyAdmin` artifact's code hash.
    pub fn admin_guard(mut self, guard: AdminGuard) -> Self {
        self.admin_guard = Some(guard);
        self
    }

    fn guard(&self) -> Result<AdminGuard> {
        match self.admin_guard {
            Some(guard) => Ok(guard),
            None => Ok(AdminGuard::from_artifact(
                &self.artifacts.load(PROXY_ADMIN_ARTIFACT)?,
            )),
        }
    }

    /// Admin of `proxy`: explicit, else the admin entry the manifest holds for it.
    fn resolve_admin(&self, proxy: Address, explicit: Option<Address>) -> Result<Address> {
        if let Some(admin) = explicit {
            return Ok(admin);
        }
        self.manifest
            .find_proxy_admin(Some(proxy), None)?
            .map(|admin| admin.address)
            .ok_or(ScrError::ProxyNotFound(proxy))
    }

    async fn verify_upgrade(
        &self,
        admin: &VerifiedAdmin<'_, L>,
        proxy: Address,
        previous: Address,
        expected: Address,
    ) -> Result<()> {
        let actual = admin.proxy_implementation(proxy).await?;
        if actual == previous || actual != expected {
            tracing::error!(
                proxy = %proxy,
                previous = %previous,
                expected = %expected,
                actual = %actual,
                "Upgrade postcondition violated"
            );
            return Err(ScrError::UpgradeVerificationFailed {
                proxy,
                previous,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Deploy new logic and point the proxy at it.
    pub async fn upgrade(&self, request: &UpgradeRequest) -> Result<UpgradeOutcome> {
        let proxy = request.proxy;
        let entry = match self.manifest.find_contract(&ContractRef::Address(proxy))? {
            Some(ContractDeployment::Upgradeable(entry)) => Some(entry),
            Some(ContractDeployment::Regular(_)) => return Err(ScrError::NotUpgradeable(proxy)),
            None => None,
        };

        let admin_address = request
            .admin
            .or(entry.as_ref().map(|e| e.admin))
            .ok_or(ScrError::ProxyNotFound(proxy))?;

        // Everything that can fail locally is encoded before the first transaction.
        let artifact = self.artifacts.load(&request.contract_name)?;
        let init_code = artifact.encode_deploy(&[])?;
        let init_data = if request.initialize {
            Some(artifact.encode_initializer(&request.args)?)
        } else {
            None
        };

        let admin = self.guard()?.verify(self.ctx, admin_address).await?;
        let previous_logic = admin.proxy_implementation(proxy).await?;

        let new_logic = self.ctx.deploy_bytecode(init_code, None).await?;
        tracing::info!(
            contract = %request.contract_name,
            logic = %new_logic.address,
            "New logic deployed"
        );

        tracing::info!(
            admin = %admin_address,
            proxy = %proxy,
            previous = %previous_logic,
            new = %new_logic.address,
            with_call = init_data.is_some(),
            "Upgrading proxy"
        );
        let receipt: TxReceipt = match init_data {
            Some(data) => {
                admin
                    .upgrade_and_call(proxy, new_logic.address, data, request.value)
                    .await?
            }
            None => admin.upgrade(proxy, new_logic.address).await?,
        };

        self.verify_upgrade(&admin, proxy, previous_logic, new_logic.address)
            .await?;

        let deployment = match entry {
            Some(entry) => UpgradeDeployment {
                contract_name: request.contract_name.clone(),
                admin: admin_address,
                logic: new_logic.address,
                logic_deploy_tx_hash: Some(new_logic.tx_hash),
                upgrade_timestamp: Some(new_logic.timestamp),
                byte_code_hash: Some(new_logic.byte_code_hash),
                ..entry
            },
            None => UpgradeDeployment {
                contract_name: request.contract_name.clone(),
                admin: admin_address,
                proxy,
                logic: new_logic.address,
                proxy_deploy_tx_hash: None,
                logic_deploy_tx_hash: Some(new_logic.tx_hash),
                deploy_timestamp: None,
                upgrade_timestamp: Some(new_logic.timestamp),
                byte_code_hash: Some(new_logic.byte_code_hash),
                tag: None,
            },
        };

        if request.save {
            self.manifest.upsert_contract(deployment.clone().into())?;
        }

        tracing::info!(
            proxy = %proxy,
            previous = %previous_logic,
            logic = %new_logic.address,
            "Contract upgraded"
        );

        Ok(UpgradeOutcome {
            previous_logic,
            deployment,
            tx_hash: receipt.transaction_hash,
        })
    }

    /// Read the logic and admin of `proxy` both from its EIP-1967 slots and through its admin.
    pub async fn get_logic(&self, proxy: Address, admin: Option<Address>) -> Result<LogicInfo> {
        let admin_address = self.resolve_admin(proxy, admin)?;
        let admin = self.guard()?.verify(self.ctx, admin_address).await?;

        let read_slot = |slot: B256| async move {
            let word = self.ctx.ledger.get_storage_at(proxy, slot).await?;
            Ok::<_, ScrError>(slot_to_address(word))
        };

        let (logic_from_proxy, admin_from_proxy, logic_from_admin, admin_from_admin) = futures::try_join!(
            read_slot(IMPLEMENTATION_SLOT),
            read_slot(ADMIN_SLOT),
            admin.proxy_implementation(proxy),
            admin.proxy_admin(proxy),
        )?;

        let info = LogicInfo {
            logic_from_proxy,
            admin_from_proxy,
            logic_from_admin,
            admin_from_admin,
        };
        if !info.is_consistent() {
            tracing::warn!(proxy = %proxy, info = ?info, "Proxy storage and admin disagree");
        }
        Ok(info)
    }

    /// Point `proxy` at an already deployed `new_logic`.
    pub async fn change_logic(
        &self,
        proxy: Address,
        new_logic: Address,
        admin: Option<Address>,
        save: bool,
    ) -> Result<LogicChange> {
        let admin_address = self.resolve_admin(proxy, admin)?;
        let admin = self.guard()?.verify(self.ctx, admin_address).await?;

        let previous_logic = admin.proxy_implementation(proxy).await?;
        tracing::info!(proxy = %proxy, previous = %previous_logic, new = %new_logic, "Changing logic");

        let receipt = admin.upgrade(proxy, new_logic).await?;
        self.verify_upgrade(&admin, proxy, previous_logic, new_logic)
            .await?;

        if save {
            self.record_logic_change(proxy, new_logic, &receipt).await?;
        }

        Ok(LogicChange {
            previous_logic,
            actual_logic: new_logic,
            tx_hash: receipt.transaction_hash,
        })
    }

    async fn record_logic_change(
        &self,
        proxy: Address,
        new_logic: Address,
        receipt: &TxReceipt,
    ) -> Result<()> {
        let Some(ContractDeployment::Upgradeable(entry)) =
            self.manifest.find_contract(&ContractRef::Address(proxy))?
        else {
            tracing::warn!(proxy = %proxy, "Proxy not in the manifest, nothing to update");
            return Ok(());
        };

        let code = self.ctx.ledger.get_code(new_logic).await?;
        let upgraded_at: DateTime<Utc> = self.ctx.block_time(receipt).await?;
        let deployment = UpgradeDeployment {
            logic: new_logic,
            logic_deploy_tx_hash: None,
            upgrade_timestamp: Some(upgraded_at),
            byte_code_hash: Some(keccak256(&code)),
            ..entry
        };
        self.manifest.upsert_contract(deployment.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logic_info_consistency() {
        let a = Address::repeat_byte(1);
        let b = Address::repeat_byte(2);
        let info = LogicInfo {
            logic_from_proxy: a,
            admin_from_proxy: b,
            logic_from_admin: a,
            admin_from_admin: b,
        };
        assert!(info.is_consistent());
        assert!(
            !LogicInfo {
                logic_from_admin: b,
                ..info
            }
            .is_consistent()
        );
    }

    #[test]
    fn test_request_builder() {
        let proxy = Address::repeat_byte(3);
        let request = UpgradeRequest::new("WidgetV2", proxy)
            .initialize(vec!["42".to_string()])
            .save(true);
        assert!(request.initialize);
        assert!(request.save);
        assert_eq!(request.admin, None);
        assert_eq!(request.args, vec!["42".to_string()]);
    }
}
