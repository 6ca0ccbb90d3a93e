//! Proxy-admin authenticity check.
//!
//! A contract exposing the `ProxyAdmin` interface is not necessarily a `ProxyAdmin`. Before any
//! privileged call is routed through a claimed admin, its deployed code is hashed and compared
//! with the canonical `ProxyAdmin` runtime code. Only a [`VerifiedAdmin`] can issue admin calls.

use alloy_core::{
    primitives::{Address, B256, Bytes, U256, keccak256},
    sol_types::SolCall,
};

use crate::{
    artifact::Artifact,
    context::ExecutionContext,
    contracts::{IProxyAdmin, decode_returns},
    error::{Result, ScrError},
    ledger::{Ledger, TxReceipt, TxRequest},
};

/// Verifies claimed proxy admins against the canonical runtime code hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminGuard {
    expected_code_hash: B256,
}

impl AdminGuard {
    pub fn new(expected_code_hash: B256) -> Self {
        Self { expected_code_hash }
    }

    /// Use the deployed bytecode of the `ProxyAdmin` artifact as the reference.
    pub fn from_artifact(artifact: &Artifact) -> Self {
        Self::new(artifact.deployed_code_hash())
    }

    pub fn expected_code_hash(&self) -> B256 {
        self.expected_code_hash
    }

    /// Check `candidate` and hand back a handle allowed to call it.
    ///
    /// Fails closed: a fetch error, an empty account or a different code hash are all
    /// [`ScrError::UntrustedAdminContract`].
    pub async fn verify<'a, L: Ledger>(
        &self,
        ctx: &'a ExecutionContext<L>,
        candidate: Address,
    ) -> Result<VerifiedAdmin<'a, L>> {
        let untrusted = |reason: String| {
            tracing::warn!(admin = %candidate, reason = %reason, "Rejected proxy admin");
            ScrError::UntrustedAdminContract {
                address: candidate,
                reason,
            }
        };

        let code = ctx
            .ledger
            .get_code(candidate)
            .await
            .map_err(|e| untrusted(format!("could not fetch code: {e:#}")))?;

        if code.is_empty() {
            return Err(untrusted("no code deployed".to_string()));
        }

        let code_hash = keccak256(&code);
        if code_hash != self.expected_code_hash {
            return Err(untrusted(format!(
                "code hash {} does not match the ProxyAdmin code hash {}",
                code_hash, self.expected_code_hash
            )));
        }

        tracing::debug!(admin = %candidate, "ProxyAdmin verified");
        Ok(VerifiedAdmin {
            ctx,
            address: candidate,
        })
    }
}

/// A proxy admin whose code passed [`AdminGuard::verify`].
pub struct VerifiedAdmin<'a, L> {
    ctx: &'a ExecutionContext<L>,
    address: Address,
}

impl<L: Ledger> VerifiedAdmin<'_, L> {
    pub fn address(&self) -> Address {
        self.address
    }

    /// Logic currently behind `proxy`, as seen by the admin.
    pub async fn proxy_implementation(&self, proxy: Address) -> Result<Address> {
        let call = IProxyAdmin::getProxyImplementationCall { proxy };
        let output = self.ctx.call(self.address, call.abi_encode()).await?;
        Ok(decode_returns::<IProxyAdmin::getProxyImplementationCall>(&output)?._0)
    }

    /// Admin of `proxy`, as seen by the admin.
    pub async fn proxy_admin(&self, proxy: Address) -> Result<Address> {
        let call = IProxyAdmin::getProxyAdminCall { proxy };
        let output = self.ctx.call(self.address, call.abi_encode()).await?;
        Ok(decode_returns::<IProxyAdmin::getProxyAdminCall>(&output)?._0)
    }

    pub async fn owner(&self) -> Result<Address> {
        let output = self
            .ctx
            .call(self.address, IProxyAdmin::ownerCall {}.abi_encode())
            .await?;
        Ok(decode_returns::<IProxyAdmin::ownerCall>(&output)?._0)
    }

    /// Point `proxy` at `implementation`.
    pub async fn upgrade(&self, proxy: Address, implementation: Address) -> Result<TxReceipt> {
        let call = IProxyAdmin::upgradeCall {
            proxy,
            implementation,
        };
        self.ctx.transact(self.address, call.abi_encode()).await
    }

    /// Point `proxy` at `implementation` and call it with `data` in the same transaction.
    pub async fn upgrade_and_call(
        &self,
        proxy: Address,
        implementation: Address,
        data: Bytes,
        value: Option<U256>,
    ) -> Result<TxReceipt> {
        let call = IProxyAdmin::upgradeAndCallCall {
            proxy,
            implementation,
            data,
        };
        let tx = TxRequest::call(self.ctx.signer, self.address, call.abi_encode()).value(value);
        self.ctx.send(tx).await
    }
}
