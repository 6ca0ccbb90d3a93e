//! Trust gate over the on-chain `CodeTrust` service.
//!
//! Delegate deployers act on behalf of the caller, so they may only be used while the caller
//! trusts their code. Trust is granted for a bounded window and never revoked early; once the
//! window is over a new confirmation is needed.

use std::{future::Future, time::Duration};

use alloy_core::{
    primitives::{Address, B256, U256},
    sol_types::SolCall,
};
use chrono::{DateTime, Utc};

use crate::{
    context::{ExecutionContext, timestamp_to_datetime},
    contracts::{ICodeTrust, decode_returns},
    error::{Result, ScrError},
    ledger::Ledger,
};

/// Shortest trust window the service accepts.
pub const MIN_TRUST_DURATION: Duration = Duration::from_secs(10);

/// Longest trust window the service accepts.
pub const MAX_TRUST_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Default trust window granted before a delegated deployment.
pub const DEFAULT_TRUST_DURATION: Duration = Duration::from_secs(120);

/// Trust ending within this margin is renewed, so the window outlives the next transaction.
pub const TRUST_RENEWAL_MARGIN: Duration = Duration::from_secs(30);

/// Asks the operator to confirm a privileged action.
pub trait ConsentProvider: Send + Sync {
    /// Returns `true` when the operator accepts.
    fn confirm(&self, question: &str) -> impl Future<Output = anyhow::Result<bool>> + Send;
}

/// Accepts every question. For scripted runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

impl ConsentProvider for AutoApprove {
    async fn confirm(&self, question: &str) -> anyhow::Result<bool> {
        tracing::info!(question, "Auto-approved");
        Ok(true)
    }
}

/// Declines every question.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoDeny;

impl ConsentProvider for AutoDeny {
    async fn confirm(&self, question: &str) -> anyhow::Result<bool> {
        tracing::info!(question, "Auto-declined");
        Ok(false)
    }
}

/// Ask `consent`, turning a refusal or a failed prompt into [`ScrError::DeploymentAborted`].
pub async fn require_consent<C: ConsentProvider>(consent: &C, question: &str) -> Result<()> {
    match consent.confirm(question).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(ScrError::DeploymentAborted(format!("declined: {question}"))),
        Err(e) => Err(ScrError::DeploymentAborted(format!(
            "could not get confirmation: {e:#}"
        ))),
    }
}

/// State of the caller's trust in a delegate after [`TrustGate::ensure_trusted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustWindow {
    /// Trust was already in place; no transaction was sent.
    AlreadyTrusted,
    /// Trust was granted by `tx_hash` and lasts until `until`.
    Granted { until: DateTime<Utc>, tx_hash: B256 },
}

/// Binding to a `CodeTrust` instance.
pub struct TrustGate<'a, L> {
    ctx: &'a ExecutionContext<L>,
    code_trust: Address,
}

impl<'a, L: Ledger> TrustGate<'a, L> {
    pub fn new(ctx: &'a ExecutionContext<L>, code_trust: Address) -> Self {
        Self { ctx, code_trust }
    }

    /// Whether `truster` trusts the code at `code` at `as_of` (latest block time when `None`).
    pub async fn is_trusted_code(
        &self,
        code: Address,
        truster: Address,
        as_of: Option<u64>,
    ) -> Result<bool> {
        let as_of = match as_of {
            Some(as_of) => as_of,
            None => self.ctx.ledger.latest_timestamp().await?,
        };

        let call = ICodeTrust::isTrustedCodeCall {
            trustedCode: code,
            by: truster,
            extTimestamp: U256::from(as_of),
        };
        let output = self.ctx.call(self.code_trust, call.abi_encode()).await?;
        Ok(decode_returns::<ICodeTrust::isTrustedCodeCall>(&output)?._0)
    }

    /// Trust the code at `code` for `duration`, as the context's signer.
    pub async fn trust_code_at(&self, code: Address, duration: Duration) -> Result<TrustWindow> {
        if !(MIN_TRUST_DURATION..=MAX_TRUST_DURATION).contains(&duration) {
            return Err(ScrError::TrustDurationOutOfRange(duration.as_secs()));
        }

        let call = ICodeTrust::trustCodeAtCall {
            trustedCode: code,
            duration: U256::from(duration.as_secs()),
        };

        tracing::info!(code = %code, truster = %self.ctx.signer, duration = ?duration, "Granting code trust");
        let receipt = self.ctx.transact(self.code_trust, call.abi_encode()).await?;
        let granted_at = self.ctx.ledger.block_timestamp(receipt.block_hash).await?;

        if !self
            .is_trusted_code(code, self.ctx.signer, Some(granted_at))
            .await?
        {
            return Err(ScrError::TrustNotGranted {
                code,
                truster: self.ctx.signer,
            });
        }

        let until = timestamp_to_datetime(granted_at.saturating_add(duration.as_secs()))?;
        tracing::info!(code = %code, until = %until, "Code trusted");

        Ok(TrustWindow::Granted {
            until,
            tx_hash: receipt.transaction_hash,
        })
    }

    /// Make sure the signer trusts `code` for at least [`TRUST_RENEWAL_MARGIN`], asking
    /// `consent` before granting a new window.
    ///
    /// A refusal aborts without any transaction.
    pub async fn ensure_trusted<C: ConsentProvider>(
        &self,
        code: Address,
        consent: &C,
        duration: Duration,
    ) -> Result<TrustWindow> {
        let now = self.ctx.ledger.latest_timestamp().await?;
        let horizon = now.saturating_add(TRUST_RENEWAL_MARGIN.as_secs());
        let (trusted_now, trusted_later) = futures::try_join!(
            self.is_trusted_code(code, self.ctx.signer, Some(now)),
            self.is_trusted_code(code, self.ctx.signer, Some(horizon)),
        )?;
        if trusted_later {
            tracing::debug!(code = %code, truster = %self.ctx.signer, "Code already trusted");
            return Ok(TrustWindow::AlreadyTrusted);
        }
        if trusted_now {
            tracing::info!(
                code = %code,
                margin = ?TRUST_RENEWAL_MARGIN,
                "Code trust is about to expire, renewing"
            );
        }

        let question = format!(
            "Contract at {} has not been trusted yet by {}. Trust it for {} seconds?",
            code,
            self.ctx.signer,
            duration.as_secs()
        );
        require_consent(consent, &question).await?;

        self.trust_code_at(code, duration).await
    }
}
