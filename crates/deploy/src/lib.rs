//! scr-deploy - Deployment and upgrade engine for the Standard Contract Registry.
//!
//! This crate deploys, upgrades and registers versioned contracts on an EVM chain, keeping the
//! local deployment manifest and the on-chain `ContractRegistry` coherent.

pub mod admin;
pub mod artifact;
pub mod config;
pub mod context;
pub mod contracts;
pub mod deploy;
pub mod error;
pub mod ledger;
pub mod manifest;
pub mod registry;
pub mod rpc;
pub mod trust;
pub mod upgrade;
pub mod version;

pub use admin::{AdminGuard, VerifiedAdmin};
pub use artifact::{Artifact, ArtifactStore};
pub use config::{CONFIG_FILENAME, NetworkConfig, ScrConfig, SystemContracts};
pub use context::{DeployedUnit, ExecutionContext, GasOptions, Network};
pub use deploy::{
    DeployOrchestrator, DeployOutcome, DeployRequest, StorageOptions, SystemDeployment, SystemInit,
};
pub use error::{Result, ScrError};
pub use ledger::{Ledger, TxReceipt, TxRequest};
pub use manifest::{
    ContractDeployment, ContractRef, ManifestStore, NetworkDeployment, RegularDeployment,
    UpgradeDeployment,
};
pub use registry::{Record, RecordDraft, RecordUpdate, RegistryClient, UpdateRequest};
pub use rpc::{ReceiptPolling, RpcLedger};
pub use trust::{AutoApprove, AutoDeny, ConsentProvider, TrustGate, TrustWindow};
pub use upgrade::{LogicChange, LogicInfo, UpgradeOrchestrator, UpgradeOutcome, UpgradeRequest};
pub use version::Version;
