use std::path::PathBuf;

use alloy_core::primitives::{Address, B256, U256};
use clap::{Args, Parser, Subcommand};
use scr_deploy::{CONFIG_FILENAME, Version};
use tracing::level_filters::LevelFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Parser)]
#[command(name = "scr")]
#[command(
    author,
    version,
    about = "Deploy, upgrade and register versioned contracts with the Standard Contract Registry"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "SCR_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the configuration file.
    ///
    /// Missing files are fine: defaults and `SCR_*` environment variables are used instead.
    #[arg(short, long, alias = "conf", env = "SCR_CONFIG", default_value = CONFIG_FILENAME)]
    pub config: PathBuf,

    /// Answer yes to every confirmation (trusting a deployer, deploying a new ProxyAdmin).
    #[arg(short, long, env = "SCR_YES")]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy a contract, optionally behind a proxy, and record it.
    Deploy(DeployArgs),

    /// Deploy new logic and point an existing proxy at it.
    Upgrade(UpgradeArgs),

    /// Show the logic and admin of a proxy, read from its storage and through its admin.
    GetLogic {
        /// Proxy address.
        #[arg(long)]
        proxy: Address,

        /// Proxy admin, looked up in the manifest when omitted.
        #[arg(long)]
        admin: Option<Address>,
    },

    /// Point a proxy at an already deployed logic contract.
    ChangeLogic {
        #[arg(long)]
        proxy: Address,

        /// New logic address.
        #[arg(long)]
        logic: Address,

        #[arg(long)]
        admin: Option<Address>,

        /// Update the manifest entry of the proxy.
        #[arg(long)]
        save: bool,
    },

    /// Register a new record in the registry.
    Register {
        /// Record name (at most 31 bytes).
        name: String,

        #[arg(long)]
        logic: Address,

        /// Proxy in front of the logic. Regular deployments have none.
        #[arg(long)]
        proxy: Option<Address>,

        #[arg(long, default_value_t = Version::INITIAL)]
        version: Version,

        /// Hash of the logic runtime code. Computed from the deployed code when omitted.
        #[arg(long)]
        code_hash: Option<B256>,
    },

    /// Publish a new version of an existing record.
    Update {
        name: String,

        /// New version, strictly greater than the current one.
        #[arg(long)]
        version: Version,

        #[arg(long)]
        logic: Option<Address>,

        #[arg(long)]
        proxy: Option<Address>,

        /// Transfer the record to another admin.
        #[arg(long)]
        new_admin: Option<Address>,
    },

    /// Show one record.
    GetRecord {
        name: String,

        /// Record admin, defaults to the signer.
        #[arg(long)]
        admin: Option<Address>,

        /// Exact version. The latest version is shown when omitted.
        #[arg(long)]
        version: Option<Version>,
    },

    /// List the latest version of every record of an admin.
    GetRecords {
        /// Record admin. System records (owned by the registry owner) are listed when omitted.
        #[arg(long)]
        admin: Option<Address>,

        #[arg(long, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Trust the code of a contract, as the signer, for a bounded window.
    TrustCode {
        code: Address,

        /// Trust window in seconds. Defaults to the configured window.
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Check whether an account trusts the code of a contract.
    IsTrusted {
        code: Address,

        /// Trusting account, defaults to the signer.
        #[arg(long)]
        truster: Option<Address>,

        /// Unix timestamp to check at. Defaults to the latest block.
        #[arg(long)]
        at: Option<u64>,
    },

    /// Deploy the shared services (CodeTrust, ContractRegistry, ContractDeployer) of a network
    /// and point the configuration file at them.
    Initialize {
        /// Reuse an existing registry instead of deploying one.
        #[arg(long)]
        registry: Option<Address>,

        /// Reuse an existing contract deployer instead of deploying one.
        #[arg(long, conflicts_with = "no_contract_deployer")]
        contract_deployer: Option<Address>,

        /// Skip the contract deployer.
        #[arg(long)]
        no_contract_deployer: bool,
    },

    /// Write a configuration file with the default values.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
pub struct DeployArgs {
    /// Artifact name of the contract.
    pub contract: String,

    /// Constructor (or `initialize`) arguments as a JSON array, e.g. '["0xabc...", 42]'.
    #[arg(long)]
    pub args: Option<String>,

    /// Deploy the contract behind a TransparentUpgradeableProxy.
    #[arg(long)]
    pub upgradeable: bool,

    /// Proxy admin for an upgradeable deployment.
    #[arg(long)]
    pub proxy_admin: Option<Address>,

    /// Call `initialize(args)` when the proxy is created.
    #[arg(long)]
    pub initialize: bool,

    /// Value, in wei, attached to the deployment.
    #[arg(long)]
    pub value: Option<U256>,

    /// Deploy through the delegate deployer, which registers in the same transaction.
    #[arg(long)]
    pub delegated: bool,

    /// Delegate deployer address. Defaults to the configured deployer.
    #[arg(long, requires = "delegated")]
    pub deployer: Option<Address>,

    /// Save the deployment to the manifest.
    #[arg(long)]
    pub store_off_chain: bool,

    /// Register the deployment in the registry.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub store_on_chain: bool,

    /// Record name. Defaults to the contract name.
    #[arg(long)]
    pub record_name: Option<String>,

    #[arg(long, default_value_t = Version::INITIAL)]
    pub record_version: Version,

    /// Free form tag saved in the manifest.
    #[arg(long)]
    pub tag: Option<String>,
}

#[derive(Args)]
pub struct UpgradeArgs {
    /// Artifact name of the new logic.
    pub contract: String,

    #[arg(long)]
    pub proxy: Address,

    /// Proxy admin, looked up in the manifest when omitted.
    #[arg(long)]
    pub admin: Option<Address>,

    /// `initialize` arguments as a JSON array.
    #[arg(long)]
    pub args: Option<String>,

    /// Call `initialize(args)` in the upgrade transaction.
    #[arg(long)]
    pub initialize: bool,

    /// Value, in wei, attached to `upgradeAndCall`.
    #[arg(long, requires = "initialize")]
    pub value: Option<U256>,

    /// Update the manifest entry once the upgrade is verified.
    #[arg(long)]
    pub save: bool,
}

/// Parse a JSON array of arguments. Strings are kept verbatim, other values use their JSON text.
pub fn parse_json_args(raw: Option<&str>) -> anyhow::Result<Vec<String>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    let values: Vec<serde_json::Value> = serde_json::from_str(raw)
        .map_err(|e| anyhow::anyhow!("--args must be a JSON array: {e}"))?;

    Ok(values
        .into_iter()
        .map(|value| match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
        .collect())
}
