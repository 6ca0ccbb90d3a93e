//! scr is a CLI tool to deploy, upgrade and register versioned contracts on an EVM chain.

mod cli;
mod consent;

use std::{path::Path, time::Duration};

use alloy_core::primitives::{Address, B256, keccak256};
use anyhow::Result;
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};

use cli::{Cli, Command, DeployArgs, OutputFormat, UpgradeArgs, parse_json_args};
use consent::TerminalConsent;
use scr_deploy::{
    ArtifactStore, DeployOrchestrator, DeployRequest, ExecutionContext, Ledger, ManifestStore,
    Record, RecordDraft, RegistryClient, RpcLedger, ScrConfig, ScrError, StorageOptions,
    SystemInit, TrustGate, UpdateRequest, UpgradeOrchestrator, UpgradeRequest,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    if let Command::InitConfig { force } = &cli.command {
        return init_config(&cli.config, *force);
    }

    let config = ScrConfig::load(&cli.config)?;
    tracing::debug!(config_path = %cli.config.display(), network = %config.network.name, "Configuration loaded");

    let ctx = config.connect().await?;
    let manifest = config.manifest(ctx.network.clone());
    let artifacts = config.artifacts();
    let consent = TerminalConsent::new(cli.yes);

    match cli.command {
        Command::Deploy(args) => {
            deploy(&config, &ctx, &manifest, &artifacts, &consent, args).await?;
        }
        Command::Upgrade(args) => {
            upgrade(&ctx, &manifest, &artifacts, args).await?;
        }
        Command::GetLogic { proxy, admin } => {
            let info = UpgradeOrchestrator::new(&ctx, &manifest, &artifacts)
                .get_logic(proxy, admin)
                .await?;
            print_json(&info)?;
        }
        Command::ChangeLogic {
            proxy,
            logic,
            admin,
            save,
        } => {
            let change = UpgradeOrchestrator::new(&ctx, &manifest, &artifacts)
                .change_logic(proxy, logic, admin, save)
                .await?;
            print_json(&serde_json::json!({
                "proxy": proxy,
                "previousLogic": change.previous_logic,
                "logic": change.actual_logic,
                "txHash": change.tx_hash,
            }))?;
        }
        Command::Register {
            name,
            logic,
            proxy,
            version,
            code_hash,
        } => {
            let logic_code_hash = match code_hash {
                Some(hash) => hash,
                None => runtime_code_hash(&ctx, logic).await?,
            };
            let draft = RecordDraft {
                name,
                proxy,
                logic,
                version,
                logic_code_hash,
            };
            let record = registry(&config, &ctx)?.register(&draft, ctx.signer).await?;
            print_json(&record)?;
        }
        Command::Update {
            name,
            version,
            logic,
            proxy,
            new_admin,
        } => {
            let mut request = UpdateRequest::new(name, version);
            if let Some(logic) = logic {
                request = request.logic(logic, runtime_code_hash(&ctx, logic).await?);
            }
            if let Some(proxy) = proxy {
                request = request.proxy(proxy);
            }
            if let Some(new_admin) = new_admin {
                request = request.new_admin(new_admin);
            }
            let update = registry(&config, &ctx)?.update(&request, ctx.signer).await?;
            print_json(&update)?;
        }
        Command::GetRecord {
            name,
            admin,
            version,
        } => {
            let admin = admin.unwrap_or(ctx.signer);
            let record = registry(&config, &ctx)?
                .get_record(&name, admin, version)
                .await?
                .ok_or(ScrError::RecordNotFound { name, admin })?;
            print_json(&record)?;
        }
        Command::GetRecords { admin, format } => {
            let records = registry(&config, &ctx)?.get_records(admin).await?;
            match format {
                OutputFormat::Table => println!("{}", records_table(&records)),
                OutputFormat::Json => print_json(&records)?,
            }
        }
        Command::TrustCode { code, duration } => {
            let duration = duration
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.trust_duration());
            let window = TrustGate::new(&ctx, config.contracts.code_trust()?)
                .trust_code_at(code, duration)
                .await?;
            tracing::info!(code = %code, window = ?window, "Trust granted");
        }
        Command::IsTrusted { code, truster, at } => {
            let truster = truster.unwrap_or(ctx.signer);
            let trusted = TrustGate::new(&ctx, config.contracts.code_trust()?)
                .is_trusted_code(code, truster, at)
                .await?;
            println!("{trusted}");
        }
        Command::Initialize {
            registry,
            contract_deployer,
            no_contract_deployer,
        } => {
            let init = SystemInit {
                registry,
                contract_deployer,
                deploy_contract_deployer: !no_contract_deployer,
            };
            let system = DeployOrchestrator::new(&ctx, &manifest, &artifacts, &consent, &config.contracts)
                .max_version(config.max_version)
                .initialize_system(&init)
                .await?;

            let mut updated = config.clone();
            system.apply_to(&mut updated.contracts);
            updated.save_to_file(&cli.config)?;
            tracing::info!(config_path = %cli.config.display(), "Configuration updated with the system contracts");
            print_json(&system)?;
        }
        Command::InitConfig { .. } => {}
    }

    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists, pass --force to overwrite it",
            path.display()
        );
    }
    ScrConfig::default().save_to_file(path)?;
    Ok(())
}

async fn deploy(
    config: &ScrConfig,
    ctx: &ExecutionContext<RpcLedger>,
    manifest: &ManifestStore,
    artifacts: &ArtifactStore,
    consent: &TerminalConsent,
    args: DeployArgs,
) -> Result<()> {
    let request = DeployRequest::new(args.contract)
        .args(parse_json_args(args.args.as_deref())?)
        .value(args.value)
        .proxy_admin(args.proxy_admin)
        .initialize(args.initialize)
        .storage(StorageOptions {
            off_chain: args.store_off_chain,
            on_chain: args.store_on_chain,
            record_name: args.record_name,
            version: args.record_version,
            tag: args.tag,
        });

    let orchestrator = DeployOrchestrator::new(ctx, manifest, artifacts, consent, &config.contracts)
        .max_version(config.max_version)
        .trust_duration(config.trust_duration());

    let outcome = if args.delegated {
        orchestrator
            .deploy_with_deployer(&request, args.upgradeable, args.deployer)
            .await?
    } else if args.upgradeable {
        orchestrator.deploy_upgradeable(&request).await?
    } else {
        orchestrator.deploy(&request).await?
    };

    if let Some(trust) = &outcome.trust {
        tracing::debug!(trust = ?trust, "Delegate trust");
    }

    print_json(&serde_json::json!({
        "deployment": outcome.deployment,
        "proxyAdmin": outcome.proxy_admin,
        "record": outcome.record,
        "previousRecord": outcome.previous_record,
    }))
}

async fn upgrade(
    ctx: &ExecutionContext<RpcLedger>,
    manifest: &ManifestStore,
    artifacts: &ArtifactStore,
    args: UpgradeArgs,
) -> Result<()> {
    let mut request = UpgradeRequest::new(args.contract, args.proxy)
        .admin(args.admin)
        .value(args.value)
        .save(args.save);
    if args.initialize {
        request = request.initialize(parse_json_args(args.args.as_deref())?);
    } else if args.args.is_some() {
        tracing::warn!("--args is ignored without --initialize");
    }

    let outcome = UpgradeOrchestrator::new(ctx, manifest, artifacts)
        .upgrade(&request)
        .await?;

    print_json(&serde_json::json!({
        "previousLogic": outcome.previous_logic,
        "deployment": outcome.deployment,
        "txHash": outcome.tx_hash,
    }))
}

fn registry<'a>(
    config: &ScrConfig,
    ctx: &'a ExecutionContext<RpcLedger>,
) -> Result<RegistryClient<'a, RpcLedger>> {
    Ok(RegistryClient::new(ctx, config.contracts.registry()?).max_version(config.max_version))
}

async fn runtime_code_hash(ctx: &ExecutionContext<RpcLedger>, address: Address) -> Result<B256> {
    let code = ctx.ledger.get_code(address).await?;
    if code.is_empty() {
        anyhow::bail!("no code deployed at {address}");
    }
    Ok(keccak256(&code))
}

fn records_table(records: &[Record]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Name", "Version", "Address", "Logic", "Admin", "Updated"]);

    for record in records {
        table.add_row(vec![
            record.name.clone(),
            record.version.to_string(),
            record.public_address().to_string(),
            record.logic.to_string(),
            record.admin.to_string(),
            record.timestamp.to_rfc3339(),
        ]);
    }
    table
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
