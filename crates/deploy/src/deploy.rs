//! Deploy orchestration.
//!
//! A deployment goes through
//! `DEPLOY_LOGIC -> [ENCODE_INIT_DATA] -> [DEPLOY_PROXY] -> [PERSIST_OFFCHAIN] -> [RECONCILE_ONCHAIN]`.
//! Local preconditions (artifacts, argument encoding, record name and version) are all checked
//! before the first transaction. Any remote failure aborts the request. The manifest is only
//! written once the remote steps it describes have succeeded.

use std::time::Duration;

use alloy_core::{
    primitives::{Address, B256, Bytes, U256, keccak256},
    sol_types::SolCall,
};
use serde::Serialize;

use crate::{
    admin::{AdminGuard, VerifiedAdmin},
    artifact::{
        Artifact, ArtifactStore, CODE_TRUST_ARTIFACT, CONTRACT_DEPLOYER_ARTIFACT,
        PROXY_ADMIN_ARTIFACT, PROXY_ARTIFACT, REGISTRY_ARTIFACT,
    },
    config::SystemContracts,
    context::{DeployedUnit, ExecutionContext},
    contracts::{
        ADMIN_SLOT, IContractDeployer, IUpgradeableDeployer, deployer_constructor_args,
        encode_name, proxy_constructor_args, registry_constructor_args, slot_to_address,
    },
    error::{Result, ScrError},
    ledger::{Ledger, TxRequest},
    manifest::{ContractDeployment, ManifestStore, RegularDeployment, UpgradeDeployment},
    registry::{Record, RecordDraft, RegistryClient, UpdateRequest},
    trust::{ConsentProvider, DEFAULT_TRUST_DURATION, TrustGate, TrustWindow, require_consent},
    version::Version,
};

/// Where the result of a deployment is recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageOptions {
    /// Write the deployment to the manifest.
    pub off_chain: bool,
    /// Register (or update) the record in the registry.
    pub on_chain: bool,
    /// Record name, defaults to the contract name.
    pub record_name: Option<String>,
    pub version: Version,
    /// Free form metadata kept in the manifest.
    pub tag: Option<String>,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            off_chain: false,
            on_chain: true,
            record_name: None,
            version: Version::INITIAL,
            tag: None,
        }
    }
}

/// A deployment request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    pub contract_name: String,
    /// Constructor arguments for regular deployments, `initialize` arguments otherwise.
    pub args: Vec<String>,
    /// Value attached to the creation (or delegated) transaction.
    pub value: Option<U256>,
    /// Proxy admin for upgradeable deployments.
    pub proxy_admin: Option<Address>,
    /// Call `initialize(args)` through the proxy constructor.
    pub initialize: bool,
    pub storage: StorageOptions,
}

impl DeployRequest {
    pub fn new(contract_name: impl Into<String>) -> Self {
        Self {
            contract_name: contract_name.into(),
            args: Vec::new(),
            value: None,
            proxy_admin: None,
            initialize: false,
            storage: StorageOptions::default(),
        }
    }

    pub fn args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn value(mut self, value: Option<U256>) -> Self {
        self.value = value;
        self
    }

    pub fn proxy_admin(mut self, proxy_admin: Option<Address>) -> Self {
        self.proxy_admin = proxy_admin;
        self
    }

    pub fn initialize(mut self, initialize: bool) -> Self {
        self.initialize = initialize;
        self
    }

    pub fn storage(mut self, storage: StorageOptions) -> Self {
        self.storage = storage;
        self
    }

    fn record_name(&self) -> &str {
        self.storage
            .record_name
            .as_deref()
            .unwrap_or(&self.contract_name)
    }
}

/// Result of a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    pub deployment: ContractDeployment,
    /// Admin controlling the proxy, for upgradeable deployments.
    pub proxy_admin: Option<RegularDeployment>,
    /// Registry record after reconciliation.
    pub record: Option<Record>,
    /// Record that was superseded when an update was performed instead of a registration.
    pub previous_record: Option<Record>,
    /// Trust state of the delegate, for delegated deployments.
    pub trust: Option<TrustWindow>,
}

impl DeployOutcome {
    fn new(deployment: ContractDeployment) -> Self {
        Self {
            deployment,
            proxy_admin: None,
            record: None,
            previous_record: None,
            trust: None,
        }
    }

    /// Whether the registry record was updated rather than created.
    pub fn record_updated(&self) -> bool {
        self.previous_record.is_some()
    }
}

/// Options of [`DeployOrchestrator::initialize_system`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInit {
    /// Reuse this registry instead of deploying a new one.
    pub registry: Option<Address>,
    /// Reuse this contract deployer instead of deploying a new one.
    pub contract_deployer: Option<Address>,
    /// Deploy a `ContractDeployer` when none is given.
    pub deploy_contract_deployer: bool,
}

impl Default for SystemInit {
    fn default() -> Self {
        Self {
            registry: None,
            contract_deployer: None,
            deploy_contract_deployer: true,
        }
    }
}

/// Shared services of a network, as left by [`DeployOrchestrator::initialize_system`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemDeployment {
    pub code_trust: RegularDeployment,
    pub registry: RegularDeployment,
    pub contract_deployer: Option<RegularDeployment>,
    /// Registry records of the services, the registry's own first when it has one.
    pub records: Vec<Record>,
}

impl SystemDeployment {
    /// Point `contracts` at these services.
    pub fn apply_to(&self, contracts: &mut SystemContracts) {
        contracts.code_trust = Some(self.code_trust.address);
        contracts.contract_registry = Some(self.registry.address);
        if let Some(deployer) = &self.contract_deployer {
            contracts.contract_deployer = Some(deployer.address);
        }
    }
}

/// How the registry record of a deployment is reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordPlan {
    Register,
    /// A lower version exists and is superseded.
    Update,
}

enum Service {
    Known(RegularDeployment),
    Deploy(Artifact),
}

/// Composes artifacts, manifest, registry, trust gate and admin guard into deployments.
pub struct DeployOrchestrator<'a, L, C> {
    ctx: &'a ExecutionContext<L>,
    manifest: &'a ManifestStore,
    artifacts: &'a ArtifactStore,
    consent: &'a C,
    contracts: &'a SystemContracts,
    admin_guard: Option<AdminGuard>,
    max_version: Version,
    trust_duration: Duration,
}

impl<'a, L: Ledger, C: ConsentProvider> DeployOrchestrator<'a, L, C> {
    pub fn new(
        ctx: &'a ExecutionContext<L>,
        manifest: &'a ManifestStore,
        artifacts: &'a ArtifactStore,
        consent: &'a C,
        contracts: &'a SystemContracts,
    ) -> Self {
        Self {
            ctx,
            manifest,
            artifacts,
            consent,
            contracts,
            admin_guard: None,
            max_version: Version::MAX,
            trust_duration: DEFAULT_TRUST_DURATION,
        }
    }

    /// Use an explicit guard instead of the `ProxyAdmin` artifact's code hash.
    pub fn admin_guard(mut self, guard: AdminGuard) -> Self {
        self.admin_guard = Some(guard);
        self
    }

    pub fn max_version(mut self, max_version: Version) -> Self {
        self.max_version = max_version;
        self
    }

    pub fn trust_duration(mut self, duration: Duration) -> Self {
        self.trust_duration = duration;
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

    fn registry(&self) -> Result<RegistryClient<'a, L>> {
        Ok(RegistryClient::new(self.ctx, self.contracts.registry()?).max_version(self.max_version))
    }

    async fn deploy_code(
        &self,
        contract_name: &str,
        init_code: impl Into<Bytes>,
        value: Option<U256>,
    ) -> Result<DeployedUnit> {
        let unit = self.ctx.deploy_bytecode(init_code, value).await?;
        tracing::info!(
            contract = contract_name,
            address = %unit.address,
            tx_hash = %unit.tx_hash,
            "Contract deployed"
        );
        Ok(unit)
    }

    async fn deploy_artifact(
        &self,
        artifact: &Artifact,
        args: &[String],
        value: Option<U256>,
    ) -> Result<DeployedUnit> {
        let init_code = artifact.encode_deploy(args)?;
        self.deploy_code(&artifact.contract_name, init_code, value)
            .await
    }

    /// Decide between registering and updating `name` at `version`.
    ///
    /// Reads only. Every registry precondition is checked here so that a request the registry
    /// would reject fails before anything is deployed.
    async fn plan_record(
        &self,
        registry: &RegistryClient<'a, L>,
        name: &str,
        version: Version,
    ) -> Result<RecordPlan> {
        encode_name(name)?;
        if version > self.max_version {
            return Err(ScrError::VersionOutOfRange {
                version,
                max: self.max_version,
            });
        }

        match registry.get_record(name, self.ctx.signer, None).await? {
            None => Ok(RecordPlan::Register),
            Some(existing) if existing.version < version => {
                tracing::debug!(
                    name,
                    previous = %existing.version,
                    version = %version,
                    "Existing record will be updated"
                );
                Ok(RecordPlan::Update)
            }
            Some(existing) => Err(ScrError::VersionNotMonotonic {
                previous: existing.version,
                requested: version,
            }),
        }
    }

    async fn plan_request(&self, request: &DeployRequest) -> Result<Option<RecordPlan>> {
        if !request.storage.on_chain {
            return Ok(None);
        }
        let registry = self.registry()?;
        let plan = self
            .plan_record(&registry, request.record_name(), request.storage.version)
            .await?;
        Ok(Some(plan))
    }

    async fn reconcile(&self, plan: RecordPlan, draft: RecordDraft) -> Result<(Record, Option<Record>)> {
        let registry = self.registry()?;
        let admin = self.ctx.signer;

        match plan {
            RecordPlan::Register => Ok((registry.register(&draft, admin).await?, None)),
            RecordPlan::Update => {
                let mut update = UpdateRequest::new(draft.name, draft.version)
                    .logic(draft.logic, draft.logic_code_hash);
                if let Some(proxy) = draft.proxy {
                    update = update.proxy(proxy);
                }
                let update = registry.update(&update, admin).await?;
                Ok((update.new, Some(update.previous)))
            }
        }
    }

    /// Deploy a regular (non-proxied) contract.
    ///
    /// When storing on chain, an existing record with a lower version is updated and a missing
    /// one is registered. An existing record at the same or a higher version is refused before
    /// the contract is deployed.
    pub async fn deploy(&self, request: &DeployRequest) -> Result<DeployOutcome> {
        let artifact = self.artifacts.load(&request.contract_name)?;
        let init_code = artifact.encode_deploy(&request.args)?;
        let plan = self.plan_request(request).await?;

        let unit = self
            .deploy_code(&request.contract_name, init_code, request.value)
            .await?;
        let deployment = regular_deployment(&request.contract_name, &unit, request.storage.tag.clone());

        if request.storage.off_chain {
            self.manifest.upsert_contract(deployment.clone().into())?;
        }

        let mut outcome = DeployOutcome::new(deployment.into());
        if let Some(plan) = plan {
            let draft = RecordDraft {
                name: request.record_name().to_string(),
                proxy: None,
                logic: unit.address,
                version: request.storage.version,
                logic_code_hash: unit.byte_code_hash,
            };
            let (record, previous) = self.reconcile(plan, draft).await?;
            outcome.record = Some(record);
            outcome.previous_record = previous;
        }

        Ok(outcome)
    }

    /// Deploy a logic contract behind a `TransparentUpgradeableProxy`.
    pub async fn deploy_upgradeable(&self, request: &DeployRequest) -> Result<DeployOutcome> {
        let artifact = self.artifacts.load(&request.contract_name)?;
        let logic_code = artifact.encode_deploy(&[])?;
        let init_data = if request.initialize {
            artifact.encode_initializer(&request.args)?
        } else {
            if !request.args.is_empty() {
                tracing::warn!(
                    contract = %request.contract_name,
                    "Arguments given without initialization, they are ignored"
                );
            }
            Bytes::new()
        };
        let proxy_artifact = self.artifacts.load(PROXY_ARTIFACT)?;
        let guard = self.guard()?;
        let plan = self.plan_request(request).await?;

        let (admin_address, new_admin) = self.resolve_admin(request.proxy_admin).await?;
        let admin = guard.verify(self.ctx, admin_address).await?;

        let admin_deployment = match new_admin {
            Some(deployment) => deployment,
            None => self
                .manifest
                .find_proxy_admin(None, Some(admin_address))?
                .unwrap_or_else(|| RegularDeployment {
                    contract_name: PROXY_ADMIN_ARTIFACT.to_string(),
                    address: admin_address,
                    deploy_timestamp: None,
                    deploy_tx_hash: None,
                    byte_code_hash: Some(guard.expected_code_hash()),
                    tag: None,
                }),
        };

        let logic = self
            .deploy_code(&request.contract_name, logic_code, None)
            .await?;

        let mut init_code = proxy_artifact.bytecode.to_vec();
        init_code.extend(proxy_constructor_args(logic.address, admin_address, &init_data));
        let proxy = self
            .deploy_code(PROXY_ARTIFACT, init_code, request.value)
            .await?;

        self.check_proxy_wiring(&admin, proxy.address, logic.address)
            .await?;

        tracing::info!(
            contract = %request.contract_name,
            admin = %admin_address,
            proxy = %proxy.address,
            logic = %logic.address,
            "Upgradeable contract deployed"
        );

        let deployment = UpgradeDeployment {
            contract_name: request.contract_name.clone(),
            admin: admin_address,
            proxy: proxy.address,
            logic: logic.address,
            proxy_deploy_tx_hash: Some(proxy.tx_hash),
            logic_deploy_tx_hash: Some(logic.tx_hash),
            deploy_timestamp: Some(logic.timestamp),
            upgrade_timestamp: None,
            byte_code_hash: Some(logic.byte_code_hash),
            tag: request.storage.tag.clone(),
        };

        if request.storage.off_chain {
            self.manifest
                .save_deployment(deployment.clone().into(), Some(admin_deployment.clone()))?;
        }

        let mut outcome = DeployOutcome::new(deployment.into());
        outcome.proxy_admin = Some(admin_deployment);

        if let Some(plan) = plan {
            let draft = RecordDraft {
                name: request.record_name().to_string(),
                proxy: Some(proxy.address),
                logic: logic.address,
                version: request.storage.version,
                logic_code_hash: logic.byte_code_hash,
            };
            let (record, previous) = self.reconcile(plan, draft).await?;
            outcome.record = Some(record);
            outcome.previous_record = previous;
        }

        Ok(outcome)
    }

    /// Resolve the admin for a new proxy: explicit, configured, first in the manifest, or a
    /// freshly deployed one after confirmation.
    async fn resolve_admin(
        &self,
        explicit: Option<Address>,
    ) -> Result<(Address, Option<RegularDeployment>)> {
        if let Some(admin) = explicit.or(self.contracts.proxy_admin) {
            return Ok((admin, None));
        }

        if let Some(known) = self.manifest.find_proxy_admin(None, None)? {
            tracing::info!(admin = %known.address, "Using the first ProxyAdmin found in the manifest");
            return Ok((known.address, None));
        }

        require_consent(
            self.consent,
            "No ProxyAdmin provided. Do you want to deploy a new ProxyAdmin?",
        )
        .await?;

        let artifact = self.artifacts.load(PROXY_ADMIN_ARTIFACT)?;
        let unit = self.deploy_artifact(&artifact, &[], None).await?;
        Ok((unit.address, Some(regular_deployment(PROXY_ADMIN_ARTIFACT, &unit, None))))
    }

    /// The new proxy must point at `logic` and be administered by `admin`.
    async fn check_proxy_wiring(
        &self,
        admin: &VerifiedAdmin<'_, L>,
        proxy: Address,
        logic: Address,
    ) -> Result<()> {
        let read_admin_slot = async {
            let word = self.ctx.ledger.get_storage_at(proxy, ADMIN_SLOT).await?;
            Ok::<_, ScrError>(slot_to_address(word))
        };
        let (actual_logic, actual_admin) =
            futures::try_join!(admin.proxy_implementation(proxy), read_admin_slot)?;

        if actual_logic != logic {
            return Err(ScrError::UpgradeVerificationFailed {
                proxy,
                previous: Address::ZERO,
                expected: logic,
                actual: actual_logic,
            });
        }
        if actual_admin != admin.address() {
            return Err(ScrError::ProxyAdminMismatch {
                proxy,
                expected: admin.address(),
                actual: actual_admin,
            });
        }
        Ok(())
    }

    /// Deploy through a delegate deployer contract, which deploys and registers in a single
    /// transaction. The signer must trust the delegate first.
    pub async fn deploy_with_deployer(
        &self,
        request: &DeployRequest,
        upgradeable: bool,
        deployer: Option<Address>,
    ) -> Result<DeployOutcome> {
        let deployer = match (deployer, upgradeable) {
            (Some(deployer), _) => deployer,
            (None, false) => self.contracts.contract_deployer()?,
            (None, true) => self.contracts.upgradeable_deployer()?,
        };

        let name = request.record_name();
        let name_word = encode_name(name)?;
        let version = request.storage.version;
        let artifact = self.artifacts.load(&request.contract_name)?;

        let (bytecode, data) = if upgradeable {
            let data = if request.initialize || !request.args.is_empty() {
                artifact.encode_initializer(&request.args)?
            } else {
                Bytes::new()
            };
            (artifact.bytecode.clone(), data)
        } else {
            (artifact.encode_deploy(&request.args)?, Bytes::new())
        };

        // The delegate publishes the record itself, registering or updating as needed.
        let registry = self.registry()?;
        self.plan_record(&registry, name, version).await?;

        let trust = TrustGate::new(self.ctx, self.contracts.code_trust()?)
            .ensure_trusted(deployer, self.consent, self.trust_duration)
            .await?;

        let salt = B256::from(rand::random::<[u8; 32]>());
        let input = if upgradeable {
            IUpgradeableDeployer::deployContractCall {
                name: name_word,
                bytecode,
                data,
                salt,
                version: version.packed(),
            }
            .abi_encode()
        } else {
            IContractDeployer::deployContractCall {
                name: name_word,
                bytecode,
                data,
                salt,
                version: version.packed(),
            }
            .abi_encode()
        };

        tracing::info!(
            contract = %request.contract_name,
            deployer = %deployer,
            salt = %salt,
            upgradeable,
            "Deploying through delegate"
        );
        let tx = TxRequest::call(self.ctx.signer, deployer, input).value(request.value);
        let receipt = self.ctx.send(tx).await?;

        let record = registry
            .get_record(name, self.ctx.signer, Some(version))
            .await?
            .ok_or_else(|| ScrError::RecordNotFound {
                name: name.to_string(),
                admin: self.ctx.signer,
            })?;

        let (deployment, proxy_admin) = if upgradeable {
            let proxy = record.proxy.ok_or(ScrError::NotUpgradeable(record.logic))?;
            let admin = slot_to_address(self.ctx.ledger.get_storage_at(proxy, ADMIN_SLOT).await?);
            let deployment = UpgradeDeployment {
                contract_name: request.contract_name.clone(),
                admin,
                proxy,
                logic: record.logic,
                proxy_deploy_tx_hash: Some(receipt.transaction_hash),
                logic_deploy_tx_hash: Some(receipt.transaction_hash),
                deploy_timestamp: Some(record.timestamp),
                upgrade_timestamp: None,
                byte_code_hash: Some(record.logic_code_hash),
                tag: request.storage.tag.clone(),
            };
            let admin_deployment = RegularDeployment {
                contract_name: PROXY_ADMIN_ARTIFACT.to_string(),
                address: admin,
                deploy_timestamp: None,
                deploy_tx_hash: None,
                byte_code_hash: None,
                tag: None,
            };
            (ContractDeployment::from(deployment), Some(admin_deployment))
        } else {
            let deployment = RegularDeployment {
                contract_name: request.contract_name.clone(),
                address: record.logic,
                deploy_timestamp: Some(record.timestamp),
                deploy_tx_hash: Some(receipt.transaction_hash),
                byte_code_hash: Some(record.logic_code_hash),
                tag: request.storage.tag.clone(),
            };
            (ContractDeployment::from(deployment), None)
        };

        if request.storage.off_chain {
            let known_admin = match &proxy_admin {
                Some(admin) => self.manifest.find_proxy_admin(None, Some(admin.address))?,
                None => None,
            };
            // Keep an existing admin entry rather than overwrite it with a bare one.
            let admin_entry = if known_admin.is_some() {
                None
            } else {
                proxy_admin.clone()
            };
            self.manifest.save_deployment(deployment.clone(), admin_entry)?;
        }

        tracing::info!(
            name,
            version = %record.version,
            address = %record.public_address(),
            "Delegated deployment registered"
        );

        Ok(DeployOutcome {
            deployment,
            proxy_admin,
            record: Some(record),
            previous_record: None,
            trust: Some(trust),
        })
    }

    /// Bootstrap the shared services of a network: `CodeTrust`, `ContractRegistry` and,
    /// unless disabled, `ContractDeployer`.
    ///
    /// Services given in `init` are reused instead of deployed. Every service but the registry
    /// (which registers itself at construction) is registered at [`Version::INITIAL`], and all
    /// of them are written to the manifest. Pointing the configuration at the new services is
    /// left to the caller, see [`SystemDeployment::apply_to`].
    pub async fn initialize_system(&self, init: &SystemInit) -> Result<SystemDeployment> {
        let code_trust_artifact = self.artifacts.load(CODE_TRUST_ARTIFACT)?;
        let registry_source = match init.registry {
            Some(address) => Service::Known(self.existing_service(REGISTRY_ARTIFACT, address).await?),
            None => Service::Deploy(self.artifacts.load(REGISTRY_ARTIFACT)?),
        };
        let deployer_source = match (init.contract_deployer, init.deploy_contract_deployer) {
            (Some(address), _) => Some(Service::Known(
                self.existing_service(CONTRACT_DEPLOYER_ARTIFACT, address)
                    .await?,
            )),
            (None, true) => Some(Service::Deploy(
                self.artifacts.load(CONTRACT_DEPLOYER_ARTIFACT)?,
            )),
            (None, false) => None,
        };

        // A reused registry may already hold the records about to be registered.
        if let Service::Known(registry) = &registry_source {
            let client = RegistryClient::new(self.ctx, registry.address).max_version(self.max_version);
            let names = std::iter::once(CODE_TRUST_ARTIFACT)
                .chain(deployer_source.as_ref().map(|_| CONTRACT_DEPLOYER_ARTIFACT));
            for name in names {
                if let Some(existing) = client.get_record(name, self.ctx.signer, None).await? {
                    return Err(ScrError::VersionNotMonotonic {
                        previous: existing.version,
                        requested: Version::INITIAL,
                    });
                }
            }
        }

        if let Some(existing) = self.contracts.code_trust {
            require_consent(
                self.consent,
                &format!("CodeTrust is already configured at {existing}. Deploy a new CodeTrust?"),
            )
            .await?;
        }

        let unit = self.deploy_artifact(&code_trust_artifact, &[], None).await?;
        warn_on_code_mismatch(&code_trust_artifact, &unit);
        let code_trust = regular_deployment(CODE_TRUST_ARTIFACT, &unit, None);

        let registry_deployed = matches!(registry_source, Service::Deploy(_));
        let registry = match registry_source {
            Service::Known(registry) => registry,
            Service::Deploy(artifact) => {
                let mut init_code = artifact.bytecode.to_vec();
                init_code.extend(registry_constructor_args(
                    code_trust.address,
                    encode_name(REGISTRY_ARTIFACT)?,
                    Version::INITIAL.packed(),
                    artifact.deployed_code_hash(),
                ));
                let unit = self.deploy_code(REGISTRY_ARTIFACT, init_code, None).await?;
                warn_on_code_mismatch(&artifact, &unit);
                regular_deployment(REGISTRY_ARTIFACT, &unit, None)
            }
        };

        let contract_deployer = match deployer_source {
            Some(Service::Known(deployer)) => Some(deployer),
            Some(Service::Deploy(artifact)) => {
                let mut init_code = artifact.bytecode.to_vec();
                init_code.extend(deployer_constructor_args(registry.address));
                let unit = self
                    .deploy_code(CONTRACT_DEPLOYER_ARTIFACT, init_code, None)
                    .await?;
                warn_on_code_mismatch(&artifact, &unit);
                Some(regular_deployment(CONTRACT_DEPLOYER_ARTIFACT, &unit, None))
            }
            None => None,
        };

        let client = RegistryClient::new(self.ctx, registry.address).max_version(self.max_version);
        let mut records = Vec::new();
        match client
            .get_record(REGISTRY_ARTIFACT, self.ctx.signer, None)
            .await?
        {
            Some(record) => records.push(record),
            // A new registry registers itself to its deployer.
            None if registry_deployed => {
                return Err(ScrError::RecordNotFound {
                    name: REGISTRY_ARTIFACT.to_string(),
                    admin: self.ctx.signer,
                });
            }
            None => tracing::debug!(registry = %registry.address, "Reused registry has no record of its own"),
        }
        for service in std::iter::once(&code_trust).chain(contract_deployer.as_ref()) {
            let draft = RecordDraft {
                name: service.contract_name.clone(),
                proxy: None,
                logic: service.address,
                version: Version::INITIAL,
                logic_code_hash: service.byte_code_hash.unwrap_or_default(),
            };
            records.push(client.register(&draft, self.ctx.signer).await?);
        }

        for service in [&code_trust, &registry]
            .into_iter()
            .chain(contract_deployer.as_ref())
        {
            self.manifest.upsert_contract(service.clone().into())?;
        }

        tracing::info!(
            code_trust = %code_trust.address,
            registry = %registry.address,
            contract_deployer = ?contract_deployer.as_ref().map(|d| d.address),
            "System contracts initialized"
        );

        Ok(SystemDeployment {
            code_trust,
            registry,
            contract_deployer,
            records,
        })
    }

    /// A service that is already deployed, identified by the hash of its code.
    async fn existing_service(&self, contract_name: &str, address: Address) -> Result<RegularDeployment> {
        let code = self.ctx.ledger.get_code(address).await?;
        if code.is_empty() {
            return Err(ScrError::Config(format!(
                "no {contract_name} deployed at {address}"
            )));
        }
        Ok(RegularDeployment {
            contract_name: contract_name.to_string(),
            address,
            deploy_timestamp: None,
            deploy_tx_hash: None,
            byte_code_hash: Some(keccak256(&code)),
            tag: None,
        })
    }
}

fn regular_deployment(contract_name: &str, unit: &DeployedUnit, tag: Option<String>) -> RegularDeployment {
    RegularDeployment {
        contract_name: contract_name.to_string(),
        address: unit.address,
        deploy_timestamp: Some(unit.timestamp),
        deploy_tx_hash: Some(unit.tx_hash),
        byte_code_hash: Some(unit.byte_code_hash),
        tag,
    }
}

fn warn_on_code_mismatch(artifact: &Artifact, unit: &DeployedUnit) {
    let expected = artifact.deployed_code_hash();
    if unit.byte_code_hash != expected {
        tracing::warn!(
            contract = %artifact.contract_name,
            address = %unit.address,
            expected = %expected,
            actual = %unit.byte_code_hash,
            "Deployed code differs from the artifact"
        );
    }
}
