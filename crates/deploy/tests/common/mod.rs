//! Shared fixtures for the integration tests.
//!
//! [`MockLedger`] is an in-memory chain that decodes the real calldata sent by the engine and
//! simulates the registry, the trust service, proxy admins, transparent proxies and both
//! delegate deployers. Every transaction mines its own block, `BLOCK_TIME` seconds after the
//! previous one. A reverted transaction leaves the state untouched.

#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use alloy_core::{
    primitives::{Address, B256, Bytes, U256, address, keccak256},
    sol_types::{SolCall, SolInterface, SolValue},
};
use scr_deploy::{
    ArtifactStore, ExecutionContext, Ledger, ManifestStore, Network, SystemContracts, TxReceipt,
    TxRequest,
    contracts::{
        ADMIN_SLOT, ICodeTrust, IContractDeployer, IContractRegistry, IMPLEMENTATION_SLOT,
        IProxyAdmin, IUpgradeableDeployer, RawRecord, encode_name, slot_to_address,
    },
};
use tempdir::TempDir;

pub const CHAIN_ID: u64 = 31337;
pub const GENESIS_TIME: u64 = 1_700_000_000;
pub const BLOCK_TIME: u64 = 12;

pub const SIGNER: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
pub const REGISTRY_OWNER: Address = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");

pub const REGISTRY: Address = address!("0000000000000000000000000000000000005c01");
pub const CODE_TRUST: Address = address!("0000000000000000000000000000000000005c02");
pub const CONTRACT_DEPLOYER: Address = address!("0000000000000000000000000000000000005c03");
pub const UPGRADEABLE_DEPLOYER: Address = address!("0000000000000000000000000000000000005c04");

/// Contract kinds the mock knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Registry,
    CodeTrust,
    ProxyAdmin { owner: Address },
    Proxy,
    ContractDeployer,
    UpgradeableDeployer,
    Logic,
}

/// What a creation transaction instantiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    ProxyAdmin,
    Proxy,
    Logic,
    CodeTrust,
    /// Registers itself to its deployer on construction.
    Registry,
    ContractDeployer,
}

#[derive(Debug, Clone)]
struct Template {
    creation: Bytes,
    runtime: Bytes,
    kind: TemplateKind,
}

type Exec<T> = std::result::Result<T, String>;

#[derive(Debug, Clone, Default)]
struct State {
    time: u64,
    block_number: u64,
    created: u64,
    code: HashMap<Address, Bytes>,
    kinds: HashMap<Address, Kind>,
    storage: HashMap<(Address, B256), B256>,
    templates: Vec<Template>,
    receipts: HashMap<B256, TxReceipt>,
    blocks: HashMap<B256, u64>,
    sent: Vec<TxRequest>,
    reverts: Vec<String>,
    records: BTreeMap<(B256, Address), Vec<RawRecord>>,
    names: BTreeMap<Address, Vec<B256>>,
    registry_owner: Address,
    /// (code, truster) -> (granted at, trusted until)
    trust: HashMap<(Address, Address), (u64, u64)>,
    initialized: Vec<(Address, Bytes)>,
    forge_noop_upgrades: bool,
    /// Admin written to the admin slot of every new proxy, whatever the constructor says.
    misrouted_admin: Option<Address>,
}

impl State {
    fn mine(&mut self, tx: TxRequest) -> B256 {
        let now = self.time + BLOCK_TIME;

        let mut next = self.clone();
        let (status, contract_address) = match next.execute(&tx, now) {
            Ok(created) => {
                *self = next;
                (true, created)
            }
            Err(reason) => {
                tracing::debug!(reason = %reason, "Mock transaction reverted");
                self.reverts.push(reason);
                (false, None)
            }
        };

        self.time = now;
        self.block_number += 1;
        let block_hash = keccak256(format!("block-{}", self.block_number));
        let tx_hash = keccak256(format!("tx-{}", self.block_number));

        self.blocks.insert(block_hash, now);
        self.receipts.insert(
            tx_hash,
            TxReceipt {
                transaction_hash: tx_hash,
                block_hash,
                block_number: self.block_number,
                contract_address,
                status,
            },
        );
        self.sent.push(tx);
        tx_hash
    }

    fn execute(&mut self, tx: &TxRequest, now: u64) -> Exec<Option<Address>> {
        let Some(to) = tx.to else {
            return self.create(tx.from, &tx.input).map(Some);
        };

        let kind = self
            .kinds
            .get(&to)
            .copied()
            .ok_or_else(|| format!("no contract at {to}"))?;

        match kind {
            Kind::Registry => self.registry_tx(&tx.input, now)?,
            Kind::CodeTrust => self.trust_tx(tx.from, &tx.input, now)?,
            Kind::ProxyAdmin { owner } => self.admin_tx(to, owner, tx.from, &tx.input)?,
            Kind::ContractDeployer => self.deployer_tx(false, to, tx.from, &tx.input, now)?,
            Kind::UpgradeableDeployer => self.deployer_tx(true, to, tx.from, &tx.input, now)?,
            Kind::Proxy | Kind::Logic => return Err(format!("{to} accepts no transactions")),
        }
        Ok(None)
    }

    fn next_address(&mut self) -> Address {
        self.created += 1;
        let mut bytes = [0u8; 20];
        bytes[0] = 0xc0;
        bytes[12..].copy_from_slice(&self.created.to_be_bytes());
        Address::from(bytes)
    }

    fn template(&self, kind: TemplateKind) -> Exec<Template> {
        self.templates
            .iter()
            .find(|t| t.kind == kind)
            .cloned()
            .ok_or_else(|| format!("no {kind:?} template installed"))
    }

    fn create(&mut self, from: Address, init_code: &[u8]) -> Exec<Address> {
        let template = self
            .templates
            .iter()
            .find(|t| init_code.starts_with(&t.creation))
            .cloned()
            .ok_or("unknown creation code")?;
        let args = &init_code[template.creation.len()..];

        let address = self.next_address();
        self.code.insert(address, template.runtime.clone());
        let kind = match template.kind {
            TemplateKind::ProxyAdmin => Kind::ProxyAdmin { owner: from },
            TemplateKind::Logic => Kind::Logic,
            TemplateKind::CodeTrust => Kind::CodeTrust,
            TemplateKind::ContractDeployer => Kind::ContractDeployer,
            TemplateKind::Registry => {
                let (_code_trust, name, version, logic_code_hash) =
                    <(Address, B256, u16, B256)>::abi_decode_params(args, true)
                        .map_err(|e| format!("bad registry constructor arguments: {e}"))?;
                // Every registry of the mock shares one record book.
                self.publish(
                    from,
                    RawRecord {
                        name,
                        proxy: address,
                        logic: address,
                        admin: from,
                        version,
                        logicCodeHash: logic_code_hash,
                        extraData: Bytes::new(),
                        timestamp: U256::from(self.time + BLOCK_TIME),
                    },
                )?;
                Kind::Registry
            }
            TemplateKind::Proxy => {
                let (logic, admin, data) = <(Address, Address, Bytes)>::abi_decode_params(args, true)
                    .map_err(|e| format!("bad proxy constructor arguments: {e}"))?;
                self.init_proxy(address, logic, admin, data)?;
                Kind::Proxy
            }
        };
        self.kinds.insert(address, kind);
        Ok(address)
    }

    fn init_proxy(&mut self, proxy: Address, logic: Address, admin: Address, data: Bytes) -> Exec<()> {
        if !self.code.contains_key(&logic) {
            return Err("proxy logic has no code".to_string());
        }
        self.storage
            .insert((proxy, IMPLEMENTATION_SLOT), logic.into_word());
        let admin = self.misrouted_admin.unwrap_or(admin);
        self.storage.insert((proxy, ADMIN_SLOT), admin.into_word());
        if !data.is_empty() {
            self.initialized.push((proxy, data));
        }
        Ok(())
    }

    fn slot_address(&self, address: Address, slot: B256) -> Address {
        slot_to_address(self.storage.get(&(address, slot)).copied().unwrap_or_default())
    }

    fn latest_record(&self, name: B256, admin: Address) -> Option<&RawRecord> {
        self.records.get(&(name, admin)).and_then(|records| records.last())
    }

    fn push_record(&mut self, admin: Address, record: RawRecord) {
        let name = record.name;
        let records = self.records.entry((name, admin)).or_default();
        records.push(record);
        records.sort_by_key(|r| r.version);

        let names = self.names.entry(admin).or_default();
        if !names.contains(&name) {
            names.push(name);
        }
    }

    fn publish(&mut self, admin: Address, record: RawRecord) -> Exec<()> {
        match self.latest_record(record.name, admin) {
            Some(latest) if record.version <= latest.version => {
                Err("version must increase".to_string())
            }
            _ => {
                self.push_record(admin, record);
                Ok(())
            }
        }
    }

    fn registry_tx(&mut self, input: &[u8], now: u64) -> Exec<()> {
        use IContractRegistry::IContractRegistryCalls as Calls;

        match Calls::abi_decode(input, true).map_err(|e| e.to_string())? {
            Calls::register(call) => {
                if self.records.contains_key(&(call.name, call.admin)) {
                    return Err("record already registered".to_string());
                }
                self.push_record(
                    call.admin,
                    RawRecord {
                        name: call.name,
                        proxy: call.proxy,
                        logic: call.logic,
                        admin: call.admin,
                        version: call.version,
                        logicCodeHash: call.logicCodeHash,
                        extraData: Bytes::new(),
                        timestamp: U256::from(now),
                    },
                );
                Ok(())
            }
            Calls::update(call) => {
                let latest = self
                    .latest_record(call.name, call.admin)
                    .ok_or("record not found")?;
                if call.version <= latest.version {
                    return Err("version must increase".to_string());
                }
                let extra_data = latest.extraData.clone();
                self.push_record(
                    call.newAdmin,
                    RawRecord {
                        name: call.name,
                        proxy: call.proxy,
                        logic: call.logic,
                        admin: call.newAdmin,
                        version: call.version,
                        logicCodeHash: call.logicCodeHash,
                        extraData: extra_data,
                        timestamp: U256::from(now),
                    },
                );
                Ok(())
            }
            _ => Err("view function called in a transaction".to_string()),
        }
    }

    fn trust_tx(&mut self, from: Address, input: &[u8], now: u64) -> Exec<()> {
        let call = ICodeTrust::trustCodeAtCall::abi_decode(input, true).map_err(|e| e.to_string())?;
        let duration = u64::try_from(call.duration).map_err(|e| e.to_string())?;
        if duration < 10 {
            return Err("duration too short".to_string());
        }
        self.trust
            .insert((call.trustedCode, from), (now, now + duration));
        Ok(())
    }

    fn is_trusted(&self, code: Address, by: Address, at: u64) -> bool {
        matches!(self.trust.get(&(code, by)), Some((granted, until)) if *granted <= at && at <= *until)
    }

    fn admin_tx(&mut self, admin: Address, owner: Address, from: Address, input: &[u8]) -> Exec<()> {
        use IProxyAdmin::IProxyAdminCalls as Calls;

        let (proxy, implementation, data) = match Calls::abi_decode(input, true).map_err(|e| e.to_string())? {
            Calls::upgrade(call) => (call.proxy, call.implementation, None),
            Calls::upgradeAndCall(call) => (call.proxy, call.implementation, Some(call.data)),
            _ => return Err("view function called in a transaction".to_string()),
        };

        if from != owner {
            return Err("caller is not the owner".to_string());
        }
        if self.slot_address(proxy, ADMIN_SLOT) != admin {
            return Err("not the admin of this proxy".to_string());
        }
        if !self.code.contains_key(&implementation) {
            return Err("implementation has no code".to_string());
        }
        if self.forge_noop_upgrades {
            return Ok(());
        }

        self.storage
            .insert((proxy, IMPLEMENTATION_SLOT), implementation.into_word());
        if let Some(data) = data {
            self.initialized.push((proxy, data));
        }
        Ok(())
    }

    fn deployer_tx(
        &mut self,
        upgradeable: bool,
        deployer: Address,
        from: Address,
        input: &[u8],
        now: u64,
    ) -> Exec<()> {
        let (name, bytecode, data, version) = if upgradeable {
            let call = IUpgradeableDeployer::deployContractCall::abi_decode(input, true)
                .map_err(|e| e.to_string())?;
            (call.name, call.bytecode, call.data, call.version)
        } else {
            let call = IContractDeployer::deployContractCall::abi_decode(input, true)
                .map_err(|e| e.to_string())?;
            (call.name, call.bytecode, call.data, call.version)
        };

        if !self.is_trusted(deployer, from, now) {
            return Err("deployer is not trusted by the caller".to_string());
        }

        let logic = self.create(deployer, &bytecode)?;
        let logic_code_hash = keccak256(&self.code[&logic]);

        let proxy = if upgradeable {
            let admin_template = self.template(TemplateKind::ProxyAdmin)?;
            let admin = self.create(from, &admin_template.creation)?;

            let proxy_template = self.template(TemplateKind::Proxy)?;
            let proxy = self.next_address();
            self.code.insert(proxy, proxy_template.runtime);
            self.kinds.insert(proxy, Kind::Proxy);
            self.init_proxy(proxy, logic, admin, data)?;
            proxy
        } else {
            logic
        };

        self.publish(
            from,
            RawRecord {
                name,
                proxy,
                logic,
                admin: from,
                version,
                logicCodeHash: logic_code_hash,
                extraData: Bytes::new(),
                timestamp: U256::from(now),
            },
        )
    }

    fn view(&self, from: Address, to: Address, input: &[u8]) -> Exec<Bytes> {
        let Some(kind) = self.kinds.get(&to).copied() else {
            return Ok(Bytes::new());
        };

        let output = match kind {
            Kind::Registry => self.registry_view(from, input)?,
            Kind::CodeTrust => {
                let call = ICodeTrust::isTrustedCodeCall::abi_decode(input, true)
                    .map_err(|e| e.to_string())?;
                let at = u64::try_from(call.extTimestamp).unwrap_or(u64::MAX);
                ICodeTrust::isTrustedCodeCall::abi_encode_returns(&(self.is_trusted(
                    call.trustedCode,
                    call.by,
                    at,
                ),))
            }
            Kind::ProxyAdmin { owner } => {
                use IProxyAdmin::IProxyAdminCalls as Calls;

                match Calls::abi_decode(input, true).map_err(|e| e.to_string())? {
                    Calls::getProxyImplementation(call) => {
                        IProxyAdmin::getProxyImplementationCall::abi_encode_returns(&(
                            self.slot_address(call.proxy, IMPLEMENTATION_SLOT),
                        ))
                    }
                    Calls::getProxyAdmin(call) => IProxyAdmin::getProxyAdminCall::abi_encode_returns(
                        &(self.slot_address(call.proxy, ADMIN_SLOT),),
                    ),
                    Calls::owner(_) => IProxyAdmin::ownerCall::abi_encode_returns(&(owner,)),
                    _ => return Err("state changing function called as a view".to_string()),
                }
            }
            _ => return Err(format!("{to} exposes no views")),
        };
        Ok(output.into())
    }

    fn registry_view(&self, from: Address, input: &[u8]) -> Exec<Vec<u8>> {
        use IContractRegistry::IContractRegistryCalls as Calls;

        let output = match Calls::abi_decode(input, true).map_err(|e| e.to_string())? {
            Calls::getRecord(call) => {
                let found = self
                    .records
                    .get(&(call.name, call.admin))
                    .and_then(|records| records.iter().rev().find(|r| r.version <= call.version))
                    .cloned();
                match found {
                    Some(record) => IContractRegistry::getRecordCall::abi_encode_returns(&(true, record)),
                    None => IContractRegistry::getRecordCall::abi_encode_returns(&(false, empty_record())),
                }
            }
            Calls::getMyRecords(_) => IContractRegistry::getMyRecordsCall::abi_encode_returns(&(
                self.names.get(&from).cloned().unwrap_or_default(),
            )),
            Calls::getSystemRecords(_) => {
                IContractRegistry::getSystemRecordsCall::abi_encode_returns(&(self
                    .names
                    .get(&self.registry_owner)
                    .cloned()
                    .unwrap_or_default(),))
            }
            Calls::owner(_) => IContractRegistry::ownerCall::abi_encode_returns(&(self.registry_owner,)),
            _ => return Err("state changing function called as a view".to_string()),
        };
        Ok(output)
    }
}

fn empty_record() -> RawRecord {
    RawRecord {
        name: B256::ZERO,
        proxy: Address::ZERO,
        logic: Address::ZERO,
        admin: Address::ZERO,
        version: 0,
        logicCodeHash: B256::ZERO,
        extraData: Bytes::new(),
        timestamp: U256::ZERO,
    }
}

/// In-memory ledger shared between clones.
#[derive(Debug, Clone)]
pub struct MockLedger {
    state: Arc<Mutex<State>>,
}

impl MockLedger {
    /// A chain with the registry, trust service and both deployers installed.
    pub fn new() -> Self {
        let ledger = Self {
            state: Arc::new(Mutex::new(State {
                time: GENESIS_TIME,
                registry_owner: REGISTRY_OWNER,
                ..Default::default()
            })),
        };
        ledger.install(REGISTRY, Kind::Registry);
        ledger.install(CODE_TRUST, Kind::CodeTrust);
        ledger.install(CONTRACT_DEPLOYER, Kind::ContractDeployer);
        ledger.install(UPGRADEABLE_DEPLOYER, Kind::UpgradeableDeployer);
        ledger
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("mock ledger poisoned")
    }

    /// Place a contract of `kind` at `address` with placeholder code.
    pub fn install(&self, address: Address, kind: Kind) {
        let runtime = Bytes::from(keccak256(address.as_slice()).to_vec());
        self.install_with_code(address, runtime, kind);
    }

    pub fn install_with_code(&self, address: Address, runtime: Bytes, kind: Kind) {
        let mut state = self.state();
        state.code.insert(address, runtime);
        state.kinds.insert(address, kind);
    }

    /// Creation transactions starting with `creation` instantiate `kind` with `runtime` code.
    pub fn add_template(&self, creation: Bytes, runtime: Bytes, kind: TemplateKind) {
        self.state().templates.push(Template {
            creation,
            runtime,
            kind,
        });
    }

    /// Make every proxy admin report success on `upgrade` without touching the proxy.
    pub fn forge_noop_upgrades(&self, forge: bool) {
        self.state().forge_noop_upgrades = forge;
    }

    /// Write `admin` to the admin slot of every proxy created from now on.
    pub fn misroute_proxy_admins(&self, admin: Option<Address>) {
        self.state().misrouted_admin = admin;
    }

    /// Trust `code` on behalf of `truster` for `duration` seconds from now.
    pub fn grant_trust(&self, code: Address, truster: Address, duration: u64) {
        let mut state = self.state();
        let now = state.time;
        state.trust.insert((code, truster), (now, now + duration));
    }

    pub fn advance_time(&self, secs: u64) {
        self.state().time += secs;
    }

    pub fn now(&self) -> u64 {
        self.state().time
    }

    /// Every transaction submitted so far, reverted ones included.
    pub fn sent(&self) -> Vec<TxRequest> {
        self.state().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.state().sent.len()
    }

    pub fn reverts(&self) -> Vec<String> {
        self.state().reverts.clone()
    }

    pub fn implementation_of(&self, proxy: Address) -> Address {
        self.state().slot_address(proxy, IMPLEMENTATION_SLOT)
    }

    pub fn admin_of(&self, proxy: Address) -> Address {
        self.state().slot_address(proxy, ADMIN_SLOT)
    }

    pub fn kind_of(&self, address: Address) -> Option<Kind> {
        self.state().kinds.get(&address).copied()
    }

    /// Calldata forwarded to proxies at construction or through `upgradeAndCall`.
    pub fn initialized(&self) -> Vec<(Address, Bytes)> {
        self.state().initialized.clone()
    }

    /// Every stored version of `name` for `admin`, oldest first.
    pub fn records_of(&self, name: &str, admin: Address) -> Vec<RawRecord> {
        let name = encode_name(name).expect("test record name fits");
        self.state()
            .records
            .get(&(name, admin))
            .cloned()
            .unwrap_or_default()
    }
}

impl Ledger for MockLedger {
    async fn chain_id(&self) -> anyhow::Result<u64> {
        Ok(CHAIN_ID)
    }

    async fn get_code(&self, address: Address) -> anyhow::Result<Bytes> {
        Ok(self.state().code.get(&address).cloned().unwrap_or_default())
    }

    async fn get_storage_at(&self, address: Address, slot: B256) -> anyhow::Result<B256> {
        Ok(self
            .state()
            .storage
            .get(&(address, slot))
            .copied()
            .unwrap_or_default())
    }

    async fn call(&self, from: Option<Address>, to: Address, input: Bytes) -> anyhow::Result<Bytes> {
        self.state()
            .view(from.unwrap_or_default(), to, &input)
            .map_err(|reason| anyhow::anyhow!("execution reverted: {reason}"))
    }

    async fn send_transaction(&self, tx: TxRequest) -> anyhow::Result<B256> {
        Ok(self.state().mine(tx))
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> anyhow::Result<TxReceipt> {
        self.state()
            .receipts
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown transaction {tx_hash}"))
    }

    async fn block_timestamp(&self, block_hash: B256) -> anyhow::Result<u64> {
        self.state()
            .blocks
            .get(&block_hash)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("unknown block {block_hash}"))
    }

    async fn latest_timestamp(&self) -> anyhow::Result<u64> {
        Ok(self.state().time)
    }
}

/// A test artifact: distinct creation and runtime code per contract.
pub struct TestArtifact {
    pub name: &'static str,
    pub id: u8,
    pub kind: TemplateKind,
    pub abi: serde_json::Value,
}

impl TestArtifact {
    pub fn creation_code(&self) -> Bytes {
        Bytes::from(vec![0x60, 0x80, 0x60, 0x40, 0x52, self.id])
    }

    pub fn runtime_code(&self) -> Bytes {
        Bytes::from(vec![0x60, 0x80, 0x60, 0x40, self.id])
    }

    fn write(&self, dir: &Path) {
        let content = serde_json::json!({
            "_format": "hh-sol-artifact-1",
            "contractName": self.name,
            "sourceName": format!("contracts/{}.sol", self.name),
            "abi": self.abi,
            "bytecode": self.creation_code().to_string(),
            "deployedBytecode": self.runtime_code().to_string(),
            "linkReferences": {},
            "deployedLinkReferences": {}
        });
        let dir = dir.join(format!("{}.sol", self.name));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(format!("{}.json", self.name)),
            serde_json::to_string_pretty(&content).unwrap(),
        )
        .unwrap();
    }
}

fn initialize_abi() -> serde_json::Value {
    serde_json::json!([
        {
            "type": "function",
            "name": "initialize",
            "stateMutability": "nonpayable",
            "inputs": [{ "name": "start", "type": "uint256", "internalType": "uint256" }],
            "outputs": []
        }
    ])
}

/// Artifacts available in every fixture.
pub fn test_artifacts() -> Vec<TestArtifact> {
    vec![
        TestArtifact {
            name: "ProxyAdmin",
            id: 0x0a,
            kind: TemplateKind::ProxyAdmin,
            abi: serde_json::json!([]),
        },
        TestArtifact {
            name: "TransparentUpgradeableProxy",
            id: 0x0b,
            kind: TemplateKind::Proxy,
            abi: serde_json::json!([
                {
                    "type": "constructor",
                    "stateMutability": "payable",
                    "inputs": [
                        { "name": "_logic", "type": "address", "internalType": "address" },
                        { "name": "admin_", "type": "address", "internalType": "address" },
                        { "name": "_data", "type": "bytes", "internalType": "bytes" }
                    ]
                }
            ]),
        },
        TestArtifact {
            name: "CodeTrust",
            id: 0x0c,
            kind: TemplateKind::CodeTrust,
            abi: serde_json::json!([]),
        },
        TestArtifact {
            name: "ContractRegistry",
            id: 0x0d,
            kind: TemplateKind::Registry,
            abi: serde_json::json!([
                {
                    "type": "constructor",
                    "stateMutability": "nonpayable",
                    "inputs": [
                        { "name": "codeTrust", "type": "address", "internalType": "address" },
                        { "name": "name", "type": "bytes32", "internalType": "bytes32" },
                        { "name": "version", "type": "uint16", "internalType": "uint16" },
                        { "name": "logicCodeHash", "type": "bytes32", "internalType": "bytes32" }
                    ]
                }
            ]),
        },
        TestArtifact {
            name: "ContractDeployer",
            id: 0x0e,
            kind: TemplateKind::ContractDeployer,
            abi: serde_json::json!([
                {
                    "type": "constructor",
                    "stateMutability": "nonpayable",
                    "inputs": [
                        { "name": "registry", "type": "address", "internalType": "address" }
                    ]
                }
            ]),
        },
        TestArtifact {
            name: "Widget",
            id: 0x01,
            kind: TemplateKind::Logic,
            abi: serde_json::json!([]),
        },
        TestArtifact {
            name: "WidgetV2",
            id: 0x02,
            kind: TemplateKind::Logic,
            abi: serde_json::json!([]),
        },
        TestArtifact {
            name: "Counter",
            id: 0x03,
            kind: TemplateKind::Logic,
            abi: initialize_abi(),
        },
        TestArtifact {
            name: "CounterV2",
            id: 0x04,
            kind: TemplateKind::Logic,
            abi: initialize_abi(),
        },
        TestArtifact {
            name: "Token",
            id: 0x05,
            kind: TemplateKind::Logic,
            abi: serde_json::json!([
                {
                    "type": "constructor",
                    "stateMutability": "nonpayable",
                    "inputs": [
                        { "name": "symbol", "type": "string", "internalType": "string" },
                        { "name": "supply", "type": "uint256", "internalType": "uint256" }
                    ]
                }
            ]),
        },
    ]
}

/// Runtime code of a test artifact, as the mock deploys it.
pub fn runtime_code(name: &str) -> Bytes {
    test_artifacts()
        .into_iter()
        .find(|a| a.name == name)
        .map(|a| a.runtime_code())
        .expect("unknown test artifact")
}

/// A mock chain, artifacts on disk, an empty manifest and a context signing as [`SIGNER`].
pub struct Fixture {
    pub ledger: MockLedger,
    pub ctx: ExecutionContext<MockLedger>,
    pub contracts: SystemContracts,
    pub manifest: ManifestStore,
    pub artifacts: ArtifactStore,
    pub tmp: TempDir,
}

impl Fixture {
    pub fn new(prefix: &str) -> Self {
        init_test_tracing();

        let tmp = TempDir::new(prefix).unwrap();
        let artifacts_dir = tmp.path().join("artifacts").join("contracts");
        std::fs::create_dir_all(&artifacts_dir).unwrap();

        let ledger = MockLedger::new();
        for artifact in test_artifacts() {
            artifact.write(&artifacts_dir);
            ledger.add_template(artifact.creation_code(), artifact.runtime_code(), artifact.kind);
        }

        let network = Network::new("testnet", CHAIN_ID);
        let ctx = ExecutionContext::new(network.clone(), ledger.clone(), SIGNER);
        let contracts = SystemContracts {
            contract_registry: Some(REGISTRY),
            code_trust: Some(CODE_TRUST),
            contract_deployer: Some(CONTRACT_DEPLOYER),
            upgradeable_deployer: Some(UPGRADEABLE_DEPLOYER),
            proxy_admin: None,
        };
        let manifest = ManifestStore::new(tmp.path().join("scr-deployments.json"), network);
        let artifacts = ArtifactStore::new(tmp.path().join("artifacts"));

        Self {
            ledger,
            ctx,
            contracts,
            manifest,
            artifacts,
            tmp,
        }
    }

    /// A contract exposing the ProxyAdmin interface with non-canonical code.
    pub fn install_forged_admin(&self) -> Address {
        let forged = address!("00000000000000000000000000000000000bad01");
        self.ledger.install_with_code(
            forged,
            Bytes::from(vec![0x60, 0x80, 0x60, 0x40, 0xff]),
            Kind::ProxyAdmin { owner: SIGNER },
        );
        forged
    }
}

/// Initialize tracing for tests (idempotent).
pub fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init()
        .ok();
}
