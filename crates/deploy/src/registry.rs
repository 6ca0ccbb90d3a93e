//! Typed client for the on-chain contract registry.

use alloy_core::{
    primitives::{Address, B256, Bytes},
    sol_types::SolCall,
};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::Serialize;

use crate::{
    context::{ExecutionContext, timestamp_to_datetime},
    contracts::{IContractRegistry, RawRecord, decode_name, decode_returns, encode_name},
    error::{Result, ScrError},
    ledger::Ledger,
    version::Version,
};

/// A registry entry, keyed by (name, admin, version).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub name: String,
    /// `None` for regular deployments, which the registry stores with `proxy == logic`.
    pub proxy: Option<Address>,
    pub logic: Address,
    pub admin: Address,
    pub version: Version,
    pub logic_code_hash: B256,
    pub extra_data: Option<Bytes>,
    pub timestamp: DateTime<Utc>,
}

impl Record {
    /// The address callers interact with.
    pub fn public_address(&self) -> Address {
        self.proxy.unwrap_or(self.logic)
    }
}

impl TryFrom<RawRecord> for Record {
    type Error = ScrError;

    fn try_from(raw: RawRecord) -> Result<Self> {
        let proxy = (!raw.proxy.is_zero() && raw.proxy != raw.logic).then_some(raw.proxy);
        let timestamp = u64::try_from(raw.timestamp)
            .map_err(|_| ScrError::AbiEncoding(format!("record timestamp {} overflows", raw.timestamp)))?;

        Ok(Self {
            name: decode_name(&raw.name)?,
            proxy,
            logic: raw.logic,
            admin: raw.admin,
            version: Version::from_packed(raw.version)?,
            logic_code_hash: raw.logicCodeHash,
            extra_data: (!raw.extraData.is_empty()).then_some(raw.extraData),
            timestamp: timestamp_to_datetime(timestamp)?,
        })
    }
}

/// A record to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDraft {
    pub name: String,
    /// `None` registers a regular deployment.
    pub proxy: Option<Address>,
    pub logic: Address,
    pub version: Version,
    pub logic_code_hash: B256,
}

/// A new version of an existing record. Unset fields keep the previous record's values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub name: String,
    pub version: Version,
    pub proxy: Option<Address>,
    pub logic: Option<Address>,
    pub new_admin: Option<Address>,
    pub logic_code_hash: Option<B256>,
}

impl UpdateRequest {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            proxy: None,
            logic: None,
            new_admin: None,
            logic_code_hash: None,
        }
    }

    pub fn logic(mut self, logic: Address, logic_code_hash: B256) -> Self {
        self.logic = Some(logic);
        self.logic_code_hash = Some(logic_code_hash);
        self
    }

    pub fn proxy(mut self, proxy: Address) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn new_admin(mut self, admin: Address) -> Self {
        self.new_admin = Some(admin);
        self
    }
}

/// Outcome of [`RegistryClient::update`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordUpdate {
    pub previous: Record,
    pub new: Record,
}

/// Binding to a `ContractRegistry` instance.
pub struct RegistryClient<'a, L> {
    ctx: &'a ExecutionContext<L>,
    address: Address,
    max_version: Version,
}

impl<'a, L: Ledger> RegistryClient<'a, L> {
    pub fn new(ctx: &'a ExecutionContext<L>, address: Address) -> Self {
        Self {
            ctx,
            address,
            max_version: Version::MAX,
        }
    }

    /// Lower the version ceiling used for validation and latest-version lookups.
    pub fn max_version(mut self, max_version: Version) -> Self {
        self.max_version = max_version;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    fn check_version(&self, version: Version) -> Result<()> {
        if version > self.max_version {
            return Err(ScrError::VersionOutOfRange {
                version,
                max: self.max_version,
            });
        }
        Ok(())
    }

    /// Register a new record and return it as stored.
    pub async fn register(&self, draft: &RecordDraft, admin: Address) -> Result<Record> {
        self.check_version(draft.version)?;
        let name = encode_name(&draft.name)?;

        let call = IContractRegistry::registerCall {
            name,
            proxy: draft.proxy.unwrap_or(draft.logic),
            logic: draft.logic,
            version: draft.version.packed(),
            logicCodeHash: draft.logic_code_hash,
            admin,
        };

        tracing::info!(
            name = %draft.name,
            version = %draft.version,
            logic = %draft.logic,
            proxy = ?draft.proxy,
            admin = %admin,
            "Registering record"
        );

        let failed = |source: ScrError| ScrError::RegistrationFailed {
            name: draft.name.clone(),
            source: Box::new(source),
        };

        self.ctx
            .transact(self.address, call.abi_encode())
            .await
            .map_err(failed)?;

        self.get_record(&draft.name, admin, Some(draft.version))
            .await?
            .ok_or_else(|| {
                failed(ScrError::RecordNotFound {
                    name: draft.name.clone(),
                    admin,
                })
            })
    }

    /// Publish a strictly greater version of an existing record.
    ///
    /// Every precondition is checked before the transaction is sent.
    pub async fn update(&self, request: &UpdateRequest, admin: Address) -> Result<RecordUpdate> {
        self.check_version(request.version)?;
        let name = encode_name(&request.name)?;

        let previous = self
            .get_record(&request.name, admin, None)
            .await?
            .ok_or_else(|| ScrError::RecordNotFound {
                name: request.name.clone(),
                admin,
            })?;

        if request.version <= previous.version {
            return Err(ScrError::VersionNotMonotonic {
                previous: previous.version,
                requested: request.version,
            });
        }

        let logic = request.logic.unwrap_or(previous.logic);
        let new_admin = request.new_admin.unwrap_or(admin);
        let call = IContractRegistry::updateCall {
            name,
            proxy: request.proxy.or(previous.proxy).unwrap_or(logic),
            logic,
            newAdmin: new_admin,
            version: request.version.packed(),
            logicCodeHash: request.logic_code_hash.unwrap_or(previous.logic_code_hash),
            admin,
        };

        tracing::info!(
            name = %request.name,
            previous = %previous.version,
            version = %request.version,
            logic = %logic,
            "Updating record"
        );

        self.ctx.transact(self.address, call.abi_encode()).await?;

        let new = self
            .get_record(&request.name, new_admin, Some(request.version))
            .await?
            .ok_or_else(|| ScrError::RecordNotFound {
                name: request.name.clone(),
                admin: new_admin,
            })?;

        Ok(RecordUpdate { previous, new })
    }

    /// Read a record at an exact version, or the latest one up to the ceiling.
    pub async fn get_record(
        &self,
        name: &str,
        admin: Address,
        version: Option<Version>,
    ) -> Result<Option<Record>> {
        if let Some(version) = version {
            self.check_version(version)?;
        }
        let ceiling = version.unwrap_or(self.max_version);

        let call = IContractRegistry::getRecordCall {
            name: encode_name(name)?,
            admin,
            version: ceiling.packed(),
        };
        let output = self.ctx.call(self.address, call.abi_encode()).await?;
        let result = decode_returns::<IContractRegistry::getRecordCall>(&output)?;

        if !result.found {
            tracing::debug!(name, admin = %admin, version = %ceiling, "Record not found");
            return Ok(None);
        }

        let record = Record::try_from(result.record)?;
        match version {
            Some(version) if record.version != version => Ok(None),
            _ => Ok(Some(record)),
        }
    }

    /// Latest version of every record visible to `admin`, or to the registry owner when `None`.
    ///
    /// Records are fetched concurrently and returned sorted by name.
    pub async fn get_records(&self, admin: Option<Address>) -> Result<Vec<Record>> {
        let (scope, names) = match admin {
            Some(admin) => {
                let output = self
                    .ctx
                    .call_as(admin, self.address, IContractRegistry::getMyRecordsCall {}.abi_encode())
                    .await?;
                let names = decode_returns::<IContractRegistry::getMyRecordsCall>(&output)?.names;
                (admin, names)
            }
            None => {
                let output = self
                    .ctx
                    .call(self.address, IContractRegistry::getSystemRecordsCall {}.abi_encode())
                    .await?;
                let names =
                    decode_returns::<IContractRegistry::getSystemRecordsCall>(&output)?.names;
                (self.owner().await?, names)
            }
        };

        tracing::debug!(admin = %scope, count = names.len(), "Fetching records");

        let records = try_join_all(names.iter().map(|word| async move {
            let name = decode_name(word)?;
            let record = self.get_record(&name, scope, None).await?;
            if record.is_none() {
                tracing::warn!(name = %name, admin = %scope, "Listed record has no readable version");
            }
            Ok::<_, ScrError>(record)
        }))
        .await?;

        let mut records: Vec<Record> = records.into_iter().flatten().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    /// Owner of the registry, the admin of system records.
    pub async fn owner(&self) -> Result<Address> {
        let output = self
            .ctx
            .call(self.address, IContractRegistry::ownerCall {}.abi_encode())
            .await?;
        Ok(decode_returns::<IContractRegistry::ownerCall>(&output)?._0)
    }
}
