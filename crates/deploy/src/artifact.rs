//! Compiled contract artifacts.
//!
//! Artifacts are read from a Hardhat-style output directory, where every contract `Foo`
//! compiles to `<root>/**/Foo.json` holding its ABI, creation bytecode and deployed bytecode.

use std::path::{Path, PathBuf};

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier},
    json_abi::{JsonAbi, Param},
    primitives::{B256, Bytes, keccak256},
};
use serde::Deserialize;

use crate::error::{Result, ScrError};

/// Artifact name of the transparent proxy deployed in front of every upgradeable contract.
pub const PROXY_ARTIFACT: &str = "TransparentUpgradeableProxy";

/// Artifact name of the canonical proxy admin.
pub const PROXY_ADMIN_ARTIFACT: &str = "ProxyAdmin";

/// Shared services deployed once per network, also used as their record names.
pub const CODE_TRUST_ARTIFACT: &str = "CodeTrust";
pub const REGISTRY_ARTIFACT: &str = "ContractRegistry";
pub const CONTRACT_DEPLOYER_ARTIFACT: &str = "ContractDeployer";

/// A compiled contract.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub contract_name: String,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
    pub deployed_bytecode: Bytes,
}

impl Artifact {
    /// Hash of the runtime code, as it will be returned by `eth_getCode` once deployed.
    pub fn deployed_code_hash(&self) -> B256 {
        keccak256(&self.deployed_bytecode)
    }

    /// Creation bytecode followed by the ABI encoded constructor arguments.
    pub fn encode_deploy(&self, args: &[String]) -> Result<Bytes> {
        let encoded_args = match self.abi.constructor() {
            Some(constructor) => {
                let values = coerce_args(&constructor.inputs, args, "constructor")?;
                constructor
                    .abi_encode_input(&values)
                    .map_err(|e| ScrError::AbiEncoding(format!("{}: {e}", self.contract_name)))?
            }
            None if args.is_empty() => Vec::new(),
            None => {
                return Err(ScrError::AbiEncoding(format!(
                    "{} has no constructor but {} arguments were given",
                    self.contract_name,
                    args.len()
                )));
            }
        };

        let mut init_code = self.bytecode.to_vec();
        init_code.extend_from_slice(&encoded_args);
        Ok(init_code.into())
    }

    /// Call data for `initialize(args...)`, selecting the overload by argument count.
    pub fn encode_initializer(&self, args: &[String]) -> Result<Bytes> {
        let function = self
            .abi
            .function("initialize")
            .and_then(|overloads| overloads.iter().find(|f| f.inputs.len() == args.len()))
            .ok_or_else(|| {
                ScrError::AbiEncoding(format!(
                    "{} has no initialize function taking {} arguments",
                    self.contract_name,
                    args.len()
                ))
            })?;

        let values = coerce_args(&function.inputs, args, "initialize")?;
        function
            .abi_encode_input(&values)
            .map(Bytes::from)
            .map_err(|e| ScrError::AbiEncoding(format!("{}: {e}", self.contract_name)))
    }
}

fn coerce_args(inputs: &[Param], args: &[String], context: &str) -> Result<Vec<DynSolValue>> {
    if inputs.len() != args.len() {
        return Err(ScrError::AbiEncoding(format!(
            "{context} expects {} arguments, got {}",
            inputs.len(),
            args.len()
        )));
    }

    inputs
        .iter()
        .zip(args)
        .map(|(param, arg)| {
            let ty: DynSolType = param
                .resolve()
                .map_err(|e| ScrError::AbiEncoding(format!("{context}: {e}")))?;
            ty.coerce_str(arg).map_err(|e| {
                ScrError::AbiEncoding(format!(
                    "{context}: argument '{}' is not a valid {}: {e}",
                    param.name,
                    ty.sol_type_name()
                ))
            })
        })
        .collect()
}

/// Locates artifacts below a root directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load the artifact for `contract_name`.
    pub fn load(&self, contract_name: &str) -> Result<Artifact> {
        let file_name = format!("{contract_name}.json");
        let path = find_file(&self.root, &file_name)?.ok_or_else(|| {
            ScrError::Artifact(format!(
                "no artifact named {} under {}",
                file_name,
                self.root.display()
            ))
        })?;

        let content = std::fs::read_to_string(&path)
            .map_err(|e| ScrError::Artifact(format!("failed to read {}: {e}", path.display())))?;
        let artifact: Artifact = serde_json::from_str(&content)
            .map_err(|e| ScrError::Artifact(format!("failed to parse {}: {e}", path.display())))?;

        if artifact.bytecode.is_empty() {
            return Err(ScrError::Artifact(format!(
                "{contract_name} has no bytecode (abstract contract or interface?)"
            )));
        }

        tracing::debug!(contract = contract_name, path = %path.display(), "Artifact loaded");
        Ok(artifact)
    }
}

/// Depth-first search for `file_name`. Debug sidecars (`*.dbg.json`) never match.
fn find_file(dir: &Path, file_name: &str) -> Result<Option<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| ScrError::Artifact(format!("failed to list {}: {e}", dir.display())))?;

    let mut subdirs = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|e| ScrError::Artifact(format!("failed to list {}: {e}", dir.display())))?;
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if entry.file_name().to_str() == Some(file_name) {
            return Ok(Some(path));
        }
    }

    subdirs.sort();
    for subdir in subdirs {
        if let Some(found) = find_file(&subdir, file_name)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}
