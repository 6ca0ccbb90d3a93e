//! ABI bindings for the remote services the engine talks to.

use alloy_core::{
    primitives::{Address, B256, Bytes, b256},
    sol,
    sol_types::{SolCall, SolValue},
};

use crate::error::{Result, ScrError};

/// EIP-1967 implementation slot: `bytes32(uint256(keccak256("eip1967.proxy.implementation")) - 1)`.
pub const IMPLEMENTATION_SLOT: B256 =
    b256!("360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc");

/// EIP-1967 admin slot: `bytes32(uint256(keccak256("eip1967.proxy.admin")) - 1)`.
pub const ADMIN_SLOT: B256 =
    b256!("b53127684a568b3173ae13b9f8a6016e243e63b6e8ee1178d6a717850b5d6103");

/// Record names are stored as `bytes32` and must keep a trailing NUL.
pub const MAX_NAME_LEN: usize = 31;

sol! {
    /// Registry entry as returned by `getRecord`.
    #[derive(Debug, PartialEq, Eq)]
    struct RawRecord {
        bytes32 name;
        address proxy;
        address logic;
        address admin;
        uint16 version;
        bytes32 logicCodeHash;
        bytes extraData;
        uint256 timestamp;
    }

    interface IContractRegistry {
        function register(
            bytes32 name,
            address proxy,
            address logic,
            uint16 version,
            bytes32 logicCodeHash,
            address admin
        ) external;

        function update(
            bytes32 name,
            address proxy,
            address logic,
            address newAdmin,
            uint16 version,
            bytes32 logicCodeHash,
            address admin
        ) external;

        function getRecord(bytes32 name, address admin, uint16 version)
            external view returns (bool found, RawRecord record);

        function getMyRecords() external view returns (bytes32[] names);

        function getSystemRecords() external view returns (bytes32[] names);

        function owner() external view returns (address);
    }

    interface ICodeTrust {
        function isTrustedCode(address trustedCode, address by, uint256 extTimestamp)
            external view returns (bool);

        function trustCodeAt(address trustedCode, uint256 duration) external;
    }

    interface IProxyAdmin {
        function getProxyImplementation(address proxy) external view returns (address);

        function getProxyAdmin(address proxy) external view returns (address);

        function upgrade(address proxy, address implementation) external;

        function upgradeAndCall(address proxy, address implementation, bytes data) external payable;

        function owner() external view returns (address);
    }

    /// Deploys and registers a regular contract in one transaction.
    interface IContractDeployer {
        function deployContract(
            bytes32 name,
            bytes bytecode,
            bytes data,
            bytes32 salt,
            uint16 version
        ) external payable;
    }

    /// Deploys logic, proxy and registry record in one transaction.
    interface IUpgradeableDeployer {
        function deployContract(
            bytes32 name,
            bytes bytecode,
            bytes data,
            bytes32 salt,
            uint16 version
        ) external payable;
    }
}

/// Encode a record name as a NUL padded `bytes32`.
pub fn encode_name(name: &str) -> Result<B256> {
    let bytes = name.as_bytes();
    if bytes.len() > MAX_NAME_LEN {
        return Err(ScrError::NameTooLong(name.to_string()));
    }
    let mut word = [0u8; 32];
    word[..bytes.len()].copy_from_slice(bytes);
    Ok(B256::from(word))
}

/// Decode a `bytes32` record name, dropping the NUL padding.
pub fn decode_name(word: &B256) -> Result<String> {
    let end = word.iter().position(|b| *b == 0).unwrap_or(32);
    String::from_utf8(word[..end].to_vec())
        .map_err(|e| ScrError::AbiEncoding(format!("record name is not UTF-8: {e}")))
}

/// Constructor arguments of `TransparentUpgradeableProxy(logic, admin, data)`.
pub fn proxy_constructor_args(logic: Address, admin: Address, data: &Bytes) -> Vec<u8> {
    (logic, admin, data.clone()).abi_encode_params()
}

/// Constructor arguments of `ContractRegistry(codeTrust, name, version, logicCodeHash)`. The
/// registry registers itself under `name` at construction.
pub fn registry_constructor_args(
    code_trust: Address,
    name: B256,
    version: u16,
    logic_code_hash: B256,
) -> Vec<u8> {
    (code_trust, name, version, logic_code_hash).abi_encode_params()
}

/// Constructor arguments of `ContractDeployer(registry)`.
pub fn deployer_constructor_args(registry: Address) -> Vec<u8> {
    (registry,).abi_encode_params()
}

/// Decode the return data of `C`.
pub fn decode_returns<C: SolCall>(data: &[u8]) -> Result<C::Return> {
    C::abi_decode_returns(data, true)
        .map_err(|e| ScrError::AbiEncoding(format!("bad return data for {}: {e}", C::SIGNATURE)))
}

/// Interpret a storage word as a right-aligned address.
pub fn slot_to_address(word: B256) -> Address {
    Address::from_word(word)
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::{U256, address, keccak256};

    use super::*;

    #[test]
    fn test_eip1967_slots() {
        let implementation = U256::from_be_bytes(keccak256("eip1967.proxy.implementation").0)
            - U256::from(1);
        assert_eq!(B256::from(implementation), IMPLEMENTATION_SLOT);

        let admin = U256::from_be_bytes(keccak256("eip1967.proxy.admin").0) - U256::from(1);
        assert_eq!(B256::from(admin), ADMIN_SLOT);
    }

    #[test]
    fn test_name_codec() {
        let word = encode_name("Widget").unwrap();
        assert_eq!(&word[..6], b"Widget");
        assert!(word[6..].iter().all(|b| *b == 0));
        assert_eq!(decode_name(&word).unwrap(), "Widget");

        assert_eq!(decode_name(&encode_name("").unwrap()).unwrap(), "");
        assert!(encode_name(&"a".repeat(31)).is_ok());
        assert!(matches!(
            encode_name(&"a".repeat(32)),
            Err(ScrError::NameTooLong(_))
        ));
    }

    #[test]
    fn test_selectors() {
        assert_eq!(IProxyAdmin::upgradeCall::SELECTOR, [0x99, 0xa8, 0x8e, 0xc4]);
        assert_eq!(
            IProxyAdmin::getProxyImplementationCall::SELECTOR,
            [0x20, 0x4e, 0x1c, 0x7a]
        );
        assert_eq!(ICodeTrust::isTrustedCodeCall::SIGNATURE, "isTrustedCode(address,address,uint256)");
        assert_eq!(
            IContractRegistry::getRecordCall::SIGNATURE,
            "getRecord(bytes32,address,uint16)"
        );
    }

    #[test]
    fn test_slot_to_address() {
        let logic = address!("5FbDB2315678afecb367f032d93F642f64180aa3");
        assert_eq!(slot_to_address(logic.into_word()), logic);
    }

    #[test]
    fn test_system_constructor_args() {
        let code_trust = address!("0000000000000000000000000000000000005c02");
        let name = encode_name("ContractRegistry").unwrap();
        let args = registry_constructor_args(code_trust, name, 100, B256::repeat_byte(0x33));
        assert_eq!(args.len(), 4 * 32);

        let (trust, decoded_name, version, hash) =
            <(Address, B256, u16, B256)>::abi_decode_params(&args, true).unwrap();
        assert_eq!(trust, code_trust);
        assert_eq!(decode_name(&decoded_name).unwrap(), "ContractRegistry");
        assert_eq!(version, 100);
        assert_eq!(hash, B256::repeat_byte(0x33));

        assert_eq!(deployer_constructor_args(code_trust), code_trust.into_word().to_vec());
    }
}
