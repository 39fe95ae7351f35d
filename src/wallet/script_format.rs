use std::fmt;

use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, AddressType, Network, Script};
use serde::{Deserialize, Serialize};

/// Bech32 human-readable parts of segwit addresses, including the separator.
const MAINNET_HRP: &str = "bc1";
const TESTNET_HRP: &str = "tb1";
const REGTEST_HRP: &str = "bcrt1";

/// Spending format of an output script or address.
///
/// Pay-to-script-hash is assumed to wrap a witness pubkey hash, since that is
/// the only script-hash shape the builder knows how to spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScriptFormat {
    Legacy,
    Segwit,
    #[serde(rename = "p2sh-p2wpkh")]
    NestedSegwit,
    Taproot,
    Unknown,
}

/// Something that can be classified into a [`ScriptFormat`].
#[derive(Debug, Clone, Copy)]
pub enum ScriptOrAddress<'a> {
    Script(&'a Script),
    Address(&'a str),
}

impl<'a> From<&'a Script> for ScriptOrAddress<'a> {
    fn from(script: &'a Script) -> Self {
        Self::Script(script)
    }
}

impl<'a> From<&'a str> for ScriptOrAddress<'a> {
    fn from(address: &'a str) -> Self {
        Self::Address(address)
    }
}

impl ScriptFormat {
    /// Classifies either an output script or an address string on the given network.
    pub fn classify<'a>(target: impl Into<ScriptOrAddress<'a>>, network: Network) -> Self {
        match target.into() {
            ScriptOrAddress::Script(script) => Self::from_script(script, network),
            ScriptOrAddress::Address(address) => Self::from_address(address, network),
        }
    }

    /// Classifies an output script by decoding it into an address on `network`.
    pub fn from_script(script: &Script, network: Network) -> Self {
        Address::from_script(script, network)
            .ok()
            .and_then(|address| address.address_type())
            .map(Self::from_address_type)
            .unwrap_or(Self::Unknown)
    }

    /// Classifies an address string. Addresses which are not valid for
    /// `network` are reported as [`ScriptFormat::Unknown`].
    pub fn from_address(address: &str, network: Network) -> Self {
        parse_address(address, network)
            .and_then(|address| address.address_type())
            .map(Self::from_address_type)
            .unwrap_or(Self::Unknown)
    }

    fn from_address_type(address_type: AddressType) -> Self {
        match address_type {
            AddressType::P2pkh => Self::Legacy,
            AddressType::P2sh => Self::NestedSegwit,
            AddressType::P2wpkh => Self::Segwit,
            AddressType::P2tr => Self::Taproot,
            _ => Self::Unknown,
        }
    }

    /// Whether inputs of this format carry a segregated witness.
    pub fn has_witness(&self) -> bool {
        matches!(self, Self::Segwit | Self::NestedSegwit | Self::Taproot)
    }
}

impl fmt::Display for ScriptFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Legacy => "legacy",
            Self::Segwit => "segwit",
            Self::NestedSegwit => "p2sh-p2wpkh",
            Self::Taproot => "taproot",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Parses `address` and checks it belongs to `network`.
///
/// Regtest shares its base58 prefixes with testnet but has its own bech32
/// prefix, so base58 addresses are checked against testnet rules while
/// bech32 addresses must carry the regtest prefix. Any disagreement between
/// the two yields `None`.
pub fn parse_address(address: &str, network: Network) -> Option<Address> {
    let unchecked = address.parse::<Address<NetworkUnchecked>>().ok()?;
    if network != Network::Regtest {
        return unchecked.require_network(network).ok();
    }

    match bech32_prefix(address) {
        Some(REGTEST_HRP) => unchecked.require_network(Network::Regtest).ok(),
        Some(_) => None,
        None if unchecked.is_valid_for_network(Network::Testnet) => {
            Some(unchecked.assume_checked())
        }
        None => None,
    }
}

/// Returns whether `address` is a well-formed address for `network`.
pub fn is_valid_address(address: &str, network: Network) -> bool {
    parse_address(address, network).is_some()
}

fn bech32_prefix(address: &str) -> Option<&'static str> {
    let lowercase = address.to_ascii_lowercase();
    [REGTEST_HRP, MAINNET_HRP, TESTNET_HRP]
        .into_iter()
        .find(|hrp| lowercase.starts_with(hrp))
}

#[cfg(test)]
mod tests {
    use bitcoin::ScriptBuf;

    use super::*;
    use crate::utils::test_utils::{public_key, x_only_public_key};

    const MAINNET_P2PKH: &str = "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2";
    const MAINNET_P2SH: &str = "3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy";
    const MAINNET_P2WPKH: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
    const MAINNET_P2WSH: &str = "bc1qrp33g0q5c5txsp9arysrx4k6zdkfs4nce4xj0gdcccefvpysxf3qccfmv3";
    const MAINNET_P2TR: &str = "bc1pxwww0ct9ue7e8tdnlmug5m2tamfn7q06sahstg39ys4c9f3340qqxrdu9k";

    #[test]
    fn test_should_classify_mainnet_addresses() {
        let network = Network::Bitcoin;
        assert_eq!(
            ScriptFormat::from_address(MAINNET_P2PKH, network),
            ScriptFormat::Legacy
        );
        assert_eq!(
            ScriptFormat::from_address(MAINNET_P2SH, network),
            ScriptFormat::NestedSegwit
        );
        assert_eq!(
            ScriptFormat::from_address(MAINNET_P2WPKH, network),
            ScriptFormat::Segwit
        );
        assert_eq!(
            ScriptFormat::from_address(MAINNET_P2TR, network),
            ScriptFormat::Taproot
        );
    }

    #[test]
    fn test_should_map_unsupported_types_to_unknown() {
        assert_eq!(
            ScriptFormat::from_address(MAINNET_P2WSH, Network::Bitcoin),
            ScriptFormat::Unknown
        );
        assert_eq!(
            ScriptFormat::from_address("not-an-address", Network::Bitcoin),
            ScriptFormat::Unknown
        );
        let op_return = ScriptBuf::from_bytes(vec![0x6a, 0x01, 0x01]);
        assert_eq!(
            ScriptFormat::from_script(&op_return, Network::Bitcoin),
            ScriptFormat::Unknown
        );
    }

    #[test]
    fn test_should_reject_address_from_another_network() {
        assert_eq!(
            ScriptFormat::from_address(MAINNET_P2WPKH, Network::Testnet),
            ScriptFormat::Unknown
        );
        assert!(!is_valid_address(MAINNET_P2PKH, Network::Testnet));
        assert!(is_valid_address(MAINNET_P2PKH, Network::Bitcoin));
    }

    #[test]
    fn test_should_classify_regtest_addresses() {
        let public_key = public_key();

        // base58 prefixes are shared with testnet
        let legacy = Address::p2pkh(&public_key, Network::Testnet).to_string();
        assert_eq!(
            ScriptFormat::from_address(&legacy, Network::Regtest),
            ScriptFormat::Legacy
        );

        let segwit = Address::p2wpkh(&public_key, Network::Regtest)
            .unwrap()
            .to_string();
        assert!(segwit.starts_with("bcrt1"));
        assert_eq!(
            ScriptFormat::from_address(&segwit, Network::Regtest),
            ScriptFormat::Segwit
        );

        // testnet bech32 prefix on regtest is a mismatch
        let testnet_segwit = Address::p2wpkh(&public_key, Network::Testnet)
            .unwrap()
            .to_string();
        assert_eq!(
            ScriptFormat::from_address(&testnet_segwit, Network::Regtest),
            ScriptFormat::Unknown
        );
        // and regtest bech32 is not valid on testnet
        assert_eq!(
            ScriptFormat::from_address(&segwit, Network::Testnet),
            ScriptFormat::Unknown
        );
    }

    #[test]
    fn test_should_classify_scripts() {
        let secp = bitcoin::secp256k1::Secp256k1::new();
        let public_key = public_key();
        let network = Network::Testnet;

        let cases = [
            (
                Address::p2pkh(&public_key, network).script_pubkey(),
                ScriptFormat::Legacy,
            ),
            (
                Address::p2shwpkh(&public_key, network)
                    .unwrap()
                    .script_pubkey(),
                ScriptFormat::NestedSegwit,
            ),
            (
                Address::p2wpkh(&public_key, network)
                    .unwrap()
                    .script_pubkey(),
                ScriptFormat::Segwit,
            ),
            (
                Address::p2tr(&secp, x_only_public_key(), None, network).script_pubkey(),
                ScriptFormat::Taproot,
            ),
        ];

        for (script, expected) in cases {
            assert_eq!(ScriptFormat::classify(script.as_script(), network), expected);
            // classification of a script does not depend on the network
            assert_eq!(
                ScriptFormat::classify(script.as_script(), Network::Bitcoin),
                expected
            );
        }
    }

    #[test]
    fn test_should_classify_deterministically() {
        for _ in 0..3 {
            assert_eq!(
                ScriptFormat::classify(MAINNET_P2TR, Network::Bitcoin),
                ScriptFormat::Taproot
            );
        }
    }

    #[test]
    fn test_should_serialize_format_names() {
        assert_eq!(
            serde_json::to_string(&ScriptFormat::NestedSegwit).unwrap(),
            "\"p2sh-p2wpkh\""
        );
        assert_eq!(
            serde_json::to_string(&ScriptFormat::Taproot).unwrap(),
            "\"taproot\""
        );
        assert_eq!(ScriptFormat::NestedSegwit.to_string(), "p2sh-p2wpkh");
    }
}
