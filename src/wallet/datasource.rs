use bitcoin::{Amount, OutPoint, ScriptBuf, Txid};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::PsbtResult;

/// Unspent transaction output which can be spent by the builder.
///
/// Its identity is the outpoint, rendered as `txid:vout`.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    #[serde_as(as = "DisplayFromStr")]
    pub outpoint: OutPoint,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub value: Amount,
    pub script_pubkey: ScriptBuf,
}

impl Utxo {
    pub fn new(txid: Txid, vout: u32, value: Amount, script_pubkey: ScriptBuf) -> Self {
        Self {
            outpoint: OutPoint { txid, vout },
            value,
            script_pubkey,
        }
    }
}

/// Arguments for [`Datasource::get_spendables`].
#[derive(Debug, Clone)]
pub struct GetSpendablesArgs<'a> {
    /// Address owning the UTXOs
    pub address: &'a str,
    /// Minimum total value of the returned UTXOs
    pub value: Amount,
    /// UTXOs which must not be returned
    pub exclude: &'a [OutPoint],
    /// Maximum number of UTXOs to return, if any
    pub limit: Option<usize>,
}

/// Source of chain data used by the PSBT builder.
///
/// Implementations are expected to handle their own timeouts. A single
/// datasource may be shared by any number of builders.
#[async_trait::async_trait]
pub trait Datasource: Send + Sync {
    /// Returns spendable UTXOs worth at least `args.value` in total, skipping
    /// the excluded outpoints.
    ///
    /// An empty result means there is nothing more to spend for this address.
    async fn get_spendables(&self, args: GetSpendablesArgs<'_>) -> PsbtResult<Vec<Utxo>>;

    /// Returns the consensus-encoded bytes of the transaction with the given id.
    async fn get_transaction(&self, txid: &Txid) -> PsbtResult<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_should_deserialize_utxo() {
        let json = r#"{
            "outpoint": "791b415dc6946d864d368a0e5ec5c09ee2ad39cf298bc6e3f9aec293732cfda7:1",
            "value": 8000,
            "script_pubkey": "00141111111111111111111111111111111111111111"
        }"#;
        let utxo: Utxo = serde_json::from_str(json).unwrap();

        assert_eq!(
            utxo.outpoint.txid,
            Txid::from_str("791b415dc6946d864d368a0e5ec5c09ee2ad39cf298bc6e3f9aec293732cfda7")
                .unwrap()
        );
        assert_eq!(utxo.outpoint.vout, 1);
        assert_eq!(utxo.value, Amount::from_sat(8_000));
        assert!(utxo.script_pubkey.is_p2wpkh());

        let encoded = serde_json::to_value(&utxo).unwrap();
        assert_eq!(
            encoded["outpoint"],
            "791b415dc6946d864d368a0e5ec5c09ee2ad39cf298bc6e3f9aec293732cfda7:1"
        );
    }
}
