mod datasource;

use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash as _;
use bitcoin::psbt::Psbt;
use bitcoin::secp256k1::Secp256k1;
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, Network, OutPoint, PrivateKey, PublicKey, ScriptBuf, Sequence, Transaction,
    TxIn, TxOut, Txid, Witness, XOnlyPublicKey,
};
pub use datasource::{MemoryDatasource, SpendablesRequest};

// <https://mempool.space/testnet/address/tb1qzc8dhpkg5e4t6xyn4zmexxljc4nkje59dg3ark>
const WIF: &str = "cVkWbHmoCx6jS8AyPNQqvFr8V9r2qzDHJLaxGDQgDJfxT73w6fuU";

pub const NETWORK: Network = Network::Testnet;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn public_key() -> PublicKey {
    let private_key = PrivateKey::from_wif(WIF).unwrap();
    private_key.public_key(&Secp256k1::new())
}

pub fn x_only_public_key() -> XOnlyPublicKey {
    XOnlyPublicKey::from(public_key().inner)
}

pub fn taproot_address() -> Address {
    Address::p2tr(&Secp256k1::new(), x_only_public_key(), None, NETWORK)
}

pub fn segwit_address() -> Address {
    Address::p2wpkh(&public_key(), NETWORK).unwrap()
}

pub fn nested_segwit_address() -> Address {
    Address::p2shwpkh(&public_key(), NETWORK).unwrap()
}

pub fn legacy_address() -> Address {
    Address::p2pkh(&public_key(), NETWORK)
}

pub fn taproot_script() -> ScriptBuf {
    taproot_address().script_pubkey()
}

pub fn segwit_script() -> ScriptBuf {
    segwit_address().script_pubkey()
}

pub fn nested_segwit_script() -> ScriptBuf {
    nested_segwit_address().script_pubkey()
}

pub fn legacy_script() -> ScriptBuf {
    legacy_address().script_pubkey()
}

/// Deterministic transaction id made of `n` repeated.
pub fn txid(n: u8) -> Txid {
    Txid::from_byte_array([n; 32])
}

/// A funding transaction paying `outputs`, with a single dummy input so that
/// it survives a consensus encoding round trip.
pub fn previous_transaction(outputs: Vec<(ScriptBuf, u64)>) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint {
                txid: txid(0xff),
                vout: 0,
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: outputs
            .into_iter()
            .map(|(script_pubkey, value)| TxOut {
                value: Amount::from_sat(value),
                script_pubkey,
            })
            .collect(),
    }
}

/// Unsigned PSBT spending `inputs` (as witness UTXOs) into `outputs`.
pub fn skeleton(inputs: &[(ScriptBuf, u64)], outputs: &[(ScriptBuf, u64)]) -> Psbt {
    let tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: (0..inputs.len())
            .map(|index| TxIn {
                previous_output: OutPoint {
                    txid: txid(index as u8),
                    vout: 0,
                },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::new(),
            })
            .collect(),
        output: outputs
            .iter()
            .map(|(script_pubkey, value)| TxOut {
                value: Amount::from_sat(*value),
                script_pubkey: script_pubkey.clone(),
            })
            .collect(),
    };

    let mut psbt = Psbt::from_unsigned_tx(tx).unwrap();
    for (input, (script_pubkey, value)) in psbt.inputs.iter_mut().zip(inputs) {
        input.witness_utxo = Some(TxOut {
            value: Amount::from_sat(*value),
            script_pubkey: script_pubkey.clone(),
        });
    }

    psbt
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_should_derive_addresses_for_the_test_key() {
        assert!(taproot_script().is_p2tr());
        assert!(segwit_script().is_p2wpkh());
        assert!(nested_segwit_script().is_p2sh());
        assert!(legacy_script().is_p2pkh());
        assert!(segwit_address().to_string().starts_with("tb1q"));
    }

    #[test]
    fn test_should_build_skeleton() {
        let psbt = skeleton(&[(taproot_script(), 1_000)], &[(segwit_script(), 600)]);

        assert_eq!(psbt.inputs.len(), 1);
        assert_eq!(psbt.unsigned_tx.output[0].value, Amount::from_sat(600));
        assert_eq!(
            psbt.inputs[0].witness_utxo.as_ref().unwrap().value,
            Amount::from_sat(1_000)
        );
    }
}
