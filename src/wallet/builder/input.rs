use bitcoin::{
    consensus, psbt, Address, Amount, Network, OutPoint, PublicKey, ScriptBuf, Sequence,
    Transaction, TxIn, TxOut, Witness, XOnlyPublicKey,
};

use crate::wallet::{Datasource, ScriptFormat, Utxo};
use crate::{PsbtError, PsbtResult};

/// An input of the builder, carrying the signing metadata its format needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuiltInput {
    /// Pay-to-pubkey-hash; signers need the whole previous transaction.
    Legacy {
        utxo: Utxo,
        previous_transaction: Transaction,
    },
    /// Pay-to-witness-pubkey-hash.
    Segwit { utxo: Utxo },
    /// Pay-to-witness-pubkey-hash nested in pay-to-script-hash.
    NestedSegwit { utxo: Utxo, redeem_script: ScriptBuf },
    /// Taproot key-path spend.
    Taproot {
        utxo: Utxo,
        internal_key: XOnlyPublicKey,
    },
}

impl BuiltInput {
    pub fn utxo(&self) -> &Utxo {
        match self {
            Self::Legacy { utxo, .. }
            | Self::Segwit { utxo }
            | Self::NestedSegwit { utxo, .. }
            | Self::Taproot { utxo, .. } => utxo,
        }
    }

    pub fn outpoint(&self) -> OutPoint {
        self.utxo().outpoint
    }

    pub fn value(&self) -> Amount {
        self.utxo().value
    }

    pub fn format(&self) -> ScriptFormat {
        match self {
            Self::Legacy { .. } => ScriptFormat::Legacy,
            Self::Segwit { .. } => ScriptFormat::Segwit,
            Self::NestedSegwit { .. } => ScriptFormat::NestedSegwit,
            Self::Taproot { .. } => ScriptFormat::Taproot,
        }
    }

    pub(crate) fn to_txin(&self, sequence: Sequence) -> TxIn {
        TxIn {
            previous_output: self.outpoint(),
            script_sig: ScriptBuf::new(),
            sequence,
            witness: Witness::new(),
        }
    }

    pub(crate) fn to_psbt_input(&self, sighash: Option<psbt::PsbtSighashType>) -> psbt::Input {
        let mut input = psbt::Input {
            sighash_type: sighash,
            ..Default::default()
        };

        match self {
            Self::Legacy {
                previous_transaction,
                ..
            } => {
                input.non_witness_utxo = Some(previous_transaction.clone());
            }
            Self::Segwit { utxo } => {
                input.witness_utxo = Some(witness_utxo(utxo));
            }
            Self::NestedSegwit {
                utxo,
                redeem_script,
            } => {
                input.witness_utxo = Some(witness_utxo(utxo));
                input.redeem_script = Some(redeem_script.clone());
            }
            Self::Taproot { utxo, internal_key } => {
                input.witness_utxo = Some(witness_utxo(utxo));
                input.tap_internal_key = Some(*internal_key);
            }
        }

        input
    }
}

fn witness_utxo(utxo: &Utxo) -> TxOut {
    TxOut {
        value: utxo.value,
        script_pubkey: utxo.script_pubkey.clone(),
    }
}

/// What the builder knows about its own key when turning UTXOs into inputs.
pub(crate) struct InputContext<'a> {
    pub network: Network,
    pub public_key: &'a PublicKey,
    pub datasource: Option<&'a dyn Datasource>,
}

/// Classifies the UTXO script and builds the matching [`BuiltInput`].
///
/// Legacy inputs fetch their previous transaction from the datasource.
pub(crate) async fn build_input(utxo: Utxo, ctx: &InputContext<'_>) -> PsbtResult<BuiltInput> {
    let format = ScriptFormat::from_script(&utxo.script_pubkey, ctx.network);
    trace!("building {format} input for {}", utxo.outpoint);

    match format {
        ScriptFormat::Legacy => {
            let datasource = ctx.datasource.ok_or(PsbtError::MissingDatasource)?;
            let raw = datasource.get_transaction(&utxo.outpoint.txid).await?;
            let previous_transaction: Transaction = consensus::deserialize(&raw)?;
            if previous_transaction.txid() != utxo.outpoint.txid {
                return Err(PsbtError::Datasource(format!(
                    "expected transaction {}, got {}",
                    utxo.outpoint.txid,
                    previous_transaction.txid()
                )));
            }

            Ok(BuiltInput::Legacy {
                utxo,
                previous_transaction,
            })
        }
        ScriptFormat::Segwit => Ok(BuiltInput::Segwit { utxo }),
        ScriptFormat::NestedSegwit => {
            let redeem_script = Address::p2wpkh(ctx.public_key, ctx.network)
                .map_err(|err| PsbtError::InvalidAddress(err.to_string()))?
                .script_pubkey();

            Ok(BuiltInput::NestedSegwit {
                utxo,
                redeem_script,
            })
        }
        ScriptFormat::Taproot => Ok(BuiltInput::Taproot {
            utxo,
            internal_key: XOnlyPublicKey::from(ctx.public_key.inner),
        }),
        ScriptFormat::Unknown => Err(PsbtError::MalformedTransaction(format!(
            "unsupported script format for utxo {}",
            utxo.outpoint
        ))),
    }
}
