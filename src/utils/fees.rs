use bitcoin::psbt::Psbt;
use bitcoin::{FeeRate, Network, Script};

use super::constants::{MAX_FEE_CEILING, WITNESS_MARKER_WEIGHT};
use crate::wallet::ScriptFormat;
use crate::{PsbtError, PsbtResult};

/// Size contribution of a single spending format, in weight units.
///
/// Non-witness sizes are stored already multiplied by the witness scale
/// factor, so the transaction header of segwit-native inputs (10.5 vbytes)
/// stays integral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FormatWeights {
    input: u64,
    output: u64,
    header: u64,
    witness: u64,
}

impl FormatWeights {
    fn of(format: ScriptFormat) -> Option<Self> {
        let weights = match format {
            ScriptFormat::Taproot => Self {
                input: 42 * 4,
                output: 43 * 4,
                header: 42,
                witness: 66,
            },
            ScriptFormat::Segwit => Self {
                input: 41 * 4,
                output: 31 * 4,
                header: 42,
                witness: 105,
            },
            ScriptFormat::NestedSegwit => Self {
                input: 64 * 4,
                output: 32 * 4,
                header: 10 * 4,
                witness: 105,
            },
            ScriptFormat::Legacy => Self {
                input: 148 * 4,
                output: 34 * 4,
                header: 10 * 4,
                witness: 0,
            },
            ScriptFormat::Unknown => return None,
        };

        Some(weights)
    }
}

/// Validates a fee rate given as a raw number of satoshis per virtual byte.
///
/// Negative and fractional rates are rejected. Integral values are truncated
/// into a whole sat/vB rate.
pub fn fee_rate_from_sat_per_vb(rate: f64) -> PsbtResult<FeeRate> {
    if rate < 0.0 || rate.fract() != 0.0 {
        return Err(PsbtError::InvalidFeeRate { rate });
    }

    FeeRate::from_sat_per_vb(rate as u64).ok_or(PsbtError::InvalidFeeRate { rate })
}

/// Computes weight, virtual size and fee of a (possibly unsigned) PSBT from
/// the spending formats of its inputs and outputs.
#[derive(Debug, Clone)]
pub struct FeeEstimator {
    fee_rate: FeeRate,
    network: Network,
    psbt: Psbt,
    /// Explicit witness stack of a non-default script-path spend
    witness: Option<Vec<Vec<u8>>>,
    fee: u64,
    virtual_size: u64,
    weight: u64,
}

impl FeeEstimator {
    pub fn new(
        fee_rate: FeeRate,
        network: Network,
        psbt: Psbt,
        witness: Option<Vec<Vec<u8>>>,
    ) -> Self {
        Self {
            fee_rate,
            network,
            psbt,
            witness,
            fee: 0,
            virtual_size: 0,
            weight: 0,
        }
    }

    /// Computes the fee of the current transaction skeleton and caches its
    /// weight and virtual size.
    ///
    /// # Errors
    ///
    /// * [`PsbtError::MalformedTransaction`] if the skeleton has no inputs or
    ///   outputs, or one of its scripts has no size entry.
    /// * [`PsbtError::InvalidScript`] if an input's previous output is unknown.
    /// * [`PsbtError::FeeCalculationError`] if the fee exceeds the hard ceiling.
    pub fn compute_fee(&mut self) -> PsbtResult<u64> {
        let (input_formats, output_formats) = self.analyze_components()?;

        let mut weight = 0;
        let mut header = 0;
        let mut default_witness = 0;
        for (index, format) in input_formats.into_iter().enumerate() {
            let weights = weights_of(format, "input", index)?;
            weight += weights.input;
            header = weights.header;
            default_witness += weights.witness;
        }
        for (index, format) in output_formats.into_iter().enumerate() {
            weight += weights_of(format, "output", index)?.output;
        }
        weight += header;

        let mut witness = match &self.witness {
            Some(stack) if !stack.is_empty() => {
                stack.iter().map(|item| item.len() as u64).sum::<u64>()
            }
            _ => default_witness,
        };
        if witness > 0 {
            witness += WITNESS_MARKER_WEIGHT;
        }
        weight += witness;

        let virtual_size = weight.div_ceil(4);
        let fee = self
            .fee_rate
            .fee_vb(virtual_size)
            .map(|fee| fee.to_sat())
            .ok_or(PsbtError::FeeCalculationError { fee: u64::MAX })?;
        if fee > MAX_FEE_CEILING {
            return Err(PsbtError::FeeCalculationError { fee });
        }

        self.weight = weight;
        self.virtual_size = virtual_size;
        self.fee = fee;
        trace!("weight: {weight}, virtual size: {virtual_size}, fee: {fee}");

        Ok(fee)
    }

    fn analyze_components(&self) -> PsbtResult<(Vec<ScriptFormat>, Vec<ScriptFormat>)> {
        let tx = &self.psbt.unsigned_tx;
        if tx.input.is_empty() {
            return Err(PsbtError::MalformedTransaction(
                "transaction must have at least one input".to_string(),
            ));
        }
        if tx.output.is_empty() {
            return Err(PsbtError::MalformedTransaction(
                "transaction must have at least one output".to_string(),
            ));
        }

        let inputs = (0..tx.input.len())
            .map(|index| {
                self.previous_script(index)
                    .map(|script| ScriptFormat::from_script(script, self.network))
                    .ok_or(PsbtError::InvalidScript { index })
            })
            .collect::<PsbtResult<Vec<_>>>()?;
        let outputs = tx
            .output
            .iter()
            .map(|output| ScriptFormat::from_script(&output.script_pubkey, self.network))
            .collect();

        Ok((inputs, outputs))
    }

    /// Script of the output spent by the input at `index`, taken from the
    /// witness UTXO or, for legacy inputs, from the full previous transaction.
    fn previous_script(&self, index: usize) -> Option<&Script> {
        let input = self.psbt.inputs.get(index)?;
        if let Some(witness_utxo) = &input.witness_utxo {
            return Some(&witness_utxo.script_pubkey);
        }

        let vout = self.psbt.unsigned_tx.input.get(index)?.previous_output.vout;
        input
            .non_witness_utxo
            .as_ref()?
            .output
            .get(vout as usize)
            .map(|output| output.script_pubkey.as_script())
    }

    pub fn fee_rate(&self) -> FeeRate {
        self.fee_rate
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn psbt(&self) -> &Psbt {
        &self.psbt
    }

    pub fn psbt_mut(&mut self) -> &mut Psbt {
        &mut self.psbt
    }

    pub fn set_psbt(&mut self, psbt: Psbt) {
        self.psbt = psbt;
    }

    pub fn into_psbt(self) -> Psbt {
        self.psbt
    }

    /// Fee computed by the last successful [`FeeEstimator::compute_fee`] call.
    pub fn fee(&self) -> u64 {
        self.fee
    }

    pub fn virtual_size(&self) -> u64 {
        self.virtual_size
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }
}

fn weights_of(format: ScriptFormat, side: &str, index: usize) -> PsbtResult<FormatWeights> {
    FormatWeights::of(format).ok_or_else(|| {
        PsbtError::MalformedTransaction(format!("unsupported {format} script at {side} {index}"))
    })
}
