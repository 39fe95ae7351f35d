mod injection;
mod input;

use std::collections::HashSet;
use std::sync::Arc;

use bitcoin::absolute::LockTime;
use bitcoin::psbt::{Psbt, PsbtSighashType};
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, FeeRate, Network, OutPoint, PublicKey, ScriptBuf, Sequence, Transaction, TxOut,
};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};

pub use self::injection::{InjectedInput, InjectedOutput};
pub use self::input::BuiltInput;
use self::injection::{splice, Collision};
use self::input::{build_input, InputContext};
use super::datasource::{Datasource, GetSpendablesArgs, Utxo};
use super::script_format::parse_address;
use crate::utils::constants::{
    DUST_FLOOR, INSTANT_TRADE_RESERVED_INDEX, MAX_FEE_CEILING, MAX_FEE_PASSES,
    RBF_DISABLED_SEQUENCE, RBF_ENABLED_SEQUENCE,
};
use crate::utils::encoding::{psbt_to_base64, psbt_to_hex};
use crate::utils::fees::FeeEstimator;
use crate::{PsbtError, PsbtResult};

/// Payment requested by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOutput {
    /// Recipient address
    pub address: String,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub value: Amount,
}

/// Tells an external signer which inputs of the PSBT belong to this builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputsToSign {
    /// Address owning the inputs
    pub address: String,
    /// Indexes of the inputs to sign
    pub signing_indexes: Vec<usize>,
    /// Sighash flag to sign with, if not the default
    pub sighash: Option<u32>,
}

/// Arguments for creating a [`PsbtBuilder`]
pub struct PsbtBuilderArgs {
    /// Address paying for the outputs and the fee
    pub address: String,
    /// Public key of `address`, used for redeem scripts and taproot internal keys
    pub public_key: PublicKey,
    pub network: Network,
    pub fee_rate: FeeRate,
    /// Payments to make
    pub outputs: Vec<TargetOutput>,
    /// Address receiving the change; defaults to `address`
    pub change_address: Option<String>,
    /// UTXOs to spend before asking the datasource for more
    pub utxos: Vec<Utxo>,
    pub datasource: Option<Arc<dyn Datasource>>,
    /// Whether to fetch UTXOs and compute change. Disable it when the
    /// provided UTXOs and outputs already form the whole transaction.
    pub auto_adjustment: bool,
    /// Reserve the counterparty input index of an instant trade
    pub instant_trade_mode: bool,
    /// Signal replace-by-fee on the builder's inputs
    pub rbf: bool,
    /// Sighash the builder's own inputs are signed with
    pub sighash: Option<PsbtSighashType>,
    /// Witness stack override for fee estimation
    pub witness: Option<Vec<Vec<u8>>>,
    /// Maximum number of UTXOs taken from each datasource answer
    pub utxo_limit: Option<usize>,
}

impl PsbtBuilderArgs {
    pub fn new(
        address: impl Into<String>,
        public_key: PublicKey,
        network: Network,
        fee_rate: FeeRate,
        outputs: Vec<TargetOutput>,
    ) -> Self {
        Self {
            address: address.into(),
            public_key,
            network,
            fee_rate,
            outputs,
            change_address: None,
            utxos: Vec::new(),
            datasource: None,
            auto_adjustment: true,
            instant_trade_mode: false,
            rbf: true,
            sighash: None,
            witness: None,
            utxo_limit: None,
        }
    }
}

/// Everything the builder accumulates while converging.
#[derive(Debug, Clone, Default)]
pub struct BuilderState {
    pub inputs: Vec<BuiltInput>,
    pub injected_inputs: Vec<InjectedInput>,
    pub outputs: Vec<TxOut>,
    pub injected_outputs: Vec<InjectedOutput>,
    pub input_amount: u64,
    pub output_amount: u64,
    pub change_amount: i64,
    pub fee: u64,
    pub virtual_size: u64,
    pub weight: u64,
    /// Set once the datasource has nothing more to offer
    pub exhausted: bool,
    own_input_indexes: Vec<usize>,
    injected_input_indexes: Vec<usize>,
    change_output_index: Option<usize>,
}

/// Builds unsigned PSBTs paying the target outputs from the UTXOs of an address.
pub struct PsbtBuilder {
    address: String,
    public_key: PublicKey,
    change_script: ScriptBuf,
    pending_utxos: Vec<Utxo>,
    datasource: Option<Arc<dyn Datasource>>,
    utxo_limit: Option<usize>,
    auto_adjustment: bool,
    instant_trade_mode: bool,
    rbf: bool,
    sighash: Option<PsbtSighashType>,
    estimator: FeeEstimator,
    state: BuilderState,
    used: HashSet<OutPoint>,
    reserved: Vec<OutPoint>,
    prepared: bool,
}

impl PsbtBuilder {
    pub fn new(args: PsbtBuilderArgs) -> PsbtResult<Self> {
        let network = args.network;
        resolve_script(&args.address, network)?;
        let change_script =
            resolve_script(args.change_address.as_deref().unwrap_or(&args.address), network)?;
        let outputs = args
            .outputs
            .iter()
            .map(|output| {
                Ok(TxOut {
                    value: output.value,
                    script_pubkey: resolve_script(&output.address, network)?,
                })
            })
            .collect::<PsbtResult<Vec<_>>>()?;

        let psbt = Psbt::from_unsigned_tx(empty_transaction())?;

        Ok(Self {
            address: args.address,
            public_key: args.public_key,
            change_script,
            pending_utxos: args.utxos,
            datasource: args.datasource,
            utxo_limit: args.utxo_limit,
            auto_adjustment: args.auto_adjustment,
            instant_trade_mode: args.instant_trade_mode,
            rbf: args.rbf,
            sighash: args.sighash,
            estimator: FeeEstimator::new(args.fee_rate, network, psbt, args.witness),
            state: BuilderState {
                outputs,
                ..Default::default()
            },
            used: HashSet::new(),
            reserved: Vec::new(),
            prepared: false,
        })
    }

    /// Splices a counterparty input into the transaction at `input.index`.
    pub fn inject_input(&mut self, input: InjectedInput) {
        info!("injecting input {} at index {}", input.txin.previous_output, input.index);
        self.state.injected_inputs.push(input);
        self.prepared = false;
    }

    /// Splices a counterparty output into the transaction at `output.index`,
    /// or the next free index after it.
    pub fn inject_output(&mut self, output: InjectedOutput) {
        info!("injecting output of {} at index {}", output.txout.value, output.index);
        self.state.injected_outputs.push(output);
        self.prepared = false;
    }

    /// Selects UTXOs and converges on the change amount and fee.
    ///
    /// Calling it again resumes from the current state: UTXOs already
    /// spent by this builder are kept and never fetched twice.
    ///
    /// # Errors
    ///
    /// * [`PsbtError::DustOutput`] if the outputs total less than the dust floor.
    /// * [`PsbtError::InsufficientFunds`] if the datasource runs out of UTXOs.
    ///   This includes the case where the inputs cover the outputs and fee,
    ///   but not the extra fee of the change output a change above the dust
    ///   floor calls for. A lower fee rate may then succeed.
    /// * Any error of [`FeeEstimator::compute_fee`].
    pub async fn prepare(&mut self) -> PsbtResult<()> {
        self.prepared = false;
        self.calculate_output_amount()?;

        let pending = std::mem::take(&mut self.pending_utxos);
        if let Err(err) = self.add_utxos(pending.clone()).await {
            self.pending_utxos = pending;
            return Err(err);
        }

        if !self.auto_adjustment {
            self.state.change_amount = 0;
            self.process()?;
            self.prepared = true;
            return Ok(());
        }

        // pinned and previously fetched inputs are priced before asking for more
        let mut fetch = self
            .state
            .inputs
            .is_empty()
            .then_some(self.state.output_amount);

        loop {
            if let Some(value) = fetch.take() {
                self.retrieve_utxos(value).await?;
            }
            if self.state.inputs.is_empty() && self.state.injected_inputs.is_empty() {
                warn!("no spendable utxos for {}", self.address);
                return Err(PsbtError::InsufficientFunds {
                    shortfall: self.state.output_amount,
                });
            }

            match self.converge()? {
                None => break,
                Some(shortfall) if self.state.exhausted => {
                    warn!("insufficient funds for {}: short by {shortfall} sats", self.address);
                    return Err(PsbtError::InsufficientFunds { shortfall });
                }
                Some(shortfall) => fetch = Some(shortfall),
            }
        }

        self.settle_change()?;
        info!(
            "prepared psbt: inputs {} sats, outputs {} sats, change {} sats, fee {} sats",
            self.state.input_amount,
            self.state.output_amount,
            self.state.change_amount,
            self.state.fee
        );
        self.prepared = true;

        Ok(())
    }

    fn calculate_output_amount(&mut self) -> PsbtResult<()> {
        let amount = self
            .state
            .outputs
            .iter()
            .map(|output| output.value.to_sat())
            .chain(
                self.state
                    .injected_outputs
                    .iter()
                    .map(|output| output.txout.value.to_sat()),
            )
            .sum::<u64>();
        if amount < DUST_FLOOR {
            return Err(PsbtError::DustOutput { amount });
        }

        self.state.output_amount = amount;
        Ok(())
    }

    /// Asks the datasource for UTXOs worth at least `value` and builds them
    /// into inputs.
    async fn retrieve_utxos(&mut self, value: u64) -> PsbtResult<()> {
        let datasource = self
            .datasource
            .clone()
            .ok_or(PsbtError::MissingDatasource)?;

        debug!("requesting {value} sats of utxos for {}", self.address);
        let utxos = datasource
            .get_spendables(GetSpendablesArgs {
                address: &self.address,
                value: Amount::from_sat(value),
                exclude: &self.reserved,
                limit: self.utxo_limit,
            })
            .await?;

        let mut seen = HashSet::new();
        let fresh = utxos
            .into_iter()
            .filter(|utxo| !self.used.contains(&utxo.outpoint) && seen.insert(utxo.outpoint))
            .take(self.utxo_limit.unwrap_or(usize::MAX))
            .collect::<Vec<_>>();
        if fresh.is_empty() {
            debug!("no more utxos available for {}", self.address);
            self.state.exhausted = true;
            return Ok(());
        }

        self.add_utxos(fresh).await
    }

    /// Builds inputs for `utxos` concurrently and appends them in the given order.
    async fn add_utxos(&mut self, utxos: Vec<Utxo>) -> PsbtResult<()> {
        let utxos = utxos
            .into_iter()
            .filter(|utxo| !self.used.contains(&utxo.outpoint))
            .collect::<Vec<_>>();
        if utxos.is_empty() {
            return Ok(());
        }

        let ctx = InputContext {
            network: self.estimator.network(),
            public_key: &self.public_key,
            datasource: self.datasource.as_deref(),
        };
        let inputs = try_join_all(utxos.into_iter().map(|utxo| build_input(utxo, &ctx))).await?;

        for input in inputs {
            if !self.used.insert(input.outpoint()) {
                continue;
            }
            debug!("adding {} input {} of {}", input.format(), input.outpoint(), input.value());
            self.reserved.push(input.outpoint());
            self.state.inputs.push(input);
        }

        Ok(())
    }

    /// Runs the fee passes over the current inputs.
    ///
    /// Returns the shortfall if the inputs do not cover outputs and fee.
    fn converge(&mut self) -> PsbtResult<Option<u64>> {
        for pass in 0..MAX_FEE_PASSES {
            self.process()?;
            let change = self.balance();
            self.state.change_amount = change;
            debug!("fee pass {pass}: fee {} sats, change {change} sats", self.state.fee);

            if change < 0 {
                return Ok(Some(change.unsigned_abs()));
            }
        }

        Ok(None)
    }

    /// Inputs minus outputs minus fee of the last priced skeleton.
    fn balance(&self) -> i64 {
        self.state.input_amount as i64 - self.state.output_amount as i64 - self.state.fee as i64
    }

    /// Reconciles the change output of the last pass with the final change amount.
    ///
    /// Change which stays below the dust floor once a change output is paid
    /// for is left to the fee.
    fn settle_change(&mut self) -> PsbtResult<()> {
        // the last pass was priced without a change output
        if self.state.change_amount >= DUST_FLOOR as i64
            && self.state.change_output_index.is_none()
        {
            self.process()?;
            self.state.change_amount = self.balance();
            debug!("repriced with change output: change {} sats", self.state.change_amount);
        }

        if self.state.change_amount >= DUST_FLOOR as i64 {
            if let Some(index) = self.state.change_output_index {
                self.estimator.psbt_mut().unsigned_tx.output[index].value =
                    Amount::from_sat(self.state.change_amount.unsigned_abs());
                return Ok(());
            }
        }

        if self.state.change_output_index.is_some() {
            self.state.change_amount = 0;
            self.process()?;
        }

        let fee = self.state.input_amount - self.state.output_amount;
        if fee > MAX_FEE_CEILING {
            return Err(PsbtError::FeeCalculationError { fee });
        }
        if fee != self.state.fee {
            debug!("leaving {} sats of dust change to the fee", fee - self.state.fee);
        }
        self.state.fee = fee;
        self.state.change_amount = 0;

        Ok(())
    }

    /// Assembles the transaction skeleton from the current state and prices it.
    fn process(&mut self) -> PsbtResult<()> {
        let sequence = self.sequence();

        let own_inputs = self
            .state
            .inputs
            .iter()
            .map(|input| (input.to_txin(sequence), input.to_psbt_input(self.sighash)))
            .collect::<Vec<_>>();
        let injected_inputs = self
            .state
            .injected_inputs
            .iter()
            .map(|injected| (injected.index, injected.to_parts()))
            .collect::<Vec<_>>();
        let inputs = splice(injected_inputs, own_inputs, Collision::Reject, "input")?;

        let injected_outputs = self
            .state
            .injected_outputs
            .iter()
            .map(|injected| (injected.index, injected.txout.clone()))
            .collect::<Vec<_>>();
        let mut outputs = splice(
            injected_outputs,
            self.state.outputs.clone(),
            Collision::Probe,
            "output",
        )?
        .items;

        self.state.change_output_index = None;
        if self.state.change_amount >= DUST_FLOOR as i64 {
            self.state.change_output_index = Some(outputs.len());
            outputs.push(TxOut {
                value: Amount::from_sat(self.state.change_amount.unsigned_abs()),
                script_pubkey: self.change_script.clone(),
            });
        }

        let (txins, psbt_inputs): (Vec<_>, Vec<_>) = inputs.items.into_iter().unzip();
        let mut psbt = Psbt::from_unsigned_tx(Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: txins,
            output: outputs,
        })?;
        psbt.inputs = psbt_inputs;

        self.state.own_input_indexes = (0..psbt.inputs.len())
            .filter(|index| inputs.injected.binary_search(index).is_err())
            .collect();
        self.state.injected_input_indexes = inputs.injected;
        self.state.input_amount = self
            .state
            .inputs
            .iter()
            .map(|input| input.value().to_sat())
            .chain(
                self.state
                    .injected_inputs
                    .iter()
                    .map(|injected| injected.value.to_sat()),
            )
            .sum();

        self.estimator.set_psbt(psbt);
        self.state.fee = self.estimator.compute_fee()?;
        self.state.virtual_size = self.estimator.virtual_size();
        self.state.weight = self.estimator.weight();

        Ok(())
    }

    fn sequence(&self) -> Sequence {
        if self.rbf {
            RBF_ENABLED_SEQUENCE
        } else {
            RBF_DISABLED_SEQUENCE
        }
    }

    /// Signals replace-by-fee on every input owned by this builder.
    pub fn enable_rbf(&mut self) {
        self.rbf = true;
        self.apply_sequence();
    }

    /// Stops signalling replace-by-fee on every input owned by this builder.
    pub fn disable_rbf(&mut self) {
        self.rbf = false;
        self.apply_sequence();
    }

    // injected inputs keep the sequence their owner signed
    fn apply_sequence(&mut self) {
        let sequence = self.sequence();
        let indexes = self.state.own_input_indexes.clone();
        let tx = &mut self.estimator.psbt_mut().unsigned_tx;
        for index in indexes {
            if let Some(txin) = tx.input.get_mut(index) {
                txin.sequence = sequence;
            }
        }
    }

    pub fn is_rbf_enabled(&self) -> bool {
        self.rbf
    }

    /// Describes the inputs the payer must sign.
    ///
    /// In instant trade mode the reserved counterparty index is never included.
    pub fn inputs_to_sign(&self) -> PsbtResult<InputsToSign> {
        self.ensure_prepared()?;

        let signing_indexes = self
            .state
            .own_input_indexes
            .iter()
            .copied()
            .filter(|index| !(self.instant_trade_mode && *index == INSTANT_TRADE_RESERVED_INDEX))
            .collect();

        Ok(InputsToSign {
            address: self.address.clone(),
            signing_indexes,
            sighash: self.sighash.map(|sighash| sighash.to_u32()),
        })
    }

    pub fn to_psbt(&self) -> PsbtResult<Psbt> {
        self.ensure_prepared()?;
        Ok(self.estimator.psbt().clone())
    }

    pub fn to_hex(&self) -> PsbtResult<String> {
        self.ensure_prepared()?;
        Ok(psbt_to_hex(self.estimator.psbt()))
    }

    pub fn to_base64(&self) -> PsbtResult<String> {
        self.ensure_prepared()?;
        Ok(psbt_to_base64(self.estimator.psbt()))
    }

    fn ensure_prepared(&self) -> PsbtResult<()> {
        if self.prepared {
            Ok(())
        } else {
            Err(PsbtError::NotPrepared)
        }
    }

    pub fn state(&self) -> &BuilderState {
        &self.state
    }

    pub fn estimator(&self) -> &FeeEstimator {
        &self.estimator
    }

    pub fn input_amount(&self) -> u64 {
        self.state.input_amount
    }

    pub fn output_amount(&self) -> u64 {
        self.state.output_amount
    }

    pub fn change_amount(&self) -> i64 {
        self.state.change_amount
    }

    pub fn fee(&self) -> u64 {
        self.state.fee
    }

    pub fn virtual_size(&self) -> u64 {
        self.state.virtual_size
    }

    pub fn weight(&self) -> u64 {
        self.state.weight
    }

    /// UTXOs spent by this builder, in retrieval order.
    pub fn reserved_utxos(&self) -> &[OutPoint] {
        &self.reserved
    }

    pub fn is_exhausted(&self) -> bool {
        self.state.exhausted
    }
}

fn resolve_script(address: &str, network: Network) -> PsbtResult<ScriptBuf> {
    parse_address(address, network)
        .map(|address| address.script_pubkey())
        .ok_or_else(|| PsbtError::InvalidAddress(address.to_string()))
}

fn empty_transaction() -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: Vec::new(),
        output: Vec::new(),
    }
}
