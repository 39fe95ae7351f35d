use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use bitcoin::{consensus, Amount, OutPoint, Transaction, Txid};

use crate::wallet::{Datasource, GetSpendablesArgs, Utxo};
use crate::{PsbtError, PsbtResult};

/// A `get_spendables` call seen by [`MemoryDatasource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendablesRequest {
    pub address: String,
    pub value: Amount,
    pub exclude: Vec<OutPoint>,
    pub limit: Option<usize>,
}

/// Datasource serving a fixed list of UTXOs, greedily, in insertion order.
#[derive(Debug, Default)]
pub struct MemoryDatasource {
    utxos: Vec<Utxo>,
    transactions: HashMap<Txid, Transaction>,
    delays: HashMap<Txid, Duration>,
    requests: Mutex<Vec<SpendablesRequest>>,
    careless: bool,
}

impl MemoryDatasource {
    pub fn new(utxos: Vec<Utxo>) -> Self {
        Self {
            utxos,
            ..Default::default()
        }
    }

    pub fn with_transaction(mut self, transaction: Transaction) -> Self {
        self.transactions.insert(transaction.txid(), transaction);
        self
    }

    /// Delays the answer to `get_transaction` for `txid`.
    pub fn with_delay(mut self, txid: Txid, delay: Duration) -> Self {
        self.delays.insert(txid, delay);
        self
    }

    /// Ignores the exclusion list and returns every selected UTXO twice.
    pub fn careless(mut self) -> Self {
        self.careless = true;
        self
    }

    pub fn requests(&self) -> Vec<SpendablesRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Datasource for MemoryDatasource {
    async fn get_spendables(&self, args: GetSpendablesArgs<'_>) -> PsbtResult<Vec<Utxo>> {
        self.requests.lock().unwrap().push(SpendablesRequest {
            address: args.address.to_string(),
            value: args.value,
            exclude: args.exclude.to_vec(),
            limit: args.limit,
        });

        let mut total = Amount::ZERO;
        let mut selected = Vec::new();
        for utxo in self
            .utxos
            .iter()
            .filter(|utxo| self.careless || !args.exclude.contains(&utxo.outpoint))
        {
            if !selected.is_empty() && total >= args.value {
                break;
            }
            if args.limit.is_some_and(|limit| selected.len() >= limit) {
                break;
            }
            total += utxo.value;
            selected.push(utxo.clone());
            if self.careless {
                selected.push(utxo.clone());
            }
        }

        Ok(selected)
    }

    async fn get_transaction(&self, txid: &Txid) -> PsbtResult<Vec<u8>> {
        if let Some(delay) = self.delays.get(txid) {
            tokio::time::sleep(*delay).await;
        }

        self.transactions
            .get(txid)
            .map(consensus::serialize)
            .ok_or_else(|| PsbtError::Datasource(format!("transaction {txid} not found")))
    }
}
