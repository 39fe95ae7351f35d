use bitcoin::{psbt, Amount, ScriptBuf, TxIn, TxOut, Witness};

use crate::{PsbtError, PsbtResult};

/// Input built and possibly signed by another party, spliced verbatim into
/// the transaction at `index`.
#[derive(Debug, Clone)]
pub struct InjectedInput {
    /// Position of the input in the final transaction
    pub index: usize,
    /// Raw transaction input
    pub txin: TxIn,
    /// PSBT metadata of the input (previous output, signatures, sighash)
    pub input: psbt::Input,
    /// Value of the spent output
    pub value: Amount,
}

impl InjectedInput {
    /// Splits the leg into an unsigned transaction input and its PSBT input.
    ///
    /// Signature data carried by the raw input is moved into the final
    /// script fields of the PSBT input, unless those are already set.
    pub(crate) fn to_parts(&self) -> (TxIn, psbt::Input) {
        let mut txin = self.txin.clone();
        let mut input = self.input.clone();

        let script_sig = std::mem::replace(&mut txin.script_sig, ScriptBuf::new());
        if !script_sig.is_empty() && input.final_script_sig.is_none() {
            input.final_script_sig = Some(script_sig);
        }
        let witness = std::mem::replace(&mut txin.witness, Witness::new());
        if !witness.is_empty() && input.final_script_witness.is_none() {
            input.final_script_witness = Some(witness);
        }

        (txin, input)
    }
}

/// Output belonging to another party, spliced verbatim into the transaction
/// at `index`.
#[derive(Debug, Clone)]
pub struct InjectedOutput {
    /// Position of the output in the final transaction
    pub index: usize,
    pub txout: TxOut,
}

/// What to do when an injected item targets an index which is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Collision {
    /// Move on to the next free index
    Probe,
    Reject,
}

/// Result of [`splice`]: the ordered items and the indexes holding injected ones.
#[derive(Debug)]
pub(crate) struct Spliced<T> {
    pub items: Vec<T>,
    pub injected: Vec<usize>,
}

/// Places `injected` items at their target indexes first, then fills the
/// remaining slots with `items` in their original order.
///
/// Fails if an injected index collides under [`Collision::Reject`] or if a
/// slot below an injected index is left without an item.
pub(crate) fn splice<T>(
    injected: Vec<(usize, T)>,
    items: Vec<T>,
    collision: Collision,
    kind: &str,
) -> PsbtResult<Spliced<T>> {
    let mut slots: Vec<Option<T>> = Vec::new();
    slots.resize_with(injected.len() + items.len(), || None);
    let mut injected_indexes = Vec::with_capacity(injected.len());

    for (target, item) in injected {
        let mut index = target;
        while matches!(slots.get(index), Some(Some(_))) {
            if collision == Collision::Reject {
                return Err(PsbtError::MalformedTransaction(format!(
                    "injected {kind} index {target} is already taken"
                )));
            }
            index += 1;
        }
        if index >= slots.len() {
            slots.resize_with(index + 1, || None);
        }
        debug!("injecting {kind} at index {index} (requested {target})");
        slots[index] = Some(item);
        injected_indexes.push(index);
    }

    let mut items = items.into_iter();
    for slot in slots.iter_mut().filter(|slot| slot.is_none()) {
        match items.next() {
            Some(item) => *slot = Some(item),
            None => break,
        }
    }

    let items = slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| {
                PsbtError::MalformedTransaction(format!("no {kind} available for index {index}"))
            })
        })
        .collect::<PsbtResult<Vec<_>>>()?;
    injected_indexes.sort_unstable();

    Ok(Spliced {
        items,
        injected: injected_indexes,
    })
}
