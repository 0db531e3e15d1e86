//! Largest-first input selection.
//!
//! Anchoring pays a fixed fee and sends no value anywhere but back to the
//! wallet, so the only target is the fee. Outputs are taken largest first
//! until their sum covers it, which keeps the input count (and with it the
//! signature count and transaction size) small.

use bitcoin::Amount;

use crate::error::AnchorError;
use crate::rpc::UnspentOutput;

/// Inputs chosen for one anchoring transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSelection {
    /// Selected outputs, largest first. This is also the input order.
    pub selected: Vec<UnspentOutput>,
    /// Sum of the selected outputs.
    pub total: Amount,
    /// Fee the selection covers.
    pub fee: Amount,
    /// `total - fee`, returned to the wallet when non-zero.
    pub change: Amount,
}

/// Select spendable outputs covering `fee`.
///
/// Unspendable outputs are ignored. Ties keep the wallet's listing order.
pub fn select_inputs(utxos: &[UnspentOutput], fee: Amount) -> Result<InputSelection, AnchorError> {
    let mut eligible: Vec<&UnspentOutput> = utxos.iter().filter(|u| u.spendable).collect();
    eligible.sort_by(|a, b| b.amount.cmp(&a.amount));

    let mut selected = Vec::new();
    let mut total = Amount::ZERO;

    for utxo in eligible {
        selected.push(utxo.clone());
        total = Amount::from_sat(total.to_sat().saturating_add(utxo.amount.to_sat()));
        if total >= fee {
            return Ok(InputSelection {
                selected,
                total,
                fee,
                change: total - fee,
            });
        }
    }

    Err(AnchorError::InsufficientFunds {
        have: total.to_sat(),
        need: fee.to_sat(),
    })
}
