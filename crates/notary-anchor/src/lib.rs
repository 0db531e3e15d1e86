//! # notary-anchor
//! Anchors directory block commitments into Bitcoin.
//!
//! - [`selection`] — largest-first input selection against a fixed fee
//! - [`commitment`] — the `OP_RETURN` commitment payload
//! - [`builder`] — transaction build, signing, local validation, broadcast
//! - [`rpc`] — the wallet RPC contract and the Bitcoin Core adapter
//! - [`error`] — [`AnchorError`] and the [`AnchorStage`] it failed at

pub mod builder;
pub mod commitment;
pub mod error;
pub mod rpc;
pub mod selection;

pub use builder::{
    hash_to_txid, parse_network, txid_to_hash, validate_inputs, AnchorBuilder, AnchorConfig, AnchorReceipt,
    CommitmentAnchor,
};
pub use commitment::{build_commitment_script, parse_commitment, ANCHOR_TAG};
pub use error::{AnchorError, AnchorStage};
pub use rpc::{BitcoinRpc, DecodedTx, TxStatus, UnspentOutput, WalletRpc};
pub use selection::{select_inputs, InputSelection};
