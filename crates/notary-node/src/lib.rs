//! # notary-node — checkpoint orchestration over the store and the anchor.
//!
//! - [`checkpoint::Checkpointer`] — pending directory block, seal, anchor, reconcile
//! - [`pending::PendingDirBlock`] — entries accumulated for the next seal
//! - [`export`] — JSON-lines export of blocks and anchor records
//! - [`wallet`] — Bitcoin Core wallet wiring
//! - [`config::NodeConfig`] — node configuration

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod export;
pub mod pending;
pub mod wallet;

pub use checkpoint::{Checkpointer, ReconcileReport, SealedBlock};
pub use config::{AnchorSettings, NodeConfig};
pub use error::NodeError;
pub use export::{export_jsonl, ExportSummary};
pub use pending::PendingDirBlock;
pub use wallet::{connect_anchor, WalletAnchor};
