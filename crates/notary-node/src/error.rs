//! Node-level error type.

use notary_anchor::AnchorError;
use notary_core::{Hash256, StoreError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Anchor(#[from] AnchorError),

    /// The block was persisted but anchoring it failed. The block stays
    /// persisted and can be anchored again later.
    #[error("anchoring directory block {height} ({block_hash}) failed: {source}")]
    AnchorFailed {
        height: u64,
        block_hash: Hash256,
        #[source]
        source: AnchorError,
    },

    /// Anchoring did not finish within the caller's bound. The attempt may
    /// still complete in the background.
    #[error("anchoring directory block {height} timed out after {secs}s")]
    AnchorTimeout { height: u64, secs: u64 },

    /// An anchoring operation was requested but no anchor is configured.
    #[error("anchoring is disabled")]
    AnchoringDisabled,

    /// Entry blocks cannot be committed on the directory chain.
    #[error("chain {0} is reserved")]
    ReservedChain(Hash256),

    #[error("config error: {0}")]
    Config(String),

    #[error("export failed: {0}")]
    Export(String),

    #[error("background task failed: {0}")]
    Join(String),
}

impl NodeError {
    /// Whether the error leaves a persisted block waiting for an anchor.
    pub fn is_anchor_failure(&self) -> bool {
        matches!(
            self,
            NodeError::AnchorFailed { .. } | NodeError::AnchorTimeout { .. }
        )
    }
}
