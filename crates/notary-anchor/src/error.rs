//! Anchoring error types.

use std::fmt;

use thiserror::Error;

/// Step of one anchoring attempt.
///
/// An attempt moves `SelectingInputs → BuildingOutputs → Signing →
/// Validating → Broadcasting → Recorded`. Any step may fail; the
/// [`AnchorError`] reports which one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnchorStage {
    SelectingInputs,
    BuildingOutputs,
    Signing,
    Validating,
    Broadcasting,
    Recorded,
}

impl fmt::Display for AnchorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnchorStage::SelectingInputs => "selecting inputs",
            AnchorStage::BuildingOutputs => "building outputs",
            AnchorStage::Signing => "signing",
            AnchorStage::Validating => "validating",
            AnchorStage::Broadcasting => "broadcasting",
            AnchorStage::Recorded => "recorded",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while anchoring a commitment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnchorError {
    /// The wallet cannot cover the anchoring fee.
    #[error("insufficient funds: have {have} sat, need {need} sat")]
    InsufficientFunds {
        /// Sum of every eligible output, in satoshis.
        have: u64,
        /// Fee that had to be covered, in satoshis.
        need: u64,
    },

    /// Local script verification rejected an input. Nothing was broadcast.
    #[error("invalid transaction: input {input}: {reason}")]
    InvalidTransaction { input: usize, reason: String },

    /// Submission to the network failed.
    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),

    /// Wallet RPC failure outside broadcast.
    #[error("rpc error while {stage}: {reason}")]
    Rpc { stage: AnchorStage, reason: String },

    /// Key or sighash failure while signing.
    #[error("signing: {0}")]
    Signing(String),

    /// Commitment payload could not be built or parsed.
    #[error("commitment: {0}")]
    Commitment(String),

    /// Anchor configuration is unusable.
    #[error("invalid anchor config: {0}")]
    Config(String),
}

impl AnchorError {
    /// Stage at which the attempt failed.
    pub fn stage(&self) -> AnchorStage {
        match self {
            AnchorError::InsufficientFunds { .. } => AnchorStage::SelectingInputs,
            AnchorError::InvalidTransaction { .. } => AnchorStage::Validating,
            AnchorError::BroadcastFailed(_) => AnchorStage::Broadcasting,
            AnchorError::Rpc { stage, .. } => *stage,
            AnchorError::Signing(_) => AnchorStage::Signing,
            AnchorError::Commitment(_) | AnchorError::Config(_) => AnchorStage::BuildingOutputs,
        }
    }

    /// Whether re-running the whole attempt later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnchorError::InsufficientFunds { .. }
                | AnchorError::BroadcastFailed(_)
                | AnchorError::Rpc { .. }
        )
    }
}
