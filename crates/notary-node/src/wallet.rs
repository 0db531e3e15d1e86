//! Wiring from [`AnchorSettings`] to a live anchor.

use notary_anchor::{AnchorBuilder, BitcoinRpc};
use tracing::info;

use crate::config::AnchorSettings;
use crate::error::NodeError;

/// Anchor backed by a Bitcoin Core wallet.
pub type WalletAnchor = AnchorBuilder<BitcoinRpc>;

/// Connect to the wallet node, unlock the wallet when a passphrase is set,
/// and load the signing key for the anchor address.
///
/// Returns `Ok(None)` when anchoring is disabled.
pub fn connect_anchor(settings: &AnchorSettings) -> Result<Option<WalletAnchor>, NodeError> {
    if !settings.enabled {
        info!("anchoring disabled");
        return Ok(None);
    }
    let config = settings.anchor_config()?;
    let rpc = BitcoinRpc::connect(
        &settings.rpc_url,
        settings.rpc_user.as_deref(),
        settings.rpc_password.as_deref(),
    )?;
    if let Some(passphrase) = &settings.wallet_passphrase {
        rpc.unlock_wallet(passphrase, settings.unlock_timeout_secs)?;
    }
    Ok(Some(AnchorBuilder::connect(rpc, config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_settings_connect_nothing() {
        let anchor = connect_anchor(&AnchorSettings::default()).unwrap();
        assert!(anchor.is_none());
    }

    #[test]
    fn enabled_without_address_is_a_config_error() {
        let settings = AnchorSettings {
            enabled: true,
            ..AnchorSettings::default()
        };
        assert!(matches!(connect_anchor(&settings), Err(NodeError::Config(_))));
    }
}
