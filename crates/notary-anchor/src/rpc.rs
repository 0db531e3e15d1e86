//! Wallet RPC contract and the Bitcoin Core adapter.
//!
//! [`WalletRpc`] is everything the anchor builder needs from a wallet node.
//! [`BitcoinRpc`] implements it over `bitcoincore_rpc`; tests substitute
//! fakes. Connection setup and shutdown belong to the caller.

use bitcoin::hashes::Hash;
use bitcoin::{Address, Amount, BlockHash, OutPoint, PrivateKey, ScriptBuf, Transaction, Txid};
use bitcoincore_rpc::{Auth, Client, RpcApi};
use tracing::{debug, info};

use notary_core::Hash256;

use crate::error::{AnchorError, AnchorStage};

/// One spendable wallet output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnspentOutput {
    pub outpoint: OutPoint,
    pub amount: Amount,
    /// Locking script of the output; the signing context for spending it.
    pub script_pubkey: ScriptBuf,
    pub confirmations: u32,
    pub spendable: bool,
}

/// Node's summary of a raw transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTx {
    pub txid: Txid,
    pub size: usize,
    pub vsize: usize,
    pub inputs: usize,
    pub outputs: usize,
}

/// Confirmation state of a broadcast transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxStatus {
    pub confirmations: u32,
    pub block_hash: Option<BlockHash>,
    pub block_height: Option<u64>,
}

impl TxStatus {
    /// Confirming block hash in the byte order anchor records store.
    pub fn block_hash_bytes(&self) -> Option<Hash256> {
        self.block_hash.map(|hash| Hash256(hash.to_byte_array()))
    }
}

/// Wallet node operations used for anchoring.
#[cfg_attr(test, mockall::automock)]
pub trait WalletRpc: Send + Sync {
    /// Unspent outputs paying `address` with confirmations in `[min_conf, max_conf]`.
    fn list_unspent(
        &self,
        min_conf: u32,
        max_conf: u32,
        address: &Address,
    ) -> Result<Vec<UnspentOutput>, AnchorError>;

    /// Private key controlling `address`.
    fn dump_private_key(&self, address: &Address) -> Result<PrivateKey, AnchorError>;

    /// Ask the node to decode a transaction without submitting it.
    fn decode_raw_transaction(&self, tx: &Transaction) -> Result<DecodedTx, AnchorError>;

    /// Submit a signed transaction. Errors are [`AnchorError::BroadcastFailed`].
    fn send_raw_transaction(&self, tx: &Transaction) -> Result<Txid, AnchorError>;

    /// Confirmation state of `txid`.
    fn transaction_status(&self, txid: &Txid) -> Result<TxStatus, AnchorError>;
}

impl<T: WalletRpc + ?Sized> WalletRpc for std::sync::Arc<T> {
    fn list_unspent(
        &self,
        min_conf: u32,
        max_conf: u32,
        address: &Address,
    ) -> Result<Vec<UnspentOutput>, AnchorError> {
        (**self).list_unspent(min_conf, max_conf, address)
    }

    fn dump_private_key(&self, address: &Address) -> Result<PrivateKey, AnchorError> {
        (**self).dump_private_key(address)
    }

    fn decode_raw_transaction(&self, tx: &Transaction) -> Result<DecodedTx, AnchorError> {
        (**self).decode_raw_transaction(tx)
    }

    fn send_raw_transaction(&self, tx: &Transaction) -> Result<Txid, AnchorError> {
        (**self).send_raw_transaction(tx)
    }

    fn transaction_status(&self, txid: &Txid) -> Result<TxStatus, AnchorError> {
        (**self).transaction_status(txid)
    }
}

fn rpc_err(stage: AnchorStage) -> impl Fn(bitcoincore_rpc::Error) -> AnchorError {
    move |e| AnchorError::Rpc {
        stage,
        reason: e.to_string(),
    }
}

/// Bitcoin Core JSON-RPC wallet.
pub struct BitcoinRpc {
    client: Client,
}

impl BitcoinRpc {
    /// Connect to `url` with optional user/password credentials.
    pub fn connect(
        url: &str,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self, AnchorError> {
        let auth = match (user, password) {
            (Some(user), Some(pass)) => Auth::UserPass(user.to_string(), pass.to_string()),
            _ => Auth::None,
        };
        let client = Client::new(url, auth).map_err(|e| AnchorError::Rpc {
            stage: AnchorStage::SelectingInputs,
            reason: format!("connect {url}: {e}"),
        })?;
        info!(url, "connected to bitcoin rpc");
        Ok(Self { client })
    }

    /// Unlock an encrypted wallet for `timeout_secs`.
    pub fn unlock_wallet(&self, passphrase: &str, timeout_secs: u64) -> Result<(), AnchorError> {
        self.client
            .call::<serde_json::Value>(
                "walletpassphrase",
                &[passphrase.into(), timeout_secs.into()],
            )
            .map_err(rpc_err(AnchorStage::Signing))?;
        debug!(timeout_secs, "wallet unlocked");
        Ok(())
    }

    /// Underlying client, for calls outside the anchoring contract.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl WalletRpc for BitcoinRpc {
    fn list_unspent(
        &self,
        min_conf: u32,
        max_conf: u32,
        address: &Address,
    ) -> Result<Vec<UnspentOutput>, AnchorError> {
        let entries = self
            .client
            .list_unspent(
                Some(min_conf as usize),
                Some(max_conf as usize),
                Some(&[address][..]),
                None,
                None,
            )
            .map_err(rpc_err(AnchorStage::SelectingInputs))?;
        Ok(entries
            .into_iter()
            .map(|e| UnspentOutput {
                outpoint: OutPoint::new(e.txid, e.vout),
                amount: e.amount,
                script_pubkey: e.script_pub_key,
                confirmations: e.confirmations,
                spendable: e.spendable,
            })
            .collect())
    }

    fn dump_private_key(&self, address: &Address) -> Result<PrivateKey, AnchorError> {
        self.client
            .dump_private_key(address)
            .map_err(rpc_err(AnchorStage::Signing))
    }

    fn decode_raw_transaction(&self, tx: &Transaction) -> Result<DecodedTx, AnchorError> {
        let decoded = self
            .client
            .decode_raw_transaction(tx, None)
            .map_err(rpc_err(AnchorStage::Broadcasting))?;
        Ok(DecodedTx {
            txid: decoded.txid,
            size: decoded.size as usize,
            vsize: decoded.vsize as usize,
            inputs: decoded.vin.len(),
            outputs: decoded.vout.len(),
        })
    }

    fn send_raw_transaction(&self, tx: &Transaction) -> Result<Txid, AnchorError> {
        self.client
            .send_raw_transaction(tx)
            .map_err(|e| AnchorError::BroadcastFailed(e.to_string()))
    }

    fn transaction_status(&self, txid: &Txid) -> Result<TxStatus, AnchorError> {
        let info = self
            .client
            .get_raw_transaction_info(txid, None)
            .map_err(rpc_err(AnchorStage::Recorded))?;
        let block_height = match info.blockhash {
            Some(ref hash) => Some(
                self.client
                    .get_block_header_info(hash)
                    .map_err(rpc_err(AnchorStage::Recorded))?
                    .height as u64,
            ),
            None => None,
        };
        Ok(TxStatus {
            confirmations: info.confirmations.unwrap_or(0),
            block_hash: info.blockhash,
            block_height,
        })
    }
}
