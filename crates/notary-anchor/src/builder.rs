//! Anchoring transaction construction, signing, validation, and broadcast.
//!
//! One call to [`AnchorBuilder::anchor`] runs a full attempt:
//!
//! 1. select wallet outputs covering the fixed fee, largest first
//! 2. build the commitment output and, when the inputs overshoot, a change
//!    output back to the wallet address
//! 3. sign every input with the wallet key (`SIGHASH_ALL`)
//! 4. verify every input script locally against its previous output
//! 5. broadcast
//!
//! Nothing reaches the network unless step 4 passes for every input. There
//! is no retry and no timeout here; both are caller policy.

use std::str::FromStr;

use bitcoin::address::NetworkUnchecked;
use bitcoin::blockdata::script::Builder;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{All, Message, Secp256k1};
use bitcoin::sighash::SighashCache;
use bitcoin::{
    absolute, ecdsa, transaction, Address, AddressType, Amount, EcdsaSighashType, Network, PrivateKey,
    PublicKey, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use tracing::{debug, info, warn};

use notary_core::Hash256;

use crate::commitment::build_commitment_script;
use crate::error::AnchorError;
use crate::rpc::{TxStatus, UnspentOutput, WalletRpc};
use crate::selection::{select_inputs, InputSelection};

/// Script verification flags applied before broadcast.
const VERIFY_FLAGS: u32 = bitcoinconsensus::VERIFY_P2SH
    | bitcoinconsensus::VERIFY_DERSIG
    | bitcoinconsensus::VERIFY_NULLDUMMY;

/// Internal byte order of a txid as a [`Hash256`].
pub fn txid_to_hash(txid: &Txid) -> Hash256 {
    Hash256(txid.to_byte_array())
}

pub fn hash_to_txid(hash: &Hash256) -> Txid {
    Txid::from_byte_array(hash.0)
}

/// Parse a Bitcoin network name (`bitcoin`, `testnet`, `signet`, `regtest`).
pub fn parse_network(name: &str) -> Result<Network, AnchorError> {
    Network::from_str(name).map_err(|e| AnchorError::Config(format!("network {name}: {e}")))
}

/// Wallet and fee parameters for anchoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorConfig {
    /// Wallet address that funds anchors and receives change.
    pub address: Address,
    /// Fixed fee per anchoring transaction.
    pub fee: Amount,
    pub min_confirmations: u32,
    pub max_confirmations: u32,
}

impl AnchorConfig {
    /// Parse `address` for `network`. Only P2PKH wallet addresses are
    /// accepted, since inputs are signed with legacy script signatures.
    pub fn new(
        address: &str,
        network: Network,
        fee_sat: u64,
        min_confirmations: u32,
        max_confirmations: u32,
    ) -> Result<Self, AnchorError> {
        let address = Address::<NetworkUnchecked>::from_str(address)
            .map_err(|e| AnchorError::Config(format!("address {address}: {e}")))?
            .require_network(network)
            .map_err(|e| AnchorError::Config(e.to_string()))?;
        if address.address_type() != Some(AddressType::P2pkh) {
            return Err(AnchorError::Config(format!(
                "address {address} is not P2PKH; only P2PKH wallet addresses can sign anchors"
            )));
        }
        if fee_sat == 0 {
            return Err(AnchorError::Config("fee must be non-zero".into()));
        }
        if min_confirmations > max_confirmations {
            return Err(AnchorError::Config(format!(
                "min confirmations {min_confirmations} exceeds max {max_confirmations}"
            )));
        }
        Ok(Self {
            address,
            fee: Amount::from_sat(fee_sat),
            min_confirmations,
            max_confirmations,
        })
    }
}

/// Outcome of a successful broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorReceipt {
    pub txid: Txid,
    /// Hash carried by the commitment output.
    pub commitment: Hash256,
    pub inputs: usize,
    pub fee: Amount,
    pub change: Amount,
}

impl AnchorReceipt {
    /// Transaction id in the form stored in anchor records.
    pub fn tx_hash(&self) -> Hash256 {
        txid_to_hash(&self.txid)
    }
}

/// Something that can anchor a commitment hash into an external chain.
pub trait CommitmentAnchor: Send + Sync {
    /// Run one full anchoring attempt for `commitment`.
    fn anchor(&self, commitment: &Hash256) -> Result<AnchorReceipt, AnchorError>;

    /// Confirmation state of a previously broadcast anchor.
    fn status(&self, tx_hash: &Hash256) -> Result<TxStatus, AnchorError>;
}

impl<T: CommitmentAnchor + ?Sized> CommitmentAnchor for std::sync::Arc<T> {
    fn anchor(&self, commitment: &Hash256) -> Result<AnchorReceipt, AnchorError> {
        (**self).anchor(commitment)
    }

    fn status(&self, tx_hash: &Hash256) -> Result<TxStatus, AnchorError> {
        (**self).status(tx_hash)
    }
}

/// Verify every input script of `tx` against the output it spends.
///
/// `prevouts[i]` must be the output spent by input `i`.
pub fn validate_inputs(tx: &Transaction, prevouts: &[UnspentOutput]) -> Result<(), AnchorError> {
    if prevouts.len() != tx.input.len() {
        return Err(AnchorError::InvalidTransaction {
            input: prevouts.len().min(tx.input.len()),
            reason: format!(
                "{} inputs but {} previous outputs",
                tx.input.len(),
                prevouts.len()
            ),
        });
    }
    let bytes = bitcoin::consensus::encode::serialize(tx);
    for (index, prev) in prevouts.iter().enumerate() {
        bitcoinconsensus::verify_with_flags(
            prev.script_pubkey.as_bytes(),
            prev.amount.to_sat(),
            &bytes,
            index,
            VERIFY_FLAGS,
        )
        .map_err(|e| AnchorError::InvalidTransaction {
            input: index,
            reason: format!("{e:?}"),
        })?;
    }
    Ok(())
}

/// Builds, signs, validates, and broadcasts anchoring transactions for one
/// wallet address.
pub struct AnchorBuilder<R: WalletRpc> {
    rpc: R,
    config: AnchorConfig,
    key: PrivateKey,
    secp: Secp256k1<All>,
}

impl<R: WalletRpc> AnchorBuilder<R> {
    /// Fetch the wallet key for the configured address once, up front.
    pub fn connect(rpc: R, config: AnchorConfig) -> Result<Self, AnchorError> {
        let key = rpc.dump_private_key(&config.address)?;
        info!(address = %config.address, fee = config.fee.to_sat(), "anchor wallet ready");
        Ok(Self {
            rpc,
            config,
            key,
            secp: Secp256k1::new(),
        })
    }

    pub fn config(&self) -> &AnchorConfig {
        &self.config
    }

    pub fn rpc(&self) -> &R {
        &self.rpc
    }

    /// Unsigned transaction spending `selection`: commitment output first,
    /// then change iff the selection overshoots the fee.
    pub fn build_unsigned(
        &self,
        selection: &InputSelection,
        commitment: &Hash256,
    ) -> Result<Transaction, AnchorError> {
        let input = selection
            .selected
            .iter()
            .map(|utxo| TxIn {
                previous_output: utxo.outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
            .collect();

        let mut output = vec![TxOut {
            value: Amount::ZERO,
            script_pubkey: build_commitment_script(commitment)?,
        }];
        if selection.change > Amount::ZERO {
            output.push(TxOut {
                value: selection.change,
                script_pubkey: self.config.address.script_pubkey(),
            });
        }

        Ok(Transaction {
            version: transaction::Version::ONE,
            lock_time: absolute::LockTime::ZERO,
            input,
            output,
        })
    }

    /// Sign every input in order, using each previous output's locking
    /// script as the signing context.
    pub fn sign(&self, tx: &mut Transaction, prevouts: &[UnspentOutput]) -> Result<(), AnchorError> {
        let pubkey: PublicKey = self.key.public_key(&self.secp);
        let mut script_sigs = Vec::with_capacity(prevouts.len());
        {
            let cache = SighashCache::new(&*tx);
            for (index, prev) in prevouts.iter().enumerate() {
                let sighash = cache
                    .legacy_signature_hash(index, &prev.script_pubkey, EcdsaSighashType::All.to_u32())
                    .map_err(|e| AnchorError::Signing(format!("input {index}: {e}")))?;
                let msg = Message::from_digest(sighash.to_byte_array());
                let signature = ecdsa::Signature {
                    signature: self.secp.sign_ecdsa(&msg, &self.key.inner),
                    sighash_type: EcdsaSighashType::All,
                };
                script_sigs.push(
                    Builder::new()
                        .push_slice(signature.serialize())
                        .push_key(&pubkey)
                        .into_script(),
                );
            }
        }
        for (input, script_sig) in tx.input.iter_mut().zip(script_sigs) {
            input.script_sig = script_sig;
        }
        Ok(())
    }
}

impl<R: WalletRpc> CommitmentAnchor for AnchorBuilder<R> {
    fn anchor(&self, commitment: &Hash256) -> Result<AnchorReceipt, AnchorError> {
        let utxos = self.rpc.list_unspent(
            self.config.min_confirmations,
            self.config.max_confirmations,
            &self.config.address,
        )?;
        let selection = select_inputs(&utxos, self.config.fee)?;
        debug!(
            inputs = selection.selected.len(),
            total = selection.total.to_sat(),
            change = selection.change.to_sat(),
            "inputs selected"
        );

        let mut tx = self.build_unsigned(&selection, commitment)?;
        self.sign(&mut tx, &selection.selected)?;
        validate_inputs(&tx, &selection.selected)?;

        match self.rpc.decode_raw_transaction(&tx) {
            Ok(decoded) => debug!(
                txid = %decoded.txid,
                size = decoded.size,
                vsize = decoded.vsize,
                inputs = decoded.inputs,
                outputs = decoded.outputs,
                "anchor transaction decoded by node"
            ),
            Err(e) => warn!(error = %e, "node could not decode anchor transaction"),
        }

        let txid = self.rpc.send_raw_transaction(&tx)?;
        info!(%txid, %commitment, inputs = selection.selected.len(), change = selection.change.to_sat(), "anchor broadcast");

        Ok(AnchorReceipt {
            txid,
            commitment: *commitment,
            inputs: selection.selected.len(),
            fee: selection.fee,
            change: selection.change,
        })
    }

    fn status(&self, tx_hash: &Hash256) -> Result<TxStatus, AnchorError> {
        self.rpc.transaction_status(&hash_to_txid(tx_hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::parse_commitment;
    use crate::rpc::{DecodedTx, MockWalletRpc};
    use bitcoin::secp256k1::SecretKey;
    use bitcoin::OutPoint;

    fn key(seed: u8) -> PrivateKey {
        PrivateKey::new(SecretKey::from_slice(&[seed; 32]).unwrap(), Network::Regtest)
    }

    fn address_of(key: &PrivateKey) -> Address {
        Address::p2pkh(key.public_key(&Secp256k1::new()), Network::Regtest)
    }

    fn config_for(key: &PrivateKey, fee_sat: u64) -> AnchorConfig {
        AnchorConfig {
            address: address_of(key),
            fee: Amount::from_sat(fee_sat),
            min_confirmations: 1,
            max_confirmations: 9_999_999,
        }
    }

    fn utxo(owner: &PrivateKey, vout: u32, sat: u64) -> UnspentOutput {
        UnspentOutput {
            outpoint: OutPoint::new(Txid::from_byte_array([0x42; 32]), vout),
            amount: Amount::from_sat(sat),
            script_pubkey: address_of(owner).script_pubkey(),
            confirmations: 10,
            spendable: true,
        }
    }

    fn mock_wallet(wallet_key: PrivateKey, utxos: Vec<UnspentOutput>) -> MockWalletRpc {
        let mut rpc = MockWalletRpc::new();
        rpc.expect_dump_private_key()
            .returning(move |_| Ok(wallet_key));
        rpc.expect_list_unspent()
            .returning(move |_, _, _| Ok(utxos.clone()));
        rpc.expect_decode_raw_transaction().returning(|tx| {
            Ok(DecodedTx {
                txid: tx.compute_txid(),
                size: 0,
                vsize: 0,
                inputs: tx.input.len(),
                outputs: tx.output.len(),
            })
        });
        rpc
    }

    #[test]
    fn config_rejects_wrong_network_and_zero_fee() {
        let addr = address_of(&key(1)).to_string();
        assert!(AnchorConfig::new(&addr, Network::Regtest, 1000, 1, 10).is_ok());
        assert!(matches!(
            AnchorConfig::new(&addr, Network::Bitcoin, 1000, 1, 10),
            Err(AnchorError::Config(_))
        ));
        assert!(matches!(
            AnchorConfig::new(&addr, Network::Regtest, 0, 1, 10),
            Err(AnchorError::Config(_))
        ));
        assert!(AnchorConfig::new(&addr, Network::Regtest, 1000, 11, 10).is_err());
        assert!(AnchorConfig::new("not-an-address", Network::Regtest, 1000, 1, 10).is_err());
    }

    #[test]
    fn config_rejects_segwit_wallet_address() {
        let segwit = Address::p2wsh(&ScriptBuf::new(), Network::Regtest).to_string();
        let err = AnchorConfig::new(&segwit, Network::Regtest, 1000, 1, 10).unwrap_err();
        assert!(matches!(err, AnchorError::Config(ref msg) if msg.contains("P2PKH")));
    }

    #[test]
    fn network_names() {
        assert_eq!(parse_network("regtest").unwrap(), Network::Regtest);
        assert_eq!(parse_network("bitcoin").unwrap(), Network::Bitcoin);
        assert!(parse_network("moonnet").is_err());
    }

    #[test]
    fn txid_hash_conversion_round_trips() {
        let txid = Txid::from_byte_array([7; 32]);
        assert_eq!(hash_to_txid(&txid_to_hash(&txid)), txid);
    }

    #[test]
    fn anchor_builds_signs_and_broadcasts() {
        let wallet = key(1);
        let mut rpc = mock_wallet(
            wallet,
            vec![utxo(&wallet, 0, 2_000), utxo(&wallet, 1, 5_000), utxo(&wallet, 2, 3_000)],
        );
        rpc.expect_send_raw_transaction()
            .times(1)
            .withf(|tx| {
                tx.input.len() == 2
                    && tx.output.len() == 2
                    && tx.output[0].value == Amount::ZERO
                    && tx.output[1].value == Amount::from_sat(2_000)
                    && tx.input.iter().all(|i| !i.script_sig.is_empty())
            })
            .returning(|tx| Ok(tx.compute_txid()));

        let builder = AnchorBuilder::connect(rpc, config_for(&wallet, 6_000)).unwrap();
        let commitment = Hash256([0xC0; 32]);
        let receipt = builder.anchor(&commitment).unwrap();

        assert_eq!(receipt.inputs, 2);
        assert_eq!(receipt.change, Amount::from_sat(2_000));
        assert_eq!(receipt.commitment, commitment);
        assert_eq!(receipt.tx_hash(), txid_to_hash(&receipt.txid));
    }

    #[test]
    fn exact_fee_has_single_commitment_output() {
        let wallet = key(2);
        let builder = AnchorBuilder::connect(
            mock_wallet(wallet, vec![]),
            config_for(&wallet, 6_000),
        )
        .unwrap();
        let selection = select_inputs(
            &[utxo(&wallet, 0, 4_000), utxo(&wallet, 1, 2_000)],
            Amount::from_sat(6_000),
        )
        .unwrap();
        let commitment = Hash256([3; 32]);
        let tx = builder.build_unsigned(&selection, &commitment).unwrap();

        assert_eq!(tx.output.len(), 1);
        assert_eq!(parse_commitment(&tx.output[0].script_pubkey).unwrap(), commitment);
    }

    #[test]
    fn signed_transaction_passes_local_validation() {
        let wallet = key(3);
        let builder = AnchorBuilder::connect(
            mock_wallet(wallet, vec![]),
            config_for(&wallet, 1_000),
        )
        .unwrap();
        let prevouts = vec![utxo(&wallet, 0, 900), utxo(&wallet, 1, 400)];
        let selection = select_inputs(&prevouts, Amount::from_sat(1_000)).unwrap();
        let mut tx = builder.build_unsigned(&selection, &Hash256([1; 32])).unwrap();

        assert!(validate_inputs(&tx, &selection.selected).is_err());
        builder.sign(&mut tx, &selection.selected).unwrap();
        validate_inputs(&tx, &selection.selected).unwrap();
    }

    #[test]
    fn validation_failure_never_broadcasts() {
        let wallet = key(4);
        let stranger = key(5);
        // The wallet's key cannot satisfy outputs locked to another key.
        let mut rpc = mock_wallet(wallet, vec![utxo(&stranger, 0, 10_000)]);
        rpc.expect_send_raw_transaction().times(0);

        let builder = AnchorBuilder::connect(rpc, config_for(&wallet, 1_000)).unwrap();
        let err = builder.anchor(&Hash256([9; 32])).unwrap_err();
        assert!(matches!(err, AnchorError::InvalidTransaction { input: 0, .. }));
    }

    #[test]
    fn insufficient_funds_stops_before_signing() {
        let wallet = key(6);
        let mut rpc = mock_wallet(wallet, vec![utxo(&wallet, 0, 500)]);
        rpc.expect_send_raw_transaction().times(0);

        let builder = AnchorBuilder::connect(rpc, config_for(&wallet, 1_000)).unwrap();
        assert_eq!(
            builder.anchor(&Hash256::ZERO).unwrap_err(),
            AnchorError::InsufficientFunds { have: 500, need: 1_000 }
        );
    }

    #[test]
    fn broadcast_failure_surfaces() {
        let wallet = key(7);
        let mut rpc = mock_wallet(wallet, vec![utxo(&wallet, 0, 5_000)]);
        rpc.expect_send_raw_transaction()
            .times(1)
            .returning(|_| Err(AnchorError::BroadcastFailed("connection refused".into())));

        let builder = AnchorBuilder::connect(rpc, config_for(&wallet, 1_000)).unwrap();
        let err = builder.anchor(&Hash256::ZERO).unwrap_err();
        assert!(matches!(err, AnchorError::BroadcastFailed(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn status_queries_by_txid() {
        let wallet = key(8);
        let mut rpc = mock_wallet(wallet, vec![]);
        let expected = Txid::from_byte_array([0xAB; 32]);
        rpc.expect_transaction_status()
            .withf(move |txid| *txid == expected)
            .returning(|_| {
                Ok(TxStatus {
                    confirmations: 6,
                    block_hash: None,
                    block_height: Some(100),
                })
            });
        let builder = AnchorBuilder::connect(rpc, config_for(&wallet, 1_000)).unwrap();
        let status = builder.status(&txid_to_hash(&expected)).unwrap();
        assert_eq!(status.confirmations, 6);
    }
}
