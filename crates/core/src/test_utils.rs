//! Deterministic fixtures: signing keys, signed BAP outputs and raw transactions.
//!
//! Only compiled for tests or with the `test-utils` feature.

#![allow(missing_docs)]

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::Hash;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::secp256k1::{self, Secp256k1, SecretKey};
use bitcoin::sign_message::MessageSignature;
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, Network, OutPoint, PublicKey, ScriptBuf, Sequence, Transaction, TxIn, TxOut,
    Witness,
};

use crate::cells::{classify, ProtocolConfig};
use crate::decompose::split_script;
use crate::message::message_bytes;
use crate::signature::signed_message_hash;
use crate::types::{Cell, Output};
use crate::{AIP_BITCOM_ADDRESS, BAP_BITCOM_ADDRESS, DATA_TAG};

/// A secp256k1 key with its compressed P2PKH address.
#[derive(Debug, Clone)]
pub struct SigningKey {
    pub secret: SecretKey,
    pub public_key: PublicKey,
    pub address: Address,
}

impl SigningKey {
    /// Derive a key from a repeated seed byte (must be non-zero).
    pub fn from_seed(seed: u8) -> Self {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[seed; 32]).expect("seed byte yields a valid key");
        let public_key = PublicKey::new(secp256k1::PublicKey::from_secret_key(&secp, &secret));
        let address = Address::p2pkh(public_key.pubkey_hash(), Network::Bitcoin);
        Self {
            secret,
            public_key,
            address,
        }
    }
}

/// The default fixture key.
pub fn signing_key() -> SigningKey {
    SigningKey::from_seed(0x11)
}

/// Produce a 65-byte compact Bitcoin Signed Message signature.
pub fn sign_message(key: &SigningKey, message: &[u8]) -> Vec<u8> {
    let secp = Secp256k1::new();
    let digest = secp256k1::Message::from_digest(signed_message_hash(message).to_byte_array());
    let signature = secp.sign_ecdsa_recoverable(&digest, &key.secret);
    MessageSignature::new(signature, true).serialize().to_vec()
}

/// Fields of a BAP output to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BapTemplate {
    pub action: Option<(String, String, String)>,
    pub data: Option<(String, String)>,
}

impl BapTemplate {
    pub fn new(action: &str, hash: &str, sequence: &str) -> Self {
        Self {
            action: Some((action.into(), hash.into(), sequence.into())),
            data: None,
        }
    }

    pub fn data_only(hash: &str, payload: &str) -> Self {
        Self {
            action: None,
            data: Some((hash.into(), payload.into())),
        }
    }

    pub fn with_data(mut self, hash: &str, payload: &str) -> Self {
        self.data = Some((hash.into(), payload.into()));
        self
    }

    fn bap_cells(&self) -> Vec<Vec<Vec<u8>>> {
        let mut cells = Vec::new();
        if let Some((action, hash, sequence)) = &self.action {
            cells.push(vec![
                BAP_BITCOM_ADDRESS.as_bytes().to_vec(),
                action.as_bytes().to_vec(),
                hash.as_bytes().to_vec(),
                sequence.as_bytes().to_vec(),
            ]);
        }
        if let Some((hash, payload)) = &self.data {
            cells.push(vec![
                BAP_BITCOM_ADDRESS.as_bytes().to_vec(),
                DATA_TAG.as_bytes().to_vec(),
                hash.as_bytes().to_vec(),
                payload.as_bytes().to_vec(),
            ]);
        }
        cells
    }
}

/// Build the script of a BAP output signed by `key`.
pub fn bap_script(key: &SigningKey, template: &BapTemplate) -> ScriptBuf {
    let mut cells = template.bap_cells();

    let unsigned = Output::new(
        0,
        0,
        cells.iter().map(|c| Cell::from_pushes(c.iter())).collect(),
    );
    let protocol = ProtocolConfig::default();
    let classified = classify(&unsigned, &protocol);
    let primary = classified.primary.expect("template has at least one BAP cell");
    let message = message_bytes(&primary, classified.data.as_ref(), &protocol)
        .expect("template cells are complete");

    cells.push(vec![
        AIP_BITCOM_ADDRESS.as_bytes().to_vec(),
        b"BITCOIN_ECDSA".to_vec(),
        key.address.to_string().into_bytes(),
        sign_message(key, &message),
    ]);

    let borrowed: Vec<Vec<&[u8]>> = cells
        .iter()
        .map(|c| c.iter().map(Vec::as_slice).collect())
        .collect();
    op_return_script(&borrowed)
}

/// Decomposed BAP output signed by `key`.
pub fn bap_output(key: &SigningKey, template: &BapTemplate) -> Output {
    Output::new(0, 0, split_script(&bap_script(key, template)))
}

/// `OP_FALSE OP_RETURN` followed by the given cells separated by `|`.
pub fn op_return_script(cells: &[Vec<&[u8]>]) -> ScriptBuf {
    let mut builder = Builder::new()
        .push_opcode(bitcoin::opcodes::OP_FALSE)
        .push_opcode(bitcoin::opcodes::all::OP_RETURN);

    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            builder = builder.push_slice(push_bytes(b"|"));
        }
        for field in cell {
            builder = builder.push_slice(push_bytes(field));
        }
    }

    builder.into_script()
}

fn push_bytes(bytes: &[u8]) -> PushBytesBuf {
    PushBytesBuf::try_from(bytes.to_vec()).expect("fixture push fits in a script")
}

/// A one-input transaction paying zero to each script.
pub fn transaction_with_scripts(scripts: Vec<ScriptBuf>) -> Transaction {
    Transaction {
        version: Version::ONE,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: scripts
            .into_iter()
            .map(|script_pubkey| TxOut {
                value: Amount::ZERO,
                script_pubkey,
            })
            .collect(),
    }
}

/// Hex encoding of the serialized transaction.
pub fn raw_tx_hex(tx: &Transaction) -> String {
    hex::encode(serialize(tx))
}

/// Raw hex of a transaction with a single BAP output signed by `key`.
pub fn bap_transaction_hex(key: &SigningKey, template: &BapTemplate) -> (String, String) {
    let tx = transaction_with_scripts(vec![bap_script(key, template)]);
    (tx.compute_txid().to_string(), raw_tx_hex(&tx))
}
