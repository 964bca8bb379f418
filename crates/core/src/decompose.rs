//! Raw transaction decomposition into outputs and cells.
//!
//! Output scripts are split into cells on three markers:
//! - `OP_RETURN` ends the current cell and stays as its last token
//! - `OP_0` ends the current cell and stays as its last token
//! - a push of the single byte `|` ends the current cell and is dropped
//!
//! Empty cells are never emitted.

use bitcoin::consensus::encode::deserialize;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::script::Instruction;
use bitcoin::{Script, Transaction, Txid};
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::types::{Cell, DecomposedTx, Output, Token};
use crate::{OP_FALSE, OP_RETURN, PIPE};

/// Service that turns raw transaction bytes into decomposed outputs.
pub trait TxDecomposer: Send + Sync {
    /// Decompose a raw (serialized) transaction.
    fn decompose(&self, raw_tx: &[u8]) -> Result<DecomposedTx>;
}

/// Default decomposer backed by the `bitcoin` script parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptDecomposer;

impl TxDecomposer for ScriptDecomposer {
    fn decompose(&self, raw_tx: &[u8]) -> Result<DecomposedTx> {
        decompose(raw_tx)
    }
}

/// Decompose a raw transaction.
pub fn decompose(raw_tx: &[u8]) -> Result<DecomposedTx> {
    let tx: Transaction = deserialize(raw_tx).map_err(|e| CoreError::Decode(e.to_string()))?;

    let outputs = tx
        .output
        .iter()
        .enumerate()
        .map(|(index, out)| {
            Output::new(
                index as u32,
                out.value.to_sat(),
                split_script(&out.script_pubkey),
            )
        })
        .collect();

    Ok(DecomposedTx {
        tx_id: tx.compute_txid().to_string(),
        outputs,
    })
}

/// Decompose a hex-encoded raw transaction.
pub fn decompose_hex(raw_tx_hex: &str) -> Result<DecomposedTx> {
    let raw = hex::decode(raw_tx_hex.trim())
        .map_err(|e| CoreError::Decode(format!("invalid hex: {e}")))?;
    decompose(&raw)
}

/// Compute the transaction id of raw bytes without parsing them.
pub fn tx_id_from_raw(raw_tx: &[u8]) -> String {
    Txid::from_raw_hash(sha256d::Hash::hash(raw_tx)).to_string()
}

/// Split one output script into its tape of cells.
///
/// Parsing stops at the first malformed instruction; everything read up to
/// that point is kept.
pub fn split_script(script: &Script) -> Vec<Cell> {
    let mut cells = Vec::new();
    let mut current = Vec::new();

    for instruction in script.instructions() {
        let instruction = match instruction {
            Ok(instruction) => instruction,
            Err(e) => {
                debug!("Stopping script decomposition at malformed instruction: {}", e);
                break;
            }
        };

        match instruction {
            Instruction::PushBytes(bytes) if bytes.is_empty() => {
                current.push(Token::Op(OP_FALSE));
                flush(&mut cells, &mut current);
            }
            Instruction::PushBytes(bytes) if bytes.as_bytes() == [PIPE].as_slice() => {
                flush(&mut cells, &mut current);
            }
            Instruction::PushBytes(bytes) => current.push(Token::push(bytes.as_bytes())),
            Instruction::Op(op) if op.to_u8() == OP_RETURN => {
                current.push(Token::Op(OP_RETURN));
                flush(&mut cells, &mut current);
            }
            Instruction::Op(op) => current.push(Token::Op(op.to_u8())),
        }
    }

    flush(&mut cells, &mut current);
    cells
}

fn flush(cells: &mut Vec<Cell>, current: &mut Vec<Token>) {
    if !current.is_empty() {
        cells.push(Cell::new(std::mem::take(current)));
    }
}
