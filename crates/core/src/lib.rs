//! # BAP Core
//!
//! Protocol building blocks for indexing Bitcoin Attestation Protocol (BAP)
//! transactions signed with the Author Identity Protocol (AIP).
//!
//! A BAP attestation lives in an unspendable `OP_RETURN` output as a pipe
//! separated list of push-data "cells":
//!
//! ```text
//! OP_0 OP_RETURN
//!   1BAPSuaPnfGnSBM3GLV9yhxUdYe4vGbdMT <type> <hash> <sequence>   (BAP cell)
//!   |
//!   1BAPSuaPnfGnSBM3GLV9yhxUdYe4vGbdMT DATA <hash> <data>         (optional BAP data cell)
//!   |
//!   15PciHG22SNLQJXMoSUaWVi7WSqc7hCfva BITCOIN_ECDSA <address> <signature>  (AIP cell)
//! ```
//!
//! ## Features
//!
//! - **Decomposition**: raw transaction → outputs → tape of cells ([`decompose`])
//! - **Classification**: locate the BAP, BAP data and AIP cells of an output ([`cells`])
//! - **Message reconstruction**: rebuild the exact bytes covered by the AIP signature ([`message`])
//! - **Signature verification**: Bitcoin Signed Message checks against a P2PKH address ([`signature`])
//! - **Parsing**: validated, normalized [`Attestation`] values ([`parser`])

#![warn(missing_docs)]

pub mod cells;
pub mod constants;
pub mod decompose;
pub mod error;
pub mod message;
pub mod parser;
pub mod signature;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export commonly used items
pub use cells::{classify, AipFields, BapFields, ClassifiedCells, ProtocolConfig};
pub use constants::*;
pub use decompose::{decompose, decompose_hex, tx_id_from_raw, ScriptDecomposer, TxDecomposer};
pub use error::{CoreError, Result};
pub use message::{reconstruct_message, verify_signature, SignedMessage};
pub use parser::{Attestation, AttestationParser, Rejection};
pub use signature::{BitcoinMessageVerifier, MessageVerifier};
pub use types::*;
