//! Protocol constants for BAP and AIP.

/// Bitcom address that prefixes every BAP cell.
pub const BAP_BITCOM_ADDRESS: &str = "1BAPSuaPnfGnSBM3GLV9yhxUdYe4vGbdMT";

/// Bitcom address that prefixes every AIP (identity signature) cell.
pub const AIP_BITCOM_ADDRESS: &str = "15PciHG22SNLQJXMoSUaWVi7WSqc7hCfva";

/// Second field of a BAP cell that carries a data payload instead of an action.
pub const DATA_TAG: &str = "DATA";

/// `OP_RETURN` opcode byte; first byte of every reconstructed AIP message.
pub const OP_RETURN: u8 = 0x6a;

/// `OP_0` / `OP_FALSE` opcode byte.
pub const OP_FALSE: u8 = 0x00;

/// Pipe byte separating protocols inside one output.
pub const PIPE: u8 = 0x7c;

/// First block that can contain a BAP transaction.
///
/// Used as the subscription cursor when nothing has been indexed yet.
pub const FIRST_BAP_BLOCK: u64 = 590_000;

/// Block height reported for transactions that are still in the mempool.
pub const MEMPOOL_BLOCK: u64 = 0;
