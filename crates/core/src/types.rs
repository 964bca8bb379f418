//! Domain types: tokens, cells, outputs and transaction events.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use std::borrow::Cow;

/// One script element inside a cell.
///
/// Data pushes expose three equivalent views of the same bytes: raw bytes,
/// a (lossy UTF-8) text string and a hex string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    /// A non-push opcode such as `OP_RETURN`.
    Op(u8),

    /// A data push.
    Push(Vec<u8>),
}

impl Token {
    /// Create a data push token from anything byte-like.
    pub fn push(bytes: impl AsRef<[u8]>) -> Self {
        Token::Push(bytes.as_ref().to_vec())
    }

    /// Raw byte view. Opcodes have no payload and return an empty slice.
    pub fn bytes(&self) -> &[u8] {
        match self {
            Token::Op(_) => &[],
            Token::Push(bytes) => bytes,
        }
    }

    /// Text view of a data push.
    pub fn text(&self) -> Option<Cow<'_, str>> {
        match self {
            Token::Op(_) => None,
            Token::Push(bytes) => Some(String::from_utf8_lossy(bytes)),
        }
    }

    /// Hex view of a data push.
    pub fn hex(&self) -> Option<String> {
        match self {
            Token::Op(_) => None,
            Token::Push(bytes) => Some(hex::encode(bytes)),
        }
    }

    /// Base64 view of a data push.
    pub fn base64(&self) -> Option<String> {
        match self {
            Token::Op(_) => None,
            Token::Push(bytes) => Some(BASE64.encode(bytes)),
        }
    }

    /// The opcode, if this token is not a data push.
    pub fn opcode(&self) -> Option<u8> {
        match self {
            Token::Op(op) => Some(*op),
            Token::Push(_) => None,
        }
    }

    /// Whether the text view equals `value` exactly.
    pub fn text_eq(&self, value: &str) -> bool {
        matches!(self, Token::Push(bytes) if bytes.as_slice() == value.as_bytes())
    }
}

impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Token::Op(op) => {
                let mut state = serializer.serialize_struct("Token", 1)?;
                state.serialize_field("op", op)?;
                state.end()
            }
            Token::Push(bytes) => {
                let mut state = serializer.serialize_struct("Token", 3)?;
                state.serialize_field("s", &String::from_utf8_lossy(bytes))?;
                state.serialize_field("b", &BASE64.encode(bytes))?;
                state.serialize_field("h", &hex::encode(bytes))?;
                state.end()
            }
        }
    }
}

/// A contiguous group of tokens forming one logical protocol record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Cell(pub Vec<Token>);

impl Cell {
    /// Build a cell from tokens.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self(tokens)
    }

    /// Build a cell made only of data pushes.
    pub fn from_pushes<I, B>(pushes: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        Self(pushes.into_iter().map(Token::push).collect())
    }

    /// Token at `index`, if present.
    pub fn get(&self, index: usize) -> Option<&Token> {
        self.0.get(index)
    }

    /// All tokens in order.
    pub fn tokens(&self) -> &[Token] {
        &self.0
    }

    /// Number of tokens.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the cell has no tokens.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One transaction output, decomposed into its tape of cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Output {
    /// Output index (vout).
    pub index: u32,

    /// Output value in satoshis.
    pub value: u64,

    /// Ordered cells of the output script.
    pub tape: Vec<Cell>,
}

impl Output {
    /// Build an output from its cells.
    pub fn new(index: u32, value: u64, tape: Vec<Cell>) -> Self {
        Self { index, value, tape }
    }
}

/// Result of decomposing a raw transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecomposedTx {
    /// Transaction id (hex, display byte order).
    pub tx_id: String,

    /// Outputs in transaction order.
    pub outputs: Vec<Output>,
}

/// A transaction delivered by the feed, ready for processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionEvent {
    /// Transaction id.
    pub tx_id: String,

    /// Block height, `0` while the transaction is in the mempool.
    pub block_height: u64,

    /// Unix timestamp in seconds (block time, or first-seen time for mempool).
    pub timestamp: i64,

    /// Decomposed outputs.
    pub outputs: Vec<Output>,
}

impl TransactionEvent {
    /// Attach delivery context to a decomposed transaction.
    pub fn new(tx: DecomposedTx, block_height: u64, timestamp: i64) -> Self {
        Self {
            tx_id: tx.tx_id,
            block_height,
            timestamp,
            outputs: tx.outputs,
        }
    }

    /// Block height as an optional value (`None` while in the mempool).
    pub fn block(&self) -> Option<u64> {
        (self.block_height != crate::MEMPOOL_BLOCK).then_some(self.block_height)
    }
}
