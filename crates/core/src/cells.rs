//! Cell classification: find the BAP, BAP data and AIP cells of an output.

use serde::{Deserialize, Serialize};

use crate::types::{Cell, Output, Token};
use crate::{AIP_BITCOM_ADDRESS, BAP_BITCOM_ADDRESS, DATA_TAG};

/// Marker addresses identifying the two protocols.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Marker of the attestation (BAP) cells.
    pub bap_address: String,

    /// Marker of the identity signature (AIP) cell.
    pub aip_address: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            bap_address: BAP_BITCOM_ADDRESS.to_string(),
            aip_address: AIP_BITCOM_ADDRESS.to_string(),
        }
    }
}

/// Named view over a BAP cell: `marker | action | hash | value`.
///
/// For an action cell `value` is the sequence; for a `DATA` cell it is the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BapFields<'a> {
    /// Protocol marker.
    pub marker: &'a Token,
    /// Action tag (`ATTEST`, `ID`, `REVOKE`, `ALIAS`, ...) or `DATA`.
    pub action: Option<&'a Token>,
    /// Attestation hash or identity key.
    pub hash: Option<&'a Token>,
    /// Sequence number, or data payload for a `DATA` cell.
    pub value: Option<&'a Token>,
}

impl<'a> BapFields<'a> {
    /// Name the fields of a cell. Returns `None` for an empty cell.
    pub fn from_cell(cell: &'a Cell) -> Option<Self> {
        Some(Self {
            marker: cell.get(0)?,
            action: cell.get(1),
            hash: cell.get(2),
            value: cell.get(3),
        })
    }

    /// Whether this is a `DATA` cell.
    pub fn is_data(&self) -> bool {
        self.action.is_some_and(|t| t.text_eq(DATA_TAG))
    }
}

/// Named view over an AIP cell: `marker | algorithm | address | signature`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AipFields<'a> {
    /// Protocol marker.
    pub marker: &'a Token,
    /// Signing algorithm, normally `BITCOIN_ECDSA`.
    pub algorithm: Option<&'a Token>,
    /// Signing address.
    pub address: Option<&'a Token>,
    /// Signature push.
    pub signature: Option<&'a Token>,
}

impl<'a> AipFields<'a> {
    /// Name the fields of a cell. Returns `None` for an empty cell.
    pub fn from_cell(cell: &'a Cell) -> Option<Self> {
        Some(Self {
            marker: cell.get(0)?,
            algorithm: cell.get(1),
            address: cell.get(2),
            signature: cell.get(3),
        })
    }
}

/// Protocol cells found in one output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifiedCells<'a> {
    /// The BAP action cell (or the data cell when no action cell exists).
    pub primary: Option<BapFields<'a>>,
    /// The BAP `DATA` cell.
    pub data: Option<BapFields<'a>>,
    /// The AIP signature cell.
    pub signature: Option<AipFields<'a>>,
}

impl ClassifiedCells<'_> {
    /// Whether both cells needed for an attestation are present.
    pub fn is_candidate(&self) -> bool {
        self.primary.is_some() && self.signature.is_some()
    }
}

/// Locate the protocol cells of an output.
///
/// The first matching cell wins for each role. A data cell without an action
/// cell is itself promoted to the primary role.
pub fn classify<'a>(output: &'a Output, protocol: &ProtocolConfig) -> ClassifiedCells<'a> {
    let mut primary = None;
    let mut data = None;
    let mut signature = None;

    for cell in &output.tape {
        let Some(marker) = cell.get(0) else {
            continue;
        };

        if marker.text_eq(&protocol.bap_address) {
            let Some(fields) = BapFields::from_cell(cell) else {
                continue;
            };
            if fields.is_data() {
                data = data.or(Some(fields));
            } else {
                primary = primary.or(Some(fields));
            }
        } else if marker.text_eq(&protocol.aip_address) {
            signature = signature.or_else(|| AipFields::from_cell(cell));
        }
    }

    ClassifiedCells {
        primary: primary.or(data),
        data,
        signature,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(cells: Vec<Cell>) -> Output {
        Output::new(0, 0, cells)
    }

    fn bap(action: &str, hash: &str, value: &str) -> Cell {
        Cell::from_pushes([BAP_BITCOM_ADDRESS, action, hash, value])
    }

    fn aip() -> Cell {
        Cell::from_pushes([AIP_BITCOM_ADDRESS, "BITCOIN_ECDSA", "1addr", "sig"])
    }

    #[test]
    fn test_classify_attest_with_signature() {
        let out = output(vec![
            Cell::new(vec![Token::Op(0x00)]),
            Cell::new(vec![Token::Op(0x6a)]),
            bap("ATTEST", "hash", "0"),
            aip(),
        ]);

        let cells = classify(&out, &ProtocolConfig::default());
        assert!(cells.is_candidate());
        assert!(cells.primary.unwrap().action.unwrap().text_eq("ATTEST"));
        assert!(cells.data.is_none());
        assert!(cells
            .signature
            .unwrap()
            .address
            .unwrap()
            .text_eq("1addr"));
    }

    #[test]
    fn test_classify_data_cell_alongside_action() {
        let out = output(vec![bap("ID", "key", "addr"), bap("DATA", "key", "payload"), aip()]);

        let cells = classify(&out, &ProtocolConfig::default());
        assert!(cells.primary.unwrap().action.unwrap().text_eq("ID"));
        assert!(cells.data.unwrap().value.unwrap().text_eq("payload"));
    }

    #[test]
    fn test_classify_promotes_lone_data_cell() {
        let out = output(vec![bap("DATA", "key", "payload"), aip()]);

        let cells = classify(&out, &ProtocolConfig::default());
        assert_eq!(cells.primary, cells.data);
        assert!(cells.primary.unwrap().is_data());
        assert!(cells.is_candidate());
    }

    #[test]
    fn test_classify_without_protocol_cells() {
        let out = output(vec![Cell::from_pushes(["hello", "world"])]);

        let cells = classify(&out, &ProtocolConfig::default());
        assert_eq!(cells, ClassifiedCells::default());
        assert!(!cells.is_candidate());
    }

    #[test]
    fn test_classify_short_marker_only_cell() {
        // A marker without further fields still counts as an action cell.
        let out = output(vec![Cell::from_pushes([BAP_BITCOM_ADDRESS]), aip()]);

        let cells = classify(&out, &ProtocolConfig::default());
        let primary = cells.primary.unwrap();
        assert!(primary.action.is_none());
        assert!(cells.is_candidate());
    }

    #[test]
    fn test_classify_custom_markers() {
        let protocol = ProtocolConfig {
            bap_address: "1Custom".into(),
            aip_address: "1Sig".into(),
        };
        let out = output(vec![
            Cell::from_pushes(["1Custom", "ATTEST", "h", "0"]),
            Cell::from_pushes(["1Sig", "BITCOIN_ECDSA", "a", "s"]),
        ]);

        assert!(classify(&out, &protocol).is_candidate());
        assert!(!classify(&out, &ProtocolConfig::default()).is_candidate());
    }
}
