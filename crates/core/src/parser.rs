//! BAP attestation parsing.
//!
//! Validates the structure of the classified cells, checks the AIP signature and
//! produces a normalized [`Attestation`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cells::{AipFields, BapFields, ClassifiedCells, ProtocolConfig};
use crate::message::verify_signature;
use crate::signature::MessageVerifier;
use crate::types::Token;

/// A validated, signed BAP action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attestation {
    /// Action tag (`ATTEST`, `ID`, `REVOKE`, `ALIAS`, `DATA`, ...).
    #[serde(rename = "type")]
    pub action: String,

    /// Attestation hash or identity key.
    pub hash: String,

    /// Sequence field.
    pub sequence: String,

    /// Address that signed the AIP cell.
    pub signature_address: String,

    /// Payload of a matching `DATA` cell.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// Why an output that looked like BAP data was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// A required cell or field is missing or empty.
    Structural(&'static str),

    /// The reconstructed message does not verify against the AIP signature.
    InvalidSignature,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Structural(reason) => write!(f, "invalid BAP structure: {reason}"),
            Rejection::InvalidSignature => write!(f, "invalid AIP signature"),
        }
    }
}

/// Parser bound to a set of protocol markers and a signature verifier.
#[derive(Debug, Clone)]
pub struct AttestationParser<V> {
    protocol: ProtocolConfig,
    verifier: V,
}

impl<V: MessageVerifier> AttestationParser<V> {
    /// Create a parser.
    pub fn new(protocol: ProtocolConfig, verifier: V) -> Self {
        Self { protocol, verifier }
    }

    /// Protocol markers in use.
    pub fn protocol(&self) -> &ProtocolConfig {
        &self.protocol
    }

    /// Parse an attestation, reporting why it was rejected.
    ///
    /// Structural checks run first; the signature is only verified once they pass.
    pub fn parse_detailed(
        &self,
        primary: Option<&BapFields<'_>>,
        signature: Option<&AipFields<'_>>,
        data: Option<&BapFields<'_>>,
    ) -> Result<Attestation, Rejection> {
        let primary = primary.ok_or(Rejection::Structural("missing BAP cell"))?;
        if !primary.marker.text_eq(&self.protocol.bap_address) {
            return Err(Rejection::Structural("BAP marker mismatch"));
        }

        let action = non_empty(primary.action).ok_or(Rejection::Structural("empty type"))?;
        let hash = non_empty(primary.hash).ok_or(Rejection::Structural("empty hash"))?;
        let sequence = non_empty(primary.value).ok_or(Rejection::Structural("empty sequence"))?;

        let signature = signature.ok_or(Rejection::Structural("missing AIP cell"))?;
        if !verify_signature(&self.verifier, primary, signature, data, &self.protocol) {
            return Err(Rejection::InvalidSignature);
        }

        let signature_address = signature
            .address
            .and_then(Token::text)
            .map(|s| s.into_owned())
            .ok_or(Rejection::Structural("missing AIP address"))?;

        let data = data
            .filter(|d| d.hash.and_then(Token::text).as_deref() == Some(hash.as_str()))
            .and_then(|d| d.value.and_then(Token::text))
            .map(|s| s.into_owned());

        Ok(Attestation {
            action,
            hash,
            sequence,
            signature_address,
            data,
        })
    }

    /// Parse an attestation; `None` for anything that is not a valid, signed BAP action.
    pub fn parse(
        &self,
        primary: Option<&BapFields<'_>>,
        signature: Option<&AipFields<'_>>,
        data: Option<&BapFields<'_>>,
    ) -> Option<Attestation> {
        self.parse_detailed(primary, signature, data).ok()
    }

    /// Parse the cells found by [`crate::classify`].
    pub fn parse_cells(&self, cells: &ClassifiedCells<'_>) -> Result<Attestation, Rejection> {
        self.parse_detailed(
            cells.primary.as_ref(),
            cells.signature.as_ref(),
            cells.data.as_ref(),
        )
    }
}

fn non_empty(token: Option<&Token>) -> Option<String> {
    token
        .and_then(Token::text)
        .filter(|s| !s.is_empty())
        .map(|s| s.into_owned())
}
