//! Reconstruction of the byte message covered by an AIP signature.
//!
//! The signed message is:
//!
//! ```text
//! OP_RETURN || bap[0] || bap[1] || bap[2] || bap[3] || '|'
//!           [|| BAP_ADDRESS || "DATA" || data[2] || data[3] || '|']   when a data cell is present
//! ```
//!
//! Verification is split in two stages: [`reconstruct_message`] is fallible and
//! reports which field was missing, [`verify_signature`] collapses every failure
//! into `false`.

use tracing::debug;

use crate::cells::{AipFields, BapFields, ProtocolConfig};
use crate::error::{CoreError, Result};
use crate::signature::MessageVerifier;
use crate::types::Token;
use crate::{DATA_TAG, OP_RETURN, PIPE};

/// A reconstructed message together with the claimed signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMessage {
    /// Exact bytes the signature must cover.
    pub message: Vec<u8>,
    /// Claimed signing address.
    pub address: String,
    /// Raw signature push.
    pub signature: Vec<u8>,
}

/// Build the message bytes from the BAP cells alone.
pub fn message_bytes(
    primary: &BapFields<'_>,
    data: Option<&BapFields<'_>>,
    protocol: &ProtocolConfig,
) -> Result<Vec<u8>> {
    let mut message = vec![OP_RETURN];
    message.extend_from_slice(primary.marker.bytes());
    message.extend_from_slice(required(primary.action, "bap type")?);
    message.extend_from_slice(required(primary.hash, "bap hash")?);
    message.extend_from_slice(required(primary.value, "bap sequence")?);
    message.push(PIPE);

    if let Some(data) = data {
        message.extend_from_slice(protocol.bap_address.as_bytes());
        message.extend_from_slice(DATA_TAG.as_bytes());
        message.extend_from_slice(required(data.hash, "data hash")?);
        message.extend_from_slice(required(data.value, "data payload")?);
        message.push(PIPE);
    }

    Ok(message)
}

/// Rebuild the signed message and extract the claimed address and signature.
pub fn reconstruct_message(
    primary: &BapFields<'_>,
    signature: &AipFields<'_>,
    data: Option<&BapFields<'_>>,
    protocol: &ProtocolConfig,
) -> Result<SignedMessage> {
    let message = message_bytes(primary, data, protocol)?;

    let address = signature
        .address
        .and_then(Token::text)
        .ok_or(CoreError::MissingField("aip address"))?
        .into_owned();
    let signature = required(signature.signature, "aip signature")?.to_vec();

    Ok(SignedMessage {
        message,
        address,
        signature,
    })
}

/// Check the AIP signature over the BAP cells.
///
/// Fail-closed: any missing field, malformed address or signature yields `false`.
pub fn verify_signature<V: MessageVerifier + ?Sized>(
    verifier: &V,
    primary: &BapFields<'_>,
    signature: &AipFields<'_>,
    data: Option<&BapFields<'_>>,
    protocol: &ProtocolConfig,
) -> bool {
    let signed = match reconstruct_message(primary, signature, data, protocol) {
        Ok(signed) => signed,
        Err(e) => {
            debug!("Cannot rebuild AIP message: {}", e);
            return false;
        }
    };

    match verifier.verify(&signed.message, &signed.address, &signed.signature) {
        Ok(valid) => valid,
        Err(e) => {
            debug!("AIP signature check failed for {}: {}", signed.address, e);
            false
        }
    }
}

fn required<'a>(token: Option<&'a Token>, field: &'static str) -> Result<&'a [u8]> {
    match token {
        Some(Token::Push(bytes)) => Ok(bytes),
        _ => Err(CoreError::MissingField(field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::classify;
    use crate::signature::BitcoinMessageVerifier;
    use crate::types::{Cell, Output};
    use crate::{AIP_BITCOM_ADDRESS, BAP_BITCOM_ADDRESS};

    fn output(cells: Vec<Cell>) -> Output {
        Output::new(0, 0, cells)
    }

    #[test]
    fn test_message_layout_without_data() {
        let out = output(vec![
            Cell::from_pushes([BAP_BITCOM_ADDRESS, "ATTEST", "abc", "0"]),
            Cell::from_pushes([AIP_BITCOM_ADDRESS, "BITCOIN_ECDSA", "1addr", "sig"]),
        ]);
        let protocol = ProtocolConfig::default();
        let cells = classify(&out, &protocol);

        let signed = reconstruct_message(
            &cells.primary.unwrap(),
            &cells.signature.unwrap(),
            None,
            &protocol,
        )
        .unwrap();

        let mut expected = vec![0x6a];
        expected.extend_from_slice(BAP_BITCOM_ADDRESS.as_bytes());
        expected.extend_from_slice(b"ATTESTabc0");
        expected.push(0x7c);
        assert_eq!(signed.message, expected);
        assert_eq!(signed.address, "1addr");
        assert_eq!(signed.signature, b"sig");
    }

    #[test]
    fn test_message_layout_with_data() {
        let out = output(vec![
            Cell::from_pushes([BAP_BITCOM_ADDRESS, "ID", "key", "1addr"]),
            Cell::from_pushes([BAP_BITCOM_ADDRESS, "DATA", "key", "payload"]),
            Cell::from_pushes([AIP_BITCOM_ADDRESS, "BITCOIN_ECDSA", "1addr", "sig"]),
        ]);
        let protocol = ProtocolConfig::default();
        let cells = classify(&out, &protocol);

        let message =
            message_bytes(&cells.primary.unwrap(), cells.data.as_ref(), &protocol).unwrap();

        let mut expected = vec![0x6a];
        expected.extend_from_slice(BAP_BITCOM_ADDRESS.as_bytes());
        expected.extend_from_slice(b"IDkey1addr|");
        expected.extend_from_slice(BAP_BITCOM_ADDRESS.as_bytes());
        expected.extend_from_slice(b"DATAkeypayload|");
        assert_eq!(message, expected);
    }

    #[test]
    fn test_message_is_deterministic() {
        let out = output(vec![
            Cell::from_pushes([BAP_BITCOM_ADDRESS, "ATTEST", "abc", "7"]),
            Cell::from_pushes([AIP_BITCOM_ADDRESS, "BITCOIN_ECDSA", "1addr", "sig"]),
        ]);
        let protocol = ProtocolConfig::default();
        let cells = classify(&out, &protocol);
        let primary = cells.primary.unwrap();
        let signature = cells.signature.unwrap();

        let first = reconstruct_message(&primary, &signature, None, &protocol).unwrap();
        let second = reconstruct_message(&primary, &signature, None, &protocol).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_fields_are_errors() {
        let out = output(vec![
            Cell::from_pushes([BAP_BITCOM_ADDRESS, "ATTEST", "abc"]),
            Cell::from_pushes([AIP_BITCOM_ADDRESS, "BITCOIN_ECDSA"]),
        ]);
        let protocol = ProtocolConfig::default();
        let cells = classify(&out, &protocol);

        let err = reconstruct_message(
            &cells.primary.unwrap(),
            &cells.signature.unwrap(),
            None,
            &protocol,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::MissingField("bap sequence")));
    }

    #[test]
    fn test_verify_fails_closed_on_garbage() {
        let out = output(vec![
            Cell::from_pushes([BAP_BITCOM_ADDRESS, "ATTEST", "abc", "0"]),
            Cell::from_pushes([AIP_BITCOM_ADDRESS, "BITCOIN_ECDSA", "1addr", "sig"]),
        ]);
        let protocol = ProtocolConfig::default();
        let cells = classify(&out, &protocol);

        assert!(!verify_signature(
            &BitcoinMessageVerifier::new(),
            &cells.primary.unwrap(),
            &cells.signature.unwrap(),
            None,
            &protocol,
        ));
    }
}
