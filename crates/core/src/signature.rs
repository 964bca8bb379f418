//! Bitcoin Signed Message verification for AIP signatures.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bitcoin::consensus::encode::{serialize, VarInt};
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::secp256k1::{Secp256k1, VerifyOnly};
use bitcoin::sign_message::{MessageSignature, BITCOIN_SIGNED_MSG_PREFIX};
use bitcoin::Address;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Length of a compact recoverable signature (header byte + r + s).
pub const COMPACT_SIGNATURE_LEN: usize = 65;

/// Address-keyed message signature verification.
pub trait MessageVerifier: Send + Sync {
    /// Check that `signature` over `message` was produced by the key behind `address`.
    ///
    /// Malformed input is an error; a well-formed signature from another key is `Ok(false)`.
    fn verify(&self, message: &[u8], address: &str, signature: &[u8]) -> Result<bool>;
}

/// Verifier for the Bitcoin Signed Message scheme used by `BITCOIN_ECDSA` AIP cells.
#[derive(Debug, Clone)]
pub struct BitcoinMessageVerifier {
    secp: Secp256k1<VerifyOnly>,
}

impl BitcoinMessageVerifier {
    /// Create a verifier with its own verification context.
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::verification_only(),
        }
    }
}

impl Default for BitcoinMessageVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageVerifier for BitcoinMessageVerifier {
    fn verify(&self, message: &[u8], address: &str, signature: &[u8]) -> Result<bool> {
        let address = Address::from_str(address)
            .map_err(|e| CoreError::InvalidAddress(format!("{address}: {e}")))?
            .assume_checked();
        let signature = decode_signature(signature)?;

        signature
            .is_signed_by_address(&self.secp, &address, signed_message_hash(message))
            .map_err(|e| CoreError::Verification(e.to_string()))
    }
}

/// Hash signed by a Bitcoin Signed Message signature over arbitrary bytes.
///
/// `sha256d(varint(24) || "Bitcoin Signed Message:\n" || varint(len) || message)`
pub fn signed_message_hash(message: &[u8]) -> sha256d::Hash {
    let mut preimage = Vec::with_capacity(BITCOIN_SIGNED_MSG_PREFIX.len() + 9 + message.len());
    preimage.extend_from_slice(BITCOIN_SIGNED_MSG_PREFIX);
    preimage.extend_from_slice(&serialize(&VarInt(message.len() as u64)));
    preimage.extend_from_slice(message);
    sha256d::Hash::hash(&preimage)
}

/// Decode an AIP signature push.
///
/// The push normally holds the 65 raw signature bytes. Some signers push the
/// base64 text instead, which is accepted as a fallback.
pub fn decode_signature(bytes: &[u8]) -> Result<MessageSignature> {
    if bytes.len() == COMPACT_SIGNATURE_LEN {
        return MessageSignature::from_slice(bytes)
            .map_err(|e| CoreError::InvalidSignature(e.to_string()));
    }

    let decoded = BASE64
        .decode(bytes)
        .map_err(|_| CoreError::InvalidSignature(format!("unexpected length {}", bytes.len())))?;

    MessageSignature::from_slice(&decoded).map_err(|e| CoreError::InvalidSignature(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sign_message, signing_key, SigningKey};

    #[test]
    fn test_verify_valid_signature() {
        let key = signing_key();
        let message = b"\x6aBAP message\x7c";
        let signature = sign_message(&key, message);

        let verifier = BitcoinMessageVerifier::new();
        assert!(verifier
            .verify(message, &key.address.to_string(), &signature)
            .unwrap());
    }

    #[test]
    fn test_verify_base64_signature_push() {
        let key = signing_key();
        let message = b"hello";
        let signature = BASE64.encode(sign_message(&key, message));

        let verifier = BitcoinMessageVerifier::new();
        assert!(verifier
            .verify(message, &key.address.to_string(), signature.as_bytes())
            .unwrap());
    }

    #[test]
    fn test_verify_wrong_message() {
        let key = signing_key();
        let signature = sign_message(&key, b"original");

        let verifier = BitcoinMessageVerifier::new();
        assert!(!verifier
            .verify(b"tampered", &key.address.to_string(), &signature)
            .unwrap());
    }

    #[test]
    fn test_verify_wrong_address() {
        let key = signing_key();
        let other = SigningKey::from_seed(0x22);
        let signature = sign_message(&key, b"message");

        let verifier = BitcoinMessageVerifier::new();
        assert!(!verifier
            .verify(b"message", &other.address.to_string(), &signature)
            .unwrap());
    }

    #[test]
    fn test_verify_malformed_inputs() {
        let key = signing_key();
        let signature = sign_message(&key, b"message");
        let verifier = BitcoinMessageVerifier::new();

        assert!(matches!(
            verifier.verify(b"message", "not-an-address", &signature),
            Err(CoreError::InvalidAddress(_))
        ));
        assert!(matches!(
            verifier.verify(b"message", &key.address.to_string(), b"short"),
            Err(CoreError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_signed_message_hash_matches_text_variant() {
        let text = "Some text";
        assert_eq!(
            signed_message_hash(text.as_bytes()),
            bitcoin::sign_message::signed_msg_hash(text)
        );
    }
}
