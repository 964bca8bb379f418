use anyhow::Context;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bap_core::{BitcoinMessageVerifier, MessageVerifier};
use clap::Args;

#[derive(Debug, Args)]
pub struct SignCheckArgs {
    /// Message text that was signed
    #[arg(long, conflicts_with = "message_hex", required_unless_present = "message_hex")]
    message: Option<String>,
    /// Message bytes as hex (e.g. a reconstructed BAP message)
    #[arg(long)]
    message_hex: Option<String>,
    /// P2PKH address of the claimed signer
    #[arg(long)]
    address: String,
    /// Compact signature, base64
    #[arg(long)]
    signature: String,
}

pub fn run(args: SignCheckArgs) -> anyhow::Result<()> {
    let message = message_bytes(&args)?;
    let signature = BASE64
        .decode(args.signature.trim())
        .context("signature is not valid base64")?;

    let valid = check(&message, &args.address, &signature)?;
    println!("{}", serde_json::json!({ "address": args.address, "valid": valid }));

    anyhow::ensure!(valid, "signature does not match {}", args.address);
    Ok(())
}

fn message_bytes(args: &SignCheckArgs) -> anyhow::Result<Vec<u8>> {
    match (&args.message, &args.message_hex) {
        (Some(text), _) => Ok(text.as_bytes().to_vec()),
        (None, Some(hex_message)) => {
            hex::decode(hex_message.trim()).context("message is not valid hex")
        }
        (None, None) => anyhow::bail!("either --message or --message-hex is required"),
    }
}

fn check(message: &[u8], address: &str, signature: &[u8]) -> anyhow::Result<bool> {
    BitcoinMessageVerifier::new()
        .verify(message, address, signature)
        .context("signature check failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bap_core::test_utils::{sign_message, signing_key, SigningKey};

    #[test]
    fn check_accepts_matching_signature() {
        let key = signing_key();
        let signature = sign_message(&key, b"hello bap");

        assert!(check(b"hello bap", &key.address.to_string(), &signature).unwrap());
        assert!(!check(b"hello bop", &key.address.to_string(), &signature).unwrap());
    }

    #[test]
    fn check_rejects_other_signer() {
        let key = signing_key();
        let other = SigningKey::from_seed(0x22);
        let signature = sign_message(&other, b"hello bap");

        assert!(!check(b"hello bap", &key.address.to_string(), &signature).unwrap());
    }

    #[test]
    fn message_from_hex() {
        let args = SignCheckArgs {
            message: None,
            message_hex: Some("6a7c".to_string()),
            address: "1addr".to_string(),
            signature: String::new(),
        };
        assert_eq!(message_bytes(&args).unwrap(), vec![0x6a, 0x7c]);
    }
}
