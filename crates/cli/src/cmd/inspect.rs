use anyhow::Context;
use bap_core::{
    classify, decompose, AipFields, AttestationParser, BapFields, BitcoinMessageVerifier,
    MessageVerifier, ProtocolConfig, Token,
};
use clap::Args;
use serde::Serialize;

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Raw transaction as hex, or @path to a file containing the hex
    #[arg(long)]
    tx: String,
    /// BAP marker address
    #[arg(long)]
    bap_address: Option<String>,
    /// AIP marker address
    #[arg(long)]
    aip_address: Option<String>,
    /// Print compact JSON
    #[arg(long)]
    compact: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectReport {
    pub txid: String,
    pub outputs: Vec<OutputReport>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputReport {
    pub index: u32,
    pub value: u64,
    pub cell_count: usize,
    pub bap: Option<Vec<Option<String>>>,
    pub data: Option<Vec<Option<String>>>,
    pub aip: Option<Vec<Option<String>>>,
    pub outcome: Outcome,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Accepted {
        attestation: bap_core::Attestation,
    },
    Rejected {
        reason: String,
    },
    Skipped,
}

pub fn run(args: InspectArgs) -> anyhow::Result<()> {
    let raw = read_tx(&args.tx)?;

    let defaults = ProtocolConfig::default();
    let protocol = ProtocolConfig {
        bap_address: args.bap_address.unwrap_or(defaults.bap_address),
        aip_address: args.aip_address.unwrap_or(defaults.aip_address),
    };
    let parser = AttestationParser::new(protocol, BitcoinMessageVerifier::new());

    let report = inspect(&raw, &parser)?;
    let json = if args.compact {
        serde_json::to_string(&report)?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    println!("{json}");

    Ok(())
}

pub fn inspect<V: MessageVerifier>(
    raw: &[u8],
    parser: &AttestationParser<V>,
) -> anyhow::Result<InspectReport> {
    let tx = decompose(raw).context("failed to decompose transaction")?;

    let outputs = tx
        .outputs
        .iter()
        .map(|output| {
            let cells = classify(output, parser.protocol());
            let outcome = if cells.is_candidate() {
                match parser.parse_cells(&cells) {
                    Ok(attestation) => Outcome::Accepted { attestation },
                    Err(rejection) => Outcome::Rejected {
                        reason: rejection.to_string(),
                    },
                }
            } else {
                Outcome::Skipped
            };

            OutputReport {
                index: output.index,
                value: output.value,
                cell_count: output.tape.len(),
                bap: cells.primary.as_ref().map(bap_texts),
                data: cells.data.as_ref().map(bap_texts),
                aip: cells.signature.as_ref().map(aip_texts),
                outcome,
            }
        })
        .collect();

    Ok(InspectReport {
        txid: tx.tx_id,
        outputs,
    })
}

fn read_tx(arg: &str) -> anyhow::Result<Vec<u8>> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read transaction file {path}"))?,
        None => arg.to_string(),
    };
    hex::decode(text.trim()).context("transaction is not valid hex")
}

fn text(token: Option<&Token>) -> Option<String> {
    token.and_then(Token::text).map(|s| s.into_owned())
}

fn bap_texts(fields: &BapFields<'_>) -> Vec<Option<String>> {
    vec![
        text(Some(fields.marker)),
        text(fields.action),
        text(fields.hash),
        text(fields.value),
    ]
}

fn aip_texts(fields: &AipFields<'_>) -> Vec<Option<String>> {
    // The signature is binary; show it the way wallets print it.
    vec![
        text(Some(fields.marker)),
        text(fields.algorithm),
        text(fields.address),
        fields.signature.and_then(Token::base64),
    ]
}
