use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use tdx_quote_verifier::utils::{decode_base64, encode_base64};
use tdx_quote_verifier::{QuoteVerifier, VerifierConfig};

#[derive(Debug, Parser)]
#[command(name = "tdx-quote-verifier", version, about = "Verify Intel TDX attestation quotes")]
struct Cli {
	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Verify a base64 quote, or `@path` to a file holding base64 text or raw quote bytes
	Verify {
		quote: String,
		/// Also check the signature, PCK chain and TCB status
		#[arg(long)]
		dcap: bool,
	},
	/// Fetch a fresh quote from a recording oracle and verify it
	Oracle {
		url: String,
		/// Hex challenge to bind into report data; random when omitted
		#[arg(long)]
		challenge: Option<String>,
		#[arg(long)]
		dcap: bool,
	},
	/// Print the measurement baseline compiled into this binary
	Measurements,
	/// Print the build identity compiled into this binary
	BuildInfo,
}

fn load_quote(arg: &str) -> Result<String> {
	let Some(path) = arg.strip_prefix('@') else {
		return Ok(arg.trim().to_owned());
	};
	let bytes = std::fs::read(path).with_context(|| format!("failed to read quote from {path}"))?;
	match std::str::from_utf8(&bytes) {
		Ok(text) if decode_base64(text).is_ok() => Ok(text.trim().to_owned()),
		_ => Ok(encode_base64(&bytes)),
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	env_logger::init();
	let cli = Cli::parse();

	let config = VerifierConfig::from_env().context("invalid verifier configuration")?;
	let verifier = QuoteVerifier::new(&config).context("failed to initialise verifier")?;

	let output = match cli.command {
		Command::Verify { quote, dcap } => {
			let quote = load_quote(&quote)?;
			if dcap {
				serde_json::to_value(verifier.verify_quote_with_dcap(&quote).await)?
			} else {
				serde_json::to_value(verifier.verify_quote(&quote))?
			}
		},
		Command::Oracle { url, challenge, dcap } => {
			if dcap {
				serde_json::to_value(verifier.verify_recording_oracle_with_dcap(&url, challenge.as_deref()).await)?
			} else {
				serde_json::to_value(verifier.verify_recording_oracle(&url, challenge.as_deref()).await)?
			}
		},
		Command::Measurements => serde_json::to_value(verifier.expected_measurements())?,
		Command::BuildInfo => serde_json::to_value(verifier.build_info())?,
	};

	println!("{}", serde_json::to_string_pretty(&output)?);
	if output.get("valid").and_then(Value::as_bool) == Some(false) {
		std::process::exit(1);
	}
	Ok(())
}
