use core::future::Future;

use reqwest::Client;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

use crate::chain::verify_certificate_chain;
use crate::codec::verify_quote_signature;
use crate::config::{build_time_baseline, BuildInfo, VerifierConfig};
use crate::error::{Error, Result};
use crate::measurements::{verify_measurements, TdxMeasurements};
use crate::pcs::{ensure_success, PcsClient};
use crate::quote::{parse_quote, parse_quote_signature_data, QuoteSignatureData};
use crate::tcb::extract_fmspc_from_pck_cert;
use crate::types::{DcapReport, DcapVerificationResult, OracleVerification, QuoteOutcome, VerificationResult};
use crate::utils::{decode_base64, encode_base64};

pub const CHALLENGE_SIZE: usize = 32;
/// A challenge must fit in REPORTDATA.
pub const MAX_CHALLENGE_SIZE: usize = 64;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteRequest<'a> {
	report_data: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
	#[serde(default)]
	quote: Option<String>,
}

/// Verifies TD quotes against a pinned measurement baseline and Intel DCAP
/// collateral, and drives the challenge-response exchange with a remote oracle.
pub struct QuoteVerifier {
	client: Client,
	pcs: PcsClient,
	baseline: TdxMeasurements,
	build_info: BuildInfo,
	rng: SystemRandom,
}

impl QuoteVerifier {
	pub fn new(config: &VerifierConfig) -> Result<Self> {
		Ok(Self::with_client(config.build_client()?, config))
	}

	/// Uses `client` for PCS lookups and oracle calls. The baseline comes from the build.
	pub fn with_client(client: Client, config: &VerifierConfig) -> Self {
		let verifier = Self {
			pcs: PcsClient::new(client.clone(), config),
			client,
			baseline: build_time_baseline(),
			build_info: BuildInfo::from_build_env(),
			rng: SystemRandom::new(),
		};
		verifier.log_baseline();
		verifier
	}

	/// Replace the build-time baseline.
	pub fn with_baseline(mut self, baseline: TdxMeasurements) -> Self {
		log::debug!("Measurement baseline overridden, MRTD: {}", baseline.mrtd);
		self.baseline = baseline.normalized();
		self
	}

	fn log_baseline(&self) {
		if self.baseline.is_configured() {
			log::info!("TDX measurements loaded, MRTD: {}", self.baseline.mrtd);
			if !self.build_info.git_sha.is_empty() {
				log::info!("Git SHA: {}", self.build_info.git_sha);
			}
		} else {
			log::warn!("No TDX measurements configured at build time");
		}
	}

	pub fn expected_measurements(&self) -> &TdxMeasurements {
		&self.baseline
	}

	pub fn build_info(&self) -> &BuildInfo {
		&self.build_info
	}

	/// Parse a base64 quote and compare its registers with the baseline.
	pub fn verify_quote(&self, quote_base64: &str) -> VerificationResult {
		let parsed = match parse_quote(quote_base64) {
			Ok(parsed) => parsed,
			Err(e) => return VerificationResult::failed(format!("Failed to parse quote: {e}")),
		};

		let check = verify_measurements(&parsed.measurements, &self.baseline);
		VerificationResult {
			valid: check.valid(),
			measurements: parsed.measurements,
			report_data: encode_base64(&parsed.report_data),
			errors: check.errors,
			warnings: check.warnings,
		}
	}

	/// Signature, certificate chain and TCB checks for a base64 quote.
	pub async fn verify_quote_dcap(&self, quote_base64: &str) -> DcapReport {
		let (quote, signature_data) = match decode_quote_signature_data(quote_base64) {
			Ok(decoded) => decoded,
			Err(e) => return DcapReport::failed(format!("Failed to parse quote signature data: {e}")),
		};
		let mut report = DcapReport::default();
		let cert_data = &signature_data.certification_data;
		let cert_data_type = u16::from(cert_data.cert_data_type);

		let certificates = match cert_data.certificates() {
			Some(certificates) => {
				log::info!("Using embedded certificate chain (type 5)");
				Some(certificates.to_vec())
			},
			None => {
				log::info!("Certification data type {cert_data_type} - attempting to fetch certificates");
				let fetched = self.pcs.get_certificates(cert_data, &quote).await;
				match &fetched {
					Some(certificates) => log::info!("Resolved {} certificates", certificates.len()),
					None => report
						.warnings
						.push(format!("Certification data type {cert_data_type} - unable to fetch certificates")),
				}
				fetched
			},
		};

		if let Some(certificates) = certificates.as_deref().filter(|c| !c.is_empty()) {
			let chain = verify_certificate_chain(certificates);
			report.certificate_chain_valid = chain.valid;
			report.errors.extend(chain.errors);
		}

		report.signature_valid =
			verify_quote_signature(&quote, &signature_data.attestation_public_key, &signature_data.signature);
		if !report.signature_valid {
			report.errors.push("Quote signature verification failed".to_owned());
		}

		let leaf = certificates.as_ref().and_then(|c| c.first());
		if let Some(fmspc) = leaf.and_then(|pem| extract_fmspc_from_pck_cert(pem)) {
			// first level is the most recent
			if let Some(level) = self.pcs.fetch_tcb_info(&fmspc).await.and_then(|info| info.current_level().cloned()) {
				report.tcb_status = level.tcb_status;
				report.advisory_ids = level.advisory_ids;
			}
		}

		report.certification_data = Some(signature_data.certification_data);
		report
	}

	/// Measurement and DCAP verification combined; valid only when all of them pass.
	pub async fn verify_quote_with_dcap(&self, quote_base64: &str) -> DcapVerificationResult {
		let measurement = self.verify_quote(quote_base64);
		let dcap = self.verify_quote_dcap(quote_base64).await;
		let valid = measurement.valid && dcap.signature_valid && dcap.certificate_chain_valid;
		DcapVerificationResult { result: VerificationResult { valid, ..measurement }, dcap_result: Some(dcap) }
	}

	/// Ask the oracle at `oracle_url` for a quote bound to `challenge` (random when
	/// absent) and verify its measurements.
	pub async fn verify_recording_oracle(
		&self,
		oracle_url: &str,
		challenge: Option<&str>,
	) -> OracleVerification<VerificationResult> {
		self.verify_oracle(oracle_url, challenge, |quote| async move { self.verify_quote(&quote) }).await
	}

	/// As [`Self::verify_recording_oracle`], with DCAP verification of the returned quote.
	pub async fn verify_recording_oracle_with_dcap(
		&self,
		oracle_url: &str,
		challenge: Option<&str>,
	) -> OracleVerification<DcapVerificationResult> {
		self.verify_oracle(oracle_url, challenge, |quote| async move { self.verify_quote_with_dcap(&quote).await })
			.await
	}

	async fn verify_oracle<T, F, Fut>(&self, oracle_url: &str, challenge: Option<&str>, verify: F) -> OracleVerification<T>
	where
		T: QuoteOutcome,
		F: FnOnce(String) -> Fut,
		Fut: Future<Output = T>,
	{
		let fetched = async {
			let challenge = self.resolve_challenge(challenge)?;
			let quote = self.fetch_oracle_quote(oracle_url, &challenge).await?;
			Ok::<_, Error>((challenge, quote))
		}
		.await;

		let result = match fetched {
			Ok((challenge, quote)) => {
				let mut result = verify(quote).await;
				if !result.report_data_hex().starts_with(&challenge) {
					result.reject("Challenge mismatch in report_data".to_owned());
				}
				result
			},
			Err(e) => {
				log::error!("Oracle verification of {oracle_url} failed: {e}");
				T::failed(format!("Failed to verify oracle: {e}"))
			},
		};
		OracleVerification { result, oracle_url: oracle_url.to_owned() }
	}

	/// Lowercase hex challenge: the caller's, or 32 fresh random bytes.
	fn resolve_challenge(&self, supplied: Option<&str>) -> Result<String> {
		if let Some(challenge) = supplied.map(str::trim).filter(|c| !c.is_empty()) {
			let bytes = hex::decode(challenge).map_err(|_| Error::InvalidChallenge { max: MAX_CHALLENGE_SIZE })?;
			if bytes.len() > MAX_CHALLENGE_SIZE {
				return Err(Error::InvalidChallenge { max: MAX_CHALLENGE_SIZE });
			}
			return Ok(hex::encode(bytes));
		}

		let mut challenge = [0u8; CHALLENGE_SIZE];
		self.rng.fill(&mut challenge).map_err(|_| Error::Randomness)?;
		Ok(hex::encode(challenge))
	}

	async fn fetch_oracle_quote(&self, oracle_url: &str, challenge: &str) -> Result<String> {
		let url = format!("{}/attestation/quote", oracle_url.trim_end_matches('/'));
		log::info!("Requesting quote from {url}");

		let response = self.client.post(&url).json(&QuoteRequest { report_data: challenge }).send().await?;
		let body: QuoteResponse = ensure_success(response)?.json().await?;
		body.quote.filter(|quote| !quote.is_empty()).ok_or(Error::MissingQuote)
	}
}

fn decode_quote_signature_data(quote_base64: &str) -> Result<(Vec<u8>, QuoteSignatureData)> {
	let quote = decode_base64(quote_base64)?;
	let signature_data = parse_quote_signature_data(&quote)?;
	Ok((quote, signature_data))
}
