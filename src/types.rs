use serde::{Deserialize, Serialize};

use crate::measurements::TdxMeasurements;
use crate::quote::CertificationData;
use crate::tcb::TcbStatus;
use crate::utils::decode_base64;

/// Outcome of measurement verification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
	pub valid: bool,
	pub measurements: TdxMeasurements,
	/// Base64 of the 64-byte REPORTDATA field; empty when the quote did not parse.
	pub report_data: String,
	pub errors: Vec<String>,
	pub warnings: Vec<String>,
}

impl VerificationResult {
	pub fn failed(error: String) -> Self {
		Self { errors: vec![error], ..Default::default() }
	}

	pub fn report_data_hex(&self) -> String {
		decode_base64(&self.report_data).map(hex::encode).unwrap_or_default()
	}
}

/// Outcome of signature, certificate chain and TCB verification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DcapReport {
	pub signature_valid: bool,
	pub certificate_chain_valid: bool,
	pub tcb_status: TcbStatus,
	#[serde(rename = "advisoryIDs")]
	pub advisory_ids: Vec<String>,
	pub errors: Vec<String>,
	pub warnings: Vec<String>,
	/// Parsed certification data, kept for debugging
	#[serde(skip)]
	pub certification_data: Option<CertificationData>,
}

impl DcapReport {
	pub fn failed(error: String) -> Self {
		Self { errors: vec![error], ..Default::default() }
	}
}

/// Measurement result whose `valid` also requires a good signature and chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DcapVerificationResult {
	#[serde(flatten)]
	pub result: VerificationResult,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub dcap_result: Option<DcapReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleVerification<T> {
	#[serde(flatten)]
	pub result: T,
	pub oracle_url: String,
}

/// Common surface of the results a remote oracle check can wrap.
pub trait QuoteOutcome {
	fn failed(error: String) -> Self;
	fn report_data_hex(&self) -> String;
	/// Record `error` and force the result invalid.
	fn reject(&mut self, error: String);
}

impl QuoteOutcome for VerificationResult {
	fn failed(error: String) -> Self {
		VerificationResult::failed(error)
	}

	fn report_data_hex(&self) -> String {
		VerificationResult::report_data_hex(self)
	}

	fn reject(&mut self, error: String) {
		self.errors.push(error);
		self.valid = false;
	}
}

impl QuoteOutcome for DcapVerificationResult {
	fn failed(error: String) -> Self {
		Self { result: VerificationResult::failed(error), dcap_result: None }
	}

	fn report_data_hex(&self) -> String {
		self.result.report_data_hex()
	}

	fn reject(&mut self, error: String) {
		self.result.reject(error);
	}
}
