use crate::error::{Error, Result};
use crate::intel::*;
use crate::measurements::TdxMeasurements;
use crate::utils::{decode_base64, read_u16_le, read_u32_le, slice_at};

pub use crate::utils::split_pem_chain;

pub type Signature = [u8; ECDSA_SIGNATURE_SIZE];
pub type AttestationKey = [u8; ATTESTATION_KEY_SIZE];
pub type ReportData = [u8; REPORT_DATA_SIZE];

/// Measurement registers and report data pulled out of a TD quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuote {
	pub measurements: TdxMeasurements,
	pub report_data: ReportData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteSignatureData {
	pub signature_length: u32,
	/// ECDSA signature over header + TD report, r || s
	pub signature: Signature,
	/// P-256 attestation key, x || y
	pub attestation_public_key: AttestationKey,
	pub certification_data: CertificationData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificationData {
	pub cert_data_type: CertDataType,
	pub cert_data_size: u32,
	pub content: CertificationContent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificationContent {
	/// Type 5: the PEM text and the certificate blocks found in it, leaf first
	PckChain { pem_chain: String, certificates: Vec<String> },
	/// Types 6 and 7
	QeReport(Box<QeReportCertificationData>),
	/// Anything else, including empty payloads
	Opaque(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QeReportCertificationData {
	pub qe_report: Vec<u8>,
	pub qe_report_signature: Signature,
	pub qe_auth_data: Vec<u8>,
	pub nested_cert_data: CertificationData,
}

/// Identifiers sent to Intel PCS when the quote carries no PCK certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformCertInfo {
	pub cpusvn: String,
	pub pcesvn: String,
	pub pceid: String,
	pub qeid: String,
}

impl CertificationData {
	/// Embedded certificates, when a non-empty type 5 chain is present.
	pub fn certificates(&self) -> Option<&[String]> {
		match &self.content {
			CertificationContent::PckChain { certificates, .. } if !certificates.is_empty() => {
				Some(certificates.as_slice())
			},
			_ => None,
		}
	}

	pub fn qe_report_cert_data(&self) -> Option<&QeReportCertificationData> {
		match &self.content {
			CertificationContent::QeReport(data) => Some(data),
			_ => None,
		}
	}

	pub fn raw_cert_data(&self) -> Option<&[u8]> {
		match &self.content {
			CertificationContent::Opaque(raw) if !raw.is_empty() => Some(raw.as_slice()),
			_ => None,
		}
	}
}

pub fn parse_quote(quote_base64: &str) -> Result<ParsedQuote> {
	let quote = decode_base64(quote_base64)?;
	parse_quote_bytes(&quote)
}

pub fn parse_quote_bytes(quote: &[u8]) -> Result<ParsedQuote> {
	if quote.len() < QUOTE_SIGNATURE_DATA_OFFSET {
		return Err(Error::QuoteTooShort { len: quote.len() });
	}

	let mrtd_start = TDX_QUOTE_HEADER_SIZE + MRTD_OFFSET;
	let rtmr_start = TDX_QUOTE_HEADER_SIZE + RTMR_OFFSET;
	let report_data_start = TDX_QUOTE_HEADER_SIZE + REPORT_DATA_OFFSET;
	let rtmr = |index: usize| -> Result<String> {
		Ok(hex::encode(slice_at(quote, rtmr_start + index * RTMR_SIZE, RTMR_SIZE, "rtmr")?))
	};

	let mut report_data = [0u8; REPORT_DATA_SIZE];
	report_data.copy_from_slice(slice_at(quote, report_data_start, REPORT_DATA_SIZE, "report data")?);

	Ok(ParsedQuote {
		measurements: TdxMeasurements {
			mrtd: hex::encode(slice_at(quote, mrtd_start, MRTD_SIZE, "mrtd")?),
			rtmr0: rtmr(0)?,
			rtmr1: rtmr(1)?,
			rtmr2: rtmr(2)?,
			rtmr3: rtmr(3)?,
		},
		report_data,
	})
}

/// Parse the signature section that follows the header and TD report.
pub fn parse_quote_signature_data(quote: &[u8]) -> Result<QuoteSignatureData> {
	let mut offset = QUOTE_SIGNATURE_DATA_OFFSET;

	let signature_length = read_u32_le(quote, offset, "signature length")
		.map_err(|_| Error::SignatureLengthMissing)?;
	offset += SIGNATURE_LENGTH_FIELD_SIZE;

	let needed = signature_length as usize;
	if offset.saturating_add(needed) > quote.len() {
		return Err(Error::SignatureDataTooShort { needed });
	}
	if needed < MIN_SIGNATURE_DATA_LENGTH {
		return Err(Error::SignatureLengthTooSmall { length: needed, minimum: MIN_SIGNATURE_DATA_LENGTH });
	}

	let mut signature = [0u8; ECDSA_SIGNATURE_SIZE];
	signature.copy_from_slice(slice_at(quote, offset, ECDSA_SIGNATURE_SIZE, "signature")?);
	offset += ECDSA_SIGNATURE_SIZE;

	let mut attestation_public_key = [0u8; ATTESTATION_KEY_SIZE];
	attestation_public_key.copy_from_slice(slice_at(quote, offset, ATTESTATION_KEY_SIZE, "attestation key")?);
	offset += ATTESTATION_KEY_SIZE;

	let (certification_data, _) = parse_certification_data(quote, offset)?;

	Ok(QuoteSignatureData { signature_length, signature, attestation_public_key, certification_data })
}

/// Parse a `type (u16) | size (u32) | payload` block at `offset`.
///
/// Types 6 and 7 wrap a QE report whose tail is another certification data block;
/// that block is parsed by recursing into this function. Returns the parsed data and
/// the offset just past the payload. Nesting beyond `MAX_CERT_DATA_NESTING` is an error.
pub fn parse_certification_data(data: &[u8], offset: usize) -> Result<(CertificationData, usize)> {
	parse_certification_data_at_depth(data, offset, 0)
}

fn parse_certification_data_at_depth(data: &[u8], offset: usize, depth: usize) -> Result<(CertificationData, usize)> {
	if depth > MAX_CERT_DATA_NESTING {
		return Err(Error::NestingTooDeep { max: MAX_CERT_DATA_NESTING });
	}
	let raw_type = read_u16_le(data, offset, "certification data type")?;
	let cert_data_size = read_u32_le(data, offset + CERT_DATA_TYPE_FIELD_SIZE, "certification data size")?;
	let payload_start = offset + CERT_DATA_HEADER_SIZE;
	let payload = slice_at(data, payload_start, cert_data_size as usize, "certification data")?;

	let cert_data_type = CertDataType::from(raw_type);
	let content = match cert_data_type {
		CertDataType::PckCertChain => {
			let pem_chain = String::from_utf8_lossy(payload).into_owned();
			let certificates = split_pem_chain(&pem_chain);
			CertificationContent::PckChain { pem_chain, certificates }
		},
		CertDataType::PlatformManifest | CertDataType::QeReportCertData if !payload.is_empty() => {
			CertificationContent::QeReport(Box::new(parse_qe_report_cert_data(payload, depth)?))
		},
		_ => CertificationContent::Opaque(payload.to_vec()),
	};

	Ok((CertificationData { cert_data_type, cert_data_size, content }, payload_start + payload.len()))
}

fn parse_qe_report_cert_data(data: &[u8], depth: usize) -> Result<QeReportCertificationData> {
	let mut offset = 0;

	let qe_report = slice_at(data, offset, QE_REPORT_SIZE, "qe report")?.to_vec();
	offset += QE_REPORT_SIZE;

	let mut qe_report_signature = [0u8; ECDSA_SIGNATURE_SIZE];
	qe_report_signature.copy_from_slice(slice_at(data, offset, ECDSA_SIGNATURE_SIZE, "qe report signature")?);
	offset += ECDSA_SIGNATURE_SIZE;

	let auth_len = read_u16_le(data, offset, "qe auth data length")? as usize;
	offset += QE_AUTH_DATA_SIZE_FIELD;
	let qe_auth_data = slice_at(data, offset, auth_len, "qe auth data")?.to_vec();
	offset += auth_len;

	let (nested_cert_data, _) = parse_certification_data_at_depth(data, offset, depth + 1)?;

	Ok(QeReportCertificationData { qe_report, qe_report_signature, qe_auth_data, nested_cert_data })
}

/// PCE SVN from the quote header, as 4 hex digits.
pub fn extract_pce_svn(quote: &[u8]) -> Result<String> {
	let pce_svn = read_u16_le(quote, HEADER_PCE_SVN_OFFSET, "pce svn")?;
	Ok(format!("{pce_svn:04x}"))
}

/// Platform identifiers recovered from a QE report.
///
/// `qeid` is read from the first 16 bytes of the report's REPORTDATA field
/// (offset 320), not from a dedicated QE identifier. PCS lookups that depend on
/// it may therefore miss. `pcesvn` and `pceid` are placeholders to be filled
/// from the quote header and nested certification data.
pub fn extract_platform_info(qe_report: &[u8]) -> Result<PlatformCertInfo> {
	Ok(PlatformCertInfo {
		cpusvn: hex::encode(slice_at(qe_report, 0, QE_REPORT_CPUSVN_SIZE, "cpusvn")?),
		pcesvn: "0000".to_owned(),
		pceid: "0000".to_owned(),
		qeid: hex::encode(slice_at(qe_report, QE_REPORT_QEID_OFFSET, QE_REPORT_QEID_SIZE, "qeid")?),
	})
}
