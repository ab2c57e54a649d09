//! PEM certificate chain validation against the Intel SGX root.
//!
//! Checks pairwise signatures, validity windows and issuer/subject linkage, then
//! anchors the last certificate to [`INTEL_SGX_ROOT_CA_PEM`]. This is not PKIX path
//! validation: revocation, policy OIDs, key usage and basic constraints are not
//! evaluated.

use der::{Decode, Encode};
use x509_cert::Certificate;

use crate::codec::verify_p256_sha256;
use crate::error::{Error, Result};
use crate::intel::{INTEL_SGX_ROOT_CA_PEM, OID_ECDSA_WITH_SHA256};
use crate::utils::pem_to_der;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainVerification {
	pub valid: bool,
	pub errors: Vec<String>,
}

impl ChainVerification {
	fn from_errors(errors: Vec<String>) -> Self {
		Self { valid: errors.is_empty(), errors }
	}
}

struct ParsedCertificate {
	der: Vec<u8>,
	cert: Certificate,
}

fn parse_certificate(pem: &str) -> Result<ParsedCertificate> {
	let der = pem_to_der(pem)?;
	let cert = Certificate::from_der(&der).map_err(|e| Error::CertificateParse(e.to_string()))?;
	Ok(ParsedCertificate { der, cert })
}

/// True when `issuer`'s key produced `cert`'s ECDSA-P256/SHA-256 signature.
fn is_signed_by(cert: &Certificate, issuer: &Certificate) -> bool {
	if cert.signature_algorithm.oid != OID_ECDSA_WITH_SHA256 {
		log::warn!("Unsupported certificate signature algorithm {}", cert.signature_algorithm.oid);
		return false;
	}
	let Ok(tbs) = cert.tbs_certificate.to_der() else {
		return false;
	};
	let (Some(signature), Some(public_key)) = (
		cert.signature.as_bytes(),
		issuer.tbs_certificate.subject_public_key_info.subject_public_key.as_bytes(),
	) else {
		return false;
	};
	verify_p256_sha256(public_key, &tbs, signature)
}

fn is_within_validity(cert: &Certificate, now_unix_secs: u64) -> bool {
	let validity = &cert.tbs_certificate.validity;
	let not_before = validity.not_before.to_unix_duration().as_secs();
	let not_after = validity.not_after.to_unix_duration().as_secs();
	not_before <= now_unix_secs && now_unix_secs <= not_after
}

/// Validate a leaf-first chain at the current time.
pub fn verify_certificate_chain(pems: &[String]) -> ChainVerification {
	let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
	verify_certificate_chain_at(pems, now)
}

/// Validate a leaf-first chain at `now_unix_secs`.
///
/// Every failing check contributes its own error; nothing short-circuits except
/// a certificate that cannot be parsed at all.
pub fn verify_certificate_chain_at(pems: &[String], now_unix_secs: u64) -> ChainVerification {
	if pems.is_empty() {
		return ChainVerification::from_errors(vec!["No certificates in chain".to_owned()]);
	}

	let parsed = pems
		.iter()
		.map(|pem| parse_certificate(pem))
		.chain(core::iter::once(parse_certificate(INTEL_SGX_ROOT_CA_PEM)))
		.collect::<Result<Vec<_>>>();
	let mut certs = match parsed {
		Ok(certs) => certs,
		Err(e) => return ChainVerification::from_errors(vec![format!("Certificate parsing error: {e}")]),
	};
	let Some(intel_root) = certs.pop() else {
		return ChainVerification::from_errors(vec!["No certificates in chain".to_owned()]);
	};

	let mut errors = Vec::new();
	for (i, pair) in certs.windows(2).enumerate() {
		let (cert, issuer) = (&pair[0].cert, &pair[1].cert);

		if cert.tbs_certificate.issuer != issuer.tbs_certificate.subject {
			errors.push(format!(
				"Certificate {i} issuer does not match certificate {} subject (chain may be out of order)",
				i + 1
			));
		}
		if !is_signed_by(cert, issuer) {
			errors.push(format!("Certificate {i} signature verification failed"));
		}
		if !is_within_validity(cert, now_unix_secs) {
			errors.push(format!("Certificate {i} is not within validity period"));
		}
	}

	if let Some(last) = certs.last() {
		if last.der != intel_root.der && !is_signed_by(&last.cert, &intel_root.cert) {
			errors.push("Root certificate not verified against Intel Root CA".to_owned());
		}
	}

	ChainVerification::from_errors(errors)
}
