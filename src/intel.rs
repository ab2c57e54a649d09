//! Intel trust material and the fixed TDX quote layout.

use const_oid::ObjectIdentifier;

/// Intel SGX Provisioning Certification Root CA (PCS API v3/v4).
///
/// Subject: CN=Intel SGX Root CA, O=Intel Corporation, L=Santa Clara, ST=CA, C=US.
/// Valid 2018-05-21 to 2049-12-31. The same anchor is used for SGX and TDX chains.
pub const INTEL_SGX_ROOT_CA_PEM: &str = "-----BEGIN CERTIFICATE-----
MIICjzCCAjSgAwIBAgIUImUM1lqdNInzg7SVUr9QGzknBqwwCgYIKoZIzj0EAwIw
aDEaMBgGA1UEAwwRSW50ZWwgU0dYIFJvb3QgQ0ExGjAYBgNVBAoMEUludGVsIENv
cnBvcmF0aW9uMRQwEgYDVQQHDAtTYW50YSBDbGFyYTELMAkGA1UECAwCQ0ExCzAJ
BgNVBAYTAlVTMB4XDTE4MDUyMTEwNDUxMFoXDTQ5MTIzMTIzNTk1OVowaDEaMBgG
A1UEAwwRSW50ZWwgU0dYIFJvb3QgQ0ExGjAYBgNVBAoMEUludGVsIENvcnBvcmF0
aW9uMRQwEgYDVQQHDAtTYW50YSBDbGFyYTELMAkGA1UECAwCQ0ExCzAJBgNVBAYT
AlVTMFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAEC6nEwMDIYZOj/iPWsCzaEKi7
1OiOSLRFhWGjbnBVJfVnkY4u3IjkDYYL0MxO4mqsyYjlBalTVYxFP2sJBK5zlKOB
uzCBuDAfBgNVHSMEGDAWgBQiZQzWWp00ifODtJVSv1AbOScGrDBSBgNVHR8ESzBJ
MEegRaBDhkFodHRwczovL2NlcnRpZmljYXRlcy50cnVzdGVkc2VydmljZXMuaW50
ZWwuY29tL0ludGVsU0dYUm9vdENBLmRlcjAdBgNVHQ4EFgQUImUM1lqdNInzg7SV
Ur9QGzknBqwwDgYDVR0PAQH/BAQDAgEGMBIGA1UdEwEB/wQIMAYBAf8CAQEwCgYI
KoZIzj0EAwIDSQAwRgIhAOW/5QkR+S9CiSDcNoowLuPRLsWGf/Yi7GSX94BgwTwg
AiEA4J0lrHoMs+Xo5o/sX6O9QWxHRAvZUGOdRQ7cvqRXaqI=
-----END CERTIFICATE-----";

pub const INTEL_SGX_PCS_API_URL: &str = "https://api.trustedservices.intel.com/sgx/certification/v4";
pub const INTEL_TDX_PCS_API_URL: &str = "https://api.trustedservices.intel.com/tdx/certification/v4";

/// Response header carrying the URL-encoded PCK issuer chain.
pub const PCK_ISSUER_CHAIN_HEADER: &str = "SGX-PCK-Certificate-Issuer-Chain";

pub const TDX_QUOTE_HEADER_SIZE: usize = 48;
pub const TDX_TD_REPORT_SIZE: usize = 584;
/// Header + TD report; also the extent of the signed message.
pub const QUOTE_SIGNATURE_DATA_OFFSET: usize = TDX_QUOTE_HEADER_SIZE + TDX_TD_REPORT_SIZE;

pub const HEADER_PCE_SVN_OFFSET: usize = 12;

// Offsets relative to the start of the TD report.
pub const MRTD_OFFSET: usize = 128;
pub const MRTD_SIZE: usize = 48;
pub const RTMR_OFFSET: usize = 368;
pub const RTMR_SIZE: usize = 48;
pub const REPORT_DATA_OFFSET: usize = 520;
pub const REPORT_DATA_SIZE: usize = 64;

pub const SIGNATURE_LENGTH_FIELD_SIZE: usize = 4;
pub const ECDSA_SIGNATURE_SIZE: usize = 64;
pub const ATTESTATION_KEY_SIZE: usize = 64;
pub const CERT_DATA_TYPE_FIELD_SIZE: usize = 2;
pub const CERT_DATA_SIZE_FIELD_SIZE: usize = 4;
pub const CERT_DATA_HEADER_SIZE: usize = CERT_DATA_TYPE_FIELD_SIZE + CERT_DATA_SIZE_FIELD_SIZE;
/// signature + attestation key + cert data type + cert data size
pub const MIN_SIGNATURE_DATA_LENGTH: usize = ECDSA_SIGNATURE_SIZE + ATTESTATION_KEY_SIZE + CERT_DATA_HEADER_SIZE;

pub const QE_REPORT_SIZE: usize = 384;
pub const QE_AUTH_DATA_SIZE_FIELD: usize = 2;
/// QE report data wraps a PCK chain; deeper nesting is rejected.
pub const MAX_CERT_DATA_NESTING: usize = 2;
pub const QE_REPORT_CPUSVN_SIZE: usize = 16;
// Inside the QE report's REPORTDATA field.
pub const QE_REPORT_QEID_OFFSET: usize = 320;
pub const QE_REPORT_QEID_SIZE: usize = 16;

pub const FMSPC_SIZE: usize = 6;

/// See "Intel SGX: PCK Certificate and Certificate Revocation List Profile Specification".
pub const INTEL_SGX_EXTENSION_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113741.1.13.1");
pub const OID_FMSPC: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113741.1.13.1.4");

pub const OID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
pub const OID_PRIME256V1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
pub const OID_ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");

/// Certification data type of the quote's signature section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertDataType {
	/// PPID encrypted with RSA-OAEP-3072
	PpidEncryptedRsa3072,
	/// PPID encrypted with RSA-OAEP-2048
	PpidEncryptedRsa2048,
	/// Concatenated PEM PCK certificate chain
	PckCertChain,
	/// Platform manifest obtained from BIOS during provisioning
	PlatformManifest,
	/// QE report certification data
	QeReportCertData,
	Unknown(u16),
}

impl From<u16> for CertDataType {
	fn from(raw: u16) -> Self {
		match raw {
			1 => CertDataType::PpidEncryptedRsa3072,
			2 => CertDataType::PpidEncryptedRsa2048,
			5 => CertDataType::PckCertChain,
			6 => CertDataType::PlatformManifest,
			7 => CertDataType::QeReportCertData,
			other => CertDataType::Unknown(other),
		}
	}
}

impl From<CertDataType> for u16 {
	fn from(t: CertDataType) -> Self {
		match t {
			CertDataType::PpidEncryptedRsa3072 => 1,
			CertDataType::PpidEncryptedRsa2048 => 2,
			CertDataType::PckCertChain => 5,
			CertDataType::PlatformManifest => 6,
			CertDataType::QeReportCertData => 7,
			CertDataType::Unknown(other) => other,
		}
	}
}
