//! Intel Provisioning Certification Service lookups.
//!
//! Every failure here (transport error, timeout, non-2xx, malformed body) is
//! logged and surfaces as `None`; nothing is retried.

use percent_encoding::percent_decode;
use reqwest::{Client, Response};

use crate::config::VerifierConfig;
use crate::error::{Error, Result};
use crate::intel::PCK_ISSUER_CHAIN_HEADER;
use crate::quote::{extract_pce_svn, extract_platform_info, CertificationData, PlatformCertInfo};
use crate::tcb::TcbInfo;
use crate::utils::split_pem_chain;

const PCE_ID_SIZE: usize = 2;

/// PCK certificate and the chain that issued it, leaf first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PckCertResponse {
	pub pck_cert: String,
	pub cert_chain: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PcsClient {
	client: Client,
	sgx_pcs_url: String,
	tdx_pcs_url: String,
}

pub(crate) fn ensure_success(response: Response) -> Result<Response> {
	let status = response.status();
	if !status.is_success() {
		return Err(Error::HttpStatus {
			status: status.as_u16(),
			reason: status.canonical_reason().unwrap_or_default().to_owned(),
		});
	}
	Ok(response)
}

impl PcsClient {
	pub fn new(client: Client, config: &VerifierConfig) -> Self {
		Self { client, sgx_pcs_url: config.sgx_pcs_url.clone(), tdx_pcs_url: config.tdx_pcs_url.clone() }
	}

	/// Return a usable certificate chain for `cert_data`.
	///
	/// Embedded chains win: first a type 5 block, then a type 5 block nested in
	/// QE report certification data. Otherwise the platform identifiers in the QE
	/// report are used to fetch the PCK certificate from PCS.
	pub async fn get_certificates(&self, cert_data: &CertificationData, quote: &[u8]) -> Option<Vec<String>> {
		if let Some(certificates) = cert_data.certificates() {
			log::info!("Using {} embedded certificates", certificates.len());
			return Some(certificates.to_vec());
		}

		let qe_cert_data = cert_data.qe_report_cert_data()?;
		let nested = &qe_cert_data.nested_cert_data;
		if let Some(certificates) = nested.certificates() {
			log::info!("Using {} certificates nested in QE report certification data", certificates.len());
			return Some(certificates.to_vec());
		}

		let mut platform_info = match extract_platform_info(&qe_cert_data.qe_report) {
			Ok(info) => info,
			Err(e) => {
				log::warn!("Unable to extract platform info from QE report: {e}");
				return None;
			},
		};
		match extract_pce_svn(quote) {
			Ok(pce_svn) => platform_info.pcesvn = pce_svn,
			Err(e) => log::warn!("Unable to read PCE SVN from quote header: {e}"),
		}
		if let Some(raw) = nested.raw_cert_data().filter(|raw| raw.len() >= PCE_ID_SIZE) {
			platform_info.pceid = hex::encode(&raw[..PCE_ID_SIZE]);
		}

		log::info!("Fetching PCK cert from Intel PCS with platform info: {platform_info:?}");
		self.fetch_pck_cert(&platform_info).await.map(|response| response.cert_chain)
	}

	pub async fn fetch_pck_cert(&self, platform_info: &PlatformCertInfo) -> Option<PckCertResponse> {
		match self.try_fetch_pck_cert(platform_info).await {
			Ok(response) => Some(response),
			Err(e) => {
				log::warn!("Failed to fetch PCK cert from Intel PCS: {e}");
				None
			},
		}
	}

	async fn try_fetch_pck_cert(&self, platform_info: &PlatformCertInfo) -> Result<PckCertResponse> {
		let url = format!("{}/pckcert", self.sgx_pcs_url);
		log::info!("Fetching PCK cert from Intel PCS: {url}");

		let response = self
			.client
			.get(&url)
			.query(&[
				("cpusvn", platform_info.cpusvn.as_str()),
				("pcesvn", platform_info.pcesvn.as_str()),
				("pceid", platform_info.pceid.as_str()),
				("qeid", platform_info.qeid.as_str()),
			])
			.send()
			.await?;
		let response = ensure_success(response)?;

		// header is URL-encoded PEM
		let issuer_chain = response
			.headers()
			.get(PCK_ISSUER_CHAIN_HEADER)
			.map(|value| percent_decode(value.as_bytes()).decode_utf8_lossy().into_owned());
		let pck_cert = response.text().await?;

		let mut cert_chain = vec![pck_cert.clone()];
		if let Some(issuer_chain) = issuer_chain {
			cert_chain.extend(split_pem_chain(&issuer_chain));
		}
		Ok(PckCertResponse { pck_cert, cert_chain })
	}

	/// TDX TCB info for `fmspc` (12 hex digits).
	pub async fn fetch_tcb_info(&self, fmspc: &str) -> Option<TcbInfo> {
		match self.try_fetch_tcb_info(fmspc).await {
			Ok(tcb_info) => Some(tcb_info),
			Err(Error::HttpStatus { status, reason }) => {
				log::warn!("Failed to fetch TDX TCB info: HTTP {status} {reason}");
				None
			},
			Err(e) => {
				log::error!("Error fetching TCB info: {e}");
				None
			},
		}
	}

	async fn try_fetch_tcb_info(&self, fmspc: &str) -> Result<TcbInfo> {
		let url = format!("{}/tcb", self.tdx_pcs_url);
		log::info!("Fetching TDX TCB info from: {url}?fmspc={fmspc}");

		let response = self.client.get(&url).query(&[("fmspc", fmspc)]).send().await?;
		let body = ensure_success(response)?.text().await?;
		TcbInfo::from_json_str(&body)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::intel::{CertDataType, QE_REPORT_QEID_OFFSET, QE_REPORT_SIZE};
	use crate::quote::{CertificationContent, QeReportCertificationData};
	use crate::tcb::TcbStatus;
	use mockito::{Matcher, Server, ServerGuard};
	use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
	use std::time::Duration;

	const LEAF: &str = "-----BEGIN CERTIFICATE-----\nTEVBRg==\n-----END CERTIFICATE-----";
	const INTERMEDIATE: &str = "-----BEGIN CERTIFICATE-----\nSU5URVI=\n-----END CERTIFICATE-----";
	const ROOT: &str = "-----BEGIN CERTIFICATE-----\nUk9PVA==\n-----END CERTIFICATE-----";

	fn client_for(server: &ServerGuard) -> PcsClient {
		let config = VerifierConfig {
			sgx_pcs_url: format!("{}/sgx", server.url()),
			tdx_pcs_url: format!("{}/tdx", server.url()),
			http_timeout_secs: 5,
			connect_timeout_secs: 5,
		};
		PcsClient::new(config.build_client().unwrap(), &config)
	}

	fn qe_cert_data(nested: CertificationData) -> CertificationData {
		let mut qe_report = vec![0u8; QE_REPORT_SIZE];
		qe_report[..16].fill(0x01);
		qe_report[QE_REPORT_QEID_OFFSET..QE_REPORT_QEID_OFFSET + 16].fill(0xab);
		CertificationData {
			cert_data_type: CertDataType::QeReportCertData,
			cert_data_size: 0,
			content: CertificationContent::QeReport(Box::new(QeReportCertificationData {
				qe_report,
				qe_report_signature: [0u8; 64],
				qe_auth_data: Vec::new(),
				nested_cert_data: nested,
			})),
		}
	}

	fn pck_chain_data(certificates: &[&str]) -> CertificationData {
		let pem_chain = certificates.join("\n");
		CertificationData {
			cert_data_type: CertDataType::PckCertChain,
			cert_data_size: pem_chain.len() as u32,
			content: CertificationContent::PckChain {
				certificates: certificates.iter().map(|c| c.to_string()).collect(),
				pem_chain,
			},
		}
	}

	fn quote_with_pce_svn(pce_svn: u16) -> Vec<u8> {
		let mut quote = vec![0u8; 640];
		quote[12..14].copy_from_slice(&pce_svn.to_le_bytes());
		quote
	}

	#[tokio::test]
	async fn embedded_chain_is_returned_without_network() {
		let server = Server::new_async().await;
		let pcs = client_for(&server);

		let direct = pck_chain_data(&[LEAF, ROOT]);
		assert_eq!(pcs.get_certificates(&direct, &[]).await.unwrap(), vec![LEAF, ROOT]);

		let nested = qe_cert_data(pck_chain_data(&[LEAF]));
		assert_eq!(pcs.get_certificates(&nested, &[]).await.unwrap(), vec![LEAF]);
	}

	#[tokio::test]
	async fn fetches_pck_cert_with_platform_identifiers() {
		let mut server = Server::new_async().await;
		let issuer_chain = format!("{INTERMEDIATE}\n{ROOT}\n");
		let mock = server
			.mock("GET", "/sgx/pckcert")
			.match_query(Matcher::AllOf(vec![
				Matcher::UrlEncoded("cpusvn".into(), "01".repeat(16)),
				Matcher::UrlEncoded("pcesvn".into(), "000d".into()),
				Matcher::UrlEncoded("pceid".into(), "beef".into()),
				Matcher::UrlEncoded("qeid".into(), "ab".repeat(16)),
			]))
			.with_status(200)
			.with_header(PCK_ISSUER_CHAIN_HEADER, &utf8_percent_encode(&issuer_chain, NON_ALPHANUMERIC).to_string())
			.with_body(LEAF)
			.create_async()
			.await;

		let cert_data = qe_cert_data(CertificationData {
			cert_data_type: CertDataType::Unknown(3),
			cert_data_size: 4,
			content: CertificationContent::Opaque(vec![0xbe, 0xef, 0x00, 0x01]),
		});
		let chain = client_for(&server).get_certificates(&cert_data, &quote_with_pce_svn(0x0d)).await.unwrap();

		mock.assert_async().await;
		assert_eq!(chain, vec![LEAF, INTERMEDIATE, ROOT]);
	}

	#[tokio::test]
	async fn pck_cert_without_issuer_header_is_a_single_entry_chain() {
		let mut server = Server::new_async().await;
		let _mock = server
			.mock("GET", "/sgx/pckcert")
			.match_query(Matcher::Any)
			.with_status(200)
			.with_body(LEAF)
			.create_async()
			.await;

		let info = PlatformCertInfo {
			cpusvn: "00".repeat(16),
			pcesvn: "0000".into(),
			pceid: "0000".into(),
			qeid: "00".repeat(16),
		};
		let response = client_for(&server).fetch_pck_cert(&info).await.unwrap();
		assert_eq!(response.pck_cert, LEAF);
		assert_eq!(response.cert_chain, vec![LEAF]);
	}

	#[tokio::test]
	async fn pcs_errors_degrade_to_none() {
		let mut server = Server::new_async().await;
		let _pck = server
			.mock("GET", "/sgx/pckcert")
			.match_query(Matcher::Any)
			.with_status(404)
			.create_async()
			.await;
		let _tcb = server
			.mock("GET", "/tdx/tcb")
			.match_query(Matcher::Any)
			.with_status(200)
			.with_body("{not json")
			.create_async()
			.await;

		let pcs = client_for(&server);
		let cert_data = qe_cert_data(CertificationData {
			cert_data_type: CertDataType::Unknown(3),
			cert_data_size: 0,
			content: CertificationContent::Opaque(Vec::new()),
		});
		assert!(pcs.get_certificates(&cert_data, &quote_with_pce_svn(1)).await.is_none());
		assert!(pcs.fetch_tcb_info("00906ed50000").await.is_none());
	}

	#[tokio::test]
	async fn unreachable_pcs_degrades_to_none() {
		let config = VerifierConfig {
			sgx_pcs_url: "http://127.0.0.1:9".into(),
			tdx_pcs_url: "http://127.0.0.1:9".into(),
			http_timeout_secs: 2,
			connect_timeout_secs: 1,
		};
		let pcs = PcsClient::new(config.build_client().unwrap(), &config);
		assert!(pcs.fetch_tcb_info("00906ed50000").await.is_none());
	}

	/// Accepts connections and never answers them.
	async fn silent_server() -> String {
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			let mut held = Vec::new();
			while let Ok((socket, _)) = listener.accept().await {
				held.push(socket);
			}
		});
		format!("http://{addr}")
	}

	#[tokio::test]
	async fn stalled_pcs_times_out_to_none() {
		let url = silent_server().await;
		let config = VerifierConfig {
			sgx_pcs_url: format!("{url}/sgx"),
			tdx_pcs_url: format!("{url}/tdx"),
			http_timeout_secs: 1,
			connect_timeout_secs: 1,
		};
		let pcs = PcsClient::new(config.build_client().unwrap(), &config);
		let info = PlatformCertInfo {
			cpusvn: "00".repeat(16),
			pcesvn: "0000".into(),
			pceid: "0000".into(),
			qeid: "00".repeat(16),
		};

		let started = std::time::Instant::now();
		let tcb_info = tokio::time::timeout(Duration::from_secs(10), pcs.fetch_tcb_info("00906ed50000")).await;
		assert!(tcb_info.unwrap().is_none());
		let pck = tokio::time::timeout(Duration::from_secs(10), pcs.fetch_pck_cert(&info)).await;
		assert!(pck.unwrap().is_none());
		assert!(started.elapsed() < Duration::from_secs(8));
	}

	#[tokio::test]
	async fn opaque_certification_data_has_nothing_to_resolve() {
		let server = Server::new_async().await;
		let cert_data = CertificationData {
			cert_data_type: CertDataType::PpidEncryptedRsa3072,
			cert_data_size: 2,
			content: CertificationContent::Opaque(vec![1, 2]),
		};
		assert!(client_for(&server).get_certificates(&cert_data, &[]).await.is_none());
	}

	#[tokio::test]
	async fn fetches_tcb_info_by_fmspc() {
		let mut server = Server::new_async().await;
		let mock = server
			.mock("GET", "/tdx/tcb")
			.match_query(Matcher::UrlEncoded("fmspc".into(), "00906ed50000".into()))
			.with_status(200)
			.with_header("content-type", "application/json")
			.with_body(
				serde_json::json!({
					"tcbInfo": {
						"tcbLevels": [
							{"tcbStatus": "OutOfDate", "advisoryIDs": ["INTEL-SA-00828"]},
							{"tcbStatus": "Revoked"}
						]
					}
				})
				.to_string(),
			)
			.create_async()
			.await;

		let tcb_info = client_for(&server).fetch_tcb_info("00906ed50000").await.unwrap();
		mock.assert_async().await;
		let level = tcb_info.current_level().unwrap();
		assert_eq!(level.tcb_status, TcbStatus::OutOfDate);
		assert_eq!(level.advisory_ids, vec!["INTEL-SA-00828"]);
	}
}
