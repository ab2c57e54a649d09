use core::fmt;
use chrono::{
    DateTime, FixedOffset
};
use der::Decode;
use serde::{Deserialize, Serialize};
use x509_cert::Certificate;

use crate::error::Result;
use crate::intel::{FMSPC_SIZE, INTEL_SGX_EXTENSION_OID, OID_FMSPC};
use crate::utils::{find_subslice, pem_to_der};

const TAG_OID: u8 = 0x06;
const TAG_OCTET_STRING: u8 = 0x04;
const SGX_EXTENSION_SEARCH_WINDOW: usize = 200;
const SGX_EXTENSION_DUMP_LEN: usize = 50;

#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TcbStatus {
    /// No TCB information could be resolved
    #[default]
    Unknown,
    UpToDate,
    SWHardeningNeeded,
    ConfigurationNeeded,
    ConfigurationAndSWHardeningNeeded,
    OutOfDate,
    OutOfDateConfigurationNeeded,
    Revoked,
    Unrecognized { status: String }
}

impl From<String> for TcbStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "Unknown" => TcbStatus::Unknown,
            "UpToDate" => TcbStatus::UpToDate,
            "SWHardeningNeeded" => TcbStatus::SWHardeningNeeded,
            "ConfigurationNeeded" => TcbStatus::ConfigurationNeeded,
            "ConfigurationAndSWHardeningNeeded" => TcbStatus::ConfigurationAndSWHardeningNeeded,
            "OutOfDate" => TcbStatus::OutOfDate,
            "OutOfDateConfigurationNeeded" => TcbStatus::OutOfDateConfigurationNeeded,
            "Revoked" => TcbStatus::Revoked,
            _ => TcbStatus::Unrecognized { status: raw }
        }
    }
}

impl From<TcbStatus> for String {
    fn from(status: TcbStatus) -> Self {
        status.to_string()
    }
}

impl fmt::Display for TcbStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TcbStatus::Unknown => write!(f, "Unknown"),
            TcbStatus::UpToDate => write!(f, "UpToDate"),
            TcbStatus::SWHardeningNeeded => write!(f, "SWHardeningNeeded"),
            TcbStatus::ConfigurationNeeded => write!(f, "ConfigurationNeeded"),
            TcbStatus::ConfigurationAndSWHardeningNeeded => write!(f, "ConfigurationAndSWHardeningNeeded"),
            TcbStatus::OutOfDate => write!(f, "OutOfDate"),
            TcbStatus::OutOfDateConfigurationNeeded => write!(f, "OutOfDateConfigurationNeeded"),
            TcbStatus::Revoked => write!(f, "Revoked"),
            TcbStatus::Unrecognized { status } => write!(f, "{}", status),
        }
    }
}

/// Body of the PCS `tcb` endpoint.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcbInfoResponse {
    pub tcb_info: TcbInfo,
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcbInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub issue_date: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub next_update: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub fmspc: Option<String>,
    #[serde(default)]
    pub pce_id: Option<String>,
    #[serde(default)]
    pub tcb_type: Option<u32>,
    #[serde(default)]
    pub tcb_evaluation_data_number: Option<u32>,
    #[serde(default)]
    pub tcb_levels: Vec<TcbLevel>,
}

impl TcbInfo {
    pub fn from_json_str(json_str: &str) -> Result<Self> {
        let response: TcbInfoResponse = serde_json::from_str(json_str)?;
        Ok(response.tcb_info)
    }

    /// Levels are published newest first; the first one describes the platform.
    pub fn current_level(&self) -> Option<&TcbLevel> {
        self.tcb_levels.first()
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcbLevel {
    #[serde(default)]
    pub tcb: Option<Tcb>,
    #[serde(default)]
    pub tcb_date: Option<DateTime<FixedOffset>>,
    pub tcb_status: TcbStatus,
    #[serde(default, rename = "advisoryIDs")]
    pub advisory_ids: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Tcb {
    #[serde(default)]
    pub sgxtcbcomponents: Vec<TcbComponent>,
    #[serde(default)]
    pub pcesvn: Option<u16>,
    #[serde(default)]
    pub tdxtcbcomponents: Vec<TcbComponent>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TcbComponent {
    pub svn: u8,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, rename = "type")]
    pub component_type: Option<String>,
}

/// Pull the FMSPC out of a PCK certificate as 12 hex digits.
///
/// Searches the DER for the FMSPC OID and reads the OCTET STRING after it. Some
/// encoders emit a short (0x09) OID length, so that form is tried as well.
pub fn extract_fmspc_from_pck_cert(pck_cert_pem: &str) -> Option<String> {
    let cert_der = match pem_to_der(pck_cert_pem) {
        Ok(der) => der,
        Err(e) => {
            log::error!("Error extracting FMSPC: {e}");
            return None
        }
    };
    match Certificate::from_der(&cert_der) {
        Ok(cert) => {
            log::info!("PCK Certificate Subject: {}", cert.tbs_certificate.subject);
            log::info!("PCK Certificate Issuer: {}", cert.tbs_certificate.issuer);
        },
        Err(e) => {
            log::error!("Error extracting FMSPC: {e}");
            return None
        }
    }

    let oid = OID_FMSPC.as_bytes();
    let oid_len = oid.len() as u8;
    let encoded = [&[TAG_OID, oid_len][..], oid].concat();
    let short_encoded = [&[TAG_OID, oid_len - 1][..], oid].concat();

    let found = find_subslice(&cert_der, &encoded).or_else(|| {
        let index = find_subslice(&cert_der, &short_encoded);
        if index.is_some() {
            log::info!("Found FMSPC with alternate OID encoding");
        }
        index
    });
    let Some(oid_index) = found else {
        log::warn!("FMSPC OID not found in PCK certificate");
        log_sgx_extension_area(&cert_der);
        return None
    };

    let after_oid = oid_index + encoded.len();
    let Some(tag_index) = cert_der[after_oid..].iter().position(|b| *b == TAG_OCTET_STRING) else {
        log::warn!("OCTET STRING not found after FMSPC OID");
        return None
    };
    let length_index = after_oid + tag_index + 1;
    let Some(length) = cert_der.get(length_index) else {
        log::warn!("OCTET STRING not found after FMSPC OID");
        return None
    };
    if *length as usize != FMSPC_SIZE {
        log::warn!("Unexpected FMSPC length: {length}, expected {FMSPC_SIZE}");
    }

    let Some(fmspc) = cert_der.get(length_index + 1..length_index + 1 + FMSPC_SIZE) else {
        log::warn!("FMSPC value truncated");
        return None
    };
    let fmspc = hex::encode(fmspc);
    log::info!("Extracted FMSPC: {fmspc}");
    Some(fmspc)
}

fn log_sgx_extension_area(cert_der: &[u8]) {
    let oid = INTEL_SGX_EXTENSION_OID.as_bytes();
    let encoded = [&[TAG_OID, oid.len() as u8][..], oid].concat();
    if let Some(index) = find_subslice(cert_der, &encoded) {
        log::info!("Found SGX Extensions at offset {index}, looking for FMSPC nearby");
        let end = cert_der.len().min(index + SGX_EXTENSION_SEARCH_WINDOW);
        let area = &cert_der[index..end];
        log::debug!("Search area hex: {}", hex::encode(&area[..area.len().min(SGX_EXTENSION_DUMP_LEN)]));
    }
}
