use std::collections::HashMap;
use std::env;
use std::time::Duration;

use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::intel::{INTEL_SGX_PCS_API_URL, INTEL_TDX_PCS_API_URL};
use crate::measurements::TdxMeasurements;

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Runtime settings for outbound calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
	pub sgx_pcs_url: String,
	pub tdx_pcs_url: String,
	pub http_timeout_secs: u64,
	pub connect_timeout_secs: u64,
}

impl Default for VerifierConfig {
	fn default() -> Self {
		Self {
			sgx_pcs_url: INTEL_SGX_PCS_API_URL.to_owned(),
			tdx_pcs_url: INTEL_TDX_PCS_API_URL.to_owned(),
			http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
			connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
		}
	}
}

impl VerifierConfig {
	pub fn from_env() -> Result<Self> {
		Self::from_map(&env::vars().collect())
	}

	pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
		let defaults = Self::default();
		Ok(Self {
			sgx_pcs_url: get(vars, "TDX_SGX_PCS_URL").unwrap_or(defaults.sgx_pcs_url),
			tdx_pcs_url: get(vars, "TDX_TDX_PCS_URL").unwrap_or(defaults.tdx_pcs_url),
			http_timeout_secs: seconds(vars, "TDX_HTTP_TIMEOUT_SECS")?.unwrap_or(defaults.http_timeout_secs),
			connect_timeout_secs: seconds(vars, "TDX_CONNECT_TIMEOUT_SECS")?
				.unwrap_or(defaults.connect_timeout_secs),
		})
	}

	/// HTTP client shared by PCS lookups and oracle calls. A timeout is reported
	/// like any other failed request.
	pub fn build_client(&self) -> Result<Client> {
		Ok(ClientBuilder::new()
			.timeout(Duration::from_secs(self.http_timeout_secs))
			.connect_timeout(Duration::from_secs(self.connect_timeout_secs))
			.pool_max_idle_per_host(4)
			.build()?)
	}
}

fn get(vars: &HashMap<String, String>, key: &str) -> Option<String> {
	vars.get(key).map(|v| v.trim().trim_end_matches('/').to_owned()).filter(|v| !v.is_empty())
}

fn seconds(vars: &HashMap<String, String>, key: &str) -> Result<Option<u64>> {
	get(vars, key)
		.map(|raw| match raw.parse::<u64>() {
			Ok(secs) if secs > 0 => Ok(secs),
			_ => Err(Error::Config(format!("{key} must be a positive number of seconds, got {raw:?}"))),
		})
		.transpose()
}

/// Identity of the build that produced this binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
	pub git_sha: String,
	pub image_digest: String,
	pub build_timestamp: String,
}

impl BuildInfo {
	pub fn from_build_env() -> Self {
		Self {
			git_sha: option_env!("TDX_GIT_SHA").unwrap_or_default().to_owned(),
			image_digest: option_env!("TDX_IMAGE_DIGEST").unwrap_or_default().to_owned(),
			build_timestamp: option_env!("TDX_BUILD_TIMESTAMP").unwrap_or_default().to_owned(),
		}
	}
}

/// Measurements pinned when the crate was compiled. Unset variables stay empty.
pub fn build_time_baseline() -> TdxMeasurements {
	TdxMeasurements {
		mrtd: option_env!("TDX_EXPECTED_MRTD").unwrap_or_default().to_owned(),
		rtmr0: option_env!("TDX_EXPECTED_RTMR0").unwrap_or_default().to_owned(),
		rtmr1: option_env!("TDX_EXPECTED_RTMR1").unwrap_or_default().to_owned(),
		rtmr2: option_env!("TDX_EXPECTED_RTMR2").unwrap_or_default().to_owned(),
		rtmr3: option_env!("TDX_EXPECTED_RTMR3").unwrap_or_default().to_owned(),
	}
	.normalized()
}
