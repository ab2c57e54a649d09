use base64::{engine::general_purpose, Engine as _};
use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

pub const PEM_BEGIN_CERTIFICATE: &str = "-----BEGIN CERTIFICATE-----";
pub const PEM_END_CERTIFICATE: &str = "-----END CERTIFICATE-----";

/// Extract every `-----BEGIN CERTIFICATE----- ... -----END CERTIFICATE-----` block
/// from a concatenated PEM chain, in the order they appear.
///
/// Text outside the markers is ignored. An unterminated trailing block is dropped.
pub fn split_pem_chain(pem_chain: &str) -> Vec<String> {
	let mut certs = Vec::new();
	let mut rest = pem_chain;
	while let Some(start) = rest.find(PEM_BEGIN_CERTIFICATE) {
		let block = &rest[start..];
		let Some(end) = block.find(PEM_END_CERTIFICATE) else {
			break;
		};
		let block_len = end + PEM_END_CERTIFICATE.len();
		certs.push(block[..block_len].to_owned());
		rest = &block[block_len..];
	}
	certs
}

/// Strip the PEM armour and whitespace from a single certificate and decode its body.
pub fn pem_to_der(pem: &str) -> Result<Vec<u8>> {
	let body: String = pem
		.replace(PEM_BEGIN_CERTIFICATE, "")
		.replace(PEM_END_CERTIFICATE, "")
		.chars()
		.filter(|c| !c.is_whitespace())
		.collect();
	if body.is_empty() {
		return Err(Error::PemMissing);
	}
	Ok(general_purpose::STANDARD.decode(body)?)
}

/// Decode base64 text, tolerating embedded line breaks.
pub fn decode_base64(input: &str) -> Result<Vec<u8>> {
	let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
	Ok(general_purpose::STANDARD.decode(compact)?)
}

pub fn encode_base64(data: &[u8]) -> String {
	general_purpose::STANDARD.encode(data)
}

pub fn slice_at<'a>(data: &'a [u8], offset: usize, len: usize, field: &'static str) -> Result<&'a [u8]> {
	offset
		.checked_add(len)
		.and_then(|end| data.get(offset..end))
		.ok_or(Error::Truncated { field })
}

pub fn read_u16_le(data: &[u8], offset: usize, field: &'static str) -> Result<u16> {
	slice_at(data, offset, 2, field).map(LittleEndian::read_u16)
}

pub fn read_u32_le(data: &[u8], offset: usize, field: &'static str) -> Result<u32> {
	slice_at(data, offset, 4, field).map(LittleEndian::read_u32)
}

/// Find the first occurrence of `needle` in `haystack`.
pub fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
	if needle.is_empty() {
		return None;
	}
	haystack.windows(needle.len()).position(|window| window == needle)
}
