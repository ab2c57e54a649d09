//! Raw <-> DER conversions for P-256 points and ECDSA signatures, and the
//! ECDSA-P256/SHA-256 check built on them.
//!
//! Quotes carry fixed-width values (`x || y`, `r || s`); the verifier works on
//! SubjectPublicKeyInfo and DER `SEQUENCE { INTEGER r, INTEGER s }`.

use der::{asn1::UintRef, Decode, Encode};
use ring::signature;
use x509_cert::spki::SubjectPublicKeyInfoRef;

use crate::error::{Error, Result};
use crate::intel::{OID_EC_PUBLIC_KEY, OID_PRIME256V1, QUOTE_SIGNATURE_DATA_OFFSET};
use crate::utils::slice_at;

const COORDINATE_SIZE: usize = 32;
const RAW_SIZE: usize = 2 * COORDINATE_SIZE;

const TAG_INTEGER: u8 = 0x02;
const TAG_BIT_STRING: u8 = 0x03;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const SEC1_UNCOMPRESSED: u8 = 0x04;

// Short-form length only; every structure built here stays below 128 bytes.
fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
	debug_assert!(content.len() < 0x80);
	let mut out = Vec::with_capacity(content.len() + 2);
	out.push(tag);
	out.push(content.len() as u8);
	out.extend_from_slice(content);
	out
}

/// Wrap a raw `x || y` P-256 point in a SubjectPublicKeyInfo.
pub fn ec_point_to_der(raw_point: &[u8]) -> Result<Vec<u8>> {
	if raw_point.len() != RAW_SIZE {
		return Err(Error::KeyLengthIsInvalid);
	}
	let algorithm = tlv(
		TAG_SEQUENCE,
		&[tlv(TAG_OID, OID_EC_PUBLIC_KEY.as_bytes()), tlv(TAG_OID, OID_PRIME256V1.as_bytes())].concat(),
	);

	// no unused bits, then the SEC1 uncompressed point
	let mut bit_string = Vec::with_capacity(RAW_SIZE + 2);
	bit_string.push(0x00);
	bit_string.push(SEC1_UNCOMPRESSED);
	bit_string.extend_from_slice(raw_point);

	Ok(tlv(TAG_SEQUENCE, &[algorithm, tlv(TAG_BIT_STRING, &bit_string)].concat()))
}

/// Encode a raw `r || s` signature as a DER `SEQUENCE` of two `INTEGER`s.
///
/// Leading zero bytes are stripped and a single zero is re-added when the high
/// bit is set, so both integers stay non-negative.
pub fn ecdsa_raw_to_der(raw_signature: &[u8]) -> Result<Vec<u8>> {
	if raw_signature.len() != RAW_SIZE {
		return Err(Error::SignatureLengthIsInvalid);
	}
	let mut sequence = der::asn1::SequenceOf::<UintRef, 2>::new();
	sequence.add(UintRef::new(&raw_signature[..COORDINATE_SIZE])?)?;
	sequence.add(UintRef::new(&raw_signature[COORDINATE_SIZE..])?)?;
	Ok(sequence.to_der()?)
}

/// Inverse of [`ecdsa_raw_to_der`]: left-pad both integers back to 32 bytes.
pub fn ecdsa_der_to_raw(der_signature: &[u8]) -> Result<[u8; RAW_SIZE]> {
	let sequence = der::asn1::SequenceOf::<UintRef, 2>::from_der(der_signature)?;
	let mut raw = [0u8; RAW_SIZE];
	for (index, slot) in raw.chunks_exact_mut(COORDINATE_SIZE).enumerate() {
		let value = sequence.get(index).ok_or(Error::SignatureLengthIsInvalid)?.as_bytes();
		if value.len() > COORDINATE_SIZE {
			return Err(Error::SignatureLengthIsInvalid);
		}
		slot[COORDINATE_SIZE - value.len()..].copy_from_slice(value);
	}
	Ok(raw)
}

/// ECDSA-P256/SHA-256 over `message` with a SEC1-encoded public key and a DER signature.
pub fn verify_p256_sha256(public_key: &[u8], message: &[u8], der_signature: &[u8]) -> bool {
	signature::UnparsedPublicKey::new(&signature::ECDSA_P256_SHA256_ASN1, public_key)
		.verify(message, der_signature)
		.is_ok()
}

fn verify_signed_header_and_report(quote: &[u8], attestation_key: &[u8], raw_signature: &[u8]) -> Result<bool> {
	let signed_data = slice_at(quote, 0, QUOTE_SIGNATURE_DATA_OFFSET, "signed data")?;
	let spki_der = ec_point_to_der(attestation_key)?;
	let signature_der = ecdsa_raw_to_der(raw_signature)?;

	let spki = SubjectPublicKeyInfoRef::from_der(&spki_der)?;
	let point = spki.subject_public_key.as_bytes().ok_or(Error::KeyLengthIsInvalid)?;
	Ok(verify_p256_sha256(point, signed_data, &signature_der))
}

/// Check the quote signature over its first 632 bytes (header + TD report).
///
/// Never fails: malformed keys, signatures or buffers all yield `false`.
pub fn verify_quote_signature(quote: &[u8], attestation_key: &[u8], raw_signature: &[u8]) -> bool {
	match verify_signed_header_and_report(quote, attestation_key, raw_signature) {
		Ok(valid) => valid,
		Err(e) => {
			log::error!("Signature verification error: {e}");
			false
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ring::rand::{SecureRandom, SystemRandom};
	use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
	use rstest::rstest;

	fn key_pair(rng: &SystemRandom) -> EcdsaKeyPair {
		let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, rng).unwrap();
		EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), rng).unwrap()
	}

	fn signed_quote(rng: &SystemRandom, key: &EcdsaKeyPair) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
		let mut quote = vec![0u8; QUOTE_SIGNATURE_DATA_OFFSET];
		rng.fill(&mut quote).unwrap();
		let signature = key.sign(rng, &quote).unwrap().as_ref().to_vec();
		let raw_key = key.public_key().as_ref()[1..].to_vec();
		(quote, raw_key, signature)
	}

	#[test]
	fn spki_matches_reference_layout() {
		let spki = ec_point_to_der(&[0x5a; 64]).unwrap();
		assert_eq!(spki.len(), 91);
		assert_eq!(
			&spki[..27],
			&[
				0x30, 0x59, 0x30, 0x13, 0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x08, 0x2a,
				0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07, 0x03, 0x42, 0x00, 0x04
			]
		);
		assert_eq!(&spki[27..], &[0x5a; 64]);
		assert!(matches!(ec_point_to_der(&[0u8; 65]), Err(Error::KeyLengthIsInvalid)));
	}

	#[test]
	fn der_integers_are_minimal_and_non_negative() {
		let mut raw = [0u8; 64];
		raw[31] = 0x01;
		raw[32] = 0x80;
		let der = ecdsa_raw_to_der(&raw).unwrap();
		assert_eq!(&der[..5], &[0x30, 0x26, TAG_INTEGER, 0x01, 0x01]);
		assert_eq!(&der[5..8], &[TAG_INTEGER, 0x21, 0x00]);
		assert_eq!(der[8], 0x80);
	}

	#[rstest]
	#[case::leading_zero_r([0x00; 1], [0x7f; 1])]
	#[case::high_bit_r([0x80; 1], [0x01; 1])]
	#[case::high_bit_both([0xff; 1], [0x80; 1])]
	#[case::zero_prefixed_both([0x00; 1], [0x00; 1])]
	fn der_round_trip_preserves_raw_signature(#[case] r_head: [u8; 1], #[case] s_head: [u8; 1]) {
		let mut raw = [0u8; 64];
		SystemRandom::new().fill(&mut raw).unwrap();
		raw[0] = r_head[0];
		raw[32] = s_head[0];
		if r_head[0] == 0x00 {
			raw[1] = 0x00;
		}

		let der = ecdsa_raw_to_der(&raw).unwrap();
		assert_eq!(ecdsa_der_to_raw(&der).unwrap(), raw);
	}

	#[test]
	fn der_round_trip_of_all_zero_signature() {
		let der = ecdsa_raw_to_der(&[0u8; 64]).unwrap();
		assert_eq!(der, vec![0x30, 0x06, 0x02, 0x01, 0x00, 0x02, 0x01, 0x00]);
		assert_eq!(ecdsa_der_to_raw(&der).unwrap(), [0u8; 64]);
	}

	#[test]
	fn accepts_signature_over_header_and_report() {
		let rng = SystemRandom::new();
		let key = key_pair(&rng);
		let (mut quote, raw_key, signature) = signed_quote(&rng, &key);
		// trailing signature section is not covered
		quote.extend_from_slice(&[0xee; 200]);
		assert!(verify_quote_signature(&quote, &raw_key, &signature));
	}

	#[test]
	fn rejects_tampered_report() {
		let rng = SystemRandom::new();
		let key = key_pair(&rng);
		let (mut quote, raw_key, signature) = signed_quote(&rng, &key);
		quote[600] ^= 0x01;
		assert!(!verify_quote_signature(&quote, &raw_key, &signature));
	}

	#[test]
	fn rejects_signature_from_another_key() {
		let rng = SystemRandom::new();
		let (quote, _, signature) = signed_quote(&rng, &key_pair(&rng));
		let other_key = key_pair(&rng).public_key().as_ref()[1..].to_vec();
		assert!(!verify_quote_signature(&quote, &other_key, &signature));
	}

	#[test]
	fn garbage_fails_closed() {
		let rng = SystemRandom::new();
		let mut quote = vec![0u8; 700];
		let mut key = [0u8; 64];
		let mut signature = [0u8; 64];
		rng.fill(&mut quote).unwrap();
		rng.fill(&mut key).unwrap();
		rng.fill(&mut signature).unwrap();

		assert!(!verify_quote_signature(&quote, &key, &signature));
		assert!(!verify_quote_signature(&quote[..100], &key, &signature));
		assert!(!verify_quote_signature(&quote, &key[..10], &signature));
	}
}
