#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("Invalid TDX quote: too short ({len} bytes)")]
	QuoteTooShort { len: usize },
	#[error("Quote too short for signature length")]
	SignatureLengthMissing,
	#[error("Quote too short for signature data (need {needed} bytes)")]
	SignatureDataTooShort { needed: usize },
	#[error("Signature data length {length} is below the minimum of {minimum} bytes")]
	SignatureLengthTooSmall { length: usize, minimum: usize },
	#[error("Certification data nested deeper than {max} levels")]
	NestingTooDeep { max: usize },
	#[error("Truncated field: {field}")]
	Truncated { field: &'static str },
	#[error("Invalid base64: {0}")]
	Base64(#[from] base64::DecodeError),
	#[error("KeyLengthIsInvalid")]
	KeyLengthIsInvalid,
	#[error("SignatureLengthIsInvalid")]
	SignatureLengthIsInvalid,
	#[error("DerEncodingError: {0}")]
	Der(#[from] der::Error),
	#[error("No PEM certificate block found")]
	PemMissing,
	#[error("{0}")]
	CertificateParse(String),
	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),
	#[error("JSON encoding/decoding error: {0}")]
	Json(#[from] serde_json::Error),
	#[error("HTTP {status}: {reason}")]
	HttpStatus { status: u16, reason: String },
	#[error("No quote in response")]
	MissingQuote,
	#[error("Challenge must be a hex string of at most {max} bytes")]
	InvalidChallenge { max: usize },
	#[error("Failed to generate random challenge")]
	Randomness,
	#[error("Invalid configuration: {0}")]
	Config(String),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
