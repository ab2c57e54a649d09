//! Verification of Intel TDX quotes: parsing, ECDSA signature and PCK chain
//! checks, TCB status lookup and measurement comparison.

pub mod chain;
pub mod codec;
pub mod config;
pub mod error;
pub mod intel;
pub mod measurements;
pub mod pcs;
pub mod quote;
pub mod tcb;
pub mod types;
pub mod utils;
pub mod verifier;

pub use chain::{verify_certificate_chain, verify_certificate_chain_at, ChainVerification};
pub use config::{BuildInfo, VerifierConfig};
pub use error::{Error, Result};
pub use measurements::TdxMeasurements;
pub use quote::{parse_quote, parse_quote_signature_data, ParsedQuote, QuoteSignatureData};
pub use tcb::TcbStatus;
pub use types::{DcapReport, DcapVerificationResult, OracleVerification, VerificationResult};
pub use verifier::QuoteVerifier;
