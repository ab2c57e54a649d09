use serde::{Deserialize, Serialize};

/// TD measurement registers, hex encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TdxMeasurements {
	pub mrtd: String,
	pub rtmr0: String,
	pub rtmr1: String,
	pub rtmr2: String,
	pub rtmr3: String,
}

impl TdxMeasurements {
	/// True when at least one register is pinned.
	pub fn is_configured(&self) -> bool {
		self.fields().iter().any(|(_, value)| !value.is_empty())
	}

	/// Trimmed lowercase hex, the form parsed quotes are reported in.
	pub fn normalized(self) -> Self {
		let norm = |value: String| value.trim().to_ascii_lowercase();
		Self {
			mrtd: norm(self.mrtd),
			rtmr0: norm(self.rtmr0),
			rtmr1: norm(self.rtmr1),
			rtmr2: norm(self.rtmr2),
			rtmr3: norm(self.rtmr3),
		}
	}

	fn fields(&self) -> [(&'static str, &str); 5] {
		[
			("MRTD", self.mrtd.as_str()),
			("RTMR[0]", self.rtmr0.as_str()),
			("RTMR[1]", self.rtmr1.as_str()),
			("RTMR[2]", self.rtmr2.as_str()),
			("RTMR[3]", self.rtmr3.as_str()),
		]
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeasurementCheck {
	pub errors: Vec<String>,
	pub warnings: Vec<String>,
}

impl MeasurementCheck {
	pub fn valid(&self) -> bool {
		self.errors.is_empty()
	}
}

/// Compare parsed registers against a pinned baseline.
///
/// Empty baseline fields are skipped. An entirely empty baseline yields a single
/// warning and no errors.
pub fn verify_measurements(actual: &TdxMeasurements, baseline: &TdxMeasurements) -> MeasurementCheck {
	let mut check = MeasurementCheck::default();
	if !baseline.is_configured() {
		check.warnings.push("No expected measurements configured at build time".to_owned());
		return check;
	}

	for ((name, expected), (_, got)) in baseline.fields().iter().zip(actual.fields().iter()) {
		if !expected.is_empty() && expected != got {
			check.errors.push(format!("{name} mismatch: expected {expected}, got {got}"));
		}
	}
	check
}
