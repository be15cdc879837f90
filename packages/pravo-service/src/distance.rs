use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ServiceError;

/// The metric used by the vector candidate generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceFunction {
	L2,
	Cosine,
}
impl DistanceFunction {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::L2 => "l2",
			Self::Cosine => "cosine",
		}
	}

	/// The pgvector operator. Both operators yield a distance, nearest first when ascending.
	pub fn operator(self) -> &'static str {
		match self {
			Self::L2 => "<->",
			Self::Cosine => "<=>",
		}
	}

	/// Direction of the user-facing score: L2 distance ascends, cosine similarity descends.
	pub fn score_order(self) -> ScoreOrder {
		match self {
			Self::L2 => ScoreOrder::Ascending,
			Self::Cosine => ScoreOrder::Descending,
		}
	}

	/// Distance as pgvector computes it. Cosine distance is `1 - cosine_similarity`.
	pub fn distance(self, a: &[f32], b: &[f32]) -> f64 {
		match self {
			Self::L2 => a
				.iter()
				.zip(b)
				.map(|(x, y)| {
					let diff = f64::from(*x) - f64::from(*y);

					diff * diff
				})
				.sum::<f64>()
				.sqrt(),
			Self::Cosine => 1.0 - cosine_similarity(a, b),
		}
	}

	/// The score in the metric's natural direction (see [`DistanceFunction::score_order`]).
	pub fn score(self, a: &[f32], b: &[f32]) -> f64 {
		match self {
			Self::L2 => self.distance(a, b),
			Self::Cosine => cosine_similarity(a, b),
		}
	}

	/// Label reported for fused rankings, e.g. `rrf(bm25+cosine)`.
	pub fn fused_label(self) -> String {
		format!("rrf(bm25+{})", self.as_str())
	}
}
impl fmt::Display for DistanceFunction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for DistanceFunction {
	type Err = ServiceError;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"l2" => Ok(Self::L2),
			"cosine" => Ok(Self::Cosine),
			_ => Err(ServiceError::InvalidRequest {
				message: format!("distance_function must be one of l2 or cosine, got {raw:?}."),
			}),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreOrder {
	Ascending,
	Descending,
}

/// Zero-norm vectors have no direction; like pgvector, the result is NaN.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
	let mut dot = 0.0_f64;
	let mut norm_a = 0.0_f64;
	let mut norm_b = 0.0_f64;

	for (x, y) in a.iter().zip(b) {
		let (x, y) = (f64::from(*x), f64::from(*y));

		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	dot / (norm_a.sqrt() * norm_b.sqrt())
}
