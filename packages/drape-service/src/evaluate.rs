use std::{collections::BTreeMap, path::Path, time::Duration};

use serde::Serialize;

use drape_domain::classifier::Classifier;

use crate::{Embedder, Result, corpus};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Accuracy {
	pub correct: usize,
	pub total: usize,
	pub accuracy: f64,
}
impl Accuracy {
	fn record(&mut self, hit: bool) {
		self.total += 1;

		if hit {
			self.correct += 1;
		}

		self.accuracy = self.correct as f64 / self.total as f64;
	}
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EvaluationReport {
	pub overall: Accuracy,
	pub per_category: BTreeMap<String, Accuracy>,
	/// Images that could not be read or encoded. They do not count toward accuracy.
	pub failed: usize,
}
impl EvaluationReport {
	/// Scores one prediction. Labels compare case-insensitively.
	pub fn record(&mut self, expected: &str, predicted: &str) {
		let hit = expected.eq_ignore_ascii_case(predicted);

		self.overall.record(hit);
		self.per_category.entry(expected.to_string()).or_default().record(hit);
	}
}

/// Classifies every image of a labeled directory and compares against its folder name.
///
/// The comparison uses the final category, so below-threshold images count as `Others`.
pub async fn evaluate(
	dir: &Path,
	extensions: &[String],
	classifier: &Classifier,
	embedder: &dyn Embedder,
	timeout: Duration,
) -> Result<EvaluationReport> {
	let labeled = corpus::scan(dir, extensions)?;
	let mut report = EvaluationReport::default();

	for set in labeled {
		for path in &set.images {
			let id = path.display().to_string();
			let result = match corpus::embed_file(embedder, path, timeout).await {
				Ok(vec) => classifier.classify(&id, &vec).map_err(crate::Error::from),
				Err(err) => Err(err),
			};

			match result {
				Ok(result) => {
					tracing::debug!(
						path = %id,
						expected = %set.category,
						predicted = %result.top_category,
						confidence = result.top_confidence,
						"Evaluated image."
					);

					report.record(&set.category, &result.top_category);
				},
				Err(err) => {
					tracing::warn!(path = %id, error = %err, "Failed to evaluate image.");

					report.failed += 1;
				},
			}
		}
	}

	tracing::info!(
		correct = report.overall.correct,
		total = report.overall.total,
		failed = report.failed,
		accuracy = report.overall.accuracy,
		"Evaluation finished."
	);

	Ok(report)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn accuracy_is_tracked_overall_and_per_category() {
		let mut report = EvaluationReport::default();

		report.record("Saree", "Saree");
		report.record("Saree", "Lehenga");
		report.record("lehenga", "Lehenga");

		assert_eq!(report.overall.correct, 2);
		assert_eq!(report.overall.total, 3);
		assert!((report.overall.accuracy - 2.0 / 3.0).abs() < 1e-9);
		assert_eq!(report.per_category["Saree"].accuracy, 0.5);
		assert_eq!(report.per_category["lehenga"].accuracy, 1.0);
	}
}
