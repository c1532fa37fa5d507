use std::{fs, path::PathBuf};

use crate::{Error, Result, report::RunReport};

/// Writes `run-<run_id>.json` artifacts into a directory.
#[derive(Debug, Clone)]
pub struct AuditWriter {
	dir: PathBuf,
}
impl AuditWriter {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into() }
	}

	pub fn path_for(&self, report: &RunReport) -> PathBuf {
		self.dir.join(format!("run-{}.json", report.run_id))
	}

	/// Replaces the artifact atomically, so readers never observe a half-written file.
	pub fn write(&self, report: &RunReport) -> Result<PathBuf> {
		let path = self.path_for(report);
		let tmp = self.dir.join(format!(".run-{}.json.tmp", report.run_id));
		let audit_err =
			|message: String| Error::Audit { path: path.display().to_string(), message };

		fs::create_dir_all(&self.dir).map_err(|err| audit_err(err.to_string()))?;

		let payload =
			serde_json::to_vec_pretty(report).map_err(|err| audit_err(err.to_string()))?;

		fs::write(&tmp, payload).map_err(|err| audit_err(err.to_string()))?;
		fs::rename(&tmp, &path).map_err(|err| audit_err(err.to_string()))?;

		Ok(path)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rewrites_artifact_in_place() {
		let dir = tempfile::tempdir().expect("Failed to create audit dir.");
		let writer = AuditWriter::new(dir.path());
		let mut report = RunReport::new("products", "all", 0.15, 10);
		let first = writer.write(&report).expect("Failed to write audit.");

		report.finish();

		let second = writer.write(&report).expect("Failed to rewrite audit.");
		let raw = fs::read_to_string(&second).expect("Failed to read audit.");
		let json: serde_json::Value = serde_json::from_str(&raw).expect("Audit is not JSON.");

		assert_eq!(first, second);
		assert!(json["finished_at"].is_string());
		assert_eq!(fs::read_dir(dir.path()).expect("Failed to list audit dir.").count(), 1);
	}
}
