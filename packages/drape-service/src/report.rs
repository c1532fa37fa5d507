use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use drape_domain::classifier::ClassificationResult;
use drape_storage::models::SnapshotRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
	Pending,
	Applied,
	Failed,
	Skipped,
}

/// Point-in-time copy of the target table taken before the first write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupSnapshot {
	pub source_table: String,
	pub snapshot_table: String,
	pub row_count: i64,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
}
impl From<SnapshotRecord> for BackupSnapshot {
	fn from(record: SnapshotRecord) -> Self {
		Self {
			source_table: record.source_table,
			snapshot_table: record.snapshot_table,
			row_count: record.row_count,
			created_at: record.created_at,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordOutcome {
	pub record_id: String,
	pub image_url: String,
	pub batch: usize,
	pub status: RecordStatus,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub classification: Option<ClassificationResult>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub broad_category: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	/// False when the row already held the generated values.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub changed: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}
impl RecordOutcome {
	pub fn pending(record_id: &str, image_url: &str, batch: usize) -> Self {
		Self {
			record_id: record_id.to_string(),
			image_url: image_url.to_string(),
			batch,
			status: RecordStatus::Pending,
			classification: None,
			broad_category: None,
			title: None,
			description: None,
			changed: None,
			error: None,
		}
	}

	pub(crate) fn fail(&mut self, error: String) {
		self.status = RecordStatus::Failed;
		self.changed = None;
		self.error = Some(error);
	}

	pub(crate) fn skip(&mut self, reason: &str) {
		self.status = RecordStatus::Skipped;
		self.error = Some(reason.to_string());
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
	pub index: usize,
	pub records: usize,
	pub applied: usize,
	pub failed: usize,
	pub skipped: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

/// Audit artifact of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
	pub run_id: Uuid,
	#[serde(with = "crate::time_serde")]
	pub started_at: OffsetDateTime,
	#[serde(with = "crate::time_serde::option")]
	pub finished_at: Option<OffsetDateTime>,
	pub table: String,
	pub selection: String,
	pub threshold: f32,
	pub batch_size: usize,
	pub total: usize,
	pub attempted: usize,
	pub succeeded: usize,
	pub failed: usize,
	pub skipped: usize,
	pub snapshot: Option<BackupSnapshot>,
	pub aborted: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub fatal_error: Option<String>,
	pub batches: Vec<BatchSummary>,
	pub records: Vec<RecordOutcome>,
}
impl RunReport {
	pub fn new(table: &str, selection: &str, threshold: f32, batch_size: usize) -> Self {
		Self {
			run_id: Uuid::new_v4(),
			started_at: OffsetDateTime::now_utc(),
			finished_at: None,
			table: table.to_string(),
			selection: selection.to_string(),
			threshold,
			batch_size,
			total: 0,
			attempted: 0,
			succeeded: 0,
			failed: 0,
			skipped: 0,
			snapshot: None,
			aborted: false,
			fatal_error: None,
			batches: Vec::new(),
			records: Vec::new(),
		}
	}

	/// Recomputes the counters from the per-record outcomes.
	pub fn recount(&mut self) {
		let count = |status| self.records.iter().filter(|r| r.status == status).count();

		self.total = self.records.len();
		self.succeeded = count(RecordStatus::Applied);
		self.failed = count(RecordStatus::Failed);
		self.skipped = count(RecordStatus::Skipped);
	}

	pub fn finish(&mut self) {
		self.recount();
		self.finished_at = Some(OffsetDateTime::now_utc());
	}

	/// Every selected record is accounted for by exactly one terminal status.
	pub fn is_balanced(&self) -> bool {
		self.succeeded + self.failed + self.skipped == self.total
	}

	pub fn updated_ids(&self) -> Vec<&str> {
		self.records
			.iter()
			.filter(|r| r.status == RecordStatus::Applied)
			.map(|r| r.record_id.as_str())
			.collect()
	}
}
