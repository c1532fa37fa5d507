use std::{
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
	time::Duration,
};

use drape_config::Config;
use drape_domain::{
	category::{self, BroadCategory},
	classifier::{ClassificationResult, Classifier},
	narrative::{NarrativeGenerator, NarrativeOutput},
};
use drape_storage::{
	models::{GarmentRecord, RecordUpdate},
	queries::Selection,
};

use crate::{
	Error, Ports, Result,
	audit::AuditWriter,
	report::{BatchSummary, RecordOutcome, RecordStatus, RunReport},
};

const SKIP_PRESERVED: &str = "Existing title and description preserved.";
const SKIP_CANCELLED: &str = "Run cancelled before this batch started.";
const SKIP_NO_SNAPSHOT: &str = "Backup snapshot failed before any write.";

/// Cooperative stop signal, checked between batches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);
impl CancelToken {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

#[derive(Debug, Clone)]
pub struct RunSettings {
	pub table: String,
	pub selection: Selection,
	pub batch_size: usize,
	pub max_records: Option<u64>,
	pub backup_enabled: bool,
	/// Skip rows that already carry a non-blank title and description.
	pub preserve_existing: bool,
	pub fetch_timeout: Duration,
	pub encode_timeout: Duration,
	/// Fetch-and-encode attempts per record, at least one.
	pub attempts: u32,
}
impl RunSettings {
	pub fn from_config(cfg: &Config) -> Result<Self> {
		let selection = Selection::from_config(cfg.batch.selection, cfg.batch.where_clause.as_deref())
			.map_err(|err| Error::Configuration { message: err.to_string() })?;

		Ok(Self {
			table: cfg.table.name.clone(),
			selection,
			batch_size: cfg.batch.size.max(1) as usize,
			max_records: cfg.batch.max_records,
			backup_enabled: cfg.backup.enabled,
			preserve_existing: cfg.batch.preserve_existing,
			fetch_timeout: Duration::from_millis(cfg.fetch.timeout_ms),
			encode_timeout: Duration::from_millis(cfg.providers.embedding.timeout_ms),
			attempts: cfg.fetch.attempts.max(1),
		})
	}
}

struct Processed {
	classification: ClassificationResult,
	broad: BroadCategory,
	narrative: NarrativeOutput,
}

/// Batch orchestrator: select, snapshot, then classify and apply batch by batch.
pub struct Pipeline {
	ports: Ports,
	classifier: Classifier,
	narrative: NarrativeGenerator,
	settings: RunSettings,
	audit: Option<AuditWriter>,
}
impl Pipeline {
	pub fn new(ports: Ports, classifier: Classifier, settings: RunSettings) -> Self {
		Self { ports, classifier, narrative: NarrativeGenerator::default(), settings, audit: None }
	}

	pub fn with_audit(mut self, audit: AuditWriter) -> Self {
		self.audit = Some(audit);

		self
	}

	/// Runs one pass over the selected records.
	///
	/// Fatal errors (configuration, connection, snapshot) return `Err` after the audit artifact
	/// has been written. Per-record and per-batch failures are reported in the returned report.
	pub async fn run(&self, cancel: &CancelToken) -> Result<RunReport> {
		let mut report = RunReport::new(
			&self.settings.table,
			&self.settings.selection.describe(),
			self.classifier.threshold(),
			self.settings.batch_size,
		);

		tracing::info!(
			run_id = %report.run_id,
			table = %report.table,
			selection = %report.selection,
			batch_size = report.batch_size,
			"Starting run."
		);

		let result = self.execute(&mut report, cancel).await;

		if let Err(err) = &result {
			tracing::error!(run_id = %report.run_id, error = %err, "Run aborted.");

			report.fatal_error = Some(err.to_string());
		}

		report.finish();
		self.write_audit(&report);

		tracing::info!(
			run_id = %report.run_id,
			total = report.total,
			attempted = report.attempted,
			succeeded = report.succeeded,
			failed = report.failed,
			skipped = report.skipped,
			aborted = report.aborted,
			"Run finished."
		);

		result.map(|()| report)
	}

	async fn execute(&self, report: &mut RunReport, cancel: &CancelToken) -> Result<()> {
		let missing = self.ports.source.missing_columns().await?;

		if !missing.is_empty() {
			return Err(Error::Configuration {
				message: format!(
					"Table {} lacks configured columns: {}.",
					self.settings.table,
					missing.join(", ")
				),
			});
		}

		let candidates =
			self.ports.source.select(&self.settings.selection, self.settings.max_records).await?;
		let batch_size = self.settings.batch_size.max(1);

		report.records = candidates
			.iter()
			.enumerate()
			.map(|(i, record)| RecordOutcome::pending(&record.id, &record.image_url, i / batch_size))
			.collect();

		if self.settings.preserve_existing {
			for (record, outcome) in candidates.iter().zip(report.records.iter_mut()) {
				if record.has_narrative() {
					outcome.skip(SKIP_PRESERVED);
				}
			}
		}

		report.recount();

		tracing::info!(
			run_id = %report.run_id,
			candidates = report.total,
			skipped = report.skipped,
			"Resolved candidate records."
		);

		if !report.records.iter().any(|outcome| outcome.status == RecordStatus::Pending) {
			return Ok(());
		}

		self.take_snapshot(report).await?;

		for (index, chunk) in candidates.chunks(batch_size).enumerate() {
			let offset = index * batch_size;

			if cancel.is_cancelled() {
				for outcome in &mut report.records[offset..] {
					if outcome.status == RecordStatus::Pending {
						outcome.skip(SKIP_CANCELLED);
					}
				}

				report.aborted = true;

				tracing::warn!(run_id = %report.run_id, batch = index, "Run cancelled between batches.");

				break;
			}

			let outcomes = &mut report.records[offset..offset + chunk.len()];
			let (summary, attempted) = self.run_batch(index, chunk, outcomes).await;

			report.attempted += attempted;
			report.batches.push(summary);
			report.recount();
			self.write_audit(report);
		}

		Ok(())
	}

	async fn take_snapshot(&self, report: &mut RunReport) -> Result<()> {
		if !self.settings.backup_enabled {
			tracing::warn!(run_id = %report.run_id, "Backups are disabled. Writing without a snapshot.");

			return Ok(());
		}

		match self.ports.backup.snapshot(&self.settings.table).await {
			Ok(snapshot) => {
				tracing::info!(
					run_id = %report.run_id,
					snapshot = %snapshot.snapshot_table,
					row_count = snapshot.row_count,
					"Backup snapshot ready."
				);

				report.snapshot = Some(snapshot);

				Ok(())
			},
			Err(err) => {
				for outcome in &mut report.records {
					if outcome.status == RecordStatus::Pending {
						outcome.skip(SKIP_NO_SNAPSHOT);
					}
				}

				Err(match err {
					snapshot @ Error::Snapshot { .. } => snapshot,
					other => Error::Snapshot { message: other.to_string() },
				})
			},
		}
	}

	/// Processes one batch and applies its staged updates atomically.
	///
	/// Returns the batch summary and the number of records that entered processing.
	async fn run_batch(
		&self,
		index: usize,
		records: &[GarmentRecord],
		outcomes: &mut [RecordOutcome],
	) -> (BatchSummary, usize) {
		let mut attempted = 0;
		let mut staged = Vec::new();
		let mut updates = Vec::new();

		for (position, (record, outcome)) in records.iter().zip(outcomes.iter_mut()).enumerate() {
			if outcome.status != RecordStatus::Pending {
				continue;
			}

			attempted += 1;

			match self.process_record(record).await {
				Ok(Processed { classification, broad, narrative }) => {
					updates.push(RecordUpdate {
						id: record.id.clone(),
						title: narrative.title.clone(),
						description: narrative.description.clone(),
					});
					staged.push(position);

					outcome.classification = Some(classification);
					outcome.broad_category = Some(broad.label().to_string());
					outcome.title = Some(narrative.title);
					outcome.description = Some(narrative.description);
				},
				Err(err) => {
					tracing::warn!(
						record_id = %record.id,
						batch = index,
						error = %err,
						"Record failed."
					);

					outcome.fail(err.to_string());
				},
			}
		}

		let mut error = None;

		if !updates.is_empty() {
			match self.ports.sink.apply(&updates).await {
				Ok(changed) =>
					for (i, position) in staged.iter().enumerate() {
						let outcome = &mut outcomes[*position];

						outcome.status = RecordStatus::Applied;
						outcome.changed = changed.get(i).copied();
					},
				Err(err) => {
					tracing::error!(
						batch = index,
						records = staged.len(),
						error = %err,
						"Batch apply failed. Its records are marked failed."
					);

					for position in &staged {
						outcomes[*position].fail(format!("Batch apply failed: {err}"));
					}

					error = Some(err.to_string());
				},
			}
		}

		let count = |status| outcomes.iter().filter(|o| o.status == status).count();
		let summary = BatchSummary {
			index,
			records: outcomes.len(),
			applied: count(RecordStatus::Applied),
			failed: count(RecordStatus::Failed),
			skipped: count(RecordStatus::Skipped),
			error,
		};

		tracing::info!(
			batch = index,
			applied = summary.applied,
			failed = summary.failed,
			skipped = summary.skipped,
			"Batch finished."
		);

		(summary, attempted)
	}

	async fn process_record(&self, record: &GarmentRecord) -> Result<Processed> {
		let embedding = self.fetch_and_encode(record).await?;
		let classification = self.classifier.classify(&record.id, &embedding)?;
		let mapping = category::map_fine_category(&classification.top_category);

		if mapping.is_gap() {
			tracing::warn!(
				record_id = %record.id,
				category = %classification.top_category,
				"Category has no broad mapping. Using Others."
			);
		}

		let broad =
			if classification.is_garment { mapping.category() } else { BroadCategory::Others };
		let narrative = self.narrative.generate(broad, classification.top_confidence, &record.id);

		tracing::debug!(
			record_id = %record.id,
			category = %classification.top_category,
			confidence = classification.top_confidence,
			is_garment = classification.is_garment,
			broad = broad.key(),
			"Classified record."
		);

		Ok(Processed { classification, broad, narrative })
	}

	async fn fetch_and_encode(&self, record: &GarmentRecord) -> Result<Vec<f32>> {
		let attempts = self.settings.attempts.max(1);
		let mut last_err = None;

		for attempt in 1..=attempts {
			match self.fetch_and_encode_once(record.image_url.trim()).await {
				Ok(embedding) => return Ok(embedding),
				Err(err) => {
					if attempt < attempts {
						tracing::debug!(
							record_id = %record.id,
							attempt,
							error = %err,
							"Retrying fetch and encode."
						);
					}

					last_err = Some(err);
				},
			}
		}

		Err(last_err.unwrap_or_else(|| Error::Fetch {
			url: record.image_url.clone(),
			message: "No fetch attempt was made.".to_string(),
		}))
	}

	async fn fetch_and_encode_once(&self, url: &str) -> Result<Vec<f32>> {
		let bytes = tokio::time::timeout(self.settings.fetch_timeout, self.ports.images.fetch(url))
			.await
			.map_err(|_| Error::Fetch {
				url: url.to_string(),
				message: format!("Timed out after {} ms.", self.settings.fetch_timeout.as_millis()),
			})??;
		let embedding = tokio::time::timeout(
			self.settings.encode_timeout,
			crate::embed_one(self.ports.embedder.as_ref(), bytes),
		)
		.await
		.map_err(|_| Error::Encoding {
			message: format!(
				"Embedding {url} timed out after {} ms.",
				self.settings.encode_timeout.as_millis()
			),
		})??;

		Ok(embedding)
	}

	fn write_audit(&self, report: &RunReport) {
		let Some(audit) = &self.audit else {
			return;
		};

		match audit.write(report) {
			Ok(path) => tracing::debug!(path = %path.display(), "Audit artifact written."),
			Err(err) => tracing::error!(error = %err, "Failed to write audit artifact."),
		}
	}
}
