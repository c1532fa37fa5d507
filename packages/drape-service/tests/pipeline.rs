use std::{
	collections::{BTreeMap, HashMap},
	fs,
	sync::{Arc, Mutex},
	time::Duration,
};

use drape_domain::{
	classifier::Classifier,
	narrative::{NarrativeGenerator, TITLE_MAX_CHARS},
	reference::ReferenceStore,
};
use drape_service::{
	BackupSink, BackupSnapshot, BoxFuture, CancelToken, Embedder, Error, ImageSource, Pipeline,
	Ports, RecordSource, RecordStatus, Result, RunSettings, UpdateSink, audit::AuditWriter,
};
use drape_storage::{
	models::{GarmentRecord, RecordUpdate},
	queries::Selection,
};

#[derive(Debug, Clone)]
struct Row {
	image_url: String,
	title: Option<String>,
	description: Option<String>,
}

#[derive(Default)]
struct TableState {
	rows: BTreeMap<u32, Row>,
	events: Vec<String>,
	apply_calls: usize,
}

/// In-memory table acting as record source, update sink and backup sink.
#[derive(Default)]
struct MemoryTable {
	state: Mutex<TableState>,
	fail_snapshot: bool,
	fail_apply_call: Option<usize>,
	missing_columns: Vec<String>,
	cancel_after_first_apply: Option<CancelToken>,
}
impl MemoryTable {
	fn with_urls(urls: &[&str]) -> Self {
		let table = Self::default();

		{
			let mut state = table.state.lock().expect("Lock poisoned.");

			for (i, url) in urls.iter().enumerate() {
				state.rows.insert(
					i as u32 + 1,
					Row { image_url: url.to_string(), title: None, description: None },
				);
			}
		}

		table
	}

	fn events(&self) -> Vec<String> {
		self.state.lock().expect("Lock poisoned.").events.clone()
	}

	fn title(&self, id: u32) -> Option<String> {
		self.state.lock().expect("Lock poisoned.").rows.get(&id).and_then(|row| row.title.clone())
	}

	fn set_narrative(&self, id: u32, title: &str, description: &str) {
		let mut state = self.state.lock().expect("Lock poisoned.");

		if let Some(row) = state.rows.get_mut(&id) {
			row.title = Some(title.to_string());
			row.description = Some(description.to_string());
		}
	}
}
impl RecordSource for MemoryTable {
	fn select<'a>(
		&'a self,
		selection: &'a Selection,
		max_records: Option<u64>,
	) -> BoxFuture<'a, Result<Vec<GarmentRecord>>> {
		let state = self.state.lock().expect("Lock poisoned.");
		let records = state
			.rows
			.iter()
			.filter(|(_, row)| !row.image_url.trim().is_empty())
			.map(|(id, row)| GarmentRecord {
				id: id.to_string(),
				image_url: row.image_url.clone(),
				current_title: row.title.clone(),
				current_description: row.description.clone(),
			})
			.filter(|record| match selection {
				Selection::MissingNarrative => !record.has_narrative(),
				_ => true,
			})
			.take(max_records.map(|max| max as usize).unwrap_or(usize::MAX))
			.collect::<Vec<_>>();

		Box::pin(async move { Ok(records) })
	}

	fn missing_columns(&self) -> BoxFuture<'_, Result<Vec<String>>> {
		let missing = self.missing_columns.clone();

		Box::pin(async move { Ok(missing) })
	}
}
impl UpdateSink for MemoryTable {
	fn apply<'a>(&'a self, updates: &'a [RecordUpdate]) -> BoxFuture<'a, Result<Vec<bool>>> {
		Box::pin(async move {
			let mut state = self.state.lock().expect("Lock poisoned.");

			state.apply_calls += 1;

			if let Some(token) = &self.cancel_after_first_apply {
				token.cancel();
			}

			if self.fail_apply_call == Some(state.apply_calls) {
				state.events.push("apply-failed".to_string());

				return Err(Error::Apply { message: "Simulated commit failure.".to_string() });
			}

			let mut changed = Vec::with_capacity(updates.len());

			for update in updates {
				let id: u32 = update.id.parse().expect("Numeric id.");
				let row = state.rows.get_mut(&id).expect("Row exists.");
				let differs = row.title.as_deref() != Some(update.title.as_str())
					|| row.description.as_deref() != Some(update.description.as_str());

				row.title = Some(update.title.clone());
				row.description = Some(update.description.clone());
				changed.push(differs);
			}

			let ids = updates.iter().map(|u| u.id.as_str()).collect::<Vec<_>>().join(",");

			state.events.push(format!("apply:{ids}"));

			Ok(changed)
		})
	}
}
impl BackupSink for MemoryTable {
	fn snapshot<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<BackupSnapshot>> {
		Box::pin(async move {
			let mut state = self.state.lock().expect("Lock poisoned.");

			if self.fail_snapshot {
				return Err(Error::Snapshot { message: "Disk full.".to_string() });
			}

			state.events.push("snapshot".to_string());

			Ok(BackupSnapshot {
				source_table: table.to_string(),
				snapshot_table: format!("{table}_backup_20240101_000000"),
				row_count: state.rows.len() as i64,
				created_at: time::OffsetDateTime::UNIX_EPOCH,
			})
		})
	}
}

/// Serves the URL itself as image bytes. URLs containing `timeout` hang, `broken` fails, and
/// `flaky` fails on its first request only.
#[derive(Default)]
struct FakeImages {
	calls: Mutex<HashMap<String, usize>>,
}
impl ImageSource for FakeImages {
	fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
		let call = {
			let mut calls = self.calls.lock().expect("Lock poisoned.");
			let count = calls.entry(url.to_string()).or_default();

			*count += 1;

			*count
		};

		Box::pin(async move {
			if url.contains("timeout") {
				tokio::time::sleep(Duration::from_secs(5)).await;
			}
			if url.contains("broken") || (url.contains("flaky") && call == 1) {
				return Err(Error::Fetch { url: url.to_string(), message: "HTTP 503.".to_string() });
			}

			Ok(url.as_bytes().to_vec())
		})
	}
}

/// Maps image bytes to fixed vectors by keyword.
struct FakeEmbedder;
impl Embedder for FakeEmbedder {
	fn embed<'a>(&'a self, images: &'a [Vec<u8>]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		let vectors = images
			.iter()
			.map(|bytes| {
				let text = String::from_utf8_lossy(bytes);

				if text.contains("saree") {
					vec![0.0, 0.0, 1.0]
				} else if text.contains("plain") {
					vec![0.0, 1.0, 0.0]
				} else {
					// Scores 0.82 against Lehenga.
					vec![0.82, (1.0_f32 - 0.82 * 0.82).sqrt(), 0.0]
				}
			})
			.collect();

		Box::pin(async move { Ok(vectors) })
	}
}

fn classifier() -> Classifier {
	let store = ReferenceStore::load(vec![
		("Lehenga".to_string(), vec![vec![1.0, 0.0, 0.0]]),
		("Saree".to_string(), vec![vec![0.0, 0.0, 1.0]]),
		("Others".to_string(), vec![vec![-1.0, 0.0, 0.0]]),
	])
	.expect("Failed to load reference store.");

	Classifier::new(Arc::new(store), 0.15, 3)
}

fn settings(batch_size: usize) -> RunSettings {
	RunSettings {
		table: "products".to_string(),
		selection: Selection::All,
		batch_size,
		max_records: None,
		backup_enabled: true,
		preserve_existing: false,
		fetch_timeout: Duration::from_millis(50),
		encode_timeout: Duration::from_millis(500),
		attempts: 1,
	}
}

fn pipeline(table: &Arc<MemoryTable>, settings: RunSettings) -> Pipeline {
	let ports = Ports::from_store(table.clone(), Arc::new(FakeImages::default()), Arc::new(FakeEmbedder));

	Pipeline::new(ports, classifier(), settings)
}

fn urls(n: usize) -> Vec<String> {
	(1..=n).map(|i| format!("https://cdn.example.com/lehenga-{i}.jpg")).collect()
}

fn as_refs(urls: &[String]) -> Vec<&str> {
	urls.iter().map(String::as_str).collect()
}

#[tokio::test]
async fn backup_completes_before_any_write() {
	let urls = urls(4);
	let table = Arc::new(MemoryTable::with_urls(&as_refs(&urls)));
	let report = pipeline(&table, settings(2)).run(&CancelToken::new()).await.expect("Run failed.");
	let events = table.events();

	assert_eq!(events, vec!["snapshot", "apply:1,2", "apply:3,4"]);
	assert_eq!(
		report.snapshot.as_ref().map(|s| s.snapshot_table.as_str()),
		Some("products_backup_20240101_000000")
	);
	assert_eq!(report.succeeded, 4);
	assert!(report.is_balanced());
}

#[tokio::test]
async fn timed_out_record_fails_alone_within_its_batch() {
	let mut urls = urls(10);

	urls[6] = "https://cdn.example.com/timeout-7.jpg".to_string();

	let table = Arc::new(MemoryTable::with_urls(&as_refs(&urls)));
	let report =
		pipeline(&table, settings(10)).run(&CancelToken::new()).await.expect("Run failed.");

	assert_eq!((report.total, report.succeeded, report.failed, report.skipped), (10, 9, 1, 0));
	assert_eq!(report.records[6].record_id, "7");
	assert_eq!(report.records[6].status, RecordStatus::Failed);
	assert!(report.records[6].error.as_deref().is_some_and(|e| e.contains("Timed out")));
	assert_eq!(table.events(), vec!["snapshot", "apply:1,2,3,4,5,6,8,9,10"]);
	assert!(table.title(7).is_none());

	for id in [1, 2, 3, 4, 5, 6, 8, 9, 10] {
		assert!(table.title(id).is_some(), "record {id} was not updated");
	}
}

#[tokio::test]
async fn apply_failure_is_isolated_to_its_batch() {
	let urls = urls(6);
	let table = Arc::new(MemoryTable {
		fail_apply_call: Some(2),
		..MemoryTable::with_urls(&as_refs(&urls))
	});
	let report = pipeline(&table, settings(2)).run(&CancelToken::new()).await.expect("Run failed.");
	let statuses = report.records.iter().map(|r| r.status).collect::<Vec<_>>();

	assert_eq!(
		statuses,
		vec![
			RecordStatus::Applied,
			RecordStatus::Applied,
			RecordStatus::Failed,
			RecordStatus::Failed,
			RecordStatus::Applied,
			RecordStatus::Applied,
		]
	);
	assert_eq!(report.batches.len(), 3);
	assert!(report.batches[1].error.is_some());
	assert_eq!(table.events(), vec!["snapshot", "apply:1,2", "apply-failed", "apply:5,6"]);
	assert!(table.title(3).is_none());
}

#[tokio::test]
async fn snapshot_failure_aborts_before_any_write_and_still_audits() {
	let urls = urls(3);
	let table = Arc::new(MemoryTable { fail_snapshot: true, ..MemoryTable::with_urls(&as_refs(&urls)) });
	let dir = tempfile::tempdir().expect("Failed to create audit dir.");
	let result = pipeline(&table, settings(2))
		.with_audit(AuditWriter::new(dir.path()))
		.run(&CancelToken::new())
		.await;

	assert!(matches!(result, Err(Error::Snapshot { .. })));
	assert!(table.events().is_empty());

	let artifact = fs::read_dir(dir.path())
		.expect("Audit dir missing.")
		.filter_map(|entry| entry.ok())
		.find(|entry| entry.file_name().to_string_lossy().starts_with("run-"))
		.expect("Audit artifact missing.");
	let json: serde_json::Value =
		serde_json::from_slice(&fs::read(artifact.path()).expect("Failed to read audit."))
			.expect("Audit is not JSON.");

	assert_eq!(json["skipped"], 3);
	assert_eq!(json["succeeded"], 0);
	assert!(json["fatal_error"].as_str().is_some_and(|e| e.contains("Disk full")));
}

#[tokio::test]
async fn rerun_reproduces_narratives_as_noops() {
	let mut urls = urls(5);

	urls[1] = "https://cdn.example.com/saree-2.jpg".to_string();
	urls[3] = "https://cdn.example.com/plain-4.jpg".to_string();

	let table = Arc::new(MemoryTable::with_urls(&as_refs(&urls)));
	let pipeline = pipeline(&table, settings(2));
	let first = pipeline.run(&CancelToken::new()).await.expect("First run failed.");
	let second = pipeline.run(&CancelToken::new()).await.expect("Second run failed.");
	let narratives = |report: &drape_service::RunReport| {
		report
			.records
			.iter()
			.map(|r| (r.record_id.clone(), r.title.clone(), r.description.clone()))
			.collect::<Vec<_>>()
	};

	assert_eq!(
		(first.total, first.succeeded, first.failed, first.skipped),
		(second.total, second.succeeded, second.failed, second.skipped)
	);
	assert_eq!(narratives(&first), narratives(&second));
	assert!(first.records.iter().all(|r| r.changed == Some(true)));
	assert!(second.records.iter().all(|r| r.changed == Some(false)));
}

#[tokio::test]
async fn lehenga_scenario_produces_lehenga_title() {
	let table = Arc::new(MemoryTable::with_urls(&["https://cdn.example.com/lehenga.jpg"]));
	let report = pipeline(&table, settings(10)).run(&CancelToken::new()).await.expect("Run failed.");
	let outcome = &report.records[0];
	let classification = outcome.classification.as_ref().expect("Classification missing.");
	let title = outcome.title.as_deref().expect("Title missing.");

	assert_eq!(classification.top_category, "Lehenga");
	assert!(classification.is_garment);
	assert!((classification.top_confidence - 0.82).abs() < 1e-4);
	assert_eq!(outcome.broad_category.as_deref(), Some("Lehenga"));
	assert!(title.contains("Lehenga"), "{title}");
	assert!(title.chars().count() <= TITLE_MAX_CHARS);
}

#[tokio::test]
async fn below_threshold_records_get_the_neutral_narrative() {
	let table = Arc::new(MemoryTable::with_urls(&["https://cdn.example.com/plain.jpg"]));
	let report = pipeline(&table, settings(10)).run(&CancelToken::new()).await.expect("Run failed.");
	let outcome = &report.records[0];
	let neutral = NarrativeGenerator::default().neutral();

	assert_eq!(outcome.status, RecordStatus::Applied);
	assert_eq!(outcome.broad_category.as_deref(), Some("Others"));
	assert_eq!(outcome.classification.as_ref().map(|c| c.is_garment), Some(false));
	assert_eq!(outcome.title.as_deref(), Some(neutral.title.as_str()));
}

#[tokio::test]
async fn unmapped_reference_category_is_applied_as_others() {
	let table = Arc::new(MemoryTable::with_urls(&["https://cdn.example.com/sherwani.jpg"]));
	let store = ReferenceStore::load(vec![
		("Sherwani".to_string(), vec![vec![1.0, 0.0, 0.0]]),
		("Saree".to_string(), vec![vec![0.0, 0.0, 1.0]]),
	])
	.expect("Failed to load reference store.");
	let ports =
		Ports::from_store(table.clone(), Arc::new(FakeImages::default()), Arc::new(FakeEmbedder));
	let report = Pipeline::new(ports, Classifier::new(Arc::new(store), 0.15, 3), settings(10))
		.run(&CancelToken::new())
		.await
		.expect("Run failed.");
	let outcome = &report.records[0];
	let neutral = NarrativeGenerator::default().neutral();

	assert_eq!(outcome.status, RecordStatus::Applied);
	assert!(outcome.error.is_none());
	assert_eq!(outcome.classification.as_ref().map(|c| c.top_category.as_str()), Some("Sherwani"));
	assert_eq!(outcome.classification.as_ref().map(|c| c.is_garment), Some(true));
	assert_eq!(outcome.broad_category.as_deref(), Some("Others"));
	assert_eq!(outcome.title.as_deref(), Some(neutral.title.as_str()));
	assert_eq!(table.title(1), Some(neutral.title));
	assert_eq!(report.succeeded, 1);
	assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn preserve_existing_skips_rows_with_narratives() {
	let urls = urls(3);
	let table = Arc::new(MemoryTable::with_urls(&as_refs(&urls)));

	table.set_narrative(2, "Hand written", "Curated copy");

	let report = pipeline(&table, RunSettings { preserve_existing: true, ..settings(10) })
		.run(&CancelToken::new())
		.await
		.expect("Run failed.");

	assert_eq!((report.succeeded, report.skipped), (2, 1));
	assert_eq!(report.records[1].status, RecordStatus::Skipped);
	assert_eq!(table.title(2).as_deref(), Some("Hand written"));
	assert_eq!(table.events(), vec!["snapshot", "apply:1,3"]);
}

#[tokio::test]
async fn cancellation_between_batches_skips_the_rest() {
	let urls = urls(6);
	let cancel = CancelToken::new();
	let table = Arc::new(MemoryTable {
		cancel_after_first_apply: Some(cancel.clone()),
		..MemoryTable::with_urls(&as_refs(&urls))
	});
	let report = pipeline(&table, settings(2)).run(&cancel).await.expect("Run failed.");

	assert!(report.aborted);
	assert_eq!((report.succeeded, report.failed, report.skipped), (2, 0, 4));
	assert_eq!(report.attempted, 2);
	assert_eq!(table.events(), vec!["snapshot", "apply:1,2"]);
	assert!(report.is_balanced());
}

#[tokio::test]
async fn retries_recover_transient_fetch_failures() {
	let table = Arc::new(MemoryTable::with_urls(&[
		"https://cdn.example.com/flaky.jpg",
		"https://cdn.example.com/broken.jpg",
	]));
	let report = pipeline(&table, RunSettings { attempts: 2, ..settings(10) })
		.run(&CancelToken::new())
		.await
		.expect("Run failed.");

	assert_eq!(report.records[0].status, RecordStatus::Applied);
	assert_eq!(report.records[1].status, RecordStatus::Failed);
}

#[tokio::test]
async fn missing_columns_abort_before_snapshot() {
	let urls = urls(2);
	let table = Arc::new(MemoryTable {
		missing_columns: vec!["garment_title".to_string()],
		..MemoryTable::with_urls(&as_refs(&urls))
	});
	let result = pipeline(&table, settings(2)).run(&CancelToken::new()).await;

	assert!(matches!(result, Err(Error::Configuration { .. })));
	assert!(table.events().is_empty());
}

#[tokio::test]
async fn disabled_backups_write_without_snapshot() {
	let urls = urls(2);
	let table = Arc::new(MemoryTable::with_urls(&as_refs(&urls)));
	let report = pipeline(&table, RunSettings { backup_enabled: false, ..settings(5) })
		.run(&CancelToken::new())
		.await
		.expect("Run failed.");

	assert!(report.snapshot.is_none());
	assert_eq!(table.events(), vec!["apply:1,2"]);
}

#[tokio::test]
async fn empty_selection_takes_no_snapshot() {
	let table = Arc::new(MemoryTable::with_urls(&["   "]));
	let report = pipeline(&table, settings(5)).run(&CancelToken::new()).await.expect("Run failed.");

	assert_eq!(report.total, 0);
	assert!(report.snapshot.is_none());
	assert!(table.events().is_empty());
}
