use drape_storage::{
	db::Db,
	ident::{Ident, TableLayout},
	models::{ColumnInfo, GarmentRecord, RecordUpdate},
	queries::{self, Selection},
	snapshots,
};

use crate::{
	BackupSink, BackupSnapshot, BoxFuture, Error, RecordSource, Result, UpdateSink,
};

/// Postgres-backed record source, update sink and backup sink for one table.
pub struct PgStore {
	db: Db,
	layout: TableLayout,
}
impl PgStore {
	pub async fn connect(cfg: &drape_config::Config) -> Result<Self> {
		let layout = TableLayout::from_config(&cfg.table)
			.map_err(|err| Error::Configuration { message: err.to_string() })?;
		let db = Db::connect(&cfg.storage.postgres)
			.await
			.map_err(|err| Error::Connection { message: err.to_string() })?;

		db.ensure_schema().await.map_err(|err| Error::from_storage(err, Error::configuration))?;

		Ok(Self { db, layout })
	}

	pub fn layout(&self) -> &TableLayout {
		&self.layout
	}

	pub async fn server_version(&self) -> Result<String> {
		self.db.server_version().await.map_err(|err| Error::from_storage(err, Error::configuration))
	}

	pub async fn columns(&self) -> Result<Vec<ColumnInfo>> {
		queries::table_columns(&self.db, self.layout.table.as_str())
			.await
			.map_err(|err| Error::from_storage(err, Error::configuration))
	}

	pub async fn list_snapshots(&self, all_tables: bool) -> Result<Vec<BackupSnapshot>> {
		let source = (!all_tables).then(|| self.layout.table.as_str());
		let records = snapshots::list_snapshots(&self.db, source)
			.await
			.map_err(|err| Error::from_storage(err, Error::snapshot))?;

		Ok(records.into_iter().map(BackupSnapshot::from).collect())
	}

	pub async fn restore_snapshot(&self, snapshot_table: &str) -> Result<u64> {
		snapshots::restore_snapshot(&self.db, snapshot_table)
			.await
			.map_err(|err| Error::from_storage(err, Error::snapshot))
	}

	pub async fn drop_snapshot(&self, snapshot_table: &str) -> Result<()> {
		snapshots::drop_snapshot(&self.db, snapshot_table)
			.await
			.map_err(|err| Error::from_storage(err, Error::snapshot))
	}
}

impl RecordSource for PgStore {
	fn select<'a>(
		&'a self,
		selection: &'a Selection,
		max_records: Option<u64>,
	) -> BoxFuture<'a, Result<Vec<GarmentRecord>>> {
		Box::pin(async move {
			queries::select_candidates(&self.db, &self.layout, selection, max_records)
				.await
				.map_err(|err| Error::from_storage(err, Error::configuration))
		})
	}

	fn missing_columns(&self) -> BoxFuture<'_, Result<Vec<String>>> {
		Box::pin(async move {
			queries::missing_columns(&self.db, &self.layout)
				.await
				.map_err(|err| Error::from_storage(err, Error::configuration))
		})
	}
}

impl UpdateSink for PgStore {
	fn apply<'a>(&'a self, updates: &'a [RecordUpdate]) -> BoxFuture<'a, Result<Vec<bool>>> {
		Box::pin(async move {
			queries::apply_updates(&self.db, &self.layout, updates).await.map_err(|err| {
				// A dropped connection fails the batch, not the run.
				Error::Apply { message: err.to_string() }
			})
		})
	}
}

impl BackupSink for PgStore {
	fn snapshot<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<BackupSnapshot>> {
		Box::pin(async move {
			let table =
				Ident::new(table).map_err(|err| Error::Snapshot { message: err.to_string() })?;
			let record = snapshots::create_snapshot(&self.db, &table)
				.await
				.map_err(|err| Error::Snapshot { message: err.to_string() })?;

			Ok(BackupSnapshot::from(record))
		})
	}
}
