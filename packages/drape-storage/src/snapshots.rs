use time::{Duration, OffsetDateTime, macros::format_description};

use crate::{
	Error, Result,
	db::Db,
	ident::Ident,
	models::SnapshotRecord,
};

/// Later seconds tried when the current second's snapshot name is already taken.
pub const MAX_NAME_STEPS: i64 = 59;

/// Builds `{table}_backup_{YYYYMMDD_HHMMSS}` in UTC.
pub fn snapshot_name(table: &Ident, at: OffsetDateTime) -> Result<Ident> {
	let suffix = at
		.to_offset(time::UtcOffset::UTC)
		.format(format_description!("[year][month][day]_[hour][minute][second]"))
		.map_err(|err| Error::InvalidArgument(format!("Failed to format snapshot time: {err}.")))?;

	Ident::new(&format!("{}_backup_{suffix}", table.as_str()))
}

/// Copies the full target table into a timestamped table and registers it.
///
/// When the name for the current second is taken, the next free second is used, so back-to-back
/// snapshots keep the same name shape. Everything happens in one transaction, so a failed copy
/// leaves no partial table behind.
pub async fn create_snapshot(db: &Db, table: &Ident) -> Result<SnapshotRecord> {
	let now = OffsetDateTime::now_utc();
	let mut tx = db.pool.begin().await?;
	let mut free = None;

	for step in 0..=MAX_NAME_STEPS {
		let candidate = snapshot_name(table, now + Duration::seconds(step))?;
		let taken: bool = sqlx::query_scalar(
			"\
SELECT to_regclass($1) IS NOT NULL
	OR EXISTS (SELECT 1 FROM drape_snapshots WHERE snapshot_table = $2)",
		)
		.bind(candidate.to_string())
		.bind(candidate.as_str())
		.fetch_one(&mut *tx)
		.await?;

		if !taken {
			free = Some(candidate);

			break;
		}
	}

	let Some(name) = free else {
		return Err(Error::Conflict(format!(
			"No free snapshot name for {table} within {MAX_NAME_STEPS} seconds."
		)));
	};

	sqlx::query(&format!("CREATE TABLE {name} AS TABLE {table}"))
		.execute(&mut *tx)
		.await?;

	let row_count: i64 = sqlx::query_scalar(&format!("SELECT count(*) FROM {name}"))
		.fetch_one(&mut *tx)
		.await?;
	let record = sqlx::query_as::<_, SnapshotRecord>(
		"\
INSERT INTO drape_snapshots (snapshot_table, source_table, row_count)
VALUES ($1, $2, $3)
RETURNING snapshot_table, source_table, row_count, created_at",
	)
	.bind(name.as_str())
	.bind(table.as_str())
	.bind(row_count)
	.fetch_one(&mut *tx)
	.await?;

	tx.commit().await?;

	tracing::info!(
		snapshot_table = %record.snapshot_table,
		source_table = %record.source_table,
		row_count = record.row_count,
		"Created backup snapshot."
	);

	Ok(record)
}

pub async fn list_snapshots(db: &Db, source_table: Option<&str>) -> Result<Vec<SnapshotRecord>> {
	let records = sqlx::query_as::<_, SnapshotRecord>(
		"\
SELECT snapshot_table, source_table, row_count, created_at
FROM drape_snapshots
WHERE $1::text IS NULL OR source_table = $1
ORDER BY created_at DESC, snapshot_table DESC",
	)
	.bind(source_table)
	.fetch_all(&db.pool)
	.await?;

	Ok(records)
}

/// Replaces the source table's rows with a registered snapshot's rows.
///
/// Returns the number of restored rows.
pub async fn restore_snapshot(db: &Db, snapshot_table: &str) -> Result<u64> {
	let snapshot = Ident::new(snapshot_table)?;
	let mut tx = db.pool.begin().await?;
	let source: Option<String> =
		sqlx::query_scalar("SELECT source_table FROM drape_snapshots WHERE snapshot_table = $1")
			.bind(snapshot.as_str())
			.fetch_optional(&mut *tx)
			.await?;
	let Some(source) = source else {
		return Err(Error::NotFound(format!("Snapshot {snapshot} is not registered.")));
	};
	let source = Ident::new(&source)?;

	sqlx::query(&format!("LOCK TABLE {source} IN ACCESS EXCLUSIVE MODE")).execute(&mut *tx).await?;
	sqlx::query(&format!("DELETE FROM {source}")).execute(&mut *tx).await?;

	// Identity keys declared GENERATED ALWAYS reject explicit values without the override.
	let restored = sqlx::query(&format!(
		"INSERT INTO {source} OVERRIDING SYSTEM VALUE SELECT * FROM {snapshot}"
	))
	.execute(&mut *tx)
	.await?
	.rows_affected();

	tx.commit().await?;

	tracing::warn!(
		snapshot_table = %snapshot.as_str(),
		source_table = %source.as_str(),
		restored,
		"Restored table from snapshot."
	);

	Ok(restored)
}

pub async fn drop_snapshot(db: &Db, snapshot_table: &str) -> Result<()> {
	let snapshot = Ident::new(snapshot_table)?;
	let mut tx = db.pool.begin().await?;
	let removed: Option<String> = sqlx::query_scalar(
		"DELETE FROM drape_snapshots WHERE snapshot_table = $1 RETURNING snapshot_table",
	)
	.bind(snapshot.as_str())
	.fetch_optional(&mut *tx)
	.await?;

	if removed.is_none() {
		return Err(Error::NotFound(format!("Snapshot {snapshot} is not registered.")));
	}

	sqlx::query(&format!("DROP TABLE IF EXISTS {snapshot}")).execute(&mut *tx).await?;
	tx.commit().await?;

	tracing::info!(snapshot_table = %snapshot.as_str(), "Dropped snapshot.");

	Ok(())
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use super::*;

	#[test]
	fn snapshot_name_uses_utc_timestamp_suffix() {
		let table = Ident::new("products").expect("ident");
		let name = snapshot_name(&table, datetime!(2024-03-05 23:04:09 -02:00)).expect("name");

		assert_eq!(name.as_str(), "products_backup_20240306_010409");
	}

	#[test]
	fn later_second_names_keep_the_suffix_shape() {
		let table = Ident::new("products").expect("ident");
		let at = datetime!(2024-12-31 23:59:59 UTC);
		let first = snapshot_name(&table, at).expect("name");
		let last = snapshot_name(&table, at + Duration::seconds(MAX_NAME_STEPS)).expect("name");

		assert_eq!(last.as_str(), "products_backup_20250101_000058");
		assert_eq!(first.as_str().len(), last.as_str().len());
	}

	#[test]
	fn long_table_names_are_rejected_rather_than_truncated() {
		let table = Ident::new(&"t".repeat(50)).expect("ident");

		assert!(snapshot_name(&table, datetime!(2024-01-01 0:00 UTC)).is_err());
	}
}
