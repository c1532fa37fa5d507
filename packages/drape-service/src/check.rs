use drape_storage::{ident::Ident, models::ColumnInfo};

use crate::{Result, postgres::PgStore};

#[derive(Debug, Clone)]
pub struct CheckReport {
	pub server_version: String,
	pub table: String,
	pub columns: Vec<ColumnInfo>,
	/// Configured columns the table lacks.
	pub missing: Vec<String>,
}

pub async fn check(store: &PgStore) -> Result<CheckReport> {
	let server_version = store.server_version().await?;
	let columns = store.columns().await?;
	let layout = store.layout();
	let missing = missing_from(&columns, layout.columns().into_iter().map(Ident::as_str));

	tracing::info!(
		table = layout.table.as_str(),
		columns = columns.len(),
		missing = missing.len(),
		"Checked target table."
	);

	Ok(CheckReport { server_version, table: layout.table.as_str().to_string(), columns, missing })
}

fn missing_from<'a>(columns: &[ColumnInfo], wanted: impl Iterator<Item = &'a str>) -> Vec<String> {
	wanted
		.filter(|name| !columns.iter().any(|column| column.name == *name))
		.map(str::to_string)
		.collect()
}
