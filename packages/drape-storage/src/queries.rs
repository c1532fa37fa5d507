use sqlx::Row;

use crate::{
	Error, Result,
	db::Db,
	ident::TableLayout,
	models::{ColumnInfo, GarmentRecord, RecordUpdate},
};
use drape_config::SelectionMode;

/// Which rows of the target table a run considers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
	All,
	/// Rows whose title or description is null or blank.
	MissingNarrative,
	/// Caller-supplied SQL predicate. Its correctness is the caller's responsibility.
	Where(String),
}
impl Selection {
	pub fn from_config(mode: SelectionMode, where_clause: Option<&str>) -> Result<Self> {
		drape_config::validate_selection(mode, where_clause)
			.map_err(|err| Error::InvalidArgument(err.to_string()))?;

		Ok(match (mode, where_clause) {
			(SelectionMode::All, _) => Self::All,
			(SelectionMode::MissingNarrative, _) => Self::MissingNarrative,
			(SelectionMode::Where, Some(clause)) => Self::Where(clause.to_string()),
			(SelectionMode::Where, None) =>
				return Err(Error::InvalidArgument("Missing where clause.".to_string())),
		})
	}

	pub fn describe(&self) -> String {
		match self {
			Self::All => "all".to_string(),
			Self::MissingNarrative => "missing_narrative".to_string(),
			Self::Where(clause) => format!("where: {clause}"),
		}
	}
}

pub fn render_select(layout: &TableLayout, selection: &Selection) -> String {
	let TableLayout { table, id, image, title, description } = layout;
	let mut sql = format!(
		"\
SELECT
	{id}::text AS id,
	{image}::text AS image_url,
	{title}::text AS current_title,
	{description}::text AS current_description
FROM {table}
WHERE {image} IS NOT NULL
	AND btrim({image}::text) <> ''"
	);

	match selection {
		Selection::All => {},
		Selection::MissingNarrative => sql.push_str(&format!(
			"\n\tAND (btrim(coalesce({title}::text, '')) = '' OR btrim(coalesce({description}::text, '')) = '')"
		)),
		Selection::Where(clause) => sql.push_str(&format!("\n\tAND ({clause})")),
	}

	sql.push_str(&format!("\nORDER BY {id}\nLIMIT $1"));

	sql
}

/// Resolves candidate rows in id order. `LIMIT NULL` selects everything.
pub async fn select_candidates(
	db: &Db,
	layout: &TableLayout,
	selection: &Selection,
	max_records: Option<u64>,
) -> Result<Vec<GarmentRecord>> {
	let limit = max_records
		.map(|max| {
			i64::try_from(max).map_err(|_| {
				Error::InvalidArgument(format!("max_records {max} exceeds supported range."))
			})
		})
		.transpose()?;
	let sql = render_select(layout, selection);
	let rows = sqlx::query_as::<_, GarmentRecord>(&sql).bind(limit).fetch_all(&db.pool).await?;

	Ok(rows)
}

/// Applies one batch atomically. Returns, per update, whether the row changed.
///
/// Writing a row's current values back is a no-op and reports `false`. A missing row aborts
/// the whole batch.
pub async fn apply_updates(
	db: &Db,
	layout: &TableLayout,
	updates: &[RecordUpdate],
) -> Result<Vec<bool>> {
	let TableLayout { table, id, title, description, .. } = layout;
	let update_sql = format!(
		"\
UPDATE {table}
SET {title} = $1, {description} = $2
WHERE {id}::text = $3
	AND ({title} IS DISTINCT FROM $1 OR {description} IS DISTINCT FROM $2)"
	);
	let exists_sql = format!("SELECT count(*) FROM {table} WHERE {id}::text = $1");
	let mut tx = db.pool.begin().await?;
	let mut changed = Vec::with_capacity(updates.len());

	for update in updates {
		let result = sqlx::query(&update_sql)
			.bind(&update.title)
			.bind(&update.description)
			.bind(&update.id)
			.execute(&mut *tx)
			.await?;

		if result.rows_affected() > 0 {
			changed.push(true);

			continue;
		}

		let count: i64 =
			sqlx::query_scalar(&exists_sql).bind(&update.id).fetch_one(&mut *tx).await?;

		if count == 0 {
			return Err(Error::NotFound(format!("Row {} vanished from {table}.", update.id)));
		}

		changed.push(false);
	}

	tx.commit().await?;

	Ok(changed)
}

pub async fn table_columns(db: &Db, table: &str) -> Result<Vec<ColumnInfo>> {
	let rows = sqlx::query(
		"\
SELECT column_name::text AS name, data_type::text AS data_type, is_nullable::text AS is_nullable
FROM information_schema.columns
WHERE table_schema = current_schema() AND table_name = $1
ORDER BY ordinal_position",
	)
	.bind(table)
	.fetch_all(&db.pool)
	.await?;
	let mut columns = Vec::with_capacity(rows.len());

	for row in rows {
		let nullable: String = row.try_get("is_nullable")?;

		columns.push(ColumnInfo {
			name: row.try_get("name")?,
			data_type: row.try_get("data_type")?,
			nullable: nullable.eq_ignore_ascii_case("yes"),
		});
	}

	Ok(columns)
}

/// Returns the configured columns that the table does not have.
pub async fn missing_columns(db: &Db, layout: &TableLayout) -> Result<Vec<String>> {
	let columns = table_columns(db, layout.table.as_str()).await?;

	if columns.is_empty() {
		return Err(Error::NotFound(format!("Table {} does not exist.", layout.table)));
	}

	Ok(layout
		.columns()
		.into_iter()
		.filter(|wanted| !columns.iter().any(|column| column.name == wanted.as_str()))
		.map(|wanted| wanted.as_str().to_string())
		.collect())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn layout() -> TableLayout {
		TableLayout::from_config(&drape_config::Table {
			name: "products".to_string(),
			id_column: "id".to_string(),
			image_column: "image_url".to_string(),
			title_column: "garment_title".to_string(),
			description_column: "garment_description".to_string(),
		})
		.expect("layout")
	}

	#[test]
	fn select_orders_by_id_and_skips_blank_urls() {
		let sql = render_select(&layout(), &Selection::All);

		assert!(sql.contains("FROM \"products\""));
		assert!(sql.contains("btrim(\"image_url\"::text) <> ''"));
		assert!(sql.ends_with("ORDER BY \"id\"\nLIMIT $1"));
	}

	#[test]
	fn where_clause_is_parenthesized() {
		let sql = render_select(&layout(), &Selection::Where("a = 1 OR b = 2".to_string()));

		assert!(sql.contains("AND (a = 1 OR b = 2)"));
	}

	#[test]
	fn missing_narrative_checks_both_columns() {
		let sql = render_select(&layout(), &Selection::MissingNarrative);

		assert!(sql.contains("coalesce(\"garment_title\"::text, '')"));
		assert!(sql.contains("coalesce(\"garment_description\"::text, '')"));
	}

	#[test]
	fn selection_from_config_enforces_clause_rules() {
		assert_eq!(
			Selection::from_config(SelectionMode::MissingNarrative, None).expect("selection"),
			Selection::MissingNarrative
		);
		assert_eq!(
			Selection::from_config(SelectionMode::Where, Some("id > 3")).expect("selection"),
			Selection::Where("id > 3".to_string())
		);
		assert!(Selection::from_config(SelectionMode::Where, None).is_err());
		assert!(Selection::from_config(SelectionMode::Where, Some("1=1; DROP")).is_err());
	}
}
