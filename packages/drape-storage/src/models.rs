use time::OffsetDateTime;

/// One selectable row of the target table. Values are read as text.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct GarmentRecord {
	pub id: String,
	pub image_url: String,
	pub current_title: Option<String>,
	pub current_description: Option<String>,
}
impl GarmentRecord {
	pub fn has_narrative(&self) -> bool {
		let filled = |value: &Option<String>| {
			value.as_deref().map(|text| !text.trim().is_empty()).unwrap_or(false)
		};

		filled(&self.current_title) && filled(&self.current_description)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordUpdate {
	pub id: String,
	pub title: String,
	pub description: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SnapshotRecord {
	pub snapshot_table: String,
	pub source_table: String,
	pub row_count: i64,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
	pub name: String,
	pub data_type: String,
	pub nullable: bool,
}
