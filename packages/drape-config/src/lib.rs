mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Audit, Backup, Batch, Classifier, Config, EmbeddingProviderConfig, Fetch, Postgres, Providers,
	Reference, SelectionMode, Service, Storage, Table,
};

use std::{fs, path::Path, sync::LazyLock};

use regex::Regex;

/// Postgres truncates identifiers longer than this many bytes.
pub const MAX_IDENTIFIER_BYTES: usize = 63;
/// Length of `_backup_YYYYMMDD_HHMMSS`, appended to the table name for snapshots.
pub const SNAPSHOT_SUFFIX_BYTES: usize = 23;
pub const MAX_FETCH_ATTEMPTS: u32 = 5;
pub const MAX_TOP_K: u32 = 3;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	parse(&raw).map_err(|err| match err {
		Error::ParseConfig { source, .. } =>
			Error::ParseConfig { path: path.to_path_buf(), source },
		other => other,
	})
}

/// Parses, normalizes and validates configuration from TOML text.
pub fn parse(raw: &str) -> Result<Config> {
	let mut cfg: Config = toml::from_str(raw)
		.map_err(|err| Error::ParseConfig { path: Default::default(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}

	for (label, value) in [
		("table.name", &cfg.table.name),
		("table.id_column", &cfg.table.id_column),
		("table.image_column", &cfg.table.image_column),
		("table.title_column", &cfg.table.title_column),
		("table.description_column", &cfg.table.description_column),
	] {
		if !is_sql_identifier(value) {
			return Err(Error::Validation {
				message: format!(
					"{label} must be a plain SQL identifier of at most {MAX_IDENTIFIER_BYTES} bytes."
				),
			});
		}
	}

	if cfg.table.name.len() + SNAPSHOT_SUFFIX_BYTES > MAX_IDENTIFIER_BYTES {
		return Err(Error::Validation {
			message: format!(
				"table.name must be at most {} bytes to leave room for the snapshot suffix.",
				MAX_IDENTIFIER_BYTES - SNAPSHOT_SUFFIX_BYTES
			),
		});
	}

	let columns = [
		&cfg.table.id_column,
		&cfg.table.image_column,
		&cfg.table.title_column,
		&cfg.table.description_column,
	];

	for (idx, column) in columns.iter().enumerate() {
		if columns[idx + 1..].iter().any(|other| other.eq_ignore_ascii_case(column)) {
			return Err(Error::Validation {
				message: format!("table column {column:?} is configured more than once."),
			});
		}
	}

	let embedding = &cfg.providers.embedding;

	if embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if embedding.api_base.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.embedding.api_base must be non-empty.".to_string(),
		});
	}
	if embedding.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.fetch.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "fetch.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.fetch.max_bytes == 0 {
		return Err(Error::Validation {
			message: "fetch.max_bytes must be greater than zero.".to_string(),
		});
	}
	if !(1..=MAX_FETCH_ATTEMPTS).contains(&cfg.fetch.attempts) {
		return Err(Error::Validation {
			message: format!("fetch.attempts must be in the range 1-{MAX_FETCH_ATTEMPTS}."),
		});
	}
	if cfg.reference.corpus_dir.as_os_str().is_empty() {
		return Err(Error::Validation {
			message: "reference.corpus_dir must be non-empty.".to_string(),
		});
	}
	if cfg.reference.extensions.is_empty() {
		return Err(Error::Validation {
			message: "reference.extensions must be non-empty.".to_string(),
		});
	}
	if !cfg.classifier.threshold.is_finite() {
		return Err(Error::Validation {
			message: "classifier.threshold must be a finite number.".to_string(),
		});
	}
	if cfg.classifier.threshold <= 0.0 || cfg.classifier.threshold > 1.0 {
		return Err(Error::Validation {
			message: "classifier.threshold must be greater than 0.0 and at most 1.0.".to_string(),
		});
	}
	if !(1..=MAX_TOP_K).contains(&cfg.classifier.top_k) {
		return Err(Error::Validation {
			message: format!("classifier.top_k must be in the range 1-{MAX_TOP_K}."),
		});
	}
	if cfg.batch.size == 0 {
		return Err(Error::Validation {
			message: "batch.size must be greater than zero.".to_string(),
		});
	}
	if cfg.batch.max_records == Some(0) {
		return Err(Error::Validation {
			message: "batch.max_records must be greater than zero when set.".to_string(),
		});
	}

	validate_selection(cfg.batch.selection, cfg.batch.where_clause.as_deref())?;

	Ok(())
}

/// Checks that a selection mode and its optional predicate agree.
pub fn validate_selection(mode: SelectionMode, where_clause: Option<&str>) -> Result<()> {
	match (mode, where_clause) {
		(SelectionMode::Where, None) => Err(Error::Validation {
			message: "batch.where_clause must be set when batch.selection is where.".to_string(),
		}),
		(SelectionMode::Where, Some(clause)) if clause.contains(';') => Err(Error::Validation {
			message: "batch.where_clause must be a single predicate without ';'.".to_string(),
		}),
		(SelectionMode::All | SelectionMode::MissingNarrative, Some(_)) => Err(Error::Validation {
			message: "batch.where_clause is only allowed when batch.selection is where."
				.to_string(),
		}),
		_ => Ok(()),
	}
}

static SQL_IDENTIFIER: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok());

pub fn is_sql_identifier(value: &str) -> bool {
	value.len() <= MAX_IDENTIFIER_BYTES
		&& SQL_IDENTIFIER.as_ref().map(|re| re.is_match(value)).unwrap_or(false)
}

fn normalize(cfg: &mut Config) {
	if cfg.batch.where_clause.as_deref().map(|clause| clause.trim().is_empty()).unwrap_or(false) {
		cfg.batch.where_clause = None;
	}
	if let Some(clause) = cfg.batch.where_clause.as_mut() {
		*clause = clause.trim().to_string();
	}
	if cfg.audit.dir.as_ref().map(|dir| dir.as_os_str().is_empty()).unwrap_or(false) {
		cfg.audit.dir = None;
	}

	for extension in &mut cfg.reference.extensions {
		*extension = extension.trim().trim_start_matches('.').to_ascii_lowercase();
	}

	cfg.reference.extensions.retain(|extension| !extension.is_empty());
}
