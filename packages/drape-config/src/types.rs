use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub table: Table,
	pub providers: Providers,
	#[serde(default)]
	pub fetch: Fetch,
	pub reference: Reference,
	#[serde(default)]
	pub classifier: Classifier,
	#[serde(default)]
	pub batch: Batch,
	#[serde(default)]
	pub backup: Backup,
	#[serde(default)]
	pub audit: Audit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

/// Target table and the columns the pipeline reads and writes.
#[derive(Debug, Clone, Deserialize)]
pub struct Table {
	pub name: String,
	#[serde(default = "default_id_column")]
	pub id_column: String,
	#[serde(default = "default_image_column")]
	pub image_column: String,
	#[serde(default = "default_title_column")]
	pub title_column: String,
	#[serde(default = "default_description_column")]
	pub description_column: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Fetch {
	pub timeout_ms: u64,
	pub max_bytes: u64,
	/// Total attempts per record, including the first one.
	pub attempts: u32,
	pub user_agent: String,
}
impl Default for Fetch {
	fn default() -> Self {
		Self {
			timeout_ms: 30_000,
			max_bytes: 20 * 1_024 * 1_024,
			attempts: 1,
			user_agent: concat!("drape/", env!("CARGO_PKG_VERSION")).to_string(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reference {
	pub corpus_dir: PathBuf,
	#[serde(default = "default_extensions")]
	pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Classifier {
	pub threshold: f32,
	pub top_k: u32,
}
impl Default for Classifier {
	fn default() -> Self {
		Self { threshold: 0.15, top_k: 3 }
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
	All,
	MissingNarrative,
	Where,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Batch {
	pub size: u32,
	pub max_records: Option<u64>,
	pub selection: SelectionMode,
	pub where_clause: Option<String>,
	/// Skip rows that already carry a non-blank title and description.
	pub preserve_existing: bool,
}
impl Default for Batch {
	fn default() -> Self {
		Self {
			size: 10,
			max_records: None,
			selection: SelectionMode::All,
			where_clause: None,
			preserve_existing: false,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Backup {
	pub enabled: bool,
}
impl Default for Backup {
	fn default() -> Self {
		Self { enabled: true }
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Audit {
	pub dir: Option<PathBuf>,
}

fn default_id_column() -> String {
	"id".to_string()
}

fn default_image_column() -> String {
	"image_url".to_string()
}

fn default_title_column() -> String {
	"garment_title".to_string()
}

fn default_description_column() -> String {
	"garment_description".to_string()
}

fn default_extensions() -> Vec<String> {
	vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()]
}
