use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Args as ClapArgs, Parser, Subcommand};
use color_eyre::eyre;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use drape_config::{Config, SelectionMode};
use drape_domain::classifier::Classifier;
use drape_service::{
	CancelToken, Embedder, Pipeline, Ports, RunReport, RunSettings, audit::AuditWriter, check,
	corpus, evaluate, http, postgres::PgStore,
};

#[derive(Debug, Parser)]
#[command(
	version = drape_cli::VERSION,
	rename_all = "kebab",
	styles = drape_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Classify selected rows and write titles and descriptions.
	Run(RunArgs),
	/// Report the server version and the target table layout.
	Check,
	/// Measure accuracy against a labeled image directory.
	Evaluate {
		#[arg(long, short = 'd', value_name = "DIR")]
		dir: PathBuf,
	},
	/// Manage backup snapshots of the target table.
	Snapshot {
		#[command(subcommand)]
		action: SnapshotCommand,
	},
}

#[derive(Debug, Default, ClapArgs)]
pub struct RunArgs {
	#[arg(long, value_name = "N")]
	pub max_records: Option<u64>,
	#[arg(long, value_name = "N")]
	pub batch_size: Option<u32>,
	/// SQL predicate selecting rows. Implies `selection = "where"`.
	#[arg(long = "where", value_name = "SQL")]
	pub where_clause: Option<String>,
	#[arg(long)]
	pub no_backup: bool,
}

#[derive(Debug, Subcommand)]
pub enum SnapshotCommand {
	Create,
	List {
		/// Include snapshots of every table, not just the configured one.
		#[arg(long)]
		all: bool,
	},
	/// Replace the table's rows with the snapshot's rows.
	Restore {
		name: String,
		#[arg(long)]
		yes: bool,
	},
	Drop {
		name: String,
		#[arg(long)]
		yes: bool,
	},
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let mut config = drape_config::load(&args.config)?;

	if let Command::Run(run_args) = &args.command {
		apply_overrides(&mut config, run_args)?;
	}

	init_tracing(&config)?;

	match args.command {
		Command::Run(_) => run_pipeline(config).await,
		Command::Check => run_check(&config).await,
		Command::Evaluate { dir } => run_evaluate(&config, dir).await,
		Command::Snapshot { action } => run_snapshot(&config, action).await,
	}
}

/// Applies `run` flags on top of the file and validates the result again.
pub fn apply_overrides(config: &mut Config, args: &RunArgs) -> color_eyre::Result<()> {
	if let Some(max_records) = args.max_records {
		config.batch.max_records = Some(max_records);
	}
	if let Some(batch_size) = args.batch_size {
		config.batch.size = batch_size;
	}
	if let Some(clause) = &args.where_clause {
		config.batch.selection = SelectionMode::Where;
		config.batch.where_clause = Some(clause.trim().to_string());
	}
	if args.no_backup {
		config.backup.enabled = false;
	}

	drape_config::validate(config)?;

	Ok(())
}

fn init_tracing(config: &Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	Ok(())
}

async fn run_pipeline(config: Config) -> color_eyre::Result<()> {
	let store = Arc::new(PgStore::connect(&config).await?);
	let (fetcher, embedder) = http::build_clients(&config)?;
	let embedder: Arc<dyn Embedder> = Arc::new(embedder);
	let reference = corpus::load_reference_store(
		&config.reference,
		embedder.as_ref(),
		Duration::from_millis(config.providers.embedding.timeout_ms),
	)
	.await?;
	let classifier = Classifier::new(
		Arc::new(reference),
		config.classifier.threshold,
		config.classifier.top_k as usize,
	);
	let ports = Ports::from_store(store, Arc::new(fetcher), embedder);
	let mut pipeline = Pipeline::new(ports, classifier, RunSettings::from_config(&config)?);
	let audit = config.audit.dir.as_ref().map(AuditWriter::new);

	if let Some(audit) = &audit {
		pipeline = pipeline.with_audit(audit.clone());
	}

	let cancel = CancelToken::new();
	let signal = cancel.clone();

	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			tracing::warn!("Interrupt received. Stopping after the current batch.");

			signal.cancel();
		}
	});

	let report = pipeline.run(&cancel).await?;

	println!("{}", serde_json::to_string_pretty(&run_summary(&report, audit.as_ref()))?);

	if report.failed > 0 {
		return Err(eyre::eyre!(
			"{} of {} records failed. See the run report for causes.",
			report.failed,
			report.total
		));
	}

	Ok(())
}

fn run_summary(report: &RunReport, audit: Option<&AuditWriter>) -> serde_json::Value {
	json!({
		"run_id": report.run_id,
		"table": report.table,
		"selection": report.selection,
		"total": report.total,
		"attempted": report.attempted,
		"succeeded": report.succeeded,
		"failed": report.failed,
		"skipped": report.skipped,
		"aborted": report.aborted,
		"snapshot": report.snapshot.as_ref().map(|s| s.snapshot_table.as_str()),
		"audit": audit.map(|writer| writer.path_for(report).display().to_string()),
	})
}

async fn run_check(config: &Config) -> color_eyre::Result<()> {
	let store = PgStore::connect(config).await?;
	let report = check::check(&store).await?;

	println!("Server: {}", report.server_version);
	println!("Table: {}", report.table);

	for column in &report.columns {
		let nullable = if column.nullable { "null" } else { "not null" };

		println!("  {:<32} {:<24} {nullable}", column.name, column.data_type);
	}

	if report.columns.is_empty() {
		return Err(eyre::eyre!("Table {} does not exist.", report.table));
	}
	if !report.missing.is_empty() {
		return Err(eyre::eyre!(
			"Table {} lacks configured columns: {}.",
			report.table,
			report.missing.join(", ")
		));
	}

	Ok(())
}

async fn run_evaluate(config: &Config, dir: PathBuf) -> color_eyre::Result<()> {
	let (_, embedder) = http::build_clients(config)?;
	let timeout = Duration::from_millis(config.providers.embedding.timeout_ms);
	let reference = corpus::load_reference_store(&config.reference, &embedder, timeout).await?;
	let classifier = Classifier::new(
		Arc::new(reference),
		config.classifier.threshold,
		config.classifier.top_k as usize,
	);
	let report = evaluate::evaluate(
		&dir,
		&config.reference.extensions,
		&classifier,
		&embedder,
		timeout,
	)
	.await?;

	println!("{}", serde_json::to_string_pretty(&report)?);

	Ok(())
}

async fn run_snapshot(config: &Config, action: SnapshotCommand) -> color_eyre::Result<()> {
	let store = PgStore::connect(config).await?;

	match action {
		SnapshotCommand::Create => {
			let snapshot = drape_service::BackupSink::snapshot(&store, &config.table.name).await?;

			println!("{}", serde_json::to_string_pretty(&snapshot)?);
		},
		SnapshotCommand::List { all } => {
			let snapshots = store.list_snapshots(all).await?;

			println!("{}", serde_json::to_string_pretty(&snapshots)?);
		},
		SnapshotCommand::Restore { name, yes } => {
			confirm(yes, "restore", &name)?;

			let restored = store.restore_snapshot(&name).await?;

			println!("Restored {restored} rows from {name}.");
		},
		SnapshotCommand::Drop { name, yes } => {
			confirm(yes, "drop", &name)?;
			store.drop_snapshot(&name).await?;

			println!("Dropped {name}.");
		},
	}

	Ok(())
}

fn confirm(yes: bool, action: &str, name: &str) -> color_eyre::Result<()> {
	if !yes {
		return Err(eyre::eyre!("Refusing to {action} {name} without --yes."));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	const CONFIG: &str = r#"
[service]
log_level = "info"

[storage.postgres]
dsn            = "postgres://localhost/garments"
pool_max_conns = 2

[table]
name = "products"

[providers.embedding]
api_base    = "http://127.0.0.1:8000"
api_key     = "local"
dimensions  = 512
model       = "clip"
path        = "/v1/embeddings"
provider_id = "local"
timeout_ms  = 1000

[reference]
corpus_dir = "reference_images"
"#;

	#[test]
	fn run_flags_override_the_file() {
		let mut config = drape_config::parse(CONFIG).expect("Failed to parse config.");
		let args = RunArgs {
			max_records: Some(25),
			batch_size: Some(5),
			where_clause: Some(" id > 10 ".to_string()),
			no_backup: true,
		};

		apply_overrides(&mut config, &args).expect("Overrides should validate.");

		assert_eq!(config.batch.max_records, Some(25));
		assert_eq!(config.batch.size, 5);
		assert_eq!(config.batch.selection, SelectionMode::Where);
		assert_eq!(config.batch.where_clause.as_deref(), Some("id > 10"));
		assert!(!config.backup.enabled);
	}

	#[test]
	fn invalid_overrides_are_rejected() {
		let mut config = drape_config::parse(CONFIG).expect("Failed to parse config.");

		assert!(apply_overrides(&mut config, &RunArgs { batch_size: Some(0), ..Default::default() })
			.is_err());
		assert!(
			apply_overrides(
				&mut config,
				&RunArgs { where_clause: Some("1=1; DROP TABLE products".to_string()), ..Default::default() }
			)
			.is_err()
		);
	}

	#[test]
	fn destructive_snapshot_actions_need_confirmation() {
		assert!(confirm(false, "restore", "products_backup_20240101_000000").is_err());
		assert!(confirm(true, "restore", "products_backup_20240101_000000").is_ok());
	}

	#[test]
	fn parses_snapshot_subcommands() {
		let args = Args::try_parse_from([
			"drape-worker",
			"-c",
			"drape.toml",
			"snapshot",
			"restore",
			"products_backup_20240101_000000",
			"--yes",
		])
		.expect("Failed to parse args.");

		assert!(matches!(
			args.command,
			Command::Snapshot { action: SnapshotCommand::Restore { yes: true, .. } }
		));
	}
}
