use std::{
	fs,
	path::{Path, PathBuf},
	time::Duration,
};

use drape_domain::reference::ReferenceStore;

use crate::{Embedder, Error, Result};

/// Image files under one category directory, sorted by file name.
#[derive(Debug, Clone)]
pub struct LabeledImages {
	pub category: String,
	pub images: Vec<PathBuf>,
}

/// Lists `<root>/<category>/<image>` in name order.
///
/// Only direct subdirectories count as categories, and only files whose extension is in
/// `extensions` (compared case-insensitively) count as images.
pub fn scan(root: &Path, extensions: &[String]) -> Result<Vec<LabeledImages>> {
	let load_err = |message: String| Error::Load { message };
	let entries = fs::read_dir(root)
		.map_err(|err| load_err(format!("Failed to read corpus {}: {err}.", root.display())))?;
	let mut dirs = Vec::new();

	for entry in entries {
		let path = entry.map_err(|err| load_err(err.to_string()))?.path();

		if path.is_dir() {
			dirs.push(path);
		}
	}

	dirs.sort();

	let mut out = Vec::with_capacity(dirs.len());

	for dir in dirs {
		let Some(category) = dir.file_name().and_then(|name| name.to_str()) else {
			tracing::warn!(path = %dir.display(), "Skipping category directory with a non UTF-8 name.");

			continue;
		};
		let mut images = Vec::new();

		for entry in fs::read_dir(&dir).map_err(|err| load_err(err.to_string()))? {
			let path = entry.map_err(|err| load_err(err.to_string()))?.path();

			if path.is_file() && has_extension(&path, extensions) {
				images.push(path);
			}
		}

		images.sort();
		out.push(LabeledImages { category: category.to_string(), images });
	}

	if out.is_empty() {
		return Err(load_err(format!("Corpus {} has no category directories.", root.display())));
	}

	Ok(out)
}

/// Embeds every reference image and builds the immutable store.
///
/// Unreadable or unencodable images are skipped with a warning. A category left without any
/// usable embedding fails the load.
pub async fn load_reference_store(
	cfg: &drape_config::Reference,
	embedder: &dyn Embedder,
	timeout: Duration,
) -> Result<ReferenceStore> {
	let labeled = scan(&cfg.corpus_dir, &cfg.extensions)?;
	let mut corpus = Vec::with_capacity(labeled.len());

	for LabeledImages { category, images } in labeled {
		let mut embeddings = Vec::with_capacity(images.len());

		for path in &images {
			match embed_file(embedder, path, timeout).await {
				Ok(vec) => embeddings.push(vec),
				Err(err) => tracing::warn!(
					category = %category,
					path = %path.display(),
					error = %err,
					"Skipping reference image."
				),
			}
		}

		tracing::info!(category = %category, images = embeddings.len(), "Loaded reference category.");

		corpus.push((category, embeddings));
	}

	let store = ReferenceStore::load(corpus).map_err(|err| Error::Load { message: err.to_string() })?;

	tracing::info!(
		categories = store.categories().len(),
		embeddings = store.embedding_count(),
		dimensions = store.dimensions(),
		"Reference store ready."
	);

	Ok(store)
}

pub(crate) async fn embed_file(
	embedder: &dyn Embedder,
	path: &Path,
	timeout: Duration,
) -> Result<Vec<f32>> {
	let bytes = fs::read(path).map_err(|err| Error::Load {
		message: format!("Failed to read {}: {err}.", path.display()),
	})?;

	tokio::time::timeout(timeout, crate::embed_one(embedder, bytes)).await.map_err(|_| {
		Error::Encoding { message: format!("Embedding {} timed out.", path.display()) }
	})?
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
	path.extension()
		.and_then(|ext| ext.to_str())
		.map(|ext| extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)))
		.unwrap_or(false)
}
