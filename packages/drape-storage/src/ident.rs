use std::fmt;

use crate::{Error, Result};

/// A validated SQL identifier, rendered double-quoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident(String);
impl Ident {
	pub fn new(raw: &str) -> Result<Self> {
		if !drape_config::is_sql_identifier(raw) {
			return Err(Error::InvalidArgument(format!("{raw:?} is not a plain SQL identifier.")));
		}

		Ok(Self(raw.to_string()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl fmt::Display for Ident {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "\"{}\"", self.0)
	}
}

/// Target table and column identifiers.
#[derive(Debug, Clone)]
pub struct TableLayout {
	pub table: Ident,
	pub id: Ident,
	pub image: Ident,
	pub title: Ident,
	pub description: Ident,
}
impl TableLayout {
	pub fn from_config(cfg: &drape_config::Table) -> Result<Self> {
		Ok(Self {
			table: Ident::new(&cfg.name)?,
			id: Ident::new(&cfg.id_column)?,
			image: Ident::new(&cfg.image_column)?,
			title: Ident::new(&cfg.title_column)?,
			description: Ident::new(&cfg.description_column)?,
		})
	}

	pub fn columns(&self) -> [&Ident; 4] {
		[&self.id, &self.image, &self.title, &self.description]
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn quotes_valid_identifiers() {
		assert_eq!(Ident::new("garment_title").expect("ident").to_string(), "\"garment_title\"");
	}

	#[test]
	fn rejects_injection_attempts() {
		assert!(Ident::new("products\"; DROP TABLE x; --").is_err());
		assert!(Ident::new("a b").is_err());
	}
}
