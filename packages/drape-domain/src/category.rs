use serde::Serialize;

/// Coarse display labels that fine-grained reference categories collapse into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BroadCategory {
	Lehenga,
	Saree,
	Suit,
	Kurti,
	Gown,
	Choli,
	SalwarKameez,
	Traditional,
	Cape,
	Others,
}
impl BroadCategory {
	pub const ALL: [Self; 10] = [
		Self::Lehenga,
		Self::Saree,
		Self::Suit,
		Self::Kurti,
		Self::Gown,
		Self::Choli,
		Self::SalwarKameez,
		Self::Traditional,
		Self::Cape,
		Self::Others,
	];

	/// Stable identifier, also used when hashing narrative seeds.
	pub fn key(self) -> &'static str {
		match self {
			Self::Lehenga => "Lehenga",
			Self::Saree => "Saree",
			Self::Suit => "Suit",
			Self::Kurti => "Kurti",
			Self::Gown => "Gown",
			Self::Choli => "Choli",
			Self::SalwarKameez => "Salwar_Kameez",
			Self::Traditional => "Traditional",
			Self::Cape => "Cape",
			Self::Others => "Others",
		}
	}

	/// Human-readable label used in titles.
	pub fn label(self) -> &'static str {
		match self {
			Self::SalwarKameez => "Salwar Kameez",
			other => other.key(),
		}
	}

	pub fn is_garment(self) -> bool {
		!matches!(self, Self::Others)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryMapping {
	Mapped(BroadCategory),
	/// The fine category has no entry. Callers log it and fall back to `Others`.
	Gap,
}
impl CategoryMapping {
	pub fn category(self) -> BroadCategory {
		match self {
			Self::Mapped(category) => category,
			Self::Gap => BroadCategory::Others,
		}
	}

	pub fn is_gap(self) -> bool {
		matches!(self, Self::Gap)
	}
}

/// Maps a fine-grained reference category name onto its broad category.
///
/// Matching ignores surrounding whitespace and ASCII case.
pub fn map_fine_category(fine: &str) -> CategoryMapping {
	use BroadCategory::*;

	let key = fine.trim().to_ascii_lowercase();
	let category = match key.as_str() {
		"lehenga"
		| "fishtail_lehenga"
		| "a-line_lehenga"
		| "circular_lehenga"
		| "panelled_lehenga"
		| "trail_lehenga"
		| "cape_lehenga"
		| "jacket_lehenga"
		| "indo-western_lehenga"
		| "lehenga_choli"
		| "crop_top_with_lehenga"
		| "bralette_+_lehenga_set" => Lehenga,
		"saree"
		| "banarasi_saree"
		| "kanjeevaram_saree"
		| "bandhani_saree"
		| "paithani_saree"
		| "chanderi_saree"
		| "dhoti_saree"
		| "half_saree"
		| "pre-stitched_saree"
		| "saree_gown"
		| "draped_saree"
		| "saree_(generic)" => Saree,
		"suit"
		| "punjabi_suit"
		| "patiala_suit"
		| "straight_suit"
		| "churidar_suit"
		| "anarkali_suit"
		| "sharara_suit"
		| "gharara_suit"
		| "palazzo_suit"
		| "tulip_pants_suit"
		| "pant_style_suit"
		| "layered_suit"
		| "blazer_+_skirt_set"
		| "top_+_skirt_set"
		| "coord_set_(generic)"
		| "indo-western_coord_set" => Suit,
		"kurti"
		| "peplum_kurti"
		| "angrakha_kurti"
		| "longline_kurti"
		| "kaftan_kurti"
		| "a-line_kurti"
		| "cape_kurti"
		| "flared_kurti"
		| "straight_kurti" => Kurti,
		"gown"
		| "indo-western_gown"
		| "one-shoulder_gown"
		| "ruffle_gown"
		| "jacket_gown"
		| "cape_gown"
		| "ethnic_gown"
		| "draped_gown" => Gown,
		"choli" | "chaniya_choli" => Choli,
		"salwar_kameez" => SalwarKameez,
		"traditional" | "mundum_neriyathum" | "mekhela_sador" => Traditional,
		"cape" | "cape_+_dhoti_set" => Cape,
		// Non-garment reference sets are known, not gaps.
		"others" | "electronics" | "furniture" => Others,
		_ => return CategoryMapping::Gap,
	};

	CategoryMapping::Mapped(category)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn collapses_variants() {
		assert_eq!(map_fine_category("Fishtail_Lehenga"), CategoryMapping::Mapped(BroadCategory::Lehenga));
		assert_eq!(map_fine_category("Saree_Gown"), CategoryMapping::Mapped(BroadCategory::Saree));
		assert_eq!(map_fine_category(" anarkali_suit "), CategoryMapping::Mapped(BroadCategory::Suit));
		assert_eq!(map_fine_category("Chaniya_Choli"), CategoryMapping::Mapped(BroadCategory::Choli));
		assert_eq!(
			map_fine_category("Mekhela_Sador"),
			CategoryMapping::Mapped(BroadCategory::Traditional)
		);
	}

	#[test]
	fn non_garment_sets_map_to_others_without_gap() {
		assert_eq!(map_fine_category("Electronics"), CategoryMapping::Mapped(BroadCategory::Others));
		assert_eq!(map_fine_category("Others"), CategoryMapping::Mapped(BroadCategory::Others));
	}

	#[test]
	fn unknown_category_is_a_gap_defaulting_to_others() {
		let mapping = map_fine_category("Sherwani");

		assert!(mapping.is_gap());
		assert_eq!(mapping.category(), BroadCategory::Others);
	}

	#[test]
	fn labels_are_readable() {
		assert_eq!(BroadCategory::SalwarKameez.label(), "Salwar Kameez");
		assert_eq!(BroadCategory::SalwarKameez.key(), "Salwar_Kameez");
		assert!(!BroadCategory::Others.is_garment());
		assert!(BroadCategory::ALL.iter().filter(|category| category.is_garment()).count() == 9);
	}
}
