use serde::Serialize;
use unicode_segmentation::UnicodeSegmentation;

use crate::category::BroadCategory;

pub const TITLE_MAX_CHARS: usize = 150;
pub const DESCRIPTION_MAX_CHARS: usize = 200;
pub const ELLIPSIS: &str = "...";

const NEUTRAL_TITLE: &str = "Unclassified Item";
const NEUTRAL_DESCRIPTION: &str =
	"This image could not be matched to a known garment category with enough confidence.";

const SHARED_TITLES: &[&str] = &[
	"{adjective} {category}",
	"{category} - {adjective} Design",
	"{adjective} {category} Collection",
	"{category} - {adjective} Style",
	"{adjective} {category} Ensemble",
	"{category} - {adjective} Piece",
	"{adjective} {category} Attire",
	"{category} - {adjective} Look",
	"{adjective} {category} Outfit",
	"{adjective} {category} Selection",
];
const SHARED_DESCRIPTIONS: &[&str] = &[
	"A {style} {category}. {appeal}",
	"{detail} A {style} {category}.",
	"A {style} {category}. {detail}",
	"This {style} {category} stands out. {appeal}",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBucket {
	Exceptional,
	Strong,
	Moderate,
	Low,
}
impl ConfidenceBucket {
	pub fn from_confidence(confidence: f32) -> Self {
		match confidence {
			c if c >= 0.9 => Self::Exceptional,
			c if c >= 0.7 => Self::Strong,
			c if c >= 0.5 => Self::Moderate,
			_ => Self::Low,
		}
	}

	pub fn key(self) -> &'static str {
		match self {
			Self::Exceptional => "exceptional",
			Self::Strong => "strong",
			Self::Moderate => "moderate",
			Self::Low => "low",
		}
	}

	fn adjectives(self) -> &'static [&'static str] {
		match self {
			Self::Exceptional =>
				&["Exquisite", "Magnificent", "Breathtaking", "Gorgeous", "Stunning", "Regal"],
			Self::Strong =>
				&["Stylish", "Fashionable", "Chic", "Sophisticated", "Contemporary", "Graceful"],
			Self::Moderate => &["Classic", "Timeless", "Versatile", "Refined", "Traditional"],
			Self::Low => &["Unique", "Distinctive", "Notable", "Understated", "Charming"],
		}
	}

	fn styles(self) -> &'static [&'static str] {
		match self {
			Self::Exceptional => &[
				"exquisitely crafted",
				"masterfully designed",
				"luxuriously styled",
				"richly detailed",
			],
			Self::Strong => &[
				"beautifully designed",
				"elegantly crafted",
				"carefully tailored",
				"tastefully styled",
			],
			Self::Moderate =>
				&["well-crafted", "thoughtfully styled", "neatly finished", "nicely tailored"],
			Self::Low => &["simply styled", "distinctively cut", "easygoing", "understated"],
		}
	}

	fn appeals(self) -> &'static [&'static str] {
		match self {
			Self::Exceptional => &[
				"A true showpiece that celebrates rich heritage.",
				"It showcases the finest in ethnic fashion.",
				"Made for moments that deserve to be remembered.",
			],
			Self::Strong => &[
				"It balances traditional charm with modern polish.",
				"A confident pick for festive occasions.",
				"It blends cultural heritage with current style.",
			],
			Self::Moderate => &[
				"It captures the essence of traditional fashion.",
				"A dependable choice for everyday celebrations.",
				"It carries the timeless appeal of ethnic wear.",
			],
			Self::Low => &[
				"It offers a fresh take on familiar silhouettes.",
				"An easy addition to a relaxed wardrobe.",
				"It brings a quiet twist to classic fashion.",
			],
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NarrativeOutput {
	pub title: String,
	pub description: String,
}

/// Deterministic, length-bounded title and description synthesis.
#[derive(Debug, Clone, Copy)]
pub struct NarrativeGenerator {
	title_max_chars: usize,
	description_max_chars: usize,
}
impl NarrativeGenerator {
	/// Generator with custom ceilings, each capped at the store limits.
	pub fn with_limits(title_max_chars: usize, description_max_chars: usize) -> Self {
		Self {
			title_max_chars: title_max_chars.min(TITLE_MAX_CHARS),
			description_max_chars: description_max_chars.min(DESCRIPTION_MAX_CHARS),
		}
	}

	/// Builds the narrative for one record.
	///
	/// The same `(seed, category, confidence bucket)` always yields the same text, while
	/// different seeds spread across the template and vocabulary lists. `Others` yields the
	/// neutral non-garment narrative.
	pub fn generate(&self, category: BroadCategory, confidence: f32, seed: &str) -> NarrativeOutput {
		if !category.is_garment() {
			return self.neutral();
		}

		let bucket = ConfidenceBucket::from_confidence(confidence);
		let picks = Picks::new(seed, category, bucket);
		let adjective = picks.choose(0, bucket.adjectives());
		let style = picks.choose(1, bucket.styles());
		let appeal = picks.choose(2, bucket.appeals());
		let detail = picks.choose(3, details(category));
		let title_template = picks.choose(4, &title_templates(category));
		let description_template = picks.choose(5, SHARED_DESCRIPTIONS);
		let title = title_template
			.replace("{adjective}", adjective)
			.replace("{category}", category.label());
		let description = description_template
			.replace("{style}", style)
			.replace("{category}", &category.label().to_lowercase())
			.replace("{appeal}", appeal)
			.replace("{detail}", detail);

		NarrativeOutput {
			title: truncate_at_word(&title, self.title_max_chars),
			description: truncate_at_word(&description, self.description_max_chars),
		}
	}

	pub fn neutral(&self) -> NarrativeOutput {
		NarrativeOutput {
			title: truncate_at_word(NEUTRAL_TITLE, self.title_max_chars),
			description: truncate_at_word(NEUTRAL_DESCRIPTION, self.description_max_chars),
		}
	}
}
impl Default for NarrativeGenerator {
	fn default() -> Self {
		Self { title_max_chars: TITLE_MAX_CHARS, description_max_chars: DESCRIPTION_MAX_CHARS }
	}
}

struct Picks([u8; 32]);
impl Picks {
	fn new(seed: &str, category: BroadCategory, bucket: ConfidenceBucket) -> Self {
		let mut hasher = blake3::Hasher::new();

		hasher.update(seed.as_bytes());
		hasher.update(&[0]);
		hasher.update(category.key().as_bytes());
		hasher.update(&[0]);
		hasher.update(bucket.key().as_bytes());

		Self(*hasher.finalize().as_bytes())
	}

	fn choose<'a>(&self, slot: usize, items: &[&'a str]) -> &'a str {
		if items.is_empty() {
			return "";
		}

		let offset = (slot * 5) % (self.0.len() - 4);
		let mut word = [0_u8; 4];

		word.copy_from_slice(&self.0[offset..offset + 4]);

		items[u32::from_le_bytes(word) as usize % items.len()]
	}
}

fn title_templates(category: BroadCategory) -> Vec<&'static str> {
	let extra: &[&str] = match category {
		BroadCategory::Lehenga =>
			&["{adjective} Flared {category} Set", "{category} - {adjective} Festive Ensemble"],
		BroadCategory::Saree => &["{adjective} Draped {category}", "{category} - {adjective} Drape"],
		BroadCategory::Suit => &["{adjective} {category} Set", "{category} - {adjective} Three-Piece"],
		BroadCategory::Kurti => &["{adjective} Everyday {category}", "{category} - {adjective} Tunic"],
		BroadCategory::Gown => &["{adjective} Floor-Length {category}", "{category} - {adjective} Evening Look"],
		BroadCategory::Choli => &["{adjective} {category} Blouse", "{category} - {adjective} Festive Top"],
		BroadCategory::SalwarKameez =>
			&["{adjective} {category} Set", "{category} - {adjective} Classic Pairing"],
		BroadCategory::Traditional =>
			&["{adjective} Heritage Attire", "{category} - {adjective} Regional Wear"],
		BroadCategory::Cape => &["{adjective} Layered {category}", "{category} - {adjective} Overlay"],
		BroadCategory::Others => &[],
	};

	SHARED_TITLES.iter().chain(extra).copied().collect()
}

fn details(category: BroadCategory) -> &'static [&'static str] {
	match category {
		BroadCategory::Lehenga => &[
			"A full skirt paired with a fitted blouse and dupatta.",
			"Volume and embellishment built for the dance floor.",
		],
		BroadCategory::Saree => &[
			"Drapes gracefully with a flowing pallu.",
			"Six yards of fabric worn with easy elegance.",
		],
		BroadCategory::Suit => &[
			"A coordinated top and bottom with matching dupatta.",
			"Structured layers that move from day to evening.",
		],
		BroadCategory::Kurti => &[
			"A comfortable tunic that pairs with jeans or leggings.",
			"Light enough for daily wear with a festive touch.",
		],
		BroadCategory::Gown => &[
			"A floor-length silhouette with fluid movement.",
			"Evening-ready lines with an ethnic accent.",
		],
		BroadCategory::Choli => &[
			"A fitted blouse designed to pair with a flared skirt.",
			"Close tailoring with decorative detailing.",
		],
		BroadCategory::SalwarKameez => &[
			"A long tunic over relaxed trousers.",
			"An easy, coordinated set for long days.",
		],
		BroadCategory::Traditional => &[
			"Rooted in regional weaving traditions.",
			"A heritage silhouette passed down through generations.",
		],
		BroadCategory::Cape => &[
			"A layered overlay that frames the outfit.",
			"An open cape that adds drama without weight.",
		],
		BroadCategory::Others => &[],
	}
}

/// Truncates `text` to at most `max_chars` characters, cutting only at a word boundary and
/// appending [`ELLIPSIS`] within the ceiling. A single word longer than the ceiling is cut hard.
pub fn truncate_at_word(text: &str, max_chars: usize) -> String {
	let text = text.trim();

	if text.chars().count() <= max_chars {
		return text.to_string();
	}

	let suffix_chars = ELLIPSIS.chars().count();

	if max_chars <= suffix_chars {
		return text.chars().take(max_chars).collect();
	}

	let budget = max_chars - suffix_chars;
	let mut used = 0;
	let mut end = 0;

	for (idx, segment) in text.split_word_bound_indices() {
		let len = segment.chars().count();

		if used + len > budget {
			break;
		}

		used += len;

		if segment.chars().any(char::is_alphanumeric) {
			end = idx + segment.len();
		}
	}

	let head = text[..end]
		.trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':' | '-'));

	if head.is_empty() {
		let hard: String = text.chars().take(budget).collect();

		return format!("{hard}{ELLIPSIS}");
	}

	format!("{head}{ELLIPSIS}")
}
