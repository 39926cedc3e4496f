use std::sync::LazyLock;

use derive_more::Deref;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

use crate::position::LineTable;
use crate::position::Point;

static DOUBLE_TAG: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"\[\[([^\[\]]+)\]\]").unwrap_or_else(|e| panic!("invalid tag pattern: {e}"))
});

static SINGLE_TAG: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"\[([^\[\]]+)\]").unwrap_or_else(|e| panic!("invalid tag pattern: {e}"))
});

/// The tag syntax used by a document. The two dialects are never mixed
/// within one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dialect {
	/// `[[name]]`, used by print and email documents.
	#[default]
	Double,
	/// `[name]`, used by SMS documents.
	Single,
}

impl Dialect {
	/// Select the dialect for a storage path. Any path segment equal to `sms`
	/// (ignoring ASCII case) selects the single-bracket dialect.
	pub fn for_path(path: &str) -> Self {
		let is_sms = path
			.split(['/', '\\'])
			.any(|segment| segment.eq_ignore_ascii_case("sms"));

		if is_sms { Self::Single } else { Self::Double }
	}

	pub fn open(self) -> &'static str {
		match self {
			Self::Double => "[[",
			Self::Single => "[",
		}
	}

	pub fn close(self) -> &'static str {
		match self {
			Self::Double => "]]",
			Self::Single => "]",
		}
	}

	/// Wrap a tag name in this dialect's brackets.
	pub fn wrap(self, name: &str) -> String {
		format!("{}{name}{}", self.open(), self.close())
	}

	pub(crate) fn pattern(self) -> &'static Regex {
		match self {
			Self::Double => &DOUBLE_TAG,
			Self::Single => &SINGLE_TAG,
		}
	}
}

impl std::fmt::Display for Dialect {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Double => write!(f, "double-bracket"),
			Self::Single => write!(f, "single-bracket"),
		}
	}
}

/// Unique tag names in order of first occurrence. The order drives the
/// default layout of editing panels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(Vec<String>);

impl TagSet {
	pub fn new() -> Self {
		Self::default()
	}

	/// Insert a name unless it is already present. Returns `true` when the
	/// name was added.
	pub fn insert(&mut self, name: impl Into<String>) -> bool {
		let name = name.into();
		if self.contains(&name) {
			return false;
		}

		self.0.push(name);
		true
	}

	pub fn contains(&self, name: &str) -> bool {
		self.0.iter().any(|existing| existing == name)
	}

	/// Append every name from `other` that is not already present.
	pub fn merge(&mut self, other: &TagSet) {
		for name in &other.0 {
			self.insert(name.as_str());
		}
	}

	pub fn into_vec(self) -> Vec<String> {
		self.0
	}
}

impl FromIterator<String> for TagSet {
	fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
		let mut set = TagSet::new();
		for name in iter {
			set.insert(name);
		}
		set
	}
}

impl<'a> IntoIterator for &'a TagSet {
	type IntoIter = std::slice::Iter<'a, String>;
	type Item = &'a String;

	fn into_iter(self) -> Self::IntoIter {
		self.0.iter()
	}
}

/// Malformed tag syntax found while scanning. Malformed text is never treated
/// as a tag; these diagnostics only describe what was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum TagDiagnostic {
	/// An opening bracket sequence with no matching close.
	UnterminatedTag { point: Point },
	/// A `]]` that does not close any tag.
	UnmatchedClose { point: Point },
}

impl TagDiagnostic {
	pub fn point(&self) -> Point {
		match self {
			Self::UnterminatedTag { point } | Self::UnmatchedClose { point } => *point,
		}
	}

	/// Human-readable message for this diagnostic.
	pub fn message(&self) -> String {
		match self {
			Self::UnterminatedTag { point } => format!("unterminated tag at {point}"),
			Self::UnmatchedClose { point } => format!("unmatched tag close at {point}"),
		}
	}
}

/// Extract the unique tag names from `markup` using the grammar of `dialect`.
///
/// A single-bracket scan never attempts the double-bracket grammar. Applied to
/// `[[not.a.tag]]` it matches the innermost `[not.a.tag]`, so the discovered
/// name is `not.a.tag` and the outer brackets stay literal text.
pub fn scan(markup: &str, dialect: Dialect) -> TagSet {
	dialect
		.pattern()
		.captures_iter(markup)
		.filter_map(|captures| captures.get(1))
		.map(|name| name.as_str().to_string())
		.collect()
}

/// Scan several markup parts (for example header, body and footer) and merge
/// the results in part order.
pub fn scan_all<S: AsRef<str>>(parts: &[S], dialect: Dialect) -> TagSet {
	let mut tags = TagSet::new();
	for part in parts {
		tags.merge(&scan(part.as_ref(), dialect));
	}
	tags
}

/// Like [`scan`], but also reports malformed tag syntax.
///
/// Matched tags are masked out first. In the double dialect every remaining
/// `[[` is unterminated and every remaining `]]` is unmatched. In the single
/// dialect a remaining `[` is unterminated when no `]` follows it.
pub fn scan_with_diagnostics(markup: &str, dialect: Dialect) -> (TagSet, Vec<TagDiagnostic>) {
	let tags = scan(markup, dialect);
	let masked = mask_tags(markup, dialect);
	let lines = LineTable::new(markup);
	let mut diagnostics = Vec::new();

	match dialect {
		Dialect::Double => {
			for (offset, _) in masked.match_indices("[[") {
				diagnostics.push(TagDiagnostic::UnterminatedTag {
					point: lines.point(offset),
				});
			}
			for (offset, _) in masked.match_indices("]]") {
				diagnostics.push(TagDiagnostic::UnmatchedClose {
					point: lines.point(offset),
				});
			}
			diagnostics.sort_by_key(|diagnostic| diagnostic.point().offset);
		}
		Dialect::Single => {
			let last_close = masked.rfind(']');
			for (offset, _) in masked.match_indices('[') {
				if last_close.is_none_or(|close| close < offset) {
					diagnostics.push(TagDiagnostic::UnterminatedTag {
						point: lines.point(offset),
					});
				}
			}
		}
	}

	(tags, diagnostics)
}

/// Replace every matched tag with spaces of the same byte length so offsets
/// in the masked text line up with the original.
fn mask_tags(markup: &str, dialect: Dialect) -> String {
	let mut masked = String::with_capacity(markup.len());
	let mut last = 0;

	for found in dialect.pattern().find_iter(markup) {
		masked.push_str(&markup[last..found.start()]);
		masked.extend(std::iter::repeat_n(' ', found.len()));
		last = found.end();
	}

	masked.push_str(&markup[last..]);
	masked
}
