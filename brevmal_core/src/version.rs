use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

/// File extension shared by every stored document.
pub const DOCUMENT_EXTENSION: &str = ".html";

static VERSIONED_NAME: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^(?s)(?P<base>.+)\.v(?P<version>[0-9]+)\.html$")
		.unwrap_or_else(|e| panic!("invalid version pattern: {e}"))
});

/// A filename decoded into its base name and version number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionedName {
	/// The name without version suffix and extension. Any directory prefix
	/// is kept.
	pub base: String,
	/// The version number, always at least 1.
	pub version: u32,
	/// Whether the version was spelled out in the filename (`.v<N>.html`)
	/// rather than implied.
	pub explicit: bool,
}

/// Decode a filename of the form `<base>.v<N>.html`.
///
/// Filenames without that suffix decode to the name minus a trailing `.html`
/// with the implicit version 1. Ambiguous names resolve the same way every
/// time: only the final `.v<N>.html` suffix counts, `v0` and numbers that do
/// not fit in a `u32` are not versions, and leading zeros are accepted.
pub fn parse(filename: &str) -> VersionedName {
	if let Some(captures) = VERSIONED_NAME.captures(filename) {
		let version = captures
			.name("version")
			.and_then(|version| version.as_str().parse::<u32>().ok())
			.filter(|version| *version >= 1);

		if let (Some(version), Some(base)) = (version, captures.name("base")) {
			if VERSIONED_NAME.is_match(base.as_str()) {
				tracing::debug!(
					filename,
					"base name carries its own version suffix, using the last one"
				);
			}

			return VersionedName {
				base: base.as_str().to_string(),
				version,
				explicit: true,
			};
		}
	}

	VersionedName {
		base: filename
			.strip_suffix(DOCUMENT_EXTENSION)
			.unwrap_or(filename)
			.to_string(),
		version: 1,
		explicit: false,
	}
}

/// Encode a base name and version as `<base>.v<N>.html`.
pub fn format(base: &str, version: u32) -> String {
	format!("{base}.v{version}{DOCUMENT_EXTENSION}")
}

/// The unversioned filename of a base, `<base>.html`. This is the implicit
/// version 1.
pub fn canonical(base: &str) -> String {
	format!("{base}{DOCUMENT_EXTENSION}")
}

/// The filename of the version after `filename`.
///
/// A versioned name increments its number; an unversioned name becomes
/// `<base>.v2.html` because the unversioned file is implicitly version 1.
pub fn next_version(filename: &str) -> String {
	let parsed = parse(filename);
	format(&parsed.base, parsed.version.saturating_add(1))
}

/// One saved revision in a [`Lineage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEntry {
	pub version: u32,
	pub path: String,
}

/// All saved revisions sharing a base name, ordered by version.
///
/// Version numbers are opaque monotonic markers: a deleted version leaves a
/// gap that is never refilled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
	base: String,
	entries: Vec<LineageEntry>,
}

impl Lineage {
	/// Collect the paths that belong to `base`. When two paths decode to the
	/// same version the first one wins.
	pub fn from_paths<I, S>(base: &str, paths: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let mut entries: Vec<LineageEntry> = Vec::new();

		for path in paths {
			let path = path.as_ref();
			let parsed = parse(path);
			if parsed.base != base || entries.iter().any(|e| e.version == parsed.version) {
				continue;
			}

			entries.push(LineageEntry {
				version: parsed.version,
				path: path.to_string(),
			});
		}

		entries.sort_by_key(|entry| entry.version);

		Self {
			base: base.to_string(),
			entries,
		}
	}

	pub fn base(&self) -> &str {
		&self.base
	}

	pub fn entries(&self) -> &[LineageEntry] {
		&self.entries
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// The highest version, shown by default.
	pub fn current(&self) -> Option<&LineageEntry> {
		self.entries.last()
	}

	pub fn get(&self, version: u32) -> Option<&LineageEntry> {
		self.entries.iter().find(|entry| entry.version == version)
	}

	/// The version number a new save would receive: one past the highest
	/// existing version, or 1 for an empty lineage.
	pub fn next_free_version(&self) -> u32 {
		self.current()
			.map_or(1, |entry| entry.version.saturating_add(1))
	}

	/// The filename a new save would receive.
	pub fn next_filename(&self) -> String {
		match self.next_free_version() {
			1 => canonical(&self.base),
			version => format(&self.base, version),
		}
	}
}
