use serde::Deserialize;
use serde::Serialize;

use crate::BrevmalError;
use crate::BrevmalResult;
use crate::render::Margins;
use crate::store::DocumentStore;
use crate::tags::Dialect;
use crate::version;
use crate::version::Lineage;
use crate::version::VersionedName;

/// A validated, store-relative document path such as
/// `salg/kontrakt.v2.html`.
///
/// Paths use `/` separators, are never absolute and never contain `.` or `..`
/// segments. Backslashes are normalized to `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentPath(String);

impl DocumentPath {
	pub fn new(path: impl AsRef<str>) -> BrevmalResult<Self> {
		let raw = path.as_ref();
		let normalized = raw.replace('\\', "/");
		let normalized = normalized.strip_prefix("./").unwrap_or(&normalized);

		let is_absolute = normalized.starts_with('/')
			|| normalized
				.split('/')
				.next()
				.is_some_and(|first| first.len() == 2 && first.ends_with(':'));
		let has_bad_segment = normalized
			.split('/')
			.any(|segment| segment.is_empty() || segment == "." || segment == "..");

		if is_absolute || has_bad_segment {
			return Err(BrevmalError::InvalidDocumentPath(raw.to_string()));
		}

		Ok(Self(normalized.to_string()))
	}

	/// Build `<category>/<file_name>`.
	pub fn join(category: &str, file_name: &str) -> BrevmalResult<Self> {
		if category.is_empty() {
			Self::new(file_name)
		} else {
			Self::new(format!("{category}/{file_name}"))
		}
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// The leading path segment, or `None` for a document at the store root.
	pub fn category(&self) -> Option<&str> {
		self.0.split_once('/').map(|(category, _)| category)
	}

	/// The final path segment.
	pub fn file_name(&self) -> &str {
		self.0.rsplit('/').next().unwrap_or(&self.0)
	}

	/// The directory part of the path, without a trailing `/`.
	pub fn parent(&self) -> Option<&str> {
		self.0.rsplit_once('/').map(|(parent, _)| parent)
	}

	pub fn dialect(&self) -> Dialect {
		Dialect::for_path(&self.0)
	}

	/// The full path decoded by the version codec. The base keeps its
	/// directory prefix so siblings share one base.
	pub fn versioned_name(&self) -> VersionedName {
		version::parse(&self.0)
	}

	/// The base name without directory, version suffix or extension.
	pub fn base_name(&self) -> String {
		version::parse(self.file_name()).base
	}

	pub fn version(&self) -> u32 {
		self.versioned_name().version
	}
}

impl std::fmt::Display for DocumentPath {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

impl TryFrom<String> for DocumentPath {
	type Error = BrevmalError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}

impl From<DocumentPath> for String {
	fn from(value: DocumentPath) -> Self {
		value.0
	}
}

/// Settings persisted alongside a document's content.
///
/// ```json
/// {
///   "subject": "Kontrakt for [[eiendom.adresse]]",
///   "margins": { "top": "25mm", "right": "15mm", "bottom": "20mm", "left": "15mm" },
///   "header": "brevhode",
///   "footer": "bunntekst",
///   "style": "standard"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
	/// Subject line template for email targets. May contain tags.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub subject: Option<String>,
	/// Page margins for print. Falls back to the configured default.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub margins: Option<Margins>,
	/// Name of the header fragment.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub header: Option<String>,
	/// Name of the footer fragment.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub footer: Option<String>,
	/// Identifier of the selected shared stylesheet.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub style: Option<String>,
	/// Free-form workflow status reported by listings.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<String>,
}

impl DocumentMetadata {
	pub fn is_empty(&self) -> bool {
		*self == Self::default()
	}
}

/// Content and metadata as held by a [`DocumentStore`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredDocument {
	pub content: String,
	pub metadata: DocumentMetadata,
}

impl StoredDocument {
	pub fn new(content: impl Into<String>) -> Self {
		Self {
			content: content.into(),
			metadata: DocumentMetadata::default(),
		}
	}

	#[must_use]
	pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
		self.metadata = metadata;
		self
	}
}

/// A document read from a store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
	pub path: DocumentPath,
	pub content: String,
	pub metadata: DocumentMetadata,
}

impl Document {
	pub fn category(&self) -> Option<&str> {
		self.path.category()
	}

	pub fn base_name(&self) -> String {
		self.path.base_name()
	}

	pub fn version(&self) -> u32 {
		self.path.version()
	}

	pub fn dialect(&self) -> Dialect {
		self.path.dialect()
	}
}

/// How [`DocumentLibrary::save`] treats the existing lineage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveMode {
	/// Write over the given path.
	#[default]
	Overwrite,
	/// Mint a new version one past the highest existing version.
	NewVersion,
}

/// Document lifecycle operations on top of a [`DocumentStore`].
pub struct DocumentLibrary<'a> {
	store: &'a dyn DocumentStore,
}

impl<'a> DocumentLibrary<'a> {
	pub fn new(store: &'a dyn DocumentStore) -> Self {
		Self { store }
	}

	pub fn open(&self, path: &DocumentPath) -> BrevmalResult<Document> {
		let stored = self.store.read(path)?;
		Ok(Document {
			path: path.clone(),
			content: stored.content,
			metadata: stored.metadata,
		})
	}

	/// Create an empty document `<category>/<base>.html`. Fails when any
	/// version of that base already exists.
	pub fn create(&self, category: &str, base: &str) -> BrevmalResult<Document> {
		self.write_new(category, base, StoredDocument::default())
	}

	/// Copy the content and metadata of `source` into a new document
	/// `<category>/<base>.html`.
	pub fn duplicate(
		&self,
		source: &DocumentPath,
		category: &str,
		base: &str,
	) -> BrevmalResult<Document> {
		let stored = self.store.read(source)?;
		self.write_new(category, base, stored)
	}

	fn write_new(
		&self,
		category: &str,
		base: &str,
		stored: StoredDocument,
	) -> BrevmalResult<Document> {
		let path = DocumentPath::join(category, &version::canonical(base))?;
		let lineage = self.lineage(&path)?;
		if let Some(existing) = lineage.current() {
			return Err(BrevmalError::DocumentExists(existing.path.clone()));
		}

		self.store.write(&path, &stored)?;
		tracing::debug!(path = %path, "created document");

		Ok(Document {
			path,
			content: stored.content,
			metadata: stored.metadata,
		})
	}

	/// Save `content` and `metadata`, returning the path written.
	///
	/// [`SaveMode::NewVersion`] never reuses a number: the new version is one
	/// past the highest version present in the store.
	pub fn save(
		&self,
		path: &DocumentPath,
		content: &str,
		metadata: &DocumentMetadata,
		mode: SaveMode,
	) -> BrevmalResult<DocumentPath> {
		let target = match mode {
			SaveMode::Overwrite => path.clone(),
			SaveMode::NewVersion => {
				let lineage = self.lineage(path)?;
				let version = lineage
					.next_free_version()
					.max(path.version().saturating_add(1));
				DocumentPath::new(version::format(lineage.base(), version))?
			}
		};

		let stored = StoredDocument {
			content: content.to_string(),
			metadata: metadata.clone(),
		};
		self.store.write(&target, &stored)?;
		tracing::debug!(path = %target, ?mode, "saved document");

		Ok(target)
	}

	pub fn delete(&self, path: &DocumentPath) -> BrevmalResult<()> {
		self.store.delete(path)?;
		tracing::debug!(path = %path, "deleted document");
		Ok(())
	}

	/// Every stored version sharing the base of `path`.
	pub fn lineage(&self, path: &DocumentPath) -> BrevmalResult<Lineage> {
		let base = path.versioned_name().base;
		let entries = self.store.list()?;
		Ok(Lineage::from_paths(
			&base,
			entries.iter().map(|entry| entry.path.as_str()),
		))
	}

	/// Open the highest version of the lineage `path` belongs to.
	pub fn current(&self, path: &DocumentPath) -> BrevmalResult<Document> {
		let lineage = self.lineage(path)?;
		let Some(current) = lineage.current() else {
			return Err(BrevmalError::DocumentNotFound(path.to_string()));
		};

		self.open(&DocumentPath::new(&current.path)?)
	}
}
