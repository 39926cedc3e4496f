use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use globset::Glob;
use globset::GlobSet;
use globset::GlobSetBuilder;
use ignore::gitignore::Gitignore;
use ignore::gitignore::GitignoreBuilder;
use serde::Deserialize;
use serde::Serialize;

use crate::BrevmalError;
use crate::BrevmalResult;
use crate::config::DEFAULT_MAX_FILE_SIZE;
use crate::document::DocumentMetadata;
use crate::document::DocumentPath;
use crate::document::StoredDocument;

/// Suffix appended to a document's filename to locate its metadata sidecar.
pub const METADATA_SUFFIX: &str = ".meta.json";

/// Pattern matched against store-relative paths by [`FsDocumentStore`].
pub const DOCUMENT_GLOB: &str = "**/*.html";

/// Whether a listed document can be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum EntryStatus {
	Ready,
	/// Listed but not readable, for example because it exceeds the size
	/// limit.
	Unreadable { reason: String },
}

/// One document reported by [`DocumentStore::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEntry {
	pub path: DocumentPath,
	#[serde(flatten)]
	pub status: EntryStatus,
}

impl DocumentEntry {
	pub fn ready(path: DocumentPath) -> Self {
		Self {
			path,
			status: EntryStatus::Ready,
		}
	}
}

/// Persistent storage for documents and their metadata.
///
/// The core never retries: a failed call is returned to the caller as is.
pub trait DocumentStore: Send + Sync {
	/// Read content and metadata. Missing documents fail with
	/// [`BrevmalError::DocumentNotFound`].
	fn read(&self, path: &DocumentPath) -> BrevmalResult<StoredDocument>;

	/// Create or replace the document at `path`.
	fn write(&self, path: &DocumentPath, document: &StoredDocument) -> BrevmalResult<()>;

	/// Remove the document at `path` together with its metadata.
	fn delete(&self, path: &DocumentPath) -> BrevmalResult<()>;

	/// Every document in the store, ordered by path.
	fn list(&self) -> BrevmalResult<Vec<DocumentEntry>>;

	fn exists(&self, path: &DocumentPath) -> BrevmalResult<bool> {
		match self.read(path) {
			Ok(_) => Ok(true),
			Err(BrevmalError::DocumentNotFound(_)) => Ok(false),
			Err(error) => Err(error),
		}
	}
}

/// Source of shared resource fragments, fetched by name.
pub trait FragmentStore: Send + Sync {
	/// Returns `Ok(None)` when no fragment has this name.
	fn read_fragment(&self, name: &str) -> BrevmalResult<Option<String>>;
}

/// A [`DocumentStore`] held in memory.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
	documents: Mutex<BTreeMap<DocumentPath, StoredDocument>>,
}

impl MemoryDocumentStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&self, path: DocumentPath, document: StoredDocument) {
		self.documents
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(path, document);
	}

	pub fn len(&self) -> usize {
		self.documents
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl DocumentStore for MemoryDocumentStore {
	fn read(&self, path: &DocumentPath) -> BrevmalResult<StoredDocument> {
		self.documents
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.get(path)
			.cloned()
			.ok_or_else(|| BrevmalError::DocumentNotFound(path.to_string()))
	}

	fn write(&self, path: &DocumentPath, document: &StoredDocument) -> BrevmalResult<()> {
		self.insert(path.clone(), document.clone());
		Ok(())
	}

	fn delete(&self, path: &DocumentPath) -> BrevmalResult<()> {
		self.documents
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.remove(path)
			.map(|_| ())
			.ok_or_else(|| BrevmalError::DocumentNotFound(path.to_string()))
	}

	fn list(&self) -> BrevmalResult<Vec<DocumentEntry>> {
		Ok(self
			.documents
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.keys()
			.cloned()
			.map(DocumentEntry::ready)
			.collect())
	}
}

/// A [`FragmentStore`] held in memory.
#[derive(Debug, Default)]
pub struct MemoryFragmentStore {
	fragments: Mutex<BTreeMap<String, String>>,
}

impl MemoryFragmentStore {
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with(self, name: impl Into<String>, content: impl Into<String>) -> Self {
		self.insert(name, content);
		self
	}

	pub fn insert(&self, name: impl Into<String>, content: impl Into<String>) {
		self.fragments
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(name.into(), content.into());
	}
}

impl FragmentStore for MemoryFragmentStore {
	fn read_fragment(&self, name: &str) -> BrevmalResult<Option<String>> {
		Ok(self
			.fragments
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.get(name)
			.cloned())
	}
}

/// A [`DocumentStore`] rooted at a directory.
///
/// Documents are the `.html` files below the root. Metadata is stored next
/// to each document in a `<file>.html.meta.json` sidecar. Hidden files and
/// directories are skipped, as is anything matched by the exclude patterns
/// (gitignore syntax).
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
	root: PathBuf,
	max_file_size: u64,
	include: GlobSet,
	exclude: Gitignore,
}

impl FsDocumentStore {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		let root = root.into();
		let mut builder = GlobSetBuilder::new();
		if let Ok(glob) = Glob::new(DOCUMENT_GLOB) {
			builder.add(glob);
		}

		Self {
			max_file_size: DEFAULT_MAX_FILE_SIZE,
			include: builder.build().unwrap_or_else(|_| GlobSet::empty()),
			exclude: Gitignore::empty(),
			root,
		}
	}

	#[must_use]
	pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
		self.max_file_size = max_file_size;
		self
	}

	/// Skip paths matched by any of the gitignore-style `patterns`.
	pub fn with_exclude(mut self, patterns: &[String]) -> BrevmalResult<Self> {
		let mut builder = GitignoreBuilder::new(&self.root);
		for pattern in patterns {
			builder.add_line(None, pattern).map_err(|e| {
				BrevmalError::ConfigParse(format!("invalid exclude pattern `{pattern}`: {e}"))
			})?;
		}
		self.exclude = builder
			.build()
			.map_err(|e| BrevmalError::ConfigParse(format!("failed to build exclude rules: {e}")))?;
		Ok(self)
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	fn file_path(&self, path: &DocumentPath) -> PathBuf {
		self.root.join(path.as_str())
	}

	fn walk(&self, dir: &Path, entries: &mut Vec<DocumentEntry>) -> BrevmalResult<()> {
		for entry in std::fs::read_dir(dir)? {
			let entry = entry?;
			let path = entry.path();

			if path
				.file_name()
				.and_then(|name| name.to_str())
				.is_some_and(|name| name.starts_with('.'))
			{
				continue;
			}

			let is_dir = path.is_dir();
			if self.exclude.matched(&path, is_dir).is_ignore() {
				continue;
			}

			if is_dir {
				self.walk(&path, entries)?;
				continue;
			}

			let key = relative_key(&self.root, &path);
			if !self.include.is_match(&key) {
				continue;
			}

			let Ok(document_path) = DocumentPath::new(&key) else {
				tracing::debug!(path = %key, "skipping file with unusable document path");
				continue;
			};

			let size = entry.metadata()?.len();
			let status = if size > self.max_file_size {
				EntryStatus::Unreadable {
					reason: BrevmalError::FileTooLarge {
						path: key,
						size,
						limit: self.max_file_size,
					}
					.to_string(),
				}
			} else {
				EntryStatus::Ready
			};

			entries.push(DocumentEntry {
				path: document_path,
				status,
			});
		}

		Ok(())
	}
}

impl DocumentStore for FsDocumentStore {
	fn read(&self, path: &DocumentPath) -> BrevmalResult<StoredDocument> {
		let file = self.file_path(path);
		if !file.is_file() {
			return Err(BrevmalError::DocumentNotFound(path.to_string()));
		}

		let size = std::fs::metadata(&file)?.len();
		if size > self.max_file_size {
			return Err(BrevmalError::FileTooLarge {
				path: path.to_string(),
				size,
				limit: self.max_file_size,
			});
		}

		let content = String::from_utf8(std::fs::read(&file)?).map_err(|_| {
			BrevmalError::InvalidEncoding {
				path: path.to_string(),
			}
		})?;

		let sidecar = sidecar_path(&file);
		let metadata = if sidecar.is_file() {
			let raw = std::fs::read_to_string(&sidecar)?;
			serde_json::from_str::<DocumentMetadata>(&raw).map_err(|e| {
				BrevmalError::MetadataParse {
					path: path.to_string(),
					reason: e.to_string(),
				}
			})?
		} else {
			DocumentMetadata::default()
		};

		Ok(StoredDocument { content, metadata })
	}

	fn write(&self, path: &DocumentPath, document: &StoredDocument) -> BrevmalResult<()> {
		let file = self.file_path(path);
		if let Some(parent) = file.parent() {
			std::fs::create_dir_all(parent)?;
		}

		write_atomic(&file, document.content.as_bytes())?;

		let sidecar = sidecar_path(&file);
		if document.metadata.is_empty() {
			if sidecar.exists() {
				std::fs::remove_file(&sidecar)?;
			}
		} else {
			let payload = serde_json::to_vec_pretty(&document.metadata).map_err(|e| {
				BrevmalError::MetadataParse {
					path: path.to_string(),
					reason: e.to_string(),
				}
			})?;
			write_atomic(&sidecar, &payload)?;
		}

		Ok(())
	}

	fn delete(&self, path: &DocumentPath) -> BrevmalResult<()> {
		let file = self.file_path(path);
		if !file.is_file() {
			return Err(BrevmalError::DocumentNotFound(path.to_string()));
		}

		std::fs::remove_file(&file)?;
		let sidecar = sidecar_path(&file);
		if sidecar.exists() {
			std::fs::remove_file(sidecar)?;
		}

		Ok(())
	}

	fn list(&self) -> BrevmalResult<Vec<DocumentEntry>> {
		let mut entries = Vec::new();
		if self.root.is_dir() {
			self.walk(&self.root, &mut entries)?;
		}
		entries.sort_by(|a, b| a.path.cmp(&b.path));
		Ok(entries)
	}
}

/// A [`FragmentStore`] reading `<dir>/<name>.html`.
#[derive(Debug, Clone)]
pub struct FsFragmentStore {
	dir: PathBuf,
}

impl FsFragmentStore {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into() }
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}
}

impl FragmentStore for FsFragmentStore {
	fn read_fragment(&self, name: &str) -> BrevmalResult<Option<String>> {
		if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
			return Err(BrevmalError::InvalidFragmentName(name.to_string()));
		}

		let file = self.dir.join(format!("{name}.html"));
		if !file.is_file() {
			return Ok(None);
		}

		let content = String::from_utf8(std::fs::read(&file)?).map_err(|_| {
			BrevmalError::InvalidEncoding {
				path: file.display().to_string(),
			}
		})?;

		Ok(Some(content))
	}
}

fn relative_key(root: &Path, file: &Path) -> String {
	file.strip_prefix(root)
		.unwrap_or(file)
		.to_string_lossy()
		.replace('\\', "/")
}

fn sidecar_path(file: &Path) -> PathBuf {
	let mut name = file.as_os_str().to_os_string();
	name.push(METADATA_SUFFIX);
	PathBuf::from(name)
}

/// Write through a temporary sibling and rename it into place so readers
/// never observe a partially written file.
fn write_atomic(path: &Path, payload: &[u8]) -> BrevmalResult<()> {
	let mut temp = path.as_os_str().to_os_string();
	temp.push(format!(
		".tmp-{}-{}",
		std::process::id(),
		SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map_or(0, |duration| duration.as_nanos())
	));
	let temp = PathBuf::from(temp);

	std::fs::write(&temp, payload)?;
	if let Err(error) = std::fs::rename(&temp, path) {
		let _ = std::fs::remove_file(&temp);
		return Err(error.into());
	}

	Ok(())
}
