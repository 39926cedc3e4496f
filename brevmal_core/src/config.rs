use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::BrevmalError;
use crate::BrevmalResult;
use crate::document::DocumentMetadata;
use crate::inject::MarkerPattern;
use crate::render::CacheBust;
use crate::render::DEFAULT_STYLE_BASE;
use crate::render::Margins;
use crate::render::RenderOptions;
use crate::sanitize::SanitizeOptions;
use crate::store::FsDocumentStore;
use crate::store::FsFragmentStore;
use crate::values::SampleData;

/// Default maximum size of a single document file, in bytes.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 3] =
	["brevmal.toml", ".brevmal.toml", ".config/brevmal.toml"];

/// Configuration loaded from a `brevmal.toml` file.
///
/// ```toml
/// documents = "documents"
/// fragments = "fragments"
/// sample = "sample.json"
///
/// [exclude]
/// patterns = ["drafts/", "*.bak.html"]
///
/// [render]
/// style_base = "https://cdn.example.com/styles/"
/// styles = ["base"]
/// cache_bust = false
///
/// [render.margins]
/// top = "25mm"
/// bottom = "25mm"
///
/// [sanitize]
/// workers = 4
/// strip_scripts = true
/// ```
///
/// Every key is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct BrevmalConfig {
	/// Directory holding the document store, relative to the project root.
	#[serde(default = "default_documents")]
	pub documents: PathBuf,
	/// Directory holding resource fragments, relative to the project root.
	#[serde(default = "default_fragments")]
	pub fragments: PathBuf,
	/// Sample data file used to preview documents (json, toml or yaml).
	#[serde(default)]
	pub sample: Option<PathBuf>,
	/// Documents larger than this are listed as unreadable. Defaults to
	/// 10 MB.
	#[serde(default = "default_max_file_size")]
	pub max_file_size: u64,
	/// Gitignore-style patterns excluded from the document store.
	#[serde(default)]
	pub exclude: ExcludeConfig,
	#[serde(default)]
	pub render: RenderConfig,
	#[serde(default)]
	pub sanitize: SanitizeOptions,
}

impl Default for BrevmalConfig {
	fn default() -> Self {
		Self {
			documents: default_documents(),
			fragments: default_fragments(),
			sample: None,
			max_file_size: DEFAULT_MAX_FILE_SIZE,
			exclude: ExcludeConfig::default(),
			render: RenderConfig::default(),
			sanitize: SanitizeOptions::default(),
		}
	}
}

fn default_documents() -> PathBuf {
	PathBuf::from("documents")
}

fn default_fragments() -> PathBuf {
	PathBuf::from("fragments")
}

fn default_max_file_size() -> u64 {
	DEFAULT_MAX_FILE_SIZE
}

/// Paths skipped when listing documents.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExcludeConfig {
	#[serde(default)]
	pub patterns: Vec<String>,
}

/// The `[render]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
	/// Prefix of shared stylesheet links.
	#[serde(default = "default_style_base")]
	pub style_base: String,
	/// Stylesheets linked from every non-SMS render, before the document's
	/// own style.
	#[serde(default)]
	pub styles: Vec<String>,
	/// Cache-busting token appended to stylesheet links.
	#[serde(default)]
	pub cache_bust: CacheBustSetting,
	#[serde(default)]
	pub marker: MarkerPattern,
	/// Margins used when a document does not set its own.
	#[serde(default)]
	pub margins: Margins,
}

impl Default for RenderConfig {
	fn default() -> Self {
		Self {
			style_base: default_style_base(),
			styles: Vec::new(),
			cache_bust: CacheBustSetting::default(),
			marker: MarkerPattern::default(),
			margins: Margins::default(),
		}
	}
}

/// `cache_bust` accepts `true` for a per-render timestamp, `false` for no
/// token, or a fixed string such as a release identifier.
///
/// ```toml
/// [render]
/// cache_bust = "r42"
/// ```
#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(untagged)]
pub enum CacheBustSetting {
	Enabled(bool),
	Token(String),
}

impl Default for CacheBustSetting {
	fn default() -> Self {
		Self::Enabled(false)
	}
}

impl CacheBustSetting {
	pub fn to_cache_bust(&self) -> CacheBust {
		match self {
			Self::Enabled(true) => CacheBust::Timestamp,
			Self::Enabled(false) => CacheBust::None,
			Self::Token(token) if token.is_empty() => CacheBust::None,
			Self::Token(token) => CacheBust::Fixed(token.clone()),
		}
	}
}

fn default_style_base() -> String {
	DEFAULT_STYLE_BASE.to_string()
}

impl RenderConfig {
	/// Build the render options for a document, letting its metadata
	/// override the configured margins and add its own style.
	pub fn options(&self, metadata: &DocumentMetadata) -> RenderOptions {
		let mut style_refs = self.styles.clone();
		if let Some(style) = &metadata.style {
			if !style_refs.contains(style) {
				style_refs.push(style.clone());
			}
		}

		RenderOptions {
			margins: metadata.margins.unwrap_or(self.margins),
			style_refs,
			style_base: self.style_base.clone(),
			cache_bust: self.cache_bust.to_cache_bust(),
		}
	}
}

impl BrevmalConfig {
	/// Resolve the config path from known discovery candidates.
	#[must_use]
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load the config from the first discovered config file at `root`.
	/// Returns `None` if the file does not exist.
	pub fn load(root: &Path) -> BrevmalResult<Option<BrevmalConfig>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		let content = std::fs::read_to_string(&config_path)?;
		let config = Self::parse(&content)?;
		tracing::debug!(path = %config_path.display(), "loaded config");

		Ok(Some(config))
	}

	/// Like [`BrevmalConfig::load`], falling back to the defaults.
	pub fn load_or_default(root: &Path) -> BrevmalResult<BrevmalConfig> {
		Ok(Self::load(root)?.unwrap_or_default())
	}

	pub fn parse(content: &str) -> BrevmalResult<BrevmalConfig> {
		toml::from_str(content).map_err(|e| BrevmalError::ConfigParse(e.to_string()))
	}

	/// The document store for a project rooted at `root`.
	pub fn document_store(&self, root: &Path) -> BrevmalResult<FsDocumentStore> {
		FsDocumentStore::new(root.join(&self.documents))
			.with_max_file_size(self.max_file_size)
			.with_exclude(&self.exclude.patterns)
	}

	pub fn fragment_store(&self, root: &Path) -> FsFragmentStore {
		FsFragmentStore::new(root.join(&self.fragments))
	}

	/// Load the configured sample data, or an empty table when none is set.
	pub fn load_sample(&self, root: &Path) -> BrevmalResult<SampleData> {
		match &self.sample {
			Some(path) => SampleData::load(&root.join(path)),
			None => Ok(SampleData::new()),
		}
	}
}
