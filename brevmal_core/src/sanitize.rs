use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use regex::Captures;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

use crate::BrevmalError;
use crate::BrevmalResult;
use crate::document::DocumentPath;
use crate::document::StoredDocument;
use crate::markup::check_well_formed;
use crate::store::DocumentEntry;
use crate::store::DocumentStore;
use crate::store::EntryStatus;
use crate::tags::Dialect;
use crate::tags::scan_with_diagnostics;

static SCRIPT_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"(?is)<script\b[^>]*?(?:/>|>.*?</script\s*>)")
		.unwrap_or_else(|e| panic!("invalid script pattern: {e}"))
});

static START_TAG: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r#"(?s)<[a-zA-Z][a-zA-Z0-9:_-]*(?:[^>"']|"[^"]*"|'[^']*')*>"#)
		.unwrap_or_else(|e| panic!("invalid start tag pattern: {e}"))
});

static EVENT_HANDLER: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r#"(?i)\s+on[a-z0-9_-]+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'>]+)"#)
		.unwrap_or_else(|e| panic!("invalid event handler pattern: {e}"))
});

static JAVASCRIPT_URL: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(
		r#"(?i)(\s(?:href|src)\s*=\s*)(?:"\s*javascript:[^"]*"|'\s*javascript:[^']*'|javascript:[^\s"'>]*)"#,
	)
	.unwrap_or_else(|e| panic!("invalid url pattern: {e}"))
});

const BYTE_ORDER_MARK: char = '\u{feff}';

fn enabled() -> bool {
	true
}

/// The `[sanitize]` section of `brevmal.toml`.
///
/// Every rewrite is enabled by default. The well-formedness check always
/// runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct SanitizeOptions {
	/// Number of worker threads. Defaults to the available parallelism.
	#[serde(default)]
	pub workers: Option<usize>,
	/// Remove `<script>` elements.
	#[serde(default = "enabled")]
	pub strip_scripts: bool,
	/// Remove `on*=` event handler attributes.
	#[serde(default = "enabled")]
	pub strip_event_handlers: bool,
	/// Replace `javascript:` URLs in `href` and `src` with `#`.
	#[serde(default = "enabled")]
	pub neutralize_javascript_urls: bool,
	/// Rewrite `[[ name ]]` as `[[name]]`.
	#[serde(default = "enabled")]
	pub normalize_tag_whitespace: bool,
}

impl Default for SanitizeOptions {
	fn default() -> Self {
		Self {
			workers: None,
			strip_scripts: true,
			strip_event_handlers: true,
			neutralize_javascript_urls: true,
			normalize_tag_whitespace: true,
		}
	}
}

/// A normalized document and the changes applied to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
	pub content: String,
	pub changes: Vec<String>,
}

/// Normalize a single legacy document.
///
/// Scripts, event handlers and `javascript:` URLs are removed first. A
/// double-bracket document whose element structure is still broken fails
/// with [`BrevmalError::MalformedMarkup`]. Stray brackets are left as text
/// and noted in the changes.
pub fn sanitize_document(
	path: &DocumentPath,
	content: &str,
	options: &SanitizeOptions,
) -> BrevmalResult<Sanitized> {
	let mut changes = Vec::new();
	let dialect = path.dialect();

	let mut content = match content.strip_prefix(BYTE_ORDER_MARK) {
		Some(stripped) => {
			changes.push("removed byte order mark".to_string());
			stripped.to_string()
		}
		None => content.to_string(),
	};

	if content.contains('\r') {
		content = content.replace("\r\n", "\n").replace('\r', "\n");
		changes.push("normalized line endings".to_string());
	}

	if options.strip_scripts {
		let count = SCRIPT_ELEMENT.find_iter(&content).count();
		if count > 0 {
			content = SCRIPT_ELEMENT.replace_all(&content, "").into_owned();
			changes.push(format!("removed {count} script element(s)"));
		}
	}

	if options.strip_event_handlers || options.neutralize_javascript_urls {
		let mut handlers = 0;
		let mut urls = 0;
		content = START_TAG
			.replace_all(&content, |captures: &Captures<'_>| {
				let mut tag = captures[0].to_string();
				if options.strip_event_handlers {
					handlers += EVENT_HANDLER.find_iter(&tag).count();
					tag = EVENT_HANDLER.replace_all(&tag, "").into_owned();
				}
				if options.neutralize_javascript_urls {
					urls += JAVASCRIPT_URL.find_iter(&tag).count();
					tag = JAVASCRIPT_URL.replace_all(&tag, "${1}\"#\"").into_owned();
				}
				tag
			})
			.into_owned();

		if handlers > 0 {
			changes.push(format!("removed {handlers} event handler attribute(s)"));
		}
		if urls > 0 {
			changes.push(format!("neutralized {urls} javascript: URL(s)"));
		}
	}

	if dialect == Dialect::Double {
		let issues = check_well_formed(&content);
		if let Some(first) = issues.first() {
			let reason = match issues.len() {
				1 => first.message(),
				count => format!("{} (and {} more)", first.message(), count - 1),
			};
			return Err(BrevmalError::MalformedMarkup {
				path: path.to_string(),
				reason,
			});
		}
	}

	let (_, tag_diagnostics) = scan_with_diagnostics(&content, dialect);
	changes.extend(
		tag_diagnostics
			.iter()
			.map(|diagnostic| format!("kept {} as text", diagnostic.message())),
	);

	if options.normalize_tag_whitespace {
		let mut normalized = 0;
		content = dialect
			.pattern()
			.replace_all(&content, |captures: &Captures<'_>| {
				let inner = &captures[1];
				let trimmed = inner.trim();
				if trimmed.is_empty() || trimmed.len() == inner.len() {
					captures[0].to_string()
				} else {
					normalized += 1;
					dialect.wrap(trimmed)
				}
			})
			.into_owned();

		if normalized > 0 {
			changes.push(format!("normalized whitespace in {normalized} tag(s)"));
		}
	}

	Ok(Sanitized { content, changes })
}

/// Shared flag that stops a running batch from starting new files.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

/// Outcome for one file of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SanitizeResult {
	pub path: DocumentPath,
	pub success: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	pub changes: Vec<String>,
}

/// Aggregate outcome of a batch run. Results follow the listing order of
/// the source store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
	pub results: Vec<SanitizeResult>,
	pub succeeded: usize,
	pub failed: usize,
	/// Set when the run was cancelled. Files not yet started are missing
	/// from `results`.
	pub cancelled: bool,
	/// Human-readable summary, one line per file plus a total.
	pub log: String,
}

impl BatchReport {
	pub fn is_ok(&self) -> bool {
		self.failed == 0 && !self.cancelled
	}
}

/// Migrates every document of a source store into a destination store.
#[derive(Debug, Clone, Default)]
pub struct SanitizerBatch {
	pub options: SanitizeOptions,
	/// Sanitize and report without writing to the destination.
	pub dry_run: bool,
}

impl SanitizerBatch {
	pub fn new(options: SanitizeOptions) -> Self {
		Self {
			options,
			dry_run: false,
		}
	}

	#[must_use]
	pub fn dry_run(mut self, dry_run: bool) -> Self {
		self.dry_run = dry_run;
		self
	}

	/// Sanitize every document listed by `source` and write it to the same
	/// path in `dest`.
	///
	/// Per-file failures are recorded in the report and never abort the run.
	/// Only a failure to list the source is returned as an error.
	pub fn run(
		&self,
		source: &dyn DocumentStore,
		dest: &dyn DocumentStore,
		cancel: &CancelFlag,
	) -> BrevmalResult<BatchReport> {
		let entries = source.list()?;
		let workers = self
			.options
			.workers
			.unwrap_or_else(|| std::thread::available_parallelism().map_or(1, NonZeroUsize::get))
			.clamp(1, entries.len().max(1));
		tracing::debug!(files = entries.len(), workers, "starting sanitize batch");

		let next = AtomicUsize::new(0);
		let slots: Mutex<Vec<Option<SanitizeResult>>> = Mutex::new(vec![None; entries.len()]);

		std::thread::scope(|scope| {
			for _ in 0..workers {
				scope.spawn(|| {
					loop {
						if cancel.is_cancelled() {
							break;
						}

						let index = next.fetch_add(1, Ordering::SeqCst);
						let Some(entry) = entries.get(index) else {
							break;
						};

						let result = self.process(entry, source, dest);
						slots.lock().unwrap_or_else(PoisonError::into_inner)[index] = Some(result);
					}
				});
			}
		});

		let results: Vec<SanitizeResult> = slots
			.into_inner()
			.unwrap_or_else(PoisonError::into_inner)
			.into_iter()
			.flatten()
			.collect();

		Ok(build_report(results, cancel.is_cancelled()))
	}

	fn process(
		&self,
		entry: &DocumentEntry,
		source: &dyn DocumentStore,
		dest: &dyn DocumentStore,
	) -> SanitizeResult {
		let path = entry.path.clone();

		match self.sanitize_entry(entry, source, dest) {
			Ok(changes) => {
				tracing::debug!(path = %path, changes = changes.len(), "sanitized document");
				SanitizeResult {
					path,
					success: true,
					error: None,
					changes,
				}
			}
			Err(error) => {
				let reason = match error {
					BrevmalError::SanitizeFile { reason, .. }
					| BrevmalError::MalformedMarkup { reason, .. } => reason,
					other => other.to_string(),
				};
				tracing::warn!(path = %path, %reason, "failed to sanitize document");
				SanitizeResult {
					path,
					success: false,
					error: Some(reason),
					changes: Vec::new(),
				}
			}
		}
	}

	fn sanitize_entry(
		&self,
		entry: &DocumentEntry,
		source: &dyn DocumentStore,
		dest: &dyn DocumentStore,
	) -> BrevmalResult<Vec<String>> {
		if let EntryStatus::Unreadable { reason } = &entry.status {
			return Err(BrevmalError::SanitizeFile {
				path: entry.path.to_string(),
				reason: reason.clone(),
			});
		}

		let stored = source.read(&entry.path)?;
		let sanitized = sanitize_document(&entry.path, &stored.content, &self.options)?;

		if !self.dry_run {
			dest.write(
				&entry.path,
				&StoredDocument {
					content: sanitized.content,
					metadata: stored.metadata,
				},
			)?;
		}

		Ok(sanitized.changes)
	}
}

fn build_report(results: Vec<SanitizeResult>, cancelled: bool) -> BatchReport {
	let succeeded = results.iter().filter(|result| result.success).count();
	let failed = results.len() - succeeded;

	let mut lines: Vec<String> = results
		.iter()
		.map(|result| {
			match &result.error {
				None => format!("ok   {} ({} change(s))", result.path, result.changes.len()),
				Some(error) => format!("FAIL {}: {error}", result.path),
			}
		})
		.collect();
	let mut summary = format!(
		"{succeeded} succeeded, {failed} failed, {} total",
		results.len()
	);
	if cancelled {
		summary.push_str(" (cancelled)");
	}
	lines.push(summary);

	BatchReport {
		results,
		succeeded,
		failed,
		cancelled,
		log: lines.join("\n"),
	}
}
