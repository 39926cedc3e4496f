use serde::Serialize;

use crate::BrevmalError;
use crate::BrevmalResult;
use crate::config::RenderConfig;
use crate::document::DocumentMetadata;
use crate::document::DocumentPath;
use crate::document::StoredDocument;
use crate::inject::Injector;
use crate::inject::RenderWarning;
use crate::render::RenderParts;
use crate::render::RenderTarget;
use crate::render::render;
use crate::store::DocumentStore;
use crate::store::FragmentStore;
use crate::tags::Dialect;
use crate::tags::TagDiagnostic;
use crate::tags::TagSet;
use crate::tags::scan_all;
use crate::tags::scan_with_diagnostics;
use crate::values::Resolution;
use crate::values::Resolver;
use crate::values::ValueLookup;
use crate::values::substitute_all;

/// The output of rendering one document for one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedDocument {
	/// The standalone output: an HTML document, or plain text for SMS.
	pub content: String,
	/// The substituted subject line, for email targets with a subject.
	pub subject: Option<String>,
	/// Every tag found after injection, in discovery order.
	pub tags: TagSet,
	pub resolutions: Vec<Resolution>,
	pub warnings: Vec<RenderWarning>,
}

/// Tags of a document as an editing panel shows them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentTags {
	pub dialect: Dialect,
	/// Tags of the subject, header, body and footer after injection.
	pub tags: TagSet,
	/// Malformed tag syntax in the stored body.
	pub diagnostics: Vec<TagDiagnostic>,
	pub warnings: Vec<RenderWarning>,
}

/// The header, body and footer of a document with fragments injected.
struct Assembled {
	head: String,
	body: String,
	foot: String,
}

/// Runs injection, scanning, resolution and rendering for stored documents.
///
/// Each call reads the document and its fragments afresh and shares no
/// state with other calls.
pub struct Pipeline<'a> {
	documents: &'a dyn DocumentStore,
	fragments: &'a dyn FragmentStore,
	config: &'a RenderConfig,
}

impl<'a> Pipeline<'a> {
	pub fn new(
		documents: &'a dyn DocumentStore,
		fragments: &'a dyn FragmentStore,
		config: &'a RenderConfig,
	) -> Self {
		Self {
			documents,
			fragments,
			config,
		}
	}

	/// Read the document at `path` and render it for `target`.
	pub fn render_document(
		&self,
		path: &DocumentPath,
		target: RenderTarget,
		overrides: &dyn ValueLookup,
		sample: &dyn ValueLookup,
	) -> BrevmalResult<RenderedDocument> {
		let stored = self.documents.read(path)?;
		self.render_stored(path, &stored, target, overrides, sample)
	}

	/// Render a document that has not necessarily been saved, such as an
	/// open draft.
	pub fn render_stored(
		&self,
		path: &DocumentPath,
		stored: &StoredDocument,
		target: RenderTarget,
		overrides: &dyn ValueLookup,
		sample: &dyn ValueLookup,
	) -> BrevmalResult<RenderedDocument> {
		let dialect = path.dialect();
		if target.dialect() != dialect {
			return Err(BrevmalError::TargetDialectMismatch {
				path: path.to_string(),
				target: target.to_string(),
				dialect: dialect.to_string(),
			});
		}

		let mut injector = Injector::new(&self.config.marker, self.fragments);
		let assembled = self.assemble(&mut injector, stored, target)?;
		let subject = if target.is_email() {
			stored.metadata.subject.clone()
		} else {
			None
		};

		let mut parts: Vec<&str> = Vec::with_capacity(4);
		if let Some(subject) = &subject {
			parts.push(subject);
		}
		parts.extend([
			assembled.head.as_str(),
			assembled.body.as_str(),
			assembled.foot.as_str(),
		]);
		let tags = scan_all(&parts, dialect);
		tracing::debug!(path = %path, %target, tags = tags.len(), "scanned document");

		let resolver = Resolver::new(dialect, overrides, sample);
		let subject = subject.map(|subject| substitute_all(&subject, &tags, &resolver));
		let head = substitute_all(&assembled.head, &tags, &resolver);
		let body = substitute_all(&assembled.body, &tags, &resolver);
		let foot = substitute_all(&assembled.foot, &tags, &resolver);

		let options = self.config.options(&stored.metadata);
		let content = render(
			RenderParts {
				head: &head,
				body: &body,
				foot: &foot,
			},
			target,
			&options,
		);
		tracing::debug!(path = %path, %target, bytes = content.len(), "rendered document");

		Ok(RenderedDocument {
			content,
			subject,
			resolutions: resolver.resolve_all(&tags),
			tags,
			warnings: injector.into_warnings(),
		})
	}

	/// Discover the tags of the document at `path` without rendering it.
	pub fn scan_document(&self, path: &DocumentPath) -> BrevmalResult<DocumentTags> {
		let stored = self.documents.read(path)?;
		let dialect = path.dialect();
		let target = match dialect {
			Dialect::Double => RenderTarget::Print,
			Dialect::Single => RenderTarget::Sms,
		};

		let mut injector = Injector::new(&self.config.marker, self.fragments);
		let assembled = self.assemble(&mut injector, &stored, target)?;
		let subject = stored.metadata.subject.as_deref().unwrap_or_default();
		let tags = scan_all(
			&[
				subject,
				assembled.head.as_str(),
				assembled.body.as_str(),
				assembled.foot.as_str(),
			],
			dialect,
		);
		let (_, diagnostics) = scan_with_diagnostics(&stored.content, dialect);

		Ok(DocumentTags {
			dialect,
			tags,
			diagnostics,
			warnings: injector.into_warnings(),
		})
	}

	/// Fetch the header and footer, then inject marker fragments into every
	/// part. Injection always precedes scanning so tags carried by fragments
	/// are resolved with the rest of the document.
	fn assemble(
		&self,
		injector: &mut Injector<'_>,
		stored: &StoredDocument,
		target: RenderTarget,
	) -> BrevmalResult<Assembled> {
		let (head, foot) = if target == RenderTarget::Sms {
			(String::new(), String::new())
		} else {
			surrounding_fragments(injector, &stored.metadata)?
		};

		Ok(Assembled {
			head: injector.inject(&head)?,
			body: injector.inject(&stored.content)?,
			foot: injector.inject(&foot)?,
		})
	}
}

fn surrounding_fragments(
	injector: &mut Injector<'_>,
	metadata: &DocumentMetadata,
) -> BrevmalResult<(String, String)> {
	let mut fetch = |name: Option<&str>| -> BrevmalResult<String> {
		match name {
			Some(name) => Ok(injector.fetch(name)?.unwrap_or_default()),
			None => Ok(String::new()),
		}
	};

	let head = fetch(metadata.header.as_deref())?;
	let foot = fetch(metadata.footer.as_deref())?;
	Ok((head, foot))
}
