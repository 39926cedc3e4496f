use std::collections::HashMap;

use regex::Captures;
use regex::NoExpand;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

use crate::BrevmalError;
use crate::BrevmalResult;
use crate::store::FragmentStore;

/// Default element name of a resource marker.
pub const DEFAULT_MARKER_ELEMENT: &str = "div";
/// Default attribute that names the requested fragment.
pub const DEFAULT_MARKER_ATTRIBUTE: &str = "data-system-resource";

const QUOTED_NAME: &str = r#"(?:"([^"]*)"|'([^']*)')"#;

/// Describes which elements are placeholders for shared resource fragments.
///
/// With the defaults, `<div data-system-resource="system-style"></div>` asks
/// for the fragment named `system-style`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerPattern {
	/// Element name of the marker, matched case-insensitively.
	#[serde(default = "default_marker_element")]
	pub element: String,
	/// Attribute whose value names the fragment, matched case-insensitively.
	#[serde(default = "default_marker_attribute")]
	pub attribute: String,
}

fn default_marker_element() -> String {
	DEFAULT_MARKER_ELEMENT.to_string()
}

fn default_marker_attribute() -> String {
	DEFAULT_MARKER_ATTRIBUTE.to_string()
}

impl Default for MarkerPattern {
	fn default() -> Self {
		Self {
			element: default_marker_element(),
			attribute: default_marker_attribute(),
		}
	}
}

impl MarkerPattern {
	fn validate(&self) -> BrevmalResult<()> {
		for name in [&self.element, &self.attribute] {
			let valid = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
				&& name
					.chars()
					.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':'));
			if !valid {
				return Err(BrevmalError::InvalidMarkerPattern(format!(
					"`{name}` is not a valid element or attribute name"
				)));
			}
		}
		Ok(())
	}

	/// Build the marker matcher for the fragment called `name`.
	///
	/// The match runs from the opening element carrying the attribute to the
	/// first closing tag of the same element name, or covers a self-closing
	/// element on its own. It is case-insensitive and spans newlines.
	pub fn marker(&self, name: &str) -> BrevmalResult<Marker> {
		let value = regex::escape(name);
		let regex = self.compile(&format!(r#"(?:"{value}"|'{value}')"#), true)?;

		Ok(Marker {
			name: name.to_string(),
			regex,
		})
	}

	/// Names of the fragments requested by markers in `markup`, in order of
	/// first occurrence.
	pub fn requested_names(&self, markup: &str) -> BrevmalResult<Vec<String>> {
		let regex = self.compile(QUOTED_NAME, false)?;

		let mut names: Vec<String> = Vec::new();
		for captures in regex.captures_iter(markup) {
			let name = requested_name(&captures);
			if !names.iter().any(|existing| existing == name) {
				names.push(name.to_string());
			}
		}

		Ok(names)
	}

	/// Matcher for every marker element regardless of the fragment it names.
	/// The name is captured in group 1 (double quotes) or 2 (single quotes).
	fn any_marker(&self) -> BrevmalResult<Regex> {
		self.compile(QUOTED_NAME, true)
	}

	/// Opening tag carrying the attribute with `value`, optionally extended
	/// to the end of the element.
	fn compile(&self, value: &str, whole_element: bool) -> BrevmalResult<Regex> {
		self.validate()?;
		let element = regex::escape(&self.element);
		let attribute = regex::escape(&self.attribute);
		let rest = if whole_element {
			format!(r"[^>]*?(?:/>|>.*?</{element}\s*>)")
		} else {
			String::new()
		};
		let source = format!(r"(?is)<{element}\b[^>]*?\b{attribute}\s*=\s*{value}{rest}");

		Regex::new(&source).map_err(|e| BrevmalError::InvalidMarkerPattern(e.to_string()))
	}
}

fn requested_name<'h>(captures: &Captures<'h>) -> &'h str {
	captures
		.get(1)
		.or_else(|| captures.get(2))
		.map_or("", |name| name.as_str())
}

/// A compiled matcher for the markers of one named fragment.
#[derive(Debug, Clone)]
pub struct Marker {
	name: String,
	regex: Regex,
}

impl Marker {
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Returns true if `markup` contains at least one marker element.
	pub fn is_present(&self, markup: &str) -> bool {
		self.regex.is_match(markup)
	}
}

/// Replace every marker element in `markup` with `fragment`, verbatim.
///
/// Without a marker the markup is returned unchanged. An unavailable
/// fragment (`None`) still removes the marker so no placeholder element leaks
/// into the output. Tags inside the fragment are left for the substitution
/// stage.
pub fn inject(markup: &str, marker: &Marker, fragment: Option<&str>) -> String {
	marker
		.regex
		.replace_all(markup, NoExpand(fragment.unwrap_or_default()))
		.into_owned()
}

/// A non-fatal problem encountered while rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum RenderWarning {
	/// A requested fragment was not found; it was replaced with empty
	/// content.
	MissingFragment { name: String },
}

impl std::fmt::Display for RenderWarning {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::MissingFragment { name } => {
				write!(f, "missing fragment `{name}` was replaced with empty content")
			}
		}
	}
}

/// Injects fragments from a [`FragmentStore`] into markup.
///
/// Each fragment is fetched at most once per injector, so one injector
/// serves all parts of a single render while a new render sees fragment
/// updates.
pub struct Injector<'a> {
	pattern: &'a MarkerPattern,
	store: &'a dyn FragmentStore,
	fetched: HashMap<String, Option<String>>,
	warnings: Vec<RenderWarning>,
}

impl<'a> Injector<'a> {
	pub fn new(pattern: &'a MarkerPattern, store: &'a dyn FragmentStore) -> Self {
		Self {
			pattern,
			store,
			fetched: HashMap::new(),
			warnings: Vec::new(),
		}
	}

	/// Fetch a fragment by name, recording a warning when it is missing.
	/// A name the store rejects counts as missing. Other store errors are
	/// returned to the caller.
	pub fn fetch(&mut self, name: &str) -> BrevmalResult<Option<String>> {
		if let Some(cached) = self.fetched.get(name) {
			return Ok(cached.clone());
		}

		let fragment = match self.store.read_fragment(name) {
			Ok(fragment) => fragment,
			Err(BrevmalError::InvalidFragmentName(_)) => None,
			Err(error) => return Err(error),
		};
		if fragment.is_none() {
			tracing::warn!(fragment = %name, "missing fragment, replacing with empty content");
			self.warnings.push(RenderWarning::MissingFragment {
				name: name.to_string(),
			});
		}

		self.fetched.insert(name.to_string(), fragment.clone());
		Ok(fragment)
	}

	/// Replace every marker in `markup` with its fragment.
	///
	/// All markers are replaced in a single pass over `markup`, so markers
	/// carried by an injected fragment stay as they are.
	pub fn inject(&mut self, markup: &str) -> BrevmalResult<String> {
		let names = self.pattern.requested_names(markup)?;
		if names.is_empty() {
			return Ok(markup.to_string());
		}

		for name in &names {
			let fragment = self.fetch(name)?;
			tracing::debug!(fragment = %name, found = fragment.is_some(), "injecting fragment");
		}

		let markers = self.pattern.any_marker()?;
		let fetched = &self.fetched;
		let result = markers.replace_all(markup, |captures: &Captures<'_>| {
			fetched
				.get(requested_name(captures))
				.and_then(Option::as_deref)
				.unwrap_or_default()
				.to_string()
		});

		Ok(result.into_owned())
	}

	pub fn warnings(&self) -> &[RenderWarning] {
		&self.warnings
	}

	pub fn into_warnings(self) -> Vec<RenderWarning> {
		self.warnings
	}
}

/// Names of the fragments requested by markers in `markup`, in order of first
/// occurrence.
pub fn marker_names(markup: &str, pattern: &MarkerPattern) -> BrevmalResult<Vec<String>> {
	pattern.requested_names(markup)
}

/// Inject every requested fragment from `store` into `markup`.
pub fn inject_all(
	markup: &str,
	pattern: &MarkerPattern,
	store: &dyn FragmentStore,
) -> BrevmalResult<(String, Vec<RenderWarning>)> {
	let mut injector = Injector::new(pattern, store);
	let injected = injector.inject(markup)?;
	Ok((injected, injector.into_warnings()))
}
