use std::collections::BTreeMap;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::path::Path;

use derive_more::Deref;
use serde::Deserialize;
use serde::Serialize;

use crate::BrevmalError;
use crate::BrevmalResult;
use crate::tags::Dialect;
use crate::tags::TagSet;

/// A read-only table of values keyed by tag name.
///
/// Overrides, sample data and any other backing store (database, remote
/// service) satisfy the same contract.
pub trait ValueLookup {
	/// Return the value for `name`, or `None` when the table has no entry.
	fn lookup(&self, name: &str) -> Option<String>;
}

impl<S: BuildHasher> ValueLookup for HashMap<String, String, S> {
	fn lookup(&self, name: &str) -> Option<String> {
		self.get(name).cloned()
	}
}

impl ValueLookup for BTreeMap<String, String> {
	fn lookup(&self, name: &str) -> Option<String> {
		self.get(name).cloned()
	}
}

impl<T: ValueLookup + ?Sized> ValueLookup for &T {
	fn lookup(&self, name: &str) -> Option<String> {
		(**self).lookup(name)
	}
}

/// A table with no values. Every tag falls through to the next layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoValues;

impl ValueLookup for NoValues {
	fn lookup(&self, _name: &str) -> Option<String> {
		None
	}
}

/// Known test/demo data used to preview documents before real data exists.
///
/// Nested tables are flattened into dotted keys, so
/// `{ "kjøper": { "navn": "Ola" } }` is looked up as `kjøper.navn`. Arrays
/// flatten to index keys (`rom.0`) and scalars to their string form. Nulls
/// are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref, Serialize)]
#[serde(transparent)]
pub struct SampleData(BTreeMap<String, String>);

impl SampleData {
	pub fn new() -> Self {
		Self::default()
	}

	/// Load sample data from a file. The format is chosen from the file
	/// extension: `json`, `toml`, `yaml` or `yml`.
	pub fn load(path: &Path) -> BrevmalResult<Self> {
		let display = path.display().to_string();
		let content = std::fs::read_to_string(path).map_err(|e| {
			BrevmalError::DataFile {
				path: display.clone(),
				reason: e.to_string(),
			}
		})?;
		let format = path
			.extension()
			.and_then(|e| e.to_str())
			.unwrap_or("")
			.to_ascii_lowercase();

		Self::parse(&content, &format, &display)
	}

	/// Parse sample data from `content` in the given `format`.
	pub fn parse(content: &str, format: &str, path_display: &str) -> BrevmalResult<Self> {
		let data_error = |reason: String| {
			BrevmalError::DataFile {
				path: path_display.to_string(),
				reason,
			}
		};

		let value: serde_json::Value = match format {
			"json" => serde_json::from_str(content).map_err(|e| data_error(e.to_string()))?,
			"toml" => {
				let table: toml::Table =
					toml::from_str(content).map_err(|e| data_error(e.to_string()))?;
				toml_to_json(toml::Value::Table(table))
			}
			"yaml" | "yml" => {
				serde_yaml_ng::from_str(content).map_err(|e| data_error(e.to_string()))?
			}
			other => return Err(BrevmalError::UnsupportedDataFormat(other.to_string())),
		};

		if !value.is_object() {
			return Err(data_error(
				"sample data must be a table of values at the top level".to_string(),
			));
		}

		Ok(Self::from_json(&value))
	}

	/// Flatten a JSON value into a sample table.
	pub fn from_json(value: &serde_json::Value) -> Self {
		let mut entries = BTreeMap::new();
		flatten_into("", value, &mut entries);
		Self(entries)
	}

	pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
		self.0.insert(name.into(), value.into());
	}
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SampleData {
	fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
		Self(
			iter.into_iter()
				.map(|(name, value)| (name.into(), value.into()))
				.collect(),
		)
	}
}

impl ValueLookup for SampleData {
	fn lookup(&self, name: &str) -> Option<String> {
		self.0.get(name).cloned()
	}
}

fn flatten_into(prefix: &str, value: &serde_json::Value, entries: &mut BTreeMap<String, String>) {
	let key = |segment: &str| {
		if prefix.is_empty() {
			segment.to_string()
		} else {
			format!("{prefix}.{segment}")
		}
	};

	match value {
		serde_json::Value::Object(map) => {
			for (name, nested) in map {
				flatten_into(&key(name), nested, entries);
			}
		}
		serde_json::Value::Array(items) => {
			for (index, nested) in items.iter().enumerate() {
				flatten_into(&key(&index.to_string()), nested, entries);
			}
		}
		serde_json::Value::String(text) => {
			entries.insert(prefix.to_string(), text.clone());
		}
		serde_json::Value::Number(number) => {
			entries.insert(prefix.to_string(), number.to_string());
		}
		serde_json::Value::Bool(flag) => {
			entries.insert(prefix.to_string(), flag.to_string());
		}
		serde_json::Value::Null => {}
	}
}

fn toml_to_json(value: toml::Value) -> serde_json::Value {
	match value {
		toml::Value::String(text) => serde_json::Value::String(text),
		toml::Value::Integer(number) => serde_json::Value::from(number),
		toml::Value::Float(number) => {
			serde_json::Number::from_f64(number).map_or_else(
				|| serde_json::Value::String(number.to_string()),
				serde_json::Value::Number,
			)
		}
		toml::Value::Boolean(flag) => serde_json::Value::Bool(flag),
		toml::Value::Datetime(datetime) => serde_json::Value::String(datetime.to_string()),
		toml::Value::Array(items) => {
			serde_json::Value::Array(items.into_iter().map(toml_to_json).collect())
		}
		toml::Value::Table(table) => {
			serde_json::Value::Object(
				table
					.into_iter()
					.map(|(name, nested)| (name, toml_to_json(nested)))
					.collect(),
			)
		}
	}
}

/// The layer that produced a resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueSource {
	/// An explicit, non-empty user edit.
	Override,
	/// A value from the sample table.
	Sample,
	/// No value was found; the tag is reproduced in bracket form.
	Fallback,
}

/// A tag together with its resolved value and the layer it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
	pub name: String,
	pub value: String,
	pub source: ValueSource,
}

/// Resolves tag names against the override and sample layers for one dialect.
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
	dialect: Dialect,
	overrides: &'a dyn ValueLookup,
	sample: &'a dyn ValueLookup,
}

impl<'a> Resolver<'a> {
	pub fn new(
		dialect: Dialect,
		overrides: &'a dyn ValueLookup,
		sample: &'a dyn ValueLookup,
	) -> Self {
		Self {
			dialect,
			overrides,
			sample,
		}
	}

	pub fn dialect(&self) -> Dialect {
		self.dialect
	}

	/// Resolve a single tag name to its substitution string.
	pub fn resolve(&self, name: &str) -> String {
		self.resolve_with_source(name).value
	}

	/// Resolve a tag name and report which layer supplied the value.
	///
	/// An override wins only when it is non-empty. A sample value wins when
	/// present, even when empty. Otherwise the tag is reproduced in its
	/// original bracket syntax so it stays visible in the output.
	pub fn resolve_with_source(&self, name: &str) -> Resolution {
		let (value, source) = if let Some(value) = self
			.overrides
			.lookup(name)
			.filter(|value| !value.is_empty())
		{
			(value, ValueSource::Override)
		} else if let Some(value) = self.sample.lookup(name) {
			(value, ValueSource::Sample)
		} else {
			(self.dialect.wrap(name), ValueSource::Fallback)
		};

		Resolution {
			name: name.to_string(),
			value,
			source,
		}
	}

	/// Resolve every tag in discovery order.
	pub fn resolve_all(&self, tags: &TagSet) -> Vec<Resolution> {
		tags.iter().map(|name| self.resolve_with_source(name)).collect()
	}
}

/// Resolve a tag name with the given layers. See
/// [`Resolver::resolve_with_source`] for the precedence rules.
pub fn resolve(
	name: &str,
	dialect: Dialect,
	overrides: &dyn ValueLookup,
	sample: &dyn ValueLookup,
) -> String {
	Resolver::new(dialect, overrides, sample).resolve(name)
}

/// Replace every literal occurrence of each tag with its resolved value.
///
/// Tags are processed once each, in discovery order. Replacement values are
/// never rescanned for new tags, so expansion is bounded even when a value
/// itself contains bracket sequences.
pub fn substitute_all(markup: &str, tags: &TagSet, resolver: &Resolver<'_>) -> String {
	let mut result = markup.to_string();

	for name in tags {
		let literal = resolver.dialect().wrap(name);
		if !result.contains(&literal) {
			continue;
		}

		let value = resolver.resolve(name);
		if value != literal {
			result = result.replace(&literal, &value);
		}
	}

	result
}
