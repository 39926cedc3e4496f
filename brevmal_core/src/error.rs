use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum BrevmalError {
	#[error(transparent)]
	#[diagnostic(code(brevmal::io_error))]
	Io(#[from] std::io::Error),

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(brevmal::config_parse),
		help("check that brevmal.toml is valid TOML with optional [render] and [sanitize] sections")
	)]
	ConfigParse(String),

	#[error("failed to load sample data file `{path}`: {reason}")]
	#[diagnostic(code(brevmal::data_file))]
	DataFile { path: String, reason: String },

	#[error("unsupported sample data format: `{0}`")]
	#[diagnostic(
		code(brevmal::unsupported_format),
		help("supported formats: json, toml, yaml, yml")
	)]
	UnsupportedDataFormat(String),

	#[error("unsupported render target: `{0}`")]
	#[diagnostic(
		code(brevmal::unsupported_render_target),
		help("available targets: print, desktop-email, mobile-email, sms")
	)]
	UnsupportedRenderTarget(String),

	#[error("document `{path}` uses {dialect} tags and cannot be rendered for `{target}`")]
	#[diagnostic(
		code(brevmal::target_dialect_mismatch),
		help("sms documents render only for the `sms` target; all other documents render for print and email targets")
	)]
	TargetDialectMismatch {
		path: String,
		target: String,
		dialect: String,
	},

	#[error("document not found: `{0}`")]
	#[diagnostic(code(brevmal::document_not_found))]
	DocumentNotFound(String),

	#[error("document already exists: `{0}`")]
	#[diagnostic(
		code(brevmal::document_exists),
		help("save with a new version or choose another base name")
	)]
	DocumentExists(String),

	#[error("invalid resource marker pattern: {0}")]
	#[diagnostic(
		code(brevmal::invalid_marker_pattern),
		help("marker element and attribute names may only contain letters, digits, `-`, `_` and `:`")
	)]
	InvalidMarkerPattern(String),

	#[error("invalid document path: `{0}`")]
	#[diagnostic(
		code(brevmal::invalid_document_path),
		help("document paths are relative, use `/` separators and may not contain `..`")
	)]
	InvalidDocumentPath(String),

	#[error("invalid fragment name: `{0}`")]
	#[diagnostic(
		code(brevmal::invalid_fragment_name),
		help("fragment names may not contain path separators or `..`")
	)]
	InvalidFragmentName(String),

	#[error("`{path}` is not valid UTF-8")]
	#[diagnostic(code(brevmal::invalid_encoding))]
	InvalidEncoding { path: String },

	#[error("file too large: `{path}` is {size} bytes (limit: {limit} bytes)")]
	#[diagnostic(
		code(brevmal::file_too_large),
		help("increase `max_file_size` in brevmal.toml")
	)]
	FileTooLarge { path: String, size: u64, limit: u64 },

	#[error("invalid length: `{0}`")]
	#[diagnostic(
		code(brevmal::invalid_length),
		help("lengths are a number followed by one of: mm, cm, in, pt, px")
	)]
	InvalidLength(String),

	#[error("failed to parse metadata for `{path}`: {reason}")]
	#[diagnostic(code(brevmal::metadata_parse))]
	MetadataParse { path: String, reason: String },

	#[error("malformed markup in `{path}`: {reason}")]
	#[diagnostic(code(brevmal::malformed_markup))]
	MalformedMarkup { path: String, reason: String },

	#[error("failed to sanitize `{path}`: {reason}")]
	#[diagnostic(code(brevmal::sanitize_file))]
	SanitizeFile { path: String, reason: String },
}

pub type BrevmalResult<T> = Result<T, BrevmalError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
