use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Scan, render, version and sanitize merge-field document templates.",
	long_about = "brevmal manages branded correspondence templates: letters, emails and SMS \
	              messages with merge-field tags such as `[[kjøper.navn]]` or `[navn]`.\n\nQuick \
	              start:\n  brevmal init                 Create a brevmal.toml\n  brevmal scan \
	              DOC             List the tags of a document\n  brevmal render DOC -t print  \
	              Render a document with sample data\n  brevmal sanitize SRC DEST    Migrate \
	              legacy documents"
)]
pub struct BrevmalCli {
	#[command(subcommand)]
	pub command: Option<Commands>,

	/// Path to the project root directory.
	#[arg(long, short, global = true)]
	pub path: Option<PathBuf>,

	/// Enable verbose output and debug logging.
	#[arg(long, short, global = true, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, global = true, default_value_t = false)]
	pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Create a sample `brevmal.toml` in the project root.
	///
	/// If a config file already exists this command is a no-op and exits
	/// successfully.
	Init,
	/// List the merge-field tags of a document.
	///
	/// Tags are collected from the subject, header, body and footer after
	/// resource fragments are injected, in order of first occurrence.
	/// Malformed tag syntax in the document body is reported as well.
	Scan {
		/// Document path inside the document store, for example
		/// `salg/kontrakt.html`.
		doc: String,

		/// Output format.
		#[arg(long, value_enum, default_value_t = OutputFormat::Text)]
		format: OutputFormat,
	},
	/// Render a document for one presentation channel.
	///
	/// Values come from `--set` overrides first, then from the sample data
	/// file configured in `brevmal.toml`. Tags without a value stay visible
	/// in bracket form.
	Render {
		/// Document path inside the document store.
		doc: String,

		/// Presentation channel: `print`, `desktop-email`, `mobile-email` or
		/// `sms`.
		#[arg(long, short, default_value = "print")]
		target: String,

		/// Override a tag value, as `name=value`. May be repeated.
		#[arg(long = "set", value_name = "NAME=VALUE")]
		set: Vec<String>,

		/// Write the output to a file instead of stdout.
		#[arg(long, short)]
		output: Option<PathBuf>,
	},
	/// List every saved version of a document.
	Versions {
		/// Any version of the document, for example `salg/kontrakt.v2.html`.
		doc: String,
	},
	/// Print the filename the next version of a document would receive.
	NextVersion {
		/// A filename such as `kontrakt.html` or `kontrakt.v3.html`.
		filename: String,
	},
	/// Migrate legacy documents from one directory into another.
	///
	/// Every document is normalized independently. Malformed documents are
	/// reported and skipped; the rest are written to the destination. Exits
	/// with a non-zero status code if any document failed.
	Sanitize {
		/// Directory holding the legacy documents.
		source: PathBuf,

		/// Directory the sanitized documents are written to.
		dest: PathBuf,

		/// Number of worker threads. Defaults to the configured value, or the
		/// available parallelism.
		#[arg(long)]
		workers: Option<usize>,

		/// Report what would change without writing anything.
		#[arg(long, default_value_t = false)]
		dry_run: bool,

		/// Show a diff of the changes for every sanitized document.
		#[arg(long, default_value_t = false)]
		diff: bool,

		/// Output format.
		#[arg(long, value_enum, default_value_t = OutputFormat::Text)]
		format: OutputFormat,
	},
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
	/// Human-readable text output with colors and formatting.
	Text,
	/// JSON output for programmatic consumption.
	Json,
}

/// Split a `--set` argument into a tag name and value. The value may itself
/// contain `=`.
pub fn parse_assignment(assignment: &str) -> Option<(String, String)> {
	let (name, value) = assignment.split_once('=')?;
	let name = name.trim();
	if name.is_empty() {
		return None;
	}

	Some((name.to_string(), value.to_string()))
}
