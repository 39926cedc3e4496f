use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::process;

use brevmal_core::BatchReport;
use brevmal_core::BrevmalConfig;
use brevmal_core::CancelFlag;
use brevmal_core::DocumentLibrary;
use brevmal_core::DocumentPath;
use brevmal_core::DocumentStore;
use brevmal_core::FsDocumentStore;
use brevmal_core::Pipeline;
use brevmal_core::SanitizerBatch;
use brevmal_core::parse_target;
use brevmal_core::sanitize_document;
use brevmal_core::version;
use brevmal_cli::BrevmalCli;
use brevmal_cli::Commands;
use brevmal_cli::OutputFormat;
use brevmal_cli::parse_assignment;
use clap::Parser;
use owo_colors::OwoColorize;
use similar::ChangeTag;
use similar::TextDiff;
use tracing_subscriber::EnvFilter;

static USE_COLOR: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

fn color_enabled() -> bool {
	USE_COLOR.load(std::sync::atomic::Ordering::Relaxed)
}

/// Apply ANSI color codes only when color is enabled.
macro_rules! colored {
	($text:expr,red) => {
		if color_enabled() {
			format!("{}", $text.red())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,green) => {
		if color_enabled() {
			format!("{}", $text.green())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,yellow) => {
		if color_enabled() {
			format!("{}", $text.yellow())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,bold) => {
		if color_enabled() {
			format!("{}", $text.bold())
		} else {
			format!("{}", $text)
		}
	};
}

const SAMPLE_CONFIG: &str = "# brevmal configuration\n\n# Directory holding the document \
                             store.\ndocuments = \"documents\"\n\n# Directory holding shared \
                             resource fragments such as headers and footers.\nfragments = \
                             \"fragments\"\n\n# Sample data used to preview documents (json, toml \
                             or yaml).\n# sample = \"sample.json\"\n\n[render]\n# style_base = \
                             \"/styles/\"\n# styles = [\"base\"]\n# cache_bust = \
                             false\n\n[render.margins]\n# top = \"20mm\"\n# bottom = \
                             \"20mm\"\n\n[sanitize]\n# workers = 4\n";

fn main() {
	let args = BrevmalCli::parse();

	// Respect NO_COLOR env var and --no-color flag.
	let use_color = !args.no_color && std::env::var_os("NO_COLOR").is_none();
	if !use_color {
		USE_COLOR.store(false, std::sync::atomic::Ordering::Relaxed);
	}

	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	init_tracing(args.verbose, use_color);

	let result = match &args.command {
		Some(Commands::Init) => run_init(&args),
		Some(Commands::Scan { doc, format }) => run_scan(&args, doc, *format),
		Some(Commands::Render {
			doc,
			target,
			set,
			output,
		}) => run_render(&args, doc, target, set, output.as_deref()),
		Some(Commands::Versions { doc }) => run_versions(&args, doc),
		Some(Commands::NextVersion { filename }) => {
			println!("{}", version::next_version(filename));
			Ok(())
		}
		Some(Commands::Sanitize {
			source,
			dest,
			workers,
			dry_run,
			diff,
			format,
		}) => run_sanitize(&args, source, dest, *workers, *dry_run, *diff, *format),
		None => {
			eprintln!("No subcommand specified. Run `brevmal --help` for usage.");
			process::exit(1);
		}
	};

	if let Err(e) = result {
		match e.downcast::<brevmal_core::BrevmalError>() {
			Ok(brevmal_err) => {
				let report: miette::Report = (*brevmal_err).into();
				eprintln!("{report:?}");
			}
			Err(e) => {
				eprintln!("{} {e}", colored!("error:", red));
			}
		}
		process::exit(2);
	}
}

/// Log to stderr. `RUST_LOG` wins; otherwise `--verbose` enables debug
/// events from the core library.
fn init_tracing(verbose: bool, use_color: bool) {
	let default_filter = if verbose { "brevmal_core=debug" } else { "error" };
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_ansi(use_color)
		.with_target(false)
		.init();
}

fn resolve_root(args: &BrevmalCli) -> PathBuf {
	args.path
		.clone()
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn resolve_dir(root: &Path, dir: &Path) -> PathBuf {
	if dir.is_absolute() {
		dir.to_path_buf()
	} else {
		root.join(dir)
	}
}

fn run_init(args: &BrevmalCli) -> Result<(), Box<dyn std::error::Error>> {
	let root = resolve_root(args);

	if let Some(existing) = BrevmalConfig::resolve_path(&root) {
		println!("Config file already exists: {}", existing.display());
		return Ok(());
	}

	let config_path = root.join("brevmal.toml");
	std::fs::write(&config_path, SAMPLE_CONFIG)?;
	println!("Created {}", config_path.display());

	for dir in ["documents", "fragments"] {
		let path = root.join(dir);
		if !path.exists() {
			std::fs::create_dir_all(&path)?;
			println!("Created {}/", path.display());
		}
	}

	println!();
	println!("Next steps:");
	println!("  1. Add documents under documents/<category>/<name>.html");
	println!("  2. Put shared headers and footers in fragments/<name>.html");
	println!("  3. Run `brevmal render <category>/<name>.html --target print`");

	Ok(())
}

fn run_scan(
	args: &BrevmalCli,
	doc: &str,
	format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
	let root = resolve_root(args);
	let config = BrevmalConfig::load_or_default(&root)?;
	let documents = config.document_store(&root)?;
	let fragments = config.fragment_store(&root);
	let pipeline = Pipeline::new(&documents, &fragments, &config.render);

	let path = DocumentPath::new(doc)?;
	let scanned = pipeline.scan_document(&path)?;

	match format {
		OutputFormat::Json => {
			let output = serde_json::json!({
				"document": path,
				"dialect": scanned.dialect,
				"tags": scanned.tags,
				"diagnostics": scanned
					.diagnostics
					.iter()
					.map(|diagnostic| {
						let point = diagnostic.point();
						serde_json::json!({
							"line": point.line,
							"column": point.column,
							"message": diagnostic.message(),
						})
					})
					.collect::<Vec<_>>(),
				"warnings": scanned
					.warnings
					.iter()
					.map(ToString::to_string)
					.collect::<Vec<_>>(),
			});
			println!("{output}");
		}
		OutputFormat::Text => {
			println!(
				"{} ({} tags, {} tag(s))",
				colored!(path.as_str(), bold),
				scanned.dialect,
				scanned.tags.len()
			);
			for name in &scanned.tags {
				println!("  {name}");
			}
			for diagnostic in &scanned.diagnostics {
				eprintln!("{} {}", colored!("warning:", yellow), diagnostic.message());
			}
			for warning in &scanned.warnings {
				eprintln!("{} {warning}", colored!("warning:", yellow));
			}
		}
	}

	Ok(())
}

fn run_render(
	args: &BrevmalCli,
	doc: &str,
	target: &str,
	set: &[String],
	output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
	let root = resolve_root(args);
	let config = BrevmalConfig::load_or_default(&root)?;
	let documents = config.document_store(&root)?;
	let fragments = config.fragment_store(&root);
	let sample = config.load_sample(&root)?;
	let pipeline = Pipeline::new(&documents, &fragments, &config.render);

	let target = parse_target(target)?;
	let mut overrides: HashMap<String, String> = HashMap::new();
	for assignment in set {
		let Some((name, value)) = parse_assignment(assignment) else {
			return Err(format!("invalid --set value `{assignment}`, expected NAME=VALUE").into());
		};
		overrides.insert(name, value);
	}

	let path = DocumentPath::new(doc)?;
	let rendered = pipeline.render_document(&path, target, &overrides, &sample)?;

	for warning in &rendered.warnings {
		eprintln!("{} {warning}", colored!("warning:", yellow));
	}
	if let Some(subject) = &rendered.subject {
		eprintln!("Subject: {subject}");
	}
	if args.verbose {
		for resolution in &rendered.resolutions {
			eprintln!(
				"  {} = {:?} ({:?})",
				resolution.name, resolution.value, resolution.source
			);
		}
	}

	match output {
		Some(output) => {
			let output = resolve_dir(&root, output);
			std::fs::write(&output, &rendered.content)?;
			println!("Wrote {}", output.display());
		}
		None => print!("{}", rendered.content),
	}

	Ok(())
}

fn run_versions(args: &BrevmalCli, doc: &str) -> Result<(), Box<dyn std::error::Error>> {
	let root = resolve_root(args);
	let config = BrevmalConfig::load_or_default(&root)?;
	let documents = config.document_store(&root)?;
	let library = DocumentLibrary::new(&documents);

	let path = DocumentPath::new(doc)?;
	let lineage = library.lineage(&path)?;
	let Some(current) = lineage.current().map(|entry| entry.version) else {
		return Err(brevmal_core::BrevmalError::DocumentNotFound(path.to_string()).into());
	};

	for entry in lineage.entries() {
		let label = format!("v{}", entry.version);
		if entry.version == current {
			println!(
				"{label:<6} {} {}",
				entry.path,
				colored!("(current)", green)
			);
		} else {
			println!("{label:<6} {}", entry.path);
		}
	}
	if args.verbose {
		println!("Next version: {}", lineage.next_filename());
	}

	Ok(())
}

#[allow(clippy::fn_params_excessive_bools)]
fn run_sanitize(
	args: &BrevmalCli,
	source: &Path,
	dest: &Path,
	workers: Option<usize>,
	dry_run: bool,
	show_diff: bool,
	format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
	let root = resolve_root(args);
	let config = BrevmalConfig::load_or_default(&root)?;

	let source_store = FsDocumentStore::new(resolve_dir(&root, source))
		.with_max_file_size(config.max_file_size)
		.with_exclude(&config.exclude.patterns)?;
	let dest_store = FsDocumentStore::new(resolve_dir(&root, dest));

	let mut options = config.sanitize.clone();
	if workers.is_some() {
		options.workers = workers;
	}
	tracing::debug!(source = %source.display(), dest = %dest.display(), dry_run, "sanitizing");

	let batch = SanitizerBatch::new(options).dry_run(dry_run);
	let report = batch.run(&source_store, &dest_store, &CancelFlag::new())?;

	match format {
		OutputFormat::Json => {
			println!("{}", serde_json::to_string(&report)?);
		}
		OutputFormat::Text => {
			print_report(&report);
			if show_diff {
				print_changes(&report, &source_store, &batch)?;
			}
		}
	}

	if !report.is_ok() {
		process::exit(1);
	}

	Ok(())
}

fn print_report(report: &BatchReport) {
	for result in &report.results {
		match &result.error {
			None => {
				println!(
					"{}   {} ({} change(s))",
					colored!("ok", green),
					result.path,
					result.changes.len()
				);
			}
			Some(error) => {
				println!("{} {}: {error}", colored!("FAIL", red), result.path);
			}
		}
	}

	println!();
	println!(
		"{}",
		colored!(
			format!(
				"{} succeeded, {} failed, {} total{}",
				report.succeeded,
				report.failed,
				report.results.len(),
				if report.cancelled { " (cancelled)" } else { "" }
			),
			bold
		)
	);
}

/// Show what sanitizing changed in every successful document.
fn print_changes(
	report: &BatchReport,
	source: &dyn DocumentStore,
	batch: &SanitizerBatch,
) -> Result<(), Box<dyn std::error::Error>> {
	for result in report.results.iter().filter(|result| result.success) {
		if result.changes.is_empty() {
			continue;
		}

		let original = source.read(&result.path)?;
		let sanitized = sanitize_document(&result.path, &original.content, &batch.options)?;

		eprintln!();
		eprintln!("{}", colored!(result.path.as_str(), bold));
		for change in &sanitized.changes {
			eprintln!("  - {change}");
		}
		print_diff(&original.content, &sanitized.content);
	}

	Ok(())
}

/// Print a unified diff between two strings, colorized.
fn print_diff(current: &str, expected: &str) {
	let diff = TextDiff::from_lines(current, expected);
	for change in diff.iter_all_changes() {
		match change.tag() {
			ChangeTag::Delete => {
				eprint!("  {}", colored!(format!("-{change}"), red));
			}
			ChangeTag::Insert => {
				eprint!("  {}", colored!(format!("+{change}"), green));
			}
			ChangeTag::Equal => {
				eprint!("   {change}");
			}
		}
	}
}
