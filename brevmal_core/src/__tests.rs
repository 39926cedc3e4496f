use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use rstest::rstest;
use similar_asserts::assert_eq;
use tracing_test::traced_test;

use super::__fixtures::*;
use super::*;
use crate::version;

// Tag scanning

#[rstest]
#[case::empty("", Dialect::Double, vec![])]
#[case::first_occurrence_order("Hei [[b]] og [[a]] og [[b]]", Dialect::Double, vec!["b", "a"])]
#[case::dotted_names("[[kjøper.navn]], [[eiendom.adresse]]", Dialect::Double, vec!["kjøper.navn", "eiendom.adresse"])]
#[case::verbatim_whitespace("[[ navn ]]", Dialect::Double, vec![" navn "])]
#[case::double_ignores_single("[[a]] [b]", Dialect::Double, vec!["a"])]
#[case::single("Hei [mottaker.fornavn], bud [bud.sum]", Dialect::Single, vec!["mottaker.fornavn", "bud.sum"])]
#[case::single_inside_double("[[not.a.tag]]", Dialect::Single, vec!["not.a.tag"])]
#[case::empty_brackets("[[]] []", Dialect::Double, vec![])]
fn scan_tags(#[case] markup: &str, #[case] dialect: Dialect, #[case] expected: Vec<&str>) {
	let tags = scan(markup, dialect);
	assert_eq!(tags.iter().map(String::as_str).collect::<Vec<_>>(), expected);
}

#[test]
fn scan_all_merges_parts_in_order() {
	let tags = scan_all(&["[[c]] [[a]]", "[[a]] [[b]]", ""], Dialect::Double);
	assert_eq!(tags.into_vec(), vec!["c", "a", "b"]);
}

#[rstest]
#[case::unterminated_double("Hei [[navn", Dialect::Double, vec![TagDiagnostic::UnterminatedTag { point: Point::new(1, 5, 4) }])]
#[case::unmatched_close("x ]] y", Dialect::Double, vec![TagDiagnostic::UnmatchedClose { point: Point::new(1, 3, 2) }])]
#[case::second_line("[[a]]\n[[b", Dialect::Double, vec![TagDiagnostic::UnterminatedTag { point: Point::new(2, 1, 6) }])]
#[case::unterminated_single("Hei [navn", Dialect::Single, vec![TagDiagnostic::UnterminatedTag { point: Point::new(1, 5, 4) }])]
#[case::well_formed("[[a]] og [[b]]", Dialect::Double, vec![])]
fn scan_reports_malformed_tags(
	#[case] markup: &str,
	#[case] dialect: Dialect,
	#[case] expected: Vec<TagDiagnostic>,
) {
	let (_, diagnostics) = scan_with_diagnostics(markup, dialect);
	assert_eq!(diagnostics, expected);
}

#[test]
fn malformed_tags_are_not_discovered() {
	let (tags, diagnostics) = scan_with_diagnostics("[[a]] [[b", Dialect::Double);
	assert_eq!(tags.into_vec(), vec!["a"]);
	assert_eq!(diagnostics.len(), 1);
	assert_eq!(diagnostics[0].message(), "unterminated tag at 1:7");
}

#[rstest]
#[case("salg/kontrakt.html", Dialect::Double)]
#[case("sms/bud.html", Dialect::Single)]
#[case("kunder/SMS/bud.v2.html", Dialect::Single)]
#[case("salg/smsvarsel.html", Dialect::Double)]
fn dialect_follows_path_segments(#[case] path: &str, #[case] expected: Dialect) {
	assert_eq!(Dialect::for_path(path), expected);
	assert_eq!(doc_path(path).dialect(), expected);
}

// Value resolution

#[rstest]
#[case::override_wins(Some("Kari"), Some("Ola"), "Kari", ValueSource::Override)]
#[case::empty_override_falls_through(Some(""), Some("Ola"), "Ola", ValueSource::Sample)]
#[case::empty_sample_is_kept(None, Some(""), "", ValueSource::Sample)]
#[case::fallback(None, None, "[[kjøper.navn]]", ValueSource::Fallback)]
fn resolution_precedence(
	#[case] override_value: Option<&str>,
	#[case] sample_value: Option<&str>,
	#[case] expected: &str,
	#[case] source: ValueSource,
) {
	let overrides = overrides(
		&override_value
			.map(|value| vec![("kjøper.navn", value)])
			.unwrap_or_default(),
	);
	let sample: SampleData = sample_value
		.map(|value| vec![("kjøper.navn", value)])
		.unwrap_or_default()
		.into_iter()
		.collect();

	let resolver = Resolver::new(Dialect::Double, &overrides, &sample);
	let resolution = resolver.resolve_with_source("kjøper.navn");
	assert_eq!(resolution.value, expected);
	assert_eq!(resolution.source, source);
}

#[test]
fn single_dialect_fallback_uses_single_brackets() {
	assert_eq!(resolve("navn", Dialect::Single, &NoValues, &NoValues), "[navn]");
}

#[test]
fn resolution_is_idempotent() {
	let sample = sample_data();
	let overrides = overrides(&[("eiendom.adresse", "Kirkeveien 2")]);
	let resolver = Resolver::new(Dialect::Double, &overrides, &sample);
	let markup = "[[kjøper.navn]] kjøper [[eiendom.adresse]] for [[pris]]";
	let tags = scan(markup, Dialect::Double);

	for name in &tags {
		assert_eq!(resolver.resolve(name), resolver.resolve(name));
	}
	assert_eq!(
		substitute_all(markup, &tags, &resolver),
		substitute_all(markup, &tags, &resolver)
	);
	assert_eq!(
		substitute_all(markup, &tags, &resolver),
		"Ola Nordmann kjøper Kirkeveien 2 for [[pris]]"
	);
}

#[test]
fn unresolved_tags_stay_visible() {
	let markup = "<p>Hei [[ukjent.felt]], se [[ukjent.felt]]</p>";
	let tags = scan(markup, Dialect::Double);
	let resolver = Resolver::new(Dialect::Double, &NoValues, &NoValues);

	assert_eq!(substitute_all(markup, &tags, &resolver), markup);
}

#[test]
fn single_dialect_leaves_outer_brackets_literal() {
	let markup = "Ref [[not.a.tag]]";
	let tags = scan(markup, Dialect::Single);

	let unresolved = Resolver::new(Dialect::Single, &NoValues, &NoValues);
	assert_eq!(substitute_all(markup, &tags, &unresolved), "Ref [[not.a.tag]]");

	let sample: SampleData = [("not.a.tag", "X")].into_iter().collect();
	let resolved = Resolver::new(Dialect::Single, &NoValues, &sample);
	assert_eq!(substitute_all(markup, &tags, &resolved), "Ref [X]");
}

#[test]
fn substituted_values_are_not_rescanned() {
	let sample: SampleData = [("a", "[[c]]"), ("c", "C")].into_iter().collect();
	let resolver = Resolver::new(Dialect::Double, &NoValues, &sample);
	let tags = scan("[[a]]", Dialect::Double);

	assert_eq!(substitute_all("[[a]]", &tags, &resolver), "[[c]]");
}

#[test]
fn resolve_all_reports_sources_in_discovery_order() {
	let sample = sample_data();
	let overrides = overrides(&[("mottaker.fornavn", "Lise")]);
	let resolver = Resolver::new(Dialect::Double, &overrides, &sample);
	let tags = scan("[[mottaker.fornavn]] [[kjøper.navn]] [[pris]]", Dialect::Double);

	let sources: Vec<(String, ValueSource)> = resolver
		.resolve_all(&tags)
		.into_iter()
		.map(|resolution| (resolution.name, resolution.source))
		.collect();
	assert_eq!(
		sources,
		vec![
			("mottaker.fornavn".to_string(), ValueSource::Override),
			("kjøper.navn".to_string(), ValueSource::Sample),
			("pris".to_string(), ValueSource::Fallback),
		]
	);
}

// Sample data

#[test]
fn sample_data_flattens_json() -> BrevmalResult<()> {
	let content = r#"{
		"kjøper": { "navn": "Ola", "adresse": { "by": "Oslo" } },
		"rom": ["stue", "kjøkken"],
		"pris": 3500000,
		"solgt": false,
		"megler": null
	}"#;
	let sample = SampleData::parse(content, "json", "sample.json")?;

	assert_eq!(sample.lookup("kjøper.navn").as_deref(), Some("Ola"));
	assert_eq!(sample.lookup("kjøper.adresse.by").as_deref(), Some("Oslo"));
	assert_eq!(sample.lookup("rom.1").as_deref(), Some("kjøkken"));
	assert_eq!(sample.lookup("pris").as_deref(), Some("3500000"));
	assert_eq!(sample.lookup("solgt").as_deref(), Some("false"));
	assert_eq!(sample.lookup("megler"), None);

	Ok(())
}

#[rstest]
#[case::toml("toml", "[kjøper]\nnavn = \"Ola\"\n\n[eiendom]\nareal = 84.5\n")]
#[case::yaml("yaml", "kjøper:\n  navn: Ola\neiendom:\n  areal: 84.5\n")]
fn sample_data_formats(#[case] format: &str, #[case] content: &str) -> BrevmalResult<()> {
	let sample = SampleData::parse(content, format, "sample")?;
	assert_eq!(sample.lookup("kjøper.navn").as_deref(), Some("Ola"));
	assert_eq!(sample.lookup("eiendom.areal").as_deref(), Some("84.5"));

	Ok(())
}

#[test]
fn sample_data_rejects_unknown_formats_and_non_tables() {
	assert!(matches!(
		SampleData::parse("<x/>", "xml", "sample.xml"),
		Err(BrevmalError::UnsupportedDataFormat(format)) if format == "xml"
	));
	assert!(matches!(
		SampleData::parse("[1, 2]", "json", "sample.json"),
		Err(BrevmalError::DataFile { .. })
	));
}

// Resource injection

#[rstest]
#[case::paired(r#"<div data-system-resource="system-style"></div>"#)]
#[case::self_closing("<div data-system-resource='system-style'/>")]
#[case::case_insensitive("<DIV class=\"x\" DATA-SYSTEM-RESOURCE=\"system-style\">old\ncontent</DIV>")]
fn marker_is_replaced_by_fragment(#[case] marker_markup: &str) -> BrevmalResult<()> {
	let marker = MarkerPattern::default().marker("system-style")?;
	let markup = format!("<p>a</p>{marker_markup}<p>b</p>");

	assert!(marker.is_present(&markup));
	assert_eq!(
		inject(&markup, &marker, Some("<style>#123456</style>")),
		"<p>a</p><style>#123456</style><p>b</p>"
	);

	Ok(())
}

#[test]
fn every_marker_occurrence_is_replaced() -> BrevmalResult<()> {
	let marker = MarkerPattern::default().marker("logo")?;
	let markup = r#"<div data-system-resource="logo"></div>|<div data-system-resource="logo"></div>"#;

	assert_eq!(inject(markup, &marker, Some("L")), "L|L");
	Ok(())
}

#[test]
fn injection_without_marker_or_fragment() -> BrevmalResult<()> {
	let marker = MarkerPattern::default().marker("logo")?;
	assert_eq!(inject("<p>uendret</p>", &marker, Some("L")), "<p>uendret</p>");
	assert_eq!(
		inject(r#"<p>a</p><div data-system-resource="logo"></div>"#, &marker, None),
		"<p>a</p>"
	);

	Ok(())
}

#[test]
fn fragments_are_inserted_verbatim() -> BrevmalResult<()> {
	let marker = MarkerPattern::default().marker("pris")?;
	let markup = r#"<div data-system-resource="pris"></div>"#;

	assert_eq!(inject(markup, &marker, Some("$1 [[pris]]")), "$1 [[pris]]");
	Ok(())
}

#[test]
fn custom_marker_pattern() -> BrevmalResult<()> {
	let pattern = MarkerPattern {
		element: "section".to_string(),
		attribute: "data-fragment".to_string(),
	};
	let markup = r#"<div data-system-resource="a"></div><section data-fragment="a">x</section>"#;

	assert_eq!(marker_names(markup, &pattern)?, vec!["a"]);
	assert_eq!(
		inject(markup, &pattern.marker("a")?, Some("A")),
		r#"<div data-system-resource="a"></div>A"#
	);

	Ok(())
}

#[test]
fn invalid_marker_pattern_is_rejected() {
	let pattern = MarkerPattern {
		element: "div>".to_string(),
		..MarkerPattern::default()
	};
	assert!(matches!(
		pattern.marker("a"),
		Err(BrevmalError::InvalidMarkerPattern(_))
	));
}

#[test]
fn marker_names_are_unique_in_order() -> BrevmalResult<()> {
	let markup = concat!(
		r#"<div data-system-resource="b"></div>"#,
		r#"<div data-system-resource='a'></div>"#,
		r#"<div data-system-resource="b"/>"#,
	);
	assert_eq!(marker_names(markup, &MarkerPattern::default())?, vec!["b", "a"]);

	Ok(())
}

#[rstest]
#[case::outer_first(
	"<div data-system-resource=\"a\"></div><div data-system-resource=\"b\"></div>",
	"<section><div data-system-resource=\"b\"></div></section>B!"
)]
#[case::inner_first(
	"<div data-system-resource=\"b\"></div><div data-system-resource=\"a\"></div>",
	"B!<section><div data-system-resource=\"b\"></div></section>"
)]
fn markers_inside_fragments_are_kept(
	#[case] markup: &str,
	#[case] expected: &str,
) -> BrevmalResult<()> {
	let store = MemoryFragmentStore::new()
		.with("a", r#"<section><div data-system-resource="b"></div></section>"#)
		.with("b", "B!");

	let (injected, warnings) = inject_all(markup, &MarkerPattern::default(), &store)?;

	assert_eq!(injected, expected);
	assert!(warnings.is_empty());

	Ok(())
}

struct CountingFragments {
	inner: MemoryFragmentStore,
	reads: AtomicUsize,
}

impl FragmentStore for CountingFragments {
	fn read_fragment(&self, name: &str) -> BrevmalResult<Option<String>> {
		self.reads.fetch_add(1, Ordering::SeqCst);
		self.inner.read_fragment(name)
	}
}

#[test]
fn injector_fetches_each_fragment_once() -> BrevmalResult<()> {
	let store = CountingFragments {
		inner: fragment_store(),
		reads: AtomicUsize::new(0),
	};
	let pattern = MarkerPattern::default();
	let mut injector = Injector::new(&pattern, &store);
	let markup = r#"<div data-system-resource="system-style"></div>"#;

	assert_eq!(injector.inject(markup)?, "<style>#123456</style>");
	assert_eq!(injector.inject(markup)?, "<style>#123456</style>");
	assert_eq!(store.reads.load(Ordering::SeqCst), 1);

	Ok(())
}

#[traced_test]
#[test]
fn missing_fragment_warns_and_continues() -> BrevmalResult<()> {
	let store = fragment_store();
	let (injected, warnings) = inject_all(
		r#"<p>a</p><div data-system-resource="finnes-ikke"></div>"#,
		&MarkerPattern::default(),
		&store,
	)?;

	assert_eq!(injected, "<p>a</p>");
	assert_eq!(
		warnings,
		vec![RenderWarning::MissingFragment {
			name: "finnes-ikke".to_string()
		}]
	);
	assert!(logs_contain("missing fragment"));

	Ok(())
}

// Channel rendering

#[test]
fn print_shell_uses_margins() {
	let options = RenderOptions {
		margins: Margins::new(
			Length::mm(25.0),
			Length::mm(15.0),
			Length::mm(20.0),
			Length::mm(15.0),
		),
		..RenderOptions::default()
	};
	let output = render(RenderParts::body("<p>Hei</p>"), RenderTarget::Print, &options);

	assert_eq!(
		output,
		concat!(
			"<!DOCTYPE html>\n",
			"<html>\n",
			"<head>\n",
			"<meta charset=\"utf-8\">\n",
			"<style>@page { size: A4; margin: 0; } body { margin: 0; padding: 25mm 15mm 20mm 15mm; }</style>\n",
			"</head>\n",
			"<body>\n",
			"<p>Hei</p>\n",
			"</body>\n",
			"</html>\n",
		)
	);
}

#[test]
fn email_shells_force_zero_padding() {
	let parts = RenderParts {
		head: "<header>H</header>",
		body: "<p>B</p>",
		foot: "<footer>F</footer>\n",
	};
	let desktop = render(parts, RenderTarget::DesktopEmail, &RenderOptions::default());
	let mobile = render(parts, RenderTarget::MobileEmail, &RenderOptions::default());

	assert_eq!(
		desktop,
		concat!(
			"<!DOCTYPE html>\n",
			"<html>\n",
			"<head>\n",
			"<meta charset=\"utf-8\">\n",
			"<style>body { margin: 0; padding: 0; }</style>\n",
			"</head>\n",
			"<body>\n",
			"<header>H</header>\n",
			"<p>B</p>\n",
			"<footer>F</footer>\n",
			"</body>\n",
			"</html>\n",
		)
	);
	assert!(!desktop.contains("viewport"));
	assert!(mobile.contains(
		"<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n"
	));
	assert!(mobile.contains("padding: 0;"));
}

#[test]
fn sms_output_is_the_body() {
	let parts = RenderParts {
		head: "H",
		body: "Hei Kari",
		foot: "F",
	};
	assert_eq!(
		render(parts, RenderTarget::Sms, &RenderOptions::default()),
		"Hei Kari"
	);
}

#[test]
fn style_links_and_cache_bust_token() {
	let mut options = RenderOptions {
		style_refs: vec!["base".to_string(), "salg".to_string()],
		style_base: "https://cdn.example.com/s/".to_string(),
		cache_bust: CacheBust::Fixed("r42".to_string()),
		..RenderOptions::default()
	};
	let fixed = render(RenderParts::body("x"), RenderTarget::Print, &options);
	assert!(fixed.contains(
		"<link rel=\"stylesheet\" href=\"https://cdn.example.com/s/base.css?v=r42\">\n<link rel=\"stylesheet\" href=\"https://cdn.example.com/s/salg.css?v=r42\">\n"
	));

	options.cache_bust = CacheBust::None;
	let first = render(RenderParts::body("x"), RenderTarget::DesktopEmail, &options);
	let second = render(RenderParts::body("x"), RenderTarget::DesktopEmail, &options);
	assert_eq!(first, second);
	assert!(first.contains("href=\"https://cdn.example.com/s/base.css\""));

	options.cache_bust = CacheBust::Timestamp;
	let stamped = render(RenderParts::body("x"), RenderTarget::DesktopEmail, &options);
	let without_links = |output: &str| {
		output
			.lines()
			.filter(|line| !line.starts_with("<link"))
			.collect::<Vec<_>>()
			.join("\n")
	};
	assert_eq!(without_links(&stamped), without_links(&first));
	assert!(stamped.contains("base.css?v="));
}

#[rstest]
#[case("print", RenderTarget::Print)]
#[case("desktop-email", RenderTarget::DesktopEmail)]
#[case("Mobile-Email", RenderTarget::MobileEmail)]
#[case(" sms ", RenderTarget::Sms)]
fn parse_render_targets(#[case] value: &str, #[case] expected: RenderTarget) -> BrevmalResult<()> {
	assert_eq!(parse_target(value)?, expected);
	Ok(())
}

#[test]
fn unknown_render_target_fails() {
	assert!(matches!(
		parse_target("fax"),
		Err(BrevmalError::UnsupportedRenderTarget(target)) if target == "fax"
	));
}

#[rstest]
#[case("20mm", Length::mm(20.0))]
#[case("2.5cm", Length::new(2.5, LengthUnit::Cm))]
#[case("1in", Length::new(1.0, LengthUnit::In))]
#[case("12", Length::mm(12.0))]
#[case(" 0 PX ", Length::new(0.0, LengthUnit::Px))]
fn parse_lengths(#[case] value: &str, #[case] expected: Length) -> BrevmalResult<()> {
	assert_eq!(value.parse::<Length>()?, expected);
	Ok(())
}

#[rstest]
#[case("-1mm")]
#[case("5em")]
#[case("mm")]
#[case("inf")]
fn invalid_lengths(#[case] value: &str) {
	assert!(matches!(
		value.parse::<Length>(),
		Err(BrevmalError::InvalidLength(_))
	));
}

#[test]
fn margins_deserialize_with_defaults() -> Result<(), toml::de::Error> {
	let margins: Margins = toml::from_str("top = \"25mm\"\nbottom = 15\n")?;

	assert_eq!(margins.to_css(), "25mm 20mm 15mm 20mm");
	Ok(())
}

// Versioning

#[rstest]
#[case(1)]
#[case(2)]
#[case(7)]
#[case(42)]
fn version_round_trip(#[case] version: u32) {
	let parsed = version::parse(&version::format("salg/kontrakt", version));
	assert_eq!(parsed.base, "salg/kontrakt");
	assert_eq!(parsed.version, version);
}

#[rstest]
#[case::unversioned("kontrakt.html", "kontrakt", 1, false)]
#[case::versioned("salg/kontrakt.v3.html", "salg/kontrakt", 3, true)]
#[case::zero_is_not_a_version("kontrakt.v0.html", "kontrakt.v0", 1, false)]
#[case::leading_zeros("kontrakt.v007.html", "kontrakt", 7, true)]
#[case::last_suffix_wins("kontrakt.v2.v3.html", "kontrakt.v2", 3, true)]
#[case::overflow("kontrakt.v99999999999.html", "kontrakt.v99999999999", 1, false)]
#[case::other_extension("notat.txt", "notat.txt", 1, false)]
fn parse_versioned_names(
	#[case] filename: &str,
	#[case] base: &str,
	#[case] version: u32,
	#[case] explicit: bool,
) {
	assert_eq!(
		version::parse(filename),
		VersionedName {
			base: base.to_string(),
			version,
			explicit,
		}
	);
}

#[rstest]
#[case("kontrakt.html", "kontrakt.v2.html")]
#[case("salg/kontrakt.v2.html", "salg/kontrakt.v3.html")]
fn next_version_filenames(#[case] filename: &str, #[case] expected: &str) {
	assert_eq!(version::next_version(filename), expected);
}

#[test]
fn lineage_orders_versions_and_never_fills_gaps() {
	let lineage = Lineage::from_paths(
		"salg/kontrakt",
		[
			"salg/kontrakt.v4.html",
			"salg/kontrakt.html",
			"salg/annet.html",
			"salg/kontrakt.v2.html",
		],
	);

	assert_eq!(
		lineage
			.entries()
			.iter()
			.map(|entry| entry.version)
			.collect::<Vec<_>>(),
		vec![1, 2, 4]
	);
	assert_eq!(
		lineage.current().map(|entry| entry.path.as_str()),
		Some("salg/kontrakt.v4.html")
	);
	assert_eq!(lineage.next_free_version(), 5);
	assert_eq!(lineage.next_filename(), "salg/kontrakt.v5.html");

	let empty = Lineage::from_paths("ny", Vec::<String>::new());
	assert!(empty.is_empty());
	assert_eq!(empty.next_filename(), "ny.html");
}

// Documents

#[test]
fn document_path_parts() {
	let path = doc_path("salg/kontrakt.v2.html");
	assert_eq!(path.category(), Some("salg"));
	assert_eq!(path.file_name(), "kontrakt.v2.html");
	assert_eq!(path.base_name(), "kontrakt");
	assert_eq!(path.version(), 2);
	assert_eq!(doc_path("kontrakt.html").category(), None);
	assert_eq!(doc_path(".\\salg\\kontrakt.html").as_str(), "salg/kontrakt.html");
}

#[rstest]
#[case("")]
#[case("/salg/kontrakt.html")]
#[case("../kontrakt.html")]
#[case("salg//kontrakt.html")]
#[case("salg/./kontrakt.html")]
#[case("C:/kontrakt.html")]
fn invalid_document_paths(#[case] path: &str) {
	assert!(matches!(
		DocumentPath::new(path),
		Err(BrevmalError::InvalidDocumentPath(_))
	));
}

#[test]
fn library_lifecycle() -> BrevmalResult<()> {
	let store = MemoryDocumentStore::new();
	let library = DocumentLibrary::new(&store);
	let metadata = DocumentMetadata::default();

	let created = library.create("salg", "kontrakt")?;
	assert_eq!(created.path.as_str(), "salg/kontrakt.html");
	assert_eq!(created.content, "");
	assert!(matches!(
		library.create("salg", "kontrakt"),
		Err(BrevmalError::DocumentExists(_))
	));

	let v2 = library.save(&created.path, "<p>v2</p>", &metadata, SaveMode::NewVersion)?;
	assert_eq!(v2.as_str(), "salg/kontrakt.v2.html");
	let v3 = library.save(&created.path, "<p>v3</p>", &metadata, SaveMode::NewVersion)?;
	assert_eq!(v3.as_str(), "salg/kontrakt.v3.html");

	library.delete(&v2)?;
	let v4 = library.save(&created.path, "<p>v4</p>", &metadata, SaveMode::NewVersion)?;
	assert_eq!(v4.as_str(), "salg/kontrakt.v4.html");

	let overwritten = library.save(&v3, "<p>v3b</p>", &metadata, SaveMode::Overwrite)?;
	assert_eq!(overwritten, v3);
	assert_eq!(library.open(&v3)?.content, "<p>v3b</p>");

	let versions: Vec<u32> = library
		.lineage(&created.path)?
		.entries()
		.iter()
		.map(|entry| entry.version)
		.collect();
	assert_eq!(versions, vec![1, 3, 4]);
	assert_eq!(library.current(&created.path)?.content, "<p>v4</p>");

	Ok(())
}

#[test]
fn duplicate_copies_content_and_metadata() -> BrevmalResult<()> {
	let store = MemoryDocumentStore::new();
	store.insert(
		doc_path("maler/standard.html"),
		StoredDocument::new("<p>[[kjøper.navn]]</p>").with_metadata(letter_metadata()),
	);
	let library = DocumentLibrary::new(&store);

	let copy = library.duplicate(&doc_path("maler/standard.html"), "salg", "tilbud")?;
	assert_eq!(copy.path.as_str(), "salg/tilbud.html");
	assert_eq!(copy.content, "<p>[[kjøper.navn]]</p>");
	assert_eq!(library.open(&copy.path)?.metadata, letter_metadata());

	Ok(())
}

#[test]
fn missing_documents_are_reported() {
	let store = MemoryDocumentStore::new();
	let library = DocumentLibrary::new(&store);

	assert!(matches!(
		library.open(&doc_path("salg/borte.html")),
		Err(BrevmalError::DocumentNotFound(_))
	));
	assert!(matches!(
		library.delete(&doc_path("salg/borte.html")),
		Err(BrevmalError::DocumentNotFound(_))
	));
}

#[test]
fn metadata_json_shape() -> Result<(), serde_json::Error> {
	let metadata: DocumentMetadata = serde_json::from_str(
		r#"{ "subject": "Hei", "margins": { "top": "25mm", "left": 10 }, "style": "standard" }"#,
	)?;

	assert_eq!(metadata.subject.as_deref(), Some("Hei"));
	assert_eq!(
		metadata.margins.map(|margins| margins.to_css()).as_deref(),
		Some("25mm 20mm 20mm 10mm")
	);
	assert_eq!(
		serde_json::to_string(&DocumentMetadata {
			style: Some("standard".to_string()),
			..DocumentMetadata::default()
		})?,
		r#"{"style":"standard"}"#
	);

	Ok(())
}

// Filesystem stores

#[test]
fn fs_store_round_trip_with_sidecar() -> BrevmalResult<()> {
	let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("failed to create tempdir: {e}"));
	let store = FsDocumentStore::new(dir.path());
	let path = doc_path("salg/kontrakt.html");

	store.write(
		&path,
		&StoredDocument::new("<p>Hei</p>").with_metadata(letter_metadata()),
	)?;
	assert!(dir.path().join("salg/kontrakt.html.meta.json").is_file());

	let read = store.read(&path)?;
	assert_eq!(read.content, "<p>Hei</p>");
	assert_eq!(read.metadata, letter_metadata());

	store.write(&path, &StoredDocument::new("<p>Hei igjen</p>"))?;
	assert!(!dir.path().join("salg/kontrakt.html.meta.json").exists());

	store.delete(&path)?;
	assert!(!store.exists(&path)?);

	Ok(())
}

#[test]
fn fs_store_lists_html_documents() -> BrevmalResult<()> {
	let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("failed to create tempdir: {e}"));
	write_file(dir.path(), "sms/bud.html", "Hei [mottaker.fornavn]");
	write_file(dir.path(), "salg/kontrakt.v2.html", "<p>v2</p>");
	write_file(dir.path(), "salg/kontrakt.html", "<p>v1</p>");
	write_file(dir.path(), "salg/kontrakt.html.meta.json", "{}");
	write_file(dir.path(), "salg/notat.txt", "x");
	write_file(dir.path(), ".skjult/hemmelig.html", "x");
	write_file(dir.path(), "utkast/kladd.html", "x");

	let store = FsDocumentStore::new(dir.path()).with_exclude(&["utkast/".to_string()])?;
	let paths: Vec<String> = store
		.list()?
		.into_iter()
		.map(|entry| entry.path.to_string())
		.collect();

	assert_eq!(
		paths,
		vec!["salg/kontrakt.html", "salg/kontrakt.v2.html", "sms/bud.html"]
	);

	Ok(())
}

#[test]
fn fs_store_reports_unreadable_documents() -> BrevmalResult<()> {
	let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("failed to create tempdir: {e}"));
	write_file(dir.path(), "stor.html", "<p>altfor langt innhold</p>");
	write_file(dir.path(), "binær.html", [0xff, 0xfe, 0x00]);
	let store = FsDocumentStore::new(dir.path()).with_max_file_size(16);

	let entries = store.list()?;
	let large = entries
		.iter()
		.find(|entry| entry.path.as_str() == "stor.html")
		.unwrap_or_else(|| panic!("missing entry"));
	assert!(matches!(
		&large.status,
		EntryStatus::Unreadable { reason } if reason.contains("file too large")
	));
	assert!(matches!(
		store.read(&doc_path("stor.html")),
		Err(BrevmalError::FileTooLarge { .. })
	));
	assert!(matches!(
		store.read(&doc_path("binær.html")),
		Err(BrevmalError::InvalidEncoding { .. })
	));

	Ok(())
}

#[test]
fn fs_fragment_store() -> BrevmalResult<()> {
	let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("failed to create tempdir: {e}"));
	write_file(dir.path(), "system-style.html", "<style>#123456</style>");
	let store = FsFragmentStore::new(dir.path());

	assert_eq!(
		store.read_fragment("system-style")?.as_deref(),
		Some("<style>#123456</style>")
	);
	assert_eq!(store.read_fragment("ukjent")?, None);
	assert!(matches!(
		store.read_fragment("../hemmelig"),
		Err(BrevmalError::InvalidFragmentName(_))
	));

	Ok(())
}

// Pipeline

#[test]
fn print_end_to_end() -> BrevmalResult<()> {
	let documents = document_store(&[(
		"salg/kontrakt.html",
		"<p>Hei [[kjøper.navn]], pris er [[pris]]</p>",
	)]);
	let fragments = fragment_store();
	let config = RenderConfig::default();
	let pipeline = Pipeline::new(&documents, &fragments, &config);

	let rendered = pipeline.render_document(
		&doc_path("salg/kontrakt.html"),
		RenderTarget::Print,
		&NoValues,
		&sample_data(),
	)?;

	assert_eq!(
		rendered.content,
		concat!(
			"<!DOCTYPE html>\n",
			"<html>\n",
			"<head>\n",
			"<meta charset=\"utf-8\">\n",
			"<style>@page { size: A4; margin: 0; } body { margin: 0; padding: 20mm 20mm 20mm 20mm; }</style>\n",
			"</head>\n",
			"<body>\n",
			"<p>Hei Ola Nordmann, pris er [[pris]]</p>\n",
			"</body>\n",
			"</html>\n",
		)
	);
	assert_eq!(rendered.subject, None);
	assert_eq!(rendered.tags.clone().into_vec(), vec!["kjøper.navn", "pris"]);
	assert!(rendered.warnings.is_empty());

	Ok(())
}

#[test]
fn sms_end_to_end() -> BrevmalResult<()> {
	let documents = document_store(&[(
		"sms/bud.html",
		"Hei [mottaker.fornavn], ditt bud er mottatt",
	)]);
	let fragments = fragment_store();
	let config = RenderConfig::default();
	let pipeline = Pipeline::new(&documents, &fragments, &config);

	let rendered = pipeline.render_document(
		&doc_path("sms/bud.html"),
		RenderTarget::Sms,
		&NoValues,
		&sample_data(),
	)?;

	insta::assert_snapshot!(rendered.content, @"Hei Kari, ditt bud er mottatt");
	Ok(())
}

#[test]
fn injection_end_to_end() -> BrevmalResult<()> {
	let documents = document_store(&[(
		"salg/kontrakt.html",
		"<div data-system-resource=\"system-style\"></div>\n<p>Hei [[kjøper.navn]]</p>",
	)]);
	let fragments = MemoryFragmentStore::new().with("system-style", "<style>[[brand.color]]</style>");
	let sample: SampleData = [("brand.color", "#123456"), ("kjøper.navn", "Ola Nordmann")]
		.into_iter()
		.collect();
	let config = RenderConfig::default();
	let pipeline = Pipeline::new(&documents, &fragments, &config);

	let rendered = pipeline.render_document(
		&doc_path("salg/kontrakt.html"),
		RenderTarget::DesktopEmail,
		&NoValues,
		&sample,
	)?;

	assert!(rendered.content.contains("<style>#123456</style>\n<p>Hei Ola Nordmann</p>"));
	assert!(!rendered.content.contains("data-system-resource"));
	assert!(!rendered.content.contains("[[brand.color]]"));
	assert_eq!(rendered.tags.clone().into_vec(), vec!["brand.color", "kjøper.navn"]);

	Ok(())
}

#[test]
fn fragment_tags_are_resolved_with_the_body() -> BrevmalResult<()> {
	let documents = MemoryDocumentStore::new();
	documents.insert(
		doc_path("salg/kontrakt.html"),
		StoredDocument::new("<p>Hei [[kjøper.navn]]</p>").with_metadata(letter_metadata()),
	);
	let fragments = fragment_store();
	let config = RenderConfig::default();
	let pipeline = Pipeline::new(&documents, &fragments, &config);

	let rendered = pipeline.render_document(
		&doc_path("salg/kontrakt.html"),
		RenderTarget::DesktopEmail,
		&overrides(&[("kjøper.navn", "Lise Hansen")]),
		&sample_data(),
	)?;

	assert_eq!(
		rendered.content,
		concat!(
			"<!DOCTYPE html>\n",
			"<html>\n",
			"<head>\n",
			"<meta charset=\"utf-8\">\n",
			"<style>body { margin: 0; padding: 0; }</style>\n",
			"</head>\n",
			"<body>\n",
			"<header>Per Megler</header>\n",
			"<p>Hei Lise Hansen</p>\n",
			"<footer>Org.nr 987 654 321</footer>\n",
			"</body>\n",
			"</html>\n",
		)
	);
	assert_eq!(rendered.subject.as_deref(), Some("Kontrakt for Storgata 1"));
	assert_eq!(
		rendered.tags.clone().into_vec(),
		vec!["eiendom.adresse", "megler.navn", "kjøper.navn", "firma.orgnr"]
	);

	Ok(())
}

#[test]
fn marker_fragments_with_tags_are_resolved() -> BrevmalResult<()> {
	let documents = document_store(&[(
		"salg/kontrakt.html",
		"<p>Tekst</p><div data-system-resource=\"bunntekst\"></div>",
	)]);
	let fragments = fragment_store();
	let config = RenderConfig::default();
	let pipeline = Pipeline::new(&documents, &fragments, &config);

	let rendered = pipeline.render_document(
		&doc_path("salg/kontrakt.html"),
		RenderTarget::Print,
		&NoValues,
		&sample_data(),
	)?;

	assert!(rendered.content.contains("<footer>Org.nr 987 654 321</footer>"));
	assert!(rendered.tags.contains("firma.orgnr"));

	Ok(())
}

#[rstest]
#[case("salg/kontrakt.html", RenderTarget::Sms)]
#[case("sms/bud.html", RenderTarget::Print)]
#[case("sms/bud.html", RenderTarget::MobileEmail)]
fn target_must_match_dialect(#[case] path: &str, #[case] target: RenderTarget) {
	let documents = document_store(&[(path, "Hei")]);
	let fragments = fragment_store();
	let config = RenderConfig::default();
	let pipeline = Pipeline::new(&documents, &fragments, &config);

	assert!(matches!(
		pipeline.render_document(&doc_path(path), target, &NoValues, &NoValues),
		Err(BrevmalError::TargetDialectMismatch { .. })
	));
}

#[traced_test]
#[test]
fn missing_header_fragment_is_a_warning() -> BrevmalResult<()> {
	let documents = MemoryDocumentStore::new();
	documents.insert(
		doc_path("salg/kontrakt.html"),
		StoredDocument::new("<p>Hei</p>").with_metadata(DocumentMetadata {
			header: Some("slettet-hode".to_string()),
			..DocumentMetadata::default()
		}),
	);
	let fragments = fragment_store();
	let config = RenderConfig::default();
	let pipeline = Pipeline::new(&documents, &fragments, &config);

	let rendered = pipeline.render_document(
		&doc_path("salg/kontrakt.html"),
		RenderTarget::Print,
		&NoValues,
		&NoValues,
	)?;

	assert!(rendered.content.contains("<body>\n<p>Hei</p>\n</body>"));
	assert_eq!(
		rendered.warnings,
		vec![RenderWarning::MissingFragment {
			name: "slettet-hode".to_string()
		}]
	);
	assert!(logs_contain("missing fragment"));

	Ok(())
}

#[test]
fn metadata_overrides_configured_render_options() -> BrevmalResult<()> {
	let documents = MemoryDocumentStore::new();
	documents.insert(
		doc_path("salg/kontrakt.html"),
		StoredDocument::new("<p>x</p>").with_metadata(DocumentMetadata {
			margins: Some(Margins::uniform(Length::mm(10.0))),
			style: Some("salg".to_string()),
			..DocumentMetadata::default()
		}),
	);
	let fragments = fragment_store();
	let config = RenderConfig {
		styles: vec!["base".to_string()],
		..RenderConfig::default()
	};
	let pipeline = Pipeline::new(&documents, &fragments, &config);

	let rendered = pipeline.render_document(
		&doc_path("salg/kontrakt.html"),
		RenderTarget::Print,
		&NoValues,
		&NoValues,
	)?;

	assert!(rendered.content.contains(
		"<link rel=\"stylesheet\" href=\"/styles/base.css\">\n<link rel=\"stylesheet\" href=\"/styles/salg.css\">\n"
	));
	assert!(rendered.content.contains("padding: 10mm 10mm 10mm 10mm;"));

	Ok(())
}

#[test]
fn rejected_fragment_names_are_missing_fragments() -> BrevmalResult<()> {
	let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("failed to create tempdir: {e}"));
	let documents = document_store(&[(
		"salg/k.html",
		r#"<div data-system-resource=""></div><p>Hei</p><div data-system-resource="../hemmelig"></div>"#,
	)]);
	let fragments = FsFragmentStore::new(dir.path());
	let config = RenderConfig::default();
	let pipeline = Pipeline::new(&documents, &fragments, &config);

	let rendered = pipeline.render_document(
		&doc_path("salg/k.html"),
		RenderTarget::Print,
		&NoValues,
		&NoValues,
	)?;

	assert!(rendered.content.contains("<body>\n<p>Hei</p>\n</body>"));
	assert!(!rendered.content.contains("data-system-resource"));
	assert_eq!(
		rendered.warnings,
		vec![
			RenderWarning::MissingFragment {
				name: String::new()
			},
			RenderWarning::MissingFragment {
				name: "../hemmelig".to_string()
			},
		]
	);

	Ok(())
}

#[test]
fn scan_document_includes_fragments_and_diagnostics() -> BrevmalResult<()> {
	let documents = MemoryDocumentStore::new();
	documents.insert(
		doc_path("salg/kontrakt.html"),
		StoredDocument::new("<p>[[kjøper.navn]] [[pris</p>").with_metadata(letter_metadata()),
	);
	let fragments = fragment_store();
	let config = RenderConfig::default();
	let pipeline = Pipeline::new(&documents, &fragments, &config);

	let scanned = pipeline.scan_document(&doc_path("salg/kontrakt.html"))?;
	assert_eq!(scanned.dialect, Dialect::Double);
	assert_eq!(
		scanned.tags.into_vec(),
		vec!["eiendom.adresse", "megler.navn", "kjøper.navn", "firma.orgnr"]
	);
	assert_eq!(
		scanned.diagnostics,
		vec![TagDiagnostic::UnterminatedTag {
			point: Point::new(1, 21, 20)
		}]
	);

	Ok(())
}

// Markup structure

#[rstest]
#[case::implicit_paragraphs("<div><p>a<p>b</div>")]
#[case::implicit_list_items("<ul><li>a<li>b</ul>")]
#[case::implicit_cells("<table><tr><td>1<td>2</table>")]
#[case::void_elements("<p><img src=x><br>linje<br/></p>")]
#[case::raw_text("<script>if (a < b && c > d) { x('</div>'); }</script>")]
#[case::comment("<!-- <div> --><p>ok</p>")]
#[case::quoted_angle("<a title=\"x > y\">t</a>")]
#[case::document("<!DOCTYPE html><html><head><title>T</title></head><body><p>x</p></body></html>")]
#[case::tags_in_attributes("<a href=\"[[lenke]]\">[[tekst]]</a>")]
fn well_formed_markup(#[case] markup: &str) {
	assert!(check_well_formed(markup).is_empty());
}

#[rstest]
#[case::unexpected_close("<div></span></div>", MarkupIssue::UnexpectedClose { name: "span".to_string() }, Point::new(1, 6, 5))]
#[case::mismatched_close("<div><span></div>", MarkupIssue::MismatchedClose { expected: "span".to_string(), found: "div".to_string() }, Point::new(1, 12, 11))]
#[case::unclosed("<p>x</p>\n<div>", MarkupIssue::UnclosedElement { name: "div".to_string() }, Point::new(2, 1, 9))]
#[case::unterminated_comment("<!-- åpen", MarkupIssue::UnterminatedComment, Point::new(1, 1, 0))]
#[case::unterminated_start_tag("<div class=\"a", MarkupIssue::UnterminatedStartTag { name: "div".to_string() }, Point::new(1, 1, 0))]
#[case::unclosed_raw_text("<style>p {}", MarkupIssue::UnclosedElement { name: "style".to_string() }, Point::new(1, 1, 0))]
fn malformed_markup(#[case] markup: &str, #[case] issue: MarkupIssue, #[case] point: Point) {
	assert_eq!(
		check_well_formed(markup),
		vec![MarkupDiagnostic { issue, point }]
	);
}

// Sanitizing

#[test]
fn sanitize_legacy_document() -> BrevmalResult<()> {
	let content = concat!(
		"\u{feff}<p>Hei [[ kjøper.navn ]]</p>\r\n",
		"<script>alert(1)</script>\r\n",
		"<a href=\"javascript:void(0)\" onclick=\"x()\">lenke</a>\r\n",
	);
	let sanitized = sanitize_document(
		&doc_path("import/brev.html"),
		content,
		&SanitizeOptions::default(),
	)?;

	assert_eq!(
		sanitized.content,
		"<p>Hei [[kjøper.navn]]</p>\n\n<a href=\"#\">lenke</a>\n"
	);
	assert_eq!(
		sanitized.changes,
		vec![
			"removed byte order mark",
			"normalized line endings",
			"removed 1 script element(s)",
			"removed 1 event handler attribute(s)",
			"neutralized 1 javascript: URL(s)",
			"normalized whitespace in 1 tag(s)",
		]
	);

	Ok(())
}

#[test]
fn sanitize_rewrites_can_be_disabled() -> BrevmalResult<()> {
	let options = SanitizeOptions {
		strip_scripts: false,
		normalize_tag_whitespace: false,
		..SanitizeOptions::default()
	};
	let content = "<p onload='x()'>[[ navn ]]</p><script>y()</script>";
	let sanitized = sanitize_document(&doc_path("import/brev.html"), content, &options)?;

	assert_eq!(sanitized.content, "<p>[[ navn ]]</p><script>y()</script>");
	assert_eq!(
		sanitized.changes,
		vec!["removed 1 event handler attribute(s)"]
	);

	Ok(())
}

#[test]
fn sanitize_sms_uses_single_brackets() -> BrevmalResult<()> {
	let sanitized = sanitize_document(
		&doc_path("sms/bud.html"),
		"Hei [ mottaker.fornavn ] <3",
		&SanitizeOptions::default(),
	)?;

	assert_eq!(sanitized.content, "Hei [mottaker.fornavn] <3");
	Ok(())
}

#[test]
fn scripts_are_removed_before_checking_tags() -> BrevmalResult<()> {
	let sanitized = sanitize_document(
		&doc_path("import/brev.html"),
		"<script>var m = [[1,2],[3,4]];</script>\n<p>Hei [[ navn ]]</p>",
		&SanitizeOptions::default(),
	)?;

	assert_eq!(sanitized.content, "\n<p>Hei [[navn]]</p>");
	assert_eq!(
		sanitized.changes,
		vec!["removed 1 script element(s)", "normalized whitespace in 1 tag(s)"]
	);

	Ok(())
}

#[rstest]
#[case::stray_close("<p>Se vedlegg ]] nederst</p>", "kept unmatched tag close at 1:15 as text")]
#[case::unterminated("<p>Hei [[navn</p>", "kept unterminated tag at 1:8 as text")]
fn stray_brackets_are_noted(#[case] content: &str, #[case] note: &str) -> BrevmalResult<()> {
	let sanitized = sanitize_document(
		&doc_path("import/brev.html"),
		content,
		&SanitizeOptions::default(),
	)?;

	assert_eq!(sanitized.content, content);
	assert_eq!(sanitized.changes, vec![note]);

	Ok(())
}

#[test]
fn sanitize_rejects_malformed_markup() {
	let result = sanitize_document(
		&doc_path("import/brev.html"),
		"<div><span></div>",
		&SanitizeOptions::default(),
	);

	assert!(matches!(
		result,
		Err(BrevmalError::MalformedMarkup { reason, .. })
			if reason == "expected `</span>` but found `</div>` at 1:12"
	));
}

#[test]
fn batch_isolates_failures() -> BrevmalResult<()> {
	let source = document_store(&[
		("brev/a.html", "<p>Hei [[ kjøper.navn ]]</p>"),
		("brev/b.html", "<div><span></div>"),
		("brev/c.html", "<p>Ha det</p>"),
	]);
	let dest = MemoryDocumentStore::new();
	let batch = SanitizerBatch::new(SanitizeOptions {
		workers: Some(2),
		..SanitizeOptions::default()
	});

	let report = batch.run(&source, &dest, &CancelFlag::new())?;

	assert_eq!(report.results.len(), 3);
	assert_eq!(
		report
			.results
			.iter()
			.map(|result| (result.path.to_string(), result.success))
			.collect::<Vec<_>>(),
		vec![
			("brev/a.html".to_string(), true),
			("brev/b.html".to_string(), false),
			("brev/c.html".to_string(), true),
		]
	);
	assert_eq!(
		report.results[1].error.as_deref(),
		Some("expected `</span>` but found `</div>` at 1:12")
	);
	assert_eq!((report.succeeded, report.failed), (2, 1));
	assert!(!report.is_ok());
	assert_eq!(
		report.log,
		concat!(
			"ok   brev/a.html (1 change(s))\n",
			"FAIL brev/b.html: expected `</span>` but found `</div>` at 1:12\n",
			"ok   brev/c.html (0 change(s))\n",
			"2 succeeded, 1 failed, 3 total",
		)
	);

	assert_eq!(dest.read(&doc_path("brev/a.html"))?.content, "<p>Hei [[kjøper.navn]]</p>");
	assert!(!dest.exists(&doc_path("brev/b.html"))?);
	assert!(dest.exists(&doc_path("brev/c.html"))?);

	Ok(())
}

#[test]
fn batch_dry_run_writes_nothing() -> BrevmalResult<()> {
	let source = document_store(&[("brev/a.html", "<p>a</p>")]);
	let dest = MemoryDocumentStore::new();

	let report = SanitizerBatch::default()
		.dry_run(true)
		.run(&source, &dest, &CancelFlag::new())?;

	assert!(report.is_ok());
	assert!(dest.is_empty());

	Ok(())
}

#[test]
fn cancelled_batch_starts_no_files() -> BrevmalResult<()> {
	let source = document_store(&[("brev/a.html", "<p>a</p>"), ("brev/b.html", "<p>b</p>")]);
	let dest = MemoryDocumentStore::new();
	let cancel = CancelFlag::new();
	cancel.cancel();

	let report = SanitizerBatch::default().run(&source, &dest, &cancel)?;

	assert!(report.cancelled);
	assert!(report.results.is_empty());
	assert_eq!(report.log, "0 succeeded, 0 failed, 0 total (cancelled)");

	Ok(())
}

struct CancellingStore {
	inner: MemoryDocumentStore,
	cancel: CancelFlag,
}

impl DocumentStore for CancellingStore {
	fn read(&self, path: &DocumentPath) -> BrevmalResult<StoredDocument> {
		self.cancel.cancel();
		self.inner.read(path)
	}

	fn write(&self, path: &DocumentPath, document: &StoredDocument) -> BrevmalResult<()> {
		self.inner.write(path, document)
	}

	fn delete(&self, path: &DocumentPath) -> BrevmalResult<()> {
		self.inner.delete(path)
	}

	fn list(&self) -> BrevmalResult<Vec<DocumentEntry>> {
		self.inner.list()
	}
}

#[test]
fn cancelling_mid_batch_finishes_started_files() -> BrevmalResult<()> {
	let cancel = CancelFlag::new();
	let source = CancellingStore {
		inner: document_store(&[
			("brev/a.html", "<p>a</p>"),
			("brev/b.html", "<p>b</p>"),
			("brev/c.html", "<p>c</p>"),
		]),
		cancel: cancel.clone(),
	};
	let dest = MemoryDocumentStore::new();
	let batch = SanitizerBatch::new(SanitizeOptions {
		workers: Some(1),
		..SanitizeOptions::default()
	});

	let report = batch.run(&source, &dest, &cancel)?;

	assert!(report.cancelled);
	assert_eq!(
		report
			.results
			.iter()
			.map(|result| (result.path.to_string(), result.success))
			.collect::<Vec<_>>(),
		vec![("brev/a.html".to_string(), true)]
	);
	assert!(dest.exists(&doc_path("brev/a.html"))?);
	assert!(!dest.exists(&doc_path("brev/b.html"))?);
	assert_eq!(
		report.log,
		"ok   brev/a.html (0 change(s))\n1 succeeded, 0 failed, 1 total (cancelled)"
	);

	Ok(())
}

#[test]
fn batch_reports_unreadable_files() -> BrevmalResult<()> {
	let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("failed to create tempdir: {e}"));
	write_file(dir.path(), "a.html", "<p>a</p>");
	write_file(dir.path(), "b.html", "<p>dette er for langt</p>");
	let source = FsDocumentStore::new(dir.path()).with_max_file_size(16);
	let dest = MemoryDocumentStore::new();

	let report = SanitizerBatch::default().run(&source, &dest, &CancelFlag::new())?;

	assert_eq!(report.succeeded, 1);
	assert!(
		report.results[1]
			.error
			.as_deref()
			.is_some_and(|error| error.contains("file too large"))
	);

	Ok(())
}

// Configuration

#[test]
fn config_parses_every_section() -> BrevmalResult<()> {
	let config = BrevmalConfig::parse(
		r#"
documents = "maler"
sample = "sample.json"

[exclude]
patterns = ["utkast/"]

[render]
style_base = "https://cdn.example.com/styles/"
styles = ["base"]
cache_bust = true

[render.margins]
top = "25mm"

[render.marker]
element = "section"

[sanitize]
workers = 2
strip_scripts = false
"#,
	)?;

	assert_eq!(config.documents, std::path::PathBuf::from("maler"));
	assert_eq!(config.fragments, std::path::PathBuf::from("fragments"));
	assert_eq!(config.sample, Some(std::path::PathBuf::from("sample.json")));
	assert_eq!(config.max_file_size, DEFAULT_MAX_FILE_SIZE);
	assert_eq!(config.exclude.patterns, vec!["utkast/"]);
	assert_eq!(config.render.margins.to_css(), "25mm 20mm 20mm 20mm");
	assert_eq!(config.render.marker.element, "section");
	assert_eq!(config.render.marker.attribute, DEFAULT_MARKER_ATTRIBUTE);
	assert_eq!(config.sanitize.workers, Some(2));
	assert!(!config.sanitize.strip_scripts);
	assert!(config.sanitize.strip_event_handlers);

	let options = config.render.options(&DocumentMetadata::default());
	assert_eq!(options.cache_bust, CacheBust::Timestamp);
	assert_eq!(options.style_refs, vec!["base"]);

	Ok(())
}

#[rstest]
#[case::disabled("cache_bust = false", CacheBust::None)]
#[case::timestamp("cache_bust = true", CacheBust::Timestamp)]
#[case::fixed("cache_bust = \"r42\"", CacheBust::Fixed("r42".to_string()))]
#[case::empty_token("cache_bust = \"\"", CacheBust::None)]
fn config_cache_bust_setting(#[case] line: &str, #[case] expected: CacheBust) -> BrevmalResult<()> {
	let config = BrevmalConfig::parse(&format!("[render]\n{line}\n"))?;

	assert_eq!(
		config.render.options(&DocumentMetadata::default()).cache_bust,
		expected
	);

	Ok(())
}

#[test]
fn config_is_discovered_from_candidates() -> BrevmalResult<()> {
	let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("failed to create tempdir: {e}"));
	assert!(BrevmalConfig::load(dir.path())?.is_none());
	assert_eq!(
		BrevmalConfig::load_or_default(dir.path())?.documents,
		std::path::PathBuf::from("documents")
	);

	write_file(dir.path(), ".config/brevmal.toml", "fragments = \"deler\"\n");
	let config = BrevmalConfig::load(dir.path())?.unwrap_or_else(|| panic!("config not found"));
	assert_eq!(config.fragments, std::path::PathBuf::from("deler"));

	Ok(())
}

#[test]
fn invalid_config_is_reported() {
	assert!(matches!(
		BrevmalConfig::parse("documents = [1"),
		Err(BrevmalError::ConfigParse(_))
	));
}
