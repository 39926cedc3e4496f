use std::str::FromStr;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use float_cmp::approx_eq;
use serde::Deserialize;
use serde::Serialize;

use crate::BrevmalError;
use crate::BrevmalResult;
use crate::tags::Dialect;

/// Default page margin on every side, in millimetres.
pub const DEFAULT_MARGIN_MM: f64 = 20.0;

/// Default location prefix for shared stylesheets.
pub const DEFAULT_STYLE_BASE: &str = "/styles/";

/// The presentation context a document is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderTarget {
	/// A4 print / PDF.
	Print,
	/// Desktop email client.
	DesktopEmail,
	/// Mobile email client.
	MobileEmail,
	/// Plain-text SMS.
	Sms,
}

impl RenderTarget {
	pub const ALL: [RenderTarget; 4] = [
		RenderTarget::Print,
		RenderTarget::DesktopEmail,
		RenderTarget::MobileEmail,
		RenderTarget::Sms,
	];

	/// The tag dialect documents rendered for this target use.
	pub fn dialect(self) -> Dialect {
		match self {
			Self::Sms => Dialect::Single,
			_ => Dialect::Double,
		}
	}

	pub fn is_email(self) -> bool {
		matches!(self, Self::DesktopEmail | Self::MobileEmail)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Print => "print",
			Self::DesktopEmail => "desktop-email",
			Self::MobileEmail => "mobile-email",
			Self::Sms => "sms",
		}
	}
}

impl std::fmt::Display for RenderTarget {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for RenderTarget {
	type Err = BrevmalError;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		let normalized = value.trim();
		Self::ALL
			.into_iter()
			.find(|target| target.as_str().eq_ignore_ascii_case(normalized))
			.ok_or_else(|| BrevmalError::UnsupportedRenderTarget(value.to_string()))
	}
}

/// Units accepted for page margins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
	Mm,
	Cm,
	In,
	Pt,
	Px,
}

impl LengthUnit {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Mm => "mm",
			Self::Cm => "cm",
			Self::In => "in",
			Self::Pt => "pt",
			Self::Px => "px",
		}
	}
}

/// A non-negative length with a unit, written as `20mm` or `0.5in`.
///
/// Config files may also give a bare number, which is read as millimetres.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "LengthValue", into = "String")]
pub struct Length {
	pub value: f64,
	pub unit: LengthUnit,
}

impl Length {
	pub fn new(value: f64, unit: LengthUnit) -> Self {
		Self { value, unit }
	}

	pub fn mm(value: f64) -> Self {
		Self::new(value, LengthUnit::Mm)
	}

	pub fn zero() -> Self {
		Self::mm(0.0)
	}

	pub fn is_zero(&self) -> bool {
		approx_eq!(f64, self.value, 0.0, ulps = 2)
	}
}

impl PartialEq for Length {
	fn eq(&self, other: &Self) -> bool {
		self.unit == other.unit && approx_eq!(f64, self.value, other.value, ulps = 2)
	}
}

impl std::fmt::Display for Length {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}{}", self.value, self.unit.as_str())
	}
}

impl FromStr for Length {
	type Err = BrevmalError;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		let trimmed = value.trim();
		let split = trimmed
			.find(|c: char| c.is_ascii_alphabetic())
			.unwrap_or(trimmed.len());
		let (number, unit) = trimmed.split_at(split);

		let number: f64 = number
			.trim()
			.parse()
			.map_err(|_| BrevmalError::InvalidLength(value.to_string()))?;
		if !number.is_finite() || number < 0.0 {
			return Err(BrevmalError::InvalidLength(value.to_string()));
		}

		let unit = match unit.to_ascii_lowercase().as_str() {
			"" | "mm" => LengthUnit::Mm,
			"cm" => LengthUnit::Cm,
			"in" => LengthUnit::In,
			"pt" => LengthUnit::Pt,
			"px" => LengthUnit::Px,
			_ => return Err(BrevmalError::InvalidLength(value.to_string())),
		};

		Ok(Self::new(number, unit))
	}
}

/// Raw form of a [`Length`] in config and metadata files.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum LengthValue {
	Text(String),
	Millimetres(f64),
}

impl TryFrom<LengthValue> for Length {
	type Error = BrevmalError;

	fn try_from(value: LengthValue) -> Result<Self, Self::Error> {
		match value {
			LengthValue::Text(text) => text.parse(),
			LengthValue::Millimetres(number) => format!("{number}mm").parse(),
		}
	}
}

impl From<Length> for String {
	fn from(value: Length) -> Self {
		value.to_string()
	}
}

fn default_margin() -> Length {
	Length::mm(DEFAULT_MARGIN_MM)
}

/// Page margins for the print target.
///
/// ```toml
/// [render.margins]
/// top = "25mm"
/// right = "15mm"
/// bottom = 20
/// left = "15mm"
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
	#[serde(default = "default_margin")]
	pub top: Length,
	#[serde(default = "default_margin")]
	pub right: Length,
	#[serde(default = "default_margin")]
	pub bottom: Length,
	#[serde(default = "default_margin")]
	pub left: Length,
}

impl Default for Margins {
	fn default() -> Self {
		Self::uniform(default_margin())
	}
}

impl Margins {
	pub fn new(top: Length, right: Length, bottom: Length, left: Length) -> Self {
		Self {
			top,
			right,
			bottom,
			left,
		}
	}

	pub fn uniform(length: Length) -> Self {
		Self::new(length, length, length, length)
	}

	/// CSS shorthand in `top right bottom left` order.
	pub fn to_css(&self) -> String {
		format!("{} {} {} {}", self.top, self.right, self.bottom, self.left)
	}
}

/// Cache-busting behaviour for stylesheet links.
///
/// The token only ever appears in the `?v=` query of style links, so the
/// body of the output is unaffected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CacheBust {
	/// No token; output is fully deterministic.
	#[default]
	None,
	/// A caller-supplied token, for example a release identifier.
	Fixed(String),
	/// The current time in milliseconds, recomputed on every render.
	Timestamp,
}

impl CacheBust {
	fn token(&self) -> Option<String> {
		match self {
			Self::None => None,
			Self::Fixed(token) => Some(token.clone()),
			Self::Timestamp => {
				let millis = SystemTime::now()
					.duration_since(UNIX_EPOCH)
					.map_or(0, |duration| duration.as_millis());
				Some(millis.to_string())
			}
		}
	}
}

/// Explicit rendering configuration, threaded into every render call.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
	/// Page margins, honoured by the print target only.
	pub margins: Margins,
	/// Shared stylesheet identifiers, linked in order.
	pub style_refs: Vec<String>,
	/// Prefix joined with `<id>.css` to build each stylesheet link.
	pub style_base: String,
	pub cache_bust: CacheBust,
}

impl Default for RenderOptions {
	fn default() -> Self {
		Self {
			margins: Margins::default(),
			style_refs: Vec::new(),
			style_base: DEFAULT_STYLE_BASE.to_string(),
			cache_bust: CacheBust::None,
		}
	}
}

/// The fully substituted pieces of a document.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderParts<'a> {
	pub head: &'a str,
	pub body: &'a str,
	pub foot: &'a str,
}

impl<'a> RenderParts<'a> {
	pub fn body(body: &'a str) -> Self {
		Self {
			head: "",
			body,
			foot: "",
		}
	}
}

/// Assemble a standalone document for `target`.
///
/// Print output pads the page with the configured margins; email output
/// forces the padding to zero because email clients ignore page margins. SMS
/// output is the body as-is: there is no shell, header or footer.
pub fn render(parts: RenderParts<'_>, target: RenderTarget, options: &RenderOptions) -> String {
	if target == RenderTarget::Sms {
		return parts.body.to_string();
	}

	let padding = match target {
		RenderTarget::Print => options.margins.to_css(),
		_ => "0".to_string(),
	};
	let token = options.cache_bust.token();

	let mut output = String::with_capacity(
		parts.head.len() + parts.body.len() + parts.foot.len() + 256,
	);
	output.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");

	if target == RenderTarget::MobileEmail {
		output.push_str(
			"<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n",
		);
	}

	for style in &options.style_refs {
		let mut href = format!("{}{style}.css", options.style_base);
		if let Some(token) = &token {
			href.push_str("?v=");
			href.push_str(token);
		}
		output.push_str("<link rel=\"stylesheet\" href=\"");
		output.push_str(&escape_attribute(&href));
		output.push_str("\">\n");
	}

	output.push_str("<style>");
	if target == RenderTarget::Print {
		output.push_str("@page { size: A4; margin: 0; } ");
	}
	output.push_str("body { margin: 0; padding: ");
	output.push_str(&padding);
	output.push_str("; }</style>\n</head>\n<body>\n");

	for part in [parts.head, parts.body, parts.foot] {
		if part.is_empty() {
			continue;
		}
		output.push_str(part);
		if !part.ends_with('\n') {
			output.push('\n');
		}
	}

	output.push_str("</body>\n</html>\n");
	output
}

fn escape_attribute(value: &str) -> String {
	let mut escaped = String::with_capacity(value.len());
	for c in value.chars() {
		match c {
			'&' => escaped.push_str("&amp;"),
			'"' => escaped.push_str("&quot;"),
			'<' => escaped.push_str("&lt;"),
			'>' => escaped.push_str("&gt;"),
			_ => escaped.push(c),
		}
	}
	escaped
}

/// Parse a target name, failing with
/// [`BrevmalError::UnsupportedRenderTarget`] for anything unrecognized.
pub fn parse_target(value: &str) -> BrevmalResult<RenderTarget> {
	value.parse()
}
