use std::ops::Range;

use logos::Logos;
use serde::Deserialize;
use serde::Serialize;

use crate::position::LineTable;
use crate::position::Point;

/// Elements that never have content or a closing tag.
const VOID_ELEMENTS: [&str; 14] = [
	"area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
	"source", "track", "wbr",
];

/// Elements whose content is not markup. Everything up to the matching end
/// tag is skipped.
const RAW_TEXT_ELEMENTS: [&str; 4] = ["script", "style", "textarea", "title"];

/// Elements whose end tag may be omitted.
const OPTIONAL_CLOSE_ELEMENTS: [&str; 19] = [
	"p", "li", "dt", "dd", "option", "optgroup", "thead", "tbody", "tfoot", "tr", "td", "th",
	"colgroup", "caption", "rt", "rp", "html", "head", "body",
];

/// Flat tokens produced by logos for markup structure checks.
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
enum RawToken {
	#[token("<!--")]
	CommentOpen,
	#[token("-->")]
	CommentClose,
	#[regex(r"<![^-][^>]*>")]
	#[regex(r"<\?[^>]*>")]
	Declaration,
	#[regex(r"<[a-zA-Z][a-zA-Z0-9:_-]*")]
	StartTagOpen,
	#[regex(r"</[a-zA-Z][a-zA-Z0-9:_-]*[ \t\r\n]*>")]
	EndTag,
	#[token("/>")]
	SelfClose,
	#[token(">")]
	TagClose,
	#[token("\"")]
	DoubleQuote,
	#[token("'")]
	SingleQuote,
	#[token("<")]
	Lt,
	#[token("/")]
	Slash,
	#[token("-")]
	Dash,
	#[regex(r#"[^<>/"'-]+"#)]
	Text,
}

/// A structural problem in document markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum MarkupIssue {
	/// A closing tag with no open element of that name.
	UnexpectedClose { name: String },
	/// A closing tag that skips over an element that must be closed first.
	MismatchedClose { expected: String, found: String },
	UnterminatedComment,
	/// A start tag that never reaches its `>`.
	UnterminatedStartTag { name: String },
	/// An element still open at the end of the document.
	UnclosedElement { name: String },
}

impl std::fmt::Display for MarkupIssue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::UnexpectedClose { name } => write!(f, "unexpected closing tag `</{name}>`"),
			Self::MismatchedClose { expected, found } => {
				write!(f, "expected `</{expected}>` but found `</{found}>`")
			}
			Self::UnterminatedComment => write!(f, "unterminated comment"),
			Self::UnterminatedStartTag { name } => write!(f, "unterminated start tag `<{name}`"),
			Self::UnclosedElement { name } => write!(f, "unclosed element `<{name}>`"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkupDiagnostic {
	pub issue: MarkupIssue,
	pub point: Point,
}

impl MarkupDiagnostic {
	pub fn message(&self) -> String {
		format!("{} at {}", self.issue, self.point)
	}
}

/// Check that `markup` is structurally well formed.
///
/// This is a tolerant check rather than a full HTML parser: void elements
/// need no end tag, optionally closed elements (`p`, `li`, `td` and friends)
/// close implicitly, and the content of raw-text elements such as `script`
/// is skipped. An empty result means the markup is well formed.
pub fn check_well_formed(markup: &str) -> Vec<MarkupDiagnostic> {
	let mut walker = MarkupWalker::new(markup);
	walker.walk();
	walker.finish()
}

struct OpenElement {
	name: String,
	offset: usize,
}

/// Walks the logos token stream keeping a stack of open elements.
struct MarkupWalker<'a> {
	source: &'a str,
	tokens: Vec<(Result<RawToken, ()>, Range<usize>)>,
	cursor: usize,
	lines: LineTable,
	stack: Vec<OpenElement>,
	diagnostics: Vec<MarkupDiagnostic>,
}

impl<'a> MarkupWalker<'a> {
	fn new(source: &'a str) -> Self {
		Self {
			source,
			tokens: RawToken::lexer(source).spanned().collect(),
			cursor: 0,
			lines: LineTable::new(source),
			stack: Vec::new(),
			diagnostics: Vec::new(),
		}
	}

	/// Take the next token, or `None` at the end of input.
	fn next(&mut self) -> Option<(Result<RawToken, ()>, Range<usize>)> {
		let token = self.tokens.get(self.cursor).cloned()?;
		self.cursor += 1;
		Some(token)
	}

	fn report(&mut self, issue: MarkupIssue, offset: usize) {
		self.diagnostics.push(MarkupDiagnostic {
			issue,
			point: self.lines.point(offset),
		});
	}

	fn walk(&mut self) {
		while let Some((token, span)) = self.next() {
			match token {
				Ok(RawToken::CommentOpen) => {
					if !self.skip_until(|token, _| token == RawToken::CommentClose) {
						self.report(MarkupIssue::UnterminatedComment, span.start);
						return;
					}
				}
				Ok(RawToken::StartTagOpen) => {
					let name = self.source[span.start + 1..span.end].to_ascii_lowercase();
					if !self.open_element(name, span.start) {
						return;
					}
				}
				Ok(RawToken::EndTag) => {
					let name = end_tag_name(&self.source[span.clone()]);
					if !VOID_ELEMENTS.contains(&name.as_str()) {
						self.close_element(&name, span.start);
					}
				}
				_ => {}
			}
		}
	}

	/// Handle a start tag. Returns `false` when the rest of the input can no
	/// longer be checked.
	fn open_element(&mut self, name: String, offset: usize) -> bool {
		let Some(self_closed) = self.read_start_tag() else {
			self.report(MarkupIssue::UnterminatedStartTag { name }, offset);
			return false;
		};

		if self_closed || VOID_ELEMENTS.contains(&name.as_str()) {
			return true;
		}

		if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
			let source = self.source;
			let closed = self.skip_until(|token, span| {
				token == RawToken::EndTag && end_tag_name(&source[span]) == name
			});
			if !closed {
				self.report(MarkupIssue::UnclosedElement { name }, offset);
			}
			return closed;
		}

		self.stack.push(OpenElement { name, offset });
		true
	}

	/// Consume the rest of a start tag. Returns whether it was self-closing,
	/// or `None` if the input ends first. Quoted attribute values may contain
	/// `>`.
	fn read_start_tag(&mut self) -> Option<bool> {
		while let Some((token, _)) = self.next() {
			match token {
				Ok(RawToken::TagClose) => return Some(false),
				Ok(RawToken::SelfClose) => return Some(true),
				Ok(quote @ (RawToken::DoubleQuote | RawToken::SingleQuote)) => {
					if !self.skip_until(|token, _| token == quote) {
						return None;
					}
				}
				_ => {}
			}
		}

		None
	}

	fn close_element(&mut self, name: &str, offset: usize) {
		let Some(index) = self.stack.iter().rposition(|open| open.name == name) else {
			self.report(
				MarkupIssue::UnexpectedClose {
					name: name.to_string(),
				},
				offset,
			);
			return;
		};

		let blocking = self.stack[index + 1..]
			.iter()
			.rev()
			.find(|open| !OPTIONAL_CLOSE_ELEMENTS.contains(&open.name.as_str()))
			.map(|open| open.name.clone());
		if let Some(expected) = blocking {
			self.report(
				MarkupIssue::MismatchedClose {
					expected,
					found: name.to_string(),
				},
				offset,
			);
		}

		self.stack.truncate(index);
	}

	/// Advance past the first token matching `predicate`. Returns `false` if
	/// no token matches.
	fn skip_until(&mut self, predicate: impl Fn(RawToken, Range<usize>) -> bool) -> bool {
		while let Some((token, span)) = self.next() {
			if let Ok(token) = token {
				if predicate(token, span) {
					return true;
				}
			}
		}

		false
	}

	fn finish(mut self) -> Vec<MarkupDiagnostic> {
		let unclosed: Vec<OpenElement> = std::mem::take(&mut self.stack)
			.into_iter()
			.filter(|open| !OPTIONAL_CLOSE_ELEMENTS.contains(&open.name.as_str()))
			.collect();
		for open in unclosed {
			self.report(MarkupIssue::UnclosedElement { name: open.name }, open.offset);
		}

		self.diagnostics.sort_by_key(|diagnostic| diagnostic.point.offset);
		self.diagnostics
	}
}

fn end_tag_name(slice: &str) -> String {
	slice
		.trim_start_matches("</")
		.trim_end_matches('>')
		.trim_end()
		.to_ascii_lowercase()
}
