//! `brevmal_core` is the core library for brevmal, a document template hub
//! for branded correspondence. It discovers merge-field tags in stored
//! documents, resolves them against user overrides and sample data, splices
//! in shared resource fragments and renders the result for print, desktop
//! email, mobile email or SMS.
//!
//! ## Rendering Pipeline
//!
//! ```text
//! Stored document + metadata
//!   → Injector (fetches header/footer, replaces resource markers with fragments)
//!   → Tag scanner (collects `[[name]]` or `[name]` tags in discovery order)
//!   → Resolver (override → sample → literal fallback, one pass per tag)
//!   → Channel renderer (HTML shell for print and email, plain body for SMS)
//! ```
//!
//! Injection always runs before scanning, so tags carried by fragments are
//! resolved together with the body.
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading from `brevmal.toml`.
//! - [`version`]: The `<base>.v<N>.html` filename codec and version lineages.
//!
//! ## Key Types
//!
//! - [`Dialect`]: Double-bracket tags for print and email, single-bracket
//!   tags for SMS. Chosen from the document path.
//! - [`Resolver`]: Layered value resolution for one dialect.
//! - [`MarkerPattern`]: Which elements request resource fragments.
//! - [`RenderTarget`]: The four presentation channels.
//! - [`Pipeline`]: Reads a document and its fragments and renders it.
//! - [`DocumentLibrary`]: Create, duplicate, save and delete documents.
//! - [`SanitizerBatch`]: Migrates legacy documents into a clean store.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::path::Path;
//!
//! use brevmal_core::BrevmalConfig;
//! use brevmal_core::DocumentPath;
//! use brevmal_core::Pipeline;
//! use brevmal_core::RenderTarget;
//!
//! let root = Path::new(".");
//! let config = BrevmalConfig::load_or_default(root).unwrap();
//! let documents = config.document_store(root).unwrap();
//! let fragments = config.fragment_store(root);
//! let sample = config.load_sample(root).unwrap();
//!
//! let pipeline = Pipeline::new(&documents, &fragments, &config.render);
//! let path = DocumentPath::new("salg/kontrakt.html").unwrap();
//! let overrides: HashMap<String, String> = HashMap::new();
//! let rendered = pipeline
//! 	.render_document(&path, RenderTarget::Print, &overrides, &sample)
//! 	.unwrap();
//!
//! for warning in &rendered.warnings {
//! 	eprintln!("warning: {warning}");
//! }
//! println!("{}", rendered.content);
//! ```

pub use config::*;
pub use document::*;
pub use error::*;
pub use inject::*;
pub use markup::*;
pub use pipeline::*;
pub use position::*;
pub use render::*;
pub use sanitize::*;
pub use store::*;
pub use tags::*;
pub use values::*;
pub use version::Lineage;
pub use version::LineageEntry;
pub use version::VersionedName;

pub mod config;
mod document;
#[allow(unused_assignments)]
mod error;
mod inject;
mod markup;
mod pipeline;
mod position;
mod render;
mod sanitize;
mod store;
mod tags;
mod values;
pub mod version;

#[cfg(test)]
mod __fixtures;
#[cfg(test)]
mod __tests;
