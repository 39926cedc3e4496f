use std::collections::HashMap;

use crate::DocumentMetadata;
use crate::DocumentPath;
use crate::MemoryDocumentStore;
use crate::MemoryFragmentStore;
use crate::SampleData;
use crate::StoredDocument;

pub(crate) fn doc_path(path: &str) -> DocumentPath {
	DocumentPath::new(path).unwrap_or_else(|e| panic!("invalid document path `{path}`: {e}"))
}

pub(crate) fn sample_data() -> SampleData {
	[
		("kjøper.navn", "Ola Nordmann"),
		("mottaker.fornavn", "Kari"),
		("eiendom.adresse", "Storgata 1"),
		("megler.navn", "Per Megler"),
		("firma.orgnr", "987 654 321"),
	]
	.into_iter()
	.collect()
}

pub(crate) fn overrides(pairs: &[(&str, &str)]) -> HashMap<String, String> {
	pairs
		.iter()
		.map(|(name, value)| ((*name).to_string(), (*value).to_string()))
		.collect()
}

pub(crate) fn fragment_store() -> MemoryFragmentStore {
	MemoryFragmentStore::new()
		.with("system-style", "<style>#123456</style>")
		.with("brevhode", "<header>[[megler.navn]]</header>")
		.with("bunntekst", "<footer>Org.nr [[firma.orgnr]]</footer>")
}

pub(crate) fn document_store(documents: &[(&str, &str)]) -> MemoryDocumentStore {
	let store = MemoryDocumentStore::new();
	for (path, content) in documents {
		store.insert(doc_path(path), StoredDocument::new(*content));
	}
	store
}

pub(crate) fn letter_metadata() -> DocumentMetadata {
	DocumentMetadata {
		subject: Some("Kontrakt for [[eiendom.adresse]]".to_string()),
		header: Some("brevhode".to_string()),
		footer: Some("bunntekst".to_string()),
		..DocumentMetadata::default()
	}
}

pub(crate) fn write_file(root: &std::path::Path, relative: &str, content: impl AsRef<[u8]>) {
	let path = root.join(relative);
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent)
			.unwrap_or_else(|e| panic!("failed to create `{}`: {e}", parent.display()));
	}
	std::fs::write(&path, content)
		.unwrap_or_else(|e| panic!("failed to write `{}`: {e}", path.display()));
}
