//! content.rs
//!
//! Document store: loads the blog's markdown tree once and serves read-only
//! listings and lookups to the renderer.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use crate::document::{parse_document, Document};
use crate::errors::{PipelineError, Result};

const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];

/// Ordered, path-unique set of content documents.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: BTreeMap<String, Document>,
}

impl DocumentStore {
    /// Build a store from already-parsed documents.
    pub fn from_documents<I>(docs: I) -> Result<Self>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut documents = BTreeMap::new();
        for doc in docs {
            if documents.contains_key(&doc.path) {
                return Err(PipelineError::DuplicatePath(doc.path));
            }
            documents.insert(doc.path.clone(), doc);
        }
        Ok(Self { documents })
    }

    /// Walk `root` and parse every markdown file beneath it.
    pub fn load(root: &Path) -> Result<Self> {
        let mut docs = Vec::new();

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

        for entry in walker {
            let entry = entry.map_err(|e| {
                PipelineError::Io(
                    e.into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("walkdir loop detected")),
                )
            })?;
            if !entry.file_type().is_file() || !is_markdown(entry.path()) {
                continue;
            }

            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let site_path = site_path(relative);
            let text = std::fs::read_to_string(entry.path())?;
            let doc = parse_document(&site_path, entry.path(), &text)?;
            debug!(path = %doc.path, draft = doc.draft, "Loaded document");
            docs.push(doc);
        }

        let store = Self::from_documents(docs)?;
        info!(root = %root.display(), documents = store.len(), "Loaded content");
        Ok(store)
    }

    /// Documents newest first (ties by path). Drafts only when asked for.
    pub fn list_documents(&self, include_drafts: bool) -> Vec<&Document> {
        let mut listed: Vec<&Document> = self
            .documents
            .values()
            .filter(|d| include_drafts || !d.draft)
            .collect();
        listed.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.path.cmp(&b.path)));
        listed
    }

    pub fn get_document(&self, path: &str) -> Result<&Document> {
        let key = path.trim_matches('/');
        self.documents
            .get(key)
            .ok_or_else(|| PipelineError::NotFound(path.to_string()))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| MARKDOWN_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// `posts/lambda.md` -> `posts/lambda`; `posts/_index.md` -> `posts`.
fn site_path(relative: &Path) -> String {
    let mut parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();

    if let Some(last) = parts.pop() {
        let stem = Path::new(&last)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or(last);
        if stem != "index" && stem != "_index" {
            parts.push(stem);
        }
    }
    parts.join("/")
}
