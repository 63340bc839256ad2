//! Canonical Document Schema
//!
//! The connector-independent shape handed to the indexing pipeline.
//! Documents are keyed by the source-side id so re-ingesting a card
//! replaces the earlier copy instead of duplicating it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSource {
    Guru,
}

impl DocumentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentSource::Guru => "guru",
        }
    }
}

impl std::fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A linkable chunk of document text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Section {
    pub link: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub sections: Vec<Section>,
    pub source: DocumentSource,
    pub semantic_identifier: String,
    /// Recency signal used downstream to decay relevance
    pub doc_updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Ordered, non-empty group of documents emitted together.
///
/// Only the pagination walker builds batches, so the non-empty and
/// size-bound invariants hold for every value a consumer sees.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Batch {
    documents: Vec<Document>,
}

impl Batch {
    pub(crate) fn from_documents(documents: Vec<Document>) -> Option<Self> {
        if documents.is_empty() {
            None
        } else {
            Some(Self { documents })
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Document> {
        self.documents.iter()
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }
}

impl IntoIterator for Batch {
    type Item = Document;
    type IntoIter = std::vec::IntoIter<Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.into_iter()
    }
}
