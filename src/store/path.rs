//! Collection and document addresses.
//!
//! A path alternates collection and document segments, starting with a
//! collection: `users`, `users/alice`, `users/alice/posts`, ... A
//! [`CollectionRef`] always has an odd number of segments and a
//! [`DocumentRef`] an even number, which mirrors Firestore's nesting rule.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use std::fmt;
use thiserror::Error;

const AUTO_ID_LEN: usize = 20;

/// Errors raised while building an address.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The root collection name was empty.
    #[error("collection name must not be empty")]
    EmptyCollection,
    /// A document key or nested segment was empty.
    #[error("path segments must not be empty")]
    EmptySegment,
    /// A segment contained a `/`, which would silently change the depth.
    #[error("path segment '{0}' must not contain '/'")]
    SlashInSegment(String),
    /// `.` and `..` would be collapsed by URL path handling.
    #[error("path segment '{0}' is not a valid id")]
    RelativeSegment(String),
    /// Ids of the form `__name__` are reserved by Firestore.
    #[error("path segment '{0}' is reserved")]
    ReservedSegment(String),
    /// An explicit document key was given while the nested path already ends on a document.
    #[error("document key '{key}' conflicts with terminal document '{terminal}' of the nested path")]
    AmbiguousKey { key: String, terminal: String },
}

pub(crate) fn validate_segment(segment: &str) -> Result<(), PathError> {
    if segment.is_empty() {
        return Err(PathError::EmptySegment);
    }
    if segment.contains('/') {
        return Err(PathError::SlashInSegment(segment.to_string()));
    }
    if segment == "." || segment == ".." {
        return Err(PathError::RelativeSegment(segment.to_string()));
    }
    if segment.len() > 4 && segment.starts_with("__") && segment.ends_with("__") {
        return Err(PathError::ReservedSegment(segment.to_string()));
    }
    Ok(())
}

/// Generates a 20 character alphanumeric document id.
pub fn generate_auto_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .map(char::from)
        .take(AUTO_ID_LEN)
        .collect()
}

/// A reference to a collection, either at the root or under a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionRef {
    segments: Vec<String>,
}

impl CollectionRef {
    /// Gets a reference to a root-level collection.
    pub fn root(collection_id: &str) -> Result<Self, PathError> {
        if collection_id.is_empty() {
            return Err(PathError::EmptyCollection);
        }
        validate_segment(collection_id)?;
        Ok(Self {
            segments: vec![collection_id.to_string()],
        })
    }

    /// The last segment of the path.
    pub fn id(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The slash-separated path relative to the database root.
    pub fn path(&self) -> String {
        self.segments.join("/")
    }

    /// The document this collection is nested under, if any.
    pub fn parent(&self) -> Option<DocumentRef> {
        if self.segments.len() < 3 {
            return None;
        }
        Some(DocumentRef {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Gets a reference to the document with the given id in this collection.
    pub fn doc(&self, document_id: &str) -> Result<DocumentRef, PathError> {
        validate_segment(document_id)?;
        Ok(self.child(document_id.to_string()))
    }

    /// Gets a reference to a new document with an auto-generated id.
    pub fn new_doc(&self) -> DocumentRef {
        self.child(generate_auto_id())
    }

    fn child(&self, document_id: String) -> DocumentRef {
        let mut segments = self.segments.clone();
        segments.push(document_id);
        DocumentRef { segments }
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// A reference to a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    segments: Vec<String>,
}

impl DocumentRef {
    /// The document id (last path segment).
    pub fn id(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn path(&self) -> String {
        self.segments.join("/")
    }

    /// The collection containing this document.
    pub fn parent(&self) -> CollectionRef {
        CollectionRef {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        }
    }

    /// Gets a reference to a sub-collection of this document.
    pub fn collection(&self, collection_id: &str) -> Result<CollectionRef, PathError> {
        validate_segment(collection_id)?;
        let mut segments = self.segments.clone();
        segments.push(collection_id.to_string());
        Ok(CollectionRef { segments })
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// The lowest level reached by walking a nested path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedPath {
    /// Even-length nested path: a collection the document key applies to.
    Collection(CollectionRef),
    /// Odd-length nested path: the final segment named the document itself.
    Document(DocumentRef),
}

impl ResolvedPath {
    pub fn path(&self) -> String {
        match self {
            ResolvedPath::Collection(collection) => collection.path(),
            ResolvedPath::Document(document) => document.path(),
        }
    }
}

/// Walks `nested` under the root collection two segments at a time.
///
/// Each pair selects a document in the current collection and then opens a
/// sub-collection under it. A lone trailing segment selects a terminal
/// document and stops the walk.
pub fn resolve<S: AsRef<str>>(root: &str, nested: &[S]) -> Result<ResolvedPath, PathError> {
    let mut collection = CollectionRef::root(root)?;
    let mut segments = nested.iter();

    while let Some(document_id) = segments.next() {
        let document = collection.doc(document_id.as_ref())?;
        match segments.next() {
            Some(sub_collection) => collection = document.collection(sub_collection.as_ref())?,
            None => return Ok(ResolvedPath::Document(document)),
        }
    }

    Ok(ResolvedPath::Collection(collection))
}
