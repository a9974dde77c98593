//! Durable identities for host-document elements
//!
//! An [`IdentityRef`] is what the engine persists between passes. It pairs the
//! owning document with the element's persistent identity. The ephemeral
//! handle is a lookup accelerator only: it is never serialized and never
//! participates in equality.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a graph node
pub type NodeId = String;

/// Durable identity of a host document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    /// Create a fresh random document identity
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persistent element identity, stable across saves and reloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub Uuid);

impl ElementId {
    /// Create a fresh random element identity
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// In-session handle, valid only until the host regenerates or undoes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub u64);

/// Reference to an element that survives passes and serialization
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IdentityRef {
    document: DocumentId,
    element: ElementId,
    #[serde(skip)]
    handle: Option<ElementHandle>,
}

impl IdentityRef {
    /// Create a reference without a cached handle
    pub fn new(document: DocumentId, element: ElementId) -> Self {
        Self {
            document,
            element,
            handle: None,
        }
    }

    /// Attach a cached in-session handle
    pub fn with_handle(mut self, handle: ElementHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// The owning document
    pub fn document(&self) -> DocumentId {
        self.document
    }

    /// The persistent element identity
    pub fn element(&self) -> ElementId {
        self.element
    }

    /// The cached handle, which may be stale
    pub fn handle(&self) -> Option<ElementHandle> {
        self.handle
    }
}

impl PartialEq for IdentityRef {
    fn eq(&self, other: &Self) -> bool {
        self.document == other.document && self.element == other.element
    }
}

impl Eq for IdentityRef {}

impl Hash for IdentityRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.document.hash(state);
        self.element.hash(state);
    }
}

impl fmt::Display for IdentityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.document, self.element)
    }
}
