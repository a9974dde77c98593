//! Previous-output record
//!
//! Per node, the ordered identities the node produced in the last committed
//! pass. `None` entries are empty markers: a slot that produced nothing (or
//! was released by materialization) still occupies its position.
//!
//! The record is persisted as JSON:
//!
//! ```text
//! {"version":1,"nodes":{"<node id>":[{"document":"..","element":".."},null]}}
//! ```
//!
//! and can be embedded in the graph document as a zstd-compressed snapshot.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::identity::{DocumentId, IdentityRef, NodeId};

/// Current persisted record layout
pub const RECORD_VERSION: u32 = 1;

/// zstd level for record snapshots
const SNAPSHOT_LEVEL: i32 = 3;

#[derive(Serialize, Deserialize)]
struct PersistedRecord {
    version: u32,
    nodes: BTreeMap<NodeId, Vec<Option<IdentityRef>>>,
}

/// Identities produced per node in the last committed pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviousOutputRecord {
    nodes: BTreeMap<NodeId, Vec<Option<IdentityRef>>>,
}

impl PreviousOutputRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries for a node, in slot order
    pub fn get(&self, node_id: &str) -> Option<&[Option<IdentityRef>]> {
        self.nodes.get(node_id).map(Vec::as_slice)
    }

    /// Replace a node's entries wholesale
    pub fn set(&mut self, node_id: impl Into<NodeId>, entries: Vec<Option<IdentityRef>>) {
        self.nodes.insert(node_id.into(), entries);
    }

    /// Forget a node
    pub fn remove(&mut self, node_id: &str) -> Option<Vec<Option<IdentityRef>>> {
        self.nodes.remove(node_id)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every tracked identity, across all nodes
    pub fn tracked_identities(&self) -> HashSet<IdentityRef> {
        self.nodes
            .values()
            .flatten()
            .filter_map(|entry| *entry)
            .collect()
    }

    /// Live identities a node holds in one document
    pub fn identities_in(&self, node_id: &str, document: DocumentId) -> Vec<IdentityRef> {
        self.get(node_id)
            .unwrap_or_default()
            .iter()
            .filter_map(|entry| *entry)
            .filter(|identity| identity.document() == document)
            .collect()
    }

    /// Turn a node's entries in `document` into empty markers
    ///
    /// The slots keep their positions so later passes still line up.
    /// Returns the identities that were released.
    pub fn release(&mut self, node_id: &str, document: DocumentId) -> Vec<IdentityRef> {
        let mut released = Vec::new();
        if let Some(entries) = self.nodes.get_mut(node_id) {
            for entry in entries.iter_mut() {
                if let Some(identity) = *entry {
                    if identity.document() == document {
                        released.push(identity);
                        *entry = None;
                    }
                }
            }
        }
        released
    }

    /// Serialize to the persisted JSON layout
    pub fn to_json(&self) -> Result<String> {
        let persisted = PersistedRecord {
            version: RECORD_VERSION,
            nodes: self.nodes.clone(),
        };
        Ok(serde_json::to_string(&persisted)?)
    }

    /// Parse the persisted JSON layout
    pub fn from_json(json: &str) -> Result<Self> {
        let persisted: PersistedRecord = serde_json::from_str(json)?;
        Self::from_persisted(persisted)
    }

    fn from_persisted(persisted: PersistedRecord) -> Result<Self> {
        if persisted.version != RECORD_VERSION {
            return Err(EngineError::RecordVersion(persisted.version));
        }
        Ok(Self {
            nodes: persisted.nodes,
        })
    }

    /// Compressed snapshot for embedding in the graph document
    pub fn to_snapshot(&self) -> Result<Vec<u8>> {
        let json = self.to_json()?;
        zstd::encode_all(json.as_bytes(), SNAPSHOT_LEVEL)
            .map_err(|e| EngineError::Compression(e.to_string()))
    }

    /// Restore from a compressed snapshot
    pub fn from_snapshot(snapshot: &[u8]) -> Result<Self> {
        let json = zstd::decode_all(snapshot).map_err(|e| EngineError::Compression(e.to_string()))?;
        let persisted: PersistedRecord = serde_json::from_slice(&json)?;
        Self::from_persisted(persisted)
    }

    /// Load from a JSON file; a missing file is an empty record
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Save as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        log::debug!("Saved output record ({} nodes) to {:?}", self.len(), path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ElementId;

    fn identity(document: DocumentId) -> IdentityRef {
        IdentityRef::new(document, ElementId::new())
    }

    #[test]
    fn test_absent_entries_are_explicit_nulls() {
        let doc = DocumentId::new();
        let mut record = PreviousOutputRecord::new();
        record.set("box", vec![Some(identity(doc)), None]);

        let json: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
        assert_eq!(json["version"], 1);
        let entries = json["nodes"]["box"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].get("document").is_some());
        assert!(entries[1].is_null());
    }

    #[test]
    fn test_json_layout_is_readable() {
        let doc = DocumentId::new();
        let el = ElementId::new();
        let json = format!(
            r#"{{"version":1,"nodes":{{"n1":[{{"document":"{}","element":"{}"}},null]}}}}"#,
            doc, el
        );
        let record = PreviousOutputRecord::from_json(&json).unwrap();
        assert_eq!(
            record.get("n1").unwrap(),
            &[Some(IdentityRef::new(doc, el)), None]
        );
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let result = PreviousOutputRecord::from_json(r#"{"version":2,"nodes":{}}"#);
        assert!(matches!(result, Err(EngineError::RecordVersion(2))));
    }

    #[test]
    fn test_snapshot_restores_record() {
        let doc = DocumentId::new();
        let mut record = PreviousOutputRecord::new();
        record.set("a", vec![Some(identity(doc)), Some(identity(doc))]);
        record.set("b", vec![None]);

        let snapshot = record.to_snapshot().unwrap();
        assert_eq!(PreviousOutputRecord::from_snapshot(&snapshot).unwrap(), record);
        assert!(PreviousOutputRecord::from_snapshot(b"not zstd").is_err());
    }

    #[test]
    fn test_release_keeps_positions() {
        let a = DocumentId::new();
        let b = DocumentId::new();
        let (first, second, other) = (identity(a), identity(a), identity(b));

        let mut record = PreviousOutputRecord::new();
        record.set("n", vec![Some(first), None, Some(other), Some(second)]);

        let released = record.release("n", a);
        assert_eq!(released, vec![first, second]);
        assert_eq!(record.get("n").unwrap(), &[None, None, Some(other), None]);
        assert!(record.release("missing", a).is_empty());
    }

    #[test]
    fn test_tracked_identities() {
        let doc = DocumentId::new();
        let (x, y) = (identity(doc), identity(doc));
        let mut record = PreviousOutputRecord::new();
        record.set("a", vec![Some(x), None]);
        record.set("b", vec![Some(y)]);

        let tracked = record.tracked_identities();
        assert_eq!(tracked.len(), 2);
        assert!(tracked.contains(&x) && tracked.contains(&y));
        assert_eq!(record.identities_in("a", doc), vec![x]);
    }

    #[test]
    fn test_file_persistence() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("graph").join("record.json");
        assert!(PreviousOutputRecord::load(&path).unwrap().is_empty());

        let mut record = PreviousOutputRecord::new();
        record.set("n", vec![Some(identity(DocumentId::new()))]);
        record.save(&path).unwrap();
        assert_eq!(PreviousOutputRecord::load(&path).unwrap(), record);
    }
}
