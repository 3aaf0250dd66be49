//! Code-lattice snapshot reader.
//!
//! The lattice indexer is an external collaborator; this module only loads
//! the repo-symbol snapshot it produces and answers membership queries over
//! the file set.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::RwLock;

use crate::error::{Error, Result};

/// One indexed symbol in the repo-symbol snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatticeNode {
    /// Symbol name (function, type, route constant)
    pub symbol: String,
    /// Repo-relative path of the defining file
    #[serde(rename = "filePath")]
    pub file_path: String,
    /// Declaration signature, as indexed
    #[serde(default)]
    pub signature: String,
    /// Leading doc text, if any
    #[serde(default)]
    pub doc: String,
    /// Short source snippet around the declaration
    #[serde(default)]
    pub snippet: String,
}

#[derive(Debug, Deserialize)]
struct RawSnapshot {
    nodes: Vec<LatticeNode>,
}

/// Loaded repo-symbol snapshot.
pub struct LatticeSnapshot {
    nodes: Vec<LatticeNode>,
    files: HashSet<String>,
    /// Existence answers already checked against disk
    exists_cache: RwLock<std::collections::HashMap<String, bool>>,
}

impl LatticeSnapshot {
    /// Load a snapshot from a JSON file of shape `{"nodes": [...]}`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::lattice(format!("read {}: {e}", path.as_ref().display())))?;
        let raw: RawSnapshot = serde_json::from_str(&data)
            .map_err(|e| Error::lattice(format!("parse snapshot: {e}")))?;
        Ok(Self::from_nodes(raw.nodes))
    }

    /// Build a snapshot from already-parsed nodes.
    pub fn from_nodes(nodes: Vec<LatticeNode>) -> Self {
        let files = nodes.iter().map(|n| n.file_path.clone()).collect();
        Self {
            nodes,
            files,
            exists_cache: RwLock::new(std::collections::HashMap::new()),
        }
    }

    /// Empty snapshot, used when the index is unavailable.
    pub fn empty() -> Self {
        Self::from_nodes(Vec::new())
    }

    /// All indexed nodes.
    pub fn nodes(&self) -> &[LatticeNode] {
        &self.nodes
    }

    /// Number of indexed nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the snapshot holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// True when the snapshot indexes the given repo-relative path.
    pub fn has_file(&self, path: &str) -> bool {
        self.files.contains(path)
    }

    /// The distinct file paths covered by the snapshot.
    pub fn files(&self) -> &HashSet<String> {
        &self.files
    }

    /// True when the path is indexed or present on disk under `repo_root`.
    ///
    /// Disk answers are cached for the lifetime of the snapshot.
    pub fn path_resolves(&self, repo_root: &str, path: &str) -> bool {
        if self.has_file(path) {
            return true;
        }
        if let Ok(cache) = self.exists_cache.read() {
            if let Some(hit) = cache.get(path) {
                return *hit;
            }
        }
        let on_disk = Path::new(repo_root).join(path).exists();
        if let Ok(mut cache) = self.exists_cache.write() {
            cache.insert(path.to_string(), on_disk);
        }
        on_disk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(symbol: &str, file: &str) -> LatticeNode {
        LatticeNode {
            symbol: symbol.to_string(),
            file_path: file.to_string(),
            signature: String::new(),
            doc: String::new(),
            snippet: String::new(),
        }
    }

    #[test]
    fn tracks_distinct_files() {
        let snap = LatticeSnapshot::from_nodes(vec![
            node("a", "src/a.rs"),
            node("b", "src/a.rs"),
            node("c", "src/c.rs"),
        ]);
        assert_eq!(snap.len(), 3);
        assert_eq!(snap.files().len(), 2);
        assert!(snap.has_file("src/c.rs"));
        assert!(!snap.has_file("src/d.rs"));
    }

    #[test]
    fn load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.json");
        std::fs::write(&path, "{\"nodes\": 17}").unwrap();
        assert!(LatticeSnapshot::load(&path).is_err());
    }

    #[test]
    fn load_accepts_camel_case_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.json");
        std::fs::write(
            &path,
            r#"{"nodes": [{"symbol": "askRoute", "filePath": "server/routes/agi.plan.ts"}]}"#,
        )
        .unwrap();
        let snap = LatticeSnapshot::load(&path).unwrap();
        assert!(snap.has_file("server/routes/agi.plan.ts"));
    }
}
