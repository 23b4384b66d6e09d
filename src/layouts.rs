//! Named layout persistence and client sync
//!
//! Layouts are opaque JSON documents keyed by id, stored in a single
//! `layouts.json` next to the config. The client owns its layouts: on sync
//! the client's copy wins for any id present on both sides, and identical
//! entries are no-ops (no rewrite of the file).

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

type LayoutMap = HashMap<String, Value>;

/// File-backed layout store, safe for concurrent reads.
pub struct LayoutStore {
    path: PathBuf,
    layouts: Mutex<LayoutMap>,
}

impl LayoutStore {
    /// Open the store, loading existing layouts if the file is present.
    /// A corrupt or missing file yields an empty store, never a failure.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let layouts = match std::fs::read_to_string(&path) {
            Ok(json) => match serde_json::from_str::<LayoutMap>(&json) {
                Ok(map) => {
                    debug!("loaded {} layouts from {}", map.len(), path.display());
                    map
                }
                Err(e) => {
                    warn!("ignoring corrupt layout file {}: {}", path.display(), e);
                    LayoutMap::new()
                }
            },
            Err(_) => LayoutMap::new(),
        };

        Self {
            path,
            layouts: Mutex::new(layouts),
        }
    }

    /// Get a single layout by id.
    pub fn get(&self, id: &str) -> Option<Value> {
        self.layouts.lock().get(id).cloned()
    }

    /// Copy of the full layout map.
    pub fn list(&self) -> LayoutMap {
        self.layouts.lock().clone()
    }

    /// Insert or replace a layout, then persist.
    pub fn upsert(&self, id: &str, layout: Value) -> Result<()> {
        let snapshot = {
            let mut layouts = self.layouts.lock();
            layouts.insert(id.to_string(), layout);
            layouts.clone()
        };
        self.save(&snapshot)
    }

    /// Remove a layout. Returns whether it existed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let (existed, snapshot) = {
            let mut layouts = self.layouts.lock();
            let existed = layouts.remove(id).is_some();
            (existed, layouts.clone())
        };
        if existed {
            self.save(&snapshot)?;
        }
        Ok(existed)
    }

    /// Merge client layouts in, client-wins on conflict. Returns the full
    /// merged map to echo back. Saves only if anything actually changed.
    pub fn merge_from_client(&self, client_layouts: LayoutMap) -> Result<LayoutMap> {
        let (changed, merged) = {
            let mut layouts = self.layouts.lock();
            let mut changed = false;
            for (id, layout) in client_layouts {
                if layouts.get(&id) != Some(&layout) {
                    layouts.insert(id, layout);
                    changed = true;
                }
            }
            (changed, layouts.clone())
        };

        if changed {
            self.save(&merged)?;
            info!("layout sync: store now holds {} layouts", merged.len());
        }
        Ok(merged)
    }

    fn save(&self, layouts: &LayoutMap) -> Result<()> {
        let json =
            serde_json::to_string_pretty(layouts).context("failed to serialize layouts")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("failed to write layouts to {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> LayoutStore {
        LayoutStore::open(dir.path().join("layouts.json"))
    }

    #[test]
    fn test_empty_store_when_file_missing() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.list().is_empty());
        assert_eq!(store.get("anything"), None);
    }

    #[test]
    fn test_upsert_get_delete_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.upsert("rally", json!({"name": "Rally"})).unwrap();
        assert_eq!(store.get("rally"), Some(json!({"name": "Rally"})));

        // Reopen from disk
        let reopened = store_in(&dir);
        assert_eq!(reopened.get("rally"), Some(json!({"name": "Rally"})));

        assert!(reopened.delete("rally").unwrap());
        assert!(!reopened.delete("rally").unwrap());
        assert_eq!(store_in(&dir).get("rally"), None);
    }

    #[test]
    fn test_merge_client_wins() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.upsert("a", json!({"v": 1})).unwrap();
        store.upsert("b", json!({"v": 2})).unwrap();

        let merged = store
            .merge_from_client(
                [
                    ("a".to_string(), json!({"v": 99})), // conflict: client wins
                    ("c".to_string(), json!({"v": 3})),  // new id
                ]
                .into(),
            )
            .unwrap();

        assert_eq!(merged.len(), 3);
        assert_eq!(merged["a"], json!({"v": 99}));
        assert_eq!(merged["b"], json!({"v": 2}));
        assert_eq!(merged["c"], json!({"v": 3}));
    }

    #[test]
    fn test_merge_identical_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.upsert("a", json!({"v": 1})).unwrap();

        let path = dir.path().join("layouts.json");
        let mtime_before = std::fs::metadata(&path).unwrap().modified().unwrap();
        // Guarantee a visible mtime difference if a write happened
        std::thread::sleep(std::time::Duration::from_millis(20));

        let merged = store
            .merge_from_client([("a".to_string(), json!({"v": 1}))].into())
            .unwrap();
        assert_eq!(merged.len(), 1);

        let mtime_after = std::fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(mtime_before, mtime_after, "identical merge must not save");
    }

    #[test]
    fn test_corrupt_file_yields_empty_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("layouts.json");
        std::fs::write(&path, "{broken").unwrap();

        let store = LayoutStore::open(&path);
        assert!(store.list().is_empty());
    }
}
