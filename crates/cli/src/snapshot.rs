//! JSON store snapshots: the CLI's persistence between invocations.

use std::path::Path;
use std::sync::Arc;

use rma_storage::{MemoryStore, StoreSnapshot};
use tracing::debug;

/// Load the store at `path`. A missing file yields an empty store when
/// `allow_missing` is set.
pub(crate) fn load_store(path: &Path, allow_missing: bool) -> Result<Arc<MemoryStore>, String> {
    if allow_missing && !path.exists() {
        debug!(path = %path.display(), "snapshot not found, starting empty");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading store '{}': {}", path.display(), e))?;
    let snapshot: StoreSnapshot = serde_json::from_str(&raw)
        .map_err(|e| format!("error parsing store '{}': {}", path.display(), e))?;
    debug!(path = %path.display(), cases = snapshot.cases.len(), "snapshot loaded");
    Ok(Arc::new(MemoryStore::from_snapshot(snapshot)))
}

/// Write the whole store back to `path`.
pub(crate) async fn save_store(store: &MemoryStore, path: &Path) -> Result<(), String> {
    let snapshot = store.snapshot().await;
    let pretty = serde_json::to_string_pretty(&snapshot)
        .map_err(|e| format!("serialization error: {}", e))?;
    std::fs::write(path, pretty)
        .map_err(|e| format!("error writing store '{}': {}", path.display(), e))?;
    debug!(path = %path.display(), cases = snapshot.cases.len(), "snapshot saved");
    Ok(())
}
