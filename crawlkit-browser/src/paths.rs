//! Persisted-state layout helpers (§6.2). All paths live under one data
//! directory so a deployment can point `CRAWLKIT_DATA_DIR` at a single
//! volume and get every `PersistentStore` file colocated.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_env() -> Self {
        let root = std::env::var("CRAWLKIT_DATA_DIR").unwrap_or_else(|_| "./crawlkit-data".to_string());
        Self::new(root)
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    pub fn session_path(&self, profile: &str) -> PathBuf {
        self.sessions_dir().join(format!("{profile}.json"))
    }

    pub fn learning_engine_path(&self) -> PathBuf {
        self.root.join("learning-engine.json")
    }

    pub fn procedural_memory_path(&self) -> PathBuf {
        self.root.join("procedural-memory.json")
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.root.join("credentials.json")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_path_is_scoped_under_sessions_dir() {
        let layout = StateLayout::new("/data/crawlkit");
        assert_eq!(layout.session_path("default"), Path::new("/data/crawlkit/sessions/default.json"));
    }

    #[test]
    fn sibling_paths_share_the_root() {
        let layout = StateLayout::new("/data/crawlkit");
        assert_eq!(layout.learning_engine_path(), Path::new("/data/crawlkit/learning-engine.json"));
        assert_eq!(layout.procedural_memory_path(), Path::new("/data/crawlkit/procedural-memory.json"));
        assert_eq!(layout.credentials_path(), Path::new("/data/crawlkit/credentials.json"));
    }
}
