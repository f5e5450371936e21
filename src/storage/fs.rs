//! Object store backed by a directory tree: `<root>/<container>/<key>`.

use super::ObjectStore;
use anyhow::{bail, Context, Result};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a container/key pair to a path under the root, refusing
    /// anything that would climb out of it.
    fn resolve(&self, container: &str, key: &str) -> Result<PathBuf> {
        let relative = Path::new(container).join(key);
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                other => bail!("Refusing object path component {:?} in {}/{}", other, container, key),
            }
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for FsObjectStore {
    fn download(&self, container: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(container, key)?;
        debug!(path = %path.display(), "Reading object from disk");

        let data = std::fs::read(&path)
            .with_context(|| format!("Failed to read object {}/{}", container, key))?;

        debug!(size_bytes = data.len(), "Read object from disk");
        Ok(data)
    }
}
