//! File-backed JSON store.
//!
//! The store is re-read on every access so edits made to the file by hand
//! show up on the next send. Nothing is cached.

use crate::error::StoreError;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use wsmock_core::{resolve, set_value_by_path};

/// Extensions of executable store modules, which are never loaded.
const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "ts"];

/// Handle to the backing store file.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    /// Opens a store at `path`.
    ///
    /// Script modules are rejected; any other file is treated as JSON.
    /// The file itself is not touched until the first read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if is_script(&path) {
            return Err(StoreError::UnsupportedFormat(path));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the raw file contents.
    pub async fn read_text(&self) -> Result<String, StoreError> {
        fs::read_to_string(&self.path)
            .await
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })
    }

    /// Replaces the raw file contents.
    pub async fn write_text(&self, content: &str) -> Result<(), StoreError> {
        fs::write(&self.path, content)
            .await
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })
    }

    /// Loads and parses the whole tree.
    pub async fn load(&self) -> Result<Value, StoreError> {
        let content = self.read_text().await?;
        self.parse(&content)
    }

    /// Loads the tree and returns the value at a request path.
    ///
    /// A path that does not resolve yields `Value::Null`.
    pub async fn load_at(&self, request_path: &str) -> Result<Value, StoreError> {
        let root = self.load().await?;
        let value = resolve(&root, request_path).cloned().unwrap_or(Value::Null);
        Ok(value)
    }

    /// Writes `value` at a write path and persists the tree pretty-printed.
    ///
    /// The file is left untouched if reading, parsing or the path walk fails.
    pub async fn update_value(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let content = self.read_text().await?;
        let mut root = self.parse(&content)?;

        set_value_by_path(&mut root, path, value)?;

        let pretty = serde_json::to_string_pretty(&root)?;
        self.write_text(&pretty).await?;
        debug!("Updated {} in {}", path, self.path.display());
        Ok(())
    }

    fn parse(&self, content: &str) -> Result<Value, StoreError> {
        serde_json::from_str(content).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

fn is_script(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SCRIPT_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}
