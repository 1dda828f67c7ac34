use crate::error::{DocsetError, Result};
use crate::path_template::PathPattern;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Store configuration. Every field has a default, so option files only need
/// to name what they change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Path pattern; `*` is replaced by the logical name.
    pub path: String,
    /// Flush synchronously whenever a mutation marks a store modified.
    pub autoflush: bool,
    /// Delete the backing file when a flush finds the record set empty.
    pub autodelete: bool,
    /// Serve repeated `get` calls for the same name from the registry cache.
    pub cache: bool,
    /// Defer reading the file until first access.
    pub lazy_load: bool,
    pub pretty: bool,
    /// Spaces per indentation level when `pretty` is set.
    pub indent: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            path: "data/*.json".to_string(),
            autoflush: false,
            autodelete: false,
            cache: true,
            lazy_load: true,
            pretty: true,
            indent: 4,
        }
    }
}

impl Options {
    pub fn pattern(&self) -> PathPattern {
        PathPattern::new(self.path.clone())
    }

    /// Parse options from YAML (JSON is accepted too).
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let options: Options = serde_yaml::from_str(content)?;
        Ok(options)
    }

    /// Read an options file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DocsetError::io(format!("Cannot read {}", path.display()), e))?;
        Self::from_yaml_str(&content)
    }
}
