// Path pattern handling - placeholder substitution and name discovery

use crate::error::{DocsetError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Placeholder replaced by the logical name.
pub const PLACEHOLDER: char = '*';

/// A path pattern such as `data/*.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
}

impl PathPattern {
    pub fn new(raw: impl Into<String>) -> Self {
        PathPattern { raw: raw.into() }
    }

    /// Resolve a logical name to a file path. Absolute names are used as-is.
    pub fn resolve(&self, name: &str) -> PathBuf {
        if Path::new(name).is_absolute() {
            PathBuf::from(name)
        } else {
            PathBuf::from(self.raw.replace(PLACEHOLDER, name))
        }
    }

    /// File-name component of the pattern (`*.json` for `data/*.json`).
    fn file_part(&self) -> &str {
        Path::new(&self.raw)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("")
    }

    /// Whether the file-name component carries the placeholder, which is what
    /// makes the pattern listable.
    pub fn has_placeholder(&self) -> bool {
        self.file_part().contains(PLACEHOLDER)
    }

    /// Directory that holds the pattern's files, optionally descended into
    /// `sub_path`.
    pub fn directory(&self, sub_path: &str) -> PathBuf {
        let base = Path::new(&self.raw)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        if sub_path.is_empty() {
            base.to_path_buf()
        } else {
            base.join(sub_path)
        }
    }

    /// Glob for the file-name component, with everything but the placeholder
    /// escaped.
    pub fn file_glob(&self) -> String {
        self.file_part()
            .split(PLACEHOLDER)
            .map(glob::Pattern::escape)
            .collect::<Vec<_>>()
            .join("*")
    }

    /// Regex capturing the logical name from a file name.
    pub fn name_matcher(&self) -> Result<Regex> {
        let body = self
            .file_part()
            .split(PLACEHOLDER)
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join("(.+?)");
        Regex::new(&format!("^{body}$"))
            .map_err(|e| DocsetError::Pattern(format!("Invalid path pattern {}: {e}", self.raw)))
    }

    /// Logical name for a file name, if it matches the pattern.
    pub fn capture(&self, matcher: &Regex, file_name: &str) -> Option<String> {
        matcher
            .captures(file_name)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}
