//! File-backed root views.
//!
//! A store is the root [`View`] of a record set read from one JSON file. It
//! loads lazily on first access and writes only on `flush` (explicit, or
//! triggered by `autoflush`).

mod registry;

pub use registry::Registry;

use crate::error::{DocsetError, Result};
use crate::options::Options;
use crate::record::Key;
use crate::view::{Entries, View, ViewKind};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Persistence state of a store view.
#[derive(Debug)]
pub(crate) struct BackingStore {
    pub(crate) path: PathBuf,
    pub(crate) options: Options,
    pub(crate) loaded: bool,
}

impl BackingStore {
    pub(crate) fn new(path: PathBuf, options: Options) -> Self {
        BackingStore {
            path,
            options,
            loaded: false,
        }
    }

    /// Read and fold the backing file. A missing, unreadable or blank file is
    /// an empty record set; malformed JSON is `CorruptData`.
    fn read(&self) -> Result<Vec<(Key, Value)>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("{} does not exist yet", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                log::warn!(
                    "Cannot read {}: {e}; starting with an empty record set",
                    self.path.display()
                );
                return Ok(Vec::new());
            }
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        let document: Value =
            serde_json::from_slice(&bytes).map_err(|source| DocsetError::CorruptData {
                path: self.path.clone(),
                source,
            })?;
        Ok(fold_document(document))
    }

    /// Write `document`, or remove the file when `autodelete` is on and the
    /// record set is empty.
    fn write(&self, document: &Value, empty: bool) -> Result<()> {
        if self.options.autodelete && empty {
            return match std::fs::remove_file(&self.path) {
                Ok(()) => {
                    log::debug!("Removed empty {}", self.path.display());
                    Ok(())
                }
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(DocsetError::io(
                    format!("Cannot delete file {}", self.path.display()),
                    e,
                )),
            };
        }

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir)
            .map_err(|e| DocsetError::io(format!("Cannot create folder {}", dir.display()), e))?;

        let bytes = self.encode(document)?;
        let write_error =
            |e: std::io::Error| DocsetError::io(format!("Cannot write file {}", self.path.display()), e);
        let mut file = NamedTempFile::new_in(dir).map_err(write_error)?;
        file.write_all(&bytes).map_err(write_error)?;
        file.persist(&self.path).map_err(|e| write_error(e.error))?;

        log::debug!("Flushed {} bytes to {}", bytes.len(), self.path.display());
        Ok(())
    }

    fn encode(&self, document: &Value) -> Result<Vec<u8>> {
        if !self.options.pretty {
            return Ok(serde_json::to_vec(document)?);
        }
        let indent = " ".repeat(self.options.indent);
        let mut bytes = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(
            &mut bytes,
            PrettyFormatter::with_indent(indent.as_bytes()),
        );
        document.serialize(&mut serializer)?;
        Ok(bytes)
    }
}

/// Reconcile a decoded file with the keyed record set model.
///
/// An object whose members are all objects or arrays is the record set
/// itself. An object with any scalar member is one record, stored at key `0`.
/// Arrays are keyed by position. Any other scalar is a single record; `null`
/// is an empty set.
pub fn fold_document(document: Value) -> Vec<(Key, Value)> {
    match document {
        Value::Object(map) if map.values().all(|v| v.is_object() || v.is_array()) => map
            .into_iter()
            .map(|(name, record)| (Key::parse(&name), record))
            .collect(),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(pos, record)| (Key::Index(pos as i64), record))
            .collect(),
        Value::Null => Vec::new(),
        single => vec![(Key::Index(0), single)],
    }
}

impl View {
    pub(crate) fn open_store(path: PathBuf, options: Options) -> View {
        View::from_parts(
            None,
            Entries::default(),
            ViewKind::Store(BackingStore::new(path, options)),
        )
    }

    /// Populate a store from disk on first access. No-op for every other view.
    pub(crate) fn ensure_loaded(&self) -> Result<()> {
        let records = {
            let state = self.state.borrow();
            match &state.kind {
                ViewKind::Store(store) if !store.loaded => store.read()?,
                _ => return Ok(()),
            }
        };
        let entries: Entries = {
            let mut arena = self.arena.borrow_mut();
            records
                .into_iter()
                .map(|(key, record)| (key, arena.import(record)))
                .collect()
        };
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        state.entries = entries;
        if let ViewKind::Store(store) = &mut state.kind {
            log::debug!(
                "Loaded {} records from {}",
                state.entries.len(),
                store.path.display()
            );
            store.loaded = true;
        }
        Ok(())
    }

    /// The persistence step of `flush` for one view on the chain.
    pub(crate) fn persist(&self) -> Result<()> {
        if !self.is_store() {
            return Ok(());
        }
        let document = self.to_json()?;
        let state = self.state.borrow();
        if let ViewKind::Store(store) = &state.kind {
            store.write(&document, state.entries.is_empty())?;
        }
        Ok(())
    }

    /// Resolved file path of a store.
    pub fn path(&self) -> Option<PathBuf> {
        match &self.state.borrow().kind {
            ViewKind::Store(store) => Some(store.path.clone()),
            _ => None,
        }
    }

    /// Options a store was opened with.
    pub fn options(&self) -> Option<Options> {
        match &self.state.borrow().kind {
            ViewKind::Store(store) => Some(store.options.clone()),
            _ => None,
        }
    }

    /// Whether a store's file is present on disk.
    pub fn exists(&self) -> bool {
        self.path().is_some_and(|path| path.is_file())
    }

    /// Point a store at another logical name (resolved with its own pattern)
    /// and flush it there.
    pub fn save_as(&self, name: &str) -> Result<()> {
        self.ensure_loaded()?;
        {
            let mut state = self.state.borrow_mut();
            let ViewKind::Store(store) = &mut state.kind else {
                return Err(DocsetError::UnsupportedOperation(
                    "save_as() needs a file-backed view".into(),
                ));
            };
            store.path = store.options.pattern().resolve(name);
        }
        self.flush()
    }
}
