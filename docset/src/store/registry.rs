use crate::error::{DocsetError, Result};
use crate::options::Options;
use crate::view::View;
use glob::MatchOptions;
use std::collections::HashMap;

/// Factory and instance cache for file-backed views.
///
/// Instances are cached per path pattern and logical name, so two `get` calls
/// for the same name return handles to the same view and every mutation is
/// seen by both.
#[derive(Debug, Default)]
pub struct Registry {
    defaults: Options,
    /// pattern -> logical name -> store
    cache: HashMap<String, HashMap<String, View>>,
}

impl Registry {
    pub fn new(defaults: Options) -> Self {
        Registry {
            defaults,
            cache: HashMap::new(),
        }
    }

    pub fn options(&self) -> &Options {
        &self.defaults
    }

    /// Replace the default options. Cached instances keep the options they
    /// were opened with.
    pub fn set_options(&mut self, options: Options) {
        self.defaults = options;
    }

    /// Open the store for `name` with the default options.
    pub fn get(&mut self, name: &str) -> Result<View> {
        let options = self.defaults.clone();
        self.get_with(name, &options)
    }

    /// Open the store for `name`. With `cache` enabled, the same instance is
    /// returned for every call with the same pattern and name. With
    /// `lazy_load` disabled, the file is read here.
    pub fn get_with(&mut self, name: &str, options: &Options) -> Result<View> {
        if options.cache {
            if let Some(view) = self
                .cache
                .get(&options.path)
                .and_then(|names| names.get(name))
            {
                log::debug!("Cache hit for '{name}' ({})", options.path);
                return Ok(view.clone());
            }
        }

        let path = options.pattern().resolve(name);
        let view = View::open_store(path, options.clone());
        if !options.lazy_load {
            view.ensure_loaded()?;
        }
        if options.cache {
            self.cache
                .entry(options.path.clone())
                .or_default()
                .insert(name.to_string(), view.clone());
        }
        Ok(view)
    }

    /// Logical names of the files under `sub_path` that match the default
    /// pattern.
    pub fn list(&self, sub_path: &str) -> Result<Vec<String>> {
        self.list_with(sub_path, &self.defaults)
    }

    /// Logical names of the files under `sub_path` that match the pattern in
    /// `options`, sorted. Names found under a sub path carry it as a prefix,
    /// so each can be passed back to `get`. Files are not opened.
    pub fn list_with(&self, sub_path: &str, options: &Options) -> Result<Vec<String>> {
        let pattern = options.pattern();
        if !pattern.has_placeholder() {
            return Ok(Vec::new());
        }
        let dir = pattern.directory(sub_path);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let matcher = pattern.name_matcher()?;
        let glob_pattern = format!(
            "{}/{}",
            glob::Pattern::escape(&dir.to_string_lossy()),
            pattern.file_glob()
        );
        let match_options = MatchOptions {
            require_literal_leading_dot: true,
            ..MatchOptions::new()
        };
        let prefix = sub_path.trim_matches('/');

        let mut names = Vec::new();
        for entry in glob::glob_with(&glob_pattern, match_options)
            .map_err(|e| DocsetError::Pattern(format!("Glob error: {e}")))?
            .filter_map(|r| r.ok())
            .filter(|p| p.is_file())
        {
            let Some(file_name) = entry.file_name().and_then(|f| f.to_str()) else {
                continue;
            };
            if let Some(name) = pattern.capture(&matcher, file_name) {
                if prefix.is_empty() {
                    names.push(name);
                } else {
                    names.push(format!("{prefix}/{name}"));
                }
            }
        }
        Ok(names)
    }

    /// Evict cached instances under the default pattern whose logical name
    /// starts with `prefix`. Returns the number evicted.
    pub fn clear_cache(&mut self, prefix: &str) -> usize {
        let options = self.defaults.clone();
        self.clear_cache_with(prefix, &options)
    }

    /// Evict cached instances under the pattern in `options` whose logical
    /// name starts with `prefix`; an empty prefix evicts all of them.
    pub fn clear_cache_with(&mut self, prefix: &str, options: &Options) -> usize {
        let Some(names) = self.cache.get_mut(&options.path) else {
            return 0;
        };
        let before = names.len();
        names.retain(|name, _| !name.starts_with(prefix));
        let evicted = before - names.len();
        if names.is_empty() {
            self.cache.remove(&options.path);
        }
        log::debug!("Evicted {evicted} cached stores for prefix '{prefix}'");
        evicted
    }

    /// Whether an instance for `name` is cached under the default pattern.
    pub fn is_cached(&self, name: &str) -> bool {
        self.cache
            .get(&self.defaults.path)
            .is_some_and(|names| names.contains_key(name))
    }
}
