//! Compiled-ruleset cache.
//!
//! Shared across editing sessions, keyed by canonical path and
//! invalidated on mtime change. Reads take a shared lock; compilation
//! happens outside the lock so concurrent readers are never blocked on
//! a slow compile. The capacity bound evicts in insertion order.

use crate::ruleset::SchematronRuleset;
use crate::SchematronError;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

struct Entry {
    mtime: SystemTime,
    ruleset: Arc<SchematronRuleset>,
}

struct Inner {
    entries: HashMap<PathBuf, Entry>,
    order: VecDeque<PathBuf>,
}

pub struct RulesetCache {
    inner: RwLock<Inner>,
    capacity: usize,
}

impl RulesetCache {
    pub fn new(capacity: usize) -> RulesetCache {
        RulesetCache {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("cache lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("cache lock poisoned");
        inner.entries.clear();
        inner.order.clear();
    }

    /// Fetch the compiled ruleset for `path`, recompiling when the file
    /// changed since it was cached.
    pub fn get_or_compile(&self, path: &Path) -> Result<Arc<SchematronRuleset>, SchematronError> {
        let canonical = path.canonicalize().map_err(|source| SchematronError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mtime = std::fs::metadata(&canonical)
            .and_then(|m| m.modified())
            .map_err(|source| SchematronError::Io {
                path: canonical.display().to_string(),
                source,
            })?;

        {
            let inner = self.inner.read().expect("cache lock poisoned");
            if let Some(entry) = inner.entries.get(&canonical) {
                if entry.mtime == mtime {
                    return Ok(entry.ruleset.clone());
                }
            }
        }

        let text = std::fs::read_to_string(&canonical).map_err(|source| SchematronError::Io {
            path: canonical.display().to_string(),
            source,
        })?;
        let ruleset = Arc::new(crate::ruleset::parse(&text)?);

        let mut inner = self.inner.write().expect("cache lock poisoned");
        if !inner.entries.contains_key(&canonical) {
            inner.order.push_back(canonical.clone());
            while inner.entries.len() >= self.capacity {
                if let Some(evicted) = inner.order.pop_front() {
                    inner.entries.remove(&evicted);
                } else {
                    break;
                }
            }
        }
        inner.entries.insert(
            canonical,
            Entry {
                mtime,
                ruleset: ruleset.clone(),
            },
        );
        Ok(ruleset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"<sch:schema xmlns:sch="http://purl.oclc.org/dsdl/schematron">
  <sch:pattern id="p"><sch:rule context="root">
    <sch:assert test="true()">ok</sch:assert>
  </sch:rule></sch:pattern>
</sch:schema>"#;

    #[test]
    fn cache_hits_until_mtime_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.sch");
        std::fs::write(&path, MINIMAL).unwrap();

        let cache = RulesetCache::new(4);
        let first = cache.get_or_compile(&path).unwrap();
        let second = cache.get_or_compile(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second), "unchanged file must hit");

        // Rewrite with a bumped mtime.
        std::thread::sleep(std::time::Duration::from_millis(1100));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(MINIMAL.as_bytes()).unwrap();
        drop(f);
        let third = cache.get_or_compile(&path).unwrap();
        assert!(!Arc::ptr_eq(&first, &third), "mtime change must recompile");
    }

    #[test]
    fn capacity_bound_evicts_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RulesetCache::new(2);
        let mut paths = Vec::new();
        for i in 0..3 {
            let path = dir.path().join(format!("r{i}.sch"));
            std::fs::write(&path, MINIMAL).unwrap();
            cache.get_or_compile(&path).unwrap();
            paths.push(path);
        }
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
