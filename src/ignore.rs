// src/ignore.rs

//! Per-run package exclusions
//!
//! Packages land here when a backend reports that one of their dependencies
//! cannot be resolved. The set only grows during a run and every backend
//! command built afterwards carries an `--ignore` flag for each entry.

use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreSet {
    packages: BTreeSet<String>,
}

impl IgnoreSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package; returns true if it was not already ignored
    pub fn insert(&mut self, package: impl Into<String>) -> bool {
        self.packages.insert(package.into())
    }

    pub fn contains(&self, package: &str) -> bool {
        self.packages.contains(package)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Entries in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.packages.iter().map(String::as_str)
    }

    /// pacman-style `--ignore <pkg>` arguments, sorted for deterministic argv
    pub fn flags(&self) -> Vec<String> {
        self.packages
            .iter()
            .flat_map(|pkg| ["--ignore".to_string(), pkg.clone()])
            .collect()
    }
}
