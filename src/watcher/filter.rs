//! Resource Filter Module
//!
//! Provides exclude/include filtering for paths under a watched root.
//! Patterns are glob patterns matched against the path relative to the root.

use glob::Pattern;
use std::path::{Path, PathBuf};

use crate::core::error::{RestartError, Result};

/// Result of filtering a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResult {
    /// Change should be considered for a restart
    Include,
    /// Change should be ignored
    Exclude(FilterReason),
}

/// Reason for excluding a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    /// Path matches an exclusion pattern
    Excluded,
    /// Path is not under the watched root
    OutsideRoot,
}

/// Include/exclude rules for one watched root
#[derive(Debug, Clone)]
pub struct ResourceFilter {
    exclude_patterns: Vec<String>,
    include_patterns: Vec<String>,
    exclude_matchers: Vec<Pattern>,
    include_matchers: Vec<Pattern>,
}

impl ResourceFilter {
    /// Create a new filter from exclusion and inclusion patterns
    pub fn new(exclude: Vec<String>, include: Vec<String>) -> Result<Self> {
        let exclude_matchers = compile(&exclude, "exclude")?;
        let include_matchers = compile(&include, "include")?;

        Ok(Self {
            exclude_patterns: exclude,
            include_patterns: include,
            exclude_matchers,
            include_matchers,
        })
    }

    /// A filter that accepts every path
    pub fn allow_all() -> Self {
        Self {
            exclude_patterns: vec![],
            include_patterns: vec![],
            exclude_matchers: vec![],
            include_matchers: vec![],
        }
    }

    /// Check a path relative to its root
    pub fn should_filter(&self, relative: &Path) -> FilterResult {
        let normalized = normalize(relative);

        // Include patterns win over exclusions
        if self.include_matchers.iter().any(|m| m.matches(&normalized)) {
            return FilterResult::Include;
        }

        if self.exclude_matchers.iter().any(|m| m.matches(&normalized)) {
            return FilterResult::Exclude(FilterReason::Excluded);
        }

        FilterResult::Include
    }

    /// Whether the relative path is excluded by any rule
    pub fn is_excluded(&self, relative: &Path) -> bool {
        matches!(self.should_filter(relative), FilterResult::Exclude(_))
    }

    pub fn exclude_patterns(&self) -> &[String] {
        &self.exclude_patterns
    }

    pub fn include_patterns(&self) -> &[String] {
        &self.include_patterns
    }
}

/// A watched root together with its filter
#[derive(Debug, Clone)]
pub struct WatchedResource {
    root: PathBuf,
    filter: ResourceFilter,
}

impl WatchedResource {
    pub fn new(root: impl Into<PathBuf>, filter: ResourceFilter) -> Self {
        Self {
            root: root.into(),
            filter,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn filter(&self) -> &ResourceFilter {
        &self.filter
    }

    /// Check an absolute (or root-prefixed) path against this resource
    pub fn should_filter(&self, path: &Path) -> FilterResult {
        match path.strip_prefix(&self.root) {
            Ok(relative) => self.filter.should_filter(relative),
            Err(_) => FilterResult::Exclude(FilterReason::OutsideRoot),
        }
    }

    /// Whether a change to `path` is relevant for this resource
    pub fn accepts(&self, path: &Path) -> bool {
        self.should_filter(path) == FilterResult::Include
    }
}

fn compile(patterns: &[String], kind: &str) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| Pattern::new(p))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| RestartError::Config(format!("Invalid {} pattern: {}", kind, e)))
}

fn normalize(path: &Path) -> String {
    // Normalize path separators for cross-platform matching
    path.to_string_lossy().replace('\\', "/")
}
