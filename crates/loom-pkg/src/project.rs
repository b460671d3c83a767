//! Project discovery: a manifest, its directory, and its source files.

use crate::manifest::{Manifest, SourceGroup, MANIFEST_FILE};
use crate::target_expr::{filter_source_groups, TargetSet};
use loom_core::glob::glob_expand;
use loom_core::hash::sha256_hex;
use loom_core::{Error, ErrorCode, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Walk upward from `start_dir` until a `Loom.toml` is found.
///
/// # Errors
///
/// Returns `NotFound` when no manifest exists in any parent directory.
pub fn find_manifest(start_dir: &Path) -> Result<PathBuf> {
    let mut dir = start_dir
        .canonicalize()
        .unwrap_or_else(|_| start_dir.to_path_buf());

    loop {
        let candidate = dir.join(MANIFEST_FILE);
        if candidate.exists() {
            return Ok(candidate);
        }
        match dir.parent() {
            Some(parent) => dir = parent.to_path_buf(),
            None => {
                return Err(Error::new(
                    ErrorCode::NotFound,
                    format!(
                        "no {MANIFEST_FILE} found in {} or any parent directory",
                        start_dir.display()
                    ),
                ));
            }
        }
    }
}

/// Returns true if `dir` directly contains a manifest.
#[must_use]
pub fn has_manifest(dir: &Path) -> bool {
    dir.join(MANIFEST_FILE).exists()
}

/// A loaded project: manifest, canonical root, and manifest checksum.
#[derive(Debug, Clone)]
pub struct Project {
    pub manifest: Manifest,
    pub root_dir: PathBuf,
    pub manifest_path: PathBuf,
    /// SHA-256 of the manifest bytes, used in filelist cache keys.
    pub checksum: String,
}

impl Project {
    /// Load the project rooted at `project_dir`.
    ///
    /// # Errors
    ///
    /// Returns `Io` when the manifest cannot be read, plus parse errors.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let manifest_path = project_dir.join(MANIFEST_FILE);
        let contents = std::fs::read_to_string(&manifest_path).map_err(|e| {
            Error::new(
                ErrorCode::Io,
                format!("cannot open manifest: {}: {e}", manifest_path.display()),
            )
        })?;

        let checksum = sha256_hex(contents.as_bytes());
        let manifest = Manifest::parse(&contents)?;

        let root_dir = project_dir
            .canonicalize()
            .unwrap_or_else(|_| project_dir.to_path_buf());
        let manifest_path = root_dir.join(MANIFEST_FILE);

        Ok(Self {
            manifest,
            root_dir,
            manifest_path,
            checksum,
        })
    }

    /// Discover and load the project containing `start_dir`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no manifest is discovered upward.
    pub fn discover(start_dir: &Path) -> Result<Self> {
        let manifest_path = find_manifest(start_dir)?;
        let dir = manifest_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        Self::load(&dir)
    }

    /// Source groups for the active target set, with file globs expanded to
    /// absolute paths.
    ///
    /// # Errors
    ///
    /// Propagates glob expansion failures.
    pub fn collect_source_groups(&self, active: &TargetSet) -> Result<Vec<SourceGroup>> {
        let filtered = filter_source_groups(&self.manifest.sources, active);

        let mut result = Vec::with_capacity(filtered.len());
        for group in filtered {
            let mut resolved = SourceGroup {
                target: group.target.clone(),
                files: Vec::new(),
                include_dirs: group.include_dirs.clone(),
                defines: group.defines.clone(),
            };

            for pattern in &group.files {
                if is_glob_pattern(pattern) {
                    for rel in glob_expand(pattern, &self.root_dir)? {
                        resolved
                            .files
                            .push(self.root_dir.join(rel).to_string_lossy().into_owned());
                    }
                } else {
                    resolved
                        .files
                        .push(self.root_dir.join(pattern).to_string_lossy().into_owned());
                }
            }
            result.push(resolved);
        }

        Ok(result)
    }

    /// Flat, deduplicated source file list for the active target set.
    ///
    /// # Errors
    ///
    /// Propagates glob expansion failures.
    pub fn collect_sources(&self, active: &TargetSet) -> Result<Vec<String>> {
        let groups = self.collect_source_groups(active)?;
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for group in &groups {
            for file in &group.files {
                if seen.insert(file.clone()) {
                    result.push(file.clone());
                }
            }
        }
        Ok(result)
    }
}

fn is_glob_pattern(s: &str) -> bool {
    s.contains(['*', '?', '['])
}
