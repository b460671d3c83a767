//! Workspace discovery, validation, and member selection.
//!
//! ```toml
//! # Loom.toml at the workspace root
//! [workspace]
//! members = ["ips/*", "soc/top"]
//! exclude = ["ips/experimental"]
//! default-members = ["soc/top"]
//!
//! [workspace.dependencies]
//! common_cells = { git = "https://github.com/org/common.git", version = "^0.5" }
//! ```
//!
//! Members reference shared dependencies with `{ workspace = true }` and
//! sibling members with `{ member = true }`; both are expanded before
//! resolution. All members share the root lockfile.

use crate::config::{global_config_path, Config};
use crate::lockfile::LOCK_FILE;
use crate::manifest::{Manifest, MANIFEST_FILE};
use crate::source::{Dependency, PathSource};
use loom_core::glob::glob_match;
use loom_core::{Error, ErrorCode, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One discovered member.
#[derive(Debug, Clone)]
pub struct WorkspaceMember {
    pub name: String,
    pub version: String,
    pub manifest_path: PathBuf,
    pub root_dir: PathBuf,
    pub manifest: Manifest,
}

/// A workspace: root manifest, canonical root directory, sorted members.
#[derive(Debug)]
pub struct Workspace {
    root_manifest: Manifest,
    root_dir: PathBuf,
    members: Vec<WorkspaceMember>,
}

impl Workspace {
    /// Load and validate the workspace rooted at `workspace_root`.
    ///
    /// # Errors
    ///
    /// Returns a `Manifest` error when the root manifest has no
    /// `[workspace]` section, plus discovery and validation errors.
    pub fn load(workspace_root: &Path) -> Result<Self> {
        let manifest_path = workspace_root.join(MANIFEST_FILE);
        let manifest = Manifest::load(&manifest_path)?;

        if !manifest.is_workspace() {
            return Err(Error::new(
                ErrorCode::Manifest,
                format!("not a workspace: {}", manifest_path.display()),
            )
            .with_hint("add a [workspace] section to make this a workspace root"));
        }

        let root_dir = workspace_root
            .canonicalize()
            .unwrap_or_else(|_| workspace_root.to_path_buf());

        let mut ws = Self {
            root_manifest: manifest,
            root_dir,
            members: Vec::new(),
        };
        ws.expand_member_globs()?;
        ws.validate()?;
        Ok(ws)
    }

    /// Walk upward from `start_dir` until a workspace manifest is found.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no workspace root exists above `start_dir`.
    pub fn discover(start_dir: &Path) -> Result<Self> {
        let mut dir = start_dir
            .canonicalize()
            .unwrap_or_else(|_| start_dir.to_path_buf());

        loop {
            let candidate = dir.join(MANIFEST_FILE);
            if candidate.exists() {
                if let Ok(manifest) = Manifest::load(&candidate) {
                    if manifest.is_workspace() {
                        return Self::load(&dir);
                    }
                }
            }
            match dir.parent() {
                Some(parent) => dir = parent.to_path_buf(),
                None => {
                    return Err(Error::new(
                        ErrorCode::NotFound,
                        format!("no workspace root found from: {}", start_dir.display()),
                    ));
                }
            }
        }
    }

    /// Expand member glob patterns into loaded members, sorted by name.
    fn expand_member_globs(&mut self) -> Result<()> {
        let ws = self
            .root_manifest
            .workspace
            .as_ref()
            .ok_or_else(|| Error::new(ErrorCode::Manifest, "not a workspace manifest"))?;

        let mut member_dirs = Vec::new();
        collect_manifest_dirs(&self.root_dir, &self.root_dir, &mut member_dirs)?;

        let mut included = Vec::new();
        for rel in member_dirs {
            if !ws.members.iter().any(|p| glob_match(p, &rel)) {
                continue;
            }
            if ws.exclude.iter().any(|p| glob_match(p, &rel)) {
                continue;
            }
            included.push(rel);
        }

        for rel in included {
            let member_dir = self.root_dir.join(&rel);
            let manifest_path = member_dir.join(MANIFEST_FILE);
            let manifest = Manifest::load(&manifest_path)?;

            self.members.push(WorkspaceMember {
                name: manifest.package.name.clone(),
                version: manifest.package.version.clone(),
                manifest_path,
                root_dir: member_dir,
                manifest,
            });
        }

        self.members.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        // Unique member names.
        let mut names = HashSet::new();
        for m in &self.members {
            if !names.insert(m.name.as_str()) {
                return Err(Error::new(
                    ErrorCode::Duplicate,
                    format!("duplicate workspace member name: {}", m.name),
                ));
            }
        }

        // No nested workspaces, no member lockfiles.
        for m in &self.members {
            if m.manifest.is_workspace() {
                return Err(Error::new(
                    ErrorCode::Manifest,
                    format!(
                        "member '{}' is itself a workspace, nested workspaces not allowed",
                        m.name
                    ),
                ));
            }
            if m.root_dir.join(LOCK_FILE).exists() {
                return Err(Error::new(
                    ErrorCode::Manifest,
                    format!("member '{}' has its own {LOCK_FILE}", m.name),
                )
                .with_hint("only the workspace root should have a lockfile"));
            }
        }

        // Every workspace/member reference must resolve.
        let ws = self.root_manifest.workspace.as_ref();
        for m in &self.members {
            for dep in &m.manifest.dependencies {
                if dep.workspace {
                    let found = ws
                        .map(|w| w.dependencies.iter().any(|wd| wd.name == dep.name))
                        .unwrap_or(false);
                    if !found {
                        return Err(Error::new(
                            ErrorCode::Dependency,
                            format!(
                                "member '{}' depends on workspace dep '{}' which is not in [workspace.dependencies]",
                                m.name, dep.name
                            ),
                        ));
                    }
                }
                if dep.member && self.find_member(&dep.name).is_none() {
                    return Err(Error::new(
                        ErrorCode::Dependency,
                        format!(
                            "member '{}' depends on member '{}' which is not a workspace member",
                            m.name, dep.name
                        ),
                    ));
                }
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn members(&self) -> &[WorkspaceMember] {
        &self.members
    }

    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn find_member(&self, name: &str) -> Option<&WorkspaceMember> {
        self.members.iter().find(|m| m.name == name)
    }

    /// The member whose directory contains `path`, if any.
    #[must_use]
    pub fn member_for_path(&self, path: &Path) -> Option<&WorkspaceMember> {
        let abs = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.members.iter().find(|m| {
            let member_abs = m
                .root_dir
                .canonicalize()
                .unwrap_or_else(|_| m.root_dir.clone());
            abs.starts_with(&member_abs)
        })
    }

    /// A workspace is virtual iff its root manifest has no package section.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.root_manifest.package.name.is_empty()
    }

    #[must_use]
    pub fn root_manifest(&self) -> &Manifest {
        &self.root_manifest
    }

    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Select build targets: explicit `-p` flags win, then `--all`, then
    /// `default-members`, then the member containing `cwd`, then everything.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when a `-p` flag names an unknown member.
    pub fn resolve_targets(
        &self,
        pkg_flags: &[String],
        all: bool,
        cwd: &Path,
    ) -> Result<Vec<&WorkspaceMember>> {
        if !pkg_flags.is_empty() {
            let mut result = Vec::with_capacity(pkg_flags.len());
            for name in pkg_flags {
                let member = self.find_member(name).ok_or_else(|| {
                    Error::new(
                        ErrorCode::NotFound,
                        format!("no workspace member named '{name}'"),
                    )
                })?;
                result.push(member);
            }
            return Ok(result);
        }

        if all {
            return Ok(self.members.iter().collect());
        }

        // default-members holds relative directory paths, not package names.
        if let Some(ws) = &self.root_manifest.workspace {
            if !ws.default_members.is_empty() {
                let mut result = Vec::new();
                for dm in &ws.default_members {
                    let dm_abs = self
                        .root_dir
                        .join(dm)
                        .canonicalize()
                        .unwrap_or_else(|_| self.root_dir.join(dm));
                    if let Some(member) = self.members.iter().find(|m| {
                        m.root_dir
                            .canonicalize()
                            .unwrap_or_else(|_| m.root_dir.clone())
                            == dm_abs
                    }) {
                        result.push(member);
                    }
                }
                if !result.is_empty() {
                    return Ok(result);
                }
            }
        }

        if let Some(member) = self.member_for_path(cwd) {
            return Ok(vec![member]);
        }

        Ok(self.members.iter().collect())
    }

    /// Expand a `{ workspace = true }` reference against the shared table.
    ///
    /// # Errors
    ///
    /// Returns a `Dependency` error when the name is not in the table.
    pub fn resolve_workspace_dep(&self, dep_name: &str) -> Result<Dependency> {
        let ws = self.root_manifest.workspace.as_ref().ok_or_else(|| {
            Error::new(
                ErrorCode::Dependency,
                format!("not a workspace, cannot resolve workspace dependency: {dep_name}"),
            )
        })?;

        ws.dependencies
            .iter()
            .find(|d| d.name == dep_name)
            .cloned()
            .ok_or_else(|| {
                Error::new(
                    ErrorCode::Dependency,
                    format!(
                        "workspace dependency '{dep_name}' not found in [workspace.dependencies]"
                    ),
                )
            })
    }

    /// Expand a `{ member = true }` reference to a path dependency.
    ///
    /// # Errors
    ///
    /// Returns a `Dependency` error when no member has that name.
    pub fn resolve_member_dep(&self, dep_name: &str) -> Result<Dependency> {
        let member = self.find_member(dep_name).ok_or_else(|| {
            Error::new(
                ErrorCode::Dependency,
                format!("member dependency '{dep_name}' not found in workspace members"),
            )
        })?;

        Ok(Dependency {
            name: dep_name.to_string(),
            git: None,
            path: Some(PathSource {
                path: member.root_dir.to_string_lossy().into_owned(),
            }),
            workspace: false,
            member: false,
        })
    }

    /// Effective configuration for a member: global file, then workspace
    /// root, then the member's own manifest.
    #[must_use]
    pub fn effective_config(&self, member: &WorkspaceMember) -> Config {
        let global = global_config_path().and_then(|p| Config::load(&p).ok());

        let workspace_cfg = Config {
            lint: self.root_manifest.lint.clone(),
            build: self.root_manifest.build,
            targets: self.root_manifest.targets.clone(),
        };

        let member_cfg = Config {
            lint: member.manifest.lint.clone(),
            build: member.manifest.build,
            targets: member.manifest.targets.clone(),
        };

        Config::effective(global.as_ref(), Some(&workspace_cfg), Some(&member_cfg))
    }
}

/// Collect root-relative directories (forward-slashed) containing a manifest,
/// skipping the root itself.
fn collect_manifest_dirs(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        // Hidden directories are never members.
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        if path.join(MANIFEST_FILE).exists() {
            let rel = path.strip_prefix(root).unwrap_or(&path);
            out.push(rel.to_string_lossy().replace('\\', "/"));
        }
        collect_manifest_dirs(root, &path, out)?;
    }
    Ok(())
}
