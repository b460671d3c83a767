//! Dependency sources: git, path, and workspace/member references.

use loom_core::{Error, ErrorCode, Result, VersionReq};
use serde::{Deserialize, Serialize};

/// A git source with exactly one of tag, semver constraint, rev, or branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSource {
    pub url: String,
    #[serde(default)]
    pub tag: Option<String>,
    /// Semver constraint, e.g. `">=2.0.0, <3.0.0"`.
    #[serde(default)]
    pub version: Option<String>,
    /// Full or short commit SHA.
    #[serde(default)]
    pub rev: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
}

/// A path source, relative to the consuming manifest's directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSource {
    pub path: String,
}

/// A named dependency with exactly one source class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub git: Option<GitSource>,
    pub path: Option<PathSource>,
    /// `{ workspace = true }`: resolve against the workspace dep table.
    pub workspace: bool,
    /// `{ member = true }`: resolve to the workspace member of this name.
    pub member: bool,
}

impl Dependency {
    /// A git dependency pinned to a tag.
    #[must_use]
    pub fn git_tag(name: &str, url: &str, tag: &str) -> Self {
        Self {
            name: name.to_string(),
            git: Some(GitSource {
                url: url.to_string(),
                tag: Some(tag.to_string()),
                version: None,
                rev: None,
                branch: None,
            }),
            path: None,
            workspace: false,
            member: false,
        }
    }

    /// A git dependency with a semver constraint.
    #[must_use]
    pub fn git_version(name: &str, url: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            git: Some(GitSource {
                url: url.to_string(),
                tag: None,
                version: Some(version.to_string()),
                rev: None,
                branch: None,
            }),
            path: None,
            workspace: false,
            member: false,
        }
    }

    /// A path dependency.
    #[must_use]
    pub fn path_dep(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            git: None,
            path: Some(PathSource {
                path: path.to_string(),
            }),
            workspace: false,
            member: false,
        }
    }

    /// Canonical source string: `git+<url>` or `path+<path>`, empty for
    /// workspace/member references.
    #[must_use]
    pub fn source_id(&self) -> String {
        if let Some(git) = &self.git {
            format!("git+{}", git.url)
        } else if let Some(path) = &self.path {
            format!("path+{}", path.path)
        } else {
            String::new()
        }
    }

    /// Validate the dependency shape.
    ///
    /// # Errors
    ///
    /// Returns a `Dependency` error when no source or multiple sources are
    /// present, a git source has an empty URL or not exactly one ref, or a
    /// version constraint fails to parse.
    pub fn validate(&self) -> Result<()> {
        let source_count = usize::from(self.git.is_some())
            + usize::from(self.path.is_some())
            + usize::from(self.workspace)
            + usize::from(self.member);

        if source_count == 0 {
            return Err(Error::new(
                ErrorCode::Dependency,
                format!("dependency '{}' has no source", self.name),
            )
            .with_hint("specify one of: git, path, workspace = true, or member = true"));
        }
        if source_count > 1 {
            return Err(Error::new(
                ErrorCode::Dependency,
                format!("dependency '{}' has multiple sources", self.name),
            )
            .with_hint("git, path, workspace, and member are mutually exclusive"));
        }

        if let Some(git) = &self.git {
            if git.url.is_empty() {
                return Err(Error::new(
                    ErrorCode::Dependency,
                    format!("dependency '{}' has empty git URL", self.name),
                ));
            }

            let ref_count = usize::from(git.tag.is_some())
                + usize::from(git.version.is_some())
                + usize::from(git.rev.is_some())
                + usize::from(git.branch.is_some());

            if ref_count == 0 {
                return Err(Error::new(
                    ErrorCode::Dependency,
                    format!("dependency '{}' git source has no ref", self.name),
                )
                .with_hint("specify one of: tag, version, rev, or branch"));
            }
            if ref_count > 1 {
                return Err(Error::new(
                    ErrorCode::Dependency,
                    format!("dependency '{}' git source has multiple refs", self.name),
                )
                .with_hint("tag, version, rev, and branch are mutually exclusive"));
            }

            if let Some(version) = &git.version {
                VersionReq::parse(version).map_err(|e| {
                    Error::new(
                        ErrorCode::Dependency,
                        format!(
                            "dependency '{}' has invalid version constraint: {}",
                            self.name, e.message
                        ),
                    )
                })?;
            }
        }

        if let Some(path) = &self.path {
            if path.path.is_empty() {
                return Err(Error::new(
                    ErrorCode::Dependency,
                    format!("dependency '{}' has empty path", self.name),
                ));
            }
        }

        Ok(())
    }
}
