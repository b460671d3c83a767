//! Local developer overrides (`Loom.local`).
//!
//! ```toml
//! [overrides]
//! common_cells = { path = "../common_cells" }
//! uart_ip = { git = "https://github.com/me/uart.git", branch = "fix-fifo" }
//! ```
//!
//! Overrides are developer-private: they redirect locked packages without
//! touching the manifest, and are suppressed by `--no-local` or
//! `LOOM_NO_LOCAL=1`.

use loom_core::{Error, ErrorCode, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

/// The overrides filename.
pub const LOCAL_FILE: &str = "Loom.local";

/// Environment variable that suppresses overrides when set to `1`.
pub const NO_LOCAL_ENV: &str = "LOOM_NO_LOCAL";

/// One override: a path redirect or an alternate git source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideSource {
    Path {
        path: String,
    },
    Git {
        url: String,
        branch: Option<String>,
        tag: Option<String>,
        rev: Option<String>,
    },
}

impl OverrideSource {
    /// The ref an override pins, preferring tag, then branch, then rev.
    #[must_use]
    pub fn git_ref(&self) -> Option<&str> {
        match self {
            Self::Path { .. } => None,
            Self::Git {
                branch, tag, rev, ..
            } => tag
                .as_deref()
                .or(branch.as_deref())
                .or(rev.as_deref()),
        }
    }
}

/// The parsed `[overrides]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalOverrides {
    pub overrides: BTreeMap<String, OverrideSource>,
}

impl LocalOverrides {
    /// Parse a `Loom.local` document.
    ///
    /// # Errors
    ///
    /// Returns a `Parse` error for invalid TOML, a table with both or
    /// neither of `path`/`git`, or a git override with more than one of
    /// `branch`/`tag`/`rev`.
    pub fn parse(content: &str) -> Result<Self> {
        let doc: toml::Table = content.parse().map_err(|e: toml::de::Error| {
            Error::new(ErrorCode::Parse, format!("Loom.local parse error: {e}"))
        })?;

        let mut result = Self::default();
        let Some(overrides) = doc.get("overrides") else {
            return Ok(result);
        };
        let overrides = overrides.as_table().ok_or_else(|| {
            Error::new(ErrorCode::Parse, "[overrides] must be a table")
        })?;

        for (name, value) in overrides {
            let tbl = value.as_table().ok_or_else(|| {
                Error::new(
                    ErrorCode::Parse,
                    format!("override '{name}' must be a table"),
                )
            })?;

            let get_str = |key: &str| {
                tbl.get(key)
                    .and_then(toml::Value::as_str)
                    .map(ToString::to_string)
            };
            let path = get_str("path");
            let git = get_str("git");

            let src = match (path, git) {
                (Some(_), Some(_)) => {
                    return Err(Error::new(
                        ErrorCode::Parse,
                        format!("override '{name}' cannot have both 'path' and 'git'"),
                    ));
                }
                (None, None) => {
                    return Err(Error::new(
                        ErrorCode::Parse,
                        format!("override '{name}' must have either 'path' or 'git'"),
                    ));
                }
                (Some(path), None) => OverrideSource::Path { path },
                (None, Some(url)) => {
                    let branch = get_str("branch");
                    let tag = get_str("tag");
                    let rev = get_str("rev");
                    let ref_count = usize::from(branch.is_some())
                        + usize::from(tag.is_some())
                        + usize::from(rev.is_some());
                    if ref_count > 1 {
                        return Err(Error::new(
                            ErrorCode::Parse,
                            format!(
                                "override '{name}' may have at most one of branch/tag/rev"
                            ),
                        ));
                    }
                    OverrideSource::Git {
                        url,
                        branch,
                        tag,
                        rev,
                    }
                }
            };

            result.overrides.insert(name.clone(), src);
        }

        Ok(result)
    }

    /// Load a `Loom.local` file.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error if the file cannot be read, plus parse errors.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::new(
                ErrorCode::Io,
                format!("cannot open local overrides file: {}: {e}", path.display()),
            )
        })?;
        Self::parse(&content)
    }

    #[must_use]
    pub fn has_override(&self, name: &str) -> bool {
        self.overrides.contains_key(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&OverrideSource> {
        self.overrides.get(name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    /// Validate override targets on disk.
    ///
    /// # Errors
    ///
    /// Returns an `Io`/`Manifest` error for a path override that does not
    /// point at a package directory, or a `Parse` error for an empty git URL.
    pub fn validate(&self) -> Result<()> {
        for (name, src) in &self.overrides {
            match src {
                OverrideSource::Path { path } => {
                    let dir = Path::new(path);
                    if !dir.is_dir() {
                        return Err(Error::new(
                            ErrorCode::Io,
                            format!(
                                "override '{name}': path does not exist or is not a directory: {path}"
                            ),
                        ));
                    }
                    if !dir.join(crate::manifest::MANIFEST_FILE).exists() {
                        return Err(Error::new(
                            ErrorCode::Manifest,
                            format!(
                                "override '{name}': path '{path}' does not contain a Loom.toml"
                            ),
                        ));
                    }
                }
                OverrideSource::Git { url, .. } => {
                    if url.is_empty() {
                        return Err(Error::new(
                            ErrorCode::Parse,
                            format!("override '{name}': git URL cannot be empty"),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Log every active override.
    pub fn warn_active(&self) {
        for (name, src) in &self.overrides {
            match src {
                OverrideSource::Path { path } => {
                    warn!("local override active: {name} -> path '{path}'");
                }
                OverrideSource::Git { url, .. } => match src.git_ref() {
                    Some(r) => warn!("local override active: {name} -> git '{url}' ({r})"),
                    None => warn!("local override active: {name} -> git '{url}'"),
                },
            }
        }
    }
}

/// Load `Loom.local` from a project root; a missing file yields empty
/// overrides, not an error.
///
/// # Errors
///
/// Returns parse errors for a malformed file.
pub fn discover_local_overrides(project_root: &Path) -> Result<LocalOverrides> {
    let local = project_root.join(LOCAL_FILE);
    if !local.exists() {
        return Ok(LocalOverrides::default());
    }
    LocalOverrides::load(&local)
}

/// Whether overrides should be suppressed, from the CLI flag or environment.
#[must_use]
pub fn should_suppress_overrides(no_local_flag: bool) -> bool {
    if no_local_flag {
        return true;
    }
    std::env::var(NO_LOCAL_ENV).as_deref() == Ok("1")
}
