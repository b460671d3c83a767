//! Package name parsing and normalization.
//!
//! Names match `[a-zA-Z][a-zA-Z0-9_-]*`. Two names are the same package iff
//! their normalized forms (lowercase, hyphens folded to underscores) are
//! equal, so `Common-Cells` and `common_cells` collide.

use crate::error::{Error, ErrorCode, Result};

/// A validated package name with its normalized form.
#[derive(Debug, Clone)]
pub struct PackageName {
    raw: String,
    normalized: String,
}

impl PackageName {
    /// Parse and validate a package name.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidArg` error for an empty name, a leading non-letter,
    /// or any character outside `[a-zA-Z0-9_-]`.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::new(ErrorCode::InvalidArg, "empty package name"));
        }

        let first = raw.chars().next().unwrap_or_default();
        if !first.is_ascii_alphabetic() {
            return Err(Error::new(
                ErrorCode::InvalidArg,
                format!("invalid package name '{raw}'"),
            )
            .with_hint("package names must start with a letter"));
        }

        for c in raw.chars().skip(1) {
            if !c.is_ascii_alphanumeric() && c != '_' && c != '-' {
                return Err(Error::new(
                    ErrorCode::InvalidArg,
                    format!("invalid character '{c}' in package name '{raw}'"),
                )
                .with_hint("allowed: [a-zA-Z0-9_-]"));
            }
        }

        let normalized = raw
            .chars()
            .map(|c| if c == '-' { '_' } else { c.to_ascii_lowercase() })
            .collect();

        Ok(Self {
            raw: raw.to_string(),
            normalized,
        })
    }

    /// The name as written.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The lowercase, underscore-folded form used for comparison.
    #[must_use]
    pub fn normalized(&self) -> &str {
        &self.normalized
    }
}

impl PartialEq for PackageName {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for PackageName {}

impl std::hash::Hash for PackageName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl std::fmt::Display for PackageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}
