//! The closed error taxonomy shared by every Loom crate.
//!
//! Each failure mode maps to exactly one [`ErrorCode`]. Errors carry a
//! primary message, an optional hint, and an optional source location, and
//! render as:
//!
//! ```text
//! error[Version]: no tag matches version requirement '^2.0.0'
//!   hint: run `loom update` to refresh available tags
//!   --> Loom.toml:12
//! ```

use serde::{Deserialize, Serialize};

/// Convenience alias used across all Loom crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Machine-readable failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Filesystem or pipe failure, cache-store exec error, corrupted blob.
    Io,
    /// Malformed TOML, cache blob, target expression, or override document.
    Parse,
    /// Malformed version/requirement string, or no tag satisfies one.
    Version,
    /// Invalid dependency shape, conflicting sources, unexpanded refs.
    Dependency,
    /// Malformed configuration document.
    Config,
    /// Missing or invalid manifest, workspace shape violations.
    Manifest,
    /// Wrong parse-cache magic bytes on read.
    Checksum,
    /// Failed git operation, or any network op attempted offline.
    Network,
    /// Missing manifest, cache entry, member, or package.
    NotFound,
    /// Two workspace members share a name.
    Duplicate,
    /// Cycle detected in a dependency graph.
    Cycle,
    /// Empty or malformed argument at a public entry point.
    InvalidArg,
}

impl ErrorCode {
    /// Stable name used in rendered output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Io => "Io",
            Self::Parse => "Parse",
            Self::Version => "Version",
            Self::Dependency => "Dependency",
            Self::Config => "Config",
            Self::Manifest => "Manifest",
            Self::Checksum => "Checksum",
            Self::Network => "Network",
            Self::NotFound => "NotFound",
            Self::Duplicate => "Duplicate",
            Self::Cycle => "Cycle",
            Self::InvalidArg => "InvalidArg",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Loom error: code, message, optional hint, optional source location.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", render(.code, .message, .hint, .location))]
pub struct Error {
    /// Failure class.
    pub code: ErrorCode,
    /// Primary human-readable message.
    pub message: String,
    /// Optional remediation hint.
    pub hint: Option<String>,
    /// Optional (file, line) the error refers to.
    pub location: Option<(String, u32)>,
}

fn render(
    code: &ErrorCode,
    message: &str,
    hint: &Option<String>,
    location: &Option<(String, u32)>,
) -> String {
    let mut out = format!("error[{code}]: {message}");
    if let Some(hint) = hint {
        if !hint.is_empty() {
            out.push_str("\n  hint: ");
            out.push_str(hint);
        }
    }
    if let Some((file, line)) = location {
        if !file.is_empty() {
            out.push_str("\n  --> ");
            out.push_str(file);
            out.push(':');
            out.push_str(&line.to_string());
        }
    }
    out
}

impl Error {
    /// Create an error with just a code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            hint: None,
            location: None,
        }
    }

    /// Attach a remediation hint.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a source location.
    #[must_use]
    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.location = Some((file.into(), line));
        self
    }

    /// Returns true if this error carries the given code.
    #[must_use]
    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        let code = if e.kind() == std::io::ErrorKind::NotFound {
            ErrorCode::NotFound
        } else {
            ErrorCode::Io
        };
        Self::new(code, e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::new(ErrorCode::Parse, format!("TOML parse error: {e}"))
    }
}
