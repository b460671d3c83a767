//! The pinned, deterministic record of resolution output (`Loom.lock`).
//!
//! Loading goes through serde; saving is written line-by-line so the output
//! is byte-stable for a given resolved set: version stamp, `[root]`, then
//! `[[packages]]` sorted by name.

use crate::source::Dependency;
use loom_core::{Error, ErrorCode, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;

/// The lockfile filename.
pub const LOCK_FILE: &str = "Loom.lock";

/// One pinned package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedPackage {
    pub name: String,
    pub version: String,
    /// `git+<url>` or `path+<path>`.
    pub source: String,
    /// Full commit SHA; empty for path sources.
    #[serde(default)]
    pub commit: String,
    /// Original tag/branch/rev.
    #[serde(default, rename = "ref")]
    pub reference: String,
    /// Tree checksum of the checkout or path directory.
    #[serde(default)]
    pub checksum: String,
    /// Names of this package's dependencies.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct RootSection {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LockfileDoc {
    #[serde(default)]
    loom_version: String,
    #[serde(default)]
    root: RootSection,
    #[serde(default)]
    packages: Vec<LockedPackage>,
}

/// A parsed lockfile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lockfile {
    /// Resolver version stamp.
    pub loom_version: String,
    pub root_name: String,
    pub root_version: String,
    /// Sorted by name on save.
    pub packages: Vec<LockedPackage>,
}

impl Lockfile {
    /// Parse lockfile contents.
    ///
    /// # Errors
    ///
    /// Returns a `Parse` error for invalid TOML.
    pub fn parse(content: &str) -> Result<Self> {
        let doc: LockfileDoc = toml::from_str(content)
            .map_err(|e| Error::new(ErrorCode::Parse, format!("lockfile parse error: {e}")))?;
        Ok(Self {
            loom_version: doc.loom_version,
            root_name: doc.root.name,
            root_version: doc.root.version,
            packages: doc.packages,
        })
    }

    /// Load a lockfile from disk.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing file, `Io` for unreadable, and
    /// `Parse` for malformed contents.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::new(
                ErrorCode::NotFound,
                format!("no lockfile at {}", path.display()),
            ));
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Render the deterministic on-disk form.
    #[must_use]
    pub fn to_toml_string(&self) -> String {
        let mut out = String::new();
        out.push_str("# This file is auto-generated by Loom. Do not edit.\n");
        let _ = writeln!(out, "loom_version = {}", quote(&self.loom_version));
        out.push_str("\n[root]\n");
        let _ = writeln!(out, "name = {}", quote(&self.root_name));
        let _ = writeln!(out, "version = {}", quote(&self.root_version));

        let mut packages: Vec<&LockedPackage> = self.packages.iter().collect();
        packages.sort_by(|a, b| a.name.cmp(&b.name));

        for pkg in packages {
            out.push_str("\n[[packages]]\n");
            let _ = writeln!(out, "name = {}", quote(&pkg.name));
            let _ = writeln!(out, "version = {}", quote(&pkg.version));
            let _ = writeln!(out, "source = {}", quote(&pkg.source));
            let _ = writeln!(out, "commit = {}", quote(&pkg.commit));
            let _ = writeln!(out, "ref = {}", quote(&pkg.reference));
            let _ = writeln!(out, "checksum = {}", quote(&pkg.checksum));
            let deps: Vec<String> = pkg.dependencies.iter().map(|d| quote(d)).collect();
            let _ = writeln!(out, "dependencies = [{}]", deps.join(", "));
        }

        out
    }

    /// Write the lockfile to disk.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_toml_string()).map_err(|e| {
            Error::new(
                ErrorCode::Io,
                format!("cannot write lockfile {}: {e}", path.display()),
            )
        })
    }

    /// Find a locked package by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&LockedPackage> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// A lockfile is stale iff its (name, source) pairs no longer cover the
    /// manifest's direct dependencies. Ref changes on the same source do not
    /// count; that is what `update` is for. Transitive entries stay valid
    /// as long as some other entry still references them.
    #[must_use]
    pub fn is_stale(&self, manifest_deps: &[Dependency]) -> bool {
        let locked: BTreeSet<(&str, &str)> = self
            .packages
            .iter()
            .map(|p| (p.name.as_str(), p.source.as_str()))
            .collect();

        // Every declared dependency must be locked under the same source.
        for dep in manifest_deps {
            let source = dep.source_id();
            if !locked.contains(&(dep.name.as_str(), source.as_str())) {
                return true;
            }
        }

        // Every locked entry must be declared or referenced transitively;
        // an orphan means a dependency was removed from the manifest.
        let declared: BTreeSet<&str> =
            manifest_deps.iter().map(|d| d.name.as_str()).collect();
        let referenced: BTreeSet<&str> = self
            .packages
            .iter()
            .flat_map(|p| p.dependencies.iter().map(String::as_str))
            .collect();
        self.packages
            .iter()
            .any(|p| !declared.contains(p.name.as_str()) && !referenced.contains(p.name.as_str()))
    }
}

fn quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Dependency;
    use tempfile::TempDir;

    fn locked(name: &str, source: &str) -> LockedPackage {
        LockedPackage {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            source: source.to_string(),
            ..LockedPackage::default()
        }
    }

    #[test]
    fn load_valid_lockfile() {
        let toml = r#"
loom_version = "0.1.0"

[root]
name = "my-soc"
version = "1.0.0"

[[packages]]
name = "uart_ip"
version = "1.3.0"
source = "git+https://github.com/org/uart.git"
commit = "a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4e5f6a1b2"
ref = "v1.3.0"
checksum = "abc123"
dependencies = ["common_cells"]

[[packages]]
name = "common_cells"
version = "0.5.0"
source = "git+https://github.com/org/common.git"
commit = "deadbeefdeadbeefdeadbeefdeadbeefdeadbeef"
ref = "v0.5.0"
checksum = "def456"
"#;
        let lf = Lockfile::parse(toml).unwrap();
        assert_eq!(lf.loom_version, "0.1.0");
        assert_eq!(lf.root_name, "my-soc");
        assert_eq!(lf.packages.len(), 2);
        assert_eq!(lf.packages[0].reference, "v1.3.0");
        assert_eq!(lf.packages[0].dependencies, vec!["common_cells"]);
        assert!(lf.packages[1].dependencies.is_empty());
    }

    #[test]
    fn load_missing_is_not_found() {
        let err = Lockfile::load(Path::new("/nonexistent/Loom.lock")).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[test]
    fn load_version_only() {
        let lf = Lockfile::parse("loom_version = \"0.1.0\"\n").unwrap();
        assert!(lf.packages.is_empty());
        assert_eq!(lf.loom_version, "0.1.0");
    }

    #[test]
    fn save_sorts_and_stamps() {
        let lf = Lockfile {
            loom_version: "0.1.0".into(),
            root_name: "test-project".into(),
            root_version: "2.0.0".into(),
            packages: vec![
                locked("b_pkg", "git+https://example.com/b.git"),
                locked("a_pkg", "git+https://example.com/a.git"),
            ],
        };

        let text = lf.to_toml_string();
        assert!(text.contains("auto-generated"));
        let a = text.find("a_pkg").unwrap();
        let b = text.find("b_pkg").unwrap();
        assert!(a < b);
    }

    #[test]
    fn save_is_byte_deterministic() {
        let lf = Lockfile {
            loom_version: "0.1.0".into(),
            root_name: "r".into(),
            root_version: "1.0.0".into(),
            packages: vec![locked("x", "git+https://e.com/x.git")],
        };
        assert_eq!(lf.to_toml_string(), lf.to_toml_string());
    }

    #[test]
    fn roundtrip_through_disk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(LOCK_FILE);

        let mut pkg = locked("test_ip", "git+https://github.com/org/test.git");
        pkg.version = "3.2.1".into();
        pkg.commit = "1234567890abcdef1234567890abcdef12345678".into();
        pkg.reference = "v3.2.1".into();
        pkg.checksum = "sha256_checksum_here".into();
        pkg.dependencies = vec!["dep_a".into(), "dep_b".into()];

        let lf = Lockfile {
            loom_version: "0.1.0".into(),
            root_name: "roundtrip".into(),
            root_version: "1.0.0".into(),
            packages: vec![pkg.clone()],
        };
        lf.save(&path).unwrap();

        let loaded = Lockfile::load(&path).unwrap();
        assert_eq!(loaded, lf);
        assert_eq!(loaded.packages[0], pkg);
    }

    #[test]
    fn find_hit_and_miss() {
        let lf = Lockfile {
            packages: vec![locked("uart_ip", "git+https://e.com/u.git")],
            ..Lockfile::default()
        };
        assert!(lf.find("uart_ip").is_some());
        assert!(lf.find("nonexistent").is_none());
    }

    #[test]
    fn stale_on_new_dependency() {
        let lf = Lockfile {
            packages: vec![locked("existing", "git+https://example.com/existing.git")],
            ..Lockfile::default()
        };
        let deps = vec![
            Dependency::git_tag("existing", "https://example.com/existing.git", "v1.0.0"),
            Dependency::git_tag("new_dep", "https://example.com/new.git", "v1.0.0"),
        ];
        assert!(lf.is_stale(&deps));
    }

    #[test]
    fn stale_on_removed_dependency() {
        let lf = Lockfile {
            packages: vec![
                locked("kept", "git+https://example.com/kept.git"),
                locked("removed", "git+https://example.com/removed.git"),
            ],
            ..Lockfile::default()
        };
        let deps = vec![Dependency::git_tag(
            "kept",
            "https://example.com/kept.git",
            "v1.0.0",
        )];
        assert!(lf.is_stale(&deps));
    }

    #[test]
    fn stale_on_changed_source() {
        let lf = Lockfile {
            packages: vec![locked("dep", "git+https://old-url.com/dep.git")],
            ..Lockfile::default()
        };
        let deps = vec![Dependency::git_tag(
            "dep",
            "https://new-url.com/dep.git",
            "v1.0.0",
        )];
        assert!(lf.is_stale(&deps));
    }

    #[test]
    fn fresh_when_matching() {
        let lf = Lockfile {
            packages: vec![locked("uart_ip", "git+https://github.com/org/uart.git")],
            ..Lockfile::default()
        };
        let deps = vec![Dependency::git_tag(
            "uart_ip",
            "https://github.com/org/uart.git",
            "v1.0.0",
        )];
        assert!(!lf.is_stale(&deps));
    }

    #[test]
    fn fresh_with_transitive_entries() {
        let mut direct = locked("uart_ip", "git+https://e.com/uart.git");
        direct.dependencies = vec!["common_cells".into()];
        let lf = Lockfile {
            packages: vec![direct, locked("common_cells", "git+https://e.com/common.git")],
            ..Lockfile::default()
        };
        let deps = vec![Dependency::git_tag(
            "uart_ip",
            "https://e.com/uart.git",
            "v1.0.0",
        )];
        assert!(!lf.is_stale(&deps));
    }

    #[test]
    fn ref_change_is_not_stale() {
        let mut pkg = locked("dep", "git+https://e.com/dep.git");
        pkg.reference = "v1.0.0".into();
        let lf = Lockfile {
            packages: vec![pkg],
            ..Lockfile::default()
        };
        let deps = vec![Dependency::git_tag("dep", "https://e.com/dep.git", "v2.0.0")];
        assert!(!lf.is_stale(&deps));
    }

    #[test]
    fn path_dependency_staleness() {
        let lf = Lockfile {
            packages: vec![locked("local_ip", "path+../local")],
            ..Lockfile::default()
        };
        let deps = vec![Dependency::path_dep("local_ip", "../local")];
        assert!(!lf.is_stale(&deps));
    }

    #[test]
    fn empty_lockfile_staleness() {
        let lf = Lockfile::default();
        assert!(!lf.is_stale(&[]));
        let deps = vec![Dependency::git_tag("new", "https://e.com/new.git", "v1.0.0")];
        assert!(lf.is_stale(&deps));
    }
}
