//! Loom package manifest (`Loom.toml`) parsing and validation.
//!
//! ```toml
//! [package]
//! name = "uart_ip"
//! version = "1.3.0"
//! top = "uart_top"
//!
//! [dependencies]
//! common_cells = { git = "https://github.com/org/common.git", version = "^0.5" }
//! board_support = { path = "../board" }
//!
//! [[sources]]
//! target = "all(fpga, not(sim))"
//! files = ["rtl/**/*.sv"]
//! include_dirs = ["include"]
//! defines = ["SYNTHESIS"]
//!
//! [targets.sim]
//! tool = "verilator"
//! action = "simulate"
//! ```
//!
//! Dependency declaration order is preserved: the resolver's BFS queue is
//! seeded in the order dependencies appear in this file.

use crate::source::{Dependency, GitSource, PathSource};
use crate::target_expr::TargetExpr;
use loom_core::{Error, ErrorCode, PackageName, Result, Version};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// The manifest filename.
pub const MANIFEST_FILE: &str = "Loom.toml";

/// `[package]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PackageSection {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    /// Top-level design unit name.
    #[serde(default)]
    pub top: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
}

/// `[targets.<name>]` tool configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetConfig {
    pub name: String,
    /// e.g. `"verilator"`, `"vivado-synth"`.
    pub tool: String,
    /// e.g. `"simulate"`, `"synthesize"`, `"lint"`.
    pub action: String,
    /// Flattened key-value options.
    pub options: BTreeMap<String, String>,
}

/// Lint rule severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LintLevel {
    Off,
    Warn,
    Error,
}

impl LintLevel {
    /// Parse a severity string.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error for anything but `off`, `warn`, or `error`.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "off" => Ok(Self::Off),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(Error::new(
                ErrorCode::Config,
                format!("unknown lint level '{s}'"),
            )
            .with_hint("expected one of: off, warn, error")),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// `[lint]` rules and `[lint.naming]` patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LintConfig {
    pub rules: BTreeMap<String, LintLevel>,
    pub naming: BTreeMap<String, String>,
}

/// `[build]` flags with explicit was-set tracking for config layering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildFlags {
    pub pre_lint: bool,
    pub lint_fatal: bool,
    pub pre_lint_set: bool,
    pub lint_fatal_set: bool,
}

/// One `[[sources]]` group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceGroup {
    /// Absent means the group applies to every target.
    pub target: Option<TargetExpr>,
    pub files: Vec<String>,
    pub include_dirs: Vec<String>,
    pub defines: Vec<String>,
}

/// `[workspace]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceSection {
    /// Member glob patterns.
    pub members: Vec<String>,
    /// Exclude glob patterns.
    pub exclude: Vec<String>,
    /// Relative directory paths of default members.
    pub default_members: Vec<String>,
    /// `[workspace.dependencies]` shared dependency table.
    pub dependencies: Vec<Dependency>,
}

/// The complete Loom.toml manifest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub package: PackageSection,
    pub dependencies: Vec<Dependency>,
    pub sources: Vec<SourceGroup>,
    pub targets: BTreeMap<String, TargetConfig>,
    pub lint: LintConfig,
    pub build: BuildFlags,
    pub workspace: Option<WorkspaceSection>,
}

impl Manifest {
    /// Parse a manifest from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `Parse` error for invalid TOML, a `Manifest`/`Dependency`
    /// error for shape violations, and an `InvalidArg`/`Version` error for a
    /// malformed package name or version.
    pub fn parse(content: &str) -> Result<Self> {
        let doc: toml::Table = content.parse().map_err(|e: toml::de::Error| {
            Error::new(ErrorCode::Parse, format!("TOML parse error: {e}"))
        })?;

        let mut manifest = Self::default();

        if let Some(pkg) = doc.get("package") {
            manifest.package = pkg
                .clone()
                .try_into()
                .map_err(|e| Error::new(ErrorCode::Manifest, format!("invalid [package]: {e}")))?;
        }

        if let Some(deps) = doc.get("dependencies") {
            manifest.dependencies = parse_dependencies(expect_table(deps, "dependencies")?)?;
        }

        if let Some(sources) = doc.get("sources").and_then(toml::Value::as_array) {
            for entry in sources {
                manifest
                    .sources
                    .push(parse_source_group(expect_table(entry, "sources")?)?);
            }
        }

        if let Some(targets) = doc.get("targets") {
            manifest.targets = parse_targets_table(expect_table(targets, "targets")?)?;
        }

        if let Some(lint) = doc.get("lint") {
            manifest.lint = parse_lint_table(expect_table(lint, "lint")?)?;
        }

        if let Some(build) = doc.get("build") {
            manifest.build = parse_build_table(expect_table(build, "build")?);
        }

        if let Some(ws) = doc.get("workspace") {
            manifest.workspace = Some(parse_workspace_section(expect_table(ws, "workspace")?)?);
        }

        manifest.validate()?;
        Ok(manifest)
    }

    /// Load a manifest from a file.
    ///
    /// # Errors
    ///
    /// Returns an `Io`/`NotFound` error if the file cannot be read, plus any
    /// parse error.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::new(
                ErrorCode::Io,
                format!("cannot open manifest file: {}: {e}", path.display()),
            )
        })?;
        Self::parse(&content)
    }

    /// Returns true if this manifest has a `[workspace]` section.
    #[must_use]
    pub fn is_workspace(&self) -> bool {
        self.workspace.is_some()
    }

    fn validate(&self) -> Result<()> {
        if !self.package.name.is_empty() {
            PackageName::parse(&self.package.name)?;
            if !self.package.version.is_empty() {
                Version::parse(&self.package.version)?;
            }
        }
        Ok(())
    }
}

fn expect_table<'a>(value: &'a toml::Value, section: &str) -> Result<&'a toml::Table> {
    value.as_table().ok_or_else(|| {
        Error::new(
            ErrorCode::Manifest,
            format!("[{section}] must be a table"),
        )
    })
}

fn string_array(value: &toml::Value) -> Vec<String> {
    value
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(toml::Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_dependency(name: &str, value: &toml::Value) -> Result<Dependency> {
    let tbl = value.as_table().ok_or_else(|| {
        Error::new(
            ErrorCode::Manifest,
            format!("dependency '{name}' must be a table"),
        )
    })?;

    let get_str = |key: &str| {
        tbl.get(key)
            .and_then(toml::Value::as_str)
            .map(ToString::to_string)
    };

    let mut dep = Dependency {
        name: name.to_string(),
        git: None,
        path: None,
        workspace: tbl
            .get("workspace")
            .and_then(toml::Value::as_bool)
            .unwrap_or(false),
        member: tbl
            .get("member")
            .and_then(toml::Value::as_bool)
            .unwrap_or(false),
    };

    if let Some(url) = get_str("git") {
        dep.git = Some(GitSource {
            url,
            tag: get_str("tag"),
            version: get_str("version"),
            rev: get_str("rev"),
            branch: get_str("branch"),
        });
    }

    if let Some(path) = get_str("path") {
        dep.path = Some(PathSource { path });
    }

    dep.validate()?;
    Ok(dep)
}

pub(crate) fn parse_dependencies(tbl: &toml::Table) -> Result<Vec<Dependency>> {
    tbl.iter()
        .map(|(name, value)| parse_dependency(name, value))
        .collect()
}

fn parse_source_group(tbl: &toml::Table) -> Result<SourceGroup> {
    let target = tbl
        .get("target")
        .and_then(toml::Value::as_str)
        .map(TargetExpr::parse)
        .transpose()?;

    Ok(SourceGroup {
        target,
        files: tbl.get("files").map(string_array).unwrap_or_default(),
        include_dirs: tbl
            .get("include_dirs")
            .map(string_array)
            .unwrap_or_default(),
        defines: tbl.get("defines").map(string_array).unwrap_or_default(),
    })
}

/// Flatten one `[targets.<name>]` table; options accept strings, booleans,
/// integers, and string arrays (joined with commas).
fn parse_target_config(name: &str, tbl: &toml::Table) -> TargetConfig {
    let mut tc = TargetConfig {
        name: name.to_string(),
        ..TargetConfig::default()
    };
    if let Some(tool) = tbl.get("tool").and_then(toml::Value::as_str) {
        tc.tool = tool.to_string();
    }
    if let Some(action) = tbl.get("action").and_then(toml::Value::as_str) {
        tc.action = action.to_string();
    }
    if let Some(opts) = tbl.get("options").and_then(toml::Value::as_table) {
        for (key, value) in opts {
            let flat = match value {
                toml::Value::String(s) => s.clone(),
                toml::Value::Boolean(b) => b.to_string(),
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Array(arr) => arr
                    .iter()
                    .filter_map(toml::Value::as_str)
                    .collect::<Vec<_>>()
                    .join(","),
                _ => continue,
            };
            tc.options.insert(key.clone(), flat);
        }
    }
    tc
}

pub(crate) fn parse_targets_table(
    tbl: &toml::Table,
) -> Result<BTreeMap<String, TargetConfig>> {
    let mut targets = BTreeMap::new();
    for (name, value) in tbl {
        let sub = expect_table(value, "targets")?;
        targets.insert(name.clone(), parse_target_config(name, sub));
    }
    Ok(targets)
}

pub(crate) fn parse_lint_table(tbl: &toml::Table) -> Result<LintConfig> {
    let mut lint = LintConfig::default();
    for (key, value) in tbl {
        if key == "naming" {
            if let Some(naming) = value.as_table() {
                for (nk, nv) in naming {
                    if let Some(s) = nv.as_str() {
                        lint.naming.insert(nk.clone(), s.to_string());
                    }
                }
            }
        } else if let Some(s) = value.as_str() {
            lint.rules.insert(key.clone(), LintLevel::parse(s)?);
        }
    }
    Ok(lint)
}

pub(crate) fn parse_build_table(tbl: &toml::Table) -> BuildFlags {
    let mut build = BuildFlags::default();
    if let Some(v) = tbl.get("pre-lint").and_then(toml::Value::as_bool) {
        build.pre_lint = v;
        build.pre_lint_set = true;
    }
    if let Some(v) = tbl.get("lint-fatal").and_then(toml::Value::as_bool) {
        build.lint_fatal = v;
        build.lint_fatal_set = true;
    }
    build
}

fn parse_workspace_section(tbl: &toml::Table) -> Result<WorkspaceSection> {
    let mut ws = WorkspaceSection {
        members: tbl.get("members").map(string_array).unwrap_or_default(),
        exclude: tbl.get("exclude").map(string_array).unwrap_or_default(),
        default_members: tbl
            .get("default-members")
            .map(string_array)
            .unwrap_or_default(),
        dependencies: Vec::new(),
    };
    if let Some(deps) = tbl.get("dependencies") {
        ws.dependencies = parse_dependencies(expect_table(deps, "workspace.dependencies")?)?;
    }
    Ok(ws)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_manifest() {
        let toml = r#"
[package]
name = "uart_ip"
version = "1.3.0"
"#;
        let m = Manifest::parse(toml).unwrap();
        assert_eq!(m.package.name, "uart_ip");
        assert_eq!(m.package.version, "1.3.0");
        assert!(m.dependencies.is_empty());
        assert!(!m.is_workspace());
    }

    #[test]
    fn parse_full_package_section() {
        let toml = r#"
[package]
name = "soc"
version = "0.1.0"
top = "soc_top"
authors = ["Alice <alice@example.com>"]
"#;
        let m = Manifest::parse(toml).unwrap();
        assert_eq!(m.package.top.as_deref(), Some("soc_top"));
        assert_eq!(m.package.authors.len(), 1);
    }

    #[test]
    fn dependencies_preserve_declaration_order() {
        let toml = r#"
[package]
name = "top"
version = "0.1.0"

[dependencies]
zeta = { git = "https://e.com/zeta.git", tag = "v1.0.0" }
alpha = { git = "https://e.com/alpha.git", tag = "v2.0.0" }
"#;
        let m = Manifest::parse(toml).unwrap();
        let names: Vec<_> = m.dependencies.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn git_dependency_forms() {
        let toml = r#"
[package]
name = "top"
version = "0.1.0"

[dependencies]
a = { git = "https://e.com/a.git", tag = "v1.0.0" }
b = { git = "https://e.com/b.git", version = "^1.2" }
c = { git = "https://e.com/c.git", rev = "abc123" }
d = { git = "https://e.com/d.git", branch = "main" }
e = { path = "../e" }
"#;
        let m = Manifest::parse(toml).unwrap();
        assert_eq!(m.dependencies.len(), 5);
        assert!(m.dependencies[4].path.is_some());
    }

    #[test]
    fn invalid_dependency_rejected() {
        let toml = r#"
[package]
name = "top"
version = "0.1.0"

[dependencies]
bad = { git = "https://e.com/x.git", tag = "v1", branch = "main" }
"#;
        let err = Manifest::parse(toml).unwrap_err();
        assert_eq!(err.code, ErrorCode::Dependency);
    }

    #[test]
    fn source_groups_with_targets() {
        let toml = r#"
[package]
name = "top"
version = "0.1.0"

[[sources]]
files = ["rtl/**/*.sv"]
include_dirs = ["include"]

[[sources]]
target = "fpga"
files = ["fpga/*.sv"]
defines = ["SYNTHESIS"]
"#;
        let m = Manifest::parse(toml).unwrap();
        assert_eq!(m.sources.len(), 2);
        assert!(m.sources[0].target.is_none());
        assert_eq!(m.sources[1].defines, vec!["SYNTHESIS"]);
    }

    #[test]
    fn target_configs_flatten_options() {
        let toml = r#"
[package]
name = "top"
version = "0.1.0"

[targets.sim]
tool = "verilator"
action = "simulate"
options = { trace = true, jobs = 4, flags = ["-Wall", "-O2"] }
"#;
        let m = Manifest::parse(toml).unwrap();
        let sim = &m.targets["sim"];
        assert_eq!(sim.tool, "verilator");
        assert_eq!(sim.options["trace"], "true");
        assert_eq!(sim.options["jobs"], "4");
        assert_eq!(sim.options["flags"], "-Wall,-O2");
    }

    #[test]
    fn lint_and_build_sections() {
        let toml = r#"
[package]
name = "top"
version = "0.1.0"

[lint]
implicit-wire = "error"
unused-signal = "off"

[lint.naming]
module = "^[a-z][a-z0-9_]*$"

[build]
pre-lint = true
"#;
        let m = Manifest::parse(toml).unwrap();
        assert_eq!(m.lint.rules["implicit-wire"], LintLevel::Error);
        assert_eq!(m.lint.rules["unused-signal"], LintLevel::Off);
        assert_eq!(m.lint.naming["module"], "^[a-z][a-z0-9_]*$");
        assert!(m.build.pre_lint);
        assert!(m.build.pre_lint_set);
        assert!(!m.build.lint_fatal_set);
    }

    #[test]
    fn unknown_lint_level_rejected() {
        let toml = r#"
[package]
name = "top"
version = "0.1.0"

[lint]
some-rule = "loud"
"#;
        let err = Manifest::parse(toml).unwrap_err();
        assert_eq!(err.code, ErrorCode::Config);
    }

    #[test]
    fn workspace_section() {
        let toml = r#"
[workspace]
members = ["ips/*"]
exclude = ["ips/experimental"]
default-members = ["ips/uart"]

[workspace.dependencies]
common_cells = { git = "https://e.com/common.git", version = "^0.5" }
"#;
        let m = Manifest::parse(toml).unwrap();
        assert!(m.is_workspace());
        let ws = m.workspace.unwrap();
        assert_eq!(ws.members, vec!["ips/*"]);
        assert_eq!(ws.exclude, vec!["ips/experimental"]);
        assert_eq!(ws.default_members, vec!["ips/uart"]);
        assert_eq!(ws.dependencies.len(), 1);
    }

    #[test]
    fn empty_manifest_is_not_workspace() {
        let m = Manifest::parse("").unwrap();
        assert!(!m.is_workspace());
        assert!(m.package.name.is_empty());
    }

    #[test]
    fn invalid_package_name_rejected() {
        let toml = r#"
[package]
name = "9lives"
version = "0.1.0"
"#;
        assert!(Manifest::parse(toml).is_err());
    }

    #[test]
    fn invalid_version_rejected() {
        let toml = r#"
[package]
name = "ok"
version = "not.a.version"
"#;
        assert!(Manifest::parse(toml).is_err());
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = Manifest::parse("[package\nname=").unwrap_err();
        assert_eq!(err.code, ErrorCode::Parse);
    }
}
