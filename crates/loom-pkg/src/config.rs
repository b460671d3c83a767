//! Layered configuration: global file, workspace manifest, member manifest.
//!
//! The effective configuration folds the layers in that order. Lint rules
//! replace per key, build flags override only fields a layer explicitly set,
//! and target configurations replace per target name.

use crate::manifest::{
    parse_build_table, parse_lint_table, parse_targets_table, BuildFlags, LintConfig,
    TargetConfig,
};
use loom_core::{Error, ErrorCode, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One configuration layer: `[lint]`, `[build]`, `[targets.<name>]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub lint: LintConfig,
    pub build: BuildFlags,
    pub targets: BTreeMap<String, TargetConfig>,
}

impl Config {
    /// Parse a configuration document.
    ///
    /// # Errors
    ///
    /// Returns a `Parse` error for invalid TOML and a `Config` error for
    /// invalid lint levels.
    pub fn parse(content: &str) -> Result<Self> {
        let doc: toml::Table = content.parse().map_err(|e: toml::de::Error| {
            Error::new(ErrorCode::Parse, format!("config TOML parse error: {e}"))
        })?;

        let mut cfg = Self::default();
        if let Some(lint) = doc.get("lint").and_then(toml::Value::as_table) {
            cfg.lint = parse_lint_table(lint)?;
        }
        if let Some(build) = doc.get("build").and_then(toml::Value::as_table) {
            cfg.build = parse_build_table(build);
        }
        if let Some(targets) = doc.get("targets").and_then(toml::Value::as_table) {
            cfg.targets = parse_targets_table(targets)?;
        }
        Ok(cfg)
    }

    /// Load a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error if the file cannot be read, plus parse errors.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::new(
                ErrorCode::Io,
                format!("cannot open config file: {}: {e}", path.display()),
            )
        })?;
        Self::parse(&content)
    }

    /// Merge another layer over this one.
    pub fn merge(&mut self, other: &Self) {
        for (k, v) in &other.lint.rules {
            self.lint.rules.insert(k.clone(), *v);
        }
        for (k, v) in &other.lint.naming {
            self.lint.naming.insert(k.clone(), v.clone());
        }

        if other.build.pre_lint_set {
            self.build.pre_lint = other.build.pre_lint;
            self.build.pre_lint_set = true;
        }
        if other.build.lint_fatal_set {
            self.build.lint_fatal = other.build.lint_fatal;
            self.build.lint_fatal_set = true;
        }

        for (k, v) in &other.targets {
            self.targets.insert(k.clone(), v.clone());
        }
    }

    /// Fold global, workspace, and member layers into one configuration.
    #[must_use]
    pub fn effective(
        global: Option<&Self>,
        workspace: Option<&Self>,
        member: Option<&Self>,
    ) -> Self {
        let mut result = Self::default();
        for layer in [global, workspace, member].into_iter().flatten() {
            result.merge(layer);
        }
        result
    }
}

/// Path of the global config file, from `HOME` (or `USERPROFILE`).
/// Returns `None` when neither variable is set.
#[must_use]
pub fn global_config_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"))?;
    Some(PathBuf::from(home).join(".loom").join("config.toml"))
}
