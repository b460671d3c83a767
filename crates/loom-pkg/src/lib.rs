//! Package management for Loom hardware projects.
//!
//! This crate provides:
//! - Parsing and validation of `Loom.toml` manifests
//! - Target expressions and source-group filtering
//! - Layered configuration (global, workspace, member)
//! - Local developer overrides (`Loom.local`)
//! - Deterministic lockfiles (`Loom.lock`)
//! - Workspace discovery and validation
//! - A git driver and the two-tier source cache
//! - The dependency resolver

pub mod cache;
pub mod config;
pub mod git;
pub mod lockfile;
pub mod manifest;
pub mod overrides;
pub mod project;
pub mod resolver;
pub mod source;
pub mod target_expr;
pub mod workspace;

pub use cache::SourceCache;
pub use config::Config;
pub use git::{CommandResult, GitCli, RemoteTag};
pub use lockfile::{LockedPackage, Lockfile, LOCK_FILE};
pub use manifest::{
    BuildFlags, LintConfig, LintLevel, Manifest, PackageSection, SourceGroup,
    TargetConfig, MANIFEST_FILE,
};
pub use overrides::{LocalOverrides, OverrideSource, LOCAL_FILE};
pub use project::Project;
pub use resolver::{DependencyResolver, ResolveOptions, ResolvedPackage};
pub use source::{Dependency, GitSource, PathSource};
pub use target_expr::{TargetExpr, TargetSet};
pub use workspace::{Workspace, WorkspaceMember};
