//! `loom lock`: resolve dependencies and write the lockfile.
//!
//! Works from either a standalone project or a workspace root: a workspace
//! gets one unified lockfile at its root. `Loom.local` overrides are applied
//! after resolution unless suppressed.

use anyhow::{Context, Result};
use loom_pkg::overrides::{discover_local_overrides, should_suppress_overrides};
use loom_pkg::resolver::apply_overrides;
use loom_pkg::{
    DependencyResolver, Lockfile, Project, ResolveOptions, SourceCache, Workspace,
    LOCK_FILE,
};
use std::path::Path;
use tracing::info;

pub fn run(cache_root: &Path, offline: bool, update: bool, no_local: bool) -> Result<()> {
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let mut cache = SourceCache::new(cache_root);

    let options = ResolveOptions {
        no_local,
        offline,
        update_all: update,
        update_package: None,
    };

    // A workspace above us wins over a bare project manifest.
    let (lock_dir, mut lockfile) = match Workspace::discover(&cwd) {
        Ok(workspace) => {
            let lock_path = workspace.root_dir().join(LOCK_FILE);
            let existing = Lockfile::load(&lock_path).ok();
            let lockfile = DependencyResolver::new(&mut cache).resolve_workspace(
                &workspace,
                existing.as_ref(),
                &options,
            )?;
            (workspace.root_dir().to_path_buf(), lockfile)
        }
        Err(_) => {
            let project = Project::discover(&cwd)?;
            let lock_path = project.root_dir.join(LOCK_FILE);
            let existing = Lockfile::load(&lock_path).ok();
            let lockfile = DependencyResolver::new(&mut cache).resolve(
                &project.manifest,
                existing.as_ref(),
                &options,
                &project.root_dir,
            )?;
            (project.root_dir, lockfile)
        }
    };

    if !should_suppress_overrides(no_local) {
        let overrides = discover_local_overrides(&lock_dir)?;
        if !overrides.is_empty() {
            overrides.validate()?;
            overrides.warn_active();
            apply_overrides(&mut lockfile, &overrides);
        }
    }

    let lock_path = lock_dir.join(LOCK_FILE);
    lockfile.save(&lock_path)?;
    info!(
        "locked {} package(s) -> {}",
        lockfile.packages.len(),
        lock_path.display()
    );
    Ok(())
}
