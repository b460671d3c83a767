//! `loom update <package>`: selective re-resolution of one dependency.

use anyhow::{Context, Result};
use loom_pkg::overrides::{discover_local_overrides, should_suppress_overrides};
use loom_pkg::resolver::apply_overrides;
use loom_pkg::{
    DependencyResolver, Lockfile, Project, ResolveOptions, SourceCache, LOCK_FILE,
};
use std::path::Path;
use tracing::info;

pub fn run(cache_root: &Path, package: &str, offline: bool, no_local: bool) -> Result<()> {
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let project = Project::discover(&cwd)?;

    let lock_path = project.root_dir.join(LOCK_FILE);
    let existing = Lockfile::load(&lock_path)
        .context("`loom update` needs an existing lockfile; run `loom lock` first")?;

    let options = ResolveOptions {
        no_local,
        offline,
        update_all: false,
        update_package: Some(package.to_string()),
    };

    let mut cache = SourceCache::new(cache_root);
    let mut lockfile = DependencyResolver::new(&mut cache).update(
        &project.manifest,
        &existing,
        package,
        &options,
        &project.root_dir,
    )?;

    if !should_suppress_overrides(no_local) {
        let overrides = discover_local_overrides(&project.root_dir)?;
        if !overrides.is_empty() {
            overrides.validate()?;
            overrides.warn_active();
            apply_overrides(&mut lockfile, &overrides);
        }
    }

    lockfile.save(&lock_path)?;

    match lockfile.find(package) {
        Some(pkg) => info!("updated {package} -> {}", pkg.version),
        None => info!("updated {package}"),
    }
    Ok(())
}
