//! `loom tree`: print the dependency tree recorded in the lockfile.

use anyhow::{Context, Result};
use loom_core::graph::GraphMap;
use loom_pkg::{Lockfile, Project, LOCK_FILE};

pub fn run() -> Result<()> {
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let project = Project::discover(&cwd)?;

    let lock_path = project.root_dir.join(LOCK_FILE);
    let lockfile = Lockfile::load(&lock_path)
        .context("no lockfile found; run `loom lock` first")?;

    let root = if lockfile.root_name.is_empty() {
        project.manifest.package.name.clone()
    } else {
        lockfile.root_name.clone()
    };

    let mut graph = GraphMap::new();
    graph.add_node(&root);
    for pkg in &lockfile.packages {
        graph.add_node(&pkg.name);
        for dep in &pkg.dependencies {
            graph.add_edge(&pkg.name, dep);
        }
    }
    // Root edges come from the manifest's direct dependencies.
    for dep in &project.manifest.dependencies {
        graph.add_edge(&root, &dep.name);
    }

    print!("{}", graph.tree_display(&root));
    Ok(())
}
