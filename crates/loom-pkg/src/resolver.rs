//! The dependency resolver: manifest in, deterministic lockfile out.
//!
//! Resolution is a BFS closure over declared dependencies. The queue is FIFO
//! and seeded in manifest declaration order, and the first package to resolve
//! under a name wins; BFS order guarantees that is the one closest to the
//! root. A post-pass topological sort turns any cycle in the resolved set
//! into a typed error.

use crate::cache::SourceCache;
use crate::lockfile::{LockedPackage, Lockfile};
use crate::manifest::{Manifest, MANIFEST_FILE};
use crate::overrides::{LocalOverrides, OverrideSource};
use crate::source::Dependency;
use crate::workspace::Workspace;
use loom_core::graph::GraphMap;
use loom_core::{Error, ErrorCode, Result, Version};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Resolution options.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Suppress `Loom.local` overrides.
    pub no_local: bool,
    /// Fail instead of touching the network.
    pub offline: bool,
    /// Ignore the existing lockfile entirely.
    pub update_all: bool,
    /// Force re-resolution of one package, ignoring its lock hint.
    pub update_package: Option<String>,
}

/// One resolved package, before lockfile construction.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPackage {
    pub name: String,
    pub version: String,
    /// Full commit SHA; empty for path packages.
    pub commit: String,
    /// Tag/branch/rev as declared.
    pub reference: String,
    /// Git URL, or the canonical directory for path packages.
    pub source_url: String,
    pub is_path: bool,
    pub checksum: String,
    /// Names of this package's dependencies, in declaration order.
    pub dep_names: Vec<String>,
}

/// The resolver, borrowing the source cache it populates.
pub struct DependencyResolver<'a> {
    cache: &'a mut SourceCache,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(cache: &'a mut SourceCache) -> Self {
        Self { cache }
    }

    /// Resolve a manifest into a lockfile.
    ///
    /// A fresh existing lockfile is returned verbatim unless `update_all`
    /// is set.
    ///
    /// # Errors
    ///
    /// Propagates dependency, network, version, and cycle errors.
    pub fn resolve(
        &mut self,
        manifest: &Manifest,
        existing: Option<&Lockfile>,
        options: &ResolveOptions,
        manifest_dir: &Path,
    ) -> Result<Lockfile> {
        if options.offline {
            self.cache.git_mut().set_offline(true);
        }

        if let Some(lock) = existing {
            if !options.update_all && !lock.is_stale(&manifest.dependencies) {
                debug!("lockfile is up-to-date, reusing");
                return Ok(lock.clone());
            }
        }

        let resolved =
            self.resolve_deps(&manifest.dependencies, existing, options, manifest_dir)?;
        Ok(build_lockfile(manifest, &resolved))
    }

    /// Re-resolve one package, reusing lock hints for everything else.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the package is not in the lockfile, plus any
    /// resolution error.
    pub fn update(
        &mut self,
        manifest: &Manifest,
        existing: &Lockfile,
        package_name: &str,
        options: &ResolveOptions,
        manifest_dir: &Path,
    ) -> Result<Lockfile> {
        if options.offline {
            self.cache.git_mut().set_offline(true);
        }

        if existing.find(package_name).is_none() {
            return Err(Error::new(
                ErrorCode::NotFound,
                format!("package '{package_name}' not found in lockfile"),
            ));
        }

        let mut modified = existing.clone();
        modified.packages.retain(|p| p.name != package_name);

        let options = ResolveOptions {
            update_package: Some(package_name.to_string()),
            ..options.clone()
        };

        let resolved =
            self.resolve_deps(&manifest.dependencies, Some(&modified), &options, manifest_dir)?;
        Ok(build_lockfile(manifest, &resolved))
    }

    /// Resolve all workspace members into one unified lockfile.
    ///
    /// Shared and member references are expanded first; the same name under
    /// two different sources across members is a hard error.
    ///
    /// # Errors
    ///
    /// Propagates expansion, conflict, and resolution errors.
    pub fn resolve_workspace(
        &mut self,
        workspace: &Workspace,
        existing: Option<&Lockfile>,
        options: &ResolveOptions,
    ) -> Result<Lockfile> {
        if options.offline {
            self.cache.git_mut().set_offline(true);
        }

        let mut all_deps: Vec<Dependency> = Vec::new();
        let mut dep_sources: HashMap<String, String> = HashMap::new();

        for member in workspace.members() {
            for dep in &member.manifest.dependencies {
                let resolved_dep = if dep.workspace {
                    workspace.resolve_workspace_dep(&dep.name)?
                } else if dep.member {
                    workspace.resolve_member_dep(&dep.name)?
                } else {
                    dep.clone()
                };

                let source_key = resolved_dep.source_id();
                match dep_sources.get(&resolved_dep.name) {
                    Some(existing_key) if *existing_key != source_key => {
                        return Err(Error::new(
                            ErrorCode::Dependency,
                            format!(
                                "conflicting sources for dependency '{}': '{existing_key}' vs '{source_key}'",
                                resolved_dep.name
                            ),
                        ));
                    }
                    Some(_) => continue,
                    None => {
                        dep_sources.insert(resolved_dep.name.clone(), source_key);
                        all_deps.push(resolved_dep);
                    }
                }
            }
        }

        // Root manifest deps count too when the root is itself a package.
        if !workspace.is_virtual() {
            for dep in &workspace.root_manifest().dependencies {
                if dep_sources.contains_key(&dep.name) {
                    continue;
                }
                dep_sources.insert(dep.name.clone(), dep.source_id());
                all_deps.push(dep.clone());
            }
        }

        let resolved =
            self.resolve_deps(&all_deps, existing, options, workspace.root_dir())?;
        Ok(build_lockfile(workspace.root_manifest(), &resolved))
    }

    /// The BFS closure.
    fn resolve_deps(
        &mut self,
        deps: &[Dependency],
        existing: Option<&Lockfile>,
        options: &ResolveOptions,
        manifest_dir: &Path,
    ) -> Result<HashMap<String, ResolvedPackage>> {
        let mut resolved: HashMap<String, ResolvedPackage> = HashMap::new();

        struct QueueEntry {
            dep: Dependency,
            /// Directory relative path deps of this entry resolve against.
            context_dir: PathBuf,
        }

        let mut queue: VecDeque<QueueEntry> = deps
            .iter()
            .map(|dep| QueueEntry {
                dep: dep.clone(),
                context_dir: manifest_dir.to_path_buf(),
            })
            .collect();

        while let Some(entry) = queue.pop_front() {
            let dep = &entry.dep;

            // First-to-resolve wins: BFS guarantees the entry closest to the
            // root resolved first.
            if resolved.contains_key(&dep.name) {
                continue;
            }

            if dep.workspace || dep.member {
                return Err(Error::new(
                    ErrorCode::Dependency,
                    format!(
                        "unexpected workspace/member dependency '{}' in resolution",
                        dep.name
                    ),
                )
                .with_hint("these must be expanded before resolving"));
            }

            let mut locked = existing.and_then(|lock| lock.find(&dep.name));
            if let Some(target) = &options.update_package {
                if dep.name == *target {
                    locked = None;
                }
            }

            let mut pkg = if let Some(git_source) = &dep.git {
                self.resolve_git(&dep.name, git_source, locked)?
            } else if let Some(path_source) = &dep.path {
                self.resolve_path(&dep.name, path_source, &entry.context_dir)?
            } else {
                return Err(Error::new(
                    ErrorCode::Dependency,
                    format!("dependency '{}' has no source (git or path)", dep.name),
                ));
            };

            let transitive = self.load_transitive_deps(&pkg)?;
            for td in &transitive {
                pkg.dep_names.push(td.name.clone());
            }

            // Path deps of a package resolve relative to where it lives.
            let transitive_dir = if pkg.is_path {
                PathBuf::from(&pkg.source_url)
            } else {
                self.cache
                    .checkout_path(&pkg.name, &pkg.source_url, &pkg.version, &pkg.commit)
            };

            resolved.insert(dep.name.clone(), pkg);

            for td in transitive {
                if !resolved.contains_key(&td.name) {
                    queue.push_back(QueueEntry {
                        dep: td,
                        context_dir: transitive_dir.clone(),
                    });
                }
            }
        }

        // Cyclic transitive declarations terminate the BFS through the dedup
        // map; the cycle itself is caught here.
        let mut graph = GraphMap::new();
        for (name, pkg) in &resolved {
            graph.add_node(name);
            for dep_name in &pkg.dep_names {
                graph.add_edge(name, dep_name);
            }
        }
        graph.topological_sort().map_err(|_| {
            Error::new(
                ErrorCode::Cycle,
                "dependency cycle detected in resolved packages",
            )
        })?;

        Ok(resolved)
    }

    fn resolve_git(
        &mut self,
        name: &str,
        git_source: &crate::source::GitSource,
        locked: Option<&LockedPackage>,
    ) -> Result<ResolvedPackage> {
        // A matching lock hint short-circuits the network entirely.
        if let Some(locked) = locked {
            let expected_source = format!("git+{}", git_source.url);
            if locked.source == expected_source && !locked.commit.is_empty() {
                debug!(
                    "reusing locked {name} @ {}",
                    &locked.commit[..locked.commit.len().min(7)]
                );
                return Ok(ResolvedPackage {
                    name: name.to_string(),
                    version: locked.version.clone(),
                    commit: locked.commit.clone(),
                    reference: locked.reference.clone(),
                    source_url: git_source.url.clone(),
                    is_path: false,
                    checksum: locked.checksum.clone(),
                    dep_names: Vec::new(),
                });
            }
        }

        let bare_path = self.cache.ensure_bare_repo(name, &git_source.url)?;

        let (reference, commit, version_str) = if let Some(tag) = &git_source.tag {
            let commit = self.cache.git().resolve_ref(&bare_path, tag)?;
            let stripped = tag.strip_prefix(['v', 'V']).unwrap_or(tag);
            let version_str = Version::parse(stripped)
                .map_or_else(|_| tag.clone(), |v| v.to_string());
            (tag.clone(), commit, version_str)
        } else if let Some(constraint) = &git_source.version {
            let req = loom_core::VersionReq::parse(constraint)?;
            let ls_output = self.cache.git().ls_remote(&git_source.url)?;
            let tags = crate::git::parse_ls_remote_tags(&ls_output);
            let best = crate::git::resolve_version_from_tags(&tags, &req)?;

            // ls-remote may have given the tag object SHA; canonicalize to
            // the commit through the local mirror.
            let commit = self
                .cache
                .git()
                .resolve_ref(&bare_path, &best.name)
                .unwrap_or_else(|_| best.commit.clone());
            (best.name.clone(), commit, best.version.to_string())
        } else if let Some(rev) = &git_source.rev {
            let commit = self.cache.git().resolve_ref(&bare_path, rev)?;
            let version_str = commit[..commit.len().min(7)].to_string();
            (rev.clone(), commit, version_str)
        } else if let Some(branch) = &git_source.branch {
            let commit = self
                .cache
                .git()
                .resolve_ref(&bare_path, &format!("refs/heads/{branch}"))
                .or_else(|_| self.cache.git().resolve_ref(&bare_path, branch))?;
            let version_str = format!("{branch}-{}", &commit[..commit.len().min(7)]);
            (branch.clone(), commit, version_str)
        } else {
            return Err(Error::new(
                ErrorCode::Dependency,
                format!("git dependency '{name}' must specify tag, version, rev, or branch"),
            ));
        };

        let checkout =
            self.cache
                .ensure_checkout(name, &git_source.url, &version_str, &commit)?;
        let checksum = self.cache.compute_checksum(&checkout)?;

        Ok(ResolvedPackage {
            name: name.to_string(),
            version: version_str,
            commit,
            reference,
            source_url: git_source.url.clone(),
            is_path: false,
            checksum,
            dep_names: Vec::new(),
        })
    }

    fn resolve_path(
        &mut self,
        name: &str,
        path_source: &crate::source::PathSource,
        context_dir: &Path,
    ) -> Result<ResolvedPackage> {
        let raw = Path::new(&path_source.path);
        let joined = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            context_dir.join(raw)
        };

        let canonical = joined.canonicalize().map_err(|_| {
            Error::new(
                ErrorCode::NotFound,
                format!(
                    "path dependency '{name}': directory does not exist: {}",
                    joined.display()
                ),
            )
        })?;

        let manifest_path = canonical.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(Error::new(
                ErrorCode::Manifest,
                format!(
                    "path dependency '{name}': no {MANIFEST_FILE} found in {}",
                    canonical.display()
                ),
            ));
        }

        let manifest = Manifest::load(&manifest_path)?;
        let checksum = self.cache.compute_checksum(&canonical)?;

        Ok(ResolvedPackage {
            name: name.to_string(),
            version: manifest.package.version,
            commit: String::new(),
            reference: String::new(),
            source_url: canonical.to_string_lossy().into_owned(),
            is_path: true,
            checksum,
            dep_names: Vec::new(),
        })
    }

    /// Read the declared dependencies of a resolved package. For git
    /// packages the manifest is read out of the bare mirror; a repo without
    /// a manifest simply has no transitive deps.
    fn load_transitive_deps(&mut self, pkg: &ResolvedPackage) -> Result<Vec<Dependency>> {
        let manifest = if pkg.is_path {
            Manifest::load(&Path::new(&pkg.source_url).join(MANIFEST_FILE))?
        } else {
            let bare = self.cache.bare_repo_path(&pkg.name, &pkg.source_url);
            match self.cache.git().show_file(&bare, &pkg.commit, MANIFEST_FILE) {
                Ok(content) => Manifest::parse(&content)?,
                Err(e) if e.is(ErrorCode::NotFound) || e.is(ErrorCode::Io) => {
                    return Ok(Vec::new());
                }
                Err(e) => return Err(e),
            }
        };

        // Workspace/member references are only valid at the workspace root.
        let mut result = Vec::new();
        for dep in manifest.dependencies {
            if dep.workspace || dep.member {
                warn!(
                    "ignoring workspace/member dependency '{}' in transitive dependency '{}'",
                    dep.name, pkg.name
                );
                continue;
            }
            result.push(dep);
        }
        Ok(result)
    }
}

/// Apply local overrides onto a lockfile in place. Missing targets warn and
/// continue; applying the same map twice is idempotent.
pub fn apply_overrides(lockfile: &mut Lockfile, overrides: &LocalOverrides) {
    for (name, src) in &overrides.overrides {
        let Some(target) = lockfile.packages.iter_mut().find(|p| p.name == *name) else {
            warn!("local override for '{name}' has no matching locked package, skipping");
            continue;
        };

        match src {
            OverrideSource::Path { path } => {
                target.source = format!("path+{path}");
                target.commit.clear();
                target.reference.clear();
                debug!("override: {name} -> path '{path}'");
            }
            OverrideSource::Git { url, .. } => {
                target.source = format!("git+{url}");
                if let Some(r) = src.git_ref() {
                    target.reference = r.to_string();
                }
                debug!("override: {name} -> git '{url}'");
            }
        }
    }
}

/// Topological order of a lockfile's package graph.
///
/// # Errors
///
/// Returns a `Cycle` error if the recorded dependencies form a cycle.
pub fn topological_sort(lockfile: &Lockfile) -> Result<Vec<String>> {
    let mut graph = GraphMap::new();
    for pkg in &lockfile.packages {
        graph.add_node(&pkg.name);
        for dep in &pkg.dependencies {
            graph.add_edge(&pkg.name, dep);
        }
    }
    graph.topological_sort()
}

fn build_lockfile(
    root_manifest: &Manifest,
    resolved: &HashMap<String, ResolvedPackage>,
) -> Lockfile {
    let mut packages: Vec<LockedPackage> = resolved
        .values()
        .map(|pkg| LockedPackage {
            name: pkg.name.clone(),
            version: pkg.version.clone(),
            source: if pkg.is_path {
                format!("path+{}", pkg.source_url)
            } else {
                format!("git+{}", pkg.source_url)
            },
            commit: pkg.commit.clone(),
            reference: pkg.reference.clone(),
            checksum: pkg.checksum.clone(),
            dependencies: pkg.dep_names.clone(),
        })
        .collect();

    packages.sort_by(|a, b| a.name.cmp(&b.name));

    Lockfile {
        loom_version: loom_core::VERSION.to_string(),
        root_name: root_manifest.package.name.clone(),
        root_version: root_manifest.package.version.clone(),
        packages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockfile::LockedPackage;

    fn locked(name: &str, source: &str, deps: &[&str]) -> LockedPackage {
        LockedPackage {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            source: source.to_string(),
            commit: "a".repeat(40),
            reference: "v1.0.0".to_string(),
            checksum: "c".repeat(64),
            dependencies: deps.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn apply_path_override_clears_commit_and_ref() {
        let mut lf = Lockfile {
            packages: vec![locked("uart", "git+https://e.com/uart.git", &[])],
            ..Lockfile::default()
        };
        let overrides = LocalOverrides::parse(
            "[overrides]\nuart = { path = \"../uart\" }\n",
        )
        .unwrap();

        apply_overrides(&mut lf, &overrides);
        let pkg = lf.find("uart").unwrap();
        assert_eq!(pkg.source, "path+../uart");
        assert!(pkg.commit.is_empty());
        assert!(pkg.reference.is_empty());
    }

    #[test]
    fn apply_git_override_sets_ref_by_preference() {
        let mut lf = Lockfile {
            packages: vec![locked("uart", "git+https://e.com/uart.git", &[])],
            ..Lockfile::default()
        };
        let overrides = LocalOverrides::parse(
            "[overrides]\nuart = { git = \"https://me.com/uart.git\", tag = \"v9.9.9\" }\n",
        )
        .unwrap();

        apply_overrides(&mut lf, &overrides);
        let pkg = lf.find("uart").unwrap();
        assert_eq!(pkg.source, "git+https://me.com/uart.git");
        assert_eq!(pkg.reference, "v9.9.9");
    }

    #[test]
    fn apply_override_missing_target_is_skipped() {
        let mut lf = Lockfile {
            packages: vec![locked("kept", "git+https://e.com/kept.git", &[])],
            ..Lockfile::default()
        };
        let before = lf.clone();
        let overrides =
            LocalOverrides::parse("[overrides]\nghost = { path = \"../ghost\" }\n").unwrap();

        apply_overrides(&mut lf, &overrides);
        assert_eq!(lf, before);
    }

    #[test]
    fn apply_overrides_is_idempotent() {
        let mut lf = Lockfile {
            packages: vec![locked("uart", "git+https://e.com/uart.git", &[])],
            ..Lockfile::default()
        };
        let overrides = LocalOverrides::parse(
            "[overrides]\nuart = { git = \"https://me.com/u.git\", branch = \"dev\" }\n",
        )
        .unwrap();

        apply_overrides(&mut lf, &overrides);
        let once = lf.clone();
        apply_overrides(&mut lf, &overrides);
        assert_eq!(lf, once);
    }

    #[test]
    fn topological_sort_orders_dependents_first() {
        let lf = Lockfile {
            packages: vec![
                locked("lib_c", "git+https://e.com/c.git", &[]),
                locked("lib_a", "git+https://e.com/a.git", &["lib_c"]),
                locked("lib_b", "git+https://e.com/b.git", &["lib_c"]),
            ],
            ..Lockfile::default()
        };

        let order = topological_sort(&lf).unwrap();
        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert!(pos("lib_a") < pos("lib_c"));
        assert!(pos("lib_b") < pos("lib_c"));
    }

    #[test]
    fn topological_sort_reports_cycles() {
        let lf = Lockfile {
            packages: vec![
                locked("a", "git+https://e.com/a.git", &["b"]),
                locked("b", "git+https://e.com/b.git", &["a"]),
            ],
            ..Lockfile::default()
        };
        let err = topological_sort(&lf).unwrap_err();
        assert_eq!(err.code, ErrorCode::Cycle);
    }

    #[test]
    fn build_lockfile_sorts_by_name() {
        let mut resolved = HashMap::new();
        for name in ["zeta", "alpha", "mid"] {
            resolved.insert(
                name.to_string(),
                ResolvedPackage {
                    name: name.to_string(),
                    version: "1.0.0".into(),
                    source_url: format!("https://e.com/{name}.git"),
                    ..ResolvedPackage::default()
                },
            );
        }
        let manifest = Manifest::parse(
            "[package]\nname = \"root\"\nversion = \"1.0.0\"\n",
        )
        .unwrap();

        let lf = build_lockfile(&manifest, &resolved);
        let names: Vec<_> = lf.packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
        assert_eq!(lf.root_name, "root");
        assert_eq!(lf.loom_version, loom_core::VERSION);
    }
}
