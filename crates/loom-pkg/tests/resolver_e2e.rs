//! End-to-end resolver scenarios against real local git repositories.
//!
//! Each test builds bare-usable repos in a temp dir, resolves against a
//! private cache root, and inspects the produced lockfile.

use loom_pkg::resolver::{apply_overrides, topological_sort};
use loom_pkg::{
    DependencyResolver, GitCli, LocalOverrides, Lockfile, Manifest, ResolveOptions,
    SourceCache,
};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn git_available() -> bool {
    GitCli::new().check_version().is_ok()
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args([
            "-c",
            "user.name=Loom Test",
            "-c",
            "user.email=test@loom.invalid",
        ])
        .args(args)
        .status()
        .expect("failed to run git");
    assert!(status.success(), "git {args:?} failed in {}", dir.display());
}

/// Create a repo with a manifest, one source file, and the given tags.
fn make_repo(base: &Path, name: &str, manifest: &str, tags: &[&str]) -> String {
    let dir = base.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("Loom.toml"), manifest).unwrap();
    std::fs::write(
        dir.join(format!("{name}.sv")),
        format!("module {name}; endmodule\n"),
    )
    .unwrap();

    git(&dir, &["init", "--quiet", "--initial-branch=main"]);
    git(&dir, &["add", "."]);
    git(&dir, &["commit", "--quiet", "-m", "initial"]);
    for tag in tags {
        git(&dir, &["tag", tag]);
    }

    dir.to_string_lossy().into_owned()
}

fn simple_manifest(name: &str) -> String {
    format!("[package]\nname = \"{name}\"\nversion = \"1.0.0\"\n")
}

struct Env {
    repos_dir: TempDir,
    // Held for its lifetime; the cache root lives inside it.
    #[allow(dead_code)]
    cache_root: TempDir,
    project: TempDir,
    cache: SourceCache,
}

impl Env {
    fn new() -> Self {
        let repos_dir = TempDir::new().unwrap();
        let cache_root = TempDir::new().unwrap();
        let cache = SourceCache::new(cache_root.path());
        Self {
            repos_dir,
            cache_root,
            project: TempDir::new().unwrap(),
            cache,
        }
    }

    fn repos(&self) -> &Path {
        self.repos_dir.path()
    }

    fn resolve(&mut self, manifest: &Manifest, existing: Option<&Lockfile>) -> Lockfile {
        let project_dir = self.project.path().to_path_buf();
        DependencyResolver::new(&mut self.cache)
            .resolve(manifest, existing, &ResolveOptions::default(), &project_dir)
            .unwrap()
    }
}

#[test]
fn single_git_dep_with_tag() {
    if !git_available() {
        return;
    }
    let mut env = Env::new();
    let url = make_repo(env.repos(), "lib_a", &simple_manifest("lib_a"), &["v1.0.0"]);

    let manifest = Manifest::parse(&format!(
        "[package]\nname = \"top\"\nversion = \"1.0.0\"\n\n[dependencies]\nlib_a = {{ git = \"{url}\", tag = \"v1.0.0\" }}\n"
    ))
    .unwrap();

    let lock = env.resolve(&manifest, None);
    assert_eq!(lock.packages.len(), 1);

    let pkg = &lock.packages[0];
    assert_eq!(pkg.name, "lib_a");
    assert_eq!(pkg.source, format!("git+{url}"));
    assert_eq!(pkg.reference, "v1.0.0");
    assert_eq!(pkg.version, "1.0.0");
    assert_eq!(pkg.commit.len(), 40);
    assert_eq!(pkg.checksum.len(), 64);
    assert!(pkg.dependencies.is_empty());
}

#[test]
fn semver_selects_highest_matching_tag() {
    if !git_available() {
        return;
    }
    let mut env = Env::new();
    let url = make_repo(
        env.repos(),
        "lib_a",
        &simple_manifest("lib_a"),
        &["v1.0.0", "v1.1.0", "v1.2.0", "v2.0.0"],
    );

    let manifest = Manifest::parse(&format!(
        "[package]\nname = \"top\"\nversion = \"1.0.0\"\n\n[dependencies]\nlib_a = {{ git = \"{url}\", version = \"^1.0.0\" }}\n"
    ))
    .unwrap();

    let lock = env.resolve(&manifest, None);
    let pkg = lock.find("lib_a").unwrap();
    assert_eq!(pkg.version, "1.2.0");
    assert_eq!(pkg.reference, "v1.2.0");
}

#[test]
fn diamond_transitive_resolves_once() {
    if !git_available() {
        return;
    }
    let mut env = Env::new();
    let c_url = make_repo(env.repos(), "lib_c", &simple_manifest("lib_c"), &["v1.0.0"]);

    let dep_on_c = |name: &str| {
        format!(
            "[package]\nname = \"{name}\"\nversion = \"1.0.0\"\n\n[dependencies]\nlib_c = {{ git = \"{c_url}\", tag = \"v1.0.0\" }}\n"
        )
    };
    let a_url = make_repo(env.repos(), "lib_a", &dep_on_c("lib_a"), &["v1.0.0"]);
    let b_url = make_repo(env.repos(), "lib_b", &dep_on_c("lib_b"), &["v1.0.0"]);

    let manifest = Manifest::parse(&format!(
        "[package]\nname = \"top\"\nversion = \"1.0.0\"\n\n[dependencies]\nlib_a = {{ git = \"{a_url}\", tag = \"v1.0.0\" }}\nlib_b = {{ git = \"{b_url}\", tag = \"v1.0.0\" }}\n"
    ))
    .unwrap();

    let lock = env.resolve(&manifest, None);
    let mut names: Vec<_> = lock.packages.iter().map(|p| p.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["lib_a", "lib_b", "lib_c"]);

    assert_eq!(lock.find("lib_a").unwrap().dependencies, vec!["lib_c"]);
    assert_eq!(lock.find("lib_b").unwrap().dependencies, vec!["lib_c"]);

    // Direct deps order before the shared transitive.
    let order = topological_sort(&lock).unwrap();
    let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
    assert!(pos("lib_a") < pos("lib_c"));
    assert!(pos("lib_b") < pos("lib_c"));
}

#[test]
fn fresh_lockfile_is_returned_verbatim() {
    if !git_available() {
        return;
    }
    let mut env = Env::new();
    let url = make_repo(env.repos(), "lib_a", &simple_manifest("lib_a"), &["v1.0.0"]);

    let manifest = Manifest::parse(&format!(
        "[package]\nname = \"top\"\nversion = \"1.0.0\"\n\n[dependencies]\nlib_a = {{ git = \"{url}\", tag = \"v1.0.0\" }}\n"
    ))
    .unwrap();

    let first = env.resolve(&manifest, None);
    let second = env.resolve(&manifest, Some(&first));
    assert_eq!(first.to_toml_string(), second.to_toml_string());
}

#[test]
fn stale_lockfile_triggers_re_resolution() {
    if !git_available() {
        return;
    }
    let mut env = Env::new();
    let a_url = make_repo(env.repos(), "lib_a", &simple_manifest("lib_a"), &["v1.0.0"]);
    let b_url = make_repo(env.repos(), "lib_b", &simple_manifest("lib_b"), &["v1.0.0"]);

    let manifest_one = Manifest::parse(&format!(
        "[package]\nname = \"top\"\nversion = \"1.0.0\"\n\n[dependencies]\nlib_a = {{ git = \"{a_url}\", tag = \"v1.0.0\" }}\n"
    ))
    .unwrap();
    let lock_one = env.resolve(&manifest_one, None);
    assert_eq!(lock_one.packages.len(), 1);

    let manifest_two = Manifest::parse(&format!(
        "[package]\nname = \"top\"\nversion = \"1.0.0\"\n\n[dependencies]\nlib_a = {{ git = \"{a_url}\", tag = \"v1.0.0\" }}\nlib_b = {{ git = \"{b_url}\", tag = \"v1.0.0\" }}\n"
    ))
    .unwrap();

    let lock_two = env.resolve(&manifest_two, Some(&lock_one));
    assert_eq!(lock_two.packages.len(), 2);
    assert!(lock_two.find("lib_a").is_some());
    assert!(lock_two.find("lib_b").is_some());
}

#[test]
fn update_re_resolves_one_package() {
    if !git_available() {
        return;
    }
    let mut env = Env::new();
    let url = make_repo(env.repos(), "lib_a", &simple_manifest("lib_a"), &["v1.0.0"]);

    let manifest = Manifest::parse(&format!(
        "[package]\nname = \"top\"\nversion = \"1.0.0\"\n\n[dependencies]\nlib_a = {{ git = \"{url}\", version = \"^1.0.0\" }}\n"
    ))
    .unwrap();

    let lock = env.resolve(&manifest, None);
    assert_eq!(lock.find("lib_a").unwrap().version, "1.0.0");

    // Publish a newer tag, then update just lib_a.
    git(Path::new(&url), &["tag", "v1.1.0"]);

    let project_dir = env.project.path().to_path_buf();
    let updated = DependencyResolver::new(&mut env.cache)
        .update(&manifest, &lock, "lib_a", &ResolveOptions::default(), &project_dir)
        .unwrap();
    assert_eq!(updated.find("lib_a").unwrap().version, "1.1.0");

    // Unknown packages are a typed error.
    let err = DependencyResolver::new(&mut env.cache)
        .update(&manifest, &lock, "ghost", &ResolveOptions::default(), &project_dir)
        .unwrap_err();
    assert_eq!(err.code, loom_core::ErrorCode::NotFound);
}

#[test]
fn path_dependency_resolves_relative_to_manifest() {
    let mut env = Env::new();
    let dep_dir = env.project.path().join("local_ip");
    std::fs::create_dir_all(&dep_dir).unwrap();
    std::fs::write(dep_dir.join("Loom.toml"), simple_manifest("local_ip")).unwrap();
    std::fs::write(dep_dir.join("ip.sv"), "module local_ip; endmodule\n").unwrap();

    let manifest = Manifest::parse(
        "[package]\nname = \"top\"\nversion = \"1.0.0\"\n\n[dependencies]\nlocal_ip = { path = \"local_ip\" }\n",
    )
    .unwrap();

    let lock = env.resolve(&manifest, None);
    let pkg = lock.find("local_ip").unwrap();
    assert!(pkg.source.starts_with("path+"));
    assert!(pkg.commit.is_empty());
    assert_eq!(pkg.version, "1.0.0");
    assert_eq!(pkg.checksum.len(), 64);
}

#[test]
fn missing_path_dependency_is_not_found() {
    let mut env = Env::new();
    let manifest = Manifest::parse(
        "[package]\nname = \"top\"\nversion = \"1.0.0\"\n\n[dependencies]\nghost = { path = \"no/such/dir\" }\n",
    )
    .unwrap();

    let project_dir = env.project.path().to_path_buf();
    let err = DependencyResolver::new(&mut env.cache)
        .resolve(&manifest, None, &ResolveOptions::default(), &project_dir)
        .unwrap_err();
    assert_eq!(err.code, loom_core::ErrorCode::NotFound);
}

#[test]
fn empty_dependency_list_gives_empty_lockfile() {
    let mut env = Env::new();
    let manifest = Manifest::parse("[package]\nname = \"top\"\nversion = \"1.0.0\"\n").unwrap();
    let lock = env.resolve(&manifest, None);
    assert!(lock.packages.is_empty());
    assert_eq!(lock.root_name, "top");
}

#[test]
fn offline_mode_fails_without_mirror() {
    let mut env = Env::new();
    let manifest = Manifest::parse(
        "[package]\nname = \"top\"\nversion = \"1.0.0\"\n\n[dependencies]\nlib = { git = \"https://unreachable.invalid/lib.git\", tag = \"v1.0.0\" }\n",
    )
    .unwrap();

    let options = ResolveOptions {
        offline: true,
        ..ResolveOptions::default()
    };
    let project_dir = env.project.path().to_path_buf();
    let err = DependencyResolver::new(&mut env.cache)
        .resolve(&manifest, None, &options, &project_dir)
        .unwrap_err();
    assert_eq!(err.code, loom_core::ErrorCode::Network);
}

#[test]
fn lock_hint_avoids_network_in_offline_mode() {
    if !git_available() {
        return;
    }
    let mut env = Env::new();
    let url = make_repo(env.repos(), "lib_a", &simple_manifest("lib_a"), &["v1.0.0"]);

    let manifest = Manifest::parse(&format!(
        "[package]\nname = \"top\"\nversion = \"1.0.0\"\n\n[dependencies]\nlib_a = {{ git = \"{url}\", tag = \"v1.0.0\" }}\n"
    ))
    .unwrap();

    let lock = env.resolve(&manifest, None);

    // Force full re-resolution offline: hints carry commit, version, and
    // checksum, so no git invocation is needed.
    let options = ResolveOptions {
        offline: true,
        update_all: true,
        ..ResolveOptions::default()
    };
    let project_dir = env.project.path().to_path_buf();
    let again = DependencyResolver::new(&mut env.cache)
        .resolve(&manifest, Some(&lock), &options, &project_dir)
        .unwrap();
    assert_eq!(again.find("lib_a").unwrap().commit, lock.find("lib_a").unwrap().commit);
}

#[test]
fn overrides_rewrite_lockfile_entries() {
    if !git_available() {
        return;
    }
    let mut env = Env::new();
    let url = make_repo(env.repos(), "lib_a", &simple_manifest("lib_a"), &["v1.0.0"]);

    let manifest = Manifest::parse(&format!(
        "[package]\nname = \"top\"\nversion = \"1.0.0\"\n\n[dependencies]\nlib_a = {{ git = \"{url}\", tag = \"v1.0.0\" }}\n"
    ))
    .unwrap();

    let mut lock = env.resolve(&manifest, None);
    let overrides =
        LocalOverrides::parse("[overrides]\nlib_a = { path = \"../dev/lib_a\" }\n").unwrap();

    apply_overrides(&mut lock, &overrides);
    let pkg = lock.find("lib_a").unwrap();
    assert_eq!(pkg.source, "path+../dev/lib_a");
    assert!(pkg.commit.is_empty());

    // Idempotent.
    let once = lock.clone();
    apply_overrides(&mut lock, &overrides);
    assert_eq!(lock, once);
}

#[test]
fn branch_and_rev_dependencies() {
    if !git_available() {
        return;
    }
    let mut env = Env::new();
    let url = make_repo(env.repos(), "lib_a", &simple_manifest("lib_a"), &[]);

    // Branch resolution: version becomes <branch>-<sha7>.
    let manifest = Manifest::parse(&format!(
        "[package]\nname = \"top\"\nversion = \"1.0.0\"\n\n[dependencies]\nlib_a = {{ git = \"{url}\", branch = \"main\" }}\n"
    ))
    .unwrap();
    let lock = env.resolve(&manifest, None);
    let pkg = lock.find("lib_a").unwrap();
    assert!(pkg.version.starts_with("main-"));
    assert_eq!(pkg.commit.len(), 40);

    // Rev resolution: version is the short SHA.
    let rev = pkg.commit.clone();
    let manifest = Manifest::parse(&format!(
        "[package]\nname = \"top\"\nversion = \"1.0.0\"\n\n[dependencies]\nlib_a = {{ git = \"{url}\", rev = \"{rev}\" }}\n"
    ))
    .unwrap();
    let mut env2 = Env::new();
    // Reuse the same repo path; a fresh cache root forces real resolution.
    let project_dir = env2.project.path().to_path_buf();
    let lock = DependencyResolver::new(&mut env2.cache)
        .resolve(&manifest, None, &ResolveOptions::default(), &project_dir)
        .unwrap();
    let pkg = lock.find("lib_a").unwrap();
    assert_eq!(pkg.version, rev[..7].to_string());
}

mod workspace_resolution {
    use super::*;
    use loom_pkg::Workspace;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn unified_lockfile_with_shared_and_member_deps() {
        if !git_available() {
            return;
        }
        let repos = TempDir::new().unwrap();
        let common_url = make_repo(
            repos.path(),
            "common_cells",
            &simple_manifest("common_cells"),
            &["v0.5.0"],
        );

        let root = TempDir::new().unwrap();
        write(
            &root.path().join("Loom.toml"),
            &format!(
                "[workspace]\nmembers = [\"ips/*\"]\n\n[workspace.dependencies]\ncommon_cells = {{ git = \"{common_url}\", version = \"^0.5.0\" }}\n"
            ),
        );
        write(
            &root.path().join("ips/uart/Loom.toml"),
            "[package]\nname = \"uart\"\nversion = \"1.0.0\"\n\n[dependencies]\ncommon_cells = { workspace = true }\n",
        );
        write(
            &root.path().join("ips/spi/Loom.toml"),
            "[package]\nname = \"spi\"\nversion = \"1.0.0\"\n\n[dependencies]\nuart = { member = true }\n",
        );

        let workspace = Workspace::load(root.path()).unwrap();
        let cache_dir = TempDir::new().unwrap();
        let mut cache = SourceCache::new(cache_dir.path());

        let lock = DependencyResolver::new(&mut cache)
            .resolve_workspace(&workspace, None, &ResolveOptions::default())
            .unwrap();

        let common = lock.find("common_cells").unwrap();
        assert!(common.source.starts_with("git+"));
        assert_eq!(common.version, "0.5.0");

        let uart = lock.find("uart").unwrap();
        assert!(uart.source.starts_with("path+"));
    }

    #[test]
    fn conflicting_sources_across_members_rejected() {
        if !git_available() {
            return;
        }
        let repos = TempDir::new().unwrap();
        let url_one = make_repo(
            repos.path(),
            "common_one",
            &simple_manifest("common_cells"),
            &["v0.5.0"],
        );
        let url_two = make_repo(
            repos.path(),
            "common_two",
            &simple_manifest("common_cells"),
            &["v0.5.0"],
        );

        let root = TempDir::new().unwrap();
        write(
            &root.path().join("Loom.toml"),
            "[workspace]\nmembers = [\"ips/*\"]\n",
        );
        write(
            &root.path().join("ips/uart/Loom.toml"),
            &format!(
                "[package]\nname = \"uart\"\nversion = \"1.0.0\"\n\n[dependencies]\ncommon_cells = {{ git = \"{url_one}\", tag = \"v0.5.0\" }}\n"
            ),
        );
        write(
            &root.path().join("ips/spi/Loom.toml"),
            &format!(
                "[package]\nname = \"spi\"\nversion = \"1.0.0\"\n\n[dependencies]\ncommon_cells = {{ git = \"{url_two}\", tag = \"v0.5.0\" }}\n"
            ),
        );

        let workspace = Workspace::load(root.path()).unwrap();
        let cache_dir = TempDir::new().unwrap();
        let mut cache = SourceCache::new(cache_dir.path());

        let err = DependencyResolver::new(&mut cache)
            .resolve_workspace(&workspace, None, &ResolveOptions::default())
            .unwrap_err();
        assert_eq!(err.code, loom_core::ErrorCode::Dependency);
        assert!(err.message.contains("conflicting sources"));
    }
}
