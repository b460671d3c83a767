//! Two-tier source cache: bare git mirrors plus per-version checkouts.
//!
//! ```text
//! <root>/git/db/<pkg>-<urlhash16>/                     bare mirror
//! <root>/git/checkouts/<pkg>-<urlhash16>/<ver>-<sha7>/ working tree
//! ```
//!
//! `urlhash16` is the first 16 hex chars of SHA-256(url); `sha7` the first
//! seven of the commit. Checkouts, once created, are immutable.

use crate::git::GitCli;
use loom_core::hash::{sha256_hex, Sha256Hasher};
use loom_core::{Error, ErrorCode, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The source cache over a configurable root directory.
#[derive(Debug)]
pub struct SourceCache {
    root: PathBuf,
    git: GitCli,
}

impl SourceCache {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            git: GitCli::new(),
        }
    }

    /// Default cache root: `$HOME/.loom/cache`, with `/tmp` standing in when
    /// `HOME` is unset.
    #[must_use]
    pub fn default_root() -> PathBuf {
        let home = std::env::var_os("HOME")
            .map_or_else(|| PathBuf::from("/tmp"), PathBuf::from);
        home.join(".loom").join("cache")
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn git(&self) -> &GitCli {
        &self.git
    }

    pub fn git_mut(&mut self) -> &mut GitCli {
        &mut self.git
    }

    /// `<pkg>-<first 16 hex of SHA-256(url)>`.
    #[must_use]
    pub fn cache_dir_name(pkg_name: &str, url: &str) -> String {
        let hash = sha256_hex(url.as_bytes());
        format!("{pkg_name}-{}", &hash[..16])
    }

    /// Path of the bare mirror for (name, url).
    #[must_use]
    pub fn bare_repo_path(&self, pkg_name: &str, url: &str) -> PathBuf {
        self.root
            .join("git")
            .join("db")
            .join(Self::cache_dir_name(pkg_name, url))
    }

    /// Path of the working tree for (name, url, version, commit).
    #[must_use]
    pub fn checkout_path(
        &self,
        pkg_name: &str,
        url: &str,
        version: &str,
        commit: &str,
    ) -> PathBuf {
        let short_sha = &commit[..commit.len().min(7)];
        self.root
            .join("git")
            .join("checkouts")
            .join(Self::cache_dir_name(pkg_name, url))
            .join(format!("{version}-{short_sha}"))
    }

    /// Ensure the bare mirror exists and is fresh: fetch when present, clone
    /// when absent. Returns the mirror path.
    ///
    /// # Errors
    ///
    /// Propagates git `Network` errors and directory-creation `Io` errors.
    pub fn ensure_bare_repo(&self, name: &str, url: &str) -> Result<PathBuf> {
        let path = self.bare_repo_path(name, url);

        if path.exists() {
            debug!("bare repo exists, fetching: {}", path.display());
            self.git.fetch(&path)?;
            return Ok(path);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("cloning bare: {url} -> {}", path.display());
        self.git.clone_bare(url, &path)?;
        Ok(path)
    }

    /// Ensure the working-tree checkout exists; an existing checkout is
    /// returned untouched.
    ///
    /// # Errors
    ///
    /// Propagates mirror and checkout errors.
    pub fn ensure_checkout(
        &self,
        name: &str,
        url: &str,
        version: &str,
        commit: &str,
    ) -> Result<PathBuf> {
        let co_path = self.checkout_path(name, url, version, commit);

        if co_path.exists() {
            debug!("checkout exists: {}", co_path.display());
            return Ok(co_path);
        }

        let bare = self.ensure_bare_repo(name, url)?;

        if let Some(parent) = co_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("checking out {name}@{version} -> {}", co_path.display());
        self.git.checkout(&bare, commit, &co_path)?;
        Ok(co_path)
    }

    /// Deterministic content address of a working tree: regular files only,
    /// `.git` excluded, paths sorted, one hasher fed `<relpath><bytes>` per
    /// file.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the directory does not exist and `Io` for
    /// traversal failures.
    pub fn compute_checksum(&self, tree: &Path) -> Result<String> {
        compute_tree_checksum(tree)
    }

    /// Remove every checkout but keep the bare mirrors.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error if removal fails.
    pub fn clean_checkouts(&self) -> Result<()> {
        let dir = self.root.join("git").join("checkouts");
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| {
                Error::new(ErrorCode::Io, format!("failed to clean checkouts: {e}"))
            })?;
        }
        Ok(())
    }

    /// Remove the entire git subtree, mirrors included.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error if removal fails.
    pub fn clean_all(&self) -> Result<()> {
        let dir = self.root.join("git");
        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .map_err(|e| Error::new(ErrorCode::Io, format!("failed to clean cache: {e}")))?;
        }
        Ok(())
    }
}

/// Tree checksum over sorted relative paths, excluding VCS metadata.
pub fn compute_tree_checksum(tree: &Path) -> Result<String> {
    if !tree.is_dir() {
        return Err(Error::new(
            ErrorCode::NotFound,
            format!("checkout path does not exist: {}", tree.display()),
        ));
    }

    let mut files = Vec::new();
    collect_files(tree, tree, &mut files)?;
    files.sort();

    let mut hasher = Sha256Hasher::new();
    let mut buf = [0u8; 8192];
    for rel in &files {
        hasher.update(rel.as_bytes());
        let mut file = std::fs::File::open(tree.join(rel.trim_start_matches('/')))?;
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
    }

    Ok(hasher.finish_hex())
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if path.is_file() {
            let rel = path.strip_prefix(root).unwrap_or(&path);
            let mut rel_str = String::from("/");
            rel_str.push_str(&rel.to_string_lossy().replace('\\', "/"));
            // Skip VCS metadata.
            if rel_str.starts_with("/.git") || rel_str.contains("/.git/") {
                continue;
            }
            out.push(rel_str);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn cache_dir_name_is_stable() {
        let a = SourceCache::cache_dir_name("uart", "https://e.com/uart.git");
        let b = SourceCache::cache_dir_name("uart", "https://e.com/uart.git");
        assert_eq!(a, b);
        assert!(a.starts_with("uart-"));
        assert_eq!(a.len(), "uart-".len() + 16);

        let c = SourceCache::cache_dir_name("uart", "https://other.com/uart.git");
        assert_ne!(a, c);
    }

    #[test]
    fn layout_paths() {
        let cache = SourceCache::new("/cache");
        let bare = cache.bare_repo_path("uart", "https://e.com/uart.git");
        assert!(bare.starts_with("/cache/git/db"));

        let co = cache.checkout_path(
            "uart",
            "https://e.com/uart.git",
            "1.2.0",
            "a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4e5f6a1b2",
        );
        assert!(co.starts_with("/cache/git/checkouts"));
        assert!(co.to_string_lossy().ends_with("1.2.0-a1b2c3d"));
    }

    #[test]
    fn short_commit_does_not_panic() {
        let cache = SourceCache::new("/cache");
        let co = cache.checkout_path("x", "https://e.com/x.git", "1.0.0", "abc");
        assert!(co.to_string_lossy().ends_with("1.0.0-abc"));
    }

    #[test]
    fn checksum_is_deterministic() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("rtl")).unwrap();
        fs::write(tmp.path().join("rtl/a.sv"), "module a; endmodule\n").unwrap();
        fs::write(tmp.path().join("top.sv"), "module top; endmodule\n").unwrap();

        let c1 = compute_tree_checksum(tmp.path()).unwrap();
        let c2 = compute_tree_checksum(tmp.path()).unwrap();
        assert_eq!(c1, c2);
        assert_eq!(c1.len(), 64);
    }

    #[test]
    fn checksum_ignores_git_metadata() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("top.sv"), "module top; endmodule\n").unwrap();
        let before = compute_tree_checksum(tmp.path()).unwrap();

        fs::create_dir_all(tmp.path().join(".git/objects")).unwrap();
        fs::write(tmp.path().join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
        fs::write(tmp.path().join(".git/objects/x"), "blob").unwrap();
        let after = compute_tree_checksum(tmp.path()).unwrap();

        assert_eq!(before, after);
    }

    #[test]
    fn checksum_depends_on_content_and_path() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.sv"), "one").unwrap();
        let c1 = compute_tree_checksum(tmp.path()).unwrap();

        fs::write(tmp.path().join("a.sv"), "two").unwrap();
        let c2 = compute_tree_checksum(tmp.path()).unwrap();
        assert_ne!(c1, c2);

        let tmp2 = TempDir::new().unwrap();
        fs::write(tmp2.path().join("b.sv"), "two").unwrap();
        let c3 = compute_tree_checksum(tmp2.path()).unwrap();
        assert_ne!(c2, c3);
    }

    #[test]
    fn checksum_same_layout_same_digest() {
        let make = || {
            let tmp = TempDir::new().unwrap();
            fs::create_dir_all(tmp.path().join("src")).unwrap();
            fs::write(tmp.path().join("src/m.sv"), "module m; endmodule\n").unwrap();
            fs::write(tmp.path().join("Loom.toml"), "[package]\n").unwrap();
            tmp
        };
        let a = make();
        let b = make();
        assert_eq!(
            compute_tree_checksum(a.path()).unwrap(),
            compute_tree_checksum(b.path()).unwrap()
        );
    }

    #[test]
    fn checksum_missing_dir_is_not_found() {
        let err = compute_tree_checksum(Path::new("/nonexistent/loom-tree")).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[test]
    fn clean_checkouts_keeps_mirrors() {
        let tmp = TempDir::new().unwrap();
        let cache = SourceCache::new(tmp.path());
        fs::create_dir_all(tmp.path().join("git/db/pkg-1234")).unwrap();
        fs::create_dir_all(tmp.path().join("git/checkouts/pkg-1234/1.0.0-abc1234")).unwrap();

        cache.clean_checkouts().unwrap();
        assert!(tmp.path().join("git/db/pkg-1234").exists());
        assert!(!tmp.path().join("git/checkouts").exists());

        cache.clean_all().unwrap();
        assert!(!tmp.path().join("git").exists());
    }
}
