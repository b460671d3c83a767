//! Thin, testable wrapper over the git executable.
//!
//! Commands run with captured stdout/stderr, reader threads draining both
//! pipes, and a steady-clock deadline; a child that outlives the deadline is
//! killed. The driver carries an offline flag: any operation that would touch
//! the network fails with a typed `Network` error instead of spawning git.

use loom_core::{Error, ErrorCode, Result, Version, VersionReq};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default per-invocation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Minimum supported git version.
pub const MIN_GIT_VERSION: (u32, u32) = (2, 20);

/// The captured result of one git invocation.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Run a command with captured output and a hard timeout.
///
/// # Errors
///
/// Returns `InvalidArg` for empty args, and `Io` for spawn failures or a
/// timeout (the child is killed and reaped before returning).
pub fn run_command(
    args: &[&str],
    working_dir: Option<&Path>,
    timeout: Duration,
) -> Result<CommandResult> {
    let (program, rest) = args
        .split_first()
        .ok_or_else(|| Error::new(ErrorCode::InvalidArg, "run_command: empty args"))?;

    let mut cmd = Command::new(program);
    cmd.args(rest)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::new(ErrorCode::Io, format!("failed to spawn {program}: {e}")))?;

    // Reader threads drain the pipes so the child can never block on a full
    // pipe while we wait for it.
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let out_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(pipe) = stdout_pipe.as_mut() {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    });
    let err_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(pipe) = stderr_pipe.as_mut() {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    // Join the readers so their pipe fds are released.
                    let _ = out_handle.join();
                    let _ = err_handle.join();
                    return Err(Error::new(
                        ErrorCode::Io,
                        format!("command timed out after {}s", timeout.as_secs()),
                    ));
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::new(ErrorCode::Io, format!("wait failed: {e}")));
            }
        }
    };

    let stdout = String::from_utf8_lossy(&out_handle.join().unwrap_or_default()).into_owned();
    let stderr = String::from_utf8_lossy(&err_handle.join().unwrap_or_default()).into_owned();

    Ok(CommandResult {
        exit_code: status.code().unwrap_or(-1),
        stdout,
        stderr,
    })
}

/// A semver-tagged remote ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTag {
    /// Tag name as published, e.g. `v1.2.0`.
    pub name: String,
    /// Commit SHA; for annotated tags, the dereferenced commit.
    pub commit: String,
    pub version: Version,
}

fn strip_v_prefix(tag: &str) -> &str {
    tag.strip_prefix(['v', 'V']).unwrap_or(tag)
}

/// Parse `git ls-remote --tags --refs` output into semver tags, sorted by
/// version descending.
///
/// Lines are `<sha>\trefs/tags/<name>`, with an optional `^{}` suffix naming
/// the dereferenced commit of an annotated tag; the deref SHA wins. Tags
/// that do not parse as versions are skipped.
#[must_use]
pub fn parse_ls_remote_tags(output: &str) -> Vec<RemoteTag> {
    // name -> (sha, saw_deref)
    let mut shas: HashMap<String, (String, bool)> = HashMap::new();

    for line in output.lines() {
        let Some((sha, reference)) = line.split_once('\t') else {
            continue;
        };
        let Some(tag_name) = reference.strip_prefix("refs/tags/") else {
            continue;
        };

        let (tag_name, is_deref) = match tag_name.strip_suffix("^{}") {
            Some(base) => (base, true),
            None => (tag_name, false),
        };

        match shas.get_mut(tag_name) {
            None => {
                shas.insert(tag_name.to_string(), (sha.to_string(), is_deref));
            }
            Some(entry) => {
                if is_deref {
                    *entry = (sha.to_string(), true);
                }
            }
        }
    }

    let mut tags: Vec<RemoteTag> = shas
        .into_iter()
        .filter_map(|(name, (commit, _))| {
            let version = Version::parse(strip_v_prefix(&name)).ok()?;
            Some(RemoteTag {
                name,
                commit,
                version,
            })
        })
        .collect();

    tags.sort_by(|a, b| b.version.cmp(&a.version));
    tags
}

/// Pick the highest tag satisfying a requirement.
///
/// # Errors
///
/// Returns a `Version` error when no tag matches.
pub fn resolve_version_from_tags<'a>(
    tags: &'a [RemoteTag],
    req: &VersionReq,
) -> Result<&'a RemoteTag> {
    // Tags are sorted descending, so the first match is the highest.
    tags.iter()
        .find(|t| req.matches(&t.version))
        .ok_or_else(|| {
            Error::new(
                ErrorCode::Version,
                format!("no tag matches version requirement '{req}'"),
            )
        })
}

/// The git driver.
#[derive(Debug, Clone)]
pub struct GitCli {
    timeout: Duration,
    offline: bool,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            offline: false,
        }
    }

    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.offline
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn require_online(&self, op: &str) -> Result<()> {
        if self.offline {
            return Err(Error::new(
                ErrorCode::Network,
                format!("cannot {op} in offline mode"),
            )
            .with_hint("run without --offline"));
        }
        Ok(())
    }

    /// Verify git is installed and at least 2.20.
    ///
    /// # Errors
    ///
    /// `NotFound` when git is missing, `Parse` for unexpected output, and
    /// `Version` for an unsupported git.
    pub fn check_version(&self) -> Result<String> {
        let r = run_command(&["git", "--version"], None, self.timeout)?;
        if r.exit_code != 0 {
            return Err(Error::new(ErrorCode::NotFound, "git not found or failed")
                .with_hint("install git >= 2.20"));
        }

        let out = r.stdout.trim();
        let ver_str = out.strip_prefix("git version ").ok_or_else(|| {
            Error::new(
                ErrorCode::Parse,
                format!("unexpected git --version output: {out}"),
            )
        })?;

        let mut parts = ver_str.split('.');
        let major: u32 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| {
                Error::new(ErrorCode::Parse, format!("cannot parse git version: {ver_str}"))
            })?;
        let minor: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);

        if (major, minor) < MIN_GIT_VERSION {
            return Err(Error::new(
                ErrorCode::Version,
                format!("git version {ver_str} too old"),
            )
            .with_hint("upgrade to git >= 2.20"));
        }

        Ok(ver_str.to_string())
    }

    /// `git ls-remote --tags --refs <url>`.
    ///
    /// # Errors
    ///
    /// `Network` when offline or the command fails.
    pub fn ls_remote(&self, url: &str) -> Result<String> {
        self.require_online("ls-remote")?;
        debug!("git ls-remote --tags --refs {url}");
        let r = run_command(
            &["git", "ls-remote", "--tags", "--refs", url],
            None,
            self.timeout,
        )?;
        if r.exit_code != 0 {
            return Err(Error::new(
                ErrorCode::Network,
                format!("git ls-remote failed: {}", r.stderr.trim()),
            ));
        }
        Ok(r.stdout)
    }

    /// `git clone --bare <url> <dest>`.
    ///
    /// # Errors
    ///
    /// `Network` when offline or the clone fails.
    pub fn clone_bare(&self, url: &str, dest: &Path) -> Result<()> {
        self.require_online("clone")?;
        debug!("git clone --bare {url} {}", dest.display());
        let r = run_command(
            &["git", "clone", "--bare", url, &dest.to_string_lossy()],
            None,
            self.timeout,
        )?;
        if r.exit_code != 0 {
            return Err(Error::new(
                ErrorCode::Network,
                format!("git clone --bare failed: {}", r.stderr.trim()),
            ));
        }
        Ok(())
    }

    /// `git -C <bare> fetch --all --tags`.
    ///
    /// # Errors
    ///
    /// `Network` when offline or the fetch fails.
    pub fn fetch(&self, bare_repo: &Path) -> Result<()> {
        self.require_online("fetch")?;
        debug!("git -C {} fetch --all --tags", bare_repo.display());
        let r = run_command(
            &["git", "fetch", "--all", "--tags"],
            Some(bare_repo),
            self.timeout,
        )?;
        if r.exit_code != 0 {
            return Err(Error::new(
                ErrorCode::Network,
                format!("git fetch failed: {}", r.stderr.trim()),
            ));
        }
        Ok(())
    }

    /// Produce a working tree: `git clone --shared <bare> <dest>` followed by
    /// `git -C <dest> checkout <commit>`.
    ///
    /// # Errors
    ///
    /// `Io` when the shared clone fails and `NotFound` when the commit does
    /// not exist in the mirror.
    pub fn checkout(&self, bare_repo: &Path, commit: &str, dest: &Path) -> Result<()> {
        debug!("git clone --shared {} {}", bare_repo.display(), dest.display());
        let r = run_command(
            &[
                "git",
                "clone",
                "--shared",
                &bare_repo.to_string_lossy(),
                &dest.to_string_lossy(),
            ],
            None,
            self.timeout,
        )?;
        if r.exit_code != 0 {
            return Err(Error::new(
                ErrorCode::Io,
                format!("git clone --shared failed: {}", r.stderr.trim()),
            ));
        }

        debug!("git -C {} checkout {commit}", dest.display());
        let r = run_command(&["git", "checkout", commit], Some(dest), self.timeout)?;
        if r.exit_code != 0 {
            return Err(Error::new(
                ErrorCode::NotFound,
                format!("git checkout failed: {}", r.stderr.trim()),
            ));
        }
        Ok(())
    }

    /// `git -C <bare> rev-parse <ref>` to a full SHA.
    ///
    /// # Errors
    ///
    /// `NotFound` when the ref does not resolve.
    pub fn resolve_ref(&self, bare_repo: &Path, reference: &str) -> Result<String> {
        let r = run_command(
            &["git", "rev-parse", reference],
            Some(bare_repo),
            self.timeout,
        )?;
        if r.exit_code != 0 {
            return Err(Error::new(
                ErrorCode::NotFound,
                format!("cannot resolve ref '{reference}': {}", r.stderr.trim()),
            ));
        }
        Ok(r.stdout.trim().to_string())
    }

    /// `git -C <bare> show <commit>:<path>`: read one file out of a mirror.
    ///
    /// # Errors
    ///
    /// `NotFound` when the file does not exist at that commit.
    pub fn show_file(&self, bare_repo: &Path, commit: &str, file: &str) -> Result<String> {
        let spec = format!("{commit}:{file}");
        let r = run_command(&["git", "show", &spec], Some(bare_repo), self.timeout)?;
        if r.exit_code != 0 {
            return Err(Error::new(
                ErrorCode::NotFound,
                format!("cannot read '{file}' at {commit}: {}", r.stderr.trim()),
            ));
        }
        Ok(r.stdout)
    }
}
