//! Path-aware glob matching for workspace members and source groups.
//!
//! Paths are normalized (backslashes to `/`, duplicate separators collapsed)
//! and matched segment-wise: `*` and `?` never cross a `/`, `**` spans zero
//! or more whole segments, and `[abc]` / `[a-z]` / `[!…]` classes match
//! within a segment. In ordered pattern lists a leading `!` marks an exclude,
//! and the last matching pattern wins.

use crate::error::{Error, ErrorCode, Result};
use std::path::Path;

/// Normalize separators and collapse duplicates.
fn normalize(p: &str) -> String {
    let mut out = String::with_capacity(p.len());
    for mut c in p.chars() {
        if c == '\\' {
            c = '/';
        }
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

fn segments(s: &str) -> Vec<&str> {
    s.split('/').collect()
}

/// Match one pattern segment against one path segment (no `/` in either).
fn match_segment(pat: &[char], pi: usize, text: &[char], ti: usize) -> bool {
    let mut pi = pi;
    let mut ti = ti;

    while pi < pat.len() && ti < text.len() {
        match pat[pi] {
            '*' => {
                // Collapse consecutive stars within the segment.
                while pi < pat.len() && pat[pi] == '*' {
                    pi += 1;
                }
                if pi == pat.len() {
                    return true;
                }
                for k in ti..=text.len() {
                    if match_segment(pat, pi, text, k) {
                        return true;
                    }
                }
                return false;
            }
            '?' => {
                pi += 1;
                ti += 1;
            }
            '[' => {
                pi += 1;
                let negate = pi < pat.len() && pat[pi] == '!';
                if negate {
                    pi += 1;
                }
                let mut matched = false;
                let c = text[ti];
                while pi < pat.len() && pat[pi] != ']' {
                    if pi + 2 < pat.len() && pat[pi + 1] == '-' && pat[pi + 2] != ']' {
                        if c >= pat[pi] && c <= pat[pi + 2] {
                            matched = true;
                        }
                        pi += 3;
                    } else {
                        if c == pat[pi] {
                            matched = true;
                        }
                        pi += 1;
                    }
                }
                if pi < pat.len() {
                    pi += 1; // skip ']'
                }
                if negate {
                    matched = !matched;
                }
                if !matched {
                    return false;
                }
                ti += 1;
            }
            lit => {
                if lit != text[ti] {
                    return false;
                }
                pi += 1;
                ti += 1;
            }
        }
    }

    while pi < pat.len() && pat[pi] == '*' {
        pi += 1;
    }
    pi == pat.len() && ti == text.len()
}

/// Match pattern segments against path segments, handling `**`.
fn match_segments(pat: &[&str], pi: usize, path: &[&str], si: usize) -> bool {
    let mut pi = pi;
    let mut si = si;

    while pi < pat.len() && si < path.len() {
        if pat[pi] == "**" {
            while pi < pat.len() && pat[pi] == "**" {
                pi += 1;
            }
            if pi == pat.len() {
                return true;
            }
            for k in si..=path.len() {
                if match_segments(pat, pi, path, k) {
                    return true;
                }
            }
            return false;
        }

        let ps: Vec<char> = pat[pi].chars().collect();
        let ts: Vec<char> = path[si].chars().collect();
        if !match_segment(&ps, 0, &ts, 0) {
            return false;
        }
        pi += 1;
        si += 1;
    }

    while pi < pat.len() && pat[pi] == "**" {
        pi += 1;
    }
    pi == pat.len() && si == path.len()
}

/// Test a single pattern against a single path.
#[must_use]
pub fn glob_match(pattern: &str, path: &str) -> bool {
    let pat = normalize(pattern);
    let path = normalize(path);
    match_segments(&segments(&pat), 0, &segments(&path), 0)
}

/// Split off a leading `!`, returning the inner pattern if negated.
#[must_use]
pub fn negation(pattern: &str) -> Option<&str> {
    pattern.strip_prefix('!')
}

/// Expand a pattern against the regular files under `root`, returning sorted
/// root-relative paths.
///
/// # Errors
///
/// Returns an `Io` error if `root` is not a directory or iteration fails.
pub fn glob_expand(pattern: &str, root: &Path) -> Result<Vec<String>> {
    if !root.is_dir() {
        return Err(Error::new(
            ErrorCode::Io,
            format!("glob root is not a directory: {}", root.display()),
        ));
    }

    let mut results = Vec::new();
    let pattern = normalize(pattern);
    walk_files(root, root, &mut |rel| {
        if glob_match(&pattern, rel) {
            results.push(rel.to_string());
        }
    })?;

    results.sort();
    Ok(results)
}

fn walk_files(root: &Path, dir: &Path, visit: &mut impl FnMut(&str)) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk_files(root, &path, visit)?;
        } else if path.is_file() {
            let rel = path.strip_prefix(root).unwrap_or(&path);
            visit(&normalize(&rel.to_string_lossy()));
        }
    }
    Ok(())
}

/// Filter paths through an ordered pattern list. `!pattern` excludes, and the
/// last matching pattern decides.
#[must_use]
pub fn glob_filter(patterns: &[String], paths: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for path in paths {
        let mut included = false;
        for pat in patterns {
            match negation(pat) {
                Some(inner) => {
                    if glob_match(inner, path) {
                        included = false;
                    }
                }
                None => {
                    if glob_match(pat, path) {
                        included = true;
                    }
                }
            }
        }
        if included {
            out.push(path.clone());
        }
    }
    out
}
