//! `loom build`: run project sources through the incremental build cache.
//!
//! Per source file: stat-identity hash lookup, then parse-cache lookup; a
//! miss runs the lexer and parser and stores the result. Include directives
//! and design-unit references feed the cache's edge tables, and the whole
//! run is snapshotted under a filelist key.

use anyhow::{Context, Result};
use loom_cache::{
    effective_hash, filelist_key, BuildCache, DepEdgeEntry, FilelistEntry, IncludeDepEntry,
};
use loom_lang::{parse_source, ParseResult, TokenKind};
use loom_pkg::target_expr::parse_target_set;
use loom_pkg::{Project, SourceGroup, TargetSet};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub fn run(cache_root: &Path, targets: Option<&str>) -> Result<()> {
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let project = Project::discover(&cwd)?;

    let active: TargetSet = match targets {
        Some(spec) => parse_target_set(spec)?,
        None => TargetSet::new(),
    };

    let groups = project.collect_source_groups(&active)?;
    let mut cache = BuildCache::open(&cache_root.join("loom_cache.db"))?;

    let mut hits = 0usize;
    let mut misses = 0usize;
    let mut diagnostics = 0usize;
    let mut effective_hashes = Vec::new();
    let mut all_files = Vec::new();
    let mut top_modules = Vec::new();

    for group in &groups {
        for file in &group.files {
            let path = PathBuf::from(file);
            let content_hash = cache.cached_file_hash(&path)?;

            let source = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read source file {file}"))?;

            let result = match cache.lookup_parse(&content_hash) {
                Ok(result) => {
                    hits += 1;
                    result
                }
                Err(_) => {
                    misses += 1;
                    let result = parse_source(&source, file);
                    cache.store_parse(&content_hash, &result)?;
                    result
                }
            };

            diagnostics += result.diagnostics.len();
            for d in &result.diagnostics {
                warn!("{}:{}:{}: {}", d.file, d.line, d.col, d.message);
            }

            let include_hashes = record_includes(
                &mut cache,
                &content_hash,
                &source,
                &path,
                group,
                &project.root_dir,
            )?;
            record_unit_edges(&mut cache, &content_hash, &result)?;

            effective_hashes.push(effective_hash(
                &content_hash,
                &include_hashes,
                &group.defines,
                &group.include_dirs,
            ));
            all_files.push(file.clone());

            if let Some(top) = &project.manifest.package.top {
                if result.units.iter().any(|u| &u.name == top) {
                    top_modules.push(top.clone());
                }
            }
        }
    }

    let key = filelist_key(loom_core::VERSION, &project.checksum, &effective_hashes);
    cache.store_filelist(&FilelistEntry {
        filelist_key: key,
        file_list: all_files.clone(),
        top_modules,
        created_at: 0,
    })?;

    info!(
        "built {} file(s): {hits} cached, {misses} parsed, {diagnostics} diagnostic(s)",
        all_files.len()
    );
    Ok(())
}

/// Scan `\`include` directives, resolve them against the file's directory and
/// the group's include dirs, and record the edges. Returns the content hashes
/// of the includes that were found.
fn record_includes(
    cache: &mut BuildCache,
    source_hash: &str,
    source: &str,
    source_path: &Path,
    group: &SourceGroup,
    project_root: &Path,
) -> Result<Vec<String>> {
    let tokens = loom_lang::Lexer::new(source).tokenize();
    let mut include_hashes = Vec::new();
    let mut entries = Vec::new();
    let mut seen = HashSet::new();

    for pair in tokens.windows(2) {
        if pair[0].kind != TokenKind::Directive || pair[0].text != "`include" {
            continue;
        }
        if pair[1].kind != TokenKind::Str {
            continue;
        }
        let literal = pair[1].text.trim_matches('"').to_string();
        if !seen.insert(literal.clone()) {
            continue;
        }

        let Some(resolved) =
            resolve_include(&literal, source_path, &group.include_dirs, project_root)
        else {
            debug!("include not found: {literal}");
            continue;
        };

        let include_hash = cache.cached_file_hash(&resolved)?;
        include_hashes.push(include_hash.clone());
        entries.push(IncludeDepEntry {
            source_hash: source_hash.to_string(),
            include_path: literal,
            include_hash,
        });
    }

    cache.store_includes(source_hash, &entries)?;
    Ok(include_hashes)
}

fn resolve_include(
    literal: &str,
    source_path: &Path,
    include_dirs: &[String],
    project_root: &Path,
) -> Option<PathBuf> {
    if let Some(dir) = source_path.parent() {
        let candidate = dir.join(literal);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    for dir in include_dirs {
        // Include dirs are declared relative to the project root.
        let candidate = project_root.join(dir).join(literal);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Record design-unit edges: one per (declaring unit, instantiated module)
/// pair found in the file.
fn record_unit_edges(
    cache: &mut BuildCache,
    source_hash: &str,
    result: &ParseResult,
) -> Result<()> {
    let mut edges = Vec::new();
    let mut seen = HashSet::new();
    for unit in &result.units {
        for inst in &unit.instantiations {
            if seen.insert((unit.name.clone(), inst.module_name.clone())) {
                edges.push(DepEdgeEntry {
                    source_hash: source_hash.to_string(),
                    source_unit: unit.name.clone(),
                    target_unit: inst.module_name.clone(),
                });
            }
        }
    }
    cache.store_edges(source_hash, &edges)?;
    Ok(())
}
