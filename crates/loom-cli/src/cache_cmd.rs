//! `loom cache`: maintenance over the source and build caches.

use anyhow::Result;
use clap::Subcommand;
use loom_cache::BuildCache;
use loom_pkg::SourceCache;
use std::path::Path;
use tracing::info;

#[derive(Subcommand)]
pub enum CacheAction {
    /// Print row counts and cache size
    Stats,
    /// Remove checkouts (keeps bare mirrors) and clear the build cache
    Clean {
        /// Also remove the bare git mirrors.
        #[arg(long)]
        all: bool,
    },
    /// Drop build-cache rows for files no longer tracked
    Prune,
    /// Reclaim build-cache space
    Vacuum,
}

pub fn run(cache_root: &Path, action: &CacheAction) -> Result<()> {
    let db_path = cache_root.join("loom_cache.db");

    match action {
        CacheAction::Stats => {
            let cache = BuildCache::open(&db_path)?;
            let stats = cache.get_stats()?;
            println!("file stats:    {}", stats.file_stat_count);
            println!("parse results: {}", stats.parse_result_count);
            println!("include deps:  {}", stats.include_dep_count);
            println!("unit edges:    {}", stats.dep_edge_count);
            println!("filelists:     {}", stats.filelist_count);
            println!("total size:    {} bytes", stats.total_bytes);
        }
        CacheAction::Clean { all } => {
            let sources = SourceCache::new(cache_root);
            if *all {
                sources.clean_all()?;
                info!("removed bare mirrors and checkouts");
            } else {
                sources.clean_checkouts()?;
                info!("removed checkouts, kept bare mirrors");
            }
            let cache = BuildCache::open(&db_path)?;
            cache.clear()?;
            info!("cleared build cache");
        }
        CacheAction::Prune => {
            let cache = BuildCache::open(&db_path)?;
            cache.prune()?;
            info!("pruned unreferenced cache rows");
        }
        CacheAction::Vacuum => {
            let cache = BuildCache::open(&db_path)?;
            cache.vacuum()?;
            info!("vacuumed build cache");
        }
    }
    Ok(())
}
